use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crossplay_core::net::messages::{
    ClientMessage, ControlAction, ControlMsg, CreateRoomMsg, GuessMsg, JoinRoomMsg,
    RoomCreatedMsg, ServerMessage,
};
use crossplay_core::net::protocol::{PROTOCOL_VERSION, decode_server_message, encode_client_message};
use crossplay_core::room::SettingsUpdate;
use crossplay_core::test_helpers::SAMPLE_VOCAB;

use crossplay_server::build_app;
use crossplay_server::config::ServerConfig;
use crossplay_server::vocabulary::{Level, VocabularyError, VocabularySource};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Always serves the sample animal vocabulary, so ELEPHANT (the longest
/// word) is always placed.
pub struct SampleVocabulary;

#[async_trait]
impl VocabularySource for SampleVocabulary {
    async fn get_level(&self, _language: &str) -> Result<Level, VocabularyError> {
        Ok(Level {
            theme: "Animals".to_string(),
            words: SAMPLE_VOCAB.iter().map(|w| w.to_string()).collect(),
        })
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, _state) = build_app(config, Arc::new(SampleVocabulary));

        let handle = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

pub async fn ws_send_client_msg(stream: &mut WsStream, msg: &ClientMessage) {
    let encoded = encode_client_message(msg).unwrap();
    stream.send(Message::Binary(encoded.into())).await.unwrap();
}

/// Read raw binary data from a WebSocket stream (5s timeout).
pub async fn ws_read_raw(stream: &mut WsStream) -> Vec<u8> {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return data.to_vec(),
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for WebSocket message")
}

/// Try to read raw binary data, returning None on timeout.
pub async fn ws_try_read_raw(stream: &mut WsStream, timeout_ms: u64) -> Option<Vec<u8>> {
    let deadline = Duration::from_millis(timeout_ms);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return data.to_vec(),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    panic!("WebSocket error or closed")
                },
                _ => continue,
            }
        }
    })
    .await
    .ok()
}

pub async fn ws_read_server_msg(stream: &mut WsStream) -> ServerMessage {
    let data = ws_read_raw(stream).await;
    decode_server_message(&data).unwrap()
}

/// Skip messages until one satisfies `pred`.
pub async fn ws_read_until(
    stream: &mut WsStream,
    pred: impl Fn(&ServerMessage) -> bool,
) -> ServerMessage {
    loop {
        let msg = ws_read_server_msg(stream).await;
        if pred(&msg) {
            return msg;
        }
    }
}

/// Create a room, joining as owner when `name` is given. Returns the
/// RoomCreated reply.
pub async fn ws_create_room(stream: &mut WsStream, name: Option<&str>) -> RoomCreatedMsg {
    let msg = ClientMessage::CreateRoom(CreateRoomMsg {
        protocol_version: PROTOCOL_VERSION,
        display_name: name.map(str::to_string),
        provider: None,
        settings: SettingsUpdate::default(),
    });
    ws_send_client_msg(stream, &msg).await;
    match ws_read_server_msg(stream).await {
        ServerMessage::RoomCreated(created) => *created,
        other => panic!("Expected RoomCreated, got: {other:?}"),
    }
}

/// Send a JoinRoom and return the first reply (RoomJoined or Error).
pub async fn ws_join_room(stream: &mut WsStream, room_code: &str, name: &str) -> ServerMessage {
    let msg = ClientMessage::JoinRoom(JoinRoomMsg {
        protocol_version: PROTOCOL_VERSION,
        room_code: room_code.to_string(),
        display_name: name.to_string(),
        provider: None,
    });
    ws_send_client_msg(stream, &msg).await;
    ws_read_server_msg(stream).await
}

pub async fn ws_control(stream: &mut WsStream, action: ControlAction) {
    ws_send_client_msg(stream, &ClientMessage::Control(ControlMsg { action })).await;
}

pub async fn ws_guess(stream: &mut WsStream, text: &str) {
    let msg = ClientMessage::Guess(GuessMsg {
        text: text.to_string(),
    });
    ws_send_client_msg(stream, &msg).await;
}
