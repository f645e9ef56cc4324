use serde::{Deserialize, Serialize};

use super::messages::{
    ClientMessage, ControlMsg, CreateRoomMsg, EndedMsg, ErrorMsg, GetRoomInfoMsg, GuessMsg,
    GuessResultMsg, JoinRoomMsg, LeaveRoomMsg, LevelCompleteMsg, LoadingStateMsg, MessageType,
    NewRoundMsg, PlayerJoinedMsg, PlayerLeftMsg, PlayerListMsg, RoomCreatedMsg, RoomInfoMsg,
    RoomJoinedMsg, ServerMessage, SettingsUpdatedMsg, StatusMsg, TickMsg, UpdateSettingsMsg,
    WordRevealedMsg,
};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum message payload size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug)]
pub enum ProtocolError {
    EmptyMessage,
    UnknownMessageType(u8),
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::UnknownMessageType(b) => write!(f, "unknown message type: 0x{b:02x}"),
            Self::PayloadTooLarge(size) => {
                write!(f, "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})")
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a serializable payload with a 1-byte type prefix.
pub fn encode_message<T: Serialize>(
    msg_type: MessageType,
    payload: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let payload_bytes =
        rmp_serde::to_vec(payload).map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    let total = 1 + payload_bytes.len();
    if total > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(total));
    }
    let mut buf = Vec::with_capacity(total);
    buf.push(msg_type as u8);
    buf.extend_from_slice(&payload_bytes);
    Ok(buf)
}

/// Encode a `ClientMessage` to wire format.
pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ClientMessage::CreateRoom(m) => encode_message(MessageType::CreateRoom, m),
        ClientMessage::JoinRoom(m) => encode_message(MessageType::JoinRoom, m),
        ClientMessage::GetRoomInfo(m) => encode_message(MessageType::GetRoomInfo, m),
        ClientMessage::LeaveRoom(m) => encode_message(MessageType::LeaveRoom, m),
        ClientMessage::Control(m) => encode_message(MessageType::Control, m),
        ClientMessage::Guess(m) => encode_message(MessageType::Guess, m),
        ClientMessage::UpdateSettings(m) => encode_message(MessageType::UpdateSettings, m),
    }
}

/// Encode a `ServerMessage` to wire format.
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ServerMessage::RoomCreated(m) => encode_message(MessageType::RoomCreated, m),
        ServerMessage::RoomJoined(m) => encode_message(MessageType::RoomJoined, m),
        ServerMessage::RoomInfo(m) => encode_message(MessageType::RoomInfo, m),
        ServerMessage::PlayerJoined(m) => encode_message(MessageType::PlayerJoined, m),
        ServerMessage::PlayerLeft(m) => encode_message(MessageType::PlayerLeft, m),
        ServerMessage::PlayerList(m) => encode_message(MessageType::PlayerList, m),
        ServerMessage::Status(m) => encode_message(MessageType::Status, m),
        ServerMessage::SettingsUpdated(m) => encode_message(MessageType::SettingsUpdated, m),
        ServerMessage::LoadingState(m) => encode_message(MessageType::LoadingState, m),
        ServerMessage::NewRound(m) => encode_message(MessageType::NewRound, m),
        ServerMessage::Tick(m) => encode_message(MessageType::Tick, m),
        ServerMessage::GuessResult(m) => encode_message(MessageType::GuessResult, m),
        ServerMessage::WordRevealed(m) => encode_message(MessageType::WordRevealed, m),
        ServerMessage::LevelComplete(m) => encode_message(MessageType::LevelComplete, m),
        ServerMessage::Ended(m) => encode_message(MessageType::Ended, m),
        ServerMessage::Error(m) => encode_message(MessageType::Error, m),
    }
}

/// Extract the message type byte from raw wire data.
pub fn decode_message_type(data: &[u8]) -> Result<MessageType, ProtocolError> {
    let Some(&first) = data.first() else {
        return Err(ProtocolError::EmptyMessage);
    };
    MessageType::from_byte(first).ok_or(ProtocolError::UnknownMessageType(first))
}

/// Decode a MessagePack payload (bytes after the type prefix).
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    rmp_serde::from_slice(&data[1..]).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Decode raw wire data into a `ClientMessage`.
pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::CreateRoom => Ok(ClientMessage::CreateRoom(decode_payload::<
            CreateRoomMsg,
        >(data)?)),
        MessageType::JoinRoom => Ok(ClientMessage::JoinRoom(decode_payload::<JoinRoomMsg>(
            data,
        )?)),
        MessageType::GetRoomInfo => Ok(ClientMessage::GetRoomInfo(decode_payload::<
            GetRoomInfoMsg,
        >(data)?)),
        MessageType::LeaveRoom => Ok(ClientMessage::LeaveRoom(decode_payload::<LeaveRoomMsg>(
            data,
        )?)),
        MessageType::Control => Ok(ClientMessage::Control(decode_payload::<ControlMsg>(data)?)),
        MessageType::Guess => Ok(ClientMessage::Guess(decode_payload::<GuessMsg>(data)?)),
        MessageType::UpdateSettings => Ok(ClientMessage::UpdateSettings(decode_payload::<
            UpdateSettingsMsg,
        >(data)?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}

/// Decode raw wire data into a `ServerMessage`.
pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::RoomCreated => Ok(ServerMessage::RoomCreated(Box::new(decode_payload::<
            RoomCreatedMsg,
        >(data)?))),
        MessageType::RoomJoined => Ok(ServerMessage::RoomJoined(Box::new(decode_payload::<
            RoomJoinedMsg,
        >(data)?))),
        MessageType::RoomInfo => Ok(ServerMessage::RoomInfo(Box::new(decode_payload::<
            RoomInfoMsg,
        >(data)?))),
        MessageType::PlayerJoined => Ok(ServerMessage::PlayerJoined(decode_payload::<
            PlayerJoinedMsg,
        >(data)?)),
        MessageType::PlayerLeft => Ok(ServerMessage::PlayerLeft(decode_payload::<PlayerLeftMsg>(
            data,
        )?)),
        MessageType::PlayerList => Ok(ServerMessage::PlayerList(decode_payload::<PlayerListMsg>(
            data,
        )?)),
        MessageType::Status => Ok(ServerMessage::Status(decode_payload::<StatusMsg>(data)?)),
        MessageType::SettingsUpdated => Ok(ServerMessage::SettingsUpdated(decode_payload::<
            SettingsUpdatedMsg,
        >(data)?)),
        MessageType::LoadingState => Ok(ServerMessage::LoadingState(decode_payload::<
            LoadingStateMsg,
        >(data)?)),
        MessageType::NewRound => Ok(ServerMessage::NewRound(decode_payload::<NewRoundMsg>(
            data,
        )?)),
        MessageType::Tick => Ok(ServerMessage::Tick(decode_payload::<TickMsg>(data)?)),
        MessageType::GuessResult => Ok(ServerMessage::GuessResult(decode_payload::<
            GuessResultMsg,
        >(data)?)),
        MessageType::WordRevealed => Ok(ServerMessage::WordRevealed(decode_payload::<
            WordRevealedMsg,
        >(data)?)),
        MessageType::LevelComplete => Ok(ServerMessage::LevelComplete(decode_payload::<
            LevelCompleteMsg,
        >(data)?)),
        MessageType::Ended => Ok(ServerMessage::Ended(decode_payload::<EndedMsg>(data)?)),
        MessageType::Error => Ok(ServerMessage::Error(decode_payload::<ErrorMsg>(data)?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Direction;
    use crate::net::messages::{ControlAction, PuzzleWord, RoomSnapshot};
    use crate::room::{EndCondition, RoomSettings, SettingsBounds, SettingsUpdate};
    use crate::session::{LastHit, ScoreEntry, Session};
    use crate::test_helpers::{make_player, make_words};

    fn score(player_id: u64, total: u32) -> ScoreEntry {
        ScoreEntry {
            player_id,
            display_name: format!("P{player_id}"),
            round_score: total,
            total_score: total,
        }
    }

    fn playing_snapshot() -> RoomSnapshot {
        let mut session = Session::new(
            "ABCDE".into(),
            RoomSettings::default(),
            SettingsBounds::default(),
        );
        session.join(make_player(1, "Host")).unwrap();
        session.start(1).unwrap();
        session.install_round("Animals".into(), make_words(&["GATO", "PERRO"]));
        session.guess(1, "gato");
        RoomSnapshot::from(&session)
    }

    #[test]
    fn roundtrip_create_room() {
        let msg = ClientMessage::CreateRoom(CreateRoomMsg {
            protocol_version: PROTOCOL_VERSION,
            display_name: Some("Alice".into()),
            provider: Some("twitch".into()),
            settings: SettingsUpdate {
                language: Some("es".into()),
                round_duration_secs: Some(90),
                end_condition: Some(EndCondition::Score(10)),
                max_participants: None,
            },
        });
        let encoded = encode_client_message(&msg).unwrap();
        assert_eq!(encoded[0], MessageType::CreateRoom as u8);
        assert_eq!(decode_client_message(&encoded).unwrap(), msg);
    }

    #[test]
    fn roundtrip_join_room() {
        let msg = ClientMessage::JoinRoom(JoinRoomMsg {
            protocol_version: PROTOCOL_VERSION,
            room_code: "ABCDE".into(),
            display_name: "Bob".into(),
            provider: None,
        });
        let encoded = encode_client_message(&msg).unwrap();
        assert_eq!(decode_client_message(&encoded).unwrap(), msg);
    }

    #[test]
    fn roundtrip_empty_leave_room() {
        let msg = ClientMessage::LeaveRoom(LeaveRoomMsg {});
        let encoded = encode_client_message(&msg).unwrap();
        assert_eq!(decode_client_message(&encoded).unwrap(), msg);
    }

    #[test]
    fn roundtrip_every_control_action() {
        for action in [
            ControlAction::Start,
            ControlAction::Pause,
            ControlAction::Resume,
            ControlAction::Reset,
            ControlAction::Restart,
        ] {
            let msg = ClientMessage::Control(ControlMsg { action });
            let encoded = encode_client_message(&msg).unwrap();
            assert_eq!(decode_client_message(&encoded).unwrap(), msg);
        }
    }

    #[test]
    fn roundtrip_guess_preserves_raw_text() {
        let msg = ClientMessage::Guess(GuessMsg {
            text: "  gáto! ".into(),
        });
        let encoded = encode_client_message(&msg).unwrap();
        assert_eq!(decode_client_message(&encoded).unwrap(), msg);
    }

    #[test]
    fn roundtrip_room_joined_with_live_puzzle() {
        let snapshot = playing_snapshot();
        assert_eq!(snapshot.words[0].text.as_deref(), Some("GATO"));
        assert_eq!(snapshot.words[1].text, None);
        let msg = ServerMessage::RoomJoined(Box::new(RoomJoinedMsg {
            player_id: 2,
            snapshot,
        }));
        let encoded = encode_server_message(&msg).unwrap();
        assert_eq!(decode_server_message(&encoded).unwrap(), msg);
    }

    #[test]
    fn roundtrip_new_round() {
        let msg = ServerMessage::NewRound(NewRoundMsg {
            theme: "Animals".into(),
            words: vec![PuzzleWord {
                id: 1,
                direction: Direction::Down,
                row: 3,
                col: 7,
                length: 5,
                text: None,
                revealed_by: None,
            }],
            time_left: 120,
            round: 4,
        });
        let encoded = encode_server_message(&msg).unwrap();
        assert_eq!(decode_server_message(&encoded).unwrap(), msg);
    }

    #[test]
    fn roundtrip_word_revealed() {
        let msg = ServerMessage::WordRevealed(WordRevealedMsg {
            index: 2,
            word: PuzzleWord {
                id: 3,
                direction: Direction::Across,
                row: 0,
                col: 0,
                length: 4,
                text: Some("GATO".into()),
                revealed_by: Some(7),
            },
            revealer: 7,
            scores: vec![score(7, 3), score(8, 1)],
            last_hit: LastHit {
                player_id: 7,
                display_name: "P7".into(),
                word: "GATO".into(),
                word_id: 3,
            },
        });
        let encoded = encode_server_message(&msg).unwrap();
        assert_eq!(decode_server_message(&encoded).unwrap(), msg);
    }

    #[test]
    fn roundtrip_settings_updated() {
        let msg = ServerMessage::SettingsUpdated(SettingsUpdatedMsg {
            settings: RoomSettings {
                end_condition: EndCondition::Rounds(3),
                ..RoomSettings::default()
            },
            max_participants: 25,
        });
        let encoded = encode_server_message(&msg).unwrap();
        assert_eq!(decode_server_message(&encoded).unwrap(), msg);
    }

    #[test]
    fn roundtrip_guess_result_miss() {
        let msg = ServerMessage::GuessResult(GuessResultMsg {
            hit: false,
            word: None,
            index: None,
        });
        let encoded = encode_server_message(&msg).unwrap();
        assert_eq!(decode_server_message(&encoded).unwrap(), msg);
    }

    #[test]
    fn decode_empty_message_fails() {
        assert!(matches!(
            decode_message_type(&[]),
            Err(ProtocolError::EmptyMessage)
        ));
    }

    #[test]
    fn decode_unknown_type_fails() {
        assert!(matches!(
            decode_message_type(&[0xFF]),
            Err(ProtocolError::UnknownMessageType(0xFF))
        ));
    }

    #[test]
    fn decode_client_msg_with_server_type_fails() {
        let msg = ServerMessage::Tick(TickMsg { time_left: 5 });
        let encoded = encode_server_message(&msg).unwrap();
        assert!(decode_client_message(&encoded).is_err());
    }

    #[test]
    fn decode_server_msg_with_client_type_fails() {
        let msg = ClientMessage::Guess(GuessMsg { text: "x".into() });
        let encoded = encode_client_message(&msg).unwrap();
        assert!(decode_server_message(&encoded).is_err());
    }

    #[test]
    fn truncated_payload_fails() {
        let msg = ClientMessage::Guess(GuessMsg {
            text: "PERRO".into(),
        });
        let encoded = encode_client_message(&msg).unwrap();
        let result = decode_client_message(&encoded[..encoded.len() - 2]);
        assert!(matches!(result, Err(ProtocolError::DeserializeError(_))));
    }

    #[test]
    fn oversized_payload_rejected() {
        let msg = ServerMessage::Error(ErrorMsg {
            message: "x".repeat(MAX_MESSAGE_SIZE),
        });
        assert!(matches!(
            encode_server_message(&msg),
            Err(ProtocolError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn level_complete_and_ended_roundtrip() {
        let scores = vec![score(1, 4), score(2, 2)];
        for msg in [
            ServerMessage::LevelComplete(LevelCompleteMsg {
                round: 2,
                scores: scores.clone(),
            }),
            ServerMessage::Ended(EndedMsg {
                final_scores: scores.clone(),
            }),
        ] {
            let encoded = encode_server_message(&msg).unwrap();
            assert_eq!(decode_server_message(&encoded).unwrap(), msg);
        }
    }
}
