use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crossplay_core::layout::LayoutConfig;
use crossplay_core::room::{EndCondition, RoomSettings, SettingsBounds};

/// Default config file, overridable with `CROSSPLAY_CONFIG`.
pub const DEFAULT_CONFIG_PATH: &str = "crossplay.toml";

/// Top-level server configuration, loaded from `crossplay.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub limits: LimitsConfig,
    pub rooms: RoomsConfig,
    pub game: GameConfig,
    pub vocabulary: VocabularyConfig,
    pub entitlements: EntitlementsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            limits: LimitsConfig::default(),
            rooms: RoomsConfig::default(),
            game: GameConfig::default(),
            vocabulary: VocabularyConfig::default(),
            entitlements: EntitlementsConfig::default(),
        }
    }
}

/// Infrastructure limits (connection caps, buffer sizes, rate limits).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_ws_connections: usize,
    /// Maximum concurrent WebSocket connections per IP address.
    pub max_ws_per_ip: usize,
    pub ws_rate_limit_per_sec: f64,
    pub player_message_buffer: usize,
    /// Inbound frames above this size are dropped.
    pub max_message_size: usize,
    /// Room-info endpoint: max burst tokens per IP.
    pub api_rate_limit_burst: usize,
    /// Room-info endpoint: token refill rate (requests per second) per IP.
    pub api_rate_limit_per_sec: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ws_connections: 500,
            max_ws_per_ip: 20,
            ws_rate_limit_per_sec: 20.0,
            player_message_buffer: 256,
            max_message_size: 4 * 1024,
            api_rate_limit_burst: 20,
            api_rate_limit_per_sec: 2.0,
        }
    }
}

/// Room lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    pub idle_timeout_secs: u64,
    pub idle_check_interval_secs: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 3600,
            idle_check_interval_secs: 60,
        }
    }
}

/// Puzzle generation and round timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub grid_rows: usize,
    pub grid_cols: usize,
    pub max_words: usize,
    pub target_words: usize,
    pub min_words: usize,
    pub attempts: usize,
    pub retry_passes: usize,
    pub top_k: usize,
    pub default_round_secs: u32,
    pub min_round_secs: u32,
    pub max_round_secs: u32,
    /// Delay before retrying a failed vocabulary fetch or layout.
    pub generation_retry_ms: u64,
    /// Pause between a fully solved puzzle and the next round.
    pub level_complete_delay_ms: u64,
    pub default_language: String,
    pub default_end_condition: EndCondition,
}

impl Default for GameConfig {
    fn default() -> Self {
        let layout = LayoutConfig::default();
        let bounds = SettingsBounds::default();
        Self {
            grid_rows: layout.rows,
            grid_cols: layout.cols,
            max_words: layout.max_words,
            target_words: layout.target_words,
            min_words: layout.min_words,
            attempts: layout.attempts,
            retry_passes: layout.retry_passes,
            top_k: layout.top_k,
            default_round_secs: 120,
            min_round_secs: bounds.min_round_secs,
            max_round_secs: bounds.max_round_secs,
            generation_retry_ms: 2000,
            level_complete_delay_ms: 3000,
            default_language: "en".to_string(),
            default_end_condition: EndCondition::Infinite,
        }
    }
}

impl GameConfig {
    pub fn layout(&self) -> LayoutConfig {
        LayoutConfig {
            rows: self.grid_rows,
            cols: self.grid_cols,
            max_words: self.max_words,
            target_words: self.target_words,
            min_words: self.min_words,
            attempts: self.attempts,
            retry_passes: self.retry_passes,
            top_k: self.top_k,
        }
    }

    pub fn bounds(&self) -> SettingsBounds {
        SettingsBounds {
            min_round_secs: self.min_round_secs,
            max_round_secs: self.max_round_secs,
        }
    }

    /// Settings a new room starts with.
    pub fn default_settings(&self) -> RoomSettings {
        RoomSettings {
            language: self.default_language.clone(),
            round_duration_secs: self.default_round_secs,
            end_condition: self.default_end_condition,
        }
    }

    pub fn generation_retry(&self) -> Duration {
        Duration::from_millis(self.generation_retry_ms)
    }

    pub fn level_complete_delay(&self) -> Duration {
        Duration::from_millis(self.level_complete_delay_ms)
    }
}

/// Where round vocabulary comes from. With no endpoint, levels are read from
/// `word_list_path`, or from the built-in list when that is unset too.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VocabularyConfig {
    pub endpoint: Option<String>,
    pub request_timeout_secs: u64,
    pub word_list_path: Option<String>,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_secs: 10,
            word_list_path: None,
        }
    }
}

/// Participant ceilings granted to room owners.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EntitlementsConfig {
    pub default_max_participants: usize,
    /// Ceiling per sign-in provider tag, overriding the default.
    pub providers: HashMap<String, usize>,
}

impl Default for EntitlementsConfig {
    fn default() -> Self {
        Self {
            default_max_participants: 50,
            providers: HashMap::new(),
        }
    }
}

impl ServerConfig {
    /// Check the configuration for values the server cannot run with.
    pub fn check(&self) -> Result<(), String> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "listen_addr {:?} is not a valid socket address",
                self.listen_addr
            ));
        }

        if self.limits.max_ws_connections == 0 {
            return Err("limits.max_ws_connections must be > 0".to_string());
        }
        if self.limits.max_ws_per_ip == 0 {
            return Err("limits.max_ws_per_ip must be > 0".to_string());
        }
        if self.limits.ws_rate_limit_per_sec <= 0.0 {
            return Err("limits.ws_rate_limit_per_sec must be > 0".to_string());
        }
        if self.limits.player_message_buffer == 0 {
            return Err("limits.player_message_buffer must be > 0".to_string());
        }
        if self.limits.max_message_size == 0 {
            return Err("limits.max_message_size must be > 0".to_string());
        }

        if self.rooms.idle_timeout_secs == 0 {
            return Err("rooms.idle_timeout_secs must be > 0".to_string());
        }
        if self.rooms.idle_check_interval_secs == 0 {
            return Err("rooms.idle_check_interval_secs must be > 0".to_string());
        }

        let game = &self.game;
        if game.grid_rows < 3 || game.grid_cols < 3 {
            return Err("game grid must be at least 3x3".to_string());
        }
        if game.min_words == 0 || game.min_words > game.max_words {
            return Err("game.min_words must be between 1 and game.max_words".to_string());
        }
        if game.attempts == 0 || game.top_k == 0 {
            return Err("game.attempts and game.top_k must be > 0".to_string());
        }
        if game.min_round_secs == 0 || game.min_round_secs > game.max_round_secs {
            return Err("game.min_round_secs must be between 1 and game.max_round_secs".to_string());
        }
        if !game.bounds().duration_in_range(game.default_round_secs) {
            return Err(format!(
                "game.default_round_secs {} is outside {}..={}",
                game.default_round_secs, game.min_round_secs, game.max_round_secs
            ));
        }
        if matches!(
            game.default_end_condition,
            EndCondition::Rounds(0) | EndCondition::Score(0)
        ) {
            return Err("game.default_end_condition target must be >= 1".to_string());
        }

        if self.vocabulary.endpoint.is_some() && self.vocabulary.request_timeout_secs == 0 {
            return Err("vocabulary.request_timeout_secs must be > 0".to_string());
        }
        if self.entitlements.default_max_participants == 0
            || self.entitlements.providers.values().any(|&n| n == 0)
        {
            return Err("entitlement ceilings must be > 0".to_string());
        }
        Ok(())
    }

    /// Validate configuration, exiting on fatal problems.
    pub fn validate(&self) {
        if let Err(problem) = self.check() {
            tracing::error!(%problem, "Invalid configuration");
            std::process::exit(1);
        }
        if self.game.target_words > self.game.max_words {
            tracing::warn!(
                target = self.game.target_words,
                max = self.game.max_words,
                "game.target_words exceeds game.max_words; search always runs every attempt"
            );
        }
    }

    /// Load config from `crossplay.toml` (or `$CROSSPLAY_CONFIG`) if it exists,
    /// then apply env var overrides.
    pub fn load() -> Self {
        let path =
            std::env::var("CROSSPLAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!(%path, "Loaded configuration");
                    cfg
                },
                Err(e) => {
                    tracing::warn!(%path, "Failed to parse config: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!(%path, "No config file found, using defaults");
                ServerConfig::default()
            },
        };
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("CROSSPLAY_LISTEN_ADDR")
            && !addr.is_empty()
        {
            self.listen_addr = addr;
        }
        if let Ok(val) = std::env::var("CROSSPLAY_MAX_WS_CONNECTIONS")
            && let Ok(n) = val.parse::<usize>()
        {
            self.limits.max_ws_connections = n;
        }
        if let Ok(val) = std::env::var("CROSSPLAY_WS_RATE_LIMIT")
            && let Ok(n) = val.parse::<f64>()
        {
            self.limits.ws_rate_limit_per_sec = n;
        }
        if let Ok(val) = std::env::var("CROSSPLAY_IDLE_TIMEOUT_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            self.rooms.idle_timeout_secs = n;
        }
        if let Ok(lang) = std::env::var("CROSSPLAY_DEFAULT_LANGUAGE")
            && !lang.is_empty()
        {
            self.game.default_language = lang;
        }
        if let Ok(endpoint) = std::env::var("CROSSPLAY_VOCABULARY_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.vocabulary.endpoint = Some(endpoint);
        }
        if let Ok(path) = std::env::var("CROSSPLAY_WORD_LIST")
            && !path.is_empty()
        {
            self.vocabulary.word_list_path = Some(path);
        }
        if let Ok(val) = std::env::var("CROSSPLAY_MAX_PARTICIPANTS")
            && let Ok(n) = val.parse::<usize>()
        {
            self.entitlements.default_max_participants = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert!(cfg.vocabulary.endpoint.is_none());
        assert_eq!(cfg.game.default_round_secs, 120);
        assert_eq!(cfg.game.generation_retry(), Duration::from_secs(2));
        assert_eq!(cfg.game.level_complete_delay(), Duration::from_secs(3));
        assert_eq!(cfg.entitlements.default_max_participants, 50);
    }

    #[test]
    fn default_config_passes_check() {
        assert_eq!(ServerConfig::default().check(), Ok(()));
    }

    #[test]
    fn game_defaults_match_layout_defaults() {
        let game = GameConfig::default();
        assert_eq!(game.layout(), LayoutConfig::default());
        assert_eq!(game.bounds(), SettingsBounds::default());
        assert_eq!(game.default_settings(), RoomSettings::default());
    }

    #[test]
    fn parse_minimal_toml() {
        let toml_str = r#"
listen_addr = "127.0.0.1:9090"

[vocabulary]
endpoint = "http://words.local/level"
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:9090");
        assert_eq!(
            cfg.vocabulary.endpoint.as_deref(),
            Some("http://words.local/level")
        );
        assert_eq!(cfg.vocabulary.request_timeout_secs, 10);
        assert_eq!(cfg.game.max_words, 40);
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
listen_addr = "0.0.0.0:3000"

[limits]
max_ws_connections = 100
ws_rate_limit_per_sec = 5.0

[rooms]
idle_timeout_secs = 600
idle_check_interval_secs = 30

[game]
grid_rows = 15
grid_cols = 15
max_words = 25
target_words = 20
default_round_secs = 90
default_language = "es"
default_end_condition = { Rounds = 5 }

[vocabulary]
word_list_path = "levels.toml"

[entitlements]
default_max_participants = 10

[entitlements.providers]
twitch = 200
youtube = 100
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.limits.max_ws_connections, 100);
        assert_eq!(cfg.rooms.idle_timeout_secs, 600);
        assert_eq!(cfg.game.layout().rows, 15);
        assert_eq!(cfg.game.layout().max_words, 25);
        assert_eq!(cfg.game.default_settings().language, "es");
        assert_eq!(cfg.game.default_end_condition, EndCondition::Rounds(5));
        assert_eq!(cfg.vocabulary.word_list_path.as_deref(), Some("levels.toml"));
        assert_eq!(cfg.entitlements.providers.get("twitch"), Some(&200));
        assert_eq!(cfg.check(), Ok(()));
    }

    #[test]
    fn missing_sections_use_defaults() {
        let cfg: ServerConfig = toml::from_str("listen_addr = \"0.0.0.0:8080\"").unwrap();
        assert_eq!(cfg.limits.max_ws_connections, 500);
        assert_eq!(cfg.rooms.idle_timeout_secs, 3600);
        assert_eq!(cfg.game.min_words, 5);
    }

    #[test]
    fn check_rejects_invalid_addr() {
        let cfg = ServerConfig {
            listen_addr: "not-an-address".to_string(),
            ..ServerConfig::default()
        };
        assert!(cfg.check().is_err());
    }

    #[test]
    fn check_rejects_default_duration_out_of_bounds() {
        let mut cfg = ServerConfig::default();
        cfg.game.default_round_secs = 10;
        let err = cfg.check().unwrap_err();
        assert!(err.contains("default_round_secs"), "{err}");
    }

    #[test]
    fn check_rejects_zero_end_target() {
        let mut cfg = ServerConfig::default();
        cfg.game.default_end_condition = EndCondition::Score(0);
        assert!(cfg.check().is_err());
    }

    #[test]
    fn check_rejects_zero_ceiling() {
        let mut cfg = ServerConfig::default();
        cfg.entitlements.providers.insert("twitch".into(), 0);
        assert!(cfg.check().is_err());
    }

    #[test]
    fn check_rejects_inverted_word_bounds() {
        let mut cfg = ServerConfig::default();
        cfg.game.min_words = 50;
        assert!(cfg.check().is_err());
    }
}
