use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use serde::Deserialize;

use crate::config::VocabularyConfig;

/// Levels compiled into the binary, used when nothing else is configured.
const BUILTIN_LEVELS: &str = include_str!("../levels/builtin.toml");

/// Theme label plus raw candidate words for one round.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Level {
    pub theme: String,
    pub words: Vec<String>,
}

#[derive(Debug)]
pub enum VocabularyError {
    Request(String),
    Status(u16),
    Decode(String),
    Io(String),
    Parse(String),
    NoLevels(String),
}

impl std::fmt::Display for VocabularyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(e) => write!(f, "vocabulary request failed: {e}"),
            Self::Status(code) => write!(f, "vocabulary endpoint returned HTTP {code}"),
            Self::Decode(e) => write!(f, "invalid vocabulary response: {e}"),
            Self::Io(e) => write!(f, "cannot read word list: {e}"),
            Self::Parse(e) => write!(f, "invalid word list: {e}"),
            Self::NoLevels(lang) => write!(f, "no levels for language {lang:?}"),
        }
    }
}

impl std::error::Error for VocabularyError {}

/// Supplies a theme and word list for a language. Slow and fallible; the
/// round controller retries on failure.
#[async_trait]
pub trait VocabularySource: Send + Sync {
    async fn get_level(&self, language: &str) -> Result<Level, VocabularyError>;
}

pub type SharedVocabulary = Arc<dyn VocabularySource>;

/// Build the configured vocabulary source.
pub fn from_config(config: &VocabularyConfig) -> Result<SharedVocabulary, VocabularyError> {
    if let Some(endpoint) = &config.endpoint {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        tracing::info!(%endpoint, "Using HTTP vocabulary source");
        return Ok(Arc::new(HttpVocabularySource::new(endpoint.clone(), timeout)?));
    }
    let source = match &config.word_list_path {
        Some(path) => {
            tracing::info!(%path, "Using word list file");
            StaticVocabularySource::load(path)?
        },
        None => StaticVocabularySource::builtin()?,
    };
    Ok(Arc::new(source))
}

/// Fetches levels from `GET {endpoint}?lang={tag}` returning
/// `{"theme": "...", "words": [...]}`.
pub struct HttpVocabularySource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpVocabularySource {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, VocabularyError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("crossplay-server/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| VocabularyError::Request(e.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl VocabularySource for HttpVocabularySource {
    async fn get_level(&self, language: &str) -> Result<Level, VocabularyError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("lang", language)])
            .send()
            .await
            .map_err(|e| VocabularyError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(VocabularyError::Status(status.as_u16()));
        }

        resp.json::<Level>()
            .await
            .map_err(|e| VocabularyError::Decode(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct LevelFile {
    levels: Vec<StaticLevel>,
}

#[derive(Debug, Clone, Deserialize)]
struct StaticLevel {
    language: String,
    theme: String,
    words: Vec<String>,
}

/// Themed word lists held in memory; one is picked at random per request.
#[derive(Debug, Clone)]
pub struct StaticVocabularySource {
    levels: Vec<StaticLevel>,
}

impl StaticVocabularySource {
    /// Parse a TOML document of `[[levels]]` tables.
    pub fn from_toml_str(content: &str) -> Result<Self, VocabularyError> {
        let file: LevelFile =
            toml::from_str(content).map_err(|e| VocabularyError::Parse(e.to_string()))?;
        if file.levels.is_empty() {
            return Err(VocabularyError::Parse("no [[levels]] defined".to_string()));
        }
        Ok(Self {
            levels: file.levels,
        })
    }

    pub fn load(path: &str) -> Result<Self, VocabularyError> {
        let content = std::fs::read_to_string(path).map_err(|e| VocabularyError::Io(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    pub fn builtin() -> Result<Self, VocabularyError> {
        Self::from_toml_str(BUILTIN_LEVELS)
    }

    pub fn languages(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = self.levels.iter().map(|l| l.language.as_str()).collect();
        langs.sort_unstable();
        langs.dedup();
        langs
    }

    fn pick(&self, language: &str) -> Result<Level, VocabularyError> {
        let matching: Vec<&StaticLevel> = self
            .levels
            .iter()
            .filter(|l| l.language.eq_ignore_ascii_case(language))
            .collect();
        let level = matching
            .choose(&mut rand::rng())
            .ok_or_else(|| VocabularyError::NoLevels(language.to_string()))?;
        Ok(Level {
            theme: level.theme.clone(),
            words: level.words.clone(),
        })
    }
}

#[async_trait]
impl VocabularySource for StaticVocabularySource {
    async fn get_level(&self, language: &str) -> Result<Level, VocabularyError> {
        self.pick(language)
    }
}

#[cfg(test)]
mod tests {
    use crossplay_core::layout::{LayoutConfig, prepare_candidates};

    use super::*;

    const LEVELS: &str = r#"
[[levels]]
language = "en"
theme = "Fruit"
words = ["apple", "banana", "cherry"]

[[levels]]
language = "es"
theme = "Frutas"
words = ["manzana", "plátano"]
"#;

    #[tokio::test]
    async fn picks_level_for_language() {
        let source = StaticVocabularySource::from_toml_str(LEVELS).unwrap();
        let level = source.get_level("es").await.unwrap();
        assert_eq!(level.theme, "Frutas");
        assert_eq!(level.words.len(), 2);
        let level = source.get_level("EN").await.unwrap();
        assert_eq!(level.theme, "Fruit");
    }

    #[tokio::test]
    async fn unknown_language_is_an_error() {
        let source = StaticVocabularySource::from_toml_str(LEVELS).unwrap();
        let err = source.get_level("fr").await.unwrap_err();
        assert!(matches!(err, VocabularyError::NoLevels(ref l) if l == "fr"));
    }

    #[test]
    fn empty_file_rejected() {
        assert!(matches!(
            StaticVocabularySource::from_toml_str("levels = []"),
            Err(VocabularyError::Parse(_))
        ));
        assert!(StaticVocabularySource::from_toml_str("not toml [").is_err());
    }

    #[test]
    fn builtin_levels_are_playable() {
        let source = StaticVocabularySource::builtin().unwrap();
        assert!(source.languages().contains(&"en"));
        assert!(source.languages().contains(&"es"));
        let config = LayoutConfig::default();
        for level in &source.levels {
            let candidates = prepare_candidates(&level.words, &config);
            assert!(
                candidates.len() >= 20,
                "{} ({}) has only {} usable words",
                level.theme,
                level.language,
                candidates.len()
            );
        }
    }

    #[test]
    fn missing_word_list_file() {
        assert!(matches!(
            StaticVocabularySource::load("/nonexistent/levels.toml"),
            Err(VocabularyError::Io(_))
        ));
    }

    #[test]
    fn default_config_uses_builtin() {
        assert!(from_config(&VocabularyConfig::default()).is_ok());
    }
}
