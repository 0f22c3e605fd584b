use crate::defaults;
use crate::error::{Result, ScribeError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub generation: GenerationConfig,
    pub history: HistoryConfig,
    pub identity: IdentityConfig,
    pub settings: GlobalSettings,
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the buckets. Defaults to `~/.local/share/scribe/storage`.
    pub root: Option<PathBuf>,
    pub bucket: String,
    /// How audio reaches the generation service.
    pub audio_delivery: AudioDelivery,
}

/// How the transcription stage hands the audio to the model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AudioDelivery {
    /// Base64-encode the file into the request.
    #[default]
    Inline,
    /// Pass a signed download URL of the uploaded object.
    SignedUrl,
}

/// Text-generation service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Model used when a job does not name one.
    pub model: String,
}

/// History store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct HistoryConfig {
    /// Directory holding `users/<id>/history`. Defaults to `~/.local/share/scribe/history`.
    pub root: Option<PathBuf>,
}

/// Identity configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct IdentityConfig {
    /// Fixed user id. When unset an anonymous id is created on first use.
    pub user_id: Option<String>,
}

/// User settings applied to every job.
///
/// Read once when a job starts; the job keeps its own copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GlobalSettings {
    /// Prefixed to the instructions of every job.
    pub standard_instructions: String,
    pub review: ReviewSettings,
    pub advanced: AdvancedSettings,
}

/// Options merged into every review call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReviewSettings {
    pub correct_spelling: bool,
    pub analyze_diarization: bool,
    pub custom_review_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AdvancedSettings {
    pub disable_file_size_limit: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            bucket: defaults::DEFAULT_BUCKET.to_string(),
            audio_delivery: AudioDelivery::Inline,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: defaults::GEMINI_API_BASE.to_string(),
            model: defaults::DEFAULT_MODEL.to_string(),
        }
    }
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            correct_spelling: true,
            analyze_diarization: false,
            custom_review_prompt: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ScribeError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ScribeError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist.
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(ScribeError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Write the configuration as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self).map_err(|e| ScribeError::ConfigParse {
            message: e.to_string(),
        })?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - SCRIBE_STORAGE_ROOT → storage.root
    /// - SCRIBE_HISTORY_ROOT → history.root
    /// - SCRIBE_USER_ID → identity.user_id
    /// - SCRIBE_MODEL → generation.model
    /// - GEMINI_API_KEY → generation.api_key
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(root) = std::env::var("SCRIBE_STORAGE_ROOT")
            && !root.is_empty()
        {
            self.storage.root = Some(PathBuf::from(root));
        }

        if let Ok(root) = std::env::var("SCRIBE_HISTORY_ROOT")
            && !root.is_empty()
        {
            self.history.root = Some(PathBuf::from(root));
        }

        if let Ok(user_id) = std::env::var("SCRIBE_USER_ID")
            && !user_id.is_empty()
        {
            self.identity.user_id = Some(user_id);
        }

        if let Ok(model) = std::env::var("SCRIBE_MODEL")
            && !model.is_empty()
        {
            self.generation.model = model;
        }

        if let Ok(key) = std::env::var("GEMINI_API_KEY")
            && !key.is_empty()
        {
            self.generation.api_key = Some(key);
        }

        self
    }

    /// Check that every value the pipeline needs is present.
    ///
    /// Called once at startup so a misconfigured install fails before any job runs.
    pub fn validate(&self) -> Result<()> {
        if self.storage.bucket.trim().is_empty() {
            return Err(invalid("storage.bucket", "must not be empty"));
        }
        if self.storage.bucket.contains(['/', '\\']) || self.storage.bucket.starts_with('.') {
            return Err(invalid(
                "storage.bucket",
                "must be a plain name without path separators",
            ));
        }
        if self.generation.model.trim().is_empty() {
            return Err(invalid("generation.model", "must not be empty"));
        }
        if !self.generation.base_url.starts_with("http://")
            && !self.generation.base_url.starts_with("https://")
        {
            return Err(invalid("generation.base_url", "must be an http(s) URL"));
        }
        if self.storage.audio_delivery == AudioDelivery::SignedUrl
            && !is_loopback_url(&self.generation.base_url)
        {
            return Err(invalid(
                "storage.audio_delivery",
                "\"signed-url\" hands the model file:// URLs of the local store. \
                 Use \"inline\" or point generation.base_url at a server on this machine",
            ));
        }
        match self.generation.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {}
            _ => {
                return Err(invalid(
                    "generation.api_key",
                    "not configured. Set GEMINI_API_KEY or add api_key to [generation]",
                ));
            }
        }
        Ok(())
    }

    /// Directory of the local object store.
    pub fn storage_root(&self) -> PathBuf {
        self.storage
            .root
            .clone()
            .unwrap_or_else(|| data_dir().join("storage"))
    }

    /// Directory of the local history store.
    pub fn history_root(&self) -> PathBuf {
        self.history
            .root
            .clone()
            .unwrap_or_else(|| data_dir().join("history"))
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/scribe/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(defaults::APP_DIR)
            .join("config.toml")
    }
}

/// Per-user data directory (`~/.local/share/scribe` on Linux).
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join(defaults::APP_DIR)
}

fn is_loopback_url(base_url: &str) -> bool {
    let Ok(url) = url::Url::parse(base_url) else {
        return false;
    };
    match url.host() {
        Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

fn invalid(key: &str, message: &str) -> ScribeError {
    ScribeError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
