//! Configuration management for paperseal

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Largest file the validator accepts: 10 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default passphrase length in characters
pub const DEFAULT_PASSPHRASE_LENGTH: usize = 24;

/// Shortest passphrase the configuration will accept
pub const MIN_PASSPHRASE_LENGTH: usize = 16;

/// Longest passphrase the generator will produce
pub const MAX_PASSPHRASE_LENGTH: usize = 1024;

/// Argon2 ceilings. Envelopes above these are refused before any key
/// derivation work starts.
pub const MAX_KDF_MEMORY_KIB: u32 = 1024 * 1024;
pub const MAX_KDF_ITERATIONS: u32 = 16;
pub const MAX_KDF_PARALLELISM: u32 = 16;

/// Smallest alphabet the configuration will accept
pub const MIN_ALPHABET_SIZE: usize = 16;

/// ASCII letters and digits without the look-alikes `0 O o 1 l I`
pub const DEFAULT_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnpqrstuvwxyz23456789";

/// Seconds the success state stays visible before the session resets
pub const DEFAULT_SUCCESS_DISPLAY_SECS: u64 = 5;

/// Default document store timeout (seconds)
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Key derivation parameters
    #[serde(default)]
    pub encryption: EncryptionConfig,

    /// Passphrase generation
    #[serde(default)]
    pub passphrase: PassphraseConfig,

    /// Upload session behaviour
    #[serde(default)]
    pub upload: UploadConfig,

    /// Local document store
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Argon2id work factor
///
/// Recorded in every envelope, so changing it never breaks documents that
/// were sealed earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Argon2 memory cost in KiB
    pub argon2_memory_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_iterations: u32,

    /// Argon2 parallelism
    pub argon2_parallelism: u32,
}

/// Passphrase generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassphraseConfig {
    /// Number of characters
    pub length: usize,

    /// Characters to draw from
    pub alphabet: String,
}

/// Upload session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum accepted file size in bytes
    pub max_file_size: u64,

    /// How long the success state is shown before resetting to idle
    pub success_display_secs: u64,
}

/// Directory-backed document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding sealed documents
    pub directory: PathBuf,

    /// Per-operation timeout in seconds
    pub timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path
    pub file: Option<PathBuf>,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        EncryptionConfig {
            argon2_memory_kib: 65536, // 64 MiB
            argon2_iterations: 3,
            argon2_parallelism: 4,
        }
    }
}

impl Default for PassphraseConfig {
    fn default() -> Self {
        PassphraseConfig {
            length: DEFAULT_PASSPHRASE_LENGTH,
            alphabet: DEFAULT_ALPHABET.to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            success_display_secs: DEFAULT_SUCCESS_DISPLAY_SECS,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let directory = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("paperseal")
            .join("documents");

        StoreConfig {
            directory,
            timeout_secs: DEFAULT_STORE_TIMEOUT_SECS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl EncryptionConfig {
    /// Validate against Argon2's own floors and the crate's ceilings
    pub fn validate(&self) -> Result<()> {
        if self.argon2_iterations == 0 {
            return Err(Error::InvalidConfig(
                "Argon2 iterations must be greater than 0".to_string(),
            ));
        }

        if self.argon2_parallelism == 0 {
            return Err(Error::InvalidConfig(
                "Argon2 parallelism must be greater than 0".to_string(),
            ));
        }

        let min_memory = self.argon2_parallelism.saturating_mul(8);
        if self.argon2_memory_kib < min_memory {
            return Err(Error::InvalidConfig(format!(
                "Argon2 memory must be at least {} KiB for parallelism {}",
                min_memory,
                self.argon2_parallelism
            )));
        }

        if self.argon2_memory_kib > MAX_KDF_MEMORY_KIB
            || self.argon2_iterations > MAX_KDF_ITERATIONS
            || self.argon2_parallelism > MAX_KDF_PARALLELISM
        {
            return Err(Error::InvalidConfig(format!(
                "Argon2 parameters exceed {} KiB / {} iterations / {} lanes",
                MAX_KDF_MEMORY_KIB, MAX_KDF_ITERATIONS, MAX_KDF_PARALLELISM
            )));
        }

        Ok(())
    }
}

impl PassphraseConfig {
    /// Validate length and alphabet
    pub fn validate(&self) -> Result<()> {
        if !(MIN_PASSPHRASE_LENGTH..=MAX_PASSPHRASE_LENGTH).contains(&self.length) {
            return Err(Error::InvalidConfig(format!(
                "Passphrase length must be between {} and {}",
                MIN_PASSPHRASE_LENGTH, MAX_PASSPHRASE_LENGTH
            )));
        }

        if let Some(c) = self
            .alphabet
            .chars()
            .find(|c| c.is_whitespace() || c.is_control())
        {
            return Err(Error::InvalidConfig(format!(
                "Passphrase alphabet contains a non-printable character: {:?}",
                c
            )));
        }

        let distinct: HashSet<char> = self.alphabet.chars().collect();
        if distinct.len() < MIN_ALPHABET_SIZE {
            return Err(Error::InvalidConfig(format!(
                "Passphrase alphabet needs at least {} distinct characters",
                MIN_ALPHABET_SIZE
            )));
        }

        Ok(())
    }
}

impl Config {
    /// Load configuration from a file (YAML or JSON), with environment variable
    /// substitution and overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref).map_err(|e| {
            Error::Config(format!("Failed to read config file: {}", e))
        })?;

        let content = Self::substitute_env_vars(&content)?;

        let mut config: Config = if is_yaml(path_ref) {
            serde_yaml::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse YAML config: {}", e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse JSON config: {}", e))
            })?
        };

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            let mut config = Config::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }

    /// Substitute `${VAR_NAME}` references with environment values
    fn substitute_env_vars(content: &str) -> Result<String> {
        let mut result = content.to_string();

        let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| Error::Internal(format!("Invalid substitution pattern: {}", e)))?;

        for cap in re.captures_iter(content) {
            let full_match = &cap[0];
            let var_name = &cap[1];

            if let Ok(value) = std::env::var(var_name) {
                result = result.replace(full_match, &value);
            }
        }

        Ok(result)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Some(kib) = env_parse::<u32>("PAPERSEAL_KDF_MEMORY_KIB") {
            self.encryption.argon2_memory_kib = kib;
        }

        if let Some(iterations) = env_parse::<u32>("PAPERSEAL_KDF_ITERATIONS") {
            self.encryption.argon2_iterations = iterations;
        }

        if let Some(lanes) = env_parse::<u32>("PAPERSEAL_KDF_PARALLELISM") {
            self.encryption.argon2_parallelism = lanes;
        }

        if let Some(length) = env_parse::<usize>("PAPERSEAL_PASSPHRASE_LENGTH") {
            self.passphrase.length = length;
        }

        if let Ok(dir) = std::env::var("PAPERSEAL_STORE_DIR") {
            let dir = dir.trim();
            if !dir.is_empty() {
                self.store.directory = PathBuf::from(dir);
            }
        }

        if let Ok(level) = std::env::var("PAPERSEAL_LOG_LEVEL") {
            let level = level.trim().to_string();
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Save configuration to a file (format determined by extension)
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        let content = if is_yaml(path_ref) {
            serde_yaml::to_string(self).map_err(|e| {
                Error::Config(format!("Failed to serialize config to YAML: {}", e))
            })?
        } else {
            serde_json::to_string_pretty(self).map_err(|e| {
                Error::Config(format!("Failed to serialize config to JSON: {}", e))
            })?
        };

        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path_ref, content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.encryption.validate()?;
        self.passphrase.validate()?;

        if self.upload.max_file_size == 0 {
            return Err(Error::InvalidConfig(
                "Maximum file size must be greater than 0".to_string(),
            ));
        }

        if self.store.timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "Store timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.store.directory)?;
        Ok(())
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
