use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// Where the snapshot lives
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub key: Option<String>,
}

impl StorageConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(".bookmycare"))
    }

    pub fn key(&self) -> &str {
        self.key.as_deref().unwrap_or(crate::store::DEFAULT_KEY)
    }
}

/// Appointment queue rules
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct QueueConfig {
    #[serde(default)]
    pub capacity: Option<usize>,
    #[serde(default)]
    pub minutes_per_patient: Option<u32>,
}

impl QueueConfig {
    pub fn capacity(&self) -> usize {
        self.capacity.unwrap_or(20)
    }

    pub fn minutes_per_patient(&self) -> u32 {
        self.minutes_per_patient.unwrap_or(15)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct MedicineConfig {
    #[serde(default)]
    pub verification_delay_ms: Option<u64>,
}

impl MedicineConfig {
    pub fn verification_delay_ms(&self) -> u64 {
        self.verification_delay_ms.unwrap_or(5_000)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub min_password_len: Option<usize>,
}

impl AuthConfig {
    pub fn min_password_len(&self) -> usize {
        self.min_password_len.unwrap_or(6)
    }
}

/// Inclusive donor age bounds
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DonorConfig {
    #[serde(default)]
    pub min_age: Option<u8>,
    #[serde(default)]
    pub max_age: Option<u8>,
}

impl DonorConfig {
    pub fn min_age(&self) -> u8 {
        self.min_age.unwrap_or(18)
    }

    pub fn max_age(&self) -> u8 {
        self.max_age.unwrap_or(65)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub medicine: MedicineConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub donor: DonorConfig,
}

impl Config {
    /// Load configuration from default paths
    /// Priority: local (.bookmycare/config.local.toml) > project (.bookmycare/config.toml) > user (~/.bookmycare/config.toml)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".bookmycare").join("config.toml");
            if user_config.exists() {
                config.merge(Self::load_from(&user_config)?);
            }
        }

        let project_config = Path::new(".bookmycare").join("config.toml");
        if project_config.exists() {
            config.merge(Self::load_from(&project_config)?);
        }

        // Should be gitignored
        let local_config = Path::new(".bookmycare").join("config.local.toml");
        if local_config.exists() {
            config.merge(Self::load_from(&local_config)?);
        }

        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge another config into this one (other takes priority)
    pub fn merge(&mut self, other: Config) {
        if other.storage.data_dir.is_some() {
            self.storage.data_dir = other.storage.data_dir;
        }
        if other.storage.key.is_some() {
            self.storage.key = other.storage.key;
        }
        if other.queue.capacity.is_some() {
            self.queue.capacity = other.queue.capacity;
        }
        if other.queue.minutes_per_patient.is_some() {
            self.queue.minutes_per_patient = other.queue.minutes_per_patient;
        }
        if other.medicine.verification_delay_ms.is_some() {
            self.medicine.verification_delay_ms = other.medicine.verification_delay_ms;
        }
        if other.auth.min_password_len.is_some() {
            self.auth.min_password_len = other.auth.min_password_len;
        }
        if other.donor.min_age.is_some() {
            self.donor.min_age = other.donor.min_age;
        }
        if other.donor.max_age.is_some() {
            self.donor.max_age = other.donor.max_age;
        }
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.queue.capacity() == 0 {
            errors.push(ValidationError {
                field: "queue.capacity".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.donor.min_age() > self.donor.max_age() {
            errors.push(ValidationError {
                field: "donor.min_age".to_string(),
                message: format!(
                    "Must not exceed donor.max_age ({} > {})",
                    self.donor.min_age(),
                    self.donor.max_age()
                ),
            });
        }

        if self.auth.min_password_len() == 0 {
            errors.push(ValidationError {
                field: "auth.min_password_len".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if let Some(key) = &self.storage.key {
            let valid = !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                errors.push(ValidationError {
                    field: "storage.key".to_string(),
                    message: format!(
                        "Invalid key '{}', use letters, digits, '_' or '-'",
                        key
                    ),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
