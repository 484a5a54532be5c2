//! Pipeline configuration
//!
//! Everything the pipeline needs (dataset credentials, bucket, database
//! connection, staging location) comes from environment variables, optionally
//! seeded from a `.env` file. Configuration is parsed once into [`Config`] and
//! validated for the stages about to run before any network or disk I/O, so a
//! missing password fails with the variable's name instead of a connection
//! error three steps later.

use crate::error::{IngestError, Result};
use rawload_common::env::{is_placeholder, EnvReader};
use rawload_common::RawloadError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_DATASET: &str = "olistbr/brazilian-ecommerce";
pub const DEFAULT_DATASET_API_URL: &str = "https://www.kaggle.com/api/v1";
pub const DEFAULT_LOCAL_DIR: &str = "DE_Project_Data";
pub const DEFAULT_S3_PREFIX: &str = "raw/";
pub const DEFAULT_S3_REGION: &str = "us-east-2";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_FILE_SUFFIX: &str = ".csv";

/// What to do with the rest of a batch after one object fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Report the failure and keep going
    #[default]
    Continue,
    /// Stop the batch at the first failure
    AbortOnFirst,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "continue" => Ok(FailurePolicy::Continue),
            "abort" | "abort_on_first" | "fail_fast" => Ok(FailurePolicy::AbortOnFirst),
            other => Err(format!("expected 'continue' or 'abort', got '{}'", other)),
        }
    }
}

/// How rows are written into an existing raw table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Insert on top of whatever is there; reruns duplicate rows
    #[default]
    Append,
    /// Truncate and reload in one transaction; reruns are idempotent
    Truncate,
}

impl FromStr for LoadMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "append" => Ok(LoadMode::Append),
            "truncate" | "replace" => Ok(LoadMode::Truncate),
            other => Err(format!("expected 'append' or 'truncate', got '{}'", other)),
        }
    }
}

/// Dataset API settings (download stage)
#[derive(Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub api_url: String,
    /// `owner/name` slug
    pub dataset: String,
    pub username: Option<String>,
    pub key: Option<String>,
}

/// Object store settings (publish and load stages)
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub prefix: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

/// Destination database settings (load stage)
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

/// Settings shared by every stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Where the dataset is extracted and published from
    pub local_dir: PathBuf,
    /// Parent directory for the scoped staging area (system temp when unset)
    pub staging_root: Option<PathBuf>,
    pub file_suffix: String,
    pub failure_policy: FailurePolicy,
    pub load_mode: LoadMode,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            local_dir: PathBuf::from(DEFAULT_LOCAL_DIR),
            staging_root: None,
            file_suffix: DEFAULT_FILE_SUFFIX.to_string(),
            failure_policy: FailurePolicy::default(),
            load_mode: LoadMode::default(),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub pipeline: PipelineSettings,
}

impl Config {
    /// Load from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_reader(&EnvReader::process())
    }

    /// Parse every section; values are only checked for syntax here
    ///
    /// Presence of stage-specific values is checked by the `validate_*`
    /// methods so that, for example, the download stage can run without
    /// database credentials.
    pub fn from_reader(env: &EnvReader) -> Result<Self> {
        let failure_policy = env.parse_or("INGEST_FAILURE_POLICY", FailurePolicy::default())?;
        let load_mode = env.parse_or("INGEST_LOAD_MODE", LoadMode::default())?;

        Ok(Self {
            dataset: DatasetConfig {
                api_url: env.string_or("KAGGLE_API_URL", DEFAULT_DATASET_API_URL),
                dataset: env.string_or("KAGGLE_DATASET", DEFAULT_DATASET),
                username: env.string("KAGGLE_USERNAME"),
                key: env.string("KAGGLE_KEY"),
            },
            storage: StorageConfig {
                endpoint: env.string("S3_ENDPOINT"),
                region: env.string_or("S3_REGION", DEFAULT_S3_REGION),
                bucket: env.string("S3_BUCKET").unwrap_or_default(),
                // an explicitly empty prefix means the bucket root
                prefix: env
                    .value("S3_PREFIX")
                    .unwrap_or_else(|| DEFAULT_S3_PREFIX.to_string()),
                access_key: env.first_of(&["S3_ACCESS_KEY", "AWS_ACCESS_KEY_ID"]),
                secret_key: env.first_of(&["S3_SECRET_KEY", "AWS_SECRET_ACCESS_KEY"]),
                path_style: env.flag("S3_PATH_STYLE", false)?,
            },
            database: DatabaseConfig {
                host: env.string("DB_HOST").unwrap_or_default(),
                port: env.parse_or("DB_PORT", DEFAULT_DB_PORT)?,
                name: env.string("DB_NAME").unwrap_or_default(),
                user: env.string("DB_USER").unwrap_or_default(),
                password: env.string("DB_PASSWORD").unwrap_or_default(),
            },
            pipeline: PipelineSettings {
                local_dir: PathBuf::from(env.string_or("LOCAL_DATA_DIR", DEFAULT_LOCAL_DIR)),
                staging_root: env.string("STAGING_DIR").map(PathBuf::from),
                file_suffix: env.string_or("INGEST_FILE_SUFFIX", DEFAULT_FILE_SUFFIX),
                failure_policy,
                load_mode,
            },
        })
    }

    pub fn validate_download(&self) -> Result<()> {
        require("KAGGLE_API_URL", &self.dataset.api_url)?;
        require("KAGGLE_USERNAME", self.dataset.username.as_deref().unwrap_or_default())?;
        require("KAGGLE_KEY", self.dataset.key.as_deref().unwrap_or_default())?;

        let slug_ok = self
            .dataset
            .dataset
            .split_once('/')
            .is_some_and(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'));
        if !slug_ok {
            return Err(IngestError::Config(format!(
                "KAGGLE_DATASET must look like 'owner/name', got '{}'",
                self.dataset.dataset
            )));
        }

        self.validate_pipeline()
    }

    pub fn validate_publish(&self) -> Result<()> {
        self.validate_storage()?;
        self.validate_pipeline()
    }

    pub fn validate_load(&self) -> Result<()> {
        self.validate_storage()?;

        require("DB_HOST", &self.database.host)?;
        require("DB_NAME", &self.database.name)?;
        require("DB_USER", &self.database.user)?;
        require("DB_PASSWORD", &self.database.password)?;
        if self.database.port == 0 {
            return Err(IngestError::Config("DB_PORT must be greater than 0".to_string()));
        }

        self.validate_pipeline()
    }

    /// Everything the combined run needs
    pub fn validate(&self) -> Result<()> {
        self.validate_download()?;
        self.validate_publish()?;
        self.validate_load()
    }

    fn validate_storage(&self) -> Result<()> {
        require("S3_BUCKET", &self.storage.bucket)?;
        require("S3_REGION", &self.storage.region)?;

        match (&self.storage.access_key, &self.storage.secret_key) {
            (Some(_), None) | (None, Some(_)) => Err(IngestError::Config(
                "S3 access key and secret key must be set together".to_string(),
            )),
            (Some(access), Some(secret)) => {
                require("S3_ACCESS_KEY", access)?;
                require("S3_SECRET_KEY", secret)
            },
            (None, None) => Ok(()),
        }
    }

    fn validate_pipeline(&self) -> Result<()> {
        if self.pipeline.file_suffix.is_empty() {
            return Err(IngestError::Config(
                "INGEST_FILE_SUFFIX cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RawloadError::MissingVar {
            name: name.to_string(),
        }
        .into());
    }
    if is_placeholder(value) {
        return Err(
            RawloadError::invalid_var(name, value, "placeholder value, set a real one").into(),
        );
    }
    Ok(())
}

const REDACTED: &str = "***";

fn redact(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| REDACTED)
}

impl fmt::Debug for DatasetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetConfig")
            .field("api_url", &self.api_url)
            .field("dataset", &self.dataset)
            .field("username", &self.username)
            .field("key", &redact(&self.key))
            .finish()
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("access_key", &self.access_key)
            .field("secret_key", &redact(&self.secret_key))
            .field("path_style", &self.path_style)
            .finish()
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &REDACTED)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("KAGGLE_USERNAME", "analyst"),
            ("KAGGLE_KEY", "kaggle-secret"),
            ("S3_BUCKET", "de-27-team3"),
            ("DB_HOST", "team3-db.internal"),
            ("DB_NAME", "olist_raw"),
            ("DB_USER", "loader"),
            ("DB_PASSWORD", "hunter2"),
        ]
    }

    fn config_from(pairs: Vec<(&'static str, &'static str)>) -> Result<Config> {
        Config::from_reader(&EnvReader::from_pairs(pairs))
    }

    #[test]
    fn test_defaults() {
        let config = config_from(full_env()).unwrap();
        assert_eq!(config.dataset.dataset, DEFAULT_DATASET);
        assert_eq!(config.storage.prefix, "raw/");
        assert_eq!(config.storage.region, "us-east-2");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.pipeline.local_dir, PathBuf::from("DE_Project_Data"));
        assert_eq!(config.pipeline.file_suffix, ".csv");
        assert_eq!(config.pipeline.failure_policy, FailurePolicy::Continue);
        assert_eq!(config.pipeline.load_mode, LoadMode::Append);
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_password_fails_load_validation_only() {
        let env: Vec<_> = full_env()
            .into_iter()
            .filter(|(k, _)| *k != "DB_PASSWORD")
            .collect();
        let config = config_from(env).unwrap();

        config.validate_download().unwrap();
        config.validate_publish().unwrap();
        let err = config.validate_load().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("DB_PASSWORD"));
    }

    #[test]
    fn test_placeholder_values_rejected() {
        let mut env = full_env();
        env.push(("DB_HOST", "<RDS_ENDPOINT>"));
        let config = config_from(env).unwrap();

        let err = config.validate_load().unwrap_err();
        assert!(err.to_string().contains("DB_HOST"));
        assert!(err.to_string().contains("placeholder"));
    }

    #[test]
    fn test_malformed_values_fail_parsing() {
        let mut env = full_env();
        env.push(("DB_PORT", "five-four-three-two"));
        assert!(config_from(env).unwrap_err().is_config());

        let mut env = full_env();
        env.push(("INGEST_LOAD_MODE", "upsert"));
        assert!(config_from(env).is_err());
    }

    #[test]
    fn test_empty_prefix_means_bucket_root() {
        let mut env = full_env();
        env.push(("S3_PREFIX", ""));
        assert_eq!(config_from(env).unwrap().storage.prefix, "");

        let mut env = full_env();
        env.push(("S3_PREFIX", "landing/olist"));
        assert_eq!(config_from(env).unwrap().storage.prefix, "landing/olist");
    }

    #[test]
    fn test_policies_and_modes() {
        let mut env = full_env();
        env.push(("INGEST_FAILURE_POLICY", "abort"));
        env.push(("INGEST_LOAD_MODE", "truncate"));
        let config = config_from(env).unwrap();
        assert_eq!(config.pipeline.failure_policy, FailurePolicy::AbortOnFirst);
        assert_eq!(config.pipeline.load_mode, LoadMode::Truncate);
    }

    #[test]
    fn test_half_configured_static_credentials() {
        let mut env = full_env();
        env.push(("S3_ACCESS_KEY", "minioadmin"));
        let err = config_from(env).unwrap().validate_publish().unwrap_err();
        assert!(err.to_string().contains("together"));
    }

    #[test]
    fn test_aws_credential_fallback_names() {
        let mut env = full_env();
        env.push(("AWS_ACCESS_KEY_ID", "AKIA"));
        env.push(("AWS_SECRET_ACCESS_KEY", "shh"));
        let config = config_from(env).unwrap();
        assert_eq!(config.storage.access_key.as_deref(), Some("AKIA"));
        config.validate_publish().unwrap();
    }

    #[test]
    fn test_bad_dataset_slug() {
        let mut env = full_env();
        env.push(("KAGGLE_DATASET", "brazilian-ecommerce"));
        assert!(config_from(env).unwrap().validate_download().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = config_from(full_env()).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("kaggle-secret"));
        assert!(rendered.contains("de-27-team3"));
    }
}
