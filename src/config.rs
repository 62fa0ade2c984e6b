use crate::vocabulary::Revision;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_UPLOAD_CONTAINER: &str = "pdf-files";
const DEFAULT_KNOWLEDGE_BASE_CONTAINER: &str = "knowledge-base";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_MAX_POLLS: u32 = 300;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the estimation pipeline and the knowledge-base tooling.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the document-analysis service.
    pub doc_intel_endpoint: String,
    /// Subscription key for the document-analysis service.
    pub doc_intel_api_key: String,
    /// Full chat-completions URL of the generative-text deployment.
    pub openai_endpoint: String,
    /// API key for the generative-text deployment.
    pub openai_api_key: String,
    /// Base URL of the search service.
    pub search_endpoint: String,
    /// Admin or query key for the search service.
    pub search_api_key: String,
    /// Index holding historical task records.
    pub search_index_name: String,
    /// Blob storage account name, used to derive the blob endpoint.
    pub storage_account_name: Option<String>,
    /// Explicit blob endpoint overriding the account-derived one.
    pub storage_blob_endpoint: Option<String>,
    /// Shared access signature appended to every blob request.
    pub storage_sas_token: Option<String>,
    /// Container receiving uploaded project documents.
    pub upload_container: String,
    /// Container the knowledge-base loader reads from.
    pub knowledge_base_container: String,
    /// Local directory used instead of blob storage when set.
    pub local_storage_dir: Option<PathBuf>,
    /// MySQL connection string for the `roles_rates` table.
    pub database_url: Option<String>,
    /// JSON rate table used when no database is configured.
    pub rate_table_path: Option<PathBuf>,
    /// Delay between two polls of an analysis operation.
    pub analysis_poll_interval: Duration,
    /// Upper bound on analysis polls before giving up.
    pub analysis_max_polls: u32,
    /// Formula revision used for prompts and validation.
    pub estimation_revision: Revision,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            doc_intel_endpoint: load_env("DOC_INTEL_ENDPOINT")?,
            doc_intel_api_key: load_env("DOC_INTEL_API_KEY")?,
            openai_endpoint: load_env("OPENAI_ENDPOINT")?,
            openai_api_key: load_env("OPENAI_API_KEY")?,
            search_endpoint: load_env("AZURE_SEARCH_ENDPOINT")?,
            search_api_key: load_env("AZURE_SEARCH_API_KEY")?,
            search_index_name: load_env("AZURE_SEARCH_INDEX_NAME")?,
            storage_account_name: load_env_optional("AZURE_STORAGE_ACCOUNT_NAME"),
            storage_blob_endpoint: load_env_optional("AZURE_STORAGE_BLOB_ENDPOINT"),
            storage_sas_token: load_env_optional("AZURE_STORAGE_SAS_TOKEN"),
            upload_container: load_env_optional("AZURE_CONTAINER_NAME")
                .unwrap_or_else(|| DEFAULT_UPLOAD_CONTAINER.to_string()),
            knowledge_base_container: load_env_optional("AZURE_KNOWLEDGE_BASE_CONTAINER_NAME")
                .unwrap_or_else(|| DEFAULT_KNOWLEDGE_BASE_CONTAINER.to_string()),
            local_storage_dir: load_env_optional("LOCAL_STORAGE_DIR").map(PathBuf::from),
            database_url: load_env_optional("DATABASE_URL"),
            rate_table_path: load_env_optional("RATE_TABLE_PATH").map(PathBuf::from),
            analysis_poll_interval: Duration::from_millis(parse_optional(
                "ANALYSIS_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?),
            analysis_max_polls: parse_optional("ANALYSIS_MAX_POLLS", DEFAULT_MAX_POLLS)?,
            estimation_revision: load_env_optional("ESTIMATION_REVISION")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("ESTIMATION_REVISION".into()))
                })
                .transpose()?
                .unwrap_or_default(),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }

    /// Blob endpoint derived from the explicit override or the account name.
    pub fn blob_endpoint(&self) -> Option<String> {
        self.storage_blob_endpoint.clone().or_else(|| {
            self.storage_account_name
                .as_ref()
                .map(|account| format!("https://{account}.blob.core.windows.net"))
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|value| value.unwrap_or(default))
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        search_endpoint = %config.search_endpoint,
        index = %config.search_index_name,
        blob_endpoint = ?config.blob_endpoint(),
        local_storage = ?config.local_storage_dir,
        has_database = config.database_url.is_some(),
        revision = ?config.estimation_revision,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
