//! Daily rates per profile, read fresh for every estimation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading the rate table.
#[derive(Debug, Error)]
pub enum RateError {
    /// Database connection or query failed.
    #[error("Rate query failed: {0}")]
    Database(#[from] sqlx::Error),
    /// Rate file could not be read.
    #[error("Failed to read rate table {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Rate file was not a JSON object of numbers.
    #[error("Malformed rate table: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Mapping from profile name to daily rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateTable(BTreeMap<String, f64>);

impl RateTable {
    /// Build a table from `(role, rate)` pairs; later duplicates win.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(role, rate)| (role.into(), rate))
                .collect(),
        )
    }

    /// Rates used by the fake-data generator and as an offline default.
    pub fn sample() -> Self {
        Self::from_pairs([
            ("Consultant Technical", 250.0),
            ("Senior Consultant Technical", 300.0),
            ("Blended FE dev", 200.0),
            ("Blended MW dev", 220.0),
            ("Fullstack Developer", 240.0),
            ("UI Designer", 180.0),
            ("Project Manager", 400.0),
            ("Quality Assurance Engineer", 220.0),
            ("Lead Expert", 500.0),
        ])
    }

    /// Daily rate for a profile, ignoring surrounding whitespace.
    pub fn rate_for(&self, profile: &str) -> Option<f64> {
        self.0.get(profile.trim()).copied()
    }

    /// Profile names in alphabetical order.
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of profiles.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table holds no profile at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compact JSON object embedded verbatim in prompts.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".into())
    }
}

/// Source of the authoritative rate table.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Load the full table.
    async fn try_fetch(&self) -> Result<RateTable, RateError>;

    /// Load the full table, degrading to an empty one when the backend is unavailable.
    async fn fetch_rates(&self) -> RateTable {
        match self.try_fetch().await {
            Ok(table) => {
                tracing::debug!(roles = table.len(), "Rate table loaded");
                table
            }
            Err(error) => {
                tracing::error!(%error, "Failed to fetch roles and rates");
                RateTable::default()
            }
        }
    }
}

/// Reads `roles_rates` from MySQL, opening one connection per fetch.
pub struct SqlRateSource {
    database_url: String,
}

impl SqlRateSource {
    /// Create a source for the given connection string.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }
}

#[async_trait]
impl RateSource for SqlRateSource {
    async fn try_fetch(&self) -> Result<RateTable, RateError> {
        let pool = sqlx::mysql::MySqlPoolOptions::new()
            .max_connections(1)
            .connect(&self.database_url)
            .await?;
        let rows: Vec<(String, f64)> =
            sqlx::query_as("SELECT role, CAST(rate AS DOUBLE) AS rate FROM roles_rates")
                .fetch_all(&pool)
                .await?;
        pool.close().await;
        Ok(RateTable::from_pairs(rows))
    }
}

/// Fixed in-memory table.
pub struct StaticRateSource(RateTable);

impl StaticRateSource {
    /// Wrap an existing table.
    pub fn new(table: RateTable) -> Self {
        Self(table)
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    async fn try_fetch(&self) -> Result<RateTable, RateError> {
        Ok(self.0.clone())
    }
}

/// JSON object `{ "role": rate }` re-read on every fetch.
pub struct FileRateSource {
    path: PathBuf,
}

impl FileRateSource {
    /// Create a source backed by the given file.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl RateSource for FileRateSource {
    async fn try_fetch(&self) -> Result<RateTable, RateError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| RateError::Io {
                path: self.path.clone(),
                source,
            })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Pick the rate source for the current configuration.
pub fn rate_source_from_config(config: &crate::config::Config) -> Box<dyn RateSource> {
    if let Some(url) = &config.database_url {
        Box::new(SqlRateSource::new(url.clone()))
    } else if let Some(path) = &config.rate_table_path {
        Box::new(FileRateSource::new(path))
    } else {
        tracing::warn!("No DATABASE_URL or RATE_TABLE_PATH configured; using sample rates");
        Box::new(StaticRateSource::new(RateTable::sample()))
    }
}
