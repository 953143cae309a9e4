mod file_config;

pub use file_config::{FileConfig, SyncConfig};

use crate::sync::{MutationRouting, ReconcilePolicy, SessionConfig};
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_COLLECTION: &str = "lineup";
pub const DEFAULT_NOTE_DEBOUNCE_MS: u64 = 750;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub collection: String,
    pub note_debounce_ms: u64,
    pub reconcile_policy: ReconcilePolicy,
    pub mutation_routing: MutationRouting,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_dir: None,
            collection: DEFAULT_COLLECTION.to_string(),
            note_debounce_ms: DEFAULT_NOTE_DEBOUNCE_MS,
            reconcile_policy: ReconcilePolicy::default(),
            mutation_routing: MutationRouting::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub collection: String,
    pub note_debounce_ms: u64,
    pub reconcile_policy: ReconcilePolicy,
    pub mutation_routing: MutationRouting,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let collection = file.collection.unwrap_or_else(|| cli.collection.clone());
        if collection.is_empty() {
            bail!("collection must not be empty");
        }

        let sync = file.sync.unwrap_or_default();
        let note_debounce_ms = sync.note_debounce_ms.unwrap_or(cli.note_debounce_ms);
        if note_debounce_ms == 0 {
            bail!("note_debounce_ms must be greater than 0");
        }

        let reconcile_policy = match sync.reconcile_policy {
            Some(s) => parse_value::<ReconcilePolicy>(&s, "reconcile_policy")?,
            None => cli.reconcile_policy,
        };
        let mutation_routing = match sync.mutation_routing {
            Some(s) => parse_value::<MutationRouting>(&s, "mutation_routing")?,
            None => cli.mutation_routing,
        };

        Ok(Self {
            db_dir,
            collection,
            note_debounce_ms,
            reconcile_policy,
            mutation_routing,
        })
    }

    pub fn document_db_path(&self) -> PathBuf {
        self.db_dir.join("lineup.db")
    }

    pub fn preferences_db_path(&self) -> PathBuf {
        self.db_dir.join("preferences.db")
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            collection: self.collection.clone(),
            note_debounce: Duration::from_millis(self.note_debounce_ms),
            reconcile_policy: self.reconcile_policy,
            mutation_routing: self.mutation_routing,
        }
    }
}

/// Parses a config value with clap's ValueEnum, so TOML accepts the same
/// spellings as the CLI ("track_pending" and "track-pending" alike).
fn parse_value<T: ValueEnum>(s: &str, name: &str) -> Result<T> {
    let normalized = s.replace('_', "-");
    match T::from_str(&normalized, true) {
        Ok(value) => Ok(value),
        Err(_) => bail!("Invalid {}: {:?}", name, s),
    }
}
