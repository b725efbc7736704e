//! Settings loaded from `invoice-workflow.toml`.
//!
//! Missing keys fall back to defaults. `INVOICE_WORKFLOW_LEDGER` and
//! `INVOICE_WORKFLOW_LOG` take precedence over the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "invoice-workflow.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// JSON file holding invoices and their history.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// `tracing` filter directive, e.g. `info` or `invoice_workflow=debug`.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Note recorded when an action comes without one.
    #[serde(default = "default_note")]
    pub default_note: String,

    /// Whether CLI treasury users must attach payment evidence before paying.
    #[serde(default)]
    pub require_payment_evidence: bool,
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("invoices.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_note() -> String {
    crate::ledger::DEFAULT_NOTE.to_string()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            ledger_path: default_ledger_path(),
            log_level: default_log_level(),
            default_note: default_note(),
            require_payment_evidence: false,
        }
    }
}

impl WorkflowConfig {
    /// Load from `path`, or from `invoice-workflow.toml` in the current
    /// directory. A missing default file means defaults; a missing explicit
    /// file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::from_file(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    fn apply_env(&mut self) {
        if let Ok(ledger) = std::env::var("INVOICE_WORKFLOW_LEDGER")
            && !ledger.is_empty()
        {
            self.ledger_path = PathBuf::from(ledger);
        }
        if let Ok(level) = std::env::var("INVOICE_WORKFLOW_LOG")
            && !level.is_empty()
        {
            self.log_level = level;
        }
    }
}
