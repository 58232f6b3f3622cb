//! Model retirement lookup over a static table loaded once at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::errors::AgentError;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
struct RetirementEntry {
    #[serde(default)]
    retirement_date: Option<String>,
    #[serde(default)]
    replacement_model: Option<String>,
}

/// A model name and version to look up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub model_name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RetirementRecord {
    Found {
        model_name: String,
        version: String,
        retirement_date: String,
        replacement_model: String,
    },
    Missing {
        model_name: String,
        version: String,
        error: String,
    },
}

impl RetirementRecord {
    pub fn is_found(&self) -> bool {
        matches!(self, RetirementRecord::Found { .. })
    }
}

/// Read-only `model -> version -> entry` table.
#[derive(Debug, Clone, Default)]
pub struct RetirementTable {
    models: HashMap<String, HashMap<String, RetirementEntry>>,
}

impl RetirementTable {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AgentError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AgentError::ConfigError(format!(
                "Failed to read retirement table {}: {}",
                path.display(),
                e
            ))
        })?;
        let table = Self::from_json_str(&content)?;
        log::info!(
            "Loaded retirement data for {} models from {}",
            table.models.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn from_json_str(content: &str) -> Result<Self, AgentError> {
        let models = serde_json::from_str(content).map_err(|e| {
            AgentError::ConfigError(format!("Invalid retirement table: {}", e))
        })?;
        Ok(Self { models })
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn lookup(&self, model_name: &str, version: &str) -> RetirementRecord {
        let Some(versions) = self.models.get(model_name) else {
            return RetirementRecord::Missing {
                model_name: model_name.to_string(),
                version: version.to_string(),
                error: format!("Model '{}' not found.", model_name),
            };
        };

        match versions.get(version) {
            Some(entry) => RetirementRecord::Found {
                model_name: model_name.to_string(),
                version: version.to_string(),
                retirement_date: entry
                    .retirement_date
                    .clone()
                    .unwrap_or_else(|| "Unknown".to_string()),
                replacement_model: entry
                    .replacement_model
                    .clone()
                    .unwrap_or_else(|| "None".to_string()),
            },
            None => RetirementRecord::Missing {
                model_name: model_name.to_string(),
                version: version.to_string(),
                error: format!(
                    "Version '{}' not found for model '{}'.",
                    version, model_name
                ),
            },
        }
    }

    /// One record per input, in input order.
    pub fn lookup_all(&self, queries: &[ModelVersion]) -> Vec<RetirementRecord> {
        queries
            .iter()
            .map(|q| self.lookup(&q.model_name, &q.version))
            .collect()
    }
}
