//! Configuration d'un import (payload d'invocation et options du pipeline)

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ImportError;

/// Taille de batch par défaut
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Nombre maximum de batches écrits simultanément par défaut
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Payload d'invocation : fenêtre de lignes et taille de batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImportRequest {
    /// Nombre de lignes sautées en tête de source
    #[serde(default)]
    pub row_offset: u64,

    /// Nombre maximum de lignes traitées (illimité si absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_limit: Option<u64>,

    /// Nombre de lignes par batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for ImportRequest {
    fn default() -> Self {
        Self {
            row_offset: 0,
            row_limit: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ImportRequest {
    /// Charge un payload depuis un fichier JSON
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read payload file: {}", path.display()))?;

        Self::from_json(&content)
    }

    /// Parse un payload JSON (`{ "rowOffset"?, "rowLimit"?, "batchSize"? }`)
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse import payload JSON")
    }

    /// Vérifie le contrat : `rowLimit > 0`, `batchSize >= 1`
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.row_limit == Some(0) {
            return Err(ImportError::invalid_request("rowLimit must be greater than 0"));
        }
        if self.batch_size == 0 {
            return Err(ImportError::invalid_request("batchSize must be at least 1"));
        }
        Ok(())
    }

    /// Applique des surcharges explicites (flags CLI) au payload
    pub fn with_overrides(
        mut self,
        row_offset: Option<u64>,
        row_limit: Option<u64>,
        batch_size: Option<usize>,
    ) -> Self {
        if let Some(offset) = row_offset {
            self.row_offset = offset;
        }
        if row_limit.is_some() {
            self.row_limit = row_limit;
        }
        if let Some(size) = batch_size {
            self.batch_size = size;
        }
        self
    }
}

/// Options d'exécution du pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    /// Nombre maximum d'écritures de batch en vol
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl ImportOptions {
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.max_concurrency == 0 {
            return Err(ImportError::invalid_request(
                "maxConcurrency must be at least 1",
            ));
        }
        Ok(())
    }
}
