//! Types partagés par les étapes du pipeline

use std::fmt;

use serde::Serialize;

/// Identifiant de batch, croissant au sein d'un run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{:06}", self.0)
    }
}

/// Groupe ordonné de lignes écrit en une fois
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<R> {
    pub id: BatchId,
    pub rows: Vec<R>,
}

impl<R> Batch<R> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Compteurs retournés en fin d'import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    pub saved_row_count: u64,
    pub failed_row_count: u64,
}

impl ProcessResult {
    /// Nombre de lignes traitées (sauvées ou en échec)
    pub fn total(&self) -> u64 {
        self.saved_row_count + self.failed_row_count
    }
}

/// Ligne en échec après la passe de réconciliation
#[derive(Debug)]
pub struct RowFailure<R> {
    /// Batch d'origine de la ligne
    pub batch_id: BatchId,
    /// Position de la ligne dans son batch
    pub position: usize,
    pub row: R,
    pub error: anyhow::Error,
}

/// Résultat détaillé d'un import
#[derive(Debug)]
pub struct ImportOutcome<R> {
    pub result: ProcessResult,
    pub failures: Vec<RowFailure<R>>,
    /// Nombre de batches en échec lors de la première passe
    pub failed_batches: usize,
    pub end_reason: EndReason,
}

/// Cause de fin de lecture de la source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EndReason {
    /// Source épuisée naturellement
    Exhausted,
    /// Limite atteinte, source fermée par anticipation
    LimitReached,
}
