//! Rapport d'import
//!
//! Collecte les compteurs d'un run, les lignes définitivement en échec et
//! l'éventuelle erreur fatale, pour affichage console ou export JSON.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::ImportRequest;
use crate::error::ImportError;
use crate::pipeline::{EndReason, ImportOutcome};

/// Nombre de lignes en échec listées par `display()`
const DISPLAYED_FAILURES: usize = 20;

/// Statut global de l'import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportStatus {
    /// Toutes les lignes ont été écrites
    Success,
    /// Des lignes écrites, d'autres en échec
    PartialSuccess,
    /// Erreur fatale, ou aucune ligne écrite malgré des échecs
    Failed,
}

/// Ligne en échec après réconciliation
#[derive(Debug, Clone, Serialize)]
pub struct FailedRow {
    pub batch: String,
    pub position: usize,
    pub feature_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    /// Objet source (`bucket/key`)
    pub source: String,
    pub request: ImportRequest,
    pub duration_secs: f64,
    pub status: ImportStatus,

    pub saved_row_count: u64,
    pub failed_row_count: u64,
    /// Batches en échec à la première passe
    pub failed_batches: usize,
    pub end_reason: Option<EndReason>,

    pub failures: Vec<FailedRow>,
    /// Erreur fatale du run
    pub error: Option<String>,
}

impl ImportReport {
    pub fn new(source: impl Into<String>, request: ImportRequest) -> Self {
        Self {
            source: source.into(),
            request,
            duration_secs: 0.0,
            status: ImportStatus::Success,
            saved_row_count: 0,
            failed_row_count: 0,
            failed_batches: 0,
            end_reason: None,
            failures: Vec::new(),
            error: None,
        }
    }

    /// Reporte le résultat d'un run ; `id_of` extrait l'identifiant d'une ligne
    pub fn record_outcome<R>(
        &mut self,
        outcome: &ImportOutcome<R>,
        id_of: impl Fn(&R) -> Option<String>,
    ) {
        self.saved_row_count = outcome.result.saved_row_count;
        self.failed_row_count = outcome.result.failed_row_count;
        self.failed_batches = outcome.failed_batches;
        self.end_reason = Some(outcome.end_reason);
        self.failures = outcome
            .failures
            .iter()
            .map(|f| FailedRow {
                batch: f.batch_id.to_string(),
                position: f.position,
                feature_id: id_of(&f.row),
                message: format!("{:#}", f.error),
            })
            .collect();
    }

    /// Enregistre l'erreur fatale du run
    pub fn record_error(&mut self, error: &ImportError) {
        self.error = Some(error.to_string());
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        self.status = if self.error.is_some() {
            ImportStatus::Failed
        } else if self.failed_row_count == 0 {
            ImportStatus::Success
        } else if self.saved_row_count > 0 {
            ImportStatus::PartialSuccess
        } else {
            ImportStatus::Failed
        };
    }

    /// Affiche le rapport sur la sortie d'erreur (stdout porte le résultat JSON)
    pub fn display(&self) {
        eprintln!("\n{}", "=".repeat(60));
        eprintln!("IMPORT REPORT - {}", self.source);
        eprintln!("{}", "=".repeat(60));

        eprintln!("\nStatus: {:?}", self.status);
        eprintln!("Duration: {:.2}s", self.duration_secs);
        if let Some(reason) = self.end_reason {
            eprintln!("End of source: {reason:?}");
        }

        eprintln!("\n--- SUMMARY ---");
        eprintln!(
            "Window: offset {}, limit {}, batch size {}",
            self.request.row_offset,
            self.request
                .row_limit
                .map_or_else(|| "none".to_string(), |l| l.to_string()),
            self.request.batch_size
        );
        eprintln!(
            "Rows: {} saved, {} failed ({} batches retried row by row)",
            self.saved_row_count, self.failed_row_count, self.failed_batches
        );

        if !self.failures.is_empty() {
            eprintln!("\n--- FAILED ROWS ({}) ---", self.failures.len());
            for f in self.failures.iter().take(DISPLAYED_FAILURES) {
                let id = f.feature_id.as_deref().unwrap_or("-");
                eprintln!("  [{}#{}] {} {}", f.batch, f.position, id, f.message);
            }
            if self.failures.len() > DISPLAYED_FAILURES {
                eprintln!(
                    "  ... and {} more",
                    self.failures.len() - DISPLAYED_FAILURES
                );
            }
        }

        if let Some(error) = &self.error {
            eprintln!("\n--- ERROR ---");
            eprintln!("  {error}");
        }

        eprintln!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        Ok(())
    }

    /// Résumé sur une ligne
    pub fn summary(&self) -> String {
        match &self.error {
            Some(error) => format!("{}: failed ({error})", self.source),
            None => format!(
                "{}: {} saved, {} failed",
                self.source, self.saved_row_count, self.failed_row_count
            ),
        }
    }
}
