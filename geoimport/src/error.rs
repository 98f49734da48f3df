//! Erreurs de niveau run
//!
//! Seules ces erreurs font échouer un import. Les erreurs d'écriture de batch
//! ou de ligne sont des `anyhow::Error` produites par le writer, contenues au
//! niveau du batch puis de la ligne.

use thiserror::Error;

use crate::source::SourceError;

/// Erreur fatale d'un import
#[derive(Debug, Error)]
pub enum ImportError {
    /// Paramètres de requête hors contrat (limite nulle, batch vide...)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Échec de lecture ou de parsing de la source : périmètre inconnu
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Échec du callback final après réconciliation
    #[error("Final callback failed: {0:#}")]
    Finalize(#[source] anyhow::Error),
}

impl ImportError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }
}
