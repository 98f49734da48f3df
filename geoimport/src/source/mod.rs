//! Sources de features (contrat producteur du pipeline)
//!
//! Une source est une séquence single-pass, non redémarrable. `next()` tire
//! l'item suivant : `Ok(None)` signale la fin normale, `Err` une erreur de
//! lecture ou de parsing. `close()` permet l'arrêt anticipé sans lire le reste.

pub mod memory;
pub mod stream;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemorySource;
pub use stream::GeoJsonSource;

use crate::storage::StorageError;

/// Erreurs de source (fatales pour un import)
#[derive(Debug, Error)]
pub enum SourceError {
    /// Document mal formé ou flux interrompu
    #[error(transparent)]
    Stream(#[from] geostream::StreamError),

    /// Échec d'accès au stockage objet
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Other(String),
}

/// Producteur d'items pour le pipeline
#[async_trait]
pub trait FeatureSource: Send {
    type Item: Send + Sync + 'static;

    /// Item suivant, `None` en fin de séquence
    async fn next(&mut self) -> Result<Option<Self::Item>, SourceError>;

    /// Arrêt anticipé : libère la ressource, `next()` retourne ensuite `None`
    async fn close(&mut self);
}
