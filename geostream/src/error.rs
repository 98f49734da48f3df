//! Types d'erreurs pour le crate geostream

use thiserror::Error;

/// Erreurs pouvant survenir lors de l'énumération d'une FeatureCollection
#[derive(Debug, Error)]
pub enum StreamError {
    /// Erreur d'I/O lors de la lecture du flux
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON mal formé à une position donnée du flux
    #[error("Syntax error at byte {offset}: {reason}")]
    Syntax { offset: u64, reason: String },

    /// Le document n'est pas un objet JSON
    #[error("Document is not a FeatureCollection: {0}")]
    NotFeatureCollection(String),

    /// Le membre `features` est absent du document
    #[error("Missing `features` array in FeatureCollection")]
    MissingFeatures,

    /// Le flux s'est terminé au milieu du document
    #[error("Unexpected end of stream at byte {offset}")]
    UnexpectedEof { offset: u64 },

    /// Élément du tableau `features` invalide (pas un objet)
    #[error("Invalid feature #{index}: {reason}")]
    InvalidFeature { index: u64, reason: String },

    /// Feature syntaxiquement correcte mais non décodable en GeoJSON
    #[error("Failed to decode feature #{index}: {source}")]
    Decode {
        index: u64,
        #[source]
        source: serde_json::Error,
    },
}

impl StreamError {
    /// Crée une erreur de syntaxe avec contexte
    pub fn syntax(offset: u64, reason: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            reason: reason.into(),
        }
    }

    /// Crée une erreur de feature invalide
    pub fn invalid_feature(index: u64, reason: impl Into<String>) -> Self {
        Self::InvalidFeature {
            index,
            reason: reason.into(),
        }
    }
}
