//! # geostream
//!
//! Énumération en flux des features d'une FeatureCollection GeoJSON.
//!
//! ## Features
//!
//! - Lecture incrémentale, mémoire bornée par la taille d'une feature
//! - Scan `memchr` des chaînes, sans construction d'arbre JSON
//! - Arrêt anticipé : rien n'est lu après le tableau `features`
//! - Décodage optionnel en `geojson::Feature` ou en type applicatif
//!
//! ## Usage
//!
//! ```rust,ignore
//! use geostream::FeatureReader;
//!
//! let file = tokio::fs::File::open("parcelles.geojson").await?;
//! let mut reader = FeatureReader::new(file);
//! while let Some(feature) = reader.next_feature().await? {
//!     println!("{:?}", feature.id);
//! }
//! ```

pub mod error;
pub mod reader;
pub mod scanner;
pub mod types;

pub use error::StreamError;
pub use reader::FeatureReader;
pub use scanner::FeatureScanner;
pub use types::{RawFeature, Scan};

/// Découpe un document complet en mémoire en features brutes.
///
/// # Errors
///
/// Retourne `StreamError` si le document n'est pas une FeatureCollection
/// bien formée.
pub fn split_features(document: &[u8]) -> Result<Vec<RawFeature>, StreamError> {
    let mut scanner = FeatureScanner::new();
    scanner.push(document);

    let mut features = Vec::new();
    loop {
        match scanner.scan()? {
            Scan::Feature(raw) => features.push(raw),
            Scan::Done => return Ok(features),
            Scan::NeedData => {
                scanner.finish()?;
                return Ok(features);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_features() {
        let features =
            split_features(br#"{"type":"FeatureCollection","features":[{"a":1},{"b":2},{}]}"#)
                .unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(features[2].index, 2);
    }

    #[test]
    fn test_split_features_truncated() {
        assert!(split_features(br#"{"features":[{"a":1}"#).is_err());
    }
}
