//! Types de données pour le crate geostream

use bytes::Bytes;
use geojson::Feature;
use serde::de::DeserializeOwned;

use crate::StreamError;

/// Feature brute extraite du tableau `features`, non décodée
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFeature {
    /// Position de la feature dans le tableau (0-based)
    pub index: u64,

    /// Position du premier octet de la feature dans le document
    pub offset: u64,

    /// Octets JSON de l'objet feature (de `{` à `}` inclus)
    pub bytes: Bytes,
}

impl RawFeature {
    /// Décode la feature en `geojson::Feature`
    pub fn decode(&self) -> Result<Feature, StreamError> {
        self.deserialize()
    }

    /// Décode la feature dans un type arbitraire (mapping applicatif direct)
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, StreamError> {
        serde_json::from_slice(&self.bytes).map_err(|source| StreamError::Decode {
            index: self.index,
            source,
        })
    }

    /// Taille de la feature en octets
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Résultat d'une étape de scan
#[derive(Debug, PartialEq, Eq)]
pub enum Scan {
    /// Une feature complète est disponible
    Feature(RawFeature),
    /// Le buffer est épuisé, il faut lire la suite du flux
    NeedData,
    /// Le tableau `features` est terminé
    Done,
}
