//! Source GeoJSON en flux depuis le stockage objet

use async_trait::async_trait;
use geostream::{FeatureReader, RawFeature};
use tokio::io::AsyncRead;
use tracing::{debug, info};

use super::{FeatureSource, SourceError};
use crate::storage::{ObjectReader, ObjectRef, ObjectStore};

/// Features d'une FeatureCollection lues une à une.
///
/// Les éléments sont seulement délimités, pas décodés : une géométrie invalide
/// est une erreur de ligne, traitée par le writer, pas une erreur de source.
pub struct GeoJsonSource {
    reader: Option<FeatureReader<ObjectReader>>,
    label: String,
    features_read: u64,
}

impl GeoJsonSource {
    /// Ouvre un objet du stockage et prépare la lecture en flux
    pub async fn open(store: &ObjectStore, object: &ObjectRef) -> Result<Self, SourceError> {
        let reader = store.open(object).await?;
        info!(object = %object, "Opened feature collection");
        Ok(Self::from_reader(reader, object.to_string()))
    }

    /// Lit depuis un reader arbitraire
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static, label: impl Into<String>) -> Self {
        let boxed: ObjectReader = Box::new(reader);
        Self {
            reader: Some(FeatureReader::new(boxed)),
            label: label.into(),
            features_read: 0,
        }
    }

    /// Nombre de features lues (sautées ou non)
    pub fn features_read(&self) -> u64 {
        self.features_read
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }
}

#[async_trait]
impl FeatureSource for GeoJsonSource {
    type Item = RawFeature;

    async fn next(&mut self) -> Result<Option<RawFeature>, SourceError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        match reader.next_raw().await? {
            Some(feature) => {
                self.features_read += 1;
                Ok(Some(feature))
            }
            None => {
                debug!(source = %self.label, features = self.features_read, "End of feature collection");
                self.reader = None;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            debug!(
                source = %self.label,
                features = self.features_read,
                bytes = reader.bytes_read(),
                "Closing feature source early"
            );
        }
    }
}
