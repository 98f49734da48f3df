//! Lecture asynchrone d'une FeatureCollection, une feature à la fois

use geojson::Feature;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::scanner::{FeatureScanner, DEFAULT_CHUNK_SIZE};
use crate::types::{RawFeature, Scan};
use crate::StreamError;

/// Lecteur de features en flux (single-pass, non redémarrable)
///
/// Ne lit jamais plus que nécessaire : la lecture s'arrête dès que le tableau
/// `features` est refermé, et l'appelant peut abandonner le lecteur à tout
/// moment (le reader sous-jacent est alors libéré).
#[derive(Debug)]
pub struct FeatureReader<R> {
    reader: R,
    scanner: FeatureScanner,
    chunk_size: usize,
    eof: bool,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> FeatureReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            scanner: FeatureScanner::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            eof: false,
            bytes_read: 0,
        }
    }

    /// Modifie la taille des lectures (minimum 1 octet)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Retourne la prochaine feature brute, ou `None` en fin de tableau
    pub async fn next_raw(&mut self) -> Result<Option<RawFeature>, StreamError> {
        loop {
            match self.scanner.scan()? {
                Scan::Feature(raw) => {
                    trace!(index = raw.index, bytes = raw.len(), "Feature scanned");
                    return Ok(Some(raw));
                }
                Scan::Done => return Ok(None),
                Scan::NeedData => {
                    if self.eof {
                        self.scanner.finish()?;
                        return Ok(None);
                    }
                    let buf = self.scanner.buffer_for_read(self.chunk_size);
                    let read = self.reader.read_buf(buf).await?;
                    if read == 0 {
                        self.eof = true;
                    }
                    self.bytes_read += read as u64;
                }
            }
        }
    }

    /// Retourne la prochaine feature décodée
    pub async fn next_feature(&mut self) -> Result<Option<Feature>, StreamError> {
        match self.next_raw().await? {
            Some(raw) => raw.decode().map(Some),
            None => Ok(None),
        }
    }

    /// Nombre de features lues jusqu'ici
    pub fn features_read(&self) -> u64 {
        self.scanner.features_emitted()
    }

    /// Nombre d'octets lus depuis le reader sous-jacent
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &[u8] = br#"{"type":"FeatureCollection","features":[
        {"type":"Feature","id":"p1","geometry":{"type":"Point","coordinates":[5.0,47.0]},"properties":{"name":"A"}},
        {"type":"Feature","id":"p2","geometry":null,"properties":{"name":"B"}}
    ]}"#;

    #[tokio::test]
    async fn test_read_features() {
        let mut reader = FeatureReader::new(DOC).with_chunk_size(7);

        let first = reader.next_feature().await.unwrap().unwrap();
        assert_eq!(first.id, Some(geojson::feature::Id::String("p1".into())));
        assert!(first.geometry.is_some());

        let second = reader.next_feature().await.unwrap().unwrap();
        assert!(second.geometry.is_none());
        assert_eq!(
            second.property("name").and_then(|v| v.as_str()),
            Some("B")
        );

        assert!(reader.next_feature().await.unwrap().is_none());
        assert_eq!(reader.features_read(), 2);
    }

    #[tokio::test]
    async fn test_decode_error_keeps_index() {
        let doc = br#"{"features":[{"type":"Feature","properties":null,"geometry":null},{"type":"Nope"}]}"#;
        let mut reader = FeatureReader::new(&doc[..]);
        assert!(reader.next_feature().await.unwrap().is_some());
        match reader.next_feature().await {
            Err(StreamError::Decode { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_truncated_stream() {
        let doc = br#"{"features":[{"type":"Feature""#;
        let mut reader = FeatureReader::new(&doc[..]);
        assert!(matches!(
            reader.next_raw().await,
            Err(StreamError::UnexpectedEof { .. })
        ));
    }

    #[tokio::test]
    async fn test_stops_reading_after_features() {
        let mut doc = br#"{"features":[{"id":1}],"padding":""#.to_vec();
        doc.extend(std::iter::repeat(b'x').take(1024 * 1024));
        let mut reader = FeatureReader::new(&doc[..]).with_chunk_size(64);

        assert!(reader.next_raw().await.unwrap().is_some());
        assert!(reader.next_raw().await.unwrap().is_none());
        assert!(reader.bytes_read() < 1024);
    }
}
