//! Accès en flux au stockage objet (bucket + clé)
//!
//! Deux backends : un endpoint HTTP(S) compatible S3 en adressage par chemin
//! (`{endpoint}/{bucket}/{key}`), ou un répertoire local (`{root}/{bucket}/{key}`).
//! Dans les deux cas, le contenu est exposé comme un `AsyncRead` lu à la
//! demande : l'abandonner interrompt le transfert.

use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use futures::TryStreamExt;
use reqwest::{StatusCode, Url};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::debug;

/// Lecteur du contenu d'un objet
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Erreurs d'accès au stockage objet
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object store returned status {status} for {url}")]
    Status { status: StatusCode, url: String },

    #[error("Object store HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid object reference: {0}")]
    InvalidObject(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Référence d'un objet dans un bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    fn validate(&self) -> Result<(), StorageError> {
        if self.bucket.is_empty() || self.bucket.contains('/') {
            return Err(StorageError::InvalidObject(format!(
                "invalid bucket name: {:?}",
                self.bucket
            )));
        }
        let key = self.key.trim_start_matches('/');
        if key.is_empty() {
            return Err(StorageError::InvalidObject("empty key".to_string()));
        }
        if Path::new(key)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidObject(format!(
                "key must be a relative path without '..': {:?}",
                self.key
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key.trim_start_matches('/'))
    }
}

/// Backend de stockage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Endpoint HTTP(S) compatible S3, adressage par chemin
    Http(String),
    /// Répertoire local contenant un sous-répertoire par bucket
    Local(PathBuf),
}

/// Configuration du stockage objet
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub endpoint: Endpoint,
    pub connect_timeout: Duration,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Local(PathBuf::from(".")),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ObjectStoreConfig {
    /// Charge la configuration depuis `OBJECT_STORE_ENDPOINT` ou `OBJECT_STORE_ROOT`
    pub fn from_env() -> Self {
        let endpoint = match std::env::var("OBJECT_STORE_ENDPOINT") {
            Ok(url) if !url.trim().is_empty() => Endpoint::Http(url),
            _ => Endpoint::Local(
                std::env::var("OBJECT_STORE_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(".")),
            ),
        };

        Self {
            endpoint,
            ..Default::default()
        }
    }
}

/// Client de stockage objet
#[derive(Debug, Clone)]
pub struct ObjectStore {
    endpoint: Endpoint,
    http: reqwest::Client,
}

impl ObjectStore {
    pub fn new(config: ObjectStoreConfig) -> Result<Self, StorageError> {
        // Pas de timeout global : le corps est lu en flux sur toute la durée de l'import
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("geoimport/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            endpoint: config.endpoint,
            http,
        })
    }

    /// Ouvre un objet en lecture streaming
    pub async fn open(&self, object: &ObjectRef) -> Result<ObjectReader, StorageError> {
        object.validate()?;

        match &self.endpoint {
            Endpoint::Http(base) => {
                let url = object_url(base, object)?;
                debug!(url = %url, "Streaming object over HTTP");

                let response = self.http.get(url.clone()).send().await?;
                let status = response.status();
                if status == StatusCode::NOT_FOUND {
                    return Err(StorageError::NotFound(object.to_string()));
                }
                if !status.is_success() {
                    return Err(StorageError::Status {
                        status,
                        url: url.to_string(),
                    });
                }

                let body = response.bytes_stream().map_err(io::Error::other);
                Ok(Box::new(StreamReader::new(Box::pin(body))))
            }
            Endpoint::Local(root) => {
                let path = object_path(root, object);
                debug!(path = %path.display(), "Streaming object from local storage");

                match tokio::fs::File::open(&path).await {
                    Ok(file) => Ok(Box::new(file)),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        Err(StorageError::NotFound(object.to_string()))
                    }
                    Err(e) => Err(StorageError::Io(e)),
                }
            }
        }
    }
}

/// URL d'un objet en adressage par chemin (segments encodés)
fn object_url(base: &str, object: &ObjectRef) -> Result<Url, StorageError> {
    let mut url =
        Url::parse(base).map_err(|e| StorageError::InvalidEndpoint(format!("{base}: {e}")))?;

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| StorageError::InvalidEndpoint(base.to_string()))?;
        segments.pop_if_empty();
        segments.push(&object.bucket);
        segments.extend(object.key.trim_start_matches('/').split('/'));
    }

    Ok(url)
}

fn object_path(root: &Path, object: &ObjectRef) -> PathBuf {
    root.join(&object.bucket)
        .join(object.key.trim_start_matches('/'))
}
