//! # geoimport
//!
//! Import en masse de FeatureCollections GeoJSON, lues en flux depuis un
//! stockage objet, vers une table PostGIS.
//!
//! ## Pipeline
//!
//! - Fenêtrage `offset`/`limit` sur la séquence de features
//! - Groupement en batches de taille fixe
//! - Écriture concurrente bornée, avec backpressure sur la lecture
//! - Réconciliation : les batches en échec sont réessayés ligne à ligne
//!
//! Le résultat est `{ savedRowCount, failedRowCount }`. Seule une erreur de
//! source (lecture, parsing) fait échouer l'import.
//!
//! ## Usage CLI
//!
//! ```bash
//! # Import des lignes 5 à 20, par batches de 10
//! geoimport import --bucket cadastre --key 2024/parcelles.geojson \
//!     --table parcelles --offset 5 --limit 15 --batch-size 10
//!
//! # Parcours à blanc, sans base de données
//! geoimport count --bucket cadastre --key 2024/parcelles.geojson
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod storage;

pub use config::{ImportOptions, ImportRequest};
pub use error::ImportError;
pub use export::{create_pool, DatabaseConfig, PostgresWriter, TableTarget};
pub use pipeline::{run_import, run_import_detailed, ProcessResult, RowWriter};
pub use report::{ImportReport, ImportStatus};
pub use source::{FeatureSource, GeoJsonSource, SourceError};
pub use storage::{ObjectRef, ObjectStore, ObjectStoreConfig};
