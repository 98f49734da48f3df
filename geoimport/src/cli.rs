//! Définition et implémentation des commandes CLI
//!
//! - `import` : objet GeoJSON → table PostGIS
//! - `count` : parcours à blanc de la fenêtre, sans base de données

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Args, Subcommand};
use geostream::RawFeature;
use tracing::{info, warn};

use geoimport::config::{ImportOptions, ImportRequest, DEFAULT_MAX_CONCURRENCY};
use geoimport::error::ImportError;
use geoimport::export::postgres::feature_id;
use geoimport::export::{create_pool, test_connection, DatabaseConfig, PostgresWriter, TableTarget};
use geoimport::pipeline::{run_import, run_import_detailed, ImportOutcome, ProcessResult, RowWriter};
use geoimport::report::ImportReport;
use geoimport::source::GeoJsonSource;
use geoimport::storage::{ObjectRef, ObjectStore, ObjectStoreConfig};

#[derive(Subcommand)]
pub enum Commands {
    /// Import a GeoJSON FeatureCollection from object storage into PostGIS
    Import(ImportArgs),

    /// Stream the selected window of features without writing anything
    Count(CountArgs),
}

/// Objet source
#[derive(Args, Debug, Clone)]
pub struct ObjectArgs {
    /// Bucket containing the FeatureCollection
    #[arg(long)]
    pub bucket: String,

    /// Object key (e.g. exports/2024/parcelles.geojson)
    #[arg(long)]
    pub key: String,
}

impl ObjectArgs {
    fn object(&self) -> ObjectRef {
        ObjectRef::new(&self.bucket, &self.key)
    }
}

/// Fenêtre de lignes et taille de batch
#[derive(Args, Debug, Clone)]
pub struct WindowArgs {
    /// Invocation payload: {"rowOffset"?, "rowLimit"?, "batchSize"?}
    #[arg(long, conflicts_with = "payload_file")]
    pub payload: Option<String>,

    /// Read the invocation payload from a JSON file
    #[arg(long)]
    pub payload_file: Option<PathBuf>,

    /// Number of leading features to skip (overrides the payload)
    #[arg(long)]
    pub offset: Option<u64>,

    /// Maximum number of features to import (overrides the payload)
    #[arg(long)]
    pub limit: Option<u64>,

    /// Features per batch (overrides the payload, défaut : 10)
    #[arg(long)]
    pub batch_size: Option<usize>,
}

impl WindowArgs {
    fn request(&self) -> Result<ImportRequest> {
        let payload = match (&self.payload, &self.payload_file) {
            (Some(json), _) => ImportRequest::from_json(json)?,
            (None, Some(path)) => ImportRequest::load(path)?,
            (None, None) => ImportRequest::default(),
        };

        let request = payload.with_overrides(self.offset, self.limit, self.batch_size);
        request.validate()?;
        Ok(request)
    }
}

/// Surcharges de connexion PostgreSQL
#[derive(Args, Debug, Clone, Default)]
pub struct DatabaseArgs {
    /// PostgreSQL host (défaut : env PGHOST / localhost)
    #[arg(long)]
    pub host: Option<String>,

    /// PostgreSQL database name (défaut : env PGDATABASE / geoimport)
    #[arg(long)]
    pub database: Option<String>,

    /// PostgreSQL user (défaut : env PGUSER / postgres)
    #[arg(long)]
    pub user: Option<String>,

    /// PostgreSQL password (défaut : env PGPASSWORD)
    #[arg(long)]
    pub password: Option<String>,

    /// PostgreSQL port (défaut : env PGPORT / 5432)
    #[arg(long)]
    pub port: Option<u16>,

    /// SSL mode: disable, prefer, require (défaut : env PGSSLMODE / disable)
    #[arg(long)]
    pub ssl: Option<String>,

    /// Connection pool size (défaut : env POOL_SIZE / 8)
    #[arg(long)]
    pub pool_size: Option<usize>,
}

impl DatabaseArgs {
    fn apply(self, config: &mut DatabaseConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(database) = self.database {
            config.dbname = database;
        }
        if let Some(user) = self.user {
            config.user = user;
        }
        if let Some(password) = self.password {
            config.password = Some(password);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ssl) = self.ssl {
            match ssl.parse() {
                Ok(mode) => config.ssl_mode = mode,
                Err(e) => warn!("{e}, keeping {:?}", config.ssl_mode),
            }
        }
        if let Some(size) = self.pool_size.filter(|&s| s > 0) {
            config.pool_size = size;
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    #[command(flatten)]
    pub object: ObjectArgs,

    #[command(flatten)]
    pub window: WindowArgs,

    /// Target table
    #[arg(long)]
    pub table: String,

    /// Target schema
    #[arg(long, default_value = "public")]
    pub schema: String,

    /// Maximum number of batches written concurrently
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENCY)]
    pub concurrency: usize,

    /// SRID assigned to the geometries
    #[arg(long, default_value_t = 4326)]
    pub srid: i32,

    /// Property used as feature_id (défaut : GeoJSON id)
    #[arg(long)]
    pub id_property: Option<String>,

    /// Create the target table if missing
    #[arg(long)]
    pub create_table: bool,

    /// Run ANALYZE on the table after the import
    #[arg(long)]
    pub analyze: bool,

    /// Write a JSON report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub db: DatabaseArgs,
}

#[derive(Args, Debug, Clone)]
pub struct CountArgs {
    #[command(flatten)]
    pub object: ObjectArgs,

    #[command(flatten)]
    pub window: WindowArgs,
}

/// Exécute la commande import
pub async fn cmd_import(args: ImportArgs, show_report: bool) -> Result<ProcessResult> {
    let request = args.window.request()?;
    let options = ImportOptions {
        max_concurrency: args.concurrency,
    };
    options.validate()?;

    let mut db_config = DatabaseConfig::from_env();
    args.db.apply(&mut db_config);
    info!(
        user = %db_config.user,
        host = %db_config.host,
        port = db_config.port,
        dbname = %db_config.dbname,
        ssl = ?db_config.ssl_mode,
        "Connecting to PostgreSQL"
    );
    if db_config.pool_size < options.max_concurrency {
        warn!(
            pool_size = db_config.pool_size,
            concurrency = options.max_concurrency,
            "Pool smaller than concurrency, batch writes will wait for connections"
        );
    }

    let pool = create_pool(&db_config)?;
    test_connection(&pool).await?;

    let target = TableTarget {
        srid: args.srid,
        id_property: args.id_property.clone(),
        ..TableTarget::new(args.schema, args.table)
    };
    let writer = Arc::new(PostgresWriter::new(pool, target)?.with_analyze(args.analyze));
    if args.create_table {
        writer.create_table().await?;
    }

    let store = ObjectStore::new(ObjectStoreConfig::from_env())?;
    let object = args.object.object();
    let mut report = ImportReport::new(object.to_string(), request);

    let started_at = Instant::now();
    let outcome = import_object(&store, &object, writer, &request, &options).await;
    report.set_duration(started_at.elapsed());

    match &outcome {
        Ok(outcome) => {
            let id_property = args.id_property.as_deref();
            report.record_outcome(outcome, |raw| {
                raw.decode().ok().and_then(|f| feature_id(&f, id_property))
            });
        }
        Err(e) => report.record_error(e),
    }
    report.finalize();

    if let Some(path) = &args.report {
        save_report(&report, path);
    }
    if show_report {
        report.display();
    }
    info!("{}", report.summary());

    Ok(outcome?.result)
}

/// Les lignes sont déjà commitées : un rapport non écrit n'invalide pas le run
fn save_report(report: &ImportReport, path: &Path) -> bool {
    match report.save_to_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "Report saved");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %format!("{e:#}"), "Failed to save report");
            false
        }
    }
}

async fn import_object(
    store: &ObjectStore,
    object: &ObjectRef,
    writer: Arc<PostgresWriter>,
    request: &ImportRequest,
    options: &ImportOptions,
) -> Result<ImportOutcome<RawFeature>, ImportError> {
    let mut source = GeoJsonSource::open(store, object).await?;
    run_import_detailed(&mut source, writer, request, options).await
}

/// Writer à blanc : décode et compte les lignes sans les écrire
#[derive(Debug, Default)]
struct DryRunWriter {
    rows: AtomicU64,
}

#[async_trait]
impl RowWriter<RawFeature> for DryRunWriter {
    async fn write_rows(&self, rows: &[RawFeature]) -> Result<()> {
        for raw in rows {
            raw.decode()
                .with_context(|| format!("Invalid feature at index {}", raw.index))?;
        }
        self.rows.fetch_add(rows.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

/// Exécute la commande count
pub async fn cmd_count(args: CountArgs) -> Result<ProcessResult> {
    let request = args.window.request()?;
    let store = ObjectStore::new(ObjectStoreConfig::from_env())?;
    let object = args.object.object();

    let mut source = GeoJsonSource::open(&store, &object).await?;
    let writer = Arc::new(DryRunWriter::default());
    let result = run_import(
        &mut source,
        Arc::clone(&writer),
        &request,
        &ImportOptions::default(),
    )
    .await?;

    info!(
        object = %object,
        rows = writer.rows.load(Ordering::Relaxed),
        features_read = source.features_read(),
        "Count complete"
    );
    Ok(result)
}
