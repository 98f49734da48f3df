//! Pool de connexions PostgreSQL partagé par les écritures concurrentes

use std::time::Duration;

use anyhow::{Context, Result};
use deadpool_postgres::{Config, Pool, PoolConfig, Runtime, Timeouts};
use tokio_postgres::NoTls;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::debug;

/// Niveau de chiffrement de la connexion, aligné sur les valeurs de `PGSSLMODE`
///
/// `verify-ca` et `verify-full` se ramènent à `Require` : le connecteur rustls
/// vérifie toujours le certificat contre les racines webpki.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SslMode {
    #[default]
    Disable,
    /// `allow` / `prefer`
    Prefer,
    Require,
}

impl SslMode {
    fn uses_tls(self) -> bool {
        !matches!(self, SslMode::Disable)
    }
}

impl std::str::FromStr for SslMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mode = match value.trim().to_ascii_lowercase().as_str() {
            "disable" | "off" | "false" | "no" | "0" => SslMode::Disable,
            "allow" | "prefer" => SslMode::Prefer,
            "require" | "verify-ca" | "verify-full" | "on" | "true" | "yes" | "1" => {
                SslMode::Require
            }
            _ => {
                return Err(format!(
                    "unknown ssl mode {value:?} (expected disable, prefer or require)"
                ))
            }
        };
        Ok(mode)
    }
}

const DEFAULT_POOL_SIZE: usize = 8;

/// Attente maximale d'une connexion libre : couvre un batch lent chez un voisin
const POOL_WAIT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RECYCLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration de la base de données cible
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
    /// Doit être au moins égal à `max_concurrency` pour ne pas sérialiser les écritures
    pub pool_size: usize,
    pub ssl_mode: SslMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            dbname: "geoimport".into(),
            user: "postgres".into(),
            password: None,
            pool_size: DEFAULT_POOL_SIZE,
            ssl_mode: SslMode::Disable,
        }
    }
}

impl DatabaseConfig {
    /// Charge la configuration depuis les variables d'environnement `PG*`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: var("PGHOST").unwrap_or(defaults.host),
            port: var("PGPORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            dbname: var("PGDATABASE").unwrap_or(defaults.dbname),
            user: var("PGUSER").unwrap_or(defaults.user),
            password: var("PGPASSWORD"),
            pool_size: var("POOL_SIZE")
                .and_then(|s| s.parse().ok())
                .filter(|&size| size > 0)
                .unwrap_or(defaults.pool_size),
            ssl_mode: var("PGSSLMODE")
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        }
    }

    fn deadpool_config(&self) -> Config {
        Config {
            host: Some(self.host.clone()),
            port: Some(self.port),
            dbname: Some(self.dbname.clone()),
            user: Some(self.user.clone()),
            password: self.password.clone(),
            pool: Some(PoolConfig {
                max_size: self.pool_size,
                timeouts: Timeouts {
                    wait: Some(POOL_WAIT),
                    create: Some(CONNECT_TIMEOUT),
                    recycle: Some(RECYCLE_TIMEOUT),
                },
                ..PoolConfig::default()
            }),
            ..Config::default()
        }
    }
}

/// Connecteur TLS sur les racines Mozilla embarquées
fn rustls_connector() -> MakeRustlsConnect {
    let roots: rustls::RootCertStore = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    MakeRustlsConnect::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

/// Crée un pool de connexions (aucune connexion n'est ouverte ici)
pub fn create_pool(config: &DatabaseConfig) -> Result<Pool> {
    debug!(
        host = %config.host,
        port = config.port,
        dbname = %config.dbname,
        pool_size = config.pool_size,
        ssl = ?config.ssl_mode,
        "Creating database pool"
    );

    let cfg = config.deadpool_config();
    let pool = if config.ssl_mode.uses_tls() {
        cfg.create_pool(Some(Runtime::Tokio1), rustls_connector())
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
    };
    pool.with_context(|| format!("Failed to create pool for {}:{}", config.host, config.port))
}

/// Teste la connexion à la base
pub async fn test_connection(pool: &Pool) -> Result<()> {
    let client = pool
        .get()
        .await
        .context("Failed to get connection from pool")?;
    client
        .execute("SELECT 1", &[])
        .await
        .context("Connection test failed")?;
    Ok(())
}
