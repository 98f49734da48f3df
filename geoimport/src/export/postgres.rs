//! Écriture des features GeoJSON dans PostgreSQL/PostGIS

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use geojson::{feature::Id, Feature};
use geostream::RawFeature;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use crate::pipeline::RowWriter;

/// Identifiant SQL non quoté (limite PostgreSQL : 63 octets)
const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]{0,62}$";

/// Table cible d'un import
#[derive(Debug, Clone, PartialEq)]
pub struct TableTarget {
    pub schema: String,
    pub table: String,
    /// SRID affecté aux géométries (4326 pour du GeoJSON standard)
    pub srid: i32,
    /// Propriété servant d'identifiant ; à défaut, l'`id` GeoJSON
    pub id_property: Option<String>,
}

impl TableTarget {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            srid: 4326,
            id_property: None,
        }
    }

    /// Vérifie que schéma et table sont des identifiants SQL sûrs
    pub fn validate(&self) -> Result<()> {
        let pattern = Regex::new(IDENTIFIER_PATTERN)?;
        for (kind, name) in [("schema", &self.schema), ("table", &self.table)] {
            if !pattern.is_match(name) {
                bail!("Invalid {kind} name: {name:?}");
            }
        }
        Ok(())
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// Ligne prête à insérer
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    /// Identifiant explicite, ou hash du contenu à défaut
    pub feature_id: String,
    /// Propriétés sérialisées (objet JSON)
    pub properties: String,
    /// Géométrie GeoJSON sérialisée, `None` pour une géométrie nulle
    pub geometry: Option<String>,
}

/// Writer par défaut : une transaction par appel, doublons ignorés
pub struct PostgresWriter {
    pool: Pool,
    target: TableTarget,
    insert_sql: String,
    analyze: bool,
}

impl PostgresWriter {
    pub fn new(pool: Pool, target: TableTarget) -> Result<Self> {
        target.validate()?;
        let insert_sql = format!(
            "INSERT INTO {} (feature_id, properties, geometry) \
             VALUES ($1, $2::text::jsonb, ST_SetSRID(ST_GeomFromGeoJSON($3), $4)) \
             ON CONFLICT DO NOTHING",
            target.qualified_name()
        );

        Ok(Self {
            pool,
            target,
            insert_sql,
            analyze: false,
        })
    }

    /// Lance `ANALYZE` sur la table en fin d'import
    pub fn with_analyze(mut self, analyze: bool) -> Self {
        self.analyze = analyze;
        self
    }

    /// Crée la table cible si elle n'existe pas
    pub async fn create_table(&self) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get connection from pool")?;

        client
            .execute(
                &format!("CREATE SCHEMA IF NOT EXISTS {}", self.target.schema),
                &[],
            )
            .await
            .context("Failed to create schema")?;

        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                row_id BIGSERIAL PRIMARY KEY,
                feature_id TEXT NOT NULL UNIQUE,
                properties JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                geometry geometry(Geometry, {})
            )
            "#,
            self.target.qualified_name(),
            self.target.srid
        );
        client
            .execute(&sql, &[])
            .await
            .with_context(|| format!("Failed to create table {}", self.target.qualified_name()))?;

        info!(table = %self.target.qualified_name(), "Target table ready");
        Ok(())
    }

    /// Décode une feature brute et la mappe vers les colonnes de la table.
    ///
    /// Une feature indécodable (géométrie invalide...) est une erreur de ligne.
    pub fn to_row(&self, raw: &RawFeature) -> Result<FeatureRow> {
        let feature = raw
            .decode()
            .with_context(|| format!("Invalid feature at index {}", raw.index))?;

        let properties = match &feature.properties {
            Some(map) => serde_json::to_string(map).context("Failed to serialize properties")?,
            None => "{}".to_string(),
        };
        let geometry = feature
            .geometry
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize geometry")?;

        let feature_id = match feature_id(&feature, self.target.id_property.as_deref()) {
            Some(id) => id,
            None => content_id(&feature)?,
        };

        Ok(FeatureRow {
            feature_id,
            properties,
            geometry,
        })
    }
}

/// Identifiant d'une feature : propriété configurée, sinon `id` GeoJSON
pub fn feature_id(feature: &Feature, id_property: Option<&str>) -> Option<String> {
    match id_property {
        Some(name) => match feature.property(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        },
        None => match feature.id.as_ref()? {
            Id::String(s) => Some(s.clone()),
            Id::Number(n) => Some(n.to_string()),
        },
    }
}

/// Identifiant stable d'une feature sans id : hash blake3 de sa forme sérialisée.
///
/// Préfixé pour ne pas entrer en collision avec les identifiants explicites.
pub fn content_id(feature: &Feature) -> Result<String> {
    let canonical = serde_json::to_vec(feature).context("Failed to serialize feature")?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(&canonical);
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

#[async_trait]
impl RowWriter<RawFeature> for PostgresWriter {
    async fn write_rows(&self, features: &[RawFeature]) -> Result<()> {
        if features.is_empty() {
            return Ok(());
        }

        let rows = features
            .iter()
            .map(|f| self.to_row(f))
            .collect::<Result<Vec<_>>>()?;

        let mut client = self
            .pool
            .get()
            .await
            .context("Failed to get connection from pool")?;
        let tx = client
            .transaction()
            .await
            .context("Failed to begin transaction")?;
        let stmt = tx
            .prepare_cached(&self.insert_sql)
            .await
            .context("Failed to prepare insert")?;

        let mut inserted = 0u64;
        for row in &rows {
            inserted += tx
                .execute(
                    &stmt,
                    &[
                        &row.feature_id,
                        &row.properties,
                        &row.geometry,
                        &self.target.srid,
                    ],
                )
                .await
                .with_context(|| format!("Failed to insert feature {}", row.feature_id))?;
        }

        tx.commit().await.context("Failed to commit")?;

        debug!(
            table = %self.target.qualified_name(),
            rows = rows.len(),
            inserted,
            duplicates = rows.len() as u64 - inserted,
            "Rows written"
        );
        Ok(())
    }

    async fn finalize(&self) -> Result<()> {
        if !self.analyze {
            return Ok(());
        }

        let client = self
            .pool
            .get()
            .await
            .context("Failed to get connection from pool")?;
        client
            .execute(&format!("ANALYZE {}", self.target.qualified_name()), &[])
            .await
            .with_context(|| format!("Failed to analyze {}", self.target.qualified_name()))?;

        info!(table = %self.target.qualified_name(), "Table analyzed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::pool::{create_pool, DatabaseConfig};
    use serde_json::json;

    fn feature(value: serde_json::Value) -> Feature {
        serde_json::from_value(value).unwrap()
    }

    fn raw(value: serde_json::Value) -> RawFeature {
        RawFeature {
            index: 0,
            offset: 0,
            bytes: serde_json::to_vec(&value).unwrap().into(),
        }
    }

    #[test]
    fn test_identifier_validation() {
        assert!(TableTarget::new("public", "parcelles").validate().is_ok());
        assert!(TableTarget::new("_staging", "t2024").validate().is_ok());
        assert!(TableTarget::new("public", "2024").validate().is_err());
        assert!(TableTarget::new("public", "a;DROP TABLE x").validate().is_err());
        assert!(TableTarget::new("public.x", "t").validate().is_err());
        assert!(TableTarget::new("", "t").validate().is_err());
        assert!(TableTarget::new("public", "a".repeat(64)).validate().is_err());
    }

    #[test]
    fn test_feature_id_extraction() {
        let f = feature(json!({
            "type": "Feature",
            "id": 42,
            "geometry": null,
            "properties": {"code": "38185000AB0012", "num": 12, "flag": true}
        }));

        assert_eq!(feature_id(&f, None).as_deref(), Some("42"));
        assert_eq!(feature_id(&f, Some("code")).as_deref(), Some("38185000AB0012"));
        assert_eq!(feature_id(&f, Some("num")).as_deref(), Some("12"));
        assert_eq!(feature_id(&f, Some("flag")), None);
        assert_eq!(feature_id(&f, Some("missing")), None);

        let anonymous = feature(json!({"type": "Feature", "geometry": null, "properties": null}));
        assert_eq!(feature_id(&anonymous, None), None);
    }

    #[tokio::test]
    async fn test_row_mapping() {
        let pool = create_pool(&DatabaseConfig::default()).unwrap();
        let writer = PostgresWriter::new(pool, TableTarget::new("public", "features")).unwrap();

        let f = raw(json!({
            "type": "Feature",
            "id": "a-1",
            "geometry": {"type": "Point", "coordinates": [5.7, 45.1]},
            "properties": {"nom": "Grenoble"}
        }));
        let row = writer.to_row(&f).unwrap();
        assert_eq!(row.feature_id, "a-1");
        assert_eq!(row.properties, r#"{"nom":"Grenoble"}"#);

        let geometry: serde_json::Value =
            serde_json::from_str(row.geometry.as_deref().unwrap()).unwrap();
        assert_eq!(geometry["type"], "Point");

        let empty = raw(json!({"type": "Feature", "geometry": null, "properties": null}));
        let row = writer.to_row(&empty).unwrap();
        assert_eq!(row.properties, "{}");
        assert_eq!(row.geometry, None);
        assert!(row.feature_id.starts_with("blake3:"));
    }

    #[tokio::test]
    async fn test_invalid_geometry_is_row_error() {
        let pool = create_pool(&DatabaseConfig::default()).unwrap();
        let writer = PostgresWriter::new(pool, TableTarget::new("public", "features")).unwrap();

        let bad = RawFeature {
            index: 4,
            offset: 0,
            bytes: r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[1]},"properties":{}}"#
                .into(),
        };
        let error = writer.to_row(&bad).unwrap_err();
        assert!(format!("{error:#}").contains("Invalid feature at index 4"));

        // Écriture rejetée avant toute connexion
        assert!(writer.write_rows(&[bad]).await.is_err());
    }

    #[test]
    fn test_content_id_is_stable() {
        let a = feature(json!({"type": "Feature", "geometry": null, "properties": {"x": 1, "y": 2}}));
        let b = feature(json!({"type": "Feature", "geometry": null, "properties": {"x": 1, "y": 2}}));
        let c = feature(json!({"type": "Feature", "geometry": null, "properties": {"x": 1, "y": 3}}));

        let id = content_id(&a).unwrap();
        assert_eq!(id, content_id(&b).unwrap());
        assert_ne!(id, content_id(&c).unwrap());
        assert_eq!(id.len(), "blake3:".len() + 64);
    }

    #[tokio::test]
    async fn test_missing_id_property_falls_back_to_content_id() {
        let pool = create_pool(&DatabaseConfig::default()).unwrap();
        let target = TableTarget {
            id_property: Some("code".into()),
            ..TableTarget::new("public", "features")
        };
        let writer = PostgresWriter::new(pool, target).unwrap();

        let value = json!({"type": "Feature", "geometry": null, "properties": {"nom": "x"}});
        let first = writer.to_row(&raw(value.clone())).unwrap();
        let second = writer.to_row(&raw(value)).unwrap();
        assert_eq!(first.feature_id, second.feature_id);
        assert!(first.feature_id.starts_with("blake3:"));
    }

    #[tokio::test]
    async fn test_insert_sql_uses_qualified_name() {
        let pool = create_pool(&DatabaseConfig::default()).unwrap();
        let writer = PostgresWriter::new(pool, TableTarget::new("cadastre", "parcelles")).unwrap();
        assert!(writer
            .insert_sql
            .starts_with("INSERT INTO cadastre.parcelles (feature_id, properties, geometry)"));
        assert!(writer.insert_sql.ends_with("ON CONFLICT DO NOTHING"));
    }

    #[tokio::test]
    async fn test_rejects_unsafe_table() {
        let pool = create_pool(&DatabaseConfig::default()).unwrap();
        assert!(PostgresWriter::new(pool, TableTarget::new("public", "x y")).is_err());
    }
}
