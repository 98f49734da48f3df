//! Contrat d'écriture : mapping des lignes + écriture en base

use async_trait::async_trait;

/// Écrit des lignes dans la base cible.
///
/// L'implémentation possède le handle de base de données ; elle est partagée
/// par toutes les écritures concurrentes d'un run et doit donc tolérer des
/// écrivains simultanés. L'idempotence (upsert, `ON CONFLICT DO NOTHING`) est
/// de sa responsabilité.
#[async_trait]
pub trait RowWriter<R>: Send + Sync + 'static {
    /// Écrit un groupe de lignes, en une seule unité d'écriture
    async fn write_rows(&self, rows: &[R]) -> anyhow::Result<()>;

    /// Callback final, appelé une fois après la réconciliation
    async fn finalize(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

