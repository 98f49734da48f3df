//! Source en mémoire (tests, imports de petits volumes)

use std::collections::VecDeque;

use async_trait::async_trait;

use super::{FeatureSource, SourceError};

#[derive(Debug)]
pub struct MemorySource<T> {
    items: VecDeque<T>,
    /// Échoue après avoir produit ce nombre d'items
    fail_after: Option<u64>,
    produced: u64,
    closed: bool,
}

impl<T> MemorySource<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().collect(),
            fail_after: None,
            produced: 0,
            closed: false,
        }
    }

    /// Simule une erreur de lecture après `count` items
    pub fn failing_after(mut self, count: u64) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Nombre d'items effectivement lus
    pub fn produced(&self) -> u64 {
        self.produced
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Items jamais lus
    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> FeatureSource for MemorySource<T> {
    type Item = T;

    async fn next(&mut self) -> Result<Option<T>, SourceError> {
        if self.closed {
            return Ok(None);
        }
        if self.fail_after == Some(self.produced) {
            return Err(SourceError::Other(format!(
                "read failed after {} items",
                self.produced
            )));
        }

        // Point de suspension, comme une vraie lecture
        tokio::task::yield_now().await;

        let item = self.items.pop_front();
        if item.is_some() {
            self.produced += 1;
        }
        Ok(item)
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
