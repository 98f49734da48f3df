//! Regroupement en batches de taille fixe

use super::types::{Batch, BatchId};

/// Accumule des lignes et émet des batches identifiés
#[derive(Debug)]
pub struct Batcher<R> {
    batch_size: usize,
    next_id: u64,
    pending: Vec<R>,
}

impl<R> Batcher<R> {
    /// `batch_size` doit être >= 1 (validé en amont par la requête)
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            next_id: 1,
            pending: Vec::with_capacity(batch_size),
        }
    }

    /// Ajoute une ligne ; retourne un batch complet le cas échéant
    pub fn push(&mut self, row: R) -> Option<Batch<R>> {
        self.pending.push(row);
        if self.pending.len() >= self.batch_size {
            Some(self.emit())
        } else {
            None
        }
    }

    /// Émet le dernier batch partiel en fin de séquence
    pub fn flush(&mut self) -> Option<Batch<R>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.emit())
        }
    }

    /// Nombre de batches émis
    pub fn batches_emitted(&self) -> u64 {
        self.next_id - 1
    }

    fn emit(&mut self) -> Batch<R> {
        let rows = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        let id = BatchId(self.next_id);
        self.next_id += 1;
        Batch { id, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn batch_all(items: Vec<u32>, size: usize) -> Vec<Batch<u32>> {
        let mut batcher = Batcher::new(size);
        let mut batches: Vec<_> = items.into_iter().filter_map(|i| batcher.push(i)).collect();
        batches.extend(batcher.flush());
        batches
    }

    #[test]
    fn test_sizes_and_ids() {
        let batches = batch_all((6..21).collect(), 10);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 10);
        assert_eq!(batches[1].len(), 5);
        assert_eq!(batches[0].id, BatchId(1));
        assert_eq!(batches[1].id, BatchId(2));
        assert_eq!(batches[1].rows, vec![16, 17, 18, 19, 20]);
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_batch() {
        let mut batcher = Batcher::new(5);
        let full: Vec<_> = (0..10).filter_map(|i| batcher.push(i)).collect();
        assert_eq!(full.len(), 2);
        assert!(batcher.flush().is_none());
        assert_eq!(batcher.batches_emitted(), 2);
    }

    #[test]
    fn test_empty_sequence() {
        assert!(batch_all(Vec::new(), 3).is_empty());
    }

    proptest! {
        #[test]
        fn prop_batch_count_and_sizes(n in 0usize..400, size in 1usize..50) {
            let items: Vec<u32> = (0..n as u32).collect();
            let batches = batch_all(items.clone(), size);

            prop_assert_eq!(batches.len(), n.div_ceil(size));
            if let Some((last, full)) = batches.split_last() {
                prop_assert!(full.iter().all(|b| b.len() == size));
                prop_assert!(last.len() >= 1 && last.len() <= size);
            }

            let flattened: Vec<u32> = batches.iter().flat_map(|b| b.rows.clone()).collect();
            prop_assert_eq!(flattened, items);

            for pair in batches.windows(2) {
                prop_assert!(pair[0].id < pair[1].id);
            }
        }
    }
}
