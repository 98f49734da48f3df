//! Fenêtrage offset/limit d'une séquence ordonnée

use tracing::debug;

/// Intervalle de log de progression (items sautés ou limités)
const PROGRESS_INTERVAL: u64 = 100;

/// Décision pour un item de la séquence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Avant l'offset : ignoré
    Skip,
    /// Dans la fenêtre : transmis
    Pass,
    /// Après la limite : ignoré, la source peut être fermée
    Limited,
}

/// Filtre offset/limit
#[derive(Debug, Clone)]
pub struct Window {
    offset: u64,
    limit: Option<u64>,
    skipped: u64,
    passed: u64,
    limited: u64,
}

impl Window {
    /// `limit = None` : tout passe après l'offset
    pub fn new(offset: u64, limit: Option<u64>) -> Self {
        Self {
            offset,
            limit,
            skipped: 0,
            passed: 0,
            limited: 0,
        }
    }

    /// Décide du sort de l'item suivant
    pub fn admit(&mut self) -> Admission {
        if self.skipped < self.offset {
            self.skipped += 1;
            if self.skipped % PROGRESS_INTERVAL == 0 {
                debug!(skipped = self.skipped, offset = self.offset, "Skipping rows");
            }
            return Admission::Skip;
        }

        if self.is_exhausted() {
            self.limited += 1;
            if self.limited % PROGRESS_INTERVAL == 0 {
                debug!(limited = self.limited, "Rows beyond limit");
            }
            return Admission::Limited;
        }

        self.passed += 1;
        Admission::Pass
    }

    /// Vrai dès que `limit` items sont passés
    pub fn is_exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.passed >= limit)
    }

    pub fn passed(&self) -> u64 {
        self.passed
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn limited(&self) -> u64 {
        self.limited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn apply(window: &mut Window, items: std::ops::Range<u64>) -> Vec<u64> {
        items
            .filter(|_| window.admit() == Admission::Pass)
            .collect()
    }

    #[test]
    fn test_offset_and_limit() {
        let mut window = Window::new(5, Some(15));
        let passed = apply(&mut window, 1..26);
        assert_eq!(passed, (6..21).collect::<Vec<_>>());
        assert_eq!(window.skipped(), 5);
        assert_eq!(window.limited(), 5);
        assert!(window.is_exhausted());
    }

    #[test]
    fn test_no_offset_no_limit() {
        let mut window = Window::new(0, None);
        assert_eq!(apply(&mut window, 0..1000).len(), 1000);
        assert!(!window.is_exhausted());
    }

    #[test]
    fn test_offset_beyond_source() {
        let mut window = Window::new(50, Some(10));
        assert!(apply(&mut window, 0..20).is_empty());
        assert!(!window.is_exhausted());
    }

    #[test]
    fn test_exhausted_right_after_last_pass() {
        let mut window = Window::new(0, Some(2));
        assert_eq!(window.admit(), Admission::Pass);
        assert!(!window.is_exhausted());
        assert_eq!(window.admit(), Admission::Pass);
        assert!(window.is_exhausted());
        assert_eq!(window.admit(), Admission::Limited);
    }

    proptest! {
        #[test]
        fn prop_passes_expected_count(
            n in 0u64..500,
            offset in 0u64..600,
            limit in proptest::option::of(1u64..600),
        ) {
            let mut window = Window::new(offset, limit);
            let passed = apply(&mut window, 0..n);

            let available = n.saturating_sub(offset);
            let expected = limit.map_or(available, |l| available.min(l));
            prop_assert_eq!(passed.len() as u64, expected);

            // Ordre préservé, plage contiguë commençant à l'offset
            for (i, item) in passed.iter().enumerate() {
                prop_assert_eq!(*item, offset + i as u64);
            }
        }
    }
}
