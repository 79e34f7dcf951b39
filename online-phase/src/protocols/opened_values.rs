//! Defines the store of values that have been opened but whose MACs have not
//! yet been checked

use crate::algebra::{Scalar, ScalarShare};

/// Accumulates `(share, plaintext)` pairs produced by openings
///
/// The only way to read the store is to drain it, so every pair is handed to
/// exactly one MAC check
#[derive(Debug, Default)]
pub struct OpenedValueStore {
    /// The local shares of the opened values
    shares: Vec<ScalarShare>,
    /// The opened plaintexts, aligned with `shares`
    values: Vec<Scalar>,
}

impl OpenedValueStore {
    /// Constructor
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an opened value
    pub fn push(&mut self, share: ScalarShare, value: Scalar) {
        self.shares.push(share);
        self.values.push(value);
    }

    /// Record a batch of opened values
    pub fn push_batch(&mut self, shares: Vec<ScalarShare>, values: Vec<Scalar>) {
        assert_eq!(shares.len(), values.len(), "each opened share needs a plaintext");
        self.shares.extend(shares);
        self.values.extend(values);
    }

    /// Whether any value awaits a MAC check
    pub fn has_pending_values(&self) -> bool {
        !self.shares.is_empty()
    }

    /// Whether at least `threshold` values await a MAC check
    pub fn exceeds_threshold(&self, threshold: usize) -> bool {
        self.shares.len() >= threshold
    }

    /// The number of values awaiting a MAC check
    pub fn len(&self) -> usize {
        self.shares.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Drain the store, returning the shares and plaintexts as parallel
    /// sequences
    pub fn pop_values(&mut self) -> (Vec<ScalarShare>, Vec<Scalar>) {
        (std::mem::take(&mut self.shares), std::mem::take(&mut self.values))
    }
}

#[cfg(test)]
mod test {
    use rand::thread_rng;

    use crate::{
        algebra::{Scalar, ScalarShare},
        test_helpers::test_modulus,
    };

    use super::OpenedValueStore;

    /// Build a random opened pair
    fn random_pair() -> (ScalarShare, Scalar) {
        let mut rng = thread_rng();
        let m = test_modulus();
        let share = ScalarShare::new(Scalar::random(&m, &mut rng), Scalar::random(&m, &mut rng));
        (share, Scalar::random(&m, &mut rng))
    }

    /// Tests that draining returns each pushed pair exactly once
    #[test]
    fn test_drain_idempotence() {
        let mut store = OpenedValueStore::new();
        assert!(!store.has_pending_values());

        let pairs: Vec<_> = (0..5).map(|_| random_pair()).collect();
        for (share, value) in pairs.iter().cloned() {
            store.push(share, value);
        }
        assert!(store.exceeds_threshold(5));
        assert!(!store.exceeds_threshold(6));

        let (shares, values) = store.pop_values();
        assert_eq!(shares.len(), 5);
        assert_eq!(values, pairs.iter().map(|(_, v)| v.clone()).collect::<Vec<_>>());

        let (shares, values) = store.pop_values();
        assert!(shares.is_empty() && values.is_empty());
        assert!(!store.has_pending_values());

        let (share, value) = random_pair();
        store.push(share.clone(), value.clone());
        assert_eq!(store.pop_values(), (vec![share], vec![value]));
    }
}
