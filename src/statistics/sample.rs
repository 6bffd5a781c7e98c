use rand::Rng;

use crate::types::TupleValue;

/// Classic reservoir sampling (algorithm R): every non-null value observed
/// so far had the same probability of being in the reservoir. The sample
/// backs the selectivity estimators; it is read-only during a tuning pass.
#[derive(Debug, Clone)]
pub struct ReservoirSample {
    capacity: usize,
    seen: u64,
    values: Vec<TupleValue>,
}

impl ReservoirSample {
    pub fn new(capacity: usize) -> ReservoirSample {
        assert!(capacity > 0);
        ReservoirSample {
            capacity,
            seen: 0,
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn observe(&mut self, value: &TupleValue) {
        self.seen += 1;
        if self.values.len() < self.capacity {
            self.values.push(value.clone());
        } else {
            let slot = rand::thread_rng().gen_range(0..self.seen);
            if (slot as usize) < self.capacity {
                self.values[slot as usize] = value.clone();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[TupleValue] {
        &self.values
    }

    /// Fraction of sampled values satisfying the predicate.
    pub fn fraction_matching<F: Fn(&TupleValue) -> bool>(&self, predicate: F) -> Option<f32> {
        if self.values.is_empty() {
            return None;
        }
        let hits = self.values.iter().filter(|v| predicate(v)).count();
        Some(hits as f32 / self.values.len() as f32)
    }
}
