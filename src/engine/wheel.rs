//! The bucket wheel: a ring of per-slot accumulator maps rotating under the
//! heartbeat.

use std::collections::HashMap;
use std::io::Cursor;

/// A ring of `slots` maps from metric name to accumulator. Exactly one slot
/// is current at any time; [`BucketWheel::advance`] moves it forward by one,
/// wrapping at the end. Writes are spread across slots by hashing the metric
/// name, so each advance only flushes the names that landed in that slot.
#[derive(Debug)]
pub struct BucketWheel<A> {
    slots: Vec<HashMap<String, A>>,
    current: usize,
}

impl<A: Default> BucketWheel<A> {
    /// Creates a wheel with `slot_count` empty slots. `slot_count` must be
    /// positive; configuration validation guarantees this upstream.
    pub fn new(slot_count: usize) -> Self {
        debug_assert!(slot_count > 0, "wheel needs at least one slot");
        Self {
            slots: (0..slot_count).map(|_| HashMap::new()).collect(),
            current: 0,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Applies `f` to the accumulator for `name` in its hash-assigned slot,
    /// inserting a default accumulator on first sight.
    pub fn record(&mut self, name: &str, f: impl FnOnce(&mut A)) {
        let slot = hash_slot(name, self.slots.len());
        let acc = self.slots[slot].entry(name.to_string()).or_default();
        f(acc);
    }

    /// Takes the whole current slot map, leaving it empty. Keys with
    /// accumulated-but-unemittable state are cleared along with the rest.
    pub fn drain_current(&mut self) -> HashMap<String, A> {
        std::mem::take(&mut self.slots[self.current])
    }

    /// Moves the current-slot pointer forward by one, wrapping modulo the
    /// slot count.
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }
}

/// Hash-assigns a metric name to a slot: `murmurhash3_32(name) mod slots`.
pub fn hash_slot(name: &str, slots: usize) -> usize {
    let hash = murmur3::murmur3_32(&mut Cursor::new(name.as_bytes()), 0)
        .expect("reading from an in-memory cursor cannot fail");
    hash as usize % slots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates_in_one_slot() {
        let mut wheel: BucketWheel<f64> = BucketWheel::new(10);
        wheel.record("hits", |sum| *sum += 1.0);
        wheel.record("hits", |sum| *sum += 2.0);

        let slot = hash_slot("hits", 10);
        assert_eq!(wheel.slots[slot].get("hits"), Some(&3.0));

        // Every other slot stays empty.
        for (i, map) in wheel.slots.iter().enumerate() {
            if i != slot {
                assert!(map.is_empty());
            }
        }
    }

    #[test]
    fn test_hash_slot_is_stable() {
        assert_eq!(hash_slot("foo", 60), hash_slot("foo", 60));
        assert_eq!(hash_slot("foo", 10), hash_slot("foo", 10));
    }

    #[test]
    fn test_drain_current_empties_the_slot() {
        let mut wheel: BucketWheel<f64> = BucketWheel::new(1);
        wheel.record("a", |sum| *sum += 5.0);

        let drained = wheel.drain_current();
        assert_eq!(drained.get("a"), Some(&5.0));
        assert!(wheel.slots[0].is_empty());
    }

    #[test]
    fn test_slot_cycling() {
        // After `slots` advances the pointer returns to its origin, visiting
        // every slot exactly once on the way.
        let mut wheel: BucketWheel<Vec<f64>> = BucketWheel::new(10);
        let mut visited = Vec::with_capacity(10);

        for _ in 0..10 {
            visited.push(wheel.current_slot());
            wheel.advance();
        }

        assert_eq!(wheel.current_slot(), 0);
        let mut sorted = visited.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 10, "no slot visited twice: {visited:?}");
    }

    #[test]
    fn test_advance_wraps() {
        let mut wheel: BucketWheel<f64> = BucketWheel::new(3);
        wheel.advance();
        wheel.advance();
        wheel.advance();
        assert_eq!(wheel.current_slot(), 0);
    }

    #[test]
    fn test_distinct_names_spread_across_slots() {
        // Not a distribution guarantee, but with 200 names and 60 slots at
        // least two slots must be populated unless the hash is broken.
        let mut wheel: BucketWheel<f64> = BucketWheel::new(60);
        for i in 0..200 {
            wheel.record(&format!("metric.{i}"), |sum| *sum += 1.0);
        }
        let populated = wheel.slots.iter().filter(|m| !m.is_empty()).count();
        assert!(populated > 1, "all names hashed to one slot");
    }
}
