//! Seeded random number generator.
//!
//! Every random decision of a run (topology sampling, per-node fanout choice)
//! goes through a [`SimulationRng`]. Each owner holds its own instance; nodes
//! get children derived from the run's root RNG so they never share state.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::{rngs::SmallRng, seq::SliceRandom, Rng, SeedableRng};

use crate::graph::Vertex;

/// A seeded, owner-local random number generator.
///
/// Two instances created from the same seed produce identical sequences, which
/// makes topologies and fanout choices reproducible when a seed is injected.
#[derive(Clone)]
pub struct SimulationRng {
    inner: SmallRng,
    seed: u64,
}

impl SimulationRng {
    /// Creates a new simulation RNG with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            inner: SmallRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Seeds from the current wall clock.
    pub fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self::new(nanos)
    }

    /// Returns the seed used to create this RNG.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform vertex in `1..=num_vertices`.
    pub fn gen_vertex(&mut self, num_vertices: Vertex) -> Vertex {
        self.inner.gen_range(1..=num_vertices)
    }

    pub fn gen_u64(&mut self) -> u64 {
        self.inner.gen()
    }

    /// Shuffles a slice in place.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        slice.shuffle(&mut self.inner);
    }

    /// Uniform sample of `amount` distinct elements (shuffle, then take a prefix).
    pub fn sample<T: Clone>(&mut self, items: &[T], amount: usize) -> Vec<T> {
        let mut items = items.to_vec();
        self.shuffle(&mut items);
        items.truncate(amount);
        items
    }

    /// Creates a child RNG whose seed only depends on this RNG's seed and
    /// `index`, regardless of how much of this RNG was consumed.
    pub fn child_with_index(&self, index: u64) -> Self {
        let derived_seed = self
            .seed
            .wrapping_mul(0x517cc1b727220a95)
            .wrapping_add(index);
        Self::new(derived_seed)
    }
}

impl std::fmt::Debug for SimulationRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationRng")
            .field("seed", &self.seed)
            .finish()
    }
}
