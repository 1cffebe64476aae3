use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::HashMap;

/// A `Sampler` decides the order in which source indices are fed to the
/// batch loader.
///
/// # Method
/// - `iter(epoch)`: returns a sequential or shuffled sequence for that epoch.
///    - The epoch is mixed with the sampler's base seed so every epoch gets a
///      fresh but reproducible order.
///
/// The returned iterator owns all of its state, so the loader can keep pulling
/// from it while the sampler itself is long gone.
pub trait Sampler: Send + Sync {
    /// Number of indices a full iteration yields.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = usize> + Send>;
}

/// ============================================================================
/// Yields indices sequentially in order `(0,1,2,...,dataset_size-1)`.
///
/// # Examples
/// ```ignore
/// let sampler = SequentialSampler::new(5);
/// let indices: Vec<_> = sampler.iter(0).collect();
/// assert_eq!(indices, vec![0, 1, 2, 3, 4]);
/// ```
#[derive(Debug, Clone)]
pub struct SequentialSampler {
    dataset_size: usize,
}

impl SequentialSampler {
    pub fn new(dataset_size: usize) -> Self {
        Self { dataset_size }
    }
}

impl Sampler for SequentialSampler {
    fn len(&self) -> usize {
        self.dataset_size
    }

    fn iter(&self, _epoch: usize) -> Box<dyn Iterator<Item = usize> + Send> {
        Box::new(0..self.dataset_size)
    }
}

/// ============================================================================
/// Uniform random permutation of `0..dataset_size`, produced lazily by
/// [`ShuffledIndices`].
///
/// # Seed Handling
/// For each epoch the RNG is derived as `base_seed + epoch`, so:
/// - Same seed and epoch -> identical order (reproducible runs)
/// - Different epochs -> different orders
///
/// # Example usage
/// ```ignore
/// let sampler = ShuffleSampler::new(1_281_167, 42);
/// let first: Vec<_> = sampler.iter(0).take(4).collect();
/// ```
#[derive(Debug, Clone)]
pub struct ShuffleSampler {
    dataset_size: usize,
    base_seed: u64,
}

impl ShuffleSampler {
    pub fn new(dataset_size: usize, base_seed: u64) -> Self {
        Self {
            dataset_size,
            base_seed,
        }
    }

    /// Derives a deterministic random number generator for the given epoch
    #[inline]
    fn derive_rng_for_epoch(&self, epoch: usize) -> StdRng {
        StdRng::seed_from_u64(self.base_seed.wrapping_add(epoch as u64))
    }
}

impl Sampler for ShuffleSampler {
    fn len(&self) -> usize {
        self.dataset_size
    }

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = usize> + Send> {
        Box::new(ShuffledIndices::new(
            self.dataset_size,
            self.derive_rng_for_epoch(epoch),
        ))
    }
}

/// ============================================================================
/// Lazy Fisher-Yates shuffle of `0..n` that never materializes the full
/// permutation.
///
/// Walks `i` from `n-1` down to `0`, draws `j` in `[0, i]`, swaps the values
/// at `i` and `j` and yields the value now at `i`. Positions that were never
/// touched hold their own index, so only displaced values are stored in a
/// sparse map, and the entry for `i` is dropped as soon as it is yielded.
///
/// Each value of `0..n` comes out exactly once. Not restartable: create a new
/// instance for a new pass.
#[derive(Debug)]
pub struct ShuffledIndices<R> {
    remaining: usize,
    displaced: HashMap<usize, usize>,
    rng: R,
}

impl<R: Rng> ShuffledIndices<R> {
    pub fn new(n: usize, rng: R) -> Self {
        Self {
            remaining: n,
            displaced: HashMap::new(),
            rng,
        }
    }

    /// Number of positions currently holding a value other than their own index.
    pub fn pending_swaps(&self) -> usize {
        self.displaced.len()
    }
}

impl<R: Rng> Iterator for ShuffledIndices<R> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let i = self.remaining;
        let j = self.rng.random_range(0..=i);

        let value_at_i = self.displaced.remove(&i).unwrap_or(i);
        if j == i {
            return Some(value_at_i);
        }

        let value_at_j = self.displaced.get(&j).copied().unwrap_or(j);
        self.displaced.insert(j, value_at_i);
        Some(value_at_j)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<R: Rng> ExactSizeIterator for ShuffledIndices<R> {}
