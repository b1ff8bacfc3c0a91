//! Deterministic subsampling of non-cases

use std::hash::Hasher;

use rustc_hash::FxHasher;

/// Fixed hash of a subject key.
///
/// `FxHasher` has no random state, so the value is the same on every run
/// and every machine.
#[must_use]
pub fn key_hash(key: u64) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write_u64(key);
    hasher.finish()
}

/// Keeps all cases and one in `modulus` non-cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampler {
    modulus: u64,
}

impl Sampler {
    /// `modulus` is clamped to at least 1, which retains every non-case
    #[must_use]
    pub const fn new(modulus: u64) -> Self {
        Self {
            modulus: if modulus == 0 { 1 } else { modulus },
        }
    }

    #[must_use]
    pub const fn modulus(&self) -> u64 {
        self.modulus
    }

    #[must_use]
    pub fn retain(&self, key: u64, is_case: bool) -> bool {
        is_case || key_hash(key) % self.modulus == 0
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new(10)
    }
}
