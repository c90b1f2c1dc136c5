//! Per-ciphertext noise budget tracking
//!
//! Ciphertexts carry a `log2`-scale noise estimate rather than a literal
//! norm; `NoiseMgr` centralizes the closed-form update rules so `fhe.rs`
//! doesn't duplicate the bound arithmetic at every call site.

use serde::{Deserialize, Serialize};

/// A ciphertext's noise-tracking state: the `log2`-scale estimate used to
/// decide when to bootstrap, and a fallback operation counter.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct NoiseState {
    /// `log2` of the estimated noise magnitude relative to a fresh
    /// ciphertext's baseline.
    pub estimate: f64,
    /// Number of homomorphic operations applied since the last encrypt or
    /// bootstrap; a coarse fallback heuristic independent of the estimate.
    pub operations_since_fresh: u32,
}

impl NoiseState {
    /// The baseline noise estimate of a freshly encrypted ciphertext.
    pub const FRESH: f64 = 1.0;

    /// State for a just-encrypted or just-bootstrapped ciphertext.
    pub fn fresh() -> Self {
        NoiseState { estimate: Self::FRESH, operations_since_fresh: 0 }
    }
}

/// Tracks and updates noise estimates; owns the bootstrap threshold a
/// scheme instance was configured with.
#[derive(Clone, Copy, Debug)]
pub struct NoiseMgr {
    threshold: f64,
}

impl NoiseMgr {
    /// Build a manager that flags bootstrap once an estimate reaches
    /// `threshold`.
    pub fn new(threshold: f64) -> Self {
        NoiseMgr { threshold }
    }

    /// The configured bootstrap threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Noise after adding two ciphertexts: the estimate is monotone
    /// non-decreasing, growing by a small constant term representing the
    /// extra coefficient-wise addition (`log2(1 + ...)`, approximated here
    /// as `log2(2) = 1` per add since the two noise terms are independent
    /// and roughly equal in magnitude).
    pub fn after_add(&self, a: NoiseState, b: NoiseState) -> NoiseState {
        NoiseState {
            estimate: a.estimate.max(b.estimate) + 1.0,
            operations_since_fresh: a.operations_since_fresh.max(b.operations_since_fresh) + 1,
        }
    }

    /// Noise after multiplying two ciphertexts: grows by the sum of the
    /// operand estimates plus a ring-norm-dependent term (`log2(n)`,
    /// reflecting the degree-`n` convolution that couples every
    /// coefficient of one operand with every coefficient of the other).
    pub fn after_multiply(&self, a: NoiseState, b: NoiseState, ring_degree: usize) -> NoiseState {
        let ring_term = (ring_degree.max(2) as f64).log2();
        NoiseState {
            estimate: a.estimate + b.estimate + ring_term,
            operations_since_fresh: a.operations_since_fresh.max(b.operations_since_fresh) + 1,
        }
    }

    /// Noise after a scalar multiply: grows by `log2(||k||)`, the bit-length
    /// of the scalar's magnitude (clamped to be non-negative, since scalars
    /// of magnitude 0 or 1 should not grow the estimate).
    pub fn after_scalar_mul(&self, a: NoiseState, scalar_bits: u64) -> NoiseState {
        let growth = (scalar_bits as f64).max(0.0);
        NoiseState {
            estimate: a.estimate + growth,
            operations_since_fresh: a.operations_since_fresh + 1,
        }
    }

    /// Noise after a key-switch (relinearization or rotation): grows by a
    /// small constant reflecting the extra digit-decomposition rounding
    /// error introduced by the key-switching key.
    pub fn after_key_switch(&self, a: NoiseState) -> NoiseState {
        NoiseState {
            estimate: a.estimate + 2.0,
            operations_since_fresh: a.operations_since_fresh + 1,
        }
    }

    /// Reset to the fresh baseline, as happens after a successful
    /// bootstrap.
    pub fn after_bootstrap(&self) -> NoiseState {
        NoiseState::fresh()
    }

    /// Whether `state` has crossed this manager's bootstrap threshold.
    pub fn should_bootstrap(&self, state: NoiseState) -> bool {
        state.estimate >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_is_monotone_non_decreasing_across_add() {
        let mgr = NoiseMgr::new(40.0);
        let a = NoiseState::fresh();
        let b = NoiseState::fresh();
        let sum = mgr.after_add(a, b);
        assert!(sum.estimate >= a.estimate.max(b.estimate));
    }

    #[test]
    fn estimate_is_monotone_non_decreasing_across_multiply() {
        let mgr = NoiseMgr::new(40.0);
        let a = NoiseState::fresh();
        let b = NoiseState::fresh();
        let prod = mgr.after_multiply(a, b, 4096);
        assert!(prod.estimate > a.estimate.max(b.estimate));
    }

    #[test]
    fn bootstrap_resets_below_threshold() {
        let mgr = NoiseMgr::new(40.0);
        let exhausted = NoiseState { estimate: 45.0, operations_since_fresh: 10 };
        assert!(mgr.should_bootstrap(exhausted));
        let refreshed = mgr.after_bootstrap();
        assert!(!mgr.should_bootstrap(refreshed));
    }

    #[test]
    fn should_bootstrap_triggers_at_threshold() {
        let mgr = NoiseMgr::new(10.0);
        assert!(mgr.should_bootstrap(NoiseState { estimate: 10.0, operations_since_fresh: 1 }));
        assert!(!mgr.should_bootstrap(NoiseState { estimate: 9.99, operations_since_fresh: 1 }));
    }
}
