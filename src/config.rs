//! Configuration surface: security tiers, ring parameters, recognized options.
//!
//! This crate does not read environment variables or files itself —
//! `HecConfig` is plain `serde`-able data that an embedding application loads
//! however it loads its own configuration, then hands to the scheme
//! constructors.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::{HecError, HecResult};

/// Security tier, selecting a default ring parameter set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// 128-bit security: n = 4096.
    Bits128,
    /// 192-bit security: n = 8192.
    Bits192,
    /// 256-bit security: n = 16384.
    Bits256,
}

impl SecurityLevel {
    /// Ring-dimension default for this tier, per the table in spec §6.
    pub fn default_n(&self) -> usize {
        match self {
            SecurityLevel::Bits128 => 4096,
            SecurityLevel::Bits192 => 8192,
            SecurityLevel::Bits256 => 16384,
        }
    }

    /// Approximate target bit-length of the ciphertext modulus `q` for this
    /// tier. The CRT basis is built by multiplying NTT-friendly primes until
    /// this bound is reached or exceeded.
    pub fn target_q_bits(&self) -> u32 {
        match self {
            SecurityLevel::Bits128 => 109,
            SecurityLevel::Bits192 => 218,
            SecurityLevel::Bits256 => 438,
        }
    }
}

/// Ring parameters shared by a scheme instance: `n`, `q` (as a CRT prime
/// basis), `t`, and the Gaussian noise width `σ`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RingParams {
    /// Polynomial degree, a power of two ≥ 1024.
    pub n: usize,
    /// CRT basis of pairwise-coprime NTT-friendly primes whose product is
    /// the ciphertext modulus `q`.
    pub coeff_modulus: Vec<u64>,
    /// Plaintext modulus `t`.
    pub plain_modulus: u64,
    /// Gaussian noise standard deviation, default ≈ 3.2.
    pub sigma: f64,
    /// Optional SIMD batch slot count (requires a 2n-th root of unity mod t).
    pub batch_size: Option<usize>,
}

impl RingParams {
    /// The ciphertext modulus `q = ∏ coeff_modulus`, as a `BigUint`.
    pub fn q(&self) -> BigUint {
        self.coeff_modulus
            .iter()
            .fold(BigUint::from(1u32), |acc, &p| acc * BigUint::from(p))
    }

    /// Validate the structural invariants required by NTT/Ring/FHE: `n`
    /// is a power of two ≥ 1024, every CRT prime is ≡ 1 (mod 2n) so a
    /// primitive 2n-th root of unity exists, and `t` is nonzero and smaller
    /// than every CRT prime (so reduction mod `t` after CRT-join is sound).
    pub fn validate(&self) -> HecResult<()> {
        if self.n < 1024 || !self.n.is_power_of_two() {
            return Err(HecError::InvalidParameters(format!(
                "poly_modulus_degree {} must be a power of two >= 1024",
                self.n
            )));
        }
        if self.coeff_modulus.is_empty() {
            return Err(HecError::InvalidParameters(
                "coeff_modulus must contain at least one prime".into(),
            ));
        }
        let two_n = 2 * self.n as u64;
        for &p in &self.coeff_modulus {
            if p % two_n != 1 {
                return Err(HecError::InvalidParameters(format!(
                    "coeff_modulus prime {p} is not NTT-friendly for n={}: p mod 2n != 1",
                    self.n
                )));
            }
        }
        if self.plain_modulus == 0 {
            return Err(HecError::InvalidParameters("plain_modulus must be nonzero".into()));
        }
        for &p in &self.coeff_modulus {
            if self.plain_modulus >= p {
                return Err(HecError::InvalidParameters(
                    "plain_modulus must be smaller than every coeff_modulus prime".into(),
                ));
            }
        }
        if self.sigma <= 0.0 {
            return Err(HecError::InvalidParameters("sigma must be positive".into()));
        }
        Ok(())
    }

    /// A conservative, known-good parameter set for the given security
    /// tier, with `plain_modulus = 1024`. Callers that need batching or a
    /// different plaintext modulus should override `coeff_modulus`/
    /// `plain_modulus` and re-validate.
    pub fn for_security_level(level: SecurityLevel) -> Self {
        // NTT-friendly primes (p ≡ 1 mod 2n for the matching n) generated
        // offline; one prime per tier keeps the preset small, callers needing
        // deeper multiplicative depth extend `coeff_modulus` explicitly.
        let (n, primes): (usize, &[u64]) = match level {
            SecurityLevel::Bits128 => (4096, &[0x100000000000e001u64, 0x1000000000024001u64]),
            SecurityLevel::Bits192 => (
                8192,
                &[
                    0x1000000000024001u64,
                    0x1000000000054001u64,
                    0x100000000005c001u64,
                    0x1000000000078001u64,
                ],
            ),
            SecurityLevel::Bits256 => (
                16384,
                &[
                    0x1000000000078001u64,
                    0x10000000001d0001u64,
                    0x1000000000248001u64,
                    0x1000000000588001u64,
                    0x10000000006d8001u64,
                    0x10000000006e0001u64,
                    0x1000000000860001u64,
                    0x1000000000870001u64,
                ],
            ),
        };
        RingParams {
            n,
            coeff_modulus: primes.to_vec(),
            plain_modulus: 1024,
            sigma: 3.2,
            batch_size: None,
        }
    }
}

/// Top-level recognized configuration options (spec §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HecConfig {
    /// Selects the default parameter set absent explicit overrides.
    pub security_level: SecurityLevel,
    /// Ring parameters; defaults to `security_level`'s preset if `None`.
    pub ring_params: Option<RingParams>,
    /// Base `w` for key-switching digit decomposition (default 2^8).
    pub decomposition_base: u64,
    /// Noise-estimate threshold that triggers a mandatory bootstrap.
    pub noise_threshold: f64,
    /// Maximum multiplicative depth before `NeedsBootstrap`.
    pub max_depth: u32,
    /// Key cache bound: maximum resident entries.
    pub cache_max_items: usize,
    /// Key cache bound: time-to-live in seconds (0 disables expiry).
    pub cache_ttl_seconds: u64,
}

impl Default for HecConfig {
    fn default() -> Self {
        HecConfig {
            security_level: SecurityLevel::Bits128,
            ring_params: None,
            decomposition_base: 1 << 8,
            noise_threshold: 40.0,
            max_depth: 4,
            cache_max_items: 128,
            cache_ttl_seconds: 3600,
        }
    }
}

impl HecConfig {
    /// Resolve the effective ring parameters: explicit override, or the
    /// security tier's preset.
    pub fn resolved_ring_params(&self) -> RingParams {
        self.ring_params
            .clone()
            .unwrap_or_else(|| RingParams::for_security_level(self.security_level))
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> HecResult<()> {
        self.resolved_ring_params().validate()?;
        if self.decomposition_base < 2 {
            return Err(HecError::InvalidParameters(
                "decomposition_base must be >= 2".into(),
            ));
        }
        if self.max_depth == 0 {
            return Err(HecError::InvalidParameters("max_depth must be >= 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        for level in [
            SecurityLevel::Bits128,
            SecurityLevel::Bits192,
            SecurityLevel::Bits256,
        ] {
            RingParams::for_security_level(level).validate().unwrap();
        }
    }

    #[test]
    fn rejects_non_power_of_two_n() {
        let mut p = RingParams::for_security_level(SecurityLevel::Bits128);
        p.n = 4000;
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_non_ntt_friendly_prime() {
        let mut p = RingParams::for_security_level(SecurityLevel::Bits128);
        p.coeff_modulus = vec![97]; // too small, not 1 mod 2n
        assert!(p.validate().is_err());
    }

    #[test]
    fn default_config_validates() {
        HecConfig::default().validate().unwrap();
    }
}
