//! Modular big-integer primitives
//!
//! Modular exponentiation, extended-Euclidean modular inverse, Miller–Rabin
//! probable-primality, safe-prime generation, subgroup generator search, and
//! the two sampling primitives (uniform-by-rejection, Gaussian via
//! Box–Muller) that every other component in this crate is built on.

use num_bigint::{BigInt, BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::Rng;

use crate::error::{HecError, HecResult};

/// `base^exp mod modulus`. Fails only if `modulus` is zero.
pub fn modpow(base: &BigUint, exp: &BigUint, modulus: &BigUint) -> HecResult<BigUint> {
    if modulus.is_zero() {
        return Err(HecError::Internal("modpow: modulus is zero".into()));
    }
    Ok(base.modpow(exp, modulus))
}

/// Modular inverse of `a` mod `m` via the extended Euclidean algorithm.
/// Fails with `Internal` when `gcd(a, m) != 1`.
pub fn modinverse(a: &BigUint, m: &BigUint) -> HecResult<BigUint> {
    if m.is_zero() {
        return Err(HecError::Internal("modinverse: modulus is zero".into()));
    }
    let a_i = BigInt::from(a.clone());
    let m_i = BigInt::from(m.clone());
    let (g, x, _y) = extended_gcd(&a_i, &m_i);
    if g != BigInt::one() {
        return Err(HecError::Internal(format!(
            "modinverse: gcd(a, m) = {g} != 1, no inverse exists"
        )));
    }
    let x_mod = x.mod_floor(&m_i);
    x_mod
        .to_biguint()
        .ok_or_else(|| HecError::Internal("modinverse: negative result after mod_floor".into()))
}

/// Extended Euclidean algorithm: returns `(gcd, x, y)` with `a*x + b*y = gcd`.
fn extended_gcd(a: &BigInt, b: &BigInt) -> (BigInt, BigInt, BigInt) {
    if b.is_zero() {
        return (a.clone(), BigInt::one(), BigInt::zero());
    }
    let (q, r) = a.div_mod_floor(b);
    let (g, x1, y1) = extended_gcd(b, &r);
    let x = y1.clone();
    let y = x1 - &q * &y1;
    (g, x, y)
}

/// Miller–Rabin probable-primality test with `rounds` independent witnesses.
/// The spec requires at least 40 rounds for generation of cryptographic
/// primes; callers are free to pass fewer for cheap sanity checks.
pub fn is_probable_prime<R: Rng + ?Sized>(n: &BigUint, rounds: usize, rng: &mut R) -> bool {
    let zero = BigUint::zero();
    let one = BigUint::one();
    let two = BigUint::from(2u32);

    if *n < two {
        return false;
    }
    if *n == two || *n == BigUint::from(3u32) {
        return true;
    }
    if n.is_even() {
        return false;
    }

    // n - 1 = d * 2^r with d odd.
    let n_minus_1 = n - &one;
    let mut d = n_minus_1.clone();
    let mut r = 0u32;
    while d.is_even() {
        d >>= 1u32;
        r += 1;
    }

    'witness: for _ in 0..rounds {
        // a uniform in [2, n-2].
        let a = rng.gen_biguint_range(&two, &(n - &one));
        let mut x = a.modpow(&d, n);
        if x == one || x == n_minus_1 {
            continue;
        }
        for _ in 0..r.saturating_sub(1) {
            x = x.modpow(&two, n);
            if x == n_minus_1 {
                continue 'witness;
            }
        }
        return false;
    }
    let _ = zero;
    true
}

/// Generate a safe prime `p = 2q + 1` with both `p` and `q` prime, `p` having
/// at least `bits` bits. Uses rejection sampling with Miller–Rabin at 40
/// rounds, as required for cryptographic-strength parameters.
pub fn generate_safe_prime<R: Rng + ?Sized>(bits: u64, rng: &mut R) -> BigUint {
    loop {
        let mut q = rng.gen_biguint(bits - 1);
        q.set_bit(bits - 2, true); // keep the high bit set so p has exactly `bits` bits
        q.set_bit(0, true); // odd candidate
        if !is_probable_prime(&q, 40, rng) {
            continue;
        }
        let p = &q * BigUint::from(2u32) + BigUint::one();
        if is_probable_prime(&p, 40, rng) {
            return p;
        }
    }
}

/// Find a generator `g` of the order-`q` subgroup of `Z_p*`, given a safe
/// prime `p = 2q + 1`. Picks random `h ∈ [2, p-2]` and outputs `g = h^((p-1)/q)
/// mod p` whenever `g != 1`.
pub fn find_subgroup_generator<R: Rng + ?Sized>(p: &BigUint, q: &BigUint, rng: &mut R) -> BigUint {
    let one = BigUint::one();
    let two = BigUint::from(2u32);
    let exponent = (p - &one) / q;
    loop {
        let h = rng.gen_biguint_range(&two, &(p - &two));
        let g = h.modpow(&exponent, p);
        if g != one {
            return g;
        }
    }
}

/// Uniformly sample a value in `[0, m)` by rejection over whole-byte draws,
/// avoiding the bias a naive `draw mod m` would introduce.
pub fn sample_uniform<R: Rng + ?Sized>(m: &BigUint, rng: &mut R) -> BigUint {
    if m.is_zero() {
        return BigUint::zero();
    }
    let byte_len = (m.bits() as usize + 7) / 8;
    // Largest multiple of `m` representable in `byte_len` bytes; draws at or
    // above it are rejected so every accepted residue class mod `m` is
    // equally likely.
    let space = BigUint::one() << (byte_len * 8);
    let limit = &space - (&space % m);
    loop {
        let mut buf = vec![0u8; byte_len];
        rng.fill(buf.as_mut_slice());
        let candidate = BigUint::from_bytes_be(&buf);
        if candidate < limit {
            return candidate % m;
        }
    }
}

/// Sample a signed integer from a discrete Gaussian with standard deviation
/// `sigma`, via Box–Muller with rejection of samples beyond ±6σ (the
/// standard truncation for lattice noise sampling).
pub fn sample_gaussian<R: Rng + ?Sized>(sigma: f64, rng: &mut R) -> i64 {
    loop {
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen_range(0.0..1.0);
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f64::consts::PI * u2;
        let z = radius * theta.cos();
        let sample = z * sigma;
        if sample.abs() <= 6.0 * sigma {
            return sample.round() as i64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    #[test]
    fn modpow_basic() {
        let base = BigUint::from(4u32);
        let exp = BigUint::from(13u32);
        let m = BigUint::from(497u32);
        assert_eq!(modpow(&base, &exp, &m).unwrap(), BigUint::from(445u32));
    }

    #[test]
    fn modpow_zero_modulus_errors() {
        assert!(modpow(&BigUint::from(2u32), &BigUint::from(2u32), &BigUint::zero()).is_err());
    }

    #[test]
    fn modinverse_roundtrip() {
        let a = BigUint::from(17u32);
        let m = BigUint::from(3120u32);
        let inv = modinverse(&a, &m).unwrap();
        assert_eq!((&a * &inv) % &m, BigUint::one());
    }

    #[test]
    fn modinverse_no_inverse_errors() {
        // gcd(6, 9) = 3
        assert!(modinverse(&BigUint::from(6u32), &BigUint::from(9u32)).is_err());
    }

    #[test]
    fn miller_rabin_known_primes_and_composites() {
        let mut rng = thread_rng();
        for p in [2u32, 3, 5, 7, 11, 13, 104729] {
            assert!(is_probable_prime(&BigUint::from(p), 40, &mut rng), "{p}");
        }
        for c in [4u32, 6, 8, 9, 100, 104730] {
            assert!(!is_probable_prime(&BigUint::from(c), 40, &mut rng), "{c}");
        }
    }

    #[test]
    fn safe_prime_structure() {
        let mut rng = thread_rng();
        let p = generate_safe_prime(32, &mut rng);
        assert!(is_probable_prime(&p, 40, &mut rng));
        let q = (&p - BigUint::one()) / BigUint::from(2u32);
        assert!(is_probable_prime(&q, 40, &mut rng));
        assert!(p.bits() >= 31);
    }

    #[test]
    fn subgroup_generator_has_order_q() {
        let mut rng = thread_rng();
        let p = generate_safe_prime(32, &mut rng);
        let q = (&p - BigUint::one()) / BigUint::from(2u32);
        let g = find_subgroup_generator(&p, &q, &mut rng);
        assert_eq!(g.modpow(&q, &p), BigUint::one());
        assert_ne!(g, BigUint::one());
    }

    #[test]
    fn uniform_sampling_stays_in_range() {
        let mut rng = thread_rng();
        let m = BigUint::from(1000u32);
        for _ in 0..200 {
            assert!(sample_uniform(&m, &mut rng) < m);
        }
    }

    #[test]
    fn gaussian_sampling_respects_truncation() {
        let mut rng = thread_rng();
        for _ in 0..500 {
            let s = sample_gaussian(3.2, &mut rng);
            assert!((s as f64).abs() <= 6.0 * 3.2 + 1.0);
        }
    }
}
