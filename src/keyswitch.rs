//! Base-`w` digit-decomposition key switching
//!
//! Transforms a ciphertext half expressed under one secret into one
//! expressed under another, without ever reconstructing either secret.
//! Used by [`crate::fhe`] for both relinearization (`s_old = s²`, `s_new =
//! s`) and rotation (`s_old` = the Galois-permuted secret, `s_new = s`).

use num_bigint::BigUint;
use num_traits::Zero;
use rand::Rng;

use crate::arith::sample_gaussian;
use crate::error::HecResult;
use crate::ring::{RingContext, RingElement};

/// A key-switching key: `ell` encryptions of `w^i * s_old` under `s_new`,
/// one pair `(b_i, a_i)` per digit position.
#[derive(Clone, Debug)]
pub struct KeySwitchKey {
    components: Vec<(RingElement, RingElement)>,
    base: u64,
    ell: usize,
}

impl KeySwitchKey {
    /// Decomposition base this key was generated for.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Digit count `ell = ceil(log_w(q))`.
    pub fn ell(&self) -> usize {
        self.ell
    }
}

/// `ell = ceil(log_w(q))`, the number of base-`w` digits needed to cover a
/// modulus of `q`.
pub fn digit_count(q: &BigUint, base: u64) -> usize {
    if q.is_zero() {
        return 0;
    }
    let base_bits = (base as f64).log2();
    let q_bits = q.bits() as f64;
    (q_bits / base_bits).ceil() as usize
}

/// Generate a key-switching key carrying `s_old` into encryptions under
/// `s_new`.
pub fn generate<R: Rng + ?Sized>(
    ctx: &RingContext,
    s_old: &RingElement,
    s_new: &RingElement,
    base: u64,
    sigma: f64,
    rng: &mut R,
) -> HecResult<KeySwitchKey> {
    let ell = digit_count(ctx.q(), base);
    let mut components = Vec::with_capacity(ell);
    let mut w_pow = BigUint::from(1u64);
    for _ in 0..ell {
        let a_i = random_ring_element(ctx, rng);
        let e_i = small_error_element(ctx, sigma, rng);
        let term = ctx.scalar_mul(s_old, &w_pow)?;
        let a_s = ctx.multiply(&a_i, s_new)?;
        let noisy = ctx.add(&a_s, &e_i)?;
        let b_i = ctx.add(&ctx.negate(&noisy)?, &term)?;
        components.push((b_i, a_i));
        w_pow *= base;
    }
    Ok(KeySwitchKey { components, base, ell })
}

/// Apply a key-switching key to a ciphertext half `c1` expressed under
/// `s_old`: digit-decompose `c1` base `w`, multiply each digit polynomial
/// against the matching key component and accumulate. Returns `(delta_c0,
/// delta_c1)` to be added to the ciphertext's own `(c0, c1)` pair (with
/// `c1` itself dropped, since the switched contribution replaces it).
pub fn apply(ctx: &RingContext, c1: &RingElement, ksk: &KeySwitchKey) -> HecResult<(RingElement, RingElement)> {
    let digits = digit_decompose(ctx, c1, ksk.base, ksk.ell)?;
    let mut acc0 = ctx.zero();
    let mut acc1 = ctx.zero();
    for (digit, (b_i, a_i)) in digits.iter().zip(ksk.components.iter()) {
        acc0 = ctx.add(&acc0, &ctx.multiply(digit, b_i)?)?;
        acc1 = ctx.add(&acc1, &ctx.multiply(digit, a_i)?)?;
    }
    Ok((acc0, acc1))
}

/// Decompose every coefficient of `c1` into `ell` base-`w` digits,
/// returning one ring element per digit position (digit `i`'s element
/// holds, at each coefficient slot, the `i`-th base-`w` digit of the
/// corresponding coefficient of `c1`).
fn digit_decompose(ctx: &RingContext, c1: &RingElement, base: u64, ell: usize) -> HecResult<Vec<RingElement>> {
    let base_big = BigUint::from(base);
    let mut remainders: Vec<BigUint> = c1.coeffs().to_vec();
    let mut digits = Vec::with_capacity(ell);
    for _ in 0..ell {
        let mut this_digit = Vec::with_capacity(remainders.len());
        for r in remainders.iter_mut() {
            let digit = &*r % &base_big;
            *r /= &base_big;
            this_digit.push(digit);
        }
        digits.push(ctx.from_coeffs(this_digit)?);
    }
    Ok(digits)
}

fn random_ring_element<R: Rng + ?Sized>(ctx: &RingContext, rng: &mut R) -> RingElement {
    let coeffs: Vec<BigUint> = (0..ctx.n()).map(|_| crate::arith::sample_uniform(ctx.q(), rng)).collect();
    ctx.from_coeffs(coeffs).expect("n coefficients by construction")
}

fn small_error_element<R: Rng + ?Sized>(ctx: &RingContext, sigma: f64, rng: &mut R) -> RingElement {
    let coeffs: Vec<BigUint> = (0..ctx.n())
        .map(|_| {
            let e = sample_gaussian(sigma, rng);
            signed_to_ring(ctx, e)
        })
        .collect();
    ctx.from_coeffs(coeffs).expect("n coefficients by construction")
}

/// Map a small signed integer into its canonical residue mod `q`.
pub(crate) fn signed_to_ring(ctx: &RingContext, v: i64) -> BigUint {
    if v >= 0 {
        BigUint::from(v as u64)
    } else {
        ctx.q() - BigUint::from((-v) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RingParams, SecurityLevel};
    use rand::thread_rng;

    fn ctx() -> RingContext {
        RingContext::new(RingParams::for_security_level(SecurityLevel::Bits128)).unwrap()
    }

    #[test]
    fn switches_secret_without_large_error() {
        let ctx = ctx();
        let mut rng = thread_rng();
        let s_old = small_error_element(&ctx, 3.2, &mut rng);
        let s_new = small_error_element(&ctx, 3.2, &mut rng);
        let ksk = generate(&ctx, &s_old, &s_new, 256, 3.2, &mut rng).unwrap();

        // A ciphertext half "c1 = s_old" trivially, under the encryption
        // c0 = 0: switching should yield (b, a) such that b + a*s_new
        // approximates s_old (within noise), i.e. applying ksk to the
        // identity digit-decomposition recovers the key-switched encryption.
        let (d0, d1) = apply(&ctx, &s_old, &ksk).unwrap();
        let recombined = ctx.add(&d0, &ctx.multiply(&d1, &s_new).unwrap()).unwrap();
        // recombined should be close to s_old (small noise); check a handful
        // of coefficients are within a small bound of the original by
        // comparing signed distance mod q.
        let q = ctx.q().clone();
        let mut max_dist = BigUint::zero();
        for (a, b) in recombined.coeffs().iter().zip(s_old.coeffs().iter()) {
            let diff = if a >= b { a - b } else { b - a };
            let dist = std::cmp::min(diff.clone(), &q - &diff);
            if dist > max_dist {
                max_dist = dist;
            }
        }
        // noise should be nowhere near the full modulus
        assert!(max_dist.bits() < q.bits() - 10);
    }

    #[test]
    fn digit_count_matches_log_w_q() {
        let ctx = ctx();
        let ell = digit_count(ctx.q(), 256);
        assert!(ell > 0);
        // base=256 is 8 bits per digit, so ell*8 must cover q's bit length.
        assert!(ell * 8 >= ctx.q().bits() as usize);
    }
}
