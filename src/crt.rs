//! Chinese Remainder Theorem residue-number-system representation
//!
//! Splits a polynomial with coefficients modulo `Q = ∏ q_i` into a matrix of
//! residues modulo each prime `q_i` in a pairwise-coprime basis, and back.
//! The basis stays sorted by prime id across every operation so that
//! `add_crt`/`multiply_crt` remain positionally aligned.

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::arith::modinverse;
use crate::error::{HecError, HecResult};

/// A CRT basis: a sorted list of pairwise-coprime primes plus the
/// precomputed cross-conversion constants `N_i = Q / q_i` and
/// `y_i = N_i^{-1} mod q_i`.
#[derive(Clone, Debug)]
pub struct CrtBasis {
    primes: Vec<u64>,
    q: BigUint,
    n_i: Vec<BigUint>,
    y_i: Vec<BigUint>,
}

impl CrtBasis {
    /// Build a basis from a set of pairwise-coprime primes. The primes are
    /// sorted ascending and kept in that order for the lifetime of the
    /// basis; `add_crt`/`multiply_crt` rely on residue vectors sharing this
    /// exact ordering.
    pub fn new(mut primes: Vec<u64>) -> HecResult<Self> {
        if primes.is_empty() {
            return Err(HecError::InvalidParameters("CRT basis must be non-empty".into()));
        }
        primes.sort_unstable();
        primes.dedup();
        let q = primes.iter().fold(BigUint::one(), |acc, &p| acc * BigUint::from(p));
        let mut n_i = Vec::with_capacity(primes.len());
        let mut y_i = Vec::with_capacity(primes.len());
        for &p in &primes {
            let ni = &q / BigUint::from(p);
            let p_big = BigUint::from(p);
            let ni_mod_p = &ni % &p_big;
            let yi = modinverse(&ni_mod_p, &p_big)?;
            n_i.push(ni);
            y_i.push(yi);
        }
        Ok(CrtBasis { primes, q, n_i, y_i })
    }

    /// The primes in this basis, sorted ascending.
    pub fn primes(&self) -> &[u64] {
        &self.primes
    }

    /// The composite modulus `Q = ∏ q_i`.
    pub fn modulus(&self) -> &BigUint {
        &self.q
    }

    /// Number of primes in the basis.
    pub fn len(&self) -> usize {
        self.primes.len()
    }

    /// Whether the basis is empty (never true for a validly constructed
    /// basis, exposed for API symmetry with `len`).
    pub fn is_empty(&self) -> bool {
        self.primes.is_empty()
    }

    /// Reduce one integer `x mod Q` into its per-prime residues.
    pub fn split(&self, x: &BigUint) -> Vec<u64> {
        let x = x % &self.q;
        self.primes.iter().map(|&p| (&x % BigUint::from(p)).to_u64_digits().first().copied().unwrap_or(0)).collect()
    }

    /// Reconstruct `x mod Q` from per-prime residues via
    /// `x = Σ r_i * N_i * y_i mod Q`.
    pub fn join(&self, residues: &[u64]) -> HecResult<BigUint> {
        if residues.len() != self.primes.len() {
            return Err(HecError::InvalidParameters(format!(
                "expected {} residues, got {}",
                self.primes.len(),
                residues.len()
            )));
        }
        let mut acc = BigUint::zero();
        for i in 0..self.primes.len() {
            let term = BigUint::from(residues[i]) * &self.n_i[i] * &self.y_i[i];
            acc += term;
        }
        Ok(acc % &self.q)
    }

    /// Convert a coefficient-vector polynomial (values mod `Q`) into a CRT
    /// polynomial: an `n x k` matrix, one column per prime.
    pub fn to_crt(&self, poly: &[BigUint]) -> CrtPolynomial {
        let limbs = poly.iter().map(|c| self.split(c)).collect();
        CrtPolynomial { limbs }
    }

    /// Reconstruct a coefficient-vector polynomial from its CRT
    /// representation.
    pub fn from_crt(&self, poly: &CrtPolynomial) -> HecResult<Vec<BigUint>> {
        poly.limbs.iter().map(|row| self.join(row)).collect()
    }

    /// Coefficient-wise sum of two CRT polynomials, reducing each column
    /// modulo its own prime.
    pub fn add_crt(&self, a: &CrtPolynomial, b: &CrtPolynomial) -> HecResult<CrtPolynomial> {
        self.check_shape(a)?;
        self.check_shape(b)?;
        if a.limbs.len() != b.limbs.len() {
            return Err(HecError::InvalidParameters(
                "CRT polynomials must share the same degree".into(),
            ));
        }
        let limbs = a
            .limbs
            .iter()
            .zip(b.limbs.iter())
            .map(|(ra, rb)| {
                ra.iter()
                    .zip(rb.iter())
                    .zip(self.primes.iter())
                    .map(|((&x, &y), &p)| ((x as u128 + y as u128) % p as u128) as u64)
                    .collect()
            })
            .collect();
        Ok(CrtPolynomial { limbs })
    }

    /// Coefficient-wise product of two CRT polynomials (pointwise per
    /// residue, per coefficient — not a polynomial convolution; callers
    /// wanting ring multiplication route each column through `ntt::multiply`
    /// before recombining).
    pub fn multiply_crt(&self, a: &CrtPolynomial, b: &CrtPolynomial) -> HecResult<CrtPolynomial> {
        self.check_shape(a)?;
        self.check_shape(b)?;
        if a.limbs.len() != b.limbs.len() {
            return Err(HecError::InvalidParameters(
                "CRT polynomials must share the same degree".into(),
            ));
        }
        let limbs = a
            .limbs
            .iter()
            .zip(b.limbs.iter())
            .map(|(ra, rb)| {
                ra.iter()
                    .zip(rb.iter())
                    .zip(self.primes.iter())
                    .map(|((&x, &y), &p)| ((x as u128 * y as u128) % p as u128) as u64)
                    .collect()
            })
            .collect();
        Ok(CrtPolynomial { limbs })
    }

    fn check_shape(&self, poly: &CrtPolynomial) -> HecResult<()> {
        for row in &poly.limbs {
            if row.len() != self.primes.len() {
                return Err(HecError::InvalidParameters(
                    "CRT polynomial row width does not match basis size".into(),
                ));
            }
        }
        Ok(())
    }
}

/// A polynomial represented in residue form: `limbs[i][j]` is coefficient
/// `i`'s residue modulo the `j`-th prime in the owning [`CrtBasis`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrtPolynomial {
    /// Residue matrix, `n` rows by `k` columns (one column per basis prime).
    pub limbs: Vec<Vec<u64>>,
}

impl CrtPolynomial {
    /// Degree (number of coefficients) of this polynomial.
    pub fn degree(&self) -> usize {
        self.limbs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basis() -> CrtBasis {
        CrtBasis::new(vec![17, 97, 193]).unwrap()
    }

    #[test]
    fn split_join_round_trip() {
        let b = basis();
        for v in [0u64, 1, 12345, 99999] {
            let x = BigUint::from(v);
            let residues = b.split(&x);
            let back = b.join(&residues).unwrap();
            assert_eq!(back, x % b.modulus());
        }
    }

    #[test]
    fn to_crt_from_crt_round_trip() {
        let b = basis();
        let poly: Vec<BigUint> = (0u64..10).map(BigUint::from).collect();
        let crt = b.to_crt(&poly);
        let back = b.from_crt(&crt).unwrap();
        assert_eq!(back, poly);
    }

    #[test]
    fn add_crt_matches_direct_addition() {
        let b = basis();
        let pa: Vec<BigUint> = vec![BigUint::from(5u64), BigUint::from(10u64)];
        let pb: Vec<BigUint> = vec![BigUint::from(7u64), BigUint::from(20u64)];
        let ca = b.to_crt(&pa);
        let cb = b.to_crt(&pb);
        let sum_crt = b.add_crt(&ca, &cb).unwrap();
        let sum_direct = b.from_crt(&sum_crt).unwrap();
        let expected: Vec<BigUint> = pa
            .iter()
            .zip(pb.iter())
            .map(|(x, y)| (x + y) % b.modulus())
            .collect();
        assert_eq!(sum_direct, expected);
    }

    #[test]
    fn basis_is_sorted_and_deduped() {
        let b = CrtBasis::new(vec![97, 17, 97, 193]).unwrap();
        assert_eq!(b.primes(), &[17, 97, 193]);
    }
}
