//! Negacyclic polynomial ring `R_q = Z_q[X]/(X^n + 1)`
//!
//! A [`RingContext`] owns the precomputed CRT basis and per-prime NTT
//! tables for one `(n, q)` pair; [`RingElement`] values are domain-tagged
//! (coefficient vs. evaluation) coefficient vectors that every arithmetic
//! operation below takes alongside the context that gives them meaning.
//!
//! Per spec §9, the quotient is `X^n + 1` throughout (negacyclic), matching
//! standard RLWE/NTT practice.

use num_bigint::BigUint;
use num_traits::Zero;

use crate::config::RingParams;
use crate::crt::CrtBasis;
use crate::error::{HecError, HecResult};
use crate::ntt::NttContext;

/// Whether a [`RingElement`]'s coefficients are in the time/coefficient
/// domain or the NTT evaluation domain. Equality comparison is
/// domain-aware: two elements compare equal only when both their domain tag
/// and coefficients match — comparing across domains always returns
/// `false` even if the underlying polynomials are mathematically equal,
/// since no implicit conversion happens on comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Domain {
    /// Coefficients of the polynomial in the standard monomial basis.
    Coefficient,
    /// Pointwise NTT evaluations, CRT-joined back into `Z_q` per slot so the
    /// element retains its `n`-length shape regardless of domain.
    Evaluation,
}

/// An element of `R_q`: `n` coefficients in `[0, q)`, tagged with the
/// domain they're expressed in.
#[derive(Clone, Debug)]
pub struct RingElement {
    coeffs: Vec<BigUint>,
    domain: Domain,
}

impl RingElement {
    /// This element's coefficients (read-only view).
    pub fn coeffs(&self) -> &[BigUint] {
        &self.coeffs
    }

    /// The domain this element's coefficients are expressed in.
    pub fn domain(&self) -> Domain {
        self.domain
    }
}

impl PartialEq for RingElement {
    fn eq(&self, other: &Self) -> bool {
        self.domain == other.domain && self.coeffs == other.coeffs
    }
}
impl Eq for RingElement {}

/// Owns the CRT basis and per-prime NTT tables for one ring parameter set.
/// Large precomputed twiddle tables live here rather than per-element;
/// dropping the context frees them (spec §5: "owned by the scheme instance
/// and freed on `destroy`").
pub struct RingContext {
    params: RingParams,
    basis: CrtBasis,
    ntts: Vec<NttContext>,
    q: BigUint,
}

impl RingContext {
    /// Build a context for the given ring parameters, validating them and
    /// locating the per-prime primitive roots of unity up front.
    pub fn new(params: RingParams) -> HecResult<Self> {
        params.validate()?;
        let basis = CrtBasis::new(params.coeff_modulus.clone())?;
        let ntts = params
            .coeff_modulus
            .iter()
            .map(|&p| NttContext::new(p, params.n))
            .collect::<HecResult<Vec<_>>>()?;
        let q = basis.modulus().clone();
        Ok(RingContext { params, basis, ntts, q })
    }

    /// Polynomial degree `n`.
    pub fn n(&self) -> usize {
        self.params.n
    }

    /// Ciphertext modulus `q = ∏ coeff_modulus`.
    pub fn q(&self) -> &BigUint {
        &self.q
    }

    /// The ring parameters this context was built from.
    pub fn params(&self) -> &RingParams {
        &self.params
    }

    /// The zero element, in coefficient domain.
    pub fn zero(&self) -> RingElement {
        RingElement {
            coeffs: vec![BigUint::zero(); self.n()],
            domain: Domain::Coefficient,
        }
    }

    /// Build a coefficient-domain element from raw coefficients, reducing
    /// each one modulo `q`. Fails if the coefficient count doesn't match
    /// `n`.
    pub fn from_coeffs(&self, coeffs: Vec<BigUint>) -> HecResult<RingElement> {
        self.check_len(&coeffs)?;
        Ok(RingElement {
            coeffs: coeffs.into_iter().map(|c| c % &self.q).collect(),
            domain: Domain::Coefficient,
        })
    }

    fn check_len(&self, coeffs: &[BigUint]) -> HecResult<()> {
        if coeffs.len() != self.n() {
            return Err(HecError::InvalidParameters(format!(
                "expected {} coefficients, got {}",
                self.n(),
                coeffs.len()
            )));
        }
        Ok(())
    }

    fn require_domain(&self, a: &RingElement, domain: Domain) -> HecResult<()> {
        if a.domain != domain {
            return Err(HecError::InvalidParameters(format!(
                "expected {domain:?}-domain ring element, found {:?}",
                a.domain
            )));
        }
        Ok(())
    }

    /// Coefficient-wise addition mod `q`. Both operands must share the same
    /// domain.
    pub fn add(&self, a: &RingElement, b: &RingElement) -> HecResult<RingElement> {
        self.check_len(&a.coeffs)?;
        self.check_len(&b.coeffs)?;
        if a.domain != b.domain {
            return Err(HecError::InvalidParameters(
                "cannot add ring elements from different domains".into(),
            ));
        }
        let coeffs = a
            .coeffs
            .iter()
            .zip(b.coeffs.iter())
            .map(|(x, y)| (x + y) % &self.q)
            .collect();
        Ok(RingElement { coeffs, domain: a.domain })
    }

    /// Coefficient-wise subtraction mod `q`.
    pub fn sub(&self, a: &RingElement, b: &RingElement) -> HecResult<RingElement> {
        self.add(a, &self.negate(b)?)
    }

    /// Additive inverse mod `q`.
    pub fn negate(&self, a: &RingElement) -> HecResult<RingElement> {
        self.check_len(&a.coeffs)?;
        let coeffs = a
            .coeffs
            .iter()
            .map(|x| if x.is_zero() { BigUint::zero() } else { &self.q - x })
            .collect();
        Ok(RingElement { coeffs, domain: a.domain })
    }

    /// Multiply every coefficient by a scalar mod `q`.
    pub fn scalar_mul(&self, a: &RingElement, scalar: &BigUint) -> HecResult<RingElement> {
        self.check_len(&a.coeffs)?;
        let s = scalar % &self.q;
        let coeffs = a.coeffs.iter().map(|x| (x * &s) % &self.q).collect();
        Ok(RingElement { coeffs, domain: a.domain })
    }

    /// Convert a coefficient-domain element to the evaluation domain: split
    /// into CRT residues, NTT-transform each prime's column, then CRT-join
    /// back into an `n`-length vector mod `q`. No-op (besides a domain
    /// check) if already in evaluation domain.
    pub fn to_evaluation(&self, a: &RingElement) -> HecResult<RingElement> {
        if a.domain == Domain::Evaluation {
            return Ok(a.clone());
        }
        self.require_domain(a, Domain::Coefficient)?;
        let crt = self.basis.to_crt(&a.coeffs);
        let mut columns = transpose(&crt.limbs, self.basis.len());
        for (col, ntt) in columns.iter_mut().zip(self.ntts.iter()) {
            ntt.transform(col)?;
        }
        let rows = transpose_back(&columns, self.n());
        let coeffs = rows
            .into_iter()
            .map(|row| self.basis.join(&row))
            .collect::<HecResult<Vec<_>>>()?;
        Ok(RingElement { coeffs, domain: Domain::Evaluation })
    }

    /// Inverse of [`RingContext::to_evaluation`].
    pub fn to_coefficient(&self, a: &RingElement) -> HecResult<RingElement> {
        if a.domain == Domain::Coefficient {
            return Ok(a.clone());
        }
        self.require_domain(a, Domain::Evaluation)?;
        let crt = self.basis.to_crt(&a.coeffs);
        let mut columns = transpose(&crt.limbs, self.basis.len());
        for (col, ntt) in columns.iter_mut().zip(self.ntts.iter()) {
            ntt.inverse_transform(col)?;
        }
        let rows = transpose_back(&columns, self.n());
        let coeffs = rows
            .into_iter()
            .map(|row| self.basis.join(&row))
            .collect::<HecResult<Vec<_>>>()?;
        Ok(RingElement { coeffs, domain: Domain::Coefficient })
    }

    /// Negacyclic ring multiplication. Converts both operands to the
    /// evaluation domain (if not already there), multiplies pointwise mod
    /// `q` — valid because CRT-join is a ring isomorphism, so pointwise
    /// products of CRT-joined NTT evaluations equal the CRT join of the
    /// per-prime pointwise products — then converts the result back to
    /// coefficient domain.
    pub fn multiply(&self, a: &RingElement, b: &RingElement) -> HecResult<RingElement> {
        let ea = self.to_evaluation(a)?;
        let eb = self.to_evaluation(b)?;
        let coeffs = ea
            .coeffs
            .iter()
            .zip(eb.coeffs.iter())
            .map(|(x, y)| (x * y) % &self.q)
            .collect();
        let product = RingElement { coeffs, domain: Domain::Evaluation };
        self.to_coefficient(&product)
    }

    /// Number of 64-bit little-endian limbs needed to hold one coefficient
    /// (`ceil(bits(q) / 64)`, at least 1).
    fn limbs_per_coeff(&self) -> usize {
        ((self.q.bits() as usize) + 63) / 64
    }

    /// Serialize a coefficient-domain element to bytes: little-endian
    /// 64-bit words per coefficient. When `q` fits in a single 64-bit word
    /// (the spec's baseline case) this is exactly `8n` bytes; for the
    /// multi-prime CRT moduli this crate's higher security tiers use, the
    /// per-coefficient word count grows to `ceil(bits(q)/64)` and the byte
    /// length is `8 * n * limbs_per_coeff` accordingly.
    pub fn to_bytes(&self, a: &RingElement) -> HecResult<Vec<u8>> {
        self.require_domain(a, Domain::Coefficient)?;
        let limbs = self.limbs_per_coeff();
        let mut out = Vec::with_capacity(8 * self.n() * limbs);
        for c in &a.coeffs {
            let mut digits = c.to_u64_digits();
            digits.resize(limbs, 0);
            for d in digits {
                out.extend_from_slice(&d.to_le_bytes());
            }
        }
        Ok(out)
    }

    /// Deserialize bytes produced by [`RingContext::to_bytes`]. Rejects any
    /// coefficient that decodes to a value `>= q`.
    pub fn from_bytes(&self, bytes: &[u8]) -> HecResult<RingElement> {
        let limbs = self.limbs_per_coeff();
        let stride = 8 * limbs;
        if bytes.len() != stride * self.n() {
            return Err(HecError::InvalidCiphertext(format!(
                "ring element byte length {} does not match expected {}",
                bytes.len(),
                stride * self.n()
            )));
        }
        let mut coeffs = Vec::with_capacity(self.n());
        for chunk in bytes.chunks(stride) {
            let mut value = BigUint::zero();
            for (i, word) in chunk.chunks(8).enumerate() {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(word);
                let limb = BigUint::from(u64::from_le_bytes(buf));
                value += limb << (i * 64);
            }
            if value >= self.q {
                return Err(HecError::InvalidCiphertext(
                    "ring element coefficient >= q".into(),
                ));
            }
            coeffs.push(value);
        }
        Ok(RingElement { coeffs, domain: Domain::Coefficient })
    }
}

/// Transpose an `n x k` row-major matrix into `k` columns of length `n`.
fn transpose(rows: &[Vec<u64>], k: usize) -> Vec<Vec<u64>> {
    let n = rows.len();
    let mut cols = vec![vec![0u64; n]; k];
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            cols[j][i] = v;
        }
    }
    cols
}

/// Inverse of [`transpose`]: `k` columns of length `n` back into `n` rows
/// of width `k`.
fn transpose_back(cols: &[Vec<u64>], n: usize) -> Vec<Vec<u64>> {
    let k = cols.len();
    let mut rows = vec![vec![0u64; k]; n];
    for (j, col) in cols.iter().enumerate() {
        for (i, &v) in col.iter().enumerate() {
            rows[i][j] = v;
        }
    }
    rows
}
