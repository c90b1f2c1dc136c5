//! Number-theoretic transform and complex-FFT fallback
//!
//! Forward/inverse NTT over `Z_q` for a prime `q ≡ 1 (mod 2n)`, used for
//! O(n log n) negacyclic polynomial multiplication, plus a complex FFT used
//! as a fallback when no CRT prime in the basis admits an NTT of the
//! required size. Both transforms use bit-reversed butterfly ordering and
//! are exposed with a chunked, worker-pool-backed variant that is bit-exact
//! with the serial form.

use std::f64::consts::PI;

use crate::error::{HecError, HecResult};
use crate::worker_pool::WorkerPool;

#[inline]
fn mulmod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

#[inline]
fn powmod(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut result = 1u64 % m;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mulmod(result, base, m);
        }
        base = mulmod(base, base, m);
        exp >>= 1;
    }
    result
}

fn bit_reverse_indices(n: usize) -> Vec<usize> {
    let log_n = n.trailing_zeros();
    (0..n)
        .map(|i| (i as u32).reverse_bits() >> (32 - log_n))
        .map(|i| i as usize)
        .collect()
}

/// A forward/inverse NTT context bound to one `(modulus, n)` pair.
#[derive(Clone, Debug)]
pub struct NttContext {
    modulus: u64,
    n: usize,
    /// Primitive `2n`-th root of unity mod `modulus`.
    psi: u64,
    psi_inv: u64,
    /// Primitive `n`-th root of unity, `psi^2`.
    omega: u64,
    omega_inv: u64,
    n_inv: u64,
    bit_rev: Vec<usize>,
}

impl NttContext {
    /// Build a context for transforms of length `n` modulo `modulus`.
    /// Requires `modulus ≡ 1 (mod 2n)`; locates a primitive `2n`-th root of
    /// unity by scanning small candidates and verifying `ω^n != 1 ∧ ω^{2n} =
    /// 1`.
    pub fn new(modulus: u64, n: usize) -> HecResult<Self> {
        if n == 0 || !n.is_power_of_two() {
            return Err(HecError::InvalidParameters(
                "NTT length must be a power of two".into(),
            ));
        }
        let two_n = 2 * n as u64;
        if (modulus - 1) % two_n != 0 {
            return Err(HecError::InvalidParameters(format!(
                "modulus {modulus} is not NTT-friendly for n={n}: modulus mod 2n != 1"
            )));
        }
        let psi = find_primitive_2nth_root(modulus, n)?;
        let psi_inv = powmod(psi, modulus - 2, modulus);
        let omega = mulmod(psi, psi, modulus);
        let omega_inv = powmod(omega, modulus - 2, modulus);
        let n_inv = powmod(n as u64 % modulus, modulus - 2, modulus);
        Ok(NttContext {
            modulus,
            n,
            psi,
            psi_inv,
            omega,
            omega_inv,
            n_inv,
            bit_rev: bit_reverse_indices(n),
        })
    }

    /// The prime this context transforms modulo.
    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    /// The transform length.
    pub fn len(&self) -> usize {
        self.n
    }

    /// Negacyclic forward transform: pre-twists by powers of `psi` (the
    /// `2n`-th root) so that `multiply` computes the `X^n + 1` convolution
    /// directly, then applies the standard radix-2 NTT with bit-reversed
    /// input order.
    pub fn transform(&self, coeffs: &mut [u64]) -> HecResult<()> {
        self.check_len(coeffs)?;
        let mut twist = 1u64;
        for c in coeffs.iter_mut() {
            *c = mulmod(*c, twist, self.modulus);
            twist = mulmod(twist, self.psi, self.modulus);
        }
        self.ntt_core(coeffs, self.omega);
        Ok(())
    }

    /// Inverse of [`NttContext::transform`]: inverse radix-2 NTT, scale by
    /// `n^{-1}`, then un-twist by powers of `psi^{-1}`.
    pub fn inverse_transform(&self, coeffs: &mut [u64]) -> HecResult<()> {
        self.check_len(coeffs)?;
        self.ntt_core(coeffs, self.omega_inv);
        let mut untwist = 1u64;
        for c in coeffs.iter_mut() {
            *c = mulmod(mulmod(*c, self.n_inv, self.modulus), untwist, self.modulus);
            untwist = mulmod(untwist, self.psi_inv, self.modulus);
        }
        Ok(())
    }

    /// Negacyclic polynomial multiplication `a * b mod (X^n + 1, modulus)`
    /// via `inverse_transform(pointwise(transform(a), transform(b)))`.
    pub fn multiply(&self, a: &[u64], b: &[u64]) -> HecResult<Vec<u64>> {
        self.check_len(a)?;
        self.check_len(b)?;
        let mut ta = a.to_vec();
        let mut tb = b.to_vec();
        self.transform(&mut ta)?;
        self.transform(&mut tb)?;
        let mut prod: Vec<u64> = ta
            .iter()
            .zip(tb.iter())
            .map(|(&x, &y)| mulmod(x, y, self.modulus))
            .collect();
        self.inverse_transform(&mut prod)?;
        Ok(prod)
    }

    /// Chunked parallel transform: partitions each butterfly layer's work
    /// across `pool` and writes results back in place. Bit-exact with
    /// [`NttContext::transform`] since every butterfly is a pure function of
    /// its two inputs and the layer's twiddle factor.
    pub fn transform_parallel(&self, coeffs: &mut [u64], pool: &WorkerPool) -> HecResult<()> {
        self.check_len(coeffs)?;
        let mut twist = 1u64;
        for c in coeffs.iter_mut() {
            *c = mulmod(*c, twist, self.modulus);
            twist = mulmod(twist, self.psi, self.modulus);
        }
        self.ntt_core_parallel(coeffs, self.omega, pool);
        Ok(())
    }

    fn check_len(&self, coeffs: &[u64]) -> HecResult<()> {
        if coeffs.len() != self.n {
            return Err(HecError::InvalidParameters(format!(
                "expected {} coefficients, got {}",
                self.n,
                coeffs.len()
            )));
        }
        Ok(())
    }

    /// Iterative radix-2 Cooley–Tukey NTT: bit-reverse permute, then
    /// log2(n) butterfly layers with twiddle factor `root`.
    fn ntt_core(&self, a: &mut [u64], root: u64) {
        let n = self.n;
        for i in 0..n {
            let j = self.bit_rev[i];
            if i < j {
                a.swap(i, j);
            }
        }
        let mut len = 2;
        while len <= n {
            let half = len / 2;
            let w_len = powmod(root, (n / len) as u64, self.modulus);
            let mut i = 0;
            while i < n {
                let mut w = 1u64;
                for k in 0..half {
                    let u = a[i + k];
                    let v = mulmod(a[i + k + half], w, self.modulus);
                    a[i + k] = (u + v) % self.modulus;
                    a[i + k + half] = (u + self.modulus - v) % self.modulus;
                    w = mulmod(w, w_len, self.modulus);
                }
                i += len;
            }
            len <<= 1;
        }
    }

    /// Same recurrence as [`NttContext::ntt_core`], but each layer's
    /// butterfly groups are computed by the pool and written back
    /// afterwards — still one synchronization point per layer, since each
    /// layer depends on the previous one's output.
    fn ntt_core_parallel(&self, a: &mut [u64], root: u64, pool: &WorkerPool) {
        let n = self.n;
        let modulus = self.modulus;
        for i in 0..n {
            let j = self.bit_rev[i];
            if i < j {
                a.swap(i, j);
            }
        }
        let mut len = 2;
        while len <= n {
            let half = len / 2;
            let w_len = powmod(root, (n / len) as u64, modulus);
            let num_groups = n / len;
            // Each group is an independent butterfly block; ship the block's
            // inputs to the pool and splice the outputs back in order.
            let groups: Vec<(u64, u64)> = (0..num_groups)
                .map(|_| (w_len, modulus))
                .collect();
            let group_inputs: Vec<Vec<u64>> = (0..num_groups)
                .map(|g| a[g * len..g * len + len].to_vec())
                .collect();
            let outputs = pool.map(
                group_inputs.into_iter().zip(groups).collect(),
                move |(mut block, (w_len, modulus)): (Vec<u64>, (u64, u64))| {
                    let half = block.len() / 2;
                    let mut w = 1u64;
                    for k in 0..half {
                        let u = block[k];
                        let v = mulmod(block[k + half], w, modulus);
                        block[k] = (u + v) % modulus;
                        block[k + half] = (u + modulus - v) % modulus;
                        w = mulmod(w, w_len, modulus);
                    }
                    block
                },
            );
            for (g, block) in outputs.into_iter().enumerate() {
                a[g * len..g * len + len].copy_from_slice(&block);
            }
            len <<= 1;
        }
    }
}

/// Scan small candidates `2 <= c < modulus` and return the first whose
/// `2n`-th power is a primitive `2n`-th root: `c^n != 1` and `c^{2n} == 1`.
fn find_primitive_2nth_root(modulus: u64, n: usize) -> HecResult<u64> {
    let two_n = 2 * n as u64;
    let exponent = (modulus - 1) / two_n;
    let mut candidate = 2u64;
    while candidate < modulus {
        let psi = powmod(candidate, exponent, modulus);
        let psi_n = powmod(psi, n as u64, modulus);
        if psi != 1 && psi_n == modulus - 1 {
            return Ok(psi);
        }
        candidate += 1;
    }
    Err(HecError::InvalidParameters(format!(
        "no primitive 2n-th root of unity found for modulus={modulus}, n={n}"
    )))
}

/// Minimal complex number used by the FFT fallback. Kept local rather than
/// pulling in a full complex-number crate since only the four arithmetic
/// ops below are needed.
#[derive(Clone, Copy, Debug)]
struct Complex {
    re: f64,
    im: f64,
}

impl Complex {
    fn new(re: f64, im: f64) -> Self {
        Complex { re, im }
    }
    fn add(self, o: Complex) -> Complex {
        Complex::new(self.re + o.re, self.im + o.im)
    }
    fn sub(self, o: Complex) -> Complex {
        Complex::new(self.re - o.re, self.im - o.im)
    }
    fn mul(self, o: Complex) -> Complex {
        Complex::new(self.re * o.re - self.im * o.im, self.re * o.im + self.im * o.re)
    }
}

/// In-place iterative radix-2 complex FFT (forward if `invert` is false).
/// Used as the fallback transform when no coefficient-modulus prime in the
/// CRT basis admits an NTT of the required length.
fn fft_core(a: &mut [Complex], invert: bool) {
    let n = a.len();
    let bit_rev = bit_reverse_indices(n);
    for i in 0..n {
        let j = bit_rev[i];
        if i < j {
            a.swap(i, j);
        }
    }
    let mut len = 2;
    while len <= n {
        let ang = 2.0 * PI / len as f64 * if invert { -1.0 } else { 1.0 };
        let wlen = Complex::new(ang.cos(), ang.sin());
        let mut i = 0;
        while i < n {
            let mut w = Complex::new(1.0, 0.0);
            for k in 0..len / 2 {
                let u = a[i + k];
                let v = a[i + k + len / 2].mul(w);
                a[i + k] = u.add(v);
                a[i + k + len / 2] = u.sub(v);
                w = w.mul(wlen);
            }
            i += len;
        }
        len <<= 1;
    }
    if invert {
        for c in a.iter_mut() {
            c.re /= n as f64;
            c.im /= n as f64;
        }
    }
}

/// Multiply two integer polynomials (as `i64` coefficient vectors, any
/// length, not necessarily reduced mod a prime) via complex FFT, rounding
/// the result back to integers. Pads to the next power of two above
/// `a.len() + b.len()` as a linear (non-negacyclic) convolution; callers
/// that need a negacyclic product reduce by `X^n + 1` afterwards.
pub fn fft_multiply(a: &[i64], b: &[i64]) -> Vec<i64> {
    let result_len = a.len() + b.len() - 1;
    let mut size = 1usize;
    while size < result_len {
        size <<= 1;
    }
    let mut fa: Vec<Complex> = a
        .iter()
        .map(|&x| Complex::new(x as f64, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();
    let mut fb: Vec<Complex> = b
        .iter()
        .map(|&x| Complex::new(x as f64, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();
    fft_core(&mut fa, false);
    fft_core(&mut fb, false);
    let mut prod: Vec<Complex> = fa.iter().zip(fb.iter()).map(|(&x, &y)| x.mul(y)).collect();
    fft_core(&mut prod, true);
    prod.into_iter().take(result_len).map(|c| c.re.round() as i64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // 12289 = 2^12 * 3 + 1, a classic NTT-friendly prime for n <= 2048 (and
    // 2n | (p-1) for n=1024: 2048 | 12288, holds).
    const TEST_PRIME: u64 = 12289;
    const TEST_N: usize = 1024;

    #[test]
    fn round_trip_is_identity() {
        let ctx = NttContext::new(TEST_PRIME, TEST_N).unwrap();
        let mut rng = rand::thread_rng();
        use rand::Rng;
        let poly: Vec<u64> = (0..TEST_N).map(|_| rng.gen_range(0..TEST_PRIME)).collect();
        let mut t = poly.clone();
        ctx.transform(&mut t).unwrap();
        ctx.inverse_transform(&mut t).unwrap();
        assert_eq!(t, poly);
    }

    #[test]
    fn multiply_matches_schoolbook_negacyclic() {
        let n = 8;
        let modulus = 17; // 17 - 1 = 16 = 2*8, NTT-friendly for n=8
        let ctx = NttContext::new(modulus, n).unwrap();
        let a = vec![1u64, 2, 3, 0, 0, 0, 0, 0];
        let b = vec![1u64, 1, 0, 0, 0, 0, 0, 0];
        let got = ctx.multiply(&a, &b).unwrap();

        // schoolbook negacyclic convolution mod (X^n+1, modulus)
        let mut want = vec![0i64; n];
        for i in 0..n {
            for j in 0..n {
                let idx = i + j;
                let sign = if idx >= n { -1 } else { 1 };
                want[idx % n] += sign * a[i] as i64 * b[j] as i64;
            }
        }
        let want: Vec<u64> = want
            .into_iter()
            .map(|x| x.rem_euclid(modulus as i64) as u64)
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn parallel_transform_matches_serial() {
        let ctx = NttContext::new(TEST_PRIME, TEST_N).unwrap();
        let pool = WorkerPool::new(4);
        let mut rng = rand::thread_rng();
        use rand::Rng;
        let poly: Vec<u64> = (0..TEST_N).map(|_| rng.gen_range(0..TEST_PRIME)).collect();

        let mut serial = poly.clone();
        ctx.transform(&mut serial).unwrap();

        let mut parallel = poly;
        ctx.transform_parallel(&mut parallel, &pool).unwrap();

        assert_eq!(serial, parallel);
    }

    #[test]
    fn fft_multiply_matches_schoolbook() {
        let a = vec![1i64, 2, 3];
        let b = vec![4i64, 5, 6];
        let got = fft_multiply(&a, &b);
        // (1 + 2x + 3x^2)(4 + 5x + 6x^2) = 4 + 13x + 28x^2 + 27x^3 + 18x^4
        assert_eq!(got, vec![4, 13, 28, 27, 18]);
    }

    #[test]
    fn rejects_non_ntt_friendly_modulus() {
        assert!(NttContext::new(97, 1024).is_err());
    }
}
