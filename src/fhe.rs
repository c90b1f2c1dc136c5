//! BGV-style Ring-LWE homomorphic encryption scheme
//!
//! A [`BgvScheme`] is bound to one [`RingContext`] and carries its own
//! noise manager and (when the plaintext modulus admits one) plaintext
//! NTT context for batched slot encoding. Ciphertexts track their own
//! noise estimate and depth so the state machine transitions
//! (`Fresh -> Linear -> NeedsBootstrap`) live on the ciphertext itself
//! rather than in scheme-global bookkeeping.

use std::collections::HashMap;

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{ToPrimitive, Zero};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::arith::sample_gaussian;
use crate::config::HecConfig;
use crate::error::{HecError, HecResult};
use crate::keyswitch::{self, signed_to_ring, KeySwitchKey};
use crate::ntt::NttContext;
use crate::ring::{RingContext, RingElement};

/// A 16-byte digest binding a ciphertext or key-switching key to the
/// public key it was produced under.
pub type Fingerprint = [u8; 16];

fn fingerprint_of(parts: &[&[u8]]) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    for p in parts {
        hasher.update(p);
    }
    let digest = hasher.finalize();
    let mut fp = [0u8; 16];
    fp.copy_from_slice(&digest.as_bytes()[..16]);
    fp
}

/// Ciphertext lifecycle. `Linear` carries the multiplicative depth
/// consumed so far; crossing the configured max depth or noise threshold
/// moves a ciphertext to `NeedsBootstrap`, which every operation but
/// bootstrap refuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CiphertextState {
    /// Just encrypted or just bootstrapped.
    Fresh,
    /// At least one multiplication deep; carries the depth consumed.
    Linear(u32),
    /// Noise or depth budget exhausted; must be bootstrapped before any
    /// further homomorphic operation.
    NeedsBootstrap,
}

/// A BGV secret key: a small ring element with coefficients in `{-1, 0,
/// 1}`.
#[derive(Clone, Debug)]
pub struct BgvSecretKey {
    pub(crate) s: RingElement,
    pub fingerprint: Fingerprint,
}

/// A BGV public key `(b, a)` with `b = -(a*s + e) mod q`.
#[derive(Clone, Debug)]
pub struct BgvPublicKey {
    pub(crate) b: RingElement,
    pub(crate) a: RingElement,
    pub fingerprint: Fingerprint,
}

/// The relinearization key: a key-switching key carrying `s^2` to
/// encryptions under `s`.
#[derive(Clone, Debug)]
pub struct BgvEvaluationKey {
    pub(crate) ksk: KeySwitchKey,
    pub fingerprint: Fingerprint,
}

/// A rotation key for one Galois step: a key-switching key carrying the
/// automorphism-permuted secret back to encryptions under the original
/// secret.
#[derive(Clone, Debug)]
pub struct BgvRotationKey {
    pub step: i64,
    pub(crate) ksk: KeySwitchKey,
    pub fingerprint: Fingerprint,
}

/// Everything produced by one [`BgvScheme::key_gen`] call. Rotation keys
/// are generated on demand via [`BgvScheme::generate_rotation_key`] and
/// accumulate here as callers request them.
pub struct BgvKeyBundle {
    pub secret: BgvSecretKey,
    pub public: BgvPublicKey,
    pub evaluation: BgvEvaluationKey,
    pub rotation: HashMap<i64, BgvRotationKey>,
    pub fingerprint: Fingerprint,
}

/// A BGV ciphertext: the `(c0, c1)` pair, an optional degree-2 `c2`
/// component present only transiently between a raw multiply and its
/// relinearization, the key fingerprint it was produced under, the
/// multiplicative-depth level, noise estimate, and derived state.
#[derive(Clone, Debug)]
pub struct BgvCiphertext {
    pub(crate) c0: RingElement,
    pub(crate) c1: RingElement,
    pub(crate) c2: Option<RingElement>,
    pub fingerprint: Fingerprint,
    pub level: u32,
    pub noise: crate::noise::NoiseState,
    pub state: CiphertextState,
}

impl BgvCiphertext {
    /// Whether this ciphertext is still a degree-2 triple awaiting
    /// relinearization.
    pub fn needs_relinearize(&self) -> bool {
        self.c2.is_some()
    }
}

/// A BGV scheme instance bound to one set of ring parameters.
pub struct BgvScheme {
    ctx: RingContext,
    noise_mgr: crate::noise::NoiseMgr,
    plaintext_ntt: Option<NttContext>,
    decomposition_base: u64,
    max_depth: u32,
    sigma: f64,
    plain_modulus: u64,
    /// Maps logical slot index (the order batched callers see) to the
    /// natural NTT evaluation-point index (slot `j` holds the plaintext
    /// polynomial's evaluation at `psi^(2j+1)`). Built from the `(3, -1)`
    /// generators of `(Z/2nZ)*`: powers of 3 cover one "row" of `n/2`
    /// logical slots, and `-1` times powers of 3 cover the other, matching
    /// the two-row structure every power-of-two cyclotomic batching scheme
    /// has (no single ring automorphism can cycle all `n` slots at once,
    /// since `(Z/2nZ)*` is not cyclic for `n >= 4`). This is what makes a
    /// rotation by a power-of-3 Galois element a clean cyclic shift of the
    /// logical slot array within its row.
    slot_perm: Vec<usize>,
}

/// Build the logical-to-natural slot permutation described on
/// [`BgvScheme::slot_perm`].
fn build_slot_permutation(n: usize) -> Vec<usize> {
    let two_n = 2 * n as u64;
    let row_len = n / 2;
    let mut perm = vec![0usize; n];
    let mut pow3 = 1u64;
    for slot in perm.iter_mut().take(row_len) {
        *slot = ((pow3 - 1) / 2) as usize;
        pow3 = (pow3 * 3) % two_n;
    }
    let neg1 = two_n - 1;
    let mut pow3_neg = neg1;
    for slot in perm.iter_mut().skip(row_len).take(row_len) {
        *slot = ((pow3_neg - 1) / 2) as usize;
        pow3_neg = (pow3_neg * 3) % two_n;
    }
    perm
}

impl BgvScheme {
    /// Build a scheme instance from a resolved configuration, eagerly
    /// computing the CRT/NTT tables the ring context needs.
    pub fn new(config: &HecConfig) -> HecResult<Self> {
        config.validate()?;
        let params = config.resolved_ring_params();
        let sigma = params.sigma;
        let plain_modulus = params.plain_modulus;
        let n = params.n;
        let ctx = RingContext::new(params)?;
        let plaintext_ntt = NttContext::new(plain_modulus, n).ok();
        let slot_perm = build_slot_permutation(n);
        Ok(BgvScheme {
            ctx,
            noise_mgr: crate::noise::NoiseMgr::new(config.noise_threshold),
            plaintext_ntt,
            decomposition_base: config.decomposition_base,
            max_depth: config.max_depth,
            sigma,
            plain_modulus,
            slot_perm,
        })
    }

    /// The underlying ring context, exposed for callers (e.g. the
    /// bootstrapper) that need direct ring arithmetic alongside scheme
    /// operations.
    pub fn ring_context(&self) -> &RingContext {
        &self.ctx
    }

    fn scale(&self) -> BigUint {
        self.ctx.q() / BigUint::from(self.plain_modulus)
    }

    /// Scale a ring element's coefficients by `t/q` with rounding, the BFV
    /// "scale and round" that collapses the `Δ²` a raw tensor product of two
    /// `Δ`-scaled plaintexts carries back down to a single `Δ`. Centers each
    /// coefficient into `(-q/2, q/2]` first, same convention
    /// [`round_to_plain`] uses, so noise that wrapped around `q` rounds
    /// toward zero rather than toward `t-1`.
    fn rescale_by_t_over_q(&self, elem: &RingElement) -> HecResult<RingElement> {
        let q = self.ctx.q();
        let half_q = q / 2u32;
        let q_i = BigInt::from(q.clone());
        let t_i = BigInt::from(self.plain_modulus);
        let mut out = Vec::with_capacity(elem.coeffs().len());
        for c in elem.coeffs() {
            let centered: BigInt =
                if c > &half_q { BigInt::from(c.clone()) - BigInt::from(q.clone()) } else { BigInt::from(c.clone()) };
            let numerator = &centered * &t_i;
            let magnitude = numerator.magnitude_round_div(&q_i);
            let signed = if numerator.is_negative_signum() { -magnitude } else { magnitude };
            let reduced = signed.mod_floor(&q_i).to_biguint().expect("mod_floor against a positive modulus is non-negative");
            out.push(reduced);
        }
        self.ctx.from_coeffs(out)
    }

    fn small_secret_element<R: Rng + ?Sized>(&self, rng: &mut R) -> RingElement {
        let coeffs: Vec<BigUint> = (0..self.ctx.n())
            .map(|_| {
                let v = (rng.gen_range(0..3i64)) - 1; // uniform in {-1, 0, 1}
                signed_to_ring(&self.ctx, v)
            })
            .collect();
        self.ctx.from_coeffs(coeffs).expect("n coefficients by construction")
    }

    fn uniform_element<R: Rng + ?Sized>(&self, rng: &mut R) -> RingElement {
        let coeffs: Vec<BigUint> = (0..self.ctx.n())
            .map(|_| crate::arith::sample_uniform(self.ctx.q(), rng))
            .collect();
        self.ctx.from_coeffs(coeffs).expect("n coefficients by construction")
    }

    fn error_element<R: Rng + ?Sized>(&self, rng: &mut R) -> RingElement {
        let coeffs: Vec<BigUint> = (0..self.ctx.n())
            .map(|_| signed_to_ring(&self.ctx, sample_gaussian(self.sigma, rng)))
            .collect();
        self.ctx.from_coeffs(coeffs).expect("n coefficients by construction")
    }

    /// Generate a fresh secret/public/evaluation key triple. Rotation and
    /// bootstrap keys are generated separately, on demand.
    pub fn key_gen<R: Rng + ?Sized>(&self, rng: &mut R) -> HecResult<BgvKeyBundle> {
        let s = self.small_secret_element(rng);
        let a = self.uniform_element(rng);
        let e = self.error_element(rng);
        let b = self.ctx.negate(&self.ctx.add(&self.ctx.multiply(&a, &s)?, &e)?)?;

        let pk_fp = fingerprint_of(&[&self.ctx.to_bytes(&b)?, &self.ctx.to_bytes(&a)?]);
        let public = BgvPublicKey { b, a, fingerprint: pk_fp };
        let secret = BgvSecretKey { s: s.clone(), fingerprint: pk_fp };

        let s2 = self.ctx.multiply(&s, &s)?;
        let ksk = keyswitch::generate(&self.ctx, &s2, &s, self.decomposition_base, self.sigma, rng)?;
        let evaluation = BgvEvaluationKey { ksk, fingerprint: pk_fp };

        info!(n = self.ctx.n(), "bgv key-gen complete (secret, public, evaluation key)");
        Ok(BgvKeyBundle {
            secret,
            public,
            evaluation,
            rotation: HashMap::new(),
            fingerprint: pk_fp,
        })
    }

    /// Generate the rotation key for Galois step `step`, using generator
    /// `5` (the standard odd generator of `(Z/2nZ)*` used by SEAL/HElib-style
    /// implementations).
    pub fn generate_rotation_key<R: Rng + ?Sized>(
        &self,
        bundle: &BgvKeyBundle,
        step: i64,
        rng: &mut R,
    ) -> HecResult<BgvRotationKey> {
        let galois_elt = galois_element_for_step(self.ctx.n(), step);
        let rotated_s = apply_galois(&self.ctx, &bundle.secret.s, galois_elt)?;
        let ksk = keyswitch::generate(&self.ctx, &rotated_s, &bundle.secret.s, self.decomposition_base, self.sigma, rng)?;
        Ok(BgvRotationKey { step, ksk, fingerprint: bundle.fingerprint })
    }

    fn require_not_exhausted(&self, ct: &BgvCiphertext) -> HecResult<()> {
        if ct.state == CiphertextState::NeedsBootstrap {
            return Err(HecError::BootstrapRequired);
        }
        Ok(())
    }

    fn require_same_key(&self, a: &BgvCiphertext, b: &BgvCiphertext) -> HecResult<()> {
        if a.fingerprint != b.fingerprint {
            return Err(HecError::KeyMismatch);
        }
        Ok(())
    }

    fn transition(&self, level: u32, noise: crate::noise::NoiseState) -> CiphertextState {
        if level >= self.max_depth || self.noise_mgr.should_bootstrap(noise) {
            debug!(level, estimate = noise.estimate, "ciphertext noise/depth budget exhausted; bootstrap required");
            CiphertextState::NeedsBootstrap
        } else if level == 0 {
            CiphertextState::Fresh
        } else {
            CiphertextState::Linear(level)
        }
    }

    /// Encrypt a single integer `m mod t` in the constant coefficient,
    /// scaled by `floor(q/t)`.
    pub fn encrypt_scalar<R: Rng + ?Sized>(&self, pk: &BgvPublicKey, m: u64, rng: &mut R) -> HecResult<BgvCiphertext> {
        let mut coeffs = vec![BigUint::zero(); self.ctx.n()];
        coeffs[0] = (BigUint::from(m % self.plain_modulus)) * self.scale();
        let plaintext = self.ctx.from_coeffs(coeffs)?;
        self.encrypt_plaintext(pk, plaintext, rng)
    }

    /// Encrypt up to `n` plaintext slots via batched (SIMD) encoding.
    /// Requires the plaintext modulus to admit an NTT of length `n`
    /// (prime, `t ≡ 1 mod 2n`); fails with `UnsupportedOp` otherwise.
    pub fn encrypt<R: Rng + ?Sized>(&self, pk: &BgvPublicKey, messages: &[u64], rng: &mut R) -> HecResult<BgvCiphertext> {
        let plaintext = self.encode_batched(messages)?;
        self.encrypt_plaintext(pk, plaintext, rng)
    }

    fn encrypt_plaintext<R: Rng + ?Sized>(&self, pk: &BgvPublicKey, plaintext: RingElement, rng: &mut R) -> HecResult<BgvCiphertext> {
        let u = self.small_secret_element(rng);
        let e1 = self.error_element(rng);
        let e2 = self.error_element(rng);
        let c0 = self.ctx.add(&self.ctx.add(&self.ctx.multiply(&pk.b, &u)?, &e1)?, &plaintext)?;
        let c1 = self.ctx.add(&self.ctx.multiply(&pk.a, &u)?, &e2)?;
        Ok(BgvCiphertext {
            c0,
            c1,
            c2: None,
            fingerprint: pk.fingerprint,
            level: 0,
            noise: crate::noise::NoiseState::fresh(),
            state: CiphertextState::Fresh,
        })
    }

    fn encode_batched(&self, messages: &[u64]) -> HecResult<RingElement> {
        let n = self.ctx.n();
        if messages.len() > n {
            return Err(HecError::InvalidParameters(format!(
                "cannot encode {} messages into {} slots",
                messages.len(),
                n
            )));
        }
        let pntt = self
            .plaintext_ntt
            .as_ref()
            .ok_or_else(|| HecError::UnsupportedOp("plaintext modulus does not admit batched slot encoding".into()))?;
        let mut logical = vec![0u64; n];
        for (slot, &m) in logical.iter_mut().zip(messages.iter()) {
            *slot = m % self.plain_modulus;
        }
        let mut slots_natural = vec![0u64; n];
        for (k, &natural_idx) in self.slot_perm.iter().enumerate() {
            slots_natural[natural_idx] = logical[k];
        }
        pntt.inverse_transform(&mut slots_natural)?;
        let scale = self.scale();
        let coeffs: Vec<BigUint> = slots_natural.into_iter().map(|c| BigUint::from(c) * &scale).collect();
        self.ctx.from_coeffs(coeffs)
    }

    fn decode_batched(&self, raw: &RingElement) -> HecResult<Vec<u64>> {
        let pntt = self
            .plaintext_ntt
            .as_ref()
            .ok_or_else(|| HecError::UnsupportedOp("plaintext modulus does not admit batched slot decoding".into()))?;
        let scale = self.scale();
        let mut slots_natural: Vec<u64> = raw
            .coeffs()
            .iter()
            .map(|c| round_to_plain(&self.ctx, c, &scale, self.plain_modulus))
            .collect();
        pntt.transform(&mut slots_natural)?;
        let mut logical = vec![0u64; slots_natural.len()];
        for (k, &natural_idx) in self.slot_perm.iter().enumerate() {
            logical[k] = slots_natural[natural_idx];
        }
        Ok(logical)
    }

    fn raw_decrypt(&self, sk: &BgvSecretKey, ct: &BgvCiphertext) -> HecResult<RingElement> {
        if sk.fingerprint != ct.fingerprint {
            return Err(HecError::KeyMismatch);
        }
        if self.noise_mgr.should_bootstrap(ct.noise) {
            return Err(HecError::NoiseExceeded);
        }
        let mut v = self.ctx.add(&ct.c0, &self.ctx.multiply(&ct.c1, &sk.s)?)?;
        if let Some(c2) = &ct.c2 {
            let s2 = self.ctx.multiply(&sk.s, &sk.s)?;
            v = self.ctx.add(&v, &self.ctx.multiply(c2, &s2)?)?;
        }
        Ok(v)
    }

    /// Decrypt the constant-term scalar encoding.
    pub fn decrypt_scalar(&self, sk: &BgvSecretKey, ct: &BgvCiphertext) -> HecResult<u64> {
        let v = self.raw_decrypt(sk, ct)?;
        Ok(round_to_plain(&self.ctx, &v.coeffs()[0], &self.scale(), self.plain_modulus))
    }

    /// Decrypt a batched ciphertext into its `n`-length slot vector.
    pub fn decrypt(&self, sk: &BgvSecretKey, ct: &BgvCiphertext) -> HecResult<Vec<u64>> {
        let v = self.raw_decrypt(sk, ct)?;
        self.decode_batched(&v)
    }

    /// Homomorphic addition. Fingerprints must match; noise is
    /// monotone non-decreasing.
    pub fn add(&self, a: &BgvCiphertext, b: &BgvCiphertext) -> HecResult<BgvCiphertext> {
        self.require_not_exhausted(a)?;
        self.require_not_exhausted(b)?;
        self.require_same_key(a, b)?;
        if a.needs_relinearize() || b.needs_relinearize() {
            return Err(HecError::UnsupportedOp("cannot add an un-relinearized degree-2 ciphertext".into()));
        }
        let c0 = self.ctx.add(&a.c0, &b.c0)?;
        let c1 = self.ctx.add(&a.c1, &b.c1)?;
        let level = a.level.max(b.level);
        let noise = self.noise_mgr.after_add(a.noise, b.noise);
        Ok(BgvCiphertext {
            c0,
            c1,
            c2: None,
            fingerprint: a.fingerprint,
            level,
            noise,
            state: self.transition(level, noise),
        })
    }

    /// Homomorphic subtraction: `add(a, negate(b))`.
    pub fn subtract(&self, a: &BgvCiphertext, b: &BgvCiphertext) -> HecResult<BgvCiphertext> {
        let neg_b = BgvCiphertext {
            c0: self.ctx.negate(&b.c0)?,
            c1: self.ctx.negate(&b.c1)?,
            c2: b.c2.as_ref().map(|c2| self.ctx.negate(c2)).transpose()?,
            fingerprint: b.fingerprint,
            level: b.level,
            noise: b.noise,
            state: b.state,
        };
        self.add(a, &neg_b)
    }

    /// Multiply every coefficient by a plaintext scalar `k mod t`.
    pub fn scalar_mul(&self, ct: &BgvCiphertext, k: u64) -> HecResult<BgvCiphertext> {
        self.require_not_exhausted(ct)?;
        let k_big = BigUint::from(k % self.plain_modulus);
        let c0 = self.ctx.scalar_mul(&ct.c0, &k_big)?;
        let c1 = self.ctx.scalar_mul(&ct.c1, &k_big)?;
        let c2 = ct.c2.as_ref().map(|c2| self.ctx.scalar_mul(c2, &k_big)).transpose()?;
        let noise = self.noise_mgr.after_scalar_mul(ct.noise, k_big.bits());
        Ok(BgvCiphertext {
            c0,
            c1,
            c2,
            fingerprint: ct.fingerprint,
            level: ct.level,
            noise,
            state: self.transition(ct.level, noise),
        })
    }

    /// Raw homomorphic multiplication, producing a degree-2 triple without
    /// relinearizing. The tensor product `(c0c0', c0c1'+c1c0', c1c1')`
    /// carries a `Δ²` scaling factor (each input encodes its message as
    /// `Δ·m`), so every component is rescaled by `t/q` with rounding before
    /// being returned — the standard BFV "scale and round" multiplication,
    /// without which the result would decrypt to `Δ·(m1·m2) mod t` instead
    /// of `m1·m2`.
    pub fn multiply_raw(&self, a: &BgvCiphertext, b: &BgvCiphertext) -> HecResult<BgvCiphertext> {
        self.require_not_exhausted(a)?;
        self.require_not_exhausted(b)?;
        self.require_same_key(a, b)?;
        if a.needs_relinearize() || b.needs_relinearize() {
            return Err(HecError::UnsupportedOp(
                "cannot multiply an un-relinearized degree-2 ciphertext; relinearize first".into(),
            ));
        }
        let d0 = self.rescale_by_t_over_q(&self.ctx.multiply(&a.c0, &b.c0)?)?;
        let cross = self
            .rescale_by_t_over_q(&self.ctx.add(&self.ctx.multiply(&a.c0, &b.c1)?, &self.ctx.multiply(&a.c1, &b.c0)?)?)?;
        let d2 = self.rescale_by_t_over_q(&self.ctx.multiply(&a.c1, &b.c1)?)?;
        let level = a.level.max(b.level) + 1;
        let noise = self.noise_mgr.after_multiply(a.noise, b.noise, self.ctx.n());
        Ok(BgvCiphertext {
            c0: d0,
            c1: cross,
            c2: Some(d2),
            fingerprint: a.fingerprint,
            level,
            noise,
            state: self.transition(level, noise),
        })
    }

    /// Relinearize a degree-2 ciphertext back to a pair using the
    /// evaluation key.
    pub fn relinearize(&self, ct: &BgvCiphertext, evk: &BgvEvaluationKey) -> HecResult<BgvCiphertext> {
        if evk.fingerprint != ct.fingerprint {
            return Err(HecError::KeyMismatch);
        }
        let Some(c2) = &ct.c2 else {
            return Ok(ct.clone());
        };
        let (delta0, delta1) = keyswitch::apply(&self.ctx, c2, &evk.ksk)?;
        let c0 = self.ctx.add(&ct.c0, &delta0)?;
        let c1 = self.ctx.add(&ct.c1, &delta1)?;
        let noise = self.noise_mgr.after_key_switch(ct.noise);
        Ok(BgvCiphertext {
            c0,
            c1,
            c2: None,
            fingerprint: ct.fingerprint,
            level: ct.level,
            noise,
            state: self.transition(ct.level, noise),
        })
    }

    /// Homomorphic multiplication followed by relinearization, as the
    /// spec frames `Multiply` as a single logical operation.
    pub fn multiply(&self, a: &BgvCiphertext, b: &BgvCiphertext, evk: &BgvEvaluationKey) -> HecResult<BgvCiphertext> {
        let raw = self.multiply_raw(a, b)?;
        self.relinearize(&raw, evk)
    }

    /// Rotate slots by `rk.step`, applying the Galois automorphism to both
    /// halves and key-switching back to the original secret. A positive
    /// `step` is a right cyclic shift (`slot[i] <- slot[i-step]`, wrapping).
    pub fn rotate(&self, ct: &BgvCiphertext, rk: &BgvRotationKey) -> HecResult<BgvCiphertext> {
        self.require_not_exhausted(ct)?;
        if rk.fingerprint != ct.fingerprint {
            return Err(HecError::KeyMismatch);
        }
        if ct.needs_relinearize() {
            return Err(HecError::UnsupportedOp("cannot rotate an un-relinearized degree-2 ciphertext".into()));
        }
        let galois_elt = galois_element_for_step(self.ctx.n(), rk.step);
        let rotated_c0 = apply_galois(&self.ctx, &ct.c0, galois_elt)?;
        let rotated_c1 = apply_galois(&self.ctx, &ct.c1, galois_elt)?;
        let (delta0, delta1) = keyswitch::apply(&self.ctx, &rotated_c1, &rk.ksk)?;
        let c0 = self.ctx.add(&rotated_c0, &delta0)?;
        let c1 = delta1;
        let noise = self.noise_mgr.after_key_switch(ct.noise);
        Ok(BgvCiphertext {
            c0,
            c1,
            c2: None,
            fingerprint: ct.fingerprint,
            level: ct.level,
            noise,
            state: self.transition(ct.level, noise),
        })
    }

    /// Serialize `ct` to the wire format: 4-byte magic, 1-byte scheme tag,
    /// 1-byte version, 2-byte flags (the ciphertext's depth level, capped
    /// at `u8::MAX`), 16-byte key fingerprint, 8-byte noise estimate, then
    /// length-prefixed `c0`/`c1` ring-element blobs. An un-relinearized
    /// degree-2 ciphertext has no `c2` slot in this format; relinearize
    /// before serializing.
    pub fn serialize_ciphertext(&self, ct: &BgvCiphertext) -> HecResult<Vec<u8>> {
        if ct.needs_relinearize() {
            return Err(HecError::UnsupportedOp(
                "cannot serialize an un-relinearized ciphertext; relinearize first".into(),
            ));
        }
        let flags: u16 = u8::try_from(ct.level).unwrap_or(u8::MAX) as u16;
        let c0_bytes = self.ctx.to_bytes(&ct.c0)?;
        let c1_bytes = self.ctx.to_bytes(&ct.c1)?;

        let mut out = Vec::with_capacity(CIPHERTEXT_HEADER_LEN + 8 + c0_bytes.len() + c1_bytes.len());
        out.extend_from_slice(&CIPHERTEXT_MAGIC);
        out.push(SCHEME_TAG_BGV);
        out.push(CIPHERTEXT_VERSION);
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&ct.fingerprint);
        out.extend_from_slice(&ct.noise.estimate.to_le_bytes());
        write_length_prefixed(&mut out, &c0_bytes);
        write_length_prefixed(&mut out, &c1_bytes);
        Ok(out)
    }

    /// Deserialize a blob produced by [`BgvScheme::serialize_ciphertext`].
    /// `expected_key` binds the result to a known public key: the header's
    /// embedded fingerprint must match it, or deserialization fails with
    /// `InvalidCiphertext` rather than silently returning a ciphertext
    /// bound to a different key. The `operations_since_fresh` fallback
    /// counter resets to zero on reconstruction, since the wire format
    /// carries only the noise estimate itself.
    pub fn deserialize_ciphertext(&self, bytes: &[u8], expected_key: &BgvPublicKey) -> HecResult<BgvCiphertext> {
        if bytes.len() < CIPHERTEXT_HEADER_LEN {
            return Err(HecError::InvalidCiphertext("ciphertext blob shorter than header".into()));
        }
        let (header, rest) = bytes.split_at(CIPHERTEXT_HEADER_LEN);
        if header[0..4] != CIPHERTEXT_MAGIC {
            return Err(HecError::InvalidCiphertext("bad magic".into()));
        }
        if header[4] != SCHEME_TAG_BGV {
            return Err(HecError::InvalidCiphertext(format!("unexpected scheme tag {}", header[4])));
        }
        if header[5] != CIPHERTEXT_VERSION {
            return Err(HecError::InvalidCiphertext(format!("unsupported wire version {}", header[5])));
        }
        let flags = u16::from_le_bytes([header[6], header[7]]);
        let level = (flags & 0xff) as u32;
        let mut fingerprint = [0u8; 16];
        fingerprint.copy_from_slice(&header[8..24]);
        if fingerprint != expected_key.fingerprint {
            return Err(HecError::InvalidCiphertext("key fingerprint mismatch".into()));
        }
        let mut noise_bytes = [0u8; 8];
        noise_bytes.copy_from_slice(&header[24..32]);
        let estimate = f64::from_le_bytes(noise_bytes);

        let (c0_bytes, rest) = read_length_prefixed(rest)?;
        let (c1_bytes, rest) = read_length_prefixed(rest)?;
        if !rest.is_empty() {
            return Err(HecError::InvalidCiphertext("trailing bytes after ciphertext payload".into()));
        }
        let c0 = self.ctx.from_bytes(c0_bytes)?;
        let c1 = self.ctx.from_bytes(c1_bytes)?;
        let noise = crate::noise::NoiseState { estimate, operations_since_fresh: 0 };
        Ok(BgvCiphertext {
            c0,
            c1,
            c2: None,
            fingerprint,
            level,
            noise,
            state: self.transition(level, noise),
        })
    }
}

/// Magic bytes opening every serialized ciphertext blob, shared across
/// schemes; the scheme tag byte right after it distinguishes BGV from
/// ElGamal.
pub(crate) const CIPHERTEXT_MAGIC: [u8; 4] = *b"CT\0\0";
pub(crate) const CIPHERTEXT_VERSION: u8 = 1;
const SCHEME_TAG_BGV: u8 = 1;
/// magic(4) + scheme tag(1) + version(1) + flags(2) + fingerprint(16) + noise/reserved(8)
const CIPHERTEXT_HEADER_LEN: usize = 32;

pub(crate) fn write_length_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

pub(crate) fn read_length_prefixed(bytes: &[u8]) -> HecResult<(&[u8], &[u8])> {
    if bytes.len() < 4 {
        return Err(HecError::InvalidCiphertext("truncated length prefix".into()));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[0..4]);
    let len = u32::from_le_bytes(len_bytes) as usize;
    let rest = &bytes[4..];
    if rest.len() < len {
        return Err(HecError::InvalidCiphertext("truncated payload".into()));
    }
    Ok(rest.split_at(len))
}

/// Galois element `3^(-step) mod 2n` for the given rotation step. `3`
/// generates the order-`n/2` cyclic factor of `(Z/2nZ)*`, which is what
/// makes this automorphism a clean cyclic shift of the logical slot array
/// within its row (see [`BgvScheme::slot_perm`]) — `(Z/2nZ)*` itself is
/// never cyclic of order `n` for `n >= 4`, so no single Galois element
/// rotates both rows at once; rotating the second row uses the same
/// element composed with the row-swap element `-1`, which this crate does
/// not expose as a separate operation.
///
/// The exponent is negated so that a positive `step` produces a *right*
/// cyclic shift (`slot[i] <- slot[i-1]`, wrapping), matching the
/// conformance scenario `decode(decrypt(rotate(encrypt([1,2,3,4]), 1))) =
/// [4,1,2,3]`: the value previously in the last slot moves to the front.
fn galois_element_for_step(n: usize, step: i64) -> u64 {
    let two_n = 2 * n as u64;
    let row_len = (n / 2) as i64;
    let exponent = (-step).rem_euclid(row_len.max(1)) as u64;
    let mut result = 1u64;
    let mut base = 3u64 % two_n;
    let mut e = exponent;
    while e > 0 {
        if e & 1 == 1 {
            result = (result * base) % two_n;
        }
        base = (base * base) % two_n;
        e >>= 1;
    }
    result
}

/// Apply the ring automorphism `X -> X^k` (for odd `k` coprime to `2n`) to
/// a coefficient-domain ring element: coefficient `i` maps to position `i*k
/// mod 2n`, folding back into `[0, n)` with a sign flip when the exponent
/// wraps past `n` (since `X^n = -1` in `R_q`).
fn apply_galois(ctx: &RingContext, a: &RingElement, k: u64) -> HecResult<RingElement> {
    let n = ctx.n();
    let two_n = 2 * n as u64;
    let mut out = vec![BigUint::zero(); n];
    for (i, coeff) in a.coeffs().iter().enumerate() {
        let exponent = ((i as u64) * k) % two_n;
        if exponent < n as u64 {
            out[exponent as usize] = coeff.clone();
        } else {
            let idx = (exponent - n as u64) as usize;
            out[idx] = if coeff.is_zero() { BigUint::zero() } else { ctx.q() - coeff };
        }
    }
    ctx.from_coeffs(out)
}

/// Round `c` (a coefficient mod `q`, possibly representing a small
/// negative value wrapped around) to the nearest multiple of `scale`,
/// reducing the quotient mod `t`. Centers `c` into `(-q/2, q/2]` first so
/// wrapped-around noise rounds toward zero rather than toward `t-1`.
fn round_to_plain(ctx: &RingContext, c: &BigUint, scale: &BigUint, t: u64) -> u64 {
    let q = ctx.q();
    let half_q = q / 2u32;
    let centered: BigInt = if c > &half_q {
        BigInt::from(c.clone()) - BigInt::from(q.clone())
    } else {
        BigInt::from(c.clone())
    };
    let scale_i = BigInt::from(scale.clone());
    let magnitude = centered.magnitude_round_div(&scale_i);
    let signed = if centered.is_negative_signum() { -magnitude } else { magnitude };
    let t_i = BigInt::from(t);
    signed.mod_floor(&t_i).to_u64().unwrap_or(0)
}

/// Small helper trait kept local to this module: round-half-up division
/// of a signed `BigInt`'s magnitude by a positive `BigInt` divisor.
trait RoundDiv {
    fn magnitude_round_div(&self, divisor: &BigInt) -> BigInt;
    fn is_negative_signum(&self) -> bool;
}

impl RoundDiv for BigInt {
    fn magnitude_round_div(&self, divisor: &BigInt) -> BigInt {
        let mag = self.magnitude().clone();
        let mag = BigInt::from(mag);
        let doubled = &mag * 2;
        (doubled + divisor) / (divisor * 2)
    }

    fn is_negative_signum(&self) -> bool {
        *self < BigInt::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RingParams, SecurityLevel};
    use rand::thread_rng;

    fn scheme() -> BgvScheme {
        let mut config = HecConfig { security_level: SecurityLevel::Bits128, ..HecConfig::default() };
        config.ring_params = Some(RingParams::for_security_level(SecurityLevel::Bits128));
        BgvScheme::new(&config).unwrap()
    }

    // Batched (SIMD) slot tests need a plaintext modulus that actually admits
    // an NTT, which the default preset's t=1024 does not (it's a power of
    // two, not prime). These use a small custom ring with a real
    // NTT-friendly prime plaintext modulus instead.
    fn batched_scheme() -> BgvScheme {
        let n = 64;
        let t = 257; // 257 - 1 = 256 = 2*128... need t ≡ 1 mod 2n=128: 256/128=2, holds.
        let params = RingParams {
            n,
            coeff_modulus: vec![0x1000000000024001u64],
            plain_modulus: t,
            sigma: 3.2,
            batch_size: Some(n),
        };
        let config = HecConfig { ring_params: Some(params), ..HecConfig::default() };
        BgvScheme::new(&config).unwrap()
    }

    #[test]
    fn scalar_encrypt_decrypt_round_trip() {
        let scheme = scheme();
        let mut rng = thread_rng();
        let bundle = scheme.key_gen(&mut rng).unwrap();
        let ct = scheme.encrypt_scalar(&bundle.public, 42, &mut rng).unwrap();
        let m = scheme.decrypt_scalar(&bundle.secret, &ct).unwrap();
        assert_eq!(m, 42);
    }

    #[test]
    fn scalar_add_is_homomorphic() {
        let scheme = scheme();
        let mut rng = thread_rng();
        let bundle = scheme.key_gen(&mut rng).unwrap();
        let a = scheme.encrypt_scalar(&bundle.public, 10, &mut rng).unwrap();
        let b = scheme.encrypt_scalar(&bundle.public, 20, &mut rng).unwrap();
        let sum = scheme.add(&a, &b).unwrap();
        assert_eq!(scheme.decrypt_scalar(&bundle.secret, &sum).unwrap(), 30);
    }

    #[test]
    fn scalar_multiply_relinearizes_and_decrypts() {
        let scheme = scheme();
        let mut rng = thread_rng();
        let bundle = scheme.key_gen(&mut rng).unwrap();
        let a = scheme.encrypt_scalar(&bundle.public, 6, &mut rng).unwrap();
        let b = scheme.encrypt_scalar(&bundle.public, 7, &mut rng).unwrap();
        let product = scheme.multiply(&a, &b, &bundle.evaluation).unwrap();
        assert!(!product.needs_relinearize());
        assert_eq!(scheme.decrypt_scalar(&bundle.secret, &product).unwrap(), 42);
    }

    #[test]
    fn mismatched_keys_are_rejected() {
        let scheme = scheme();
        let mut rng = thread_rng();
        let bundle_a = scheme.key_gen(&mut rng).unwrap();
        let bundle_b = scheme.key_gen(&mut rng).unwrap();
        let a = scheme.encrypt_scalar(&bundle_a.public, 1, &mut rng).unwrap();
        let b = scheme.encrypt_scalar(&bundle_b.public, 2, &mut rng).unwrap();
        assert!(matches!(scheme.add(&a, &b), Err(HecError::KeyMismatch)));
    }

    #[test]
    fn batched_encrypt_decrypt_round_trip() {
        let scheme = batched_scheme();
        let mut rng = thread_rng();
        let bundle = scheme.key_gen(&mut rng).unwrap();
        let ct = scheme.encrypt(&bundle.public, &[1, 2, 3, 4, 5], &mut rng).unwrap();
        let decoded = scheme.decrypt(&bundle.secret, &ct).unwrap();
        assert_eq!(&decoded[..5], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn batched_add_is_slot_wise() {
        let scheme = batched_scheme();
        let mut rng = thread_rng();
        let bundle = scheme.key_gen(&mut rng).unwrap();
        let a = scheme.encrypt(&bundle.public, &[10, 20, 30], &mut rng).unwrap();
        let b = scheme.encrypt(&bundle.public, &[1, 2, 3], &mut rng).unwrap();
        let sum = scheme.add(&a, &b).unwrap();
        let decoded = scheme.decrypt(&bundle.secret, &sum).unwrap();
        assert_eq!(&decoded[..3], &[11, 22, 33]);
    }

    #[test]
    fn batched_multiply_is_slot_wise() {
        let scheme = batched_scheme();
        let mut rng = thread_rng();
        let bundle = scheme.key_gen(&mut rng).unwrap();
        let a = scheme.encrypt(&bundle.public, &[2, 3, 4], &mut rng).unwrap();
        let b = scheme.encrypt(&bundle.public, &[3, 4, 5], &mut rng).unwrap();
        let product = scheme.multiply(&a, &b, &bundle.evaluation).unwrap();
        let decoded = scheme.decrypt(&bundle.secret, &product).unwrap();
        assert_eq!(&decoded[..3], &[6, 12, 20]);
    }

    #[test]
    fn rotate_by_one_cyclically_shifts_slots() {
        // A right cyclic shift by one: the value in the last slot wraps to
        // the front, matching `decode(decrypt(rotate(encrypt([1,2,3,4]),
        // 1))) = [4,1,2,3]`.
        let scheme = batched_scheme();
        let mut rng = thread_rng();
        let bundle = scheme.key_gen(&mut rng).unwrap();
        let rk = scheme.generate_rotation_key(&bundle, 1, &mut rng).unwrap();
        let n = scheme.ctx.n();
        let mut messages = vec![0u64; n];
        messages[0] = 1;
        messages[1] = 2;
        messages[2] = 3;
        messages[n - 1] = 4;
        let ct = scheme.encrypt(&bundle.public, &messages, &mut rng).unwrap();
        let rotated = scheme.rotate(&ct, &rk).unwrap();
        let decoded = scheme.decrypt(&bundle.secret, &rotated).unwrap();
        assert_eq!(&decoded[..4], &[4, 1, 2, 3]);
    }

    #[test]
    fn unsupported_op_on_triple_is_rejected() {
        let scheme = scheme();
        let mut rng = thread_rng();
        let bundle = scheme.key_gen(&mut rng).unwrap();
        let a = scheme.encrypt_scalar(&bundle.public, 2, &mut rng).unwrap();
        let b = scheme.encrypt_scalar(&bundle.public, 3, &mut rng).unwrap();
        let raw = scheme.multiply_raw(&a, &b).unwrap();
        assert!(raw.needs_relinearize());
        let c = scheme.encrypt_scalar(&bundle.public, 1, &mut rng).unwrap();
        assert!(matches!(scheme.add(&raw, &c), Err(HecError::UnsupportedOp(_))));
    }

    #[test]
    fn ciphertext_serialize_round_trips() {
        let scheme = scheme();
        let mut rng = thread_rng();
        let bundle = scheme.key_gen(&mut rng).unwrap();
        let ct = scheme.encrypt_scalar(&bundle.public, 42, &mut rng).unwrap();
        let bytes = scheme.serialize_ciphertext(&ct).unwrap();
        assert_eq!(&bytes[0..4], b"CT\0\0");
        let restored = scheme.deserialize_ciphertext(&bytes, &bundle.public).unwrap();
        assert_eq!(scheme.decrypt_scalar(&bundle.secret, &restored).unwrap(), 42);
    }

    #[test]
    fn ciphertext_deserialize_rejects_bad_magic() {
        let scheme = scheme();
        let mut rng = thread_rng();
        let bundle = scheme.key_gen(&mut rng).unwrap();
        let ct = scheme.encrypt_scalar(&bundle.public, 1, &mut rng).unwrap();
        let mut bytes = scheme.serialize_ciphertext(&ct).unwrap();
        bytes[0] = b'X';
        assert!(matches!(scheme.deserialize_ciphertext(&bytes, &bundle.public), Err(HecError::InvalidCiphertext(_))));
    }

    #[test]
    fn ciphertext_deserialize_rejects_wrong_key() {
        let scheme = scheme();
        let mut rng = thread_rng();
        let bundle_a = scheme.key_gen(&mut rng).unwrap();
        let bundle_b = scheme.key_gen(&mut rng).unwrap();
        let ct = scheme.encrypt_scalar(&bundle_a.public, 1, &mut rng).unwrap();
        let bytes = scheme.serialize_ciphertext(&ct).unwrap();
        assert!(matches!(
            scheme.deserialize_ciphertext(&bytes, &bundle_b.public),
            Err(HecError::InvalidCiphertext(_))
        ));
    }

    #[test]
    fn serializing_an_unrelinearized_ciphertext_is_rejected() {
        let scheme = scheme();
        let mut rng = thread_rng();
        let bundle = scheme.key_gen(&mut rng).unwrap();
        let a = scheme.encrypt_scalar(&bundle.public, 2, &mut rng).unwrap();
        let b = scheme.encrypt_scalar(&bundle.public, 3, &mut rng).unwrap();
        let raw = scheme.multiply_raw(&a, &b).unwrap();
        assert!(matches!(scheme.serialize_ciphertext(&raw), Err(HecError::UnsupportedOp(_))));
    }
}
