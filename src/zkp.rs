//! Zero-knowledge proof layer: Schnorr, Chaum–Pedersen, Pedersen
//! commitments, Fiat–Shamir square-root proofs, OR-proofs, range proofs,
//! and their composition with encrypted values.
//!
//! All group arithmetic here happens in a safe-prime subgroup of `Z_p*`
//! ([`GroupParams`]), independent of the lattice rings [`crate::fhe`] and
//! [`crate::elgamal`] use — this layer only needs the ciphertext's
//! serialized bytes to bind a proof to it, not its algebraic structure.
//! Every challenge is derived from a [`crate::transcript::Transcript`] so
//! every public input (group parameters, commitments, bound ciphertext
//! bytes) is hashed before a challenge is sampled, per spec §4.11 and the
//! range-proof soundness note in spec §9.

use num_bigint::BigUint;
use num_traits::One;
use rand::Rng;
use subtle::ConstantTimeEq;

use crate::arith::{find_subgroup_generator, generate_safe_prime, modinverse, modpow, sample_uniform};
use crate::error::{HecError, HecResult};
use crate::transcript::{FsLabel, Transcript};

/// A safe-prime group `(p, q, g)`: `p = 2q + 1` with both prime, and `g`
/// a generator of the order-`q` subgroup of `Z_p*`.
#[derive(Clone, Debug)]
pub struct GroupParams {
    pub p: BigUint,
    pub q: BigUint,
    pub g: BigUint,
}

impl GroupParams {
    /// Generate fresh group parameters at the given safe-prime bit length.
    pub fn generate<R: Rng + ?Sized>(bits: u64, rng: &mut R) -> Self {
        let p = generate_safe_prime(bits, rng);
        let q = (&p - BigUint::one()) / BigUint::from(2u32);
        let g = find_subgroup_generator(&p, &q, rng);
        GroupParams { p, q, g }
    }

    /// `base^exp mod p`.
    pub fn pow(&self, base: &BigUint, exp: &BigUint) -> BigUint {
        base.modpow(exp, &self.p)
    }

    /// Derive a second generator `h` with no known discrete log relative
    /// to `g`, deterministically from `seed`, the same "raise a hashed
    /// candidate to the cofactor" technique
    /// [`crate::arith::find_subgroup_generator`] uses with a hash stream in
    /// place of an RNG. Anyone can recompute `h` from `seed`, but nobody
    /// (prover included) learns `log_g(h)`, which is what Pedersen's
    /// binding property relies on — unlike deriving `h = g^H(seed)`, which
    /// would hand everyone exactly that discrete log.
    pub fn derive_generator(&self, seed: &[u8]) -> BigUint {
        let exponent = (&self.p - BigUint::one()) / &self.q;
        let mut counter: u64 = 0;
        loop {
            let mut hasher = blake3::Hasher::new();
            hasher.update(seed);
            hasher.update(&counter.to_le_bytes());
            let mut reader = hasher.finalize_xof();
            let byte_len = ((self.p.bits() as usize) + 7) / 8 + 8;
            let mut buf = vec![0u8; byte_len];
            std::io::Read::read_exact(&mut reader, &mut buf).expect("XOF reader never errors");
            let candidate = BigUint::from_bytes_be(&buf) % &self.p;
            let h = candidate.modpow(&exponent, &self.p);
            if h != BigUint::one() {
                return h;
            }
            counter += 1;
        }
    }
}

/// Constant-time equality over two big integers' big-endian byte
/// encodings, zero-padded to a common length first so the comparison
/// itself leaks no length-dependent timing signal.
fn ct_eq(a: &BigUint, b: &BigUint) -> bool {
    let mut ab = a.to_bytes_be();
    let mut bb = b.to_bytes_be();
    let len = ab.len().max(bb.len());
    pad_front(&mut ab, len);
    pad_front(&mut bb, len);
    ab.ct_eq(&bb).into()
}

fn pad_front(v: &mut Vec<u8>, len: usize) {
    if v.len() < len {
        let mut padded = vec![0u8; len - v.len()];
        padded.extend_from_slice(v);
        *v = padded;
    }
}

fn random_exponent<R: Rng + ?Sized>(q: &BigUint, rng: &mut R) -> BigUint {
    sample_uniform(q, rng)
}

// ---------------------------------------------------------------------
// Schnorr: proof of knowledge of a discrete log.
// ---------------------------------------------------------------------

/// A Schnorr proof of knowledge of `x` such that `y = base^x mod p`.
#[derive(Clone, Debug)]
pub struct SchnorrProof {
    pub commitment: BigUint,
    pub challenge: BigUint,
    pub response: BigUint,
}

/// Prove knowledge of `x` relative to `base` (almost always `params.g`;
/// exposed explicitly since [`prove_range`]'s bit proofs reuse this same
/// machinery against the Pedersen generator `h`).
pub fn schnorr_prove<R: Rng + ?Sized>(
    params: &GroupParams,
    base: &BigUint,
    x: &BigUint,
    rng: &mut R,
) -> SchnorrProof {
    let y = params.pow(base, x);
    let r = random_exponent(&params.q, rng);
    let t = params.pow(base, &r);
    let challenge = schnorr_challenge(params, base, &y, &t);
    let response = (&r + x * &challenge) % &params.q;
    SchnorrProof { commitment: t, challenge, response }
}

fn schnorr_challenge(params: &GroupParams, base: &BigUint, y: &BigUint, t: &BigUint) -> BigUint {
    let mut transcript = Transcript::new("hec.schnorr");
    transcript.absorb_biguint(FsLabel::GroupParams, &params.p);
    transcript.absorb_biguint(FsLabel::GroupParams, base);
    transcript.absorb_biguint(FsLabel::PublicValue, y);
    transcript.absorb_biguint(FsLabel::Commitment, t);
    transcript.challenge_mod(FsLabel::Challenge, &params.q)
}

/// Verify a Schnorr proof: `base^response == commitment * y^challenge mod p`,
/// and that `proof.challenge` is the one the transcript actually derives
/// (rejecting proofs that mutated the response without recomputing a
/// consistent challenge).
pub fn schnorr_verify(params: &GroupParams, base: &BigUint, y: &BigUint, proof: &SchnorrProof) -> bool {
    let expected_challenge = schnorr_challenge(params, base, y, &proof.commitment);
    if !ct_eq(&expected_challenge, &proof.challenge) {
        return false;
    }
    let lhs = params.pow(base, &proof.response);
    let rhs = (&proof.commitment * params.pow(y, &proof.challenge)) % &params.p;
    ct_eq(&lhs, &rhs)
}

// ---------------------------------------------------------------------
// Chaum–Pedersen: equal discrete logs across two bases.
// ---------------------------------------------------------------------

/// Proof that `log_g(y1) = log_h(y2)` for the same secret `x`.
#[derive(Clone, Debug)]
pub struct ChaumPedersenProof {
    pub t1: BigUint,
    pub t2: BigUint,
    pub challenge: BigUint,
    pub response: BigUint,
}

pub fn chaum_pedersen_prove<R: Rng + ?Sized>(
    params: &GroupParams,
    h: &BigUint,
    x: &BigUint,
    rng: &mut R,
) -> ChaumPedersenProof {
    let y1 = params.pow(&params.g, x);
    let y2 = params.pow(h, x);
    let r = random_exponent(&params.q, rng);
    let t1 = params.pow(&params.g, &r);
    let t2 = params.pow(h, &r);
    let challenge = chaum_pedersen_challenge(params, h, &y1, &y2, &t1, &t2);
    let response = (&r + x * &challenge) % &params.q;
    ChaumPedersenProof { t1, t2, challenge, response }
}

fn chaum_pedersen_challenge(
    params: &GroupParams,
    h: &BigUint,
    y1: &BigUint,
    y2: &BigUint,
    t1: &BigUint,
    t2: &BigUint,
) -> BigUint {
    let mut transcript = Transcript::new("hec.chaum_pedersen");
    transcript.absorb_biguint(FsLabel::GroupParams, &params.p);
    transcript.absorb_biguint(FsLabel::GroupParams, h);
    transcript.absorb_biguint(FsLabel::PublicValue, y1);
    transcript.absorb_biguint(FsLabel::PublicValue, y2);
    transcript.absorb_biguint(FsLabel::Commitment, t1);
    transcript.absorb_biguint(FsLabel::Commitment, t2);
    transcript.challenge_mod(FsLabel::Challenge, &params.q)
}

pub fn chaum_pedersen_verify(
    params: &GroupParams,
    h: &BigUint,
    y1: &BigUint,
    y2: &BigUint,
    proof: &ChaumPedersenProof,
) -> bool {
    let expected = chaum_pedersen_challenge(params, h, y1, y2, &proof.t1, &proof.t2);
    if !ct_eq(&expected, &proof.challenge) {
        return false;
    }
    let lhs1 = params.pow(&params.g, &proof.response);
    let rhs1 = (&proof.t1 * params.pow(y1, &proof.challenge)) % &params.p;
    let lhs2 = params.pow(h, &proof.response);
    let rhs2 = (&proof.t2 * params.pow(y2, &proof.challenge)) % &params.p;
    ct_eq(&lhs1, &rhs1) && ct_eq(&lhs2, &rhs2)
}

// ---------------------------------------------------------------------
// Pedersen commitments.
// ---------------------------------------------------------------------

/// A Pedersen commitment scheme bound to one group and second generator
/// `h` (independent of `g`, see [`GroupParams::derive_generator`]).
#[derive(Clone, Debug)]
pub struct PedersenParams {
    pub group: GroupParams,
    pub h: BigUint,
}

impl PedersenParams {
    /// Build Pedersen parameters over `group`, deriving `h` from `seed`.
    pub fn new(group: GroupParams, seed: &[u8]) -> Self {
        let h = group.derive_generator(seed);
        PedersenParams { group, h }
    }

    /// `C = g^m * h^r mod p`.
    pub fn commit(&self, m: &BigUint, r: &BigUint) -> BigUint {
        let gm = self.group.pow(&self.group.g, m);
        let hr = self.group.pow(&self.h, r);
        (&gm * &hr) % &self.group.p
    }
}

/// Homomorphic combination of two Pedersen commitments: `C1 * C2 mod p`
/// commits to `(m1 + m2, r1 + r2)`.
pub fn pedersen_add(params: &PedersenParams, c1: &BigUint, c2: &BigUint) -> BigUint {
    (c1 * c2) % &params.group.p
}

/// A proof of knowledge of a Pedersen commitment's opening `(m, r)`, a
/// two-exponent generalization of Schnorr (sometimes called an Okamoto
/// proof). Used by [`prove_ciphertext_binding`] to prove a ciphertext
/// encrypts a committed, known plaintext.
#[derive(Clone, Debug)]
pub struct PedersenOpeningProof {
    pub t: BigUint,
    pub challenge: BigUint,
    pub s_m: BigUint,
    pub s_r: BigUint,
}

/// Prove knowledge of the opening `(m, r)` of `commitment = params.commit(m,
/// r)`. `binding` additionally hashes arbitrary external context (e.g. a
/// ciphertext's serialized bytes) into the challenge, so the proof cannot be
/// replayed against a different ciphertext carrying the same commitment.
pub fn prove_opening<R: Rng + ?Sized>(
    params: &PedersenParams,
    m: &BigUint,
    r: &BigUint,
    binding: Option<&[u8]>,
    rng: &mut R,
) -> PedersenOpeningProof {
    let commitment = params.commit(m, r);
    let r_m = random_exponent(&params.group.q, rng);
    let r_r = random_exponent(&params.group.q, rng);
    let t = params.commit(&r_m, &r_r);
    let challenge = opening_challenge(params, &commitment, &t, binding);
    let s_m = (&r_m + m * &challenge) % &params.group.q;
    let s_r = (&r_r + r * &challenge) % &params.group.q;
    PedersenOpeningProof { t, challenge, s_m, s_r }
}

fn opening_challenge(
    params: &PedersenParams,
    commitment: &BigUint,
    t: &BigUint,
    binding: Option<&[u8]>,
) -> BigUint {
    let mut transcript = Transcript::new("hec.pedersen_opening");
    transcript.absorb_biguint(FsLabel::GroupParams, &params.group.p);
    transcript.absorb_biguint(FsLabel::GroupParams, &params.h);
    transcript.absorb_biguint(FsLabel::PedersenCommitment, commitment);
    transcript.absorb_biguint(FsLabel::Commitment, t);
    if let Some(bytes) = binding {
        transcript.absorb_bytes(FsLabel::CiphertextBinding, bytes);
    }
    transcript.challenge_mod(FsLabel::Challenge, &params.group.q)
}

pub fn verify_opening(
    params: &PedersenParams,
    commitment: &BigUint,
    proof: &PedersenOpeningProof,
    binding: Option<&[u8]>,
) -> bool {
    let expected = opening_challenge(params, commitment, &proof.t, binding);
    if !ct_eq(&expected, &proof.challenge) {
        return false;
    }
    let lhs = params.commit(&proof.s_m, &proof.s_r);
    let rhs = (&proof.t * params.group.pow(commitment, &proof.challenge)) % &params.group.p;
    ct_eq(&lhs, &rhs)
}

/// Prove that a ciphertext (any scheme; only its serialized bytes matter
/// here) encrypts the committed plaintext `m`, binding the proof to the
/// exact ciphertext bytes so it cannot be replayed against another
/// ciphertext carrying the same commitment.
pub fn prove_ciphertext_binding<R: Rng + ?Sized>(
    params: &PedersenParams,
    m: &BigUint,
    r: &BigUint,
    ciphertext_bytes: &[u8],
    rng: &mut R,
) -> (BigUint, PedersenOpeningProof) {
    let commitment = params.commit(m, r);
    let proof = prove_opening(params, m, r, Some(ciphertext_bytes), rng);
    (commitment, proof)
}

pub fn verify_ciphertext_binding(
    params: &PedersenParams,
    commitment: &BigUint,
    proof: &PedersenOpeningProof,
    ciphertext_bytes: &[u8],
) -> bool {
    verify_opening(params, commitment, proof, Some(ciphertext_bytes))
}

// ---------------------------------------------------------------------
// Fiat–Shamir square-root proof of knowledge.
// ---------------------------------------------------------------------

/// Proof of knowledge of `s` such that `v = s^2 mod n`.
#[derive(Clone, Debug)]
pub struct FiatShamirSqrtProof {
    pub y: BigUint,
    pub challenge: BigUint,
    pub response: BigUint,
}

/// `v = s^2 mod n`, the public value a [`FiatShamirSqrtProof`] is about.
pub fn sqrt_public_value(n: &BigUint, s: &BigUint) -> BigUint {
    (s * s) % n
}

pub fn prove_sqrt<R: Rng + ?Sized>(n: &BigUint, s: &BigUint, rng: &mut R) -> FiatShamirSqrtProof {
    let v = sqrt_public_value(n, s);
    let r = sample_uniform(n, rng);
    let y = (&r * &r) % n;
    let challenge = sqrt_challenge(n, &v, &y);
    let response = (&r * s.modpow(&challenge, n)) % n;
    FiatShamirSqrtProof { y, challenge, response }
}

fn sqrt_challenge(n: &BigUint, v: &BigUint, y: &BigUint) -> BigUint {
    let mut transcript = Transcript::new("hec.fiat_shamir_sqrt");
    transcript.absorb_biguint(FsLabel::GroupParams, n);
    transcript.absorb_biguint(FsLabel::PublicValue, v);
    transcript.absorb_biguint(FsLabel::Commitment, y);
    transcript.challenge_mod(FsLabel::Challenge, n)
}

pub fn verify_sqrt(n: &BigUint, v: &BigUint, proof: &FiatShamirSqrtProof) -> bool {
    let expected = sqrt_challenge(n, v, &proof.y);
    if !ct_eq(&expected, &proof.challenge) {
        return false;
    }
    let lhs = (&proof.response * &proof.response) % n;
    let rhs = (&proof.y * v.modpow(&proof.challenge, n)) % n;
    ct_eq(&lhs, &rhs)
}

// ---------------------------------------------------------------------
// OR-proof: knowledge of one of two discrete logs.
// ---------------------------------------------------------------------

/// An OR-proof that the prover knows `x` with `y0 = base^x` or `y1 =
/// base^x`, without revealing which. The unknown branch is simulated by
/// picking its challenge and response first and solving for a consistent
/// commitment; the known branch is completed normally once the combined
/// challenge is known.
#[derive(Clone, Debug)]
pub struct OrProof {
    pub t0: BigUint,
    pub t1: BigUint,
    pub c0: BigUint,
    pub c1: BigUint,
    pub s0: BigUint,
    pub s1: BigUint,
}

/// `known_index` selects which of `y0`/`y1` the prover actually has the
/// witness for (`0` or `1`); `witness` is `x` such that `base^x` equals
/// that branch's public value.
/// `bit_index`, when `Some`, binds the proof's challenge to that position
/// (see [`prove_range`]) so a bit-commitment proof cannot be replayed at a
/// different index; a bare two-way OR-proof outside that context passes
/// `None`.
pub fn prove_or<R: Rng + ?Sized>(
    params: &GroupParams,
    base: &BigUint,
    y0: &BigUint,
    y1: &BigUint,
    known_index: u8,
    witness: &BigUint,
    bit_index: Option<u64>,
    rng: &mut R,
) -> HecResult<OrProof> {
    if known_index > 1 {
        return Err(HecError::InvalidParameters("OR-proof known_index must be 0 or 1".into()));
    }
    let q = &params.q;

    // Simulate the unknown branch: pick its challenge and response freely,
    // then solve t_sim = base^s_sim * y_sim^{-c_sim} so verification holds.
    let c_sim = random_exponent(q, rng);
    let s_sim = random_exponent(q, rng);
    let y_sim = if known_index == 0 { y1 } else { y0 };
    let y_sim_inv = modinverse(&params.pow(y_sim, &c_sim), &params.p)
        .map_err(|_| HecError::Internal("OR-proof: non-invertible simulated term".into()))?;
    let t_sim = (params.pow(base, &s_sim) * y_sim_inv) % &params.p;

    // Real branch: ordinary Schnorr commitment, challenge split off the
    // global challenge once known.
    let r_real = random_exponent(q, rng);
    let t_real = params.pow(base, &r_real);

    let (t0, t1) = if known_index == 0 { (t_real.clone(), t_sim.clone()) } else { (t_sim.clone(), t_real.clone()) };
    let global_challenge = or_challenge(params, base, y0, y1, &t0, &t1, bit_index);
    let c_real = (&global_challenge + q - &c_sim % q) % q;
    let s_real = (&r_real + witness * &c_real) % q;

    let (c0, c1, s0, s1) = if known_index == 0 {
        (c_real, c_sim, s_real, s_sim)
    } else {
        (c_sim, c_real, s_sim, s_real)
    };
    Ok(OrProof { t0, t1, c0, c1, s0, s1 })
}

fn or_challenge(
    params: &GroupParams,
    base: &BigUint,
    y0: &BigUint,
    y1: &BigUint,
    t0: &BigUint,
    t1: &BigUint,
    bit_index: Option<u64>,
) -> BigUint {
    let mut transcript = Transcript::new("hec.or_proof");
    transcript.absorb_biguint(FsLabel::GroupParams, &params.p);
    transcript.absorb_biguint(FsLabel::GroupParams, base);
    transcript.absorb_biguint(FsLabel::PublicValue, y0);
    transcript.absorb_biguint(FsLabel::PublicValue, y1);
    transcript.absorb_biguint(FsLabel::OrBranch, t0);
    transcript.absorb_biguint(FsLabel::OrBranch, t1);
    if let Some(i) = bit_index {
        transcript.absorb_bytes(FsLabel::BitCommitment, &i.to_le_bytes());
    }
    transcript.challenge_mod(FsLabel::Challenge, &params.q)
}

pub fn verify_or(params: &GroupParams, base: &BigUint, y0: &BigUint, y1: &BigUint, proof: &OrProof, bit_index: Option<u64>) -> bool {
    let expected = or_challenge(params, base, y0, y1, &proof.t0, &proof.t1, bit_index);
    let sum = (&proof.c0 + &proof.c1) % &params.q;
    if !ct_eq(&expected, &sum) {
        return false;
    }
    let lhs0 = params.pow(base, &proof.s0);
    let rhs0 = (&proof.t0 * params.pow(y0, &proof.c0)) % &params.p;
    let lhs1 = params.pow(base, &proof.s1);
    let rhs1 = (&proof.t1 * params.pow(y1, &proof.c1)) % &params.p;
    ct_eq(&lhs0, &rhs0) && ct_eq(&lhs1, &rhs1)
}

// ---------------------------------------------------------------------
// Range proof: bit-by-bit Pedersen commitments with an OR-proof per bit.
// ---------------------------------------------------------------------

/// A proof that a committed value lies in `[0, 2^bits)`, by committing to
/// each bit separately, proving each bit-commitment opens to 0 or 1 via an
/// OR-proof against the Pedersen base `h`, and exposing the weighted
/// product of bit commitments so the caller can check it equals whatever
/// commitment to the full value they already hold (per spec §9, the
/// Fiat–Shamir challenge for each bit binds the bit's index too, so a
/// commitment can't be replayed across positions).
#[derive(Clone, Debug)]
pub struct RangeProof {
    pub bit_commitments: Vec<BigUint>,
    pub bit_proofs: Vec<OrProof>,
    pub final_commitment: BigUint,
}

/// Prove `value < 2^bits`. Returns the proof; the per-bit Pedersen
/// randomness is internal and never revealed.
pub fn prove_range<R: Rng + ?Sized>(
    pedersen: &PedersenParams,
    value: u64,
    bits: u32,
    rng: &mut R,
) -> HecResult<RangeProof> {
    if bits > 63 && value >= (1u64 << 63) {
        // u64 can't represent 2^64; callers needing full 64-bit range
        // should split into two proofs. Guard against silent overflow.
        return Err(HecError::InvalidParameters("range proof bit width exceeds u64 capacity".into()));
    }
    if bits < 64 && value >= (1u64 << bits) {
        return Err(HecError::InvalidParameters(format!("value {value} does not fit in {bits} bits")));
    }
    let mut bit_commitments = Vec::with_capacity(bits as usize);
    let mut bit_proofs = Vec::with_capacity(bits as usize);
    let mut weighted_randomness_exponents = Vec::with_capacity(bits as usize);

    for i in 0..bits {
        let bit = (value >> i) & 1;
        let r_i = random_exponent(&pedersen.group.q, rng);
        let c_i = pedersen.commit(&BigUint::from(bit), &r_i);

        // y0 = C_i (commits to 0 with randomness r_i, i.e. h^r_i = C_i)
        // y1 = C_i * g^{-1} (commits to 0 with randomness r_i if the bit is 1)
        let g_inv = modinverse(&pedersen.group.g, &pedersen.group.p)
            .map_err(|_| HecError::Internal("range proof: generator g not invertible".into()))?;
        let y0 = c_i.clone();
        let y1 = (&c_i * &g_inv) % &pedersen.group.p;
        let proof = prove_or(&pedersen.group, &pedersen.h, &y0, &y1, bit as u8, &r_i, Some(i as u64), rng)?;

        bit_commitments.push(c_i);
        bit_proofs.push(proof);
        weighted_randomness_exponents.push(r_i);
    }

    // final_commitment = prod C_i^{2^i}, which by Pedersen's homomorphism
    // equals commit(value, sum r_i * 2^i) -- the verifier recomputes this
    // same product and compares it to a separately held commitment to the
    // claimed value.
    let mut final_commitment = BigUint::one();
    for (i, c_i) in bit_commitments.iter().enumerate() {
        let weight = BigUint::from(1u64) << i;
        final_commitment = (&final_commitment * pedersen.group.pow(c_i, &weight)) % &pedersen.group.p;
    }

    Ok(RangeProof { bit_commitments, bit_proofs, final_commitment })
}

/// Verify a [`RangeProof`]'s internal consistency: every bit-commitment
/// opens to 0 or 1, and the weighted product of bit commitments equals the
/// claimed `final_commitment`. Does not by itself check `final_commitment`
/// against any external commitment to a specific value — callers compose
/// that equality check themselves (e.g. via [`pedersen_add`]'s invariant).
pub fn verify_range(pedersen: &PedersenParams, proof: &RangeProof) -> bool {
    if proof.bit_commitments.len() != proof.bit_proofs.len() {
        return false;
    }
    let g_inv = match modinverse(&pedersen.group.g, &pedersen.group.p) {
        Ok(v) => v,
        Err(_) => return false,
    };
    let mut product = BigUint::one();
    for (i, (c_i, bit_proof)) in proof.bit_commitments.iter().zip(proof.bit_proofs.iter()).enumerate() {
        let y0 = c_i.clone();
        let y1 = (c_i * &g_inv) % &pedersen.group.p;
        if !verify_or(&pedersen.group, &pedersen.h, &y0, &y1, bit_proof, Some(i as u64)) {
            return false;
        }
        let weight = BigUint::from(1u64) << i;
        product = (&product * pedersen.group.pow(c_i, &weight)) % &pedersen.group.p;
    }
    ct_eq(&product, &proof.final_commitment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    fn group() -> GroupParams {
        // 48-bit test group: fast to generate, large enough that random
        // forgeries fail with overwhelming probability in test runs.
        GroupParams::generate(48, &mut thread_rng())
    }

    #[test]
    fn schnorr_sound_and_complete() {
        let params = group();
        let mut rng = thread_rng();
        let x = BigUint::from(12345u64) % &params.q;
        let y = params.pow(&params.g, &x);
        let proof = schnorr_prove(&params, &params.g, &x, &mut rng);
        assert!(schnorr_verify(&params, &params.g, &y, &proof));

        let mut tampered = proof;
        tampered.response = (&tampered.response + BigUint::one()) % &params.q;
        assert!(!schnorr_verify(&params, &params.g, &y, &tampered));
    }

    #[test]
    fn chaum_pedersen_proves_equal_dlogs() {
        let params = group();
        let mut rng = thread_rng();
        let h = params.derive_generator(b"hec.test.h");
        let x = BigUint::from(777u64);
        let y1 = params.pow(&params.g, &x);
        let y2 = params.pow(&h, &x);
        let proof = chaum_pedersen_prove(&params, &h, &x, &mut rng);
        assert!(chaum_pedersen_verify(&params, &h, &y1, &y2, &proof));
    }

    #[test]
    fn chaum_pedersen_rejects_unequal_dlogs() {
        let params = group();
        let mut rng = thread_rng();
        let h = params.derive_generator(b"hec.test.h");
        let x = BigUint::from(777u64);
        let y1 = params.pow(&params.g, &x);
        // y2 uses a different exponent, so the dlogs are not equal.
        let y2 = params.pow(&h, &(&x + BigUint::one()));
        let proof = chaum_pedersen_prove(&params, &h, &x, &mut rng);
        assert!(!chaum_pedersen_verify(&params, &h, &y1, &y2, &proof));
    }

    #[test]
    fn pedersen_commitment_is_homomorphic() {
        let group = group();
        let pedersen = PedersenParams::new(group, b"hec.test.pedersen.h");
        let mut rng = thread_rng();
        let m1 = BigUint::from(10u64);
        let r1 = random_exponent(&pedersen.group.q, &mut rng);
        let m2 = BigUint::from(20u64);
        let r2 = random_exponent(&pedersen.group.q, &mut rng);
        let c1 = pedersen.commit(&m1, &r1);
        let c2 = pedersen.commit(&m2, &r2);
        let combined = pedersen_add(&pedersen, &c1, &c2);
        let expected = pedersen.commit(&(&m1 + &m2), &(&r1 + &r2));
        assert_eq!(combined, expected);
    }

    #[test]
    fn ciphertext_binding_proof_round_trips() {
        let group = group();
        let pedersen = PedersenParams::new(group, b"hec.test.pedersen.h");
        let mut rng = thread_rng();
        let m = BigUint::from(42u64);
        let r = random_exponent(&pedersen.group.q, &mut rng);
        let ct_bytes = b"pretend-ciphertext-bytes";
        let (commitment, proof) = prove_ciphertext_binding(&pedersen, &m, &r, ct_bytes, &mut rng);
        assert!(verify_ciphertext_binding(&pedersen, &commitment, &proof, ct_bytes));
        // Replaying against different ciphertext bytes must fail.
        assert!(!verify_ciphertext_binding(&pedersen, &commitment, &proof, b"other-bytes"));
    }

    #[test]
    fn fiat_shamir_sqrt_round_trips() {
        let n = BigUint::from(2357u64); // 2357 = 191 * ... just needs to be composite for the test
        let s = BigUint::from(13u64);
        let mut rng = thread_rng();
        let v = sqrt_public_value(&n, &s);
        let proof = prove_sqrt(&n, &s, &mut rng);
        assert!(verify_sqrt(&n, &v, &proof));
    }

    #[test]
    fn or_proof_hides_which_branch_but_verifies() {
        let params = group();
        let mut rng = thread_rng();
        let x0 = BigUint::from(5u64);
        let y0 = params.pow(&params.g, &x0);
        let y1 = params.pow(&params.g, &BigUint::from(999u64)); // unknown witness
        let proof = prove_or(&params, &params.g, &y0, &y1, 0, &x0, None, &mut rng).unwrap();
        assert!(verify_or(&params, &params.g, &y0, &y1, &proof, None));
    }

    #[test]
    fn range_proof_accepts_in_range_value() {
        let group = group();
        let pedersen = PedersenParams::new(group, b"hec.test.pedersen.h");
        let mut rng = thread_rng();
        let proof = prove_range(&pedersen, 42, 8, &mut rng).unwrap();
        assert!(verify_range(&pedersen, &proof));
    }

    #[test]
    fn range_proof_rejects_value_outside_declared_width() {
        let group = group();
        let pedersen = PedersenParams::new(group, b"hec.test.pedersen.h");
        let mut rng = thread_rng();
        assert!(prove_range(&pedersen, 300, 8, &mut rng).is_err());
    }

    #[test]
    fn range_proof_bit_proof_rejects_replay_at_a_different_index() {
        let group = group();
        let pedersen = PedersenParams::new(group, b"hec.test.pedersen.h");
        let mut rng = thread_rng();
        let mut proof = prove_range(&pedersen, 42, 8, &mut rng).unwrap();
        // Swap two bit proofs (and their commitments) between positions;
        // each proof's challenge is bound to its original index, so the
        // transplanted proof must fail verification at its new position.
        proof.bit_proofs.swap(0, 1);
        proof.bit_commitments.swap(0, 1);
        assert!(!verify_range(&pedersen, &proof));
    }
}
