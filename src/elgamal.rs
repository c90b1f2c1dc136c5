//! Multiplicative ElGamal over a safe-prime subgroup of `Z_p*`
//!
//! A second encryption scheme alongside [`crate::fhe`]'s BGV, chosen for
//! workloads needing an unbounded multiplicative homomorphism rather than
//! bounded-depth add-and-multiply: every ElGamal ciphertext supports
//! homomorphic multiplication forever, at the cost of not supporting
//! homomorphic addition at all. `Add`, `Relinearize`, and `Rotate` are
//! meaningless for a multiplicative group and fail with
//! `HecError::UnsupportedOp` rather than being silently approximated.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::Rng;

use crate::arith::{find_subgroup_generator, generate_safe_prime, modinverse, sample_uniform};
use crate::error::{HecError, HecResult};
use crate::fhe::{read_length_prefixed, write_length_prefixed, CIPHERTEXT_MAGIC, CIPHERTEXT_VERSION};

const SCHEME_TAG_ELGAMAL: u8 = 2;
/// magic(4) + scheme tag(1) + version(1) + flags(2) + fingerprint(16) + reserved(8)
const CIPHERTEXT_HEADER_LEN: usize = 32;

/// A 16-byte digest binding a ciphertext to the public key it was
/// produced under, the same convention [`crate::fhe::Fingerprint`] uses.
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

/// The group `(p, q, g)` an ElGamal instance operates in: `p = 2q + 1`
/// safe prime, `g` a generator of the order-`q` subgroup.
#[derive(Clone, Debug)]
pub struct ElGamalParams {
    pub p: BigUint,
    pub q: BigUint,
    pub g: BigUint,
}

impl ElGamalParams {
    /// Generate fresh group parameters at the given safe-prime bit length.
    pub fn generate<R: Rng + ?Sized>(bits: u64, rng: &mut R) -> Self {
        let p = generate_safe_prime(bits, rng);
        let q = (&p - BigUint::one()) / BigUint::from(2u32);
        let g = find_subgroup_generator(&p, &q, rng);
        ElGamalParams { p, q, g }
    }
}

/// The secret key `x ∈ Z_q`.
#[derive(Clone, Debug)]
pub struct ElGamalSecretKey {
    x: BigUint,
    pub fingerprint: Fingerprint,
}

/// The public key `h = g^x mod p`.
#[derive(Clone, Debug)]
pub struct ElGamalPublicKey {
    h: BigUint,
    pub fingerprint: Fingerprint,
}

/// An ElGamal ciphertext: one `(c1, c2)` pair per encrypted slot.
#[derive(Clone, Debug)]
pub struct ElGamalCiphertext {
    pub(crate) slots: Vec<(BigUint, BigUint)>,
    pub fingerprint: Fingerprint,
}

impl ElGamalCiphertext {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Generate an ElGamal key pair in `params`.
pub fn key_gen<R: Rng + ?Sized>(params: &ElGamalParams, rng: &mut R) -> (ElGamalSecretKey, ElGamalPublicKey) {
    let x = sample_uniform(&params.q, rng);
    let h = params.g.modpow(&x, &params.p);
    let fingerprint = fingerprint_of(&[&params.p.to_bytes_be(), &h.to_bytes_be()]);
    (
        ElGamalSecretKey { x, fingerprint },
        ElGamalPublicKey { h, fingerprint },
    )
}

/// Encrypt `messages`, one independent `(c1, c2)` pair per slot with its
/// own fresh randomness `r`. Every message must already lie in `[1, p)`
/// and be coprime to `p` to be a valid element of `Z_p*` — callers
/// embedding arbitrary small integers should first map them into the
/// subgroup (e.g. via `m^2 mod p`, the standard ElGamal encoding trick),
/// which this module does not do on their behalf since the right mapping
/// depends on how the caller wants to recover `m` afterward.
pub fn encrypt<R: Rng + ?Sized>(
    params: &ElGamalParams,
    pk: &ElGamalPublicKey,
    messages: &[BigUint],
    rng: &mut R,
) -> HecResult<ElGamalCiphertext> {
    let mut slots = Vec::with_capacity(messages.len());
    for m in messages {
        if m.is_zero() || m >= &params.p {
            return Err(HecError::InvalidParameters("ElGamal plaintext must lie in [1, p)".into()));
        }
        let r = sample_uniform(&params.q, rng);
        let c1 = params.g.modpow(&r, &params.p);
        let c2 = (m * pk.h.modpow(&r, &params.p)) % &params.p;
        slots.push((c1, c2));
    }
    Ok(ElGamalCiphertext { slots, fingerprint: pk.fingerprint })
}

/// Decrypt every slot: `m = c2 * (c1^x)^{-1} mod p`.
pub fn decrypt(params: &ElGamalParams, sk: &ElGamalSecretKey, ct: &ElGamalCiphertext) -> HecResult<Vec<BigUint>> {
    if sk.fingerprint != ct.fingerprint {
        return Err(HecError::KeyMismatch);
    }
    let mut out = Vec::with_capacity(ct.slots.len());
    for (c1, c2) in &ct.slots {
        let shared = c1.modpow(&sk.x, &params.p);
        let shared_inv = modinverse(&shared, &params.p)?;
        out.push((c2 * &shared_inv) % &params.p);
    }
    Ok(out)
}

/// Component-wise homomorphic multiplication: slot `i` of the result
/// decrypts to the product of slot `i` of `a` and `b`.
pub fn multiply(params: &ElGamalParams, a: &ElGamalCiphertext, b: &ElGamalCiphertext) -> HecResult<ElGamalCiphertext> {
    if a.fingerprint != b.fingerprint {
        return Err(HecError::KeyMismatch);
    }
    if a.slots.len() != b.slots.len() {
        return Err(HecError::InvalidCiphertext("ElGamal multiply requires matching slot counts".into()));
    }
    let slots = a
        .slots
        .iter()
        .zip(b.slots.iter())
        .map(|((a1, a2), (b1, b2))| ((a1 * b1) % &params.p, (a2 * b2) % &params.p))
        .collect();
    Ok(ElGamalCiphertext { slots, fingerprint: a.fingerprint })
}

/// Multiplicative ElGamal has no meaningful additive homomorphism:
/// `Add` over `(c1, c2)` pairs does not correspond to any operation on
/// the encrypted values.
pub fn add(_a: &ElGamalCiphertext, _b: &ElGamalCiphertext) -> HecResult<ElGamalCiphertext> {
    Err(HecError::UnsupportedOp("ElGamal does not support homomorphic addition".into()))
}

/// ElGamal ciphertexts never accumulate a relinearization debt; there is
/// nothing to relinearize.
pub fn relinearize(_ct: &ElGamalCiphertext) -> HecResult<ElGamalCiphertext> {
    Err(HecError::UnsupportedOp("ElGamal has no relinearization step".into()))
}

/// ElGamal has no notion of a rotatable slot structure.
pub fn rotate(_ct: &ElGamalCiphertext, _step: i64) -> HecResult<ElGamalCiphertext> {
    Err(HecError::UnsupportedOp("ElGamal does not support slot rotation".into()))
}

/// ElGamal ciphertexts carry no modulus chain to rescale down.
pub fn rescale(_ct: &ElGamalCiphertext) -> HecResult<ElGamalCiphertext> {
    Err(HecError::UnsupportedOp("ElGamal does not support rescaling".into()))
}

/// Serialize `ct` to the same wire format BGV ciphertexts use (scheme tag
/// 2 instead of 1, no noise budget carried, so that field is reserved as
/// zero): 4-byte magic, scheme tag, version, flags (unused), 16-byte key
/// fingerprint, 8 reserved bytes, then a length-prefixed count of
/// `(c1, c2)` slot pairs, each slot itself a pair of length-prefixed
/// big-endian byte encodings.
pub fn to_bytes(ct: &ElGamalCiphertext) -> Vec<u8> {
    let mut out = Vec::with_capacity(CIPHERTEXT_HEADER_LEN + 4 + ct.slots.len() * 16);
    out.extend_from_slice(&CIPHERTEXT_MAGIC);
    out.push(SCHEME_TAG_ELGAMAL);
    out.push(CIPHERTEXT_VERSION);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&ct.fingerprint);
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&(ct.slots.len() as u32).to_le_bytes());
    for (c1, c2) in &ct.slots {
        write_length_prefixed(&mut out, &c1.to_bytes_be());
        write_length_prefixed(&mut out, &c2.to_bytes_be());
    }
    out
}

/// Deserialize a blob produced by [`to_bytes`]. `expected_key` binds the
/// result to a known public key: the header's embedded fingerprint must
/// match it, or deserialization fails with `InvalidCiphertext`.
pub fn from_bytes(expected_key: &ElGamalPublicKey, bytes: &[u8]) -> HecResult<ElGamalCiphertext> {
    if bytes.len() < CIPHERTEXT_HEADER_LEN {
        return Err(HecError::InvalidCiphertext("ciphertext blob shorter than header".into()));
    }
    let (header, rest) = bytes.split_at(CIPHERTEXT_HEADER_LEN);
    if header[0..4] != CIPHERTEXT_MAGIC {
        return Err(HecError::InvalidCiphertext("bad magic".into()));
    }
    if header[4] != SCHEME_TAG_ELGAMAL {
        return Err(HecError::InvalidCiphertext(format!("unexpected scheme tag {}", header[4])));
    }
    if header[5] != CIPHERTEXT_VERSION {
        return Err(HecError::InvalidCiphertext(format!("unsupported wire version {}", header[5])));
    }
    let mut fingerprint = [0u8; 16];
    fingerprint.copy_from_slice(&header[8..24]);
    if fingerprint != expected_key.fingerprint {
        return Err(HecError::InvalidCiphertext("key fingerprint mismatch".into()));
    }

    if rest.len() < 4 {
        return Err(HecError::InvalidCiphertext("truncated slot count".into()));
    }
    let mut count_bytes = [0u8; 4];
    count_bytes.copy_from_slice(&rest[0..4]);
    let count = u32::from_le_bytes(count_bytes) as usize;
    let mut rest = &rest[4..];

    let mut slots = Vec::with_capacity(count);
    for _ in 0..count {
        let (c1_bytes, tail) = read_length_prefixed(rest)?;
        let (c2_bytes, tail) = read_length_prefixed(tail)?;
        slots.push((BigUint::from_bytes_be(c1_bytes), BigUint::from_bytes_be(c2_bytes)));
        rest = tail;
    }
    if !rest.is_empty() {
        return Err(HecError::InvalidCiphertext("trailing bytes after ciphertext payload".into()));
    }
    Ok(ElGamalCiphertext { slots, fingerprint })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    fn params() -> ElGamalParams {
        ElGamalParams::generate(48, &mut thread_rng())
    }

    #[test]
    fn encrypt_decrypt_round_trips() {
        let params = params();
        let mut rng = thread_rng();
        let (sk, pk) = key_gen(&params, &mut rng);
        let messages = vec![BigUint::from(7u64), BigUint::from(99u64)];
        let ct = encrypt(&params, &pk, &messages, &mut rng).unwrap();
        let decrypted = decrypt(&params, &sk, &ct).unwrap();
        assert_eq!(decrypted, messages);
    }

    #[test]
    fn homomorphic_multiply_is_slot_wise() {
        let params = params();
        let mut rng = thread_rng();
        let (sk, pk) = key_gen(&params, &mut rng);
        let a = encrypt(&params, &pk, &[BigUint::from(6u64)], &mut rng).unwrap();
        let b = encrypt(&params, &pk, &[BigUint::from(7u64)], &mut rng).unwrap();
        let product = multiply(&params, &a, &b).unwrap();
        let decrypted = decrypt(&params, &sk, &product).unwrap();
        assert_eq!(decrypted, vec![BigUint::from(42u64)]);
    }

    #[test]
    fn mismatched_keys_are_rejected_on_decrypt() {
        let params = params();
        let mut rng = thread_rng();
        let (_, pk_a) = key_gen(&params, &mut rng);
        let (sk_b, _) = key_gen(&params, &mut rng);
        let ct = encrypt(&params, &pk_a, &[BigUint::from(1u64)], &mut rng).unwrap();
        assert!(matches!(decrypt(&params, &sk_b, &ct), Err(HecError::KeyMismatch)));
    }

    #[test]
    fn add_relinearize_rotate_rescale_are_unsupported() {
        let params = params();
        let mut rng = thread_rng();
        let (_, pk) = key_gen(&params, &mut rng);
        let ct = encrypt(&params, &pk, &[BigUint::from(3u64)], &mut rng).unwrap();
        assert!(matches!(add(&ct, &ct), Err(HecError::UnsupportedOp(_))));
        assert!(matches!(relinearize(&ct), Err(HecError::UnsupportedOp(_))));
        assert!(matches!(rotate(&ct, 1), Err(HecError::UnsupportedOp(_))));
        assert!(matches!(rescale(&ct), Err(HecError::UnsupportedOp(_))));
    }

    #[test]
    fn ciphertext_serialize_round_trips() {
        let params = params();
        let mut rng = thread_rng();
        let (sk, pk) = key_gen(&params, &mut rng);
        let messages = vec![BigUint::from(7u64), BigUint::from(99u64)];
        let ct = encrypt(&params, &pk, &messages, &mut rng).unwrap();
        let bytes = to_bytes(&ct);
        assert_eq!(&bytes[0..4], b"CT\0\0");
        assert_eq!(bytes[4], 2);
        let restored = from_bytes(&pk, &bytes).unwrap();
        let decrypted = decrypt(&params, &sk, &restored).unwrap();
        assert_eq!(decrypted, messages);
    }

    #[test]
    fn ciphertext_deserialize_rejects_wrong_key() {
        let params = params();
        let mut rng = thread_rng();
        let (_, pk_a) = key_gen(&params, &mut rng);
        let (_, pk_b) = key_gen(&params, &mut rng);
        let ct = encrypt(&params, &pk_a, &[BigUint::from(5u64)], &mut rng).unwrap();
        let bytes = to_bytes(&ct);
        assert!(matches!(from_bytes(&pk_b, &bytes), Err(HecError::InvalidCiphertext(_))));
    }

    #[test]
    fn ciphertext_deserialize_rejects_bad_scheme_tag() {
        let params = params();
        let mut rng = thread_rng();
        let (_, pk) = key_gen(&params, &mut rng);
        let ct = encrypt(&params, &pk, &[BigUint::from(5u64)], &mut rng).unwrap();
        let mut bytes = to_bytes(&ct);
        bytes[4] = 1;
        assert!(matches!(from_bytes(&pk, &bytes), Err(HecError::InvalidCiphertext(_))));
    }
}
