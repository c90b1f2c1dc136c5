//! Homomorphic Encryption Core (HEC): Ring-LWE (BGV), ElGamal, secure
//! aggregation and zero-knowledge proofs.
//!
//! This is the substantive systems layer of a larger privacy-preserving ML
//! platform; the rest of that platform (model wrappers, data augmentors, the
//! compute-node scheduler, audit logging, UI) links against this crate as a
//! library and is out of scope here. Three layers build on each other:
//!
//! - **Number-theoretic core** ([`arith`], [`ntt`], [`crt`], [`ring`]):
//!   modular big-integer primitives, NTT/FFT polynomial multiplication, CRT
//!   residue representation, and negacyclic ring arithmetic over
//!   `R_q = Z_q[X]/(X^n+1)`.
//! - **Encryption schemes** ([`fhe`], [`elgamal`], [`keyswitch`], [`noise`],
//!   [`bootstrap`]): a BGV-style Ring-LWE scheme with relinearization,
//!   rotation, and bootstrapping, alongside a multiplicative ElGamal scheme
//!   for workloads that only need unbounded homomorphic multiplication.
//! - **Protocols built on top** ([`secure_agg`], [`zkp`]): Shamir-backed
//!   secure aggregation for federated weight sums, and a Schnorr/
//!   Chaum–Pedersen/Pedersen/range-proof zero-knowledge layer that can bind
//!   a proof to a ciphertext's serialized bytes.
//!
//! [`keystore`], [`metrics`], [`config`], [`error`], [`transcript`], and
//! [`worker_pool`] are the ambient stack every layer above shares: at-rest
//! key storage, a bounded metrics ring buffer, the recognized configuration
//! surface, the crate-wide error taxonomy, the Fiat–Shamir transcript
//! discipline, and the shared thread pool ring/NTT operations fan out
//! across.
//!
//! ## Invariants
//!
//! - **Ring quotient.** Every [`ring::RingContext`] is `Z_q[X]/(X^n+1)`
//!   (negacyclic), never `X^n-1`, per the disambiguation in the design
//!   notes: the source material this crate's semantics were distilled from
//!   was inconsistent on this point.
//! - **Key fingerprints.** Every ciphertext and key-switching key carries a
//!   16-byte fingerprint of the public key it was produced under; every
//!   binary operation checks fingerprints match before touching ring
//!   arithmetic and refuses with [`error::HecError::KeyMismatch`] otherwise.
//! - **Noise is monotone.** A ciphertext's noise estimate
//!   ([`noise::NoiseState`]) never decreases except across
//!   [`bootstrap::bootstrap`]. [`fhe::BgvScheme`] transitions a ciphertext
//!   to [`fhe::CiphertextState::NeedsBootstrap`] once the noise manager or
//!   configured depth limit trips; every operation but bootstrap then
//!   refuses with [`error::HecError::BootstrapRequired`].
//! - **Fiat–Shamir binds every public input.** Every [`zkp`] proof type
//!   derives its challenge from a [`transcript::Transcript`] that has
//!   absorbed the group parameters, commitments, and (for proofs over
//!   ciphertexts) the ciphertext bytes — never an ad hoc hash concatenation
//!   at the call site.
//! - **No unsafe.** This crate forbids `unsafe` throughout; ring and NTT
//!   performance comes from algorithmic structure (NTT, CRT, the shared
//!   worker pool) rather than unchecked memory access.

#![forbid(unsafe_code)]

/// Crate-wide error taxonomy ([`error::HecError`]) and result alias.
pub mod error;

/// Recognized configuration surface: security tiers, ring parameter
/// presets, and the top-level `HecConfig`.
pub mod config;

/// Modular big-integer primitives: modpow, modinverse, primality,
/// safe-prime generation, subgroup generator search, sampling.
pub mod arith;

/// Number-theoretic transform and complex-FFT fallback for `O(n log n)`
/// polynomial multiplication.
pub mod ntt;

/// Chinese Remainder Theorem residue-number-system representation.
pub mod crt;

/// Negacyclic polynomial ring arithmetic over `R_q = Z_q[X]/(X^n+1)`.
pub mod ring;

/// BGV-style Ring-LWE homomorphic encryption scheme.
pub mod fhe;

/// Multiplicative ElGamal scheme over a safe-prime subgroup of `Z_p*`.
pub mod elgamal;

/// Base-`w` digit-decomposition key switching (relinearization, rotation).
pub mod keyswitch;

/// Per-ciphertext noise budget tracking and bootstrap triggering.
pub mod noise;

/// BGV bootstrapping: resets a ciphertext's noise to the fresh baseline.
pub mod bootstrap;

/// Shamir-secret-sharing-backed secure aggregation of federated updates.
pub mod secure_agg;

/// Zero-knowledge proof layer: Schnorr, Chaum–Pedersen, Pedersen, Fiat–
/// Shamir square-root, OR-proofs, range proofs, and ZKP-over-ciphertext.
pub mod zkp;

/// Domain-separated Fiat–Shamir transcript shared by every [`zkp`] proof
/// type.
pub mod transcript;

/// At-rest key storage: AEAD-protected blobs, Argon2id passphrase
/// derivation, bounded LRU cache, directory-based backup/restore.
pub mod keystore;

/// Bounded, append-only per-operation metrics ring buffer.
pub mod metrics;

/// Shared worker pool for offloadable pure ring/NTT operations.
pub mod worker_pool;

pub use error::{HecError, HecResult};
