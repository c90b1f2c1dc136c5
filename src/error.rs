//! Crate-wide error taxonomy
//!
//! One `thiserror` enum covers every domain failure named in the design
//! notes: parameter validation, key lookups, ciphertext-level refusals,
//! secure-aggregation protocol errors, proof verification, and cooperative
//! cancellation. Pure arithmetic errors propagate as-is; I/O errors from the
//! `KeyStore` collaborator are wrapped rather than swallowed.

use thiserror::Error;

/// Errors produced anywhere in the homomorphic-encryption core.
#[derive(Debug, Error)]
pub enum HecError {
    /// Ring/group parameters are internally inconsistent or below the
    /// configured security floor (e.g. `n` not a power of two, `q` not ≡ 1
    /// mod `2n`, or a requested security tier with no matching preset).
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// A key id was not present in the store or cache.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A key blob failed to authenticate or deserialize.
    #[error("key corrupt: {0}")]
    KeyCorrupt(String),

    /// A binary ciphertext operation was attempted on ciphertexts
    /// encrypted under different keys.
    #[error("key fingerprint mismatch")]
    KeyMismatch,

    /// Decryption noise grew beyond the point where the recovered plaintext
    /// is unambiguous.
    #[error("noise budget exceeded")]
    NoiseExceeded,

    /// A ciphertext needs to pass through the bootstrapper before the
    /// requested operation can proceed. Recoverable by calling bootstrap.
    #[error("bootstrap required before this operation can proceed")]
    BootstrapRequired,

    /// The scheme does not support the requested operation (e.g. ElGamal
    /// addition, or rotation on a scheme without Galois keys).
    #[error("unsupported operation: {0}")]
    UnsupportedOp(String),

    /// Ciphertext deserialization failed a magic/version/length/fingerprint
    /// check.
    #[error("invalid ciphertext encoding: {0}")]
    InvalidCiphertext(String),

    /// A secure-aggregation participant submitted a share that does not
    /// match its stored commitment. Hard reject, no partial acceptance.
    #[error("share verification failed for participant {0}")]
    ShareVerificationFailed(u32),

    /// Fewer shares survived than the reconstruction threshold requires.
    #[error("insufficient shares: have {have}, need {need}")]
    InsufficientShares {
        /// Shares actually available.
        have: usize,
        /// Threshold required to reconstruct.
        need: usize,
    },

    /// A round-scoped aggregation call arrived while another call for the
    /// same round id was already in flight.
    #[error("round {0} is busy")]
    RoundBusy(u64),

    /// A round exceeded its configured deadline.
    #[error("round {0} timed out")]
    RoundTimeout(u64),

    /// A long-running operation observed a cancellation signal.
    #[error("operation cancelled")]
    Cancelled,

    /// Key-store or backup I/O failure.
    #[error("key store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key metadata (de)serialization failure.
    #[error("metadata serialization error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// AEAD seal/open failure at rest (wrong master key, tampered blob).
    #[error("authenticated encryption failure: {0}")]
    Aead(String),

    /// An arithmetic invariant that should never be reachable in correct
    /// use was violated (e.g. modulus zero passed to `modpow`, or `gcd(a,
    /// m) != 1` passed to `modinverse`).
    #[error("internal arithmetic error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the crate.
pub type HecResult<T> = Result<T, HecError>;
