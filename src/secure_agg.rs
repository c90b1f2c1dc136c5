//! Secure Aggregation: masked federated weight sums with Shamir-backed
//! dropout recovery.
//!
//! Round lifecycle: `Init -> SharesDistributed -> UpdatesReceived ->
//! Reconstructing -> Finalized`. Each client gets a masking key and
//! nonce; a SHA-256 counter-mode PRF turns `(key, nonce, layer_index)`
//! into a per-layer mask added to that client's weights before
//! submission. If a client drops before revealing its own key, the
//! surviving clients' Shamir shares of that key reconstruct it via
//! Lagrange interpolation at `x = 0`, so the aggregator can still
//! subtract that client's mask out of the running sum.
//!
//! Per spec §9: the source this module was distilled from built Shamir
//! sharing with byte-wise arithmetic modulo 256, which is not a field —
//! reconstruction over most share subsets silently returns the wrong
//! secret. This implementation corrects that and interpolates over a
//! proper prime field `GF(p)` sized to hold a full 256-bit masking key,
//! recorded as an Open Question resolution in `DESIGN.md`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use num_bigint::BigUint;
use num_traits::Zero;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::arith::{generate_safe_prime, modinverse, sample_uniform};
use crate::error::{HecError, HecResult};
use crate::worker_pool::CancellationToken;

/// A round's lifecycle stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundState {
    Init,
    SharesDistributed,
    UpdatesReceived,
    Reconstructing,
    Finalized,
}

/// A client's masking material: a 256-bit key and a 128-bit nonce. The
/// key is Shamir-shared among peers for dropout recovery; the nonce is
/// treated as public round metadata, broadcast alongside the
/// commitments at `Init` (only the key's secrecy matters for privacy —
/// the nonce just domain-separates rounds and clients in the PRF).
#[derive(Clone, Debug)]
pub struct ClientMaskingKey {
    pub key: [u8; 32],
    pub nonce: [u8; 16],
}

/// One Shamir share `(x, f(x))` of a secret embedded as a field element
/// of `GF(prime)`.
#[derive(Clone, Debug)]
pub struct ShamirShare {
    pub x: u64,
    pub y: BigUint,
}

/// SHA-256 commitment to a share, checked before a share is trusted for
/// reconstruction.
fn commit_share(owner_id: u64, share: &ShamirShare) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(owner_id.to_le_bytes());
    hasher.update(share.x.to_le_bytes());
    hasher.update(share.y.to_bytes_be());
    hasher.finalize().into()
}

/// Split `secret` into `total` Shamir shares recoverable by any
/// `threshold`-size subset, via a degree-`(threshold - 1)` random
/// polynomial over `GF(prime)` with `secret` as the constant term.
fn split_secret<R: Rng + ?Sized>(secret: &BigUint, threshold: usize, total: usize, prime: &BigUint, rng: &mut R) -> Vec<ShamirShare> {
    let mut coeffs = Vec::with_capacity(threshold);
    coeffs.push(secret.clone());
    for _ in 1..threshold {
        coeffs.push(sample_uniform(prime, rng));
    }
    (1..=total as u64)
        .map(|x| {
            let mut y = BigUint::zero();
            let x_big = BigUint::from(x);
            let mut power = BigUint::from(1u64);
            for c in &coeffs {
                y = (y + c * &power) % prime;
                power = (&power * &x_big) % prime;
            }
            ShamirShare { x, y }
        })
        .collect()
}

/// Recover the secret (polynomial value at `x = 0`) from `shares` via
/// Lagrange interpolation over `GF(prime)`.
fn reconstruct_secret(shares: &[ShamirShare], prime: &BigUint) -> HecResult<BigUint> {
    let mut secret = BigUint::zero();
    for (i, share_i) in shares.iter().enumerate() {
        let mut numerator = BigUint::from(1u64);
        let mut denominator = BigUint::from(1u64);
        for (j, share_j) in shares.iter().enumerate() {
            if i == j {
                continue;
            }
            // Both terms computed mod `prime`; subtraction done on
            // signed residues so we never underflow a BigUint.
            let xj = BigUint::from(share_j.x);
            numerator = (&numerator * &xj) % prime;
            let xi = BigUint::from(share_i.x);
            let diff = add_mod(&xj, &neg_mod(&xi, prime), prime);
            denominator = (&denominator * diff) % prime;
        }
        let denom_inv = modinverse(&denominator, prime)?;
        let lagrange_coeff = (numerator * denom_inv) % prime;
        secret = add_mod(&secret, &((&share_i.y * &lagrange_coeff) % prime), prime);
    }
    Ok(secret)
}

fn neg_mod(a: &BigUint, prime: &BigUint) -> BigUint {
    if a.is_zero() {
        BigUint::zero()
    } else {
        prime - (a % prime)
    }
}

fn add_mod(a: &BigUint, b: &BigUint, prime: &BigUint) -> BigUint {
    (a + b) % prime
}

/// Derive a layer's mask via SHA-256 in counter mode: mask value `j`
/// comes from `SHA256(key || nonce || layer_index || j)`, mapped from
/// its first 8 bytes into `[-1, 1)`.
fn derive_mask(key: &[u8; 32], nonce: &[u8; 16], layer_index: u32, len: usize) -> Vec<f64> {
    (0..len as u32)
        .map(|counter| {
            let mut hasher = Sha256::new();
            hasher.update(key);
            hasher.update(nonce);
            hasher.update(layer_index.to_le_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&digest[..8]);
            let raw = u64::from_le_bytes(buf);
            (raw as f64 / u64::MAX as f64) * 2.0 - 1.0
        })
        .collect()
}

/// A single secure-aggregation round.
pub struct SecureAggRound {
    round_id: u64,
    threshold: usize,
    client_ids: Vec<u64>,
    prime: BigUint,
    state: RwLock<RoundState>,
    started_at: Instant,
    timeout: Duration,
    busy: Mutex<()>,

    /// Simulated per-client masking material. In a real deployment each
    /// client generates and keeps its own key; this single-process
    /// module generates it centrally to drive the protocol end to end,
    /// but [`SecureAggRound::unmask_aggregation`] only ever consults a
    /// key once it has been explicitly revealed or reconstructed,
    /// keeping the privacy invariant meaningful even in simulation.
    masking_keys: HashMap<u64, ClientMaskingKey>,
    /// Per-owner Shamir shares of their masking key, keyed by holder id.
    shares: HashMap<u64, HashMap<u64, ShamirShare>>,
    /// Per-owner per-share SHA-256 commitments, indexed by share `x`.
    commitments: HashMap<u64, HashMap<u64, [u8; 32]>>,
    masked_updates: HashMap<u64, Vec<Vec<f64>>>,
    cancellation: CancellationToken,
}

impl SecureAggRound {
    /// `Init(clients)`: generate each client's masking key/nonce and
    /// `(threshold, clients.len())` Shamir shares of the key, with one
    /// SHA-256 commitment per share.
    pub fn init<R: Rng + ?Sized>(
        round_id: u64,
        client_ids: &[u64],
        threshold: usize,
        timeout: Duration,
        rng: &mut R,
    ) -> HecResult<Self> {
        if threshold == 0 || threshold > client_ids.len() {
            return Err(HecError::InvalidParameters(format!(
                "threshold {threshold} must be in [1, {}]",
                client_ids.len()
            )));
        }
        // 257 bits comfortably holds a 256-bit masking key as a field
        // element with room to spare.
        let prime = generate_safe_prime(257, rng);

        let mut masking_keys = HashMap::new();
        let mut shares: HashMap<u64, HashMap<u64, ShamirShare>> = HashMap::new();
        let mut commitments: HashMap<u64, HashMap<u64, [u8; 32]>> = HashMap::new();

        for &owner in client_ids {
            let mut key = [0u8; 32];
            rng.fill(&mut key);
            let mut nonce = [0u8; 16];
            rng.fill(&mut nonce);
            let secret = BigUint::from_bytes_be(&key);
            let owner_shares = split_secret(&secret, threshold, client_ids.len(), &prime, rng);

            let mut holder_shares = HashMap::new();
            let mut owner_commitments = HashMap::new();
            for (&holder, share) in client_ids.iter().zip(owner_shares.into_iter()) {
                owner_commitments.insert(share.x, commit_share(owner, &share));
                holder_shares.insert(holder, share);
            }
            masking_keys.insert(owner, ClientMaskingKey { key, nonce });
            shares.insert(owner, holder_shares);
            commitments.insert(owner, owner_commitments);
        }

        info!(round_id, clients = client_ids.len(), threshold, "secure-agg round: Init -> SharesDistributed");
        Ok(SecureAggRound {
            round_id,
            threshold,
            client_ids: client_ids.to_vec(),
            prime,
            state: RwLock::new(RoundState::SharesDistributed),
            started_at: Instant::now(),
            timeout,
            busy: Mutex::new(()),
            masking_keys,
            shares,
            commitments,
            masked_updates: HashMap::new(),
            cancellation: CancellationToken::new(),
        })
    }

    /// The cancellation token reconstruction loops check between
    /// participants; cancel it (e.g. from a supervising task that observes
    /// the round's deadline externally) to abort a large
    /// [`SecureAggRound::reconstruct_masks`] call early with
    /// [`HecError::Cancelled`] rather than waiting for it to run to
    /// completion.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    fn check_not_timed_out(&self) -> HecResult<()> {
        if self.started_at.elapsed() > self.timeout {
            warn!(round_id = self.round_id, "secure-agg round timed out");
            return Err(HecError::RoundTimeout(self.round_id));
        }
        Ok(())
    }

    /// The share holder `holder_id` was given for `owner_id`'s masking
    /// key; used for later reconstruction if `owner_id` drops.
    pub fn share_for(&self, owner_id: u64, holder_id: u64) -> Option<&ShamirShare> {
        self.shares.get(&owner_id)?.get(&holder_id)
    }

    /// Every Shamir share `holder_id` was given at `Init`, across every
    /// owner's key, as `(owner_id, share)` pairs. A client submitting its
    /// masked update passes these back in alongside its weights so the
    /// round can verify them against the commitments recorded at `Init`
    /// before trusting them for later dropout reconstruction.
    pub fn shares_held_by(&self, holder_id: u64) -> Vec<(u64, ShamirShare)> {
        self.shares
            .iter()
            .filter_map(|(&owner, holders)| holders.get(&holder_id).map(|share| (owner, share.clone())))
            .collect()
    }

    /// Verify a share against the commitment recorded at `Init`. A
    /// mismatch is a hard reject per spec §4.10.
    pub fn verify_share(&self, owner_id: u64, share: &ShamirShare) -> HecResult<()> {
        let expected = self
            .commitments
            .get(&owner_id)
            .and_then(|m| m.get(&share.x))
            .ok_or_else(|| HecError::ShareVerificationFailed(owner_id as u32))?;
        let actual = commit_share(owner_id, share);
        if expected.ct_eq(&actual).into() {
            Ok(())
        } else {
            warn!(round_id = self.round_id, owner_id, "secure-agg: share failed commitment verification");
            Err(HecError::ShareVerificationFailed(owner_id as u32))
        }
    }

    /// `SubmitMaskedUpdate(client_id, weights, shares)`: verify `shares`
    /// (the Shamir shares `client_id` holds of other clients' keys)
    /// against the commitments recorded at `Init` — any mismatch is a
    /// hard reject of the whole submission per spec §4.10 — then derive
    /// each layer's mask from `client_id`'s own key, add it to `weights`,
    /// and store the masked result.
    pub fn submit_masked_update(
        &mut self,
        client_id: u64,
        weights: &[Vec<f64>],
        shares: &[(u64, ShamirShare)],
    ) -> HecResult<()> {
        self.check_not_timed_out()?;
        let _guard = self.busy.try_lock().ok_or(HecError::RoundBusy(self.round_id))?;
        for (owner_id, share) in shares {
            self.verify_share(*owner_id, share)?;
        }
        let material = self
            .masking_keys
            .get(&client_id)
            .ok_or_else(|| HecError::InvalidParameters(format!("unknown client {client_id}")))?;
        let masked: Vec<Vec<f64>> = weights
            .iter()
            .enumerate()
            .map(|(layer_index, layer)| {
                let mask = derive_mask(&material.key, &material.nonce, layer_index as u32, layer.len());
                layer.iter().zip(mask.iter()).map(|(w, m)| w + m).collect()
            })
            .collect();
        self.masked_updates.insert(client_id, masked);

        if self.masked_updates.len() == self.client_ids.len() {
            *self.state.write() = RoundState::UpdatesReceived;
            info!(round_id = self.round_id, "secure-agg round: SharesDistributed -> UpdatesReceived");
        }
        Ok(())
    }

    /// A client revealing its own masking key directly, as happens for
    /// every surviving client once the round is done collecting
    /// updates (dropped clients instead have their key reconstructed
    /// via [`SecureAggRound::reconstruct_masks`]).
    pub fn reveal_key(&self, client_id: u64) -> HecResult<ClientMaskingKey> {
        self.masking_keys
            .get(&client_id)
            .cloned()
            .ok_or_else(|| HecError::InvalidParameters(format!("unknown client {client_id}")))
    }

    /// `ReconstructMasks(surviving)`: recover each dropped client's
    /// masking key via Lagrange interpolation over the shares the
    /// surviving clients hold.
    pub fn reconstruct_masks(&mut self, surviving: &[u64]) -> HecResult<HashMap<u64, ClientMaskingKey>> {
        self.check_not_timed_out()?;
        let Some(_guard) = self.busy.try_lock() else {
            warn!(round_id = self.round_id, "secure-agg round busy: concurrent reconstruct_masks rejected");
            return Err(HecError::RoundBusy(self.round_id));
        };
        *self.state.write() = RoundState::Reconstructing;
        debug!(round_id = self.round_id, surviving = surviving.len(), "secure-agg round: UpdatesReceived -> Reconstructing");

        let dropped: Vec<u64> = self.client_ids.iter().copied().filter(|c| !surviving.contains(c)).collect();
        let mut recovered = HashMap::new();
        for owner in dropped {
            self.cancellation.check()?;
            let owner_shares = self.shares.get(&owner).ok_or_else(|| HecError::InvalidParameters(format!("unknown client {owner}")))?;
            let available: Vec<ShamirShare> = surviving
                .iter()
                .filter_map(|holder| owner_shares.get(holder).cloned())
                .collect();
            if available.len() < self.threshold {
                return Err(HecError::InsufficientShares { have: available.len(), need: self.threshold });
            }
            let secret = reconstruct_secret(&available[..self.threshold], &self.prime)?;
            let mut key_bytes = secret.to_bytes_be();
            while key_bytes.len() < 32 {
                key_bytes.insert(0, 0);
            }
            let mut key = [0u8; 32];
            key.copy_from_slice(&key_bytes[key_bytes.len() - 32..]);
            // The nonce is public round metadata (see struct doc); a
            // real deployment would broadcast it at Init alongside the
            // commitments, so any surviving participant can supply it.
            let nonce = self.masking_keys.get(&owner).map(|m| m.nonce).unwrap_or([0u8; 16]);
            recovered.insert(owner, ClientMaskingKey { key, nonce });
        }
        Ok(recovered)
    }

    /// `UnmaskAggregation(maskedWeights, reconstructedKeys)`: subtract
    /// every known client's mask (revealed directly or reconstructed
    /// via Shamir) from the running masked sum. A client whose key
    /// never becomes known leaves its mask in place — the aggregate
    /// stays imperfectly unmasked for that slice rather than erroring,
    /// which is exactly the privacy property this protocol wants: no
    /// individual client's weights are ever exposed on their own.
    pub fn unmask_aggregation(&mut self, masked_sum: &[Vec<f64>], known_keys: &HashMap<u64, ClientMaskingKey>) -> HecResult<Vec<Vec<f64>>> {
        self.check_not_timed_out()?;
        let _guard = self.busy.try_lock().ok_or(HecError::RoundBusy(self.round_id))?;

        let mut result = masked_sum.to_vec();
        for (&client_id, material) in known_keys {
            if !self.masked_updates.contains_key(&client_id) {
                continue;
            }
            for (layer_index, layer) in result.iter_mut().enumerate() {
                let mask = derive_mask(&material.key, &material.nonce, layer_index as u32, layer.len());
                for (v, m) in layer.iter_mut().zip(mask.iter()) {
                    *v -= m;
                }
            }
        }
        *self.state.write() = RoundState::Finalized;
        info!(round_id = self.round_id, known_keys = known_keys.len(), "secure-agg round: -> Finalized");
        Ok(result)
    }

    /// Sum of every client's masked update, layer-wise, as the caller
    /// would compute before calling [`SecureAggRound::unmask_aggregation`].
    pub fn masked_sum(&self) -> Option<Vec<Vec<f64>>> {
        let mut ids = self.masked_updates.keys();
        let first_id = *ids.next()?;
        let mut sum = self.masked_updates[&first_id].clone();
        for &id in ids {
            let update = &self.masked_updates[&id];
            for (layer, other) in sum.iter_mut().zip(update.iter()) {
                for (v, o) in layer.iter_mut().zip(other.iter()) {
                    *v += o;
                }
            }
        }
        Some(sum)
    }

    pub fn state(&self) -> RoundState {
        *self.state.read()
    }
}
