//! At-rest key storage: AEAD-protected blobs, Argon2id passphrase
//! derivation, a bounded LRU read cache, and directory-based backup and
//! restore.
//!
//! The HEC core treats this as an opaque key-value collaborator (spec
//! §6): [`KeyStore`] never interprets the bytes it stores — callers hand
//! it serialized [`crate::fhe::BgvKeyBundle`]/[`crate::elgamal`] material
//! and get the same bytes back. Errors surface only as
//! [`HecError::KeyNotFound`] / [`HecError::KeyCorrupt`] / [`HecError::Aead`].

use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::RwLock;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use zeroize::Zeroizing;

use crate::error::{HecError, HecResult};

#[cfg(feature = "chacha")]
use chacha20poly1305::ChaCha20Poly1305;

/// Which AEAD cipher a store encrypts key blobs with. `Aes256Gcm` is the
/// default; `ChaCha20Poly1305` is available behind the `chacha` feature
/// for platforms without AES-NI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherKind {
    Aes256Gcm,
    #[cfg(feature = "chacha")]
    ChaCha20Poly1305,
}

/// Metadata describing a stored key, serialized alongside (but never
/// inside) its encrypted blob. Fields match the wire format in spec §6.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub id: String,
    pub scheme: String,
    pub security_level: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub key_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poly_modulus_degree: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plain_modulus: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coeff_modulus: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_indices: Option<Vec<i64>>,
}

#[derive(Serialize, Deserialize)]
struct BackupManifest {
    keys: Vec<BackupEntry>,
    metadata: Vec<KeyMetadata>,
}

#[derive(Serialize, Deserialize)]
struct BackupEntry {
    id: String,
    data_base64: String,
}

#[derive(Serialize, Deserialize)]
struct BackupMetadataFile {
    id: String,
    timestamp: DateTime<Utc>,
    key_ids: Vec<String>,
    size: u64,
    checksum: String,
    version: u32,
}

/// At-rest key storage rooted at a directory. Each key `id` gets a
/// `{id}.key` blob (`16-byte IV || 16-byte tag || ciphertext`, per spec
/// §6) and an `{id}.json` metadata file. The metadata file is plaintext
/// — only the raw key material inside `.key` is AEAD-protected.
pub struct KeyStore {
    base_dir: PathBuf,
    master_key: Zeroizing<[u8; 32]>,
    cipher: CipherKind,
    cache: RwLock<LruCache<String, (Vec<u8>, KeyMetadata)>>,
}

const SALT_FILE: &str = "salt";
const ARGON2_OUTPUT_LEN: usize = 32;

impl KeyStore {
    /// Open (creating if necessary) a store rooted at `base_dir`,
    /// deriving its master key from `passphrase` via Argon2id. The salt
    /// is generated once and persisted alongside the store so reopening
    /// with the same passphrase reproduces the same master key.
    pub fn open(base_dir: impl Into<PathBuf>, passphrase: &[u8], cache_capacity: usize) -> HecResult<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        let salt_path = base_dir.join(SALT_FILE);
        let salt = if salt_path.exists() {
            fs::read(&salt_path)?
        } else {
            let mut salt = vec![0u8; 16];
            rand::thread_rng().fill_bytes(&mut salt);
            fs::write(&salt_path, &salt)?;
            salt
        };

        let mut master_key = Zeroizing::new([0u8; ARGON2_OUTPUT_LEN]);
        Argon2::default()
            .hash_password_into(passphrase, &salt, master_key.as_mut_slice())
            .map_err(|e| HecError::Internal(format!("Argon2id key derivation failed: {e}")))?;

        let capacity = NonZeroUsize::new(cache_capacity.max(1)).expect("capacity clamped to at least 1");
        Ok(KeyStore {
            base_dir,
            master_key,
            cipher: CipherKind::Aes256Gcm,
            cache: RwLock::new(LruCache::new(capacity)),
        })
    }

    #[cfg(feature = "chacha")]
    pub fn with_cipher(mut self, cipher: CipherKind) -> Self {
        self.cipher = cipher;
        self
    }

    fn encrypt(&self, plaintext: &[u8]) -> HecResult<Vec<u8>> {
        let mut iv = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut iv);
        let combined = self.aead_encrypt(&iv, plaintext)?;
        // combined = ciphertext || 16-byte tag (RustCrypto's `Aead::encrypt`
        // convention); split and reorder into the spec's iv || tag || ct.
        let tag_start = combined.len() - 16;
        let mut out = Vec::with_capacity(16 + 16 + tag_start);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&combined[tag_start..]);
        out.extend_from_slice(&combined[..tag_start]);
        Ok(out)
    }

    fn decrypt(&self, blob: &[u8]) -> HecResult<Vec<u8>> {
        if blob.len() < 32 {
            return Err(HecError::KeyCorrupt("blob shorter than iv+tag header".into()));
        }
        let iv = &blob[0..16];
        let tag = &blob[16..32];
        let ciphertext = &blob[32..];
        let mut combined = Vec::with_capacity(ciphertext.len() + 16);
        combined.extend_from_slice(ciphertext);
        combined.extend_from_slice(tag);
        self.aead_decrypt(iv, &combined)
    }

    fn aead_encrypt(&self, iv: &[u8], plaintext: &[u8]) -> HecResult<Vec<u8>> {
        let nonce = aes_gcm::aead::generic_array::GenericArray::from_slice(&iv[..12]);
        match self.cipher {
            CipherKind::Aes256Gcm => {
                let cipher = Aes256Gcm::new(aes_gcm::aead::generic_array::GenericArray::from_slice(self.master_key.as_slice()));
                cipher.encrypt(nonce, plaintext).map_err(|_| HecError::Aead("AES-GCM encryption failed".into()))
            }
            #[cfg(feature = "chacha")]
            CipherKind::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new(aes_gcm::aead::generic_array::GenericArray::from_slice(self.master_key.as_slice()));
                cipher.encrypt(nonce, plaintext).map_err(|_| HecError::Aead("ChaCha20-Poly1305 encryption failed".into()))
            }
        }
    }

    fn aead_decrypt(&self, iv: &[u8], combined: &[u8]) -> HecResult<Vec<u8>> {
        let nonce = aes_gcm::aead::generic_array::GenericArray::from_slice(&iv[..12]);
        match self.cipher {
            CipherKind::Aes256Gcm => {
                let cipher = Aes256Gcm::new(aes_gcm::aead::generic_array::GenericArray::from_slice(self.master_key.as_slice()));
                cipher.decrypt(nonce, combined).map_err(|_| HecError::KeyCorrupt("AEAD authentication failed".into()))
            }
            #[cfg(feature = "chacha")]
            CipherKind::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new(aes_gcm::aead::generic_array::GenericArray::from_slice(self.master_key.as_slice()));
                cipher.decrypt(nonce, combined).map_err(|_| HecError::KeyCorrupt("AEAD authentication failed".into()))
            }
        }
    }

    fn key_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{id}.key"))
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{id}.json"))
    }

    /// Store `blob` under `id`, AEAD-sealed with the store's master key.
    /// Writes to a temporary file and renames into place so a crash
    /// mid-write never leaves a torn blob behind.
    pub fn save(&self, id: &str, blob: &[u8], metadata: &KeyMetadata) -> HecResult<()> {
        let sealed = self.encrypt(blob)?;
        let key_path = self.key_path(id);
        let tmp_path = self.base_dir.join(format!("{id}.key.tmp"));
        fs::write(&tmp_path, &sealed)?;
        fs::rename(&tmp_path, &key_path)?;
        fs::write(self.meta_path(id), serde_json::to_vec_pretty(metadata)?)?;
        self.cache.write().put(id.to_string(), (blob.to_vec(), metadata.clone()));
        Ok(())
    }

    /// Load the raw key material and metadata for `id`, consulting the
    /// LRU cache before touching disk.
    pub fn load(&self, id: &str) -> HecResult<(Vec<u8>, KeyMetadata)> {
        if let Some(cached) = self.cache.write().get(id) {
            return Ok(cached.clone());
        }
        let key_path = self.key_path(id);
        if !key_path.exists() {
            return Err(HecError::KeyNotFound(id.to_string()));
        }
        let sealed = fs::read(&key_path)?;
        let blob = self.decrypt(&sealed)?;
        let meta_bytes = fs::read(self.meta_path(id)).map_err(|_| HecError::KeyCorrupt(format!("missing metadata for {id}")))?;
        let metadata: KeyMetadata = serde_json::from_slice(&meta_bytes)?;
        self.cache.write().put(id.to_string(), (blob.clone(), metadata.clone()));
        Ok((blob, metadata))
    }

    /// Delete `id`'s blob and metadata, invalidating any cached handle.
    pub fn delete(&self, id: &str) -> HecResult<()> {
        let key_path = self.key_path(id);
        if !key_path.exists() {
            return Err(HecError::KeyNotFound(id.to_string()));
        }
        fs::remove_file(&key_path)?;
        let _ = fs::remove_file(self.meta_path(id));
        self.cache.write().pop(id);
        Ok(())
    }

    /// List metadata for every key currently stored, scanning
    /// `{base_dir}/*.json` rather than relying on the cache (which may
    /// not hold every key).
    pub fn list(&self) -> HecResult<Vec<KeyMetadata>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                let bytes = fs::read(&path)?;
                let metadata: KeyMetadata = serde_json::from_slice(&bytes)?;
                out.push(metadata);
            }
        }
        Ok(out)
    }

    /// Bundle every stored key into a single AEAD-sealed backup at
    /// `dir`, per the layout in spec §6: `backup.enc` (IV || AEAD blob
    /// of the JSON manifest) and `metadata.json` alongside it.
    pub fn backup(&self, dir: impl AsRef<Path>, backup_id: &str) -> HecResult<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let all_metadata = self.list()?;
        let mut entries = Vec::with_capacity(all_metadata.len());
        for meta in &all_metadata {
            let (blob, _) = self.load(&meta.id)?;
            entries.push(BackupEntry { id: meta.id.clone(), data_base64: base64_encode(&blob) });
        }
        let manifest = BackupManifest { keys: entries, metadata: all_metadata.clone() };
        let manifest_bytes = serde_json::to_vec(&manifest)?;

        let mut iv = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut iv);
        let sealed_combined = self.aead_encrypt(&iv, &manifest_bytes)?;
        let mut backup_enc = Vec::with_capacity(16 + sealed_combined.len());
        backup_enc.extend_from_slice(&iv);
        backup_enc.extend_from_slice(&sealed_combined);
        fs::write(dir.join("backup.enc"), &backup_enc)?;

        let checksum = blake3::hash(&backup_enc).to_hex().to_string();
        let metadata_file = BackupMetadataFile {
            id: backup_id.to_string(),
            timestamp: Utc::now(),
            key_ids: manifest.metadata.iter().map(|m| m.id.clone()).collect(),
            size: backup_enc.len() as u64,
            checksum,
            version: 1,
        };
        fs::write(dir.join("metadata.json"), serde_json::to_vec_pretty(&metadata_file)?)?;
        Ok(())
    }

    /// Restore every key from a backup produced by
    /// [`KeyStore::backup`], verifying the recorded checksum before
    /// decrypting.
    pub fn restore(&self, dir: impl AsRef<Path>) -> HecResult<()> {
        let dir = dir.as_ref();
        let backup_enc = fs::read(dir.join("backup.enc"))?;
        let metadata_bytes = fs::read(dir.join("metadata.json"))?;
        let metadata_file: BackupMetadataFile = serde_json::from_slice(&metadata_bytes)?;

        let actual_checksum = blake3::hash(&backup_enc).to_hex().to_string();
        if actual_checksum != metadata_file.checksum {
            return Err(HecError::KeyCorrupt("backup checksum mismatch".into()));
        }

        let iv = &backup_enc[0..16];
        let combined = &backup_enc[16..];
        let manifest_bytes = self.aead_decrypt(iv, combined)?;
        let manifest: BackupManifest = serde_json::from_slice(&manifest_bytes)?;

        let metadata_by_id: std::collections::HashMap<&str, &KeyMetadata> = manifest.metadata.iter().map(|m| (m.id.as_str(), m)).collect();
        for entry in &manifest.keys {
            let blob = base64_decode(&entry.data_base64)?;
            let metadata = metadata_by_id
                .get(entry.id.as_str())
                .ok_or_else(|| HecError::KeyCorrupt(format!("backup manifest missing metadata for {}", entry.id)))?;
            self.save(&entry.id, &blob, metadata)?;
        }
        Ok(())
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> HecResult<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| HecError::KeyCorrupt(format!("invalid base64 in backup entry: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(id: &str) -> KeyMetadata {
        KeyMetadata {
            id: id.to_string(),
            scheme: "bgv".to_string(),
            security_level: "128".to_string(),
            created_at: Utc::now(),
            key_type: "secret".to_string(),
            poly_modulus_degree: Some(4096),
            plain_modulus: Some(1024),
            coeff_modulus: None,
            rotation_indices: None,
        }
    }

    fn temp_dir(label: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("hec-keystore-test-{label}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = temp_dir("save-load");
        let store = KeyStore::open(&dir, b"correct horse battery staple", 8).unwrap();
        let blob = b"pretend-secret-key-bytes".to_vec();
        store.save("key-1", &blob, &metadata("key-1")).unwrap();
        let (loaded, meta) = store.load("key-1").unwrap();
        assert_eq!(loaded, blob);
        assert_eq!(meta.id, "key-1");
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_key_reports_not_found() {
        let dir = temp_dir("missing");
        let store = KeyStore::open(&dir, b"passphrase", 8).unwrap();
        assert!(matches!(store.load("nope"), Err(HecError::KeyNotFound(_))));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn delete_invalidates_cache_and_disk() {
        let dir = temp_dir("delete");
        let store = KeyStore::open(&dir, b"passphrase", 8).unwrap();
        store.save("key-1", b"bytes", &metadata("key-1")).unwrap();
        store.delete("key-1").unwrap();
        assert!(matches!(store.load("key-1"), Err(HecError::KeyNotFound(_))));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn backup_and_restore_round_trips_into_a_fresh_store() {
        let source_dir = temp_dir("backup-source");
        let backup_dir = temp_dir("backup-archive");
        let restore_dir = temp_dir("backup-restore");
        let source = KeyStore::open(&source_dir, b"passphrase", 8).unwrap();
        source.save("key-1", b"alpha-bytes", &metadata("key-1")).unwrap();
        source.save("key-2", b"beta-bytes", &metadata("key-2")).unwrap();
        source.backup(&backup_dir, "backup-001").unwrap();

        let restored = KeyStore::open(&restore_dir, b"passphrase", 8).unwrap();
        restored.restore(&backup_dir).unwrap();
        let (blob, _) = restored.load("key-1").unwrap();
        assert_eq!(blob, b"alpha-bytes");
        let listed = restored.list().unwrap();
        assert_eq!(listed.len(), 2);

        fs::remove_dir_all(&source_dir).ok();
        fs::remove_dir_all(&backup_dir).ok();
        fs::remove_dir_all(&restore_dir).ok();
    }

    #[test]
    fn tampered_blob_fails_decryption() {
        let dir = temp_dir("tamper");
        let store = KeyStore::open(&dir, b"passphrase", 8).unwrap();
        store.save("key-1", b"bytes", &metadata("key-1")).unwrap();
        let path = store.key_path("key-1");
        let mut sealed = fs::read(&path).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        fs::write(&path, &sealed).unwrap();

        // Cache still holds the good value from `save`, so force a fresh
        // store instance to actually hit disk.
        let reopened = KeyStore::open(&dir, b"passphrase", 8).unwrap();
        assert!(matches!(reopened.load("key-1"), Err(HecError::KeyCorrupt(_))));
        fs::remove_dir_all(&dir).ok();
    }
}
