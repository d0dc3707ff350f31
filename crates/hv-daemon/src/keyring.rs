//! File-backed keyring
//!
//! Each key is one JSON record at `<home>/keyring-<backend>/<name>.key`.
//! The `file` backend seals the record with an age passphrase; `os` and
//! `test` store it as plain JSON with owner-only permissions.
//!
//! Keys are ed25519. The signing key for a mnemonic is
//! `SHA-256(seed || "m/44'/<coin>'/<account>'/0/<index>")`.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use age::secrecy::Secret;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bip39::Mnemonic;
use ed25519_dalek::{Signer, SigningKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use hv_core::ipc::{KeyInfo, SignResponse};
use hv_core::traits::{Keyring, KeyringAccess, NewKey};
use hv_core::{AccAddress, KeyringBackend, KeyringError};

/// Extension of key records
const KEY_EXTENSION: &str = "key";

/// Entropy of generated mnemonics (24 words)
const MNEMONIC_ENTROPY_LEN: usize = 32;

/// Generate a fresh 24-word mnemonic
pub fn generate_mnemonic() -> Result<String, KeyringError> {
    let mut entropy = [0u8; MNEMONIC_ENTROPY_LEN];
    rand::thread_rng().fill_bytes(&mut entropy);
    Mnemonic::from_entropy(&entropy)
        .map(|m| m.to_string())
        .map_err(|e| KeyringError::Crypto(e.to_string()))
}

/// Derive the signing key for a mnemonic and HD path
pub fn derive_signing_key(key: &NewKey) -> Result<SigningKey, KeyringError> {
    let mnemonic = Mnemonic::parse_normalized(&key.mnemonic)
        .map_err(|e| KeyringError::InvalidMnemonic(e.to_string()))?;
    let seed = mnemonic.to_seed_normalized(&key.bip39_password);
    let path = format!("m/44'/{}'/{}'/0/{}", key.coin_type, key.account, key.index);

    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.update(path.as_bytes());
    let secret: [u8; 32] = hasher.finalize().into();
    Ok(SigningKey::from_bytes(&secret))
}

fn key_info(name: &str, signing_key: &SigningKey) -> KeyInfo {
    let public = signing_key.verifying_key().to_bytes();
    let hash = Sha256::digest(public);
    KeyInfo {
        name: name.to_string(),
        pub_key: STANDARD.encode(public),
        address: AccAddress::from_bytes(&hash[..20]).to_string(),
    }
}

/// On-disk key record
#[derive(Serialize, Deserialize)]
struct KeyRecord {
    name: String,
    /// Base64 ed25519 secret
    secret: String,
    coin_type: u32,
    account: u32,
    index: u32,
}

impl KeyRecord {
    fn signing_key(&self) -> Result<SigningKey, KeyringError> {
        let bytes = STANDARD
            .decode(&self.secret)
            .map_err(|e| KeyringError::Corrupt(e.to_string()))?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyringError::Corrupt(format!("key {} has a bad secret", self.name)))?;
        Ok(SigningKey::from_bytes(&secret))
    }
}

/// [`Keyring`] storing one file per key
#[derive(Debug, Clone)]
pub struct FileKeyring {
    home: PathBuf,
}

impl FileKeyring {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    fn dir(&self, backend: KeyringBackend) -> PathBuf {
        self.home.join(format!("keyring-{}", backend))
    }

    fn path(&self, backend: KeyringBackend, name: &str) -> PathBuf {
        self.dir(backend).join(format!("{}.{}", name, KEY_EXTENSION))
    }

    fn seal(access: &KeyringAccess, plaintext: &[u8]) -> Result<Vec<u8>, KeyringError> {
        if access.backend != KeyringBackend::File {
            return Ok(plaintext.to_vec());
        }

        let encryptor = age::Encryptor::with_user_passphrase(Secret::new(access.password.clone()));
        let mut ciphertext = Vec::new();
        let mut writer = encryptor
            .wrap_output(&mut ciphertext)
            .map_err(|e| KeyringError::Crypto(e.to_string()))?;
        writer.write_all(plaintext)?;
        writer.finish()?;
        Ok(ciphertext)
    }

    fn open(access: &KeyringAccess, data: &[u8]) -> Result<Vec<u8>, KeyringError> {
        if access.backend != KeyringBackend::File {
            return Ok(data.to_vec());
        }

        let decryptor = match age::Decryptor::new(data)
            .map_err(|e| KeyringError::Corrupt(e.to_string()))?
        {
            age::Decryptor::Passphrase(d) => d,
            age::Decryptor::Recipients(_) => {
                return Err(KeyringError::Corrupt(
                    "record is not passphrase-encrypted".to_string(),
                ))
            }
        };

        let mut reader = decryptor
            .decrypt(&Secret::new(access.password.clone()), None)
            .map_err(|e| match e {
                age::DecryptError::DecryptionFailed | age::DecryptError::KeyDecryptionFailed => {
                    KeyringError::WrongPassword
                }
                other => KeyringError::Crypto(other.to_string()),
            })?;
        let mut plaintext = Vec::new();
        reader.read_to_end(&mut plaintext)?;
        Ok(plaintext)
    }

    fn read_record(&self, access: &KeyringAccess, path: &Path) -> Result<KeyRecord, KeyringError> {
        let data = fs::read(path)?;
        let plaintext = Self::open(access, &data)?;
        serde_json::from_slice(&plaintext).map_err(|e| KeyringError::Corrupt(e.to_string()))
    }

    fn load(&self, access: &KeyringAccess, name: &str) -> Result<KeyRecord, KeyringError> {
        let path = self.path(access.backend, name);
        match self.read_record(access, &path) {
            Err(KeyringError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                Err(KeyringError::NotFound(name.to_string()))
            }
            other => other,
        }
    }
}

/// Create `path` exclusively and fill it; a failed fill removes the file
fn create_exclusive(
    path: &Path,
    fill: impl FnOnce(&mut fs::File) -> io::Result<()>,
) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    if let Err(e) = fill(&mut file) {
        drop(file);
        if let Err(cleanup) = fs::remove_file(path) {
            tracing::warn!("Failed to remove partial key record {:?}: {}", path, cleanup);
        }
        return Err(e);
    }
    Ok(())
}

impl Keyring for FileKeyring {
    fn add(&self, access: &KeyringAccess, key: NewKey) -> Result<KeyInfo, KeyringError> {
        let signing_key = derive_signing_key(&key)?;
        let info = key_info(&key.name, &signing_key);

        let record = KeyRecord {
            name: key.name.clone(),
            secret: STANDARD.encode(signing_key.to_bytes()),
            coin_type: key.coin_type,
            account: key.account,
            index: key.index,
        };
        let json = serde_json::to_vec(&record).map_err(|e| KeyringError::Corrupt(e.to_string()))?;
        let sealed = Self::seal(access, &json)?;

        let dir = self.dir(access.backend);
        fs::create_dir_all(&dir)?;
        let path = self.path(access.backend, &key.name);

        let created = create_exclusive(&path, |file| {
            file.write_all(&sealed)?;
            file.sync_all()
        });
        match created {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(KeyringError::AlreadyExists(key.name))
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!("Added key {} ({})", info.name, info.address);
        Ok(info)
    }

    fn get(&self, access: &KeyringAccess, name: &str) -> Result<KeyInfo, KeyringError> {
        let record = self.load(access, name)?;
        Ok(key_info(name, &record.signing_key()?))
    }

    fn list(&self, access: &KeyringAccess) -> Result<Vec<KeyInfo>, KeyringError> {
        let dir = self.dir(access.backend);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(KEY_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let record = self.read_record(access, &path)?;
            keys.push(key_info(name, &record.signing_key()?));
        }
        keys.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(keys)
    }

    fn delete(&self, access: &KeyringAccess, name: &str) -> Result<(), KeyringError> {
        // Opening proves the caller knows the password
        self.load(access, name)?;
        fs::remove_file(self.path(access.backend, name))?;
        tracing::info!("Deleted key {}", name);
        Ok(())
    }

    fn sign(
        &self,
        access: &KeyringAccess,
        name: &str,
        bytes: &[u8],
    ) -> Result<SignResponse, KeyringError> {
        let signing_key = self.load(access, name)?.signing_key()?;
        let signature = signing_key.sign(bytes);
        Ok(SignResponse {
            public_key: STANDARD.encode(signing_key.verifying_key().to_bytes()),
            signature: STANDARD.encode(signature.to_bytes()),
        })
    }
}
