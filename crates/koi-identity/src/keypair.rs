//! P-256 ECDSA key lifecycle: generate, persist, load.
//!
//! Same generate/from_seed/public_key/sign/verify shape used elsewhere in
//! this workspace for peer keypairs, but over P-256 rather than Ed25519,
//! since node identity here must be P-256 per the wire format.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("pkcs8 error: {0}")]
    Pkcs8(String),
    #[error("invalid signature")]
    InvalidSignature,
}

/// A node's P-256 ECDSA signing keypair.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        Self { signing_key }
    }

    /// Load an unencrypted PKCS8 PEM-encoded private key from `path`.
    pub fn load_pem(path: &Path) -> Result<Self, KeyError> {
        let pem = fs::read_to_string(path)?;
        let signing_key =
            SigningKey::from_pkcs8_pem(&pem).map_err(|e| KeyError::Pkcs8(e.to_string()))?;
        Ok(Self { signing_key })
    }

    /// Persist this key as unencrypted PKCS8 PEM with owner-only (0o600)
    /// permissions.
    pub fn save_pem(&self, path: &Path) -> Result<(), KeyError> {
        let pem = self
            .signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyError::Pkcs8(e.to_string()))?;
        let mut file = {
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(0o600)
                    .open(path)?
            }
            #[cfg(not(unix))]
            {
                fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)?
            }
        };
        file.write_all(pem.as_bytes())?;
        Ok(())
    }

    /// Load the key at `path`, generating and persisting a new one if
    /// absent. This is the `load_or_create` half of C1's key lifecycle.
    pub fn load_or_generate(path: &Path) -> Result<Self, KeyError> {
        if path.exists() {
            Self::load_pem(path)
        } else {
            let kp = Self::generate();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            kp.save_pem(path)?;
            Ok(kp)
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        *self.signing_key.verifying_key()
    }

    /// DER-encoded SubjectPublicKeyInfo, base64-encoded — the wire format
    /// for `NodeProfile.public_key`.
    pub fn public_key_der_b64(&self) -> String {
        let der = public_key_der(&self.verifying_key());
        B64.encode(der)
    }

    /// Sign `bytes` with P-256 ECDSA over SHA-256, returning the
    /// `r || s` (32 bytes each) signature, base64-encoded.
    pub fn sign(&self, bytes: &[u8]) -> String {
        let signature: Signature = self.signing_key.sign(bytes);
        B64.encode(signature.to_bytes())
    }
}

/// DER-encode a P-256 public key as SubjectPublicKeyInfo.
pub fn public_key_der(key: &VerifyingKey) -> Vec<u8> {
    use p256::pkcs8::EncodePublicKey;
    key.to_public_key_der()
        .expect("P-256 public key DER encoding cannot fail")
        .to_vec()
}

/// Decode a base64-encoded DER SubjectPublicKeyInfo into a [`VerifyingKey`].
pub fn verifying_key_from_der_b64(der_b64: &str) -> Result<VerifyingKey, KeyError> {
    use p256::pkcs8::DecodePublicKey;
    let der = B64
        .decode(der_b64)
        .map_err(|e| KeyError::Pkcs8(e.to_string()))?;
    VerifyingKey::from_public_key_der(&der).map_err(|e| KeyError::Pkcs8(e.to_string()))
}

/// Verify a base64-encoded `r || s` signature over `bytes`.
pub fn verify(key: &VerifyingKey, bytes: &[u8], signature_b64: &str) -> Result<(), KeyError> {
    let sig_bytes = B64
        .decode(signature_b64)
        .map_err(|_| KeyError::InvalidSignature)?;
    let signature = Signature::from_slice(&sig_bytes).map_err(|_| KeyError::InvalidSignature)?;
    key.verify(bytes, &signature)
        .map_err(|_| KeyError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let kp = KeyPair::generate();
        let msg = b"hello koi-net";
        let sig = kp.sign(msg);
        verify(&kp.verifying_key(), msg, &sig).unwrap();
    }

    #[test]
    fn tampered_message_fails_verification() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"original");
        assert!(verify(&kp.verifying_key(), b"tampered", &sig).is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node_private_key.pem");
        let kp = KeyPair::generate();
        kp.save_pem(&path).unwrap();
        let loaded = KeyPair::load_pem(&path).unwrap();
        assert_eq!(kp.public_key_der_b64(), loaded.public_key_der_b64());
    }

    #[cfg(unix)]
    #[test]
    fn persisted_key_has_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node_private_key.pem");
        KeyPair::generate().save_pem(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
