//! The local RSA key pair.
//!
//! Loaded once at startup and passed explicitly to every component that
//! signs or decrypts. It is never serialized outward.

use super::Identity;
use crate::error::{Error, Result};
use crate::logging::Redacted;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use std::path::Path;

/// Minimum modulus size accepted for a generated local key.
pub const MIN_KEY_BITS: usize = 1024;

/// A private key bound to exactly one [`Identity`].
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    identity: Identity,
}

impl KeyPair {
    /// Wrap an existing private key.
    pub fn from_private_key(private: RsaPrivateKey) -> Self {
        let identity = Identity::from_public_key(&private.to_public_key());
        Self { private, identity }
    }

    /// Generate a new random key pair.
    pub fn generate(bits: usize) -> Result<Self> {
        if bits < MIN_KEY_BITS {
            return Err(Error::InvalidKey(format!(
                "key size {} below minimum {}",
                bits, MIN_KEY_BITS
            )));
        }
        let private =
            RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self::from_private_key(private))
    }

    /// Parse a key pair from PEM text.
    ///
    /// The private key may be PKCS#1 (`RSA PRIVATE KEY`) or PKCS#8
    /// (`PRIVATE KEY`); the public key SPKI (`PUBLIC KEY`) or PKCS#1
    /// (`RSA PUBLIC KEY`). Both halves must belong together.
    pub fn from_pem(public_pem: &str, private_pem: &str) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs1_pem(private_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(private_pem))
            .map_err(|e| Error::InvalidKey(format!("private key: {}", e)))?;
        let public = RsaPublicKey::from_public_key_pem(public_pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(public_pem))
            .map_err(|e| Error::InvalidKey(format!("public key: {}", e)))?;

        if private.to_public_key() != public {
            return Err(Error::Identity(
                "public key does not match private key".into(),
            ));
        }

        Ok(Self::from_private_key(private))
    }

    /// Load a key pair from PEM files.
    pub fn load(public_path: impl AsRef<Path>, private_path: impl AsRef<Path>) -> Result<Self> {
        let public_pem = read_key_file(public_path.as_ref())?;
        let private_pem = read_key_file(private_path.as_ref())?;
        let keypair = Self::from_pem(&public_pem, &private_pem)?;

        tracing::info!(
            fingerprint = %crate::logging::ShortFingerprint(keypair.identity.fingerprint()),
            "Loaded identity key pair"
        );

        Ok(keypair)
    }

    /// Write the key pair as PEM files (SPKI public, PKCS#1 private).
    ///
    /// The private key file is created with owner-only permissions on Unix.
    pub fn write_pem(
        &self,
        public_path: impl AsRef<Path>,
        private_path: impl AsRef<Path>,
    ) -> Result<()> {
        let public_pem = self
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        let private_pem = self
            .private
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| Error::InvalidKey(e.to_string()))?;

        std::fs::write(public_path.as_ref(), public_pem.as_bytes())?;
        std::fs::write(private_path.as_ref(), private_pem.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(
                private_path.as_ref(),
                std::fs::Permissions::from_mode(0o600),
            )?;
        }

        Ok(())
    }

    /// The public identity of this key pair.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The RSA public key.
    pub fn public_key(&self) -> RsaPublicKey {
        self.private.to_public_key()
    }

    /// The RSA private key.
    ///
    /// # Security
    /// Handle with care - this exposes secret key material.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("identity", &self.identity)
            .field("private", &Redacted(&self.private))
            .finish()
    }
}

fn read_key_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::Identity(format!("cannot read {}: {}", path.display(), e)))
}
