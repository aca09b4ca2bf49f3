//! Password gate in front of arm and disarm.
//!
//! The credential file holds a single unsalted SHA-256 digest in lowercase
//! hex. Verification is plain digest equality; the format stays compatible
//! with credentials created by earlier installs.

use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

use crate::artifact::CREDENTIAL_MODE;
use crate::fsutil::write_atomic;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("no credential at {0}; run focusguard without arguments to create one")]
    NoCredential(PathBuf),
    #[error("password does not match")]
    Mismatch,
    #[error("credential already exists at {0}")]
    AlreadyInitialized(PathBuf),
    #[error("password confirmation does not match")]
    ConfirmationMismatch,
    #[error("password must not be empty")]
    EmptySecret,
    #[error("credential io: {0}")]
    Io(#[from] io::Error),
}

impl CredentialError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::NoCredential(_) | Self::Mismatch)
    }

    pub fn is_setup_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyInitialized(_) | Self::ConfirmationMismatch | Self::EmptySecret
        )
    }
}

pub fn digest(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

pub struct CredentialGate {
    path: PathBuf,
}

impl CredentialGate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// First-run setup. `confirmation` is the second entry of the secret.
    pub fn initialize(&self, secret: &str, confirmation: &str) -> Result<(), CredentialError> {
        if self.exists() {
            return Err(CredentialError::AlreadyInitialized(self.path.clone()));
        }
        if secret != confirmation {
            return Err(CredentialError::ConfirmationMismatch);
        }
        if secret.is_empty() {
            return Err(CredentialError::EmptySecret);
        }
        write_atomic(&self.path, digest(secret).as_bytes(), CREDENTIAL_MODE)?;
        Ok(())
    }

    pub fn verify(&self, secret: &str) -> Result<(), CredentialError> {
        let stored = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CredentialError::NoCredential(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        if String::from_utf8_lossy(&stored).trim() != digest(secret) {
            return Err(CredentialError::Mismatch);
        }
        Ok(())
    }
}
