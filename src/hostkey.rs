//! Server host identity: the key the host proves ownership of during key exchange.

use signature::{SignatureEncoding, Signer, Verifier};
use ssh_key::{public::PublicKey, PrivateKey, Signature};

use crate::error::{Error, Result};

/// The host's identity as used by key exchange and public-key userauth.
///
/// `Unknown` models a public key blob that named an algorithm this core doesn't
/// implement, or failed to parse; it is kept around (rather than rejected at parse
/// time) so negotiation can report `Error::NegotiationFailure` at the right point
/// instead of failing deep inside message decoding.
#[derive(Clone)]
pub enum HostKey {
    Private(PrivateKey),
    Public(PublicKey),
    Unknown,
}

impl HostKey {
    /// The algorithm name as it appears on the wire (e.g. `"ssh-rsa"`, `"ssh-ed25519"`).
    pub fn algorithm_name(&self) -> &str {
        match self {
            Self::Private(key) => key.algorithm().as_str(),
            Self::Public(key) => key.algorithm().as_str(),
            Self::Unknown => "unknown",
        }
    }

    /// The public key's wire-format blob, `K_S` in RFC 4253 terms.
    pub fn blob(&self) -> Result<Vec<u8>> {
        match self {
            Self::Private(key) => Ok(key.public_key().to_bytes()?),
            Self::Public(key) => Ok(key.to_bytes()?),
            Self::Unknown => Err(Error::NegotiationFailure),
        }
    }

    /// Parses a public key blob as received on the wire (e.g. in a `publickey` userauth probe).
    pub fn from_public_blob(blob: &[u8]) -> Self {
        match PublicKey::from_bytes(blob) {
            Ok(key) => Self::Public(key),
            Err(_) => Self::Unknown,
        }
    }

    /// Signs `message` (typically an exchange hash or a userauth signed blob), returning
    /// the SSH wire-format signature blob. Only meaningful for a private key.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Private(key) => {
                let signature: Signature = Signer::sign(key, message);
                Ok(signature.to_vec())
            }
            Self::Public(_) | Self::Unknown => Err(Error::NegotiationFailure),
        }
    }

    /// Verifies a signature blob against `message`. `Unknown` keys always fail.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let signature = Signature::try_from(signature)?;

        match self {
            Self::Private(key) => Verifier::verify(key.public_key(), message, &signature).map_err(Error::from),
            Self::Public(key) => Verifier::verify(key, message, &signature).map_err(Error::from),
            Self::Unknown => Err(Error::Signature(signature::Error::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> PrivateKey {
        PrivateKey::random(&mut rand::thread_rng(), ssh_key::Algorithm::Ed25519).expect("generates a test key")
    }

    #[test]
    fn sign_then_verify_roundtrip() {
        let key = HostKey::Private(test_key());
        let message = b"exchange hash or signed blob";

        let signature = key.sign(message).unwrap();

        assert!(key.verify(message, &signature).is_ok());
    }

    #[test]
    fn public_only_cannot_sign() {
        let private = test_key();
        let public = HostKey::Public(private.public_key().clone());

        assert!(public.sign(b"anything").is_err());
    }

    #[test]
    fn unknown_blob_never_verifies() {
        let unknown = HostKey::from_public_blob(b"not a valid key blob");

        assert!(matches!(unknown, HostKey::Unknown));
        assert!(unknown.verify(b"msg", b"sig").is_err());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let key = HostKey::Private(test_key());
        let signature = key.sign(b"original").unwrap();

        assert!(key.verify(b"tampered", &signature).is_err());
    }
}
