//! Signing boundary: wallet credentials handed in by the caller for one transfer.

use std::{fmt, str::FromStr};

use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use thiserror::Error;

/// Credential decoding errors.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum CredentialError {
    /// Public address is not valid base58 pubkey text.
    #[error("invalid public address `{address}`")]
    InvalidAddress {
        /// Offending address text.
        address: String,
    },
    /// Secret is not a valid base58 keypair encoding.
    #[error("invalid private key encoding: {message}")]
    InvalidSecret {
        /// Decoder message.
        message: String,
    },
    /// Decoded secret derives a different public address.
    #[error("private key derives {derived}, expected {expected}")]
    AddressMismatch {
        /// Address declared by the credential.
        expected: Pubkey,
        /// Address derived from the secret.
        derived: Pubkey,
    },
}

/// Caller-owned wallet credential: a public address plus its base58 secret key.
///
/// The engine borrows the credential for one call and never persists it.
#[derive(Clone, Eq, PartialEq)]
pub struct WalletCredential {
    /// Base58 public address.
    public_address: String,
    /// Base58-encoded 64-byte keypair secret.
    private_key: String,
}

impl WalletCredential {
    /// Creates a credential from its base58 parts.
    #[must_use]
    pub fn new(public_address: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            public_address: public_address.into(),
            private_key: private_key.into(),
        }
    }

    /// Creates a credential from an in-memory keypair.
    #[must_use]
    pub fn from_keypair(keypair: &Keypair) -> Self {
        Self {
            public_address: keypair.pubkey().to_string(),
            private_key: bs58::encode(keypair.to_bytes()).into_string(),
        }
    }

    /// Returns the declared public address text.
    #[must_use]
    pub fn public_address(&self) -> &str {
        &self.public_address
    }

    /// Decodes the secret into a keypair and checks it re-derives the declared address.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] when either part fails to decode or the derived address
    /// differs from the declared one.
    pub fn keypair(&self) -> Result<Keypair, CredentialError> {
        let expected = Pubkey::from_str(&self.public_address).map_err(|_error| {
            CredentialError::InvalidAddress {
                address: self.public_address.clone(),
            }
        })?;
        let bytes = bs58::decode(&self.private_key)
            .into_vec()
            .map_err(|error| CredentialError::InvalidSecret {
                message: error.to_string(),
            })?;
        let keypair =
            Keypair::try_from(bytes.as_slice()).map_err(|error| CredentialError::InvalidSecret {
                message: error.to_string(),
            })?;
        let derived = keypair.pubkey();
        if derived != expected {
            return Err(CredentialError::AddressMismatch { expected, derived });
        }
        Ok(keypair)
    }
}

impl fmt::Debug for WalletCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletCredential")
            .field("public_address", &self.public_address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_round_trips_through_keypair() {
        let keypair = Keypair::new();
        let credential = WalletCredential::from_keypair(&keypair);
        let decoded = credential.keypair();
        assert!(decoded.is_ok());
        if let Ok(decoded) = decoded {
            assert_eq!(decoded.pubkey(), keypair.pubkey());
        }
    }

    #[test]
    fn mismatched_address_is_rejected() {
        let keypair = Keypair::new();
        let other = Pubkey::new_unique();
        let credential =
            WalletCredential::new(other.to_string(), bs58::encode(keypair.to_bytes()).into_string());
        assert_eq!(
            credential.keypair().err(),
            Some(CredentialError::AddressMismatch {
                expected: other,
                derived: keypair.pubkey(),
            })
        );
    }

    #[test]
    fn malformed_parts_are_rejected() {
        let keypair = Keypair::new();
        let bad_address = WalletCredential::new("not-a-key", "abc");
        assert!(matches!(
            bad_address.keypair(),
            Err(CredentialError::InvalidAddress { .. })
        ));
        let bad_secret = WalletCredential::new(keypair.pubkey().to_string(), "0OIl");
        assert!(matches!(
            bad_secret.keypair(),
            Err(CredentialError::InvalidSecret { .. })
        ));
        let short_secret = WalletCredential::new(keypair.pubkey().to_string(), "3yZe7d");
        assert!(matches!(
            short_secret.keypair(),
            Err(CredentialError::InvalidSecret { .. })
        ));
    }

    #[test]
    fn debug_output_redacts_secret() {
        let credential = WalletCredential::from_keypair(&Keypair::new());
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&credential.private_key));
    }
}
