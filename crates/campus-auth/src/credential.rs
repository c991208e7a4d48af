use std::fmt;
use std::str::FromStr;

use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::stores::{SignatureBackend, Signed};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("malformed credential")]
    Malformed,
    #[error("invalid signature")]
    InvalidSignature,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Parsed form of the `"{accountId}.{signature}"` wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub account_id: i64,
    pub signature: String,
}

impl FromStr for Credential {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, sign) = s.split_once('.').ok_or(CredentialError::Malformed)?;
        let account_id: i64 = id.parse().map_err(|_| CredentialError::Malformed)?;
        if sign.is_empty() || !sign.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CredentialError::Malformed);
        }
        Ok(Credential {
            account_id,
            signature: sign.to_string(),
        })
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.account_id, self.signature)
    }
}

/// Rotate the account's stored signature and return the new credential
/// string. The old credential stops verifying the moment this persists.
pub fn issue<B: SignatureBackend>(backend: &B, account_id: i64) -> Result<String, CredentialError> {
    let signature = generate_signature();
    backend.persist(account_id, &signature)?;
    debug!(account_id, "session signature rotated");
    Ok(Credential {
        account_id,
        signature,
    }
    .to_string())
}

/// Check a presented credential against the stored signature and return the
/// account it names. Never rotates; callers that want sliding sessions call
/// `issue` again after a successful verify.
pub fn verify<B: SignatureBackend>(
    backend: &B,
    credential: &str,
) -> Result<B::Account, CredentialError> {
    let parsed: Credential = credential.parse()?;
    let account = backend
        .load(parsed.account_id)?
        .ok_or(CredentialError::InvalidSignature)?;
    if account.signature() != parsed.signature {
        return Err(CredentialError::InvalidSignature);
    }
    Ok(account)
}

// SHA-256 over a nanosecond timestamp and 32 bytes from the thread-local
// CSPRNG, hex-encoded.
fn generate_signature() -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let salt: [u8; 32] = rand::rng().random();

    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(salt);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        let cred: Credential = "42.deadbeef".parse().unwrap();
        assert_eq!(cred.account_id, 42);
        assert_eq!(cred.signature, "deadbeef");
        assert_eq!(cred.to_string(), "42.deadbeef");
    }

    #[test]
    fn parse_rejects_malformed_shapes() {
        for s in [
            "",
            "42",
            "42.",
            ".deadbeef",
            "forty.deadbeef",
            "42.not-hex!",
            "42.deadbeef.cafe",
        ] {
            assert!(
                matches!(s.parse::<Credential>(), Err(CredentialError::Malformed)),
                "expected {:?} to be malformed",
                s
            );
        }
    }

    #[test]
    fn generated_signatures_are_hex_and_distinct() {
        let a = generate_signature();
        let b = generate_signature();
        assert_eq!(a.len(), 64);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
