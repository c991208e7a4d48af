//! Session credentials for signable accounts.
//!
//! A credential is the string `"{accountId}.{signature}"`. The signature is
//! an opaque value stored on the account row and regenerated on every
//! issuance; presenting a credential whose signature no longer matches the
//! stored one fails verification. This is an equality-checked session
//! token, not a cryptographic proof against an attacker with database read
//! access.

pub mod credential;
pub mod stores;

pub use credential::{Credential, CredentialError, issue, verify};
pub use stores::{AdminSignatures, SignatureBackend, Signed, UserSignatures};
