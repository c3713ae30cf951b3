//! Cryptographic core for sidewinder endpoints.
//!
//! Everything the wire protocol and the sealed stores need: the owner's
//! long-term RSA identity, hybrid RSA-OAEP / AES-EAX primitives, PKCS#1
//! v1.5 signatures, and human-comparable key fingerprints. Higher layers
//! (framing, the session exchange, persistence) live in the messaging and
//! node crates.

pub mod fingerprint;
pub mod hybrid;
pub mod keys;

pub use fingerprint::Fingerprint;
pub use keys::KeyPair;

/// Result type exposed by crypto-core APIs.
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors returned by the crypto core.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// An AES-EAX authentication tag did not verify.
    #[error("authentication failed")]
    AuthFailure,
    /// A PKCS#1 v1.5 signature did not verify.
    #[error("invalid signature")]
    SignatureInvalid,
    /// Ciphertext was malformed or not decryptable under the given key.
    #[error("invalid ciphertext")]
    InvalidCiphertext,
    /// A sealed private key could not be opened with the given password.
    #[error("bad password or corrupt key envelope")]
    BadPassphrase,
    #[error("internal error: {0}")]
    Internal(String),
}
