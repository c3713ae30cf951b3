//! The one-shot hybrid session exchange.
//!
//! A session is strictly linear. Public keys cross first, then the
//! initiator wraps a fresh 16-byte session key for the responder and
//! proves possession of its own private key with a signature over that
//! session key, then exactly one signed payload follows:
//!
//! ```text
//! I -> R : public_I                               (framed)
//! R -> I : public_R
//! I -> R : RSA-OAEP(session_key, public_R)
//! I -> R : AES-EAX(sign(session_key, priv_I), session_key)
//! I -> R : AES-EAX(payload, session_key)
//! I -> R : AES-EAX(sign(payload, priv_I), session_key)
//! ```
//!
//! There are no retries inside a session and the channel is not reused; a
//! reply travels over a new connection in the reverse direction. Trust in
//! the responder's key is checked here against the expected fingerprint;
//! trust in the initiator's key is the accepting application's decision.

use std::io::{Read, Write};

use rsa::RsaPublicKey;
use sidewinder_crypto_core::keys::{export_public_pem, import_public_pem};
use sidewinder_crypto_core::{hybrid, CryptoError, Fingerprint, KeyPair};
use tracing::debug;

use crate::framing::{self, FrameError};

/// Default TCP port peers listen on.
pub const DEFAULT_PORT: u16 = 5300;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The peer failed authentication: its key contradicts the expected
    /// fingerprint, a signature did not verify, or ciphertext did not
    /// open under the session key.
    #[error("peer failed authentication")]
    PeerUnauthenticated,
    #[error("transport failure: {0}")]
    Transport(#[from] FrameError),
    #[error(transparent)]
    Crypto(CryptoError),
}

impl From<CryptoError> for SessionError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AuthFailure
            | CryptoError::SignatureInvalid
            | CryptoError::InvalidCiphertext => SessionError::PeerUnauthenticated,
            other => SessionError::Crypto(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// What a completed responder-side session yields.
#[derive(Debug)]
pub struct Inbound {
    /// The key the initiator presented, already proven by its signatures.
    pub peer_public: RsaPublicKey,
    pub payload: Vec<u8>,
}

/// Initiator side: authenticate the responder against `expected` and
/// deliver one signed payload.
pub fn transmit<S: Read + Write>(
    sock: &mut S,
    keys: &KeyPair,
    expected: &Fingerprint,
    payload: &[u8],
) -> Result<()> {
    framing::send(sock, export_public_pem(keys.public())?.as_bytes())?;

    let peer = receive_public_key(sock)?;
    if !expected.verify(&peer)? {
        return Err(SessionError::PeerUnauthenticated);
    }
    debug!("responder key matches the expected fingerprint");

    let session_key = hybrid::generate_key();
    framing::send(sock, &hybrid::encrypt_rsa(&session_key, &peer)?)?;
    let key_signature = hybrid::sign(&session_key, keys.private())?;
    framing::send(sock, &hybrid::encrypt_aes(&key_signature, &session_key)?)?;
    debug!("session key delivered");

    framing::send(sock, &hybrid::encrypt_aes(payload, &session_key)?)?;
    let payload_signature = hybrid::sign(payload, keys.private())?;
    framing::send(sock, &hybrid::encrypt_aes(&payload_signature, &session_key)?)?;
    debug!(bytes = payload.len(), "payload delivered");

    Ok(())
}

/// Responder side: run the exchange and hand back the initiator's key
/// together with the authenticated payload.
///
/// Any failure discards all partial state; nothing is retried.
pub fn respond<S: Read + Write>(sock: &mut S, keys: &KeyPair) -> Result<Inbound> {
    let peer = receive_public_key(sock)?;
    framing::send(sock, export_public_pem(keys.public())?.as_bytes())?;
    debug!("public keys exchanged");

    let wrapped = framing::receive(sock)?;
    let session_key: [u8; hybrid::KEY_LEN] = hybrid::decrypt_rsa(&wrapped, keys.private())?
        .try_into()
        .map_err(|_| SessionError::PeerUnauthenticated)?;

    let key_signature = hybrid::decrypt_aes(&framing::receive(sock)?, &session_key)?;
    hybrid::verify(&session_key, &key_signature, &peer)?;
    debug!("session established");

    let payload = hybrid::decrypt_aes(&framing::receive(sock)?, &session_key)?;
    let payload_signature = hybrid::decrypt_aes(&framing::receive(sock)?, &session_key)?;
    hybrid::verify(&payload, &payload_signature, &peer)?;
    debug!(bytes = payload.len(), "payload authenticated");

    Ok(Inbound {
        peer_public: peer,
        payload,
    })
}

/// A framed public key from the peer. Garbage here is a protocol
/// violation, not a transport problem.
fn receive_public_key<S: Read>(sock: &mut S) -> Result<RsaPublicKey> {
    let pem = framing::receive(sock)?;
    let pem = String::from_utf8(pem).map_err(|_| SessionError::PeerUnauthenticated)?;
    import_public_pem(&pem).map_err(|_| SessionError::PeerUnauthenticated)
}
