//! Hybrid protocol primitives: RSA-OAEP key wrapping, AES-EAX payload
//! encryption, and PKCS#1 v1.5 signatures over SHA-256.
//!
//! RSA-OAEP keeps the SHA-1 digest for wire compatibility; it only ever
//! wraps 16-byte keys. The AES output layout is bit-exact and shared with
//! the at-rest store:
//!
//! ```text
//!      Nonce          Tag         Ciphertext
//! [-----16-----][-----16-----][-------n-------]
//! ```

use aes::Aes128;
use eax::aead::generic_array::GenericArray;
use eax::aead::{Aead, KeyInit};
use eax::Eax;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::Sha256;

use crate::{CryptoError, Result};

type Aes128Eax = Eax<Aes128>;

/// Length of session and content keys.
pub const KEY_LEN: usize = 16;

const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 16;

/// Draw a fresh 16-byte AES key from the OS.
pub fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

/// RSA-OAEP (SHA-1) wrap of a short secret under `public`.
pub fn encrypt_rsa(msg: &[u8], public: &RsaPublicKey) -> Result<Vec<u8>> {
    public
        .encrypt(&mut OsRng, Oaep::new::<Sha1>(), msg)
        .map_err(|e| CryptoError::Internal(format!("rsa encryption failed: {e}")))
}

/// Inverse of [`encrypt_rsa`].
pub fn decrypt_rsa(ciphertext: &[u8], private: &RsaPrivateKey) -> Result<Vec<u8>> {
    private
        .decrypt(Oaep::new::<Sha1>(), ciphertext)
        .map_err(|_| CryptoError::InvalidCiphertext)
}

/// AES-128-EAX seal of `msg` with a fresh random nonce.
pub fn encrypt_aes(msg: &[u8], key: &[u8; KEY_LEN]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let cipher = Aes128Eax::new(GenericArray::from_slice(key));
    let sealed = cipher
        .encrypt(GenericArray::from_slice(&nonce), msg)
        .map_err(|_| CryptoError::Internal("aes encryption failed".to_string()))?;
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    let mut out = Vec::with_capacity(NONCE_LEN + TAG_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(tag);
    out.extend_from_slice(ciphertext);
    Ok(out)
}

/// Open an [`encrypt_aes`] sealing, verifying the tag.
///
/// Any bit flip in nonce, tag, or ciphertext fails with
/// [`CryptoError::AuthFailure`].
pub fn decrypt_aes(msg: &[u8], key: &[u8; KEY_LEN]) -> Result<Vec<u8>> {
    if msg.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::InvalidCiphertext);
    }
    let (nonce, rest) = msg.split_at(NONCE_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);

    let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);

    let cipher = Aes128Eax::new(GenericArray::from_slice(key));
    cipher
        .decrypt(GenericArray::from_slice(nonce), sealed.as_slice())
        .map_err(|_| CryptoError::AuthFailure)
}

/// PKCS#1 v1.5 signature over SHA-256 of `msg`.
pub fn sign(msg: &[u8], private: &RsaPrivateKey) -> Result<Vec<u8>> {
    let signer = SigningKey::<Sha256>::new(private.clone());
    let signature = signer
        .try_sign(msg)
        .map_err(|e| CryptoError::Internal(format!("signing failed: {e}")))?;
    Ok(signature.to_vec())
}

/// Verify a [`sign`] signature; succeeds silently, fails with
/// [`CryptoError::SignatureInvalid`] otherwise.
pub fn verify(msg: &[u8], signature: &[u8], public: &RsaPublicKey) -> Result<()> {
    let signature =
        Signature::try_from(signature).map_err(|_| CryptoError::SignatureInvalid)?;
    VerifyingKey::<Sha256>::new(public.clone())
        .verify(msg, &signature)
        .map_err(|_| CryptoError::SignatureInvalid)
}
