//! The sealed at-rest address book.
//!
//! Two blobs under the contact directory: `enc.key` is an RSA-OAEP
//! wrapping of a fresh 16-byte content key under the owner's public key;
//! `contacts.json` is the AES-EAX sealing of the book's JSON under that
//! key (binary, despite the extension). Every save draws a new content
//! key. Writes stage through temp files and a rename so a half-written
//! blob never lands at the final path.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rsa::{RsaPrivateKey, RsaPublicKey};
use sidewinder_crypto_core::{hybrid, CryptoError};
use sidewinder_messaging::ContactBook;
use tempfile::NamedTempFile;
use tracing::debug;

const KEY_FILE: &str = "enc.key";
const BOOK_FILE: &str = "contacts.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Blobs are present but will not decrypt or parse. The on-disk pair
    /// must not be overwritten without explicit confirmation.
    #[error("contact store is unreadable")]
    StoreCorrupt,
    #[error("contact store unavailable: {0}")]
    Io(#[from] io::Error),
    #[error("contact store serialization failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Crypto(CryptoError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

pub struct ContactStore {
    dir: PathBuf,
}

impl ContactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE)
    }

    fn book_path(&self) -> PathBuf {
        self.dir.join(BOOK_FILE)
    }

    /// True when either blob exists on disk.
    pub fn present(&self) -> bool {
        self.key_path().is_file() || self.book_path().is_file()
    }

    /// Decrypt and load the book. An absent store is an empty book; a
    /// present store that fails any stage of unsealing is
    /// [`StoreError::StoreCorrupt`].
    pub fn load(&self, private: &RsaPrivateKey) -> Result<ContactBook> {
        let wrapped_key = match fs::read(self.key_path()) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(ContactBook::new()),
            Err(err) => return Err(err.into()),
        };
        let body = match fs::read(self.book_path()) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(ContactBook::new()),
            Err(err) => return Err(err.into()),
        };

        let key: [u8; hybrid::KEY_LEN] = hybrid::decrypt_rsa(&wrapped_key, private)
            .map_err(|_| StoreError::StoreCorrupt)?
            .try_into()
            .map_err(|_| StoreError::StoreCorrupt)?;
        let plain = hybrid::decrypt_aes(&body, &key).map_err(|_| StoreError::StoreCorrupt)?;
        serde_json::from_slice(&plain).map_err(|_| StoreError::StoreCorrupt)
    }

    /// Seal and persist the whole book under a fresh content key.
    pub fn save(&self, book: &ContactBook, public: &RsaPublicKey) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let key = hybrid::generate_key();
        let json = serde_json::to_vec(book)?;
        let body = hybrid::encrypt_aes(&json, &key).map_err(StoreError::Crypto)?;
        let wrapped_key = hybrid::encrypt_rsa(&key, public).map_err(StoreError::Crypto)?;

        write_atomic(&self.dir, &self.book_path(), &body)?;
        write_atomic(&self.dir, &self.key_path(), &wrapped_key)?;
        debug!(contacts = book.len(), "contact store saved");
        Ok(())
    }
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidewinder_crypto_core::KeyPair;
    use sidewinder_messaging::{Contact, Message};
    use tempfile::tempdir;

    fn sample_book() -> (ContactBook, sidewinder_messaging::ContactId) {
        let mut book = ContactBook::new();
        let contact = Contact::new("alice", "10.0.0.2", None);
        let id = contact.id;
        book.upsert(contact);
        book.append_message(id, Message::now(true, "hello"));
        (book, id)
    }

    #[test]
    fn absent_store_loads_empty() {
        let dir = tempdir().unwrap();
        let store = ContactStore::new(dir.path().join("contacts"));
        let pair = KeyPair::generate().unwrap();
        assert!(!store.present());
        assert!(store.load(pair.private()).unwrap().is_empty());
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = ContactStore::new(dir.path().join("contacts"));
        let pair = KeyPair::generate().unwrap();
        let (book, id) = sample_book();

        store.save(&book, pair.public()).unwrap();
        assert!(store.present());

        let loaded = store.load(pair.private()).unwrap();
        assert_eq!(loaded, book);
        assert_eq!(loaded.get(id).unwrap().messages[0].contents, "hello");
    }

    #[test]
    fn each_save_uses_a_fresh_content_key() {
        let dir = tempdir().unwrap();
        let store = ContactStore::new(dir.path());
        let pair = KeyPair::generate().unwrap();
        let (book, _) = sample_book();

        store.save(&book, pair.public()).unwrap();
        let first = fs::read(store.key_path()).unwrap();
        store.save(&book, pair.public()).unwrap();
        let second = fs::read(store.key_path()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn flipped_body_byte_is_store_corrupt() {
        let dir = tempdir().unwrap();
        let store = ContactStore::new(dir.path());
        let pair = KeyPair::generate().unwrap();
        let (book, _) = sample_book();
        store.save(&book, pair.public()).unwrap();

        let mut body = fs::read(store.book_path()).unwrap();
        body[40] ^= 0x01;
        fs::write(store.book_path(), body).unwrap();

        assert!(matches!(
            store.load(pair.private()),
            Err(StoreError::StoreCorrupt)
        ));
        // The blobs are still on disk; overwriting them is the caller's
        // explicit decision.
        assert!(store.present());
    }

    #[test]
    fn corrupt_wrapped_key_is_store_corrupt() {
        let dir = tempdir().unwrap();
        let store = ContactStore::new(dir.path());
        let pair = KeyPair::generate().unwrap();
        let (book, _) = sample_book();
        store.save(&book, pair.public()).unwrap();

        let mut wrapped = fs::read(store.key_path()).unwrap();
        wrapped[10] ^= 0x01;
        fs::write(store.key_path(), wrapped).unwrap();

        assert!(matches!(
            store.load(pair.private()),
            Err(StoreError::StoreCorrupt)
        ));
    }

    #[test]
    fn foreign_private_key_is_store_corrupt() {
        let dir = tempdir().unwrap();
        let store = ContactStore::new(dir.path());
        let owner = KeyPair::generate().unwrap();
        let stranger = KeyPair::generate().unwrap();
        let (book, _) = sample_book();
        store.save(&book, owner.public()).unwrap();

        assert!(matches!(
            store.load(stranger.private()),
            Err(StoreError::StoreCorrupt)
        ));
    }
}
