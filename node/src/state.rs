//! Shared runtime state: the logged-in identity, the mutex-guarded
//! address book, and messages held back from untrusted peers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sidewinder_crypto_core::{Fingerprint, KeyPair};
use sidewinder_messaging::{Contact, ContactBook, ContactId, Message};

use crate::config::AppConfig;
use crate::contact_store::{ContactStore, StoreError};

/// A message that arrived from a peer the address book does not trust
/// yet. Held in memory only; released once a contact with the matching
/// fingerprint exists.
#[derive(Debug, Clone)]
pub struct PendingInbound {
    pub ip: String,
    pub fingerprint: Fingerprint,
    pub message: Message,
}

pub struct AppState {
    config: AppConfig,
    keys: KeyPair,
    store: ContactStore,
    book: Mutex<ContactBook>,
    pending: Mutex<Vec<PendingInbound>>,
    /// Set when the on-disk store failed to load. While set, saves are
    /// skipped so the unreadable blobs survive until the user explicitly
    /// agrees to overwrite them.
    store_tainted: AtomicBool,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        keys: KeyPair,
        store: ContactStore,
        book: ContactBook,
        store_tainted: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            keys,
            store,
            book: Mutex::new(book),
            pending: Mutex::new(Vec::new()),
            store_tainted: AtomicBool::new(store_tainted),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    pub fn lock_book(&self) -> MutexGuard<'_, ContactBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store_tainted(&self) -> bool {
        self.store_tainted.load(Ordering::Relaxed)
    }

    pub fn clear_store_taint(&self) {
        self.store_tainted.store(false, Ordering::Relaxed);
    }

    /// Persist the book unless the taint guard is armed. Returns whether
    /// a save actually happened; callers surface a skipped save to the
    /// user.
    pub fn save_book(&self) -> Result<bool, StoreError> {
        let book = self.lock_book();
        if self.store_tainted() {
            return Ok(false);
        }
        self.store.save(&book, self.keys.public())?;
        Ok(true)
    }

    /// Overwrite the store even when tainted; only called after the user
    /// confirmed the loss of the unreadable blobs.
    pub fn force_save_book(&self) -> Result<(), StoreError> {
        let book = self.lock_book();
        self.store.save(&book, self.keys.public())?;
        self.clear_store_taint();
        Ok(())
    }

    /// Append to a contact's history and persist while the lock is held,
    /// so concurrent handlers cannot lose each other's updates. Returns
    /// whether the store was written.
    pub fn append_and_save(&self, id: ContactId, message: Message) -> Result<bool, StoreError> {
        let mut book = self.lock_book();
        book.append_message(id, message);
        if self.store_tainted() {
            return Ok(false);
        }
        self.store.save(&book, self.keys.public())?;
        Ok(true)
    }

    /// Insert or replace a contact and persist under the same lock.
    pub fn upsert_and_save(&self, contact: Contact) -> Result<bool, StoreError> {
        let mut book = self.lock_book();
        book.upsert(contact);
        if self.store_tainted() {
            return Ok(false);
        }
        self.store.save(&book, self.keys.public())?;
        Ok(true)
    }

    pub fn push_pending(&self, inbound: PendingInbound) {
        self.lock_pending().push(inbound);
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Remove and return held messages from `ip` whose sender key matches
    /// `fingerprint`.
    pub fn take_pending_for(&self, ip: &str, fingerprint: &Fingerprint) -> Vec<PendingInbound> {
        let mut pending = self.lock_pending();
        let mut released = Vec::new();
        let mut index = 0;
        while index < pending.len() {
            if pending[index].ip == ip && pending[index].fingerprint.matches(fingerprint) {
                released.push(pending.remove(index));
            } else {
                index += 1;
            }
        }
        released
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<PendingInbound>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
