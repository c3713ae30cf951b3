//! The in-memory address book: contacts keyed by an opaque id, each
//! holding an ordered message history.
//!
//! Persistence is the node crate's concern; everything here is pure
//! in-memory mutation.

use chrono::Local;
use serde::{Deserialize, Serialize};
use sidewinder_crypto_core::Fingerprint;
use std::collections::HashMap;
use uuid::Uuid;

/// Stable opaque key of an address-book entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(pub Uuid);

impl ContactId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContactId {
    fn default() -> Self {
        Self::new()
    }
}

/// One conversation entry; appended in local wall-clock order, never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Local wall-clock time at append.
    pub time: String,
    /// True for inbound messages. Stores written by older releases spell
    /// this field `recieved`; both spellings are accepted on read and the
    /// correct one is written back.
    #[serde(alias = "recieved")]
    pub received: bool,
    pub contents: String,
}

impl Message {
    /// Stamp a message with the local wall clock.
    pub fn now(received: bool, contents: impl Into<String>) -> Self {
        Self {
            time: Local::now().format("%Y-%m-%d %H:%M").to_string(),
            received,
            contents: contents.into(),
        }
    }
}

/// An address-book entry.
///
/// `fingerprint`, when present, is the authoritative trust anchor for the
/// peer at `ip`; a contact without one cannot send or receive until the
/// user records a fingerprint out-of-band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    /// Dotted-quad IPv4 address of the peer.
    pub ip: String,
    #[serde(default)]
    pub fingerprint: Option<Fingerprint>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Contact {
    pub fn new(
        name: impl Into<String>,
        ip: impl Into<String>,
        fingerprint: Option<Fingerprint>,
    ) -> Self {
        Self {
            id: ContactId::new(),
            name: name.into(),
            ip: ip.into(),
            fingerprint,
            messages: Vec::new(),
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// The whole address book, contact id to contact. Iteration order carries
/// no meaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactBook {
    contacts: HashMap<ContactId, Contact>,
}

impl ContactBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn get(&self, id: ContactId) -> Option<&Contact> {
        self.contacts.get(&id)
    }

    /// Insert or replace a contact. Ids are the identity; names may
    /// collide.
    pub fn upsert(&mut self, contact: Contact) {
        self.contacts.insert(contact.id, contact);
    }

    /// Append to a contact's history; false when the id is unknown.
    pub fn append_message(&mut self, id: ContactId, message: Message) -> bool {
        match self.contacts.get_mut(&id) {
            Some(contact) => {
                contact.messages.push(message);
                true
            }
            None => false,
        }
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Contact> {
        self.contacts.values().find(|c| c.name == name)
    }

    pub fn find_by_ip(&self, ip: &str) -> Option<&Contact> {
        self.contacts.values().find(|c| c.ip == ip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_and_lookup() {
        let mut book = ContactBook::new();
        let contact = Contact::new("alice", "10.0.0.2", None);
        let id = contact.id;
        book.upsert(contact);

        assert_eq!(book.len(), 1);
        assert_eq!(book.get(id).unwrap().name, "alice");
        assert_eq!(book.find_by_name("alice").unwrap().id, id);
        assert_eq!(book.find_by_ip("10.0.0.2").unwrap().id, id);
        assert!(book.find_by_name("bob").is_none());
    }

    #[test]
    fn upsert_replaces_by_id() {
        let mut book = ContactBook::new();
        let mut contact = Contact::new("alice", "10.0.0.2", None);
        let id = contact.id;
        book.upsert(contact.clone());

        contact.ip = "10.0.0.9".to_string();
        book.upsert(contact);

        assert_eq!(book.len(), 1);
        assert_eq!(book.get(id).unwrap().ip, "10.0.0.9");
    }

    #[test]
    fn append_message_preserves_order() {
        let mut book = ContactBook::new();
        let contact = Contact::new("alice", "10.0.0.2", None);
        let id = contact.id;
        book.upsert(contact);

        assert!(book.append_message(id, Message::now(false, "hi")));
        assert!(book.append_message(id, Message::now(true, "hello back")));
        assert!(!book.append_message(ContactId::new(), Message::now(true, "lost")));

        let messages = &book.get(id).unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].contents, "hi");
        assert!(!messages[0].received);
        assert!(messages[1].received);
    }

    #[test]
    fn book_json_roundtrips() {
        let mut book = ContactBook::new();
        let contact = Contact::new("alice", "10.0.0.2", None);
        let id = contact.id;
        book.upsert(contact);
        book.append_message(id, Message::now(true, "hello"));

        let json = serde_json::to_vec(&book).unwrap();
        let parsed: ContactBook = serde_json::from_slice(&json).unwrap();
        assert_eq!(parsed, book);
    }

    #[test]
    fn legacy_recieved_spelling_is_accepted_and_migrated() {
        let legacy = r#"{"time":"2020-01-01 10:00","recieved":true,"contents":"hi"}"#;
        let message: Message = serde_json::from_str(legacy).unwrap();
        assert!(message.received);

        let rewritten = serde_json::to_string(&message).unwrap();
        assert!(rewritten.contains("\"received\""));
        assert!(!rewritten.contains("\"recieved\""));
    }
}
