//! Wire protocol and address-book model shared across sidewinder crates.
//!
//! [`framing`] draws message boundaries on a byte stream, [`session`]
//! runs the one-shot hybrid exchange on top of it, and [`contacts`] holds
//! the in-memory address book the node crate persists.

pub mod contacts;
pub mod framing;
pub mod session;

pub use contacts::{Contact, ContactBook, ContactId, Message};
pub use session::{Inbound, SessionError, DEFAULT_PORT};
