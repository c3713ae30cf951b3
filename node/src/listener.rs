//! Background responder: accepts inbound sessions and routes their
//! payloads into the address book.
//!
//! One accept loop, one handler thread per connection. Handlers share
//! the application state; book mutations and the save that follows
//! happen under the book mutex. The command loop learns about inbound
//! traffic through [`InboundEvent`]s drained between prompts.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use sidewinder_crypto_core::Fingerprint;
use sidewinder_messaging::{session, Message, SessionError};
use tracing::{debug, warn};

use crate::state::{AppState, PendingInbound};

/// Events surfaced to the command loop between prompts.
#[derive(Debug)]
pub enum InboundEvent {
    /// A trusted contact's message was appended to history.
    MessageReceived {
        contact_name: String,
        /// False when the taint guard kept the append in memory only.
        persisted: bool,
    },
    /// A peer outside the address book (or one without a recorded
    /// fingerprint) delivered a message; it is held as pending.
    UnknownPeer { ip: String, fingerprint: Fingerprint },
    /// A peer presented a key that contradicts the stored fingerprint,
    /// or failed the protocol's signature checks.
    Unauthenticated { ip: String },
}

pub struct Listener {
    port: u16,
    running: Arc<AtomicBool>,
}

impl Listener {
    /// Bind the configured port and start the accept loop.
    pub fn start(
        state: Arc<AppState>,
        events: mpsc::Sender<InboundEvent>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", state.config().listen_port))?;
        let port = listener.local_addr()?.port();
        let running = Arc::new(AtomicBool::new(true));
        let running_accept = Arc::clone(&running);

        thread::spawn(move || {
            while running_accept.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, addr)) => {
                        let state = Arc::clone(&state);
                        let events = events.clone();
                        thread::spawn(move || {
                            if let Err(err) = handle_peer(stream, addr, &state, &events) {
                                debug!(%addr, %err, "inbound session failed");
                            }
                        });
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self { port, running })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

fn handle_peer(
    mut stream: TcpStream,
    addr: SocketAddr,
    state: &AppState,
    events: &mpsc::Sender<InboundEvent>,
) -> anyhow::Result<()> {
    stream.set_read_timeout(Some(state.config().read_timeout))?;
    stream.set_write_timeout(Some(state.config().read_timeout))?;

    let inbound = match session::respond(&mut stream, state.keys()) {
        Ok(inbound) => inbound,
        Err(SessionError::PeerUnauthenticated) => {
            warn!(%addr, "inbound peer failed authentication");
            let _ = events.send(InboundEvent::Unauthenticated {
                ip: addr.ip().to_string(),
            });
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let ip = addr.ip().to_string();
    let fingerprint = Fingerprint::from_public_key(&inbound.peer_public)
        .map_err(|err| anyhow::anyhow!("fingerprinting peer key failed: {err}"))?;
    let contents = String::from_utf8(inbound.payload)
        .map_err(|_| anyhow::anyhow!("peer sent a non-UTF-8 payload"))?;
    let message = Message::now(true, contents);

    // Trust decision: the presented key must match the fingerprint the
    // address book stores for this address.
    let known = {
        let book = state.lock_book();
        book.find_by_ip(&ip).map(|contact| {
            (
                contact.id,
                contact.name.clone(),
                contact.fingerprint.clone(),
            )
        })
    };

    match known {
        Some((id, name, Some(expected))) if expected.matches(&fingerprint) => {
            let persisted = state
                .append_and_save(id, message)
                .map_err(|err| anyhow::anyhow!("persisting inbound message failed: {err}"))?;
            debug!(%addr, contact = %name, "inbound message appended");
            let _ = events.send(InboundEvent::MessageReceived {
                contact_name: name,
                persisted,
            });
        }
        Some((_, name, Some(_))) => {
            warn!(%addr, contact = %name, "presented key contradicts the stored fingerprint");
            let _ = events.send(InboundEvent::Unauthenticated { ip });
        }
        _ => {
            // No contact for this address, or no trust anchor recorded:
            // hold the message until the user records the fingerprint.
            state.push_pending(PendingInbound {
                ip: ip.clone(),
                fingerprint: fingerprint.clone(),
                message,
            });
            debug!(%addr, "message from unknown peer held as pending");
            let _ = events.send(InboundEvent::UnknownPeer { ip, fingerprint });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::contact_store::ContactStore;
    use crate::outbound::{self, SendError};
    use crate::state::AppState;
    use sidewinder_crypto_core::KeyPair;
    use sidewinder_messaging::{Contact, ContactBook};
    use std::path::Path;
    use std::time::Duration;

    fn test_config(dir: &Path, listen_port: u16) -> AppConfig {
        AppConfig {
            data_dir: dir.to_path_buf(),
            listen_port,
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(5),
        }
    }

    fn endpoint(dir: &Path, listen_port: u16) -> Arc<AppState> {
        let config = test_config(dir, listen_port);
        let keys = KeyPair::generate().unwrap();
        let store = ContactStore::new(config.contact_dir());
        AppState::new(config, keys, store, ContactBook::new(), false)
    }

    fn wait_for_event(rx: &mpsc::Receiver<InboundEvent>) -> InboundEvent {
        rx.recv_timeout(Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn happy_send_appends_and_persists_on_both_sides() {
        let alice_dir = tempfile::tempdir().unwrap();
        let bob_dir = tempfile::tempdir().unwrap();

        let bob = endpoint(bob_dir.path(), 0);
        let (bob_events, bob_rx) = mpsc::channel();
        let bob_listener = Listener::start(Arc::clone(&bob), bob_events).unwrap();

        let alice = endpoint(alice_dir.path(), bob_listener.port());
        let alice_fp = alice.keys().fingerprint().unwrap();
        let bob_fp = bob.keys().fingerprint().unwrap();

        // Each side knows the other by fingerprint.
        let bob_entry = Contact::new("bob", "127.0.0.1", Some(bob_fp));
        let bob_id = bob_entry.id;
        alice.upsert_and_save(bob_entry).unwrap();
        bob.upsert_and_save(Contact::new("alice", "127.0.0.1", Some(alice_fp)))
            .unwrap();

        let delivery =
            outbound::send_to_contact(&alice, bob_id, "127.0.0.1", &bob.keys().fingerprint().unwrap(), "hello")
                .unwrap();
        assert!(delivery.persisted);

        match wait_for_event(&bob_rx) {
            InboundEvent::MessageReceived {
                contact_name,
                persisted,
            } => {
                assert_eq!(contact_name, "alice");
                assert!(persisted);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // Bob's history has the inbound entry, persisted and reloadable.
        let bob_book = bob.lock_book();
        let received = &bob_book.find_by_name("alice").unwrap().messages;
        assert_eq!(received.len(), 1);
        assert!(received[0].received);
        assert_eq!(received[0].contents, "hello");
        drop(bob_book);

        let reloaded = ContactStore::new(bob.config().contact_dir())
            .load(bob.keys().private())
            .unwrap();
        assert_eq!(reloaded.find_by_name("alice").unwrap().messages.len(), 1);

        // Alice recorded the outbound entry.
        let alice_book = alice.lock_book();
        let sent = &alice_book.get(bob_id).unwrap().messages;
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].received);
    }

    #[test]
    fn wrong_fingerprint_aborts_without_append() {
        let alice_dir = tempfile::tempdir().unwrap();
        let bob_dir = tempfile::tempdir().unwrap();

        let bob = endpoint(bob_dir.path(), 0);
        let (bob_events, bob_rx) = mpsc::channel();
        let bob_listener = Listener::start(Arc::clone(&bob), bob_events).unwrap();

        let alice = endpoint(alice_dir.path(), bob_listener.port());
        let wrong_fp = KeyPair::generate().unwrap().fingerprint().unwrap();
        let bob_entry = Contact::new("bob", "127.0.0.1", Some(wrong_fp.clone()));
        let bob_id = bob_entry.id;
        alice.upsert_and_save(bob_entry).unwrap();

        let result = outbound::send_to_contact(&alice, bob_id, "127.0.0.1", &wrong_fp, "hello");
        assert!(matches!(
            result,
            Err(SendError::Session(SessionError::PeerUnauthenticated))
        ));

        // Nothing was appended on either side.
        assert!(alice.lock_book().get(bob_id).unwrap().messages.is_empty());
        assert!(bob.lock_book().is_empty());
        drop(bob_rx);
    }

    #[test]
    fn unknown_peer_is_held_pending_until_added() {
        let alice_dir = tempfile::tempdir().unwrap();
        let bob_dir = tempfile::tempdir().unwrap();

        let bob = endpoint(bob_dir.path(), 0);
        let (bob_events, bob_rx) = mpsc::channel();
        let bob_listener = Listener::start(Arc::clone(&bob), bob_events).unwrap();

        let alice = endpoint(alice_dir.path(), bob_listener.port());
        let alice_fp = alice.keys().fingerprint().unwrap();
        let bob_fp = bob.keys().fingerprint().unwrap();
        let bob_entry = Contact::new("bob", "127.0.0.1", Some(bob_fp.clone()));
        let bob_id = bob_entry.id;
        alice.upsert_and_save(bob_entry).unwrap();

        // Bob has never heard of Alice; the message must not enter his
        // history, only the pending queue.
        outbound::send_to_contact(&alice, bob_id, "127.0.0.1", &bob_fp, "knock knock").unwrap();

        match wait_for_event(&bob_rx) {
            InboundEvent::UnknownPeer { ip, fingerprint } => {
                assert_eq!(ip, "127.0.0.1");
                assert!(fingerprint.matches(&alice_fp));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(bob.lock_book().is_empty());
        assert_eq!(bob.pending_count(), 1);

        // Recording the contact with the matching fingerprint releases
        // the held message.
        let released = bob.take_pending_for("127.0.0.1", &alice_fp);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].message.contents, "knock knock");
        assert_eq!(bob.pending_count(), 0);
    }
}
