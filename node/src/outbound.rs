//! Initiator side of a conversation: dial a contact and deliver one
//! signed message, then record it in the outbound history.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};

use sidewinder_crypto_core::Fingerprint;
use sidewinder_messaging::{session, ContactId, Message, SessionError};
use tracing::{debug, warn};

use crate::contact_store::StoreError;
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The peer did not accept the connection within the timeout.
    #[error("peer unreachable")]
    PeerUnreachable,
    /// The contact's stored address is not a usable IPv4 address.
    #[error("contact address {0:?} is invalid")]
    BadAddress(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Outcome of a successful send.
pub struct Delivery {
    /// False when the taint guard kept the outbound entry in memory only.
    pub persisted: bool,
}

/// Open a one-shot session to the contact and transmit `text`.
///
/// Nothing is persisted unless the peer authenticated and accepted the
/// whole payload.
pub fn send_to_contact(
    state: &AppState,
    id: ContactId,
    ip: &str,
    expected: &Fingerprint,
    text: &str,
) -> Result<Delivery, SendError> {
    let ip_addr: Ipv4Addr = ip
        .parse()
        .map_err(|_| SendError::BadAddress(ip.to_string()))?;
    let addr = SocketAddr::from((ip_addr, state.config().listen_port));

    let mut stream = TcpStream::connect_timeout(&addr, state.config().connect_timeout)
        .map_err(|_| SendError::PeerUnreachable)?;
    stream.set_read_timeout(Some(state.config().read_timeout))?;
    stream.set_write_timeout(Some(state.config().read_timeout))?;
    debug!(%addr, "connected to peer");

    match session::transmit(&mut stream, state.keys(), expected, text.as_bytes()) {
        Ok(()) => {}
        Err(SessionError::PeerUnauthenticated) => {
            warn!(%addr, "peer failed authentication during send");
            return Err(SessionError::PeerUnauthenticated.into());
        }
        Err(err) => return Err(err.into()),
    }

    let persisted = state.append_and_save(id, Message::now(false, text))?;
    Ok(Delivery { persisted })
}
