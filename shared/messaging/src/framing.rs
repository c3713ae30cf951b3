//! Length-prefixed message boundaries over a byte stream.
//!
//! Every logical message is preceded by a 2-byte little-endian header
//! giving the byte length of the payload that follows. The header is
//! unsigned, so payloads range from 0 to 65 535 bytes.

use std::io::{self, Read, Write};

/// Largest payload the 2-byte header can describe.
pub const MAX_FRAME: usize = u16::MAX as usize;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The peer closed the stream before a full header or payload arrived.
    #[error("connection lost")]
    ConnectionLost,
    /// The payload cannot be described by the length header.
    #[error("frame of {0} bytes exceeds the 65535-byte limit")]
    TooLarge(usize),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;

/// Write the length header followed by the payload, fully flushed.
pub fn send<S: Write>(sock: &mut S, message: &[u8]) -> Result<()> {
    if message.len() > MAX_FRAME {
        return Err(FrameError::TooLarge(message.len()));
    }
    sock.write_all(&(message.len() as u16).to_le_bytes())?;
    sock.write_all(message)?;
    sock.flush()?;
    Ok(())
}

/// Read one complete frame; never returns a short payload.
pub fn receive<S: Read>(sock: &mut S) -> Result<Vec<u8>> {
    let mut header = [0u8; 2];
    recvall(sock, &mut header)?;
    let len = u16::from_le_bytes(header) as usize;

    let mut payload = vec![0u8; len];
    recvall(sock, &mut payload)?;
    Ok(payload)
}

/// Fill `buf` exactly from repeated reads; EOF first is a lost connection.
fn recvall<S: Read>(sock: &mut S, buf: &mut [u8]) -> Result<()> {
    sock.read_exact(buf).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::ConnectionLost
        } else {
            FrameError::Io(err)
        }
    })
}
