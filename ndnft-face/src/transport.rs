//! Transport abstraction for the data-plane face.
//!
//! A transport moves opaque LP frames. The send and receive halves are
//! separate traits so the pipeline worker can own the send path while the
//! face receive thread owns the receive path; see the memif ring pair in
//! [`crate::memif`] and the Unix datagram transport below.

use std::os::unix::net::UnixDatagram;
use std::path::Path;

use ndnft_common::{Error, Result};

/// Send half of a transport. Send either accepts the whole frame or fails.
pub trait TransportTx: Send {
    fn send(&mut self, frame: &[u8]) -> Result<()>;
}

/// Receive half of a transport. `try_recv` never blocks; `Ok(None)` means
/// no frame is ready yet.
pub trait TransportRx: Send {
    fn try_recv(&mut self, dst: &mut [u8]) -> Result<Option<usize>>;
}

/* ---------------------------------------------------------------- *
 * Unix datagram transport
 * ---------------------------------------------------------------- */

pub struct UnixDatagramTx {
    socket: UnixDatagram,
}

pub struct UnixDatagramRx {
    socket: UnixDatagram,
}

impl TransportTx for UnixDatagramTx {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        match self.socket.send(frame) {
            Ok(n) if n == frame.len() => Ok(()),
            Ok(n) => Err(Error::Transport(format!(
                "short datagram send: {} of {} bytes",
                n,
                frame.len()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(Error::Transport("send queue full".into()))
            }
            Err(e) => Err(Error::Transport(format!("send failed: {}", e))),
        }
    }
}

impl TransportRx for UnixDatagramRx {
    fn try_recv(&mut self, dst: &mut [u8]) -> Result<Option<usize>> {
        match self.socket.recv(dst) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::Transport(format!("recv failed: {}", e))),
        }
    }
}

/// Connect a Unix datagram socket pair to the forwarder-side socket path
/// obtained from face management. `local_path` is this endpoint's address;
/// a stale socket file at that path is removed first.
pub fn unix_datagram_transport(
    local_path: impl AsRef<Path>,
    remote_path: impl AsRef<Path>,
) -> Result<(UnixDatagramTx, UnixDatagramRx)> {
    let local_path = local_path.as_ref();
    if local_path.exists() {
        std::fs::remove_file(local_path)?;
    }

    let socket = UnixDatagram::bind(local_path)?;
    socket.connect(remote_path.as_ref())?;
    socket.set_nonblocking(true)?;

    let tx = UnixDatagramTx {
        socket: socket.try_clone()?,
    };
    let rx = UnixDatagramRx { socket };
    Ok((tx, rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datagram_roundtrip_and_nonblocking_recv() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a.sock");
        let path_b = dir.path().join("b.sock");

        let (mut tx_a, _rx_a) = unix_datagram_transport(&path_a, &path_b).unwrap();
        let (_tx_b, mut rx_b) = unix_datagram_transport(&path_b, &path_a).unwrap();

        let mut buf = [0u8; 64];
        assert!(rx_b.try_recv(&mut buf).unwrap().is_none());

        tx_a.send(b"frame").unwrap();
        // Datagram delivery on a connected local socket is immediate
        let n = loop {
            if let Some(n) = rx_b.try_recv(&mut buf).unwrap() {
                break n;
            }
        };
        assert_eq!(&buf[..n], b"frame");
    }
}
