//! TCP socket adapter for both node roles.
//!
//! ESP-IDF exposes BSD sockets through `std::net`, so the same code
//! serves the real firmware and the host: the sensor node opens a
//! fresh connection per exchange ([`UplinkSocket`]), the gateway wraps
//! each accepted connection in the same type ([`WireStream`] only).
//!
//! Reads are non-blocking (`WouldBlock` surfaces as `Ok(0)`) so the
//! cooperative loops can poll against their own deadlines; writes are
//! blocking but bounded by a socket write timeout.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::warn;

use crate::ports::{LinkError, UplinkSocket, WireStream};

/// Bound on the blocking connect/write calls.
const SOCKET_TIMEOUT: Duration = Duration::from_secs(3);

pub struct TcpSocketAdapter {
    peer: String,
    stream: Option<TcpStream>,
}

impl TcpSocketAdapter {
    /// A client socket that will dial `peer` (`host:port`) on
    /// [`UplinkSocket::open`].
    pub fn new(peer: &str) -> Self {
        Self {
            peer: peer.to_owned(),
            stream: None,
        }
    }

    /// Wrap an accepted gateway-side connection.
    pub fn from_stream(stream: TcpStream) -> Self {
        if stream.set_nonblocking(true).is_err() {
            warn!("Tcp: failed to set accepted stream non-blocking");
        }
        let _ = stream.set_write_timeout(Some(SOCKET_TIMEOUT));
        Self {
            peer: String::new(),
            stream: Some(stream),
        }
    }
}

impl WireStream for TcpSocketAdapter {
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(LinkError::NotConnected);
        };
        match stream.read(buf) {
            Ok(0) => Err(LinkError::Closed),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(_) => Err(LinkError::IoError),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(LinkError::NotConnected);
        };
        stream.write_all(data).map_err(|_| LinkError::IoError)?;
        stream.flush().map_err(|_| LinkError::IoError)
    }
}

impl UplinkSocket for TcpSocketAdapter {
    fn open(&mut self) -> Result<(), LinkError> {
        self.close();

        let addr = self
            .peer
            .to_socket_addrs()
            .map_err(|_| LinkError::ConnectFailed)?
            .next()
            .ok_or(LinkError::ConnectFailed)?;

        let stream =
            TcpStream::connect_timeout(&addr, SOCKET_TIMEOUT).map_err(|_| {
                warn!("Tcp: connect to {} failed", self.peer);
                LinkError::ConnectFailed
            })?;
        stream
            .set_nonblocking(true)
            .map_err(|_| LinkError::IoError)?;
        let _ = stream.set_write_timeout(Some(SOCKET_TIMEOUT));
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        self.stream = None; // drop closes the socket
    }
}
