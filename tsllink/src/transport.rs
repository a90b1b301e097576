//! Frame transports
//!
//! TSL 3.1 is fire-and-forget: one datagram per frame, no retry, no
//! acknowledgement.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tslcore::{Frame, TslError, TslResult, FRAME_LEN};

/// Sink for encoded frames
pub trait Transport: Send {
    /// Send one frame to `host:port`
    fn send(&mut self, host: &str, port: u16, frame: &Frame) -> TslResult<()>;
}

/// Connectionless UDP transport
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Create a transport on an OS-assigned local port
    pub fn new(write_timeout: Duration) -> TslResult<Self> {
        Self::bind("0.0.0.0:0", write_timeout)
    }

    /// Create a transport bound to a specific local address
    pub fn bind(local_addr: &str, write_timeout: Duration) -> TslResult<Self> {
        let socket = UdpSocket::bind(local_addr)?;
        socket.set_nonblocking(false)?;
        if !write_timeout.is_zero() {
            socket.set_write_timeout(Some(write_timeout))?;
        }
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> TslResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    fn resolve(&self, host: &str, port: u16) -> TslResult<SocketAddr> {
        let want_v4 = self.socket.local_addr().map(|a| a.is_ipv4()).unwrap_or(true);
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| TslError::TransportFailure(format!("Cannot resolve {}: {}", host, e)))?
            .collect();

        addrs
            .iter()
            .find(|a| a.is_ipv4() == want_v4)
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| TslError::TransportFailure(format!("No address for {}", host)))
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, host: &str, port: u16, frame: &Frame) -> TslResult<()> {
        let addr = self.resolve(host, port)?;
        let sent = self
            .socket
            .send_to(frame, addr)
            .map_err(|e| TslError::TransportFailure(format!("send to {}: {}", addr, e)))?;
        if sent != FRAME_LEN {
            return Err(TslError::TransportFailure(format!(
                "short send to {}: {} of {} bytes",
                addr, sent, FRAME_LEN
            )));
        }
        Ok(())
    }
}
