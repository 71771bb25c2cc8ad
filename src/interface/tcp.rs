use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};

use tracing::{debug, trace, warn};

use super::{ByteChannel, drain_backlog};
use crate::constants::TCP_WRITE_WINDOW;
use crate::error::{GatewayError, GatewayResult};

/// Accepted network peer on a non-blocking socket.
///
/// std exposes neither the receive queue length nor the free send buffer
/// space, so read readiness comes from `peek` and write readiness is a fixed
/// window minus the bytes the kernel has not taken yet.
///
/// A peer that shuts down its write side only stops reads; writes keep
/// going until the socket reports a hard error.
pub struct TcpClient {
    stream: TcpStream,
    peer: SocketAddr,
    backlog: Vec<u8>,
    read_closed: bool,
    broken: bool,
}

impl TcpClient {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> GatewayResult<TcpClient> {
        stream.set_nonblocking(true).map_err(|e| {
            GatewayError::Communication(format!("Failed to make {} non-blocking: {}", peer, e))
        })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", peer, e);
        }

        Ok(TcpClient {
            stream,
            peer,
            backlog: Vec::new(),
            read_closed: false,
            broken: false,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Peer sent FIN; nothing more will be read
    pub fn is_read_closed(&self) -> bool {
        self.read_closed || self.broken
    }

    /// Socket failed; nothing moves in either direction from here on
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    fn mark_broken(&mut self, what: &str, e: &std::io::Error) {
        if !self.broken {
            warn!("Connection {} failed on {}, stalling: {}", self.peer, what, e);
            self.broken = true;
            self.backlog.clear();
        }
    }

    fn flush_backlog(&mut self) {
        if self.broken {
            return;
        }
        if let Err(e) = drain_backlog(&mut self.stream, &mut self.backlog) {
            self.mark_broken("write", &e);
        }
    }
}

impl ByteChannel for TcpClient {
    fn available(&mut self) -> GatewayResult<usize> {
        if self.is_read_closed() {
            return Ok(0);
        }

        let mut peeked = [0u8; TCP_WRITE_WINDOW];
        match self.stream.peek(&mut peeked) {
            Ok(0) => {
                debug!("Connection {} closed its write side", self.peer);
                self.read_closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(0),
            Err(e) => {
                self.mark_broken("peek", &e);
                Ok(0)
            }
        }
    }

    fn available_for_write(&mut self) -> GatewayResult<usize> {
        self.flush_backlog();
        if self.broken {
            return Ok(0);
        }
        Ok(TCP_WRITE_WINDOW.saturating_sub(self.backlog.len()))
    }

    fn read(&mut self, buf: &mut [u8]) -> GatewayResult<usize> {
        if self.is_read_closed() {
            return Ok(0);
        }

        match self.stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(0),
            Err(e) => {
                self.mark_broken("read", &e);
                Ok(0)
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> GatewayResult<()> {
        if self.broken {
            return Ok(());
        }

        self.backlog.extend_from_slice(bytes);
        self.flush_backlog();
        trace!(
            "Queued {} bytes for {}, {} pending",
            bytes.len(),
            self.peer,
            self.backlog.len()
        );
        Ok(())
    }
}

/// Bind a non-blocking listener
pub fn bind_listener(addr: SocketAddr) -> GatewayResult<TcpListener> {
    let listener = TcpListener::bind(addr)
        .map_err(|e| GatewayError::Configuration(format!("Failed to bind {}: {}", addr, e)))?;
    listener.set_nonblocking(true).map_err(|e| {
        GatewayError::Configuration(format!("Failed to make {} non-blocking: {}", addr, e))
    })?;
    Ok(listener)
}

/// Drain every pending connection and keep only the newest one
pub fn accept_latest(listener: &TcpListener) -> GatewayResult<Option<TcpClient>> {
    take_latest(|| listener.accept())?
        .map(|(stream, peer)| TcpClient::new(stream, peer))
        .transpose()
}

/// Call `accept` until it would block, keeping the last success. An error
/// after a success keeps that success; an error before one is returned.
fn take_latest<T, F>(mut accept: F) -> GatewayResult<Option<T>>
where
    F: FnMut() -> std::io::Result<T>,
{
    let mut latest = None;
    loop {
        match accept() {
            Ok(connection) => {
                if latest.replace(connection).is_some() {
                    debug!("Pending connection superseded before first tick");
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if latest.is_some() => {
                warn!("Accept failed, keeping the connection already taken: {}", e);
                break;
            }
            Err(e) => {
                return Err(GatewayError::Communication(format!(
                    "Failed to accept connection: {}",
                    e
                )));
            }
        }
    }
    Ok(latest)
}
