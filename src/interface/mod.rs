pub mod serialport;
pub mod tcp;

use std::io::{ErrorKind, Write};

use crate::codec::SerialConfig;
use crate::error::GatewayResult;

/// Non-blocking byte endpoint. Callers check readiness first and never ask
/// for more than the endpoint reported.
pub trait ByteChannel {
    /// Bytes that can be read right now without blocking
    fn available(&mut self) -> GatewayResult<usize>;

    /// Bytes that can be written right now without blocking
    fn available_for_write(&mut self) -> GatewayResult<usize>;

    /// Read up to `buf.len()` bytes, returns how many were read
    fn read(&mut self, buf: &mut [u8]) -> GatewayResult<usize>;

    /// Hand all of `bytes` to the endpoint
    fn write(&mut self, bytes: &[u8]) -> GatewayResult<()>;
}

/// The hardware serial line shared between the bridge and the control channel
pub trait SerialLine: ByteChannel {
    /// Close the line and open it again with new parameters. On failure the
    /// line stays closed and reports no readiness.
    fn reopen(&mut self, baudrate: i32, config: SerialConfig) -> GatewayResult<()>;

    /// Whether the last reopen succeeded and no hard error closed it since
    fn is_open(&self) -> bool;
}

/// Push as much of `backlog` into `writer` as it takes right now. Timeouts,
/// `WouldBlock` and short writes leave the rest queued; only hard errors are
/// returned.
pub(crate) fn drain_backlog<W: Write + ?Sized>(
    writer: &mut W,
    backlog: &mut Vec<u8>,
) -> std::io::Result<()> {
    while !backlog.is_empty() {
        match writer.write(backlog) {
            Ok(0) => break,
            Ok(n) => {
                backlog.drain(..n);
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts `room` bytes, then times out like a full UART FIFO
    struct SlowWriter {
        accepted: Vec<u8>,
        room: usize,
        hard_error: bool,
    }

    impl Write for SlowWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.hard_error {
                return Err(std::io::Error::new(ErrorKind::BrokenPipe, "unplugged"));
            }
            if self.room == 0 {
                return Err(std::io::Error::new(ErrorKind::TimedOut, "fifo full"));
            }
            let n = buf.len().min(self.room).min(3);
            self.room -= n;
            self.accepted.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn timeout_keeps_unwritten_bytes_queued() {
        let mut writer = SlowWriter {
            accepted: Vec::new(),
            room: 5,
            hard_error: false,
        };
        let mut backlog = b"ABCDEFGH".to_vec();

        drain_backlog(&mut writer, &mut backlog).unwrap();
        assert_eq!(writer.accepted, b"ABCDE");
        assert_eq!(backlog, b"FGH");

        writer.room = 10;
        drain_backlog(&mut writer, &mut backlog).unwrap();
        assert_eq!(writer.accepted, b"ABCDEFGH");
        assert!(backlog.is_empty());
    }

    #[test]
    fn hard_error_is_reported() {
        let mut writer = SlowWriter {
            accepted: Vec::new(),
            room: 5,
            hard_error: true,
        };
        let mut backlog = b"AB".to_vec();
        assert!(drain_backlog(&mut writer, &mut backlog).is_err());
        assert_eq!(backlog, b"AB");
    }
}
