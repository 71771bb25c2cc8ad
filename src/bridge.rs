use tracing::{info, trace};

use crate::constants::{PUMP_BUDGET_PER_TICK, PUMP_CHUNK_SIZE};
use crate::error::GatewayResult;
use crate::interface::ByteChannel;

/// Bytes moved by one pump call
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    pub to_serial: usize,
    pub to_client: usize,
}

/// Byte pump between the single data-channel client and the serial line
pub struct DataBridge<C: ByteChannel> {
    client: Option<C>,
}

impl<C: ByteChannel> Default for DataBridge<C> {
    fn default() -> Self {
        DataBridge { client: None }
    }
}

impl<C: ByteChannel> DataBridge<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `client` the current peer. The previous one is handed back and
    /// never read from or written to again.
    pub fn attach(&mut self, client: C) -> Option<C> {
        let superseded = self.client.replace(client);
        if superseded.is_some() {
            info!("Data client superseded by a new connection");
        }
        superseded
    }

    #[cfg(test)]
    pub(crate) fn client(&self) -> Option<&C> {
        self.client.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn client_mut(&mut self) -> Option<&mut C> {
        self.client.as_mut()
    }

    /// Move whatever both sides are ready for, in both directions. A
    /// direction whose destination has no room is skipped until a later tick.
    pub fn pump<S: ByteChannel + ?Sized>(&mut self, serial: &mut S) -> GatewayResult<PumpStats> {
        let Some(client) = self.client.as_mut() else {
            return Ok(PumpStats::default());
        };

        let stats = PumpStats {
            to_serial: relay(client, serial)?,
            to_client: relay(serial, client)?,
        };

        if stats != PumpStats::default() {
            trace!(
                "Pumped {} bytes to serial, {} bytes to client",
                stats.to_serial, stats.to_client
            );
        }
        Ok(stats)
    }
}

/// Copy from `src` to `dst` while both are ready, bounded per tick
fn relay<A, B>(src: &mut A, dst: &mut B) -> GatewayResult<usize>
where
    A: ByteChannel + ?Sized,
    B: ByteChannel + ?Sized,
{
    let mut buf = [0u8; PUMP_CHUNK_SIZE];
    let mut moved = 0;

    while moved < PUMP_BUDGET_PER_TICK {
        let ready = src
            .available()?
            .min(dst.available_for_write()?)
            .min(PUMP_CHUNK_SIZE)
            .min(PUMP_BUDGET_PER_TICK - moved);
        if ready == 0 {
            break;
        }

        let n = src.read(&mut buf[..ready])?;
        if n == 0 {
            break;
        }
        dst.write(&buf[..n])?;
        moved += n;
    }

    Ok(moved)
}
