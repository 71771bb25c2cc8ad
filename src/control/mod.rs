pub mod command;

use tracing::{error, info, warn};

use crate::apply_settings;
use crate::constants::{CONTROL_LINE_LIMIT, CONTROL_READ_CHUNK};
use crate::error::GatewayResult;
use crate::interface::{ByteChannel, SerialLine};
use crate::settings::Settings;
use crate::store::{PersistentRegion, SettingsStore};
use command::{execute, reply};

/// What one control poll did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControlStats {
    pub commands: usize,
    pub reopens: usize,
}

/// Line accumulator and dispatcher for the control connection.
///
/// Bytes are collected until `\n`, `\r` is dropped, and each completed
/// line is executed before the next byte is looked at.
pub struct ControlSession<C: ByteChannel> {
    client: Option<C>,
    line: Vec<u8>,
}

impl<C: ByteChannel> Default for ControlSession<C> {
    fn default() -> Self {
        ControlSession {
            client: None,
            line: Vec::new(),
        }
    }
}

impl<C: ByteChannel> ControlSession<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `client` the control peer and forget any half-received line
    pub fn attach(&mut self, client: C) -> Option<C> {
        self.line.clear();
        let superseded = self.client.replace(client);
        if superseded.is_some() {
            info!("Control client superseded by a new connection");
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

    #[cfg(test)]
    pub(crate) fn pending_line(&self) -> &[u8] {
        &self.line
    }

    /// Read what the client has sent and run every completed line. A
    /// settings change reopens the serial line before this returns.
    pub fn poll<R, S>(
        &mut self,
        settings: &mut Settings,
        store: &mut SettingsStore<R>,
        serial: &mut S,
    ) -> GatewayResult<ControlStats>
    where
        R: PersistentRegion,
        S: SerialLine + ?Sized,
    {
        let mut stats = ControlStats::default();
        let Some(client) = self.client.as_mut() else {
            return Ok(stats);
        };

        let ready = client.available()?.min(CONTROL_READ_CHUNK);
        if ready == 0 {
            return Ok(stats);
        }
        let mut buf = [0u8; CONTROL_READ_CHUNK];
        let n = client.read(&mut buf[..ready])?;

        for &byte in &buf[..n] {
            match byte {
                b'\n' => {
                    let line = std::mem::take(&mut self.line);
                    let mut out = Vec::new();
                    let changed = match execute(&line, settings, store, &mut out) {
                        Ok(changed) => changed,
                        Err(e) => {
                            error!("Control command failed: {}", e);
                            false
                        }
                    };
                    stats.commands += 1;

                    if changed {
                        apply_settings(serial, settings);
                        stats.reopens += 1;
                        reply(&mut out, b"Settings changed:");
                        reply(&mut out, &settings.to_csv());
                    }
                    if !out.is_empty() {
                        client.write(&out)?;
                    }
                }
                b'\r' => {}
                _ if self.line.len() >= CONTROL_LINE_LIMIT => {
                    warn!("Control line exceeds {} bytes, dropping input", CONTROL_LINE_LIMIT);
                }
                _ => self.line.push(byte),
            }
        }

        Ok(stats)
    }
}
