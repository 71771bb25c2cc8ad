use std::time::Duration;

pub const DEFAULT_DATA_PORT: u16 = 23;
pub const DEFAULT_CONTROL_PORT: u16 = 24;

/// Label buffer size including the NUL terminator
pub const LABEL_CAPACITY: usize = 64;

pub const PERSISTENT_REGION_SIZE: usize = 512;
pub(crate) const RECORD_OFFSET: usize = 0;
pub(crate) const LEGACY_RECORD_SIZE: usize = 80;
pub(crate) const RECORD_SIZE: usize = LEGACY_RECORD_SIZE + 4;
pub(crate) const RECORD_MAGIC: [u8; 2] = *b"SB";
pub(crate) const RECORD_VERSION: u8 = 1;
pub(crate) const ERASED_BYTE: u8 = 0xFF;

/// Anything below this baudrate is treated as an unprogrammed store at boot
pub const MIN_PLAUSIBLE_BAUDRATE: i32 = 300;

pub(crate) const SERIAL_TIMEOUT_MS: u64 = 1;
pub(crate) const SERIAL_TX_WINDOW: usize = 4096;
pub(crate) const TCP_WRITE_WINDOW: usize = 2048;

pub(crate) const PUMP_CHUNK_SIZE: usize = 256;
pub(crate) const PUMP_BUDGET_PER_TICK: usize = 4096;
pub(crate) const CONTROL_READ_CHUNK: usize = 256;
pub(crate) const CONTROL_LINE_LIMIT: usize = 1024;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_micros(500);

pub(crate) const CRLF: &[u8] = b"\r\n";
