pub mod file;

use tracing::{debug, info, warn};

use crate::constants::{
    ERASED_BYTE, LABEL_CAPACITY, LEGACY_RECORD_SIZE, PERSISTENT_REGION_SIZE, RECORD_MAGIC,
    RECORD_OFFSET, RECORD_SIZE, RECORD_VERSION,
};
use crate::error::{GatewayError, GatewayResult};
use crate::settings::{Label, Settings};

pub use file::FileRegion;

/// Byte-addressable persistent storage, EEPROM style: writes land in a
/// staging image and only become durable on `commit`.
pub trait PersistentRegion {
    /// Fill `buf` from `offset`
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> GatewayResult<()>;

    /// Stage `bytes` at `offset`
    fn write(&mut self, offset: usize, bytes: &[u8]) -> GatewayResult<()>;

    /// Make all staged writes durable
    fn commit(&mut self) -> GatewayResult<()>;
}

pub(crate) fn check_bounds(size: usize, offset: usize, len: usize) -> GatewayResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(GatewayError::Storage(format!(
            "Access of {} bytes at offset {} exceeds region of {} bytes",
            len, offset, size
        ))),
    }
}

/// Region that lives only as long as the process
pub struct MemoryRegion {
    image: Vec<u8>,
    commits: usize,
}

impl MemoryRegion {
    pub fn new() -> Self {
        Self::with_image(vec![ERASED_BYTE; PERSISTENT_REGION_SIZE])
    }

    pub fn with_image(image: Vec<u8>) -> Self {
        MemoryRegion { image, commits: 0 }
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn commits(&self) -> usize {
        self.commits
    }
}

impl Default for MemoryRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistentRegion for MemoryRegion {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> GatewayResult<()> {
        check_bounds(self.image.len(), offset, buf.len())?;
        buf.copy_from_slice(&self.image[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> GatewayResult<()> {
        check_bounds(self.image.len(), offset, bytes.len())?;
        self.image[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn commit(&mut self) -> GatewayResult<()> {
        self.commits += 1;
        Ok(())
    }
}

/// Which shape a stored record had when it was read back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLayout {
    /// Bare 80-byte record without the schema trailer
    Legacy,
    /// Record followed by a schema trailer carrying this version
    Versioned(u8),
}

// Record layout, little endian:
//   0..64   label, NUL terminated
//  64..68   baudrate
//  68       parity
//  69..72   padding
//  72..76   wordlength
//  76..80   stopbits
//  80..82   magic "SB"
//  82       schema version
//  83       reserved
const BAUDRATE_AT: usize = 64;
const PARITY_AT: usize = 68;
const WORDLENGTH_AT: usize = 72;
const STOPBITS_AT: usize = 76;
const MAGIC_AT: usize = LEGACY_RECORD_SIZE;
const VERSION_AT: usize = LEGACY_RECORD_SIZE + 2;

pub fn encode_record(settings: &Settings) -> [u8; RECORD_SIZE] {
    let mut record = [0u8; RECORD_SIZE];

    let label = settings.label.as_bytes();
    record[..label.len()].copy_from_slice(label);
    record[BAUDRATE_AT..BAUDRATE_AT + 4].copy_from_slice(&settings.baudrate.to_le_bytes());
    record[PARITY_AT] = settings.parity;
    record[WORDLENGTH_AT..WORDLENGTH_AT + 4].copy_from_slice(&settings.wordlength.to_le_bytes());
    record[STOPBITS_AT..STOPBITS_AT + 4].copy_from_slice(&settings.stopbits.to_le_bytes());

    record[MAGIC_AT..MAGIC_AT + 2].copy_from_slice(&RECORD_MAGIC);
    record[VERSION_AT] = RECORD_VERSION;

    record
}

/// Decode a record. Every layout shares the legacy block, so the trailer
/// only tells which writer produced it.
pub fn decode_record(record: &[u8; RECORD_SIZE]) -> (Settings, RecordLayout) {
    let read_i32 = |at: usize| {
        i32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]])
    };

    let settings = Settings {
        label: Label::new(&record[..LABEL_CAPACITY]),
        baudrate: read_i32(BAUDRATE_AT),
        parity: record[PARITY_AT],
        wordlength: read_i32(WORDLENGTH_AT),
        stopbits: read_i32(STOPBITS_AT),
    };

    let layout = if record[MAGIC_AT..MAGIC_AT + 2] == RECORD_MAGIC {
        RecordLayout::Versioned(record[VERSION_AT])
    } else {
        RecordLayout::Legacy
    };

    (settings, layout)
}

pub struct SettingsStore<R: PersistentRegion> {
    region: R,
}

impl<R: PersistentRegion> SettingsStore<R> {
    pub fn new(region: R) -> Self {
        SettingsStore { region }
    }

    pub fn region(&self) -> &R {
        &self.region
    }

    pub fn load(&mut self) -> GatewayResult<Settings> {
        let mut record = [0u8; RECORD_SIZE];
        self.region.read(RECORD_OFFSET, &mut record)?;

        let (settings, layout) = decode_record(&record);
        match layout {
            RecordLayout::Versioned(RECORD_VERSION) => {}
            RecordLayout::Versioned(version) => warn!(
                "Stored settings carry unknown schema version {}, reading legacy block",
                version
            ),
            RecordLayout::Legacy => debug!("Stored settings use the legacy layout"),
        }

        debug!("Loaded settings: {}", settings);
        Ok(settings)
    }

    pub fn save(&mut self, settings: &Settings) -> GatewayResult<()> {
        self.region.write(RECORD_OFFSET, &encode_record(settings))?;
        self.region.commit()?;
        debug!("Saved settings: {}", settings);
        Ok(())
    }

    /// Load the stored settings, replacing them with defaults first if the
    /// stored baudrate is implausible.
    pub fn boot_repair(&mut self) -> GatewayResult<Settings> {
        let settings = self.load()?;
        if settings.is_plausible() {
            return Ok(settings);
        }

        info!(
            "Stored baudrate {} is implausible, restoring default settings",
            settings.baudrate
        );
        self.save(&Settings::default())?;
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_image(settings: &Settings) -> Vec<u8> {
        let mut image = vec![ERASED_BYTE; PERSISTENT_REGION_SIZE];
        let record = encode_record(settings);
        image[..LEGACY_RECORD_SIZE].copy_from_slice(&record[..LEGACY_RECORD_SIZE]);
        image
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut store = SettingsStore::new(MemoryRegion::new());
        let settings = Settings {
            label: Label::new(&[b'z'; 63]),
            baudrate: 57600,
            parity: b'O',
            wordlength: 7,
            stopbits: 2,
        };

        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap(), settings);
        assert_eq!(store.region().commits(), 1);
    }

    #[test]
    fn record_matches_legacy_byte_layout() {
        let settings = Settings {
            label: Label::new(b"ab"),
            baudrate: 9600,
            parity: b'E',
            wordlength: 7,
            stopbits: 2,
        };
        let record = encode_record(&settings);

        assert_eq!(&record[..3], b"ab\0");
        assert_eq!(&record[64..68], &9600i32.to_le_bytes());
        assert_eq!(record[68], b'E');
        assert_eq!(&record[72..76], &7i32.to_le_bytes());
        assert_eq!(&record[76..80], &2i32.to_le_bytes());
        assert_eq!(&record[80..84], &[b'S', b'B', 1, 0]);
    }

    #[test]
    fn reads_legacy_records() {
        let settings = Settings {
            label: Label::new(b"old box"),
            baudrate: 19200,
            ..Settings::default()
        };
        let mut store = SettingsStore::new(MemoryRegion::with_image(legacy_image(&settings)));

        assert_eq!(store.load().unwrap(), settings);

        let mut record = [0u8; RECORD_SIZE];
        record.copy_from_slice(&legacy_image(&settings)[..RECORD_SIZE]);
        assert_eq!(decode_record(&record).1, RecordLayout::Legacy);
    }

    #[test]
    fn unknown_version_still_decodes() {
        let settings = Settings::default();
        let mut record = encode_record(&settings);
        record[VERSION_AT] = 9;
        let (decoded, layout) = decode_record(&record);
        assert_eq!(decoded, settings);
        assert_eq!(layout, RecordLayout::Versioned(9));
    }

    #[test]
    fn boot_repair_restores_defaults_for_zero_baudrate() {
        let broken = Settings {
            baudrate: 0,
            ..Settings::default()
        };
        let mut store = SettingsStore::new(MemoryRegion::with_image(legacy_image(&broken)));

        assert_eq!(store.boot_repair().unwrap(), Settings::default());
        assert_eq!(
            &store.region().image()[..RECORD_SIZE],
            &encode_record(&Settings::default())[..]
        );
    }

    #[test]
    fn boot_repair_handles_erased_region() {
        let mut store = SettingsStore::new(MemoryRegion::new());
        assert_eq!(store.boot_repair().unwrap(), Settings::default());
        assert_eq!(store.region().commits(), 1);
    }

    #[test]
    fn boot_repair_keeps_plausible_settings() {
        let settings = Settings {
            baudrate: 300,
            ..Settings::default()
        };
        let mut store = SettingsStore::new(MemoryRegion::new());
        store.save(&settings).unwrap();

        assert_eq!(store.boot_repair().unwrap(), settings);
        assert_eq!(store.region().commits(), 1);
    }

    #[test]
    fn out_of_bounds_access_is_rejected() {
        let mut region = MemoryRegion::with_image(vec![0; 16]);
        let mut buf = [0u8; 8];
        assert!(region.read(12, &mut buf).is_err());
        assert!(region.write(usize::MAX, &buf).is_err());
    }
}
