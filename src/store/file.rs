use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{PersistentRegion, check_bounds};
use crate::constants::ERASED_BYTE;
use crate::error::{GatewayError, GatewayResult};

/// Persistent region emulated by a fixed-size file. The whole image is held
/// in memory and rewritten on every commit.
pub struct FileRegion {
    path: PathBuf,
    file: File,
    image: Vec<u8>,
}

impl FileRegion {
    /// Open (or create) the backing file. Missing bytes read as erased.
    pub fn open(path: impl AsRef<Path>, size: usize) -> GatewayResult<FileRegion> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                GatewayError::Storage(format!("Failed to open {}: {}", path.display(), e))
            })?;

        let mut image = Vec::with_capacity(size);
        file.read_to_end(&mut image).map_err(|e| {
            GatewayError::Storage(format!("Failed to read {}: {}", path.display(), e))
        })?;

        if image.len() < size {
            info!(
                "Settings store {} holds {} of {} bytes, padding as erased",
                path.display(),
                image.len(),
                size
            );
        }
        image.resize(size, ERASED_BYTE);

        Ok(FileRegion { path, file, image })
    }
}

impl PersistentRegion for FileRegion {
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
        let storage_err = |e: std::io::Error| {
            GatewayError::Storage(format!("Failed to commit {}: {}", self.path.display(), e))
        };

        self.file.seek(SeekFrom::Start(0)).map_err(storage_err)?;
        self.file.write_all(&self.image).map_err(storage_err)?;
        self.file
            .set_len(self.image.len() as u64)
            .map_err(storage_err)?;
        self.file.sync_all().map_err(storage_err)?;

        debug!("Committed {} bytes to {}", self.image.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PERSISTENT_REGION_SIZE;
    use crate::settings::{Label, Settings};
    use crate::store::SettingsStore;

    #[test]
    fn new_file_reads_as_erased() {
        let dir = tempfile::tempdir().unwrap();
        let mut region = FileRegion::open(dir.path().join("eeprom.bin"), 32).unwrap();

        let mut buf = [0u8; 32];
        region.read(0, &mut buf).unwrap();
        assert_eq!(buf, [ERASED_BYTE; 32]);
    }

    #[test]
    fn committed_settings_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eeprom.bin");
        let settings = Settings {
            label: Label::new(b"rack 4"),
            baudrate: 38400,
            ..Settings::default()
        };

        {
            let region = FileRegion::open(&path, PERSISTENT_REGION_SIZE).unwrap();
            SettingsStore::new(region).save(&settings).unwrap();
        }

        let region = FileRegion::open(&path, PERSISTENT_REGION_SIZE).unwrap();
        assert_eq!(SettingsStore::new(region).load().unwrap(), settings);
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            PERSISTENT_REGION_SIZE as u64
        );
    }

    #[test]
    fn uncommitted_writes_are_lost() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eeprom.bin");

        {
            let mut region = FileRegion::open(&path, 16).unwrap();
            region.write(0, &[1, 2, 3]).unwrap();
        }

        let mut region = FileRegion::open(&path, 16).unwrap();
        let mut buf = [0u8; 3];
        region.read(0, &mut buf).unwrap();
        assert_eq!(buf, [ERASED_BYTE; 3]);
    }
}
