//! Flat-file asset storage
//!
//! Every fetched asset is kept as one flat file so a cold boot can render the
//! card straight from the SD card. Names are 8.3 so they map directly onto
//! the FAT directory:
//!
//! /BADGE/
//!   PROFILE.JSN   - user details JSON
//!   CONTRIB.JSN   - contribution calendar JSON
//!   AVATAR.PNG    - avatar image
//!   QR.PNG        - pre-generated QR code for the secondary profile
//!   SECRETS.TXT   - WiFi and account details

use alloc::vec;
use alloc::vec::Vec;

use embedded_hal::spi::SpiDevice;
use embedded_sdmmc::{Mode, SdCard, TimeSource, Timestamp, VolumeIdx, VolumeManager};
use log::{debug, info, warn};
use thiserror::Error;

/// Badge directory name
const BADGE_DIR: &str = "BADGE";

/// User details JSON
pub const PROFILE_FILE: &str = "PROFILE.JSN";
/// Contribution calendar JSON
pub const CONTRIB_FILE: &str = "CONTRIB.JSN";
/// Avatar PNG
pub const AVATAR_FILE: &str = "AVATAR.PNG";
/// Pre-generated QR code PNG
pub const QR_FILE: &str = "QR.PNG";
/// Credentials file
pub const SECRETS_FILE: &str = "SECRETS.TXT";

/// Storage error types
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("SD card error")]
    SdCard,
    #[error("file not found")]
    NotFound,
    #[error("filesystem error")]
    Filesystem,
    #[error("file too large")]
    TooLarge,
    #[error("write error")]
    Write,
    #[error("read error")]
    Read,
}

/// Filesystem operations the badge needs: existence, truncate, append and
/// whole-file reads of small flat files.
pub trait Storage {
    /// Check whether a file exists
    fn exists(&mut self, name: &str) -> bool;

    /// Create the file, or empty it if it already exists
    fn truncate(&mut self, name: &str) -> Result<(), StorageError>;

    /// Append bytes to the end of the file, creating it if needed
    fn append(&mut self, name: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Read the whole file. Files longer than `max_len` are rejected.
    fn read_to_end(&mut self, name: &str, max_len: usize) -> Result<Vec<u8>, StorageError>;
}

impl<T: Storage + ?Sized> Storage for &mut T {
    fn exists(&mut self, name: &str) -> bool {
        (**self).exists(name)
    }

    fn truncate(&mut self, name: &str) -> Result<(), StorageError> {
        (**self).truncate(name)
    }

    fn append(&mut self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        (**self).append(name, data)
    }

    fn read_to_end(&mut self, name: &str, max_len: usize) -> Result<Vec<u8>, StorageError> {
        (**self).read_to_end(name, max_len)
    }
}

/// Dummy time source (SD cards need timestamps but we don't care)
pub struct DummyTimesource;

impl TimeSource for DummyTimesource {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 55, // 2025
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

/// Open volume 0, its root directory and the badge directory, binding the
/// latter to `$dir`. Bails out of the enclosing function with `$err`.
macro_rules! open_badge_dir {
    ($self:ident, $dir:ident, $err:expr) => {
        let mut volume = $self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(|_| StorageError::Filesystem)?;
        let mut root_dir = volume.open_root_dir().map_err(|_| StorageError::Filesystem)?;
        let mut $dir = root_dir.open_dir(BADGE_DIR).map_err(|_| $err)?;
    };
}

/// SD card backed storage
pub struct SdStorage<SPI: SpiDevice, DELAY: embedded_hal::delay::DelayNs> {
    volume_mgr: VolumeManager<SdCard<SPI, DELAY>, DummyTimesource>,
}

impl<SPI, DELAY> SdStorage<SPI, DELAY>
where
    SPI: SpiDevice,
    DELAY: embedded_hal::delay::DelayNs,
{
    /// Create SD card and storage
    pub fn new(spi: SPI, delay: DELAY) -> Result<Self, StorageError> {
        let sd_card = SdCard::new(spi, delay);

        match sd_card.num_bytes() {
            Ok(size) => info!("SD card size: {} MB", size / 1024 / 1024),
            Err(_) => {
                warn!("Failed to read SD card size");
                return Err(StorageError::SdCard);
            }
        }

        let volume_mgr = VolumeManager::new(sd_card, DummyTimesource);

        Ok(Self { volume_mgr })
    }

    /// Create the badge directory if it is missing
    pub fn init(&mut self) -> Result<(), StorageError> {
        let mut volume = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(|_| StorageError::Filesystem)?;
        let mut root_dir = volume.open_root_dir().map_err(|_| StorageError::Filesystem)?;

        if root_dir.open_dir(BADGE_DIR).is_ok() {
            info!("Badge directory found");
        } else {
            root_dir
                .make_dir_in_dir(BADGE_DIR)
                .map_err(|_| StorageError::Filesystem)?;
            info!("Created badge directory");
        }

        Ok(())
    }
}

impl<SPI, DELAY> Storage for SdStorage<SPI, DELAY>
where
    SPI: SpiDevice,
    DELAY: embedded_hal::delay::DelayNs,
{
    fn exists(&mut self, name: &str) -> bool {
        let Ok(mut volume) = self.volume_mgr.open_volume(VolumeIdx(0)) else {
            return false;
        };
        let Ok(mut root_dir) = volume.open_root_dir() else {
            return false;
        };
        let Ok(mut badge_dir) = root_dir.open_dir(BADGE_DIR) else {
            return false;
        };

        badge_dir.open_file_in_dir(name, Mode::ReadOnly).is_ok()
    }

    fn truncate(&mut self, name: &str) -> Result<(), StorageError> {
        open_badge_dir!(self, badge_dir, StorageError::Filesystem);

        badge_dir
            .open_file_in_dir(name, Mode::ReadWriteCreateOrTruncate)
            .map_err(|_| StorageError::Write)?;

        debug!("Truncated {}", name);
        Ok(())
    }

    fn append(&mut self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        open_badge_dir!(self, badge_dir, StorageError::Filesystem);

        let mut file = badge_dir
            .open_file_in_dir(name, Mode::ReadWriteCreateOrAppend)
            .map_err(|_| StorageError::Write)?;
        file.write(data).map_err(|_| StorageError::Write)?;

        Ok(())
    }

    fn read_to_end(&mut self, name: &str, max_len: usize) -> Result<Vec<u8>, StorageError> {
        open_badge_dir!(self, badge_dir, StorageError::NotFound);

        let mut file = badge_dir
            .open_file_in_dir(name, Mode::ReadOnly)
            .map_err(|_| StorageError::NotFound)?;

        let len = file.length() as usize;
        if len > max_len {
            return Err(StorageError::TooLarge);
        }

        let mut buf = vec![0u8; len];
        let mut total_read = 0;
        while total_read < len {
            match file.read(&mut buf[total_read..]) {
                Ok(0) => break,
                Ok(n) => total_read += n,
                Err(_) => return Err(StorageError::Read),
            }
        }
        buf.truncate(total_read);

        debug!("Read {} bytes from {}", total_read, name);
        Ok(buf)
    }
}
