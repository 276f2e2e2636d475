//! Calibration persisted as a checked binary blob.
//!
//! A blob holds a [`StoredCalibration`] serialized with `postcard`, framed by a magic word,
//! a schema tag, a payload length, and a CRC32:
//!
//! | offset | size | field                               |
//! |--------|------|-------------------------------------|
//! | 0      | 4    | magic `0x5352_564F` (little endian) |
//! | 4      | 4    | FNV-1a hash of the schema name      |
//! | 8      | 2    | payload length                      |
//! | 10     | n    | postcard payload                    |
//! | 10 + n | 4    | CRC32 of bytes `0..10 + n`          |

use serde::{Deserialize, Serialize};

use super::{ANGLE_KEY, CalibrationDefaults, PERIOD_KEY, PropertySource};
use crate::ConfigError;

const MAGIC: u32 = 0x5352_564F; // 'SRVO'
const HEADER_SIZE: usize = 4 + 4 + 2; // Magic + SchemaTag + PayloadLen
const CRC_SIZE: usize = 4;
// Bump the suffix when the payload layout changes; older blobs then read as absent.
const SCHEMA_TAG: u32 = fnv1a(b"servo-envoy/StoredCalibration/1");

/// Largest postcard payload a blob may carry.
pub const MAX_PAYLOAD_SIZE: usize = 64;

/// Largest blob [`StoredCalibration::to_bytes`] can produce.
pub const MAX_BLOB_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE + CRC_SIZE;

/// Calibration properties as kept in non-volatile storage. Absent fields fall back to the
/// loader's defaults.
///
/// # Example
///
/// ```
/// use servo_envoy::calibration::{CalibrationDefaults, CalibrationParams};
/// use servo_envoy::calibration::stored::{MAX_BLOB_SIZE, StoredCalibration};
///
/// let stored = StoredCalibration {
///     degrees: Some(90),
///     ..StoredCalibration::default()
/// };
/// let mut buffer = [0u8; MAX_BLOB_SIZE];
/// let len = stored.to_bytes(&mut buffer)?;
///
/// let loaded = StoredCalibration::from_bytes(&buffer[..len])?.unwrap_or_default();
/// let params = CalibrationParams::load(&loaded, &CalibrationDefaults::CURRENT)?;
/// assert_eq!(params.degrees(), 90);
/// # Ok::<(), servo_envoy::ConfigError>(())
/// ```
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StoredCalibration {
    /// Lower duty bound (ns).
    pub duty_min_ns: Option<u32>,
    /// Upper duty bound (ns).
    pub duty_max_ns: Option<u32>,
    /// Angular travel.
    pub degrees: Option<u32>,
    /// Fixed PWM period (ns).
    pub period_ns: Option<u32>,
    /// Initial angle.
    pub angle: Option<u32>,
}

impl StoredCalibration {
    /// Write this calibration as a framed blob into `buffer`, returning the blob length.
    ///
    /// # Errors
    ///
    /// [`ConfigError::StorageTooSmall`] if `buffer` cannot hold the blob.
    pub fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize, ConfigError> {
        let mut payload_buffer = [0u8; MAX_PAYLOAD_SIZE];
        let payload_len = postcard::to_slice(self, &mut payload_buffer)
            .map_err(|_| {
                error!(
                    "calibration: serialization failed (max {} bytes)",
                    MAX_PAYLOAD_SIZE
                );
                ConfigError::StorageTooSmall(MAX_PAYLOAD_SIZE)
            })?
            .len();

        let payload = payload_buffer
            .get(..payload_len)
            .ok_or(ConfigError::StorageTooSmall(MAX_PAYLOAD_SIZE))?;
        let encoded_len = u16::try_from(payload_len)
            .map_err(|_| ConfigError::StorageTooSmall(MAX_PAYLOAD_SIZE))?;

        let crc_offset = HEADER_SIZE.saturating_add(payload_len);
        let blob_len = crc_offset.saturating_add(CRC_SIZE);
        let buffer_len = buffer.len();
        let blob = buffer
            .get_mut(..blob_len)
            .ok_or(ConfigError::StorageTooSmall(buffer_len))?;

        put(blob, 0, &MAGIC.to_le_bytes())?;
        put(blob, 4, &SCHEMA_TAG.to_le_bytes())?;
        put(blob, 8, &encoded_len.to_le_bytes())?;
        put(blob, HEADER_SIZE, payload)?;
        let crc = crc32fast::hash(blob.get(..crc_offset).unwrap_or_default());
        put(blob, crc_offset, &crc.to_le_bytes())?;

        debug!("calibration: stored {} byte blob", blob_len);
        Ok(blob_len)
    }

    /// Read a framed blob.
    ///
    /// Returns `Ok(None)` when `bytes` does not start with a calibration blob (erased or
    /// foreign storage), so callers can fall back to defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::StorageCorrupted`] when the length, CRC, or payload is bad.
    pub fn from_bytes(bytes: &[u8]) -> Result<Option<Self>, ConfigError> {
        let Some(header) = bytes.get(..HEADER_SIZE) else {
            return Ok(None);
        };
        if read_u32(header, 0) != Some(MAGIC) {
            debug!("calibration: no stored blob");
            return Ok(None);
        }

        if read_u32(header, 4) != Some(SCHEMA_TAG) {
            info!("calibration: stored blob has a different schema, ignoring it");
            return Ok(None);
        }

        let payload_len = header
            .get(8..10)
            .and_then(|raw| raw.try_into().ok())
            .map(u16::from_le_bytes)
            .map(usize::from)
            .ok_or(ConfigError::StorageCorrupted)?;
        if payload_len > MAX_PAYLOAD_SIZE {
            error!("calibration: invalid payload length {}", payload_len);
            return Err(ConfigError::StorageCorrupted);
        }

        let crc_offset = HEADER_SIZE.saturating_add(payload_len);
        let stored_crc = read_u32(bytes, crc_offset).ok_or(ConfigError::StorageCorrupted)?;
        let framed = bytes
            .get(..crc_offset)
            .ok_or(ConfigError::StorageCorrupted)?;
        let computed_crc = crc32fast::hash(framed);
        if stored_crc != computed_crc {
            error!(
                "calibration: CRC mismatch (expected {}, found {})",
                computed_crc,
                stored_crc
            );
            return Err(ConfigError::StorageCorrupted);
        }

        let payload = framed
            .get(HEADER_SIZE..)
            .ok_or(ConfigError::StorageCorrupted)?;
        let value: Self = postcard::from_bytes(payload).map_err(|_| {
            error!("calibration: deserialization failed");
            ConfigError::StorageCorrupted
        })?;

        Ok(Some(value))
    }
}

/// Answers both the current and the legacy property names.
impl PropertySource for StoredCalibration {
    fn property_u32(&self, name: &str) -> Option<u32> {
        let current = CalibrationDefaults::CURRENT;
        let legacy = CalibrationDefaults::LEGACY;
        if name == current.duty_min_key || name == legacy.duty_min_key {
            self.duty_min_ns
        } else if name == current.duty_max_key || name == legacy.duty_max_key {
            self.duty_max_ns
        } else if Some(name) == current.degrees_key {
            self.degrees
        } else if name == PERIOD_KEY {
            self.period_ns
        } else if name == ANGLE_KEY {
            self.angle
        } else {
            None
        }
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset.checked_add(4)?)?;
    raw.try_into().ok().map(u32::from_le_bytes)
}

fn put(blob: &mut [u8], offset: usize, bytes: &[u8]) -> Result<(), ConfigError> {
    let len = blob.len();
    blob.get_mut(offset..offset.saturating_add(bytes.len()))
        .ok_or(ConfigError::StorageTooSmall(len))?
        .copy_from_slice(bytes);
    Ok(())
}

#[expect(clippy::cast_lossless, reason = "`u32::from` is not const")]
const fn fnv1a(mut bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811C_9DC5;
    while let [byte, rest @ ..] = bytes {
        hash = (hash ^ *byte as u32).wrapping_mul(0x0100_0193);
        bytes = rest;
    }
    hash
}
