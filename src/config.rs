use crate::coordinate::CHUNK_VOLUME;
use crate::error::InstanceBufferError;
use crate::instances::RECORD_SIZE;

const TOTAL_SLOTS_ENV: &str = "VOXEL_INSTANCE_TOTAL_SLOTS";
const STAGING_RECORDS_ENV: &str = "VOXEL_INSTANCE_STAGING_RECORDS";

/// Enough slots for 64 fully loaded chunks.
pub const DEFAULT_TOTAL_SLOTS: usize = 64 * CHUNK_VOLUME;
pub const DEFAULT_STAGING_RECORDS: usize = 16_384;

// Instance ranges are handed to draw calls as u32.
const MAX_TOTAL_SLOTS: usize = u32::MAX as usize;

fn env_usize(name: &str, default_value: usize) -> usize {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|v| *v > 0)
            .unwrap_or(default_value),
        Err(_) => default_value,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceBufferConfig {
    /// Total addressable instance slots. Fixed for the lifetime of the buffer.
    pub total_slots: usize,
    /// Number of records the staging area holds per submission.
    pub staging_records: usize,
}

impl InstanceBufferConfig {
    pub fn with_defaults() -> Self {
        Self {
            total_slots: DEFAULT_TOTAL_SLOTS,
            staging_records: DEFAULT_STAGING_RECORDS,
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::with_defaults();
        Self {
            total_slots: env_usize(TOTAL_SLOTS_ENV, defaults.total_slots),
            staging_records: env_usize(STAGING_RECORDS_ENV, defaults.staging_records),
        }
    }

    pub fn validate(&self) -> Result<(), InstanceBufferError> {
        if self.total_slots == 0 {
            return Err(InstanceBufferError::EmptyInstanceBuffer);
        }
        if self.total_slots > MAX_TOTAL_SLOTS {
            return Err(InstanceBufferError::TooManySlots {
                requested: self.total_slots,
                max: MAX_TOTAL_SLOTS,
            });
        }
        if self.staging_records == 0 {
            return Err(InstanceBufferError::EmptyStagingArea);
        }
        Ok(())
    }

    pub fn instance_buffer_bytes(&self) -> u64 {
        (self.total_slots as u64) * (RECORD_SIZE as u64)
    }

    pub fn staging_bytes(&self) -> u64 {
        (self.staging_records as u64) * (RECORD_SIZE as u64)
    }
}

impl Default for InstanceBufferConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}
