use crate::instances::BlockId;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceBufferError {
    CapacityExhausted { requested: usize, available: usize },
    UnknownCategory(BlockId),
    DuplicateCategory(BlockId),
    EmptyInstanceBuffer,
    EmptyStagingArea,
    TooManySlots { requested: usize, max: usize },
    BufferTooLarge { bytes: u64, limit: u64 },
    AdapterUnavailable,
    RequestDevice(String),
}

impl fmt::Display for InstanceBufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExhausted {
                requested,
                available,
            } => write!(
                f,
                "cannot allocate {requested} instance slots, only {available} unallocated"
            ),
            Self::UnknownCategory(id) => write!(f, "block id {} has no instance category", id.0),
            Self::DuplicateCategory(id) => {
                write!(f, "block id {} was registered more than once", id.0)
            }
            Self::EmptyInstanceBuffer => write!(f, "instance buffer must have at least one slot"),
            Self::EmptyStagingArea => {
                write!(f, "staging area must hold at least one instance record")
            }
            Self::TooManySlots { requested, max } => write!(
                f,
                "instance buffer of {requested} slots exceeds the addressable maximum of {max}"
            ),
            Self::BufferTooLarge { bytes, limit } => write!(
                f,
                "buffer of {bytes} bytes exceeds the device limit of {limit} bytes"
            ),
            Self::AdapterUnavailable => write!(f, "failed to find an appropriate adapter"),
            Self::RequestDevice(message) => write!(f, "failed to create device: {message}"),
        }
    }
}

impl std::error::Error for InstanceBufferError {}
