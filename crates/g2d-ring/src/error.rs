use thiserror::Error;

use crate::alloc::MemType;

/// Failure reported by the device submission channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("interrupted")]
    Interrupted,

    #[error("device busy")]
    Busy,

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("device gone")]
    DeviceGone,

    #[error("os error {errno}")]
    Os { errno: i32 },
}

impl DeviceError {
    /// Interrupted and busy requests are retried; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, DeviceError::Interrupted | DeviceError::Busy)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("zero-sized allocation")]
    ZeroSize,

    #[error("out of device memory allocating {size_bytes} bytes")]
    OutOfMemory { size_bytes: usize },

    #[error("memory type {0:?} not supported")]
    MemTypeUnsupported(MemType),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RingError {
    #[error("ring buffer allocation failed: {0}")]
    Alloc(#[from] AllocError),

    #[error("device context creation failed: {0}")]
    ContextCreate(#[source] DeviceError),

    #[error("a packet is already open")]
    PacketOpen,

    #[error("no packet is open")]
    NoPacketOpen,

    #[error("packet needs {requested} dwords but the command region holds {capacity}")]
    PacketTooLarge { requested: usize, capacity: usize },

    #[error("invalid ring config: {0}")]
    InvalidConfig(&'static str),
}
