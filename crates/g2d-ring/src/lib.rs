//! Command ring for the z1xx 2D accelerator.
//!
//! A [`Ring`] owns one device context, a command stream buffer holding the captured preamble
//! followed by the command region, and the three context buffers the preamble points at.
//! Packets are framed with [`Ring::begin`] / [`Ring::end`]; every `end` submits the command
//! stream and waits for it to retire, so at most one submission is outstanding per ring.
//!
//! Device access goes through two boundaries: [`SubmitChannel`] (context management,
//! submission, timestamps) and [`DeviceAllocator`] (device-visible memory). The `kgsl` feature
//! provides implementations of both on top of the Linux KGSL ioctls, the `test-utils` feature
//! provides an in-process fake.

pub mod alloc;
pub mod channel;
pub mod config;
pub mod error;
pub mod ring;
pub mod stats;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[cfg(all(feature = "kgsl", target_os = "linux"))]
pub mod kgsl;

pub use alloc::{
    CachingAllocator, DeviceAllocator, DeviceBuffer, HostMapping, MemType, SysmemAllocator,
};
pub use channel::{ContextHandle, IndirectBuffer, SubmitChannel, Timestamp};
pub use config::{AllocatorConfig, RingConfig};
pub use error::{AllocError, DeviceError, RingError};
pub use ring::Ring;
pub use stats::RingStats;

pub use g2d_protocol::GpuAddr;
