use std::time::Duration;

use g2d_protocol::GpuAddr;

use crate::error::DeviceError;

/// Device-assigned submission counter. Compared with wraparound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Timestamp(pub u32);

impl Timestamp {
    /// Whether work up to `self` has retired once the device reports `retired`.
    pub fn is_retired_by(self, retired: Timestamp) -> bool {
        (retired.0.wrapping_sub(self.0) as i32) >= 0
    }
}

/// Device draw context id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextHandle(pub u32);

/// One indirect buffer handed to the device.
#[derive(Debug, Clone, Copy)]
pub struct IndirectBuffer<'a> {
    pub gpuaddr: GpuAddr,
    /// CPU address of the same buffer.
    pub host_addr: usize,
    /// Dwords the device executes from `gpuaddr`.
    pub size_dwords: u32,
    /// Host view of everything written to the buffer for this submission. The device only
    /// reads the first `size_dwords` directly, the rest is reached through the link size.
    pub words: &'a [u32],
}

/// Submission side of the kernel interface.
///
/// Every call may block. Errors where [`DeviceError::is_transient`] holds are retried by the
/// ring; all others are logged and dropped.
pub trait SubmitChannel {
    fn create_context(&mut self) -> Result<ContextHandle, DeviceError>;

    fn destroy_context(&mut self, ctx: ContextHandle) -> Result<(), DeviceError>;

    /// Queues `ib` on `ctx` and returns the timestamp that retires it.
    fn submit(
        &mut self,
        ctx: ContextHandle,
        ib: &IndirectBuffer<'_>,
    ) -> Result<Timestamp, DeviceError>;

    /// Blocks until `ts` retires. `None` waits forever.
    fn wait_timestamp(&mut self, ts: Timestamp, timeout: Option<Duration>)
        -> Result<(), DeviceError>;

    /// Current retired timestamp, without waiting.
    fn read_retired_timestamp(&mut self) -> Result<Timestamp, DeviceError>;
}

impl<T: SubmitChannel + ?Sized> SubmitChannel for Box<T> {
    fn create_context(&mut self) -> Result<ContextHandle, DeviceError> {
        (**self).create_context()
    }

    fn destroy_context(&mut self, ctx: ContextHandle) -> Result<(), DeviceError> {
        (**self).destroy_context(ctx)
    }

    fn submit(
        &mut self,
        ctx: ContextHandle,
        ib: &IndirectBuffer<'_>,
    ) -> Result<Timestamp, DeviceError> {
        (**self).submit(ctx, ib)
    }

    fn wait_timestamp(
        &mut self,
        ts: Timestamp,
        timeout: Option<Duration>,
    ) -> Result<(), DeviceError> {
        (**self).wait_timestamp(ts, timeout)
    }

    fn read_retired_timestamp(&mut self) -> Result<Timestamp, DeviceError> {
        (**self).read_retired_timestamp()
    }
}
