//! Device memory boundary.
//!
//! The ring only needs device-visible buffers with a CPU mapping. Where that memory comes from
//! (GEM objects, vmalloc-backed shared memory, plain host memory in tests) is up to the
//! [`DeviceAllocator`] implementation.

use std::fmt;

use g2d_protocol::GpuAddr;
use tracing::{debug, warn};

use crate::config::AllocatorConfig;
use crate::error::AllocError;

pub const PAGE_SIZE: usize = 4096;

/// Rounds `size` up to a whole number of pages.
pub fn page_align(size: usize) -> Option<usize> {
    size.checked_add(PAGE_SIZE - 1).map(|s| s & !(PAGE_SIZE - 1))
}

/// Backing memory pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemType {
    Ebi,
    Smi,
    Kmem,
    KmemNoCache,
}

/// CPU view of a device buffer.
pub trait HostMapping: Send + fmt::Debug {
    fn words(&self) -> &[u32];

    fn words_mut(&mut self) -> &mut [u32];

    /// CPU address of the first word.
    fn host_addr(&self) -> usize {
        self.words().as_ptr() as usize
    }
}

impl HostMapping for Vec<u32> {
    fn words(&self) -> &[u32] {
        self
    }

    fn words_mut(&mut self) -> &mut [u32] {
        self
    }
}

/// A device-visible allocation. Dropping it releases the mapping.
#[derive(Debug)]
pub struct DeviceBuffer {
    size_bytes: usize,
    memtype: MemType,
    gpuaddr: Option<GpuAddr>,
    mapping: Box<dyn HostMapping>,
}

impl DeviceBuffer {
    pub fn new(size_bytes: usize, memtype: MemType, mapping: Box<dyn HostMapping>) -> Self {
        Self {
            size_bytes,
            memtype,
            gpuaddr: None,
            mapping,
        }
    }

    /// Buffer whose device address is fixed at allocation time.
    pub fn bound(
        size_bytes: usize,
        memtype: MemType,
        gpuaddr: GpuAddr,
        mapping: Box<dyn HostMapping>,
    ) -> Self {
        Self {
            gpuaddr: Some(gpuaddr),
            ..Self::new(size_bytes, memtype, mapping)
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn memtype(&self) -> MemType {
        self.memtype
    }

    /// Device address, once bound.
    pub fn gpuaddr(&self) -> Option<GpuAddr> {
        self.gpuaddr
    }

    pub fn set_gpuaddr(&mut self, addr: GpuAddr) {
        self.gpuaddr = Some(addr);
    }

    pub fn words(&self) -> &[u32] {
        self.mapping.words()
    }

    pub fn words_mut(&mut self) -> &mut [u32] {
        self.mapping.words_mut()
    }

    pub fn host_addr(&self) -> usize {
        self.mapping.host_addr()
    }
}

pub trait DeviceAllocator {
    fn allocate(&mut self, size_bytes: usize, memtype: MemType) -> Result<DeviceBuffer, AllocError>;

    /// Makes `buf` reachable by the device and returns its address. Binding an already bound
    /// buffer returns the existing address.
    fn bind_for_device_access(&mut self, buf: &mut DeviceBuffer) -> Result<GpuAddr, AllocError>;

    fn free(&mut self, buf: DeviceBuffer) {
        drop(buf);
    }
}

/// Host-memory allocator handing out a linear range of fake device addresses.
#[derive(Debug)]
pub struct SysmemAllocator {
    next_addr: u32,
    limit_bytes: Option<usize>,
    allocated_bytes: usize,
    unsupported: Vec<MemType>,
}

impl Default for SysmemAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SysmemAllocator {
    pub const DEFAULT_BASE: GpuAddr = GpuAddr(0x6600_0000);

    pub fn new() -> Self {
        Self {
            next_addr: Self::DEFAULT_BASE.get(),
            limit_bytes: None,
            allocated_bytes: 0,
            unsupported: Vec::new(),
        }
    }

    /// Fails allocations once `limit_bytes` are live.
    pub fn with_limit(mut self, limit_bytes: usize) -> Self {
        self.limit_bytes = Some(limit_bytes);
        self
    }

    pub fn with_base(mut self, base: GpuAddr) -> Self {
        self.next_addr = base.get();
        self
    }

    /// Rejects allocations of `memtype` with [`AllocError::MemTypeUnsupported`].
    pub fn without_memtype(mut self, memtype: MemType) -> Self {
        self.unsupported.push(memtype);
        self
    }

    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }
}

impl DeviceAllocator for SysmemAllocator {
    fn allocate(&mut self, size_bytes: usize, memtype: MemType) -> Result<DeviceBuffer, AllocError> {
        if size_bytes == 0 {
            return Err(AllocError::ZeroSize);
        }
        if self.unsupported.contains(&memtype) {
            return Err(AllocError::MemTypeUnsupported(memtype));
        }
        let size = page_align(size_bytes).ok_or(AllocError::OutOfMemory { size_bytes })?;
        let total = self.allocated_bytes.saturating_add(size);
        if self.limit_bytes.is_some_and(|limit| total > limit) {
            return Err(AllocError::OutOfMemory { size_bytes: size });
        }
        self.allocated_bytes = total;
        Ok(DeviceBuffer::new(size, memtype, Box::new(vec![0u32; size / 4])))
    }

    fn bind_for_device_access(&mut self, buf: &mut DeviceBuffer) -> Result<GpuAddr, AllocError> {
        if let Some(addr) = buf.gpuaddr() {
            return Ok(addr);
        }
        let size_bytes = buf.size_bytes();
        let addr = GpuAddr(self.next_addr);
        self.next_addr = u32::try_from(size_bytes)
            .ok()
            .and_then(|size| self.next_addr.checked_add(size))
            .ok_or(AllocError::OutOfMemory { size_bytes })?;
        buf.set_gpuaddr(addr);
        Ok(addr)
    }

    fn free(&mut self, buf: DeviceBuffer) {
        self.allocated_bytes = self.allocated_bytes.saturating_sub(buf.size_bytes());
    }
}

/// Page-rounding wrapper keeping one freed buffer of the default memory type for reuse.
///
/// Once the backend reports a memory type as unsupported, all further allocations use EBI.
#[derive(Debug)]
pub struct CachingAllocator<A: DeviceAllocator> {
    inner: A,
    config: AllocatorConfig,
    cached: Option<DeviceBuffer>,
    ebi_only: bool,
}

impl<A: DeviceAllocator> CachingAllocator<A> {
    pub fn new(inner: A, config: AllocatorConfig) -> Self {
        Self {
            inner,
            config,
            cached: None,
            ebi_only: false,
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut A {
        &mut self.inner
    }

    pub fn ebi_only(&self) -> bool {
        self.ebi_only
    }

    pub fn cached_size(&self) -> Option<usize> {
        self.cached.as_ref().map(DeviceBuffer::size_bytes)
    }

    fn take_cached(&mut self, size: usize, memtype: MemType) -> Option<DeviceBuffer> {
        if !self.config.cache_default_memtype || memtype != self.config.default_memtype {
            return None;
        }
        if self.cached.as_ref()?.size_bytes() != size {
            return None;
        }
        self.cached.take()
    }
}

impl<A: DeviceAllocator> DeviceAllocator for CachingAllocator<A> {
    fn allocate(&mut self, size_bytes: usize, memtype: MemType) -> Result<DeviceBuffer, AllocError> {
        if size_bytes == 0 {
            return Err(AllocError::ZeroSize);
        }
        let size = page_align(size_bytes).ok_or(AllocError::OutOfMemory { size_bytes })?;
        let memtype = if self.ebi_only { MemType::Ebi } else { memtype };

        if let Some(buf) = self.take_cached(size, memtype) {
            debug!(size, "reusing cached buffer");
            return Ok(buf);
        }

        match self.inner.allocate(size, memtype) {
            Err(AllocError::MemTypeUnsupported(rejected)) if rejected != MemType::Ebi => {
                warn!("memory type {rejected:?} not supported, using EBI from now on");
                self.ebi_only = true;
                self.inner.allocate(size, MemType::Ebi)
            }
            result => result,
        }
    }

    fn bind_for_device_access(&mut self, buf: &mut DeviceBuffer) -> Result<GpuAddr, AllocError> {
        self.inner.bind_for_device_access(buf)
    }

    fn free(&mut self, buf: DeviceBuffer) {
        if self.config.cache_default_memtype && buf.memtype() == self.config.default_memtype {
            if let Some(old) = self.cached.replace(buf) {
                self.inner.free(old);
            }
        } else {
            self.inner.free(buf);
        }
    }
}

impl<A: DeviceAllocator> Drop for CachingAllocator<A> {
    fn drop(&mut self) {
        if let Some(buf) = self.cached.take() {
            self.inner.free(buf);
        }
    }
}
