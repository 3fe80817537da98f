//! KGSL (`/dev/kgsl-*`) backend.
//!
//! The 2D cores are driven through `/dev/kgsl-2d0` and `/dev/kgsl-2d1`. Ring memory must come
//! from `SHAREDMEM_FROM_VMALLOC` on `/dev/kgsl-3d0`: the kernel validates IB addresses on
//! submission and does not accept GEM objects there.
//!
//! Struct layouts follow `msm_kgsl.h` for 32-bit ARM userspace.

use std::ffi::CString;
use std::fmt;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Duration;

use g2d_protocol::GpuAddr;
use libc::{c_uint, c_ulong, c_void};
use tracing::{debug, error, info};

use crate::alloc::{page_align, DeviceAllocator, DeviceBuffer, HostMapping, MemType};
use crate::channel::{ContextHandle, IndirectBuffer, SubmitChannel, Timestamp};
use crate::error::{AllocError, DeviceError};

const KGSL_IOC_TYPE: c_ulong = 0x09;

const IOC_WRITE: c_ulong = 1;
const IOC_READ: c_ulong = 2;

const fn ioc(dir: c_ulong, nr: c_ulong, size: usize) -> c_ulong {
    (dir << 30) | ((size as c_ulong) << 16) | (KGSL_IOC_TYPE << 8) | nr
}

const fn iow<T>(nr: c_ulong) -> c_ulong {
    ioc(IOC_WRITE, nr, std::mem::size_of::<T>())
}

const fn ior<T>(nr: c_ulong) -> c_ulong {
    ioc(IOC_READ, nr, std::mem::size_of::<T>())
}

const fn iowr<T>(nr: c_ulong) -> c_ulong {
    ioc(IOC_READ | IOC_WRITE, nr, std::mem::size_of::<T>())
}

const KGSL_CONTEXT_SUBMIT_IB_LIST: c_uint = 0x0000_0004;
const KGSL_TIMESTAMP_RETIRED: c_uint = 0x0000_0002;
const KGSL_PROP_DEVICE_INFO: c_uint = 0x1;
const KGSL_PROP_VERSION: c_uint = 0x8;

#[repr(C)]
#[derive(Default)]
struct DrawctxtCreate {
    flags: c_uint,
    drawctxt_id: c_uint,
}

#[repr(C)]
struct DrawctxtDestroy {
    drawctxt_id: c_uint,
}

#[repr(C)]
struct IbDesc {
    gpuaddr: c_uint,
    hostptr: *mut c_void,
    sizedwords: c_uint,
    ctrl: c_uint,
}

#[repr(C)]
struct IssueIbCmds {
    drawctxt_id: c_uint,
    ibdesc_addr: c_uint,
    numibs: c_uint,
    timestamp: c_uint,
    flags: c_uint,
}

#[repr(C)]
struct WaitTimestamp {
    timestamp: c_uint,
    timeout: c_uint,
}

#[repr(C)]
struct ReadTimestamp {
    kind: c_uint,
    timestamp: c_uint,
}

#[repr(C)]
struct SharedmemFromVmalloc {
    gpuaddr: c_uint,
    hostptr: c_uint,
    flags: c_uint,
}

#[repr(C)]
struct SharedmemFree {
    gpuaddr: c_uint,
}

#[repr(C)]
struct GetProperty {
    kind: c_uint,
    value: *mut c_void,
    sizebytes: c_uint,
}

/// `KGSL_PROP_DEVICE_INFO`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceInfo {
    pub device_id: c_uint,
    pub chip_id: c_uint,
    pub mmu_enabled: c_uint,
    pub gmem_gpubaseaddr: c_uint,
    pub gpu_id: c_uint,
    pub gmem_sizebytes: c_uint,
}

/// `KGSL_PROP_VERSION`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct Version {
    pub drv_major: c_uint,
    pub drv_minor: c_uint,
    pub dev_major: c_uint,
    pub dev_minor: c_uint,
}

const IOCTL_KGSL_DEVICE_GETPROPERTY: c_ulong = iowr::<GetProperty>(0x2);
const IOCTL_KGSL_DEVICE_WAITTIMESTAMP: c_ulong = iow::<WaitTimestamp>(0x6);
const IOCTL_KGSL_RINGBUFFER_ISSUEIBCMDS: c_ulong = iowr::<IssueIbCmds>(0x10);
const IOCTL_KGSL_CMDSTREAM_READTIMESTAMP: c_ulong = ior::<ReadTimestamp>(0x11);
const IOCTL_KGSL_DRAWCTXT_CREATE: c_ulong = iowr::<DrawctxtCreate>(0x13);
const IOCTL_KGSL_DRAWCTXT_DESTROY: c_ulong = iow::<DrawctxtDestroy>(0x14);
const IOCTL_KGSL_SHAREDMEM_FREE: c_ulong = iow::<SharedmemFree>(0x21);
const IOCTL_KGSL_SHAREDMEM_FROM_VMALLOC: c_ulong = iowr::<SharedmemFromVmalloc>(0x23);

fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn device_error(errno: i32) -> DeviceError {
    match errno {
        libc::EINTR => DeviceError::Interrupted,
        libc::EAGAIN | libc::EBUSY => DeviceError::Busy,
        libc::ENODEV | libc::ENXIO => DeviceError::DeviceGone,
        libc::EINVAL => DeviceError::Rejected("EINVAL".to_string()),
        errno => DeviceError::Os { errno },
    }
}

/// # Safety
///
/// `request` must be an ioctl number whose argument type is `T`.
unsafe fn ioctl<T>(fd: &OwnedFd, request: c_ulong, arg: &mut T) -> Result<(), DeviceError> {
    let ret = libc::ioctl(fd.as_raw_fd(), request as _, arg as *mut T);
    if ret == -1 {
        Err(device_error(errno()))
    } else {
        Ok(())
    }
}

fn open(path: &Path) -> Result<OwnedFd, DeviceError> {
    let c_path = CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|_| DeviceError::Rejected(format!("bad device path {}", path.display())))?;
    // SAFETY: `c_path` is a valid NUL-terminated string.
    let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDWR | libc::O_CLOEXEC) };
    if fd < 0 {
        return Err(device_error(errno()));
    }
    // SAFETY: `fd` was just returned by `open` and is owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Submission channel on one KGSL device node.
#[derive(Debug)]
pub struct KgslChannel {
    fd: OwnedFd,
}

impl KgslChannel {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        Ok(Self {
            fd: open(path.as_ref())?,
        })
    }

    pub fn device_info(&self) -> Result<DeviceInfo, DeviceError> {
        let mut info = DeviceInfo::default();
        self.get_property(KGSL_PROP_DEVICE_INFO, &mut info)?;
        Ok(info)
    }

    pub fn version(&self) -> Result<Version, DeviceError> {
        let mut version = Version::default();
        self.get_property(KGSL_PROP_VERSION, &mut version)?;
        Ok(version)
    }

    /// Logs chip and driver identification.
    pub fn log_info(&self) -> Result<(), DeviceError> {
        let info = self.device_info()?;
        let version = self.version()?;
        info!(
            "chip-id {}.{}.{}.{}, device-id {}, gpu-id {}, mmu {}",
            (info.chip_id >> 24) & 0xff,
            (info.chip_id >> 16) & 0xff,
            (info.chip_id >> 8) & 0xff,
            info.chip_id & 0xff,
            info.device_id,
            info.gpu_id,
            info.mmu_enabled,
        );
        info!(
            "gmem base {:#010x} size {:#010x}, driver {}.{}, device {}.{}",
            info.gmem_gpubaseaddr,
            info.gmem_sizebytes,
            version.drv_major,
            version.drv_minor,
            version.dev_major,
            version.dev_minor,
        );
        Ok(())
    }

    fn get_property<T>(&self, kind: c_uint, value: &mut T) -> Result<(), DeviceError> {
        let mut req = GetProperty {
            kind,
            value: (value as *mut T).cast(),
            sizebytes: std::mem::size_of::<T>() as c_uint,
        };
        // SAFETY: `req.value` points at a live `T` of `sizebytes` bytes.
        unsafe { ioctl(&self.fd, IOCTL_KGSL_DEVICE_GETPROPERTY, &mut req) }
    }
}

impl SubmitChannel for KgslChannel {
    fn create_context(&mut self) -> Result<ContextHandle, DeviceError> {
        let mut req = DrawctxtCreate::default();
        // SAFETY: argument type matches the request.
        unsafe { ioctl(&self.fd, IOCTL_KGSL_DRAWCTXT_CREATE, &mut req)? };
        Ok(ContextHandle(req.drawctxt_id))
    }

    fn destroy_context(&mut self, ctx: ContextHandle) -> Result<(), DeviceError> {
        let mut req = DrawctxtDestroy { drawctxt_id: ctx.0 };
        // SAFETY: argument type matches the request.
        unsafe { ioctl(&self.fd, IOCTL_KGSL_DRAWCTXT_DESTROY, &mut req) }
    }

    fn submit(
        &mut self,
        ctx: ContextHandle,
        ib: &IndirectBuffer<'_>,
    ) -> Result<Timestamp, DeviceError> {
        let mut desc = IbDesc {
            gpuaddr: ib.gpuaddr.get(),
            hostptr: ib.host_addr as *mut c_void,
            sizedwords: ib.size_dwords,
            ctrl: 0,
        };
        let mut req = IssueIbCmds {
            drawctxt_id: ctx.0,
            ibdesc_addr: (&mut desc as *mut IbDesc) as usize as c_uint,
            numibs: 1,
            // z180 reads the IB host pointer from the timestamp field.
            timestamp: ib.host_addr as c_uint,
            flags: KGSL_CONTEXT_SUBMIT_IB_LIST,
        };
        // SAFETY: `desc` outlives the call and `req` matches the request.
        unsafe { ioctl(&self.fd, IOCTL_KGSL_RINGBUFFER_ISSUEIBCMDS, &mut req)? };
        Ok(Timestamp(req.timestamp))
    }

    fn wait_timestamp(
        &mut self,
        ts: Timestamp,
        timeout: Option<Duration>,
    ) -> Result<(), DeviceError> {
        let timeout = timeout.map_or(c_uint::MAX, |t| {
            c_uint::try_from(t.as_millis()).unwrap_or(c_uint::MAX)
        });
        let mut req = WaitTimestamp {
            timestamp: ts.0,
            timeout,
        };
        // SAFETY: argument type matches the request.
        unsafe { ioctl(&self.fd, IOCTL_KGSL_DEVICE_WAITTIMESTAMP, &mut req) }
    }

    fn read_retired_timestamp(&mut self) -> Result<Timestamp, DeviceError> {
        let mut req = ReadTimestamp {
            kind: KGSL_TIMESTAMP_RETIRED,
            timestamp: 0,
        };
        // SAFETY: argument type matches the request.
        unsafe { ioctl(&self.fd, IOCTL_KGSL_CMDSTREAM_READTIMESTAMP, &mut req)? };
        Ok(Timestamp(req.timestamp))
    }
}

/// Anonymous mapping registered with KGSL as shared memory.
struct VmallocMapping {
    fd: Arc<OwnedFd>,
    ptr: NonNull<u32>,
    len_bytes: usize,
    gpuaddr: GpuAddr,
}

// SAFETY: the mapping is exclusively owned; nothing else aliases `ptr`.
unsafe impl Send for VmallocMapping {}

impl fmt::Debug for VmallocMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmallocMapping")
            .field("ptr", &self.ptr)
            .field("len_bytes", &self.len_bytes)
            .field("gpuaddr", &self.gpuaddr)
            .finish()
    }
}

impl HostMapping for VmallocMapping {
    fn words(&self) -> &[u32] {
        // SAFETY: `ptr` maps `len_bytes` readable bytes for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len_bytes / 4) }
    }

    fn words_mut(&mut self) -> &mut [u32] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len_bytes / 4) }
    }
}

impl Drop for VmallocMapping {
    fn drop(&mut self) {
        let mut req = SharedmemFree {
            gpuaddr: self.gpuaddr.get(),
        };
        // SAFETY: argument type matches the request.
        if let Err(err) = unsafe { ioctl(&self.fd, IOCTL_KGSL_SHAREDMEM_FREE, &mut req) } {
            error!("sharedmem_free {:08x} failed: {err}", self.gpuaddr);
        }
        // SAFETY: `ptr`/`len_bytes` came from a successful `mmap`.
        unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len_bytes) };
    }
}

/// Allocator for ring memory backed by `SHAREDMEM_FROM_VMALLOC`. Buffers are bound at
/// allocation time; the memory type is ignored.
#[derive(Debug, Clone)]
pub struct VmallocAllocator {
    fd: Arc<OwnedFd>,
}

impl VmallocAllocator {
    /// `path` is normally `/dev/kgsl-3d0`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        Ok(Self {
            fd: Arc::new(open(path.as_ref())?),
        })
    }
}

impl DeviceAllocator for VmallocAllocator {
    fn allocate(&mut self, size_bytes: usize, memtype: MemType) -> Result<DeviceBuffer, AllocError> {
        if size_bytes == 0 {
            return Err(AllocError::ZeroSize);
        }
        let len_bytes = page_align(size_bytes).ok_or(AllocError::OutOfMemory { size_bytes })?;
        // SAFETY: anonymous mapping, no existing memory is touched.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len_bytes,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(AllocError::OutOfMemory {
                size_bytes: len_bytes,
            });
        }
        let Some(ptr) = NonNull::new(ptr.cast::<u32>()) else {
            return Err(AllocError::OutOfMemory {
                size_bytes: len_bytes,
            });
        };

        let mut req = SharedmemFromVmalloc {
            gpuaddr: 0,
            hostptr: ptr.as_ptr() as usize as c_uint,
            flags: 1,
        };
        // SAFETY: argument type matches the request.
        if let Err(err) = unsafe { ioctl(&self.fd, IOCTL_KGSL_SHAREDMEM_FROM_VMALLOC, &mut req) } {
            error!("sharedmem_from_vmalloc failed: {err}");
            // SAFETY: mapping created above and not yet shared.
            unsafe { libc::munmap(ptr.as_ptr().cast(), len_bytes) };
            return Err(err.into());
        }

        let gpuaddr = GpuAddr(req.gpuaddr);
        debug!(len_bytes, ?memtype, "vmalloc buffer at {:08x}", gpuaddr);
        let mapping = VmallocMapping {
            fd: Arc::clone(&self.fd),
            ptr,
            len_bytes,
            gpuaddr,
        };
        Ok(DeviceBuffer::bound(len_bytes, memtype, gpuaddr, Box::new(mapping)))
    }

    fn bind_for_device_access(&mut self, buf: &mut DeviceBuffer) -> Result<GpuAddr, AllocError> {
        buf.gpuaddr()
            .ok_or_else(|| AllocError::Device(DeviceError::Rejected("buffer not from kgsl".into())))
    }
}
