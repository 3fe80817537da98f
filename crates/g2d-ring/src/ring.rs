use std::mem;

use g2d_protocol::packet::{
    context_start, link_size, CONTEXT_START_DWORDS, END_TRAILER, END_TRAILER_DWORDS, IB_HEADER,
    INTER_PACKET_HEADER_DWORDS, LINK_HEADER, LINK_HEADER_DWORDS, LINK_SIZE_BACKPATCH_OFFSET,
};
use g2d_protocol::preamble::{self, STATE_SIZE, SUBMIT_SIZE_DWORDS};
use g2d_protocol::{GpuAddr, PacketSink};
use tracing::{debug, error, info, trace, warn};

use crate::alloc::{DeviceAllocator, DeviceBuffer, MemType};
use crate::channel::{ContextHandle, IndirectBuffer, SubmitChannel, Timestamp};
use crate::config::RingConfig;
use crate::error::{AllocError, RingError};
use crate::stats::RingStats;

/// Dwords kept free behind every packet: its own trailer plus the one `flush` appends.
pub const PACKET_TAIL_DWORDS: usize = 2 * END_TRAILER_DWORDS;

/// First command-region dword available to packets.
pub const COMMAND_START: usize = STATE_SIZE + INTER_PACKET_HEADER_DWORDS;

const RING_MEMTYPE: MemType = MemType::Kmem;

#[derive(Debug, Clone, Copy)]
struct OpenPacket {
    payload_dwords: usize,
}

/// Command ring bound to one device context.
///
/// Layout of the command stream buffer:
///
/// ```text
/// [0, STATE_SIZE)            preamble, link size word at STATE_SIZE - 6
/// [STATE_SIZE, +8)           inter-packet header
/// [COMMAND_START, capacity)  packets
/// ```
#[derive(Debug)]
pub struct Ring<D: SubmitChannel> {
    channel: D,
    config: RingConfig,
    context: ContextHandle,
    cmdstream: DeviceBuffer,
    cmdstream_addr: GpuAddr,
    context_buffers: [DeviceBuffer; 3],
    context_addrs: [GpuAddr; 3],
    capacity: usize,
    cursor: usize,
    last_start: Option<usize>,
    open_packet: Option<OpenPacket>,
    timestamp: Timestamp,
    stats: RingStats,
}

impl<D: SubmitChannel> Ring<D> {
    /// Creates the device context, allocates and binds the ring buffers, installs the preamble
    /// and performs the initial flush.
    ///
    /// On failure nothing is left behind: the context is destroyed and any buffer allocated so
    /// far is released.
    pub fn create(
        mut channel: D,
        alloc: &mut dyn DeviceAllocator,
        config: RingConfig,
    ) -> Result<Self, RingError> {
        config.validate()?;

        let context = channel.create_context().map_err(|err| {
            error!("failed to create device context: {err}");
            RingError::ContextCreate(err)
        })?;

        let (cmdstream, context_buffers) = match allocate_buffers(alloc, &config) {
            Ok(buffers) => buffers,
            Err(err) => {
                error!("ring buffer allocation failed: {err}");
                if let Err(destroy_err) = channel.destroy_context(context) {
                    error!("failed to destroy context {}: {destroy_err}", context.0);
                }
                return Err(err.into());
            }
        };

        let mut ring = Self {
            channel,
            context,
            cmdstream_addr: cmdstream.0,
            cmdstream: cmdstream.1,
            context_addrs: context_buffers.each_ref().map(|(addr, _)| *addr),
            context_buffers: context_buffers.map(|(_, buf)| buf),
            capacity: config.cmdstream_words(),
            config,
            cursor: 0,
            last_start: None,
            open_packet: None,
            timestamp: Timestamp::default(),
            stats: RingStats::default(),
        };

        ring.cmdstream.words_mut()[..STATE_SIZE]
            .copy_from_slice(&preamble::patched(ring.context_addrs));

        info!(
            "context buffers: {:08x}, {:08x}, {:08x}",
            ring.context_addrs[0], ring.context_addrs[1], ring.context_addrs[2]
        );
        info!("cmdstream buffer: {:08x}", ring.cmdstream_addr);

        ring.flush(0)?;
        Ok(ring)
    }

    /// Emits the context start packet binding the three context buffers.
    pub fn start_context(&mut self) -> Result<Timestamp, RingError> {
        self.begin(CONTEXT_START_DWORDS)?;
        for word in context_start(self.context_addrs) {
            self.emit(word);
        }
        self.end()
    }

    /// Opens a packet with room for `size_hint` payload dwords, flushing first if the command
    /// region cannot hold it.
    pub fn begin(&mut self, size_hint: usize) -> Result<(), RingError> {
        if self.open_packet.is_some() {
            return Err(RingError::PacketOpen);
        }
        let needed = LINK_HEADER_DWORDS + size_hint + PACKET_TAIL_DWORDS;
        if needed > self.space() {
            self.flush(needed)?;
        }
        self.put_all(&LINK_HEADER);
        self.open_packet = Some(OpenPacket { payload_dwords: 0 });
        Ok(())
    }

    /// Appends one payload dword.
    ///
    /// Writing past what `begin` reserved is allowed; if the command region would overrun, the
    /// open packet is closed and submitted and the rest continues in a fresh packet.
    pub fn emit(&mut self, word: u32) {
        if self.cursor + 1 + PACKET_TAIL_DWORDS > self.capacity {
            self.overflow_flush();
        }
        self.put(word);
        self.stats.dwords_emitted += 1;
        if let Some(packet) = self.open_packet.as_mut() {
            packet.payload_dwords += 1;
        }
    }

    /// Appends a device address.
    pub fn emit_reloc(&mut self, addr: GpuAddr) {
        self.emit(addr.get());
    }

    /// Closes the open packet, submits it and waits for it to retire.
    pub fn end(&mut self) -> Result<Timestamp, RingError> {
        let packet = self.open_packet.take().ok_or(RingError::NoPacketOpen)?;
        self.put_all(&END_TRAILER);
        self.stats.packets += 1;
        self.stats.last_packet_dwords = packet.payload_dwords;
        self.flush(0)?;
        Ok(self.timestamp)
    }

    /// Submits everything written since the last flush and resets the command region.
    ///
    /// Does nothing when no packet was written. Afterwards at least `min_reserve` dwords must
    /// be free, otherwise [`RingError::PacketTooLarge`].
    pub fn flush(&mut self, min_reserve: usize) -> Result<(), RingError> {
        if self.open_packet.is_some() {
            return Err(RingError::PacketOpen);
        }
        if self.cursor != COMMAND_START {
            self.submit_pending();
            self.reset();
        }
        if min_reserve > self.space() {
            return Err(RingError::PacketTooLarge {
                requested: min_reserve,
                capacity: self.capacity - COMMAND_START,
            });
        }
        Ok(())
    }

    /// Blocks until `ts` retires.
    ///
    /// Transient failures are retried without bound. Any other failure is logged and the
    /// timestamp is assumed retired.
    pub fn wait(&mut self, ts: Timestamp) {
        loop {
            match self.channel.wait_timestamp(ts, None) {
                Ok(()) => {
                    self.stats.waits += 1;
                    return;
                }
                Err(err) if err.is_transient() => {
                    self.stats.wait_retries += 1;
                }
                Err(err) => {
                    self.stats.wait_failures += 1;
                    error!("waittimestamp {} failed: {err}", ts.0);
                    return;
                }
            }
        }
    }

    /// Device's current retired timestamp. Falls back to the last submitted timestamp if the
    /// read fails.
    pub fn mark(&mut self) -> Timestamp {
        match self.channel.read_retired_timestamp() {
            Ok(ts) => ts,
            Err(err) => {
                error!("readtimestamp failed: {err}");
                self.timestamp
            }
        }
    }

    pub fn context(&self) -> ContextHandle {
        self.context
    }

    pub fn config(&self) -> &RingConfig {
        &self.config
    }

    /// Timestamp of the last successful submission.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn stats(&self) -> &RingStats {
        &self.stats
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Dwords free between the cursor and the end of the command region.
    pub fn space(&self) -> usize {
        self.capacity - self.cursor
    }

    pub fn packet_open(&self) -> bool {
        self.open_packet.is_some()
    }

    pub fn cmdstream_addr(&self) -> GpuAddr {
        self.cmdstream_addr
    }

    pub fn context_addrs(&self) -> [GpuAddr; 3] {
        self.context_addrs
    }

    pub fn context_buffers(&self) -> &[DeviceBuffer; 3] {
        &self.context_buffers
    }

    /// Host view of the command stream buffer.
    pub fn words(&self) -> &[u32] {
        &self.cmdstream.words()[..self.capacity]
    }

    pub fn channel(&self) -> &D {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut D {
        &mut self.channel
    }

    fn put(&mut self, word: u32) {
        if self.config.log_dwords {
            trace!("ring[{:04x}] = {word:08x}", self.cursor);
        }
        self.cmdstream.words_mut()[self.cursor] = word;
        self.cursor += 1;
    }

    fn put_all(&mut self, words: &[u32]) {
        for &word in words {
            self.put(word);
        }
    }

    /// Appends the closing trailer, patches the link size and submits. Submission failures are
    /// logged and counted; the ring carries on as if the work had been accepted.
    fn submit_pending(&mut self) {
        let Some(start) = self.last_start else {
            return;
        };
        self.put_all(&END_TRAILER);

        let size = link_size(self.cursor - start);
        self.cmdstream.words_mut()[start - LINK_SIZE_BACKPATCH_OFFSET] = size;

        let ib = IndirectBuffer {
            gpuaddr: self.cmdstream_addr,
            host_addr: self.cmdstream.host_addr(),
            size_dwords: SUBMIT_SIZE_DWORDS,
            words: &self.cmdstream.words()[..self.cursor],
        };
        match self.channel.submit(self.context, &ib) {
            Ok(ts) => {
                self.stats.submissions += 1;
                self.timestamp = ts;
                debug!(
                    timestamp = ts.0,
                    link_size = size,
                    "submitted {} dwords",
                    self.cursor - start
                );
                // Only one submission may be in flight per context.
                self.wait(ts);
            }
            Err(err) => {
                self.stats.submit_failures += 1;
                error!("issueibcmds failed: {err}");
            }
        }
    }

    fn reset(&mut self) {
        self.stats.flushes += 1;
        self.cursor = STATE_SIZE;
        self.last_start = Some(self.cursor);
        self.put_all(&LINK_HEADER);
        self.put_all(&IB_HEADER);
    }

    fn overflow_flush(&mut self) {
        warn!(
            "ring overflow at dword {:#x}, splitting packet",
            self.cursor
        );
        self.stats.overflow_flushes += 1;
        let packet = self.open_packet.take();
        if packet.is_some() {
            self.put_all(&END_TRAILER);
        }
        self.submit_pending();
        self.reset();
        if let Some(packet) = packet {
            self.put_all(&LINK_HEADER);
            self.open_packet = Some(packet);
        }
    }
}

impl<D: SubmitChannel> PacketSink for Ring<D> {
    fn emit(&mut self, word: u32) {
        Ring::emit(self, word);
    }

    fn emit_reloc(&mut self, addr: GpuAddr) {
        Ring::emit_reloc(self, addr);
    }
}

impl<D: SubmitChannel> Ring<D> {
    /// Destroys the device context and returns the ring buffers to `alloc`.
    ///
    /// Plain `drop` only destroys the context; the buffers are then unmapped without the
    /// allocator seeing the release.
    pub fn destroy(mut self, alloc: &mut dyn DeviceAllocator) {
        let cmdstream = mem::replace(&mut self.cmdstream, detached_buffer());
        let context_buffers = mem::replace(
            &mut self.context_buffers,
            [detached_buffer(), detached_buffer(), detached_buffer()],
        );
        debug!(context = self.context.0, "releasing ring buffers");
        drop(self);
        alloc.free(cmdstream);
        for buf in context_buffers {
            alloc.free(buf);
        }
    }
}

/// Empty stand-in left behind when `destroy` moves the real buffers out.
fn detached_buffer() -> DeviceBuffer {
    DeviceBuffer::new(0, RING_MEMTYPE, Box::new(Vec::<u32>::new()))
}

impl<D: SubmitChannel> Drop for Ring<D> {
    fn drop(&mut self) {
        if let Err(err) = self.channel.destroy_context(self.context) {
            error!("failed to destroy context {}: {err}", self.context.0);
        }
    }
}

type BoundBuffer = (GpuAddr, DeviceBuffer);

fn allocate_buffers(
    alloc: &mut dyn DeviceAllocator,
    config: &RingConfig,
) -> Result<(BoundBuffer, [BoundBuffer; 3]), AllocError> {
    let [a, b, c] = config.context_buffer_bytes;
    let mut bound = Vec::with_capacity(4);
    for size in [a, b, c, config.cmdstream_bytes] {
        match allocate_bound(alloc, size) {
            Ok(buf) => bound.push(buf),
            Err(err) => {
                release(alloc, bound);
                return Err(err);
            }
        }
    }
    let short = AllocError::OutOfMemory {
        size_bytes: config.cmdstream_bytes,
    };
    match <[BoundBuffer; 4]>::try_from(bound) {
        Ok([ctx0, ctx1, ctx2, cmdstream])
            if cmdstream.1.words().len() >= config.cmdstream_words() =>
        {
            Ok((cmdstream, [ctx0, ctx1, ctx2]))
        }
        Ok(bufs) => {
            release(alloc, bufs.into());
            Err(short)
        }
        Err(bufs) => {
            release(alloc, bufs);
            Err(short)
        }
    }
}

fn release(alloc: &mut dyn DeviceAllocator, bufs: Vec<BoundBuffer>) {
    for (_, buf) in bufs {
        alloc.free(buf);
    }
}

fn allocate_bound(alloc: &mut dyn DeviceAllocator, size: usize) -> Result<BoundBuffer, AllocError> {
    let mut buf = alloc.allocate(size, RING_MEMTYPE)?;
    match alloc.bind_for_device_access(&mut buf) {
        Ok(addr) => Ok((addr, buf)),
        Err(err) => {
            alloc.free(buf);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::alloc::SysmemAllocator;
    use crate::test_utils::FakeDevice;

    fn ring() -> (FakeDevice, Ring<FakeDevice>) {
        let device = FakeDevice::new();
        let ring = Ring::create(
            device.clone(),
            &mut SysmemAllocator::new(),
            RingConfig::default(),
        )
        .unwrap();
        (device, ring)
    }

    #[test]
    fn create_installs_preamble_without_submitting() {
        let (device, ring) = ring();
        assert_eq!(device.submissions().len(), 0);
        assert_eq!(ring.cursor(), COMMAND_START);
        assert_eq!(ring.stats().flushes, 1);

        let words = ring.words();
        for (offset, addr) in preamble::CONTEXT_BUFFER_OFFSETS
            .iter()
            .zip(ring.context_addrs())
        {
            assert_eq!(words[*offset], addr.get());
        }
        assert_eq!(
            &words[STATE_SIZE..COMMAND_START],
            &[0x7c00_0275, 0, 0, 0x7c00_0134, 0, 0x7c00_0275, 0, 0]
        );
    }

    #[test]
    fn begin_twice_fails_closed() {
        let (_device, mut ring) = ring();
        ring.begin(4).unwrap();
        assert_eq!(ring.begin(4), Err(RingError::PacketOpen));
        assert_eq!(ring.flush(0), Err(RingError::PacketOpen));
        ring.end().unwrap();
        assert_eq!(ring.end(), Err(RingError::NoPacketOpen));
    }

    #[test]
    fn end_submits_and_waits_once() {
        let (device, mut ring) = ring();
        ring.begin(2).unwrap();
        ring.emit(0x1234);
        ring.emit(0x5678);
        let ts = ring.end().unwrap();

        let submissions = device.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].timestamp, ts);
        assert_eq!(submissions[0].size_dwords, 0x145);
        assert_eq!(submissions[0].gpuaddr, ring.cmdstream_addr());
        assert!(ts.is_retired_by(device.retired()));
        assert_eq!(ring.stats().last_packet_dwords, 2);
        assert_eq!(ring.cursor(), COMMAND_START);
    }

    #[test]
    fn oversized_packet_is_rejected() {
        let (_device, mut ring) = ring();
        let requested = ring.capacity();
        assert!(matches!(
            ring.begin(requested),
            Err(RingError::PacketTooLarge { .. })
        ));
        assert!(!ring.packet_open());
    }

    #[test]
    fn begin_flushes_when_region_is_short() {
        let (device, mut ring) = ring();
        let mut fill = ring.space() - LINK_HEADER_DWORDS - PACKET_TAIL_DWORDS - 20;
        ring.begin(fill).unwrap();
        while fill > 0 {
            ring.emit(0);
            fill -= 1;
        }
        ring.put_all(&END_TRAILER);
        ring.open_packet = None;
        assert_eq!(device.submissions().len(), 0);

        ring.begin(64).unwrap();
        assert_eq!(device.submissions().len(), 1);
        assert_eq!(ring.cursor(), COMMAND_START + LINK_HEADER_DWORDS);
    }

    #[test]
    fn emit_past_region_splits_the_packet() {
        let (device, mut ring) = ring();
        ring.begin(4).unwrap();
        let total = ring.capacity();
        for i in 0..total {
            ring.emit(i as u32);
        }
        ring.end().unwrap();

        assert_eq!(ring.stats().overflow_flushes, 1);
        assert_eq!(device.submissions().len(), 2);
        assert_eq!(ring.stats().packets, 1);
        assert_eq!(ring.stats().last_packet_dwords, total);
    }

    #[test]
    fn destroy_returns_buffers_to_the_allocator() {
        let device = FakeDevice::new();
        let mut alloc = SysmemAllocator::new();
        let ring = Ring::create(device.clone(), &mut alloc, RingConfig::default()).unwrap();
        assert!(alloc.allocated_bytes() > 0);

        ring.destroy(&mut alloc);
        assert_eq!(alloc.allocated_bytes(), 0);
        assert!(device.live_contexts().is_empty());
    }

    #[test]
    fn drop_destroys_context() {
        let (device, ring) = ring();
        let ctx = ring.context();
        assert_eq!(device.live_contexts(), vec![ctx]);
        drop(ring);
        assert!(device.live_contexts().is_empty());
    }
}
