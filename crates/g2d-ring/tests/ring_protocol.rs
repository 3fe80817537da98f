use g2d_protocol::packet::{END_TRAILER, LINK_HEADER, LINK_SIZE_BACKPATCH_OFFSET};
use g2d_protocol::preamble::{CONTEXT_BUFFER_OFFSETS, STATE_SIZE};
use g2d_ring::ring::COMMAND_START;
use g2d_ring::test_utils::{FakeCall, FakeDevice};
use g2d_ring::{
    AllocError, DeviceError, Ring, RingConfig, RingError, SysmemAllocator, Timestamp,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn new_ring(device: &FakeDevice) -> Ring<FakeDevice> {
    Ring::create(
        device.clone(),
        &mut SysmemAllocator::new(),
        RingConfig::default(),
    )
    .unwrap()
}

#[test]
fn flush_twice_is_a_no_op() {
    let device = FakeDevice::new();
    let mut ring = new_ring(&device);

    ring.flush(0).unwrap();
    ring.flush(0).unwrap();
    assert_eq!(ring.cursor(), COMMAND_START);
    assert!(device.submissions().is_empty());

    ring.begin(1).unwrap();
    ring.emit(0xdead_beef);
    ring.end().unwrap();
    assert_eq!(device.submissions().len(), 1);

    let cursor = ring.cursor();
    ring.flush(0).unwrap();
    assert_eq!(ring.cursor(), cursor);
    assert_eq!(device.submissions().len(), 1);
}

#[test]
fn link_size_is_backpatched_for_each_hint() {
    for hint in [0usize, 1, 37, 1024] {
        let device = FakeDevice::new();
        let mut ring = new_ring(&device);

        ring.begin(hint).unwrap();
        for i in 0..hint {
            ring.emit(i as u32);
        }
        ring.end().unwrap();

        let submissions = device.submissions();
        assert_eq!(submissions.len(), 1, "hint {hint}");
        let words = &submissions[0].words;

        // Inter-packet header, link header, payload, end trailer, flush trailer.
        let packet_dwords = 8 + LINK_HEADER.len() + hint + 2 * END_TRAILER.len();
        assert_eq!(words.len(), STATE_SIZE + packet_dwords, "hint {hint}");
        assert_eq!(
            words[STATE_SIZE - LINK_SIZE_BACKPATCH_OFFSET],
            (packet_dwords + 8) as u32,
            "hint {hint}"
        );

        let trailer_start = COMMAND_START + LINK_HEADER.len() + hint;
        assert_eq!(&words[trailer_start..trailer_start + 3], &END_TRAILER);
        assert_eq!(&words[trailer_start + 3..], &END_TRAILER);
    }
}

#[test]
fn submission_carries_preamble_and_fixed_ib_size() {
    let device = FakeDevice::new();
    let mut ring = new_ring(&device);
    ring.start_context().unwrap();

    let submissions = device.submissions();
    assert_eq!(submissions.len(), 1);
    let sub = &submissions[0];
    assert_eq!(sub.size_dwords, 0x145);
    assert_eq!(sub.gpuaddr, ring.cmdstream_addr());
    assert_eq!(sub.context, ring.context());

    let ctx = ring.context_addrs();
    for (offset, addr) in CONTEXT_BUFFER_OFFSETS.iter().zip(ctx) {
        assert_eq!(sub.words[*offset], addr.get());
    }
    let payload = COMMAND_START + LINK_HEADER.len();
    assert_eq!(
        &sub.words[payload..payload + 8],
        &[
            0x7c00_0329,
            ctx[0].get(),
            ctx[1].get(),
            ctx[2].get(),
            0x1100_0000,
            0x10ff_f000,
            0x10ff_ffff,
            0x0d00_0404,
        ]
    );
    assert_eq!(ring.stats().last_packet_dwords, 8);
}

#[test]
fn wait_retries_until_retired() {
    let device = FakeDevice::new().with_wait_latency(2);
    let mut ring = new_ring(&device);

    for _ in 0..3 {
        ring.begin(0).unwrap();
        ring.end().unwrap();
    }
    let ts = ring.timestamp();
    assert_eq!(ts, Timestamp(3));
    assert!(ts.is_retired_by(device.retired()));
    assert_eq!(ring.stats().wait_retries, 6);
    assert_eq!(ring.stats().waits, 3);

    for wait in device.waits() {
        if wait.result.is_ok() {
            assert!(wait.requested.is_retired_by(wait.retired));
        } else {
            assert_eq!(wait.result, Err(DeviceError::Busy));
            assert!(!wait.requested.is_retired_by(wait.retired));
        }
    }
}

#[test]
fn submit_failure_is_logged_and_ring_continues() {
    let device = FakeDevice::new();
    let mut ring = new_ring(&device);
    device.inject_fault(FakeCall::Submit, DeviceError::Rejected("bad ib".into()));

    ring.begin(1).unwrap();
    ring.emit(1);
    let ts = ring.end().unwrap();
    assert_eq!(ts, Timestamp(0));
    assert_eq!(ring.stats().submit_failures, 1);
    assert_eq!(ring.stats().waits, 0);
    assert_eq!(ring.cursor(), COMMAND_START);

    ring.begin(1).unwrap();
    ring.emit(2);
    assert_eq!(ring.end().unwrap(), Timestamp(1));
    assert_eq!(ring.stats().submissions, 1);
}

#[test]
fn fatal_wait_failure_assumes_completion() {
    let device = FakeDevice::new().with_wait_latency(1);
    let mut ring = new_ring(&device);
    device.inject_fault(FakeCall::Wait, DeviceError::DeviceGone);

    ring.begin(0).unwrap();
    ring.end().unwrap();
    assert_eq!(ring.stats().wait_failures, 1);
    assert_eq!(ring.stats().waits, 0);
}

#[test]
fn transient_wait_failures_are_retried() {
    let device = FakeDevice::new();
    let mut ring = new_ring(&device);
    device.inject_fault(FakeCall::Wait, DeviceError::Interrupted);
    device.inject_fault(FakeCall::Wait, DeviceError::Busy);

    ring.begin(0).unwrap();
    ring.end().unwrap();
    assert_eq!(ring.stats().wait_retries, 2);
    assert_eq!(ring.stats().waits, 1);
}

#[test]
fn mark_reads_retired_counter() {
    let device = FakeDevice::new();
    let mut ring = new_ring(&device);
    assert_eq!(ring.mark(), Timestamp(0));
    ring.begin(0).unwrap();
    let ts = ring.end().unwrap();
    assert_eq!(ring.mark(), ts);

    device.inject_fault(FakeCall::ReadRetired, DeviceError::DeviceGone);
    assert_eq!(ring.mark(), ts);
}

#[test]
fn context_creation_failure_is_fatal() {
    let device = FakeDevice::new();
    device.inject_fault(FakeCall::CreateContext, DeviceError::DeviceGone);
    let err = Ring::create(
        device.clone(),
        &mut SysmemAllocator::new(),
        RingConfig::default(),
    )
    .unwrap_err();
    assert_eq!(err, RingError::ContextCreate(DeviceError::DeviceGone));
}

#[test]
fn allocation_failure_releases_context() {
    let device = FakeDevice::new();
    // Room for the first two context buffers only.
    let mut alloc = SysmemAllocator::new().with_limit(0xa000);
    let err = Ring::create(device.clone(), &mut alloc, RingConfig::default()).unwrap_err();
    assert_eq!(
        err,
        RingError::Alloc(AllocError::OutOfMemory { size_bytes: 0x81000 })
    );
    assert!(device.live_contexts().is_empty());
    assert_eq!(alloc.allocated_bytes(), 0);
}

#[test]
fn rings_are_independent_across_threads() {
    let device = FakeDevice::new();
    let handles: Vec<_> = (0..2)
        .map(|n| {
            let mut ring = new_ring(&device);
            std::thread::spawn(move || {
                for i in 0..16u32 {
                    ring.begin(2).unwrap();
                    ring.emit(n);
                    ring.emit(i);
                    ring.end().unwrap();
                }
                ring.stats().submissions
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 16);
    }
    assert_eq!(device.submissions().len(), 32);
    assert!(device.live_contexts().is_empty());
}

proptest! {
    #[test]
    fn wait_never_returns_before_retirement(latency in 0u32..4, packets in 1usize..6) {
        let device = FakeDevice::new().with_wait_latency(latency);
        let mut ring = new_ring(&device);
        for _ in 0..packets {
            ring.begin(0).unwrap();
            let ts = ring.end().unwrap();
            prop_assert!(ts.is_retired_by(device.retired()));
        }
        let ok_waits = device.waits().into_iter().filter(|w| w.result.is_ok()).count();
        prop_assert_eq!(ok_waits, packets);
        prop_assert_eq!(ring.stats().wait_retries, u64::from(latency) * packets as u64);
    }
}
