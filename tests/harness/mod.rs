#![allow(dead_code)]

use std::sync::Once;

use anyhow::{Context, Result};
use g2d_protocol::decode::{register_writes, RegisterWrite};
use g2d_protocol::packet::LINK_HEADER_DWORDS;
use g2d_ring::ring::COMMAND_START;
use g2d_ring::test_utils::{FakeDevice, RecordedSubmission};
use g2d_ring::{Ring, RingConfig, SysmemAllocator};

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();
    });
}

/// The two 2D cores, each with its own device node and ring.
pub struct Engines {
    pub devices: [FakeDevice; 2],
    pub rings: [Ring<FakeDevice>; 2],
}

pub fn engines(config: RingConfig) -> Result<Engines> {
    let mut alloc = SysmemAllocator::new();
    let devices = [FakeDevice::new(), FakeDevice::new()];
    let ring0 = Ring::create(devices[0].clone(), &mut alloc, config.clone()).context("ring 0")?;
    let ring1 = Ring::create(devices[1].clone(), &mut alloc, config).context("ring 1")?;
    Ok(Engines {
        devices,
        rings: [ring0, ring1],
    })
}

/// Register writes made by the single packet of `sub`, excluding its link header.
pub fn packet_writes(sub: &RecordedSubmission, payload_dwords: usize) -> Result<Vec<RegisterWrite>> {
    let start = COMMAND_START + LINK_HEADER_DWORDS;
    let payload = sub
        .words
        .get(start..start + payload_dwords)
        .context("submission shorter than its packet")?;
    Ok(register_writes(payload)?)
}
