//! Packet framing words.
//!
//! Each packet carries the address/size of the next one (`0` meaning "no branch, next packet
//! follows"). The ring starts every cycle with an inter-packet header: a link descriptor whose
//! size word is back-patched at flush time, followed by an IB header the kernel fixes up.

use crate::regs::{reg, regm, Reg};
use crate::GpuAddr;

/// Link descriptor: next-address, next-size, control word.
pub const LINK_HEADER: [u32; 5] = [
    regm(Reg::Vgv3NextAddr, 2),
    0x0000_0000, // next address
    0x0000_0000, // next size
    regm(Reg::Vgv3Control, 1),
    0x0000_0000,
];

/// IB header; both payload words are fixed up by the kernel.
pub const IB_HEADER: [u32; 3] = [regm(Reg::Vgv3NextAddr, 2), 0x0000_0000, 0x0000_0000];

pub const LINK_HEADER_DWORDS: usize = LINK_HEADER.len();
pub const IB_HEADER_DWORDS: usize = IB_HEADER.len();
pub const INTER_PACKET_HEADER_DWORDS: usize = LINK_HEADER_DWORDS + IB_HEADER_DWORDS;

pub const NOP: u32 = reg(Reg::Vgv3Nop);

/// Common end of packet.
pub const END_TRAILER: [u32; 3] = [reg(Reg::G2dIdle) | 0x03, NOP, NOP];

pub const END_TRAILER_DWORDS: usize = END_TRAILER.len();

/// Distance, in dwords, back from the start of the command region to the link size word that
/// gets patched with the length of the pending packet.
pub const LINK_SIZE_BACKPATCH_OFFSET: usize = 6;

/// Added to the measured packet length when back-patching the link size word.
pub const LINK_SIZE_ADJUST: u32 = 8;

/// Payload length of the context start packet.
pub const CONTEXT_START_DWORDS: usize = 8;

/// Context start packet binding the three context buffers.
pub fn context_start(ctx: [GpuAddr; 3]) -> [u32; CONTEXT_START_DWORDS] {
    [
        regm(Reg::Vgv3ContextBase, 3),
        ctx[0].get(),
        ctx[1].get(),
        ctx[2].get(),
        0x1100_0000,
        0x10ff_f000,
        0x10ff_ffff,
        0x0d00_0404,
    ]
}

/// Value written into the link size word once the pending packet is closed.
///
/// `packet_dwords` is the distance from the start of the command region to the write cursor
/// after the flush trailer has been appended.
pub const fn link_size(packet_dwords: usize) -> u32 {
    packet_dwords as u32 + LINK_SIZE_ADJUST
}
