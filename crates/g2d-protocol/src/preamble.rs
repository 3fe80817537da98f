//! Initial device state.
//!
//! The state packet is not understood; this is a state block captured from the vendor 2D
//! library with the three context-buffer addresses fixed up at ring creation. It occupies the
//! first [`STATE_SIZE`] dwords of every command stream buffer and is re-executed with every
//! submission.

use crate::GpuAddr;

/// Size of the preamble, in dwords.
pub const STATE_SIZE: usize = 0x140;

/// Dword offsets inside the preamble holding the context-buffer addresses.
pub const CONTEXT_BUFFER_OFFSETS: [usize; 3] = [120, 122, 124];

/// Sizes of the context buffers the preamble expects, in bytes.
pub const CONTEXT_BUFFER_BYTES: [u32; 3] = [0x1000, 0x9000, 0x81000];

/// Dwords handed to the device per submission: the preamble plus the link descriptor that
/// chains into the command region.
pub const SUBMIT_SIZE_DWORDS: u32 = STATE_SIZE as u32 + 5;

/// Captured state. Words 120/122/124 hold the capture's context addresses and are always
/// overwritten by [`patched`].
#[rustfmt::skip]
pub static PREAMBLE: [u32; STATE_SIZE] = [
    0x7c00_0275, 0x0000_0000, 0x0005_0005, 0x7c00_0129,
    0x0000_0000, 0x7c00_012a, 0x0000_0000, 0x7c00_012b,
    0x0000_0000, 0x7c00_010f, 0x0000_0000, 0x7c00_0108,
    0x0000_0000, 0x7c00_0109, 0x0000_0000, 0x7c00_0100,
    0x0000_0000, 0x7c00_0101, 0x0000_0000, 0x7c00_0110,
    0x0000_0000, 0x7c00_01d0, 0x0000_0000, 0x7c00_01d4,
    0x0000_0000, 0x7c00_010c, 0x0000_0000, 0x7c00_010e,
    0x0000_0000, 0x7c00_010d, 0x0000_0000, 0x7c00_010b,
    0x0000_0000, 0x7c00_010a, 0x0000_0000, 0x7c00_0111,
    0x0000_0000, 0x7c00_0114, 0x0000_0000, 0x7c00_0115,
    0x0000_0000, 0x7c00_0116, 0x0000_0000, 0x7c00_0117,
    0x0000_0000, 0x7c00_0118, 0x0000_0000, 0x7c00_0119,
    0x0000_0000, 0x7c00_011a, 0x0000_0000, 0x7c00_011b,
    0x0000_0000, 0x7c00_011c, 0x0000_0000, 0x7c00_011d,
    0x0000_0000, 0x7c00_011e, 0x0000_0000, 0x7c00_011f,
    0x0000_0000, 0x7c00_0124, 0x0000_0000, 0x7c00_0125,
    0x0000_0000, 0x7c00_0127, 0x0000_0000, 0x7c00_0128,
    0x0000_0000, 0x7b00_015e, 0x0000_0000, 0x7b00_0161,
    0x0000_0000, 0x7b00_0165, 0x0000_0000, 0x7b00_0166,
    0x0000_0000, 0x7b00_016e, 0x0000_0000, 0x7c00_016f,
    0x0000_0000, 0x7b00_0165, 0x0000_0000, 0x7b00_0154,
    0x0000_0000, 0x7b00_0155, 0x0000_0000, 0x7b00_0153,
    0x0000_0000, 0x7b00_0168, 0x0000_0000, 0x7b00_0160,
    0x0000_0000, 0x7b00_0150, 0x0000_0000, 0x7b00_0156,
    0x0000_0000, 0x7b00_0157, 0x0000_0000, 0x7b00_0158,
    0x0000_0000, 0x7b00_0159, 0x0000_0000, 0x7b00_0152,
    0x0000_0000, 0x7b00_0151, 0x0000_0000, 0x7b00_0156,
    0x0000_0000, 0x7c00_017f, 0x0000_0000, 0x7c00_017f,
    0x0000_0000, 0x7c00_017f, 0x0000_0000, 0x7c00_017f,
    0x0000_0000, 0x7f00_0000, 0x7f00_0000, 0x7c00_0129,
    0x6614_2000, 0x7c00_012a, 0x6627_6000, 0x7c00_012b,
    0x6628_0000, 0x7c00_01e2, 0x0000_0000, 0x7c00_01e3,
    0x0000_0000, 0x7c00_01e4, 0x0000_0000, 0x7c00_01e5,
    0x0000_0000, 0x7c00_01e6, 0x0000_0000, 0x7c00_01e7,
    0x0000_0000, 0x7c00_01c0, 0x0000_0000, 0x7c00_01c1,
    0x0000_0000, 0x7c00_01c2, 0x0000_0000, 0x7c00_01c3,
    0x0000_0000, 0x7c00_01c4, 0x0000_0000, 0x7c00_01c5,
    0x0000_0000, 0x7c00_01c6, 0x0000_0000, 0x7c00_01c7,
    0x0000_0000, 0x7c00_01c8, 0x0000_0000, 0x7c00_01c9,
    0x0000_0000, 0x7c00_01ca, 0x0000_0000, 0x7c00_01d1,
    0x0000_0000, 0x7c00_01d2, 0x0000_0000, 0x7c00_01d4,
    0x0000_0000, 0x7c00_01d3, 0x0000_0000, 0x7c00_01d5,
    0x0000_0000, 0x7c00_01d0, 0x0000_0000, 0x7c00_01e0,
    0x0000_0000, 0x7c00_01e1, 0x0000_0000, 0x7c00_01e2,
    0x0000_0000, 0x7c00_01e3, 0x0000_0000, 0x7c00_01e4,
    0x0000_0000, 0x7c00_01e5, 0x0000_0000, 0x7c00_01e6,
    0x0000_0000, 0x7c00_01e7, 0x0000_0000, 0x7c00_01c0,
    0x0000_0000, 0x7c00_01c1, 0x0000_0000, 0x7c00_01c2,
    0x0000_0000, 0x7c00_01c3, 0x0000_0000, 0x7c00_01c4,
    0x0000_0000, 0x7c00_01c5, 0x0000_0000, 0x7c00_01c6,
    0x0000_0000, 0x7c00_01c7, 0x0000_0000, 0x7c00_01c8,
    0x0000_0000, 0x7c00_01c9, 0x0000_0000, 0x7c00_01ca,
    0x0000_0000, 0x7c00_01d1, 0x0000_0000, 0x7c00_01d2,
    0x0000_0000, 0x7c00_01d4, 0x0000_0000, 0x7c00_01d3,
    0x0000_0000, 0x7c00_01d5, 0x0000_0000, 0x7c00_01d0,
    0x0000_0000, 0x7c00_01e0, 0x0000_0000, 0x7c00_01e1,
    0x0000_0000, 0x7c00_01e2, 0x0000_0000, 0x7c00_01e3,
    0x0000_0000, 0x7c00_01e4, 0x0000_0000, 0x7c00_01e5,
    0x0000_0000, 0x7c00_01e6, 0x0000_0000, 0x7c00_01e7,
    0x0000_0000, 0x7c00_01c0, 0x0000_0000, 0x7c00_01c1,
    0x0000_0000, 0x7c00_01c2, 0x0000_0000, 0x7c00_01c3,
    0x0000_0000, 0x7c00_01c4, 0x0000_0000, 0x7c00_01c5,
    0x0000_0000, 0x7c00_01c6, 0x0000_0000, 0x7c00_01c7,
    0x0000_0000, 0x7c00_01c8, 0x0000_0000, 0x7c00_01c9,
    0x0000_0000, 0x7c00_01ca, 0x0000_0000, 0x7c00_01d1,
    0x0000_0000, 0x7c00_01d2, 0x0000_0000, 0x7c00_01d4,
    0x0000_0000, 0x7c00_01d3, 0x0000_0000, 0x7c00_01d5,
    0x0000_0000, 0x7c00_01d0, 0x0000_0000, 0x7c00_01e0,
    0x0000_0000, 0x7c00_01e1, 0x0000_0000, 0x7c00_01e2,
    0x0000_0000, 0x7c00_01e3, 0x0000_0000, 0x7c00_01e4,
    0x0000_0000, 0x7c00_01e5, 0x0000_0000, 0x7c00_01e6,
    0x0000_0000, 0x7c00_01e7, 0x0000_0000, 0x7c00_01c0,
    0x0000_0000, 0x7c00_01c1, 0x0000_0000, 0x7c00_01c2,
    0x0000_0000, 0x7c00_01c3, 0x0000_0000, 0x7c00_01c4,
    0x0000_0000, 0x7c00_01c5, 0x0000_0000, 0x7c00_01c6,
    0x0000_0000, 0x7c00_01c7, 0x0000_0000, 0x7c00_01c8,
    0x0000_0000, 0x7c00_01c9, 0x0000_0000, 0x7c00_01ca,
    0x0000_0000, 0x7c00_01d1, 0x0000_0000, 0x7c00_01d2,
    0x0000_0000, 0x7c00_01d4, 0x0000_0000, 0x7c00_01d3,
    0x0000_0000, 0x7c00_01d5, 0x0000_0000, 0x7f00_0000,
];

/// Returns the preamble with `ctx` patched into [`CONTEXT_BUFFER_OFFSETS`].
pub fn patched(ctx: [GpuAddr; 3]) -> [u32; STATE_SIZE] {
    let mut words = PREAMBLE;
    for (offset, addr) in CONTEXT_BUFFER_OFFSETS.iter().zip(ctx) {
        words[*offset] = addr.get();
    }
    words
}
