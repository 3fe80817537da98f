//! Command stream contract for the z1xx (z160/z180) 2D accelerator.
//!
//! Everything in this crate describes the dword stream the device consumes: register write
//! words, packet framing, the captured initial state preamble, pixel formats and the composite
//! blend table. Nothing here talks to a device; see `g2d-ring` for submission and `g2d-accel`
//! for the drawing operation encoders.
//!
//! The packet framing, the state preamble and the context start packet were recovered from
//! command stream captures of the vendor blob rather than from documentation, and are kept
//! exactly as captured even where they look odd. The drawing payloads in `g2d-accel` are built
//! from the register map in [`regs`].

pub mod composite;
pub mod decode;
pub mod format;
pub mod packet;
pub mod preamble;
pub mod regs;
pub mod sink;

pub use composite::{BlendFactor, CompositeOp, CompositeRow, CompositeWords, COMPOSITE_OPS};
pub use format::{FormatClass, PixelFormat};
pub use regs::{pack_xy, pitch_units, reg, regm, Reg};
pub use sink::PacketSink;

/// Address in the accelerator's (32-bit) address space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GpuAddr(pub u32);

impl GpuAddr {
    pub const fn get(self) -> u32 {
        self.0
    }

    pub fn checked_add(self, bytes: u32) -> Option<GpuAddr> {
        self.0.checked_add(bytes).map(GpuAddr)
    }
}

impl core::fmt::LowerHex for GpuAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::LowerHex::fmt(&self.0, f)
    }
}
