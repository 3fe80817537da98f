//! Register numbers and register-write word helpers.
//!
//! Two word shapes exist:
//! - `reg(r)`: single register write, value OR'd into the low 24 bits.
//! - `regm(r, n)`: raw write header; the next `n` dwords are written to `r`, `r + 1`, ...

/// z1xx 2D register numbers.
///
/// z160 and z180 are assumed to share this layout.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reg {
    G2dBase0 = 0x00,
    G2dCfg0 = 0x01,
    G2dCfg1 = 0x03,
    G2dScissorX = 0x08,
    G2dScissorY = 0x09,
    G2dForeground = 0x0a,
    G2dBackground = 0x0b,
    G2dAlphaBlend = 0x0c,
    G2dBlenderCfg = 0x11,
    G2dConst0 = 0xb0,
    G2dConst1 = 0xb1,
    G2dConst2 = 0xb2,
    G2dConst3 = 0xb3,
    G2dConst4 = 0xb4,
    G2dConst5 = 0xb5,
    G2dConst6 = 0xb6,
    G2dConst7 = 0xb7,
    G2dGradient = 0xd0,
    GradwTexCfg = 0xd1,
    GradwTexSize = 0xd2,
    GradwTexBase = 0xd3,
    G2dXy = 0xf0,
    G2dWidthHeight = 0xf1,
    G2dSxy = 0xf2,
    /// End-of-stream marker register (`0xfe000003`).
    G2dIdle = 0xfe,
    G2dColor = 0xff,

    Vgv3NextAddr = 0x75,
    Vgv3Control = 0x34,
    Vgv3ContextBase = 0x29,
    Vgv3WriteRaw = 0x7c,
    Vgv3Nop = 0x7f,
}

impl Reg {
    pub const fn num(self) -> u8 {
        self as u8
    }
}

/// Payload bits available to a single-register write.
pub const REG_VALUE_MASK: u32 = 0x00ff_ffff;

/// Single register write word. At most 24 bits of value may be OR'd in.
pub const fn reg(r: Reg) -> u32 {
    (r as u32) << 24
}

/// Raw multi-register write header covering `count` consecutive registers starting at `r`.
pub const fn regm(r: Reg, count: u8) -> u32 {
    reg(Reg::Vgv3WriteRaw) | ((count as u32) << 8) | (r as u32)
}

/// Packs a coordinate pair into one word: `x` in the high half, `y` in the low half, each masked
/// to 16 bits.
pub const fn pack_xy(x: i32, y: i32) -> u32 {
    (((x as u32) & 0xffff) << 16) | ((y as u32) & 0xffff)
}

/// Inverse of [`pack_xy`]; returns the masked halves.
pub const fn unpack_xy(word: u32) -> (u32, u32) {
    (word >> 16, word & 0xffff)
}

pub const PITCH_MASK: u32 = 0xfff;

/// Surface stride in device pitch units (32 bytes), masked to 12 bits.
pub const fn pitch_units(stride_bytes: u32) -> u32 {
    (stride_bytes >> 5) & PITCH_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regm_matches_captured_words() {
        // Words seen verbatim in the vendor captures.
        assert_eq!(regm(Reg::Vgv3NextAddr, 2), 0x7c00_0275);
        assert_eq!(regm(Reg::Vgv3Control, 1), 0x7c00_0134);
        assert_eq!(regm(Reg::Vgv3ContextBase, 3), 0x7c00_0329);
        assert_eq!(reg(Reg::G2dIdle) | 3, 0xfe00_0003);
        assert_eq!(reg(Reg::Vgv3Nop), 0x7f00_0000);
        assert_eq!(reg(Reg::G2dBlenderCfg), 0x1100_0000);
    }

    #[test]
    fn pack_xy_masks_each_half() {
        assert_eq!(pack_xy(10, 60), 0x000a_003c);
        assert_eq!(pack_xy(0x1_0005, -1), 0x0005_ffff);
        assert_eq!(unpack_xy(pack_xy(110, 60)), (110, 60));
    }

    #[test]
    fn pitch_is_in_32_byte_units() {
        assert_eq!(pitch_units(1024), 32);
        assert_eq!(pitch_units(31), 0);
        assert_eq!(pitch_units(0x20_0000), 0);
    }
}
