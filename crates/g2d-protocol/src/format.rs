//! Pixel formats and the format classes used to index the composite table.

/// Pixel formats the encoders know how to describe to the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    A8r8g8b8,
    X8r8g8b8,
    R5g6b5,
    A8,
}

/// Format field of a surface configuration word (bits 15:12, above the 12-bit pitch).
const CFG_FMT_SHIFT: u32 = 12;
const CFG_FMT_8888: u32 = 0x6;
const CFG_FMT_565: u32 = 0x5;
const CFG_FMT_A8: u32 = 0x1;

impl PixelFormat {
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            Self::A8r8g8b8 | Self::X8r8g8b8 => 32,
            Self::R5g6b5 => 16,
            Self::A8 => 8,
        }
    }

    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::A8r8g8b8 | Self::A8)
    }

    /// Format bits for a surface configuration word.
    pub const fn cfg_bits(self) -> u32 {
        let fmt = match self {
            Self::A8r8g8b8 | Self::X8r8g8b8 => CFG_FMT_8888,
            Self::R5g6b5 => CFG_FMT_565,
            Self::A8 => CFG_FMT_A8,
        };
        fmt << CFG_FMT_SHIFT
    }

    /// Composite table class, if the format can be a composite source or destination.
    pub const fn composite_class(self) -> Option<FormatClass> {
        match self {
            Self::A8r8g8b8 => Some(FormatClass::Argb),
            Self::X8r8g8b8 => Some(FormatClass::Xrgb),
            Self::R5g6b5 | Self::A8 => None,
        }
    }
}

/// Alpha presence of a 32bpp composite operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormatClass {
    Argb,
    Xrgb,
}

impl FormatClass {
    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::Argb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cfg_bits_stay_clear_of_pitch_field() {
        for fmt in [
            PixelFormat::A8r8g8b8,
            PixelFormat::X8r8g8b8,
            PixelFormat::R5g6b5,
            PixelFormat::A8,
        ] {
            assert_eq!(fmt.cfg_bits() & 0xfff, 0, "{fmt:?}");
            assert_ne!(fmt.cfg_bits(), 0, "{fmt:?}");
        }
    }

    #[test]
    fn only_32bpp_formats_have_a_composite_class() {
        assert_eq!(PixelFormat::A8r8g8b8.composite_class(), Some(FormatClass::Argb));
        assert_eq!(PixelFormat::X8r8g8b8.composite_class(), Some(FormatClass::Xrgb));
        assert_eq!(PixelFormat::R5g6b5.composite_class(), None);
        assert_eq!(PixelFormat::A8.composite_class(), None);
    }
}
