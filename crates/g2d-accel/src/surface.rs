use g2d_protocol::{pitch_units, GpuAddr, PixelFormat};

/// A bound pixel buffer as the encoder sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Surface {
    pub gpuaddr: GpuAddr,
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes.
    pub pitch: u32,
    pub format: PixelFormat,
}

impl Surface {
    pub fn new(gpuaddr: GpuAddr, width: u32, height: u32, pitch: u32, format: PixelFormat) -> Self {
        Self {
            gpuaddr,
            width,
            height,
            pitch,
            format,
        }
    }

    /// Surface with the row pitch used for offscreen pixmaps.
    pub fn offscreen(gpuaddr: GpuAddr, width: u32, height: u32, format: PixelFormat) -> Self {
        let mut surface = Self::new(gpuaddr, width, height, 0, format);
        surface.pitch = surface.cpu_pitch();
        surface
    }

    /// Row pitch in bytes with the width aligned to 32 pixels.
    pub fn cpu_pitch(&self) -> u32 {
        ((self.width + 31) & !31) * self.format.bits_per_pixel() / 8
    }

    pub fn pitch_pixels(&self) -> u32 {
        match self.format.bits_per_pixel() / 8 {
            0 => self.pitch,
            bytes => self.pitch / bytes,
        }
    }

    /// Format and pitch in the layout shared by the destination, source and mask setup words.
    pub fn format_pitch(&self) -> u32 {
        self.format.cfg_bits() | pitch_units(self.pitch)
    }

    pub fn is_single_pixel(&self) -> bool {
        self.width == 1 && self.height == 1
    }
}

/// Projective transform in 16.16 fixed point, row major.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transform(pub [[i32; 3]; 3]);

impl Transform {
    pub const IDENTITY: Transform = Transform([[0x10000, 0, 0], [0, 0x10000, 0], [0, 0, 0x10000]]);

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    Nearest,
    Bilinear,
    Convolution,
}

/// Composite operand: a surface plus its Render picture attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Picture {
    pub surface: Surface,
    pub transform: Option<Transform>,
    pub repeat: bool,
    pub component_alpha: bool,
    pub filter: Filter,
}

impl Picture {
    pub fn new(surface: Surface) -> Self {
        Self {
            surface,
            transform: None,
            repeat: false,
            component_alpha: false,
            filter: Filter::Nearest,
        }
    }

    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_component_alpha(mut self) -> Self {
        self.component_alpha = true;
        self
    }
}

/// X11 raster operations (`GXclear` .. `GXset`).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alu {
    Clear = 0x0,
    And = 0x1,
    AndReverse = 0x2,
    Copy = 0x3,
    AndInverted = 0x4,
    NoOp = 0x5,
    Xor = 0x6,
    Or = 0x7,
    Nor = 0x8,
    Equiv = 0x9,
    Invert = 0xa,
    OrReverse = 0xb,
    CopyInverted = 0xc,
    OrInverted = 0xd,
    Nand = 0xe,
    Set = 0xf,
}

impl Alu {
    pub fn from_code(code: u8) -> Option<Self> {
        use Alu::*;
        const ALL: [Alu; 16] = [
            Clear, And, AndReverse, Copy, AndInverted, NoOp, Xor, Or, Nor, Equiv, Invert,
            OrReverse, CopyInverted, OrInverted, Nand, Set,
        ];
        ALL.get(usize::from(code)).copied()
    }
}
