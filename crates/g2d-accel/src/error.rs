use g2d_protocol::{CompositeOp, CompositeRow, PixelFormat};
use g2d_ring::RingError;
use thiserror::Error;

use crate::surface::{Alu, Filter};

/// Why an operation cannot be accelerated.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Unaccelerated {
    #[error("planemask {0:#010x} is not solid")]
    PlaneMask(u32),

    #[error("raster op {0:?} is not a plain copy")]
    Alu(Alu),

    #[error("{0} bpp surfaces are not supported")]
    Depth(u32),

    #[error("{width}x{height} exceeds the blit limits")]
    Extent { width: u32, height: u32 },

    #[error("pitch of {0} pixels exceeds the blit limits")]
    Pitch(u32),

    #[error("rectangle is inverted")]
    InvertedRect,

    #[error("coordinate ({x}, {y}) does not fit the 16-bit packing")]
    Coordinate { x: i32, y: i32 },

    #[error("transformed pictures are not supported")]
    Transform,

    #[error("only 1x1 pictures may repeat")]
    Repeat,

    #[error("component-alpha masks need nearest filtering, not {0:?}")]
    ComponentAlphaFilter(Filter),

    #[error("filter {0:?} is not supported")]
    Filter(Filter),

    #[error("format {0:?} cannot take part in compositing")]
    Format(PixelFormat),

    #[error("render op {0} is not supported")]
    Operator(u8),

    #[error("{op:?} is not implemented for {row:?}")]
    Pairing { row: CompositeRow, op: CompositeOp },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccelError {
    #[error(transparent)]
    Unaccelerated(#[from] Unaccelerated),

    #[error(transparent)]
    Ring(#[from] RingError),

    #[error("draw call without a matching prepare")]
    NotPrepared,
}
