//! Drawing operations for the z1xx 2D accelerator.
//!
//! [`Accel`] exposes the EXA-shaped prepare/draw/done cycle on top of a [`g2d_ring::Ring`].
//! Every operation is first checked against what the hardware can do; anything it cannot is
//! reported as [`Unaccelerated`] before a single dword is written, and the caller is expected to
//! fall back to software. Accepted operations are encoded by [`DrawOp`] into one packet each.

mod accel;
mod error;
pub mod ops;
mod surface;
mod validate;

pub use accel::{Accel, Phase};
pub use error::{AccelError, Unaccelerated};
pub use ops::{CompositeDraw, CopyDraw, DrawOp, SolidDraw};
pub use surface::{Alu, Filter, Picture, Surface, Transform};
pub use validate::{
    check_composite, check_copy, check_solid, CompositeSelection, MAX_EXTENT, MAX_PITCH_PIXELS,
};
