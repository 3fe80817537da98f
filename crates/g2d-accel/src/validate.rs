//! Acceleration gates.
//!
//! Each check either accepts the operation or names the first constraint it violates. Nothing
//! here touches the ring.

use g2d_protocol::composite::{self, CompositeOp, CompositeRow, CompositeWords};
use g2d_protocol::PixelFormat;

use crate::error::Unaccelerated;
use crate::surface::{Alu, Filter, Picture, Surface};

/// Largest blit width or height.
pub const MAX_EXTENT: u32 = 2048;

/// Largest surface pitch, in pixels.
pub const MAX_PITCH_PIXELS: u32 = 2048;

const SOLID_PLANEMASK: u32 = 0xffff_ffff;

macro_rules! fail_if {
    ($cond:expr, $reason:expr) => {
        if $cond {
            tracing::debug!("fallback: {}", stringify!($cond));
            return Err($reason);
        }
    };
}

fn check_surface(surface: &Surface) -> Result<(), Unaccelerated> {
    let (width, height) = (surface.width, surface.height);
    fail_if!(
        width > MAX_EXTENT || height > MAX_EXTENT,
        Unaccelerated::Extent { width, height }
    );
    let pitch = surface.pitch_pixels();
    fail_if!(pitch > MAX_PITCH_PIXELS, Unaccelerated::Pitch(pitch));
    Ok(())
}

fn check_blit_surface(surface: &Surface) -> Result<(), Unaccelerated> {
    let bpp = surface.format.bits_per_pixel();
    fail_if!(bpp != 32, Unaccelerated::Depth(bpp));
    check_surface(surface)
}

fn check_raster(alu: Alu, planemask: u32) -> Result<(), Unaccelerated> {
    fail_if!(planemask != SOLID_PLANEMASK, Unaccelerated::PlaneMask(planemask));
    fail_if!(alu != Alu::Copy, Unaccelerated::Alu(alu));
    Ok(())
}

pub(crate) fn check_extent(width: u32, height: u32) -> Result<(), Unaccelerated> {
    fail_if!(
        width > MAX_EXTENT || height > MAX_EXTENT,
        Unaccelerated::Extent { width, height }
    );
    Ok(())
}

/// Coordinates are packed as 16-bit halves and must fit an `i16`.
pub(crate) fn check_point(x: i32, y: i32) -> Result<(), Unaccelerated> {
    let fits = |v: i32| i16::try_from(v).is_ok();
    fail_if!(!fits(x) || !fits(y), Unaccelerated::Coordinate { x, y });
    Ok(())
}

/// Checks the origin and the far corner of a `width` x `height` block at `(x, y)`.
pub(crate) fn check_span(x: i32, y: i32, width: i32, height: i32) -> Result<(), Unaccelerated> {
    check_point(x, y)?;
    let Some((x2, y2)) = x.checked_add(width).zip(y.checked_add(height)) else {
        tracing::debug!("fallback: corner of {width}x{height} at ({x},{y}) overflows");
        return Err(Unaccelerated::Coordinate { x, y });
    };
    check_point(x2, y2)
}

pub fn check_solid(dst: &Surface, alu: Alu, planemask: u32) -> Result<(), Unaccelerated> {
    check_raster(alu, planemask)?;
    check_blit_surface(dst)
}

pub fn check_copy(
    src: &Surface,
    dst: &Surface,
    alu: Alu,
    planemask: u32,
) -> Result<(), Unaccelerated> {
    check_raster(alu, planemask)?;
    check_blit_surface(src)?;
    check_blit_surface(dst)
}

/// Accepted composite: where in the operator table it lives and the words to splice in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeSelection {
    pub row: CompositeRow,
    pub op: CompositeOp,
    pub blend: &'static CompositeWords,
}

fn check_picture(picture: &Picture) -> Result<(), Unaccelerated> {
    fail_if!(
        picture.transform.is_some_and(|t| !t.is_identity()),
        Unaccelerated::Transform
    );
    fail_if!(
        picture.repeat && !picture.surface.is_single_pixel(),
        Unaccelerated::Repeat
    );
    fail_if!(
        picture.filter == Filter::Convolution,
        Unaccelerated::Filter(picture.filter)
    );
    check_surface(&picture.surface)
}

/// Checks a Render composite request. `op` is the Render `PictOp` code.
pub fn check_composite(
    op: u8,
    src: &Picture,
    mask: Option<&Picture>,
    dst: &Picture,
) -> Result<CompositeSelection, Unaccelerated> {
    let Some(op) = CompositeOp::from_render(op) else {
        tracing::debug!("fallback: unsupported render op {op}");
        return Err(Unaccelerated::Operator(op));
    };

    check_picture(src)?;
    check_picture(dst)?;
    if let Some(mask) = mask {
        fail_if!(
            mask.component_alpha && mask.filter != Filter::Nearest,
            Unaccelerated::ComponentAlphaFilter(mask.filter)
        );
        check_picture(mask)?;
        let format = mask.surface.format;
        fail_if!(
            format == PixelFormat::R5g6b5,
            Unaccelerated::Format(format)
        );
    }

    let src_format = src.surface.format;
    let Some(src_class) = src_format.composite_class() else {
        tracing::debug!("fallback: source format {src_format:?}");
        return Err(Unaccelerated::Format(src_format));
    };
    let dst_format = dst.surface.format;
    let Some(dst_class) = dst_format.composite_class() else {
        tracing::debug!("fallback: destination format {dst_format:?}");
        return Err(Unaccelerated::Format(dst_format));
    };

    let row = CompositeRow::select(src_class, dst_class);
    let Some(blend) = composite::lookup(row, op) else {
        tracing::debug!("fallback: {op:?} not implemented for {row:?}");
        return Err(Unaccelerated::Pairing { row, op });
    };

    Ok(CompositeSelection { row, op, blend })
}
