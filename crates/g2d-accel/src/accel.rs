use g2d_ring::{Ring, SubmitChannel, Timestamp};
use tracing::{debug, warn};

use crate::error::{AccelError, Unaccelerated};
use crate::ops::{CompositeDraw, CopyDraw, DrawOp, SolidDraw};
use crate::surface::{Alu, Picture, Surface};
use crate::validate::{self, CompositeSelection};

/// Where the accelerator is in the prepare/draw/done cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Validated and parameters captured, nothing emitted yet.
    Prepared,
    /// A packet is open on the ring.
    Emitting,
    /// The last draw was submitted and retired; more draws may follow before `done`.
    Submitted,
}

#[derive(Debug, Clone, Copy)]
enum Prepared {
    Solid {
        dst: Surface,
        color: u32,
    },
    Copy {
        src: Surface,
        dst: Surface,
    },
    Composite {
        selection: CompositeSelection,
        src: Picture,
        mask: Option<Picture>,
        dst: Picture,
    },
}

/// Drawing front end over one ring.
#[derive(Debug)]
pub struct Accel<D: SubmitChannel> {
    ring: Ring<D>,
    phase: Phase,
    prepared: Option<Prepared>,
    draws: u64,
}

impl<D: SubmitChannel> Accel<D> {
    pub fn new(ring: Ring<D>) -> Self {
        Self {
            ring,
            phase: Phase::Idle,
            prepared: None,
            draws: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ring(&self) -> &Ring<D> {
        &self.ring
    }

    pub fn ring_mut(&mut self) -> &mut Ring<D> {
        &mut self.ring
    }

    pub fn into_ring(self) -> Ring<D> {
        self.ring
    }

    /// Draws issued since creation.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    pub fn prepare_solid(
        &mut self,
        dst: &Surface,
        alu: Alu,
        planemask: u32,
        color: u32,
    ) -> Result<(), Unaccelerated> {
        validate::check_solid(dst, alu, planemask)?;
        self.prepare(Prepared::Solid { dst: *dst, color });
        Ok(())
    }

    pub fn solid(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) -> Result<Timestamp, AccelError> {
        let Some(Prepared::Solid { dst, color }) = self.prepared else {
            return Err(AccelError::NotPrepared);
        };
        validate::check_point(x1, y1)?;
        validate::check_point(x2, y2)?;
        if x2 < x1 || y2 < y1 {
            debug!("fallback: inverted solid rect ({x1},{y1})-({x2},{y2})");
            return Err(Unaccelerated::InvertedRect.into());
        }
        validate::check_extent((x2 - x1) as u32, (y2 - y1) as u32)?;
        self.draw(DrawOp::Solid(SolidDraw {
            dst,
            color,
            x1,
            y1,
            x2,
            y2,
        }))
    }

    pub fn done_solid(&mut self) {
        self.done("solid");
    }

    /// Prepares a copy from `src` to `dst`. The two may be the same surface.
    pub fn prepare_copy(
        &mut self,
        src: &Surface,
        dst: &Surface,
        alu: Alu,
        planemask: u32,
    ) -> Result<(), Unaccelerated> {
        validate::check_copy(src, dst, alu, planemask)?;
        self.prepare(Prepared::Copy {
            src: *src,
            dst: *dst,
        });
        Ok(())
    }

    pub fn copy(
        &mut self,
        src_x: i32,
        src_y: i32,
        dst_x: i32,
        dst_y: i32,
        width: i32,
        height: i32,
    ) -> Result<Timestamp, AccelError> {
        let Some(Prepared::Copy { src, dst }) = self.prepared else {
            return Err(AccelError::NotPrepared);
        };
        if width < 0 || height < 0 {
            debug!("fallback: negative copy size {width}x{height}");
            return Err(Unaccelerated::InvertedRect.into());
        }
        validate::check_extent(width as u32, height as u32)?;
        validate::check_span(src_x, src_y, width, height)?;
        validate::check_span(dst_x, dst_y, width, height)?;
        self.draw(DrawOp::Copy(CopyDraw {
            src,
            dst,
            src_x,
            src_y,
            dst_x,
            dst_y,
            width,
            height,
        }))
    }

    pub fn done_copy(&mut self) {
        self.done("copy");
    }

    /// Whether `op` on these pictures can be accelerated. Does not change state.
    pub fn check_composite(
        &self,
        op: u8,
        src: &Picture,
        mask: Option<&Picture>,
        dst: &Picture,
    ) -> Result<CompositeSelection, Unaccelerated> {
        validate::check_composite(op, src, mask, dst)
    }

    pub fn prepare_composite(
        &mut self,
        op: u8,
        src: &Picture,
        mask: Option<&Picture>,
        dst: &Picture,
    ) -> Result<CompositeSelection, Unaccelerated> {
        let selection = validate::check_composite(op, src, mask, dst)?;
        self.prepare(Prepared::Composite {
            selection,
            src: *src,
            mask: mask.copied(),
            dst: *dst,
        });
        Ok(selection)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn composite(
        &mut self,
        src_x: i32,
        src_y: i32,
        mask_x: i32,
        mask_y: i32,
        dst_x: i32,
        dst_y: i32,
        width: i32,
        height: i32,
    ) -> Result<Timestamp, AccelError> {
        let Some(Prepared::Composite {
            selection,
            src,
            mask,
            dst,
        }) = self.prepared
        else {
            return Err(AccelError::NotPrepared);
        };
        if width < 0 || height < 0 {
            debug!("fallback: negative composite size {width}x{height}");
            return Err(Unaccelerated::InvertedRect.into());
        }
        validate::check_extent(width as u32, height as u32)?;
        if mask.is_some() && (mask_x, mask_y) != (src_x, src_y) {
            warn!(
                "mask offset ({mask_x},{mask_y}) ignored, sampling mask at ({src_x},{src_y})"
            );
        }
        // A repeating 1x1 source is a solid colour; always sample its only pixel.
        let (src_x, src_y) = if src.repeat { (0, 0) } else { (src_x, src_y) };
        validate::check_span(src_x, src_y, width, height)?;
        validate::check_span(dst_x, dst_y, width, height)?;
        self.draw(DrawOp::Composite(CompositeDraw {
            selection,
            src: src.surface,
            mask: mask.map(|m| m.surface),
            dst: dst.surface,
            src_x,
            src_y,
            dst_x,
            dst_y,
            width,
            height,
        }))
    }

    pub fn done_composite(&mut self) {
        self.done("composite");
    }

    /// Sync point for the caller: the device's current retired timestamp.
    pub fn mark_sync(&mut self) -> Timestamp {
        self.ring.mark()
    }

    /// Blocks until `marker` has retired.
    pub fn wait_marker(&mut self, marker: Timestamp) {
        self.ring.wait(marker);
    }

    fn prepare(&mut self, prepared: Prepared) {
        if self.phase == Phase::Prepared {
            debug!("previous prepare had no draw");
        }
        self.prepared = Some(prepared);
        self.phase = Phase::Prepared;
    }

    fn draw(&mut self, op: DrawOp) -> Result<Timestamp, AccelError> {
        self.ring.begin(op.size_hint())?;
        self.phase = Phase::Emitting;
        op.encode(&mut self.ring);
        let ts = self.ring.end()?;
        self.phase = Phase::Submitted;
        self.draws += 1;
        Ok(ts)
    }

    fn done(&mut self, what: &str) {
        match self.phase {
            Phase::Prepared => debug!("{what}: prepared without a draw"),
            Phase::Idle => debug!("{what}: done without prepare"),
            Phase::Emitting | Phase::Submitted => {}
        }
        self.prepared = None;
        self.phase = Phase::Idle;
    }
}
