//! Packet encoders.
//!
//! Each [`DrawOp`] knows its exact payload length and writes itself into any
//! [`PacketSink`]. Framing (link header and trailer) belongs to the ring.

use g2d_protocol::composite::{control_word, DISABLE_DST_ALPHA, DISABLE_SRC_ALPHA};
use g2d_protocol::packet::NOP;
use g2d_protocol::{pack_xy, reg, regm, GpuAddr, PacketSink, Reg};

use crate::surface::Surface;
use crate::validate::CompositeSelection;

pub const SOLID_DWORDS: usize = 13;
pub const COPY_DWORDS: usize = 16;
/// Composite payload with a mask and both alpha pads.
pub const COMPOSITE_MAX_DWORDS: usize = 26;

/// Destination base, format and pitch.
fn emit_dst(sink: &mut dyn PacketSink, dst: &Surface) {
    sink.emit(regm(Reg::G2dBase0, 2));
    sink.emit_reloc(dst.gpuaddr);
    sink.emit(dst.format_pitch());
}

/// Destination setup for the non-blending operations.
fn emit_dst_opaque(sink: &mut dyn PacketSink, dst: &Surface) {
    emit_dst(sink, dst);
    sink.emit(reg(Reg::G2dAlphaBlend));
    sink.emit(reg(Reg::G2dBlenderCfg));
}

fn emit_src(sink: &mut dyn PacketSink, src: &Surface) {
    sink.emit(regm(Reg::GradwTexCfg, 3));
    sink.emit(src.format_pitch());
    sink.emit(pack_xy(src.width as i32, src.height as i32));
    sink.emit_reloc(src.gpuaddr);
}

/// Solid fill of `(x1, y1)-(x2, y2)`, exclusive of the bottom-right corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolidDraw {
    pub dst: Surface,
    pub color: u32,
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl SolidDraw {
    fn encode(&self, sink: &mut dyn PacketSink) {
        emit_dst_opaque(sink, &self.dst);
        sink.emit(regm(Reg::G2dScissorX, 2));
        sink.emit(pack_xy(self.x1, self.y1));
        sink.emit(pack_xy(self.x2, self.y2));
        sink.emit(regm(Reg::G2dXy, 2));
        sink.emit(pack_xy(self.x1, self.y1));
        sink.emit(pack_xy(self.x2 - self.x1, self.y2 - self.y1));
        sink.emit(regm(Reg::G2dColor, 1));
        sink.emit(self.color);
    }
}

/// Copy of a `width` x `height` block. `src` and `dst` may be the same surface and may overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyDraw {
    pub src: Surface,
    pub dst: Surface,
    pub src_x: i32,
    pub src_y: i32,
    pub dst_x: i32,
    pub dst_y: i32,
    pub width: i32,
    pub height: i32,
}

impl CopyDraw {
    fn encode(&self, sink: &mut dyn PacketSink) {
        emit_dst_opaque(sink, &self.dst);
        emit_src(sink, &self.src);
        sink.emit(regm(Reg::G2dScissorX, 2));
        sink.emit(pack_xy(self.dst_x, self.dst_y));
        sink.emit(pack_xy(self.dst_x + self.width, self.dst_y + self.height));
        sink.emit(regm(Reg::G2dXy, 3));
        sink.emit(pack_xy(self.dst_x, self.dst_y));
        sink.emit(pack_xy(self.width, self.height));
        sink.emit(pack_xy(self.src_x, self.src_y));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeDraw {
    pub selection: CompositeSelection,
    pub src: Surface,
    pub mask: Option<Surface>,
    pub dst: Surface,
    pub src_x: i32,
    pub src_y: i32,
    pub dst_x: i32,
    pub dst_y: i32,
    pub width: i32,
    pub height: i32,
}

impl CompositeDraw {
    fn dwords(&self) -> usize {
        let row = self.selection.row;
        let mut n = COMPOSITE_MAX_DWORDS;
        if row.dst_has_alpha() {
            n -= DISABLE_DST_ALPHA.len();
        }
        if row.src_has_alpha() {
            n -= DISABLE_SRC_ALPHA.len();
        }
        if self.mask.is_none() {
            n -= 4;
        }
        n
    }

    fn encode(&self, sink: &mut dyn PacketSink) {
        let row = self.selection.row;

        emit_dst(sink, &self.dst);
        if !row.dst_has_alpha() {
            sink.emit_all(&DISABLE_DST_ALPHA);
        }
        if !row.src_has_alpha() {
            sink.emit_all(&DISABLE_SRC_ALPHA);
        }
        sink.emit_all(self.selection.blend);
        sink.emit(control_word(self.mask.is_some(), row.dst_has_alpha()));
        emit_src(sink, &self.src);

        // Mask coordinates cannot be programmed; the mask is sampled at the source offset.
        if let Some(mask) = &self.mask {
            sink.emit(regm(Reg::G2dConst2, 3));
            sink.emit_reloc(mask.gpuaddr);
            sink.emit(mask.format_pitch());
            sink.emit(pack_xy(mask.width as i32, mask.height as i32));
        }

        sink.emit(regm(Reg::G2dXy, 3));
        sink.emit(pack_xy(self.dst_x, self.dst_y));
        sink.emit(pack_xy(self.width, self.height));
        sink.emit(pack_xy(self.src_x, self.src_y));
        sink.emit(NOP);
        sink.emit(NOP);
    }
}

/// One accelerated drawing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOp {
    Solid(SolidDraw),
    Copy(CopyDraw),
    Composite(CompositeDraw),
}

impl DrawOp {
    /// Exact payload length in dwords.
    pub fn size_hint(&self) -> usize {
        match self {
            DrawOp::Solid(_) => SOLID_DWORDS,
            DrawOp::Copy(_) => COPY_DWORDS,
            DrawOp::Composite(c) => c.dwords(),
        }
    }

    pub fn encode(&self, sink: &mut dyn PacketSink) {
        match self {
            DrawOp::Solid(s) => s.encode(sink),
            DrawOp::Copy(c) => c.encode(sink),
            DrawOp::Composite(c) => c.encode(sink),
        }
    }

    /// Device addresses the operation reads or writes.
    pub fn surfaces(&self) -> Vec<GpuAddr> {
        match self {
            DrawOp::Solid(s) => vec![s.dst.gpuaddr],
            DrawOp::Copy(c) => vec![c.dst.gpuaddr, c.src.gpuaddr],
            DrawOp::Composite(c) => {
                let mut addrs = vec![c.dst.gpuaddr, c.src.gpuaddr];
                addrs.extend(c.mask.map(|m| m.gpuaddr));
                addrs
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use g2d_protocol::composite::{self, CompositeOp, CompositeRow};
    use g2d_protocol::decode::{last_value, register_writes};
    use g2d_protocol::regs::unpack_xy;
    use g2d_protocol::PixelFormat;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    fn argb(addr: u32, w: u32, h: u32) -> Surface {
        Surface::offscreen(GpuAddr(addr), w, h, PixelFormat::A8r8g8b8)
    }

    fn encode(op: &DrawOp) -> Vec<u32> {
        let mut words = Vec::new();
        op.encode(&mut words);
        assert_eq!(words.len(), op.size_hint());
        words
    }

    #[test]
    fn solid_words() {
        let dst = argb(0x1000_0000, 256, 256);
        let words = encode(&DrawOp::Solid(SolidDraw {
            dst,
            color: 0xff00_ff00,
            x1: 10,
            y1: 10,
            x2: 110,
            y2: 60,
        }));
        assert_eq!(
            words,
            vec![
                0x7c00_0200,
                0x1000_0000,
                0x6000 | 32,
                0x0c00_0000,
                0x1100_0000,
                0x7c00_0208,
                0x000a_000a,
                0x006e_003c,
                0x7c00_02f0,
                0x000a_000a,
                0x0064_0032,
                0x7c00_01ff,
                0xff00_ff00,
            ]
        );
    }

    #[test]
    fn copy_words() {
        let surface = argb(0x1000_0000, 256, 256);
        let words = encode(&DrawOp::Copy(CopyDraw {
            src: surface,
            dst: surface,
            src_x: 0,
            src_y: 0,
            dst_x: 16,
            dst_y: 8,
            width: 128,
            height: 64,
        }));
        assert_eq!(
            &words[5..],
            &[
                0x7c00_03d1,
                0x6000 | 32,
                0x0100_0100,
                0x1000_0000,
                0x7c00_0208,
                0x0010_0008,
                0x0090_0048,
                0x7c00_03f0,
                0x0010_0008,
                0x0080_0040,
                0x0000_0000,
            ]
        );
    }

    #[test]
    fn composite_lengths_follow_operands() {
        let argb_s = argb(0x1000_0000, 64, 64);
        let xrgb_s = Surface::offscreen(GpuAddr(0x2000_0000), 64, 64, PixelFormat::X8r8g8b8);
        let a8 = Surface::offscreen(GpuAddr(0x3000_0000), 64, 64, PixelFormat::A8);

        let draw = |src: Surface, dst: Surface, mask: Option<Surface>, row| CompositeDraw {
            selection: CompositeSelection {
                row,
                op: CompositeOp::Src,
                blend: composite::cell(row, CompositeOp::Src),
            },
            src,
            mask,
            dst,
            src_x: 0,
            src_y: 0,
            dst_x: 0,
            dst_y: 0,
            width: 8,
            height: 8,
        };

        let min = DrawOp::Composite(draw(argb_s, argb_s, None, CompositeRow::ArgbToArgb));
        assert_eq!(encode(&min).len(), 18);
        let max = DrawOp::Composite(draw(xrgb_s, xrgb_s, Some(a8), CompositeRow::XrgbToXrgb));
        assert_eq!(encode(&max).len(), COMPOSITE_MAX_DWORDS);

        let words = encode(&max);
        let writes = register_writes(&words).unwrap();
        assert_eq!(last_value(&writes, Reg::G2dConst2), Some(0x3000_0000));
        assert_eq!(last_value(&writes, Reg::G2dConst7), Some(0xff00_0000));
        assert_eq!(last_value(&writes, Reg::G2dConst6), Some(0xff00_0000));
    }

    proptest! {
        #[test]
        fn solid_rect_and_color_survive_decoding(
            x1 in 0i32..0x8000, y1 in 0i32..0x8000,
            w in 0i32..0x8000, h in 0i32..0x8000,
            color in any::<u32>(),
        ) {
            let (x2, y2) = (x1 + w, y1 + h);
            let op = DrawOp::Solid(SolidDraw {
                dst: argb(0x1000_0000, 64, 64),
                color, x1, y1, x2, y2,
            });
            let words = encode(&op);
            prop_assert_eq!(*words.last().unwrap(), color);

            let writes = register_writes(&words).unwrap();
            let scissor_lo = last_value(&writes, Reg::G2dScissorX).unwrap();
            let scissor_hi = last_value(&writes, Reg::G2dScissorY).unwrap();
            let origin = last_value(&writes, Reg::G2dXy).unwrap();
            let size = last_value(&writes, Reg::G2dWidthHeight).unwrap();
            prop_assert_eq!(unpack_xy(scissor_lo), (x1 as u32 & 0xffff, y1 as u32 & 0xffff));
            prop_assert_eq!(unpack_xy(scissor_hi), (x2 as u32 & 0xffff, y2 as u32 & 0xffff));
            prop_assert_eq!(unpack_xy(origin), (x1 as u32, y1 as u32));
            prop_assert_eq!(unpack_xy(size), (w as u32, h as u32));
            prop_assert_eq!(last_value(&writes, Reg::G2dColor), Some(color));
        }
    }
}
