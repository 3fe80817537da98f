//! Composite operator table.
//!
//! Rows select the (source, destination) alpha-presence pairing, columns the Render operator.
//! Each cell holds the four blend-unit dwords the composite packet splices in verbatim. A cell
//! whose second dword is zero is not implemented for that pairing and must not be emitted.
//!
//! The blend unit has no `1 - dst_alpha` source factor, so operators needing one are only
//! available when the destination has no alpha channel (where the factor collapses to zero).
//! Rows without source/destination alpha carry the factors with the missing alpha already
//! substituted as `1`.

use bitflags::bitflags;

use crate::format::FormatClass;
use crate::regs::{reg, regm, Reg};

/// Four blend-control dwords.
pub type CompositeWords = [u32; 4];

/// Cell value for pairings the blend unit cannot express.
pub const UNSUPPORTED: CompositeWords = [0; 4];

/// Render-style operators with table support, in table column order.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompositeOp {
    Src = 0,
    In,
    Out,
    Over,
    OutReverse,
    Add,
    OverReverse,
    InReverse,
    Atop,
    AtopReverse,
    Xor,
}

impl CompositeOp {
    pub const ALL: [CompositeOp; 11] = [
        Self::Src,
        Self::In,
        Self::Out,
        Self::Over,
        Self::OutReverse,
        Self::Add,
        Self::OverReverse,
        Self::InReverse,
        Self::Atop,
        Self::AtopReverse,
        Self::Xor,
    ];

    pub const fn column(self) -> usize {
        self as usize
    }

    /// Maps a Render protocol `PictOp` code. `Clear`, `Dst`, and everything past `Add` have no
    /// table column.
    pub const fn from_render(op: u8) -> Option<Self> {
        Some(match op {
            1 => Self::Src,
            3 => Self::Over,
            4 => Self::OverReverse,
            5 => Self::In,
            6 => Self::InReverse,
            7 => Self::Out,
            8 => Self::OutReverse,
            9 => Self::Atop,
            10 => Self::AtopReverse,
            11 => Self::Xor,
            12 => Self::Add,
            _ => return None,
        })
    }
}

/// Table row: source class -> destination class.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompositeRow {
    ArgbToArgb = 0,
    XrgbToArgb = 1,
    ArgbToXrgb = 2,
    XrgbToXrgb = 3,
}

impl CompositeRow {
    pub const ALL: [CompositeRow; 4] = [
        Self::ArgbToArgb,
        Self::XrgbToArgb,
        Self::ArgbToXrgb,
        Self::XrgbToXrgb,
    ];

    pub const fn select(src: FormatClass, dst: FormatClass) -> Self {
        match (src.has_alpha(), dst.has_alpha()) {
            (true, true) => Self::ArgbToArgb,
            (false, true) => Self::XrgbToArgb,
            (true, false) => Self::ArgbToXrgb,
            (false, false) => Self::XrgbToXrgb,
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn src_has_alpha(self) -> bool {
        matches!(self, Self::ArgbToArgb | Self::ArgbToXrgb)
    }

    pub const fn dst_has_alpha(self) -> bool {
        matches!(self, Self::ArgbToArgb | Self::XrgbToArgb)
    }
}

/// Blend factor codes as laid out in `G2D_ALPHABLEND` (source factor in bits 3:0, destination
/// factor in bits 7:4).
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero = 0,
    One = 1,
    SrcAlpha = 2,
    InvSrcAlpha = 3,
    DstAlpha = 4,
    InvDstAlpha = 5,
}

impl BlendFactor {
    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::Zero,
            1 => Self::One,
            2 => Self::SrcAlpha,
            3 => Self::InvSrcAlpha,
            4 => Self::DstAlpha,
            5 => Self::InvDstAlpha,
            _ => return None,
        })
    }

    /// Splits an `G2D_ALPHABLEND` word into (source, destination) factors.
    pub const fn decode_pair(word: u32) -> (Option<Self>, Option<Self>) {
        (Self::from_code(word & 0xf), Self::from_code((word >> 4) & 0xf))
    }
}

bitflags! {
    /// `G2D_BLENDERCFG` payload bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BlenderCfg: u32 {
        const ENABLE = 0x0000_0001;
        const SRC_ALPHA = 0x0000_0010;
        const DST_ALPHA = 0x0000_0020;
    }
}

bitflags! {
    /// Bits OR'd into [`COMPOSITE_CONTROL_BASE`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct CompositeControl: u32 {
        const MASK = 0x0000_0080;
        const DST_ALPHA = 0x0020_0000;
    }
}

pub const COMPOSITE_CONTROL_BASE: u32 = reg(Reg::G2dCfg1) | 0x0000_0100;

/// Composite control word for the given operand shape.
pub const fn control_word(has_mask: bool, dst_has_alpha: bool) -> u32 {
    let mut word = COMPOSITE_CONTROL_BASE;
    if has_mask {
        word |= CompositeControl::MASK.bits();
    }
    if dst_has_alpha {
        word |= CompositeControl::DST_ALPHA.bits();
    }
    word
}

/// Padding emitted after the destination setup when the destination has no alpha channel.
pub const DISABLE_DST_ALPHA: [u32; 2] = [regm(Reg::G2dConst7, 1), 0xff00_0000];

/// Padding emitted after the destination setup when the source has no alpha channel.
pub const DISABLE_SRC_ALPHA: [u32; 2] = [regm(Reg::G2dConst6, 1), 0xff00_0000];

const fn blend(row: CompositeRow, fa: BlendFactor, fb: BlendFactor) -> CompositeWords {
    let mut cfg = BlenderCfg::ENABLE.bits();
    if row.src_has_alpha() {
        cfg |= BlenderCfg::SRC_ALPHA.bits();
    }
    if row.dst_has_alpha() {
        cfg |= BlenderCfg::DST_ALPHA.bits();
    }
    let factors = ((fb as u32) << 4) | (fa as u32);
    let alpha_write = if row.dst_has_alpha() { 0xff } else { 0x00 };
    [
        reg(Reg::G2dBlenderCfg) | cfg,
        reg(Reg::G2dAlphaBlend) | factors,
        reg(Reg::G2dConst0) | factors,
        reg(Reg::G2dConst1) | alpha_write,
    ]
}

use BlendFactor::{DstAlpha, InvSrcAlpha, One, SrcAlpha, Zero};
use CompositeRow::{ArgbToArgb, ArgbToXrgb, XrgbToArgb, XrgbToXrgb};

/// `[row][column]` blend words. Columns follow [`CompositeOp::ALL`].
#[rustfmt::skip]
pub static COMPOSITE_OPS: [[CompositeWords; 11]; 4] = [
    // ARGB -> ARGB
    [
        blend(ArgbToArgb, One, Zero),              // Src
        blend(ArgbToArgb, DstAlpha, Zero),         // In
        UNSUPPORTED,                               // Out
        blend(ArgbToArgb, One, InvSrcAlpha),       // Over
        blend(ArgbToArgb, Zero, InvSrcAlpha),      // OutReverse
        blend(ArgbToArgb, One, One),               // Add
        UNSUPPORTED,                               // OverReverse
        blend(ArgbToArgb, Zero, SrcAlpha),         // InReverse
        blend(ArgbToArgb, DstAlpha, InvSrcAlpha),  // Atop
        UNSUPPORTED,                               // AtopReverse
        UNSUPPORTED,                               // Xor
    ],
    // xRGB -> ARGB
    [
        blend(XrgbToArgb, One, Zero),
        blend(XrgbToArgb, DstAlpha, Zero),
        UNSUPPORTED,
        blend(XrgbToArgb, One, Zero),
        blend(XrgbToArgb, Zero, Zero),
        blend(XrgbToArgb, One, One),
        UNSUPPORTED,
        blend(XrgbToArgb, Zero, One),
        blend(XrgbToArgb, DstAlpha, Zero),
        UNSUPPORTED,
        UNSUPPORTED,
    ],
    // ARGB -> xRGB
    [
        blend(ArgbToXrgb, One, Zero),
        blend(ArgbToXrgb, One, Zero),
        blend(ArgbToXrgb, Zero, Zero),
        blend(ArgbToXrgb, One, InvSrcAlpha),
        blend(ArgbToXrgb, Zero, InvSrcAlpha),
        blend(ArgbToXrgb, One, One),
        blend(ArgbToXrgb, Zero, One),
        blend(ArgbToXrgb, Zero, SrcAlpha),
        blend(ArgbToXrgb, One, InvSrcAlpha),
        blend(ArgbToXrgb, Zero, SrcAlpha),
        blend(ArgbToXrgb, Zero, InvSrcAlpha),
    ],
    // xRGB -> xRGB
    [
        blend(XrgbToXrgb, One, Zero),
        blend(XrgbToXrgb, One, Zero),
        blend(XrgbToXrgb, Zero, Zero),
        blend(XrgbToXrgb, One, Zero),
        blend(XrgbToXrgb, Zero, Zero),
        blend(XrgbToXrgb, One, One),
        blend(XrgbToXrgb, Zero, One),
        blend(XrgbToXrgb, Zero, One),
        blend(XrgbToXrgb, One, Zero),
        blend(XrgbToXrgb, Zero, One),
        blend(XrgbToXrgb, Zero, Zero),
    ],
];

/// Raw table cell, including unsupported (all-zero) cells.
pub fn cell(row: CompositeRow, op: CompositeOp) -> &'static CompositeWords {
    &COMPOSITE_OPS[row.index()][op.column()]
}

/// Blend words for a supported pairing; `None` when the cell's second dword is zero.
pub fn lookup(row: CompositeRow, op: CompositeOp) -> Option<&'static CompositeWords> {
    let words = cell(row, op);
    (words[1] != 0).then_some(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Porter-Duff factors in terms of source alpha `a` and destination alpha `b`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Term {
        Zero,
        One,
        A,
        InvA,
        B,
        InvB,
    }

    fn porter_duff(op: CompositeOp) -> (Term, Term) {
        match op {
            CompositeOp::Src => (Term::One, Term::Zero),
            CompositeOp::In => (Term::B, Term::Zero),
            CompositeOp::Out => (Term::InvB, Term::Zero),
            CompositeOp::Over => (Term::One, Term::InvA),
            CompositeOp::OutReverse => (Term::Zero, Term::InvA),
            CompositeOp::Add => (Term::One, Term::One),
            CompositeOp::OverReverse => (Term::InvB, Term::One),
            CompositeOp::InReverse => (Term::Zero, Term::A),
            CompositeOp::Atop => (Term::B, Term::InvA),
            CompositeOp::AtopReverse => (Term::InvB, Term::A),
            CompositeOp::Xor => (Term::InvB, Term::InvA),
        }
    }

    /// Expected hardware factor, or `None` if the blend unit cannot produce it.
    fn lower(term: Term, row: CompositeRow) -> Option<BlendFactor> {
        let a_is_one = !row.src_has_alpha();
        let b_is_one = !row.dst_has_alpha();
        Some(match term {
            Term::Zero => BlendFactor::Zero,
            Term::One => BlendFactor::One,
            Term::A if a_is_one => BlendFactor::One,
            Term::A => BlendFactor::SrcAlpha,
            Term::InvA if a_is_one => BlendFactor::Zero,
            Term::InvA => BlendFactor::InvSrcAlpha,
            Term::B if b_is_one => BlendFactor::One,
            Term::B => BlendFactor::DstAlpha,
            Term::InvB if b_is_one => BlendFactor::Zero,
            Term::InvB => return None,
        })
    }

    #[test]
    fn every_cell_matches_porter_duff_with_alpha_substitution() {
        for row in CompositeRow::ALL {
            for op in CompositeOp::ALL {
                let (fa, fb) = porter_duff(op);
                let expected = lower(fa, row).zip(lower(fb, row));
                match (expected, lookup(row, op)) {
                    (None, None) => {}
                    (Some((fa, fb)), Some(words)) => {
                        let (got_a, got_b) = BlendFactor::decode_pair(words[1]);
                        assert_eq!(got_a, Some(fa), "{row:?} {op:?}");
                        assert_eq!(got_b, Some(fb), "{row:?} {op:?}");
                        assert_eq!(words[1] & 0xff, words[2] & 0xff, "{row:?} {op:?}");
                    }
                    (expected, got) => {
                        panic!("{row:?} {op:?}: expected {expected:?}, table has {got:?}")
                    }
                }
            }
        }
    }

    #[test]
    fn unsupported_cells_are_fully_zero() {
        for row in CompositeRow::ALL {
            for op in CompositeOp::ALL {
                let words = cell(row, op);
                if words[1] == 0 {
                    assert_eq!(*words, UNSUPPORTED, "{row:?} {op:?}");
                }
            }
        }
    }

    #[test]
    fn supported_cell_counts_per_row() {
        let counts: Vec<usize> = CompositeRow::ALL
            .iter()
            .map(|&row| {
                CompositeOp::ALL
                    .iter()
                    .filter(|&&op| lookup(row, op).is_some())
                    .count()
            })
            .collect();
        assert_eq!(counts, vec![7, 7, 11, 11]);
    }

    #[test]
    fn row_selection_by_alpha_presence() {
        assert_eq!(
            CompositeRow::select(FormatClass::Xrgb, FormatClass::Argb).index(),
            1
        );
        assert_eq!(
            CompositeRow::select(FormatClass::Argb, FormatClass::Argb),
            CompositeRow::ArgbToArgb
        );
        assert_eq!(
            CompositeRow::select(FormatClass::Xrgb, FormatClass::Xrgb).index(),
            3
        );
    }

    #[test]
    fn render_codes_round_into_columns() {
        assert_eq!(CompositeOp::from_render(0), None); // Clear
        assert_eq!(CompositeOp::from_render(2), None); // Dst
        assert_eq!(CompositeOp::from_render(3), Some(CompositeOp::Over));
        assert_eq!(CompositeOp::from_render(12), Some(CompositeOp::Add));
        assert_eq!(CompositeOp::from_render(13), None);
    }

    #[test]
    fn control_word_flags() {
        assert_eq!(control_word(false, false), COMPOSITE_CONTROL_BASE);
        assert_eq!(control_word(true, false), COMPOSITE_CONTROL_BASE | 0x80);
        assert_eq!(control_word(false, true), COMPOSITE_CONTROL_BASE | 0x0020_0000);
    }
}
