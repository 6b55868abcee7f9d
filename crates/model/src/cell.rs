//! Styled cell — the atomic unit of terminal history content.
//!
//! A [`Cell`] carries a codepoint, a foreground/background [`Color`] pair,
//! and an attribute [`CellAttrs`] bitmask. Wide glyphs occupy two adjacent
//! cells: the leader carries the codepoint, the trailing cell carries
//! codepoint `0` with the same style and the `WIDE` bit set on both.

use bitflags::bitflags;

// =============================================================================
// Color
// =============================================================================

/// Terminal color representation.
///
/// Mirrors the color modes a VT parser can emit: the terminal's own default,
/// one of the 16 standard ANSI slots, a 256-color palette index, or a
/// 24-bit true color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    /// Default foreground/background (terminal/theme decides).
    #[default]
    Default,
    /// Standard ANSI color, index 0..15.
    Standard(u8),
    /// 256-color palette index, 0..255.
    Palette256(u8),
    /// 24-bit RGB true color.
    TrueColor { r: u8, g: u8, b: u8 },
}

// =============================================================================
// CellAttrs
// =============================================================================

bitflags! {
    /// Text attribute bitmask for a [`Cell`].
    ///
    /// `WIDE` is not a rendering attribute in the usual sense but is folded
    /// into this mask because it shares the same on-disk byte (see the cell
    /// encoding in the PageStore line format) and because a cell's width is
    /// as much a structural fact about the cell as its style.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CellAttrs: u8 {
        const BOLD      = 0b0000_0001;
        const UNDERLINE = 0b0000_0010;
        const REVERSE   = 0b0000_0100;
        const WIDE      = 0b0000_1000;
    }
}

// =============================================================================
// Cell
// =============================================================================

/// A single styled character slot.
///
/// The trailing cell of a wide pair carries codepoint `0`, the same fg/bg
/// and attributes as the leader, and `WIDE` set on both cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    /// Unicode codepoint, or `0` for the trailing half of a wide glyph.
    pub codepoint: u32,
    pub fg: Color,
    pub bg: Color,
    pub attrs: CellAttrs,
}

impl Cell {
    /// Creates a new cell with the given codepoint, colors, and attributes.
    pub fn new(codepoint: u32, fg: Color, bg: Color, attrs: CellAttrs) -> Self {
        Self {
            codepoint,
            fg,
            bg,
            attrs,
        }
    }

    /// Returns true if this cell is the trailing half of a wide pair
    /// (wide and carrying no codepoint of its own).
    pub fn is_wide_trailer(&self) -> bool {
        self.attrs.contains(CellAttrs::WIDE) && self.codepoint == 0
    }

    /// Returns true if this cell is blank: default codepoint, default
    /// colors, no attributes.
    pub fn is_blank(&self) -> bool {
        *self == Cell::default()
    }
}

impl Default for Cell {
    /// The blank cell used by erase operations and grid padding: a space,
    /// default colors, no attributes.
    fn default() -> Self {
        Self {
            codepoint: ' ' as u32,
            fg: Color::Default,
            bg: Color::Default,
            attrs: CellAttrs::empty(),
        }
    }
}
