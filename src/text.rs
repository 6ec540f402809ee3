//! Cell options and line breaking for the text API.

use serde_derive::{Deserialize, Serialize};

use crate::font::FontEntry;

/// Horizontal alignment inside a cell
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Vertical alignment inside a cell
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VAlign {
    #[default]
    Top,
    Middle,
    Bottom,
}

/// Cell border sides, a bitset
pub struct Border;

impl Border {
    pub const NONE: u8 = 0;
    pub const LEFT: u8 = 1;
    pub const TOP: u8 = 2;
    pub const RIGHT: u8 = 4;
    pub const BOTTOM: u8 = 8;
    pub const ALL: u8 = 15;
}

/// Where the cursor moves after a cell is placed
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Float {
    /// advance x past the cell (the default)
    #[default]
    Right,
    /// carriage-return to the cell's left edge, advance y
    Bottom,
}

/// How `multi_cell` splits text that exceeds the cell width
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BreakMode {
    /// break at word boundaries, mid-word only when a single word
    /// exceeds the width
    #[default]
    WordSensitive,
    /// break at any codepoint
    Strict,
    /// like word-sensitive, but a mid-word break appends the indicator
    /// rune (typically a hyphen); words are split on `separator`
    IndicatorSensitive { indicator: char, separator: String },
}

/// Options of `cell_with_option` / `multi_cell_with_option`
#[derive(Debug, Clone)]
pub struct CellOption {
    pub h_align: HAlign,
    pub v_align: VAlign,
    /// [`Border`] bits
    pub border: u8,
    pub float: Float,
    /// line height as a multiple of the font size
    pub line_height: f32,
    /// underline offset below the baseline, as a multiple of the size
    pub underline_position: f32,
    /// underline thickness as a multiple of the size
    pub underline_thickness: f32,
    pub break_mode: BreakMode,
}

impl Default for CellOption {
    fn default() -> Self {
        Self {
            h_align: HAlign::Left,
            v_align: VAlign::Top,
            border: Border::NONE,
            float: Float::Right,
            line_height: 1.2,
            underline_position: 0.12,
            underline_thickness: 0.07,
            break_mode: BreakMode::WordSensitive,
        }
    }
}

/// Splits `text` into lines not wider than `max_width` points.
/// Measurement runs over the codepoint sequence; a `\n` always breaks.
pub(crate) fn break_text(
    text: &str,
    font: &FontEntry,
    size: f32,
    char_spacing: f32,
    kerning: bool,
    max_width: f32,
    mode: &BreakMode,
) -> Vec<String> {
    let mut lines = Vec::new();
    for hard_line in text.split('\n') {
        if hard_line.is_empty() {
            lines.push(String::new());
            continue;
        }
        match mode {
            BreakMode::Strict => {
                break_strict(hard_line, font, size, char_spacing, kerning, max_width, &mut lines)
            }
            BreakMode::WordSensitive => break_words(
                hard_line, " ", None, font, size, char_spacing, kerning, max_width, &mut lines,
            ),
            BreakMode::IndicatorSensitive { indicator, separator } => break_words(
                hard_line,
                separator,
                Some(*indicator),
                font,
                size,
                char_spacing,
                kerning,
                max_width,
                &mut lines,
            ),
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn width_of(font: &FontEntry, s: &str, size: f32, char_spacing: f32, kerning: bool) -> f32 {
    font.text_width(s, size, char_spacing, kerning)
}

fn break_strict(
    text: &str,
    font: &FontEntry,
    size: f32,
    char_spacing: f32,
    kerning: bool,
    max_width: f32,
    out: &mut Vec<String>,
) {
    let mut current = String::new();
    for c in text.chars() {
        let mut candidate = current.clone();
        candidate.push(c);
        if !current.is_empty()
            && width_of(font, &candidate, size, char_spacing, kerning) > max_width
        {
            out.push(std::mem::take(&mut current));
            current.push(c);
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
}

#[allow(clippy::too_many_arguments)]
fn break_words(
    text: &str,
    separator: &str,
    indicator: Option<char>,
    font: &FontEntry,
    size: f32,
    char_spacing: f32,
    kerning: bool,
    max_width: f32,
    out: &mut Vec<String>,
) {
    let sep = if separator.is_empty() { " " } else { separator };
    let mut current = String::new();
    for word in text.split(sep) {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{}{}{}", current, sep, word)
        };
        if width_of(font, &candidate, size, char_spacing, kerning) <= max_width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        // the word alone may still be too wide
        if width_of(font, word, size, char_spacing, kerning) <= max_width {
            current = word.to_string();
        } else {
            split_long_word(
                word, indicator, font, size, char_spacing, kerning, max_width, out,
                &mut current,
            );
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
}

#[allow(clippy::too_many_arguments)]
fn split_long_word(
    word: &str,
    indicator: Option<char>,
    font: &FontEntry,
    size: f32,
    char_spacing: f32,
    kerning: bool,
    max_width: f32,
    out: &mut Vec<String>,
    current: &mut String,
) {
    let mut piece = String::new();
    for c in word.chars() {
        let mut candidate = piece.clone();
        candidate.push(c);
        let candidate_width = match indicator {
            Some(ind) => {
                let mut with_ind = candidate.clone();
                with_ind.push(ind);
                width_of(font, &with_ind, size, char_spacing, kerning)
            }
            None => width_of(font, &candidate, size, char_spacing, kerning),
        };
        if !piece.is_empty() && candidate_width > max_width {
            if let Some(ind) = indicator {
                piece.push(ind);
            }
            out.push(std::mem::take(&mut piece));
            piece.push(c);
        } else {
            piece = candidate;
        }
    }
    *current = piece;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::{FontEntry, TtfFont};
    use crate::testutil::minimal_ttf;

    fn font() -> FontEntry {
        FontEntry::new("Test", "", TtfFont::parse(minimal_ttf()).unwrap())
    }

    // each glyph in the test font advances 500/1000 em, so at size 10
    // every char is 5pt wide

    #[test]
    fn no_break_needed() {
        let lines = break_text("AB AB", &font(), 10.0, 0.0, false, 100.0, &BreakMode::WordSensitive);
        assert_eq!(lines, vec!["AB AB"]);
    }

    #[test]
    fn word_sensitive_breaks_at_spaces() {
        // "ABAB ABAB" at 5pt/char: whole string 45pt, each word 20pt
        let lines = break_text(
            "ABAB ABAB",
            &font(),
            10.0,
            0.0,
            false,
            25.0,
            &BreakMode::WordSensitive,
        );
        assert_eq!(lines, vec!["ABAB", "ABAB"]);
    }

    #[test]
    fn strict_breaks_mid_word() {
        let lines = break_text(
            "ABABAB",
            &font(),
            10.0,
            0.0,
            false,
            10.0,
            &BreakMode::Strict,
        );
        assert_eq!(lines, vec!["AB", "AB", "AB"]);
    }

    #[test]
    fn long_word_is_split_even_in_word_mode() {
        let lines = break_text(
            "ABABABAB",
            &font(),
            10.0,
            0.0,
            false,
            20.0,
            &BreakMode::WordSensitive,
        );
        assert_eq!(lines, vec!["ABAB", "ABAB"]);
    }

    #[test]
    fn indicator_appends_rune() {
        let lines = break_text(
            "ABABABAB",
            &font(),
            10.0,
            0.0,
            false,
            20.0,
            &BreakMode::IndicatorSensitive {
                indicator: 'A',
                separator: " ".to_string(),
            },
        );
        // indicator occupies width, so three glyphs + indicator per line
        assert_eq!(lines, vec!["ABAA", "BABA", "AB"]);
    }

    #[test]
    fn newline_always_breaks() {
        let lines = break_text("A\n\nB", &font(), 10.0, 0.0, false, 100.0, &BreakMode::Strict);
        assert_eq!(lines, vec!["A", "", "B"]);
    }
}
