//! Helvetica text metrics and WinAnsi encoding for the built-in PDF fonts.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    pub fn resource_name(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }

    pub fn base_font(self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
        }
    }
}

/// Widths in 1/1000 em for bytes 32..=126.
#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Width used for bytes outside the ASCII table (accented letters, punctuation).
const FALLBACK_WIDTH: u16 = 556;

fn glyph_width(font: Font, byte: u8) -> u16 {
    let table = match font {
        Font::Regular => &HELVETICA,
        Font::Bold => &HELVETICA_BOLD,
    };
    match byte {
        32..=126 => table[(byte - 32) as usize],
        _ => FALLBACK_WIDTH,
    }
}

/// Width in points of WinAnsi-encoded text.
pub fn text_width(text: &[u8], font: Font, size: f64) -> f64 {
    let units: u32 = text.iter().map(|&b| u32::from(glyph_width(font, b))).sum();
    f64::from(units) * size / 1000.0
}

/// WinAnsi code for one character; control characters become spaces, unknown ones `?`.
fn winansi_byte(c: char) -> u8 {
    match c as u32 {
        0x20..=0x7E => c as u8,
        0xA0..=0xFF => c as u32 as u8,
        0x09 | 0x0A | 0x0D => b' ',
        0x20AC => 0x80,
        0x201A => 0x82,
        0x0192 => 0x83,
        0x201E => 0x84,
        0x2026 => 0x85,
        0x2020 => 0x86,
        0x2021 => 0x87,
        0x02C6 => 0x88,
        0x2030 => 0x89,
        0x0160 => 0x8A,
        0x2039 => 0x8B,
        0x0152 => 0x8C,
        0x017D => 0x8E,
        0x2018 => 0x91,
        0x2019 => 0x92,
        0x201C => 0x93,
        0x201D => 0x94,
        0x2022 => 0x95,
        0x2013 => 0x96,
        0x2014 => 0x97,
        0x02DC => 0x98,
        0x2122 => 0x99,
        0x0161 => 0x9A,
        0x203A => 0x9B,
        0x0153 => 0x9C,
        0x017E => 0x9E,
        0x0178 => 0x9F,
        _ => b'?',
    }
}

pub fn encode_winansi(text: &str) -> Vec<u8> {
    text.chars().map(winansi_byte).collect()
}

/// Split a long word into pieces no wider than `max_width` (at least one byte each).
fn split_word(word: &[u8], font: Font, size: f64, max_width: f64) -> Vec<Vec<u8>> {
    let mut pieces = Vec::new();
    let mut current = Vec::new();
    for &b in word {
        current.push(b);
        if current.len() > 1 && text_width(&current, font, size) > max_width {
            current.pop();
            pieces.push(std::mem::take(&mut current));
            current.push(b);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Greedy word wrap of `text` to lines no wider than `max_width`. Newlines force a break.
pub fn wrap(text: &str, font: Font, size: f64, max_width: f64) -> Vec<Vec<u8>> {
    let space = text_width(b" ", font, size);
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line: Vec<u8> = Vec::new();
        let mut line_width = 0.0;
        for word in paragraph.split_whitespace() {
            let encoded = encode_winansi(word);
            let width = text_width(&encoded, font, size);
            if !line.is_empty() && line_width + space + width <= max_width {
                line.push(b' ');
                line.extend_from_slice(&encoded);
                line_width += space + width;
                continue;
            }
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if width <= max_width {
                line = encoded;
                line_width = width;
            } else {
                let mut pieces = split_word(&encoded, font, size, max_width);
                let last = pieces.pop().unwrap_or_default();
                lines.extend(pieces);
                line_width = text_width(&last, font, size);
                line = last;
            }
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}
