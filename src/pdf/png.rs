//! Minimal PNG decoder for mod icons: non-interlaced gray, RGB, palette, gray+alpha and RGBA
//! at the standard bit depths. Chunk CRCs are not verified.

use flate2::read::ZlibDecoder;
use std::io::Read;
use thiserror::Error;

const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];
const MAX_DIMENSION: u32 = 4096;

#[derive(Debug, Error)]
pub enum PngError {
    #[error("not a PNG file")]
    NotPng,

    #[error("PNG data is truncated")]
    Truncated,

    #[error("unsupported PNG: {0}")]
    Unsupported(String),

    #[error("corrupt PNG: {0}")]
    Corrupt(String),
}

/// 8-bit RGB pixels plus an optional 8-bit alpha plane (only when some pixel is not opaque).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy)]
struct Header {
    width: u32,
    height: u32,
    bit_depth: u8,
    color_type: u8,
}

impl Header {
    fn channels(&self) -> usize {
        match self.color_type {
            0 | 3 => 1,
            2 => 3,
            4 => 2,
            _ => 4,
        }
    }

    fn bits_per_pixel(&self) -> usize {
        self.channels() * usize::from(self.bit_depth)
    }

    /// Bytes per complete scanline, without the filter byte.
    fn stride(&self) -> usize {
        (self.width as usize * self.bits_per_pixel()).div_ceil(8)
    }

    /// Filter distance: bytes per pixel, at least one.
    fn filter_bpp(&self) -> usize {
        self.bits_per_pixel().div_ceil(8).max(1)
    }
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn validate_header(data: &[u8]) -> Result<Header, PngError> {
    if data.len() < 13 {
        return Err(PngError::Truncated);
    }
    let header = Header {
        width: be_u32(&data[0..4]),
        height: be_u32(&data[4..8]),
        bit_depth: data[8],
        color_type: data[9],
    };
    if data[10] != 0 || data[11] != 0 {
        return Err(PngError::Unsupported("unknown compression or filter method".into()));
    }
    if data[12] != 0 {
        return Err(PngError::Unsupported("interlaced".into()));
    }
    if header.width == 0 || header.height == 0 {
        return Err(PngError::Corrupt("zero size".into()));
    }
    if header.width > MAX_DIMENSION || header.height > MAX_DIMENSION {
        return Err(PngError::Unsupported(format!(
            "{}x{} is too large",
            header.width, header.height
        )));
    }
    let depth_ok = match header.color_type {
        0 => matches!(header.bit_depth, 1 | 2 | 4 | 8 | 16),
        3 => matches!(header.bit_depth, 1 | 2 | 4 | 8),
        2 | 4 | 6 => matches!(header.bit_depth, 8 | 16),
        _ => false,
    };
    if !depth_ok {
        return Err(PngError::Unsupported(format!(
            "color type {} with bit depth {}",
            header.color_type, header.bit_depth
        )));
    }
    Ok(header)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Reverse the per-scanline filters in place, returning the raw scanlines without filter bytes.
fn unfilter(data: &[u8], header: &Header) -> Result<Vec<u8>, PngError> {
    let stride = header.stride();
    let bpp = header.filter_bpp();
    let rows = header.height as usize;
    if data.len() < rows * (stride + 1) {
        return Err(PngError::Truncated);
    }
    let mut out = vec![0u8; rows * stride];
    for y in 0..rows {
        let filter = data[y * (stride + 1)];
        let src = &data[y * (stride + 1) + 1..(y + 1) * (stride + 1)];
        let (done, rest) = out.split_at_mut(y * stride);
        let prev = if y == 0 {
            None
        } else {
            Some(&done[(y - 1) * stride..])
        };
        let line = &mut rest[..stride];
        for x in 0..stride {
            let a = if x >= bpp { line[x - bpp] } else { 0 };
            let b = prev.map_or(0, |p| p[x]);
            let c = match prev {
                Some(p) if x >= bpp => p[x - bpp],
                _ => 0,
            };
            let predictor = match filter {
                0 => 0,
                1 => a,
                2 => b,
                3 => ((u16::from(a) + u16::from(b)) / 2) as u8,
                4 => paeth(a, b, c),
                other => {
                    return Err(PngError::Corrupt(format!("filter type {}", other)));
                }
            };
            line[x] = src[x].wrapping_add(predictor);
        }
    }
    Ok(out)
}

/// Sample `index` of a scanline at the header's bit depth, as the raw value.
fn sample(line: &[u8], index: usize, bit_depth: u8) -> u16 {
    match bit_depth {
        16 => u16::from_be_bytes([line[index * 2], line[index * 2 + 1]]),
        8 => u16::from(line[index]),
        bits => {
            let bits = usize::from(bits);
            let bit_offset = index * bits;
            let byte = line[bit_offset / 8];
            let shift = 8 - bits - (bit_offset % 8);
            u16::from((byte >> shift) & ((1u8 << bits) - 1))
        }
    }
}

/// Raw sample scaled to 8 bits.
fn to_u8(value: u16, bit_depth: u8) -> u8 {
    match bit_depth {
        16 => (value >> 8) as u8,
        8 => value as u8,
        bits => (u32::from(value) * 255 / ((1u32 << bits) - 1)) as u8,
    }
}

pub fn decode(data: &[u8]) -> Result<DecodedImage, PngError> {
    if data.len() < SIGNATURE.len() || data[..8] != SIGNATURE {
        return Err(PngError::NotPng);
    }
    let mut pos = 8;
    let mut header: Option<Header> = None;
    let mut palette: Vec<[u8; 3]> = Vec::new();
    let mut trns: Option<Vec<u8>> = None;
    let mut idat: Vec<u8> = Vec::new();

    loop {
        if pos + 8 > data.len() {
            return Err(PngError::Truncated);
        }
        let len = be_u32(&data[pos..pos + 4]) as usize;
        let kind = &data[pos + 4..pos + 8];
        let body_start = pos + 8;
        let body_end = body_start
            .checked_add(len)
            .filter(|end| end + 4 <= data.len())
            .ok_or(PngError::Truncated)?;
        let body = &data[body_start..body_end];
        match kind {
            b"IHDR" => header = Some(validate_header(body)?),
            b"PLTE" => {
                palette = body.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
            }
            b"tRNS" => trns = Some(body.to_vec()),
            b"IDAT" => idat.extend_from_slice(body),
            b"IEND" => break,
            _ => {}
        }
        pos = body_end + 4;
    }

    let header = header.ok_or_else(|| PngError::Corrupt("missing IHDR".into()))?;
    if header.color_type == 3 && palette.is_empty() {
        return Err(PngError::Corrupt("palette image without PLTE".into()));
    }

    let expected = header.height as usize * (header.stride() + 1);
    let mut inflated = Vec::with_capacity(expected);
    ZlibDecoder::new(idat.as_slice())
        .take(expected as u64)
        .read_to_end(&mut inflated)
        .map_err(|e| PngError::Corrupt(e.to_string()))?;
    let raw = unfilter(&inflated, &header)?;

    let pixels = header.width as usize * header.height as usize;
    let mut rgb = Vec::with_capacity(pixels * 3);
    let mut alpha = Vec::with_capacity(pixels);
    let stride = header.stride();
    let channels = header.channels();
    let depth = header.bit_depth;

    for row in raw.chunks_exact(stride) {
        for x in 0..header.width as usize {
            let s = |c: usize| sample(row, x * channels + c, depth);
            let (r, g, b, a) = match header.color_type {
                0 => {
                    let v = s(0);
                    let transparent = trns
                        .as_deref()
                        .filter(|t| t.len() >= 2)
                        .is_some_and(|t| u16::from_be_bytes([t[0], t[1]]) == v);
                    let g = to_u8(v, depth);
                    (g, g, g, if transparent { 0 } else { 255 })
                }
                2 => {
                    let (rv, gv, bv) = (s(0), s(1), s(2));
                    let transparent = trns.as_deref().filter(|t| t.len() >= 6).is_some_and(|t| {
                        u16::from_be_bytes([t[0], t[1]]) == rv
                            && u16::from_be_bytes([t[2], t[3]]) == gv
                            && u16::from_be_bytes([t[4], t[5]]) == bv
                    });
                    (
                        to_u8(rv, depth),
                        to_u8(gv, depth),
                        to_u8(bv, depth),
                        if transparent { 0 } else { 255 },
                    )
                }
                3 => {
                    let index = usize::from(s(0));
                    let [r, g, b] = palette.get(index).copied().ok_or_else(|| {
                        PngError::Corrupt(format!("palette index {} out of range", index))
                    })?;
                    let a = trns
                        .as_deref()
                        .and_then(|t| t.get(index).copied())
                        .unwrap_or(255);
                    (r, g, b, a)
                }
                4 => {
                    let g = to_u8(s(0), depth);
                    (g, g, g, to_u8(s(1), depth))
                }
                _ => (
                    to_u8(s(0), depth),
                    to_u8(s(1), depth),
                    to_u8(s(2), depth),
                    to_u8(s(3), depth),
                ),
            };
            rgb.extend_from_slice(&[r, g, b]);
            alpha.push(a);
        }
    }

    let alpha = if alpha.iter().all(|&a| a == 255) {
        None
    } else {
        Some(alpha)
    };
    Ok(DecodedImage {
        width: header.width,
        height: header.height,
        rgb,
        alpha,
    })
}
