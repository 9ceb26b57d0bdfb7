//! PDF 1.4 object store, content stream builder and serializer.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write as _;

/// Object number in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjId(usize);

impl ObjId {
    pub fn reference(self) -> String {
        format!("{} 0 R", self.0)
    }
}

/// Numbers as PDF expects them: at most two decimals, no trailing zeros.
pub fn num(value: f64) -> String {
    let s = format!("{:.2}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" || s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Literal string `( ... )` with `\`, `(`, `)` and CR escaped.
pub fn literal(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 2);
    out.push(b'(');
    for &b in bytes {
        match b {
            b'\\' | b'(' | b')' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(b),
        }
    }
    out.push(b')');
    out
}

#[derive(Debug, Default)]
pub struct Document {
    objects: Vec<Vec<u8>>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a number for an object written later with `set`.
    pub fn reserve(&mut self) -> ObjId {
        self.objects.push(Vec::new());
        ObjId(self.objects.len())
    }

    pub fn set(&mut self, id: ObjId, body: impl Into<Vec<u8>>) {
        if let Some(slot) = self.objects.get_mut(id.0 - 1) {
            *slot = body.into();
        }
    }

    pub fn add(&mut self, body: impl Into<Vec<u8>>) -> ObjId {
        let id = self.reserve();
        self.set(id, body);
        id
    }

    /// Stream object; `dict` holds the entries besides `/Length`.
    pub fn add_stream(&mut self, dict: &str, data: &[u8]) -> ObjId {
        let mut body = format!("<< {} /Length {} >>\nstream\n", dict, data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.add(body)
    }

    /// Flate-compressed stream object.
    pub fn add_deflated_stream(&mut self, dict: &str, data: &[u8]) -> std::io::Result<ObjId> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data)?;
        let compressed = enc.finish()?;
        Ok(self.add_stream(&format!("{} /Filter /FlateDecode", dict), &compressed))
    }

    /// Serialize with a cross-reference table. Objects never set are written as `null`.
    pub fn finish(self, root: ObjId, info: Option<ObjId>) -> Vec<u8> {
        let mut out: Vec<u8> = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n".to_vec();
        let mut offsets = Vec::with_capacity(self.objects.len());
        for (i, body) in self.objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
            if body.is_empty() {
                out.extend_from_slice(b"null");
            } else {
                out.extend_from_slice(body);
            }
            out.extend_from_slice(b"\nendobj\n");
        }
        let xref_start = out.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", self.objects.len() + 1);
        for offset in offsets {
            xref.push_str(&format!("{:010} 00000 n \n", offset));
        }
        xref.push_str(&format!(
            "trailer\n<< /Size {} /Root {}",
            self.objects.len() + 1,
            root.reference()
        ));
        if let Some(info) = info {
            xref.push_str(&format!(" /Info {}", info.reference()));
        }
        xref.push_str(&format!(" >>\nstartxref\n{}\n%%EOF\n", xref_start));
        out.extend_from_slice(xref.as_bytes());
        out
    }
}

/// Page content operators.
#[derive(Debug, Default)]
pub struct Content {
    buf: Vec<u8>,
}

impl Content {
    pub fn new() -> Self {
        Self::default()
    }

    fn op(&mut self, text: &str) {
        self.buf.extend_from_slice(text.as_bytes());
        self.buf.push(b'\n');
    }

    pub fn fill_rect(&mut self, rgb: (u8, u8, u8), x: f64, y: f64, w: f64, h: f64) {
        let c = |v: u8| num(f64::from(v) / 255.0);
        self.op(&format!(
            "q {} {} {} rg {} {} {} {} re f Q",
            c(rgb.0),
            c(rgb.1),
            c(rgb.2),
            num(x),
            num(y),
            num(w),
            num(h)
        ));
    }

    pub fn stroke_rect(&mut self, line_width: f64, x: f64, y: f64, w: f64, h: f64) {
        self.op(&format!(
            "q 0 0 0 RG {} w {} {} {} {} re S Q",
            num(line_width),
            num(x),
            num(y),
            num(w),
            num(h)
        ));
    }

    /// One line of text with its baseline at (`x`, `y`); `text` is WinAnsi encoded.
    pub fn text(&mut self, font: &str, size: f64, x: f64, y: f64, text: &[u8]) {
        self.buf.extend_from_slice(
            format!("BT /{} {} Tf {} {} Td ", font, num(size), num(x), num(y)).as_bytes(),
        );
        self.buf.extend_from_slice(&literal(text));
        self.op(" Tj ET");
    }

    /// Draw image XObject `name` scaled into the box at (`x`, `y`) with size `w` x `h`.
    pub fn image(&mut self, name: &str, x: f64, y: f64, w: f64, h: f64) {
        self.op(&format!(
            "q {} 0 0 {} {} {} cm /{} Do Q",
            num(w),
            num(h),
            num(x),
            num(y),
            name
        ));
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
