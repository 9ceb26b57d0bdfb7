//! PDF catalog of installed mods: a titled A4 table with icon, linked name and description.
//!
//! The file is written directly as PDF 1.4 using the standard Helvetica fonts, so no font files
//! are needed. Icons are decoded from PNG and embedded as Flate images with a soft mask.

mod document;
mod metrics;
mod png;

use crate::moddb::{self, ModRepository};
use crate::modinfo;
use document::{literal, num, Content, Document, ObjId};
use metrics::{encode_winansi, wrap, Font};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const MM: f64 = 72.0 / 25.4;
const PAGE_WIDTH: f64 = 595.28;
const PAGE_HEIGHT: f64 = 841.89;
const MARGIN: f64 = 10.0 * MM;
const TABLE_WIDTH: f64 = 190.0 * MM;
const ICON_COL: f64 = TABLE_WIDTH * 0.05;
const NAME_COL: f64 = TABLE_WIDTH * 0.28;
const DESC_COL: f64 = TABLE_WIDTH - ICON_COL - NAME_COL;
const FONT_SIZE: f64 = 7.0;
const LINE_HEIGHT: f64 = 3.5 * MM;
const PADDING: f64 = 1.0 * MM;
const BORDER_WIDTH: f64 = 0.2 * MM;
const TITLE_SIZE: f64 = 20.0;
const TITLE_HEIGHT: f64 = 20.0 * MM;
const BACKGROUND: (u8, u8, u8) = (200, 215, 150);

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("Failed to create PDF file: {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode PDF image: {0}")]
    Encode(#[source] std::io::Error),
}

/// One row of the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub description: String,
    /// Mod page; the icon and name link to it.
    pub url: Option<String>,
    /// `modicon.png` bytes.
    pub icon: Option<Vec<u8>>,
}

/// `VS_Mods_YYYY_MM_DD.pdf` in `dir`.
pub fn default_pdf_path(dir: &Path, date: chrono::NaiveDate) -> PathBuf {
    dir.join(format!("VS_Mods_{}.pdf", date.format("%Y_%m_%d")))
}

/// Read every mod file and look up its page. Unreadable mods are left out; a failed lookup
/// only loses the link.
pub fn build_entries<R: ModRepository + ?Sized>(
    repo: &R,
    files: &[PathBuf],
    progress: Option<&dyn Fn(usize, usize)>,
) -> Vec<CatalogEntry> {
    let mut entries = Vec::with_capacity(files.len());
    for (index, path) in files.iter().enumerate() {
        if let Some(cb) = progress {
            cb(index + 1, files.len());
        }
        let info = match modinfo::read_mod(path) {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "mod left out of the catalog");
                continue;
            }
        };
        let url = match repo.fetch_mod(&info.modid) {
            Ok(record) => Some(moddb::mod_page_url(repo.base_url(), &record)),
            Err(e) => {
                debug!(modid = %info.modid, error = %e, "no mod page link");
                None
            }
        };
        let icon = modinfo::read_icon(path).unwrap_or_else(|e| {
            debug!(error = %e, "icon unreadable");
            None
        });
        entries.push(CatalogEntry {
            name: info.name,
            description: info.description.unwrap_or_default(),
            url,
            icon,
        });
    }
    entries
}

/// Write the catalog to `path`.
pub fn write_catalog(entries: &[CatalogEntry], path: &Path, title: &str) -> Result<(), PdfError> {
    let bytes = render_catalog(entries, title)?;
    std::fs::write(path, bytes).map_err(|e| PdfError::CreateFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Embed an icon as an image XObject (plus soft mask). None when it cannot be decoded.
fn add_icon(doc: &mut Document, data: &[u8]) -> Result<Option<(ObjId, f64)>, PdfError> {
    let image = match png::decode(data) {
        Ok(image) => image,
        Err(e) => {
            debug!(error = %e, "icon skipped");
            return Ok(None);
        }
    };
    let dims = format!(
        "/Type /XObject /Subtype /Image /Width {} /Height {} /BitsPerComponent 8",
        image.width, image.height
    );
    let smask = match &image.alpha {
        Some(alpha) => Some(
            doc.add_deflated_stream(&format!("{} /ColorSpace /DeviceGray", dims), alpha)
                .map_err(PdfError::Encode)?,
        ),
        None => None,
    };
    let mut dict = format!("{} /ColorSpace /DeviceRGB", dims);
    if let Some(mask) = smask {
        dict.push_str(&format!(" /SMask {}", mask.reference()));
    }
    let id = doc
        .add_deflated_stream(&dict, &image.rgb)
        .map_err(PdfError::Encode)?;
    Ok(Some((id, f64::from(image.width) / f64::from(image.height))))
}

struct Page {
    content: Content,
    annots: Vec<ObjId>,
}

impl Page {
    fn new() -> Self {
        let mut content = Content::new();
        content.fill_rect(BACKGROUND, 0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT);
        Self {
            content,
            annots: Vec::new(),
        }
    }
}

fn link_annotation(doc: &mut Document, url: &str, x1: f64, y1: f64, x2: f64, y2: f64) -> ObjId {
    let mut body = format!(
        "<< /Type /Annot /Subtype /Link /Rect [{} {} {} {}] /Border [0 0 0] /A << /S /URI /URI ",
        num(x1),
        num(y1),
        num(x2),
        num(y2)
    )
    .into_bytes();
    body.extend_from_slice(&literal(url.as_bytes()));
    body.extend_from_slice(b" >> >>");
    doc.add(body)
}

/// Baseline of text line `i` in a cell whose top edge is at `top`.
fn baseline(top: f64, i: usize) -> f64 {
    top - PADDING - LINE_HEIGHT * i as f64 - (LINE_HEIGHT * 0.5 + FONT_SIZE * 0.35)
}

/// The complete PDF file.
pub fn render_catalog(entries: &[CatalogEntry], title: &str) -> Result<Vec<u8>, PdfError> {
    let mut doc = Document::new();
    let catalog_id = doc.reserve();
    let pages_id = doc.reserve();
    let resources_id = doc.reserve();

    let fonts: Vec<(Font, ObjId)> = [Font::Regular, Font::Bold]
        .into_iter()
        .map(|font| {
            let id = doc.add(format!(
                "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
                font.base_font()
            ));
            (font, id)
        })
        .collect();

    let mut images: Vec<(String, ObjId)> = Vec::new();
    let mut icons: Vec<Option<(String, f64)>> = Vec::with_capacity(entries.len());
    for entry in entries {
        let icon = match &entry.icon {
            Some(data) => add_icon(&mut doc, data)?.map(|(id, aspect)| {
                let name = format!("Im{}", images.len() + 1);
                images.push((name.clone(), id));
                (name, aspect)
            }),
            None => None,
        };
        icons.push(icon);
    }

    let mut pages: Vec<Page> = Vec::new();
    let mut page = Page::new();
    let title_bytes = encode_winansi(title);
    let title_width = metrics::text_width(&title_bytes, Font::Bold, TITLE_SIZE);
    page.content.text(
        Font::Bold.resource_name(),
        TITLE_SIZE,
        (PAGE_WIDTH - title_width) / 2.0,
        PAGE_HEIGHT - MARGIN - TITLE_HEIGHT / 2.0 - TITLE_SIZE * 0.35,
        &title_bytes,
    );
    let mut y = PAGE_HEIGHT - MARGIN - TITLE_HEIGHT;

    let icon_size = ICON_COL - 2.0 * PADDING;
    let max_lines = ((PAGE_HEIGHT - 2.0 * MARGIN - 2.0 * PADDING) / LINE_HEIGHT).floor() as usize;

    for (entry, icon) in entries.iter().zip(&icons) {
        let mut name_lines = wrap(&entry.name, Font::Bold, FONT_SIZE, NAME_COL - 2.0 * PADDING);
        let mut desc_lines = wrap(
            &entry.description,
            Font::Regular,
            FONT_SIZE,
            DESC_COL - 2.0 * PADDING,
        );
        name_lines.truncate(max_lines);
        desc_lines.truncate(max_lines);
        let lines = name_lines.len().max(desc_lines.len()).max(1);
        let mut row_height = lines as f64 * LINE_HEIGHT + 2.0 * PADDING;
        if icon.is_some() {
            row_height = row_height.max(icon_size + 2.0 * PADDING);
        }

        if y - row_height < MARGIN {
            pages.push(std::mem::replace(&mut page, Page::new()));
            y = PAGE_HEIGHT - MARGIN;
        }
        let top = y;
        let bottom = y - row_height;
        let x_icon = MARGIN;
        let x_name = x_icon + ICON_COL;
        let x_desc = x_name + NAME_COL;

        if let Some((name, aspect)) = icon {
            let (w, h) = if *aspect >= 1.0 {
                (icon_size, icon_size / aspect)
            } else {
                (icon_size * aspect, icon_size)
            };
            page.content
                .image(name, x_icon + PADDING, top - PADDING - h, w, h);
        }
        for (i, line) in name_lines.iter().enumerate() {
            page.content.text(
                Font::Bold.resource_name(),
                FONT_SIZE,
                x_name + PADDING,
                baseline(top, i),
                line,
            );
        }
        for (i, line) in desc_lines.iter().enumerate() {
            page.content.text(
                Font::Regular.resource_name(),
                FONT_SIZE,
                x_desc + PADDING,
                baseline(top, i),
                line,
            );
        }
        for (x, w) in [(x_icon, ICON_COL), (x_name, NAME_COL), (x_desc, DESC_COL)] {
            page.content.stroke_rect(BORDER_WIDTH, x, bottom, w, row_height);
        }
        if let Some(url) = &entry.url {
            let annot = link_annotation(&mut doc, url, x_icon, bottom, x_desc, top);
            page.annots.push(annot);
        }
        y = bottom;
    }
    pages.push(page);

    let mut kids = Vec::with_capacity(pages.len());
    for page in pages {
        let content_id = doc.add_stream("", &page.content.into_bytes());
        let annots = if page.annots.is_empty() {
            String::new()
        } else {
            let refs: Vec<String> = page.annots.iter().map(|a| a.reference()).collect();
            format!(" /Annots [{}]", refs.join(" "))
        };
        let page_id = doc.add(format!(
            "<< /Type /Page /Parent {} /MediaBox [0 0 {} {}] /Resources {} /Contents {}{} >>",
            pages_id.reference(),
            num(PAGE_WIDTH),
            num(PAGE_HEIGHT),
            resources_id.reference(),
            content_id.reference(),
            annots
        ));
        kids.push(page_id.reference());
    }

    let font_dict: Vec<String> = fonts
        .iter()
        .map(|(font, id)| format!("/{} {}", font.resource_name(), id.reference()))
        .collect();
    let mut resources = format!(
        "<< /ProcSet [/PDF /Text /ImageC] /Font << {} >>",
        font_dict.join(" ")
    );
    if !images.is_empty() {
        let xobjects: Vec<String> = images
            .iter()
            .map(|(name, id)| format!("/{} {}", name, id.reference()))
            .collect();
        resources.push_str(&format!(" /XObject << {} >>", xobjects.join(" ")));
    }
    resources.push_str(" >>");
    doc.set(resources_id, resources);

    doc.set(
        pages_id,
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            kids.len()
        ),
    );
    doc.set(
        catalog_id,
        format!("<< /Type /Catalog /Pages {} >>", pages_id.reference()),
    );

    let mut info = b"<< /Title ".to_vec();
    info.extend_from_slice(&literal(&title_bytes));
    info.extend_from_slice(b" /Producer ");
    info.extend_from_slice(&literal(
        concat!("modsupdater ", env!("CARGO_PKG_VERSION")).as_bytes(),
    ));
    info.extend_from_slice(b" >>");
    let info_id = doc.add(info);

    Ok(doc.finish(catalog_id, Some(info_id)))
}
