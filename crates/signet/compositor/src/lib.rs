//! Field-overlay compositor for contract documents.
//!
//! [`render`] takes the bytes of a base document and a set of stamps, draws
//! each stamp onto page 1 at its transformed coordinates, and serializes a
//! new document. The input is never mutated and identical inputs produce
//! identical output, so every workflow step yields a distinct, reproducible
//! artifact and rejection can always fall back to the original.

#![deny(unsafe_code)]

mod page;
mod xobject;

use lopdf::{dictionary, Document};
use signet_types::FieldGeometry;
use thiserror::Error;

/// Font size for text stamps. Text wider than its field is neither wrapped
/// nor clipped.
pub const TEXT_FONT_SIZE: f64 = 12.0;

/// Result type for compositor operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Compositor failures. Every variant aborts the render with no output.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The base document cannot be parsed or has no first page.
    #[error("unsupported document: {0}")]
    UnsupportedDocument(String),

    /// Image bytes do not decode under their declared encoding.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// Content rewrite or serialization failed.
    #[error("document rewrite failed: {0}")]
    Pdf(String),
}

/// Declared encoding of an uploaded image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageEncoding {
    Png,
    Jpeg,
}

impl ImageEncoding {
    /// Map a declared MIME type to a supported encoding.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// An image to stamp, with the encoding its uploader declared.
#[derive(Clone, Debug)]
pub struct StampImage {
    pub bytes: Vec<u8>,
    pub encoding: ImageEncoding,
}

/// Content drawn into one field rectangle.
#[derive(Clone, Debug)]
pub enum StampContent {
    Text(String),
    Image(StampImage),
}

/// One field worth of overlay: where to draw, and what.
#[derive(Clone, Debug)]
pub struct Stamp {
    pub geometry: FieldGeometry,
    pub content: StampContent,
}

/// Number of pages in a document, for callers probing an upload.
pub fn page_count(base: &[u8]) -> RenderResult<usize> {
    Ok(load(base)?.get_pages().len())
}

/// Draw every stamp onto page 1 of `base` and serialize a new document.
pub fn render(base: &[u8], stamps: &[Stamp]) -> RenderResult<Vec<u8>> {
    let mut doc = load(base)?;
    let page_id = page::first_page(&doc)?;
    let page_height = page::page_height(&doc, page_id)?;

    if !stamps.is_empty() {
        page::materialize_resources(&mut doc, page_id)?;

        let font = if stamps
            .iter()
            .any(|s| matches!(s.content, StampContent::Text(_)))
        {
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
            });
            Some(page::add_resource(&mut doc, page_id, b"Font", font_id, "OvF")?)
        } else {
            None
        };

        let mut overlay: Vec<u8> = Vec::new();
        for stamp in stamps {
            let (x, y) = stamp.geometry.render_origin(page_height);
            match &stamp.content {
                StampContent::Text(text) => {
                    if let Some(font) = &font {
                        overlay.extend_from_slice(text_op(font, text, x, y).as_bytes());
                    }
                }
                StampContent::Image(stamp_image) => {
                    let xobject_id = xobject::embed(&mut doc, stamp_image)?;
                    let name =
                        page::add_resource(&mut doc, page_id, b"XObject", xobject_id, "OvIm")?;
                    overlay.extend_from_slice(
                        image_op(&name, &stamp.geometry, x, y).as_bytes(),
                    );
                }
            }
        }

        let mut content = doc.get_page_content(page_id).map_err(pdf_err)?;
        content.push(b'\n');
        content.extend_from_slice(&overlay);
        doc.change_page_content(page_id, content).map_err(pdf_err)?;
    }

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    Ok(out)
}

fn load(base: &[u8]) -> RenderResult<Document> {
    Document::load_mem(base).map_err(|e| RenderError::UnsupportedDocument(e.to_string()))
}

fn pdf_err(e: lopdf::Error) -> RenderError {
    RenderError::Pdf(e.to_string())
}

fn text_op(font: &str, text: &str, x: f64, y: f64) -> String {
    format!(
        "q BT /{font} {size} Tf {x} {y} Td ({text}) Tj ET Q\n",
        size = fmt_num(TEXT_FONT_SIZE),
        x = fmt_num(x),
        y = fmt_num(y),
        text = escape_text(text),
    )
}

fn image_op(name: &str, geometry: &FieldGeometry, x: f64, y: f64) -> String {
    format!(
        "q {w} 0 0 {h} {x} {y} cm /{name} Do Q\n",
        w = fmt_num(geometry.width),
        h = fmt_num(geometry.height),
        x = fmt_num(x),
        y = fmt_num(y),
    )
}

/// Literal strings escape backslash, parentheses, and line breaks.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Page units with sub-point precision, trailing zeros trimmed so output is
/// stable across renders.
fn fmt_num(value: f64) -> String {
    let fixed = format!("{value:.2}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
