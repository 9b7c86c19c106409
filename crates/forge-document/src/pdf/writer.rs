// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer — build simple PDFs (text pages, full-page JPEG scans) directly
// with `lopdf`.

use std::path::Path;

use forge_core::error::ForgeError;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, instrument};

/// A4 in PostScript points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 56;
const FONT_SIZE: i64 = 11;
const LINE_HEIGHT: i64 = 14;

enum PageSpec {
    Text(Vec<String>),
    Jpeg {
        data: Vec<u8>,
        width: u32,
        height: u32,
    },
}

/// Accumulates pages and serialises them as a PDF 1.5 document.
///
/// Text pages use the built-in Helvetica font with one text object per
/// line, so the text layer reads back line by line. Image pages embed the
/// JPEG unchanged (DCTDecode) and stretch it over the whole page.
#[derive(Default)]
pub struct PdfWriter {
    pages: Vec<PageSpec>,
}

impl PdfWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a page holding `lines`, top to bottom.
    pub fn add_text_page<I, S>(&mut self, lines: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pages
            .push(PageSpec::Text(lines.into_iter().map(Into::into).collect()));
        self
    }

    /// Append a page consisting of one JPEG image.
    pub fn add_jpeg_page(&mut self, data: Vec<u8>, width: u32, height: u32) -> &mut Self {
        self.pages.push(PageSpec::Jpeg {
            data,
            width,
            height,
        });
        self
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Serialise the document.
    #[instrument(skip(self), fields(pages = self.pages.len()))]
    pub fn to_bytes(&self) -> Result<Vec<u8>, ForgeError> {
        if self.pages.is_empty() {
            return Err(ForgeError::PdfError("a PDF needs at least one page".into()));
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids = Vec::with_capacity(self.pages.len());
        for (index, spec) in self.pages.iter().enumerate() {
            let page_id = match spec {
                PageSpec::Text(lines) => add_text_page(&mut doc, pages_id, font_id, lines)?,
                PageSpec::Jpeg {
                    data,
                    width,
                    height,
                } => add_jpeg_page(&mut doc, pages_id, index, data, *width, *height)?,
            };
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut output = Vec::new();
        doc.save_to(&mut output)
            .map_err(|err| ForgeError::PdfError(format!("failed to serialise PDF: {err}")))?;
        debug!(output_bytes = output.len(), "PDF written");
        Ok(output)
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), ForgeError> {
        std::fs::write(path.as_ref(), self.to_bytes()?)?;
        Ok(())
    }
}

fn add_text_page(
    doc: &mut Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    lines: &[String],
) -> Result<ObjectId, ForgeError> {
    let mut operations = Vec::with_capacity(lines.len() * 4);
    for (index, line) in lines.iter().enumerate() {
        let y = PAGE_HEIGHT - MARGIN - index as i64 * LINE_HEIGHT;
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]));
        operations.push(Operation::new("Td", vec![MARGIN.into(), y.into()]));
        operations.push(Operation::new("Tj", vec![Object::string_literal(line.as_str())]));
        operations.push(Operation::new("ET", vec![]));
    }
    let content = Content { operations }
        .encode()
        .map_err(|err| ForgeError::PdfError(format!("failed to encode page content: {err}")))?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        },
    }))
}

fn add_jpeg_page(
    doc: &mut Document,
    pages_id: ObjectId,
    index: usize,
    data: &[u8],
    width: u32,
    height: u32,
) -> Result<ObjectId, ForgeError> {
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        data.to_vec(),
    ));

    let name = format!("Im{}", index + 1);
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    PAGE_WIDTH.into(),
                    0.into(),
                    0.into(),
                    PAGE_HEIGHT.into(),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.clone().into_bytes())]),
            Operation::new("Q", vec![]),
        ],
    }
    .encode()
    .map_err(|err| ForgeError::PdfError(format!("failed to encode page content: {err}")))?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content));

    let mut xobjects = Dictionary::new();
    xobjects.set(name, Object::Reference(image_id));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => xobjects,
        },
    }))
}
