// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — open existing PDF documents and pull out their text layer and
// embedded JPEG images using the `lopdf` crate.

use std::path::Path;

use forge_core::error::ForgeError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, info, instrument, warn};

/// Upper bound on /Parent hops when looking for inherited resources.
const MAX_TREE_DEPTH: usize = 32;

/// Read-only view of an existing PDF.
pub struct PdfReader {
    /// The underlying lopdf document.
    document: Document,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ForgeError> {
        let document = Document::load(path.as_ref())
            .map_err(|err| ForgeError::PdfError(format!("failed to open PDF: {err}")))?;
        info!(pages = document.get_pages().len(), "PDF loaded");
        Ok(Self { document })
    }

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, ForgeError> {
        let document = Document::load_mem(data).map_err(|err| {
            ForgeError::PdfError(format!("failed to load PDF from memory: {err}"))
        })?;
        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");
        Ok(Self { document })
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Page numbers (1-indexed) in document order.
    pub fn page_numbers(&self) -> Vec<u32> {
        self.document.get_pages().keys().copied().collect()
    }

    // -- Extraction -----------------------------------------------------------

    /// Text layer of a single page (1-indexed). Pages without text yield an
    /// empty string.
    #[instrument(skip(self))]
    pub fn page_text(&self, page_number: u32) -> Result<String, ForgeError> {
        self.page_id(page_number)?;
        match self.document.extract_text(&[page_number]) {
            Ok(text) => Ok(text),
            Err(err) => {
                // Image-only pages often have no usable font resources.
                warn!(page_number, error = %err, "no text layer on page");
                Ok(String::new())
            }
        }
    }

    /// JPEG streams embedded in a page's XObject resources, in resource order.
    ///
    /// Only DCTDecode images are returned; their stream content is a complete
    /// JPEG file.
    #[instrument(skip(self))]
    pub fn page_jpeg_images(&self, page_number: u32) -> Result<Vec<Vec<u8>>, ForgeError> {
        let page_id = self.page_id(page_number)?;
        let Some(resources) = self.page_resources(page_id) else {
            return Ok(Vec::new());
        };
        let Some(xobjects) = resources
            .get(b"XObject")
            .ok()
            .and_then(|obj| self.resolve_dict(obj))
        else {
            return Ok(Vec::new());
        };

        let mut images = Vec::new();
        for (_, value) in xobjects.iter() {
            let Some(Object::Stream(stream)) = self.resolve(value) else {
                continue;
            };
            let is_image = matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image");
            let is_jpeg = match stream.dict.get(b"Filter") {
                Ok(Object::Name(name)) => name == b"DCTDecode",
                Ok(Object::Array(filters)) => filters
                    .iter()
                    .any(|f| matches!(f, Object::Name(n) if n == b"DCTDecode")),
                _ => false,
            };
            if is_image && is_jpeg {
                images.push(stream.content.clone());
            }
        }
        debug!(page_number, count = images.len(), "JPEG images found");
        Ok(images)
    }

    // -- Helpers --------------------------------------------------------------

    fn page_id(&self, page_number: u32) -> Result<ObjectId, ForgeError> {
        let pages = self.document.get_pages();
        pages.get(&page_number).copied().ok_or_else(|| {
            ForgeError::PdfError(format!(
                "page {page_number} out of range (document has {} pages)",
                pages.len()
            ))
        })
    }

    /// The page's /Resources, falling back to the nearest ancestor's.
    fn page_resources(&self, page_id: ObjectId) -> Option<&Dictionary> {
        let mut node = self.document.get_dictionary(page_id).ok()?;
        for _ in 0..MAX_TREE_DEPTH {
            if let Some(resources) = node
                .get(b"Resources")
                .ok()
                .and_then(|obj| self.resolve_dict(obj))
            {
                return Some(resources);
            }
            let parent = match node.get(b"Parent") {
                Ok(Object::Reference(id)) => *id,
                _ => return None,
            };
            node = self.document.get_dictionary(parent).ok()?;
        }
        None
    }

    fn resolve<'a>(&'a self, object: &'a Object) -> Option<&'a Object> {
        match object {
            Object::Reference(id) => self.document.get_object(*id).ok(),
            other => Some(other),
        }
    }

    fn resolve_dict<'a>(&'a self, object: &'a Object) -> Option<&'a Dictionary> {
        match self.resolve(object)? {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::writer::PdfWriter;

    fn sample() -> Vec<u8> {
        let mut writer = PdfWriter::new();
        writer
            .add_text_page(["Hello from page one", "second line"])
            .add_text_page(["Page two text"]);
        writer.to_bytes().unwrap()
    }

    #[test]
    fn counts_pages() {
        let reader = PdfReader::from_bytes(&sample()).unwrap();
        assert_eq!(reader.page_count(), 2);
        assert_eq!(reader.page_numbers(), vec![1, 2]);
    }

    #[test]
    fn extracts_text_layer() {
        let reader = PdfReader::from_bytes(&sample()).unwrap();
        assert!(reader.page_text(1).unwrap().contains("Hello"));
    }

    #[test]
    fn out_of_range_page_is_an_error() {
        let reader = PdfReader::from_bytes(&sample()).unwrap();
        assert!(reader.page_text(0).is_err());
        assert!(reader.page_text(3).is_err());
    }

    #[test]
    fn finds_embedded_jpeg() {
        let jpeg = crate::ImageProcessor::from_dynamic(::image::DynamicImage::new_rgb8(4, 4))
            .to_jpeg_bytes(80)
            .unwrap();
        let mut writer = PdfWriter::new();
        writer.add_jpeg_page(jpeg.clone(), 4, 4);
        let reader = PdfReader::from_bytes(&writer.to_bytes().unwrap()).unwrap();

        let images = reader.page_jpeg_images(1).unwrap();
        assert_eq!(images, vec![jpeg]);
    }

    #[test]
    fn text_pages_have_no_images() {
        let reader = PdfReader::from_bytes(&sample()).unwrap();
        assert!(reader.page_jpeg_images(1).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_a_pdf_error() {
        assert!(matches!(
            PdfReader::from_bytes(b"not a pdf"),
            Err(ForgeError::PdfError(_))
        ));
    }

    #[test]
    fn open_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, sample()).unwrap();
        assert_eq!(PdfReader::open(&path).unwrap().page_count(), 2);
    }
}
