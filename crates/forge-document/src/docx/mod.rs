// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// DOCX writer — emit a minimal WordprocessingML package (zip) from a flat
// list of headings, paragraphs, and page breaks.

use std::io::{Cursor, Write};
use std::path::Path;

use forge_core::error::ForgeError;
use tracing::{debug, instrument};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
<Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>
</Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:rPr><w:sz w:val="22"/></w:rPr></w:style>
<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:keepNext/><w:spacing w:before="240" w:after="120"/><w:outlineLvl w:val="0"/></w:pPr><w:rPr><w:b/><w:sz w:val="32"/></w:rPr></w:style>
</w:styles>"#;

const DOCUMENT_OPEN: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#;

const DOCUMENT_CLOSE: &str = r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440"/></w:sectPr></w:body></w:document>"#;

/// One unit of document flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading(String),
    Paragraph(String),
    PageBreak,
}

/// Builds a `.docx` package from [`Block`]s.
#[derive(Debug, Default)]
pub struct DocxWriter {
    blocks: Vec<Block>,
}

impl DocxWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn push(&mut self, block: Block) -> &mut Self {
        self.blocks.push(block);
        self
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// The `word/document.xml` body for the current blocks.
    pub fn document_xml(&self) -> String {
        let mut xml = String::from(DOCUMENT_OPEN);
        for block in &self.blocks {
            match block {
                Block::Heading(text) => {
                    xml.push_str(r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr>"#);
                    push_run(&mut xml, text);
                    xml.push_str("</w:p>");
                }
                Block::Paragraph(text) => {
                    xml.push_str("<w:p>");
                    push_run(&mut xml, text);
                    xml.push_str("</w:p>");
                }
                Block::PageBreak => {
                    xml.push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#);
                }
            }
        }
        xml.push_str(DOCUMENT_CLOSE);
        xml
    }

    /// Serialise the package.
    #[instrument(skip(self), fields(blocks = self.blocks.len()))]
    pub fn to_bytes(&self) -> Result<Vec<u8>, ForgeError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        let parts: [(&str, &str); 4] = [
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", PACKAGE_RELS),
            ("word/_rels/document.xml.rels", DOCUMENT_RELS),
            ("word/styles.xml", STYLES),
        ];
        for (name, body) in parts {
            write_part(&mut zip, options, name, body.as_bytes())?;
        }
        write_part(
            &mut zip,
            options,
            "word/document.xml",
            self.document_xml().as_bytes(),
        )?;

        let bytes = zip
            .finish()
            .map_err(|err| ForgeError::DocxError(format!("failed to finish package: {err}")))?
            .into_inner();
        debug!(bytes = bytes.len(), "DOCX package written");
        Ok(bytes)
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), ForgeError> {
        std::fs::write(path.as_ref(), self.to_bytes()?)?;
        Ok(())
    }
}

fn write_part(
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    name: &str,
    body: &[u8],
) -> Result<(), ForgeError> {
    zip.start_file(name, options)
        .map_err(|err| ForgeError::DocxError(format!("failed to add {name}: {err}")))?;
    zip.write_all(body)?;
    Ok(())
}

/// A single run; embedded newlines become line breaks.
fn push_run(xml: &mut String, text: &str) {
    xml.push_str("<w:r>");
    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            xml.push_str("<w:br/>");
        }
        xml.push_str(r#"<w:t xml:space="preserve">"#);
        xml.push_str(&escape_xml(line));
        xml.push_str("</w:t>");
    }
    xml.push_str("</w:r>");
}

/// Escape XML metacharacters and drop control characters XML 1.0 forbids.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' => out.push(' '),
            c if (c as u32) < 0x20 => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn package_has_required_parts() {
        let bytes = DocxWriter::from_blocks(vec![Block::Paragraph("hi".into())])
            .to_bytes()
            .unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "word/document.xml",
            "word/styles.xml",
            "word/_rels/document.xml.rels",
        ] {
            assert!(names.contains(&part), "missing {part}");
        }
    }

    #[test]
    fn blocks_map_to_paragraphs() {
        let mut writer = DocxWriter::new();
        writer
            .push(Block::Heading("Intro".into()))
            .push(Block::Paragraph("Fish & chips <cheap>".into()))
            .push(Block::PageBreak)
            .push(Block::Paragraph("Page two".into()));
        let doc = read_part(&writer.to_bytes().unwrap(), "word/document.xml");

        assert!(doc.contains(r#"<w:pStyle w:val="Heading1"/>"#));
        assert!(doc.contains("Fish &amp; chips &lt;cheap&gt;"));
        assert!(doc.contains(r#"<w:br w:type="page"/>"#));
        assert!(doc.find("Intro").unwrap() < doc.find("Page two").unwrap());
    }

    #[test]
    fn control_characters_are_dropped() {
        assert_eq!(escape_xml("a\u{0}b\u{7}c"), "abc");
        assert_eq!(escape_xml("tab\there"), "tab here");
    }

    #[test]
    fn empty_document_is_still_valid_package() {
        let bytes = DocxWriter::new().to_bytes().unwrap();
        let doc = read_part(&bytes, "word/document.xml");
        assert!(doc.contains("<w:body>"));
        assert!(doc.ends_with("</w:document>"));
    }
}
