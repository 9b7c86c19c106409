// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Layout — turn a PDF text layer into DOCX blocks, either line-for-line or
// with paragraph recovery.

pub mod recovery;

use forge_core::error::ForgeError;
use tracing::debug;

use crate::docx::Block;
use crate::pdf::PdfReader;

/// Longest line still considered a heading candidate.
const HEADING_MAX_CHARS: usize = 72;

/// One paragraph per non-empty text line, with a page break between pages.
pub fn standard_blocks(reader: &PdfReader) -> Result<Vec<Block>, ForgeError> {
    let mut blocks = Vec::new();
    for (index, page) in reader.page_numbers().into_iter().enumerate() {
        if index > 0 {
            blocks.push(Block::PageBreak);
        }
        let text = reader.page_text(page)?;
        blocks.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|line| Block::Paragraph(line.to_owned())),
        );
    }
    debug!(blocks = blocks.len(), "standard layout built");
    Ok(blocks)
}

/// Rebuild paragraphs from hard-wrapped text.
///
/// - A blank line always ends a paragraph.
/// - A short isolated line without closing punctuation, or a short
///   all-caps line, becomes a heading.
/// - A line ending in `letter-` joined to a line starting in lowercase is
///   de-hyphenated.
/// - A line ending in `.`, `!`, `?` or `:` that is clearly shorter than the
///   page's longest line ends its paragraph.
pub fn reflow_paragraphs(text: &str) -> Vec<Block> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let full_width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);

    let mut blocks = Vec::new();
    let mut current = String::new();

    for (index, line) in lines.iter().enumerate() {
        if line.is_empty() {
            flush(&mut current, &mut blocks);
            continue;
        }

        let prev_blank = index == 0 || lines[index - 1].is_empty();
        let next_blank = lines.get(index + 1).is_none_or(|l| l.is_empty());
        if current.is_empty() && is_heading(line, prev_blank && next_blank) {
            blocks.push(Block::Heading((*line).to_owned()));
            continue;
        }

        append_line(&mut current, line);

        let len = line.chars().count();
        if ends_sentence(line) && len * 4 < full_width * 3 {
            flush(&mut current, &mut blocks);
        }
    }
    flush(&mut current, &mut blocks);
    blocks
}

fn is_heading(line: &str, isolated: bool) -> bool {
    let len = line.chars().count();
    if len == 0 || len > HEADING_MAX_CHARS || ends_sentence(line) || line.ends_with(',') {
        return false;
    }
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    let shouting = letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase());
    shouting || (isolated && line.split_whitespace().count() <= 8)
}

fn ends_sentence(line: &str) -> bool {
    line.ends_with(['.', '!', '?', ':'])
}

fn append_line(current: &mut String, line: &str) {
    if current.is_empty() {
        current.push_str(line);
        return;
    }
    let hyphenated = current.ends_with('-')
        && current
            .chars()
            .rev()
            .nth(1)
            .is_some_and(char::is_alphabetic)
        && line.chars().next().is_some_and(char::is_lowercase);
    if hyphenated {
        current.pop();
    } else {
        current.push(' ');
    }
    current.push_str(line);
}

fn flush(current: &mut String, blocks: &mut Vec<Block>) {
    if !current.is_empty() {
        blocks.push(Block::Paragraph(std::mem::take(current)));
    }
}
