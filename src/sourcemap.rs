//! Source-map v3 document assembly.
//!
//! The linked output is one generated file; mappings arrive through the
//! [`crate::link::SourceMapFilter`] callback and are encoded as the usual
//! base64-VLQ `mappings` string.

use std::io::Write;

use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Mapping {
    /// 1-based line in the generated output.
    pub generated_line: u32,
    /// 0-based byte column in the generated output.
    pub generated_column: u32,
    pub original: Option<OriginalPosition>,
}

#[derive(Debug, Clone)]
pub struct OriginalPosition {
    pub file: String,
    /// 1-based.
    pub line: u32,
    /// 1-based.
    pub column: u32,
}

#[derive(Debug)]
pub struct SourceMap {
    file: String,
    mappings: Vec<Mapping>,
}

#[derive(Serialize)]
struct Document<'a> {
    version: u32,
    file: &'a str,
    sources: Vec<String>,
    names: Vec<String>,
    mappings: String,
}

impl SourceMap {
    #[must_use]
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            mappings: Vec::new(),
        }
    }

    pub fn add_mapping(&mut self, mapping: Mapping) {
        self.mappings.push(mapping);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Serializes the document. Mappings are sorted by generated position;
    /// sources are listed in first-use order.
    pub fn write_to(&mut self, out: &mut dyn Write) -> Result<()> {
        self.mappings
            .sort_by_key(|m| (m.generated_line, m.generated_column));

        let mut sources: Vec<String> = Vec::new();
        let mut encoded = String::new();
        let mut line = 1u32;
        let mut first_in_line = true;
        let mut prev_generated_column = 0i64;
        let mut prev_source = 0i64;
        let mut prev_line = 0i64;
        let mut prev_column = 0i64;

        for mapping in &self.mappings {
            while line < mapping.generated_line {
                encoded.push(';');
                line += 1;
                prev_generated_column = 0;
                first_in_line = true;
            }
            if !first_in_line {
                encoded.push(',');
            }
            vlq_encode(
                i64::from(mapping.generated_column) - prev_generated_column,
                &mut encoded,
            );
            prev_generated_column = i64::from(mapping.generated_column);

            if let Some(original) = &mapping.original {
                let index = source_index(&mut sources, &original.file);
                vlq_encode(index - prev_source, &mut encoded);
                prev_source = index;

                let original_line = i64::from(original.line.saturating_sub(1));
                vlq_encode(original_line - prev_line, &mut encoded);
                prev_line = original_line;

                let original_column = i64::from(original.column.saturating_sub(1));
                vlq_encode(original_column - prev_column, &mut encoded);
                prev_column = original_column;
            }
            first_in_line = false;
        }

        let document = Document {
            version: 3,
            file: &self.file,
            sources,
            names: Vec::new(),
            mappings: encoded,
        };
        serde_json::to_writer(out, &document)
            .map_err(|err| Error::internal(format!("cannot serialize source map: {err}")))
    }
}

fn source_index(sources: &mut Vec<String>, file: &str) -> i64 {
    if let Some(index) = sources.iter().position(|existing| existing == file) {
        return index as i64;
    }
    sources.push(file.to_string());
    (sources.len() - 1) as i64
}

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Signed base64 VLQ: the sign lands in the lowest bit, continuation in
/// the sixth bit of every digit.
fn vlq_encode(value: i64, out: &mut String) {
    let mut rest = if value < 0 {
        ((-value as u64) << 1) | 1
    } else {
        (value as u64) << 1
    };
    loop {
        let mut digit = (rest & 0x1f) as usize;
        rest >>= 5;
        if rest != 0 {
            digit |= 0x20;
        }
        out.push(BASE64[digit] as char);
        if rest == 0 {
            break;
        }
    }
}
