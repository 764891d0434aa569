//! BDF text handling and the `ENCODING` repair pass.
//!
//! Some rasterizers number glyphs sequentially (1, 2, 3...) in the BDF
//! `ENCODING` field instead of writing their Unicode code points. The repair
//! rewrites those fields from the ordered list of characters the subset was
//! built from.
//!
//! BDF files are ASCII, but metadata such as copyright notices may carry
//! Latin-1 bytes. A file is decoded as UTF-8 if possible, otherwise as
//! Latin-1, and always written back in the encoding it was read in.

use crate::BitfontError;
use std::path::Path;

/// The text encoding a BDF file was decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

impl TextEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Latin1 => "Latin-1",
        }
    }
}

/// A BDF file as an ordered list of lines, each with its original terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BdfDocument {
    lines: Vec<String>,
    encoding: TextEncoding,
}

/// Location of one glyph's `ENCODING` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EncodingLine {
    index: usize,
    value: i64,
}

impl BdfDocument {
    /// Decode a BDF file, preferring UTF-8 and falling back to Latin-1.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let (text, encoding) = match String::from_utf8(bytes) {
            Ok(text) => (text, TextEncoding::Utf8),
            Err(e) => {
                log::debug!("BDF is not valid UTF-8 ({}), reading as Latin-1", e.utf8_error());
                // Every byte value maps to the code point of the same number
                let text: String = e.into_bytes().into_iter().map(char::from).collect();
                (text, TextEncoding::Latin1)
            }
        };
        BdfDocument {
            lines: text.split_inclusive('\n').map(str::to_string).collect(),
            encoding,
        }
    }

    pub fn load(path: &Path) -> Result<Self, BitfontError> {
        let bytes = std::fs::read(path).map_err(|e| repair_error(path, e))?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn text_encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|l| l.trim_end_matches(['\r', '\n']))
    }

    fn encoding_lines(&self) -> Result<Vec<EncodingLine>, String> {
        let mut found = vec![];
        let mut in_glyph = false;
        let mut seen_encoding = false;
        for (index, line) in self.lines().enumerate() {
            let keyword = line.split_whitespace().next().unwrap_or("");
            match keyword {
                "STARTCHAR" => {
                    if in_glyph {
                        return Err(format!("line {}: STARTCHAR inside a glyph", index + 1));
                    }
                    in_glyph = true;
                    seen_encoding = false;
                }
                "ENDCHAR" => {
                    if !in_glyph {
                        return Err(format!("line {}: ENDCHAR outside a glyph", index + 1));
                    }
                    if !seen_encoding {
                        return Err(format!("line {}: glyph without ENCODING", index + 1));
                    }
                    in_glyph = false;
                }
                "ENCODING" if in_glyph => {
                    // "ENCODING n" or "ENCODING -1 n"; the first number is the one that counts
                    let value = line
                        .split_whitespace()
                        .nth(1)
                        .and_then(|v| v.parse::<i64>().ok())
                        .ok_or_else(|| format!("line {}: malformed ENCODING {:?}", index + 1, line))?;
                    seen_encoding = true;
                    found.push(EncodingLine { index, value });
                }
                _ => {}
            }
        }
        if in_glyph {
            return Err("unterminated glyph at end of file".to_string());
        }
        Ok(found)
    }

    /// Number of glyph records.
    pub fn glyph_count(&self) -> Result<usize, String> {
        Ok(self.encoding_lines()?.len())
    }

    /// The `ENCODING` value of every glyph, in file order.
    pub fn encodings(&self) -> Result<Vec<i64>, String> {
        Ok(self.encoding_lines()?.iter().map(|l| l.value).collect())
    }

    /// Set each glyph's `ENCODING` to the code point of the character at the
    /// same position in `glyph_order`. Returns how many lines changed.
    pub fn set_encodings(&mut self, glyph_order: &[char]) -> Result<usize, String> {
        let encoding_lines = self.encoding_lines()?;
        if encoding_lines.len() != glyph_order.len() {
            return Err(format!(
                "file has {} glyphs but {} characters were requested",
                encoding_lines.len(),
                glyph_order.len()
            ));
        }
        let mut changed = 0;
        for (line, c) in encoding_lines.iter().zip(glyph_order) {
            let codepoint = *c as u32;
            if line.value == codepoint as i64 {
                continue;
            }
            let original = &self.lines[line.index];
            let terminator = &original[original.trim_end_matches(['\r', '\n']).len()..];
            let replacement = format!("ENCODING {}{}", codepoint, terminator);
            self.lines[line.index] = replacement;
            changed += 1;
        }
        Ok(changed)
    }

    /// Encode back to bytes in the encoding the document was read with.
    pub fn to_bytes(&self) -> Result<Vec<u8>, String> {
        match self.encoding {
            TextEncoding::Utf8 => Ok(self.lines.concat().into_bytes()),
            TextEncoding::Latin1 => self
                .lines
                .iter()
                .flat_map(|l| l.chars())
                .map(|c| {
                    u8::try_from(c as u32)
                        .map_err(|_| format!("U+{:04X} cannot be written as Latin-1", c as u32))
                })
                .collect(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), BitfontError> {
        let bytes = self.to_bytes().map_err(|reason| BitfontError::EncodingRepair {
            path: path.to_path_buf(),
            reason,
        })?;
        std::fs::write(path, bytes).map_err(|e| repair_error(path, e))
    }
}

fn repair_error(path: &Path, reason: impl ToString) -> BitfontError {
    BitfontError::EncodingRepair {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// What a repair pass did to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairSummary {
    pub glyphs: usize,
    pub changed: usize,
    pub encoding: TextEncoding,
}

/// Rewrite the `ENCODING` fields of the BDF file at `path` in place.
///
/// `glyph_order` must list the characters the subset was built from in
/// ascending code point order, one per glyph record.
pub fn repair_encodings(path: &Path, glyph_order: &[char]) -> Result<RepairSummary, BitfontError> {
    let mut document = BdfDocument::load(path)?;
    let changed = document
        .set_encodings(glyph_order)
        .map_err(|reason| repair_error(path, reason))?;
    if changed > 0 {
        document.save(path)?;
    }
    log::info!(
        "Repaired {} of {} ENCODING fields in {} ({})",
        changed,
        glyph_order.len(),
        path.display(),
        document.text_encoding().name()
    );
    Ok(RepairSummary {
        glyphs: glyph_order.len(),
        changed,
        encoding: document.text_encoding(),
    })
}
