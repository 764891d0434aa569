#![allow(dead_code, clippy::unwrap_used)]

use bitfont::{
    coverage::load_charmap, stages::SubsetOutput, tools::ToolOutput, BitfontError, BitmapCompiler,
    CharacterSet, Rasterizer, Subsetter, Toolchain,
};
use std::path::Path;

fn push16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn push32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// A format 4 `cmap` mapping each BMP code point to glyphs 1, 2, 3...
fn cmap(codepoints: &[u32]) -> Vec<u8> {
    let seg_count = codepoints.len() + 1;
    let search_range = 2 * (1usize << (usize::BITS - 1 - seg_count.leading_zeros()));
    let mut subtable = vec![];
    push16(&mut subtable, 4);
    push16(&mut subtable, (16 + 8 * seg_count) as u16);
    push16(&mut subtable, 0);
    push16(&mut subtable, (seg_count * 2) as u16);
    push16(&mut subtable, search_range as u16);
    push16(&mut subtable, (search_range / 2).trailing_zeros() as u16);
    push16(&mut subtable, (seg_count * 2 - search_range) as u16);
    for cp in codepoints {
        push16(&mut subtable, *cp as u16);
    }
    push16(&mut subtable, 0xFFFF);
    push16(&mut subtable, 0);
    for cp in codepoints {
        push16(&mut subtable, *cp as u16);
    }
    push16(&mut subtable, 0xFFFF);
    for (index, cp) in codepoints.iter().enumerate() {
        push16(&mut subtable, (index as u32 + 1).wrapping_sub(*cp) as u16);
    }
    push16(&mut subtable, 1);
    for _ in 0..seg_count {
        push16(&mut subtable, 0);
    }

    let mut table = vec![];
    push16(&mut table, 0);
    push16(&mut table, 1);
    push16(&mut table, 3);
    push16(&mut table, 1);
    push32(&mut table, 12);
    table.extend(subtable);
    table
}

/// The smallest font the coverage checker can read: `cmap` and `maxp` only.
pub fn minimal_font(chars: &str) -> Vec<u8> {
    let codepoints: Vec<u32> = CharacterSet::from_text(chars)
        .iter()
        .map(|c| c as u32)
        .collect();
    let mut maxp = vec![];
    push32(&mut maxp, 0x0000_5000);
    push16(&mut maxp, codepoints.len() as u16 + 1);
    let tables: [(&[u8; 4], Vec<u8>); 2] = [(b"cmap", cmap(&codepoints)), (b"maxp", maxp)];

    let mut font = vec![];
    push32(&mut font, 0x0001_0000);
    push16(&mut font, tables.len() as u16);
    push16(&mut font, 32);
    push16(&mut font, 1);
    push16(&mut font, 0);
    let mut offset = 12 + 16 * tables.len();
    let mut body = vec![];
    for (tag, data) in tables.iter() {
        font.extend_from_slice(*tag);
        push32(&mut font, 0);
        push32(&mut font, offset as u32);
        push32(&mut font, data.len() as u32);
        let mut padded = data.clone();
        padded.resize(data.len().div_ceil(4) * 4, 0);
        offset += padded.len();
        body.extend(padded);
    }
    font.extend(body);
    font
}

/// Subsets by writing a minimal font of the requested characters the source maps.
pub struct FontSubsetter;

impl Subsetter for FontSubsetter {
    fn tool(&self) -> &str {
        "test-subset"
    }

    fn describe(&self, source: &Path, chars: &CharacterSet, _output: &Path) -> String {
        format!("test-subset {} ({} chars)", source.display(), chars.len())
    }

    fn subset(
        &self,
        source: &Path,
        chars: &CharacterSet,
        output: &Path,
    ) -> Result<SubsetOutput, BitfontError> {
        let mapped = load_charmap(source)?;
        let kept: String = chars.iter().filter(|c| mapped.contains(&(*c as u32))).collect();
        std::fs::write(output, minimal_font(&kept))?;
        Ok(SubsetOutput {
            glyph_count: kept.chars().count() + 1,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// Writes one BDF glyph per mapped character, numbered 1, 2, 3...
pub struct SequentialRasterizer {
    pub failing_sizes: Vec<u32>,
}

impl Rasterizer for SequentialRasterizer {
    fn tool(&self) -> &str {
        "test-raster"
    }

    fn describe(&self, font: &Path, size: u32, output: &Path) -> String {
        format!("test-raster -p {} {} -o {}", size, font.display(), output.display())
    }

    fn rasterize(&self, font: &Path, size: u32, output: &Path) -> Result<ToolOutput, BitfontError> {
        if self.failing_sizes.contains(&size) {
            return Err(BitfontError::Conversion {
                tool: "test-raster".into(),
                exit_code: Some(1),
                stdout: String::new(),
                stderr: "no glyphs generated".into(),
            });
        }
        let glyphs = load_charmap(font)?.len();
        let mut bdf = format!(
            "STARTFONT 2.1\nCOMMENT Copyright \u{a9} Test\nFONT -test-{}\nSIZE {} 75 75\nCHARS {}\n",
            size, size, glyphs
        );
        for i in 1..=glyphs {
            bdf.push_str(&format!(
                "STARTCHAR g{}\nENCODING {}\nBBX 1 1 0 0\nBITMAP\n80\nENDCHAR\n",
                i, i
            ));
        }
        bdf.push_str("ENDFONT\n");
        std::fs::write(output, bdf)?;
        Ok(ToolOutput::default())
    }
}

/// "Compiles" by copying the repaired BDF.
pub struct CopyCompiler;

impl BitmapCompiler for CopyCompiler {
    fn tool(&self) -> &str {
        "test-compile"
    }

    fn describe(&self, bdf: &Path, output: &Path) -> String {
        format!("cp {} {}", bdf.display(), output.display())
    }

    fn compile(&self, bdf: &Path, output: &Path) -> Result<ToolOutput, BitfontError> {
        std::fs::copy(bdf, output)?;
        Ok(ToolOutput::default())
    }
}

pub fn toolchain(failing_sizes: Vec<u32>) -> Toolchain {
    Toolchain::new(
        Box::new(FontSubsetter),
        Box::new(SequentialRasterizer { failing_sizes }),
        Box::new(CopyCompiler),
    )
}
