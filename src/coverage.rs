//! Which of the requested characters does the source font actually map?

use crate::{charset::codepoint_label, BitfontError, CharacterSet};
use serde::{Deserialize, Serialize};
use skrifa::{raw::TableProvider, FontRef, MetadataProvider};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

fn font_load_error(path: &Path, reason: impl ToString) -> BitfontError {
    BitfontError::FontLoad {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn read_font_file(path: &Path) -> Result<Vec<u8>, BitfontError> {
    std::fs::read(path).map_err(|e| font_load_error(path, e))
}

// Collections always contribute their first member font.
fn parse_font<'a>(path: &Path, data: &'a [u8]) -> Result<FontRef<'a>, BitfontError> {
    FontRef::from_index(data, 0).map_err(|e| font_load_error(path, e))
}

/// Every code point the font's character map covers.
pub fn load_charmap(path: &Path) -> Result<HashSet<u32>, BitfontError> {
    let data = read_font_file(path)?;
    let font = parse_font(path, &data)?;
    Ok(font.charmap().mappings().map(|(cp, _gid)| cp).collect())
}

/// Number of glyphs in the font, `.notdef` included.
pub fn count_glyphs(path: &Path) -> Result<usize, BitfontError> {
    let data = read_font_file(path)?;
    let font = parse_font(path, &data)?;
    let maxp = font.maxp().map_err(|e| font_load_error(path, e))?;
    Ok(maxp.num_glyphs() as usize)
}

/// A loaded font's character map, ready to be checked against requests.
#[derive(Debug, Clone)]
pub struct CoverageChecker {
    source: PathBuf,
    mapped: HashSet<u32>,
}

impl CoverageChecker {
    pub fn new(source: impl Into<PathBuf>, mapped: HashSet<u32>) -> Self {
        CoverageChecker {
            source: source.into(),
            mapped,
        }
    }

    pub fn from_font(path: &Path) -> Result<Self, BitfontError> {
        let mapped = load_charmap(path)?;
        log::debug!("{} maps {} code points", path.display(), mapped.len());
        Ok(Self::new(path, mapped))
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn check(&self, requested: &CharacterSet) -> CoverageReport {
        let (found, missing): (Vec<char>, Vec<char>) = requested
            .iter()
            .partition(|c| self.mapped.contains(&(*c as u32)));
        CoverageReport {
            requested: requested.len(),
            found: found.into_iter().collect(),
            missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageReport {
    requested: usize,
    found: CharacterSet,
    // Ascending, since the requested set iterates in order
    missing: Vec<char>,
}

impl CoverageReport {
    pub fn found(&self) -> &CharacterSet {
        &self.found
    }

    pub fn missing(&self) -> &[char] {
        &self.missing
    }

    pub fn requested_count(&self) -> usize {
        self.requested
    }

    pub fn found_count(&self) -> usize {
        self.found.len()
    }

    pub fn missing_count(&self) -> usize {
        self.missing.len()
    }

    /// Fraction of requested characters present. An empty request is fully covered.
    pub fn ratio(&self) -> f64 {
        if self.requested == 0 {
            1.0
        } else {
            self.found.len() as f64 / self.requested as f64
        }
    }

    pub fn is_below(&self, threshold: f64) -> bool {
        self.ratio() < threshold
    }

    pub fn stats(&self) -> CoverageStats {
        CoverageStats {
            requested: self.requested,
            found_in_source: self.found.len(),
            missing_count: self.missing.len(),
            missing: self.missing.iter().copied().map(codepoint_label).collect(),
        }
    }
}

/// The serialized form of a [`CoverageReport`] in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageStats {
    pub requested: usize,
    pub found_in_source: usize,
    pub missing_count: usize,
    pub missing: Vec<String>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::ErrorKind;
    use pretty_assertions::assert_eq;

    fn checker(mapped: &str) -> CoverageChecker {
        CoverageChecker::new("test.ttf", mapped.chars().map(|c| c as u32).collect())
    }

    #[test]
    fn test_found_and_missing() {
        let report = checker("AB").check(&CharacterSet::from_text("AC"));
        assert_eq!(report.found(), &CharacterSet::from_text("A"));
        assert_eq!(report.missing(), &['C']);
        assert_eq!(report.requested_count(), 2);
        assert_eq!(report.ratio(), 0.5);
    }

    #[test]
    fn test_missing_is_ascending() {
        let report = checker("b").check(&CharacterSet::from_text("zyxb"));
        assert_eq!(report.missing(), &['x', 'y', 'z']);
        assert_eq!(report.stats().missing, vec!["U+0078", "U+0079", "U+007A"]);
    }

    #[test]
    fn test_threshold() {
        let report = checker("0").check(&CharacterSet::from_text("0123"));
        assert!(report.is_below(0.5));
        assert!(!report.is_below(0.25));
        let full = checker("0123456789").check(&CharacterSet::from_text("0123456789"));
        assert_eq!(full.missing_count(), 0);
        assert!(!full.is_below(0.5));
    }

    #[test]
    fn test_empty_request_is_covered() {
        let report = checker("A").check(&CharacterSet::default());
        assert_eq!(report.ratio(), 1.0);
    }

    #[test]
    fn test_unreadable_font() {
        let err = CoverageChecker::from_font(Path::new("/nonexistent/font.ttf")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FontLoad);
    }

    #[test]
    fn test_corrupt_font() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"definitely not a font").unwrap();
        let err = load_charmap(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FontLoad);
    }
}
