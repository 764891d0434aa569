//! Character set assembly.
//!
//! A [`CharacterSet`] is the deduplicated union of every declared character
//! source: inline text, the contents of a text file, and Unicode range
//! expressions such as `U+0030-0039`.

use crate::BitfontError;
use regex::Regex;
use serde::Deserialize;
use std::{
    collections::BTreeSet,
    fmt,
    path::PathBuf,
    str::FromStr,
    sync::LazyLock,
};

static RANGE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    // Expected format: U+XXXX or U+XXXX-YYYY, the prefix being optional on both bounds
    #[allow(clippy::unwrap_used)] // Safe because the regex is valid
    Regex::new(r"^\s*(?:[Uu]\+)?(?P<low>[0-9A-Fa-f]+)\s*(?:-\s*(?:[Uu]\+)?(?P<high>[0-9A-Fa-f]+))?\s*$")
        .unwrap()
});

const MAX_CODEPOINT: u32 = 0x10FFFF;

/// An inclusive range of Unicode code points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnicodeRange {
    low: u32,
    high: u32,
}

impl UnicodeRange {
    pub fn low(&self) -> u32 {
        self.low
    }

    pub fn high(&self) -> u32 {
        self.high
    }

    /// Scalar values in the range. Surrogates are skipped.
    pub fn chars(&self) -> impl Iterator<Item = char> {
        (self.low..=self.high).filter_map(char::from_u32)
    }
}

fn parse_bound(expression: &str, digits: &str) -> Result<u32, BitfontError> {
    let value = u32::from_str_radix(digits, 16).map_err(|e| BitfontError::InvalidRange {
        expression: expression.to_string(),
        reason: format!("malformed hex {:?}: {}", digits, e),
    })?;
    if value > MAX_CODEPOINT {
        return Err(BitfontError::InvalidRange {
            expression: expression.to_string(),
            reason: format!("U+{:04X} is beyond U+10FFFF", value),
        });
    }
    Ok(value)
}

impl FromStr for UnicodeRange {
    type Err = BitfontError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let captures = RANGE_REGEX
            .captures(expression)
            .ok_or_else(|| BitfontError::InvalidRange {
                expression: expression.to_string(),
                reason: "expected U+XXXX or U+XXXX-YYYY".to_string(),
            })?;
        let low = parse_bound(expression, &captures["low"])?;
        let Some(high) = captures.name("high") else {
            if char::from_u32(low).is_none() {
                return Err(BitfontError::InvalidRange {
                    expression: expression.to_string(),
                    reason: format!("U+{:04X} is not a Unicode scalar value", low),
                });
            }
            return Ok(UnicodeRange { low, high: low });
        };
        let high = parse_bound(expression, high.as_str())?;
        if low > high {
            return Err(BitfontError::InvalidRange {
                expression: expression.to_string(),
                reason: format!("U+{:04X} > U+{:04X}", low, high),
            });
        }
        Ok(UnicodeRange { low, high })
    }
}

impl fmt::Display for UnicodeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.low == self.high {
            write!(f, "U+{:04X}", self.low)
        } else {
            write!(f, "U+{:04X}-{:04X}", self.low, self.high)
        }
    }
}

/// Where the requested characters come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CharacterSources {
    #[serde(default)]
    pub inline: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub unicode_ranges: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharsetOptions {
    /// Only affects presentation; generation always works on the set.
    pub deduplicate: bool,
    /// Drop all whitespace except U+0020.
    pub strip_whitespace: bool,
}

impl Default for CharsetOptions {
    fn default() -> Self {
        CharsetOptions {
            deduplicate: true,
            strip_whitespace: false,
        }
    }
}

fn is_strippable(c: char) -> bool {
    c.is_whitespace() && c != ' '
}

/// An immutable set of Unicode scalar values, iterated in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterSet {
    chars: BTreeSet<char>,
    // The characters as supplied, duplicates included, when deduplication is off
    supplied: Option<Vec<char>>,
}

impl CharacterSet {
    /// Union every declared source into one set.
    ///
    /// Range expressions are validated before any file is read, so a bad
    /// expression is reported even if the characters file is also broken.
    pub fn collect(
        sources: &CharacterSources,
        options: CharsetOptions,
    ) -> Result<Self, BitfontError> {
        let ranges = sources
            .unicode_ranges
            .iter()
            .map(|expression| expression.parse::<UnicodeRange>())
            .collect::<Result<Vec<_>, _>>()?;

        let mut supplied: Vec<char> = Vec::new();
        if let Some(inline) = &sources.inline {
            supplied.extend(inline.chars());
        }
        if let Some(path) = &sources.file {
            let content = std::fs::read_to_string(path).map_err(|e| {
                BitfontError::Config(format!(
                    "could not read characters file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            log::debug!(
                "Read {} characters from {}",
                content.chars().count(),
                path.display()
            );
            supplied.extend(content.chars());
        }
        for range in ranges.iter() {
            supplied.extend(range.chars());
        }
        if options.strip_whitespace {
            supplied.retain(|c| !is_strippable(*c));
        }

        let chars = supplied.iter().copied().collect();
        Ok(CharacterSet {
            chars,
            supplied: (!options.deduplicate).then_some(supplied),
        })
    }

    /// Unique characters of a piece of text.
    pub fn from_text(text: &str) -> Self {
        text.chars().collect()
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn contains(&self, c: char) -> bool {
        self.chars.contains(&c)
    }

    /// Characters in ascending code point order.
    pub fn iter(&self) -> impl Iterator<Item = char> + '_ {
        self.chars.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<char> {
        self.iter().collect()
    }

    /// `U+XXXX` notation for every character, ascending.
    pub fn unicode_list(&self) -> Vec<String> {
        self.iter().map(codepoint_label).collect()
    }

    /// All characters as one sorted string.
    pub fn as_sorted_string(&self) -> String {
        self.iter().collect()
    }

    /// The string shown to users: the sorted set, or the supplied sequence
    /// with its duplicates when deduplication was switched off.
    pub fn display_string(&self) -> String {
        match &self.supplied {
            Some(supplied) => supplied.iter().collect(),
            None => self.as_sorted_string(),
        }
    }

    /// The first `limit` characters of [`display_string`](Self::display_string),
    /// with an ellipsis if anything was cut.
    pub fn preview(&self, limit: usize) -> String {
        let display = self.display_string();
        let mut preview: String = display.chars().take(limit).collect();
        if display.chars().count() > limit {
            preview.push_str("...");
        }
        preview
    }
}

impl FromIterator<char> for CharacterSet {
    fn from_iter<T: IntoIterator<Item = char>>(iter: T) -> Self {
        CharacterSet {
            chars: iter.into_iter().collect(),
            supplied: None,
        }
    }
}

pub fn codepoint_label(c: char) -> String {
    format!("U+{:04X}", c as u32)
}
