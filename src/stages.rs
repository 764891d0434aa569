//! The external tools behind each conversion stage.
//!
//! Each stage is a trait so the orchestrator can be driven by any
//! implementation; the default [`Toolchain`] shells out to fontTools'
//! `pyftsubset`, `otf2bdf` and `bdftopcf`.

use crate::{
    coverage::{count_glyphs, load_charmap},
    tools::{ToolInvocation, ToolOutput, COMPILER, RASTERIZER, SUBSETTER},
    BitfontError, CharacterSet,
};
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// What the subsetter produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetOutput {
    pub glyph_count: usize,
    pub stdout: String,
    pub stderr: String,
}

/// Reduces an outline font to the requested characters.
pub trait Subsetter {
    /// Name of the program this stage depends on.
    fn tool(&self) -> &str;
    fn describe(&self, source: &Path, chars: &CharacterSet, output: &Path) -> String;
    fn subset(
        &self,
        source: &Path,
        chars: &CharacterSet,
        output: &Path,
    ) -> Result<SubsetOutput, BitfontError>;
}

/// Renders an outline font to BDF at a point size.
pub trait Rasterizer {
    fn tool(&self) -> &str;
    fn describe(&self, font: &Path, size: u32, output: &Path) -> String;
    fn rasterize(&self, font: &Path, size: u32, output: &Path) -> Result<ToolOutput, BitfontError>;
}

/// Compiles a BDF file into its binary form.
pub trait BitmapCompiler {
    fn tool(&self) -> &str;
    fn describe(&self, bdf: &Path, output: &Path) -> String;
    fn compile(&self, bdf: &Path, output: &Path) -> Result<ToolOutput, BitfontError>;
}

/// Program names to invoke for each stage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ToolPrograms {
    pub subsetter: String,
    pub rasterizer: String,
    pub compiler: String,
}

impl Default for ToolPrograms {
    fn default() -> Self {
        ToolPrograms {
            subsetter: SUBSETTER.name.to_string(),
            rasterizer: RASTERIZER.name.to_string(),
            compiler: COMPILER.name.to_string(),
        }
    }
}

pub struct FontToolsSubsetter {
    program: String,
    timeout: Duration,
}

impl FontToolsSubsetter {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        FontToolsSubsetter {
            program: program.into(),
            timeout,
        }
    }

    fn invocation(&self, source: &Path, output: &Path) -> ToolInvocation {
        ToolInvocation::new(&self.program)
            .arg(source)
            .arg(format!("--unicodes-file={}", unicodes_path(output).display()))
            .arg(format!("--output-file={}", output.display()))
            // Collections: always the first member
            .arg("--font-number=0")
    }
}

/// Code point list handed to the subsetter, one `U+XXXX` per line.
///
/// Large sets would overflow a single command line argument.
pub fn unicodes_path(output: &Path) -> PathBuf {
    output.with_extension("unicodes")
}

impl Subsetter for FontToolsSubsetter {
    fn tool(&self) -> &str {
        &self.program
    }

    fn describe(&self, source: &Path, _chars: &CharacterSet, output: &Path) -> String {
        self.invocation(source, output).display()
    }

    fn subset(
        &self,
        source: &Path,
        chars: &CharacterSet,
        output: &Path,
    ) -> Result<SubsetOutput, BitfontError> {
        // Unreadable sources are a font problem, not a tool problem
        let mapped = load_charmap(source)?;
        log::debug!(
            "{} maps {} of {} requested characters",
            source.display(),
            chars.iter().filter(|c| mapped.contains(&(*c as u32))).count(),
            chars.len()
        );
        let list = unicodes_path(output);
        let mut unicodes = chars.unicode_list().join("\n");
        unicodes.push('\n');
        std::fs::write(&list, unicodes)?;
        let result = self.invocation(source, output).run(self.timeout);
        if let Err(e) = std::fs::remove_file(&list) {
            log::debug!("Could not remove {}: {}", list.display(), e);
        }
        let result = result?;
        let glyph_count = count_glyphs(output)?;
        Ok(SubsetOutput {
            glyph_count,
            stdout: result.stdout_text(),
            stderr: result.stderr,
        })
    }
}

pub struct Otf2Bdf {
    program: String,
    timeout: Duration,
}

impl Otf2Bdf {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Otf2Bdf {
            program: program.into(),
            timeout,
        }
    }

    fn invocation(&self, font: &Path, size: u32, output: &Path) -> ToolInvocation {
        ToolInvocation::new(&self.program)
            .arg("-p")
            .arg(size.to_string())
            .arg(font)
            .arg("-o")
            .arg(output)
    }
}

impl Rasterizer for Otf2Bdf {
    fn tool(&self) -> &str {
        &self.program
    }

    fn describe(&self, font: &Path, size: u32, output: &Path) -> String {
        self.invocation(font, size, output).display()
    }

    fn rasterize(&self, font: &Path, size: u32, output: &Path) -> Result<ToolOutput, BitfontError> {
        let result = self.invocation(font, size, output).run(self.timeout)?;
        if !output.is_file() {
            return Err(BitfontError::Conversion {
                tool: self.program.clone(),
                exit_code: Some(0),
                stdout: result.stdout_text(),
                stderr: format!("no output written to {}", output.display()),
            });
        }
        Ok(result)
    }
}

pub struct BdfToPcf {
    program: String,
    timeout: Duration,
}

impl BdfToPcf {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        BdfToPcf {
            program: program.into(),
            timeout,
        }
    }

    fn invocation(&self, bdf: &Path) -> ToolInvocation {
        ToolInvocation::new(&self.program).arg(bdf)
    }
}

impl BitmapCompiler for BdfToPcf {
    fn tool(&self) -> &str {
        &self.program
    }

    fn describe(&self, bdf: &Path, _output: &Path) -> String {
        self.invocation(bdf).display()
    }

    // The compiled font arrives on stdout
    fn compile(&self, bdf: &Path, output: &Path) -> Result<ToolOutput, BitfontError> {
        let mut result = self.invocation(bdf).run(self.timeout)?;
        if result.stdout.is_empty() {
            return Err(BitfontError::Conversion {
                tool: self.program.clone(),
                exit_code: Some(0),
                stdout: String::new(),
                stderr: if result.stderr.is_empty() {
                    "no output produced".to_string()
                } else {
                    result.stderr
                },
            });
        }
        std::fs::write(output, &result.stdout)?;
        // Binary output is not worth keeping in the trace
        result.stdout.clear();
        Ok(result)
    }
}

/// One implementation per stage.
pub struct Toolchain {
    pub subsetter: Box<dyn Subsetter>,
    pub rasterizer: Box<dyn Rasterizer>,
    pub compiler: Box<dyn BitmapCompiler>,
}

impl Toolchain {
    pub fn new(
        subsetter: Box<dyn Subsetter>,
        rasterizer: Box<dyn Rasterizer>,
        compiler: Box<dyn BitmapCompiler>,
    ) -> Self {
        Toolchain {
            subsetter,
            rasterizer,
            compiler,
        }
    }

    /// The external command-line tools, each run with the given timeout.
    pub fn external(programs: &ToolPrograms, timeout: Duration) -> Self {
        Self::new(
            Box::new(FontToolsSubsetter::new(&programs.subsetter, timeout)),
            Box::new(Otf2Bdf::new(&programs.rasterizer, timeout)),
            Box::new(BdfToPcf::new(&programs.compiler, timeout)),
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_lines() {
        let rasterizer = Otf2Bdf::new("otf2bdf", Duration::from_secs(1));
        assert_eq!(
            rasterizer.describe(Path::new("a.ttf"), 16, Path::new("a.bdf")),
            "otf2bdf -p 16 a.ttf -o a.bdf"
        );
        let compiler = BdfToPcf::new("bdftopcf", Duration::from_secs(1));
        assert_eq!(
            compiler.describe(Path::new("a.bdf"), Path::new("a.pcf")),
            "bdftopcf a.bdf"
        );
        let subsetter = FontToolsSubsetter::new("pyftsubset", Duration::from_secs(1));
        let chars = CharacterSet::from_text("AB");
        assert_eq!(
            subsetter.describe(Path::new("src.ttf"), &chars, Path::new("out-subset.ttf")),
            "pyftsubset src.ttf --unicodes-file=out-subset.unicodes --output-file=out-subset.ttf --font-number=0"
        );
    }

    #[test]
    fn test_unreadable_source_is_font_error() {
        let subsetter = FontToolsSubsetter::new("pyftsubset", Duration::from_secs(1));
        let err = subsetter
            .subset(
                &PathBuf::from("/nonexistent/font.ttf"),
                &CharacterSet::from_text("A"),
                &PathBuf::from("/nonexistent/out.ttf"),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FontLoad);
    }

    #[test]
    fn test_missing_rasterizer_is_dependency_error() {
        let dir = tempfile::tempdir().unwrap();
        let rasterizer = Otf2Bdf::new("no-such-rasterizer-xyz", Duration::from_secs(1));
        let err = rasterizer
            .rasterize(&dir.path().join("a.ttf"), 12, &dir.path().join("a.bdf"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Dependency);
    }

    #[test]
    fn test_default_programs() {
        let programs: ToolPrograms = serde_yaml_ng::from_str("rasterizer: /opt/otf2bdf").unwrap();
        assert_eq!(programs.rasterizer, "/opt/otf2bdf");
        assert_eq!(programs.subsetter, "pyftsubset");
        assert_eq!(programs.compiler, "bdftopcf");
    }
}
