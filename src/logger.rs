//! Run-scoped progress reporting and the execution trace.
//!
//! A [`GenerationLogger`] is created once per run and handed to every stage.
//! It renders human-readable progress according to its [`Verbosity`] and
//! accumulates every [`StageResult`] into a [`GenerationTrace`], which the
//! manifest embeds in debug mode.

use crate::{pipeline::Stage, BitfontError};
use serde::{Deserialize, Serialize};
use std::{io::Write, path::Path};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Errors and the final summary only
    #[default]
    #[serde(alias = "default")]
    Quiet,
    /// Every stage transition and warning
    Verbose,
    /// Verbose, plus coverage analysis, tool output and a persisted trace
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Success,
    Failed,
    Skipped,
}

/// The recorded outcome of one stage for one size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub step: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    pub command: String,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_kb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glyphs_produced: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl StageResult {
    fn new(step: Stage, command: impl Into<String>, status: StageStatus) -> Self {
        StageResult {
            step,
            size: None,
            command: command.into(),
            status,
            output: None,
            size_kb: None,
            glyphs_produced: None,
            error: None,
            exit_code: None,
            stdout: None,
            stderr: None,
            warnings: vec![],
        }
    }

    pub fn success(step: Stage, command: impl Into<String>) -> Self {
        Self::new(step, command, StageStatus::Success)
    }

    pub fn failure(step: Stage, command: impl Into<String>, error: &BitfontError) -> Self {
        let mut result = Self::new(step, command, StageStatus::Failed);
        result.error = Some(error.to_string());
        if let BitfontError::Conversion {
            exit_code,
            stdout,
            stderr,
            ..
        } = error
        {
            result.exit_code = *exit_code;
            result.stdout = non_empty(stdout);
            result.stderr = non_empty(stderr);
        }
        result
    }

    /// A stage that was never attempted because an earlier size proved it cannot succeed.
    pub fn skipped(step: Stage, command: impl Into<String>, error: &BitfontError) -> Self {
        let mut result = Self::new(step, command, StageStatus::Skipped);
        result.error = Some(error.to_string());
        result
    }

    pub fn for_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Record the produced file's name and size on disk.
    pub fn with_output(mut self, path: &Path) -> Self {
        self.output = path.file_name().map(|n| n.to_string_lossy().into_owned());
        self.size_kb = std::fs::metadata(path)
            .ok()
            .map(|m| format!("{:.1}", m.len() as f64 / 1024.0));
        self
    }

    pub fn with_glyphs(mut self, glyphs: usize) -> Self {
        self.glyphs_produced = Some(glyphs);
        self
    }

    pub fn with_tool_output(mut self, stdout: &str, stderr: &str) -> Self {
        self.stdout = non_empty(stdout);
        self.stderr = non_empty(stderr);
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Everything a run recorded, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationTrace {
    pub entries: Vec<StageResult>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

pub struct GenerationLogger {
    verbosity: Verbosity,
    out: Box<dyn Write>,
    err: Box<dyn Write>,
    trace: GenerationTrace,
}

impl std::fmt::Debug for GenerationLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationLogger")
            .field("verbosity", &self.verbosity)
            .field("trace", &self.trace)
            .finish()
    }
}

impl GenerationLogger {
    /// A logger printing to stdout and stderr.
    pub fn new(verbosity: Verbosity) -> Self {
        Self::with_writers(
            verbosity,
            Box::new(std::io::stdout()),
            Box::new(std::io::stderr()),
        )
    }

    pub fn with_writers(verbosity: Verbosity, out: Box<dyn Write>, err: Box<dyn Write>) -> Self {
        GenerationLogger {
            verbosity,
            out,
            err,
            trace: GenerationTrace::default(),
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn is_verbose(&self) -> bool {
        self.verbosity >= Verbosity::Verbose
    }

    pub fn is_debug(&self) -> bool {
        self.verbosity >= Verbosity::Debug
    }

    // Console output is best effort; a closed pipe must not fail the run
    fn print(&mut self, line: &str) {
        let _ = writeln!(self.out, "{}", line);
    }

    fn eprint(&mut self, line: &str) {
        let _ = writeln!(self.err, "{}", line);
    }

    pub fn section(&mut self, title: &str) {
        if self.is_verbose() {
            self.print(&format!("\n{}", title));
        }
    }

    pub fn info(&mut self, message: &str) {
        log::info!("{}", message);
        if self.is_verbose() {
            self.print(&format!("  {}", message));
        }
    }

    /// Shown only in debug mode.
    pub fn detail(&mut self, message: &str) {
        log::debug!("{}", message);
        if self.is_debug() {
            self.print(&format!("    {}", message));
        }
    }

    pub fn success(&mut self, message: &str) {
        if self.is_verbose() {
            self.print(&format!("  ✓ {}", message));
        }
    }

    pub fn warn(&mut self, message: &str) {
        log::debug!("warning: {}", message);
        self.trace.warnings.push(message.to_string());
        if self.is_verbose() {
            self.print(&format!("  WARNING: {}", message));
        }
    }

    /// Errors are always shown.
    pub fn error(&mut self, message: &str) {
        log::debug!("error: {}", message);
        self.trace.errors.push(message.to_string());
        self.eprint(&format!("  ERROR: {}", message));
    }

    pub fn stage_started(&mut self, stage: Stage, command: &str) {
        if self.is_verbose() {
            self.print(&format!("  [{}] {}", stage, command));
        }
    }

    /// Append a stage outcome to the trace.
    ///
    /// Raw tool output is kept only in debug mode.
    pub fn record(&mut self, mut result: StageResult) {
        log::debug!("{:?}", result);
        if !self.is_debug() {
            result.stdout = None;
            result.stderr = None;
        }
        if self.is_verbose() {
            match result.status {
                StageStatus::Success => {
                    let mut line = format!("  ✓ [{}] {}", result.step, result.command);
                    if let Some(output) = &result.output {
                        line.push_str(&format!(" → {}", output));
                    }
                    if let Some(size_kb) = &result.size_kb {
                        line.push_str(&format!(" ({} KB)", size_kb));
                    }
                    if let Some(glyphs) = result.glyphs_produced {
                        line.push_str(&format!(" ({} glyphs)", glyphs));
                    }
                    self.print(&line);
                }
                StageStatus::Failed | StageStatus::Skipped => {
                    let mark = if result.status == StageStatus::Failed {
                        "✗"
                    } else {
                        "-"
                    };
                    self.eprint(&format!("  {} [{}] {}", mark, result.step, result.command));
                    if let Some(error) = &result.error {
                        self.eprint(&format!("      Error: {}", error));
                    }
                }
            }
        }
        self.trace.entries.push(result);
    }

    pub fn trace(&self) -> &GenerationTrace {
        &self.trace
    }

    pub fn warnings(&self) -> &[String] {
        &self.trace.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.trace.errors
    }

    pub fn into_trace(self) -> GenerationTrace {
        self.trace
    }
}
