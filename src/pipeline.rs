//! Per-size conversion chain.
//!
//! Every size runs `Subsetting → Rasterizing → EncodingRepair → Compiling`
//! on its own. A failing stage moves that size to [`SizeState::Failed`] and
//! the orchestrator carries on with the next size.

use crate::{
    bdf::repair_encodings,
    config::OutputFormat,
    logger::{GenerationLogger, StageResult},
    stages::Toolchain,
    BitfontError, CharacterSet,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Subsetting,
    Rasterizing,
    EncodingRepair,
    Compiling,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Subsetting => "subsetting",
            Stage::Rasterizing => "rasterizing",
            Stage::EncodingRepair => "encoding_repair",
            Stage::Compiling => "compiling",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeState {
    Pending,
    Subsetting,
    Rasterizing,
    EncodingRepair,
    Compiling,
    Done,
    Failed(Stage),
}

impl SizeState {
    /// The stage being worked on, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            SizeState::Subsetting => Some(Stage::Subsetting),
            SizeState::Rasterizing => Some(Stage::Rasterizing),
            SizeState::EncodingRepair => Some(Stage::EncodingRepair),
            SizeState::Compiling => Some(Stage::Compiling),
            SizeState::Pending | SizeState::Done | SizeState::Failed(_) => None,
        }
    }

    /// The state after the current stage succeeded. Compiling is skipped
    /// when no compiled output was asked for.
    pub fn advance(self, compile: bool) -> SizeState {
        match self {
            SizeState::Pending => SizeState::Subsetting,
            SizeState::Subsetting => SizeState::Rasterizing,
            SizeState::Rasterizing => SizeState::EncodingRepair,
            SizeState::EncodingRepair if compile => SizeState::Compiling,
            SizeState::EncodingRepair | SizeState::Compiling => SizeState::Done,
            terminal => terminal,
        }
    }

    /// The state after the current stage failed.
    pub fn fail(self) -> SizeState {
        match (self, self.stage()) {
            (_, Some(stage)) => SizeState::Failed(stage),
            (SizeState::Pending, None) => SizeState::Failed(Stage::Subsetting),
            (terminal, None) => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SizeState::Done | SizeState::Failed(_))
    }
}

/// Everything the orchestrator needs to know about a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub source_font: PathBuf,
    pub sizes: Vec<u32>,
    /// Directory the family's files are written to
    pub output_dir: PathBuf,
    pub family: String,
    pub formats: Vec<OutputFormat>,
    pub coverage_warning_threshold: f64,
}

impl RunPlan {
    pub fn keeps(&self, format: OutputFormat) -> bool {
        self.formats.contains(&format)
    }

    pub fn paths(&self, size: u32) -> SizePaths {
        let stem = format!("{}-{}pt", self.family, size);
        SizePaths {
            subset: self.output_dir.join(format!("{}-subset.ttf", stem)),
            bdf: self.output_dir.join(format!("{}.bdf", stem)),
            pcf: self.output_dir.join(format!("{}.pcf", stem)),
        }
    }
}

/// The files one size's chain reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizePaths {
    pub subset: PathBuf,
    pub bdf: PathBuf,
    pub pcf: PathBuf,
}

#[derive(Debug)]
pub struct SizeOutcome {
    pub size: u32,
    pub state: SizeState,
    pub artifacts: Vec<PathBuf>,
    pub error: Option<BitfontError>,
}

impl SizeOutcome {
    pub fn is_done(&self) -> bool {
        self.state == SizeState::Done
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match self.state {
            SizeState::Failed(stage) => Some(stage),
            _ => None,
        }
    }
}

/// Outcome of every size, in the order they were declared.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<SizeOutcome>,
}

impl RunReport {
    pub fn completed(&self) -> impl Iterator<Item = &SizeOutcome> {
        self.outcomes.iter().filter(|o| o.is_done())
    }

    pub fn failed(&self) -> impl Iterator<Item = &SizeOutcome> {
        self.outcomes.iter().filter(|o| !o.is_done())
    }

    pub fn artifacts(&self) -> Vec<&Path> {
        self.completed()
            .flat_map(|o| o.artifacts.iter().map(PathBuf::as_path))
            .collect()
    }

    /// Artifact file names without directories, for the manifest.
    pub fn artifact_names(&self) -> Vec<String> {
        self.artifacts()
            .into_iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    }

    /// A run that produced nothing is a failure even though each size failed on its own.
    pub fn is_success(&self) -> bool {
        self.completed().next().is_some()
    }
}

fn remove_if_exists(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Could not remove {}: {}", path.display(), e),
    }
}

/// Drives the stage chain for every size of a run.
pub struct Orchestrator<'a> {
    toolchain: &'a Toolchain,
    // Tools found missing earlier in the run, with their install hints
    missing_tools: IndexMap<String, String>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(toolchain: &'a Toolchain) -> Self {
        Orchestrator {
            toolchain,
            missing_tools: IndexMap::new(),
        }
    }

    /// Process every size in declaration order.
    ///
    /// `glyph_order` lists, ascending, the characters the subset will
    /// actually contain; it drives the BDF encoding repair.
    pub fn run(
        &mut self,
        plan: &RunPlan,
        chars: &CharacterSet,
        glyph_order: &[char],
        logger: &mut GenerationLogger,
        mut on_size: impl FnMut(&SizeOutcome),
    ) -> RunReport {
        logger.section(&format!(
            "Generating fonts for {} size(s)",
            plan.sizes.len()
        ));
        let mut report = RunReport::default();
        for &size in plan.sizes.iter() {
            let outcome = self.process_size(plan, size, chars, glyph_order, logger);
            on_size(&outcome);
            report.outcomes.push(outcome);
        }
        report
    }

    pub fn process_size(
        &mut self,
        plan: &RunPlan,
        size: u32,
        chars: &CharacterSet,
        glyph_order: &[char],
        logger: &mut GenerationLogger,
    ) -> SizeOutcome {
        logger.section(&format!("Processing size {}pt:", size));
        let paths = plan.paths(size);
        let mut state = SizeState::Pending;
        let result = self.run_chain(plan, size, chars, glyph_order, &paths, &mut state, logger);
        remove_if_exists(&paths.subset);
        if !plan.keeps(OutputFormat::Bdf) {
            remove_if_exists(&paths.bdf);
        }
        match result {
            Ok(artifacts) => SizeOutcome {
                size,
                state,
                artifacts,
                error: None,
            },
            Err(error) => {
                let state = state.fail();
                if let SizeState::Failed(stage) = state {
                    logger.warn(&format!(
                        "Skipping size {}pt due to {} failure",
                        size, stage
                    ));
                }
                remove_if_exists(&paths.pcf);
                SizeOutcome {
                    size,
                    state,
                    artifacts: vec![],
                    error: Some(error),
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_chain(
        &mut self,
        plan: &RunPlan,
        size: u32,
        chars: &CharacterSet,
        glyph_order: &[char],
        paths: &SizePaths,
        state: &mut SizeState,
        logger: &mut GenerationLogger,
    ) -> Result<Vec<PathBuf>, BitfontError> {
        let toolchain: &'a Toolchain = self.toolchain;
        let compile = plan.keeps(OutputFormat::Pcf);
        let mut artifacts = vec![];

        *state = state.advance(compile);
        let subsetter = toolchain.subsetter.as_ref();
        let command = subsetter.describe(&plan.source_font, chars, &paths.subset);
        let subset = self.attempt(Stage::Subsetting, size, &command, Some(subsetter.tool()), logger, || {
            subsetter.subset(&plan.source_font, chars, &paths.subset)
        })?;
        let mut warnings = vec![];
        if (subset.glyph_count as f64) < chars.len() as f64 * plan.coverage_warning_threshold {
            let warning = format!(
                "Only {} glyphs in subset (expected ~{}). Source font may not contain requested characters.",
                subset.glyph_count,
                chars.len()
            );
            logger.warn(&warning);
            warnings.push(warning);
        }
        logger.record(
            StageResult::success(Stage::Subsetting, &command)
                .for_size(size)
                .with_output(&paths.subset)
                .with_glyphs(subset.glyph_count)
                .with_tool_output(&subset.stdout, &subset.stderr)
                .with_warnings(warnings),
        );

        *state = state.advance(compile);
        let rasterizer = toolchain.rasterizer.as_ref();
        let command = rasterizer.describe(&paths.subset, size, &paths.bdf);
        let output = self.attempt(Stage::Rasterizing, size, &command, Some(rasterizer.tool()), logger, || {
            rasterizer.rasterize(&paths.subset, size, &paths.bdf)
        })?;
        logger.record(
            StageResult::success(Stage::Rasterizing, &command)
                .for_size(size)
                .with_output(&paths.bdf)
                .with_tool_output(&output.stdout_text(), &output.stderr),
        );

        *state = state.advance(compile);
        let command = format!(
            "repair ENCODING fields ({} glyphs) in {}",
            glyph_order.len(),
            paths.bdf.display()
        );
        let summary = self.attempt(Stage::EncodingRepair, size, &command, None, logger, || {
            repair_encodings(&paths.bdf, glyph_order)
        })?;
        logger.detail(&format!(
            "{} of {} ENCODING fields rewritten, file read and written as {}",
            summary.changed,
            summary.glyphs,
            summary.encoding.name()
        ));
        logger.record(
            StageResult::success(Stage::EncodingRepair, &command)
                .for_size(size)
                .with_output(&paths.bdf)
                .with_glyphs(summary.glyphs),
        );
        if plan.keeps(OutputFormat::Bdf) {
            artifacts.push(paths.bdf.clone());
        }

        *state = state.advance(compile);
        if *state == SizeState::Compiling {
            let compiler = toolchain.compiler.as_ref();
            let command = compiler.describe(&paths.bdf, &paths.pcf);
            let output = self.attempt(Stage::Compiling, size, &command, Some(compiler.tool()), logger, || {
                compiler.compile(&paths.bdf, &paths.pcf)
            })?;
            logger.record(
                StageResult::success(Stage::Compiling, &command)
                    .for_size(size)
                    .with_output(&paths.pcf)
                    .with_tool_output(&output.stdout_text(), &output.stderr),
            );
            artifacts.push(paths.pcf.clone());
            *state = state.advance(compile);
        }
        Ok(artifacts)
    }

    /// Run one stage, recording a failure in the trace.
    ///
    /// A tool that was missing for an earlier size is not tried again.
    fn attempt<T>(
        &mut self,
        stage: Stage,
        size: u32,
        command: &str,
        tool: Option<&str>,
        logger: &mut GenerationLogger,
        action: impl FnOnce() -> Result<T, BitfontError>,
    ) -> Result<T, BitfontError> {
        if let Some((tool, hint)) = tool.and_then(|t| self.missing_tools.get_key_value(t)) {
            let error = BitfontError::Dependency {
                tool: tool.clone(),
                hint: hint.clone(),
            };
            logger.warn(&format!("{} is unavailable, not running {} for {}pt", tool, stage, size));
            logger.record(StageResult::skipped(stage, command, &error).for_size(size));
            return Err(error);
        }
        logger.stage_started(stage, command);
        match action() {
            Ok(value) => Ok(value),
            Err(error) => {
                logger.error(&format!("{} failed for {}pt: {}", stage, size, error));
                logger.record(StageResult::failure(stage, command, &error).for_size(size));
                if let BitfontError::Dependency { tool, hint } = &error {
                    self.missing_tools.insert(tool.clone(), hint.clone());
                }
                Err(error)
            }
        }
    }
}
