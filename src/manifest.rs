//! The JSON summary written next to a family's generated fonts.

use crate::{
    config::OutputFormat,
    coverage::{CoverageReport, CoverageStats},
    logger::{GenerationTrace, StageResult},
    pipeline::{RunPlan, RunReport},
    BitfontError, CharacterSet,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MANIFEST_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub source_font: String,
    pub character_count: usize,
    /// Every character, sorted and deduplicated
    pub characters: String,
    /// `U+XXXX` for every character, sorted
    pub unicode_ranges: Vec<String>,
    pub sizes: Vec<u32>,
    pub output_directory: String,
    /// File names only, never full paths
    pub generated_files: Vec<String>,
    pub formats: Vec<OutputFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<DebugInfo>,
}

/// The full trace of a run, only present when it ran in debug mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub timestamp: DateTime<Utc>,
    pub tool_version: String,
    pub execution_log: Vec<StageResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_coverage: Option<CoverageStats>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl DebugInfo {
    pub fn new(trace: &GenerationTrace, coverage: Option<&CoverageReport>) -> Self {
        DebugInfo {
            timestamp: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            execution_log: trace.entries.clone(),
            character_coverage: coverage.map(CoverageReport::stats),
            warnings: trace.warnings.clone(),
            errors: trace.errors.clone(),
        }
    }
}

impl Manifest {
    /// Describe a finished run. Only sizes that completed contribute files.
    pub fn new(plan: &RunPlan, chars: &CharacterSet, report: &RunReport) -> Self {
        Manifest {
            version: MANIFEST_VERSION.to_string(),
            source_font: plan.source_font.display().to_string(),
            character_count: chars.len(),
            characters: chars.as_sorted_string(),
            unicode_ranges: chars.unicode_list(),
            sizes: plan.sizes.clone(),
            output_directory: plan.output_dir.display().to_string(),
            generated_files: report.artifact_names(),
            formats: plan.formats.clone(),
            debug_info: None,
        }
    }

    pub fn with_debug_info(mut self, debug_info: DebugInfo) -> Self {
        self.debug_info = Some(debug_info);
        self
    }

    pub fn path_for(dir: &Path, family: &str) -> PathBuf {
        dir.join(format!("{}-manifest.json", family))
    }

    pub fn to_json(&self) -> Result<String, BitfontError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the manifest, replacing whatever an earlier run left.
    pub fn write(&self, path: &Path) -> Result<(), BitfontError> {
        let mut json = self.to_json()?;
        json.push('\n');
        std::fs::write(path, json)?;
        log::info!("Wrote manifest to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, BitfontError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
