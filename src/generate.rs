//! One complete generation run: coverage, the per-size chain, the manifest.

use crate::{
    config::Config,
    coverage::{CoverageChecker, CoverageReport},
    logger::GenerationLogger,
    manifest::{DebugInfo, Manifest},
    pipeline::{Orchestrator, RunReport, SizeOutcome},
    stages::Toolchain,
    BitfontError, CharacterSet,
};
use std::path::PathBuf;

const MISSING_LISTED: usize = 10;

/// What a run produced.
#[derive(Debug)]
pub struct GenerationSummary {
    pub report: RunReport,
    pub coverage: Option<CoverageReport>,
    pub output_dir: PathBuf,
    pub manifest_path: Option<PathBuf>,
}

impl GenerationSummary {
    pub fn is_success(&self) -> bool {
        self.report.is_success()
    }

    pub fn generated_files(&self) -> Vec<String> {
        self.report.artifact_names()
    }
}

fn check_coverage(
    config: &Config,
    chars: &CharacterSet,
    logger: &mut GenerationLogger,
) -> Option<CoverageReport> {
    logger.section("Checking character coverage");
    let checker = match CoverageChecker::from_font(&config.source_font) {
        Ok(checker) => checker,
        Err(e) => {
            logger.warn(&format!("Could not check character coverage: {}", e));
            return None;
        }
    };
    let report = checker.check(chars);
    logger.info(&format!("Requested: {} characters", report.requested_count()));
    logger.info(&format!("Found in font: {} characters", report.found_count()));
    if report.missing_count() > 0 {
        logger.info(&format!("Missing: {} characters", report.missing_count()));
        // Debug mode lists every gap
        let listed = if logger.is_debug() {
            report.missing_count()
        } else {
            MISSING_LISTED
        };
        for c in report.missing().iter().take(listed) {
            logger.info(&format!("  U+{:04X} ({})", *c as u32, c));
        }
        if report.missing_count() > listed {
            logger.info(&format!("  ... and {} more", report.missing_count() - listed));
        }
    } else {
        logger.success("All requested characters found in source font");
    }
    if report.is_below(config.pipeline.coverage_warning_threshold) {
        logger.warn(&format!(
            "Only {} of {} requested characters are in {}",
            report.found_count(),
            report.requested_count(),
            config.source_font.display()
        ));
    }
    Some(report)
}

/// Run the whole pipeline for one configured font family.
///
/// Per-size failures end up in the returned report; only problems that
/// stop the run as a whole (no characters, an unwritable output directory
/// or manifest) are returned as errors.
pub fn generate(
    config: &Config,
    chars: &CharacterSet,
    toolchain: &Toolchain,
    logger: &mut GenerationLogger,
    on_size: impl FnMut(&SizeOutcome),
) -> Result<GenerationSummary, BitfontError> {
    if chars.is_empty() {
        return Err(BitfontError::Config(
            "characters: no characters to generate".to_string(),
        ));
    }
    let plan = config.run_plan();
    std::fs::create_dir_all(&plan.output_dir)?;

    let coverage = check_coverage(config, chars, logger);
    // The subset keeps only what the font has, in code point order
    let glyph_order = match &coverage {
        Some(coverage) => coverage.found().to_vec(),
        None => chars.to_vec(),
    };

    let report = Orchestrator::new(toolchain).run(&plan, chars, &glyph_order, logger, on_size);

    let manifest_path = if config.output.metadata {
        let mut manifest = Manifest::new(&plan, chars, &report);
        if logger.is_debug() {
            manifest = manifest.with_debug_info(DebugInfo::new(logger.trace(), coverage.as_ref()));
        }
        let path = Manifest::path_for(&plan.output_dir, &plan.family);
        manifest.write(&path)?;
        logger.success(&format!(
            "Wrote manifest to {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        ));
        Some(path)
    } else {
        None
    };

    Ok(GenerationSummary {
        report,
        coverage,
        output_dir: plan.output_dir,
        manifest_path,
    })
}
