#![deny(clippy::unwrap_used, clippy::expect_used)]
//! Minimal bitmap fonts for memory-constrained displays.
//!
//! Given an outline font, a set of characters and a list of point sizes,
//! `bitfont` subsets the font, rasterizes each size to BDF, repairs the BDF
//! `ENCODING` fields and compiles the result to PCF, writing a JSON manifest
//! describing the run.

pub mod bdf;
pub mod charset;
pub mod config;
pub mod coverage;
mod error;
pub mod generate;
pub mod logger;
pub mod manifest;
pub mod pipeline;
pub mod stages;
pub mod tools;

pub use crate::{
    bdf::{repair_encodings, BdfDocument, RepairSummary, TextEncoding},
    charset::{CharacterSet, CharacterSources, CharsetOptions, UnicodeRange},
    config::{Config, OutputFormat},
    coverage::{CoverageChecker, CoverageReport},
    error::{BitfontError, ErrorKind},
    generate::{generate, GenerationSummary},
    logger::{GenerationLogger, GenerationTrace, StageResult, StageStatus, Verbosity},
    manifest::{DebugInfo, Manifest},
    pipeline::{Orchestrator, RunPlan, RunReport, SizeOutcome, SizeState, Stage},
    stages::{BitmapCompiler, Rasterizer, SubsetOutput, Subsetter, Toolchain},
};
