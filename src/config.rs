//! YAML run configuration.
//!
//! A config file is parsed into explicit structs; unknown keys are rejected.
//! Paths are resolved once at load time: `~` expands to the home directory,
//! relative input paths resolve against the config file's directory and a
//! relative output directory resolves against the tool-wide default.

use crate::{
    charset::{CharacterSources, CharsetOptions},
    logger::Verbosity,
    pipeline::RunPlan,
    stages::{ToolPrograms, Toolchain},
    BitfontError,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Component, Path, PathBuf},
    time::Duration,
};

const TOOL_NAME: &str = "bitfont";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Compiled binary bitmap font
    Pcf,
    /// The intermediate text bitmap font
    Bdf,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Pcf => "pcf",
            OutputFormat::Bdf => "bdf",
        })
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub source_font: PathBuf,
    pub sizes: Vec<u32>,
    #[serde(default)]
    pub characters: CharacterSources,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default = "default_true")]
    pub deduplicate_chars: bool,
    #[serde(default)]
    pub strip_whitespace: bool,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub font_family: String,
    pub formats: Vec<OutputFormat>,
    pub metadata: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            directory: PathBuf::from("output"),
            font_family: "custom".to_string(),
            formats: vec![OutputFormat::Pcf],
            metadata: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    pub level: Verbosity,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    pub tool_timeout_secs: u64,
    pub coverage_warning_threshold: f64,
    pub tools: ToolPrograms,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            tool_timeout_secs: 120,
            coverage_warning_threshold: 0.5,
            tools: ToolPrograms::default(),
        }
    }
}

/// Settings shared by every run, from `$XDG_CONFIG_HOME/bitfont/config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ToolSettings {
    #[serde(default)]
    pub output_directory: Option<PathBuf>,
}

impl ToolSettings {
    pub fn path() -> Option<PathBuf> {
        let config_home = std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))?;
        Some(config_home.join(TOOL_NAME).join("config.yaml"))
    }

    /// Load the tool-wide settings. A missing or broken file means defaults.
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            return Self::default();
        };
        let Ok(text) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_yaml_ng::from_str::<ToolSettings>(&text) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Base directory for relative output directories.
    pub fn output_base(&self) -> PathBuf {
        self.output_directory
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

/// Replace a leading `~` with the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => match dirs::home_dir() {
            Some(home) => home.join(components.as_path()),
            None => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    let expanded = expand_home(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

fn config_error(message: impl Into<String>) -> BitfontError {
    BitfontError::Config(message.into())
}

impl Config {
    /// Load, resolve and validate a config file.
    pub fn load(path: &Path) -> Result<Self, BitfontError> {
        Self::load_with(path, &ToolSettings::load())
    }

    pub fn load_with(path: &Path, settings: &ToolSettings) -> Result<Self, BitfontError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            config_error(format!("could not read config file {}: {}", path.display(), e))
        })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        log::debug!("Loading {}", path.display());
        Self::from_yaml(&text, &base_dir, settings)
    }

    /// Parse config text as if it were read from a file in `base_dir`.
    pub fn from_yaml(
        text: &str,
        base_dir: &Path,
        settings: &ToolSettings,
    ) -> Result<Self, BitfontError> {
        let mut config: Config = serde_yaml_ng::from_str(text)?;
        config.resolve_paths(base_dir, settings);
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base_dir: &Path, settings: &ToolSettings) {
        if !self.source_font.as_os_str().is_empty() {
            self.source_font = resolve(base_dir, &self.source_font);
        }
        if let Some(file) = &self.characters.file {
            self.characters.file = Some(resolve(base_dir, file));
        }
        let directory = expand_home(&self.output.directory);
        self.output.directory = if directory.is_absolute() {
            directory
        } else {
            settings.output_base().join(directory)
        };
    }

    pub fn validate(&self) -> Result<(), BitfontError> {
        if self.source_font.as_os_str().is_empty() {
            return Err(config_error("source_font is required"));
        }
        if self.sizes.is_empty() {
            return Err(config_error("sizes must list at least one point size"));
        }
        if let Some(size) = self.sizes.iter().find(|s| **s == 0) {
            return Err(config_error(format!("sizes: {} is not a valid point size", size)));
        }
        let characters = &self.characters;
        if characters.inline.is_none()
            && characters.file.is_none()
            && characters.unicode_ranges.is_empty()
        {
            return Err(config_error(
                "characters: one of inline, file or unicode_ranges is required",
            ));
        }
        if self.output.formats.is_empty() {
            return Err(config_error("output.formats must list at least one format"));
        }
        let family = &self.output.font_family;
        if family.is_empty() || family.contains(['/', '\\']) || family == ".." {
            return Err(config_error(format!(
                "output.font_family {:?} is not a valid file name",
                family
            )));
        }
        if !(0.0..=1.0).contains(&self.pipeline.coverage_warning_threshold) {
            return Err(config_error(format!(
                "pipeline.coverage_warning_threshold must be between 0 and 1, got {}",
                self.pipeline.coverage_warning_threshold
            )));
        }
        if self.pipeline.tool_timeout_secs == 0 {
            return Err(config_error("pipeline.tool_timeout_secs must be positive"));
        }
        Ok(())
    }

    pub fn charset_options(&self) -> CharsetOptions {
        CharsetOptions {
            deduplicate: self.deduplicate_chars,
            strip_whitespace: self.strip_whitespace,
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.logging.level
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.tool_timeout_secs)
    }

    /// Where this family's files are written.
    pub fn family_dir(&self) -> PathBuf {
        self.output.directory.join(&self.output.font_family)
    }

    pub fn run_plan(&self) -> RunPlan {
        RunPlan {
            source_font: self.source_font.clone(),
            sizes: self.sizes.clone(),
            output_dir: self.family_dir(),
            family: self.output.font_family.clone(),
            formats: self.output.formats.clone(),
            coverage_warning_threshold: self.pipeline.coverage_warning_threshold,
        }
    }

    /// The external tools, as configured.
    pub fn toolchain(&self) -> Toolchain {
        Toolchain::external(&self.pipeline.tools, self.timeout())
    }
}
