use bitfont::{
    charset::codepoint_label,
    generate,
    tools::{probe, REQUIRED_TOOLS},
    BitfontError, CharacterSet, Config, GenerationLogger, OutputFormat, Verbosity,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
};

const PREVIEW_LEN: usize = 50;
const EXTRACT_LISTED: usize = 20;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate fonts from a configuration file
    Generate {
        /// Path to the configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Show what would be generated without generating
        #[arg(long)]
        dry_run: bool,

        /// Show every stage as it runs
        #[arg(short, long)]
        verbose: bool,

        /// Also show character coverage and save the full trace to the manifest
        #[arg(long)]
        debug: bool,
    },
    /// Check that the required tools are installed
    Check {
        /// Show tool versions
        #[arg(short, long)]
        verbose: bool,
    },
    /// List the unique characters of a text file
    Extract { text_file: PathBuf },
    /// Show which characters a configuration would include
    Show {
        /// Path to the configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },
}

/// Writes around a progress bar so its redraws don't interleave with the text.
struct Suspended<W> {
    bar: ProgressBar,
    inner: W,
}

impl<W: Write> Write for Suspended<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let inner = &mut self.inner;
        self.bar.suspend(|| inner.write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let inner = &mut self.inner;
        self.bar.suspend(|| inner.flush())
    }
}

fn format_list(formats: &[OutputFormat]) -> String {
    let names: Vec<String> = formats.iter().map(|f| f.to_string()).collect();
    format!("[{}]", names.join(", "))
}

fn load(config_path: &Path) -> Result<(Config, CharacterSet), BitfontError> {
    let config = Config::load(config_path)?;
    let chars = CharacterSet::collect(&config.characters, config.charset_options())?;
    Ok((config, chars))
}

fn run_generate(
    config_path: PathBuf,
    dry_run: bool,
    verbose: bool,
    debug: bool,
) -> Result<ExitCode, BitfontError> {
    println!("Loading config from {}...", config_path.display());
    let config = Config::load(&config_path)?;
    // Command line flags win over the config file
    let verbosity = if debug {
        Verbosity::Debug
    } else if verbose {
        Verbosity::Verbose
    } else {
        config.verbosity()
    };

    println!("Collecting characters...");
    let chars = CharacterSet::collect(&config.characters, config.charset_options())?;
    println!(
        "Found {} unique characters: {}",
        chars.len(),
        chars.preview(PREVIEW_LEN)
    );

    if dry_run {
        println!("\nDry run - would generate:");
        println!("  Characters: {}", chars.len());
        println!("  Sizes: {:?}", config.sizes);
        println!("  Formats: {}", format_list(&config.output.formats));
        println!("  Output directory: {}", config.family_dir().display());
        return Ok(ExitCode::SUCCESS);
    }

    let toolchain = config.toolchain();
    let (logger, summary) = if verbosity == Verbosity::Quiet {
        println!("\nGenerating fonts...");
        let bar = ProgressBar::new(config.sizes.len() as u64).with_style(
            ProgressStyle::with_template("Processing sizes {bar:36} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        let mut logger = GenerationLogger::with_writers(
            verbosity,
            Box::new(Suspended {
                bar: bar.clone(),
                inner: std::io::stdout(),
            }),
            Box::new(Suspended {
                bar: bar.clone(),
                inner: std::io::stderr(),
            }),
        );
        let summary = generate(&config, &chars, &toolchain, &mut logger, |outcome| {
            bar.set_message(format!("{}pt", outcome.size));
            bar.inc(1);
        });
        bar.finish_and_clear();
        (logger, summary?)
    } else {
        let mut logger = GenerationLogger::new(verbosity);
        let summary = generate(&config, &chars, &toolchain, &mut logger, |_| {})?;
        (logger, summary)
    };

    if summary.is_success() {
        println!("\n✓ Font generation complete!");
        println!("  Generated {} font files", summary.generated_files().len());
        for failed in summary.report.failed() {
            if let Some(error) = &failed.error {
                println!("  {}pt failed: {}", failed.size, error);
            }
        }
        println!("  Output directory: {}", summary.output_dir.display());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("\n✗ Font generation failed!");
        println!("  No font files were generated");
        println!("  See errors above for details");
        if !logger.warnings().is_empty() {
            println!("\n  Warnings: {}", logger.warnings().len());
        }
        if !logger.errors().is_empty() {
            println!("  Errors: {}", logger.errors().len());
            if verbosity == Verbosity::Quiet {
                println!("\n  Run with --verbose or --debug for more details");
            }
        }
        Ok(ExitCode::FAILURE)
    }
}

fn run_check(verbose: bool) -> ExitCode {
    println!("Checking required tools...\n");
    let mut all_installed = true;
    for requirement in REQUIRED_TOOLS {
        let status = probe(requirement);
        match (&status.path, &status.version) {
            (Some(_), Some(version)) if verbose => {
                println!("  ✓ {:15} ({})", requirement.name, version)
            }
            (Some(_), _) => println!("  ✓ {}", requirement.name),
            (None, _) => {
                println!("  ✗ {:15} Install: {}", requirement.name, requirement.install_hint);
                all_installed = false;
            }
        }
    }
    println!();
    if all_installed {
        println!("All required tools are installed!");
        ExitCode::SUCCESS
    } else {
        println!("Some required tools are missing. Please install them.");
        ExitCode::FAILURE
    }
}

fn run_extract(text_file: PathBuf) -> Result<ExitCode, BitfontError> {
    let text = std::fs::read_to_string(&text_file)?;
    let chars = CharacterSet::from_text(&text);
    println!("Found {} unique characters:", chars.len());
    println!("{}", chars.as_sorted_string());
    println!("\nUnicode code points:");
    for c in chars.iter().take(EXTRACT_LISTED) {
        println!("  {} -> {}", c, codepoint_label(c));
    }
    if chars.len() > EXTRACT_LISTED {
        println!("  ... and {} more", chars.len() - EXTRACT_LISTED);
    }
    Ok(ExitCode::SUCCESS)
}

fn run_show(config_path: PathBuf) -> Result<ExitCode, BitfontError> {
    let (config, chars) = load(&config_path)?;
    println!("Configuration: {}", config_path.display());
    println!("Character count: {}", chars.len());
    println!("Characters: {}", chars.display_string());
    println!("\nSizes: {:?}", config.sizes);
    println!("Formats: {}", format_list(&config.output.formats));
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let result = match args.command {
        Command::Generate {
            config,
            dry_run,
            verbose,
            debug,
        } => run_generate(config, dry_run, verbose, debug),
        Command::Check { verbose } => Ok(run_check(verbose)),
        Command::Extract { text_file } => run_extract(text_file),
        Command::Show { config } => run_show(config),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            log::debug!("{:?}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_suspended_writer_passes_text_through() {
        let bar = ProgressBar::hidden();
        bar.inc(1);
        let mut writer = Suspended {
            bar: bar.clone(),
            inner: Vec::new(),
        };
        writeln!(writer, "  ERROR: subsetting failed").unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.inner, b"  ERROR: subsetting failed\n");
        // The bar keeps its state across the suspended write
        assert_eq!(bar.position(), 1);
        assert!(!bar.is_finished());
    }
}
