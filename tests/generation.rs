mod common;

use bitfont::{
    config::ToolSettings, coverage::load_charmap, generate, BdfDocument, BitfontError,
    CharacterSet, Config, ErrorKind, GenerationLogger, Manifest, Stage, StageStatus, Verbosity,
};
use pretty_assertions::assert_eq;
use std::path::Path;

fn write_project(dir: &Path, config: &str) -> Result<Config, BitfontError> {
    std::fs::write(dir.join("Digits.ttf"), common::minimal_font("0123456789"))?;
    let path = dir.join("font.yaml");
    std::fs::write(&path, config)?;
    let settings = ToolSettings {
        output_directory: Some(dir.to_path_buf()),
    };
    Config::load_with(&path, &settings)
}

fn silent_logger(verbosity: Verbosity) -> GenerationLogger {
    GenerationLogger::with_writers(
        verbosity,
        Box::new(std::io::sink()),
        Box::new(std::io::sink()),
    )
}

const DIGITS: &str = r#"
source_font: Digits.ttf
sizes: [16]
characters:
  inline: "0123456789"
output:
  directory: output
  font_family: digits
logging:
  level: debug
"#;

#[test]
fn test_fixture_font_is_readable() -> Result<(), BitfontError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("font.ttf");
    std::fs::write(&path, common::minimal_font("A°"))?;
    let mapped = load_charmap(&path)?;
    assert_eq!(mapped.len(), 2);
    assert!(mapped.contains(&0x41) && mapped.contains(&0xB0));
    assert_eq!(bitfont::coverage::count_glyphs(&path)?, 3);
    Ok(())
}

#[test]
fn test_digits_end_to_end() -> Result<(), BitfontError> {
    let dir = tempfile::tempdir()?;
    let config = write_project(dir.path(), DIGITS)?;
    let chars = CharacterSet::collect(&config.characters, config.charset_options())?;
    let mut logger = silent_logger(config.verbosity());
    let summary = generate(&config, &chars, &common::toolchain(vec![]), &mut logger, |_| {})?;

    assert!(summary.is_success());
    let family_dir = dir.path().join("output").join("digits");
    assert_eq!(summary.output_dir, family_dir);

    let manifest = Manifest::load(&family_dir.join("digits-manifest.json"))?;
    assert_eq!(manifest.character_count, 10);
    assert_eq!(manifest.characters, "0123456789");
    assert_eq!(manifest.generated_files, vec!["digits-16pt.pcf"]);
    let debug = manifest.debug_info.unwrap();
    let coverage = debug.character_coverage.unwrap();
    assert_eq!(coverage.found_in_source, 10);
    assert_eq!(coverage.missing, Vec::<String>::new());
    assert!(debug
        .execution_log
        .iter()
        .all(|entry| entry.status == StageStatus::Success));

    let compiled = BdfDocument::load(&family_dir.join("digits-16pt.pcf"))?;
    assert_eq!(compiled.encodings().unwrap(), (48..=57).collect::<Vec<i64>>());
    // Only the artifact and the manifest remain
    let mut left: Vec<String> = std::fs::read_dir(&family_dir)?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    left.sort();
    assert_eq!(left, vec!["digits-16pt.pcf", "digits-manifest.json"]);
    Ok(())
}

#[test]
fn test_missing_characters_are_reported_not_fatal() -> Result<(), BitfontError> {
    let dir = tempfile::tempdir()?;
    let config = write_project(
        dir.path(),
        "source_font: Digits.ttf\nsizes: [12]\ncharacters:\n  inline: \"01AB\"\noutput:\n  font_family: mixed\n  formats: [bdf]\nlogging:\n  level: debug\n",
    )?;
    let chars = CharacterSet::collect(&config.characters, config.charset_options())?;
    let mut logger = silent_logger(config.verbosity());
    let summary = generate(&config, &chars, &common::toolchain(vec![]), &mut logger, |_| {})?;

    assert_eq!(summary.generated_files(), vec!["mixed-12pt.bdf"]);
    let coverage = summary.coverage.as_ref().unwrap();
    assert_eq!(coverage.missing(), &['A', 'B']);

    // The two glyphs the subset kept get the two digits' code points
    let bdf = BdfDocument::load(&summary.output_dir.join("mixed-12pt.bdf"))?;
    assert_eq!(bdf.encodings().unwrap(), vec![48, 49]);

    let manifest = Manifest::load(summary.manifest_path.as_ref().unwrap())?;
    assert_eq!(manifest.character_count, 4);
    let debug = manifest.debug_info.unwrap();
    assert_eq!(
        debug.character_coverage.unwrap().missing,
        vec!["U+0041", "U+0042"]
    );
    // Half the characters are missing, which is exactly the default threshold
    assert!(debug.warnings.is_empty());
    Ok(())
}

#[test]
fn test_low_coverage_warns_and_still_generates() -> Result<(), BitfontError> {
    let dir = tempfile::tempdir()?;
    let config = write_project(
        dir.path(),
        "source_font: Digits.ttf\nsizes: [12]\ncharacters:\n  inline: \"0ABC\"\noutput:\n  font_family: sparse\nlogging:\n  level: debug\n",
    )?;
    let chars = CharacterSet::collect(&config.characters, config.charset_options())?;
    let mut logger = silent_logger(config.verbosity());
    let summary = generate(&config, &chars, &common::toolchain(vec![]), &mut logger, |_| {})?;

    assert!(summary.is_success());
    assert_eq!(summary.generated_files(), vec!["sparse-12pt.pcf"]);
    let expected = "Only 1 of 4 requested characters are in";
    assert!(logger.warnings().iter().any(|w| w.starts_with(expected)));

    let manifest = Manifest::load(summary.manifest_path.as_ref().unwrap())?;
    let debug = manifest.debug_info.unwrap();
    assert!(debug.warnings.iter().any(|w| w.starts_with(expected)));
    assert!(debug.errors.is_empty());
    Ok(())
}

#[test]
fn test_one_failing_size_does_not_stop_the_run()-> Result<(), BitfontError> {
    let dir = tempfile::tempdir()?;
    let config = write_project(dir.path(), &DIGITS.replace("[16]", "[12, 16]"))?;
    let chars = CharacterSet::collect(&config.characters, config.charset_options())?;
    let mut logger = silent_logger(config.verbosity());
    let summary = generate(
        &config,
        &chars,
        &common::toolchain(vec![16]),
        &mut logger,
        |_| {},
    )?;

    assert_eq!(summary.generated_files(), vec!["digits-12pt.pcf"]);
    let failed: Vec<_> = summary.report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].size, 16);
    assert_eq!(failed[0].failed_stage(), Some(Stage::Rasterizing));

    let manifest = Manifest::load(summary.manifest_path.as_ref().unwrap())?;
    assert_eq!(manifest.generated_files, vec!["digits-12pt.pcf"]);
    let log = manifest.debug_info.unwrap().execution_log;
    let last = log.last().unwrap();
    assert_eq!(
        (last.step, last.size, last.status),
        (Stage::Rasterizing, Some(16), StageStatus::Failed)
    );
    assert_eq!(last.stderr.as_deref(), Some("no glyphs generated"));
    Ok(())
}

#[test]
fn test_rerun_is_idempotent() -> Result<(), BitfontError> {
    let dir = tempfile::tempdir()?;
    let config = write_project(dir.path(), DIGITS)?;
    let chars = CharacterSet::collect(&config.characters, config.charset_options())?;
    let family_dir = dir.path().join("output").join("digits");

    let mut runs = vec![];
    for _ in 0..2 {
        let mut logger = silent_logger(config.verbosity());
        generate(&config, &chars, &common::toolchain(vec![]), &mut logger, |_| {})?;
        let pcf = std::fs::read(family_dir.join("digits-16pt.pcf"))?;
        let mut manifest = Manifest::load(&family_dir.join("digits-manifest.json"))?;
        let debug = manifest.debug_info.as_mut().unwrap();
        debug.timestamp = chrono::DateTime::UNIX_EPOCH;
        runs.push((pcf, manifest));
    }
    assert_eq!(runs[0], runs[1]);
    Ok(())
}

#[test]
fn test_characters_from_every_source() -> Result<(), BitfontError> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("chars.txt"), "ab\tc\nb")?;
    let config = write_project(
        dir.path(),
        "source_font: Digits.ttf\nsizes: [8]\ncharacters:\n  inline: \"12 2\"\n  file: chars.txt\n  unicode_ranges: [\"U+0041-0043\", \"U+00B0\"]\nstrip_whitespace: true\n",
    )?;
    let chars = CharacterSet::collect(&config.characters, config.charset_options())?;
    assert_eq!(chars.as_sorted_string(), " 12ABCabc°");
    Ok(())
}

#[test]
fn test_bad_range_fails_before_generation() -> Result<(), BitfontError> {
    let dir = tempfile::tempdir()?;
    let config = write_project(
        dir.path(),
        "source_font: Digits.ttf\nsizes: [8]\ncharacters:\n  unicode_ranges: [\"U+0043-0041\"]\n",
    )?;
    let err = CharacterSet::collect(&config.characters, config.charset_options()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(!dir.path().join("output").exists());
    Ok(())
}
