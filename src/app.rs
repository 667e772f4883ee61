use crate::config::SessionizerConfig;
use crate::engine::Sessionizer;
use crate::sink::CsvSink;
use crate::source::CsvSource;
use anyhow::{Context, Result};
use std::env;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

const DEFAULT_INPUT_DIR: &str = "./input";
const DEFAULT_OUTPUT_PATH: &str = "./output/sessionization.txt";
const INACTIVITY_FILE: &str = "inactivity_period.txt";
const CONFIG_FILE: &str = "sessionizer.json";
const LOG_FILE: &str = "log.csv";

/// CLI entrypoint: `sessionizer [input_dir] [output_path]`.
pub fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let input_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT_DIR));
    let output_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH));
    if args.next().is_some() {
        usage();
        anyhow::bail!("too many arguments");
    }
    run_directory(&input_dir, &output_path)
}

/// Sessionizes `<input_dir>/log.csv` into `output_path`.
pub fn run_directory(input_dir: &Path, output_path: &Path) -> Result<()> {
    let config = load_config(input_dir)?;

    let log_path = input_dir.join(LOG_FILE);
    let input = File::open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;
    let source = CsvSource::new(BufReader::new(input))
        .with_context(|| format!("failed to read header of {}", log_path.display()))?;

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let output = File::create(output_path)
        .with_context(|| format!("failed to create {}", output_path.display()))?;
    let sink = CsvSink::new(BufWriter::new(output));

    let mut sessionizer = Sessionizer::new(source, sink, &config)?;
    sessionizer.logger_mut().mirror_to(io::stderr());
    let report = sessionizer
        .run()
        .with_context(|| format!("sessionization of {} failed", log_path.display()))?;
    eprintln!("{}", serde_json::to_string(&report)?);
    Ok(())
}

/// Prefers `sessionizer.json` when present, else `inactivity_period.txt`.
fn load_config(input_dir: &Path) -> Result<SessionizerConfig> {
    let json_path = input_dir.join(CONFIG_FILE);
    if json_path.is_file() {
        return SessionizerConfig::load_json(&json_path)
            .with_context(|| format!("failed to load {}", json_path.display()));
    }
    let inactivity_path = input_dir.join(INACTIVITY_FILE);
    SessionizerConfig::from_inactivity_file(&inactivity_path)
        .with_context(|| format!("failed to load {}", inactivity_path.display()))
}

fn usage() {
    eprintln!("usage: sessionizer [input_dir] [output_path]");
}
