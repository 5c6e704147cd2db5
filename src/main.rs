use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::error;

use rusty_ring::analysis::{analyze_bandwidth, analyze_valleys};
use rusty_ring::data::catalog::scan_folder;
use rusty_ring::data::filter::{filtered_indices, parse_selectors};
use rusty_ring::data::loader::{read_network_params, read_sweep};
use rusty_ring::data::model::RecordSet;
use rusty_ring::import::import_folder;
use rusty_ring::sink::MemoryStore;
use rusty_ring::Settings;

#[derive(Parser)]
#[command(name = "rusty-ring", about = "Photonic measurement metadata and resonance analysis")]
struct Cli {
    /// JSON settings file (analysis parameters, import defaults).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse measurement filenames and print their metadata as JSON.
    Parse {
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// List the measurement files of a folder, optionally filtered.
    Scan {
        folder: PathBuf,
        /// Column selector, e.g. datatype=SPCM (repeatable).
        #[arg(long = "select")]
        selectors: Vec<String>,
    },
    /// Valley scan of a wavelength sweep.
    Valleys {
        file: PathBuf,
        /// Channel column (0 = first after wavelength).
        #[arg(long, default_value_t = 0)]
        channel: usize,
    },
    /// 3 dB electro-optic bandwidth of an S-parameter file.
    Bandwidth { file: PathBuf },
    /// Import a folder into a JSON store.
    Catalog {
        folder: PathBuf,
        #[arg(long, short)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let settings = Settings::load_or_default(cli.config.as_deref()).context("loading settings")?;

    match cli.command {
        Command::Parse { files } => parse_files(&files),
        Command::Scan { folder, selectors } => scan(&folder, &selectors),
        Command::Valleys { file, channel } => {
            let table = read_sweep(&file)?;
            let loss = table
                .channel(channel)
                .with_context(|| format!("{}: no channel {channel}", file.display()))?;
            let result = analyze_valleys(&table.wavelength_nm(), &loss, &settings.valleys)
                .with_context(|| format!("valley scan of {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&result.resonances())?);
            Ok(())
        }
        Command::Bandwidth { file } => {
            let table = read_network_params(&file)?;
            let result = analyze_bandwidth(&table.frequency_ghz, &table.s21_db(), &settings.bandwidth)
                .with_context(|| format!("bandwidth of {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Catalog { folder, out } => catalog(&folder, &out, &settings),
    }
}

fn parse_files(files: &[String]) -> Result<()> {
    let mut failed = 0;
    for name in files {
        match rusty_ring::parse(name) {
            Ok(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            Err(e) => {
                error!("{e}");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} filenames failed to parse", files.len());
    }
    Ok(())
}

fn scan(folder: &Path, selectors: &[String]) -> Result<()> {
    let scan = scan_folder(folder)?;
    let filters = parse_selectors(selectors).map_err(anyhow::Error::msg)?;

    let (paths, records): (Vec<_>, Vec<_>) = scan.valid.into_iter().unzip();
    let set = RecordSet::from_records(records);
    for i in filtered_indices(&set, &filters) {
        let r = &set.records[i];
        println!(
            "{}\t{}\t{}/{}/{}/{}/die{}\t{}C\trep{}",
            paths[i].display(),
            r.datatype,
            r.wafer,
            r.doe,
            r.cage,
            r.device,
            r.die,
            r.temperature,
            r.repeat
        );
    }
    for name in &scan.invalid {
        eprintln!("invalid: {name}");
    }
    Ok(())
}

fn catalog(folder: &Path, out: &Path, settings: &Settings) -> Result<()> {
    let root = match &settings.import.target_root {
        Some(root) => root.clone(),
        None => out
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("MeasurementData"),
    };

    let mut store = MemoryStore::new();
    let summary = import_folder(folder, &root, settings, &mut store)
        .with_context(|| format!("importing {}", folder.display()))?;
    store.save(out)?;

    println!(
        "imported {} files ({} invalid, {} unreadable), analysed {} ({} failed)",
        summary.imported,
        summary.invalid.len(),
        summary.unreadable,
        summary.analysed,
        summary.analysis_failed
    );
    for (table, count) in store.stats() {
        println!("  {table}: {count}");
    }
    Ok(())
}
