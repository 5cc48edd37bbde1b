use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, ValueEnum};
use dateshelf_core::metadata::MetadataBackend;
use dateshelf_core::task::spawn_background;
use dateshelf_core::{CancellationToken, OrganizeControl, OrganizeOptions};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// External exiftool program (all file types it knows)
    Exiftool,
    /// Built-in EXIF reader (still images only)
    Native,
}

impl From<Backend> for MetadataBackend {
    fn from(b: Backend) -> Self {
        match b {
            Backend::Exiftool => MetadataBackend::Exiftool,
            Backend::Native => MetadataBackend::Native,
        }
    }
}

#[derive(Parser)]
#[command(name = "dateshelf", version, about = "Sort photos into date-based folders using their oldest timestamp")]
struct Cli {
    /// Directory to organize; date folders are created inside it
    source: Option<PathBuf>,

    /// Read options from a JSON file; flags given here override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Folder structure as a date format, `/` separates levels [default: %Y/%m-%b]
    #[arg(long)]
    structure: Option<String>,

    /// Rename files with this date format (extension is kept, lower-cased)
    #[arg(long)]
    rename_format: Option<String>,

    /// Include subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Copy files instead of moving them
    #[arg(long)]
    copy: bool,

    /// Treat identical files at the destination as ordinary name collisions
    #[arg(long)]
    keep_duplicates: bool,

    /// Photos taken before this hour count toward the previous day (0 disables)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..24))]
    day_begins: Option<u32>,

    /// Keep the original file name in names made unique after a collision
    #[arg(long)]
    keep_filename: bool,

    /// Show what would happen without moving anything
    #[arg(long)]
    dry_run: bool,

    /// Locale for month and weekday names, e.g. de_DE [default: POSIX]
    #[arg(long)]
    locale: Option<String>,

    /// Additional tag group to ignore (repeatable)
    #[arg(long = "ignore-group")]
    ignore_groups: Vec<String>,

    /// Additional tag to ignore, e.g. XMP:MetadataDate (repeatable)
    #[arg(long = "ignore-tag")]
    ignore_tags: Vec<String>,

    /// Only consider these tags (repeatable)
    #[arg(long = "only-tag")]
    only_tags: Vec<String>,

    /// Where timestamps come from
    #[arg(long, value_enum)]
    metadata: Option<Backend>,

    /// Path to the exiftool program [default: looked up on PATH]
    #[arg(long)]
    exiftool: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn into_options(self) -> anyhow::Result<OrganizeOptions> {
        let mut options = match &self.config {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("failed to open {}", path.display()))?;
                let mut options: OrganizeOptions = serde_json::from_reader(BufReader::new(file))
                    .with_context(|| format!("failed to parse {}", path.display()))?;
                if let Some(source) = self.source {
                    options.source = source;
                }
                options
            }
            None => {
                let source = self
                    .source
                    .ok_or_else(|| anyhow!("a source directory or --config is required"))?;
                OrganizeOptions::new(source)
            }
        };

        if let Some(structure) = self.structure {
            options.structure = structure;
        }
        if self.rename_format.is_some() {
            options.rename_format = self.rename_format;
        }
        if let Some(day_begins) = self.day_begins {
            options.day_begins = day_begins;
        }
        if let Some(locale) = self.locale {
            options.locale = locale;
        }
        if let Some(metadata) = self.metadata {
            options.metadata = metadata.into();
        }
        if self.exiftool.is_some() {
            options.exiftool = self.exiftool;
        }
        options.recursive |= self.recursive;
        options.copy_files |= self.copy;
        options.keep_filename |= self.keep_filename;
        options.dry_run |= self.dry_run;
        if self.keep_duplicates {
            options.remove_duplicates = false;
        }
        options.ignore_groups.extend(self.ignore_groups);
        options.ignore_tags.extend(self.ignore_tags);
        if !self.only_tags.is_empty() {
            options.only_tags = Some(self.only_tags);
        }
        Ok(options)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let quiet = cli.quiet;
    let options = cli.into_options()?;
    let t_total = std::time::Instant::now();

    let token = CancellationToken::new();
    let ctrlc_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nStopping after the current file...");
        ctrlc_token.cancel();
    })?;
    let control = OrganizeControl::new().with_cancel_token(token);

    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    let cb_bar = bar.clone();

    let handle = spawn_background("organizer", move || {
        let progress = move |current: u64, total: u64, message: &str| {
            cb_bar.set_length(total);
            cb_bar.set_position(current);
            cb_bar.set_message(message.to_string());
        };
        dateshelf_core::organize_with_control(&options, &control, &progress)
    })?;

    let result = handle
        .join()
        .map_err(|_| anyhow!("organizer thread panicked"))?;
    bar.finish_and_clear();
    let report = result?;

    for warning in &report.warnings {
        eprintln!("warning: {}", warning);
    }
    if report.dry_run {
        for decision in &report.decisions {
            eprintln!(
                "{:?}: {} -> {}",
                decision.action,
                decision.source.display(),
                decision.destination_path.display()
            );
        }
    }

    eprintln!(
        "{} ({} duplicates left in place, {} without a date, {} failed, {:.2}s)",
        report.summary(),
        report.duplicates_skipped,
        report.no_date,
        report.failed,
        t_total.elapsed().as_secs_f64()
    );

    Ok(())
}
