pub mod date;
pub mod dedup;
pub mod format;
pub mod metadata;
pub mod placement;
pub mod task;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{Locale, NaiveDate};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use date::{apply_day_begins, select_oldest, SelectorOptions};
use metadata::{ExifTool, MetadataBackend, MetadataRecord, MetadataSource, NativeExif};
use placement::{PlacementAction, PlacementDecision, PlacementOptions};

pub use metadata::PreloadedSource;
pub use task::{CancellationToken, CancelledError, ProgressCallback};

fn default_structure() -> String {
    "%Y/%m-%b".to_string()
}

fn default_true() -> bool {
    true
}

fn default_locale() -> String {
    "POSIX".to_string()
}

fn default_ignore_groups() -> Vec<String> {
    vec!["File".to_string()]
}

/// Everything that controls one organize run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizeOptions {
    /// Directory to organize. Date folders are created inside it.
    pub source: PathBuf,
    /// Date format for the folder tree, `/` separating levels.
    #[serde(default = "default_structure")]
    pub structure: String,
    /// Date format for the new file stem. `None` (or empty) keeps the original name.
    #[serde(default)]
    pub rename_format: Option<String>,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub copy_files: bool,
    #[serde(default = "default_true")]
    pub remove_duplicates: bool,
    /// Hour (0-23) before which a photo counts toward the previous day. 0 disables.
    #[serde(default)]
    pub day_begins: u32,
    /// On collision, put the original stem into the new name.
    #[serde(default)]
    pub keep_filename: bool,
    /// Work out every decision without touching the filesystem.
    #[serde(default)]
    pub dry_run: bool,
    /// Locale for month and weekday names in both templates.
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_ignore_groups")]
    pub ignore_groups: Vec<String>,
    #[serde(default)]
    pub ignore_tags: Vec<String>,
    #[serde(default)]
    pub only_tags: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: MetadataBackend,
    /// Location of the exiftool program. `None` looks it up on `PATH`.
    #[serde(default)]
    pub exiftool: Option<PathBuf>,
}

impl OrganizeOptions {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            structure: default_structure(),
            rename_format: None,
            recursive: false,
            copy_files: false,
            remove_duplicates: true,
            day_begins: 0,
            keep_filename: false,
            dry_run: false,
            locale: default_locale(),
            ignore_groups: default_ignore_groups(),
            ignore_tags: Vec::new(),
            only_tags: None,
            metadata: MetadataBackend::default(),
            exiftool: None,
        }
    }

    fn rename_format(&self) -> Option<&str> {
        self.rename_format.as_deref().filter(|f| !f.is_empty())
    }

    fn selector_options(&self) -> SelectorOptions {
        SelectorOptions {
            ignore_groups: self.ignore_groups.clone(),
            ignore_tags: self.ignore_tags.clone(),
            only_tags: self.only_tags.clone(),
        }
    }

    fn placement_options(&self) -> PlacementOptions {
        PlacementOptions {
            copy_files: self.copy_files,
            remove_duplicates: self.remove_duplicates,
            keep_filename: self.keep_filename,
        }
    }

    /// The metadata source these options ask for.
    pub fn metadata_source(&self) -> Box<dyn MetadataSource> {
        match self.metadata {
            MetadataBackend::Exiftool => {
                let mut tool = ExifTool::new().with_only_tags(self.only_tags.clone());
                if let Some(path) = &self.exiftool {
                    tool = tool.with_executable(path);
                }
                Box::new(tool)
            }
            MetadataBackend::Native => Box::new(NativeExif),
        }
    }
}

/// Control options for a run.
#[derive(Debug, Clone, Default)]
pub struct OrganizeControl {
    /// Cancellation token; when triggered the run stops before the next file.
    pub cancel_token: Option<CancellationToken>,
}

impl OrganizeControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}

/// Summary of one organize run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizeReport {
    /// Files reported by the metadata source.
    pub total_files: u64,
    /// Files moved or copied (or that would be, on a dry run).
    pub placed: u64,
    /// Files left in place because an identical copy already sits at the destination.
    pub duplicates_skipped: u64,
    /// Files without any usable timestamp.
    pub no_date: u64,
    /// Dot-files, never moved.
    pub hidden_skipped: u64,
    /// Files whose placement failed.
    pub failed: u64,
    pub cancelled: bool,
    pub dry_run: bool,
    /// One line per failed file.
    pub warnings: Vec<String>,
    pub decisions: Vec<PlacementDecision>,
}

impl OrganizeReport {
    pub fn summary(&self) -> String {
        let mut summary = if self.dry_run {
            format!("Would organize {} files into date-based folders.", self.placed)
        } else {
            format!("Organized {} files into date-based folders.", self.placed)
        };
        if self.cancelled {
            summary.push_str(" Stopped before the end.");
        }
        summary
    }
}

/// Terminal state of one file.
#[derive(Debug, Clone)]
enum FileOutcome {
    NoDate,
    Hidden,
    Placed(PlacementDecision),
    Duplicate(PlacementDecision),
}

/// Validated settings shared by every file of a run.
struct Plan<'a> {
    options: &'a OrganizeOptions,
    locale: Locale,
    selector: SelectorOptions,
    placement: PlacementOptions,
}

impl<'a> Plan<'a> {
    fn prepare(options: &'a OrganizeOptions) -> anyhow::Result<Self> {
        if !options.source.is_dir() {
            bail!("invalid directory: {}", options.source.display());
        }
        if options.day_begins > 23 {
            bail!("day_begins must be between 0 and 23, got {}", options.day_begins);
        }
        if options.structure.trim().is_empty() {
            bail!("folder structure must not be empty");
        }
        let locale = format::parse_locale(&options.locale)?;

        let probe = NaiveDate::from_ymd_opt(2000, 1, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .context("failed to build probe date")?;
        format::format_date(&probe, &options.structure, locale)
            .context("invalid folder structure")?;
        if let Some(rename) = options.rename_format() {
            format::format_date(&probe, rename, locale).context("invalid rename format")?;
        }

        Ok(Self {
            options,
            locale,
            selector: options.selector_options(),
            placement: options.placement_options(),
        })
    }

    fn place(
        &self,
        record: &MetadataRecord,
        reserved: &mut HashSet<PathBuf>,
    ) -> anyhow::Result<FileOutcome> {
        let resolved = select_oldest(record, &self.selector);
        let Some(best) = resolved.best_date else {
            debug!("{}: no usable date", record.source_file.display());
            return Ok(FileOutcome::NoDate);
        };
        if record.file_name().starts_with('.') {
            return Ok(FileOutcome::Hidden);
        }

        let date = apply_day_begins(best, self.options.day_begins);
        if date != best {
            debug!(
                "{}: {} counts toward the previous day (day_begins={})",
                record.source_file.display(),
                best,
                self.options.day_begins
            );
        }

        let root = &self.options.source;
        let dest_dir =
            placement::destination_dir(root, &date, &self.options.structure, self.locale)?;
        let file_name = placement::destination_name(
            &record.source_file,
            &date,
            self.options.rename_format(),
            self.locale,
        )?;

        if !self.options.dry_run {
            placement::ensure_dir(&dest_dir)?;
        }
        let decision = placement::resolve(
            &record.source_file,
            &dest_dir,
            &file_name,
            &self.placement,
            reserved,
        )?;
        if self.options.dry_run {
            reserved.insert(decision.destination_path.clone());
        } else {
            placement::execute(&decision)?;
        }

        debug!(
            "{:?} {} -> {} (from {})",
            decision.action,
            relative(&decision.source, root).display(),
            relative(&decision.destination_path, root).display(),
            resolved.contributing_tags.join(", ")
        );

        Ok(match decision.action {
            PlacementAction::SkipDuplicate => FileOutcome::Duplicate(decision),
            PlacementAction::Move | PlacementAction::Copy => FileOutcome::Placed(decision),
        })
    }
}

fn relative(path: &Path, root: &Path) -> PathBuf {
    pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf())
}

/// Organize `options.source` using the metadata source the options name.
pub fn organize(
    options: &OrganizeOptions,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<OrganizeReport> {
    organize_with_control(options, &OrganizeControl::default(), progress_callback)
}

/// Like [`organize`], with cancellation support.
pub fn organize_with_control(
    options: &OrganizeOptions,
    control: &OrganizeControl,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<OrganizeReport> {
    let source = options.metadata_source();
    organize_from_source(options, control, source.as_ref(), progress_callback)
}

/// Organize with records from any metadata source.
///
/// Setup problems (bad directory, bad template, metadata source failing)
/// are returned as errors before any file is touched. Once files are being
/// placed, a failure only affects that file and is counted in the report.
pub fn organize_from_source(
    options: &OrganizeOptions,
    control: &OrganizeControl,
    source: &dyn MetadataSource,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<OrganizeReport> {
    let plan = Plan::prepare(options)?;

    let records = source
        .collect(&options.source, options.recursive)
        .context("metadata source unavailable")?;
    info!(
        "{} files with metadata under {}",
        records.len(),
        options.source.display()
    );

    let mut reserved = HashSet::new();
    let tally = task::run_batch(
        &records,
        "Organizing",
        MetadataRecord::file_name,
        |record| plan.place(record, &mut reserved),
        progress_callback,
        control.cancel_token.as_ref(),
    );

    let mut report = OrganizeReport {
        total_files: records.len() as u64,
        failed: tally.failures.len() as u64,
        cancelled: tally.cancelled,
        dry_run: options.dry_run,
        warnings: tally.failures,
        ..Default::default()
    };
    for outcome in tally.outcomes {
        match outcome {
            FileOutcome::NoDate => report.no_date += 1,
            FileOutcome::Hidden => report.hidden_skipped += 1,
            FileOutcome::Placed(decision) => {
                report.placed += 1;
                report.decisions.push(decision);
            }
            FileOutcome::Duplicate(decision) => {
                report.duplicates_skipped += 1;
                report.decisions.push(decision);
            }
        }
    }

    info!(
        "placed {}, duplicates {}, no date {}, hidden {}, failed {}",
        report.placed, report.duplicates_skipped, report.no_date, report.hidden_skipped, report.failed
    );
    Ok(report)
}

/// Run and fold the outcome into `(success, message)` for hosts that only
/// show a single end-of-run message.
pub fn organize_with_summary(
    options: &OrganizeOptions,
    progress_callback: &ProgressCallback<'_>,
) -> (bool, String) {
    match organize(options, progress_callback) {
        Ok(report) => (true, report.summary()),
        Err(e) => (false, format!("{:#}", e)),
    }
}
