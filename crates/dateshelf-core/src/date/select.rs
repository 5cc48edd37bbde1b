use std::path::PathBuf;

use chrono::NaiveDateTime;
use log::debug;

use crate::date::parse::TimestampCandidate;
use crate::metadata::MetadataRecord;

/// Groups that never take part in date selection (embedded color profiles
/// carry the profile's creation date, not the photo's).
pub const ALWAYS_IGNORED_GROUPS: &[&str] = &["ICC_Profile"];

/// Tags that never take part in date selection.
pub const ALWAYS_IGNORED_TAGS: &[&str] = &["SourceFile", "XMP:HistoryWhen"];

/// Any tag containing this marker is GPS-derived and skipped.
const GPS_MARKER: &str = "GPS";

/// Which tags of a record are allowed to compete for the oldest date.
#[derive(Debug, Clone, Default)]
pub struct SelectorOptions {
    /// Extra groups to skip, matched against the text before the first `:`.
    pub ignore_groups: Vec<String>,
    /// Extra fully qualified tags to skip.
    pub ignore_tags: Vec<String>,
    /// When set, only these tags are considered and the extra ignore lists
    /// above are not applied. Entries may be qualified (`EXIF:CreateDate`)
    /// or bare (`CreateDate`).
    pub only_tags: Option<Vec<String>>,
}

impl SelectorOptions {
    pub fn excludes(&self, tag: &str) -> bool {
        if tag.contains(GPS_MARKER) || ALWAYS_IGNORED_TAGS.contains(&tag) {
            return true;
        }
        let (group, name) = tag.split_once(':').unwrap_or(("", tag));
        if ALWAYS_IGNORED_GROUPS.contains(&group) {
            return true;
        }
        match &self.only_tags {
            Some(only) => !only.iter().any(|t| t == tag || t == name),
            None => {
                self.ignore_tags.iter().any(|t| t == tag)
                    || self.ignore_groups.iter().any(|g| g == group)
            }
        }
    }
}

/// Oldest timestamp found for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTimestamp {
    pub source_file: PathBuf,
    pub best_date: Option<NaiveDateTime>,
    /// Every tag whose value equals `best_date`. Order among ties is unspecified.
    pub contributing_tags: Vec<String>,
}

/// Pick the oldest valid timestamp among the record's tags.
pub fn select_oldest(record: &MetadataRecord, options: &SelectorOptions) -> ResolvedTimestamp {
    let mut best_date: Option<NaiveDateTime> = None;
    let mut contributing_tags = Vec::new();

    for (tag, value) in &record.tags {
        if options.excludes(tag) {
            continue;
        }
        let candidate = TimestampCandidate::from_tag(tag, value);
        debug!(
            "{}: {} = {:?} -> {:?}",
            record.source_file.display(),
            tag,
            value,
            candidate.parsed
        );
        let Some(parsed) = candidate.parsed else {
            continue;
        };

        match best_date {
            Some(best) if parsed > best => {}
            Some(best) if parsed == best => contributing_tags.push(candidate.tag_name),
            _ => {
                best_date = Some(parsed);
                contributing_tags = vec![candidate.tag_name];
            }
        }
    }

    ResolvedTimestamp {
        source_file: record.source_file.clone(),
        best_date,
        contributing_tags,
    }
}
