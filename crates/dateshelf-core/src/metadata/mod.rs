pub mod exiftool;
pub mod native;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use exiftool::ExifTool;
pub use native::NativeExif;

/// Key that carries the file path in exiftool's JSON output.
pub const SOURCE_FILE_KEY: &str = "SourceFile";

/// A tag value as metadata tools emit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Text(String),
    /// Rare multi-valued tags, oldest first.
    List(Vec<TagValue>),
    /// Numbers and other scalars.
    Other(serde_json::Value),
}

impl TagValue {
    /// Text handed to the date parser. Lists contribute their first element.
    pub fn first_text(&self) -> Option<String> {
        match self {
            TagValue::Text(s) => Some(s.clone()),
            TagValue::List(items) => items.first().and_then(TagValue::first_text),
            TagValue::Other(serde_json::Value::Null) => None,
            TagValue::Other(v) => Some(v.to_string()),
        }
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::Text(s.to_string())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::Text(s)
    }
}

/// All timestamp tags found for one file, keyed by group-qualified tag name
/// (`EXIF:DateTimeOriginal`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(rename = "SourceFile")]
    pub source_file: PathBuf,
    #[serde(flatten)]
    pub tags: BTreeMap<String, TagValue>,
}

impl MetadataRecord {
    pub fn new(source_file: impl Into<PathBuf>) -> Self {
        Self {
            source_file: source_file.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, name: &str, value: impl Into<TagValue>) -> Self {
        self.tags.insert(name.to_string(), value.into());
        self
    }

    /// Final path component, for progress messages.
    pub fn file_name(&self) -> String {
        self.source_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_file.display().to_string())
    }
}

/// Something that can list the timestamp tags of every file under a directory.
pub trait MetadataSource {
    fn collect(&self, root: &Path, recursive: bool) -> anyhow::Result<Vec<MetadataRecord>>;
}

/// Records gathered elsewhere, handed to the organizer as they are.
#[derive(Debug, Clone, Default)]
pub struct PreloadedSource {
    pub records: Vec<MetadataRecord>,
}

impl PreloadedSource {
    pub fn new(records: Vec<MetadataRecord>) -> Self {
        Self { records }
    }
}

impl MetadataSource for PreloadedSource {
    fn collect(&self, _root: &Path, _recursive: bool) -> anyhow::Result<Vec<MetadataRecord>> {
        Ok(self.records.clone())
    }
}

/// Which built-in metadata source to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackend {
    /// The external `exiftool` program.
    #[default]
    Exiftool,
    /// In-process EXIF reader; covers still images only.
    Native,
}
