use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use chrono::{DateTime, Local};
use exif::{In, Reader, Tag, Value};

use super::{MetadataRecord, MetadataSource, TagValue};

/// Reads EXIF in-process with `kamadak-exif`.
///
/// Tags are reported under exiftool's names so the selector treats both
/// sources alike: `EXIF:DateTimeOriginal`, `EXIF:CreateDate`,
/// `EXIF:ModifyDate`, and `File:FileModifyDate` from the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeExif;

impl MetadataSource for NativeExif {
    fn collect(&self, root: &Path, recursive: bool) -> anyhow::Result<Vec<MetadataRecord>> {
        let entries = fs::read_dir(root)
            .with_context(|| format!("failed to read directory {}", root.display()))?;
        let mut files = Vec::new();
        for entry in entries.flatten() {
            collect_entry(&entry.path(), recursive, &mut files);
        }
        files.sort();
        Ok(files.iter().map(|p| read_record(p)).collect())
    }
}

fn collect_entry(path: &Path, recursive: bool, files: &mut Vec<PathBuf>) {
    if path.is_file() {
        files.push(path.to_path_buf());
        return;
    }
    if !recursive || !path.is_dir() || is_hidden(path) {
        return;
    }
    let Ok(entries) = fs::read_dir(path) else {
        return;
    };
    for entry in entries.flatten() {
        collect_entry(&entry.path(), recursive, files);
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with('.'))
}

fn is_image(path: &Path) -> bool {
    mime_guess::from_path(path)
        .first()
        .map_or(false, |mime| mime.type_() == mime_guess::mime::IMAGE)
}

/// Build the record for one file. Unreadable metadata just means fewer tags.
pub fn read_record(path: &Path) -> MetadataRecord {
    let mut record = MetadataRecord::new(path);

    if let Some(modified) = fs::metadata(path).and_then(|m| m.modified()).ok() {
        record.tags.insert("File:FileModifyDate".to_string(), TagValue::Text(format_system_time(modified)));
    }

    if is_image(path) {
        if let Some(tags) = read_exif_tags(path) {
            record.tags.extend(tags);
        }
    }
    record
}

fn format_system_time(time: SystemTime) -> String {
    let local: DateTime<Local> = time.into();
    local.format("%Y:%m:%d %H:%M:%S%:z").to_string()
}

fn read_exif_tags(path: &Path) -> Option<Vec<(String, TagValue)>> {
    let file = File::open(path).ok()?;
    let exif = Reader::new().read_from_container(&mut BufReader::new(file)).ok()?;

    let tags = exif
        .fields()
        .filter(|field| field.ifd_num == In::PRIMARY)
        .filter_map(|field| {
            let name = tag_name(field.tag)?;
            let Value::Ascii(ref values) = field.value else {
                return None;
            };
            let mut texts: Vec<TagValue> = values
                .iter()
                .filter_map(|v| std::str::from_utf8(v).ok())
                .map(|s| TagValue::Text(s.trim_end_matches('\0').to_string()))
                .collect();
            let value = match texts.len() {
                0 => return None,
                1 => texts.remove(0),
                _ => TagValue::List(texts),
            };
            Some((format!("EXIF:{}", name), value))
        })
        .collect();
    Some(tags)
}

/// EXIF tags that exiftool reports under a different name.
const EXIFTOOL_NAMES: &[(Tag, &str)] = &[
    (Tag::DateTime, "ModifyDate"),
    (Tag::DateTimeDigitized, "CreateDate"),
];

/// exiftool's name for an EXIF date/time tag; `None` for anything else.
fn tag_name(tag: Tag) -> Option<String> {
    if let Some((_, name)) = EXIFTOOL_NAMES.iter().find(|(t, _)| *t == tag) {
        return Some(name.to_string());
    }
    let name = tag.to_string();
    (name.contains("Date") || name.contains("Time")).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_non_image_has_only_file_date() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        File::create(&path).unwrap().write_all(b"hello").unwrap();

        let record = read_record(&path);
        assert_eq!(record.source_file, path);
        assert_eq!(record.tags.len(), 1);
        assert!(record.tags.contains_key("File:FileModifyDate"));
    }

    #[test]
    fn test_broken_image_is_not_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        File::create(&path).unwrap().write_all(b"not a jpeg").unwrap();

        let record = read_record(&path);
        assert_eq!(record.tags.keys().collect::<Vec<_>>(), vec!["File:FileModifyDate"]);
    }

    #[test]
    fn test_collect_respects_recursion_and_hidden_dirs() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::create_dir_all(dir.path().join(".cache")).unwrap();
        File::create(dir.path().join("a.txt")).unwrap();
        File::create(dir.path().join("sub/b.txt")).unwrap();
        File::create(dir.path().join(".cache/c.txt")).unwrap();

        let flat = NativeExif.collect(dir.path(), false).unwrap();
        assert_eq!(flat.len(), 1);

        let deep = NativeExif.collect(dir.path(), true).unwrap();
        let names: Vec<String> = deep.iter().map(|r| r.file_name()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_missing_root_is_error() {
        let dir = tempdir().unwrap();
        assert!(NativeExif.collect(&dir.path().join("missing"), false).is_err());
    }

    #[test]
    fn test_tag_names() {
        assert_eq!(tag_name(Tag::DateTimeOriginal).as_deref(), Some("DateTimeOriginal"));
        assert_eq!(tag_name(Tag::DateTime).as_deref(), Some("ModifyDate"));
        assert_eq!(tag_name(Tag::Make), None);
    }
}
