use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Locale, NaiveDateTime};
use filetime::FileTime;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::dedup;
use crate::format::format_date;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementAction {
    Move,
    Copy,
    /// A byte-identical file already sits at the destination; nothing is
    /// transferred and the source stays where it is.
    SkipDuplicate,
}

/// Where one file goes and how it gets there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementDecision {
    pub source: PathBuf,
    pub destination_path: PathBuf,
    pub action: PlacementAction,
    /// A collision suffix was appended to the file name.
    pub renamed: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlacementOptions {
    pub copy_files: bool,
    pub remove_duplicates: bool,
    pub keep_filename: bool,
}

/// Directory for `date` under `root`: the structure template is rendered
/// and every `/`-separated piece becomes one directory level.
pub fn destination_dir(
    root: &Path,
    date: &NaiveDateTime,
    structure: &str,
    locale: Locale,
) -> anyhow::Result<PathBuf> {
    let rendered = format_date(date, structure, locale)?;
    Ok(rendered
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(root.to_path_buf(), |dir, segment| dir.join(segment)))
}

/// File name at the destination: the rendered rename template plus the
/// lower-cased original extension, or the original name unchanged.
pub fn destination_name(
    source: &Path,
    date: &NaiveDateTime,
    rename_format: Option<&str>,
    locale: Locale,
) -> anyhow::Result<String> {
    let original = source
        .file_name()
        .with_context(|| format!("{} has no file name", source.display()))?
        .to_string_lossy()
        .into_owned();

    match rename_format {
        Some(template) => {
            let (_, ext) = split_extension(&original);
            Ok(format!("{}{}", format_date(date, template, locale)?, ext.to_lowercase()))
        }
        None => Ok(original),
    }
}

/// Split `name` into stem and extension, keeping the dot on the extension.
/// A leading dot belongs to the stem (`.bashrc` has no extension).
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => name.split_at(pos),
        _ => (name, ""),
    }
}

/// Create the destination directory and any missing parents.
pub fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))
}

/// Pick a free destination path for `source` inside `dest_dir`.
///
/// `reserved` holds paths already promised to earlier files that are not
/// on disk yet (dry runs); they count as taken but never as duplicates.
pub fn resolve(
    source: &Path,
    dest_dir: &Path,
    file_name: &str,
    options: &PlacementOptions,
    reserved: &HashSet<PathBuf>,
) -> anyhow::Result<PlacementDecision> {
    let (stem, ext) = split_extension(file_name);
    let original_stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut candidate = dest_dir.join(file_name);
    let mut suffix = 1u32;

    loop {
        let on_disk = candidate.exists();
        if !on_disk && !reserved.contains(&candidate) {
            break;
        }
        if on_disk && options.remove_duplicates && candidate.is_file() {
            let identical = dedup::files_identical(source, &candidate).with_context(|| {
                format!("failed to compare {} with {}", source.display(), candidate.display())
            })?;
            if identical {
                return Ok(PlacementDecision {
                    source: source.to_path_buf(),
                    destination_path: candidate,
                    action: PlacementAction::SkipDuplicate,
                    renamed: suffix > 1,
                });
            }
        }
        let name = if options.keep_filename {
            format!("{}_{}_{}{}", stem, original_stem, suffix, ext)
        } else {
            format!("{}_{}{}", stem, suffix, ext)
        };
        candidate = dest_dir.join(name);
        suffix += 1;
    }

    Ok(PlacementDecision {
        source: source.to_path_buf(),
        destination_path: candidate,
        action: if options.copy_files {
            PlacementAction::Copy
        } else {
            PlacementAction::Move
        },
        renamed: suffix > 1,
    })
}

/// Carry out a decision. Copies keep the source's access and modification times.
pub fn execute(decision: &PlacementDecision) -> anyhow::Result<()> {
    let source = &decision.source;
    let dest = &decision.destination_path;
    match decision.action {
        PlacementAction::SkipDuplicate => Ok(()),
        PlacementAction::Copy => copy_preserving_times(source, dest),
        PlacementAction::Move => {
            if fs::rename(source, dest).is_ok() {
                return Ok(());
            }
            // rename fails across filesystems
            move_by_copy(source, dest, |p| fs::remove_file(p))
        }
    }
}

/// Copy then remove the source. If the source cannot be removed the copy
/// is deleted again, so a failed move leaves only the source behind.
fn move_by_copy(
    source: &Path,
    dest: &Path,
    remove_source: impl FnOnce(&Path) -> io::Result<()>,
) -> anyhow::Result<()> {
    copy_preserving_times(source, dest)?;
    if let Err(e) = remove_source(source) {
        if let Err(undo) = fs::remove_file(dest) {
            warn!("failed to remove partial copy {}: {}", dest.display(), undo);
        }
        return Err(e)
            .with_context(|| format!("failed to remove {} after copying", source.display()));
    }
    Ok(())
}

fn copy_preserving_times(source: &Path, dest: &Path) -> anyhow::Result<()> {
    fs::copy(source, dest)
        .with_context(|| format!("failed to copy {} to {}", source.display(), dest.display()))?;
    let meta = fs::metadata(source)
        .with_context(|| format!("failed to read metadata of {}", source.display()))?;
    filetime::set_file_times(
        dest,
        FileTime::from_last_access_time(&meta),
        FileTime::from_last_modification_time(&meta),
    )
    .with_context(|| format!("failed to set file times on {}", dest.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn date() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 5, 1).unwrap().and_hms_opt(23, 50, 7).unwrap()
    }

    fn write(path: &Path, bytes: &[u8]) {
        File::create(path).unwrap().write_all(bytes).unwrap();
    }

    fn opts(remove_duplicates: bool, keep_filename: bool) -> PlacementOptions {
        PlacementOptions {
            copy_files: false,
            remove_duplicates,
            keep_filename,
        }
    }

    #[test]
    fn test_destination_dir_levels() {
        let dir = destination_dir(Path::new("/root"), &date(), "%Y/%m-%b", Locale::POSIX).unwrap();
        assert_eq!(dir, PathBuf::from("/root/2023/05-May"));

        let dir = destination_dir(Path::new("/root"), &date(), "%Y//%m/", Locale::POSIX).unwrap();
        assert_eq!(dir, PathBuf::from("/root/2023/05"));
    }

    #[test]
    fn test_destination_name() {
        let src = Path::new("/in/IMG_0001.JPG");
        assert_eq!(destination_name(src, &date(), None, Locale::POSIX).unwrap(), "IMG_0001.JPG");
        assert_eq!(
            destination_name(src, &date(), Some("%Y%m%d_%H%M%S"), Locale::POSIX).unwrap(),
            "20230501_235007.jpg"
        );
        let bare = Path::new("/in/README");
        assert_eq!(destination_name(bare, &date(), Some("%Y"), Locale::POSIX).unwrap(), "2023");
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("a.tar.gz"), ("a.tar", ".gz"));
        assert_eq!(split_extension(".bashrc"), (".bashrc", ""));
        assert_eq!(split_extension("name."), ("name", "."));
        assert_eq!(split_extension("plain"), ("plain", ""));
    }

    #[test]
    fn test_free_destination() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.jpg");
        write(&src, b"a");
        let dest_dir = dir.path().join("2023");

        let d = resolve(&src, &dest_dir, "a.jpg", &opts(true, false), &HashSet::new()).unwrap();
        assert_eq!(d.destination_path, dest_dir.join("a.jpg"));
        assert_eq!(d.action, PlacementAction::Move);
        assert!(!d.renamed);
    }

    #[test]
    fn test_collision_suffixes_are_gap_free() {
        let dir = tempdir().unwrap();
        let dest_dir = dir.path().join("out");
        fs::create_dir_all(&dest_dir).unwrap();
        write(&dest_dir.join("a.jpg"), b"existing");
        write(&dest_dir.join("a_1.jpg"), b"existing 1");

        let src = dir.path().join("a.jpg");
        write(&src, b"new");
        let d = resolve(&src, &dest_dir, "a.jpg", &opts(true, false), &HashSet::new()).unwrap();
        assert_eq!(d.destination_path, dest_dir.join("a_2.jpg"));
        assert!(d.renamed);
    }

    #[test]
    fn test_keep_filename_suffix() {
        let dir = tempdir().unwrap();
        let dest_dir = dir.path().join("out");
        fs::create_dir_all(&dest_dir).unwrap();
        write(&dest_dir.join("20230501.jpg"), b"existing");

        let src = dir.path().join("IMG_7.JPG");
        write(&src, b"new");
        let d = resolve(&src, &dest_dir, "20230501.jpg", &opts(true, true), &HashSet::new()).unwrap();
        assert_eq!(d.destination_path, dest_dir.join("20230501_IMG_7_1.jpg"));
    }

    #[test]
    fn test_identical_file_is_skipped() {
        let dir = tempdir().unwrap();
        let dest_dir = dir.path().join("out");
        fs::create_dir_all(&dest_dir).unwrap();
        write(&dest_dir.join("a.jpg"), b"same");
        let src = dir.path().join("a.jpg");
        write(&src, b"same");

        let d = resolve(&src, &dest_dir, "a.jpg", &opts(true, false), &HashSet::new()).unwrap();
        assert_eq!(d.action, PlacementAction::SkipDuplicate);
        assert_eq!(d.destination_path, dest_dir.join("a.jpg"));

        // without duplicate removal the identical file is just another collision
        let d = resolve(&src, &dest_dir, "a.jpg", &opts(false, false), &HashSet::new()).unwrap();
        assert_eq!(d.destination_path, dest_dir.join("a_1.jpg"));
    }

    #[test]
    fn test_identical_file_after_renamed_candidates() {
        let dir = tempdir().unwrap();
        let dest_dir = dir.path().join("out");
        fs::create_dir_all(&dest_dir).unwrap();
        write(&dest_dir.join("a.jpg"), b"other");
        write(&dest_dir.join("a_1.jpg"), b"same");
        let src = dir.path().join("a.jpg");
        write(&src, b"same");

        let d = resolve(&src, &dest_dir, "a.jpg", &opts(true, false), &HashSet::new()).unwrap();
        assert_eq!(d.action, PlacementAction::SkipDuplicate);
        assert_eq!(d.destination_path, dest_dir.join("a_1.jpg"));
    }

    #[test]
    fn test_reserved_paths_count_as_taken() {
        let dir = tempdir().unwrap();
        let dest_dir = dir.path().join("out");
        let src = dir.path().join("a.jpg");
        write(&src, b"a");
        let reserved: HashSet<PathBuf> = [dest_dir.join("a.jpg")].into_iter().collect();

        let d = resolve(&src, &dest_dir, "a.jpg", &opts(true, false), &reserved).unwrap();
        assert_eq!(d.destination_path, dest_dir.join("a_1.jpg"));
    }

    #[test]
    fn test_execute_move() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.jpg");
        write(&src, b"payload");
        let dest_dir = dir.path().join("2023");
        ensure_dir(&dest_dir).unwrap();

        let d = resolve(&src, &dest_dir, "a.jpg", &opts(true, false), &HashSet::new()).unwrap();
        execute(&d).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(dest_dir.join("a.jpg")).unwrap(), b"payload");
    }

    #[test]
    fn test_execute_copy_keeps_source_and_mtime() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.jpg");
        write(&src, b"payload");
        let mtime = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&src, mtime).unwrap();
        let dest_dir = dir.path().join("2023");
        ensure_dir(&dest_dir).unwrap();

        let options = PlacementOptions {
            copy_files: true,
            ..opts(true, false)
        };
        let d = resolve(&src, &dest_dir, "a.jpg", &options, &HashSet::new()).unwrap();
        assert_eq!(d.action, PlacementAction::Copy);
        execute(&d).unwrap();

        assert!(src.exists());
        let copied = fs::metadata(dest_dir.join("a.jpg")).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&copied), mtime);
    }

    #[test]
    fn test_execute_missing_source_is_error() {
        let dir = tempdir().unwrap();
        let d = PlacementDecision {
            source: dir.path().join("gone.jpg"),
            destination_path: dir.path().join("out.jpg"),
            action: PlacementAction::Move,
            renamed: false,
        };
        assert!(execute(&d).is_err());
    }

    #[test]
    fn test_ensure_dir_is_idempotent() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("2023/05-May");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_move_by_copy_removes_source() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.jpg");
        let dest = dir.path().join("b.jpg");
        write(&src, b"payload");

        move_by_copy(&src, &dest, |p| fs::remove_file(p)).unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn test_move_by_copy_undoes_copy_when_source_stays() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.jpg");
        let dest = dir.path().join("b.jpg");
        write(&src, b"payload");

        let err = move_by_copy(&src, &dest, |_| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        })
        .unwrap_err();

        assert!(err.to_string().contains("after copying"));
        assert!(src.exists());
        assert!(!dest.exists());
    }
}
