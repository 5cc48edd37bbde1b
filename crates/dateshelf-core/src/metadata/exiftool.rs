use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;
use log::debug;

use super::{MetadataRecord, MetadataSource};

/// Runs `exiftool -j -a -G -time:all` and reads its JSON output.
#[derive(Debug, Clone)]
pub struct ExifTool {
    executable: PathBuf,
    only_tags: Option<Vec<String>>,
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ExifTool {
    pub fn new() -> Self {
        Self {
            executable: PathBuf::from("exiftool"),
            only_tags: None,
        }
    }

    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Ask exiftool for these tags only instead of every time tag.
    pub fn with_only_tags(mut self, tags: Option<Vec<String>>) -> Self {
        self.only_tags = tags;
        self
    }

    fn args(&self, root: &Path, recursive: bool) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-j".into(), "-a".into(), "-G".into()];
        match &self.only_tags {
            Some(tags) => args.extend(tags.iter().map(|t| OsString::from(format!("-{}", t)))),
            None => args.push("-time:all".into()),
        }
        if recursive {
            args.push("-r".into());
        }
        args.push(root.as_os_str().to_owned());
        args
    }
}

impl MetadataSource for ExifTool {
    fn collect(&self, root: &Path, recursive: bool) -> anyhow::Result<Vec<MetadataRecord>> {
        let output = Command::new(&self.executable)
            .args(self.args(root, recursive))
            .output()
            .with_context(|| format!("failed to execute {}", self.executable.display()))?;

        // exiftool exits non-zero when some files could not be read; the
        // JSON on stdout still covers everything it did read.
        if !output.status.success() {
            debug!(
                "exiftool exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        parse_output(&output.stdout)
    }
}

/// Parse exiftool's `-j` output. Empty output means no files.
pub fn parse_output(stdout: &[u8]) -> anyhow::Result<Vec<MetadataRecord>> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(stdout).context("failed to parse exiftool output")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output() {
        let out = br#"[
            {"SourceFile": "/p/a.jpg", "File:FileModifyDate": "2023:06:01 10:00:00+02:00", "EXIF:DateTimeOriginal": "2023:05:01 23:50:00"},
            {"SourceFile": "/p/b.png"}
        ]"#;
        let records = parse_output(out).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tags.len(), 2);
        assert!(records[1].tags.is_empty());
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_output(b"").unwrap().is_empty());
        assert!(parse_output(b" \n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(parse_output(b"Error: file not found").is_err());
    }

    #[test]
    fn test_args() {
        let tool = ExifTool::new();
        let args = tool.args(Path::new("/p"), true);
        assert_eq!(args, vec!["-j", "-a", "-G", "-time:all", "-r", "/p"]);

        let tool = ExifTool::new().with_only_tags(Some(vec!["DateTimeOriginal".into()]));
        let args = tool.args(Path::new("/p"), false);
        assert_eq!(args, vec!["-j", "-a", "-G", "-DateTimeOriginal", "/p"]);
    }

    #[test]
    fn test_missing_executable_is_error() {
        let tool = ExifTool::new().with_executable("/nonexistent/exiftool-for-tests");
        let err = tool.collect(Path::new("."), false).unwrap_err();
        assert!(err.to_string().contains("failed to execute"));
    }
}
