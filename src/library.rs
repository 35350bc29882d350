use crate::{EngineError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use unicode_normalization::UnicodeNormalization;

pub const AUDIO_EXTENSION: &str = "mp3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedFile {
    #[serde(flatten)]
    pub file: OutputFile,
    /// A file with the same (NFC-normalized) name exists in the device folder.
    pub transferred: bool,
}

/// Regular files in `dir` whose name ends in `.{extension}` (any case),
/// most recently modified first.
pub fn list_files(dir: &Path, extension: &str) -> Result<Vec<OutputFile>> {
    let suffix = format!(".{}", extension.to_lowercase());
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.to_lowercase().ends_with(&suffix) {
            continue;
        }
        let meta = entry.metadata()?;
        let modified_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        files.push(OutputFile {
            name,
            path: entry.path(),
            size: meta.len(),
            modified_ms,
        });
    }

    files.sort_by(|a, b| {
        b.modified_ms
            .cmp(&a.modified_ms)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(files)
}

pub fn list_audio_files(dir: &Path) -> Result<Vec<OutputFile>> {
    list_files(dir, AUDIO_EXTENSION)
}

/// Removable-device filesystems may store names decomposed (NFD); compare in NFC.
pub fn normalize_name(name: &str) -> String {
    name.nfc().collect()
}

pub fn transferred_names(device_dir: &Path) -> Result<HashSet<String>> {
    Ok(list_audio_files(device_dir)?
        .into_iter()
        .map(|f| normalize_name(&f.name))
        .collect())
}

/// Lists the output folder and marks which files already sit on the device.
pub fn index_output_files(output_dir: &Path, device_dir: Option<&Path>) -> Result<Vec<IndexedFile>> {
    let files = list_audio_files(output_dir)?;
    let on_device = match device_dir {
        Some(dir) => transferred_names(dir)?,
        None => HashSet::new(),
    };
    Ok(files
        .into_iter()
        .map(|file| {
            let transferred = on_device.contains(&normalize_name(&file.name));
            IndexedFile { file, transferred }
        })
        .collect())
}

/// Copies `source` into `device_dir` under its own file name, overwriting.
pub fn copy_to_device(source: &Path, device_dir: &Path) -> Result<PathBuf> {
    if !source.is_file() {
        return Err(EngineError::validation(format!(
            "not a file: {}",
            source.to_string_lossy()
        )));
    }
    if !device_dir.is_dir() {
        return Err(EngineError::validation(format!(
            "device folder does not exist: {}",
            device_dir.to_string_lossy()
        )));
    }
    let file_name = source
        .file_name()
        .ok_or_else(|| EngineError::validation("source has no file name"))?;
    let destination = device_dir.join(file_name);
    std::fs::copy(source, &destination)?;
    tracing::info!(
        source = %source.display(),
        destination = %destination.display(),
        "copied to device"
    );
    Ok(destination)
}

pub fn format_size(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;

    fn touch(dir: &Path, name: &str, bytes: &[u8], mtime_secs: i64) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).expect("write");
        filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime_secs, 0)).expect("mtime");
        path
    }

    #[test]
    fn list_files_orders_newest_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "t1.mp3", b"1", 1_000);
        touch(dir.path(), "t3.mp3", b"333", 3_000);
        touch(dir.path(), "t2.mp3", b"22", 2_000);

        let files = list_audio_files(dir.path()).expect("list");
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["t3.mp3", "t2.mp3", "t1.mp3"]);
        assert_eq!(files[0].size, 3);
        assert_eq!(files[0].modified_ms, 3_000_000);
    }

    #[test]
    fn list_files_matches_extension_case_insensitively_and_skips_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(dir.path(), "a.MP3", b"a", 10);
        touch(dir.path(), "b.m4a", b"b", 20);
        touch(dir.path(), "c.mp3.part", b"c", 30);
        std::fs::create_dir(dir.path().join("folder.mp3")).expect("dir");

        let files = list_audio_files(dir.path()).expect("list");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a.MP3");
    }

    #[test]
    fn list_files_fails_for_missing_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            list_audio_files(&dir.path().join("nope")),
            Err(EngineError::Io(_))
        ));
    }

    #[test]
    fn transfer_status_compares_normalized_names() {
        let out = tempfile::tempdir().expect("out");
        let device = tempfile::tempdir().expect("device");
        // "Café" precomposed in the output folder, decomposed on the device.
        touch(out.path(), "Caf\u{e9}.mp3", b"x", 100);
        touch(out.path(), "Other.mp3", b"y", 200);
        touch(device.path(), "Cafe\u{301}.mp3", b"x", 100);

        let indexed = index_output_files(out.path(), Some(device.path())).expect("index");
        let by_name: Vec<(&str, bool)> = indexed
            .iter()
            .map(|f| (f.file.name.as_str(), f.transferred))
            .collect();
        assert_eq!(by_name, vec![("Other.mp3", false), ("Caf\u{e9}.mp3", true)]);

        let without_device = index_output_files(out.path(), None).expect("index");
        assert!(without_device.iter().all(|f| !f.transferred));
    }

    #[test]
    fn copy_to_device_keeps_basename() {
        let out = tempfile::tempdir().expect("out");
        let device = tempfile::tempdir().expect("device");
        let source = touch(out.path(), "lap.mp3", b"audio", 100);

        let dest = copy_to_device(&source, device.path()).expect("copy");
        assert_eq!(dest, device.path().join("lap.mp3"));
        assert_eq!(std::fs::read(&dest).expect("read"), b"audio");

        assert!(copy_to_device(&out.path().join("missing.mp3"), device.path()).is_err());
        assert!(copy_to_device(&source, &device.path().join("nope")).is_err());
    }

    #[test]
    fn size_formats_in_megabytes() {
        assert_eq!(format_size(0), "0.0 MB");
        assert_eq!(format_size(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
    }
}
