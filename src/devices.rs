use crate::Result;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceCandidate {
    pub name: String,
    pub path: PathBuf,
    pub likely_match: bool,
}

/// Where removable volumes show up on this platform.
pub fn default_mount_root() -> Option<PathBuf> {
    if cfg!(target_os = "macos") {
        return Some(PathBuf::from("/Volumes"));
    }
    if cfg!(target_os = "linux") {
        let user = std::env::var("USER").ok().filter(|u| !u.trim().is_empty())?;
        for base in ["/media", "/run/media"] {
            let root = Path::new(base).join(&user);
            if root.is_dir() {
                return Some(root);
            }
        }
        return Some(Path::new("/media").join(user));
    }
    None
}

pub fn is_likely_match(name: &str, hints: &[String]) -> bool {
    let lower = name.to_lowercase();
    hints
        .iter()
        .map(|h| h.trim().to_lowercase())
        .any(|h| !h.is_empty() && lower.contains(&h))
}

/// Likely matches first, then by name (case-insensitive) within each group.
pub fn compare_candidates(a: &DeviceCandidate, b: &DeviceCandidate) -> Ordering {
    b.likely_match
        .cmp(&a.likely_match)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

/// Top-level directories under `mount_root`, ranked by the name hints. This is
/// a guess; callers should still let the user pick any folder.
pub fn detect_volumes(mount_root: &Path, hints: &[String]) -> Result<Vec<DeviceCandidate>> {
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(mount_root)? {
        let entry = entry?;
        let path = entry.path();
        // Mount points may be symlinks (e.g. the boot volume under /Volumes).
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let likely_match = is_likely_match(&name, hints);
        candidates.push(DeviceCandidate {
            name,
            path,
            likely_match,
        });
    }
    candidates.sort_by(compare_candidates);
    tracing::debug!(root = %mount_root.display(), count = candidates.len(), "volumes scanned");
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_DEVICE_HINTS;

    fn hints() -> Vec<String> {
        DEFAULT_DEVICE_HINTS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn likely_match_is_case_insensitive_substring() {
        assert!(is_likely_match("SHOKZ_SWIM", &hints()));
        assert!(is_likely_match("OpenSwim Pro", &hints()));
        assert!(is_likely_match("zzz-shokz", &hints()));
        assert!(!is_likely_match("Untitled", &hints()));
        assert!(!is_likely_match("anything", &["  ".to_string()]));
    }

    #[test]
    fn detect_ranks_likely_matches_before_alphabetical() {
        let root = tempfile::tempdir().expect("tempdir");
        for name in ["Untitled", "aaa-other", "zzz-shokz", "SHOKZ_SWIM"] {
            std::fs::create_dir(root.path().join(name)).expect("mkdir");
        }
        std::fs::write(root.path().join("shokz.txt"), b"not a volume").expect("file");

        let found = detect_volumes(root.path(), &hints()).expect("detect");
        let names: Vec<&str> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["SHOKZ_SWIM", "zzz-shokz", "aaa-other", "Untitled"]);
        assert!(found[0].likely_match && found[1].likely_match);
        assert!(!found[2].likely_match && !found[3].likely_match);
        assert_eq!(found[0].path, root.path().join("SHOKZ_SWIM"));
    }

    #[test]
    fn detect_fails_for_missing_root() {
        let root = tempfile::tempdir().expect("tempdir");
        assert!(detect_volumes(&root.path().join("missing"), &hints()).is_err());
    }
}
