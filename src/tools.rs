use crate::paths::AppPaths;
use crate::{EngineError, Result};
use serde::Serialize;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

const YT_DLP_RELEASE_BASE_URL: &str = "https://github.com/yt-dlp/yt-dlp/releases/latest/download/";
const MAX_REDIRECTS: u32 = 10;
const MIN_YT_DLP_BYTES: u64 = 512 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Downloader,
    Transcoder,
}

impl Tool {
    pub fn name(self) -> &'static str {
        match self {
            Tool::Downloader => "yt-dlp",
            Tool::Transcoder => "ffmpeg",
        }
    }

    fn version_arg(self) -> &'static str {
        match self {
            Tool::Downloader => "--version",
            Tool::Transcoder => "-version",
        }
    }

    fn user_installed_path(self, paths: &AppPaths) -> PathBuf {
        match self {
            Tool::Downloader => paths.ytdlp_bin_path(),
            Tool::Transcoder => paths.ffmpeg_bin_path(),
        }
    }

    /// Resolved fresh on every call; nothing is cached.
    pub fn resolve(self, paths: &AppPaths) -> PathBuf {
        match self {
            Tool::Downloader => paths.ytdlp_cmd(),
            Tool::Transcoder => paths.ffmpeg_cmd(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub name: String,
    pub available: bool,
    pub user_installed: bool,
    pub path: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolsStatus {
    pub ytdlp: ToolStatus,
    pub ffmpeg: ToolStatus,
    pub ytdlp_auto_installable: bool,
}

impl ToolsStatus {
    pub fn all_available(&self) -> bool {
        self.ytdlp.available && self.ffmpeg.available
    }

    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.ytdlp.available {
            missing.push(Tool::Downloader.name());
        }
        if !self.ffmpeg.available {
            missing.push(Tool::Transcoder.name());
        }
        missing
    }
}

pub fn tool_status(paths: &AppPaths, tool: Tool) -> ToolStatus {
    let program = tool.resolve(paths);
    let version = tool_version_first_line_with_arg(&program, tool.version_arg());
    ToolStatus {
        name: tool.name().to_string(),
        available: version.is_some(),
        user_installed: tool.user_installed_path(paths).is_file(),
        path: program.to_string_lossy().to_string(),
        version: version.filter(|v| !v.is_empty()),
    }
}

pub fn tools_status(paths: &AppPaths) -> ToolsStatus {
    ToolsStatus {
        ytdlp: tool_status(paths, Tool::Downloader),
        ffmpeg: tool_status(paths, Tool::Transcoder),
        ytdlp_auto_installable: ytdlp_release_asset().is_some(),
    }
}

/// Probes both tools and names whichever ones are missing.
pub fn ensure_tools_available(paths: &AppPaths) -> Result<ToolsStatus> {
    let status = tools_status(paths);
    if !status.all_available() {
        return Err(EngineError::ExternalToolMissing {
            tool: status.missing().join(", "),
        });
    }
    Ok(status)
}

/// First stdout line of a successful run; `Some("")` when the tool ran
/// cleanly but printed nothing.
fn tool_version_first_line_with_arg(
    program: impl AsRef<std::ffi::OsStr>,
    arg: &str,
) -> Option<String> {
    let output = crate::cmd::command(program)
        .arg(arg)
        .stdin(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let first = text.lines().next().unwrap_or("").trim();
    Some(first.to_string())
}

/// Release asset name for the running platform.
pub fn ytdlp_release_asset() -> Option<&'static str> {
    if cfg!(windows) {
        Some("yt-dlp.exe")
    } else if cfg!(target_os = "macos") {
        Some("yt-dlp_macos")
    } else if cfg!(all(target_os = "linux", target_arch = "x86_64")) {
        Some("yt-dlp_linux")
    } else if cfg!(all(target_os = "linux", target_arch = "aarch64")) {
        Some("yt-dlp_linux_aarch64")
    } else if cfg!(unix) {
        Some("yt-dlp")
    } else {
        None
    }
}

pub fn ytdlp_download_url() -> Option<String> {
    ytdlp_release_asset().map(|asset| format!("{YT_DLP_RELEASE_BASE_URL}{asset}"))
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub path: String,
    pub bytes: u64,
    pub sha256: String,
}

pub fn install_ytdlp(paths: &AppPaths) -> Result<InstallReport> {
    let url = ytdlp_download_url().ok_or_else(|| {
        EngineError::InstallFailed(
            "no yt-dlp release asset is published for this platform".to_string(),
        )
    })?;
    install_ytdlp_from(paths, &url)
}

/// One-shot download of the yt-dlp binary into the user tools directory.
/// A failed attempt may leave a partial `.download` file behind; the next
/// attempt overwrites it.
pub fn install_ytdlp_from(paths: &AppPaths, url: &str) -> Result<InstallReport> {
    if !url.starts_with("https://") {
        return Err(EngineError::InstallFailed(format!(
            "refusing non-https download url: {url}"
        )));
    }
    paths.ensure_dirs()?;

    let destination = paths.ytdlp_bin_path();
    let tmp_path = destination.with_extension("download");

    tracing::info!(url, destination = %destination.display(), "downloading yt-dlp");
    let bytes = download_to_file(url, &tmp_path)?;
    if bytes < MIN_YT_DLP_BYTES {
        return Err(EngineError::InstallFailed(format!(
            "downloaded yt-dlp is unexpectedly small ({bytes} bytes)"
        )));
    }
    set_executable(&tmp_path)?;

    if destination.exists() {
        let _ = std::fs::remove_file(&destination);
    }
    if std::fs::rename(&tmp_path, &destination).is_err() {
        std::fs::copy(&tmp_path, &destination)?;
        set_executable(&destination)?;
        let _ = std::fs::remove_file(&tmp_path);
    }

    let sha256 = hex::encode(sha256_file(&destination)?);
    tracing::info!(bytes, sha256 = %sha256, "yt-dlp installed");

    Ok(InstallReport {
        path: destination.to_string_lossy().to_string(),
        bytes,
        sha256,
    })
}

/// Fetches a static ffmpeg build into the user tools directory.
pub fn install_ffmpeg(paths: &AppPaths) -> Result<ToolStatus> {
    paths.ensure_dirs()?;

    let destination = paths.ffmpeg_dir();
    let download_url = ffmpeg_sidecar::download::ffmpeg_download_url()
        .map_err(|e| EngineError::InstallFailed(e.to_string()))?;
    tracing::info!(url = download_url, "downloading ffmpeg");
    let archive_path =
        ffmpeg_sidecar::download::download_ffmpeg_package(download_url, &destination)
            .map_err(|e| EngineError::InstallFailed(e.to_string()))?;
    ffmpeg_sidecar::download::unpack_ffmpeg(&archive_path, &destination)
        .map_err(|e| EngineError::InstallFailed(e.to_string()))?;

    Ok(tool_status(paths, Tool::Transcoder))
}

fn download_to_file(url: &str, target: &Path) -> Result<u64> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .max_redirects(MAX_REDIRECTS)
        .build()
        .into();

    let resp = agent
        .get(url)
        .call()
        .map_err(|e| EngineError::InstallFailed(format!("download failed: {e}")))?;
    let status = resp.status();
    if status.as_u16() != 200 {
        return Err(EngineError::InstallFailed(format!(
            "download failed (status={status})"
        )));
    }

    let mut reader = resp.into_body().into_reader();
    let mut file = std::fs::File::create(target)?;
    let bytes = std::io::copy(&mut reader, &mut file)?;
    file.flush()?;
    Ok(bytes)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

fn sha256_file(path: &Path) -> Result<Vec<u8>> {
    use sha2::Digest;
    let mut file = std::fs::File::open(path)?;
    let mut hasher = sha2::Sha256::new();
    let mut buf = [0_u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tools_are_named() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());
        let status = ToolsStatus {
            ytdlp: ToolStatus {
                name: "yt-dlp".to_string(),
                available: false,
                user_installed: false,
                path: "yt-dlp".to_string(),
                version: None,
            },
            ffmpeg: tool_status(&paths, Tool::Transcoder),
            ytdlp_auto_installable: true,
        };
        assert!(!status.all_available());
        assert_eq!(status.missing()[0], "yt-dlp");
    }

    #[test]
    fn version_probe_fails_for_unknown_program() {
        assert_eq!(
            tool_version_first_line_with_arg("definitely-not-a-real-binary-7f3a", "--version"),
            None
        );
    }

    #[test]
    fn install_refuses_plain_http() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());
        let err = install_ytdlp_from(&paths, "http://example.com/yt-dlp").expect_err("must fail");
        assert!(matches!(err, EngineError::InstallFailed(_)));
        assert!(!paths.ytdlp_bin_path().exists());
    }

    #[test]
    fn release_url_points_at_latest_download() {
        if let Some(url) = ytdlp_download_url() {
            assert!(url.starts_with(YT_DLP_RELEASE_BASE_URL));
        }
    }

    #[test]
    fn sha256_matches_known_digest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("blob");
        std::fs::write(&file, b"abc").expect("write");
        assert_eq!(
            hex::encode(sha256_file(&file).expect("hash")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[cfg(unix)]
    #[test]
    fn version_probe_accepts_silent_success() {
        assert_eq!(
            tool_version_first_line_with_arg("sh", "/dev/null").as_deref(),
            Some("")
        );
    }
}
