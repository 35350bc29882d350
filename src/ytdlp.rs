use crate::cmd;
use crate::paths::AppPaths;
use crate::source::normalize_video_url;
use crate::timecode::TimeRange;
use crate::tools::{self, Tool};
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Used when a custom name sanitizes down to nothing.
pub const PLACEHOLDER_OUTPUT_NAME: &str = "audio";
const OUTPUT_EXTENSION: &str = "mp3";
const ILLEGAL_NAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub output_dir: PathBuf,
    pub range: Option<TimeRange>,
    pub output_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub log: String,
    /// Known up front only for custom names; title-named files are decided by yt-dlp.
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoMetadata {
    pub title: String,
    pub duration: f64,
}

/// Replaces characters that common filesystems reject with `_`.
pub fn sanitize_output_name(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|ch| {
            if ILLEGAL_NAME_CHARS.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();
    let trimmed = replaced.trim().trim_end_matches(['.', ' ']);

    let meaningful = trimmed
        .chars()
        .any(|ch| ch != '_' && ch != '.' && !ch.is_whitespace());
    if !meaningful {
        return PLACEHOLDER_OUTPUT_NAME.to_string();
    }
    trimmed.to_string()
}

fn custom_name(request: &DownloadRequest) -> Option<String> {
    request
        .output_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(sanitize_output_name)
}

pub fn output_template(request: &DownloadRequest) -> PathBuf {
    match custom_name(request) {
        Some(name) => request.output_dir.join(format!("{name}.%(ext)s")),
        None => request.output_dir.join("%(title)s.%(ext)s"),
    }
}

pub fn expected_output_path(request: &DownloadRequest) -> Option<PathBuf> {
    custom_name(request).map(|name| request.output_dir.join(format!("{name}.{OUTPUT_EXTENSION}")))
}

pub fn build_download_args(request: &DownloadRequest, ffmpeg: &Path) -> Vec<String> {
    let mut args: Vec<String> = [
        "--no-playlist",
        "-x",
        "--audio-format",
        OUTPUT_EXTENSION,
        "--audio-quality",
        "0",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.push("--ffmpeg-location".to_string());
    args.push(ffmpeg.to_string_lossy().to_string());
    args.push("-o".to_string());
    args.push(output_template(request).to_string_lossy().to_string());

    if let Some(range) = &request.range {
        args.push("--download-sections".to_string());
        args.push(range.section_arg());
    }

    args.push(normalize_video_url(&request.url));
    args
}

fn spawn_error(err: std::io::Error) -> EngineError {
    match err.kind() {
        std::io::ErrorKind::NotFound => EngineError::ExternalToolMissing {
            tool: Tool::Downloader.name().to_string(),
        },
        _ => EngineError::Io(err),
    }
}

/// Runs yt-dlp to completion. Succeeds only on exit code 0; otherwise the
/// error carries the exit code and the captured log.
pub fn run_download(paths: &AppPaths, request: &DownloadRequest) -> Result<DownloadOutcome> {
    if request.url.trim().is_empty() {
        return Err(EngineError::validation("a video link is required"));
    }
    if request.output_dir.as_os_str().is_empty() {
        return Err(EngineError::validation("an output folder is required"));
    }

    let program = Tool::Downloader.resolve(paths);
    let ffmpeg = Tool::Transcoder.resolve(paths);
    let args = build_download_args(request, &ffmpeg);
    tracing::debug!(program = %program.display(), ?args, "spawning yt-dlp");

    let mut command = cmd::command(&program);
    command.args(&args);
    let run = cmd::run_captured(&mut command).map_err(spawn_error)?;

    if !run.success() {
        return Err(EngineError::ExternalToolFailed {
            tool: Tool::Downloader.name().to_string(),
            code: run.code(),
            log: run.log,
        });
    }

    Ok(DownloadOutcome {
        log: run.log,
        output_path: expected_output_path(request),
    })
}

#[derive(Debug, Deserialize)]
struct DumpedInfo {
    title: Option<String>,
    duration: Option<f64>,
}

pub fn parse_metadata(stdout: &[u8]) -> Option<VideoMetadata> {
    let info: DumpedInfo = serde_json::from_slice(stdout).ok()?;
    Some(VideoMetadata {
        title: info.title.unwrap_or_default(),
        duration: info.duration.filter(|d| d.is_finite()).unwrap_or(0.0),
    })
}

/// Title and duration via `--dump-single-json`. Any failure yields `None`.
pub fn fetch_metadata(paths: &AppPaths, url: &str) -> Option<VideoMetadata> {
    let program = Tool::Downloader.resolve(paths);
    let output = cmd::command(&program)
        .args(["--dump-single-json", "--no-playlist", "--skip-download"])
        .arg(normalize_video_url(url))
        .stdin(std::process::Stdio::null())
        .output();
    let output = match output {
        Ok(o) => o,
        Err(e) => {
            tracing::debug!(error = %e, "metadata lookup could not start");
            return None;
        }
    };
    if !output.status.success() {
        tracing::debug!(code = ?output.status.code(), "metadata lookup failed");
        return None;
    }
    parse_metadata(&output.stdout)
}

/// Seam between the queue and the external tools.
pub trait Downloader {
    /// Fails with [`EngineError::ExternalToolMissing`] naming the absent tools.
    fn check_tools(&self) -> Result<()>;

    fn download(&self, request: &DownloadRequest) -> Result<DownloadOutcome>;
}

#[derive(Debug, Clone)]
pub struct YtDlp {
    paths: AppPaths,
}

impl YtDlp {
    pub fn new(paths: AppPaths) -> Self {
        Self { paths }
    }
}

impl Downloader for YtDlp {
    fn check_tools(&self) -> Result<()> {
        tools::ensure_tools_available(&self.paths).map(|_| ())
    }

    fn download(&self, request: &DownloadRequest) -> Result<DownloadOutcome> {
        run_download(&self.paths, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(range: Option<TimeRange>, output_name: Option<&str>) -> DownloadRequest {
        DownloadRequest {
            url: "https://www.youtube.com/watch?v=abc123&list=PL9&si=x".to_string(),
            output_dir: PathBuf::from("/music"),
            range,
            output_name: output_name.map(str::to_string),
        }
    }

    #[test]
    fn sanitize_replaces_each_illegal_char() {
        assert_eq!(sanitize_output_name("a:b/c*d?e"), "a_b_c_d_e");
        assert_eq!(sanitize_output_name("Lap 1: warm-up?"), "Lap 1_ warm-up_");
        assert_eq!(sanitize_output_name(r#"x<y>"z"|w\v"#), "x_y__z__w_v");
    }

    #[test]
    fn sanitize_falls_back_to_placeholder() {
        assert_eq!(sanitize_output_name(""), PLACEHOLDER_OUTPUT_NAME);
        assert_eq!(sanitize_output_name("   "), PLACEHOLDER_OUTPUT_NAME);
        assert_eq!(sanitize_output_name(":/*?"), PLACEHOLDER_OUTPUT_NAME);
        assert_eq!(sanitize_output_name(".."), PLACEHOLDER_OUTPUT_NAME);
    }

    #[test]
    fn args_without_range_use_title_template() {
        let args = build_download_args(&request(None, None), Path::new("/opt/ffmpeg"));
        let template = PathBuf::from("/music")
            .join("%(title)s.%(ext)s")
            .to_string_lossy()
            .to_string();
        assert_eq!(
            args,
            vec![
                "--no-playlist",
                "-x",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "0",
                "--ffmpeg-location",
                "/opt/ffmpeg",
                "-o",
                template.as_str(),
                "https://www.youtube.com/watch?v=abc123",
            ]
        );
    }

    #[test]
    fn args_with_range_and_custom_name() {
        let range = TimeRange::new("00:01:10", "00:02:00").expect("range");
        let req = request(Some(range), Some("warm: up"));
        let args = build_download_args(&req, Path::new("ffmpeg"));

        let section = args
            .iter()
            .position(|a| a == "--download-sections")
            .expect("section flag");
        assert_eq!(args[section + 1], "*00:01:10-00:02:00");

        let template = args.iter().position(|a| a == "-o").expect("template flag");
        assert_eq!(
            PathBuf::from(&args[template + 1]),
            PathBuf::from("/music").join("warm_ up.%(ext)s")
        );
        assert_eq!(args.last().map(String::as_str), Some("https://www.youtube.com/watch?v=abc123"));
        assert_eq!(
            expected_output_path(&req),
            Some(PathBuf::from("/music").join("warm_ up.mp3"))
        );
    }

    #[test]
    fn blank_custom_name_means_title() {
        let req = request(None, Some("   "));
        assert_eq!(output_template(&req), PathBuf::from("/music").join("%(title)s.%(ext)s"));
        assert_eq!(expected_output_path(&req), None);
    }

    #[test]
    fn metadata_parses_title_and_duration() {
        let meta = parse_metadata(br#"{"title":"Swim set","duration":185,"id":"x"}"#)
            .expect("metadata");
        assert_eq!(meta.title, "Swim set");
        assert_eq!(meta.duration, 185.0);

        let meta = parse_metadata(br#"{"id":"x"}"#).expect("defaults");
        assert_eq!(meta.title, "");
        assert_eq!(meta.duration, 0.0);

        assert_eq!(parse_metadata(b"not json"), None);
        assert_eq!(parse_metadata(b"[1,2]"), None);
    }

    #[test]
    fn run_download_rejects_missing_inputs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());
        let mut req = request(None, None);
        req.url = "  ".to_string();
        assert!(matches!(
            run_download(&paths, &req),
            Err(EngineError::Validation(_))
        ));
    }
}
