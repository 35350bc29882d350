use std::path::PathBuf;

const BASE_DIR_ENV_VAR: &str = "SWIMTRACK_BASE_DIR";
const APP_DIR_NAME: &str = "swimtrack";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_dir: PathBuf,
}

impl AppPaths {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// `SWIMTRACK_BASE_DIR`, else the per-user application data directory.
    pub fn from_env() -> Option<Self> {
        default_base_dir().map(Self::new)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.base_dir.join("config")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.config_dir().join("settings.json")
    }

    pub fn db_dir(&self) -> PathBuf {
        self.base_dir.join("db")
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_dir().join("app.sqlite")
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.base_dir.join("tools")
    }

    pub fn ytdlp_dir(&self) -> PathBuf {
        self.tools_dir().join("yt-dlp")
    }

    pub fn ytdlp_bin_path(&self) -> PathBuf {
        executable(self.ytdlp_dir().join("yt-dlp"))
    }

    pub fn ffmpeg_dir(&self) -> PathBuf {
        self.tools_dir().join("ffmpeg")
    }

    pub fn ffmpeg_bin_path(&self) -> PathBuf {
        executable(self.ffmpeg_dir().join("ffmpeg"))
    }

    /// The user-installed yt-dlp if present, else the bare name for a PATH lookup.
    pub fn ytdlp_cmd(&self) -> PathBuf {
        let path = self.ytdlp_bin_path();
        if path.is_file() {
            path
        } else {
            PathBuf::from("yt-dlp")
        }
    }

    pub fn ffmpeg_cmd(&self) -> PathBuf {
        let path = self.ffmpeg_bin_path();
        if path.is_file() {
            path
        } else {
            PathBuf::from("ffmpeg")
        }
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.config_dir())?;
        std::fs::create_dir_all(self.db_dir())?;
        std::fs::create_dir_all(self.ytdlp_dir())?;
        std::fs::create_dir_all(self.ffmpeg_dir())?;
        Ok(())
    }
}

fn executable(mut path: PathBuf) -> PathBuf {
    if cfg!(windows) {
        path.set_extension("exe");
    }
    path
}

fn default_base_dir() -> Option<PathBuf> {
    if let Ok(v) = std::env::var(BASE_DIR_ENV_VAR) {
        let t = v.trim();
        if !t.is_empty() {
            return Some(PathBuf::from(t));
        }
    }
    platform_data_dir().map(|dir| dir.join(APP_DIR_NAME))
}

fn non_empty_env(key: &str) -> Option<PathBuf> {
    let v = std::env::var(key).ok()?;
    let t = v.trim();
    if t.is_empty() {
        None
    } else {
        Some(PathBuf::from(t))
    }
}

#[cfg(windows)]
fn platform_data_dir() -> Option<PathBuf> {
    non_empty_env("APPDATA")
}

#[cfg(target_os = "macos")]
fn platform_data_dir() -> Option<PathBuf> {
    non_empty_env("HOME").map(|home| home.join("Library").join("Application Support"))
}

#[cfg(all(unix, not(target_os = "macos")))]
fn platform_data_dir() -> Option<PathBuf> {
    non_empty_env("XDG_DATA_HOME")
        .or_else(|| non_empty_env("HOME").map(|home| home.join(".local").join("share")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_commands_fall_back_to_bare_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());
        assert_eq!(paths.ytdlp_cmd(), PathBuf::from("yt-dlp"));
        assert_eq!(paths.ffmpeg_cmd(), PathBuf::from("ffmpeg"));
    }

    #[test]
    fn tool_commands_prefer_user_installed_copies() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());
        paths.ensure_dirs().expect("dirs");
        std::fs::write(paths.ytdlp_bin_path(), b"stub").expect("write");
        assert_eq!(paths.ytdlp_cmd(), paths.ytdlp_bin_path());
        assert_eq!(paths.ffmpeg_cmd(), PathBuf::from("ffmpeg"));
    }
}
