use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use swimtrack_engine::config::{self, Settings};
use swimtrack_engine::paths::AppPaths;
use swimtrack_engine::queue::{JobStatus, NewJob, QueueController};
use swimtrack_engine::timecode::seconds_to_timecode;
use swimtrack_engine::ytdlp::{self, YtDlp};
use swimtrack_engine::{devices, library, source, tools};

#[derive(Parser)]
#[command(name = "swimtrack")]
#[command(about = "Turn YouTube videos into MP3s and copy them onto a swim headset")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory (default: $SWIMTRACK_BASE_DIR or the per-user app data dir)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show where yt-dlp and ffmpeg resolve to and whether they run
    Tools,

    /// Download yt-dlp (and optionally ffmpeg) into the data directory
    Install {
        /// Also fetch a static ffmpeg build
        #[arg(long)]
        ffmpeg: bool,

        /// Reinstall even if already present
        #[arg(long)]
        force: bool,
    },

    /// Look up a video's title and duration
    Info { url: String },

    /// Add a conversion job to the queue
    Add {
        url: String,

        /// Clip start, [[H:]MM:]SS
        #[arg(long)]
        start: Option<String>,

        /// Clip end, [[H:]MM:]SS
        #[arg(long)]
        end: Option<String>,

        /// Output file name without extension (default: video title)
        #[arg(long)]
        name: Option<String>,

        /// Skip the title lookup
        #[arg(long)]
        no_lookup: bool,
    },

    /// Show the queue, newest first
    List,

    /// Run one job (by id or unique id prefix), or every pending job
    Run {
        id: Option<String>,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Remove a job from the queue
    Remove { id: String },

    /// List MP3s in the output folder and whether each is on the device
    Files {
        #[arg(long)]
        dir: Option<PathBuf>,

        #[arg(long)]
        device: Option<PathBuf>,
    },

    /// List mounted volumes, likely headsets first
    Devices {
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Copy a file onto the device folder
    Copy {
        file: PathBuf,

        #[arg(long)]
        device: Option<PathBuf>,
    },

    /// Show or change saved settings
    Config {
        #[arg(long)]
        output_dir: Option<PathBuf>,

        #[arg(long)]
        device_dir: Option<PathBuf>,

        #[arg(long)]
        mount_root: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let paths = match cli.base_dir {
        Some(dir) => AppPaths::new(dir),
        None => AppPaths::from_env()
            .ok_or_else(|| anyhow!("could not determine a data directory; pass --base-dir"))?,
    };
    paths.ensure_dirs().context("creating data directory")?;
    let mut settings = config::load_settings(&paths)?;

    match cli.command {
        Commands::Tools => print_tools(&paths),
        Commands::Install { ffmpeg, force } => install(&paths, ffmpeg, force)?,
        Commands::Info { url } => info(&paths, &url)?,
        Commands::Add {
            url,
            start,
            end,
            name,
            no_lookup,
        } => {
            let mut new_job = NewJob {
                url,
                start_time: start,
                end_time: end,
                output_name: name,
                title: None,
            };
            new_job.validate()?;
            if !no_lookup {
                new_job.title = ytdlp::fetch_metadata(&paths, &new_job.url).map(|m| m.title);
            }
            let mut queue = open_queue(&paths)?;
            let job = queue.add(new_job)?;
            println!("added {}", job.id);
        }
        Commands::List => {
            let queue = open_queue(&paths)?;
            if queue.jobs().is_empty() {
                println!("queue is empty");
            }
            for job in queue.jobs() {
                let range = job
                    .range
                    .as_ref()
                    .map(|r| format!(" [{}-{}]", r.start, r.end))
                    .unwrap_or_default();
                let label = if job.title.is_empty() { &job.url } else { &job.title };
                println!("{}  {:<7}  {label}{range}", job.id, job.status);
                if job.status == JobStatus::Error && !job.message.is_empty() {
                    println!("    {}", job.message.lines().next().unwrap_or(""));
                }
            }
        }
        Commands::Run { id, output_dir } => {
            let output_dir = output_dir
                .or_else(|| settings.output_dir.clone())
                .ok_or_else(|| anyhow!("no output folder; pass --output-dir or run `config --output-dir`"))?;
            let mut queue = open_queue(&paths)?;
            match id {
                Some(prefix) => {
                    let id = resolve_job_id(&queue, &prefix)?;
                    let job = queue.run_job(&id, &output_dir)?;
                    print!("{}", job.log);
                    println!("{}  {}", job.id, job.status);
                    if job.status == JobStatus::Error {
                        bail!("{}", job.message);
                    }
                }
                None => {
                    let pending: Vec<String> = queue
                        .jobs()
                        .iter()
                        .filter(|j| j.status == JobStatus::Pending)
                        .map(|j| j.id.clone())
                        .collect();
                    let summary = queue.run_all(&output_dir)?;
                    for job in pending.iter().filter_map(|id| queue.get(id)) {
                        print!("{}", job.log);
                        println!("{}  {}", job.id, job.status);
                    }
                    println!(
                        "ran {} job(s): {} done, {} failed",
                        summary.attempted, summary.succeeded, summary.failed
                    );
                }
            }
        }
        Commands::Remove { id } => {
            let mut queue = open_queue(&paths)?;
            let id = resolve_job_id(&queue, &id)?;
            let job = queue.remove(&id)?;
            println!("removed {}", job.id);
        }
        Commands::Files { dir, device } => {
            let dir = dir
                .or_else(|| settings.output_dir.clone())
                .ok_or_else(|| anyhow!("no output folder; pass --dir"))?;
            let device = device.or_else(|| settings.device_dir.clone());
            let files = library::index_output_files(&dir, device.as_deref())?;
            if files.is_empty() {
                println!("no mp3 files in {}", dir.display());
            }
            for entry in files {
                let badge = if entry.transferred { "on device" } else { "not copied" };
                println!(
                    "{:>9}  {:<10}  {}",
                    library::format_size(entry.file.size),
                    badge,
                    entry.file.name
                );
            }
        }
        Commands::Devices { root } => {
            let root = root
                .or_else(|| settings.mount_root.clone())
                .or_else(devices::default_mount_root)
                .ok_or_else(|| anyhow!("no mount root for this platform; pass --root"))?;
            let found = devices::detect_volumes(&root, &settings.device_hints)
                .with_context(|| format!("scanning {}", root.display()))?;
            for candidate in found {
                let mark = if candidate.likely_match { "*" } else { " " };
                println!("{mark} {}  ({})", candidate.name, candidate.path.display());
            }
        }
        Commands::Copy { file, device } => {
            let device = device
                .or_else(|| settings.device_dir.clone())
                .ok_or_else(|| anyhow!("no device folder; pass --device"))?;
            let dest = library::copy_to_device(&file, &device)?;
            println!("copied to {}", dest.display());
        }
        Commands::Config {
            output_dir,
            device_dir,
            mount_root,
        } => {
            let changed = output_dir.is_some() || device_dir.is_some() || mount_root.is_some();
            if let Some(dir) = output_dir {
                settings.output_dir = Some(dir);
            }
            if let Some(dir) = device_dir {
                settings.device_dir = Some(dir);
            }
            if let Some(dir) = mount_root {
                settings.mount_root = Some(dir);
            }
            if changed {
                config::save_settings(&paths, &settings)?;
            }
            print_settings(&settings);
        }
    }

    Ok(())
}

fn open_queue(paths: &AppPaths) -> Result<QueueController<YtDlp>> {
    Ok(QueueController::open(paths, YtDlp::new(paths.clone()))?)
}

fn resolve_job_id(queue: &QueueController<YtDlp>, prefix: &str) -> Result<String> {
    let matches: Vec<&str> = queue
        .jobs()
        .iter()
        .map(|j| j.id.as_str())
        .filter(|id| id.starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [one] => Ok(one.to_string()),
        [] => bail!("no job matches {prefix}"),
        _ => bail!("{prefix} matches {} jobs; use more characters", matches.len()),
    }
}

fn print_tools(paths: &AppPaths) {
    let status = tools::tools_status(paths);
    for tool in [&status.ytdlp, &status.ffmpeg] {
        let state = if tool.available { "ok" } else { "missing" };
        println!(
            "{:<7} {:<8} {}{}",
            tool.name,
            state,
            tool.path,
            tool.version
                .as_deref()
                .map(|v| format!("  ({v})"))
                .unwrap_or_default()
        );
    }
    if !status.all_available() {
        if status.ytdlp_auto_installable {
            println!("run `swimtrack install` to fetch yt-dlp, or `install --ffmpeg` for both");
        } else {
            println!("no yt-dlp release for this platform; install yt-dlp and ffmpeg on PATH");
        }
    }
}

fn install(paths: &AppPaths, ffmpeg: bool, force: bool) -> Result<()> {
    if paths.ytdlp_bin_path().is_file() && !force {
        println!("yt-dlp: already installed ({})", paths.ytdlp_bin_path().display());
    } else {
        println!("yt-dlp: installing...");
        let report = tools::install_ytdlp(paths)?;
        println!("yt-dlp: installed {} ({} bytes, sha256 {})", report.path, report.bytes, report.sha256);
    }

    if ffmpeg {
        if paths.ffmpeg_bin_path().is_file() && !force {
            println!("ffmpeg: already installed ({})", paths.ffmpeg_bin_path().display());
        } else {
            println!("ffmpeg: installing...");
            let status = tools::install_ffmpeg(paths)?;
            if !status.available {
                bail!("ffmpeg install finished but {} does not run", status.path);
            }
            println!("ffmpeg: installed ({})", status.path);
        }
    }
    Ok(())
}

fn info(paths: &AppPaths, url: &str) -> Result<()> {
    let normalized = source::normalize_video_url(url);
    println!("url:      {normalized}");
    if let Some(id) = source::extract_video_id(url) {
        println!("video id: {id}");
    }
    if let Some(start) = source::url_start_time(url) {
        println!("starts:   {start}");
    }
    let meta = ytdlp::fetch_metadata(paths, url)
        .ok_or_else(|| anyhow!("metadata lookup failed (is yt-dlp installed?)"))?;
    println!("title:    {}", meta.title);
    println!("duration: {}", seconds_to_timecode(meta.duration));
    Ok(())
}

fn print_settings(settings: &Settings) {
    let show = |p: &Option<PathBuf>| {
        p.as_deref()
            .map(Path::display)
            .map(|d| d.to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    };
    println!("output_dir:   {}", show(&settings.output_dir));
    println!("device_dir:   {}", show(&settings.device_dir));
    println!("mount_root:   {}", show(&settings.mount_root));
    println!("device_hints: {}", settings.device_hints.join(", "));
}
