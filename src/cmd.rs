use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;

pub fn command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    configure_for_background(&mut cmd);
    cmd
}

#[cfg(windows)]
fn configure_for_background(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    // Prevent console windows from stealing focus on Windows while running tools.
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn configure_for_background(_cmd: &mut Command) {}

/// Exit status plus everything the child wrote, stdout and stderr merged in
/// arrival order.
#[derive(Debug, Clone)]
pub struct CapturedRun {
    pub status: ExitStatus,
    pub log: String,
}

impl CapturedRun {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Spawns `cmd`, accumulates both output streams line by line and blocks until
/// the child exits. No timeout: a child that never exits blocks forever.
pub fn run_captured(cmd: &mut Command) -> std::io::Result<CapturedRun> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("stdout pipe missing"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("stderr pipe missing"))?;

    let (tx, rx) = mpsc::channel::<String>();
    let stdout_handle = spawn_line_pump(stdout, tx.clone());
    let stderr_handle = spawn_line_pump(stderr, tx);

    let mut log = String::new();
    for line in rx {
        log.push_str(&line);
    }

    let status = child.wait()?;
    let _ = stdout_handle.join();
    let _ = stderr_handle.join();

    Ok(CapturedRun { status, log })
}

fn spawn_line_pump<R: Read + Send + 'static>(
    reader: R,
    tx: mpsc::Sender<String>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(String::from_utf8_lossy(&buf).into_owned()).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn run_captured_merges_both_streams() {
        let mut cmd = command("sh");
        cmd.args(["-c", "echo out; echo err 1>&2; exit 3"]);
        let run = run_captured(&mut cmd).expect("run");
        assert!(!run.success());
        assert_eq!(run.code(), Some(3));
        assert!(run.log.contains("out\n"));
        assert!(run.log.contains("err\n"));
    }

    #[test]
    fn run_captured_reports_spawn_failure() {
        let mut cmd = command("definitely-not-a-real-binary-7f3a");
        let err = run_captured(&mut cmd).expect_err("must fail");
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
