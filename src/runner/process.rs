//! Subprocess execution with output teed into a per-job log.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Job-scoped log sink.
///
/// Every line goes to the log file (when one is attached) and to an
/// in-memory copy used for diagnostic excerpts. Clones share the same sink.
#[derive(Debug, Clone)]
pub struct TaskLog {
    path: Option<PathBuf>,
    inner: Arc<Mutex<LogInner>>,
}

#[derive(Debug)]
struct LogInner {
    file: Option<File>,
    buffer: String,
}

impl TaskLog {
    /// Creates (truncating) the log file at `path`.
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            inner: Arc::new(Mutex::new(LogInner {
                file: Some(File::from_std(file)),
                buffer: String::new(),
            })),
        })
    }

    /// A log kept only in memory.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Arc::new(Mutex::new(LogInner {
                file: None,
                buffer: String::new(),
            })),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends one line.
    pub async fn line(&self, line: &str) {
        let mut inner = self.inner.lock().await;
        inner.buffer.push_str(line);
        inner.buffer.push('\n');
        if let Some(ref mut file) = inner.file {
            let mut payload = Vec::with_capacity(line.len() + 1);
            payload.extend_from_slice(line.as_bytes());
            payload.push(b'\n');
            // Flushed per line so the file is complete whenever the job ends.
            let written = match file.write_all(&payload).await {
                Ok(()) => file.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                warn!(error = %e, "Failed to write to job log");
            }
        }
    }

    pub async fn contents(&self) -> String {
        self.inner.lock().await.buffer.clone()
    }

    /// The last `n` lines, with a pointer to the full log when truncated.
    pub async fn excerpt(&self, n: usize) -> String {
        let contents = self.contents().await;
        let (tail, truncated) = last_n_lines(&contents, n);
        if truncated {
            let location = self
                .path
                .as_ref()
                .and_then(|p| p.parent())
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<memory>".to_string());
            format!("{}\n... (log truncated, full log at {})", tail, location)
        } else {
            tail
        }
    }
}

/// Returns the last `n` lines of `s` and whether anything was dropped.
pub fn last_n_lines(s: &str, n: usize) -> (String, bool) {
    let lines: Vec<&str> = s.trim_end_matches('\n').split('\n').collect();
    if lines.len() > n {
        (lines[lines.len() - n..].join("\n"), true)
    } else {
        (s.trim_end_matches('\n').to_string(), false)
    }
}

/// Exit status and (optionally) captured stdout of a finished process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
}

/// Human-readable command line of `cmd`.
pub fn display_command(cmd: &Command) -> String {
    let std_cmd = cmd.as_std();
    std::iter::once(std_cmd.get_program())
        .chain(std_cmd.get_args())
        .map(|s| s.to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decodes one raw output line, dropping the line terminator.
/// Invalid UTF-8 is replaced rather than rejected.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Outcome of one `read_until` on a child stream.
///
/// `buf` persists across calls: a read cancelled by `select!` keeps the bytes
/// it already consumed there.
fn take_line(
    read: std::io::Result<usize>,
    buf: &mut Vec<u8>,
    stream: &str,
) -> (Option<String>, bool) {
    match read {
        Ok(0) => {
            let tail = (!buf.is_empty()).then(|| decode_line(buf));
            buf.clear();
            (tail, true)
        }
        Ok(_) if buf.ends_with(b"\n") => {
            let line = decode_line(buf);
            buf.clear();
            (Some(line), false)
        }
        // Partial line at EOF; the next read returns 0.
        Ok(_) => (None, false),
        Err(e) => {
            warn!(stream, error = %e, "Error reading child output");
            let tail = (!buf.is_empty()).then(|| decode_line(buf));
            buf.clear();
            (tail, true)
        }
    }
}

/// Runs `cmd` to completion, teeing stdout and stderr line by line into `log`.
///
/// `stdin_lines` are written to the child's stdin, one per line, from a
/// separate task; stdin is closed once they are all sent. Dropping the
/// returned future kills the child.
pub async fn run_logged(
    mut cmd: Command,
    log: &TaskLog,
    stdin_lines: Option<Vec<String>>,
    capture_stdout: bool,
) -> std::io::Result<ProcessOutput> {
    let cmdline = display_command(&cmd);
    log.line(&format!("Running command: {}", cmdline)).await;
    debug!(command = %cmdline, "Spawning process");

    cmd.stdin(if stdin_lines.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd.spawn()?;

    if let (Some(lines), Some(mut stdin)) = (stdin_lines, child.stdin.take()) {
        tokio::spawn(async move {
            for line in lines {
                let mut payload = line.into_bytes();
                payload.push(b'\n');
                if let Err(e) = stdin.write_all(&payload).await {
                    debug!(error = %e, "Child closed stdin early");
                    return;
                }
            }
            let _ = stdin.shutdown().await;
        });
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("stderr not captured"))?;

    let mut stdout = BufReader::new(stdout);
    let mut stderr = BufReader::new(stderr);
    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    let mut stdout_done = false;
    let mut stderr_done = false;
    let mut captured = String::new();

    while !(stdout_done && stderr_done) {
        tokio::select! {
            read = stdout.read_until(b'\n', &mut stdout_buf), if !stdout_done => {
                let (line, done) = take_line(read, &mut stdout_buf, "stdout");
                stdout_done = done;
                if let Some(l) = line {
                    trace!(stream = "stdout", "{}", l);
                    log.line(&l).await;
                    if capture_stdout {
                        captured.push_str(&l);
                        captured.push('\n');
                    }
                }
            },
            read = stderr.read_until(b'\n', &mut stderr_buf), if !stderr_done => {
                let (line, done) = take_line(read, &mut stderr_buf, "stderr");
                stderr_done = done;
                if let Some(l) = line {
                    trace!(stream = "stderr", "{}", l);
                    log.line(&l).await;
                }
            },
        }
    }

    let status = child.wait().await?;
    Ok(ProcessOutput {
        status,
        stdout: captured,
    })
}
