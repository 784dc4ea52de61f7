/// External sorter invocation: argument construction and process supervision.
use std::ffi::OsString;
use std::io::ErrorKind;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use std::time::Duration;

use super::error::{JsortError, Result};
use super::frame::FRAME_BYTE;
use super::pipeline::CancellationToken;

/// Supervisor poll interval: starts short for quick runs, backs off to the cap.
const POLL_START: Duration = Duration::from_millis(1);
const POLL_MAX: Duration = Duration::from_millis(50);

/// Attempts and pause for a spawn that hits ETXTBSY.
const SPAWN_ATTEMPTS: u32 = 20;
const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(25);

/// Flags for the external sorter, fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortConfig {
    /// Sort binary to run.
    pub command: String,
    /// Comparison mode forwarded as `--sort=<method>`.
    pub method: Option<String>,
    pub ignore_case: bool,
    pub unique: bool,
    /// Program used by the sorter to compress its temporary files.
    pub compress_program: Option<String>,
    pub buffer_size: Option<String>,
    pub temporary_directory: Option<String>,
    pub parallel: Option<usize>,
}

impl Default for SortConfig {
    fn default() -> Self {
        SortConfig {
            command: "sort".to_string(),
            method: None,
            ignore_case: false,
            unique: false,
            compress_program: Some("gzip".to_string()),
            buffer_size: None,
            temporary_directory: None,
            parallel: None,
        }
    }
}

impl SortConfig {
    /// Build the sorter's argument list. Optional flags appear only when set.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::with_capacity(10);
        if let Some(ref prog) = self.compress_program {
            args.push(format!("--compress-program={}", prog).into());
        }
        args.push("-t".into());
        args.push(char::from(FRAME_BYTE).to_string().into());
        if let Some(ref method) = self.method {
            if !method.is_empty() {
                args.push(format!("--sort={}", method).into());
            }
        }
        if self.unique {
            args.push("-u".into());
        }
        if self.ignore_case {
            args.push("--ignore-case".into());
        }
        if let Some(ref size) = self.buffer_size {
            args.push("-S".into());
            args.push(size.into());
        }
        if let Some(ref dir) = self.temporary_directory {
            args.push("-T".into());
            args.push(dir.into());
        }
        if let Some(n) = self.parallel {
            args.push(format!("--parallel={}", n).into());
        }
        args
    }
}

/// A running external sorter.
///
/// Its stdin and stdout are handed out on spawn; stderr is inherited so the
/// sorter's own messages reach the operator unchanged.
pub struct SortProcess {
    child: Child,
    command: String,
}

impl SortProcess {
    pub fn spawn(config: &SortConfig) -> Result<(SortProcess, ChildStdin, ChildStdout)> {
        let args = config.args();
        log::debug!("sort command: {:?} args={:?}", config.command, args);

        let spawn_err = |source| JsortError::SpawnFailed {
            command: config.command.clone(),
            source,
        };
        let mut cmd = Command::new(&config.command);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        let mut child = spawn_retrying(&mut cmd).map_err(spawn_err)?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(i), Some(o)) => (i, o),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(spawn_err(std::io::Error::other("sort pipes unavailable")));
            }
        };

        let process = SortProcess {
            child,
            command: config.command.clone(),
        };
        Ok((process, stdin, stdout))
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Wait for the sorter to exit.
    ///
    /// A non-zero exit is an error. If `token` is cancelled first, the child is
    /// killed and reaped so it cannot keep the pipes open.
    pub fn wait(mut self, token: &CancellationToken) -> Result<()> {
        let mut delay = POLL_START;
        loop {
            if let Some(status) = self.child.try_wait()? {
                log::debug!("sort (pid {}) exited: {}", self.child.id(), status);
                if status.success() {
                    return Ok(());
                }
                return Err(JsortError::SortFailed {
                    command: self.command,
                    status,
                });
            }
            if token.is_cancelled() {
                log::debug!("killing sort (pid {})", self.child.id());
                let _ = self.child.kill();
                let status = self.child.wait()?;
                // Exited on its own before the kill landed.
                if status.code().is_some_and(|c| c != 0) {
                    return Err(JsortError::SortFailed {
                        command: self.command,
                        status,
                    });
                }
                return Err(JsortError::Cancelled);
            }
            thread::sleep(delay);
            delay = (delay * 2).min(POLL_MAX);
        }
    }
}

/// Spawn `cmd`, retrying while the executable is busy.
///
/// A sorter binary that was just written can still be open for writing in a
/// forked child that has not reached exec yet; the kernel then refuses to run
/// it with ETXTBSY until that fd is closed.
fn spawn_retrying(cmd: &mut Command) -> std::io::Result<Child> {
    let mut attempt = 1;
    loop {
        match cmd.spawn() {
            Err(e) if e.kind() == ErrorKind::ExecutableFileBusy && attempt < SPAWN_ATTEMPTS => {
                log::debug!("sort executable busy, retrying (attempt {})", attempt);
                attempt += 1;
                thread::sleep(SPAWN_RETRY_DELAY);
            }
            result => return result,
        }
    }
}
