/// Concurrent orchestration of feeder, drainer and sort process.
///
/// The three tasks run on their own threads and report back over a channel.
/// The first real failure cancels the shared token: the supervisor kills the
/// sorter, which unblocks the drainer, and the feeder stops at its next line.
use std::io::{BufReader, BufWriter, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::command::SortProcess;
use super::core::{FeedStats, JsortConfig, drain, feed};
use super::error::{JsortError, Result};

/// Read buffer for stdin and the sorter's stdout.
const PIPE_BUF_SIZE: usize = 256 * 1024;

const OUTPUT_BUF_SIZE: usize = 64 * 1024;

/// How long a cancelled feeder may take to notice before it is detached.
/// The feeder can be blocked on an upstream read that nothing can interrupt.
const FEEDER_GRACE: Duration = Duration::from_millis(200);

/// Shared stop flag for the pipeline tasks.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Counters for a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub records_in: u64,
    pub records_out: u64,
    pub missing_keys: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    Feeder,
    Drainer,
    Supervisor,
}

impl Task {
    fn name(self) -> &'static str {
        match self {
            Task::Feeder => "feeder",
            Task::Drainer => "drainer",
            Task::Supervisor => "supervisor",
        }
    }
}

enum Outcome {
    Fed(FeedStats),
    Drained(u64),
    Exited,
}

type Report = (Task, Result<Outcome>);

/// Threads sharing one cancellation token; the first error wins.
struct TaskGroup {
    token: CancellationToken,
    tx: Sender<Report>,
    rx: Receiver<Report>,
    handles: Vec<(Task, JoinHandle<()>)>,
}

impl TaskGroup {
    fn new(token: CancellationToken) -> Self {
        let (tx, rx) = unbounded();
        TaskGroup {
            token,
            tx,
            rx,
            handles: Vec::with_capacity(3),
        }
    }

    fn spawn<F>(&mut self, task: Task, f: F) -> Result<()>
    where
        F: FnOnce(&CancellationToken) -> Result<Outcome> + Send + 'static,
    {
        let tx = self.tx.clone();
        let token = self.token.clone();
        let handle = thread::Builder::new()
            .name(format!("fjsort-{}", task.name()))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| f(&token)))
                    .unwrap_or_else(|_| Err(JsortError::TaskPanicked(task.name())));
                let failed = matches!(result, Err(ref e) if !e.is_cancelled());
                // Report first: errors caused by the cancel queue behind this one.
                let _ = tx.send((task, result));
                if failed {
                    token.cancel();
                }
            });
        match handle {
            Ok(h) => {
                self.handles.push((task, h));
                Ok(())
            }
            Err(e) => {
                self.token.cancel();
                Err(e.into())
            }
        }
    }

    /// Collect every task's report and return the first real error, if any.
    fn wait(self) -> Result<PipelineStats> {
        let TaskGroup {
            token,
            tx,
            rx,
            handles,
        } = self;
        drop(tx);

        let mut pending: Vec<Task> = handles.iter().map(|(t, _)| *t).collect();
        let mut first_error: Option<JsortError> = None;
        let mut stats = PipelineStats::default();

        while !pending.is_empty() {
            let report = if first_error.is_some() && pending == [Task::Feeder] {
                match rx.recv_timeout(FEEDER_GRACE) {
                    Ok(r) => r,
                    Err(_) => {
                        log::debug!("feeder still blocked on input, detaching it");
                        break;
                    }
                }
            } else {
                match rx.recv() {
                    Ok(r) => r,
                    Err(_) => break,
                }
            };

            let (task, result) = report;
            pending.retain(|t| *t != task);
            match result {
                Ok(Outcome::Fed(fed)) => {
                    stats.records_in = fed.records;
                    stats.missing_keys = fed.missing_keys;
                }
                Ok(Outcome::Drained(n)) => stats.records_out = n,
                Ok(Outcome::Exited) => {}
                Err(e) => {
                    if !e.is_cancelled() {
                        log::debug!("{} failed: {}", task.name(), e);
                        token.cancel();
                    }
                    first_error = pick_error(first_error, e);
                }
            }
        }

        for (task, handle) in handles {
            if pending.contains(&task) {
                continue;
            }
            let _ = handle.join();
        }

        match first_error {
            Some(e) => Err(e),
            None if token.is_cancelled() => Err(JsortError::Cancelled),
            None => Ok(stats),
        }
    }
}

/// Keep the earliest real error. Cancellation fallout is dropped, except that
/// the sorter's own exit status replaces a broken pipe on its input.
fn pick_error(current: Option<JsortError>, new: JsortError) -> Option<JsortError> {
    match current {
        None if new.is_cancelled() => None,
        None => Some(new),
        Some(JsortError::SortClosedInput) if matches!(new, JsortError::SortFailed { .. }) => {
            Some(new)
        }
        Some(cur) => Some(cur),
    }
}

/// Sort `input` into `output` through the external sorter.
///
/// Spawns the sorter, then runs feeder, drainer and supervisor concurrently.
/// Output written before a failure stays written.
pub fn run_pipeline<R, W>(config: &JsortConfig, input: R, output: W) -> Result<PipelineStats>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let (process, sort_in, sort_out) = SortProcess::spawn(&config.sort)?;
    log::debug!("started {} (pid {})", config.sort.command, process.id());

    let mut group = TaskGroup::new(CancellationToken::new());

    let key_path = config.key_path.clone();
    group.spawn(Task::Feeder, move |token| {
        let mut reader = BufReader::with_capacity(PIPE_BUF_SIZE, input);
        let mut sort_in = sort_in;
        let result = feed(&mut reader, &mut sort_in, &key_path, token);
        // Cancel before the sorter can see EOF on a partial feed.
        if result.is_err() {
            token.cancel();
        }
        drop(sort_in);
        result.map(Outcome::Fed)
    })?;

    group.spawn(Task::Drainer, move |token| {
        let mut reader = BufReader::with_capacity(PIPE_BUF_SIZE, sort_out);
        let mut writer = BufWriter::with_capacity(OUTPUT_BUF_SIZE, output);
        drain(&mut reader, &mut writer, token).map(Outcome::Drained)
    })?;

    group.spawn(Task::Supervisor, move |token| {
        process.wait(token).map(|()| Outcome::Exited)
    })?;

    let stats = group.wait()?;
    log::debug!(
        "fed {} records, wrote {} records, {} missing sort keys",
        stats.records_in,
        stats.records_out,
        stats.missing_keys
    );
    Ok(stats)
}
