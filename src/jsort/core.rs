/// Feeder and drainer for fjsort.
///
/// The feeder turns input records into framed lines for the sorter, one line
/// at a time; the drainer strips frames off the sorter's output. Neither
/// buffers more than a single line, so pipe backpressure flows straight
/// through to the producer upstream.
use std::io::{self, BufRead, Write};

use super::command::SortConfig;
use super::error::{JsortError, Result};
use super::frame;
use super::key::{KeyPath, extract_key};
use super::pipeline::CancellationToken;

/// Initial capacity of the per-line buffers.
const LINE_BUF_SIZE: usize = 4096;

/// Immutable run configuration.
#[derive(Debug, Clone)]
pub struct JsortConfig {
    pub key_path: KeyPath,
    pub sort: SortConfig,
}

impl JsortConfig {
    pub fn new(key_path: KeyPath) -> Self {
        JsortConfig {
            key_path,
            sort: SortConfig::default(),
        }
    }
}

/// Counters collected by the feeder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub records: u64,
    pub missing_keys: u64,
}

/// Read records from `input`, frame them and write them to `sort_in`.
///
/// Each framed line is written as soon as it is built. A record whose key
/// path does not resolve gets a warning and an empty key. The caller closes
/// `sort_in` once this returns.
pub fn feed<R: BufRead, W: Write>(
    input: &mut R,
    sort_in: &mut W,
    key_path: &KeyPath,
    token: &CancellationToken,
) -> Result<FeedStats> {
    let mut stats = FeedStats::default();
    let mut line = Vec::with_capacity(LINE_BUF_SIZE);
    let mut framed = Vec::with_capacity(LINE_BUF_SIZE);

    loop {
        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if token.is_cancelled() {
            return Err(JsortError::Cancelled);
        }
        stats.records += 1;
        let lineno = stats.records;

        let key = extract_key(&line, key_path)
            .map_err(|source| JsortError::Parse { line: lineno, source })?;
        let key = match key {
            Some(k) => {
                log::debug!("sort key: '{}'", String::from_utf8_lossy(&k));
                k
            }
            None => {
                log::warn!("line {}: missing sort key", lineno);
                stats.missing_keys += 1;
                Vec::new()
            }
        };

        if frame::contains_frame_byte(&key) || frame::contains_frame_byte(&line) {
            return Err(JsortError::Validation { line: lineno });
        }

        framed.clear();
        frame::encode(&mut framed, &key, &line);
        sort_in.write_all(&framed).map_err(sort_write_error)?;
    }

    sort_in.flush().map_err(sort_write_error)?;
    Ok(stats)
}

/// Read framed lines from `sort_out` and write the original records to `output`.
///
/// Returns the number of records written. A line without a frame byte is a
/// protocol violation and nothing after it is written.
pub fn drain<R: BufRead, W: Write>(
    sort_out: &mut R,
    output: &mut W,
    token: &CancellationToken,
) -> Result<u64> {
    let mut count: u64 = 0;
    let mut line = Vec::with_capacity(LINE_BUF_SIZE);

    loop {
        line.clear();
        if sort_out.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if token.is_cancelled() {
            return Err(JsortError::Cancelled);
        }
        let record = frame::decode(&line)
            .ok_or(JsortError::ProtocolViolation { line: count + 1 })?;
        output.write_all(record)?;
        count += 1;
    }

    output.flush()?;
    Ok(count)
}

/// Map a write error on the sorter's stdin. EPIPE means the sorter exited early.
fn sort_write_error(e: io::Error) -> JsortError {
    if e.kind() == io::ErrorKind::BrokenPipe {
        JsortError::SortClosedInput
    } else {
        JsortError::Io(e)
    }
}
