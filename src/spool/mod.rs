//! # Spool Module
//!
//! Durable on-disk holding area for records that could not be transmitted.
//!
//! This module handles:
//! - Appending failed records to a flat text file, one per line
//! - Replaying the file in gzip-compressed batches
//! - Keeping only the lines of failed batches after a replay
//!
//! ## File Layout
//!
//! ```text
//! logs/offline_log.txt      newline-terminated records, oldest first
//! logs/offline_log.txt.tmp  failed-batch lines, only present during replay
//! ```
//!
//! Every file operation takes the same lock, so an append from the drain
//! thread can never interleave with a replay rewriting the file.

pub mod compress;

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Lines per replay batch
pub const DEFAULT_BATCH_LINES: usize = 5000;

/// Summary of one replay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Batches accepted by the callback
    pub batches_sent: usize,

    /// Batches rejected by the callback or that failed to compress
    pub batches_failed: usize,

    /// Lines in accepted batches
    pub lines_sent: usize,

    /// Lines kept in the spool for the next pass
    pub lines_retained: usize,
}

impl ReplayOutcome {
    /// True if nothing was read from the spool
    pub fn is_noop(&self) -> bool {
        self.batches_sent == 0 && self.batches_failed == 0
    }
}

/// Offline spool file
#[derive(Debug)]
pub struct Spool {
    path: PathBuf,
    tmp_path: PathBuf,
    batch_lines: usize,
    lock: Mutex<()>,
}

impl Spool {
    /// Open a spool at `path`, creating its parent directory if needed.
    ///
    /// The spool file itself is only created by the first append.
    ///
    /// # Arguments
    ///
    /// * `path` - Spool file path (e.g. `logs/offline_log.txt`)
    ///
    /// # Returns
    ///
    /// * `Result<Spool>` - Spool handle
    ///
    /// # Errors
    ///
    /// Returns error if the parent directory cannot be created
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sensor_uplink::spool::Spool;
    ///
    /// let spool = Spool::open("logs/offline_log.txt")?;
    /// spool.append("measurements A0=1.000000 1700000000")?;
    /// # Ok::<(), sensor_uplink::error::UplinkError>(())
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_batch_lines(path, DEFAULT_BATCH_LINES)
    }

    /// Open a spool with a custom replay batch size.
    ///
    /// A batch size of zero is treated as one.
    pub fn with_batch_lines(path: impl AsRef<Path>, batch_lines: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp_name = path.as_os_str().to_os_string();
        tmp_name.push(".tmp");

        Ok(Self {
            path,
            tmp_path: PathBuf::from(tmp_name),
            batch_lines: batch_lines.max(1),
            lock: Mutex::new(()),
        })
    }

    /// Spool file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Temporary file used while replaying
    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Lines per replay batch
    pub fn batch_lines(&self) -> usize {
        self.batch_lines
    }

    /// Append one record followed by a newline.
    ///
    /// The file is opened, written and closed on every call.
    ///
    /// # Errors
    ///
    /// Returns error if the record has a line break before its end, or if the
    /// file cannot be opened or written
    pub fn append(&self, record: &str) -> Result<()> {
        let is_break = |c: char| c == '\r' || c == '\n';
        let record = record.trim_end_matches(is_break);
        if record.contains(is_break) {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "record spans more than one line",
            )
            .into());
        }

        let _guard = self.lock.lock();

        let mut line = Vec::with_capacity(record.len() + 1);
        line.extend_from_slice(record.as_bytes());
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;

        debug!(path = %self.path.display(), "Record spooled");
        Ok(())
    }

    /// Number of non-blank lines currently spooled.
    ///
    /// A missing file counts as empty.
    pub fn pending_lines(&self) -> Result<usize> {
        let _guard = self.lock.lock();

        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut count = 0;
        for line in BufReader::new(file).split(b'\n') {
            if !trim_line(&line?).is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Replay the spool through `send` in compressed batches.
    ///
    /// Lines are read top to bottom, grouped into batches of
    /// [`batch_lines`](Self::batch_lines), gzip-compressed and handed to
    /// `send`. Batches for which `send` returns `false` are written to the
    /// temporary file. Afterwards the spool is either removed (every batch
    /// sent) or replaced by the temporary file (only failed lines remain).
    ///
    /// A missing or empty spool returns immediately without calling `send`
    /// or creating any file.
    ///
    /// # Arguments
    ///
    /// * `send` - Called with each compressed batch; returns true on delivery
    ///
    /// # Returns
    ///
    /// * `Result<ReplayOutcome>` - What happened to the spooled lines
    ///
    /// # Errors
    ///
    /// Returns error if the spool cannot be read, the temporary file cannot be
    /// written, or the final rename/removal fails. The spool is left in place
    /// whenever the temporary file could not be completed.
    pub fn replay<F>(&self, mut send: F) -> Result<ReplayOutcome>
    where
        F: FnMut(&[u8]) -> bool,
    {
        let _guard = self.lock.lock();

        let input = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ReplayOutcome::default()),
            Err(e) => return Err(e.into()),
        };
        if input.metadata()?.len() == 0 {
            return Ok(ReplayOutcome::default());
        }

        info!(path = %self.path.display(), "Replaying offline spool");

        let mut retained = BufWriter::new(File::create(&self.tmp_path)?);
        let mut outcome = ReplayOutcome::default();
        let mut batch: Vec<Vec<u8>> = Vec::with_capacity(self.batch_lines);

        for line in BufReader::new(input).split(b'\n') {
            let line = line?;
            let trimmed = trim_line(&line);
            if trimmed.is_empty() {
                continue;
            }
            batch.push(trimmed.to_vec());

            if batch.len() == self.batch_lines {
                self.flush_batch(&mut batch, &mut send, &mut retained, &mut outcome)?;
            }
        }
        if !batch.is_empty() {
            self.flush_batch(&mut batch, &mut send, &mut retained, &mut outcome)?;
        }

        let retained = retained.into_inner().map_err(|e| e.into_error())?;
        retained.sync_all()?;
        drop(retained);

        if outcome.batches_failed > 0 {
            fs::rename(&self.tmp_path, &self.path)?;
            warn!(
                lines_sent = outcome.lines_sent,
                lines_retained = outcome.lines_retained,
                "Spool replay finished with failures, remaining lines kept"
            );
        } else {
            fs::remove_file(&self.path)?;
            fs::remove_file(&self.tmp_path)?;
            info!(lines_sent = outcome.lines_sent, "Spool replay complete, spool emptied");
        }

        Ok(outcome)
    }

    /// Compress and send one batch, moving its lines to `retained` on failure.
    fn flush_batch<F, W>(
        &self,
        batch: &mut Vec<Vec<u8>>,
        send: &mut F,
        retained: &mut W,
        outcome: &mut ReplayOutcome,
    ) -> Result<()>
    where
        F: FnMut(&[u8]) -> bool,
        W: Write,
    {
        let delivered = match compress::compress_batch(batch.as_slice()) {
            Ok(gz) => {
                debug!(lines = batch.len(), compressed_bytes = gz.len(), "Sending spool batch");
                send(&gz)
            }
            Err(e) => {
                warn!("Failed to compress spool batch: {}", e);
                false
            }
        };

        if delivered {
            outcome.batches_sent += 1;
            outcome.lines_sent += batch.len();
        } else {
            outcome.batches_failed += 1;
            outcome.lines_retained += batch.len();
            for line in batch.iter() {
                retained.write_all(line)?;
                retained.write_all(b"\n")?;
            }
        }

        batch.clear();
        Ok(())
    }
}

/// Strip a trailing `\r` left by `split(b'\n')`.
fn trim_line(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UplinkError;
    use crate::line_protocol::{LineProtocolBuilder, Record};
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn spool_in(dir: &TempDir) -> Spool {
        Spool::open(dir.path().join("offline_log.txt")).unwrap()
    }

    fn gunzip(data: &[u8]) -> String {
        let mut out = String::new();
        GzDecoder::new(data).read_to_string(&mut out).unwrap();
        out
    }

    fn line(i: usize) -> String {
        format!("measurements,source=instrumentacao A0={}.000000 {}", i, 1_700_000_000 + i)
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("offline_log.txt");

        let spool = Spool::open(&path).unwrap();

        assert!(dir.path().join("logs").is_dir());
        assert!(!path.exists());
        assert_eq!(spool.tmp_path(), dir.path().join("logs").join("offline_log.txt.tmp"));
        assert_eq!(spool.batch_lines(), DEFAULT_BATCH_LINES);
    }

    #[test]
    fn test_append_writes_one_line_per_record() {
        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir);

        spool.append("m v=1i 1").unwrap();
        spool.append("m v=2i 2\n").unwrap();

        let contents = fs::read_to_string(spool.path()).unwrap();
        assert_eq!(contents, "m v=1i 1\nm v=2i 2\n");
        assert_eq!(spool.pending_lines().unwrap(), 2);
    }

    #[test]
    fn test_each_record_is_one_line() {
        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir);

        let mut builder = LineProtocolBuilder::new();
        builder.set_measurement("m").unwrap();
        assert!(builder.add_field_string("note", "line1\nline2").is_err());
        builder.add_field_string("note", "line1 line2").unwrap();
        builder.set_timestamp(1).unwrap();
        let record = builder.copy().unwrap();

        spool.append(record.as_str()).unwrap();
        assert_eq!(spool.pending_lines().unwrap(), 1);

        let err = spool.append("m note=\"line1\nline2\" 1").unwrap_err();
        assert!(matches!(err, UplinkError::Io(ref e) if e.kind() == ErrorKind::InvalidInput));
        assert_eq!(spool.pending_lines().unwrap(), 1);

        let mut replayed = Vec::new();
        spool
            .replay(|batch| {
                replayed.push(gunzip(batch));
                true
            })
            .unwrap();
        assert_eq!(replayed, vec!["m note=\"line1 line2\" 1\n".to_string()]);
        assert!(Record::parse(replayed[0].trim_end()).is_ok());
    }

    #[test]
    fn test_replay_missing_file_is_noop() {
        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir);
        let mut calls = 0;

        let outcome = spool
            .replay(|_| {
                calls += 1;
                true
            })
            .unwrap();

        assert!(outcome.is_noop());
        assert_eq!(calls, 0);
        assert!(!spool.path().exists());
        assert!(!spool.tmp_path().exists());
    }

    #[test]
    fn test_replay_empty_file_is_noop() {
        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir);
        File::create(spool.path()).unwrap();
        let mut calls = 0;

        let outcome = spool
            .replay(|_| {
                calls += 1;
                true
            })
            .unwrap();

        assert!(outcome.is_noop());
        assert_eq!(calls, 0);
        assert!(!spool.tmp_path().exists());
    }

    #[test]
    fn test_replay_all_success_removes_files() {
        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir);
        for i in 0..3 {
            spool.append(&line(i)).unwrap();
        }

        let mut payloads = Vec::new();
        let outcome = spool
            .replay(|gz| {
                payloads.push(gunzip(gz));
                true
            })
            .unwrap();

        assert_eq!(outcome.batches_sent, 1);
        assert_eq!(outcome.lines_sent, 3);
        assert_eq!(payloads, vec![format!("{}\n{}\n{}\n", line(0), line(1), line(2))]);
        assert!(!spool.path().exists());
        assert!(!spool.tmp_path().exists());
    }

    #[test]
    fn test_replay_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir);
        fs::write(spool.path(), "a v=1i 1\n\n\r\nb v=2i 2\r\n\n").unwrap();

        let mut payload = String::new();
        spool
            .replay(|gz| {
                payload = gunzip(gz);
                true
            })
            .unwrap();

        assert_eq!(payload, "a v=1i 1\nb v=2i 2\n");
    }

    #[test]
    fn test_replay_second_batch_failure_keeps_only_that_batch() {
        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir);
        let all: String = (0..12_000).map(|i| format!("{}\n", line(i))).collect();
        fs::write(spool.path(), all).unwrap();

        let mut call = 0;
        let mut batch_sizes = Vec::new();
        let outcome = spool
            .replay(|gz| {
                call += 1;
                batch_sizes.push(gunzip(gz).lines().count());
                call != 2
            })
            .unwrap();

        assert_eq!(batch_sizes, vec![5000, 5000, 2000]);
        assert_eq!(outcome.batches_sent, 2);
        assert_eq!(outcome.batches_failed, 1);
        assert_eq!(outcome.lines_sent, 7000);
        assert_eq!(outcome.lines_retained, 5000);

        let remaining = fs::read_to_string(spool.path()).unwrap();
        let expected: String = (5000..10_000).map(|i| format!("{}\n", line(i))).collect();
        assert_eq!(remaining, expected);
        assert!(!spool.tmp_path().exists());
    }

    #[test]
    fn test_replay_retained_lines_are_retried_next_pass() {
        let dir = TempDir::new().unwrap();
        let spool = Spool::with_batch_lines(dir.path().join("spool.txt"), 2).unwrap();
        for i in 0..5 {
            spool.append(&line(i)).unwrap();
        }

        let first = spool.replay(|_| false).unwrap();
        assert_eq!(first.batches_failed, 3);
        assert_eq!(spool.pending_lines().unwrap(), 5);

        let second = spool.replay(|_| true).unwrap();
        assert_eq!(second.lines_sent, 5);
        assert!(!spool.path().exists());
    }

    #[test]
    fn test_append_after_replay_starts_fresh_file() {
        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir);
        spool.append("old v=1i 1").unwrap();
        spool.replay(|_| true).unwrap();

        spool.append("new v=2i 2").unwrap();
        assert_eq!(fs::read_to_string(spool.path()).unwrap(), "new v=2i 2\n");
    }

    #[test]
    fn test_zero_batch_lines_is_clamped() {
        let dir = TempDir::new().unwrap();
        let spool = Spool::with_batch_lines(dir.path().join("s.txt"), 0).unwrap();
        assert_eq!(spool.batch_lines(), 1);
    }
}
