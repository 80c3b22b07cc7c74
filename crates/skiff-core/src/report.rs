//! Operator feedback: per-step progress lines and per-file byte progress.
//!
//! The runner never prints directly. It reports through a [`Reporter`], so
//! the CLI can render coloured output while tests stay quiet.

use std::io::{self, Read, Write};

use crate::action::Action;

/// Why `DELETE` left a path alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Protected,
    Missing,
}

/// Byte-level progress for a single file transfer.
pub trait TransferProgress: Send {
    fn advance(&mut self, bytes: u64);
    fn finish(&mut self);
}

/// Receives run progress from the runner.
pub trait Reporter: Send + Sync {
    /// A step finished successfully.
    fn step_completed(&self, step: usize, action: &Action);

    /// Every step ran; `step` is the final counter value.
    fn run_finished(&self, step: usize);

    /// `DELETE` skipped a path on purpose.
    fn delete_skipped(&self, path: &str, reason: SkipReason);

    /// A file transfer of `total` bytes is about to start.
    fn transfer(&self, label: &str, total: u64) -> Box<dyn TransferProgress>;
}

/// Reports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

struct NoProgress;

impl TransferProgress for NoProgress {
    fn advance(&mut self, _bytes: u64) {}
    fn finish(&mut self) {}
}

impl Reporter for SilentReporter {
    fn step_completed(&self, _step: usize, _action: &Action) {}
    fn run_finished(&self, _step: usize) {}
    fn delete_skipped(&self, _path: &str, _reason: SkipReason) {}
    fn transfer(&self, _label: &str, _total: u64) -> Box<dyn TransferProgress> {
        Box::new(NoProgress)
    }
}

/// Wraps a reader and reports every chunk read.
pub struct ProgressReader<R> {
    inner: R,
    progress: Box<dyn TransferProgress>,
}

impl<R: Read> ProgressReader<R> {
    pub fn new(inner: R, progress: Box<dyn TransferProgress>) -> Self {
        Self { inner, progress }
    }

    /// Marks the transfer complete.
    pub fn finish(mut self) {
        self.progress.finish();
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.progress.advance(n as u64);
        Ok(n)
    }
}

/// Copies `reader` into `writer` through a [`ProgressReader`].
pub fn copy_with_progress<R: Read, W: Write>(
    reader: R,
    writer: &mut W,
    progress: Box<dyn TransferProgress>,
) -> io::Result<u64> {
    let mut reader = ProgressReader::new(reader, progress);
    let copied = io::copy(&mut reader, writer)?;
    writer.flush()?;
    reader.finish();
    Ok(copied)
}
