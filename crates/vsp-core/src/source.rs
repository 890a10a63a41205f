//! External sample source abstraction
//!
//! Anything that yields device lines (serial bridge, file replay, simulator)
//! implements [`SampleSource`]. Polling never blocks: a source hands over
//! whatever is buffered right now and returns.

use crate::error::VspResult;
use std::collections::VecDeque;

/// Non-blocking producer of raw device lines
pub trait SampleSource: Send {
    /// Append every line currently available to `out`, returning how many
    /// were added
    fn poll_lines(&mut self, out: &mut Vec<String>) -> VspResult<usize>;

    /// True once the source will never yield more lines
    fn is_exhausted(&self) -> bool {
        false
    }

    /// Release the underlying handle
    fn close(&mut self) {}

    /// Human readable identifier used in logs
    fn name(&self) -> &str;
}

/// In-memory source handing out fixed-size batches
#[derive(Debug, Clone)]
pub struct VecSource {
    lines: VecDeque<String>,
    batch_size: usize,
    closed: bool,
}

impl VecSource {
    /// Create a source that returns at most `batch_size` lines per poll
    pub fn new<I, S>(lines: I, batch_size: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VecSource {
            lines: lines.into_iter().map(Into::into).collect(),
            batch_size: batch_size.max(1),
            closed: false,
        }
    }

    /// Whether [`SampleSource::close`] was called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Lines not yet handed out
    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl SampleSource for VecSource {
    fn poll_lines(&mut self, out: &mut Vec<String>) -> VspResult<usize> {
        let count = self.batch_size.min(self.lines.len());
        out.extend(self.lines.drain(..count));
        Ok(count)
    }

    fn is_exhausted(&self) -> bool {
        self.lines.is_empty()
    }

    fn close(&mut self) {
        self.closed = true;
        self.lines.clear();
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_source_batches() {
        let mut source = VecSource::new(vec!["1,2", "3,4", "5,6"], 2);
        let mut out = Vec::new();

        assert_eq!(source.poll_lines(&mut out).unwrap(), 2);
        assert!(!source.is_exhausted());
        assert_eq!(source.poll_lines(&mut out).unwrap(), 1);
        assert!(source.is_exhausted());
        assert_eq!(source.poll_lines(&mut out).unwrap(), 0);

        assert_eq!(out, vec!["1,2", "3,4", "5,6"]);
    }

    #[test]
    fn test_close_drops_pending_lines() {
        let mut source = VecSource::new(vec!["1,2"; 10], 3);
        source.close();
        assert!(source.is_closed());
        assert_eq!(source.remaining(), 0);
    }
}
