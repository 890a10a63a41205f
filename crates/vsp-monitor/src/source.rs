//! Device line sources for the monitor binary

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError, Receiver};
use tracing::{debug, info, warn};
use vsp_core::{ChannelMap, Clock, SamplePacer, SampleSource, VspError, VspResult};

/// Recorded capture played back at its nominal sample rate
pub struct ReplaySource {
    name: String,
    lines: Vec<String>,
    position: usize,
    loop_playback: bool,
    clock: Arc<dyn Clock>,
    pacer: SamplePacer,
    closed: bool,
}

impl ReplaySource {
    /// Load a CSV capture; rows the layout cannot decode are skipped up front
    pub fn open(
        path: impl AsRef<Path>,
        map: &ChannelMap,
        sample_rate_hz: f64,
        clock: Arc<dyn Clock>,
    ) -> VspResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let source = Self::from_text(&text, map, sample_rate_hz, clock)?;

        info!(
            path = %path.display(),
            samples = source.len(),
            seconds = source.len() as f64 / sample_rate_hz,
            "Capture loaded"
        );
        Ok(source.named(path))
    }

    /// Build from in-memory CSV text
    pub fn from_text(
        text: &str,
        map: &ChannelMap,
        sample_rate_hz: f64,
        clock: Arc<dyn Clock>,
    ) -> VspResult<Self> {
        let mut skipped = 0usize;
        let lines: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| {
                let ok = map.parse(line).is_ok();
                if !ok {
                    skipped += 1;
                }
                ok
            })
            .map(String::from)
            .collect();

        if skipped > 0 {
            warn!(skipped, "Skipped undecodable rows in capture");
        }
        if lines.is_empty() {
            return Err(VspError::Source {
                source_name: "replay".to_string(),
                reason: "capture contains no decodable rows".to_string(),
            });
        }

        Ok(ReplaySource {
            name: "replay".to_string(),
            lines,
            position: 0,
            loop_playback: false,
            clock,
            pacer: SamplePacer::new(sample_rate_hz),
            closed: false,
        })
    }

    fn named(mut self, path: &Path) -> Self {
        self.name = PathBuf::from(path).display().to_string();
        self
    }

    /// Start over at the first row when the capture ends
    pub fn with_loop(mut self, loop_playback: bool) -> Self {
        self.loop_playback = loop_playback;
        self
    }

    /// Rows in the capture
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl SampleSource for ReplaySource {
    fn poll_lines(&mut self, out: &mut Vec<String>) -> VspResult<usize> {
        if self.closed {
            return Ok(0);
        }

        let due = self.pacer.due(self.clock.now());
        let mut emitted = 0;
        while emitted < due {
            if self.position >= self.lines.len() {
                if !self.loop_playback {
                    break;
                }
                debug!("Capture rewound");
                self.position = 0;
            }
            out.push(self.lines[self.position].clone());
            self.position += 1;
            emitted += 1;
        }
        Ok(emitted)
    }

    fn is_exhausted(&self) -> bool {
        self.closed || (!self.loop_playback && self.position >= self.lines.len())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Lines buffered between the reader thread and the producer before new
/// lines are dropped; forty seconds of a 100 Hz device
pub const DEFAULT_READER_CAPACITY: usize = 4096;

/// Lines read from a blocking reader (stdin, a piped serial port) on a
/// background thread and handed over without blocking.
///
/// The hand-over queue is bounded. When the producer falls behind, the
/// newest lines are dropped and counted rather than buffered.
pub struct ReaderSource {
    name: String,
    receiver: Option<Receiver<String>>,
    dropped: Arc<AtomicU64>,
    dropped_reported: u64,
    finished: bool,
}

impl ReaderSource {
    pub fn spawn<R>(name: impl Into<String>, reader: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        Self::with_capacity(name, reader, DEFAULT_READER_CAPACITY)
    }

    /// Reader with an explicit queue capacity in lines
    pub fn with_capacity<R>(name: impl Into<String>, reader: R, capacity: usize) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let name = name.into();
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let thread_dropped = dropped.clone();
        let thread_name = name.clone();

        // A plain thread: a read blocked on an idle stdin must not hold up
        // runtime shutdown the way a blocking-pool task would
        thread::spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => match sender.try_send(line) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            thread_dropped.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(TrySendError::Closed(_)) => break,
                    },
                    Err(e) => {
                        // Non UTF-8 noise on a serial line; keep reading
                        debug!(source = %thread_name, error = %e, "Unreadable line");
                        if e.kind() != std::io::ErrorKind::InvalidData {
                            break;
                        }
                    }
                }
            }
            debug!(source = %thread_name, "Reader finished");
        });

        ReaderSource {
            name,
            receiver: Some(receiver),
            dropped,
            dropped_reported: 0,
            finished: false,
        }
    }

    /// Standard input
    pub fn stdin() -> Self {
        Self::spawn("stdin", std::io::BufReader::new(std::io::stdin()))
    }

    /// Lines discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl SampleSource for ReaderSource {
    fn poll_lines(&mut self, out: &mut Vec<String>) -> VspResult<usize> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Ok(0);
        };

        let mut count = 0;
        loop {
            match receiver.try_recv() {
                Ok(line) => {
                    out.push(line);
                    count += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.finished = true;
                    break;
                }
            }
        }

        let dropped = self.dropped();
        if dropped > self.dropped_reported {
            warn!(
                source = %self.name,
                dropped = dropped - self.dropped_reported,
                total_dropped = dropped,
                "Input queue full, lines dropped"
            );
            self.dropped_reported = dropped;
        }
        Ok(count)
    }

    fn is_exhausted(&self) -> bool {
        self.finished || self.receiver.is_none()
    }

    fn close(&mut self) {
        // Dropping the receiver stops the reader at its next line
        self.receiver = None;
    }

    fn name(&self) -> &str {
        &self.name
    }
}
