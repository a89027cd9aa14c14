//! Background ingestion: reader task -> bounded queue -> single consumer
//!
//! The reader pushes raw lines into an mpsc channel and finishes with an
//! explicit `Eof` message. `send().await` parks the reader while the queue is
//! full, so memory stays bounded by the queue capacity. The consumer runs on
//! the caller's task, parks on `recv()` while the queue is empty, and stops
//! once it has seen `Eof`. One reader and one consumer on a FIFO queue keep
//! events in line order.

use {
    super::{decode_line, PipelineEngine, PipelineError, RunPhase, RunProgress, RunStats},
    crate::config::{ConfigError, DEFAULT_QUEUE_CAPACITY},
    std::{
        io,
        path::{Path, PathBuf},
        sync::Arc,
        time::Instant,
    },
    tokio::{
        fs::File,
        io::{AsyncBufRead, AsyncBufReadExt, BufReader},
        sync::mpsc,
        task::JoinHandle,
    },
};

/// Messages on the line queue
#[derive(Debug)]
enum QueueMessage {
    Line(String),
    /// Reader reached end of input
    Eof,
}

/// Aborts the reader task if the run is abandoned before it joins
struct ReaderGuard(JoinHandle<io::Result<u64>>);

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug)]
pub struct BackgroundFilter {
    engine: PipelineEngine,
    capacity: usize,
    progress: Arc<RunProgress>,
    totals: RunStats,
}

impl BackgroundFilter {
    pub fn new(engine: PipelineEngine, capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::NonPositive {
                name: "queue capacity",
                value: 0.0,
            });
        }
        Ok(Self {
            engine,
            capacity,
            progress: Arc::new(RunProgress::new()),
            totals: RunStats::default(),
        })
    }

    pub fn with_default_capacity(engine: PipelineEngine) -> Self {
        Self {
            engine,
            capacity: DEFAULT_QUEUE_CAPACITY,
            progress: Arc::new(RunProgress::new()),
            totals: RunStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Process one file; see [`run_reader`](Self::run_reader)
    pub async fn filter(&mut self, path: impl AsRef<Path>) -> Result<RunStats, PipelineError> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|source| {
            self.progress.set_phase(RunPhase::Failed);
            PipelineError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;

        self.run_reader(BufReader::new(file), path).await
    }

    /// Run the reader/consumer pair over `reader` until end of input.
    ///
    /// A read error or a reader that dies without signalling `Eof` fails the
    /// run; events already delivered to subscribers are kept.
    pub async fn run_reader<R>(
        &mut self,
        reader: R,
        label: impl AsRef<Path>,
    ) -> Result<RunStats, PipelineError>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let label = label.as_ref().to_path_buf();
        let started = Instant::now();
        log::info!("🚀 Ingesting {} (queue capacity {})", label.display(), self.capacity);

        self.progress.reset();
        self.progress.set_phase(RunPhase::Reading);

        let (tx, mut rx) = mpsc::channel::<QueueMessage>(self.capacity);
        let reader = read_lines(reader, tx, Arc::clone(&self.progress));
        let mut reader_task = ReaderGuard(tokio::spawn(reader));

        let mut stats = RunStats::default();
        let mut saw_eof = false;
        while let Some(message) = rx.recv().await {
            match message {
                QueueMessage::Line(line) => {
                    self.progress.record_dequeued(rx.len());
                    stats.total_lines += 1;
                    if self.engine.process_line(&line) {
                        stats.accepted_events += 1;
                    }
                }
                QueueMessage::Eof => {
                    saw_eof = true;
                    break;
                }
            }
        }
        drop(rx);

        let joined = (&mut reader_task.0).await;
        self.totals += stats;

        let outcome = match joined {
            Ok(Ok(_)) if saw_eof => Ok(stats),
            Ok(Ok(_)) => Err(interrupted(&label, "queue closed before end of input")),
            Ok(Err(source)) => Err(PipelineError::Io {
                path: label.clone(),
                source,
            }),
            Err(e) => Err(interrupted(&label, &e.to_string())),
        };

        match &outcome {
            Ok(stats) => {
                self.progress.set_phase(RunPhase::Done);
                self.log_completion(&label, stats, started);
            }
            Err(e) => {
                self.progress.set_phase(RunPhase::Failed);
                log::error!("❌ Ingestion of {} failed: {}", label.display(), e);
            }
        }
        outcome
    }

    /// Process several files in order, stopping at the first one that fails
    pub async fn filter_files<I, P>(&mut self, paths: I) -> Result<RunStats, PipelineError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut combined = RunStats::default();
        for path in paths {
            let path = path.into();
            let started = Instant::now();
            let stats = self.filter(&path).await?;
            combined += stats;

            let secs = started.elapsed().as_secs_f64();
            let rate = if secs > 0.0 { stats.total_lines as f64 / secs } else { 0.0 };
            log::info!("📊 {}: {:.1} lines/sec", path.display(), rate);
        }
        Ok(combined)
    }

    fn log_completion(&self, label: &Path, stats: &RunStats, started: Instant) {
        log::info!(
            "✅ Filtered {}: {} lines, {} events in {}ms",
            label.display(),
            stats.total_lines,
            stats.accepted_events,
            started.elapsed().as_millis()
        );

        let peak = self.progress.peak_queued() as usize;
        if peak > self.capacity / 2 {
            log::warn!(
                "⚠️  Line queue peaked at {}/{} ({}%)",
                peak,
                self.capacity,
                (peak * 100) / self.capacity
            );
        }
    }

    /// Totals across every run since construction or the last cleanup
    pub fn stats(&self) -> RunStats {
        self.totals
    }

    pub fn progress(&self) -> Arc<RunProgress> {
        Arc::clone(&self.progress)
    }

    pub fn engine(&self) -> &PipelineEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut PipelineEngine {
        &mut self.engine
    }

    /// Detach all subscribers and forget counters
    pub fn cleanup(&mut self) {
        self.engine.registry_mut().clear();
        self.progress.reset();
        self.totals = RunStats::default();
    }
}

fn interrupted(label: &Path, reason: &str) -> PipelineError {
    PipelineError::Interrupted {
        path: label.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Reader side: push every line, then `Eof`. Returns the number of lines sent.
async fn read_lines<R>(
    mut reader: R,
    tx: mpsc::Sender<QueueMessage>,
    progress: Arc<RunProgress>,
) -> io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let consumer_gone = || io::Error::new(io::ErrorKind::BrokenPipe, "line consumer stopped");
    let mut buf = Vec::new();
    let mut sent = 0u64;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        progress.record_read();
        tx.send(QueueMessage::Line(decode_line(&buf)))
            .await
            .map_err(|_| consumer_gone())?;
        sent += 1;
    }

    progress.set_phase(RunPhase::Draining);
    tx.send(QueueMessage::Eof).await.map_err(|_| consumer_gone())?;
    log::debug!("📖 Reader finished after {} lines", sent);
    Ok(sent)
}
