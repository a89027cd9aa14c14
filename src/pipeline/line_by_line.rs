//! Synchronous ingestion: read a line, filter it, fan it out, repeat

use {
    super::{decode_line, PipelineEngine, PipelineError, RunPhase, RunProgress, RunStats},
    std::{
        fs::File,
        io::{BufRead, BufReader},
        path::{Path, PathBuf},
        sync::Arc,
        time::Instant,
    },
};

#[derive(Debug)]
pub struct LineByLineFilter {
    engine: PipelineEngine,
    progress: Arc<RunProgress>,
    totals: RunStats,
}

impl LineByLineFilter {
    pub fn new(engine: PipelineEngine) -> Self {
        Self {
            engine,
            progress: Arc::new(RunProgress::new()),
            totals: RunStats::default(),
        }
    }

    /// Process one file. Opening or reading failures are fatal for the file;
    /// events delivered before the failure stay delivered.
    pub fn filter(&mut self, path: impl AsRef<Path>) -> Result<RunStats, PipelineError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| {
            self.progress.set_phase(RunPhase::Failed);
            PipelineError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;

        self.run_reader(BufReader::new(file), path)
    }

    /// Process any buffered source; `label` names it in errors and logs
    pub fn run_reader<R: BufRead>(
        &mut self,
        mut reader: R,
        label: impl AsRef<Path>,
    ) -> Result<RunStats, PipelineError> {
        let label = label.as_ref();
        let started = Instant::now();
        let mut stats = RunStats::default();
        let mut buf = Vec::new();

        self.progress.reset();
        self.progress.set_phase(RunPhase::Reading);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(source) => {
                    self.progress.set_phase(RunPhase::Failed);
                    self.totals += stats;
                    return Err(PipelineError::Io {
                        path: label.to_path_buf(),
                        source,
                    });
                }
            }

            self.progress.record_read();
            self.progress.record_dequeued(0);
            stats.total_lines += 1;
            if self.engine.process_line(&decode_line(&buf)) {
                stats.accepted_events += 1;
            }
        }

        self.progress.set_phase(RunPhase::Done);
        self.totals += stats;

        log::info!(
            "✅ Filtered {}: {} lines, {} events in {}ms",
            label.display(),
            stats.total_lines,
            stats.accepted_events,
            started.elapsed().as_millis()
        );
        Ok(stats)
    }

    /// Process several files in order, stopping at the first one that fails
    pub fn filter_files<I, P>(&mut self, paths: I) -> Result<RunStats, PipelineError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut combined = RunStats::default();
        for path in paths {
            let path = path.into();
            let started = Instant::now();
            let stats = self.filter(&path)?;
            combined += stats;

            let secs = started.elapsed().as_secs_f64();
            let rate = if secs > 0.0 { stats.total_lines as f64 / secs } else { 0.0 };
            log::info!("📊 {}: {:.1} lines/sec", path.display(), rate);
        }
        Ok(combined)
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
