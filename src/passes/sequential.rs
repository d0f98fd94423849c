// Sequential composition - runs passes in order, threading each output into the next input
// Aggregates per-pass statistics and optionally traces execution to a JSONL file

use std::collections::BTreeMap;

use super::pass::{Pass, PassError, PipelineData, Progress, Statistics};
use crate::pipeline::trace::{TraceEntry, TraceWriter};

/// Runs a list of passes one after another
///
/// Progress is reported once per pass as `index / total * 100` with the
/// description of the pass about to run. Sub-pass errors propagate unchanged.
pub struct SequentialPass {
    passes: Vec<Box<dyn Pass>>,
    statistics: BTreeMap<String, Statistics>,
    trace: Option<TraceWriter>,
}

impl SequentialPass {
    pub fn new(passes: Vec<Box<dyn Pass>>) -> Self {
        SequentialPass {
            passes,
            statistics: BTreeMap::new(),
            trace: None,
        }
    }

    /// Record a start and a completion entry for every pass
    pub fn with_trace(mut self, writer: TraceWriter) -> Self {
        self.trace = Some(writer);
        self
    }

    pub fn push(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Names of the contained passes, in run order
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Statistics of the last run, grouped by pass name
    ///
    /// Two passes with the same name share one slot; the later one wins.
    pub fn pass_statistics(&self) -> &BTreeMap<String, Statistics> {
        &self.statistics
    }

    fn record(&self, entry: TraceEntry) {
        if let Some(writer) = &self.trace {
            if let Err(e) = writer.write(&entry) {
                log::warn!("Failed to write pipeline trace to {}: {}", writer.path().display(), e);
            }
        }
    }
}

impl Pass for SequentialPass {
    fn name(&self) -> &'static str {
        "SequentialPass"
    }

    fn description(&self) -> &'static str {
        "Run passes in sequence"
    }

    fn run(&mut self, input: PipelineData, progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
        self.statistics.clear();

        let total = self.passes.len();
        let mut data = input;

        for i in 0..total {
            let (name, description) = (self.passes[i].name(), self.passes[i].description());
            let fraction = i as f64 / total as f64;
            progress.report(fraction * 100.0, description);

            if let Some(writer) = &self.trace {
                self.record(writer.entry(name).progress(fraction, description));
            }

            data = self.passes[i].run(data, &mut Progress::none())?;

            let stats = self.passes[i].statistics();
            log::debug!("{} finished: {:?}", name, stats);

            if let Some(writer) = &self.trace {
                let entry = match serde_json::to_value(&stats) {
                    Ok(value) => writer.entry(name).with_data((i + 1) as f64 / total as f64, "Completed", value),
                    Err(_) => writer.entry(name).complete("Completed"),
                };
                self.record(entry);
            }

            self.statistics.insert(name.to_string(), stats);
        }

        Ok(data)
    }

    /// Flattened as `PassName.statistic`
    fn statistics(&self) -> Statistics {
        self.statistics
            .iter()
            .flat_map(|(pass, stats)| stats.iter().map(move |(key, value)| (format!("{}.{}", pass, key), *value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{Entry, Timeline};
    use crate::passes::NopPass;
    use crate::pipeline::trace::read_trace_file;
    use tempfile::TempDir;

    /// Adds one to every value and counts entries
    struct Increment {
        seen: f64,
    }

    impl Pass for Increment {
        fn name(&self) -> &'static str {
            "Increment"
        }

        fn description(&self) -> &'static str {
            "Add one"
        }

        fn run(&mut self, input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
            let mut notes = input.into_notes(self.name())?;
            for e in notes.iter_mut() {
                e.value += 1;
            }
            self.seen = notes.len() as f64;
            Ok(notes.into())
        }

        fn statistics(&self) -> Statistics {
            Statistics::from([("seen".to_string(), self.seen)])
        }
    }

    struct Fail;

    impl Pass for Fail {
        fn name(&self) -> &'static str {
            "Fail"
        }

        fn description(&self) -> &'static str {
            "Always fails"
        }

        fn run(&mut self, _input: PipelineData, _progress: &mut Progress<'_>) -> Result<PipelineData, PassError> {
            Err(PassError::processing("Fail", "boom"))
        }
    }

    fn notes() -> PipelineData {
        let t: Timeline = vec![Entry::new(60, 0.0), Entry::new(62, 10.0)].into();
        t.into()
    }

    #[test]
    fn test_threads_output_into_input() {
        let mut seq = SequentialPass::new(vec![
            Box::new(Increment { seen: 0.0 }),
            Box::new(NopPass),
            Box::new(Increment { seen: 0.0 }),
        ]);

        let out = seq.run(notes(), &mut Progress::none()).unwrap().into_notes("test").unwrap();
        let values: Vec<i32> = out.iter().map(|e| e.value).collect();
        assert_eq!(values, vec![62, 64]);
    }

    #[test]
    fn test_reports_coarse_progress() {
        let mut seen = Vec::new();
        let mut callback = |p: f64, msg: &str| seen.push((p, msg.to_string()));
        let mut seq = SequentialPass::new(vec![Box::new(NopPass), Box::new(Increment { seen: 0.0 })]);

        seq.run(notes(), &mut Progress::new(&mut callback)).unwrap();
        assert_eq!(seen, vec![(0.0, "No-op".to_string()), (50.0, "Add one".to_string())]);
    }

    #[test]
    fn test_statistics_by_pass_name() {
        let mut seq = SequentialPass::new(vec![Box::new(Increment { seen: 0.0 }), Box::new(NopPass)]);
        seq.run(notes(), &mut Progress::none()).unwrap();

        assert_eq!(seq.pass_statistics()["Increment"]["seen"], 2.0);
        assert!(seq.pass_statistics()["NopPass"].is_empty());
        assert_eq!(seq.statistics()["Increment.seen"], 2.0);
        assert_eq!(seq.pass_names(), vec!["Increment", "NopPass"]);
    }

    #[test]
    fn test_errors_propagate() {
        let mut seq = SequentialPass::new(vec![Box::new(NopPass), Box::new(Fail), Box::new(NopPass)]);
        let err = seq.run(notes(), &mut Progress::none()).unwrap_err();

        assert!(matches!(err, PassError::Processing { pass: "Fail", .. }));
    }

    #[test]
    fn test_writes_trace() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("trace.jsonl");

        let writer = TraceWriter::new(path.clone());
        let run_id = writer.run_id();
        let mut seq = SequentialPass::new(vec![Box::new(Increment { seen: 0.0 })]).with_trace(writer);
        seq.run(notes(), &mut Progress::none()).unwrap();

        let entries = read_trace_file(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.run_id == run_id && e.stage == "Increment"));
        assert_eq!(entries[1].progress, 1.0);
        assert_eq!(entries[1].data.as_ref().unwrap()["seen"], 2.0);
    }

    #[test]
    fn test_trace_failure_does_not_abort() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("trace.jsonl");

        let mut seq = SequentialPass::new(vec![Box::new(NopPass)]).with_trace(TraceWriter::new(path));
        assert!(seq.run(notes(), &mut Progress::none()).is_ok());
    }
}
