// Pipeline module - canonical note-to-gesture chain, its settings record, and run tracing

pub mod builder;
pub mod settings;
pub mod trace;

pub use builder::{build_pipeline, run_pipeline, PipelineOutput};
pub use settings::{PipelineSettings, DEFAULT_MERGE_KEY_INTERVAL_MS};
pub use trace::{read_trace_file, TraceBuilder, TraceEntry, TraceError, TraceWriter};
