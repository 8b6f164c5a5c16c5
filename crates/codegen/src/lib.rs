pub mod instrument;
pub mod optim;

pub use instrument::{add_tracer, InstrumentError};

pub use optim::{optimize, optimize_with, Pass, PipelineConfig, PipelineError, PipelineStats};
