pub mod backup;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod progress;
pub mod saver;
pub mod session;
pub mod source;

pub use backup::{BackupDocument, BackupStore, ExportOptions};
pub use compiler::ProblemCompiler;
pub use config::{ConfigLoader, Properties, SessionSettings};
pub use engine::{GreedyEngine, SearchContext, SolverEngine, StopToken};
pub use error::{Result, SolverError};
pub use model::{Model, Solution};
pub use progress::{MessageLevel, Progress};
pub use saver::{JsonSolutionSaver, SolutionSaver};
pub use session::{RequestFilter, SessionRegistry, SessionServices, SessionState, SolverSession, TeachingRequestInfo};
pub use source::{DataSource, JsonSource, MemorySource, ProblemSnapshot};
