//! Preparación de jobs: scripts por job, comandos de envío y registro de
//! cada ejecución.

pub mod prepare;
pub mod record;
pub mod script;
pub mod submit;

pub use prepare::{prepare, PrepareFailure, PrepareOptions, PrepareReport, DEFAULT_PREPARE_CONCURRENCY};
pub use record::RunRecord;
pub use script::{generate, GeneratedJob, ScriptOptions};
pub use submit::{ResourceSpec, SubmitScript, Submitter};
