pub mod batch;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod media;
pub mod paths;
pub mod platform;
pub mod poller;
pub mod policy;
pub mod progress;
pub mod signal;
pub mod transfer;

pub use batch::BatchSummary;
pub use config::{AppConfig, CleanupMode};
pub use daemon::Daemon;
pub use engine::{CycleReport, Engine};
pub use error::Error;
pub use ledger::Ledger;
pub use lock::InstanceLock;
pub use paths::PathTranslator;
pub use progress::{ProgressReporter, SilentReporter};
pub use transfer::{DemoteOutcome, Mover, PromoteOutcome};
