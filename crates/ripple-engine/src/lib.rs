//! Incremental hydration, affected-file queries and the
//! resolver worker

pub mod affected;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod hydrate;
pub mod tree;
pub mod worker;


#[cfg(test)]
pub mod test_utils;

pub use affected::{Affected, affected_by};
pub use config::{CONFIG_FILE, EngineConfig};
pub use coordinator::{
    InlineStrategy, ResolutionCoordinator, ResolutionMap, ResolutionMode, ResolutionStrategy,
    ThreadedStrategy,
};
pub use error::{ConfigError, EngineError, WorkerError};
pub use hydrate::{HydrationEngine, HydrationReport, missing_key};
pub use tree::DependencyTree;
pub use worker::{
    EventAggregator, WireShape, WorkerChannel, WorkerCommand, WorkerEvent, WorkerTerminator,
};
