// blockfill/node/src/lib.rs

//! Node-side pieces of the `blockfill` binary: configuration, logging,
//! metrics export and the wiring that turns a config into a running
//! pipeline.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod pipeline;

pub use config::NodeConfig;
pub use pipeline::Pipeline;
