//! Consensus benchmarking engine.
//!
//! Responders claim to index a range of blocks for a network. Nothing they claim can be checked
//! against ground truth, so the engine compares responders with each other instead:
//!
//! 1. [`cohort`]: responders of a network are clustered by their claimed coverage, and each
//!    cluster gets a safe interval that every member claims to serve.
//! 2. [`chunk`]: cohort members are shuffled and split into small chunks.
//! 3. [`query`]: a randomized query over a sub-range of the safe interval is synthesized.
//! 4. [`probe`]: every member of a chunk is sent the same query.
//! 5. [`consensus`]: the most common answer of a chunk is taken as the truth, and each
//!    responder is judged against it.
//!
//! [`BenchmarkEngine::run_pass`] runs all of the above and returns a [`PassReport`].

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod chunk;
pub mod cohort;
pub mod consensus;
mod metrics;
pub mod pass;
pub mod probe;
pub mod query;
pub mod report;

pub use pass::BenchmarkEngine;
pub use probe::{ProbeOutcome, ProbeTransport, TransportError};
pub use report::{Diagnostic, PassReport, VerdictFold};
