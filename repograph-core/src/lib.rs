//! repograph core library: configuration, ingest jobs, the ingest pipeline,
//! the graph store and query/export.
//!
//! The main entry point is [`pipeline::IngestPipeline`], which parses a
//! repository with `repograph-graphs` and writes the resulting call graph
//! through a [`store::GraphStore`]. [`worker::spawn_ingest`] runs it as a
//! background job.

pub mod config;
pub mod discover;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod progress;
pub mod query;
pub mod store;
pub mod worker;
