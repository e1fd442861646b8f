// sentra-agent/src/lib.rs
// Host log collection: tail -> parse -> filter -> batch -> ship, with a
// disk spool covering store outages.

pub mod config;
pub mod event;
pub mod filter;
pub mod parser;
pub mod pipeline;
pub mod reader;
pub mod sender;
pub mod spool;

pub use config::AgentConfig;
pub use event::{severity_rank, Event};
pub use filter::EventFilter;
pub use parser::Router;
pub use pipeline::{Pipeline, PipelineConfig, PipelineStats, RetryPolicy};
pub use reader::Reader;
pub use sender::{BatchSender, SendError, TcpSender};
pub use spool::{DiskSpool, SpoolError};
