pub mod config;
pub mod logging;

pub mod artifact;
pub mod catalog;
pub mod gate;
pub mod http;
pub mod job;
pub mod ledger;
pub mod pipeline;
pub mod pool;
pub mod reaper;
pub mod relay;
pub mod retry;
pub mod source;
pub mod store;
pub mod stream;

pub use job::{ObjectId, Priority};
pub use pipeline::Pipeline;
