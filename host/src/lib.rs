pub mod backfill;
pub mod catalog;
pub mod config;
pub mod error;
pub mod live;
pub mod shutdown;
pub mod snapshot;
pub mod source;

pub use config::Config;
pub use error::SourceError;
pub use shutdown::Shutdown;
pub use source::{BlockSource, RpcBlockSource};
