pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod identity;
pub mod ledger;
pub mod logging;
pub mod report;
pub mod routing;
pub mod scheduler;
pub mod source;

pub use config::AppConfig;
pub use error::Error;
pub use ledger::{FileRecord, Ledger};
pub use scheduler::{Engine, Signal};
