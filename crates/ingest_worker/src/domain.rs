mod config;
mod error;
mod record_builder;
mod rules;

pub use config::*;
pub use error::*;
pub use record_builder::*;
pub use rules::*;
