pub mod demo_producer;
pub mod domain;
pub mod ingest_worker;
pub mod pipeline;

pub use demo_producer::*;
pub use domain::*;
pub use ingest_worker::*;
pub use pipeline::*;
