mod admission;
mod dispatcher;
mod insert_pipeline;
mod measures;
mod pruner;

pub use admission::*;
pub use dispatcher::*;
pub use insert_pipeline::*;
pub use measures::*;
pub use pruner::*;
