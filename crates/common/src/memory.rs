mod in_memory_record_store;
mod static_blacklist;

pub use in_memory_record_store::*;
pub use static_blacklist::*;
