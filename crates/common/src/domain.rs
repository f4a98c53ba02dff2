mod blacklist;
mod clock;
mod encrypter;
mod message;
mod record;
mod repository;
mod result;

pub use blacklist::*;
pub use clock::*;
pub use encrypter::*;
pub use message::*;
pub use record::*;
pub use repository::*;
pub use result::*;
