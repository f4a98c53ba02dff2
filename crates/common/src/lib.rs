mod crypto;
pub mod domain;
mod memory;
mod proto;
pub mod telemetry;

pub use crypto::*;
pub use domain::*;
pub use memory::*;
pub use proto::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockBlacklist;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockEncrypter;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockRecordInserter;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockRetentionStore;
