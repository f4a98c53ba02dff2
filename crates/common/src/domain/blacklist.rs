/// Deny-list of device identifiers excluded from ingestion
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Blacklist: Send + Sync {
    /// Returns the listing reason when the device is denied
    fn in_list(&self, device_id: &str) -> Option<String>;
}
