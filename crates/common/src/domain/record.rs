use chrono::{DateTime, Utc};
use std::fmt;

/// Storage classification of a record.
///
/// Only `State` records count against the per-device retention cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordType {
    #[default]
    Event,
    State,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::Event => write!(f, "event"),
            RecordType::State => write!(f, "state"),
        }
    }
}

/// Persisted unit: one validated, encrypted device notification with its validity window
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub record_type: RecordType,
    /// Lowercase, never empty
    pub device_id: String,
    pub birth_date: DateTime<Utc>,
    pub death_date: DateTime<Utc>,
    /// Encoded (and possibly encrypted) message
    pub data: Vec<u8>,
    pub nonce: Vec<u8>,
    pub alg: String,
    pub kid: String,
}
