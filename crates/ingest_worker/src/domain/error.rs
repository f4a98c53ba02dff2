use crate::domain::RuleError;
use common::domain::{EncryptError, MessageType};
use std::fmt;
use thiserror::Error;

/// Label attached to every dropped record in `dropped_events_total`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    ParseFail,
    EncryptFail,
    DbFail,
    Blacklist,
    InvalidBirthdate,
    Expired,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::ParseFail => "parseFail",
            DropReason::EncryptFail => "encryptFail",
            DropReason::DbFail => "dbFail",
            DropReason::Blacklist => "blacklist",
            DropReason::InvalidBirthdate => "invalidBirthdate",
            DropReason::Expired => "expired",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a message did not become a record
#[derive(Error, Debug)]
pub enum RecordError {
    #[error(transparent)]
    NoMatchingRule(#[from] RuleError),

    #[error("empty device ID")]
    EmptyId,

    #[error("unexpected message type: {0}")]
    UnexpectedType(MessageType),

    #[error("device '{device_id}' is blacklisted: {reason}")]
    Blacklisted { device_id: String, reason: String },

    #[error("failed to parse payload: {0}")]
    PayloadParse(String),

    #[error("birth date is in the future")]
    FutureBirthdate,

    #[error("death date has already passed")]
    Expired,

    #[error("failed to encrypt message: {0}")]
    EncryptFailed(#[from] EncryptError),
}

impl RecordError {
    pub fn reason(&self) -> DropReason {
        match self {
            RecordError::NoMatchingRule(_)
            | RecordError::EmptyId
            | RecordError::UnexpectedType(_)
            | RecordError::PayloadParse(_) => DropReason::ParseFail,
            RecordError::Blacklisted { .. } => DropReason::Blacklist,
            RecordError::FutureBirthdate => DropReason::InvalidBirthdate,
            RecordError::Expired => DropReason::Expired,
            RecordError::EncryptFailed(_) => DropReason::EncryptFail,
        }
    }
}
