use crate::domain::{RecordError, Rule};
use chrono::{DateTime, Utc};
use common::domain::{Blacklist, Clock, Encrypter, Message, MessageType, Record, RecordType};
use common::encode_message;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

pub const PAYLOAD_TOO_BIG: &str = "payload provided exceeds size limit - too big to store";
pub const METADATA_TOO_BIG: &str = "metadata provided exceeds size limit - too big to store";

const TIMESTAMP_FIELD: &str = "ts";
const ERROR_KEY: &str = "error";

/// Limits applied to every record regardless of the matched rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLimits {
    pub default_ttl: Duration,
    pub payload_max_size: usize,
    pub metadata_max_size: usize,
}

/// Turns an admitted message into a validated, encrypted [`Record`]
pub struct RecordBuilder {
    blacklist: Arc<dyn Blacklist>,
    encrypter: Arc<dyn Encrypter>,
    clock: Arc<dyn Clock>,
    limits: RecordLimits,
}

impl RecordBuilder {
    pub fn new(
        blacklist: Arc<dyn Blacklist>,
        encrypter: Arc<dyn Encrypter>,
        clock: Arc<dyn Clock>,
        limits: RecordLimits,
    ) -> Self {
        Self {
            blacklist,
            encrypter,
            clock,
            limits,
        }
    }

    /// Validate `message` against `rule` and encrypt it.
    ///
    /// Steps run in a fixed order: identity, type, deny-list, time window,
    /// trimming, encoding, encryption. The first failing step decides the error.
    #[instrument(
        level = "debug",
        skip(self, message, rule),
        fields(destination = %message.destination, message_type = %message.message_type)
    )]
    pub fn build_record(
        &self,
        message: &Message,
        rule: &Rule,
        declared_type: RecordType,
    ) -> Result<Record, RecordError> {
        let device_id = derive_device_id(&message.destination, &message.source)
            .ok_or(RecordError::EmptyId)?;

        if !matches!(
            message.message_type,
            MessageType::SimpleEvent | MessageType::State
        ) {
            return Err(RecordError::UnexpectedType(message.message_type));
        }

        if let Some(reason) = self.blacklist.in_list(&device_id) {
            return Err(RecordError::Blacklisted { device_id, reason });
        }

        let now = self.clock.now();
        let birth_date = birth_date(message.payload.as_deref(), now)?;
        let ttl = if rule.ttl().is_zero() {
            self.limits.default_ttl
        } else {
            rule.ttl()
        };
        let death_date = death_date(birth_date, ttl);

        if birth_date > now {
            return Err(RecordError::FutureBirthdate);
        }
        if death_date <= now {
            return Err(RecordError::Expired);
        }

        let trimmed = self.trim(message, rule.store_payload());
        let encrypted = self.encrypter.encrypt_message(&encode_message(&trimmed))?;

        debug!(device_id = %device_id, %birth_date, %death_date, "record built");

        Ok(Record {
            record_type: declared_type,
            device_id,
            birth_date,
            death_date,
            data: encrypted.ciphertext,
            nonce: encrypted.nonce,
            alg: encrypted.alg,
            kid: encrypted.kid,
        })
    }

    fn trim(&self, message: &Message, store_payload: bool) -> Message {
        let mut trimmed = message.clone();

        let payload_len = trimmed.payload.as_ref().map_or(0, Vec::len);
        if !store_payload || payload_len > self.limits.payload_max_size {
            trimmed.payload = None;
            trimmed.metadata = error_metadata(PAYLOAD_TOO_BIG);
        }

        // Checked against whatever metadata survived the payload step
        if metadata_size(&trimmed.metadata) > self.limits.metadata_max_size {
            trimmed.metadata = error_metadata(METADATA_TOO_BIG);
        }

        trimmed
    }
}

/// Storage type for a message kind. Only `State` messages count toward retention.
pub fn record_type_for(message_type: MessageType) -> RecordType {
    match message_type {
        MessageType::State => RecordType::State,
        _ => RecordType::Event,
    }
}

/// Device identity from the destination path, falling back to the source.
///
/// The destination's trailing component names the event and is dropped; the
/// last non-empty segment left over is the device.
pub fn derive_device_id(destination: &str, source: &str) -> Option<String> {
    let device_path = match destination.rfind('/') {
        Some(idx) => &destination[..idx],
        None => destination,
    };
    let from_destination = device_path
        .rsplit('/')
        .map(str::trim)
        .find(|segment| !segment.is_empty())
        .unwrap_or_default();

    if !from_destination.is_empty() {
        return Some(from_destination.to_lowercase());
    }
    // Source is taken as-is; only a literally empty one has no identity
    (!source.is_empty()).then(|| source.to_lowercase())
}

fn birth_date(payload: Option<&[u8]>, now: DateTime<Utc>) -> Result<DateTime<Utc>, RecordError> {
    let Some(payload) = payload else {
        return Ok(now);
    };

    let value: Value =
        serde_json::from_slice(payload).map_err(|e| RecordError::PayloadParse(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| RecordError::PayloadParse("payload is not a JSON object".to_string()))?;

    match object.get(TIMESTAMP_FIELD) {
        None => Ok(now),
        Some(Value::String(ts)) => DateTime::parse_from_rfc3339(ts)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| RecordError::PayloadParse(format!("invalid ts '{}': {}", ts, e))),
        Some(other) => Err(RecordError::PayloadParse(format!(
            "ts must be a string, got {}",
            other
        ))),
    }
}

fn death_date(birth_date: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| birth_date.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn metadata_size(metadata: &BTreeMap<String, String>) -> usize {
    serde_json::to_vec(metadata).map_or(usize::MAX, |encoded| encoded.len())
}

fn error_metadata(message: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(ERROR_KEY.to_string(), message.to_string())])
}
