use std::collections::BTreeMap;
use std::fmt;

/// Kind of notification carried by an inbound [`Message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    SimpleEvent,
    State,
    /// Any other message kind, kept with its raw wire code
    Unsupported(i32),
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::SimpleEvent => write!(f, "simple_event"),
            MessageType::State => write!(f, "state"),
            MessageType::Unsupported(code) => write!(f, "unsupported({})", code),
        }
    }
}

/// Inbound device notification envelope as delivered by the upstream notifier
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub source: String,
    pub destination: String,
    pub message_type: MessageType,
    pub partner_ids: Vec<String>,
    pub transaction_uuid: String,
    /// Raw payload, usually a JSON document; `None` when the sender attached nothing
    pub payload: Option<Vec<u8>>,
    pub metadata: BTreeMap<String, String>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            source: String::new(),
            destination: String::new(),
            message_type: MessageType::SimpleEvent,
            partner_ids: Vec::new(),
            transaction_uuid: String::new(),
            payload: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// A message accepted at the boundary, stamped with its admission time.
///
/// The admission time only feeds the processing latency histogram.
#[derive(Debug, Clone)]
pub struct AdmittedItem {
    pub message: Message,
    pub admitted_at: tokio::time::Instant,
}

impl AdmittedItem {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            admitted_at: tokio::time::Instant::now(),
        }
    }
}
