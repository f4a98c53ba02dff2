use crate::domain::{Message, MessageType};
use anyhow::{Context, Result};
use prost::Message as _;
use std::collections::BTreeMap;

/// Wire code of a message type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum WireMessageType {
    Unspecified = 0,
    SimpleEvent = 1,
    State = 2,
}

/// Protobuf encoding of a [`Message`], the form stored in `Record::data`
#[derive(Clone, PartialEq, prost::Message)]
pub struct WireMessage {
    #[prost(string, tag = "1")]
    pub source: String,
    #[prost(string, tag = "2")]
    pub destination: String,
    #[prost(enumeration = "WireMessageType", tag = "3")]
    pub message_type: i32,
    #[prost(string, repeated, tag = "4")]
    pub partner_ids: Vec<String>,
    #[prost(string, tag = "5")]
    pub transaction_uuid: String,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub payload: Option<Vec<u8>>,
    #[prost(btree_map = "string, string", tag = "7")]
    pub metadata: BTreeMap<String, String>,
}

fn message_type_to_code(message_type: MessageType) -> i32 {
    match message_type {
        MessageType::SimpleEvent => WireMessageType::SimpleEvent as i32,
        MessageType::State => WireMessageType::State as i32,
        MessageType::Unsupported(code) => code,
    }
}

fn code_to_message_type(code: i32) -> MessageType {
    match WireMessageType::try_from(code) {
        Ok(WireMessageType::SimpleEvent) => MessageType::SimpleEvent,
        Ok(WireMessageType::State) => MessageType::State,
        _ => MessageType::Unsupported(code),
    }
}

/// Convert domain Message to its wire form
pub fn domain_to_wire(message: &Message) -> WireMessage {
    WireMessage {
        source: message.source.clone(),
        destination: message.destination.clone(),
        message_type: message_type_to_code(message.message_type),
        partner_ids: message.partner_ids.clone(),
        transaction_uuid: message.transaction_uuid.clone(),
        payload: message.payload.clone(),
        metadata: message.metadata.clone(),
    }
}

/// Convert wire form back to domain Message
pub fn wire_to_domain(wire: WireMessage) -> Message {
    Message {
        source: wire.source,
        destination: wire.destination,
        message_type: code_to_message_type(wire.message_type),
        partner_ids: wire.partner_ids,
        transaction_uuid: wire.transaction_uuid,
        payload: wire.payload,
        metadata: wire.metadata,
    }
}

/// Serialize a message into its compact binary form
pub fn encode_message(message: &Message) -> Vec<u8> {
    domain_to_wire(message).encode_to_vec()
}

/// Decode bytes produced by [`encode_message`]
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    let wire = WireMessage::decode(bytes).context("Failed to decode wire message")?;
    Ok(wire_to_domain(wire))
}
