//! JSON line framing of requests and reports on the simulator link.
//!
//! One frame per line. The binary payload travels unchanged; only the
//! envelope fields are spelled out.

use crate::error::{ErrorRecord, ERROR_LOG_CAPACITY};
use crate::message::{Message, MessageError, PacketType};
use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use thiserror::Error;
use tracing::warn;

/// Sized for an ack carrying a full error log, the largest downlink frame.
pub const MAX_FRAME_SIZE: usize = 16384;

/// Upper bound on one JSON-encoded `ErrorRecord` with every field at its widest.
const MAX_ERROR_RECORD_JSON: usize = 160;

const_assert!(ERROR_LOG_CAPACITY * (MAX_ERROR_RECORD_JSON + 1) + 64 <= MAX_FRAME_SIZE);

pub type FrameBuffer = ArrayString<MAX_FRAME_SIZE>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub service_type: u8,
    pub message_type: u8,
    #[serde(default)]
    pub application_id: u16,
    #[serde(with = "serde_bytes", default)]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFrame {
    pub service_type: u8,
    pub message_type: u8,
    pub application_id: u16,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// Outcome of one request, sent back to the client that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAck {
    pub accepted: bool,
    /// Errors the request raised, oldest first.
    pub errors: Vec<ErrorRecord>,
}

/// Everything the simulator writes to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DownlinkFrame {
    Report(ReportFrame),
    Ack(RequestAck),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame exceeds the maximum frame size")]
    TooLarge,
    #[error("invalid JSON frame: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("frame payload rejected: {0}")]
    Payload(#[from] MessageError),
}

impl From<&Message> for RequestFrame {
    fn from(message: &Message) -> Self {
        Self {
            service_type: message.service_type,
            message_type: message.message_type,
            application_id: message.application_id,
            data: message.data().to_vec(),
        }
    }
}

impl RequestFrame {
    pub fn into_message(self) -> Result<Message, FrameError> {
        Ok(Message::from_payload(
            self.service_type,
            self.message_type,
            PacketType::Telecommand,
            self.application_id,
            &self.data,
        )?)
    }
}

impl From<&Message> for ReportFrame {
    fn from(message: &Message) -> Self {
        Self {
            service_type: message.service_type,
            message_type: message.message_type,
            application_id: message.application_id,
            data: message.data().to_vec(),
        }
    }
}

impl ReportFrame {
    pub fn into_message(self) -> Result<Message, FrameError> {
        Ok(Message::from_payload(
            self.service_type,
            self.message_type,
            PacketType::Telemetry,
            self.application_id,
            &self.data,
        )?)
    }
}

fn bounded(json: String) -> Result<FrameBuffer, FrameError> {
    FrameBuffer::from(&json).map_err(|_| FrameError::TooLarge)
}

fn check_line(line: &str) -> Result<&str, FrameError> {
    let line = line.trim_end();
    if line.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge);
    }
    Ok(line)
}

pub fn encode_request(request: &Message) -> Result<FrameBuffer, FrameError> {
    bounded(serde_json::to_string(&RequestFrame::from(request))?)
}

/// Parse one inbound line into a telecommand. Oversized lines are rejected before parsing.
pub fn decode_request(line: &str) -> Result<Message, FrameError> {
    let frame: RequestFrame = serde_json::from_str(check_line(line)?)?;
    frame.into_message()
}

pub fn encode_report(report: &Message) -> Result<FrameBuffer, FrameError> {
    bounded(serde_json::to_string(&ReportFrame::from(report))?)
}

pub fn decode_report(line: &str) -> Result<Message, FrameError> {
    let frame: ReportFrame = serde_json::from_str(check_line(line)?)?;
    frame.into_message()
}

pub fn encode_downlink(frame: &DownlinkFrame) -> Result<FrameBuffer, FrameError> {
    bounded(serde_json::to_string(frame)?)
}

/// Encode an ack, falling back to the bare `accepted` flag when the error
/// records do not fit in one frame.
pub fn encode_ack(ack: &RequestAck) -> Result<FrameBuffer, FrameError> {
    match encode_downlink(&DownlinkFrame::Ack(ack.clone())) {
        Err(FrameError::TooLarge) => {
            warn!(records = ack.errors.len(), "ack too large, sending it without error records");
            encode_downlink(&DownlinkFrame::Ack(RequestAck {
                accepted: ack.accepted,
                errors: Vec::new(),
            }))
        }
        result => result,
    }
}

pub fn decode_downlink(line: &str) -> Result<DownlinkFrame, FrameError> {
    Ok(serde_json::from_str(check_line(line)?)?)
}
