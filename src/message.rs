//! Binary report codec.
//!
//! A [`Message`] is a fixed-capacity byte buffer with an append-only write
//! cursor and an independent, rewindable read cursor. All multi-byte fields
//! are big-endian; no framing or checksum is added at this layer.

use heapless::Vec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_MESSAGE_SIZE: usize = 512;

pub type MessageData = Vec<u8, MAX_MESSAGE_SIZE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketType {
    /// Spacecraft to ground (TM)
    Telemetry,
    /// Ground to spacecraft (TC)
    Telecommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("append of {requested} bytes exceeds message capacity ({available} left)")]
    TooLarge { requested: usize, available: usize },
    #[error("read of {requested} bytes past end of message ({remaining} left)")]
    TooShort { requested: usize, remaining: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub service_type: u8,
    pub message_type: u8,
    pub packet_type: PacketType,
    pub application_id: u16,
    data: MessageData,
    read_position: usize,
}

impl Message {
    pub fn new(service_type: u8, message_type: u8, packet_type: PacketType, application_id: u16) -> Self {
        Self {
            service_type,
            message_type,
            packet_type,
            application_id,
            data: Vec::new(),
            read_position: 0,
        }
    }

    /// Telecommand addressed to `service_type`/`message_type`.
    pub fn telecommand(service_type: u8, message_type: u8) -> Self {
        Self::new(service_type, message_type, PacketType::Telecommand, 0)
    }

    /// Telemetry report produced by `service_type`.
    pub fn telemetry(service_type: u8, message_type: u8) -> Self {
        Self::new(service_type, message_type, PacketType::Telemetry, 0)
    }

    /// Rebuild a message around an already encoded payload.
    pub fn from_payload(
        service_type: u8,
        message_type: u8,
        packet_type: PacketType,
        application_id: u16,
        payload: &[u8],
    ) -> Result<Self, MessageError> {
        let mut message = Self::new(service_type, message_type, packet_type, application_id);
        message.append_bytes(payload)?;
        Ok(message)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn read_position(&self) -> usize {
        self.read_position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_position
    }

    /// Rewind the read cursor to the first byte. The write cursor is untouched.
    pub fn reset_read(&mut self) {
        self.read_position = 0;
    }

    /// True when the envelope matches the expected direction and type pair.
    pub fn is_of_type(&self, packet_type: PacketType, service_type: u8, message_type: u8) -> bool {
        self.packet_type == packet_type
            && self.service_type == service_type
            && self.message_type == message_type
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) -> Result<(), MessageError> {
        let available = self.data.capacity() - self.data.len();
        if bytes.len() > available {
            return Err(MessageError::TooLarge {
                requested: bytes.len(),
                available,
            });
        }
        // Capacity checked above
        self.data
            .extend_from_slice(bytes)
            .map_err(|()| MessageError::TooLarge { requested: bytes.len(), available })
    }

    pub fn append_u8(&mut self, value: u8) -> Result<(), MessageError> {
        self.append_bytes(&[value])
    }

    pub fn append_u16(&mut self, value: u16) -> Result<(), MessageError> {
        self.append_bytes(&value.to_be_bytes())
    }

    pub fn append_u32(&mut self, value: u32) -> Result<(), MessageError> {
        self.append_bytes(&value.to_be_bytes())
    }

    pub fn append_bool(&mut self, value: bool) -> Result<(), MessageError> {
        self.append_u8(u8::from(value))
    }

    /// IEEE-754 single precision, big-endian bit pattern.
    pub fn append_f32(&mut self, value: f32) -> Result<(), MessageError> {
        self.append_bytes(&value.to_be_bytes())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], MessageError> {
        let remaining = self.remaining();
        if N > remaining {
            return Err(MessageError::TooShort { requested: N, remaining });
        }

        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.data[self.read_position..self.read_position + N]);
        self.read_position += N;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, MessageError> {
        self.read_array::<1>().map(|[byte]| byte)
    }

    pub fn read_u16(&mut self) -> Result<u16, MessageError> {
        self.read_array().map(u16::from_be_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, MessageError> {
        self.read_array().map(u32::from_be_bytes)
    }

    /// Any non-zero byte decodes as `true`.
    pub fn read_bool(&mut self) -> Result<bool, MessageError> {
        self.read_u8().map(|byte| byte != 0)
    }

    pub fn read_f32(&mut self) -> Result<f32, MessageError> {
        self.read_array().map(f32::from_be_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_layout() {
        let mut message = Message::telemetry(3, 25);
        message.append_u8(0xAB).unwrap();
        message.append_u16(0x1234).unwrap();
        message.append_u32(0xDEAD_BEEF).unwrap();
        message.append_bool(true).unwrap();
        message.append_f32(1.0).unwrap();

        assert_eq!(
            message.data(),
            &[0xAB, 0x12, 0x34, 0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x3F, 0x80, 0x00, 0x00]
        );
    }

    #[test]
    fn test_read_cursor_independent_of_writes() {
        let mut message = Message::telecommand(3, 1);
        message.append_u16(7).unwrap();
        assert_eq!(message.read_u16().unwrap(), 7);

        message.append_u8(9).unwrap();
        assert_eq!(message.read_u8().unwrap(), 9);
        assert_eq!(message.remaining(), 0);
    }

    #[test]
    fn test_reset_read_replays_fields() {
        let mut message = Message::telecommand(3, 33);
        message.append_u8(2).unwrap();
        message.append_u8(4).unwrap();

        assert_eq!(message.read_u8().unwrap(), 2);
        assert_eq!(message.read_u8().unwrap(), 4);
        message.reset_read();
        assert_eq!(message.read_position(), 0);
        assert_eq!(message.read_u8().unwrap(), 2);
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut message = Message::telecommand(3, 1);
        message.append_u8(1).unwrap();

        let result = message.read_u32();
        assert_eq!(result, Err(MessageError::TooShort { requested: 4, remaining: 1 }));
        // Failed read leaves the cursor where it was
        assert_eq!(message.read_u8().unwrap(), 1);
    }

    #[test]
    fn test_append_past_capacity_fails() {
        let mut message = Message::telemetry(3, 10);
        for _ in 0..MAX_MESSAGE_SIZE / 4 {
            message.append_u32(0).unwrap();
        }

        assert!(matches!(message.append_u8(1), Err(MessageError::TooLarge { .. })));
        assert_eq!(message.len(), MAX_MESSAGE_SIZE);
    }

    #[test]
    fn test_bool_decoding_accepts_any_nonzero() {
        let mut message = Message::from_payload(3, 10, PacketType::Telemetry, 0, &[0, 1, 0x80]).unwrap();
        assert!(!message.read_bool().unwrap());
        assert!(message.read_bool().unwrap());
        assert!(message.read_bool().unwrap());
    }
}
