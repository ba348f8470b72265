//! STUN messages (RFC 3489 Section 11.1)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      STUN Message Type        |         Message Length        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                                                               |
//! |                    Transaction ID (128 bits)                  |
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The message length counts attribute bytes only. A message built locally
//! keeps its declared length in step with every added attribute; a decoded
//! message keeps the length exactly as received so that [`StunMessage::validate`]
//! can reconcile it with the attributes actually present.

use super::attribute::{AttributeType, StunAttribute};
use crate::error::{Result, StunError};
use rand::RngCore;
use std::fmt;
use std::net::SocketAddrV4;

/// STUN message header size (20 bytes)
pub const HEADER_SIZE: usize = 20;

/// Largest datagram the client expects to receive
pub const MAX_MESSAGE_SIZE: usize = 2048;

/// 128-bit transaction identifier
pub type TransactionId = [u8; 16];

/// STUN message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Binding Request (0x0001)
    BindingRequest,
    /// Binding Response (0x0101)
    BindingResponse,
    /// Binding Error Response (0x0111)
    BindingErrorResponse,
    /// Shared Secret Request (0x0002)
    SharedSecretRequest,
    /// Shared Secret Response (0x0102)
    SharedSecretResponse,
    /// Shared Secret Error Response (0x0112)
    SharedSecretErrorResponse,
}

impl MessageType {
    /// Wire code
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::BindingRequest => 0x0001,
            Self::BindingResponse => 0x0101,
            Self::BindingErrorResponse => 0x0111,
            Self::SharedSecretRequest => 0x0002,
            Self::SharedSecretResponse => 0x0102,
            Self::SharedSecretErrorResponse => 0x0112,
        }
    }

    /// Map a wire code
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0001 => Some(Self::BindingRequest),
            0x0101 => Some(Self::BindingResponse),
            0x0111 => Some(Self::BindingErrorResponse),
            0x0002 => Some(Self::SharedSecretRequest),
            0x0102 => Some(Self::SharedSecretResponse),
            0x0112 => Some(Self::SharedSecretErrorResponse),
            _ => None,
        }
    }

    /// Whether `self` is a legitimate answer to `request`
    #[must_use]
    pub fn answers(self, request: Self) -> bool {
        matches!(
            (request, self),
            (Self::BindingRequest, Self::BindingResponse | Self::BindingErrorResponse)
                | (
                    Self::SharedSecretRequest,
                    Self::SharedSecretResponse | Self::SharedSecretErrorResponse
                )
        )
    }

    /// Whether this is an error response
    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(self, Self::BindingErrorResponse | Self::SharedSecretErrorResponse)
    }
}

/// A STUN message: header plus ordered attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunMessage {
    message_type: MessageType,
    transaction_id: TransactionId,
    attributes: Vec<StunAttribute>,
    declared_length: usize,
}

impl StunMessage {
    /// Create an empty message
    ///
    /// A random transaction ID is generated when none is supplied.
    ///
    /// # Examples
    ///
    /// ```
    /// use natscout_discovery::stun::{MessageType, StunMessage};
    ///
    /// let a = StunMessage::new(MessageType::BindingRequest, None);
    /// let b = StunMessage::new(MessageType::BindingRequest, None);
    /// assert_ne!(a.transaction_id(), b.transaction_id());
    /// ```
    #[must_use]
    pub fn new(message_type: MessageType, transaction_id: Option<TransactionId>) -> Self {
        let transaction_id = transaction_id.unwrap_or_else(|| {
            let mut id = [0u8; 16];
            rand::thread_rng().fill_bytes(&mut id);
            id
        });

        Self {
            message_type,
            transaction_id,
            attributes: Vec::new(),
            declared_length: 0,
        }
    }

    /// Binding Request carrying a CHANGE-REQUEST attribute
    #[must_use]
    pub fn binding_request(change_ip: bool, change_port: bool) -> Self {
        let mut msg = Self::new(MessageType::BindingRequest, None);
        msg.add_attribute(StunAttribute::ChangeRequest {
            change_ip,
            change_port,
        });
        msg
    }

    /// Empty Binding Response echoing the request's transaction ID
    #[must_use]
    pub fn response_to(request: &Self) -> Self {
        Self::new(MessageType::BindingResponse, Some(request.transaction_id))
    }

    /// Binding Error Response echoing the request's transaction ID
    #[must_use]
    pub fn error_response_to(request: &Self, code: u16, reason: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageType::BindingErrorResponse, Some(request.transaction_id));
        msg.add_attribute(StunAttribute::ErrorCode {
            code,
            reason: reason.into(),
        });
        msg
    }

    /// Message type
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Transaction ID
    #[must_use]
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    /// Attributes in encounter order
    #[must_use]
    pub fn attributes(&self) -> &[StunAttribute] {
        &self.attributes
    }

    /// Header length field (as received, or as maintained while building)
    #[must_use]
    pub fn declared_length(&self) -> usize {
        self.declared_length
    }

    /// Sum of `4 + value length` over all attributes
    #[must_use]
    pub fn attributes_length(&self) -> usize {
        self.attributes.iter().map(StunAttribute::wire_len).sum()
    }

    /// Append an attribute; no deduplication
    pub fn add_attribute(&mut self, attr: StunAttribute) {
        self.declared_length += attr.wire_len();
        self.attributes.push(attr);
    }

    /// Replace the first attribute of the same type, or append
    ///
    /// The replacement may have a different encoded size.
    pub fn set_attribute(&mut self, attr: StunAttribute) {
        let attr_type = attr.attr_type();
        match self.attributes.iter_mut().find(|a| a.attr_type() == attr_type) {
            Some(existing) => {
                self.declared_length = (self.declared_length + attr.wire_len()).saturating_sub(existing.wire_len());
                *existing = attr;
            }
            None => self.add_attribute(attr),
        }
    }

    /// First attribute of the given type
    #[must_use]
    pub fn find_attribute(&self, attr_type: AttributeType) -> Option<&StunAttribute> {
        self.attributes.iter().find(|a| a.attr_type() == attr_type)
    }

    /// MAPPED-ADDRESS value
    #[must_use]
    pub fn mapped_address(&self) -> Option<SocketAddrV4> {
        match self.find_attribute(AttributeType::MappedAddress)? {
            StunAttribute::MappedAddress(addr) => Some(*addr),
            _ => None,
        }
    }

    /// CHANGED-ADDRESS value
    #[must_use]
    pub fn changed_address(&self) -> Option<SocketAddrV4> {
        match self.find_attribute(AttributeType::ChangedAddress)? {
            StunAttribute::ChangedAddress(addr) => Some(*addr),
            _ => None,
        }
    }

    /// CHANGE-REQUEST flags as `(change_ip, change_port)`
    #[must_use]
    pub fn change_request(&self) -> Option<(bool, bool)> {
        match self.find_attribute(AttributeType::ChangeRequest)? {
            StunAttribute::ChangeRequest {
                change_ip,
                change_port,
            } => Some((*change_ip, *change_port)),
            _ => None,
        }
    }

    /// ERROR-CODE value as `(code, reason)`
    #[must_use]
    pub fn error_code(&self) -> Option<(u16, &str)> {
        match self.find_attribute(AttributeType::ErrorCode)? {
            StunAttribute::ErrorCode { code, reason } => Some((*code, reason.as_str())),
            _ => None,
        }
    }

    /// Encode to wire bytes, finalising the header length
    ///
    /// # Errors
    ///
    /// Returns [`StunError::MessageTooLarge`] when the message exceeds
    /// [`MAX_MESSAGE_SIZE`], or the attribute's error when one cannot be
    /// represented on the wire.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let attributes_length = self.attributes_length();
        let total = HEADER_SIZE + attributes_length;
        if total > MAX_MESSAGE_SIZE {
            return Err(StunError::MessageTooLarge(total));
        }

        let mut bytes = Vec::with_capacity(total);
        bytes.extend_from_slice(&self.message_type.code().to_be_bytes());
        bytes.extend_from_slice(&(attributes_length as u16).to_be_bytes());
        bytes.extend_from_slice(&self.transaction_id);

        for attr in &self.attributes {
            attr.encode_into(&mut bytes)?;
        }

        Ok(bytes)
    }

    /// Decode a datagram
    ///
    /// Every attribute up to the end of the datagram is parsed, independent
    /// of the header's length field.
    ///
    /// # Errors
    ///
    /// Returns an error when the header is truncated, the type is unknown,
    /// an attribute overruns the datagram, a value is malformed, or an
    /// unknown comprehension-required attribute is present.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(StunError::MessageTooShort(bytes.len()));
        }

        let code = u16::from_be_bytes([bytes[0], bytes[1]]);
        let message_type = MessageType::from_code(code).ok_or(StunError::InvalidMessageType(code))?;
        let declared_length = usize::from(u16::from_be_bytes([bytes[2], bytes[3]]));

        let mut transaction_id = [0u8; 16];
        transaction_id.copy_from_slice(&bytes[4..HEADER_SIZE]);

        let mut attributes = Vec::new();
        let mut offset = HEADER_SIZE;

        while offset < bytes.len() {
            if offset + 4 > bytes.len() {
                return Err(StunError::AttributeOverrun { offset });
            }

            let attr_code = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
            let attr_length = usize::from(u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]));

            let value_start = offset + 4;
            let value_end = value_start + attr_length;
            if value_end > bytes.len() {
                return Err(StunError::AttributeOverrun { offset });
            }

            let attr_type =
                AttributeType::from_code(attr_code).ok_or(StunError::UnknownRequiredAttribute(attr_code))?;
            attributes.push(StunAttribute::decode(attr_type, &bytes[value_start..value_end])?);

            offset = value_end;
        }

        Ok(Self {
            message_type,
            transaction_id,
            attributes,
            declared_length,
        })
    }

    /// Integrity gate for a received response
    ///
    /// True only when the declared length reconciles with the attributes,
    /// the transaction ID matches `request`, and the type answers the
    /// request's type. MESSAGE-INTEGRITY is not checked.
    #[must_use]
    pub fn validate(&self, request: &Self) -> bool {
        self.declared_length == self.attributes_length()
            && self.transaction_id == request.transaction_id
            && self.message_type.answers(request.message_type)
    }
}

impl fmt::Display for StunMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} tid={} attrs={}",
            self.message_type,
            hex::encode(&self.transaction_id[..8]),
            self.attributes.len()
        )
    }
}
