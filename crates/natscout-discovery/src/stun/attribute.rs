//! STUN attributes (RFC 3489 Section 11.2)
//!
//! Attributes are decoded into owned values discriminated by their type code.
//! Every attribute is a TLV: `type:u16, length:u16, value`. No padding is
//! added after the value; RFC 3489 attributes are naturally 4-byte sized.

use crate::error::{Result, StunError};
use std::net::{Ipv4Addr, SocketAddrV4};

/// Address family byte for IPv4
const FAMILY_IPV4: u8 = 0x01;

/// Body length of an IPv4 address attribute
const ADDRESS_BODY_LEN: usize = 8;

/// CHANGE-REQUEST flag: change IP
const CHANGE_IP_FLAG: u8 = 0x04;

/// CHANGE-REQUEST flag: change port
const CHANGE_PORT_FLAG: u8 = 0x02;

/// Largest ERROR-CODE value whose class fits in three bits
const MAX_ERROR_CODE: u16 = 799;

/// Length of the MESSAGE-INTEGRITY HMAC
pub const MESSAGE_INTEGRITY_LEN: usize = 20;

/// Attribute type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    /// MAPPED-ADDRESS (0x0001)
    MappedAddress,
    /// RESPONSE-ADDRESS (0x0002)
    ResponseAddress,
    /// CHANGE-REQUEST (0x0003)
    ChangeRequest,
    /// SOURCE-ADDRESS (0x0004)
    SourceAddress,
    /// CHANGED-ADDRESS (0x0005)
    ChangedAddress,
    /// USERNAME (0x0006)
    Username,
    /// PASSWORD (0x0007)
    Password,
    /// MESSAGE-INTEGRITY (0x0008)
    MessageIntegrity,
    /// ERROR-CODE (0x0009)
    ErrorCode,
    /// UNKNOWN-ATTRIBUTES (0x000a)
    UnknownAttributes,
    /// REFLECTED-FROM (0x000b)
    ReflectedFrom,
    /// Comprehension-optional attribute (>= 0x8000) this client does not interpret
    Optional(u16),
}

impl AttributeType {
    /// Wire code
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::MappedAddress => 0x0001,
            Self::ResponseAddress => 0x0002,
            Self::ChangeRequest => 0x0003,
            Self::SourceAddress => 0x0004,
            Self::ChangedAddress => 0x0005,
            Self::Username => 0x0006,
            Self::Password => 0x0007,
            Self::MessageIntegrity => 0x0008,
            Self::ErrorCode => 0x0009,
            Self::UnknownAttributes => 0x000a,
            Self::ReflectedFrom => 0x000b,
            Self::Optional(code) => code,
        }
    }

    /// Map a wire code; `None` for unknown comprehension-required codes
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        let attr_type = match code {
            0x0001 => Self::MappedAddress,
            0x0002 => Self::ResponseAddress,
            0x0003 => Self::ChangeRequest,
            0x0004 => Self::SourceAddress,
            0x0005 => Self::ChangedAddress,
            0x0006 => Self::Username,
            0x0007 => Self::Password,
            0x0008 => Self::MessageIntegrity,
            0x0009 => Self::ErrorCode,
            0x000a => Self::UnknownAttributes,
            0x000b => Self::ReflectedFrom,
            0x8000..=0xffff => Self::Optional(code),
            _ => return None,
        };
        Some(attr_type)
    }
}

/// A decoded STUN attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StunAttribute {
    /// Client's address as seen by the server
    MappedAddress(SocketAddrV4),
    /// Where the response should be sent
    ResponseAddress(SocketAddrV4),
    /// Ask the server to answer from another IP and/or port
    ChangeRequest {
        /// Answer from the alternate IP
        change_ip: bool,
        /// Answer from the alternate port
        change_port: bool,
    },
    /// Address the response was sent from
    SourceAddress(SocketAddrV4),
    /// Server's alternate address
    ChangedAddress(SocketAddrV4),
    /// Opaque user name
    Username(Vec<u8>),
    /// Opaque password
    Password(Vec<u8>),
    /// HMAC-SHA1 over the message (carried, never verified)
    MessageIntegrity([u8; MESSAGE_INTEGRITY_LEN]),
    /// Error class/number and reason phrase
    ErrorCode {
        /// `class * 100 + number`
        code: u16,
        /// Reason phrase
        reason: String,
    },
    /// Attribute types the server did not understand
    UnknownAttributes(Vec<u16>),
    /// Identity of the requester when RESPONSE-ADDRESS was used
    ReflectedFrom(SocketAddrV4),
    /// Comprehension-optional attribute kept verbatim
    Unknown {
        /// Wire type code (>= 0x8000)
        attr_type: u16,
        /// Raw value
        value: Vec<u8>,
    },
}

impl StunAttribute {
    /// Attribute type
    #[must_use]
    pub fn attr_type(&self) -> AttributeType {
        match self {
            Self::MappedAddress(_) => AttributeType::MappedAddress,
            Self::ResponseAddress(_) => AttributeType::ResponseAddress,
            Self::ChangeRequest { .. } => AttributeType::ChangeRequest,
            Self::SourceAddress(_) => AttributeType::SourceAddress,
            Self::ChangedAddress(_) => AttributeType::ChangedAddress,
            Self::Username(_) => AttributeType::Username,
            Self::Password(_) => AttributeType::Password,
            Self::MessageIntegrity(_) => AttributeType::MessageIntegrity,
            Self::ErrorCode { .. } => AttributeType::ErrorCode,
            Self::UnknownAttributes(_) => AttributeType::UnknownAttributes,
            Self::ReflectedFrom(_) => AttributeType::ReflectedFrom,
            Self::Unknown { attr_type, .. } => AttributeType::Optional(*attr_type),
        }
    }

    /// Length of the encoded value (excluding the 4-byte TLV header)
    #[must_use]
    pub fn value_len(&self) -> usize {
        match self {
            Self::MappedAddress(_)
            | Self::ResponseAddress(_)
            | Self::SourceAddress(_)
            | Self::ChangedAddress(_)
            | Self::ReflectedFrom(_) => ADDRESS_BODY_LEN,
            Self::ChangeRequest { .. } => 4,
            Self::Username(v) | Self::Password(v) => v.len(),
            Self::MessageIntegrity(_) => MESSAGE_INTEGRITY_LEN,
            Self::ErrorCode { reason, .. } => 4 + reason.len(),
            Self::UnknownAttributes(types) => 2 * (types.len() + types.len() % 2),
            Self::Unknown { value, .. } => value.len(),
        }
    }

    /// Length on the wire including the TLV header
    #[must_use]
    pub fn wire_len(&self) -> usize {
        4 + self.value_len()
    }

    /// Append the TLV encoding to `out`
    ///
    /// # Errors
    ///
    /// Returns [`StunError::MessageTooLarge`] when the value does not fit the
    /// 16-bit length field and [`StunError::InvalidErrorCode`] for an
    /// ERROR-CODE above 799.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let value_len = u16::try_from(self.value_len()).map_err(|_| StunError::MessageTooLarge(self.wire_len()))?;
        match self {
            Self::ErrorCode { code, .. } if *code > MAX_ERROR_CODE => return Err(StunError::InvalidErrorCode(*code)),
            _ => {}
        }

        out.extend_from_slice(&self.attr_type().code().to_be_bytes());
        out.extend_from_slice(&value_len.to_be_bytes());

        match self {
            Self::MappedAddress(addr)
            | Self::ResponseAddress(addr)
            | Self::SourceAddress(addr)
            | Self::ChangedAddress(addr)
            | Self::ReflectedFrom(addr) => {
                out.push(0);
                out.push(FAMILY_IPV4);
                out.extend_from_slice(&addr.port().to_be_bytes());
                out.extend_from_slice(&addr.ip().octets());
            }
            Self::ChangeRequest {
                change_ip,
                change_port,
            } => {
                let mut flags = 0u8;
                if *change_ip {
                    flags |= CHANGE_IP_FLAG;
                }
                if *change_port {
                    flags |= CHANGE_PORT_FLAG;
                }
                out.extend_from_slice(&[0, 0, 0, flags]);
            }
            Self::Username(v) | Self::Password(v) => out.extend_from_slice(v),
            Self::MessageIntegrity(hmac) => out.extend_from_slice(hmac),
            Self::ErrorCode { code, reason } => {
                out.extend_from_slice(&[0, 0, (code / 100) as u8, (code % 100) as u8]);
                out.extend_from_slice(reason.as_bytes());
            }
            Self::UnknownAttributes(types) => {
                for t in types {
                    out.extend_from_slice(&t.to_be_bytes());
                }
                // An odd count is padded by repeating the last type
                if let (1, Some(last)) = (types.len() % 2, types.last()) {
                    out.extend_from_slice(&last.to_be_bytes());
                }
            }
            Self::Unknown { value, .. } => out.extend_from_slice(value),
        }
        Ok(())
    }

    /// Decode one attribute value
    ///
    /// # Errors
    ///
    /// Returns [`StunError::InvalidAttribute`] when the value has the wrong
    /// size or family for its type.
    pub fn decode(attr_type: AttributeType, value: &[u8]) -> Result<Self> {
        let code = attr_type.code();
        let attr = match attr_type {
            AttributeType::MappedAddress => Self::MappedAddress(decode_address(code, value)?),
            AttributeType::ResponseAddress => Self::ResponseAddress(decode_address(code, value)?),
            AttributeType::SourceAddress => Self::SourceAddress(decode_address(code, value)?),
            AttributeType::ChangedAddress => Self::ChangedAddress(decode_address(code, value)?),
            AttributeType::ReflectedFrom => Self::ReflectedFrom(decode_address(code, value)?),
            AttributeType::ChangeRequest => {
                if value.len() != 4 {
                    return Err(StunError::InvalidAttribute(code));
                }
                Self::ChangeRequest {
                    change_ip: value[3] & CHANGE_IP_FLAG != 0,
                    change_port: value[3] & CHANGE_PORT_FLAG != 0,
                }
            }
            AttributeType::Username => Self::Username(value.to_vec()),
            AttributeType::Password => Self::Password(value.to_vec()),
            AttributeType::MessageIntegrity => {
                let hmac: [u8; MESSAGE_INTEGRITY_LEN] = value
                    .try_into()
                    .map_err(|_| StunError::InvalidAttribute(code))?;
                Self::MessageIntegrity(hmac)
            }
            AttributeType::ErrorCode => {
                if value.len() < 4 {
                    return Err(StunError::InvalidAttribute(code));
                }
                let class = u16::from(value[2] & 0x07);
                let number = u16::from(value[3]);
                Self::ErrorCode {
                    code: class * 100 + number,
                    reason: String::from_utf8_lossy(&value[4..]).trim_end().to_string(),
                }
            }
            AttributeType::UnknownAttributes => {
                if value.len() % 2 != 0 {
                    return Err(StunError::InvalidAttribute(code));
                }
                Self::UnknownAttributes(
                    value
                        .chunks_exact(2)
                        .map(|c| u16::from_be_bytes([c[0], c[1]]))
                        .collect(),
                )
            }
            AttributeType::Optional(attr_type) => Self::Unknown {
                attr_type,
                value: value.to_vec(),
            },
        };
        Ok(attr)
    }
}

fn decode_address(code: u16, value: &[u8]) -> Result<SocketAddrV4> {
    if value.len() != ADDRESS_BODY_LEN || value[1] != FAMILY_IPV4 {
        return Err(StunError::InvalidAttribute(code));
    }
    let port = u16::from_be_bytes([value[2], value[3]]);
    let ip = Ipv4Addr::new(value[4], value[5], value[6], value[7]);
    Ok(SocketAddrV4::new(ip, port))
}
