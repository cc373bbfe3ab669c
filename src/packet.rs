//! Encoding and decoding of the RCON wire format.
//!
//! Every packet has the same layout, all integers little-endian:
//!
//! ```text
//! [ size:i32 ][ id:i32 ][ type:i32 ][ body: UTF-8 bytes ][ 0x00 ][ 0x00 ]
//! ```
//!
//! `size` counts everything after itself: 4 bytes of id, 4 bytes of type,
//! the body, and the two trailing nulls, so `size = body.len() + 10`.

use crate::error::RconError;

/// Byte offset of the body within a frame (the size, id and type fields).
pub const HEADER_SIZE: usize = 12;

/// The packet id servers echo back in place of the request id when the
/// password is rejected.
pub const AUTH_FAILED_ID: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// SERVERDATA_AUTH
    Auth,
    /// SERVERDATA_EXECCOMMAND
    Exec,
    /// SERVERDATA_AUTH_RESPONSE. Shares the wire value 2 with [`Exec`];
    /// inbound packets always decode to this variant and the packet id
    /// disambiguates.
    ///
    /// [`Exec`]: PacketType::Exec
    AuthResponse,
    /// SERVERDATA_RESPONSE_VALUE
    Response,
    /// SERVERDATA_AUTH_FAILED_RESPONSE
    AuthFailed,
}

impl PacketType {
    pub fn to_le_bytes(&self) -> [u8; 4] {
        let type_value: i32 = match self {
            PacketType::Auth => 3,
            PacketType::Exec => 2,
            PacketType::AuthResponse => 2,
            PacketType::Response => 0,
            PacketType::AuthFailed => -1,
        };
        type_value.to_le_bytes()
    }
}

impl TryFrom<i32> for PacketType {
    type Error = RconError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(PacketType::Auth),
            2 => Ok(PacketType::AuthResponse),
            0 => Ok(PacketType::Response),
            -1 => Ok(PacketType::AuthFailed),
            _ => Err(RconError::UnknownPacketType(value)),
        }
    }
}

/// The protocol's atomic unit: one command, one response, or one handshake
/// message. Immutable once built.
#[derive(Debug, Clone)]
pub struct Packet {
    id: i32,
    packet_type: PacketType,
    body: String,
}

impl Packet {
    /// Bytes the size field counts beyond the body: id, type and the two
    /// terminating nulls.
    pub const BASE_PACKET_SIZE: i32 = 10;

    pub fn new(id: i32, packet_type: PacketType, body: impl Into<String>) -> Self {
        Packet {
            id,
            packet_type,
            body: body.into(),
        }
    }

    // Since the only one of these values that can change in length is the
    // body, the size of a packet is the byte length of the body plus 10.
    pub fn size(&self) -> i32 {
        self.body.len() as i32 + Self::BASE_PACKET_SIZE
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn body(&self) -> &str {
        self.body.as_ref()
    }

    pub fn pack(&self) -> Vec<u8> {
        // Size, ID, Type, Body, Terminator
        let mut payload = Vec::<u8>::new();
        payload.extend_from_slice(&self.size().to_le_bytes());
        payload.extend_from_slice(&self.id().to_le_bytes());
        payload.extend_from_slice(&self.packet_type().to_le_bytes());
        payload.extend_from_slice(self.body().as_bytes());
        // null terminate the body, then null terminate the empty trailing
        // string the protocol insists on
        payload.extend_from_slice(&[0, 0]);
        payload
    }

    /// Parses one framed packet, header plus body plus the two terminator
    /// bytes. The declared size must account for the whole frame.
    pub fn unpack(raw: &[u8]) -> Result<Self, RconError> {
        if raw.len() < HEADER_SIZE {
            return Err(RconError::MalformedPacket(raw.len()));
        }

        let size = i32::from_le_bytes(raw[0..4].try_into()?);
        let id = i32::from_le_bytes(raw[4..8].try_into()?);
        let raw_type = i32::from_le_bytes(raw[8..12].try_into()?);

        if size < Self::BASE_PACKET_SIZE || raw.len() != size as usize + 4 {
            return Err(RconError::SizeMismatch {
                declared: size,
                actual: raw.len(),
            });
        }

        let body = std::str::from_utf8(&raw[HEADER_SIZE..raw.len() - 2])?.to_string();

        Ok(Packet {
            id,
            packet_type: raw_type.try_into()?,
            body,
        })
    }
}
