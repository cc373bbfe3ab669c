use thiserror::Error;

/// Possible errors for the crate.
///
/// A command that receives no response in time is *not* an error; it is
/// surfaced as `Ok(None)` by [`crate::client::Client::command`] so callers
/// can tell "no response" from "got response" without error handling.
#[derive(Error, Debug)]
pub enum RconError {
    /// Returned if we received a packet that does not have a type known to us.
    #[error("unknown rcon packet type: {0}")]
    UnknownPacketType(i32),
    /// Returned if the buffer cannot even hold the size, id and type fields.
    #[error("packet too short: {0} bytes")]
    MalformedPacket(usize),
    /// Returned if the size field disagrees with the delivered frame.
    #[error("packet size field {declared} does not match frame length {actual}")]
    SizeMismatch { declared: i32, actual: usize },
    /// Returned if the header is mangled in some way (bad offsets, incomplete
    /// response)
    #[error("packet header malformed (can't parse size, id or type)")]
    MalformedPacketHeader(#[from] std::array::TryFromSliceError),
    /// Returned if the body is mangled in some way.
    #[error("packet body malformed (not valid ascii or utf-8)")]
    MalformedPacketBody(#[from] std::str::Utf8Error),
    /// Returned if the host is down or behind a firewall.
    #[error("host cannot be reached")]
    UnreachableHost(#[source] std::io::Error),
    /// Returned if you can't remember the password, or if the server never
    /// answered the handshake in time.
    #[error("bad password")]
    AuthenticationFailed,
    /// Returned when a packet id is reused while a request on it is still
    /// outstanding. A usage error, not a protocol error.
    #[error("request id {0} is still awaiting a response")]
    DuplicateRequestId(i32),
    /// Returned when the server closes the connection under a pending call.
    #[error("connection closed by the server")]
    ConnectionClosed,
}
