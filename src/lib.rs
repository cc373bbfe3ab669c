//! Pure Rust async client for the [Source RCON protocol](https://developer.valvesoftware.com/wiki/Source_RCON_Protocol).
//!
//! The protocol engine — packet framing, the authentication handshake, and
//! id-correlated request/response matching with timeouts — lives in
//! [`client::Client`]; the TCP plumbing underneath it is in [`transport`].
pub mod auth;
pub mod client;
pub mod error;
pub mod ledger;
pub mod packet;
pub mod transport;
