//! Wire protocol and relay loop shared by the runnel agent and relay server.
//!
//! ```text
//! client --socks5--> agent --address block--> server --tcp--> destination
//! ```
//!
//! The agent decodes the client's CONNECT request with
//! [`request::read_request`] and replays the verbatim address block as the
//! first bytes of its connection to the server, which decodes it with
//! [`request::read_address`]. Both ends then hand their connection pair to
//! [`relay::bridge`].

pub mod error;
pub mod logging;
pub mod relay;
pub mod request;

pub use error::{Error, ProtocolError, Result};
pub use relay::{bridge, RelayConfig, SessionReport};
pub use request::{
    join_host_port, read_address, read_request, Address, AddressKind, RawAddress, Request,
};
