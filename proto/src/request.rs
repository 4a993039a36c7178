//! SOCKS5 CONNECT request decoding.
//!
//! A request is read straight off the stream with exact framing: the decoder
//! never consumes more bytes than the header fields imply, and a read that
//! returns bytes past the end of the request is rejected instead of being
//! treated as pipelined payload.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ProtocolError, Result};

pub const SOCKS_VERSION: u8 = 0x05;
pub const CMD_CONNECT: u8 = 0x01;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

/// ver + cmd + rsv
const HEADER_LEN: usize = 3;

/// Largest possible request: header, type, length byte, 255-byte domain, port.
const MAX_REQUEST_LEN: usize = 263;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Ipv4,
    Domain,
    Ipv6,
}

impl AddressKind {
    pub fn from_byte(atyp: u8) -> std::result::Result<Self, ProtocolError> {
        match atyp {
            ATYP_IPV4 => Ok(AddressKind::Ipv4),
            ATYP_DOMAIN => Ok(AddressKind::Domain),
            ATYP_IPV6 => Ok(AddressKind::Ipv6),
            other => Err(ProtocolError::UnsupportedAddressType(other)),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            AddressKind::Ipv4 => ATYP_IPV4,
            AddressKind::Domain => ATYP_DOMAIN,
            AddressKind::Ipv6 => ATYP_IPV6,
        }
    }

    /// Length of the address block (type byte through port). `len_byte` is
    /// the byte following the type, only meaningful for domains.
    fn block_len(self, len_byte: u8) -> usize {
        match self {
            AddressKind::Ipv4 => 1 + 4 + 2,
            AddressKind::Ipv6 => 1 + 16 + 2,
            AddressKind::Domain => 1 + 1 + len_byte as usize + 2,
        }
    }
}

/// Address block exactly as it appeared on the wire: type, address, port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAddress(Bytes);

impl RawAddress {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for RawAddress {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Decoded destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub kind: AddressKind,
    pub host: String,
    pub port: u16,
}

impl Address {
    /// `block` must be a complete, length-checked address block.
    fn from_block(kind: AddressKind, block: &[u8]) -> Self {
        let port_at = block.len() - 2;
        let port = u16::from_be_bytes([block[port_at], block[port_at + 1]]);
        let host = match kind {
            AddressKind::Ipv4 => {
                let mut octets = [0u8; 4];
                octets.copy_from_slice(&block[1..5]);
                Ipv4Addr::from(octets).to_string()
            }
            AddressKind::Ipv6 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&block[1..17]);
                Ipv6Addr::from(octets).to_string()
            }
            AddressKind::Domain => String::from_utf8_lossy(&block[2..port_at]).into_owned(),
        };
        Address { kind, host, port }
    }

    /// `host:port` suitable for dialing. Hosts containing a colon are
    /// bracketed.
    pub fn host_port(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_host_port(&self.host, self.port))
    }
}

/// Combine host and port into a dialable `host:port`, bracketing hosts that
/// contain a colon (IPv6 literals).
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// One decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub raw: RawAddress,
    pub address: Address,
    /// Bytes taken off the stream, header included.
    pub consumed: usize,
}

/// Read a full SOCKS5 CONNECT request (`ver cmd rsv atyp addr port`).
pub async fn read_request<R>(reader: &mut R) -> Result<Request>
where
    R: AsyncRead + Unpin,
{
    read_framed(reader, HEADER_LEN).await
}

/// Read a bare address block (`atyp addr port`), as replayed by the agent on
/// the hop to the relay server.
pub async fn read_address<R>(reader: &mut R) -> Result<Request>
where
    R: AsyncRead + Unpin,
{
    read_framed(reader, 0).await
}

async fn read_framed<R>(reader: &mut R, offset: usize) -> Result<Request>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; MAX_REQUEST_LEN];

    // type byte plus the possible domain length byte
    let mut n = read_at_least(reader, &mut buf, offset + 2).await?;

    if offset == HEADER_LEN {
        if buf[0] != SOCKS_VERSION {
            return Err(ProtocolError::UnsupportedVersion(buf[0]).into());
        }
        if buf[1] != CMD_CONNECT {
            return Err(ProtocolError::UnsupportedCommand(buf[1]).into());
        }
    }

    let kind = AddressKind::from_byte(buf[offset])?;
    let required = offset + kind.block_len(buf[offset + 1]);

    if n < required {
        reader.read_exact(&mut buf[n..required]).await?;
        n = required;
    } else if n > required {
        return Err(ProtocolError::ExtraData {
            expected: required,
            actual: n,
        }
        .into());
    }

    let block = &buf[offset..n];
    Ok(Request {
        raw: RawAddress(Bytes::copy_from_slice(block)),
        address: Address::from_block(kind, block),
        consumed: n,
    })
}

async fn read_at_least<R>(reader: &mut R, buf: &mut [u8], min: usize) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut n = 0;
    while n < min {
        let read = reader.read(&mut buf[n..]).await?;
        if read == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        n += read;
    }
    Ok(n)
}
