use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Bytes of the method-selection message read before replying. The content
/// is not inspected.
pub const GREETING_LEN: usize = 16;

/// Version 5, no authentication.
pub const METHOD_REPLY: [u8; 2] = [0x05, 0x00];

/// Success reply sent once the hop to the relay server is up. The bound
/// address is always 0.0.0.0:2115, whatever was actually negotiated.
pub const CONNECT_REPLY: [u8; 10] = [0x05, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x08, 0x43];

/// Handshake phase: take one read of the greeting and select "no
/// authentication" unconditionally.
pub(crate) async fn accept_greeting<S>(client: &mut S) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut greeting = [0u8; GREETING_LEN];
    let n = client.read(&mut greeting).await?;
    trace!(greeting = %hex::encode(&greeting[..n]), "method selection");

    client.write_all(&METHOD_REPLY).await
}

pub(crate) async fn send_connect_reply<S>(client: &mut S) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    client.write_all(&CONNECT_REPLY).await
}
