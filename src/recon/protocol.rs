//! Chrome native-messaging wire format: a 4-byte little-endian length prefix
//! followed by that many bytes of UTF-8 JSON.

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Hosts are not supposed to send anything near this; treat larger frames as
/// protocol corruption rather than allocating for them.
const MAX_MESSAGE_BYTES: u32 = 32 * 1024 * 1024;

pub async fn write_message<W>(writer: &mut W, message: &serde_json::Value) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(message).context("Failed to serialize host message")?;
    let len = u32::try_from(payload.len()).context("Host message too large")?;

    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one message. `Ok(None)` means the peer closed the stream cleanly
/// before a frame started; anything torn mid-frame is an error.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<serde_json::Value>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("Failed to read message length"),
    }

    let len = u32::from_le_bytes(len_buf);
    if len > MAX_MESSAGE_BYTES {
        anyhow::bail!("host message of {len} bytes exceeds the protocol limit");
    }

    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .await
        .context("Host message truncated")?;

    let message =
        serde_json::from_slice(&payload).context("Host sent invalid JSON")?;
    Ok(Some(message))
}
