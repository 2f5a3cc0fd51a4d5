//! Length-prefixed JSON framing for [`HubMessage`](crate::HubMessage).
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes of
//! JSON.

use crate::error::{HubError, HubResult};
use crate::protocol::HubMessage;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Reads one frame. A clean EOF before the length prefix is `Closed`.
///
/// Not cancel-safe: drive it from a dedicated task rather than a `select!`.
pub async fn read_frame<T: AsyncRead + Unpin>(io: &mut T) -> HubResult<HubMessage> {
    let mut len_bytes = [0u8; 4];
    match io.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(HubError::Closed),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(HubError::FrameTooLarge(len));
    }

    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf).await?;
    serde_json::from_slice(&buf).map_err(|e| HubError::Protocol(format!("JSON decode error: {e}")))
}

/// Writes one frame and flushes.
pub async fn write_frame<T: AsyncWrite + Unpin>(io: &mut T, message: &HubMessage) -> HubResult<()> {
    let data = serde_json::to_vec(message)?;
    if data.len() > MAX_FRAME_SIZE {
        return Err(HubError::FrameTooLarge(data.len()));
    }

    io.write_all(&(data.len() as u32).to_be_bytes()).await?;
    io.write_all(&data).await?;
    io.flush().await?;
    Ok(())
}
