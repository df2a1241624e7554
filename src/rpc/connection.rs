//! Length-prefixed frame I/O over async streams

use super::{frame_message, RpcError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Read one length-prefixed frame; `None` on a clean end of stream
pub async fn read_message<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    max_size: u32,
) -> Result<Option<Vec<u8>>, RpcError> {
    let mut len_bytes = [0u8; 4];

    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_bytes);
    if len > max_size {
        return Err(RpcError::MessageTooLarge {
            size: len,
            max: max_size,
        });
    }

    let mut buffer = vec![0u8; len as usize];
    reader.read_exact(&mut buffer).await?;

    Ok(Some(buffer))
}

/// Write one length-prefixed frame and flush
pub async fn write_message<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), RpcError> {
    let framed = frame_message(payload);
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}
