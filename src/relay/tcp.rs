//! Raw stream to raw stream relay

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Relay data bidirectionally between two streams
///
/// Copies in both directions concurrently and returns as soon as either
/// direction hits EOF or an error. Both streams are shut down and dropped on
/// return, so closing one peer always closes the other.
pub async fn relay_tcp<A, B>(a: A, b: B) -> std::io::Result<(u64, u64)>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let mut a_to_b_bytes = 0;
    let mut b_to_a_bytes = 0;

    tokio::select! {
        result = tokio::io::copy(&mut a_read, &mut b_write) => {
            match result {
                Ok(bytes) => {
                    a_to_b_bytes = bytes;
                    debug!("A->B finished: {} bytes", bytes);
                }
                Err(e) => debug!("A->B error: {}", e),
            }
        }
        result = tokio::io::copy(&mut b_read, &mut a_write) => {
            match result {
                Ok(bytes) => {
                    b_to_a_bytes = bytes;
                    debug!("B->A finished: {} bytes", bytes);
                }
                Err(e) => debug!("B->A error: {}", e),
            }
        }
    }

    let _ = a_write.shutdown().await;
    let _ = b_write.shutdown().await;

    Ok((a_to_b_bytes, b_to_a_bytes))
}
