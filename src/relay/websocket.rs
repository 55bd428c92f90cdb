//! Raw stream to WebSocket relay
//!
//! Bytes read from the raw stream leave as binary frames of at most
//! [`MAX_WS_FRAME_PAYLOAD`](crate::helper::MAX_WS_FRAME_PAYLOAD) bytes;
//! binary frames arriving from the tunnel are written to the raw stream in
//! order. Text frames stay available for control messages while relaying.

use crate::error::GatewayError;
use crate::helper::DEFAULT_BUFFER_SIZE;
use crate::protocol::{
    binary_frames, decode_control, write_control, Action, ControlMessage, MessageType,
};
use bytes::BytesMut;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

/// Which end of the tunnel runs the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelEnd {
    /// Client-facing gateway; raw side is the application connection
    Local,
    /// Relay gateway; raw side is the target connection. Answers echo requests.
    Remote,
}

type WsSink<W> = Mutex<SplitSink<WebSocketStream<W>, Message>>;

/// Relay between a raw stream and an established tunnel
///
/// Returns when either side closes or fails; the other side is then closed
/// too (a Close frame for the tunnel, a shutdown for the raw stream).
pub async fn relay_ws<S, W>(
    raw: S,
    ws: WebSocketStream<W>,
    end: TunnelEnd,
) -> Result<(), GatewayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncRead + AsyncWrite + Unpin,
{
    let (mut raw_read, mut raw_write) = tokio::io::split(raw);
    let (sink, mut stream) = ws.split();
    // Echo answers and relayed payload share one sink
    let sink: WsSink<W> = Mutex::new(sink);

    let upstream = async {
        let mut buf = BytesMut::with_capacity(DEFAULT_BUFFER_SIZE);
        let mut total = 0u64;
        loop {
            buf.clear();
            let n = raw_read.read_buf(&mut buf).await?;
            if n == 0 {
                break;
            }
            total += n as u64;

            let mut sink = sink.lock().await;
            for frame in binary_frames(&buf) {
                sink.feed(frame).await?;
            }
            sink.flush().await?;
        }
        Ok::<u64, GatewayError>(total)
    };

    let downstream = async {
        let mut total = 0u64;
        while let Some(message) = stream.next().await {
            match message? {
                Message::Binary(data) => {
                    raw_write.write_all(&data).await?;
                    raw_write.flush().await?;
                    total += data.len() as u64;
                }
                Message::Text(text) => handle_control(&text, end, &sink).await?,
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok::<u64, GatewayError>(total)
    };

    let result = tokio::select! {
        result = upstream => {
            match &result {
                Ok(bytes) => debug!("{:?} raw->ws finished: {} bytes", end, bytes),
                Err(e) => debug!("{:?} raw->ws error: {}", end, e),
            }
            result
        }
        result = downstream => {
            match &result {
                Ok(bytes) => debug!("{:?} ws->raw finished: {} bytes", end, bytes),
                Err(e) => debug!("{:?} ws->raw error: {}", end, e),
            }
            result
        }
    };

    let mut sink = sink.into_inner();
    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
    let _ = raw_write.shutdown().await;

    result.map(|_| ())
}

/// Handle a text frame received while relaying
async fn handle_control<W>(
    text: &str,
    end: TunnelEnd,
    sink: &WsSink<W>,
) -> Result<(), GatewayError>
where
    W: AsyncRead + AsyncWrite + Unpin,
{
    let msg = decode_control(text)?;
    if end == TunnelEnd::Remote && msg.is(MessageType::Request, Action::Echo) {
        let mut sink = sink.lock().await;
        return write_control(&mut *sink, &ControlMessage::echo_response(&msg)).await;
    }
    debug!("Ignoring control message while relaying: {}", msg);
    Ok(())
}
