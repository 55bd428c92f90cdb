//! Control message and payload framing over WebSocket
//!
//! Control messages are JSON text frames. Relayed bytes are carried in
//! binary frames of at most [`MAX_WS_FRAME_PAYLOAD`] bytes; frame boundaries
//! carry no meaning and the receiver simply concatenates payloads.

use super::types::ControlMessage;
use crate::error::GatewayError;
use crate::helper::MAX_WS_FRAME_PAYLOAD;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::trace;

/// Encode a control message as a text frame
pub fn encode_control(msg: &ControlMessage) -> Result<Message, GatewayError> {
    Ok(Message::Text(serde_json::to_string(msg)?))
}

/// Decode a control message from text frame contents
pub fn decode_control(text: &str) -> Result<ControlMessage, GatewayError> {
    serde_json::from_str(text)
        .map_err(|e| GatewayError::Protocol(format!("Malformed control message: {}", e)))
}

/// Split raw bytes into binary frames no larger than the frame ceiling
pub fn binary_frames(data: &[u8]) -> impl Iterator<Item = Message> + '_ {
    data.chunks(MAX_WS_FRAME_PAYLOAD)
        .map(|chunk| Message::Binary(chunk.to_vec()))
}

/// Write a control message to the WebSocket sink
pub async fn write_control<S>(sink: &mut S, msg: &ControlMessage) -> Result<(), GatewayError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    trace!("Sending control message: {}", msg);
    sink.send(encode_control(msg)?).await?;
    Ok(())
}

/// Read the next control message from the WebSocket stream
///
/// Ping/pong frames are skipped. Returns `Ok(None)` when the peer closes.
/// A binary frame is a protocol violation here: no tunnel is established yet.
pub async fn read_control<S>(stream: &mut S) -> Result<Option<ControlMessage>, GatewayError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame? {
            Message::Text(text) => {
                let msg = decode_control(&text)?;
                trace!("Received control message: {}", msg);
                return Ok(Some(msg));
            }
            Message::Binary(data) => {
                return Err(GatewayError::Protocol(format!(
                    "Unexpected {} byte binary frame before tunnel is established",
                    data.len()
                )));
            }
            Message::Close(_) => return Ok(None),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{Action, MessageType};

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn concat(frames: impl Iterator<Item = Message>) -> (Vec<u8>, usize) {
        let mut out = Vec::new();
        let mut count = 0;
        for frame in frames {
            match frame {
                Message::Binary(data) => {
                    assert!(data.len() <= MAX_WS_FRAME_PAYLOAD);
                    out.extend_from_slice(&data);
                    count += 1;
                }
                other => panic!("unexpected frame {:?}", other),
            }
        }
        (out, count)
    }

    #[test]
    fn test_binary_frames_round_trip() {
        for (len, expected_frames) in [
            (0, 0),
            (1, 1),
            (65535, 1),
            (65536, 2),
            (131072, 3),
        ] {
            let data = payload(len);
            let (joined, count) = concat(binary_frames(&data));
            assert_eq!(joined, data, "length {}", len);
            assert_eq!(count, expected_frames, "length {}", len);
        }
    }

    #[test]
    fn test_encode_decode_control() {
        let msg = ControlMessage::connect("example.com", 443, None);
        let frame = encode_control(&msg).unwrap();
        let text = match frame {
            Message::Text(text) => text,
            other => panic!("expected text frame, got {:?}", other),
        };
        assert_eq!(decode_control(&text).unwrap(), msg);
    }

    #[test]
    fn test_decode_malformed() {
        let err = decode_control("{not json").unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_read_control_skips_pings() {
        let frames = vec![
            Ok(Message::Ping(vec![1])),
            Ok(encode_control(&ControlMessage::hello()).unwrap()),
        ];
        let mut stream = futures::stream::iter(frames);
        let msg = read_control(&mut stream).await.unwrap().unwrap();
        assert_eq!(msg.kind, MessageType::Hello);
    }

    #[tokio::test]
    async fn test_read_control_close_and_eof() {
        let mut stream = futures::stream::iter(vec![Ok(Message::Close(None))]);
        assert!(read_control(&mut stream).await.unwrap().is_none());

        let mut stream = futures::stream::iter(Vec::<Result<Message, WsError>>::new());
        assert!(read_control(&mut stream).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_control_rejects_binary() {
        let mut stream = futures::stream::iter(vec![Ok(Message::Binary(vec![0u8; 4]))]);
        let err = read_control(&mut stream).await.unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_write_control() {
        let (tx, mut rx) = futures::channel::mpsc::unbounded::<Message>();
        let mut sink = tx.sink_map_err(|_| WsError::ConnectionClosed);
        write_control(&mut sink, &ControlMessage::response(Action::Success))
            .await
            .unwrap();
        drop(sink);

        let frame = rx.next().await.unwrap();
        assert_eq!(
            frame,
            Message::Text(r#"{"type":"response","action":"success"}"#.to_string())
        );
    }
}
