//! WebSocket Transport
//!
//! `Dialer` backed by `tokio-tungstenite`. Tungstenite messages are mapped to
//! transport [`Frame`]s in both directions.

use async_trait::async_trait;
use futures::future;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::application::ports::{Dialer, Frame, FrameSink, FrameStream, TransportError};

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Self::Text(text.into()),
            Frame::Binary(data) => Self::Binary(data.into()),
            Frame::Ping(data) => Self::Ping(data.into()),
            Frame::Pong(data) => Self::Pong(data.into()),
            Frame::Close(reason) => Self::Close(reason.map(|reason| CloseFrame {
                code: CloseCode::Normal,
                reason: reason.into(),
            })),
        }
    }
}

/// Convert an inbound message. Raw frames never surface when reading.
fn to_frame(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(text.as_str().to_string())),
        Message::Binary(data) => Some(Frame::Binary(data.to_vec())),
        Message::Ping(data) => Some(Frame::Ping(data.to_vec())),
        Message::Pong(data) => Some(Frame::Pong(data.to_vec())),
        Message::Close(frame) => Some(Frame::Close(
            frame.map(|f| f.reason.as_str().to_string()),
        )),
        Message::Frame(_) => None,
    }
}

impl From<tungstenite::Error> for TransportError {
    fn from(error: tungstenite::Error) -> Self {
        match error {
            tungstenite::Error::Http(response) => Self::UnexpectedResponse(response.status().as_u16()),
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => Self::Closed,
            other => Self::Socket(other.to_string()),
        }
    }
}

/// Dials exchanges over WebSocket (TLS via rustls).
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteDialer;

impl TungsteniteDialer {
    /// Create a new dialer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Dialer for TungsteniteDialer {
    async fn dial(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| match TransportError::from(e) {
                TransportError::Socket(message) => TransportError::OpenFailed(message),
                other => other,
            })?;

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(TransportError::from)
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(Message::from(frame))));

        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(message) => to_frame(message).map(Ok),
                Err(e) => Some(Err(TransportError::from(e))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
