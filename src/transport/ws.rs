//! WebSocket plumbing for the push transport.
//!
//! Wraps `tokio-tungstenite` so the rest of the crate sees a small
//! text-oriented API: a [`WsWriter`] / [`WsReader`] pair from [`connect`],
//! ready to be driven from a `tokio::select!` loop.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Frame received from the push server.
#[derive(Debug)]
pub enum WsFrame {
    /// UTF-8 text frame (every Pusher protocol message).
    Text(String),
    /// WebSocket-level ping; answer with [`WsWriter::send_pong`].
    Ping(Vec<u8>),
    /// Close frame.
    Close {
        /// Close code (1005 when the peer sent none).
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// Binary or pong frame; the push protocol never uses these.
    Other,
}

/// Write half of a push socket.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    /// Send a text frame.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Text(text.to_string()))
            .await
            .context("WebSocket send_text failed")
    }

    /// Answer a WebSocket-level ping.
    pub async fn send_pong(&mut self, data: Vec<u8>) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Pong(data))
            .await
            .context("WebSocket send_pong failed")
    }

    /// Flush and close the socket.
    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await.context("WebSocket close failed")
    }
}

/// Read half of a push socket.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

impl WsReader {
    /// Next frame, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<Result<WsFrame>> {
        let msg = self.stream.next().await?;
        Some(match msg {
            Ok(tungstenite::Message::Text(text)) => Ok(WsFrame::Text(text.to_string())),
            Ok(tungstenite::Message::Ping(data)) => Ok(WsFrame::Ping(data.to_vec())),
            Ok(tungstenite::Message::Close(frame)) => {
                let (code, reason) = frame
                    .map(|cf| (cf.code.into(), cf.reason.to_string()))
                    .unwrap_or((1005, String::new()));
                Ok(WsFrame::Close { code, reason })
            }
            Ok(_) => Ok(WsFrame::Other),
            Err(e) => Err(anyhow::anyhow!("WebSocket read error: {e}")),
        })
    }
}

/// Open a WebSocket to `url`, returning split halves.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("WebSocket connect to {url} failed"))?;

    let (sink, stream) = ws_stream.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Convert an HTTP(S) URL to the matching WS(S) scheme.
///
/// `ws://` and `wss://` pass through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_to_ws_scheme() {
        assert_eq!(http_to_ws_scheme("https://push.example.com"), "wss://push.example.com");
        assert_eq!(http_to_ws_scheme("http://localhost:6001"), "ws://localhost:6001");
        assert_eq!(http_to_ws_scheme("wss://push.example.com"), "wss://push.example.com");
        assert_eq!(http_to_ws_scheme("ws://localhost:6001"), "ws://localhost:6001");
    }

    #[tokio::test]
    async fn test_connect_unreachable_host_returns_error() {
        let result = connect("ws://127.0.0.1:1/app/key").await;
        assert!(result.is_err());
    }
}
