//! WebSocket transport over `tokio-tungstenite`.
//!
//! `wss://` targets need the `tls` feature; without it the handshake fails
//! and the supervisor treats that like any other refused connection.

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use url::Url;

use super::{CloseFuture, ConnectFuture, Connection, Connector, Frame, RecvFuture, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: &Url) -> ConnectFuture {
        let target = url.to_string();
        Box::pin(async move {
            let (stream, response) = connect_async(target.as_str())
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            debug!(%target, status = %response.status(), "websocket handshake complete");
            Ok(Box::new(WsConnection { stream, failed: false }) as Box<dyn Connection>)
        })
    }
}

pub struct WsConnection {
    stream: WsStream,
    /// Set after a read error; tungstenite keeps yielding errors afterwards.
    failed: bool,
}

impl Connection for WsConnection {
    fn recv(&mut self) -> RecvFuture<'_> {
        Box::pin(async move {
            if self.failed {
                return None;
            }
            loop {
                match self.stream.next().await? {
                    Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text.as_str().to_owned()))),
                    Ok(Message::Binary(bytes)) => return Some(Ok(Frame::Binary(bytes.to_vec()))),
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "close frame received");
                        return None;
                    }
                    // Pings are answered by tungstenite on the next read.
                    Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(TransportError::Protocol(e.to_string())));
                    }
                }
            }
        })
    }

    fn close(&mut self) -> CloseFuture<'_> {
        Box::pin(async move {
            if let Err(e) = self.stream.close(None).await {
                debug!("websocket close handshake failed: {e}");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("ws://127.0.0.1:{port}/ws")).unwrap();
        match WsConnector.connect(&url).await {
            Err(TransportError::Connect(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("expected connection to be refused"),
        }
    }
}
