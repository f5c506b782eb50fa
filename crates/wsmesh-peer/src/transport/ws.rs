//! tokio-tungstenite connector.
//!
//! - Text frames => `SocketEvent::Text`
//! - Binary frames are accepted when they hold UTF-8, dropped otherwise
//! - Protocol-level Ping/Pong are answered by tungstenite and never surface

use std::borrow::Cow;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{future, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use wsmesh_core::error::{MeshError, Result};

use super::{Connector, FrameSink, Socket, SocketEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production connector.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Socket> {
        let (ws, _resp) = connect_async(url)
            .await
            .map_err(|e| MeshError::Transport(format!("websocket connect failed: {e}")))?;
        let (sink, stream) = ws.split();
        let events = stream
            .filter_map(|item| future::ready(map_inbound(item)))
            .boxed();
        Ok(Socket {
            sink: Box::new(WsSink { inner: sink }),
            events,
        })
    }
}

fn map_inbound(item: std::result::Result<Message, WsError>) -> Option<SocketEvent> {
    match item {
        Ok(Message::Text(s)) => Some(SocketEvent::Text(s)),
        Ok(Message::Binary(b)) => match String::from_utf8(b) {
            Ok(s) => Some(SocketEvent::Text(s)),
            Err(_) => {
                tracing::debug!("dropping non-utf8 binary frame");
                None
            }
        },
        Ok(Message::Close(frame)) => {
            let (code, reason) = match frame {
                Some(f) => (Some(u16::from(f.code)), f.reason.into_owned()),
                None => (None, String::new()),
            };
            Some(SocketEvent::Closed { code, reason })
        }
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
        Err(e) => Some(SocketEvent::Error(e.to_string())),
    }
}

struct WsSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| MeshError::Transport(format!("websocket send failed: {e}")))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_owned()),
        };
        self.inner
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| MeshError::Transport(format!("websocket close failed: {e}")))?;
        self.inner
            .close()
            .await
            .map_err(|e| MeshError::Transport(format!("websocket close failed: {e}")))
    }
}
