//! Adapters from WebSocket libraries to the relay's `FrameSocket` port.
//!
//! Control frames (ping/pong) never reach the relay: both libraries answer
//! pings themselves, so only data and close frames are surfaced.

use crate::application::ports::BoxedSocket;
use crate::domain::error::RelayError;
use crate::domain::frame::{CloseFrame, Frame};
use crate::domain::session::Side;
use axum::extract::ws::{self as axum_ws, WebSocket};
use futures_util::future::{self, Ready};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame as WsCloseFrame};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

/// Wrap an upgraded inbound axum socket.
pub fn from_axum(socket: WebSocket) -> BoxedSocket {
    let socket = socket
        .sink_map_err(|err| RelayError::socket(Side::Client, err))
        .with(to_axum)
        .filter_map(|item| {
            future::ready(match item {
                Ok(message) => from_axum_message(message).map(Ok),
                Err(err) => Some(Err(RelayError::socket(Side::Client, err))),
            })
        });
    Box::new(socket)
}

/// Wrap a tokio-tungstenite stream acting as `side` of a session.
pub fn from_tungstenite<S>(stream: WebSocketStream<S>, side: Side) -> BoxedSocket
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let socket = stream
        .sink_map_err(move |err| RelayError::socket(side, err))
        .with(to_tungstenite)
        .filter_map(move |item| {
            future::ready(match item {
                Ok(message) => from_tungstenite_message(message).map(Ok),
                Err(err) => Some(Err(RelayError::socket(side, err))),
            })
        });
    Box::new(socket)
}

fn to_axum(frame: Frame) -> Ready<Result<axum_ws::Message, RelayError>> {
    future::ready(Ok(match frame {
        Frame::Text(text) => axum_ws::Message::Text(text),
        Frame::Binary(data) => axum_ws::Message::Binary(data),
        Frame::Close(close) => axum_ws::Message::Close(close.map(|c| axum_ws::CloseFrame {
            code: c.code,
            reason: c.reason,
        })),
    }))
}

fn from_axum_message(message: axum_ws::Message) -> Option<Frame> {
    match message {
        axum_ws::Message::Text(text) => Some(Frame::Text(text)),
        axum_ws::Message::Binary(data) => Some(Frame::Binary(data)),
        axum_ws::Message::Close(close) => Some(Frame::Close(
            close.map(|c| CloseFrame::new(c.code, c.reason)),
        )),
        axum_ws::Message::Ping(_) | axum_ws::Message::Pong(_) => None,
    }
}

fn to_tungstenite(frame: Frame) -> Ready<Result<WsMessage, RelayError>> {
    future::ready(Ok(match frame {
        Frame::Text(text) => WsMessage::Text(text),
        Frame::Binary(data) => WsMessage::Binary(data),
        Frame::Close(close) => WsMessage::Close(close.map(|c| WsCloseFrame {
            code: CloseCode::from(c.code),
            reason: c.reason,
        })),
    }))
}

fn from_tungstenite_message(message: WsMessage) -> Option<Frame> {
    match message {
        WsMessage::Text(text) => Some(Frame::Text(text)),
        WsMessage::Binary(data) => Some(Frame::Binary(data)),
        WsMessage::Close(close) => Some(Frame::Close(
            close.map(|c| CloseFrame::new(u16::from(c.code), c.reason)),
        )),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => None,
    }
}
