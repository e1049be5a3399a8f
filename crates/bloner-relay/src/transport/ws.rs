//! WebSocket handler.
//!
//! Each text (or binary) frame carries one envelope. The socket is adapted to
//! the same line stream / line sink pair the TCP transport uses, so the
//! endpoint and everything behind it are transport-agnostic.

use std::io;

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, State},
    response::Response,
};
use bytes::Bytes;
use futures_util::{sink, stream, SinkExt, StreamExt};

use crate::app_state::AppState;
use crate::dispatch::serve_connection;
use crate::transport::lines::{LineSink, LineStream};

pub async fn ws_upgrade(State(app): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let max = app.cfg().relay.max_line_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| async move {
            let (lines, sink) = adapt(socket);
            serve_connection(
                app.registry(),
                lines,
                sink,
                app.endpoint_options("ws"),
                app.shutdown_signal(),
            )
            .await;
        })
}

/// Split a socket into line halves. Pings are answered by axum itself.
fn adapt(socket: WebSocket) -> (LineStream, LineSink) {
    let (ws_tx, ws_rx) = socket.split();

    let lines = stream::unfold(ws_rx, |mut rx| async move {
        loop {
            match rx.next().await? {
                Ok(Message::Text(s)) => return Some((Ok(Bytes::from(s)), rx)),
                Ok(Message::Binary(b)) => return Some((Ok(Bytes::from(b)), rx)),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Ok(Message::Close(_)) => return None,
                Err(e) => return Some((Err(io::Error::other(e)), rx)),
            }
        }
    })
    .boxed();

    let sink: LineSink = Box::pin(sink::unfold(ws_tx, |mut tx, line: Bytes| async move {
        // Frames delimit envelopes here; the codec's trailing newline is dropped.
        let text = String::from_utf8_lossy(line.trim_ascii_end()).into_owned();
        tx.send(Message::Text(text)).await.map_err(io::Error::other)?;
        Ok::<_, io::Error>(tx)
    }));

    (lines, sink)
}
