// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket push channel
//!
//! One bidirectional framed-JSON connection per subscriber. Outbound frames
//! come from the subscriber's event-bus sink; inbound frames mutate the
//! subscription set or elicit an immediate reply on the same channel.

use crate::http::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use garcon_core::{ClientMessage, PushMessage};
use tracing::{debug, warn};

pub async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle(socket, state))
}

async fn handle(socket: WebSocket, state: AppState) {
    let (subscriber_id, mut events) = state.bus.register();
    debug!(subscriber = subscriber_id, "push channel open");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if send_frame(&mut sink, &event).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(message) => state.bus.handle_message(subscriber_id, message),
                            Err(e) => Some(PushMessage::Error {
                                message: format!("invalid message: {e}"),
                                code: None,
                            }),
                        };
                        if let Some(reply) = reply {
                            if send_frame(&mut sink, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary/ping/pong frames are ignored
                    Some(Err(e)) => {
                        warn!(subscriber = subscriber_id, error = %e, "push channel error");
                        break;
                    }
                }
            }
        }
    }

    state.bus.unregister(subscriber_id);
    debug!(subscriber = subscriber_id, "push channel closed");
}

async fn send_frame(
    sink: &mut (impl futures_util::Sink<Message, Error = axum::Error> + Unpin),
    frame: &PushMessage,
) -> Result<(), ()> {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "failed to encode push frame");
            return Ok(()); // skip the frame, keep the connection
        }
    };
    sink.send(Message::Text(text)).await.map_err(|e| {
        debug!(error = %e, "push send failed");
    })
}
