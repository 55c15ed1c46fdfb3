//! WebSocket transport: upgrades an HTTP connection and drives an
//! `electric_core::Connection` over binary WS frames, mirroring the
//! session-loop shape of the teacher's `ws_forwarder.rs` but replacing
//! its JSON/text framing with the binary frame codec.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use electric_core::Connection;
use electric_protocol::frame::Frame;
use tracing::{info, warn};

use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub async fn electric_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut connection = Connection::new((*state.collaborators).clone());
    let mut registered = false;
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        let replicating = matches!(
            connection.state(),
            electric_core::ConnectionState::Replicating(electric_core::ReplicatingSubState::Live)
        );
        tokio::select! {
            result = connection.poll_replication(), if replicating => {
                match result {
                    Ok(frames) => {
                        let mut send_failed = false;
                        for out in frames {
                            if socket.send(Message::Binary(out.encode())).await.is_err() {
                                send_failed = true;
                                break;
                            }
                        }
                        if send_failed {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "fatal protocol violation while polling replication, closing connection");
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Binary(bytes))) => {
                        let frame = match Frame::decode(&bytes) {
                            Ok(f) => f,
                            Err(e) => {
                                warn!(error = %e, "malformed frame, closing connection");
                                break;
                            }
                        };
                        match connection.handle_inbound(frame).await {
                            Ok(out_frames) => {
                                if !registered {
                                    if let Some(client_id) = connection.client_id() {
                                        if state.register_client(client_id).await {
                                            registered = true;
                                        } else {
                                            warn!(client_id, "rejecting duplicate session");
                                            break;
                                        }
                                    }
                                }
                                let mut send_failed = false;
                                for out in out_frames {
                                    if socket.send(Message::Binary(out.encode())).await.is_err() {
                                        send_failed = true;
                                        break;
                                    }
                                }
                                if send_failed {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "fatal protocol violation, closing connection");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = socket.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("client disconnected");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Text/Pong frames are not part of this protocol; ignore.
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket error");
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    connection.close();
    if registered {
        if let Some(client_id) = connection.client_id() {
            state.unregister_client(client_id).await;
        }
    }
}
