//! WebSocket handlers for producer and consumer connections
//!
//! Socket tasks are deliberately dumb: every inbound frame is forwarded to
//! the broker, and everything the broker queues on the connection's
//! outbound channel is written to the peer. All protocol decisions
//! (authentication, decode, fan-out) happen inside the broker.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tracing::{debug, info};

use crate::api::state::ApiState;
use crate::broker::messages::{InboundFrame, OutboundFrame, Role};

/// WebSocket upgrade handler for producer (agent) connections
///
/// GET /api/v1/report
pub async fn producer_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_connection(socket, state, Role::Producer))
}

/// WebSocket upgrade handler for consumer (viewer) connections
///
/// GET /api/v1/stream
pub async fn consumer_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_connection(socket, state, Role::Consumer))
}

async fn handle_connection(socket: WebSocket, state: ApiState, role: Role) {
    let broker = state.broker;
    let id = broker.allocate_connection_id();

    info!("{role:?} connection {id} established");

    let mut outbound_rx = broker.connect(id, role).await;
    let (mut sender, mut receiver) = socket.split();

    // Drain broker-queued frames toward the peer
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            match frame {
                OutboundFrame::Text(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        debug!("send to connection {id} failed, peer gone");
                        break;
                    }
                }
                OutboundFrame::Close { code, reason } => {
                    // Do not write anything after initiating the close
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    // Forward peer frames into the broker
    let inbound_broker = broker.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    inbound_broker.inbound(id, InboundFrame::Text(text)).await;
                }
                Message::Binary(data) => {
                    inbound_broker.inbound(id, InboundFrame::Binary(data)).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    // Whatever happened, release the broker's bookkeeping for this socket
    broker.disconnect(id).await;
    info!("{role:?} connection {id} closed");
}
