use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::classroom::ClassroomServer;
use crate::identity::Credentials;

pub async fn handle_classroom_websocket(
    websocket: WebSocket,
    server: Arc<ClassroomServer>,
    credentials: Credentials,
) {
    let (handler, mut outbox) = server.connect(&credentials).await;
    let handler = Arc::new(handler);
    let connection_id = handler.connection_id().clone();

    tracing::info!(
        connection_id = %connection_id,
        role = handler.principal().role.as_str(),
        "New classroom WebSocket connection established"
    );

    let (mut ws_sender, mut ws_receiver) = websocket.split();

    // Spawn task to send events to client
    let sender_task = tokio::spawn(async move {
        while let Some(event) = outbox.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize outbound event");
                    continue;
                }
            };
            if let Err(e) = ws_sender.send(Message::text(text)).await {
                tracing::error!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    // Frames are handled in arrival order on their own task so the read loop
    // notices a closed socket while a directory lookup is still pending.
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();
    let dispatch_task = {
        let handler = handler.clone();
        tokio::spawn(async move {
            while let Some(text) = frames_rx.recv().await {
                handler.handle_text(&text).await;
            }
        })
    };

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(message) if message.is_close() => break,
            Ok(message) => {
                if let Ok(text) = message.to_str() {
                    tracing::debug!(connection_id = %connection_id, "Received classroom message: {}", text);
                    if frames_tx.send(text.to_string()).is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    handler.cleanup().await;
    dispatch_task.abort();
    sender_task.abort();
    tracing::info!(connection_id = %connection_id, "Classroom WebSocket connection closed");
}
