//! WebSocket gateway: an illustrative, non-exhaustive demonstration of the
//! client API over a JSON envelope. Framing/transport/transaction semantics
//! are intentionally out of scope here; this just needs to exercise
//! `Controller` end to end.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use conflux_core::error::OrchestratorError;
use conflux_core::event::{Event, EventKind};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dto::{ClientEnvelope, ClientRequest, ErrorBody, ResponseEnvelope, ResponseResult, ServerEvent};
use crate::state::AppState;

use super::dispatcher::send_to_connection;

pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn parse_event_kind(name: &str) -> Option<EventKind> {
    EventKind::ALL.iter().copied().find(|k| k.as_str() == name)
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    let (sender, mut receiver) = socket.split();
    let sender = Arc::new(Mutex::new(sender));
    state.ws_storage.add(conn_id, sender.clone());
    info!(%conn_id, "gateway connection opened");

    // Subscriptions this connection opened, so they can be torn down on
    // disconnect without waiting for the event bus to notice a dead sender.
    let mut subscription_handles: Vec<tokio::task::JoinHandle<()>> = Vec::new();

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_text(&state, conn_id, &text, &mut subscription_handles).await;
            }
            Ok(Message::Ping(data)) => {
                let mut guard = sender.lock().await;
                let _ = guard.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(%conn_id, %e, "gateway WS error");
                break;
            }
            _ => {}
        }
    }

    for handle in subscription_handles {
        handle.abort();
    }
    state.ws_storage.remove(&conn_id);
    info!(%conn_id, "gateway connection closed");
}

async fn handle_text(
    state: &AppState,
    conn_id: Uuid,
    text: &str,
    subscription_handles: &mut Vec<tokio::task::JoinHandle<()>>,
) {
    let envelope: ClientEnvelope = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => {
            debug!(%conn_id, %e, "malformed gateway request, ignoring");
            return;
        }
    };
    let transaction_id = envelope.transaction_id.clone();

    if let ClientRequest::OnEvent { event_name, identifier } = &envelope.request {
        let Some(kind) = parse_event_kind(event_name) else {
            send_result(
                state,
                conn_id,
                transaction_id,
                Err(OrchestratorError::MediaInvalidOperation(format!("unknown event {event_name}"))),
            )
            .await;
            return;
        };
        let mut rx = state.events.subscribe(kind, identifier);
        let storage = state.ws_storage.clone();
        let event_name = event_name.clone();
        let identifier = identifier.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let payload = ServerEvent {
                    event: event_name.clone(),
                    identifier: identifier.clone(),
                    data: event_to_json(&event),
                };
                send_to_connection(&storage, &conn_id, &payload).await;
            }
        });
        subscription_handles.push(handle);
        send_result(state, conn_id, transaction_id, Ok(serde_json::json!({"subscribed": true}))).await;
        return;
    }

    let result = dispatch(state, envelope.request).await;
    send_result(state, conn_id, transaction_id, result).await;
}

async fn send_result(
    state: &AppState,
    conn_id: Uuid,
    transaction_id: String,
    result: Result<serde_json::Value, OrchestratorError>,
) {
    let result = match result {
        Ok(value) => ResponseResult::Ok { result: value },
        Err(err) => ResponseResult::Err {
            error: ErrorBody { code: err.code(), message: err.to_string() },
        },
    };
    let envelope = ResponseEnvelope { transaction_id, result };
    send_to_connection(&state.ws_storage, &conn_id, &envelope).await;
}

fn event_to_json(event: &Event) -> serde_json::Value {
    serde_json::to_value(event).unwrap_or(serde_json::Value::Null)
}

/// Routes one request onto the `Controller` by dispatching on method name.
async fn dispatch(state: &AppState, request: ClientRequest) -> Result<serde_json::Value, OrchestratorError> {
    let controller = &state.controller;
    match request {
        ClientRequest::Join { room_id, user_type, name } => {
            let (room_id, user_id) = controller.join(room_id, user_type, name).await;
            Ok(serde_json::json!({"roomId": room_id, "userId": user_id}))
        }
        ClientRequest::Leave { user_id, room_id } => {
            controller.leave(user_id, room_id).await?;
            Ok(serde_json::Value::Null)
        }
        ClientRequest::Publish { user_id, session_type, media_profile, descriptor, options, name } => {
            let (session_id, answer) = controller
                .publish(user_id, session_type, media_profile, descriptor, options, name)
                .await?;
            Ok(serde_json::json!({"mediaId": session_id, "descriptor": answer}))
        }
        ClientRequest::Unpublish { media_id } => {
            controller.unpublish(media_id).await?;
            Ok(serde_json::Value::Null)
        }
        ClientRequest::Renegotiate { media_id, descriptor } => {
            let answer = controller.renegotiate(media_id, descriptor).await?;
            Ok(serde_json::json!({"descriptor": answer}))
        }
        ClientRequest::Subscribe { user_id, source_id, session_type, media_profile, options, name } => {
            let (session_id, answer) = controller
                .subscribe(user_id, source_id, session_type, media_profile, options, name)
                .await?;
            Ok(serde_json::json!({"mediaId": session_id, "descriptor": answer}))
        }
        ClientRequest::Unsubscribe { media_id } => {
            controller.unsubscribe(media_id).await?;
            Ok(serde_json::Value::Null)
        }
        ClientRequest::PublishAndSubscribe { user_id, session_type, media_profile, descriptor, options, name } => {
            let (session_id, answer) = controller
                .publish_and_subscribe(user_id, session_type, media_profile, descriptor, options, name)
                .await?;
            Ok(serde_json::json!({"mediaId": session_id, "descriptor": answer}))
        }
        ClientRequest::Connect { source_id, sink_ids, kind } => {
            controller.connect(source_id, &sink_ids, kind).await?;
            Ok(serde_json::Value::Null)
        }
        ClientRequest::Disconnect { source_id, sink_id, kind } => {
            controller.disconnect(source_id, sink_id, kind).await?;
            Ok(serde_json::Value::Null)
        }
        ClientRequest::AddIceCandidate { media_id, candidate } => {
            controller.add_ice_candidate(media_id, candidate).await?;
            Ok(serde_json::Value::Null)
        }
        ClientRequest::StartRecording { media_id, path, params } => {
            let recording_id = controller.start_recording(media_id, path, params).await?;
            Ok(serde_json::json!({"recordingId": recording_id}))
        }
        ClientRequest::StopRecording { recording_id } => {
            controller.stop_recording(recording_id).await?;
            Ok(serde_json::Value::Null)
        }
        ClientRequest::SetConferenceFloor { room_id, media_id } => {
            controller.set_conference_floor(room_id, media_id).await?;
            Ok(serde_json::Value::Null)
        }
        ClientRequest::ReleaseConferenceFloor { room_id } => {
            controller.release_conference_floor(room_id).await?;
            Ok(serde_json::Value::Null)
        }
        ClientRequest::SetContentFloor { room_id, media_id } => {
            controller.set_content_floor(room_id, media_id).await?;
            Ok(serde_json::Value::Null)
        }
        ClientRequest::ReleaseContentFloor { room_id } => {
            controller.release_content_floor(room_id).await?;
            Ok(serde_json::Value::Null)
        }
        ClientRequest::GetRooms => Ok(serde_json::json!(controller.get_rooms())),
        ClientRequest::GetUsers { room_id } => Ok(serde_json::json!(controller.get_users(room_id).await)),
        ClientRequest::GetUserMedias { user_id } => {
            Ok(serde_json::json!(controller.get_user_medias(user_id).await))
        }
        ClientRequest::SetVolume { media_id, volume } => {
            controller.set_volume(media_id, volume).await?;
            Ok(serde_json::Value::Null)
        }
        ClientRequest::Mute { media_id } => {
            controller.mute(media_id).await?;
            Ok(serde_json::Value::Null)
        }
        ClientRequest::Unmute { media_id } => {
            controller.unmute(media_id).await?;
            Ok(serde_json::Value::Null)
        }
        ClientRequest::Dtmf { media_id, tone } => {
            controller.dtmf(media_id, tone).await?;
            Ok(serde_json::Value::Null)
        }
        ClientRequest::RequestKeyframe { media_id } => {
            controller.request_keyframe(media_id).await?;
            Ok(serde_json::Value::Null)
        }
        ClientRequest::SetStrategy { identifier, strategy } => {
            controller.set_strategy(identifier, strategy).await?;
            Ok(serde_json::Value::Null)
        }
        ClientRequest::GetStrategy { identifier } => Ok(serde_json::json!(controller.get_strategy(&identifier))),
        ClientRequest::OnEvent { .. } => unreachable!("handled before dispatch"),
    }
}
