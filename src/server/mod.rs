//! HTTP 接口
//!
//! - `POST /events`、`POST /v6/events`：接收 Flux 事件并分发
//! - `GET /`：旧版 websocket 兼容端点，原样回显每一帧

use axum::body::Bytes;
use axum::extract::ws::{Message as Frame, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::event::Event;
use crate::notification::Dispatcher;

/// 请求间共享的状态，构造后只读
#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

/// 构建路由
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(websocket_handler))
        .route("/events", post(events_handler))
        .route("/v6/events", post(events_handler))
        .with_state(state)
}

/// 在已绑定的 listener 上提供服务，直到 `shutdown` 完成
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(address = %listener.local_addr()?, "Listening for Flux events");
    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn events_handler(State(state): State<AppState>, uri: Uri, body: Bytes) -> Response {
    info!(path = %uri.path(), bytes = body.len(), "Received event");

    let event = match Event::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Could not decode event");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };
    debug!(event_id = event.id, event_type = %event.event_type, summary = %event, "Decoded event");

    let outcome = state.dispatcher.dispatch(&event).await;
    if outcome.any_failed() {
        let body = format!(
            "could not send to: {}",
            outcome.failed_destinations().join(", ")
        );
        return (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
    }

    StatusCode::OK.into_response()
}

async fn websocket_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(echo)
}

async fn echo(mut socket: WebSocket) {
    info!("Websocket client connected");

    while let Some(frame) = socket.recv().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "Websocket read failed");
                break;
            }
        };

        match frame {
            Frame::Text(_) | Frame::Binary(_) => {
                if let Err(e) = socket.send(frame).await {
                    debug!(error = %e, "Websocket write failed");
                    break;
                }
            }
            Frame::Close(_) => break,
            Frame::Ping(_) | Frame::Pong(_) => {}
        }
    }

    info!("Websocket client disconnected");
}
