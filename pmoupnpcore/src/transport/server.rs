//! Serveur HTTP entrant (`axum`).
//!
//! Toutes les requêtes passent par un unique `fallback` : le routage UPnP
//! (descriptions, contrôle, GENA) est fait par le [`StreamHandler`], pas
//! par `axum`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router as AxumRouter,
    body::{Body, Bytes, to_bytes},
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{StreamExt, stream};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    message::{StreamRequestMessage, StreamResponseMessage, UpnpMethod},
    registry::DeferredTask,
    transport::{RouterError, StreamHandler, WorkerPool},
};

/// Taille maximale d'un corps de requête accepté
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
struct ServerState {
    handler: Arc<dyn StreamHandler>,
    pool: WorkerPool,
}

/// Réserve le port d'écoute.
pub async fn bind(address: SocketAddr) -> Result<TcpListener, RouterError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| RouterError::HttpBind {
            address: address.to_string(),
            source,
        })
}

/// Serveur HTTP en cours d'exécution.
pub struct HttpServer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl HttpServer {
    /// Sert les requêtes reçues sur `listener`.
    pub fn start(
        listener: TcpListener,
        handler: Arc<dyn StreamHandler>,
        pool: WorkerPool,
    ) -> Result<Self, RouterError> {
        let local_addr = listener.local_addr().map_err(|source| RouterError::HttpBind {
            address: "listener".to_string(),
            source,
        })?;
        let app = AxumRouter::new()
            .fallback(dispatch)
            .with_state(ServerState { handler, pool });

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                });
            if let Err(e) = server.await {
                warn!("❌ HTTP server stopped with error: {}", e);
            }
        });

        info!(address = %local_addr, "✅ HTTP server listening");
        Ok(Self {
            local_addr,
            shutdown: Some(tx),
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Arrêt gracieux : attend la fin des requêtes en cours.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
        info!(address = %self.local_addr, "👋 HTTP server stopped");
    }
}

async fn dispatch(
    State(state): State<ServerState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let message = match to_stream_request(request, remote).await {
        Ok(message) => message,
        Err(status) => return status.into_response(),
    };
    debug!(method = %message.method, uri = %message.uri, from = %remote, "📥 HTTP request");

    let handler = state.handler.clone();
    let Some(outcome) = state.pool.run(handler.handle_stream(message)).await else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    to_http_response(outcome.response, outcome.after_response)
}

/// Lance la tâche différée quand le corps de la réponse est libéré, une
/// fois la réponse écrite.
struct AfterResponse(Option<DeferredTask>);

impl Drop for AfterResponse {
    fn drop(&mut self) {
        let Some(task) = self.0.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(task);
            }
            Err(_) => warn!("No runtime left, deferred task dropped"),
        }
    }
}

async fn to_stream_request(request: Request, remote: SocketAddr) -> Result<StreamRequestMessage, StatusCode> {
    let (parts, body) = request.into_parts();
    let Ok(method) = parts.method.as_str().parse::<UpnpMethod>();
    let uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let mut message = StreamRequestMessage::new(method, uri);
    for (name, value) in parts.headers.iter() {
        if let Ok(value) = value.to_str() {
            message.headers.add(name.as_str().to_ascii_uppercase(), value);
        }
    }
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;
    if !bytes.is_empty() {
        message.body = Some(String::from_utf8_lossy(&bytes).into_owned());
    }
    message.remote_addr = Some(remote);
    Ok(message)
}

fn to_http_response(message: StreamResponseMessage, after_response: Option<DeferredTask>) -> Response {
    let status = StatusCode::from_u16(message.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let content = message.body.unwrap_or_default();
    let body = match after_response {
        None => Body::from(content),
        Some(task) => {
            let guard = AfterResponse(Some(task));
            let chunks = stream::iter([Ok::<_, std::convert::Infallible>(Bytes::from(content))]).map(move |chunk| {
                let _ = &guard;
                chunk
            });
            Body::from_stream(chunks)
        }
    };
    let mut response = Response::new(body);
    *response.status_mut() = status;
    let headers = response.headers_mut();
    for (name, value) in message.headers.iter() {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => debug!(header = %name, "Skipping invalid response header"),
        }
    }
    response
}
