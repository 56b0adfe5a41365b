//! HTTP surface of the gateway
use crate::{discovery, handlers::query, Call, Gateway, Reply, Result};
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use mck_core::{params::WatchFlag, response, Route};
use std::{future::IntoFuture, time::Duration};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Router serving the whole API surface of `gateway`
pub fn router(gateway: Gateway) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/version", get(version))
        .route("/openapi/v2", get(openapi))
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

/// Serve `gateway` on `listener` until its shutdown token is cancelled
///
/// Once cancelled, no new connections are accepted and in-flight requests get `grace`
/// to finish before this returns.
pub async fn serve(listener: TcpListener, gateway: Gateway, grace: Duration) -> std::io::Result<()> {
    let token = gateway.shutdown().clone();
    let addr = listener.local_addr()?;
    let server = axum::serve(listener, router(gateway))
        .with_graceful_shutdown(token.clone().cancelled_owned())
        .into_future();
    info!(%addr, "serving");
    tokio::select! {
        res = server => res,
        _ = async {
            token.cancelled().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(?grace, "grace period elapsed with requests still in flight");
            Ok(())
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn version(State(gw): State<Gateway>) -> Result<Json<serde_json::Value>> {
    Ok(Json(discovery::version(gw.registry()).await?))
}

async fn openapi(State(gw): State<Gateway>) -> Result<Response> {
    let doc = discovery::openapi(gw.registry()).await?;
    Ok(([(CONTENT_TYPE, "application/json")], doc).into_response())
}

async fn dispatch(
    State(gw): State<Gateway>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let WatchFlag { watch } = query(&uri)?;
    match Route::parse(&method, uri.path(), watch)? {
        Route::Discovery(doc) => Ok(Json(discovery::document(gw.registry(), &doc).await?).into_response()),
        Route::Resource(op) => {
            let content_type = headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let call = Call {
                op,
                uri,
                content_type,
                body,
            };
            Ok(gw.execute(call).await?.into_response())
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Object(obj) => Json(obj).into_response(),
            Reply::Created(obj) => (StatusCode::CREATED, Json(obj)).into_response(),
            Reply::List(list) => Json(list).into_response(),
            Reply::Status(status) => Json(response::from_reply(&status)).into_response(),
            Reply::Watch(relay) => (
                [(CONTENT_TYPE, "application/json")],
                Body::from_stream(relay),
            )
                .into_response(),
        }
    }
}
