//! Service gateway: connect, disconnect and status

use std::io;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Router;

use hv_core::ipc::{routes, ConnectRequest, StatusResponse};
use hv_core::traits::KeyringAccess;
use hv_core::ClientError;

use super::response::{done, ok, ApiJson, ApiResult};
use crate::orchestrator::{ConnectionOrchestrator, Credentials};

/// Routes served by the service daemon, relative to the API prefix
pub fn router(orchestrator: Arc<ConnectionOrchestrator>) -> Router {
    Router::new()
        .route(routes::SERVICE_GET_STATUS, post(get_status))
        .route(routes::SERVICE_CONNECT, post(connect))
        .route(routes::SERVICE_DISCONNECT, post(disconnect))
        .with_state(orchestrator)
}

fn join_error(e: tokio::task::JoinError) -> ClientError {
    ClientError::Io(io::Error::new(io::ErrorKind::Other, e))
}

async fn get_status(
    State(orchestrator): State<Arc<ConnectionOrchestrator>>,
) -> ApiResult<StatusResponse> {
    ok(orchestrator.status().await?)
}

async fn connect(
    State(orchestrator): State<Arc<ConnectionOrchestrator>>,
    ApiJson(req): ApiJson<ConnectRequest>,
) -> ApiResult<()> {
    let (backend, to) = req.validate()?;
    tracing::info!("Connect request: session {} to {} as {}", req.id, to, req.from);

    let creds = Credentials {
        access: KeyringAccess::new(backend, req.auth.password),
        from: req.from,
        rating: req.rating,
        resolvers: req.resolvers,
    };
    let id = req.id;

    // Runs detached so a dropped client cannot abandon a half-finished connect
    tokio::spawn(async move { orchestrator.connect(id, &to, &creds).await })
        .await
        .map_err(join_error)??;
    done()
}

async fn disconnect(State(orchestrator): State<Arc<ConnectionOrchestrator>>) -> ApiResult<()> {
    tokio::spawn(async move { orchestrator.disconnect().await })
        .await
        .map_err(join_error)??;
    done()
}
