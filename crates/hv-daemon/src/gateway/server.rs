//! Gateway listener
//!
//! Listens on loopback for requests from the CLI or a desktop front-end. The
//! bound URL is published to `url.txt` in the gateway's home directory for
//! as long as the gateway runs.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use hv_core::discovery::{base_url, Registration};
use hv_core::ipc::API_PREFIX;

/// Mount gateway routes under the API prefix with request logging
pub fn app(routes: Router) -> Router {
    Router::new()
        .nest(API_PREFIX, routes)
        .layer(middleware::from_fn(log_request))
}

async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;
    tracing::debug!(
        "{} {} -> {} ({:?})",
        method,
        path,
        response.status().as_u16(),
        started.elapsed()
    );
    response
}

/// A bound, not yet serving, gateway
pub struct Gateway {
    name: &'static str,
    home: PathBuf,
    listener: TcpListener,
    app: Router,
}

impl Gateway {
    /// Bind `address`; port 0 lets the OS choose
    pub async fn bind(name: &'static str, address: &str, home: &Path, routes: Router) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("Failed to bind {} gateway to {}", name, address))?;

        Ok(Self {
            name,
            home: home.to_path_buf(),
            listener,
            app: app(routes),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Base URL clients should use
    pub fn url(&self) -> Result<String> {
        Ok(base_url(self.local_addr()?))
    }

    /// Publish the URL and serve until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let url = self.url()?;
        let registration = Registration::register(&self.home, &url)
            .with_context(|| format!("Failed to register {} gateway in {:?}", self.name, self.home))?;

        tracing::info!("{} gateway listening on {}", self.name, registration.url());

        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .with_context(|| format!("{} gateway failed", self.name))?;

        tracing::info!("{} gateway stopped", self.name);
        drop(registration);
        Ok(())
    }
}
