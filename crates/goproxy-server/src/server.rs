//! HTTP transport: a `hyper` 1.x server loop accepting TCP connections
//! and dispatching each request into a [`Router`].

use crate::config::ServerConfig;
use crate::router::Router;
use bytes::Bytes;
use goproxy_core::context::FetchContext;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

/// Wraps a [`Router`] and drives the accept loop until `shutdown` fires.
pub struct HttpServer {
    router: Arc<Router>,
    config: ServerConfig,
}

impl HttpServer {
    pub fn new(router: Router, config: ServerConfig) -> Self {
        Self {
            router: Arc::new(router),
            config,
        }
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    ///
    /// Each accepted connection is handled in its own task via a
    /// [`JoinSet`]; a connection-level error is logged and the loop
    /// continues rather than tearing down the whole server.
    pub async fn serve(self, shutdown: impl std::future::Future<Output = ()>) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "listening");

        let router = self.router;
        let mut connections: JoinSet<Result<(), hyper::Error>> = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        tracing::debug!(%peer_addr, "accepted connection");
                        Self::dispatch(&router, &mut connections, stream);
                    }
                    Err(err) => {
                        tracing::warn!(%err, "accept failure");
                        continue;
                    }
                },
                Some(result) = connections.join_next(), if !connections.is_empty() => match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => tracing::warn!(%err, "connection task failed"),
                    Err(err) => tracing::warn!(%err, "connection task panicked"),
                },
                () = &mut shutdown => {
                    tracing::info!("shutdown signal received");
                    break;
                }
            }
        }

        // Stop accepting new work, then wait out every task already in
        // flight; `JoinSet::shutdown` would abort them mid-request instead.
        while let Some(result) = connections.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!(%err, "connection task failed"),
                Err(err) => tracing::warn!(%err, "connection task panicked"),
            }
        }
        Ok(())
    }

    fn dispatch(
        router: &Arc<Router>,
        connections: &mut JoinSet<Result<(), hyper::Error>>,
        stream: tokio::net::TcpStream,
    ) {
        let stream = TokioIo::new(stream);
        let router = router.clone();
        let service = service_fn(move |req| {
            let router = router.clone();
            async move { handle(router, req).await }
        });
        connections.spawn(async move {
            http1::Builder::new()
                .serve_connection(stream, service)
                .await
        });
    }
}

async fn handle(
    router: Arc<Router>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();
    // The module proxy protocol carries no request body; draining it
    // keeps the connection well-behaved for clients that send one anyway.
    let _ = body.collect().await;

    let ctx = FetchContext::new();
    let response = router
        .handle(&ctx, &parts.method, parts.uri.path(), &parts.headers)
        .await;
    Ok(response)
}
