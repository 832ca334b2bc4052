//! `EscapadeServer` builder and server loop.
//!
//! This is the entry point for running the room engine. It ties together
//! all the layers: WebSocket transport → protocol → room registry, plus
//! the HTTP variable API served next to it.

use std::future::{self, Future};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use escapade_protocol::{ClientId, Codec, JsonCodec};
use escapade_room::{EngineConfig, RoomRegistry, RoomStore};
use escapade_transport::{Transport, WebSocketTransport};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::EscapadeError;
use crate::handler::handle_connection;
use crate::http;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<S: RoomStore, C: Codec> {
    pub(crate) registry: Arc<RoomRegistry<S>>,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Duration,
    next_client: AtomicU64,
}

impl<S: RoomStore, C: Codec> ServerState<S, C> {
    pub(crate) fn next_client_id(&self) -> ClientId {
        ClientId(self.next_client.fetch_add(1, Ordering::Relaxed))
    }
}

/// Builder for configuring and starting an Escapade server.
///
/// # Example
///
/// ```rust,ignore
/// use escapade::prelude::*;
///
/// let server = EscapadeServerBuilder::new()
///     .ws_bind("0.0.0.0:3001")
///     .http_bind("0.0.0.0:3000")
///     .engine_config(EngineConfig { clear_triggers_on_reset: true, ..Default::default() })
///     .build(MemoryStore::new())
///     .await?;
/// server.run().await
/// ```
pub struct EscapadeServerBuilder {
    ws_addr: String,
    http_addr: String,
    engine: EngineConfig,
    idle_timeout: Duration,
}

impl EscapadeServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            ws_addr: "127.0.0.1:3001".to_string(),
            http_addr: "127.0.0.1:3000".to_string(),
            engine: EngineConfig::default(),
            idle_timeout: Duration::from_secs(60),
        }
    }

    /// Sets the address the WebSocket listener binds to.
    pub fn ws_bind(mut self, addr: &str) -> Self {
        self.ws_addr = addr.to_string();
        self
    }

    /// Sets the address the HTTP API binds to.
    pub fn http_bind(mut self, addr: &str) -> Self {
        self.http_addr = addr.to_string();
        self
    }

    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.engine = config;
        self
    }

    /// How long a socket may stay silent before it is dropped. Clients
    /// keep the connection alive with `heartbeat`.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Binds both listeners and starts the room registry's background
    /// workers.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`, which is what browser
    /// clients speak.
    pub async fn build<S: RoomStore>(
        self,
        store: S,
    ) -> Result<EscapadeServer<S, JsonCodec>, EscapadeError> {
        let transport = WebSocketTransport::bind(&self.ws_addr).await?;
        let http = TcpListener::bind(&self.http_addr).await?;

        let registry = Arc::new(RoomRegistry::new(Arc::new(store), self.engine));
        let state = Arc::new(ServerState {
            registry,
            codec: JsonCodec,
            idle_timeout: self.idle_timeout,
            next_client: AtomicU64::new(1),
        });

        Ok(EscapadeServer {
            transport,
            http,
            state,
        })
    }
}

impl Default for EscapadeServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Escapade server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct EscapadeServer<S: RoomStore, C: Codec> {
    transport: WebSocketTransport,
    http: TcpListener,
    state: Arc<ServerState<S, C>>,
}

impl<S, C> EscapadeServer<S, C>
where
    S: RoomStore,
    C: Codec,
{
    /// Returns the address the WebSocket listener is bound to.
    pub fn ws_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns the address the HTTP API is bound to.
    pub fn http_addr(&self) -> std::io::Result<SocketAddr> {
        self.http.local_addr()
    }

    pub fn registry(&self) -> &Arc<RoomRegistry<S>> {
        &self.state.registry
    }

    /// Runs the server until the process is terminated.
    pub async fn run(self) -> Result<(), EscapadeError> {
        self.run_until(future::pending()).await
    }

    /// Runs the accept loop and the HTTP API until `shutdown` resolves.
    ///
    /// On shutdown the HTTP server drains in-flight requests, every room
    /// is torn down and pending record writes are flushed.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), EscapadeError>
    where
        F: Future<Output = ()> + Send,
    {
        let Self {
            mut transport,
            http: listener,
            state,
        } = self;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let router = http::router(Arc::clone(&state.registry));
        let http_addr = listener.local_addr()?;
        let http_task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.wait_for(|stop| *stop).await;
                })
                .await
        });

        tracing::info!(ws = ?transport.local_addr().ok(), http = %http_addr, "Escapade server running");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("shutting down");
        let _ = stop_tx.send(true);
        match http_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "http server failed"),
            Err(e) => tracing::error!(error = %e, "http server task panicked"),
        }
        if let Err(e) = transport.shutdown().await {
            tracing::debug!(error = %e, "transport shutdown failed");
        }
        state.registry.shutdown().await;
        Ok(())
    }
}
