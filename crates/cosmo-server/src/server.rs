//! Listener setup and lifetime of the relay's background tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use cosmo_core::Planet;
use cosmo_settings::RelaySettings;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::errors::ServerError;
use crate::http::{http_router, HttpState};
use crate::node::{node_router, NodeState};
use crate::outbound::{HttpTransport, OutboundBridge, RelayTransport, DEFAULT_QUEUE_CAPACITY};
use crate::registry::{start_cleanup_task, ConnectionRegistry};
use crate::relay::Relay;

/// Time allowed for listeners, socket loops and in-flight forwards to finish
/// once the relay is asked to stop.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Start the relay with the HTTP transport configured in `settings`.
pub async fn start(
    settings: &RelaySettings,
    metrics: PrometheusHandle,
) -> Result<ServerHandle, ServerError> {
    let transport = HttpTransport::new(
        settings.transport_layer_url.clone(),
        settings.transport_timeout(),
    )?;
    tracing::info!(url = %transport.url(), "transport layer configured");
    start_with_transport(settings, Arc::new(transport), metrics).await
}

/// Start the relay with a caller-supplied transport.
///
/// Binds the Earth, Mars and HTTP listeners before spawning anything, so a
/// port conflict leaves no task behind.
pub async fn start_with_transport(
    settings: &RelaySettings,
    transport: Arc<dyn RelayTransport>,
    metrics: PrometheusHandle,
) -> Result<ServerHandle, ServerError> {
    let earth_listener = bind("earth", &settings.host, settings.earth_port).await?;
    let mars_listener = bind("mars", &settings.host, settings.mars_port).await?;
    let http_listener = bind("http", &settings.host, settings.http_port).await?;
    let earth_addr = earth_listener.local_addr()?;
    let mars_addr = mars_listener.local_addr()?;
    let http_addr = http_listener.local_addr()?;

    let token = CancellationToken::new();
    let mut tasks = Vec::new();

    let earth = Arc::new(ConnectionRegistry::new(Planet::Earth, settings.max_send_queue));
    let mars = Arc::new(ConnectionRegistry::new(Planet::Mars, settings.max_send_queue));

    let notify = settings.notify_on_relay_failure.then(|| Arc::clone(&earth));
    let (outbound, outbound_worker) =
        OutboundBridge::spawn(transport, notify, DEFAULT_QUEUE_CAPACITY, token.clone());
    tasks.push(outbound_worker);

    let relay = Arc::new(Relay::new(Arc::clone(&earth), Arc::clone(&mars), outbound));

    for registry in [&earth, &mars] {
        tasks.push(start_cleanup_task(
            Arc::clone(registry),
            settings.heartbeat_interval(),
            settings.client_timeout(),
            token.clone(),
        ));
    }

    for (planet, listener) in [(Planet::Earth, earth_listener), (Planet::Mars, mars_listener)] {
        let router = node_router(NodeState {
            planet,
            relay: Arc::clone(&relay),
            heartbeat_interval: settings.heartbeat_interval(),
            cancel: token.clone(),
        });
        tasks.push(serve(planet.as_str(), listener, router, token.clone()));
    }

    let router = http_router(HttpState {
        earth,
        mars,
        start_time: Instant::now(),
        metrics,
    });
    tasks.push(serve("http", http_listener, router, token.clone()));

    tracing::info!(
        earth = %earth_addr,
        mars = %mars_addr,
        http = %http_addr,
        "cosmochat relay started"
    );

    Ok(ServerHandle {
        earth_addr,
        mars_addr,
        http_addr,
        relay,
        token,
        tasks,
    })
}

async fn bind(listener: &'static str, host: &str, port: u16) -> Result<TcpListener, ServerError> {
    TcpListener::bind((host, port))
        .await
        .map_err(|source| ServerError::Bind {
            listener,
            addr: format!("{host}:{port}"),
            source,
        })
}

fn serve(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;
        match result {
            Ok(()) => tracing::debug!(listener = name, "listener stopped"),
            Err(e) => tracing::error!(listener = name, error = %e, "listener failed"),
        }
    })
}

/// Handle returned by [`start`]. Keeps the listeners and workers alive.
pub struct ServerHandle {
    pub earth_addr: SocketAddr,
    pub mars_addr: SocketAddr,
    pub http_addr: SocketAddr,
    relay: Arc<Relay>,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    pub fn registry(&self, planet: Planet) -> &Arc<ConnectionRegistry> {
        self.relay.registry(planet)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop accepting connections, close open sockets and wait for the
    /// outbound worker to drain.
    ///
    /// Listeners, sweeps and the worker all watch the same token; whatever is
    /// still running after `timeout` (default [`DEFAULT_SHUTDOWN_TIMEOUT`]) is
    /// aborted.
    pub async fn shutdown(self, timeout: Option<Duration>) {
        let Self { token, tasks, .. } = self;
        token.cancel();
        drain_tasks(tasks, timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT)).await;
        tracing::info!("relay stopped");
    }
}

/// Wait for the relay's background tasks, aborting stragglers after `timeout`.
///
/// Returns the number of tasks that had to be aborted.
async fn drain_tasks(tasks: Vec<JoinHandle<()>>, timeout: Duration) -> usize {
    tracing::info!(
        tasks = tasks.len(),
        timeout_ms = timeout.as_millis() as u64,
        "shutting down relay"
    );
    let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
    if tokio::time::timeout(timeout, futures::future::join_all(tasks))
        .await
        .is_ok()
    {
        return 0;
    }
    let stragglers = aborts.iter().filter(|a| !a.is_finished()).count();
    tracing::warn!(stragglers, "relay did not stop in {timeout:?}, aborting");
    for abort in aborts {
        abort.abort();
    }
    stragglers
}
