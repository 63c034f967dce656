//! Bridge lifecycle.
//!
//! [`Guardian`] owns the host-side executor and, while running, the HTTP
//! server with its own multi-thread runtime. The host thread calls
//! [`Guardian::on_tick`] and [`Guardian::on_event`]; everything else happens
//! on the server runtime.
//!
//! `start`, `stop` and `Drop` block, so they must be called from a plain
//! thread and never from inside an async context.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use guardian_domain::{AuthorizationList, TradeStatus};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::bridge::{HostExecutor, TickReport};
use crate::config::GuardianConfig;
use crate::infrastructure::ports::{ClockPort, HostActions, HostEvent};
use crate::use_cases::{AuthorizationGuard, CommandService};

const SERVE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Failed to build server runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

struct RunningServer {
    runtime: Runtime,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    addr: SocketAddr,
}

pub struct Guardian {
    config: GuardianConfig,
    clock: Arc<dyn ClockPort>,
    guard: Arc<AuthorizationGuard>,
    executor: HostExecutor,
    server: Option<RunningServer>,
}

impl Guardian {
    pub fn new(config: GuardianConfig, clock: Arc<dyn ClockPort>) -> Self {
        let guard = Arc::new(AuthorizationGuard::new(config.authorized_ids.clone()));
        let executor = HostExecutor::new(config.bridge_settings(), Arc::clone(&clock));
        Self {
            config,
            clock,
            guard,
            executor,
            server: None,
        }
    }

    /// Start serving. Returns the bound address, or `None` when the bridge is
    /// disabled. Calling it while running returns the current address.
    pub fn start(&mut self) -> Result<Option<SocketAddr>, LifecycleError> {
        if let Some(server) = &self.server {
            return Ok(Some(server.addr));
        }
        if !self.config.enabled {
            tracing::info!("Command server disabled; not starting");
            return Ok(None);
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.worker_threads)
            .thread_name("guardian-http")
            .enable_all()
            .build()
            .map_err(LifecycleError::Runtime)?;

        let bind_addr = self.config.bind_addr();
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind(bind_addr))
            .map_err(|source| LifecycleError::Bind {
                addr: bind_addr,
                source,
            })?;
        let addr = listener
            .local_addr()
            .map_err(|source| LifecycleError::Bind {
                addr: bind_addr,
                source,
            })?;

        let service = Arc::new(CommandService::new(
            Arc::clone(&self.guard),
            self.executor.connect(),
            Arc::clone(&self.clock),
            self.config.request_timeout,
        ));
        let router = api::http::routes()
            .with_state(service)
            .layer(TraceLayer::new_for_http());

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = runtime.spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
            {
                tracing::error!(error = %e, "Command server stopped with an error");
            }
        });

        tracing::info!(
            %addr,
            authorized = self.guard.current().len(),
            "Command server listening"
        );
        self.server = Some(RunningServer {
            runtime,
            cancel,
            handle,
            addr,
        });
        Ok(Some(addr))
    }

    /// Stop serving. Queued commands fail with `server_shutting_down`; the
    /// trade session is kept for the next start.
    pub fn stop(&mut self) {
        let Some(server) = self.server.take() else {
            return;
        };

        server.cancel.cancel();
        let failed = self.executor.shutdown();

        let RunningServer {
            runtime, handle, ..
        } = server;
        if runtime
            .block_on(async { tokio::time::timeout(SERVE_DRAIN_TIMEOUT, handle).await })
            .is_err()
        {
            tracing::warn!("Open connections did not drain in time; dropping them");
        }
        runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

        tracing::info!(failed_commands = failed, "Command server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.server.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(|server| server.addr)
    }

    /// Host tick: run queued commands against `host`.
    pub fn on_tick(&mut self, host: &mut dyn HostActions) -> TickReport {
        self.executor.on_tick(host)
    }

    /// Host trade notification.
    pub fn on_event(&mut self, event: HostEvent) {
        self.executor.on_event(event);
    }

    /// Swap the authorized id list; later requests see the new list.
    pub fn reload_authorizations(&self, list: AuthorizationList) {
        self.guard.replace(list);
    }

    pub fn trade_status(&self) -> TradeStatus {
        self.executor.trade_status()
    }
}

impl Drop for Guardian {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::simulated_host::SimulatedHost;
    use guardian_domain::{ChatChannel, TradeState, WorldInfo, WorldNumber};
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Instant;

    fn config(vars: &[(&str, &str)]) -> GuardianConfig {
        let mut all: HashMap<String, String> = HashMap::from([
            ("GUARDIAN_PORT".to_string(), "0".to_string()),
            ("GUARDIAN_AUTHORIZED_IDS".to_string(), "1001".to_string()),
        ]);
        for (k, v) in vars {
            all.insert(k.to_string(), v.to_string());
        }
        GuardianConfig::from_lookup(|key| all.get(key).cloned()).unwrap()
    }

    fn guardian(vars: &[(&str, &str)]) -> Guardian {
        Guardian::new(config(vars), Arc::new(SystemClock::new()))
    }

    fn host() -> SimulatedHost {
        let w301 = WorldNumber::new(301).unwrap();
        SimulatedHost::new(vec![WorldInfo::new(w301, 800)], Some(w301)).with_player("Bob")
    }

    /// Raw HTTP/1.1 exchange; returns the status code and body.
    fn http(addr: SocketAddr, method: &str, path: &str, caller: &str, body: &str) -> (u16, String) {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let request = format!(
            "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nX-Discord-Id: {caller}\r\n\
             Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(request.as_bytes()).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();

        let status = response[9..12].parse().unwrap();
        let body = response
            .split_once("\r\n\r\n")
            .map(|(_, body)| body.to_string())
            .unwrap_or_default();
        (status, body)
    }

    /// Runs `request` on a client thread while this thread acts as the host.
    fn with_host_ticks<T: Send + 'static>(
        guardian: &mut Guardian,
        host: &mut SimulatedHost,
        request: impl FnOnce() -> T + Send + 'static,
    ) -> T {
        let client = std::thread::spawn(request);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !client.is_finished() && Instant::now() < deadline {
            for event in host.drain_events() {
                guardian.on_event(event);
            }
            guardian.on_tick(host);
            std::thread::sleep(Duration::from_millis(5));
        }
        for event in host.drain_events() {
            guardian.on_event(event);
        }
        client.join().unwrap()
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut guardian = guardian(&[]);

        let addr = guardian.start().unwrap().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(guardian.start().unwrap(), Some(addr));
        assert!(guardian.is_running());

        guardian.stop();
        guardian.stop();
        assert!(!guardian.is_running());
        assert_eq!(guardian.local_addr(), None);

        assert!(guardian.start().unwrap().is_some());
        assert!(guardian.is_running());
    }

    #[test]
    fn disabled_bridge_does_not_listen() {
        let mut guardian = guardian(&[("GUARDIAN_ENABLED", "false")]);
        assert_eq!(guardian.start().unwrap(), None);
        assert!(!guardian.is_running());
    }

    #[test]
    fn serves_commands_end_to_end() {
        let mut guardian = guardian(&[]);
        let mut host = host();
        let addr = guardian.start().unwrap().unwrap();

        let (status, body) = with_host_ticks(&mut guardian, &mut host, move || {
            http(addr, "POST", "/chat/send", "1001", r#"{"message":"hello","public":true}"#)
        });
        assert_eq!(status, 200, "{body}");
        assert_eq!(host.messages()[0].channel, ChatChannel::Public);

        let (status, _) = with_host_ticks(&mut guardian, &mut host, move || {
            http(addr, "POST", "/trade/request", "1001", r#"{"rsn":"Bob"}"#)
        });
        assert_eq!(status, 200);
        assert_eq!(guardian.trade_status().state, TradeState::WindowOpen);

        let (status, body) = with_host_ticks(&mut guardian, &mut host, move || {
            http(addr, "POST", "/trade/offer", "42", r#"{"amount":1000}"#)
        });
        assert_eq!(status, 403, "{body}");
        assert_eq!(host.offered(), None);
    }

    #[test]
    fn reloaded_authorizations_apply_to_later_requests() {
        let mut guardian = guardian(&[]);
        let mut host = host();
        let addr = guardian.start().unwrap().unwrap();

        guardian.reload_authorizations(AuthorizationList::parse_csv("42"));

        let (status, _) = with_host_ticks(&mut guardian, &mut host, move || {
            http(addr, "POST", "/trade/request", "1001", r#"{"rsn":"Bob"}"#)
        });
        assert_eq!(status, 403);

        let (status, _) = with_host_ticks(&mut guardian, &mut host, move || {
            http(addr, "POST", "/trade/request", "42", r#"{"rsn":"Bob"}"#)
        });
        assert_eq!(status, 200);
    }

    #[test]
    fn trade_session_survives_restart() {
        let mut guardian = guardian(&[]);
        let mut host = host();
        let addr = guardian.start().unwrap().unwrap();

        with_host_ticks(&mut guardian, &mut host, move || {
            http(addr, "POST", "/trade/request", "1001", r#"{"rsn":"Bob"}"#)
        });
        guardian.stop();
        assert_eq!(guardian.trade_status().state, TradeState::WindowOpen);

        let addr = guardian.start().unwrap().unwrap();
        let (status, body) = with_host_ticks(&mut guardian, &mut host, move || {
            http(addr, "GET", "/trade/status", "1001", "")
        });
        assert_eq!(status, 200);
        assert!(body.contains("window_open"), "{body}");
    }
}
