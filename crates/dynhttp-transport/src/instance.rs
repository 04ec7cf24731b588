//! A running server instance.
//!
//! Each instance owns a dedicated multi-threaded tokio runtime sized from
//! the thread pool options; request handling never runs on the caller's
//! thread. Starting and stopping block the caller, so both must be called
//! from a plain thread rather than from inside an async task.

use std::io;
use std::path::Path;
use std::sync::Arc;

use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use dynhttp_config::{LifecycleError, LifecycleResult, ServerOptions, ThreadPoolOptions};
use hyper_util::rt::TokioTimer;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connector::{ConnectorSet, ListenerInfo};
use crate::front_door::{FrontDoor, InitParams, router};
use crate::session::{SessionEventSink, SessionStore, spawn_housekeeper};

type Teardown = Box<dyn FnOnce() + Send>;

pub struct ServerInstance {
    runtime: Option<Runtime>,
    listeners: Vec<ListenerInfo>,
    handles: Vec<Handle>,
    accept_loops: Vec<JoinHandle<io::Result<()>>>,
    housekeeper: Option<JoinHandle<()>>,
    sessions: Arc<SessionStore>,
    params: Arc<InitParams>,
    destroy: Option<Teardown>,
}

impl ServerInstance {
    /// Start serving on every listener in `connectors`.
    ///
    /// Returns once every listener is accepting. On failure everything
    /// started so far is torn down again before the error is returned.
    pub fn start<F: FrontDoor>(
        options: &ServerOptions,
        connectors: ConnectorSet,
        workspace: &Path,
        front_door: Arc<F>,
    ) -> LifecycleResult<Self> {
        let params = Arc::new(InitParams::new(options, &connectors.infos(), workspace));
        let runtime = thread_pool(&options.pid, &options.threads)?;

        let events: Arc<dyn SessionEventSink> = front_door.clone();
        let sessions = Arc::new(SessionStore::new(options.context.session_max_inactive, events));
        let housekeeper = options
            .context
            .housekeeper_interval
            .map(|interval| spawn_housekeeper(sessions.clone(), interval, runtime.handle()));

        let mut instance = Self {
            runtime: Some(runtime),
            listeners: Vec::new(),
            handles: Vec::new(),
            accept_loops: Vec::new(),
            housekeeper,
            sessions,
            params,
            destroy: None,
        };

        if let Err(e) = front_door.init(&instance.params) {
            instance.shutdown();
            return Err(LifecycleError::transport(format!("front door init failed: {e}")));
        }
        let teardown = front_door.clone();
        instance.destroy = Some(Box::new(move || teardown.destroy()));

        if let Err(e) = instance.serve(connectors, front_door) {
            instance.shutdown();
            return Err(e);
        }

        for listener in &instance.listeners {
            info!("Listening on {}{}", listener.base_url(), instance.params.context_path);
        }
        Ok(instance)
    }

    fn serve<F: FrontDoor>(&mut self, connectors: ConnectorSet, front_door: Arc<F>) -> LifecycleResult<()> {
        let Some(runtime) = self.runtime.as_ref() else {
            return Err(LifecycleError::transport("thread pool is gone"));
        };

        for bound in connectors.into_vec() {
            let (info, listener, tls) = bound.into_parts();
            let app = router(
                front_door.clone(),
                self.params.clone(),
                info.clone(),
                self.sessions.clone(),
            );
            let handle = Handle::new();
            let server_handle = handle.clone();

            let accept_loop = match tls {
                Some(config) => runtime.spawn(async move {
                    axum_server::from_tcp_rustls(listener, RustlsConfig::from_config(config))
                        .handle(server_handle)
                        .serve(app.into_make_service())
                        .await
                }),
                None => {
                    let idle_timeout = info.idle_timeout;
                    runtime.spawn(async move {
                        let mut server = axum_server::from_tcp(listener).handle(server_handle);
                        if let Some(timeout) = idle_timeout {
                            server
                                .http_builder()
                                .http1()
                                .timer(TokioTimer::new())
                                .header_read_timeout(timeout);
                        }
                        server.serve(app.into_make_service()).await
                    })
                }
            };

            self.handles.push(handle.clone());
            self.accept_loops.push(accept_loop);
            self.listeners.push(info.clone());

            if runtime.block_on(handle.listening()).is_none() {
                let reason = match self.accept_loops.pop() {
                    Some(task) => match runtime.block_on(task) {
                        Ok(Err(e)) => e.to_string(),
                        Ok(Ok(())) => "accept loop exited".to_string(),
                        Err(e) => e.to_string(),
                    },
                    None => "accept loop missing".to_string(),
                };
                return Err(LifecycleError::transport(format!(
                    "listener {} failed to start: {reason}",
                    info.base_url()
                )));
            }
            debug!("Accepting on {}", info.base_url());
        }
        Ok(())
    }

    pub fn listeners(&self) -> &[ListenerInfo] {
        &self.listeners
    }

    pub fn params(&self) -> &InitParams {
        &self.params
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Stop accepting, close open connections, and release the thread pool.
    ///
    /// In-flight requests are not waited for; their connections are dropped
    /// with the runtime.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };

        for handle in &self.handles {
            handle.shutdown();
        }
        for task in self.accept_loops.drain(..) {
            match runtime.block_on(task) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Accept loop ended with error: {e}"),
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!("Accept loop panicked: {e}"),
            }
        }
        self.handles.clear();

        if let Some(housekeeper) = self.housekeeper.take() {
            housekeeper.abort();
        }

        let discarded = self.sessions.invalidate_all();
        if discarded > 0 {
            debug!("Discarded {discarded} session(s)");
        }

        if let Some(destroy) = self.destroy.take() {
            destroy();
        }

        runtime.shutdown_background();
        info!("Server instance for {} stopped", self.params.pid);
    }
}

impl Drop for ServerInstance {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker and blocking-pool sizes for a thread pool.
fn pool_sizes(threads: &ThreadPoolOptions) -> (usize, usize) {
    let workers = threads.max_threads.max(1);
    (workers, workers)
}

fn thread_pool(pid: &str, threads: &ThreadPoolOptions) -> LifecycleResult<Runtime> {
    let (workers, blocking) = pool_sizes(threads);
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .max_blocking_threads(blocking)
        .thread_name(format!("dynhttp-{pid}"))
        .enable_all()
        .build()
        .map_err(|e| LifecycleError::transport(format!("cannot build thread pool: {e}")))
}
