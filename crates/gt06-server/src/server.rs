use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use gt06_message::{CommandEncoder, Event};
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::capture::{Direction, FrameCapture};
use crate::config::ServerConfig;
use crate::error::{QueueError, Result, ServerError, SinkError};
use crate::queue::{AckOutcome, CommandQueue, Dispatch, EnqueueOutcome, QueueSnapshot, QueueStatus};
use crate::registry::{ConnectionRegistry, SessionHandle, SessionId, SessionInfo};
use crate::script::{check_command, CommandScript};
use crate::session;
use crate::sink::EventSink;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Result of handing commands to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submitted {
    pub outcome: EnqueueOutcome,
    /// The IMEI has a live session.
    pub connected: bool,
    /// A command went out immediately.
    pub dispatched: bool,
}

/// State shared by the accept loop, session tasks, the sweep and operators.
pub struct ServerState {
    config: ServerConfig,
    registry: ConnectionRegistry,
    queue: Mutex<CommandQueue>,
    encoder: CommandEncoder,
    script: CommandScript,
    sink: Arc<dyn EventSink>,
    capture: Option<FrameCapture>,
    /// IMEIs that already got the script from `auto_script`. Kept for the
    /// life of the process, one entry per device seen, so a completed or
    /// cancelled script is not queued again on the next login.
    scripted: Mutex<HashSet<String>>,
    next_session: AtomicU64,
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

impl ServerState {
    pub fn new(config: ServerConfig, script: CommandScript, sink: Arc<dyn EventSink>) -> Self {
        let queue = CommandQueue::new(config.queue.clone());
        Self {
            config,
            registry: ConnectionRegistry::new(),
            queue: Mutex::new(queue),
            encoder: CommandEncoder::default(),
            script,
            sink,
            capture: None,
            scripted: Mutex::new(HashSet::new()),
            next_session: AtomicU64::new(1),
        }
    }

    /// Log every frame in both directions to `capture`.
    pub fn with_capture(mut self, capture: FrameCapture) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn script(&self) -> &CommandScript {
        &self.script
    }

    fn lock_queue(&self) -> MutexGuard<'_, CommandQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue one operator command for `imei`.
    pub fn submit(
        &self,
        imei: &str,
        command: &str,
        override_busy: bool,
    ) -> std::result::Result<Submitted, QueueError> {
        check_command(command).map_err(|source| QueueError::InvalidCommand {
            command: command.to_string(),
            source,
        })?;
        self.enqueue(imei, vec![command.to_string()], override_busy)
    }

    /// Queue the configuration script for one IMEI, or for every connected
    /// IMEI when `imei` is `None`.
    pub fn replay_script(
        &self,
        imei: Option<&str>,
    ) -> Vec<(String, std::result::Result<Submitted, QueueError>)> {
        let targets = match imei {
            Some(imei) => vec![imei.to_string()],
            None => self.registry.imeis(),
        };
        targets
            .into_iter()
            .map(|imei| {
                let result = self.enqueue(&imei, self.script.commands().to_vec(), false);
                (imei, result)
            })
            .collect()
    }

    fn enqueue(
        &self,
        imei: &str,
        commands: Vec<String>,
        override_busy: bool,
    ) -> std::result::Result<Submitted, QueueError> {
        let session = self.registry.get(imei).map(|handle| handle.id);
        let (outcome, dispatch) = {
            let mut queue = self.lock_queue();
            let outcome = queue.enqueue(imei, commands, override_busy)?;
            let dispatch = session.and_then(|id| queue.attach(imei, id, now()));
            (outcome, dispatch)
        };
        let dispatched = dispatch.is_some();
        if let Some(dispatch) = dispatch {
            self.deliver(dispatch);
        }
        Ok(Submitted {
            outcome,
            connected: session.is_some(),
            dispatched,
        })
    }

    /// Drop everything pending for `imei`.
    pub fn cancel(&self, imei: &str) -> bool {
        let removed = self.lock_queue().cancel(imei);
        if removed {
            info!(imei, "queue cancelled");
        }
        removed
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.registry.list()
    }

    pub fn queue_status(&self) -> Vec<QueueStatus> {
        self.lock_queue().status(now())
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.lock_queue().snapshot()
    }

    /// Restore saved progress against the loaded script.
    pub fn restore(&self, snapshot: &QueueSnapshot) -> usize {
        self.lock_queue().restore(snapshot, self.script.commands())
    }

    pub(crate) fn next_session_id(&self) -> SessionId {
        SessionId(self.next_session.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn publish(&self, event: &Event) -> std::result::Result<(), SinkError> {
        self.sink.publish(event)
    }

    pub(crate) fn capture(&self, direction: Direction, imei: Option<&str>, frame: &[u8]) {
        if let Some(capture) = &self.capture {
            if let Err(err) = capture.record(direction, imei, frame) {
                warn!(%err, "frame capture failed");
            }
        }
    }

    /// A session bound an IMEI: register it and resume its queue.
    pub(crate) fn on_login(&self, handle: SessionHandle) {
        let imei = handle.imei.clone();
        let id = handle.id;
        if let Some(previous) = self.registry.register(handle) {
            if previous.id != id {
                info!(imei = %imei, previous = %previous.id, session = %id, "session replaced");
            }
        }

        let first_login = self.config.auto_script
            && !self.script.is_empty()
            && self
                .scripted
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(imei.clone());

        let dispatch = {
            let mut queue = self.lock_queue();
            if first_login && !queue.contains(&imei) {
                if let Ok(outcome) = queue.enqueue(&imei, self.script.commands().to_vec(), false) {
                    debug!(imei = %imei, ?outcome, "script queued on first login");
                }
            }
            queue.attach(&imei, id, now())
        };
        if let Some(dispatch) = dispatch {
            self.deliver(dispatch);
        }
    }

    /// A session ended. Only clears state that still belongs to it.
    pub(crate) fn on_disconnect(&self, imei: &str, id: SessionId) {
        let deregistered = self.registry.deregister(imei, id);
        let detached = self.lock_queue().detach(imei, id);
        debug!(imei, session = %id, deregistered, detached, "session released");
    }

    /// A 0x15 reply arrived for `imei`.
    pub(crate) fn on_command_ack(self: &Arc<Self>, imei: &str, reply: &str) {
        let outcome = self.lock_queue().acknowledge(imei, now());
        match outcome {
            AckOutcome::Ignored => debug!(imei, reply, "reply with nothing awaiting ack"),
            AckOutcome::Completed => info!(imei, reply, "all queued commands acknowledged"),
            AckOutcome::Advanced { settle } => {
                info!(imei, reply, "command acknowledged");
                let state = Arc::clone(self);
                let imei = imei.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(settle).await;
                    state.kick(&imei);
                });
            }
        }
    }

    fn kick(&self, imei: &str) {
        let dispatch = self.lock_queue().next_dispatch(imei, now());
        if let Some(dispatch) = dispatch {
            self.deliver(dispatch);
        }
    }

    pub(crate) fn sweep(&self) {
        let dispatches = self.lock_queue().sweep(now());
        for dispatch in dispatches {
            self.deliver(dispatch);
        }
    }

    /// Encode and hand a command to its session. Called with no lock held.
    fn deliver(&self, dispatch: Dispatch) {
        let Some(handle) = self
            .registry
            .get(&dispatch.imei)
            .filter(|handle| handle.id == dispatch.session)
        else {
            debug!(imei = %dispatch.imei, "session gone, command stays pending");
            return;
        };

        match self.encoder.encode(&dispatch.command) {
            Ok((serial, frame)) => {
                if handle.send(frame) {
                    info!(
                        imei = %dispatch.imei,
                        command = %dispatch.command,
                        serial,
                        attempt = dispatch.attempt,
                        "command sent"
                    );
                } else {
                    warn!(
                        imei = %dispatch.imei,
                        command = %dispatch.command,
                        "command not handed to session, will retry on timeout"
                    );
                }
            }
            Err(err) => {
                error!(imei = %dispatch.imei, command = %dispatch.command, %err, "dropping unencodable command");
                self.lock_queue().cancel(&dispatch.imei);
            }
        }
    }
}

/// Accepts device connections and runs the ack-timeout sweep.
pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl Server {
    /// Bind the configured address.
    pub async fn bind(state: Arc<ServerState>) -> Result<Self> {
        let addr = state.config().bind;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        info!(addr = %listener.local_addr()?, "listening");
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Serve until the process ends.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` completes. Sessions already running are left
    /// to finish on their own.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let sweep = tokio::spawn(sweep_loop(Arc::clone(&self.state)));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&self.state);
                        let id = state.next_session_id();
                        tokio::spawn(session::run(state, stream, peer, id));
                    }
                    Err(err) => warn!(%err, "accept failed"),
                },
            }
        }

        sweep.abort();
        Ok(())
    }
}

async fn sweep_loop(state: Arc<ServerState>) {
    let period = state.config().sweep_interval.max(MIN_SWEEP_INTERVAL);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        state.sweep();
    }
}
