//! Scripted bridge and config source.

use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use waygate_api::{ApiError, ConfigSource};
use waygate_bridge::{BridgeError, PluginError, StatusHub, Subscription, TunnelBridge};
use waygate_core::{
    AccessDescriptor, RunningState, ServerAssignment, StartOutcome, StatusEvent, StopOutcome,
    TunnelStatus,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct BridgeScript {
    tunnel_ids: VecDeque<String>,
    minted: u64,
    start_delay: Duration,
    auto_push: Option<Duration>,
    fail_start: Option<String>,
    fail_stop: Option<String>,
    running: HashSet<String>,
    active: Option<String>,
    start_calls: usize,
    stop_calls: Vec<Option<String>>,
    query_calls: usize,
}

/// [`TunnelBridge`] whose behaviour is set by the test.
///
/// By default `start` hands out `t1`, `t2`, ... and the tunnel is running at
/// once with nothing pushed; use [`Self::with_auto_push`] to mimic the
/// plugin's delayed `connected` push instead.
#[derive(Debug, Default)]
pub struct ScriptedBridge {
    script: Arc<Mutex<BridgeScript>>,
    hub: Arc<StatusHub>,
}

impl ScriptedBridge {
    /// A bridge with default behaviour.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `connected` this long after each successful start.
    #[must_use]
    pub fn with_auto_push(self, delay: Duration) -> Self {
        lock(&self.script).auto_push = Some(delay);
        self
    }

    /// Hold every start call for `delay` before answering.
    #[must_use]
    pub fn with_start_delay(self, delay: Duration) -> Self {
        lock(&self.script).start_delay = delay;
        self
    }

    /// Hand out `id` from the next start.
    pub fn queue_tunnel_id(&self, id: impl Into<String>) {
        lock(&self.script).tunnel_ids.push_back(id.into());
    }

    /// Reject starts with `message`; `None` restores success.
    pub fn fail_start(&self, message: Option<&str>) {
        lock(&self.script).fail_start = message.map(str::to_string);
    }

    /// Reject stops with `message`; `None` restores success.
    pub fn fail_stop(&self, message: Option<&str>) {
        lock(&self.script).fail_stop = message.map(str::to_string);
    }

    /// Mark a tunnel as up or down for `is_running`.
    pub fn set_running(&self, id: &str, running: bool) {
        let mut script = lock(&self.script);
        if running {
            script.running.insert(id.to_string());
        } else {
            script.running.remove(id);
        }
    }

    /// Pretend a previous process left `id` as the active tunnel.
    pub fn set_active(&self, id: &str) {
        lock(&self.script).active = Some(id.to_string());
    }

    /// Deliver a push event now.
    pub fn push(&self, event: StatusEvent) {
        self.hub.publish(event);
    }

    /// Number of start calls, including failed ones.
    pub fn start_calls(&self) -> usize {
        lock(&self.script).start_calls
    }

    /// Arguments of every stop call.
    pub fn stop_calls(&self) -> Vec<Option<String>> {
        lock(&self.script).stop_calls.clone()
    }

    /// Number of running-state queries.
    pub fn query_calls(&self) -> usize {
        lock(&self.script).query_calls
    }
}

#[async_trait]
impl TunnelBridge for ScriptedBridge {
    async fn start(&self, endpoint: &str, display_name: Option<&str>) -> Result<StartOutcome, BridgeError> {
        let delay = {
            let mut script = lock(&self.script);
            script.start_calls += 1;
            script.start_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        AccessDescriptor::parse(endpoint).map_err(|e| BridgeError::InvalidConfig(e.message))?;

        let (id, auto_push) = {
            let mut script = lock(&self.script);
            if let Some(message) = script.fail_start.clone() {
                return Err(PluginError::Rejected { action: "start".to_string(), message }.into());
            }
            let id = match script.tunnel_ids.pop_front() {
                Some(id) => id,
                None => {
                    script.minted += 1;
                    format!("t{}", script.minted)
                },
            };
            script.active = Some(id.clone());
            if script.auto_push.is_none() {
                script.running.insert(id.clone());
            }
            (id, script.auto_push)
        };

        if let Some(delay) = auto_push {
            let script = Arc::clone(&self.script);
            let hub = Arc::clone(&self.hub);
            let pushed = id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                lock(&script).running.insert(pushed.clone());
                hub.publish(StatusEvent::new(pushed, TunnelStatus::Connected));
            });
        }

        Ok(StartOutcome {
            status: TunnelStatus::Connecting,
            tunnel_id: id,
            server: display_name.unwrap_or_default().to_string(),
        })
    }

    async fn stop(&self, tunnel_id: Option<&str>) -> Result<StopOutcome, BridgeError> {
        let mut script = lock(&self.script);
        script.stop_calls.push(tunnel_id.map(str::to_string));
        if let Some(message) = script.fail_stop.clone() {
            return Err(PluginError::Rejected { action: "stop".to_string(), message }.into());
        }

        let resolved = tunnel_id.map(str::to_string).or_else(|| script.active.clone());
        let Some(id) = resolved else {
            return Ok(StopOutcome { status: TunnelStatus::Disconnected, tunnel_id: String::new() });
        };
        script.running.remove(&id);
        script.active = None;
        Ok(StopOutcome { status: TunnelStatus::Disconnected, tunnel_id: id })
    }

    async fn is_running(&self, tunnel_id: Option<&str>) -> Result<RunningState, BridgeError> {
        let mut script = lock(&self.script);
        script.query_calls += 1;
        let Some(id) = tunnel_id.map(str::to_string).or_else(|| script.active.clone()) else {
            return Ok(RunningState::default());
        };
        let connected = script.running.contains(&id);
        Ok(RunningState { connected, tunnel_id: connected.then_some(id) })
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    fn active_tunnel_id(&self) -> Option<String> {
        lock(&self.script).active.clone()
    }

    fn clear_active_tunnel(&self) {
        lock(&self.script).active = None;
    }

    fn is_native(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
struct SourceScript {
    replies: VecDeque<Result<ServerAssignment, ApiError>>,
    delay: Duration,
    tokens: Vec<Option<String>>,
}

/// [`ConfigSource`] answering from a queue.
///
/// With the queue empty every fetch returns `ss://abc` on `Server-1`.
#[derive(Debug, Default)]
pub struct ScriptedConfigSource {
    script: Mutex<SourceScript>,
}

impl ScriptedConfigSource {
    /// A source with an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// The assignment returned when nothing is queued.
    pub fn default_assignment() -> ServerAssignment {
        ServerAssignment::new("ss://abc", "Server-1", 1)
    }

    /// Answer every fetch only after `delay`.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        lock(&self.script).delay = delay;
        self
    }

    /// Queue the next reply.
    pub fn queue(&self, reply: Result<ServerAssignment, ApiError>) {
        lock(&self.script).replies.push_back(reply);
    }

    /// Number of fetches so far.
    pub fn calls(&self) -> usize {
        lock(&self.script).tokens.len()
    }

    /// Token passed to each fetch.
    pub fn tokens(&self) -> Vec<Option<String>> {
        lock(&self.script).tokens.clone()
    }
}

#[async_trait]
impl ConfigSource for ScriptedConfigSource {
    async fn fetch(&self, token: Option<&str>) -> Result<ServerAssignment, ApiError> {
        let (reply, delay) = {
            let mut script = lock(&self.script);
            script.tokens.push(token.map(str::to_string));
            let reply = script.replies.pop_front().unwrap_or_else(|| Ok(Self::default_assignment()));
            (reply, script.delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        reply
    }
}
