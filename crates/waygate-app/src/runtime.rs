use std::sync::Arc;

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use waygate_bridge::BridgeError;
use waygate_core::{
    CommandError, ConnectError, ConnectionView, Environment, Reconciler, ReconcilerAction,
    RunningState, ServerAssignment, StartOutcome, StopOutcome,
};

use crate::{
    config::RuntimeConfig,
    handle::{Command, Reply, RuntimeHandle},
    services::Services,
};

/// Results of I/O started on behalf of the reconciler.
#[derive(Debug)]
enum Completion {
    ConfigFetched(Result<ServerAssignment, ConnectError>),
    TunnelStarted(Result<StartOutcome, ConnectError>),
    TunnelStopped(Result<StopOutcome, ConnectError>),
    Polled { queried: Option<String>, result: Result<RunningState, ConnectError> },
}

/// Event loop that owns the [`Reconciler`].
pub struct Runtime<E: Environment> {
    reconciler: Reconciler,
    services: Services,
    config: RuntimeConfig,
    env: E,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    view_tx: watch::Sender<ConnectionView>,
    pending_reply: Option<Reply>,
    refresh_waiters: Vec<oneshot::Sender<ConnectionView>>,
    poll_in_flight: bool,
}

/// Build a runtime and run it on a new task.
pub fn spawn<E: Environment>(services: Services, config: RuntimeConfig, env: E) -> (RuntimeHandle, JoinHandle<()>) {
    let (runtime, handle) = Runtime::new(services, config, env);
    (handle, tokio::spawn(runtime.run()))
}

impl<E: Environment> Runtime<E> {
    /// Create a runtime and the handle that drives it.
    pub fn new(services: Services, config: RuntimeConfig, env: E) -> (Self, RuntimeHandle) {
        let reconciler = Reconciler::new();
        let (commands_tx, commands) = mpsc::channel(config.command_queue_depth.max(1));
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(reconciler.view());

        let runtime = Self {
            reconciler,
            services,
            config,
            env,
            commands,
            completions_tx,
            completions,
            view_tx,
            pending_reply: None,
            refresh_waiters: Vec::new(),
            poll_in_flight: false,
        };
        (runtime, RuntimeHandle::new(commands_tx, view_rx))
    }

    /// Run until shut down or every handle is dropped.
    pub async fn run(mut self) {
        let mut subscription = self.services.bridge.subscribe();
        let mut push_open = true;

        // First tick fires immediately: the startup poll.
        let mut ticker = time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(native = self.services.bridge.is_native(), "runtime_started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(completion) = self.completions.recv() => self.handle_completion(completion),
                event = subscription.recv(), if push_open => match event {
                    Some(event) => {
                        self.reconciler.apply_status_event(&event, self.env.now_ms());
                    },
                    None => {
                        tracing::warn!("status_subscription_closed");
                        push_open = false;
                    },
                },
                _ = ticker.tick() => {
                    let actions = self.reconciler.poll();
                    self.execute(actions);
                },
            }
            self.publish();
        }

        tracing::info!("runtime_stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(reply) => {
                let requested = self.reconciler.request_connect();
                self.start_user_action(requested, reply);
            },
            Command::Disconnect(reply) => {
                let requested = self.reconciler.request_disconnect();
                self.start_user_action(requested, reply);
            },
            Command::Toggle(reply) => {
                let requested = self.reconciler.request_toggle();
                self.start_user_action(requested, reply);
            },
            Command::DismissError => self.reconciler.dismiss_error(),
            Command::Refresh(waiter) => {
                let actions = self.reconciler.poll();
                if actions.is_empty() && !self.poll_in_flight {
                    let _ = waiter.send(self.reconciler.view());
                } else {
                    self.refresh_waiters.push(waiter);
                    self.execute(actions);
                }
            },
            Command::Shutdown => {},
        }
    }

    fn start_user_action(&mut self, requested: Result<Vec<ReconcilerAction>, CommandError>, reply: Reply) {
        match requested {
            Ok(actions) => {
                self.pending_reply = Some(reply);
                self.execute(actions);
            },
            Err(err) => {
                tracing::debug!(error = %err, "user_action_rejected");
                let _ = reply.send(Err(err));
            },
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        let now_ms = self.env.now_ms();
        let actions = match completion {
            Completion::ConfigFetched(result) => self.reconciler.handle_config_fetched(result),
            Completion::TunnelStarted(result) => self.reconciler.handle_tunnel_started(result, now_ms),
            Completion::TunnelStopped(result) => self.reconciler.handle_tunnel_stopped(result),
            Completion::Polled { queried, result } => {
                self.poll_in_flight = false;
                self.reconciler.handle_poll_result(queried.as_deref(), result, now_ms);
                let view = self.reconciler.view();
                for waiter in self.refresh_waiters.drain(..) {
                    let _ = waiter.send(view.clone());
                }
                Vec::new()
            },
        };
        self.execute(actions);
    }

    fn execute(&mut self, actions: Vec<ReconcilerAction>) {
        for action in actions {
            match action {
                ReconcilerAction::FetchConfig => self.fetch_config(),
                ReconcilerAction::StartTunnel { endpoint, display_name } => {
                    let bridge = Arc::clone(&self.services.bridge);
                    self.complete_with(async move {
                        let result = bridge.start(endpoint.as_str(), Some(&display_name)).await;
                        Completion::TunnelStarted(result.map_err(start_failure))
                    });
                },
                ReconcilerAction::StopTunnel { tunnel_id } => {
                    let bridge = Arc::clone(&self.services.bridge);
                    self.complete_with(async move {
                        let result = bridge.stop(tunnel_id.as_deref()).await;
                        Completion::TunnelStopped(result.map_err(|e| ConnectError::bridge(e.to_string())))
                    });
                },
                ReconcilerAction::QueryTunnel { tunnel_id } => {
                    if self.poll_in_flight {
                        continue;
                    }
                    self.poll_in_flight = true;
                    let bridge = Arc::clone(&self.services.bridge);
                    self.complete_with(async move {
                        let result = bridge.is_running(tunnel_id.as_deref()).await;
                        Completion::Polled {
                            queried: tunnel_id,
                            result: result.map_err(|e| ConnectError::new(e.kind(), e.to_string())),
                        }
                    });
                },
                ReconcilerAction::PersistTunnel { tunnel_id } => {
                    if let Err(e) = self.services.identity.set_tunnel_handle(&tunnel_id) {
                        tracing::warn!(error = %e, "tunnel_handle_save_failed");
                    }
                },
                ReconcilerAction::ForgetTunnel => {
                    if let Err(e) = self.services.identity.clear_tunnel_handle() {
                        tracing::warn!(error = %e, "tunnel_handle_clear_failed");
                    }
                },
                ReconcilerAction::Complete { operation, outcome } => {
                    tracing::debug!(%operation, ok = outcome.is_ok(), "user_action_complete");
                    if let Some(reply) = self.pending_reply.take() {
                        let _ = reply.send(outcome.map_err(CommandError::Failed));
                    }
                },
            }
        }
    }

    fn fetch_config(&self) {
        let token = self.services.identity.auth_token().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "auth_token_read_failed");
            None
        });
        let source = Arc::clone(&self.services.config_source);
        self.complete_with(async move {
            let result = source.fetch(token.as_deref()).await;
            Completion::ConfigFetched(result.map_err(ConnectError::from))
        });
    }

    fn complete_with(&self, io: impl Future<Output = Completion> + Send + 'static) {
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(io.await);
        });
    }

    fn publish(&self) {
        let view = self.reconciler.view();
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }
}

fn start_failure(err: BridgeError) -> ConnectError {
    ConnectError::new(err.kind(), format!("VPN connection failed: {err}"))
}
