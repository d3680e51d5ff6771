//! Model-based property tests.
//!
//! Random operation sequences are applied to the reference model and to the
//! real reconciler; observable state must agree after every step.
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!    ModelConnection   RealWorld       Compare
//!     (reference)    (Reconciler)      State
//! ```

use proptest::prelude::*;
use waygate_core::{
    CommandError, ConnectError, ConnectionStatus, ErrorKind, Reconciler, ReconcilerAction,
    RunningState, ServerAssignment, StartOutcome, StatusEvent, StopOutcome, TunnelStatus,
};
use waygate_harness::{ModelConnection, ModelReject, Operation, SimEnv, model::tunnel_name};

const BASE_MS: u64 = 1_700_000_000_000;

/// Real reconciler behind the model's interface.
struct RealWorld {
    reconciler: Reconciler,
    now_ms: u64,
}

impl RealWorld {
    fn new() -> Self {
        Self { reconciler: Reconciler::new(), now_ms: BASE_MS }
    }

    fn apply(&mut self, op: Operation) -> Result<(), ModelReject> {
        match op {
            Operation::Connect => self.request(Reconciler::request_connect),
            Operation::Disconnect => self.request(Reconciler::request_disconnect),
            Operation::Toggle => self.request(Reconciler::request_toggle),
            Operation::Dismiss => {
                self.reconciler.dismiss_error();
                Ok(())
            },
            Operation::ConfigOk { valid } => {
                let url = if valid { "ss://abc" } else { "http://bad" };
                self.reconciler.handle_config_fetched(Ok(ServerAssignment::new(url, "Server-1", 1)));
                Ok(())
            },
            Operation::ConfigErr => {
                let err = ConnectError::new(ErrorKind::Timeout, "Request timed out");
                self.reconciler.handle_config_fetched(Err(err));
                Ok(())
            },
            Operation::StartOk { tunnel } => {
                let outcome = StartOutcome {
                    status: TunnelStatus::Connecting,
                    tunnel_id: tunnel_name(tunnel),
                    server: "Server-1".to_string(),
                };
                self.reconciler.handle_tunnel_started(Ok(outcome), self.now_ms);
                Ok(())
            },
            Operation::StartErr => {
                let err = ConnectError::bridge("VPN connection failed: denied");
                self.reconciler.handle_tunnel_started(Err(err), self.now_ms);
                Ok(())
            },
            Operation::StopOk => {
                let outcome = StopOutcome { status: TunnelStatus::Disconnected, tunnel_id: String::new() };
                self.reconciler.handle_tunnel_stopped(Ok(outcome));
                Ok(())
            },
            Operation::StopErr => {
                self.reconciler.handle_tunnel_stopped(Err(ConnectError::bridge("stop rejected")));
                Ok(())
            },
            Operation::Push { tunnel, code } => {
                let event = StatusEvent::new(tunnel_name(tunnel), TunnelStatus::from_code(i64::from(code)));
                self.reconciler.apply_status_event(&event, self.now_ms);
                Ok(())
            },
            Operation::Poll { running, tunnel } => {
                for action in self.reconciler.poll() {
                    if let ReconcilerAction::QueryTunnel { tunnel_id } = action {
                        let state = RunningState { connected: running, tunnel_id: running.then(|| tunnel_name(tunnel)) };
                        self.reconciler.handle_poll_result(tunnel_id.as_deref(), Ok(state), self.now_ms);
                    }
                }
                Ok(())
            },
            Operation::AdvanceTime { millis } => {
                self.now_ms += u64::from(millis);
                Ok(())
            },
        }
    }

    fn request(
        &mut self,
        f: fn(&mut Reconciler) -> Result<Vec<ReconcilerAction>, CommandError>,
    ) -> Result<(), ModelReject> {
        match f(&mut self.reconciler) {
            Ok(_) => Ok(()),
            Err(CommandError::Busy) => Err(ModelReject::Busy),
            Err(_) => Err(ModelReject::InvalidTransition),
        }
    }
}

fn operation_strategy() -> impl Strategy<Value = Operation> {
    let tunnel = 0..6u8;
    prop_oneof![
        3 => Just(Operation::Connect),
        2 => Just(Operation::Disconnect),
        1 => Just(Operation::Toggle),
        1 => Just(Operation::Dismiss),
        3 => any::<bool>().prop_map(|valid| Operation::ConfigOk { valid }),
        1 => Just(Operation::ConfigErr),
        3 => tunnel.clone().prop_map(|tunnel| Operation::StartOk { tunnel }),
        1 => Just(Operation::StartErr),
        2 => Just(Operation::StopOk),
        1 => Just(Operation::StopErr),
        3 => (tunnel.clone(), -1..6i8).prop_map(|(tunnel, code)| Operation::Push { tunnel, code }),
        2 => (any::<bool>(), tunnel).prop_map(|(running, tunnel)| Operation::Poll { running, tunnel }),
        2 => any::<u16>().prop_map(|millis| Operation::AdvanceTime { millis }),
    ]
}

proptest! {
    /// Observable state agrees with the model after every operation.
    #[test]
    fn prop_model_matches_real(ops in prop::collection::vec(operation_strategy(), 0..80)) {
        let mut model = ModelConnection::new(BASE_MS);
        let mut real = RealWorld::new();

        for (i, op) in ops.iter().enumerate() {
            let model_result = model.apply(*op);
            let real_result = real.apply(*op);
            prop_assert_eq!(model_result, real_result, "result diverged at {}: {:?}", i, op);

            let record = real.reconciler.record();
            prop_assert_eq!(record.status, model.status, "status diverged at {}: {:?}", i, op);
            prop_assert_eq!(&record.tunnel_id, &model.tunnel, "tunnel diverged at {}: {:?}", i, op);
            prop_assert_eq!(record.connected_at_ms, model.connected_at_ms, "stamp diverged at {}: {:?}", i, op);
            prop_assert_eq!(record.last_error.as_ref().map(|e| e.kind), model.error, "error diverged at {}: {:?}", i, op);
            prop_assert_eq!(real.reconciler.is_busy(), model.is_busy(), "lock diverged at {}: {:?}", i, op);
            prop_assert_eq!(
                real.reconciler.awaiting_confirmation(),
                model.awaiting.as_deref(),
                "confirmation diverged at {}: {:?}",
                i,
                op
            );
        }
    }

    /// Record invariants hold after any sequence.
    #[test]
    fn prop_invariants(ops in prop::collection::vec(operation_strategy(), 0..120)) {
        let mut real = RealWorld::new();

        for op in ops {
            let _ = real.apply(op);
            let record = real.reconciler.record();

            prop_assert_eq!(record.connected_at_ms.is_some(), record.status == ConnectionStatus::Connected);
            if record.status == ConnectionStatus::Disconnected && !real.reconciler.is_busy() {
                prop_assert!(record.tunnel_id.is_none());
            }
            if record.status == ConnectionStatus::Error {
                prop_assert!(record.last_error.is_some());
            }
            if let Some(unconfirmed) = real.reconciler.awaiting_confirmation() {
                prop_assert_eq!(record.status, ConnectionStatus::Connected);
                prop_assert_eq!(record.tunnel_id.as_deref(), Some(unconfirmed));
            }
        }
    }

    /// Between a successful start and its first push, not-running polls
    /// leave the connection and its stamp alone.
    #[test]
    fn prop_unconfirmed_start_survives_polls(
        tunnel in 0..6u8,
        gaps in prop::collection::vec(any::<u16>(), 1..6),
    ) {
        let mut real = RealWorld::new();
        for op in [Operation::Connect, Operation::ConfigOk { valid: true }, Operation::StartOk { tunnel }] {
            real.apply(op).unwrap();
        }
        let started = real.reconciler.record().clone();

        for millis in gaps {
            real.apply(Operation::AdvanceTime { millis }).unwrap();
            real.apply(Operation::Poll { running: false, tunnel }).unwrap();
            prop_assert_eq!(real.reconciler.record(), &started);
        }

        real.apply(Operation::Push { tunnel, code: 0 }).unwrap();
        prop_assert_eq!(real.reconciler.record(), &started);
        prop_assert_eq!(real.reconciler.awaiting_confirmation(), None);
    }

    /// Pushes naming a tunnel other than the held one never change anything.
    #[test]
    fn prop_foreign_pushes_are_inert(
        ops in prop::collection::vec(operation_strategy(), 0..40),
        code in -1..6i8,
    ) {
        let mut real = RealWorld::new();
        for op in ops {
            let _ = real.apply(op);
        }
        let before = real.reconciler.record().clone();
        let Some(held) = before.tunnel_id.clone() else {
            return Ok(());
        };

        let event = StatusEvent::new(format!("{held}-other"), TunnelStatus::from_code(i64::from(code)));
        prop_assert!(!real.reconciler.apply_status_event(&event, BASE_MS));
        prop_assert_eq!(real.reconciler.record(), &before);
    }
}

mod smoke_tests {
    use super::*;

    #[test]
    fn connect_then_push_reconnect_cycle() {
        let mut model = ModelConnection::new(BASE_MS);
        let mut real = RealWorld::new();
        let script = [
            Operation::Connect,
            Operation::ConfigOk { valid: true },
            Operation::StartOk { tunnel: 1 },
            Operation::AdvanceTime { millis: 5_000 },
            Operation::Push { tunnel: 1, code: 2 },
            Operation::AdvanceTime { millis: 1_000 },
            Operation::Push { tunnel: 1, code: 0 },
        ];
        for op in script {
            assert_eq!(model.apply(op), real.apply(op));
        }

        assert_eq!(real.reconciler.record().status, ConnectionStatus::Connected);
        assert_eq!(real.reconciler.record().connected_at_ms, Some(BASE_MS + 6_000));
        assert_eq!(model.connected_at_ms, Some(BASE_MS + 6_000));
    }

    #[test]
    fn poll_between_start_and_push_keeps_stamp() {
        let mut model = ModelConnection::new(BASE_MS);
        let mut real = RealWorld::new();
        let script = [
            Operation::Connect,
            Operation::ConfigOk { valid: true },
            Operation::StartOk { tunnel: 1 },
            Operation::AdvanceTime { millis: 100 },
            Operation::Poll { running: false, tunnel: 1 },
            Operation::AdvanceTime { millis: 200 },
            Operation::Push { tunnel: 1, code: 0 },
            Operation::Poll { running: true, tunnel: 1 },
        ];
        for op in script {
            assert_eq!(model.apply(op), real.apply(op));
        }

        assert_eq!(real.reconciler.record().status, ConnectionStatus::Connected);
        assert_eq!(real.reconciler.record().connected_at_ms, Some(BASE_MS));
        assert_eq!(model.connected_at_ms, Some(BASE_MS));
    }

    #[test]
    fn error_only_through_classified_paths() {
        let mut real = RealWorld::new();
        real.apply(Operation::Connect).unwrap();
        real.apply(Operation::ConfigOk { valid: false }).unwrap();

        let err = real.reconciler.record().last_error.clone().unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidConfig);
        assert_eq!(err.message, "Invalid access key format from server");
    }

    #[test]
    fn sim_env_is_deterministic_per_seed() {
        use waygate_core::Environment;

        let a = SimEnv::with_seed(7);
        let b = SimEnv::with_seed(7);
        let mut x = [0u8; 6];
        let mut y = [0u8; 6];
        a.random_bytes(&mut x);
        b.random_bytes(&mut y);
        assert_eq!(x, y);
    }
}
