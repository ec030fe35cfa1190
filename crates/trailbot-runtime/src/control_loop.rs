//! [`ControlLoop`] – the serialized follower loop.
//!
//! One task owns every piece of mutable follower state: the scanner's cached
//! tables, the [`TargetFusion`] state, the obstacle monitor, the active
//! [`BehaviorController`] and the enable flag.  Everything else talks to it
//! through a cloneable [`ControlHandle`] that feeds a bounded queue, so no two
//! messages are ever processed concurrently and the hot path takes no locks.
//!
//! Each loop iteration handles exactly one of:
//!
//! 1. **Sensor** – a depth frame is scanned and folded into fusion; face and
//!    color detections are folded directly.  The blended controller is
//!    evaluated after every depth frame.
//! 2. **Tick** – a `tick_hz` interval fires; the state-machine controller is
//!    evaluated against the latest signals, with stale detections masked.
//! 3. **Admin** – `set_following`, `reconfigure` or `status`.
//!
//! The enable gate comes first at every evaluation point: while disabled each
//! evaluation emits a zero command and the controller never runs.
//!
//! When every [`ControlHandle`] has been dropped the loop publishes a final
//! zero command and returns.
//!
//! # Example
//!
//! ```rust,no_run
//! use trailbot_hal::display::NullMarkerSink;
//! use trailbot_hal::greeter::LogGreeter;
//! use trailbot_hal::sim::SimDriveBase;
//! use trailbot_runtime::control_loop::{ControlLoop, Outputs};
//! use trailbot_types::{FollowState, FollowerConfig};
//!
//! # async fn demo() -> Result<(), trailbot_types::FollowError> {
//! let outputs = Outputs::new(SimDriveBase::new(), LogGreeter, NullMarkerSink);
//! let (control, handle) = ControlLoop::new(FollowerConfig::default(), outputs)?;
//! let task = tokio::spawn(control.run());
//!
//! handle.set_following(FollowState::Stopped).await;
//! drop(handle);
//! task.await.ok();
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use trailbot_hal::display::MarkerSink;
use trailbot_hal::drive::CommandSink;
use trailbot_hal::greeter::Greeter;
use trailbot_middleware::EventBus;
use trailbot_perception::{
    DepthFieldScanner, Observation, ObstacleMonitor, SignalSnapshot, TargetFusion,
};
use trailbot_types::{
    BusEvent, BusPayload, FollowError, FollowResult, FollowState, FollowerConfig, Policy,
    RobotState, SensorEvent, SensorPayload, VelocityCommand, rate_period,
};

use crate::controller::{BehaviorController, Decision, Trigger, controller_for};
use crate::markers::diagnostic_markers;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Messages buffered before `submit` waits.
const QUEUE_CAPACITY: usize = 64;

const SOURCE: &str = "trailbot-runtime::control_loop";

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the loop can be asked to do.
#[derive(Debug)]
pub enum LoopMessage {
    Sensor(SensorEvent),
    SetFollowing(FollowState, oneshot::Sender<FollowResult>),
    Reconfigure(Box<FollowerConfig>, oneshot::Sender<Result<(), FollowError>>),
    Status(oneshot::Sender<LoopStatus>),
}

/// Point-in-time view of the loop for operators.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopStatus {
    pub enabled: bool,
    pub policy: Policy,
    pub state: Option<RobotState>,
    pub signals: SignalSnapshot,
    pub commands_sent: u64,
    pub last_command: Option<VelocityCommand>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Outputs
// ─────────────────────────────────────────────────────────────────────────────

/// The hardware seams the loop drives.
pub struct Outputs {
    pub commands: Box<dyn CommandSink>,
    pub greeter: Box<dyn Greeter>,
    pub markers: Box<dyn MarkerSink>,
    /// Receives state-change and fault notices when set.
    pub bus: Option<EventBus>,
}

impl Outputs {
    pub fn new(
        commands: impl CommandSink + 'static,
        greeter: impl Greeter + 'static,
        markers: impl MarkerSink + 'static,
    ) -> Self {
        Self {
            commands: Box::new(commands),
            greeter: Box::new(greeter),
            markers: Box::new(markers),
            bus: None,
        }
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable front door to a running [`ControlLoop`].
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<LoopMessage>,
}

impl ControlHandle {
    /// Queue a sensor event, waiting while the queue is full.
    pub async fn submit(&self, event: SensorEvent) -> Result<(), FollowError> {
        self.tx
            .send(LoopMessage::Sensor(event))
            .await
            .map_err(|_| closed())
    }

    /// Start or stop following.  Idempotent.
    ///
    /// Returns [`FollowResult::Error`] only if the loop has exited.
    pub async fn set_following(&self, state: FollowState) -> FollowResult {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(LoopMessage::SetFollowing(state, reply)).await.is_err() {
            return FollowResult::Error;
        }
        rx.await.unwrap_or(FollowResult::Error)
    }

    /// Validate and install a new configuration.
    ///
    /// `enabled = false` stops following; `enabled = true` never restarts a
    /// stopped loop, only [`set_following`](Self::set_following) does.
    ///
    /// # Errors
    ///
    /// [`FollowError::InvalidConfig`] when `config` fails validation (the
    /// previous configuration stays active), or [`FollowError::Channel`] if
    /// the loop has exited.
    pub async fn reconfigure(&self, config: FollowerConfig) -> Result<(), FollowError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(LoopMessage::Reconfigure(Box::new(config), reply))
            .await
            .map_err(|_| closed())?;
        rx.await.map_err(|_| closed())?
    }

    pub async fn status(&self) -> Result<LoopStatus, FollowError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(LoopMessage::Status(reply))
            .await
            .map_err(|_| closed())?;
        rx.await.map_err(|_| closed())
    }
}

fn closed() -> FollowError {
    FollowError::Channel("control loop has stopped".to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ─────────────────────────────────────────────────────────────────────────────

pub struct ControlLoop {
    config: FollowerConfig,
    scanner: DepthFieldScanner,
    fusion: TargetFusion,
    obstacle: ObstacleMonitor,
    controller: Box<dyn BehaviorController>,
    enabled: bool,
    outputs: Outputs,
    rx: mpsc::Receiver<LoopMessage>,
    last_state: Option<RobotState>,
    commands_sent: u64,
    last_command: Option<VelocityCommand>,
}

impl ControlLoop {
    /// Build a loop and the handle that feeds it.
    ///
    /// # Errors
    ///
    /// Returns [`FollowError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: FollowerConfig, outputs: Outputs) -> Result<(Self, ControlHandle), FollowError> {
        config.validate()?;
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let control = Self {
            scanner: DepthFieldScanner::default(),
            fusion: TargetFusion::new(&config),
            obstacle: ObstacleMonitor::new(config.obstacle_point_threshold),
            controller: controller_for(config.policy),
            enabled: config.enabled,
            outputs,
            rx,
            last_state: None,
            commands_sent: 0,
            last_command: None,
            config,
        };
        Ok((control, ControlHandle { tx }))
    }

    pub fn config(&self) -> &FollowerConfig {
        &self.config
    }

    /// Process messages and ticks until every handle is dropped.
    pub async fn run(mut self) {
        info!(
            policy = %self.config.policy,
            enabled = self.enabled,
            tick_hz = self.config.tick_hz,
            "control loop started"
        );
        let mut ticker = make_ticker(self.config.tick_hz);
        loop {
            tokio::select! {
                msg = self.rx.recv() => {
                    let Some(msg) = msg else { break };
                    let tick_hz = self.config.tick_hz;
                    self.handle(msg);
                    if self.config.tick_hz != tick_hz {
                        ticker = make_ticker(self.config.tick_hz);
                    }
                }
                _ = ticker.tick() => self.on_tick(),
            }
        }
        self.emit(VelocityCommand::zero());
        info!(commands_sent = self.commands_sent, "control loop stopped");
    }

    fn handle(&mut self, msg: LoopMessage) {
        match msg {
            LoopMessage::Sensor(event) => self.on_sensor(event),
            LoopMessage::SetFollowing(state, reply) => {
                let _ = reply.send(self.set_following(state));
            }
            LoopMessage::Reconfigure(config, reply) => {
                let _ = reply.send(self.reconfigure(*config));
            }
            LoopMessage::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn on_sensor(&mut self, event: SensorEvent) {
        let now = Instant::now().into_std();
        match event.payload {
            SensorPayload::Depth(frame) => {
                let obs = self.scanner.scan(&frame, &self.config.search_box());
                self.obstacle.update(obs.point_count);
                self.fusion.update(Observation::Depth(obs), now);
                if self.controller.trigger() == Trigger::DepthFrame {
                    self.evaluate(None);
                }
            }
            SensorPayload::Faces(faces) => {
                self.fusion.update(Observation::Face(faces), now);
            }
            SensorPayload::Color(color) => {
                self.fusion.update(Observation::Color(color), now);
            }
        }
    }

    fn on_tick(&mut self) {
        if self.controller.trigger() == Trigger::Tick {
            let max_age = Duration::from_millis(self.config.signal_timeout_ms);
            self.evaluate(Some(max_age));
        }
    }

    fn evaluate(&mut self, max_age: Option<Duration>) {
        if !self.enabled {
            self.emit(VelocityCommand::zero());
            return;
        }
        let signals = self.fusion.signals(Instant::now().into_std(), max_age);
        let decision = self.controller.evaluate(&signals, &self.config);
        self.apply(decision, &signals);
    }

    fn apply(&mut self, decision: Decision, signals: &SignalSnapshot) {
        if let Some(state) = decision.state
            && self.last_state != Some(state)
        {
            self.last_state = Some(state);
            self.notify(BusPayload::StateChanged(state));
        }
        if let Some(cmd) = decision.command {
            self.emit(cmd);
        }
        if decision.greet {
            info!(phrase = %self.config.greeting, "greeting");
            if let Err(e) = self.outputs.greeter.greet(&self.config.greeting) {
                warn!(error = %e, "greeting failed");
                self.fault("greeter", &e);
            }
        }
        let markers = diagnostic_markers(decision.target.as_ref(), signals.nearest_z, &self.config);
        if let Err(e) = self.outputs.markers.publish_markers(&markers) {
            debug!(error = %e, "marker publish failed");
        }
    }

    fn set_following(&mut self, state: FollowState) -> FollowResult {
        match (self.enabled, state) {
            (true, FollowState::Stopped) => {
                info!("following stopped");
                self.emit(VelocityCommand::zero());
                self.enabled = false;
                self.controller.reset();
                self.last_state = None;
            }
            (false, FollowState::Follow) => {
                info!("following (re)started");
                self.enabled = true;
            }
            _ => debug!(?state, "follow state unchanged"),
        }
        self.config.enabled = self.enabled;
        FollowResult::Ok
    }

    fn reconfigure(&mut self, config: FollowerConfig) -> Result<(), FollowError> {
        if let Err(e) = config.validate() {
            warn!(error = %e, "reconfigure rejected; keeping previous configuration");
            return Err(e);
        }
        if config.policy != self.config.policy {
            info!(from = %self.config.policy, to = %config.policy, "switching policy");
            self.controller = controller_for(config.policy);
            self.last_state = None;
        }
        self.fusion.reconfigure(&config);
        self.obstacle.set_threshold(config.obstacle_point_threshold);
        // Only `set_following` turns following back on.
        let disable = !config.enabled;
        self.config = config;
        self.config.enabled = self.enabled;
        if disable {
            self.set_following(FollowState::Stopped);
        }
        info!("configuration updated");
        Ok(())
    }

    fn status(&self) -> LoopStatus {
        LoopStatus {
            enabled: self.enabled,
            policy: self.config.policy,
            state: self.controller.state(),
            signals: self.fusion.signals(Instant::now().into_std(), None),
            commands_sent: self.commands_sent,
            last_command: self.last_command,
        }
    }

    fn emit(&mut self, cmd: VelocityCommand) {
        match self.outputs.commands.publish(cmd) {
            Ok(()) => {
                self.commands_sent += 1;
                self.last_command = Some(cmd);
            }
            Err(e) => {
                warn!(sink = self.outputs.commands.id(), error = %e, "command not delivered");
                self.fault("command_sink", &e);
            }
        }
    }

    fn notify(&self, payload: BusPayload) {
        if let Some(bus) = &self.outputs.bus {
            bus.publish(BusEvent::new(SOURCE, payload));
        }
    }

    fn fault(&self, component: &str, error: &FollowError) {
        self.notify(BusPayload::Fault {
            component: component.to_string(),
            message: error.to_string(),
        });
    }
}

fn make_ticker(tick_hz: f32) -> Interval {
    let mut ticker = interval(rate_period(tick_hz));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use trailbot_hal::sim::{SimDriveBase, SimGreeter, SimMarkerSink};
    use trailbot_types::MAX_RATE_HZ;

    struct Rig {
        control: ControlLoop,
        base: SimDriveBase,
        greeter: SimGreeter,
        markers: SimMarkerSink,
        _handle: ControlHandle,
    }

    fn rig(config: FollowerConfig) -> Rig {
        let base = SimDriveBase::new();
        let greeter = SimGreeter::new();
        let markers = SimMarkerSink::new();
        let outputs = Outputs::new(base.clone(), greeter.clone(), markers.clone());
        let (control, handle) = ControlLoop::new(config, outputs).unwrap();
        Rig {
            control,
            base,
            greeter,
            markers,
            _handle: handle,
        }
    }

    fn fsm() -> FollowerConfig {
        FollowerConfig {
            policy: Policy::StateMachine,
            ..FollowerConfig::default()
        }
    }

    fn close_face() -> SensorEvent {
        SensorEvent::new(
            "test/faces",
            SensorPayload::Faces(trailbot_types::FaceObservation {
                faces: vec![trailbot_types::FaceBox {
                    center_x: 320.0,
                    center_y: 240.0,
                    width: 150.0,
                    height: 150.0,
                }],
            }),
        )
    }

    #[test]
    fn invalid_config_rejected_at_construction() {
        let config = FollowerConfig {
            max_z: -1.0,
            ..FollowerConfig::default()
        };
        let outputs = Outputs::new(SimDriveBase::new(), SimGreeter::new(), SimMarkerSink::new());
        assert!(ControlLoop::new(config, outputs).is_err());
    }

    #[tokio::test]
    async fn fsm_tick_without_signals_searches() {
        let mut r = rig(fsm());
        r.control.on_tick();
        let cmd = r.base.last_command().unwrap();
        assert!((cmd.linear_x - 0.3).abs() < 1e-6);
        assert_eq!(r.markers.frames(), 1);
    }

    #[tokio::test]
    async fn fsm_greets_once_while_engaged() {
        let mut r = rig(fsm());
        r.control.on_sensor(close_face());
        for _ in 0..10 {
            r.control.on_tick();
        }
        assert_eq!(r.greeter.count(), 1);
        assert_eq!(r.control.controller.state(), Some(RobotState::Engage));
        // Engage issues no command.
        assert!(r.base.commands().is_empty());
    }

    #[tokio::test]
    async fn disabled_loop_emits_zero_and_never_greets() {
        let mut r = rig(FollowerConfig {
            enabled: false,
            ..fsm()
        });
        r.control.on_sensor(close_face());
        for _ in 0..5 {
            r.control.on_tick();
        }
        assert_eq!(r.greeter.count(), 0);
        let cmds = r.base.commands();
        assert_eq!(cmds.len(), 5);
        assert!(cmds.iter().all(|c| c.is_zero()));
    }

    #[tokio::test]
    async fn stopping_emits_zero_and_resets_fsm() {
        let mut r = rig(fsm());
        r.control.on_sensor(close_face());
        r.control.on_tick();
        assert_eq!(r.control.controller.state(), Some(RobotState::Engage));

        assert_eq!(r.control.set_following(FollowState::Stopped), FollowResult::Ok);
        assert!(r.base.last_command().unwrap().is_zero());
        assert_eq!(r.control.controller.state(), Some(RobotState::Search));

        // Idempotent: a second stop emits nothing further.
        let sent = r.base.commands().len();
        assert_eq!(r.control.set_following(FollowState::Stopped), FollowResult::Ok);
        assert_eq!(r.base.commands().len(), sent);

        // Re-enabling resumes on the next tick and greets on re-entry.
        r.control.set_following(FollowState::Follow);
        r.control.on_tick();
        assert_eq!(r.greeter.count(), 2);
    }

    #[tokio::test]
    async fn reconfigure_rejects_invalid_and_keeps_previous() {
        let mut r = rig(FollowerConfig::default());
        let bad = FollowerConfig {
            min_x: 1.0,
            max_x: 0.0,
            ..FollowerConfig::default()
        };
        assert!(r.control.reconfigure(bad).is_err());
        assert!((r.control.config().min_x + 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn reconfigure_switches_policy() {
        let mut r = rig(FollowerConfig::default());
        assert_eq!(r.control.controller.name(), "blended");
        r.control.reconfigure(fsm()).unwrap();
        assert_eq!(r.control.controller.name(), "state_machine");
        assert_eq!(r.control.status().policy, Policy::StateMachine);
    }

    #[tokio::test]
    async fn reconfigure_disable_emits_zero() {
        let mut r = rig(fsm());
        r.control.on_tick();
        r.control
            .reconfigure(FollowerConfig {
                enabled: false,
                ..fsm()
            })
            .unwrap();
        assert!(!r.control.status().enabled);
        assert!(r.base.last_command().unwrap().is_zero());
    }

    #[tokio::test]
    async fn reconfigure_never_restarts_a_stopped_loop() {
        let mut r = rig(FollowerConfig::default());
        r.control.set_following(FollowState::Stopped);
        assert!(!r.control.config().enabled);
        r.base.clear_history();

        r.control.reconfigure(fsm()).unwrap();
        assert!(!r.control.status().enabled);
        assert!(!r.control.config().enabled);
        for _ in 0..3 {
            r.control.on_tick();
        }
        let cmds = r.base.commands();
        assert_eq!(cmds.len(), 3);
        assert!(cmds.iter().all(|c| c.is_zero()));

        r.control.set_following(FollowState::Follow);
        assert!(r.control.config().enabled);
        r.control.on_tick();
        assert!((r.base.last_command().unwrap().linear_x - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn reconfigure_rejects_unschedulable_tick_rate() {
        let mut r = rig(fsm());
        let bad = FollowerConfig {
            tick_hz: 1e10,
            ..fsm()
        };
        assert!(r.control.reconfigure(bad).is_err());
        assert!((r.control.config().tick_hz - 10.0).abs() < 1e-6);
        assert_eq!(make_ticker(1e10).period(), rate_period(MAX_RATE_HZ));
    }

    #[tokio::test]
    async fn blended_ignores_ticks() {
        let mut r = rig(FollowerConfig::default());
        r.control.on_tick();
        assert!(r.base.commands().is_empty());
        assert_eq!(r.markers.frames(), 0);
    }
}
