//! `ControllerInstance`: owns the Transport, Runner, FlowController,
//! QueryTimer, and EventTrigger, and drives the single cooperative event
//! loop described in the concurrency model.

use crate::command::{apply_override_delta, force_stop_sequence, rapid_override_fraction, to_relaxed_json, DriverCommand};
use crate::event_trigger::EventTrigger;
use crate::expression::{Context, ExpressionStage};
use crate::flow_controller::FlowController;
use crate::query_timer::QueryTimer;
use crate::runner::{Frame, Runner};
use crate::status_codes;
use crate::transport::{Transport, TransportEvent};
use serde_json::json;
use std::collections::BTreeMap;
use tinygd_config::DriverConfig;
use tinygd_core::{ControllerEvent, EventDispatcher, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

/// True for the wire protocol's single-byte control characters (`!`, `~`,
/// `%`, `^d`, `^x`), which must be written raw with no newline appended.
fn is_control_byte(s: &str) -> bool {
    matches!(s, "!" | "~" | "%" | "\u{4}" | "\u{18}")
}

/// Single-controller, single-task driver instance
pub struct ControllerInstance {
    transport: Box<dyn Transport>,
    runner: Runner,
    flow: FlowController,
    query_timer: QueryTimer,
    event_trigger: EventTrigger,
    events: EventDispatcher,
    config: DriverConfig,
    stage: ExpressionStage,
    shared_context: BTreeMap<String, f64>,
    ready: bool,
    clock_ms: u64,
}

impl ControllerInstance {
    pub fn new(transport: Box<dyn Transport>, config: DriverConfig) -> Self {
        let status_mask: BTreeMap<String, bool> = config.initial_status_mask.clone();
        Self {
            runner: Runner::new(config.planner_buffer_pool_size_default, status_mask),
            flow: FlowController::new(config.low_water, config.high_water),
            query_timer: QueryTimer::new(config.finish_grace_ms),
            event_trigger: EventTrigger::default(),
            events: EventDispatcher::default(),
            stage: ExpressionStage::default(),
            shared_context: BTreeMap::new(),
            ready: false,
            clock_ms: 0,
            transport,
            config,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    fn now_ms(&mut self) -> u64 {
        self.clock_ms += 1;
        self.clock_ms
    }

    fn context(&mut self) -> Context {
        let now = self.now_ms();
        let mut ctx = Context::new(now);
        ctx.global = self.shared_context.clone();
        ctx.machine_position = self.runner.machine_position();
        ctx.work_position = self.runner.work_position(None);
        ctx.modal = self.runner.modal_group().clone();
        ctx.tool = self.runner.tool();
        ctx
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        if line.is_empty() {
            return Ok(());
        }
        if !self.transport.is_open() {
            warn!(%line, "transport closed, dropping outbound line");
            return Ok(());
        }
        let mut bytes = line.as_bytes().to_vec();
        if !line.ends_with('\n') {
            bytes.push(b'\n');
        }
        self.transport.write(&bytes).await?;
        self.events.emit(ControllerEvent::ConnectionWrite { data: line.to_string() });
        Ok(())
    }

    /// Write raw bytes verbatim, with no trailing-newline logic. Used for
    /// the single-byte control characters (`!`, `~`, `^d`, `^x`) that must
    /// not be followed by a line terminator.
    async fn write_raw(&mut self, data: &str) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        if !self.transport.is_open() {
            warn!(%data, "transport closed, dropping outbound control byte");
            return Ok(());
        }
        self.transport.write(data.as_bytes()).await?;
        self.events.emit(ControllerEvent::ConnectionWrite { data: data.to_string() });
        Ok(())
    }

    /// Outbound writes during `init_controller` longer than the configured
    /// limit are dropped rather than risking a firmware serial-buffer
    /// overflow.
    async fn write_init_line(&mut self, line: &str) -> Result<()> {
        if line.len() >= self.config.serial_buffer_limit {
            warn!(len = line.len(), limit = self.config.serial_buffer_limit, "dropping oversized init command");
            return Ok(());
        }
        self.write_line(line).await
    }

    /// Transport open handshake (§4.8)
    pub async fn on_open(&mut self) -> Result<()> {
        self.events.emit(ControllerEvent::ControllerType { controller_type: "tinyg".to_string() });
        self.events.emit(ControllerEvent::ConnectionOpen);
        self.events.emit(ControllerEvent::ConnectionChange { connected: true });
        let _ = self.flow.stop();
        self.shared_context.clear();
        self.flow.sender.unload();

        tokio::time::sleep(std::time::Duration::from_millis(self.config.init_delay_ms)).await;
        self.ready = true;

        self.init_controller().await?;

        if let Some(line) = self.event_trigger.trigger("controller:ready").await {
            let ctx = self.context();
            self.flow.feeder.feed(vec![line], ctx);
        }
        Ok(())
    }

    /// The nine-step bring-up sequence (§6)
    async fn init_controller(&mut self) -> Result<()> {
        let sleep = |ms: u64| tokio::time::sleep(std::time::Duration::from_millis(ms));

        self.write_init_line(r#"{"ej":1}"#).await?;
        self.write_init_line(r#"{"jv":4}"#).await?;
        self.write_init_line(r#"{"qv":1}"#).await?;
        self.write_init_line(r#"{"sv":1}"#).await?;
        self.write_init_line(r#"{"si":100}"#).await?;

        for probe in ["spe", "spd", "spc", "sps", "com", "cof"] {
            self.write_init_line(&format!("{{\"{probe}\":null}}")).await?;
            sleep(100).await;
        }

        sleep(200).await;
        let mask = &self.runner.model().status_mask;
        let fields: serde_json::Map<String, serde_json::Value> = mask
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(k, _)| (k.clone(), serde_json::Value::Bool(true)))
            .collect();
        let relaxed = to_relaxed_json(&serde_json::Value::Object(fields));
        self.write_init_line(&relaxed).await?;

        self.write_init_line(r#"{"sys":null}"#).await?;
        self.write_init_line(r#"{"mt":null}"#).await?;
        self.write_init_line(r#"{"pwr":null}"#).await?;
        self.write_init_line(r#"{"qr":null}"#).await?;
        self.write_init_line(r#"{"sr":null}"#).await?;

        sleep(50).await;
        Ok(())
    }

    /// Feed raw transport bytes to the Runner and dispatch every decoded
    /// frame into the FlowController.
    pub async fn on_data(&mut self, bytes: &[u8]) -> Result<()> {
        self.events.emit(ControllerEvent::ConnectionRead { data: String::from_utf8_lossy(bytes).into_owned() });
        let frames = self.runner.feed(bytes);
        for frame in frames {
            self.on_frame(frame).await?;
        }
        Ok(())
    }

    async fn on_frame(&mut self, frame: Frame) -> Result<()> {
        let now = self.now_ms();
        match frame {
            Frame::Ack { .. } => {
                let alarm = self.runner.is_alarm();
                let outcome = self.flow.on_r(now, &self.stage, alarm)?;
                for line in outcome.writes {
                    self.write_line(&line).await?;
                }
                for event in outcome.events {
                    self.events.emit(event);
                }
            }
            Frame::Qr { q } => {
                let pool = self.runner.planner_buffer_pool_size();
                let alarm = self.runner.is_alarm();
                let outcome = self.flow.on_qr(q, pool, now, &self.stage, alarm)?;
                for line in outcome.writes {
                    self.write_line(&line).await?;
                }
                for event in outcome.events {
                    self.events.emit(event);
                }
            }
            Frame::Footer { code, .. } => {
                if code != 0 {
                    let message = status_codes::lookup(code);
                    let outcome = self.flow.on_footer_error(code, message, None);
                    for event in outcome.events {
                        self.events.emit(event);
                    }
                }
            }
            Frame::Sr(_) | Frame::Fb(_) | Frame::Hp(_) => {
                self.tick_query_timer().await;
            }
            Frame::Raw(raw) => {
                if self.flow.workflow.state() == tinygd_core::WorkflowState::Idle {
                    self.events.emit(ControllerEvent::Raw(raw));
                }
            }
        }
        Ok(())
    }

    /// Called on the QueryTimer's fixed period, or opportunistically after a
    /// status frame updates the Runner model.
    pub async fn tick_query_timer(&mut self) {
        let now = self.clock_ms;
        let outcome = self.query_timer.tick(self.runner.model(), &self.flow.feeder, &self.flow.sender, self.ready, now);
        for event in outcome.events {
            self.events.emit(event);
        }
        if outcome.program_finished {
            let _ = self.handle_command(DriverCommand::SenderStop { force: false }).await;
        }
    }

    /// Dispatch one named client command (§6). Unknown names are logged and
    /// ignored at the call site via `DriverCommand`'s closed enum — there is
    /// no "unknown command" variant to reach here by construction.
    pub async fn handle_command(&mut self, command: DriverCommand) -> Result<()> {
        match command {
            DriverCommand::SenderLoad { name, content } => {
                let ctx = self.context();
                self.flow.sender.load(name.clone(), &content, ctx)?;
                self.events.emit(ControllerEvent::SenderLoad { name, total: self.flow.sender.total() });
            }
            DriverCommand::SenderUnload => {
                self.flow.sender.unload();
                self.events.emit(ControllerEvent::SenderUnload);
            }
            DriverCommand::SenderStart => {
                let outcome = self.flow.start(&self.stage)?;
                for line in outcome.writes {
                    self.write_line(&line).await?;
                }
                for event in outcome.events {
                    self.events.emit(event);
                }
            }
            DriverCommand::SenderStop { force } => {
                if force {
                    let build = self.runner.model().settings.firmware_build;
                    for line in force_stop_sequence(build) {
                        if is_control_byte(&line) {
                            self.write_raw(&line).await?;
                        } else {
                            self.write_line(&line).await?;
                        }
                    }
                }
                let outcome = self.flow.stop();
                for event in outcome.events {
                    self.events.emit(event);
                }
            }
            DriverCommand::SenderPause => {
                let outcome = self.flow.pause("sender:pause")?;
                for event in outcome.events {
                    self.events.emit(event);
                }
            }
            DriverCommand::SenderResume => {
                let outcome = self.flow.resume(&self.stage)?;
                for line in outcome.writes {
                    self.write_line(&line).await?;
                }
                for event in outcome.events {
                    self.events.emit(event);
                }
            }
            DriverCommand::FeederStart { lines } => {
                let ctx = self.context();
                self.flow.feeder.feed(lines, ctx);
            }
            DriverCommand::FeederStop => {
                self.flow.feeder.reset();
            }
            DriverCommand::Feedhold => {
                self.write_raw("!").await?;
            }
            DriverCommand::CycleStart => {
                self.write_raw("~").await?;
            }
            DriverCommand::Homing => {
                self.write_line("G28.2 X0 Y0 Z0").await?;
            }
            DriverCommand::Sleep => {}
            DriverCommand::Unlock => {
                self.write_line(r#"{"clear":null}"#).await?;
            }
            DriverCommand::Reset => {
                let _ = self.flow.stop();
                self.flow.feeder.reset();
                self.write_raw("\u{18}").await?;
            }
            DriverCommand::OverrideFeed { percent_delta } => {
                let cur = self.runner.model().settings.feed_override;
                let next = apply_override_delta(cur, percent_delta);
                self.write_line(&json!({ "mfo": next }).to_string()).await?;
            }
            DriverCommand::OverrideSpindle { percent_delta } => {
                let cur = self.runner.model().settings.spindle_override;
                let next = apply_override_delta(cur, percent_delta);
                self.write_line(&json!({ "sso": next }).to_string()).await?;
            }
            DriverCommand::OverrideRapid { value } => {
                if let Some(fraction) = rapid_override_fraction(value) {
                    self.write_line(&json!({ "mto": fraction }).to_string()).await?;
                } else {
                    warn!(value, "ignoring unsupported rapid override value");
                }
            }
            DriverCommand::MotorEnable { timeout_sec } => {
                if let Some(sec) = timeout_sec {
                    self.write_line(&json!({ "mt": sec }).to_string()).await?;
                }
                self.write_line(r#"{"me":null}"#).await?;
            }
            DriverCommand::MotorDisable => {
                self.write_line(r#"{"md":null}"#).await?;
            }
            DriverCommand::MotorTimeout { sec } => {
                self.write_line(&json!({ "mt": sec }).to_string()).await?;
            }
            DriverCommand::LaserTest { power, duration_ms, max_s } => {
                let s_value = power.min(max_s);
                self.write_line(&format!("M3 S{s_value}")).await?;
                tokio::time::sleep(std::time::Duration::from_millis(duration_ms)).await;
                self.write_line("M5").await?;
            }
            DriverCommand::Gcode { lines } => {
                let ctx = self.context();
                self.flow.feeder.feed(lines, ctx);
            }
            DriverCommand::MacroRun { id } | DriverCommand::MacroLoad { id } => {
                if let Some(line) = self.event_trigger.trigger(&format!("macro:{id}")).await {
                    let ctx = self.context();
                    self.flow.feeder.feed(vec![line], ctx);
                }
            }
            DriverCommand::WatchDirLoad { path } => {
                info!(path, "watchdir:load is handled by the external file-watching macro loader");
            }
        }
        Ok(())
    }

    /// Drive the single cooperative event loop until the transport closes.
    pub async fn run(mut self, mut commands: mpsc::Receiver<DriverCommand>) -> Result<()> {
        let mut transport_rx = self.transport.open().await?;
        self.on_open().await?;

        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(self.config.query_timer_period_ms));

        loop {
            tokio::select! {
                event = transport_rx.recv() => {
                    match event {
                        Some(TransportEvent::Data(bytes)) => { self.on_data(&bytes).await?; }
                        Some(TransportEvent::Error(message)) => {
                            self.ready = false;
                            self.events.emit(ControllerEvent::ConnectionError { message: message.clone() });
                        }
                        Some(TransportEvent::Close(reason)) => {
                            self.ready = false;
                            self.events.emit(ControllerEvent::ConnectionChange { connected: false });
                            self.events.emit(ControllerEvent::ConnectionClose { error: reason });
                            return Ok(());
                        }
                        None => {
                            self.ready = false;
                            self.events.emit(ControllerEvent::ConnectionChange { connected: false });
                            self.events.emit(ControllerEvent::ConnectionClose { error: None });
                            return Ok(());
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.tick_query_timer().await;
                }
                cmd = commands.recv() => {
                    match cmd {
                        Some(command) => {
                            if let Err(e) = self.handle_command(command).await {
                                warn!(error = %e, "command handler returned an error");
                            }
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::loopback::LoopbackTransport;

    fn test_config() -> DriverConfig {
        let mut cfg = DriverConfig::default();
        cfg.init_delay_ms = 0;
        cfg
    }

    #[tokio::test]
    async fn open_handshake_emits_connection_open_and_sets_ready() {
        let (transport, handle) = LoopbackTransport::new();
        let mut instance = ControllerInstance::new(Box::new(transport), test_config());
        let mut events = instance.subscribe();

        instance.transport.open().await.unwrap();
        instance.on_open().await.unwrap();

        assert!(instance.is_ready());
        assert_eq!(
            events.try_recv().unwrap(),
            ControllerEvent::ControllerType { controller_type: "tinyg".to_string() }
        );
        assert_eq!(events.try_recv().unwrap(), ControllerEvent::ConnectionOpen);
        assert_eq!(events.try_recv().unwrap(), ControllerEvent::ConnectionChange { connected: true });
        let written = handle.take_written();
        assert!(String::from_utf8_lossy(&written).contains("\"ej\":1"));
    }

    #[tokio::test]
    async fn gcode_command_is_queued_on_the_feeder() {
        let (transport, _handle) = LoopbackTransport::new();
        let mut instance = ControllerInstance::new(Box::new(transport), test_config());
        instance.handle_command(DriverCommand::Gcode { lines: vec!["G0 X1".to_string()] }).await.unwrap();
        assert!(instance.flow.feeder.peek());
    }

    #[tokio::test]
    async fn sender_load_then_start_emits_workflow_running() {
        let (transport, _handle) = LoopbackTransport::new();
        let mut instance = ControllerInstance::new(Box::new(transport), test_config());
        let mut events = instance.subscribe();
        instance.handle_command(DriverCommand::SenderLoad { name: "p".into(), content: "G0 X1".into() }).await.unwrap();
        instance.handle_command(DriverCommand::SenderStart).await.unwrap();

        let mut saw_running = false;
        while let Ok(event) = events.try_recv() {
            if event == ControllerEvent::WorkflowState(tinygd_core::WorkflowState::Running) {
                saw_running = true;
            }
        }
        assert!(saw_running);
    }
}
