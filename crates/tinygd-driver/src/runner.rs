//! Frame decoder: turns transport bytes into classified TinyG/g2core frames
//! and maintains a mirror of machine state and settings.

use serde_json::Value;
use std::collections::BTreeMap;
use tinygd_core::{FirmwareError, ModalGroup, PartialPosition, Position};
use tracing::warn;

/// A classified, decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Acknowledgement; `line` is the echoed `r.n`, `nulls` lists capability
    /// fields the firmware replied to with JSON `null` (unsupported).
    Ack { line: Option<u32>, nulls: Vec<String> },
    /// Planner queue report: number of free planner-buffer slots
    Qr { q: u32 },
    /// Status report
    Sr(Value),
    /// Firmware build number
    Fb(f64),
    /// Hardware platform identifier
    Hp(f64),
    /// Footer array; `code` is element [1]
    Footer { code: u32, raw: Vec<Value> },
    /// Anything that didn't match a recognized top-level key
    Raw(String),
}

/// Settings mirrored from firmware replies (`fb`, `mfo`, `sso`, `mto`, `mt`, …)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerSettings {
    pub firmware_build: Option<f64>,
    pub feed_override: f64,
    pub spindle_override: f64,
    pub rapid_override: f64,
    pub motor_timeout: Option<f64>,
    pub planner_buffer_pool_size: u32,
}

impl RunnerSettings {
    fn defaults(planner_buffer_pool_size: u32) -> Self {
        Self {
            firmware_build: None,
            feed_override: 1.0,
            spindle_override: 1.0,
            rapid_override: 1.0,
            motor_timeout: None,
            planner_buffer_pool_size,
        }
    }
}

/// Mirror of live machine state, updated as frames are decoded
#[derive(Debug, Clone, Default)]
pub struct RunnerModel {
    pub machine_position: Position,
    pub work_position: Position,
    pub modal: ModalGroup,
    pub tool: u32,
    pub status: Option<String>,
    pub settings: RunnerSettings,
    pub planner_buffer_pool_size: u32,
    pub last_qr: Option<u32>,
    pub status_mask: BTreeMap<String, bool>,
}

/// Line-buffering JSON frame decoder
pub struct Runner {
    buf: Vec<u8>,
    model: RunnerModel,
}

impl Runner {
    pub fn new(planner_buffer_pool_size_default: u32, status_mask: BTreeMap<String, bool>) -> Self {
        Self {
            buf: Vec::new(),
            model: RunnerModel {
                settings: RunnerSettings::defaults(planner_buffer_pool_size_default),
                planner_buffer_pool_size: planner_buffer_pool_size_default,
                status_mask,
                ..Default::default()
            },
        }
    }

    pub fn model(&self) -> &RunnerModel {
        &self.model
    }

    pub fn machine_position(&self) -> Position {
        self.model.machine_position
    }

    pub fn work_position(&self, state_override: Option<Position>) -> Position {
        state_override.unwrap_or(self.model.work_position)
    }

    pub fn modal_group(&self) -> &ModalGroup {
        &self.model.modal
    }

    pub fn tool(&self) -> u32 {
        self.model.tool
    }

    pub fn is_alarm(&self) -> bool {
        self.model.status.as_deref() == Some("alarm")
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.model.status.as_deref(), Some("idle") | Some("ready") | None)
    }

    pub fn planner_buffer_pool_size(&self) -> u32 {
        self.model.planner_buffer_pool_size
    }

    /// Accumulate bytes and return every complete, decoded frame they yield
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            frames.push(self.decode_line(trimmed));
        }
        frames
    }

    fn decode_line(&mut self, line: &str) -> Frame {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, line, "failed to parse firmware frame as JSON");
                return Frame::Raw(line.to_string());
            }
        };
        let frame = self.classify(&value);
        self.apply(&frame, &value);
        frame
    }

    fn classify(&self, value: &Value) -> Frame {
        if let Some(r) = value.get("r") {
            let line = r.get("n").and_then(Value::as_u64).map(|n| n as u32);
            let nulls = r
                .as_object()
                .map(|obj| {
                    obj.iter()
                        .filter(|(_, v)| v.is_null())
                        .map(|(k, _)| k.clone())
                        .collect()
                })
                .unwrap_or_default();
            return Frame::Ack { line, nulls };
        }
        if let Some(qr) = value.get("qr").and_then(Value::as_u64) {
            return Frame::Qr { q: qr as u32 };
        }
        if let Some(sr) = value.get("sr") {
            return Frame::Sr(sr.clone());
        }
        if let Some(fb) = value.get("fb").and_then(Value::as_f64) {
            return Frame::Fb(fb);
        }
        if let Some(hp) = value.get("hp").and_then(Value::as_f64) {
            return Frame::Hp(hp);
        }
        if let Some(f) = value.get("f").and_then(Value::as_array) {
            let code = f.get(1).and_then(Value::as_u64).unwrap_or(0) as u32;
            return Frame::Footer { code, raw: f.clone() };
        }
        Frame::Raw(value.to_string())
    }

    fn apply(&mut self, frame: &Frame, raw: &Value) {
        match frame {
            Frame::Ack { nulls, .. } => {
                for field in nulls {
                    self.model.status_mask.insert(field.clone(), false);
                }
            }
            Frame::Qr { q } => {
                self.model.last_qr = Some(*q);
            }
            Frame::Sr(sr) => self.apply_status_report(sr),
            Frame::Fb(fb) => self.model.settings.firmware_build = Some(*fb),
            Frame::Hp(_) => {}
            Frame::Footer { .. } => {}
            Frame::Raw(_) => {}
        }
        if let Some(obj) = raw.as_object() {
            if let Some(mfo) = obj.get("mfo").and_then(Value::as_f64) {
                self.model.settings.feed_override = mfo;
            }
            if let Some(sso) = obj.get("sso").and_then(Value::as_f64) {
                self.model.settings.spindle_override = sso;
            }
            if let Some(mto) = obj.get("mto").and_then(Value::as_f64) {
                self.model.settings.motor_timeout = Some(mto);
            }
        }
    }

    fn apply_status_report(&mut self, sr: &Value) {
        if let Some(pos) = extract_position(sr, "pos") {
            self.model.work_position = merge(self.model.work_position, pos);
        }
        if let Some(pos) = extract_position(sr, "mpos") {
            self.model.machine_position = merge(self.model.machine_position, pos);
        }
        if let Some(stat) = sr.get("stat").and_then(Value::as_u64) {
            self.model.status = Some(status_name(stat).to_string());
        }
        if let Some(tool) = sr.get("tool").and_then(Value::as_u64) {
            self.model.tool = tool as u32;
        }
        if let Some(momo) = sr.get("momo").and_then(Value::as_str) {
            self.model.modal.motion = Some(momo.to_string());
        }
        if let Some(coor) = sr.get("coor").and_then(Value::as_str) {
            self.model.modal.wcs = Some(coor.to_string());
        }
        if let Some(unit) = sr.get("unit").and_then(Value::as_str) {
            self.model.modal.units = Some(unit.to_string());
        }
    }
}

/// Translate a `{"f":[0,<code>,...]}` footer into a `FirmwareError` if non-zero
pub fn footer_error(code: u32, message: &str) -> Option<FirmwareError> {
    if code == 0 {
        None
    } else {
        Some(FirmwareError::StatusError { code, message: message.to_string() })
    }
}

fn extract_position(sr: &Value, key: &str) -> Option<PartialPosition> {
    let obj = sr.get(key)?.as_object()?;
    Some(PartialPosition {
        x: obj.get("x").and_then(Value::as_f64),
        y: obj.get("y").and_then(Value::as_f64),
        z: obj.get("z").and_then(Value::as_f64),
        a: obj.get("a").and_then(Value::as_f64),
        b: obj.get("b").and_then(Value::as_f64),
        c: obj.get("c").and_then(Value::as_f64),
    })
}

fn merge(base: Position, partial: PartialPosition) -> Position {
    Position {
        x: partial.x.unwrap_or(base.x),
        y: partial.y.unwrap_or(base.y),
        z: partial.z.unwrap_or(base.z),
        a: partial.a.unwrap_or(base.a),
        b: partial.b.unwrap_or(base.b),
        c: partial.c.unwrap_or(base.c),
    }
}

fn status_name(code: u64) -> &'static str {
    match code {
        0 => "init",
        1 => "ready",
        2 => "alarm",
        3 => "stop",
        4 => "end",
        5 => "run",
        6 => "hold",
        7 => "probe",
        8 => "cycle",
        9 => "homing",
        10 => "jog",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> Runner {
        Runner::new(28, BTreeMap::new())
    }

    #[test]
    fn decodes_ack_frame_with_line_number() {
        let mut r = runner();
        let frames = r.feed(br#"{"r":{"n":5}}
"#);
        assert_eq!(frames, vec![Frame::Ack { line: Some(5), nulls: vec![] }]);
    }

    #[test]
    fn null_capability_reply_clears_status_mask_bit() {
        let mut mask = BTreeMap::new();
        mask.insert("spe".to_string(), true);
        let mut r = Runner::new(28, mask);
        r.feed(b"{\"r\":{\"spe\":null}}\n");
        assert_eq!(r.model().status_mask.get("spe"), Some(&false));
    }

    #[test]
    fn decodes_qr_frame() {
        let mut r = runner();
        let frames = r.feed(b"{\"qr\":12}\n");
        assert_eq!(frames, vec![Frame::Qr { q: 12 }]);
        assert_eq!(r.model().last_qr, Some(12));
    }

    #[test]
    fn decodes_footer_with_nonzero_status_code() {
        let mut r = runner();
        let frames = r.feed(b"{\"f\":[1,108,0,0]}\n");
        assert_eq!(frames, vec![Frame::Footer { code: 108, raw: vec![1.into(), 108.into(), 0.into(), 0.into()] }]);
    }

    #[test]
    fn partial_reads_are_buffered_until_newline() {
        let mut r = runner();
        assert!(r.feed(b"{\"qr\":").is_empty());
        let frames = r.feed(b"7}\n");
        assert_eq!(frames, vec![Frame::Qr { q: 7 }]);
    }

    #[test]
    fn status_report_updates_work_and_machine_position() {
        let mut r = runner();
        r.feed(b"{\"sr\":{\"pos\":{\"x\":1.0,\"y\":2.0},\"mpos\":{\"x\":1.5}}}\n");
        assert_eq!(r.model().work_position.x, 1.0);
        assert_eq!(r.model().work_position.y, 2.0);
        assert_eq!(r.model().machine_position.x, 1.5);
    }
}
