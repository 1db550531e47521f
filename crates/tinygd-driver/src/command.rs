//! The named command surface, modeled as an enum dispatched through a
//! `match` rather than a string-keyed table of closures.

use serde_json::Value;

/// One client-issued command. Carries its own typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCommand {
    SenderLoad { name: String, content: String },
    SenderUnload,
    SenderStart,
    SenderStop { force: bool },
    SenderPause,
    SenderResume,
    FeederStart { lines: Vec<String> },
    FeederStop,
    Feedhold,
    CycleStart,
    Homing,
    Sleep,
    Unlock,
    Reset,
    OverrideFeed { percent_delta: i32 },
    OverrideSpindle { percent_delta: i32 },
    OverrideRapid { value: u32 },
    MotorEnable { timeout_sec: Option<f64> },
    MotorDisable,
    MotorTimeout { sec: f64 },
    LaserTest { power: f64, duration_ms: u64, max_s: f64 },
    Gcode { lines: Vec<String> },
    MacroRun { id: String },
    MacroLoad { id: String },
    WatchDirLoad { path: String },
}

/// `clamp((cur*100 + delta)/100, 0.05, 2.0)`; `delta == 0` resets to 1.0
pub fn apply_override_delta(current: f64, percent_delta: i32) -> f64 {
    if percent_delta == 0 {
        return 1.0;
    }
    ((current * 100.0 + percent_delta as f64) / 100.0).clamp(0.05, 2.0)
}

/// Maps a rapid-override percentage to its firmware `mto` fraction; `None`
/// for any value other than {0, 25, 50, 100}.
pub fn rapid_override_fraction(value: u32) -> Option<f64> {
    match value {
        0 => Some(1.0),
        25 => Some(0.25),
        50 => Some(0.5),
        100 => Some(1.0),
        _ => None,
    }
}

/// `sender:stop {force:true}` firmware-build dialect selection. The final
/// `{"qr":""}` poke is always appended to solicit a fresh queue report.
pub fn force_stop_sequence(firmware_build: Option<f64>) -> Vec<String> {
    let build = firmware_build.unwrap_or(0.0);
    let mut seq = Vec::new();
    if build >= 101.0 {
        seq.push("\u{4}".to_string());
    } else if build >= 100.0 {
        seq.push("\u{4}".to_string());
        seq.push("M30".to_string());
    } else {
        seq.push("!".to_string());
        seq.push("%".to_string());
        seq.push("M30".to_string());
    }
    seq.push(r#"{"qr":""}"#.to_string());
    seq
}

/// Strip double quotes and abbreviate the literal `true` to `t`, matching
/// the firmware's relaxed-JSON requirement for the status-report-field
/// selection command issued during `init_controller`.
pub fn to_relaxed_json(value: &Value) -> String {
    value.to_string().replace('"', "").replace("true", "t")
}
