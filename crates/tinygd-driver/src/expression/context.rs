//! Evaluation context populated before every expression-stage pass

use std::collections::BTreeMap;
use tinygd_core::{ModalGroup, Position};

/// Numeric and string variables available to `%...` assignments and `[expr]`
/// substitutions. Rebuilt from [`crate::runner::RunnerModel`] before each line
/// and merged with the driver's persistent `global` map.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Persistent, caller-assignable key→number map (`global.<key>`)
    pub global: BTreeMap<String, f64>,
    pub bbox: BTreeMap<String, f64>,
    pub machine_position: Position,
    pub work_position: Position,
    pub modal: ModalGroup,
    pub tool: u32,
    now_ms: u64,
}

impl Context {
    pub fn new(now_ms: u64) -> Self {
        let mut bbox = BTreeMap::new();
        for key in ["xmin", "ymin", "zmin", "xmax", "ymax", "zmax"] {
            bbox.insert(key.to_string(), 0.0);
        }
        Self { global: BTreeMap::new(), bbox, machine_position: Position::default(), work_position: Position::default(), modal: ModalGroup::default(), tool: 0, now_ms }
    }

    /// Injected wall-clock accessor; kept on the context (rather than read
    /// directly from `SystemTime`) so tests can supply a fixed value.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Resolve a bare identifier used inside an expression or assignment
    pub fn lookup(&self, name: &str) -> Option<f64> {
        if let Some(key) = name.strip_prefix("global.") {
            return self.global.get(key).copied();
        }
        if let Some(v) = self.bbox.get(name) {
            return Some(*v);
        }
        match name {
            "mposx" => Some(self.machine_position.x),
            "mposy" => Some(self.machine_position.y),
            "mposz" => Some(self.machine_position.z),
            "mposa" => Some(self.machine_position.a),
            "mposb" => Some(self.machine_position.b),
            "mposc" => Some(self.machine_position.c),
            "posx" => Some(self.work_position.x),
            "posy" => Some(self.work_position.y),
            "posz" => Some(self.work_position.z),
            "posa" => Some(self.work_position.a),
            "posb" => Some(self.work_position.b),
            "posc" => Some(self.work_position.c),
            "tool" => Some(self.tool as f64),
            _ => None,
        }
    }

    /// Assign into the persistent `global` map (the only writable namespace)
    pub fn assign_global(&mut self, key: &str, value: f64) {
        self.global.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_defaults_to_zero() {
        let ctx = Context::new(0);
        assert_eq!(ctx.lookup("xmin"), Some(0.0));
        assert_eq!(ctx.lookup("zmax"), Some(0.0));
    }

    #[test]
    fn global_assign_then_lookup_round_trips() {
        let mut ctx = Context::new(0);
        ctx.assign_global("foo", 42.0);
        assert_eq!(ctx.lookup("global.foo"), Some(42.0));
    }

    #[test]
    fn machine_and_work_position_are_readable() {
        let mut ctx = Context::new(0);
        ctx.machine_position.x = 3.0;
        ctx.work_position.z = -1.5;
        assert_eq!(ctx.lookup("mposx"), Some(3.0));
        assert_eq!(ctx.lookup("posz"), Some(-1.5));
    }
}
