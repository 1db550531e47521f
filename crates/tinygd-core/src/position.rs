//! Position and modal-group data types mirrored from firmware status reports

use serde::{Deserialize, Serialize};

/// A full six-axis machine or work position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            a: 0.0,
            b: 0.0,
            c: 0.0,
        }
    }
}

/// A position update that may only touch some axes (e.g. a probe result)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialPosition {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub a: Option<f64>,
    pub b: Option<f64>,
    pub c: Option<f64>,
}

/// Coolant channels; tracked separately so M7/M8 can be emitted on their own
/// lines rather than combined, which would violate the modal-group rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoolantState {
    pub flood: bool,
    pub mist: bool,
}

impl CoolantState {
    /// Render the active coolant g-codes, one per line, in M7/M8 order
    pub fn as_lines(&self) -> Vec<&'static str> {
        let mut lines = Vec::new();
        if self.mist {
            lines.push("M7");
        }
        if self.flood {
            lines.push("M8");
        }
        lines
    }
}

/// Current modal group (active g-code modes)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModalGroup {
    pub motion: Option<String>,
    pub wcs: Option<String>,
    pub plane: Option<String>,
    pub units: Option<String>,
    pub distance: Option<String>,
    pub feedrate: Option<String>,
    pub path: Option<String>,
    pub spindle: Option<String>,
    pub coolant: CoolantState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coolant_emits_mist_before_flood_on_separate_lines() {
        let c = CoolantState {
            flood: true,
            mist: true,
        };
        assert_eq!(c.as_lines(), vec!["M7", "M8"]);
    }

    #[test]
    fn position_default_is_origin() {
        assert_eq!(Position::default(), Position { x: 0.0, y: 0.0, z: 0.0, a: 0.0, b: 0.0, c: 0.0 });
    }
}
