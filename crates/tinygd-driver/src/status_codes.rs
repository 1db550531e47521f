//! Static TinyG/g2core firmware status-code → message table

/// Human-readable message for a firmware `f[1]` status code
pub fn lookup(code: u32) -> &'static str {
    match code {
        0 => "OK",
        1 => "error",
        2 => "eagain",
        3 => "noop",
        4 => "complete",
        8 => "terminated",
        9 => "resET",
        20 => "internal error",
        32 => "file not open",
        33 => "max file size exceeded",
        34 => "no such device",
        35 => "buffer empty",
        36 => "buffer full",
        37 => "buffer full fatal",
        38 => "initializing",
        41 => "shutdown",
        42 => "panic",
        100 => "internal range error",
        101 => "expected command letter",
        102 => "bad number format",
        103 => "unsupported number",
        104 => "gcode command unsupported",
        105 => "mcode command unsupported",
        106 => "gcode modal group violation",
        108 => "invalid or unsupported axis",
        112 => "gcode axis is missing a parameter",
        115 => "arc specification error",
        121 => "gcode command value not allowed",
        211 => "soft limit exceeded",
        212 => "homing required",
        213 => "limit switch hit",
        252 => "probing cycle failed",
        _ => "unknown firmware status",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_code_resolves() {
        assert_eq!(lookup(108), "invalid or unsupported axis");
    }

    #[test]
    fn unknown_code_has_a_fallback() {
        assert_eq!(lookup(9999), "unknown firmware status");
    }
}
