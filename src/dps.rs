//! Targeted field extraction from decrypted DP snapshot JSON.
//!
//! The controller emits one flat shape,
//! `{"devId":"...","dps":{"1":true,"2":75,...},"t":...}`, and this module
//! pulls individual fields out of that text with bounded scans. It is
//! deliberately not a JSON parser: lookups are best-effort and every
//! accessor reports absence instead of erroring on malformed input.

/// DP id of the heater on/off switch.
pub const DP_HEATER: &str = "1";

/// DP id of the target temperature setpoint.
pub const DP_SETPOINT: &str = "2";

/// DP id of the measured temperature.
pub const DP_TEMPERATURE: &str = "3";

/// DP id of the temperature unit string.
pub const DP_UNIT: &str = "107";

/// ASCII case-insensitive substring search.
fn find_ci(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
        .map(|pos| from + pos)
}

/// Read the raw value literal that follows the `:` at or after `idx`.
///
/// A quoted value is returned without its quotes, escape sequences left
/// as-is (a backslash skips the following byte). An unquoted literal runs
/// to the next `,` or `}` and is whitespace-trimmed.
fn value_after(json: &[u8], idx: usize) -> Option<String> {
    let colon = json[idx..].iter().position(|&b| b == b':')? + idx;
    let mut pos = colon + 1;
    while pos < json.len() && json[pos].is_ascii_whitespace() {
        pos += 1;
    }
    if pos >= json.len() {
        return None;
    }

    if json[pos] == b'"' {
        pos += 1;
        let start = pos;
        while pos < json.len() {
            match json[pos] {
                b'\\' => pos += 2,
                b'"' => break,
                _ => pos += 1,
            }
        }
        let end = pos.min(json.len());
        return String::from_utf8(json[start..end].to_vec()).ok();
    }

    let start = pos;
    while pos < json.len() && json[pos] != b',' && json[pos] != b'}' {
        pos += 1;
    }
    String::from_utf8(json[start..pos].to_vec())
        .ok()
        .map(|raw| raw.trim().to_string())
}

/// Extract a quoted string value for a top-level key.
#[must_use]
pub fn top_level_str(json: &str, key: &str) -> Option<String> {
    if json.is_empty() || key.is_empty() {
        return None;
    }
    let bytes = json.as_bytes();
    let quoted = format!("\"{key}\"");
    let key_idx = find_ci(bytes, quoted.as_bytes(), 0)?;
    let value = value_after(bytes, key_idx + quoted.len())?;
    // Top-level extraction is only used for string fields; an unquoted hit
    // would be a different key's number bleeding through, so re-check.
    let colon = bytes[key_idx..].iter().position(|&b| b == b':')? + key_idx;
    let mut pos = colon + 1;
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    if pos >= bytes.len() || bytes[pos] != b'"' {
        return None;
    }
    Some(value)
}

/// Extract the raw value literal for a key inside the `"dps"` object.
#[must_use]
pub fn dps_raw(json: &str, dp_key: &str) -> Option<String> {
    if json.is_empty() || dp_key.is_empty() {
        return None;
    }
    let bytes = json.as_bytes();
    let dps_idx = find_ci(bytes, b"\"dps\"", 0)?;
    let open = bytes[dps_idx..].iter().position(|&b| b == b'{')? + dps_idx;
    let quoted = format!("\"{dp_key}\"");
    let key_idx = find_ci(bytes, quoted.as_bytes(), open)?;
    value_after(bytes, key_idx + quoted.len())
}

/// Extract a boolean DP. Accepts exactly `true`/`false`, case-insensitively.
#[must_use]
pub fn dps_bool(json: &str, dp_key: &str) -> Option<bool> {
    let raw = dps_raw(json, dp_key)?;
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Extract an integer DP. Malformed input is `None`, never a silent zero.
#[must_use]
pub fn dps_int(json: &str, dp_key: &str) -> Option<i64> {
    dps_raw(json, dp_key)?.parse().ok()
}

/// Typed view of one polled DP snapshot.
///
/// Produced fresh on every successful poll and superseded wholesale by the
/// next one. Absent or malformed fields stay `None`.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Heater switch state (dp 1).
    pub heater_on: Option<bool>,
    /// Target setpoint (dp 2).
    pub setpoint: Option<i64>,
    /// Measured temperature (dp 3).
    pub temperature: Option<i64>,
    /// Temperature unit (dp 107).
    pub unit: Option<String>,
    /// The decrypted JSON text this snapshot was read from.
    pub raw_json: String,
}

impl Snapshot {
    /// Extract the known DPs from decrypted snapshot JSON.
    #[must_use]
    pub fn from_json(json: &str) -> Self {
        Self {
            heater_on: dps_bool(json, DP_HEATER),
            setpoint: dps_int(json, DP_SETPOINT),
            temperature: dps_int(json, DP_TEMPERATURE),
            unit: dps_raw(json, DP_UNIT),
            raw_json: json.to_string(),
        }
    }

    /// Device id reported in the snapshot, if present.
    #[must_use]
    pub fn device_id(&self) -> Option<String> {
        top_level_str(&self.raw_json, "devId")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str =
        r#"{"devId":"bf735huj9kf2lda4x1","dps":{"1":false,"2":75,"3":41,"107":"c"},"t":1700000000}"#;

    #[test]
    fn extracts_bool_and_int() {
        let json = r#"{"dps":{"1":true,"2":22}}"#;
        assert_eq!(dps_bool(json, "1"), Some(true));
        assert_eq!(dps_int(json, "2"), Some(22));
    }

    #[test]
    fn missing_key_is_none_not_zero() {
        let json = r#"{"dps":{"2":0}}"#;
        assert_eq!(dps_int(json, "2"), Some(0));
        assert_eq!(dps_int(json, "3"), None);
        assert_eq!(dps_bool(json, "1"), None);
    }

    #[test]
    fn bool_is_strict() {
        assert_eq!(dps_bool(r#"{"dps":{"1":TRUE}}"#, "1"), Some(true));
        assert_eq!(dps_bool(r#"{"dps":{"1":1}}"#, "1"), None);
        assert_eq!(dps_bool(r#"{"dps":{"1":"true-ish"}}"#, "1"), None);
    }

    #[test]
    fn malformed_int_is_none() {
        assert_eq!(dps_int(r#"{"dps":{"2":7x5}}"#, "2"), None);
        assert_eq!(dps_int(r#"{"dps":{"2":}}"#, "2"), None);
    }

    #[test]
    fn quoted_value_with_escapes() {
        let json = r#"{"dps":{"107":"deg \"f\""}}"#;
        assert_eq!(dps_raw(json, "107"), Some(r#"deg \"f\""#.to_string()));
    }

    #[test]
    fn unquoted_value_is_trimmed() {
        let json = "{\"dps\": {\"2\": 75 , \"3\": 41}}";
        assert_eq!(dps_raw(json, "2"), Some("75".to_string()));
        assert_eq!(dps_int(json, "3"), Some(41));
    }

    #[test]
    fn key_search_is_case_insensitive() {
        let json = r#"{"DPS":{"1":false}}"#;
        assert_eq!(dps_bool(json, "1"), Some(false));
    }

    #[test]
    fn top_level_string() {
        assert_eq!(
            top_level_str(SAMPLE, "devId"),
            Some("bf735huj9kf2lda4x1".to_string())
        );
        assert_eq!(top_level_str(SAMPLE, "uid"), None);
    }

    #[test]
    fn top_level_rejects_non_string_value() {
        assert_eq!(top_level_str(SAMPLE, "t"), None);
    }

    #[test]
    fn garbage_input_never_panics() {
        for json in ["", "{", "not json at all", r#"{"dps":"#, "\"dps\"{\"1\""] {
            assert_eq!(dps_bool(json, "1"), None);
            assert_eq!(dps_int(json, "2"), None);
            assert_eq!(top_level_str(json, "devId"), None);
        }
    }

    #[test]
    fn snapshot_from_sample() {
        let snap = Snapshot::from_json(SAMPLE);
        assert_eq!(snap.heater_on, Some(false));
        assert_eq!(snap.setpoint, Some(75));
        assert_eq!(snap.temperature, Some(41));
        assert_eq!(snap.unit, Some("c".to_string()));
        assert_eq!(snap.device_id(), Some("bf735huj9kf2lda4x1".to_string()));
    }
}
