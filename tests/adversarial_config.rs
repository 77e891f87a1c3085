//! Adversarial Property-Based Tests for Configuration Parsing
//!
//! # Attack Plan
//!
//! 1. **Port Number Attacks**: Negative numbers (as string), overflow, float,
//!    scientific notation, unicode digits.
//!
//! 2. **Boolean Flags**: Mixed case, whitespace, garbage words.
//!
//! 3. **Empty vs Missing Fields**: Empty strings should behave differently
//!    than missing environment variables.
//!
//! 4. **Extremely Long Values**: Megabyte strings for all fields.
//!
//! 5. **Duration Bounds**: 0, 1, 3600, 3601, MAX values for the listen period
//!    and the jitter hold-out.
//!
//! # Invariants
//!
//! - from_getter never panics on any input
//! - validate() never panics (may return Err)
//! - An unparseable port is an error, never silently replaced
//! - Boolean flags accept exactly the documented spellings
//! - A validated config always yields a hold-out of at most 10 seconds

use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;

use mediajitter::config::{Config, MAX_JITTER_WAIT_MS, MAX_LISTEN_DURATION_SECS};

// ============================================================================
// ADVERSARIAL GENERATORS
// ============================================================================

/// Generate malformed port strings
fn malformed_port() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("-1".to_string()),
        Just("65536".to_string()),
        Just("99999999999999999999".to_string()),
        Just("5060.5".to_string()),
        Just("5e3".to_string()),
        Just("0x13C4".to_string()),
        Just("".to_string()),
        Just(" 5060".to_string()),
        Just("٥٠٦٠".to_string()), // Arabic-Indic digits
        Just("5060\0".to_string()),
        "[^0-9]{1,20}",
    ]
}

/// Generate boolean-ish strings
fn boolish() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("true".to_string()),
        Just("TRUE".to_string()),
        Just(" yes ".to_string()),
        Just("0".to_string()),
        Just("off".to_string()),
        Just("".to_string()),
        Just("maybe".to_string()),
        Just("2".to_string()),
        ".{0,20}",
    ]
}

/// Generate various string lengths
fn various_lengths() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("a".repeat(10_000)),
        Just("9".repeat(1_000_000)),
        ".{0,200}",
    ]
}

// ============================================================================
// HELPER: Build config from a map
// ============================================================================

fn config_from(map: &HashMap<&str, String>) -> anyhow::Result<Config> {
    Config::from_getter(|key| map.get(key).cloned())
}

fn single(key: &'static str, value: &str) -> HashMap<&'static str, String> {
    HashMap::from([(key, value.to_string())])
}

// ============================================================================
// INVARIANT: from_getter NEVER PANICS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn prop_from_getter_never_panics_with_arbitrary_port(port in malformed_port()) {
        let _ = config_from(&single("RTP_PORT", &port));
    }

    #[test]
    fn prop_from_getter_never_panics_with_arbitrary_flags(flag in boolish()) {
        for key in ["JITTER_BLOCKING", "JITTER_FIFO", "STATS_JSON"] {
            let _ = config_from(&single(key, &flag));
        }
    }

    #[test]
    fn prop_from_getter_never_panics_with_arbitrary_values(
        port in various_lengths(),
        wait in various_lengths(),
        duration in various_lengths(),
        flag in various_lengths(),
    ) {
        let map = HashMap::from([
            ("RTP_PORT", port),
            ("JITTER_MAX_WAIT_MS", wait),
            ("LISTEN_DURATION_SECS", duration),
            ("JITTER_FIFO", flag),
        ]);
        if let Ok(config) = config_from(&map) {
            let _ = config.validate();
        }
    }
}

// ============================================================================
// INVARIANT: PORT PARSING
// ============================================================================

proptest! {
    #[test]
    fn prop_valid_port_round_trips(port in any::<u16>()) {
        let config = config_from(&single("RTP_PORT", &port.to_string())).unwrap();
        prop_assert_eq!(config.rtp_port, port);
    }

    #[test]
    fn prop_non_numeric_port_is_error(port in "[^0-9]{1,20}") {
        prop_assert!(config_from(&single("RTP_PORT", &port)).is_err());
    }
}

#[test]
fn test_out_of_range_ports_rejected() {
    for port in ["-1", "65536", "99999999999999999999", "5060.5", ""] {
        assert!(
            config_from(&single("RTP_PORT", port)).is_err(),
            "port '{}' should be rejected",
            port
        );
    }
}

#[test]
fn test_missing_port_defaults_to_any() {
    let config = config_from(&HashMap::new()).unwrap();
    assert_eq!(config.rtp_port, 0);
}

// ============================================================================
// INVARIANT: BOOLEAN FLAGS
// ============================================================================

#[test]
fn test_boolean_spellings() {
    for raw in ["1", "true", "TRUE", " Yes ", "on"] {
        let config = config_from(&single("JITTER_FIFO", raw)).unwrap();
        assert!(config.jitter_fifo, "'{}' should be true", raw);
    }
    for raw in ["0", "false", "No", "OFF"] {
        let config = config_from(&single("JITTER_BLOCKING", raw)).unwrap();
        assert!(!config.jitter_blocking, "'{}' should be false", raw);
    }
}

#[test]
fn test_empty_flag_is_error_not_default() {
    // Set-but-empty differs from missing
    assert!(config_from(&single("STATS_JSON", "")).is_err());
    assert!(!config_from(&HashMap::new()).unwrap().stats_json);
}

#[test]
fn test_garbage_flag_names_the_variable() {
    let err = config_from(&single("JITTER_BLOCKING", "maybe")).unwrap_err();
    assert!(err.to_string().contains("JITTER_BLOCKING"));
}

// ============================================================================
// INVARIANT: DURATION BOUNDS
// ============================================================================

#[test]
fn test_listen_duration_bounds() {
    let max = u64::MAX.to_string();
    let cases = [
        ("0", false),
        ("1", true),
        ("3600", true),
        ("3601", false),
        (max.as_str(), false),
    ];
    for (raw, valid) in cases {
        let config = config_from(&single("LISTEN_DURATION_SECS", raw)).unwrap();
        assert_eq!(config.validate().is_ok(), valid, "LISTEN_DURATION_SECS={}", raw);
    }
}

#[test]
fn test_unparseable_duration_falls_back() {
    let config = config_from(&single("LISTEN_DURATION_SECS", "forever")).unwrap();
    assert_eq!(config.listen_duration(), Duration::from_secs(10));
    assert!(config.validate().is_ok());
}

#[test]
fn test_all_errors_reported_together() {
    let map = HashMap::from([
        ("JITTER_MAX_WAIT_MS", "60000".to_string()),
        ("LISTEN_DURATION_SECS", "0".to_string()),
    ]);
    let message = config_from(&map).unwrap().validate().unwrap_err().to_string();
    assert!(message.contains("JITTER_MAX_WAIT_MS"));
    assert!(message.contains("LISTEN_DURATION_SECS"));
}

proptest! {
    #[test]
    fn prop_validated_config_has_bounded_wait(wait in any::<u64>(), duration in any::<u64>()) {
        let map = HashMap::from([
            ("JITTER_MAX_WAIT_MS", wait.to_string()),
            ("LISTEN_DURATION_SECS", duration.to_string()),
        ]);
        let config = config_from(&map).unwrap();
        if config.validate().is_ok() {
            prop_assert!(config.jitter().max_wait <= Duration::from_millis(MAX_JITTER_WAIT_MS));
            prop_assert!(config.listen_duration() <= Duration::from_secs(MAX_LISTEN_DURATION_SECS));
            prop_assert!(config.listen_duration() > Duration::ZERO);
        } else {
            prop_assert!(wait > MAX_JITTER_WAIT_MS || duration == 0 || duration > MAX_LISTEN_DURATION_SECS);
        }
    }
}
