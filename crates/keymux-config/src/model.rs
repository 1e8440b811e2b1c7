//! Configuration data model

/// Sentinel for "any value" in a match, or "keep the original value"
/// in a rewrite.
pub const IGNORE_VALUE: u16 = 0xffff;

/// Number of evdev event types (EV_CNT). Rule buckets are indexed by
/// event type, so a configured type must stay below this.
pub const EVENT_TYPE_COUNT: u16 = 0x20;

/// Number of key codes (KEY_MAX + 1). Rewrite targets become key
/// events, so they must stay below this or the virtual device could
/// never declare them.
pub const KEY_CODE_COUNT: u16 = 0x300;

/// Root configuration structure
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: GlobalConfig,
    pub captures: Vec<CaptureConfig>,
}

impl Config {
    /// All rewrite target key codes referenced by any rule, across all
    /// capture devices. The virtual device must be able to emit these
    /// even when no physical source declares them.
    pub fn rewrite_codes(&self) -> Vec<u16> {
        self.captures
            .iter()
            .flat_map(|capture| capture.buckets.iter())
            .flat_map(|bucket| bucket.iter())
            .map(|rule| rule.rewrite_code)
            .collect()
    }
}

/// Global settings
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub device_name: String,
    pub log_level: LogLevel,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            device_name: "Keymux Virtual Device".to_string(),
            log_level: LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// One physical capture device and its remap rules.
///
/// Rules are grouped into buckets indexed by evdev event type; within a
/// bucket, file order is priority order (first match wins).
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Device name to match against enumerated devices
    pub name: String,
    /// Grab the device for exclusive access
    pub grab: bool,
    /// Rule buckets, indexed by event type
    pub buckets: Vec<Vec<EventMap>>,
}

impl CaptureConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grab: true,
            buckets: Vec::new(),
        }
    }

    /// Append a rule to the bucket for `event_type`, growing the bucket
    /// list as needed. Later calls for the same type rank lower.
    pub fn push_rule(&mut self, event_type: u16, rule: EventMap) {
        let index = usize::from(event_type);
        if self.buckets.len() <= index {
            self.buckets.resize(index + 1, Vec::new());
        }
        self.buckets[index].push(rule);
    }

    /// The ordered rule bucket for an event type, if one is configured.
    pub fn rules_for(&self, event_type: u16) -> Option<&[EventMap]> {
        self.buckets
            .get(usize::from(event_type))
            .map(Vec::as_slice)
    }
}

/// One match/rewrite rule. Immutable after load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMap {
    /// Event code to match
    pub match_code: u16,
    /// Event value to match, or `IGNORE_VALUE` for any value
    pub match_value: u16,
    /// Key code the rewritten event carries
    pub rewrite_code: u16,
    /// Value the rewritten event carries, or `IGNORE_VALUE` to keep the
    /// original value
    pub rewrite_value: u16,
    /// After the rewritten event, also emit a release (value 0) of the
    /// original type/code
    pub send_release: bool,
}

impl EventMap {
    pub fn matches(&self, code: u16, value: i32) -> bool {
        self.match_code == code
            && (self.match_value == IGNORE_VALUE || i32::from(self.match_value) == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(match_code: u16, match_value: u16) -> EventMap {
        EventMap {
            match_code,
            match_value,
            rewrite_code: 0,
            rewrite_value: IGNORE_VALUE,
            send_release: false,
        }
    }

    #[test]
    fn test_match_ignores_value_with_sentinel() {
        let r = rule(30, IGNORE_VALUE);
        assert!(r.matches(30, 0));
        assert!(r.matches(30, 1));
        assert!(r.matches(30, 2));
        assert!(!r.matches(31, 1));
    }

    #[test]
    fn test_match_exact_value() {
        let r = rule(30, 1);
        assert!(r.matches(30, 1));
        assert!(!r.matches(30, 0));
        assert!(!r.matches(30, 2));
    }

    #[test]
    fn test_push_rule_grows_buckets() {
        let mut capture = CaptureConfig::new("kbd");
        capture.push_rule(1, rule(10, IGNORE_VALUE));
        capture.push_rule(17, rule(11, IGNORE_VALUE));

        assert_eq!(capture.buckets.len(), 18);
        assert_eq!(capture.rules_for(1).unwrap().len(), 1);
        assert!(capture.rules_for(2).unwrap().is_empty());
        assert_eq!(capture.rules_for(17).unwrap().len(), 1);
        assert!(capture.rules_for(18).is_none());
    }

    #[test]
    fn test_rule_order_preserved_within_bucket() {
        let mut capture = CaptureConfig::new("kbd");
        capture.push_rule(1, rule(30, 1));
        capture.push_rule(1, rule(30, IGNORE_VALUE));

        let bucket = capture.rules_for(1).unwrap();
        assert_eq!(bucket[0].match_value, 1);
        assert_eq!(bucket[1].match_value, IGNORE_VALUE);
    }

    #[test]
    fn test_rewrite_codes_spans_all_captures() {
        let mut a = CaptureConfig::new("a");
        a.push_rule(
            1,
            EventMap {
                match_code: 30,
                match_value: IGNORE_VALUE,
                rewrite_code: 2,
                rewrite_value: IGNORE_VALUE,
                send_release: false,
            },
        );
        let mut b = CaptureConfig::new("b");
        b.push_rule(
            2,
            EventMap {
                match_code: 8,
                match_value: 1,
                rewrite_code: 100,
                rewrite_value: 1,
                send_release: true,
            },
        );

        let config = Config {
            global: GlobalConfig::default(),
            captures: vec![a, b],
        };
        let mut codes = config.rewrite_codes();
        codes.sort_unstable();
        assert_eq!(codes, vec![2, 100]);
    }
}
