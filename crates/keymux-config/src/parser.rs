//! KDL configuration parser

use std::path::Path;

use crate::error::ConfigError;
use crate::model::*;

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl uses an older miette version, so extract offset/len manually
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "global" => {
                config.global = parse_global(node)?;
            }
            "capture" => {
                config.captures.push(parse_capture(node)?);
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    Ok(config)
}

fn parse_global(node: &kdl::KdlNode) -> Result<GlobalConfig, ConfigError> {
    let mut global = GlobalConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "device-name" => {
                    if let Some(entry) = child.entries().first() {
                        if let Some(val) = entry.value().as_string() {
                            global.device_name = val.to_string();
                        }
                    }
                }
                "log-level" => {
                    if let Some(entry) = child.entries().first() {
                        if let Some(val) = entry.value().as_string() {
                            global.log_level = val
                                .parse()
                                .map_err(|e| ConfigError::Invalid { message: e })?;
                        }
                    }
                }
                name => {
                    tracing::warn!("Unknown global config option: {}", name);
                }
            }
        }
    }

    Ok(global)
}

fn parse_capture(node: &kdl::KdlNode) -> Result<CaptureConfig, ConfigError> {
    let name = node
        .entries()
        .first()
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
        .ok_or_else(|| ConfigError::MissingField {
            field: "capture device name (e.g., `capture \"My Keyboard\" { ... }`)".to_string(),
        })?;

    let mut capture = CaptureConfig::new(name);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "grab" => {
                    if let Some(entry) = child.entries().first() {
                        if let Some(val) = entry.value().as_bool() {
                            capture.grab = val;
                        }
                    }
                }
                "map" => {
                    let (event_type, rule) = parse_map(child, &capture.name)?;
                    capture.push_rule(event_type, rule);
                }
                name => {
                    tracing::warn!(
                        "Unknown capture option for '{}': {}",
                        capture.name,
                        name
                    );
                }
            }
        }
    }

    Ok(capture)
}

fn parse_map(node: &kdl::KdlNode, capture: &str) -> Result<(u16, EventMap), ConfigError> {
    let mut event_type = None;
    let mut match_code = None;
    let mut match_value = None;
    let mut rewrite_code = None;
    let mut rewrite_value = None;
    let mut send_release = false;

    for entry in node.entries() {
        let key = match entry.name() {
            Some(name) => name.value(),
            None => {
                tracing::warn!("Ignoring positional map argument for '{}'", capture);
                continue;
            }
        };
        match key {
            "type" => event_type = Some(int_value(entry, capture)?),
            "code" => match_code = Some(int_value(entry, capture)?),
            "value" => match_value = Some(int_value(entry, capture)?),
            "to-code" => rewrite_code = Some(int_value(entry, capture)?),
            "to-value" => rewrite_value = Some(int_value(entry, capture)?),
            "send-release" => {
                send_release = entry.value().as_bool().ok_or_else(|| ConfigError::Invalid {
                    message: format!(
                        "map for '{}': send-release must be a boolean",
                        capture
                    ),
                })?;
            }
            key => {
                tracing::warn!("Unknown map property for '{}': {}", capture, key);
            }
        }
    }

    let event_type = event_type.ok_or_else(|| missing_map_field("type", capture))?;
    if !(0..i64::from(EVENT_TYPE_COUNT)).contains(&event_type) {
        return Err(ConfigError::Invalid {
            message: format!(
                "map for '{}': event type {} out of range (must be below {})",
                capture, event_type, EVENT_TYPE_COUNT
            ),
        });
    }

    let rewrite_code = code_field(rewrite_code, "to-code", capture)?
        .ok_or_else(|| missing_map_field("to-code", capture))?;
    if rewrite_code >= KEY_CODE_COUNT {
        return Err(ConfigError::Invalid {
            message: format!(
                "map for '{}': to-code {} out of range (must be below {})",
                capture, rewrite_code, KEY_CODE_COUNT
            ),
        });
    }

    let rule = EventMap {
        match_code: code_field(match_code, "code", capture)?
            .ok_or_else(|| missing_map_field("code", capture))?,
        match_value: value_field(match_value, "value", capture)?,
        rewrite_code,
        rewrite_value: value_field(rewrite_value, "to-value", capture)?,
        send_release,
    };

    Ok((event_type as u16, rule))
}

fn int_value(entry: &kdl::KdlEntry, capture: &str) -> Result<i64, ConfigError> {
    entry.value().as_i64().ok_or_else(|| ConfigError::Invalid {
        message: format!(
            "map for '{}': property {} must be an integer",
            capture,
            entry.name().map(|n| n.value()).unwrap_or("?")
        ),
    })
}

fn code_field(raw: Option<i64>, key: &str, capture: &str) -> Result<Option<u16>, ConfigError> {
    raw.map(|v| {
        u16::try_from(v).map_err(|_| ConfigError::Invalid {
            message: format!("map for '{}': {} {} does not fit u16", capture, key, v),
        })
    })
    .transpose()
}

/// Optional value property: absent means the IGNORE sentinel. The
/// sentinel itself (0xFFFF) is reserved and cannot be given explicitly.
fn value_field(raw: Option<i64>, key: &str, capture: &str) -> Result<u16, ConfigError> {
    match raw {
        None => Ok(IGNORE_VALUE),
        Some(v) => {
            if !(0..i64::from(IGNORE_VALUE)).contains(&v) {
                return Err(ConfigError::Invalid {
                    message: format!(
                        "map for '{}': {} {} out of range (0..{})",
                        capture, key, v, IGNORE_VALUE
                    ),
                });
            }
            Ok(v as u16)
        }
    }
}

fn missing_map_field(key: &str, capture: &str) -> ConfigError {
    ConfigError::MissingField {
        field: format!("map property {} (capture '{}')", key, capture),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_config() {
        let config = r#"
            global {
                device-name "Merged Keyboard"
                log-level "debug"
            }

            capture "Test Keyboard" {
                map type=1 code=58 to-code=1
            }
        "#;

        let result = parse_config_str(config).unwrap();
        assert_eq!(result.global.device_name, "Merged Keyboard");
        assert_eq!(result.global.log_level, LogLevel::Debug);
        assert_eq!(result.captures.len(), 1);
        assert_eq!(result.captures[0].name, "Test Keyboard");
        assert!(result.captures[0].grab);

        let bucket = result.captures[0].rules_for(1).unwrap();
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket[0].match_code, 58);
        assert_eq!(bucket[0].match_value, IGNORE_VALUE);
        assert_eq!(bucket[0].rewrite_code, 1);
        assert_eq!(bucket[0].rewrite_value, IGNORE_VALUE);
        assert!(!bucket[0].send_release);
    }

    #[test]
    fn test_parse_full_map_rule() {
        let config = r#"
            capture "Pad" {
                grab false
                map type=2 code=1 value=1 to-code=100 to-value=1 send-release=true
            }
        "#;

        let result = parse_config_str(config).unwrap();
        let capture = &result.captures[0];
        assert!(!capture.grab);

        let rule = capture.rules_for(2).unwrap()[0];
        assert_eq!(rule.match_code, 1);
        assert_eq!(rule.match_value, 1);
        assert_eq!(rule.rewrite_code, 100);
        assert_eq!(rule.rewrite_value, 1);
        assert!(rule.send_release);
    }

    #[test]
    fn test_rules_keep_file_order() {
        let config = r#"
            capture "Test Keyboard" {
                map type=1 code=30 value=1 to-code=2
                map type=1 code=30 to-code=3
            }
        "#;

        let result = parse_config_str(config).unwrap();
        let bucket = result.captures[0].rules_for(1).unwrap();
        assert_eq!(bucket[0].rewrite_code, 2);
        assert_eq!(bucket[1].rewrite_code, 3);
    }

    #[test]
    fn test_capture_missing_name_error() {
        let config = r#"
            capture {
                map type=1 code=58 to-code=1
            }
        "#;

        let result = parse_config_str(config);
        let err = result.unwrap_err();
        match err {
            ConfigError::MissingField { field } => {
                assert!(field.contains("capture device name"));
            }
            _ => panic!("Expected MissingField error, got: {:?}", err),
        }
    }

    #[test]
    fn test_event_type_out_of_range_error() {
        let config = r#"
            capture "Test Keyboard" {
                map type=32 code=58 to-code=1
            }
        "#;

        let result = parse_config_str(config);
        let err = result.unwrap_err();
        match err {
            ConfigError::Invalid { message } => {
                assert!(message.contains("out of range"));
            }
            _ => panic!("Expected Invalid error, got: {:?}", err),
        }
    }

    #[test]
    fn test_rewrite_code_beyond_key_space_error() {
        let config = r#"
            capture "Test Keyboard" {
                map type=1 code=58 to-code=2000
            }
        "#;

        let result = parse_config_str(config);
        let err = result.unwrap_err();
        match err {
            ConfigError::Invalid { message } => {
                assert!(message.contains("to-code"));
                assert!(message.contains("out of range"));
            }
            _ => panic!("Expected Invalid error, got: {:?}", err),
        }
    }

    #[test]
    fn test_map_missing_to_code_error() {
        let config = r#"
            capture "Test Keyboard" {
                map type=1 code=58
            }
        "#;

        let result = parse_config_str(config);
        let err = result.unwrap_err();
        match err {
            ConfigError::MissingField { field } => {
                assert!(field.contains("to-code"));
            }
            _ => panic!("Expected MissingField error, got: {:?}", err),
        }
    }

    #[test]
    fn test_value_sentinel_rejected() {
        let config = r#"
            capture "Test Keyboard" {
                map type=1 code=58 value=65535 to-code=1
            }
        "#;

        assert!(parse_config_str(config).is_err());
    }

    #[test]
    fn test_unknown_nodes_tolerated() {
        let config = r#"
            frobnicate
            capture "Test Keyboard" {
                led-theme "rainbow"
                map type=1 code=58 to-code=1
            }
        "#;

        let result = parse_config_str(config).unwrap();
        assert_eq!(result.captures.len(), 1);
        assert_eq!(result.captures[0].rules_for(1).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_config_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            global {{
                device-name "File Device"
            }}
            capture "Test Keyboard" {{
                map type=1 code=58 to-code=1
            }}
            "#
        )
        .unwrap();

        let config = parse_config(file.path()).unwrap();
        assert_eq!(config.global.device_name, "File Device");
        assert_eq!(config.captures.len(), 1);
    }
}
