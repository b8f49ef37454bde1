//! Command list parser (component E)
//!
//! Validates and normalizes the client-supplied `commands` array plus the
//! `environ`/`result_path`/`save`/`environment` options. Grounded in the
//! original's `sandbox.command.Command` and `sandbox.utils.parse_environ`.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;

/// One shell command to run inside a sandbox container.
#[derive(Debug, Clone)]
pub struct Command {
    pub command: String,
    pub timeout: f64,
    pub ignore_failure: bool,
    pub environ: HashMap<String, String>,
}

impl Command {
    fn new(raw: &str, timeout: f64, environ: HashMap<String, String>) -> Self {
        if let Some(stripped) = raw.strip_prefix('-') {
            Self {
                command: stripped.to_string(),
                timeout,
                ignore_failure: true,
                environ,
            }
        } else {
            Self {
                command: raw.to_string(),
                timeout,
                ignore_failure: false,
                environ,
            }
        }
    }
}

/// A fully parsed `/execute/` request.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub commands: Vec<Command>,
    pub result_path: Option<String>,
    pub save: bool,
    pub environment: Option<String>,
}

/// Wire shape of the `config` field, deserialized loosely so we can produce
/// precise `BadRequest` reasons instead of generic serde errors.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    commands: Option<Value>,
    #[serde(default)]
    environ: Option<Value>,
    #[serde(default)]
    result_path: Option<String>,
    #[serde(default)]
    save: Option<bool>,
    #[serde(default)]
    environment: Option<String>,
}

/// Parse the `config` JSON body of `/execute/` into a [`RunRequest`],
/// returning a human-readable reason on any type violation.
pub fn parse_run_request(raw_json: &str, default_timeout: f64) -> Result<RunRequest, AppError> {
    let raw: RawConfig = serde_json::from_str(raw_json)
        .map_err(|e| AppError::BadRequest(format!("invalid config JSON: {e}")))?;

    let environ = parse_environ(raw.environ.as_ref())?;

    let commands_value = raw
        .commands
        .ok_or_else(|| AppError::BadRequest("Missing field 'commands' in config".to_string()))?;

    let commands_array = commands_value
        .as_array()
        .ok_or_else(|| AppError::BadRequest("'commands' must be a list".to_string()))?;

    if commands_array.is_empty() {
        return Err(AppError::BadRequest("Command list cannot be empty".to_string()));
    }

    let commands = commands_array
        .iter()
        .map(|entry| parse_command_entry(entry, default_timeout, &environ))
        .collect::<Result<Vec<_>, AppError>>()?;

    Ok(RunRequest {
        commands,
        result_path: raw.result_path,
        save: raw.save.unwrap_or(false),
        environment: raw.environment,
    })
}

fn parse_command_entry(
    entry: &Value,
    default_timeout: f64,
    environ: &HashMap<String, String>,
) -> Result<Command, AppError> {
    match entry {
        Value::String(s) => Ok(Command::new(s, default_timeout, environ.clone())),
        Value::Object(obj) => {
            let command = obj
                .get("command")
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::BadRequest(format!("Command badly formatted: '{entry}'")))?;

            let timeout = match obj.get("timeout") {
                None => default_timeout,
                Some(Value::Number(n)) => n
                    .as_f64()
                    .ok_or_else(|| AppError::BadRequest(format!("Command badly formatted: '{entry}'")))?,
                Some(_) => return Err(AppError::BadRequest(format!("Command badly formatted: '{entry}'"))),
            };

            if timeout <= 0.0 {
                return Err(AppError::BadRequest(format!(
                    "Command timeout must be > 0: '{entry}'"
                )));
            }

            Ok(Command::new(command, timeout, environ.clone()))
        }
        _ => Err(AppError::BadRequest(format!("Command badly formatted: '{entry}'"))),
    }
}

/// Stringify `environ` values (numbers become their decimal string form).
fn parse_environ(value: Option<&Value>) -> Result<HashMap<String, String>, AppError> {
    let Some(value) = value else {
        return Ok(HashMap::new());
    };

    let obj = value
        .as_object()
        .ok_or_else(|| AppError::BadRequest("'environ' must be an object".to_string()))?;

    obj.iter()
        .map(|(k, v)| {
            let s = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => {
                    return Err(AppError::BadRequest(format!(
                        "'environ.{k}' must be a string or number"
                    )))
                }
            };
            Ok((k.clone(), s))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_dash_sets_ignore_failure() {
        let req = parse_run_request(r#"{"commands":["-false"]}"#, 10.0).unwrap();
        assert!(req.commands[0].ignore_failure);
        assert_eq!(req.commands[0].command, "false");
    }

    #[test]
    fn missing_commands_is_bad_request() {
        let err = parse_run_request(r#"{}"#, 10.0).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn empty_commands_is_bad_request() {
        let err = parse_run_request(r#"{"commands":[]}"#, 10.0).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn commands_not_a_list_is_bad_request() {
        let err = parse_run_request(r#"{"commands":"true"}"#, 10.0).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn numeric_environ_values_are_stringified() {
        let req = parse_run_request(r#"{"commands":["true"],"environ":{"N":3}}"#, 10.0).unwrap();
        assert_eq!(req.commands[0].environ.get("N").unwrap(), "3");
    }

    #[test]
    fn object_command_with_timeout() {
        let req = parse_run_request(
            r#"{"commands":[{"command":"echo hi","timeout":2.5}]}"#,
            10.0,
        )
        .unwrap();
        assert_eq!(req.commands[0].timeout, 2.5);
        assert_eq!(req.commands[0].command, "echo hi");
    }

    #[test]
    fn malformed_entry_is_bad_request() {
        let err = parse_run_request(r#"{"commands":[42]}"#, 10.0).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn non_positive_timeout_is_bad_request() {
        let err = parse_run_request(
            r#"{"commands":[{"command":"true","timeout":0}]}"#,
            10.0,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
