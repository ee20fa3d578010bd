//! Command encoding for the controller wire format.
//!
//! A command becomes one JSON object `{"cmd": <name>, ...options}` followed by
//! a single newline.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::link::client::LinkError;
use crate::link::framing::DELIMITER;
use crate::models::Command;

/// Field carrying the command name.
pub const CMD_FIELD: &str = "cmd";

#[derive(Serialize)]
struct WireCommand<'a> {
    cmd: &'a str,
    #[serde(flatten)]
    options: &'a Map<String, Value>,
}

/// Encode a command into one delimited wire message.
///
/// # Errors
///
/// Returns `LinkError::ReservedOption` if `options` contains a `cmd` key,
/// since it would collide with the command name.
pub fn encode(command: &Command) -> Result<Vec<u8>, LinkError> {
    if command.options.contains_key(CMD_FIELD) {
        return Err(LinkError::ReservedOption);
    }

    let wire = WireCommand {
        cmd: &command.name,
        options: &command.options,
    };
    let mut message =
        serde_json::to_vec(&wire).map_err(|e| LinkError::Encode(e.to_string()))?;
    message.push(DELIMITER);
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn decode(message: &[u8]) -> Value {
        serde_json::from_slice(message).expect("encoded message should be JSON")
    }

    #[test]
    fn test_encode_forward() {
        let message = encode(&Command::forward(40, 0)).unwrap();
        assert_eq!(message.last(), Some(&b'\n'));
        assert_eq!(
            decode(&message),
            json!({"cmd": "forward", "speed": 40, "angle": 0})
        );
    }

    #[test]
    fn test_encode_without_options() {
        let message = encode(&Command::stop()).unwrap();
        assert_eq!(message, b"{\"cmd\":\"stop\"}\n".to_vec());
    }

    #[test]
    fn test_exactly_one_delimiter() {
        let cmd = Command::new("say").with("text", "two\nlines");
        let message = encode(&cmd).unwrap();
        let delimiters = message.iter().filter(|&&b| b == DELIMITER).count();
        assert_eq!(delimiters, 1);
        assert_eq!(decode(&message)["text"], json!("two\nlines"));
    }

    #[test]
    fn test_unknown_command_passes_through() {
        let message = encode(&Command::new("dance").with("style", "robot")).unwrap();
        assert_eq!(decode(&message), json!({"cmd": "dance", "style": "robot"}));
    }

    #[test]
    fn test_cmd_option_is_rejected() {
        let cmd = Command::new("forward").with("cmd", "stop");
        assert!(matches!(encode(&cmd), Err(LinkError::ReservedOption)));
    }
}
