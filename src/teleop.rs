//! Text-driven teleop session.
//!
//! Turns operator input such as `forward 55` or `stop` into controller
//! commands, tracks what the robot was last told to do, and refreshes sensor
//! telemetry after every submission.

use std::fmt;

use tracing::debug;

use crate::models::{Command, CommandResult, SensorReading};
use crate::service::CommandService;

pub const DEFAULT_FORWARD_SPEED: i64 = 40;
pub const DEFAULT_BACKWARD_SPEED: i64 = 30;
pub const TURN_SPEED: i64 = 35;

/// Last commanded direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    Stopped,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the robot was last told to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveState {
    pub direction: Direction,
    pub speed: i64,
}

impl Default for DriveState {
    fn default() -> Self {
        Self {
            direction: Direction::Stopped,
            speed: 0,
        }
    }
}

/// One parsed line of operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum TeleopInput {
    /// A motion command and the drive state it implies.
    Drive(Command, DriveState),
    /// Telemetry refresh only.
    Sensors,
    Unknown(String),
    Empty,
}

/// Parse operator input. Case-insensitive; extra words are ignored.
///
/// A speed argument is honoured for `forward` and `backward` only; missing,
/// zero or non-numeric speeds fall back to the defaults.
pub fn parse_input(text: &str) -> TeleopInput {
    let text = text.trim().to_lowercase();
    let mut parts = text.split_whitespace();
    let Some(word) = parts.next() else {
        return TeleopInput::Empty;
    };
    let speed = parts
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s != 0.0)
        .map(|s| s as i64);

    let drive = |command: Command, direction: Direction, speed: i64| {
        TeleopInput::Drive(command, DriveState { direction, speed })
    };

    match word {
        "forward" => {
            let speed = speed.unwrap_or(DEFAULT_FORWARD_SPEED);
            drive(Command::forward(speed, 0), Direction::Forward, speed)
        }
        "backward" => {
            let speed = speed.unwrap_or(DEFAULT_BACKWARD_SPEED);
            drive(Command::backward(speed, 0), Direction::Backward, speed)
        }
        "left" => drive(Command::left(TURN_SPEED), Direction::Left, TURN_SPEED),
        "right" => drive(Command::right(TURN_SPEED), Direction::Right, TURN_SPEED),
        "stop" => drive(Command::stop(), Direction::Stopped, 0),
        "sensors" => TeleopInput::Sensors,
        _ => TeleopInput::Unknown(text.clone()),
    }
}

/// Everything produced by one submission.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Submission {
    /// Result of the motion command, if one was sent.
    pub command: Option<CommandResult>,
    /// Result of the follow-up `sensors` request.
    pub telemetry: Option<CommandResult>,
    /// Operator-facing notice (unknown input).
    pub notice: Option<String>,
}

impl Submission {
    /// Typed telemetry, when the refresh succeeded.
    pub fn reading(&self) -> Option<SensorReading> {
        self.telemetry.as_ref().and_then(SensorReading::from_result)
    }
}

/// Teleop session over any command service.
pub struct Teleop<S> {
    service: S,
    drive: DriveState,
}

impl<S: CommandService> Teleop<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            drive: DriveState::default(),
        }
    }

    pub fn drive_state(&self) -> DriveState {
        self.drive
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Handle one line of input, then refresh telemetry.
    ///
    /// Unknown input is reported and not sent, but telemetry is still
    /// refreshed. Empty input does nothing.
    pub async fn submit(&mut self, text: &str) -> Submission {
        let mut submission = Submission::default();

        match parse_input(text) {
            TeleopInput::Empty => return submission,
            TeleopInput::Drive(command, state) => {
                self.drive = state;
                debug!("Drive: {} at {}", state.direction, state.speed);
                submission.command = Some(self.service.issue_command(command).await);
            }
            TeleopInput::Sensors => {}
            TeleopInput::Unknown(text) => {
                submission.notice = Some(format!("Unknown command: {}", text));
            }
        }

        submission.telemetry = Some(self.refresh_sensors().await);
        submission
    }

    /// Request a telemetry snapshot.
    pub async fn refresh_sensors(&self) -> CommandResult {
        self.service.issue_command(Command::sensors()).await
    }

    /// Command a stop regardless of current state.
    pub async fn halt(&mut self) -> CommandResult {
        self.drive = DriveState::default();
        self.service.issue_command(Command::stop()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Response;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    // Mock command service: records commands, replays canned lines.
    #[derive(Clone, Default)]
    struct MockService {
        sent: Arc<Mutex<Vec<Command>>>,
        replies: Arc<Mutex<VecDeque<&'static str>>>,
    }

    impl MockService {
        fn with_replies(replies: &[&'static str]) -> Self {
            let mock = Self::default();
            mock.replies.lock().unwrap().extend(replies.iter().copied());
            mock
        }

        fn sent_names(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|c| c.name.clone()).collect()
        }
    }

    impl CommandService for MockService {
        async fn issue_command(&self, command: Command) -> CommandResult {
            self.sent.lock().unwrap().push(command);
            match self.replies.lock().unwrap().pop_front() {
                Some(line) => CommandResult::from(Response::parse(line)),
                None => CommandResult::failure("no_socket"),
            }
        }
    }

    #[test]
    fn test_parse_defaults() {
        match parse_input("forward") {
            TeleopInput::Drive(cmd, state) => {
                assert_eq!(cmd, Command::forward(40, 0));
                assert_eq!(state, DriveState { direction: Direction::Forward, speed: 40 });
            }
            other => panic!("unexpected: {:?}", other),
        }
        match parse_input("backward") {
            TeleopInput::Drive(cmd, _) => assert_eq!(cmd, Command::backward(30, 0)),
            other => panic!("unexpected: {:?}", other),
        }
        match parse_input("LEFT") {
            TeleopInput::Drive(cmd, _) => assert_eq!(cmd, Command::left(35)),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_speed_argument() {
        match parse_input("  Forward 55 ") {
            TeleopInput::Drive(cmd, state) => {
                assert_eq!(cmd.options.get("speed"), Some(&json!(55)));
                assert_eq!(state.speed, 55);
            }
            other => panic!("unexpected: {:?}", other),
        }

        // Zero and garbage fall back to the default.
        for text in ["backward 0", "backward fast"] {
            match parse_input(text) {
                TeleopInput::Drive(cmd, _) => assert_eq!(cmd.options.get("speed"), Some(&json!(30))),
                other => panic!("unexpected: {:?}", other),
            }
        }

        // Turns ignore the speed argument.
        match parse_input("right 90") {
            TeleopInput::Drive(cmd, _) => assert_eq!(cmd, Command::right(35)),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_other_inputs() {
        assert_eq!(parse_input("sensors"), TeleopInput::Sensors);
        assert_eq!(parse_input("   "), TeleopInput::Empty);
        assert_eq!(parse_input("Jump high"), TeleopInput::Unknown("jump high".to_string()));
        match parse_input("stop") {
            TeleopInput::Drive(cmd, state) => {
                assert_eq!(cmd, Command::stop());
                assert_eq!(state, DriveState::default());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_drives_then_refreshes() {
        let mock = MockService::with_replies(&[
            r#"{"ok":true}"#,
            r#"{"ok":true,"distance_cm":18.4,"cliff":"safe"}"#,
        ]);
        let mut teleop = Teleop::new(mock.clone());

        let submission = teleop.submit("forward 50").await;
        assert_eq!(mock.sent_names(), vec!["forward", "sensors"]);
        assert!(submission.command.as_ref().unwrap().ok);
        assert_eq!(teleop.drive_state().direction, Direction::Forward);
        assert_eq!(teleop.drive_state().speed, 50);

        let reading = submission.reading().unwrap();
        assert_eq!(reading.distance_cm, Some(18.4));
        assert_eq!(reading.cliff.unwrap().as_str(), "safe");
    }

    #[tokio::test]
    async fn test_unknown_input_is_not_sent() {
        let mock = MockService::with_replies(&[r#"{"ok":true,"distance_cm":5}"#]);
        let mut teleop = Teleop::new(mock.clone());

        let submission = teleop.submit("fly").await;
        assert_eq!(submission.notice.as_deref(), Some("Unknown command: fly"));
        assert!(submission.command.is_none());
        assert_eq!(mock.sent_names(), vec!["sensors"]);
        assert_eq!(teleop.drive_state(), DriveState::default());
    }

    #[tokio::test]
    async fn test_empty_input_does_nothing() {
        let mock = MockService::default();
        let mut teleop = Teleop::new(mock.clone());
        assert_eq!(teleop.submit("").await, Submission::default());
        assert!(mock.sent_names().is_empty());
    }

    #[tokio::test]
    async fn test_failed_refresh_has_no_reading() {
        let mock = MockService::with_replies(&[r#"{"ok":false,"error":"ultrasonic: timeout"}"#]);
        let mut teleop = Teleop::new(mock);

        let submission = teleop.submit("sensors").await;
        let telemetry = submission.telemetry.clone().unwrap();
        assert_eq!(telemetry.error_text(), "ultrasonic: timeout");
        assert!(submission.reading().is_none());
    }

    #[tokio::test]
    async fn test_halt_resets_drive_state() {
        let mock = MockService::with_replies(&[r#"{"ok":true}"#, r#"{"ok":true}"#, r#"{"ok":true}"#]);
        let mut teleop = Teleop::new(mock.clone());
        teleop.submit("left").await;
        assert_eq!(teleop.drive_state().direction, Direction::Left);

        assert!(teleop.halt().await.ok);
        assert_eq!(teleop.drive_state(), DriveState::default());
        assert_eq!(mock.sent_names(), vec!["left", "sensors", "stop"]);
    }
}
