//! Rover Link Library
//!
//! This library provides the core components for driving a robot controller
//! over a persistent TCP connection:
//!
//! - `link` - Connection manager: framing, FIFO correlation, reconnects
//! - `models` - Commands, responses and the flat result shape
//! - `config` - Endpoint and timing configuration
//! - `service` - The `CommandService` call surface for front ends
//! - `teleop` - Text-driven teleop session on top of `CommandService`
//!
//! # Link Module
//!
//! ```ignore
//! use rover_link::{Command, LinkConfig, LinkHandle};
//!
//! let link = LinkHandle::spawn(LinkConfig::from_env()?);
//! let result = link.issue_command(Command::forward(40, 0)).await;
//! ```

pub mod config;
pub mod link;
pub mod models;
pub mod service;
pub mod teleop;

pub use config::LinkConfig;
pub use link::{ConnectionState, LinkError, LinkHandle};
pub use models::{CliffStatus, Command, CommandResult, Response, SensorReading};
pub use service::CommandService;
