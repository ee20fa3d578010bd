//! Connection manager for the robot controller.
//!
//! This module owns the single TCP connection to the remote controller and
//! turns it into a request/response call surface.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  mpsc   ┌──────────────────────┐   TCP    ┌─────────────┐
//! │ LinkHandle(s)│ ──────► │ LinkManager task     │ ◄──────► │ controller  │
//! │              │ ◄────── │  framer + correlator │  NDJSON  │ (robot)     │
//! └──────────────┘ oneshot └──────────────────────┘          └─────────────┘
//! ```
//!
//! # Protocol
//!
//! One JSON value per line in each direction:
//!
//! ```text
//! → {"cmd":"forward","speed":40,"angle":0}
//! ← {"ok":true}
//! → {"cmd":"sensors"}
//! ← {"ok":true,"distance_cm":12.5,"cliff":"safe"}
//! ```
//!
//! Responses carry no request id. The controller must answer strictly in the
//! order it received commands; the link pairs them first-in, first-out.
//!
//! # Usage
//!
//! ```ignore
//! use rover_link::link::LinkHandle;
//! use rover_link::{Command, LinkConfig};
//!
//! let link = LinkHandle::spawn(LinkConfig::from_env()?);
//! let result = link.issue_command(Command::sensors()).await;
//! ```

mod client;
mod correlator;
mod encoder;
mod framing;
mod manager;

pub use client::{LinkError, LinkHandle};
pub use correlator::{Correlator, PendingReply, PendingSlot};
pub use encoder::{encode, CMD_FIELD};
pub use framing::{Frame, LineFramer, DELIMITER, MAX_LINE_LENGTH};
pub use manager::ConnectionState;
