//! Line-oriented control plane
//!
//! Operators connect over TCP and manage the NF chain, rate limits and
//! allowlist while traffic flows.

mod command;
mod server;

pub use command::{execute, respond, Command, CommandError, Reply, HELP};
pub use server::{handle_session, serve, MAX_LINE_LEN};
