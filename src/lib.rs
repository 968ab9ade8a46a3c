//! sandbox-server: remote file inspection over TCP
//!
//! A client sends one command per connection; the server runs it against
//! its own filesystem and replies with text.
//!
//! Commands:
//! - `check_local_file`: offsets of a signature in a file
//! - `quarantine_local_file`: move a file into the quarantine directory
//!
//! The library installs no log subscriber. Binaries set one up; embedders
//! that don't get silent logging.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod fileops;
pub mod server;

pub use client::{Client, ClientError};
pub use config::Config;
pub use dispatch::{Dispatcher, Outcome};
pub use envelope::Request;
pub use server::Server;
