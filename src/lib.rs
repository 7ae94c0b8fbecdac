//! A minimal two-channel file transfer client and server.
//!
//! A persistent text control connection carries user commands and
//! responses; short-lived data connections, opened on demand through a
//! handshake on the control channel, carry directory listings and file
//! bodies. See `SPEC_FULL.md` in the repository root for the full protocol
//! description.
#![allow(clippy::upper_case_acronyms)]

pub mod client;
pub mod command;
pub mod lineio;
pub mod pager;
pub mod proto;
pub mod server;
