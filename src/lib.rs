//! termvisor - a small hypervisor multiplexing terminal sessions over worker processes
//!
//! This crate provides:
//! - The binary wire-message codec terminals and workers speak (`msg`)
//! - The external task registry and PTY-backed workers (`hypervisor`)
//! - A publish/subscribe channel bus resources attach to (`dbus`)
//! - The terminal state machine and terminal stack (`terminal`)
//! - RPC between the CLI client and the hypervisor (`rpc`, `client`)
//!
//! # Architecture
//!
//! - The server (`termvisor-server`) owns a [`hypervisor::Hypervisor`] and ticks it
//! - The client (`termvisor`) issues RPC calls and terminal input
//! - Communication happens over Unix domain sockets

pub mod client;
pub mod config;
pub mod dbus;
pub mod hypervisor;
pub mod msg;
pub mod rpc;
pub mod terminal;
