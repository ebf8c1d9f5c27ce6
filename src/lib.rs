//! rootfs-builder library.
//!
//! Assembles a minimal Linux root filesystem in three stages: an FHS
//! skeleton from a layout file, a cross-compiled BusyBox, and binary
//! packages fetched with the host's pacman. The binary in `main.rs` is a
//! thin CLI over [`pipeline::Pipeline`]; integration tests drive the same
//! API with mocked host tools.

pub mod arch;
pub mod clean;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod fhs;
pub mod loader;
pub mod logging;
pub mod packages;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod timing;
pub mod toolbox;
pub mod tools;
pub mod workspace;

pub use error::BuildError;
