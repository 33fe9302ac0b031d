//! padlink: control logic of a wired game-pad driver.
//!
//! The crate turns raw transfers from a host transport into shaped pad state
//! and negotiates the pad's accessory port. Device discovery and the OS-facing
//! input device live outside, behind [`transport::Transport`] and
//! [`driver::HostShell`].

pub mod axis;
pub mod config;
pub mod driver;
pub mod handshake;
pub mod report;
pub mod transport;
