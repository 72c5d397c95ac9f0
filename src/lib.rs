//! Roleboot: role-based entrypoint for multi-room audio containers
//!
//! One container image serves every node of a synchronized audio system.
//! At startup roleboot reads the role from the environment and becomes:
//! - the hub (snapserver), after staging its config and named pipes
//! - a playback endpoint (snapclient) with an auto-detected audio backend
//! - an endpoint with a visualizer: snapclient feeding an ALSA loopback card
//!   that LedFx captures from, both supervised as one unit
//! - a standalone visualizer (LedFx)
//!
//! # Architecture
//!
//! ```text
//!                   ┌─────────────────────────────────────┐
//!                   │       Config (file + environment)    │
//!                   └─────────────────────────────────────┘
//!                                      │ role
//!                                      ▼
//!                   ┌─────────────────────────────────────┐
//!                   │             Orchestrator            │
//!                   └─────────────────────────────────────┘
//!                                      │
//!        ┌─────────────────┬───────────┴──────┬──────────────────┐
//!        ▼                 ▼                  ▼                  ▼
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │   Services   │  │   Backend    │  │   Loopback   │  │   Command    │
//! │ dbus / avahi │  │   Resolver   │  │    Bridge    │  │   Builder    │
//! └──────────────┘  └──────────────┘  └──────────────┘  └──────────────┘
//!                          │                  │                  │
//!                          ▼                  ▼                  │
//!                   ┌──────────────┐  ┌──────────────┐           │
//!                   │   Devices    │  │ asound.conf  │           │
//!                   │ aplay -L/-l  │  │  modprobe    │           │
//!                   └──────────────┘  └──────────────┘           │
//!                                                                ▼
//!                                               ┌────────────────────────────┐
//!                                               │       TerminalAction       │
//!                                               └────────────────────────────┘
//!                                                  │                      │
//!                                        HandOff   ▼                      ▼  Supervise
//!                                       ┌──────────────┐     ┌──────────────────────┐
//!                                       │     exec     │     │   GroupSupervisor    │
//!                                       │ (no return)  │     │ client ─▶ readiness  │
//!                                       └──────────────┘     │  ─▶ visualizer,      │
//!                                                            │ restart on any exit  │
//!                                                            └──────────────────────┘
//! ```

pub mod backend;
pub mod cli;
pub mod command;
pub mod config;
pub mod devices;
pub mod error;
pub mod loopback;
pub mod orchestrator;
pub mod readiness;
pub mod services;
pub mod state;
pub mod supervisor;

#[cfg(test)]
mod test_support;

pub use cli::{Cli, Commands};
pub use command::CommandVector;
pub use config::{Config, Role};
pub use error::{Result, RolebootError};
pub use orchestrator::{Orchestrator, TerminalAction};
pub use supervisor::GroupSupervisor;
