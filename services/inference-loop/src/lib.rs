//! Edge Inference Loop
//!
//! Runs the on-device video inference program over and over. Each run is
//! bracketed by status notifications so subscribers know when inference is
//! active.
//!
//! ## Cycle
//!
//! ```text
//! publish "starting" ─▶ read parameters.txt ─▶ run program in sync folder
//!        ▲                                             │
//!        │                                             ▼
//!   loop delay ◀── publish "ended" ◀── sleep num_seconds + grace
//! ```
//!
//! ## Configuration
//!
//! Loaded from `config/inference-loop.*`, `/etc/edge/inference-loop.*` and
//! `INFERENCE__`-prefixed environment variables. See `config.rs`.

pub mod config;
pub mod control_loop;
pub mod parameters;
pub mod runner;

pub use config::{resolve_sync_folder, FailurePolicy, InferenceConfig, SyncFolderError};
pub use control_loop::InferenceLoop;
pub use parameters::{read_parameters, InferenceParameters};
pub use runner::{CommandRunner, InferenceError, InferenceRunner};
