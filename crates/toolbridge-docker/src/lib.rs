//! Container plumbing for toolbridge.
//!
//! Two layers, strictly separated:
//!
//! - [`command`] - pure argv construction for sandboxed server launches.
//!   Never executes anything.
//! - [`cli`] - the container-runtime adapter: availability probing and
//!   stop/remove/status/logs, each an awaited subprocess with a bounded
//!   timeout and a structured result.

#![deny(unsafe_code)]

pub mod cli;
pub mod command;

pub use cli::{CommandOutput, DockerCli, DockerError};
pub use command::{
    DEFAULT_RUNTIME_IMAGE, container_name_for, package_run_command, split_for_host_config,
};
