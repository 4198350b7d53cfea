//! Lifecycle management for the locally-spawned inference backend.
//!
//! Three pieces cooperate here: [`ArtifactStore`] answers read-only
//! questions about where the packaged backend archive and the writable
//! runtime directory live; [`RuntimeExtractor`] turns the archive into a
//! consistent, version-marked runtime tree; [`ProcessSupervisor`] owns the
//! single backend child process from spawn to guaranteed termination.
//!
//! Nothing in this crate talks to the streaming API; it only has to leave
//! the backend reachable on its local address.

pub mod artifacts;
pub mod error;
pub mod extract;
pub mod shutdown;
pub mod supervisor;

pub use artifacts::ArtifactStore;
pub use error::{ExtractError, SupervisorError};
pub use extract::RuntimeExtractor;
pub use shutdown::{install_shutdown_guard, ShutdownGuard};
pub use supervisor::{
    BackendHandle, DevRuntimeResolver, LaunchPlan, LaunchResolver, PackagedRuntimeResolver,
    ProcessState, ProcessSupervisor,
};
