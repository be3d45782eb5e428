// SPDX-License-Identifier: MIT OR Apache-2.0
//! The host-side error taxonomy (spec.md §7): every variant here carries
//! its own retry/poisoning policy, which [`crate::environment`] consults
//! when turning a failure into a well-formed `SimReturn`.

use thiserror::Error;

/// Errors raised spawning, driving, or tearing down a subprocess runner.
#[derive(Debug, Error)]
pub enum HostError {
    /// The child process could not be spawned, or its stdio handles were
    /// unavailable. Always fatal to the attempted process.
    #[error("failed to spawn subprocess runner: {0}")]
    Spawn(#[source] std::io::Error),

    /// A framing or transport failure on the JSON-RPC channel. Kills and
    /// removes the offending process; non-retryable.
    #[error(transparent)]
    Protocol(#[from] sx_protocol::ProtocolError),

    /// Bundle resolution or materialisation failed. Non-retryable; surfaced
    /// to the caller as a `SimReturn` failure with `retryable: false`.
    #[error(transparent)]
    Bundle(#[from] sx_bundle::BundleError),

    /// Dependency installation for a bundle's venv failed. Non-retryable
    /// for the task at hand; the venv is left tainted (no `.deps_installed`
    /// sentinel) so the next attempt re-installs from scratch.
    #[error("dependency installation failed for bundle {digest}: {message}")]
    DependencyInstall {
        /// The bundle whose venv setup failed.
        digest: String,
        /// Diagnostic text captured from the install subprocess.
        message: String,
    },

    /// The user's wire code raised during `execute` or `aggregate`.
    /// Non-retryable, but the subprocess itself remains healthy and stays
    /// in the pool.
    #[error("user code raised {error_type}: {message}")]
    User {
        /// The raising exception/error class name.
        error_type: String,
        /// Human-readable message.
        message: String,
    },

    /// A result payload could not be decoded (malformed base64, invalid
    /// JSON, an unexpected shape). Folded into [`HostError::User`] at the
    /// call site once classified, per spec.md §7.
    #[error("failed to deserialise subprocess response: {0}")]
    Serialisation(String),

    /// No response arrived within the call's deadline. The process is
    /// considered poisoned regardless of whether it is still alive.
    #[error("subprocess call to {method} timed out after {elapsed_ms}ms")]
    Timeout {
        /// The RPC method that timed out.
        method: String,
        /// How long the caller waited before giving up.
        elapsed_ms: u64,
    },

    /// The pool was asked to run a task but no process slot could be made
    /// available (should not happen with `max_processes >= 1`; surfaced as
    /// a diagnostic rather than silently retried).
    #[error("no warm process slot available")]
    PoolExhausted,
}

impl HostError {
    /// Spec.md §7's `(error_type, message, retryable)` view of this error,
    /// used to build the `ErrorInfo` on a failed `SimReturn`.
    pub fn classify(&self) -> (String, String, bool) {
        match self {
            HostError::Spawn(e) => ("SpawnError".to_string(), e.to_string(), false),
            HostError::Protocol(e) => ("ProtocolError".to_string(), e.to_string(), false),
            HostError::Bundle(e) => ("BundleError".to_string(), e.to_string(), false),
            HostError::DependencyInstall { message, .. } => {
                ("DependencyInstallError".to_string(), message.clone(), false)
            }
            HostError::User { error_type, message } => (error_type.clone(), message.clone(), false),
            HostError::Serialisation(message) => ("SerialisationError".to_string(), message.clone(), false),
            HostError::Timeout { method, elapsed_ms } => (
                "TimeoutError".to_string(),
                format!("call to {method} timed out after {elapsed_ms}ms"),
                false,
            ),
            HostError::PoolExhausted => ("PoolExhausted".to_string(), self.to_string(), false),
        }
    }

    /// `true` if this failure means the warm process must be terminated
    /// and evicted rather than returned to the pool (spec.md §7, §5).
    pub fn poisons_process(&self) -> bool {
        matches!(
            self,
            HostError::Protocol(_) | HostError::Timeout { .. } | HostError::Spawn(_)
        )
    }
}
