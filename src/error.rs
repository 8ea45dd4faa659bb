//! Gatekeeper error taxonomy shared across the rate window, credential manager, and gate.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error used for opaque failure causes supplied by callers.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Canonical gatekeeper error exposed by public APIs.
///
/// Slot-acquisition and credential failures are never swallowed; each terminates
/// the invocation with the typed variant below so callers can distinguish
/// retryable-by-design conditions from terminal ones without parsing messages.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem raised before any work starts.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Caller was abandoned while queued for a rate slot.
	#[error(transparent)]
	Cancelled(#[from] crate::limit::CancelledError),
	/// Credential refresh failed, or the credential was rejected again right
	/// after a forced refresh.
	#[error(transparent)]
	Credential(#[from] crate::credential::CredentialError),
	/// The gated action reported a terminal failure.
	#[error(transparent)]
	Call(#[from] CallError),
}

/// Configuration and validation failures raised at construction time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ConfigError {
	/// The rate window must admit at least one call per period.
	#[error("Rate window capacity must be positive.")]
	ZeroCapacity,
	/// The reset cadence must be a positive duration.
	#[error("Rate window period must be positive.")]
	NonPositivePeriod,
	/// The credential lifetime must be a positive duration.
	#[error("Credential TTL must be positive.")]
	NonPositiveTtl,
}

/// Failure reported by the gated action itself.
#[derive(Debug, ThisError)]
pub enum CallError {
	/// The action reported a terminal failure; the original cause is preserved
	/// and surfaced verbatim.
	#[error("Remote call failed.")]
	Failed {
		/// Caller-supplied failure cause.
		#[source]
		source: BoxError,
	},
}
