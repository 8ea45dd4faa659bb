//! Gated invocation: slot acquisition, credential freshness, and the single
//! auth-rejection retry in one orchestrated call path.
//!
//! Per invocation the gate runs: acquire a rate slot, ensure the credential is
//! fresh, execute the caller-supplied action, interpret its tri-state outcome,
//! release the slot. The slot is an RAII [`SlotPermit`](crate::limit::SlotPermit),
//! so release happens exactly once on every exit path, panics included. The
//! gate never holds one component's lock while calling into the other.

// self
use crate::{
	_prelude::*,
	config::GateConfig,
	credential::{ChallengeExchanger, Credential, CredentialError, CredentialManager},
	error::{BoxError, CallError},
	limit::RateLimiter,
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Tri-state outcome of one gated remote call.
///
/// Auth rejections are modeled apart from other failures so the gate can
/// distinguish retryable-by-design conditions from terminal ones without
/// inspecting error messages.
#[derive(Debug)]
pub enum CallOutcome<T> {
	/// The call succeeded with the given payload.
	Success(T),
	/// The endpoint no longer accepts the presented credential.
	AuthRejected,
	/// The call failed terminally; the cause is surfaced verbatim.
	Failure(BoxError),
}
impl<T> CallOutcome<T> {
	/// Wraps an arbitrary error value as a terminal failure.
	pub fn failure(source: impl Into<BoxError>) -> Self {
		Self::Failure(source.into())
	}
}

/// Orchestrates rate slots and credential freshness around caller-supplied
/// actions.
pub struct GatedClient {
	/// Rate window bounding starts per period and overall concurrency.
	pub limiter: RateLimiter,
	/// Credential lifecycle owner shared by every invocation.
	pub credentials: CredentialManager,
}
impl GatedClient {
	/// Builds a gatekeeper from a validated configuration and the injected
	/// challenge collaborator.
	///
	/// Spawns the window reset task, so this must run within a Tokio runtime.
	pub fn new(config: GateConfig, exchanger: Arc<dyn ChallengeExchanger>) -> Self {
		Self {
			limiter: RateLimiter::start(config.capacity(), config.period_std()),
			credentials: CredentialManager::start(exchanger, config.credential_ttl()),
		}
	}

	/// Runs one gated call: waits for a rate slot, ensures the credential is
	/// fresh, then executes `action` with it.
	///
	/// A first attempt that returns [`CallOutcome::AuthRejected`] triggers
	/// exactly one forced refresh and one retry; a second rejection surfaces as
	/// [`CredentialError::StillRejected`] rather than looping against a
	/// misconfigured credential source. Slot-acquisition and credential
	/// failures terminate the call with their typed error.
	pub async fn invoke<T, A, F>(&self, mut action: A) -> Result<T>
	where
		A: FnMut(Credential) -> F,
		F: Future<Output = CallOutcome<T>>,
	{
		let span = OpSpan::new(OpKind::Invoke, "invoke");

		obs::record_op_outcome(OpKind::Invoke, OpOutcome::Attempt);

		let result = span
			.instrument(async {
				let _slot = self.limiter.acquire().await?;
				let credential = self.credentials.ensure_valid().await?;

				match action(credential).await {
					CallOutcome::Success(payload) => Ok(payload),
					CallOutcome::Failure(source) => Err(CallError::Failed { source }.into()),
					CallOutcome::AuthRejected => {
						let refreshed = self.credentials.force_refresh().await?;

						match action(refreshed).await {
							CallOutcome::Success(payload) => Ok(payload),
							CallOutcome::Failure(source) =>
								Err(CallError::Failed { source }.into()),
							CallOutcome::AuthRejected =>
								Err(CredentialError::StillRejected.into()),
						}
					},
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(OpKind::Invoke, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(OpKind::Invoke, OpOutcome::Failure),
		}

		result
	}

	/// Tears down the rate window's reset task and drains queued waiters.
	pub fn shutdown(&self) {
		self.limiter.shutdown();
	}
}
impl Debug for GatedClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GatedClient")
			.field("limiter", &self.limiter)
			.field("credentials", &self.credentials)
			.finish()
	}
}
