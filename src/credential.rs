//! Credential lifecycle: redacted bearer tokens, freshness tracking, and
//! single-flight refresh coordination.
//!
//! [`CredentialManager::ensure_valid`] collapses any number of concurrent
//! callers that observe a stale credential into one challenge/exchange round
//! trip. An epoch counter distinguishes "a flight resolved while I waited for
//! the guard" from "I am the flight"; joiners reuse the recorded outcome,
//! success or failure, instead of starting a second round trip. The freshness
//! check and the refresh transition sit under the same coordination, so the
//! racy check-then-act window of a naive expiry test never opens.

pub mod exchange;

mod metrics;

pub use exchange::*;
pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Redacted bearer token wrapper keeping secret material out of logs.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Renewable bearer credential issued through the challenge exchange.
///
/// Only a successful exchange constructs one, so a credential always carries a
/// non-empty token together with its expiry. Never persisted.
#[derive(Clone)]
pub struct Credential {
	/// Bearer token; callers must avoid logging it.
	pub token: TokenSecret,
	/// Instant the manager installed the credential.
	pub issued_at: OffsetDateTime,
	/// Instant the manager stops trusting the credential.
	pub expires_at: OffsetDateTime,
}
impl Credential {
	/// Returns `true` while the credential is trusted at the provided instant.
	pub fn is_fresh_at(&self, instant: OffsetDateTime) -> bool {
		instant < self.expires_at
	}

	/// Convenience helper checking freshness against the current UTC instant.
	pub fn is_fresh(&self) -> bool {
		self.is_fresh_at(OffsetDateTime::now_utc())
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Failure surfaced by credential operations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CredentialError {
	/// A refresh stage failed; every caller that awaited the flight sees the
	/// same value.
	#[error("Credential refresh failed during {stage}.")]
	Refresh {
		/// Stage of the round trip that failed.
		stage: RefreshStage,
		/// Underlying collaborator failure.
		#[source]
		source: ExchangeError,
	},
	/// The exchange succeeded but produced an empty token.
	#[error("Credential endpoint issued an empty token.")]
	EmptyToken,
	/// No credential has ever been issued; the manager never substitutes a
	/// placeholder token.
	#[error("No credential has been issued.")]
	NotIssued,
	/// The endpoint rejected the credential again immediately after a forced
	/// refresh.
	#[error("Remote endpoint rejected the credential immediately after a refresh.")]
	StillRejected,
}

/// Round-trip stages reported in refresh failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefreshStage {
	/// Fetching the auth challenge.
	Fetch,
	/// Signing the challenge payload.
	Sign,
	/// Exchanging the signed challenge for a token.
	Exchange,
}
impl RefreshStage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RefreshStage::Fetch => "fetch",
			RefreshStage::Sign => "sign",
			RefreshStage::Exchange => "exchange",
		}
	}
}
impl Display for RefreshStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Owns the renewable credential and coordinates refresh flights.
pub struct CredentialManager {
	exchanger: Arc<dyn ChallengeExchanger>,
	ttl: Duration,
	state: Mutex<RefreshState>,
	flight: AsyncMutex<()>,
	metrics: Arc<RefreshMetrics>,
}
impl CredentialManager {
	/// Validates the TTL and builds a manager around the injected collaborator.
	pub fn new(
		exchanger: Arc<dyn ChallengeExchanger>,
		credential_ttl: Duration,
	) -> Result<Self, ConfigError> {
		if !credential_ttl.is_positive() {
			return Err(ConfigError::NonPositiveTtl);
		}

		Ok(Self::start(exchanger, credential_ttl))
	}

	pub(crate) fn start(exchanger: Arc<dyn ChallengeExchanger>, ttl: Duration) -> Self {
		Self {
			exchanger,
			ttl,
			state: Mutex::new(RefreshState::default()),
			flight: AsyncMutex::new(()),
			metrics: Default::default(),
		}
	}

	/// Returns a currently fresh credential, refreshing it first if necessary.
	///
	/// Safe to call from any number of concurrent callers; those that observe a
	/// stale credential while a flight is in progress block behind it and reuse
	/// its outcome rather than starting a second round trip.
	pub async fn ensure_valid(&self) -> Result<Credential, CredentialError> {
		let observed = {
			let now = OffsetDateTime::now_utc();
			let state = self.state.lock();

			if let Some(credential) =
				state.credential.as_ref().filter(|credential| credential.is_fresh_at(now))
			{
				return Ok(credential.clone());
			}

			state.epoch
		};

		self.join_flight(observed, false).await
	}

	/// Unconditionally refreshes, collapsing concurrent callers into one
	/// flight. Used after the remote endpoint rejects the presented credential.
	pub async fn force_refresh(&self) -> Result<Credential, CredentialError> {
		let observed = self.state.lock().epoch;

		self.join_flight(observed, true).await
	}

	/// Returns the issued credential without refreshing, or
	/// [`CredentialError::NotIssued`] when none has ever been installed.
	pub fn current(&self) -> Result<Credential, CredentialError> {
		self.state.lock().credential.clone().ok_or(CredentialError::NotIssued)
	}

	/// Shared refresh counters.
	pub fn metrics(&self) -> Arc<RefreshMetrics> {
		Arc::clone(&self.metrics)
	}

	async fn join_flight(
		&self,
		observed_epoch: u64,
		force: bool,
	) -> Result<Credential, CredentialError> {
		let _flight = self.flight.lock().await;

		{
			let now = OffsetDateTime::now_utc();
			let state = self.state.lock();

			if state.epoch != observed_epoch {
				// A flight resolved while this caller waited for the guard;
				// share its outcome instead of flying again.
				if let Some(outcome) = state.last_outcome.clone() {
					self.metrics.record_coalesced();

					return outcome;
				}
			}
			if let Some(credential) = state
				.credential
				.as_ref()
				.filter(|credential| !force && credential.is_fresh_at(now))
			{
				return Ok(credential.clone());
			}
		}

		let span = OpSpan::new(OpKind::Refresh, "join_flight");

		obs::record_op_outcome(OpKind::Refresh, OpOutcome::Attempt);
		self.metrics.record_attempt();

		let outcome = span.instrument(self.round_trip()).await;

		match &outcome {
			Ok(_) => {
				obs::record_op_outcome(OpKind::Refresh, OpOutcome::Success);
				self.metrics.record_success();
			},
			Err(_) => {
				obs::record_op_outcome(OpKind::Refresh, OpOutcome::Failure);
				self.metrics.record_failure();
			},
		}

		let mut state = self.state.lock();

		state.epoch = state.epoch.wrapping_add(1);

		if let Ok(credential) = &outcome {
			state.credential = Some(credential.clone());
		}

		state.last_outcome = Some(outcome.clone());

		outcome
	}

	async fn round_trip(&self) -> Result<Credential, CredentialError> {
		let challenge = self
			.exchanger
			.fetch_challenge()
			.await
			.map_err(|source| CredentialError::Refresh { stage: RefreshStage::Fetch, source })?;
		let signed = self
			.exchanger
			.sign_challenge(&challenge.data)
			.await
			.map_err(|source| CredentialError::Refresh { stage: RefreshStage::Sign, source })?;
		let token = self
			.exchanger
			.exchange_challenge(&challenge.id, &signed)
			.await
			.map_err(|source| CredentialError::Refresh { stage: RefreshStage::Exchange, source })?;

		if token.is_empty() {
			return Err(CredentialError::EmptyToken);
		}

		let issued_at = OffsetDateTime::now_utc();

		Ok(Credential {
			token: TokenSecret::new(token),
			issued_at,
			expires_at: issued_at + self.ttl,
		})
	}
}
impl Debug for CredentialManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("CredentialManager")
			.field("ttl", &self.ttl)
			.field("issued", &state.credential.is_some())
			.field("epoch", &state.epoch)
			.finish()
	}
}

#[derive(Default)]
struct RefreshState {
	credential: Option<Credential>,
	epoch: u64,
	last_outcome: Option<Result<Credential, CredentialError>>,
}
