//! Collaborator contract for the two-step challenge/token exchange.

// self
use crate::_prelude::*;

/// Boxed future returned by [`ChallengeExchanger`] capabilities.
pub type ExchangeFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, ExchangeError>> + 'a + Send>>;

/// Opaque capabilities the credential manager needs from the excluded
/// HTTP/signing layer.
///
/// One refresh drives one round trip: fetch a challenge, have the collaborator
/// sign its payload, then exchange the signed payload for a bearer token.
/// Implementations own endpoints, wire formats, and key material; the manager
/// only sequences the calls.
pub trait ChallengeExchanger
where
	Self: Send + Sync,
{
	/// Fetches a fresh auth challenge from the credential endpoint.
	fn fetch_challenge(&self) -> ExchangeFuture<'_, Challenge>;

	/// Signs the challenge payload. Signing lives entirely in the collaborator;
	/// the manager pipes the payload through untouched.
	fn sign_challenge<'a>(&'a self, data: &'a str) -> ExchangeFuture<'a, String>;

	/// Exchanges the signed challenge for a bearer token.
	fn exchange_challenge<'a>(
		&'a self,
		challenge_id: &'a str,
		signed_data: &'a str,
	) -> ExchangeFuture<'a, String>;
}

/// Auth challenge returned by the credential endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
	/// Identifier the endpoint uses to correlate the later exchange.
	pub id: String,
	/// Payload the collaborator must sign before exchanging.
	pub data: String,
}

/// Failure reported by a [`ChallengeExchanger`] capability.
///
/// Variants carry owned summaries so a refresh outcome can be cloned to every
/// caller that awaited the same flight.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ExchangeError {
	/// The endpoint answered with a non-success status or an unusable body.
	#[error("Credential endpoint returned an unexpected response: {message}.")]
	Endpoint {
		/// Endpoint- or collaborator-supplied summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// The challenge payload could not be signed.
	#[error("Challenge payload could not be signed: {message}.")]
	Signing {
		/// Collaborator-supplied summary of the failure.
		message: String,
	},
	/// The transport failed before the endpoint answered.
	#[error("Transport failure while contacting the credential endpoint: {message}.")]
	Transport {
		/// Transport-specific summary of the failure.
		message: String,
	},
}
