//! Shared scripted collaborator and scheduling helpers for integration tests.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicU32, Ordering},
	},
	time::Duration,
};
// self
use rate_gate::credential::{Challenge, ChallengeExchanger, ExchangeError, ExchangeFuture};

/// Scripted challenge collaborator that counts round trips and can stall, fail,
/// or issue empty tokens on demand.
///
/// Tokens are issued as `token-1`, `token-2`, ... in exchange-call order so
/// tests can assert which refresh produced the credential they saw.
pub struct ScriptedExchanger {
	stall: Duration,
	fetches: AtomicU32,
	signs: AtomicU32,
	exchanges: AtomicU32,
	fail_exchanges: AtomicU32,
	empty_tokens: AtomicU32,
}
impl ScriptedExchanger {
	pub fn new() -> Arc<Self> {
		Self::with_stall(Duration::ZERO)
	}

	/// Stalls every challenge fetch so concurrent callers genuinely overlap an
	/// in-flight round trip.
	pub fn with_stall(stall: Duration) -> Arc<Self> {
		Arc::new(Self {
			stall,
			fetches: AtomicU32::new(0),
			signs: AtomicU32::new(0),
			exchanges: AtomicU32::new(0),
			fail_exchanges: AtomicU32::new(0),
			empty_tokens: AtomicU32::new(0),
		})
	}

	/// Fails the next `count` exchange calls with a 400-style endpoint error.
	pub fn fail_next_exchanges(&self, count: u32) {
		self.fail_exchanges.store(count, Ordering::SeqCst);
	}

	/// Issues an empty token for the next `count` exchange calls.
	pub fn issue_empty_next(&self, count: u32) {
		self.empty_tokens.store(count, Ordering::SeqCst);
	}

	pub fn fetch_count(&self) -> u32 {
		self.fetches.load(Ordering::SeqCst)
	}

	pub fn sign_count(&self) -> u32 {
		self.signs.load(Ordering::SeqCst)
	}

	pub fn exchange_count(&self) -> u32 {
		self.exchanges.load(Ordering::SeqCst)
	}

	fn take_scripted(&self, counter: &AtomicU32) -> bool {
		counter
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
				remaining.checked_sub(1)
			})
			.is_ok()
	}
}
impl ChallengeExchanger for ScriptedExchanger {
	fn fetch_challenge(&self) -> ExchangeFuture<'_, Challenge> {
		Box::pin(async move {
			let serial = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;

			if !self.stall.is_zero() {
				tokio::time::sleep(self.stall).await;
			}

			Ok(Challenge { id: format!("challenge-{serial}"), data: format!("payload-{serial}") })
		})
	}

	fn sign_challenge<'a>(&'a self, data: &'a str) -> ExchangeFuture<'a, String> {
		Box::pin(async move {
			self.signs.fetch_add(1, Ordering::SeqCst);

			Ok(format!("signed:{data}"))
		})
	}

	fn exchange_challenge<'a>(
		&'a self,
		_challenge_id: &'a str,
		_signed_data: &'a str,
	) -> ExchangeFuture<'a, String> {
		Box::pin(async move {
			let serial = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;

			if self.take_scripted(&self.fail_exchanges) {
				return Err(ExchangeError::Endpoint {
					message: "invalid signature".into(),
					status: Some(400),
				});
			}
			if self.take_scripted(&self.empty_tokens) {
				return Ok(String::new());
			}

			Ok(format!("token-{serial}"))
		})
	}
}

/// Yields repeatedly so spawned tasks reach their next suspension point
/// without advancing the (possibly paused) clock.
pub async fn settle() {
	for _ in 0..64 {
		tokio::task::yield_now().await;
	}
}
