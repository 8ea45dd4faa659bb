//! Windowed rate limiting with FIFO admission and an owned periodic reset task.
//!
//! [`RateLimiter`] bounds how many operations may start per window while also
//! capping concurrency at the same figure. Queued callers are admitted in
//! arrival order. The reset task restores the window as an atomic
//! set-to-capacity under the same lock that guards acquire/release, never as a
//! computed delta of permits, so in-flight releases can never inflate the
//! window past its configured capacity.

// std
use std::time::Duration as StdDuration;
// crates.io
use tokio::{
	sync::oneshot,
	task::JoinHandle,
	time::{self, MissedTickBehavior},
};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	obs::{self, OpKind, OpOutcome},
};

/// Error returned when a queued caller is abandoned by the rate window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CancelledError {
	/// The window was shut down while the caller was queued for a slot.
	#[error("Rate window was shut down while waiting for a slot.")]
	WindowClosed,
}

/// Bounded-concurrency rate limiter with periodic capacity restoration.
///
/// Construction spawns the reset task on the ambient Tokio runtime, so a
/// limiter must be created from within one. [`RateLimiter::shutdown`] (also run
/// on drop) stops the task and drains queued waiters; the timer is owned by the
/// instance, never by a process-wide scheduler.
pub struct RateLimiter {
	shared: Arc<WindowShared>,
	reset_task: Mutex<Option<JoinHandle<()>>>,
}
impl RateLimiter {
	/// Validates the window parameters and starts the limiter.
	pub fn new(capacity: u32, period: Duration) -> Result<Self, ConfigError> {
		if capacity == 0 {
			return Err(ConfigError::ZeroCapacity);
		}
		if !period.is_positive() {
			return Err(ConfigError::NonPositivePeriod);
		}

		Ok(Self::start(capacity, period.unsigned_abs()))
	}

	pub(crate) fn start(capacity: u32, period: StdDuration) -> Self {
		let shared = Arc::new(WindowShared {
			capacity,
			state: Mutex::new(WindowState {
				available: capacity,
				holders: 0,
				generation: 0,
				next_waiter_id: 0,
				waiters: VecDeque::new(),
				closed: false,
			}),
		});
		let task = tokio::spawn({
			let shared = Arc::clone(&shared);

			async move {
				let mut ticker = time::interval(period);

				ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
				// The interval's first tick completes immediately; the window
				// starts full, so consume it before entering the loop.
				ticker.tick().await;

				loop {
					ticker.tick().await;

					if !WindowShared::reset(&shared) {
						break;
					}
				}
			}
		});

		Self { shared, reset_task: Mutex::new(Some(task)) }
	}

	/// Waits for a slot, consuming one unit of the current window's budget, and
	/// returns the release handle.
	///
	/// Callers are admitted in arrival order. Dropping the returned future while
	/// queued removes the waiter without consuming a slot; timeouts compose
	/// through the caller's own cancellation (e.g. `tokio::time::timeout`).
	pub async fn acquire(&self) -> Result<SlotPermit, CancelledError> {
		let (id, rx) = {
			let mut state = self.shared.state.lock();

			if state.closed {
				return Err(CancelledError::WindowClosed);
			}
			if state.available > 0 {
				state.available -= 1;
				state.holders += 1;

				return Ok(SlotPermit::issue(&self.shared, state.generation));
			}

			let id = state.next_waiter_id;
			let (tx, rx) = oneshot::channel();

			state.next_waiter_id = state.next_waiter_id.wrapping_add(1);
			state.waiters.push_back(SlotWaiter { id, grant: tx });

			(id, rx)
		};
		let mut queued = QueuedWaiter { shared: &self.shared, id: Some(id) };
		let granted = rx.await;

		queued.id = None;

		granted.map_err(|_| CancelledError::WindowClosed)
	}

	/// Slots currently available in this window.
	pub fn available(&self) -> u32 {
		self.shared.state.lock().available
	}

	/// Permits currently held by in-flight operations.
	pub fn in_flight(&self) -> u32 {
		self.shared.state.lock().holders
	}

	/// Callers currently queued for a slot.
	pub fn queued(&self) -> usize {
		self.shared.state.lock().waiters.len()
	}

	/// Stops the reset task and fails every queued waiter with
	/// [`CancelledError::WindowClosed`]. Idempotent; also run on drop.
	pub fn shutdown(&self) {
		let drained = {
			let mut state = self.shared.state.lock();

			state.closed = true;

			std::mem::take(&mut state.waiters)
		};

		// Dropping the grant channels wakes the drained waiters outside the lock.
		drop(drained);

		if let Some(task) = self.reset_task.lock().take() {
			task.abort();
		}
	}
}
impl Drop for RateLimiter {
	fn drop(&mut self) {
		self.shutdown();
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.shared.state.lock();

		f.debug_struct("RateLimiter")
			.field("capacity", &self.shared.capacity)
			.field("available", &state.available)
			.field("in_flight", &state.holders)
			.field("queued", &state.waiters.len())
			.finish()
	}
}

struct WindowShared {
	capacity: u32,
	state: Mutex<WindowState>,
}
impl WindowShared {
	/// Atomically restores the window and admits queued waiters. Returns `false`
	/// once the window is closed so the reset task can stop.
	fn reset(shared: &Arc<Self>) -> bool {
		let mut state = shared.state.lock();

		if state.closed {
			return false;
		}

		state.generation = state.generation.wrapping_add(1);
		// Set-to-capacity under the acquire/release lock: still-running holders
		// keep their slots, everything else returns to the window.
		state.available = shared.capacity.saturating_sub(state.holders);

		Self::admit_waiters(shared, &mut state);
		obs::record_op_outcome(OpKind::Reset, OpOutcome::Success);

		true
	}

	fn release(shared: &Arc<Self>, generation: u64) {
		let mut state = shared.state.lock();

		state.holders = state.holders.saturating_sub(1);

		// A permit that outlived a reset was charged to the current window when
		// the reset subtracted holders; completing returns that slot. A permit
		// released inside its own window leaves the consumed budget consumed
		// until the next reset.
		if generation != state.generation
			&& state.available.saturating_add(state.holders) < shared.capacity
		{
			state.available += 1;
		}

		Self::admit_waiters(shared, &mut state);
	}

	fn admit_waiters(shared: &Arc<Self>, state: &mut WindowState) {
		while state.available > 0 {
			let Some(waiter) = state.waiters.pop_front() else { break };

			state.available -= 1;
			state.holders += 1;

			let permit = SlotPermit::issue(shared, state.generation);

			if let Err(mut unclaimed) = waiter.grant.send(permit) {
				// The waiter vanished between queueing and the grant; defuse the
				// returned permit without re-entering the lock and keep the slot
				// for the next waiter.
				unclaimed.armed = false;
				state.holders -= 1;
				state.available += 1;
			}
		}
	}
}

struct WindowState {
	available: u32,
	holders: u32,
	generation: u64,
	next_waiter_id: u64,
	waiters: VecDeque<SlotWaiter>,
	closed: bool,
}

struct SlotWaiter {
	id: u64,
	grant: oneshot::Sender<SlotPermit>,
}

/// Removes an abandoned waiter from the queue when the acquire future is
/// dropped mid-wait.
struct QueuedWaiter<'a> {
	shared: &'a Arc<WindowShared>,
	id: Option<u64>,
}
impl Drop for QueuedWaiter<'_> {
	fn drop(&mut self) {
		let Some(id) = self.id else { return };
		let mut state = self.shared.state.lock();

		if let Some(position) = state.waiters.iter().position(|waiter| waiter.id == id) {
			state.waiters.remove(position);
		}
	}
}

/// Release handle proving its holder occupies one rate slot.
///
/// Dropping the permit releases the slot exactly once, whichever path the
/// holding operation exits through.
pub struct SlotPermit {
	shared: Arc<WindowShared>,
	generation: u64,
	armed: bool,
}
impl SlotPermit {
	fn issue(shared: &Arc<WindowShared>, generation: u64) -> Self {
		Self { shared: Arc::clone(shared), generation, armed: true }
	}
}
impl Drop for SlotPermit {
	fn drop(&mut self) {
		if self.armed {
			WindowShared::release(&self.shared, self.generation);
		}
	}
}
impl Debug for SlotPermit {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SlotPermit").field("generation", &self.generation).finish()
	}
}
