mod support;

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicU32, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use tokio::time;
// self
use rate_gate::{
	limit::{CancelledError, RateLimiter},
	time::Duration,
};
use support::settle;

fn limiter(capacity: u32, period: Duration) -> Arc<RateLimiter> {
	Arc::new(RateLimiter::new(capacity, period).expect("Limiter fixture should be valid."))
}

#[tokio::test(start_paused = true)]
async fn window_admits_capacity_per_period() {
	let limiter = limiter(2, Duration::seconds(1));
	let started = Arc::new(AtomicU32::new(0));
	let mut handles = Vec::new();

	for _ in 0..5 {
		handles.push(tokio::spawn({
			let limiter = Arc::clone(&limiter);
			let started = Arc::clone(&started);

			async move {
				let permit =
					limiter.acquire().await.expect("Queued waiters should eventually be admitted.");

				started.fetch_add(1, Ordering::SeqCst);
				drop(permit);
			}
		}));
	}

	settle().await;

	// Instantaneous completions do not refill the window; the remaining three
	// callers wait for resets.
	assert_eq!(started.load(Ordering::SeqCst), 2);

	time::advance(StdDuration::from_secs(1)).await;
	settle().await;

	assert_eq!(started.load(Ordering::SeqCst), 4);

	time::advance(StdDuration::from_secs(1)).await;
	settle().await;

	assert_eq!(started.load(Ordering::SeqCst), 5);

	for handle in handles {
		handle.await.expect("Waiter tasks should run to completion.");
	}
}

#[tokio::test(start_paused = true)]
async fn reset_accounts_for_in_flight_holders() {
	let limiter = limiter(3, Duration::seconds(1));

	// Let the owned reset task spin up and anchor its interval at t=0 before any
	// clock advance, so the first reset lands one period later.
	settle().await;

	let held = limiter.acquire().await.expect("First slot should be granted.");
	let second = limiter.acquire().await.expect("Second slot should be granted.");
	let third = limiter.acquire().await.expect("Third slot should be granted.");

	drop(second);
	drop(third);

	assert_eq!(limiter.available(), 0);
	assert_eq!(limiter.in_flight(), 1);

	time::advance(StdDuration::from_secs(1)).await;
	settle().await;

	// The reset restores capacity minus the still-running holder.
	assert_eq!(limiter.available(), 2);
	assert_eq!(limiter.in_flight(), 1);

	// A holder that outlived the reset returns its slot on completion.
	drop(held);

	assert_eq!(limiter.available(), 3);
	assert_eq!(limiter.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn waiters_are_admitted_in_arrival_order() {
	let limiter = limiter(1, Duration::seconds(1));
	let held = limiter.acquire().await.expect("Initial slot should be granted.");
	let order = Arc::new(std::sync::Mutex::new(Vec::new()));
	let mut handles = Vec::new();

	for index in 0..3_u32 {
		handles.push(tokio::spawn({
			let limiter = Arc::clone(&limiter);
			let order = Arc::clone(&order);

			async move {
				let _permit =
					limiter.acquire().await.expect("Queued waiters should eventually be admitted.");

				order.lock().expect("Order log should not be poisoned.").push(index);
			}
		}));

		// Settle between spawns so the queue order matches the spawn order.
		settle().await;
	}

	assert_eq!(limiter.queued(), 3);

	drop(held);

	for _ in 0..3 {
		time::advance(StdDuration::from_secs(1)).await;
		settle().await;
	}

	assert_eq!(*order.lock().expect("Order log should not be poisoned."), vec![0, 1, 2]);

	for handle in handles {
		handle.await.expect("Waiter tasks should run to completion.");
	}
}

#[tokio::test(start_paused = true)]
async fn cancelled_waiter_consumes_no_slot() {
	let limiter = limiter(1, Duration::seconds(1));
	let held = limiter.acquire().await.expect("Initial slot should be granted.");
	let waiter = tokio::spawn({
		let limiter = Arc::clone(&limiter);

		async move {
			let _permit = limiter.acquire().await;

			std::future::pending::<()>().await;
		}
	});

	settle().await;

	assert_eq!(limiter.queued(), 1);

	waiter.abort();
	settle().await;

	// The abandoned waiter left the queue without touching the window.
	assert_eq!(limiter.queued(), 0);
	assert_eq!(limiter.available(), 0);
	assert_eq!(limiter.in_flight(), 1);

	drop(held);
	time::advance(StdDuration::from_secs(1)).await;
	settle().await;

	assert_eq!(limiter.available(), 1);
	assert_eq!(limiter.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_drains_queued_waiters() {
	let limiter = limiter(1, Duration::seconds(1));
	let held = limiter.acquire().await.expect("Initial slot should be granted.");
	let waiter = tokio::spawn({
		let limiter = Arc::clone(&limiter);

		async move { limiter.acquire().await }
	});

	settle().await;

	assert_eq!(limiter.queued(), 1);

	limiter.shutdown();

	let outcome = waiter.await.expect("Drained waiter task should not panic.");

	assert!(matches!(outcome, Err(CancelledError::WindowClosed)));
	assert!(matches!(limiter.acquire().await, Err(CancelledError::WindowClosed)));

	drop(held);
}
