//! Client-side gatekeeper for rate-capped remote APIs—windowed slot limiting,
//! single-flight credential refresh, and gated calls in one crate.
//!
//! The crate is built from three parts, leaf first:
//!
//! - [`limit::RateLimiter`] bounds how many operations may start per window while also capping
//!   concurrency, with FIFO admission and an owned periodic reset task.
//! - [`credential::CredentialManager`] keeps a renewable bearer credential fresh, collapsing
//!   concurrent refreshes into one challenge/exchange round trip.
//! - [`gate::GatedClient`] composes both around a caller-supplied action: acquire a slot, ensure
//!   the credential is fresh, run the call, retry exactly once after an auth rejection.
//!
//! Transport, wire formats, signing, and payload validation stay with the caller; the gatekeeper
//! only sees the opaque [`credential::ChallengeExchanger`] collaborator and the action's tri-state
//! [`gate::CallOutcome`].

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod config;
pub mod credential;
pub mod error;
pub mod gate;
pub mod limit;
pub mod obs;

mod _prelude {
	pub use std::{
		collections::VecDeque,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::Mutex;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, Result};
}

pub use time;
