//! Gatekeeper configuration surface and construction-time validation.

// self
use crate::{_prelude::*, error::ConfigError};

/// Validated gatekeeper configuration.
///
/// A constructed value is proof that the capacity and both durations are
/// positive; invalid values fail [`GateConfig::new`] immediately, before any
/// task is spawned or network activity occurs. Deserialization funnels through
/// the same validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGateConfig", into = "RawGateConfig")]
pub struct GateConfig {
	capacity: u32,
	period: Duration,
	credential_ttl: Duration,
}
impl GateConfig {
	/// Validates and builds a configuration from the raw values exposed to the
	/// CLI/config layer.
	pub fn new(
		capacity: u32,
		period: Duration,
		credential_ttl: Duration,
	) -> Result<Self, ConfigError> {
		if capacity == 0 {
			return Err(ConfigError::ZeroCapacity);
		}
		if !period.is_positive() {
			return Err(ConfigError::NonPositivePeriod);
		}
		if !credential_ttl.is_positive() {
			return Err(ConfigError::NonPositiveTtl);
		}

		Ok(Self { capacity, period, credential_ttl })
	}

	/// Number of slots the rate window admits per period.
	pub fn capacity(&self) -> u32 {
		self.capacity
	}

	/// Reset cadence of the rate window.
	pub fn period(&self) -> Duration {
		self.period
	}

	/// Duration a freshly issued credential is trusted before a proactive
	/// refresh.
	pub fn credential_ttl(&self) -> Duration {
		self.credential_ttl
	}

	pub(crate) fn period_std(&self) -> std::time::Duration {
		self.period.unsigned_abs()
	}
}

/// Raw mirror of [`GateConfig`] used for serde round trips.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct RawGateConfig {
	capacity: u32,
	period: Duration,
	credential_ttl: Duration,
}
impl TryFrom<RawGateConfig> for GateConfig {
	type Error = ConfigError;

	fn try_from(raw: RawGateConfig) -> Result<Self, Self::Error> {
		Self::new(raw.capacity, raw.period, raw.credential_ttl)
	}
}
impl From<GateConfig> for RawGateConfig {
	fn from(config: GateConfig) -> Self {
		Self {
			capacity: config.capacity,
			period: config.period,
			credential_ttl: config.credential_ttl,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn construction_validates_every_field() {
		assert_eq!(
			GateConfig::new(0, Duration::seconds(1), Duration::hours(10)),
			Err(ConfigError::ZeroCapacity),
		);
		assert_eq!(
			GateConfig::new(5, Duration::ZERO, Duration::hours(10)),
			Err(ConfigError::NonPositivePeriod),
		);
		assert_eq!(
			GateConfig::new(5, Duration::seconds(-1), Duration::hours(10)),
			Err(ConfigError::NonPositivePeriod),
		);
		assert_eq!(
			GateConfig::new(5, Duration::seconds(1), Duration::ZERO),
			Err(ConfigError::NonPositiveTtl),
		);

		let config = GateConfig::new(5, Duration::seconds(1), Duration::hours(10))
			.expect("Positive values should build a configuration.");

		assert_eq!(config.capacity(), 5);
		assert_eq!(config.period(), Duration::seconds(1));
		assert_eq!(config.credential_ttl(), Duration::hours(10));
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let config = GateConfig::new(3, Duration::seconds(2), Duration::minutes(30))
			.expect("Config fixture should be valid.");
		let payload = serde_json::to_string(&config).expect("Config should serialize to JSON.");
		let round_trip: GateConfig =
			serde_json::from_str(&payload).expect("Serialized config should deserialize.");

		assert_eq!(round_trip, config);

		let invalid = payload.replacen('3', "0", 1);

		assert!(serde_json::from_str::<GateConfig>(&invalid).is_err());
	}

	#[test]
	fn period_converts_to_std_duration() {
		let config = GateConfig::new(1, Duration::milliseconds(250), Duration::hours(1))
			.expect("Config fixture should be valid.");

		assert_eq!(config.period_std(), std::time::Duration::from_millis(250));
	}
}
