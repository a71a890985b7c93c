//! Pre-built simulation scenarios.
//!
//! Each scenario pairs a link profile with the client settings it needs,
//! so a run can be reproduced from a scenario name and a seed.

use std::fmt;
use std::time::Duration;

use vrstream_core::{ClientConfig, StreamingClient, VrStreamError};

use crate::deterministic::{LinkProfile, SimulationConfig, StreamingSimulation};

/// Named simulation scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scenario {
    /// Fast, reliable link
    #[default]
    Steady,
    /// Refused connections and transfers cut off halfway
    Flaky,
    /// Reliable link with a stop time that ends the client early
    Bounded,
}

impl Scenario {
    /// Adjusts client settings for this scenario.
    pub fn apply(self, config: &mut ClientConfig) {
        match self {
            Scenario::Steady => {}
            Scenario::Flaky => {
                config.reconnect_interval = Duration::from_secs(2);
            }
            Scenario::Bounded => {
                if config.stop_time.is_none() {
                    config.stop_time = Some(config.start_time + Duration::from_secs(30));
                }
            }
        }
    }

    /// Link and horizon for this scenario.
    pub fn simulation_config(self, seed: u64) -> SimulationConfig {
        match self {
            Scenario::Steady => SimulationConfig {
                seed,
                link: LinkProfile::default(),
                horizon: Some(Duration::from_secs(120)),
                ..Default::default()
            },
            Scenario::Flaky => SimulationConfig {
                seed,
                link: LinkProfile {
                    connect_latency: Duration::from_millis(120),
                    latency: Duration::from_millis(40),
                    bandwidth_bytes_per_sec: 2_500_000, // 20 Mbit/s
                    chunk_size: 16 * 1024,
                    connect_failure_probability: 0.2,
                    transfer_failure_probability: 0.1,
                },
                horizon: Some(Duration::from_secs(180)),
                ..Default::default()
            },
            Scenario::Bounded => SimulationConfig {
                seed,
                link: LinkProfile::default(),
                horizon: Some(Duration::from_secs(120)),
                ..Default::default()
            },
        }
    }

    /// Builds a simulation of this scenario with the standard invariants.
    ///
    /// # Errors
    ///
    /// - `VrStreamError::Config` - Client configuration is invalid
    /// - `VrStreamError::Trace` - Trace file cannot be opened or read
    /// - `VrStreamError::Io` - Metrics directory cannot be created
    pub fn build(
        self,
        mut config: ClientConfig,
        seed: u64,
    ) -> Result<StreamingSimulation, VrStreamError> {
        self.apply(&mut config);
        let client = StreamingClient::from_config(config)?;
        Ok(StreamingSimulation::new(self.simulation_config(seed), client).with_default_invariants())
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scenario::Steady => write!(f, "steady"),
            Scenario::Flaky => write!(f, "flaky"),
            Scenario::Bounded => write!(f, "bounded"),
        }
    }
}

impl std::str::FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady" => Ok(Self::Steady),
            "flaky" => Ok(Self::Flaky),
            "bounded" => Ok(Self::Bounded),
            _ => Err(format!(
                "Invalid scenario: '{s}'. Valid options are: steady, flaky, bounded"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_names_round_trip() {
        for scenario in [Scenario::Steady, Scenario::Flaky, Scenario::Bounded] {
            assert_eq!(scenario.to_string().parse::<Scenario>(), Ok(scenario));
        }
        assert_eq!("FLAKY".parse::<Scenario>(), Ok(Scenario::Flaky));
        assert!("lossy".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_bounded_keeps_explicit_stop_time() {
        let mut config = ClientConfig {
            stop_time: Some(Duration::from_secs(12)),
            ..Default::default()
        };
        Scenario::Bounded.apply(&mut config);
        assert_eq!(config.stop_time, Some(Duration::from_secs(12)));

        let mut config = ClientConfig::default();
        Scenario::Bounded.apply(&mut config);
        assert_eq!(config.stop_time, Some(Duration::from_secs(31)));
    }

    #[test]
    fn test_flaky_link_injects_failures() {
        let sim = Scenario::Flaky.simulation_config(9);
        assert_eq!(sim.seed, 9);
        assert!(sim.link.connect_failure_probability > 0.0);
        assert!(sim.link.transfer_failure_probability > 0.0);
    }
}
