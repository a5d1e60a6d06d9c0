//! Linear gas-price escalation between a floor and a cap

use crate::config::ResubmissionConfig;
use crate::error::{SubmitterError, SubmitterResult};

use ethers::types::U256;
use tracing::{debug, warn};

pub const WEI_PER_GWEI: u64 = 1_000_000_000;

pub fn gwei_to_wei(gwei: u64) -> U256 {
    U256::from(gwei) * U256::from(WEI_PER_GWEI)
}

/// Lossy conversion for logs and gauges
pub fn wei_to_gwei(wei: U256) -> f64 {
    let unit = U256::from(WEI_PER_GWEI);
    let whole = wei / unit;
    let frac = wei % unit;
    if whole > U256::from(u64::MAX) {
        return f64::MAX;
    }
    whole.low_u64() as f64 + frac.low_u64() as f64 / WEI_PER_GWEI as f64
}

/// Gas price schedule for one logical submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasEscalator {
    /// Explicit floor; the live network price is used when unset
    min: Option<U256>,
    max: U256,
    increment: U256,
}

impl GasEscalator {
    /// Create an escalator from config, rejecting `min > max`
    pub fn new(config: &ResubmissionConfig) -> SubmitterResult<Self> {
        if let Some(min) = config.min_gas_price_gwei {
            if min > config.max_gas_price_gwei {
                return Err(SubmitterError::Config(format!(
                    "min gas price {} gwei above max {} gwei",
                    min, config.max_gas_price_gwei
                )));
            }
        }

        Ok(Self {
            min: config.min_gas_price_gwei.map(gwei_to_wei),
            max: gwei_to_wei(config.max_gas_price_gwei),
            increment: gwei_to_wei(config.gas_retry_increment_gwei),
        })
    }

    /// Whether the starting price has to be read from the network
    pub fn needs_live_price(&self) -> bool {
        self.min.is_none()
    }

    pub fn max(&self) -> U256 {
        self.max
    }

    /// Price for the first round.
    ///
    /// An explicit floor wins over the live price; the result never exceeds
    /// the cap.
    pub fn starting_price(&self, live: Option<U256>) -> U256 {
        let start = match (self.min, live) {
            (Some(min), Some(live)) => std::cmp::max(min, live),
            (Some(min), None) => min,
            (None, Some(live)) => live,
            (None, None) => self.max,
        };

        if start > self.max {
            warn!(
                "Starting gas price {} gwei above cap, using {} gwei",
                wei_to_gwei(start),
                wei_to_gwei(self.max)
            );
            return self.max;
        }

        debug!("Starting gas price {} gwei", wei_to_gwei(start));
        start
    }

    /// Price for the round after one offered at `current`
    pub fn next_price(&self, current: U256) -> U256 {
        std::cmp::min(current.saturating_add(self.increment), self.max)
    }

    /// Infinite sequence of per-round prices starting at `start`
    pub fn schedule(&self, start: U256) -> impl Iterator<Item = U256> + '_ {
        std::iter::successors(Some(start), move |current| Some(self.next_price(*current)))
    }
}
