use std::time::Duration;

use crate::errors::HedgedError;

/// Default number of distinct instances raced per request.
pub const DEFAULT_WIDTH: usize = 3;

/// Hedging strategy configuration.
///
/// Controls how many replicas a single logical request fans out to and how hard the
/// client may press the load balancer to find them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HedgeConfig {
    /// Number of distinct instances to race.
    ///
    /// Discovery must know at least this many replicas of the target service,
    /// otherwise the request fails fast instead of racing a narrower set.
    pub desired_width: usize,

    /// Maximum number of times the load balancer is polled while assembling the set.
    ///
    /// A balancer may hand back instances it already returned; once the budget is
    /// spent the request proceeds with whatever distinct instances were found.
    pub selection_budget: usize,

    /// Optional upper bound on the whole hedged call.
    ///
    /// When it expires every outstanding attempt is cancelled.
    pub overall_timeout: Option<Duration>,
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self::with_width(DEFAULT_WIDTH)
    }
}

impl HedgeConfig {
    /// Creates a configuration racing `desired_width` instances with a selection budget
    /// of twice that width.
    pub fn with_width(desired_width: usize) -> Self {
        Self {
            desired_width,
            selection_budget: desired_width.saturating_mul(2),
            overall_timeout: None,
        }
    }

    /// Creates a configuration that sends every request to exactly one instance.
    ///
    /// Useful as a baseline: the request still flows through selection and the racer,
    /// so it behaves like a direct call with the same cancellation contract.
    pub fn single() -> Self {
        Self::with_width(1)
    }

    /// Creates an aggressive configuration.
    ///
    /// Prioritizes latency over backend load:
    /// - Races `instances_len` replicas
    /// - Polls the balancer up to 3x the width
    /// - 1 second overall timeout
    pub fn aggressive(instances_len: usize) -> Self {
        Self {
            desired_width: instances_len,
            selection_budget: instances_len.saturating_mul(3),
            overall_timeout: Some(Duration::from_secs(1)),
        }
    }

    /// Sets the overall timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = Some(timeout);
        self
    }

    /// Checks that the width and budget describe a runnable hedge.
    pub fn validate(&self) -> Result<(), HedgedError> {
        if self.desired_width == 0 {
            return Err(HedgedError::InvalidConfig("desired width must be at least 1"));
        }
        if self.selection_budget < self.desired_width {
            return Err(HedgedError::InvalidConfig(
                "selection budget must be at least the desired width",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_races_three_with_double_budget() {
        let cfg = HedgeConfig::default();
        assert_eq!(cfg.desired_width, 3);
        assert_eq!(cfg.selection_budget, 6);
        assert!(cfg.overall_timeout.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_width_is_rejected() {
        let cfg = HedgeConfig::with_width(0);
        assert!(matches!(cfg.validate(), Err(HedgedError::InvalidConfig(_))));
    }

    #[test]
    fn budget_below_width_is_rejected() {
        let cfg = HedgeConfig {
            desired_width: 4,
            selection_budget: 3,
            overall_timeout: None,
        };
        assert!(matches!(cfg.validate(), Err(HedgedError::InvalidConfig(_))));
    }
}
