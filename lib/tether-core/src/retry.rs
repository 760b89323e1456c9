//! Retry policies.
//!
//! A [`RetryPolicy`] decides whether a classified failure is retried
//! ([`RetryPolicy::should_retry`]) and how long to wait before the next
//! attempt ([`RetryPolicy::delay`]). Four strategies are available:
//!
//! - [`RetryStrategy::None`]: never retries.
//! - [`RetryStrategy::Immediate`]: retries without waiting.
//! - [`RetryStrategy::Linear`]: waits `base * (attempt + 1)`.
//! - [`RetryStrategy::Exponential`]: waits `min(base * 2^attempt, max)`,
//!   optionally scaled by a random factor in `[0, 1]`.
//!
//! Whatever the strategy, a rate-limited failure carrying a server provided
//! delay (`429` + `Retry-After`) waits exactly that delay.

use std::collections::BTreeSet;
use std::time::Duration;

use rand::Rng;

use crate::{ErrorCondition, NetworkError};

/// Backoff strategy of a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// No retry at all.
    None,
    /// Retry right away.
    Immediate,
    /// Delay grows linearly with the attempt number.
    Linear {
        /// Delay of the first retry.
        base_delay: Duration,
    },
    /// Delay doubles with each attempt, up to a cap.
    Exponential {
        /// Delay of the first retry.
        base_delay: Duration,
        /// Upper bound of the computed delay.
        max_delay: Duration,
        /// Scale the delay by a uniform random factor in `[0, 1]`.
        jitter: bool,
    },
}

/// Retry eligibility and delay computation.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tether_core::{NetworkError, RetryPolicy};
///
/// let policy = RetryPolicy::exponential(3, Duration::from_secs(1), Duration::from_secs(30));
/// let error = NetworkError::http(503);
///
/// assert!(policy.should_retry(&error, 0));
/// assert_eq!(policy.delay(2, &error), Duration::from_secs(4));
/// assert!(!policy.should_retry(&error, 3));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    strategy: RetryStrategy,
    max_retries: u32,
    conditions: BTreeSet<ErrorCondition>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            strategy: RetryStrategy::None,
            max_retries: 0,
            conditions: ErrorCondition::ALL.into_iter().collect(),
        }
    }

    /// Retry without delay, `max_retries` times.
    #[must_use]
    pub fn immediate(max_retries: u32) -> Self {
        Self::with_strategy(RetryStrategy::Immediate, max_retries)
    }

    /// Retry with a delay of `base_delay * (attempt + 1)`.
    #[must_use]
    pub fn linear(max_retries: u32, base_delay: Duration) -> Self {
        Self::with_strategy(RetryStrategy::Linear { base_delay }, max_retries)
    }

    /// Retry with a delay of `min(base_delay * 2^attempt, max_delay)`.
    #[must_use]
    pub fn exponential(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self::with_strategy(
            RetryStrategy::Exponential {
                base_delay,
                max_delay,
                jitter: false,
            },
            max_retries,
        )
    }

    /// Build a policy from a strategy, retrying on every condition.
    ///
    /// [`RetryStrategy::None`] always ends up with a zero budget.
    #[must_use]
    pub fn with_strategy(strategy: RetryStrategy, max_retries: u32) -> Self {
        let max_retries = match strategy {
            RetryStrategy::None => 0,
            _ => max_retries,
        };
        Self {
            strategy,
            max_retries,
            conditions: ErrorCondition::ALL.into_iter().collect(),
        }
    }

    /// Enable or disable jitter (exponential strategy only).
    #[must_use]
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        if let RetryStrategy::Exponential { jitter, .. } = &mut self.strategy {
            *jitter = enabled;
        }
        self
    }

    /// Restrict retries to the given conditions.
    #[must_use]
    pub fn with_conditions(mut self, conditions: impl IntoIterator<Item = ErrorCondition>) -> Self {
        self.conditions = conditions.into_iter().collect();
        self
    }

    /// Backoff strategy.
    #[must_use]
    pub const fn strategy(&self) -> RetryStrategy {
        self.strategy
    }

    /// Upper bound on additional attempts after the first one.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Conditions this policy retries on.
    #[must_use]
    pub const fn conditions(&self) -> &BTreeSet<ErrorCondition> {
        &self.conditions
    }

    /// Returns `true` if the failed attempt `attempt` (0-based) may be retried.
    #[must_use]
    pub fn should_retry(&self, error: &NetworkError, attempt: u32) -> bool {
        attempt < self.max_retries && self.retries_on(error)
    }

    /// Returns `true` if `error` intersects the configured conditions,
    /// regardless of the remaining budget.
    #[must_use]
    pub fn retries_on(&self, error: &NetworkError) -> bool {
        self.conditions
            .iter()
            .any(|condition| error.matches_condition(*condition))
    }

    /// Delay before the attempt following `attempt`.
    ///
    /// A server provided `Retry-After` wins over the strategy.
    #[must_use]
    pub fn delay(&self, attempt: u32, error: &NetworkError) -> Duration {
        error
            .retry_after()
            .unwrap_or_else(|| self.backoff(attempt))
    }

    /// Strategy delay for `attempt`, ignoring any server override.
    ///
    /// For the exponential strategy with jitter, the non-jittered value is an
    /// upper bound of the result.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        match self.strategy {
            RetryStrategy::None | RetryStrategy::Immediate => Duration::ZERO,
            RetryStrategy::Linear { base_delay } => {
                base_delay.saturating_mul(attempt.saturating_add(1))
            }
            RetryStrategy::Exponential {
                base_delay,
                max_delay,
                jitter,
            } => {
                let capped = 2u32
                    .checked_pow(attempt)
                    .and_then(|factor| base_delay.checked_mul(factor))
                    .map_or(max_delay, |delay| delay.min(max_delay));
                if jitter {
                    jittered(capped, rand::rng().random_range(0.0..=1.0))
                } else {
                    capped
                }
            }
        }
    }
}

/// Scale `delay` by `factor`; a product that does not fit a [`Duration`]
/// stays at `delay`.
fn jittered(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).map_or(delay, |scaled| scaled.min(delay))
}

// ============================================================================
// Configuration descriptor
// ============================================================================

/// Strategy name in a [`RetryConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// [`RetryStrategy::None`].
    #[default]
    None,
    /// [`RetryStrategy::Immediate`].
    Immediate,
    /// [`RetryStrategy::Linear`].
    Linear,
    /// [`RetryStrategy::Exponential`].
    Exponential,
}

impl StrategyKind {
    /// Budget used when a configuration does not set one.
    #[must_use]
    pub const fn default_max_retries(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Immediate => 1,
            Self::Linear | Self::Exponential => 3,
        }
    }
}

/// Declarative retry configuration, e.g. loaded from JSON.
///
/// Negative numbers are clamped to zero when converted into a [`RetryPolicy`].
///
/// ```
/// use tether_core::{RetryConfig, RetryPolicy};
///
/// let config: RetryConfig = serde_json::from_str(
///     r#"{ "strategy": "linear", "max_retries": 2, "base_delay_secs": -1.5 }"#,
/// ).unwrap();
/// let policy = RetryPolicy::from(config);
/// assert_eq!(policy.max_retries(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Backoff strategy.
    pub strategy: StrategyKind,
    /// Retry budget; the strategy default when absent.
    pub max_retries: Option<i64>,
    /// Base delay, in seconds.
    pub base_delay_secs: f64,
    /// Delay cap for the exponential strategy, in seconds.
    pub max_delay_secs: f64,
    /// Jitter for the exponential strategy.
    pub jitter: bool,
    /// Conditions to retry on; all of them when absent.
    pub conditions: Option<Vec<ErrorCondition>>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::None,
            max_retries: None,
            base_delay_secs: 1.0,
            max_delay_secs: 30.0,
            jitter: false,
            conditions: None,
        }
    }
}

fn clamp_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        let max_retries = config.max_retries.map_or_else(
            || config.strategy.default_max_retries(),
            |n| u32::try_from(n.max(0)).unwrap_or(u32::MAX),
        );
        let base_delay = clamp_secs(config.base_delay_secs);
        let strategy = match config.strategy {
            StrategyKind::None => RetryStrategy::None,
            StrategyKind::Immediate => RetryStrategy::Immediate,
            StrategyKind::Linear => RetryStrategy::Linear { base_delay },
            StrategyKind::Exponential => RetryStrategy::Exponential {
                base_delay,
                max_delay: clamp_secs(config.max_delay_secs),
                jitter: config.jitter,
            },
        };
        let policy = Self::with_strategy(strategy, max_retries);
        match config.conditions {
            Some(conditions) => policy.with_conditions(conditions),
            None => policy,
        }
    }
}
