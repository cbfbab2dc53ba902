//! Whole-run retry with configurable backoff.
//!
//! A retry re-executes the pipeline from stage 0 with the original input.
//! Individual stages are never retried.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use super::Pipeline;
use crate::cancellation::CancellationToken;
use crate::core::PipelineRun;
use crate::events::event_types;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base
    Constant,
    /// delay = base * retry
    Linear,
    /// delay = base * 2^(retry - 1)
    #[default]
    Exponential,
}

impl FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "constant" => Ok(Self::Constant),
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential),
            other => Err(format!("unknown backoff strategy '{other}'")),
        }
    }
}

/// Randomisation applied to each delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Use the computed delay as is.
    #[default]
    None,
    /// Random from 0 to delay.
    Full,
    /// Half fixed, half random.
    Equal,
}

/// Retry policy for whole pipeline runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. 0 disables retry.
    #[serde(default)]
    pub max_retries: usize,
    /// Base delay in seconds.
    #[serde(default = "default_backoff_seconds")]
    pub backoff_seconds: f64,
    /// Delay growth.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Upper bound on any single delay, in seconds.
    #[serde(default = "default_max_backoff_seconds")]
    pub max_backoff_seconds: f64,
    /// Delay randomisation.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

fn default_backoff_seconds() -> f64 {
    1.0
}

fn default_max_backoff_seconds() -> f64 {
    30.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_seconds: default_backoff_seconds(),
            backoff: BackoffStrategy::default(),
            max_backoff_seconds: default_max_backoff_seconds(),
            jitter: JitterStrategy::default(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the retry count.
    #[must_use]
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_backoff_seconds(mut self, seconds: f64) -> Self {
        self.backoff_seconds = seconds;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_backoff_seconds(mut self, seconds: f64) -> Self {
        self.max_backoff_seconds = seconds;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: usize) -> Duration {
        let base = self.backoff_seconds.max(0.0);
        if base == 0.0 {
            return Duration::ZERO;
        }
        let retry = retry.max(1);
        let raw = match self.backoff {
            BackoffStrategy::Constant => base,
            #[allow(clippy::cast_precision_loss)]
            BackoffStrategy::Linear => base * retry as f64,
            BackoffStrategy::Exponential => {
                let exp = i32::try_from(retry - 1).unwrap_or(i32::MAX);
                base * 2f64.powi(exp)
            }
        };
        let capped = raw.min(self.max_backoff_seconds.max(0.0));

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full if capped > 0.0 => rand::thread_rng().gen_range(0.0..=capped),
            JitterStrategy::Equal if capped > 0.0 => {
                let half = capped / 2.0;
                half + rand::thread_rng().gen_range(0.0..=half)
            }
            JitterStrategy::Full | JitterStrategy::Equal => capped,
        };

        Duration::try_from_secs_f64(jittered).unwrap_or(Duration::MAX)
    }
}

/// Runs `pipeline`, re-running the whole thing while it fails.
///
/// Returns the last run, with `attempt` set to the 1-based attempt that
/// produced it.
pub async fn run_with_retry(
    pipeline: &Pipeline,
    initial_input: &str,
    policy: &RetryPolicy,
) -> PipelineRun {
    retry_loop(pipeline, initial_input, policy, None).await
}

/// Like [`run_with_retry`], but stops retrying once `token` is cancelled.
pub async fn run_with_retry_and_cancellation(
    pipeline: &Pipeline,
    initial_input: &str,
    policy: &RetryPolicy,
    token: &CancellationToken,
) -> PipelineRun {
    retry_loop(pipeline, initial_input, policy, Some(token)).await
}

async fn retry_loop(
    pipeline: &Pipeline,
    initial_input: &str,
    policy: &RetryPolicy,
    token: Option<&CancellationToken>,
) -> PipelineRun {
    let mut attempt = 1;
    loop {
        let run = pipeline.execute(initial_input, token, attempt).await;

        if run.is_success() {
            return run;
        }
        if token.is_some_and(CancellationToken::is_cancelled) {
            info!(run_id = %run.run_id, attempt, "Run cancelled; not retrying");
            return run;
        }
        if attempt > policy.max_retries {
            if policy.max_retries > 0 {
                warn!(
                    run_id = %run.run_id,
                    pipeline = %run.pipeline_name,
                    attempts = attempt,
                    "Retries exhausted"
                );
            }
            return run;
        }

        let delay = policy.delay_for(attempt);
        warn!(
            run_id = %run.run_id,
            pipeline = %run.pipeline_name,
            attempt,
            failed_stage = run.failed_stage().unwrap_or("-"),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Pipeline run failed; retrying from the first stage"
        );
        pipeline.executor().events().try_emit(
            event_types::RUN_RETRYING,
            Some(json!({
                "run_id": run.run_id.to_string(),
                "pipeline": run.pipeline_name,
                "attempt": attempt,
                "next_attempt": attempt + 1,
                "failed_stage": run.failed_stage(),
                "delay_ms": delay.as_secs_f64() * 1000.0,
            })),
        );

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_policy_disables_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 0);
        assert_eq!(policy.backoff, BackoffStrategy::Exponential);
        assert_eq!(policy.jitter, JitterStrategy::None);
    }

    #[test]
    fn test_delay_constant() {
        let policy = RetryPolicy::default()
            .with_backoff(BackoffStrategy::Constant)
            .with_backoff_seconds(0.5);
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(7), Duration::from_millis(500));
    }

    #[test]
    fn test_delay_linear() {
        let policy = RetryPolicy::default()
            .with_backoff(BackoffStrategy::Linear)
            .with_backoff_seconds(0.1);
        assert_eq!(policy.delay_for(1), Duration::from_secs_f64(0.1));
        assert_eq!(policy.delay_for(3), Duration::from_secs_f64(0.1 * 3.0));
    }

    #[test]
    fn test_delay_exponential_capped() {
        let policy = RetryPolicy::default()
            .with_backoff_seconds(1.0)
            .with_max_backoff_seconds(5.0);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(60), Duration::from_secs(5));
    }

    #[test]
    fn test_delay_full_jitter_bounded() {
        let policy = RetryPolicy::default()
            .with_backoff(BackoffStrategy::Constant)
            .with_backoff_seconds(0.2)
            .with_jitter(JitterStrategy::Full);
        for _ in 0..20 {
            assert!(policy.delay_for(1) <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_delay_equal_jitter_bounded() {
        let policy = RetryPolicy::default()
            .with_backoff(BackoffStrategy::Constant)
            .with_backoff_seconds(0.2)
            .with_jitter(JitterStrategy::Equal);
        for _ in 0..20 {
            let d = policy.delay_for(1);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_policy_deserialize() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"max_retries": 2, "backoff": "linear"}"#).unwrap();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.backoff, BackoffStrategy::Linear);
        assert!((policy.backoff_seconds - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_backoff_from_str() {
        assert_eq!("Constant".parse::<BackoffStrategy>().unwrap(), BackoffStrategy::Constant);
        assert!("fibonacci".parse::<BackoffStrategy>().is_err());
    }
}
