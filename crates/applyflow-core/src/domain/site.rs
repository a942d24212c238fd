//! Per-target-site policy: which agent drives a host, how hard the engine
//! may push it, and what its CAPTCHA posture looks like.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Names the agent implementation that handles a host (one per supported
/// external target-system family).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AutomationType(String);

impl AutomationType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AutomationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Expected CAPTCHA behavior for a host, used to tune escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptchaMode {
    /// Host is not known to present CAPTCHAs.
    None,
    /// CAPTCHAs appear occasionally; detect per attempt.
    Intermittent,
    /// Host always gates submissions; escalate without attempting.
    Always,
}

/// Most recently observed health signal for a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    /// Operator-set: the limiter denies all permits until this clears.
    Blocked,
}

/// Rate-limit parameters for one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum concurrent executions against the host. Zero means none.
    pub max_concurrent: u32,

    /// Minimum spacing between two execution starts.
    pub min_interval: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            min_interval: Duration::from_secs(1),
        }
    }
}

/// Configuration for one external target site.
///
/// Created and updated by configuration management; during execution the
/// dispatcher only reads it, except for the `last_status` write-back after
/// each attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    /// Lookup key: the external system's network identity.
    pub host: String,

    pub automation_type: AutomationType,

    pub rate_limit_policy: RateLimitPolicy,

    pub captcha_mode: CaptchaMode,

    pub last_status: HealthStatus,
}

impl Domain {
    pub fn new(host: impl Into<String>, automation_type: AutomationType) -> Self {
        Self {
            host: host.into(),
            automation_type,
            rate_limit_policy: RateLimitPolicy::default(),
            captcha_mode: CaptchaMode::Intermittent,
            last_status: HealthStatus::Healthy,
        }
    }

    pub fn with_rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit_policy = policy;
        self
    }

    pub fn with_captcha_mode(mut self, mode: CaptchaMode) -> Self {
        self.captcha_mode = mode;
        self
    }

    pub fn with_health(mut self, status: HealthStatus) -> Self {
        self.last_status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_conservative() {
        let p = RateLimitPolicy::default();
        assert_eq!(p.max_concurrent, 2);
        assert_eq!(p.min_interval, Duration::from_secs(1));
    }

    #[test]
    fn domain_builder_chain() {
        let d = Domain::new("jobs.example.com", AutomationType::new("hosted_form"))
            .with_captcha_mode(CaptchaMode::Always)
            .with_health(HealthStatus::Degraded);
        assert_eq!(d.captcha_mode, CaptchaMode::Always);
        assert_eq!(d.last_status, HealthStatus::Degraded);
        assert_eq!(d.automation_type.as_str(), "hosted_form");
    }

    #[test]
    fn health_serializes_snake_case() {
        let s = serde_json::to_string(&HealthStatus::Blocked).unwrap();
        assert_eq!(s, "\"blocked\"");
    }
}
