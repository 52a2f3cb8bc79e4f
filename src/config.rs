//! Runtime configuration, read once from the environment at startup.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::{Credentials, DEFAULT_SESSION_TTL_MINUTES};
use crate::risk::{AtRiskPolicy, TierPolicy};

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
pub const DEFAULT_DB_PATH: &str = "sqlite:safetrail.db?mode=rwc";

/// Demo accounts used when no credentials are configured.
const DEMO_TOURIST: (&str, &str) = ("tourist123", "pass123");
const DEMO_AUTHORITY: (&str, &str) = ("admin001", "admin123");

/// Default recipient for emergency reports.
const DEFAULT_REPORT_EMAIL: &str = "control-room@safetrail.invalid";

/// Default upper bound on one webhook delivery.
pub const DEFAULT_REPORT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub tourist: Credentials,
    pub authority: Credentials,
    /// True when either account fell back to the demo defaults.
    pub demo_credentials: bool,
    /// Unset means reports are only logged.
    pub report_webhook: Option<String>,
    pub report_email: String,
    pub report_timeout: Duration,
    pub session_ttl: chrono::Duration,
    pub tiers: TierPolicy,
    /// True when the configured tier thresholds were out of order and the
    /// defaults were used instead.
    pub tiers_rejected: bool,
    pub at_risk: AtRiskPolicy,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str, default| parse_or(lookup(key), default);

        let tourist = credentials(&lookup, "SAFETRAIL_TOURIST", DEMO_TOURIST);
        let authority = credentials(&lookup, "SAFETRAIL_AUTHORITY", DEMO_AUTHORITY);

        let defaults = TierPolicy::default();
        let configured = TierPolicy::new(
            parsed("SAFETRAIL_TIER_SAFE_ABOVE", defaults.safe_above),
            parsed("SAFETRAIL_TIER_CAUTION_ABOVE", defaults.caution_above),
        );

        let timeout_ms = parse_or(
            lookup("SAFETRAIL_REPORT_TIMEOUT_MS"),
            DEFAULT_REPORT_TIMEOUT_MS,
        );
        let ttl_minutes = parse_or(
            lookup("SAFETRAIL_SESSION_TTL_MINUTES"),
            DEFAULT_SESSION_TTL_MINUTES,
        );

        Self {
            port: parse_or(lookup("SAFETRAIL_PORT"), DEFAULT_PORT),
            database_url: lookup("SAFETRAIL_DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            demo_credentials: tourist.1 || authority.1,
            tourist: tourist.0,
            authority: authority.0,
            report_webhook: lookup("SAFETRAIL_REPORT_WEBHOOK").filter(|u| !u.trim().is_empty()),
            report_email: lookup("SAFETRAIL_REPORT_EMAIL")
                .unwrap_or_else(|| DEFAULT_REPORT_EMAIL.to_string()),
            report_timeout: Duration::from_millis(if timeout_ms == 0 {
                DEFAULT_REPORT_TIMEOUT_MS
            } else {
                timeout_ms
            }),
            session_ttl: chrono::Duration::minutes(if ttl_minutes <= 0 {
                DEFAULT_SESSION_TTL_MINUTES
            } else {
                ttl_minutes
            }),
            tiers: configured.unwrap_or(defaults),
            tiers_rejected: configured.is_none(),
            at_risk: AtRiskPolicy {
                below: parsed("SAFETRAIL_AT_RISK_BELOW", AtRiskPolicy::default().below),
            },
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Returns the credentials and whether the demo default was used.
fn credentials<F>(lookup: &F, prefix: &str, demo: (&str, &str)) -> (Credentials, bool)
where
    F: Fn(&str) -> Option<String>,
{
    let user = lookup(&format!("{}_USER", prefix));
    let password = lookup(&format!("{}_PASSWORD", prefix));

    match (user, password) {
        (Some(user), Some(password)) => (Credentials::new(&user, &password), false),
        _ => (Credentials::new(demo.0, demo.1), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScoreTier;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]);
        assert_eq!(c.port, DEFAULT_PORT);
        assert_eq!(c.database_url, DEFAULT_DB_PATH);
        assert!(c.demo_credentials);
        assert_eq!(c.authority.user_id, "admin001");
        assert!(c.report_webhook.is_none());
        assert_eq!(c.tiers, TierPolicy::default());
        assert!(!c.tiers_rejected);
        assert_eq!(c.at_risk, AtRiskPolicy::default());
        assert_eq!(c.report_timeout, Duration::from_millis(DEFAULT_REPORT_TIMEOUT_MS));
        assert_eq!(c.session_ttl, chrono::Duration::hours(8));
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("SAFETRAIL_PORT", "8080"),
            ("SAFETRAIL_TOURIST_USER", "t"),
            ("SAFETRAIL_TOURIST_PASSWORD", "tp"),
            ("SAFETRAIL_AUTHORITY_USER", "a"),
            ("SAFETRAIL_AUTHORITY_PASSWORD", "ap"),
            ("SAFETRAIL_REPORT_WEBHOOK", "http://hooks.local/r"),
            ("SAFETRAIL_TIER_SAFE_ABOVE", "80"),
            ("SAFETRAIL_TIER_CAUTION_ABOVE", "55"),
            ("SAFETRAIL_AT_RISK_BELOW", "50"),
            ("SAFETRAIL_REPORT_TIMEOUT_MS", "2500"),
            ("SAFETRAIL_SESSION_TTL_MINUTES", "30"),
        ]);
        assert_eq!(c.port, 8080);
        assert!(!c.demo_credentials);
        assert_eq!(c.tourist, Credentials::new("t", "tp"));
        assert_eq!(c.report_webhook.as_deref(), Some("http://hooks.local/r"));
        assert_eq!(c.tiers.safe_above, 80);
        assert_eq!(c.tiers.caution_above, 55);
        assert!(!c.tiers_rejected);
        assert_eq!(c.tiers.classify(60), ScoreTier::Caution);
        assert_eq!(c.tiers.classify(55), ScoreTier::Danger);
        assert_eq!(c.at_risk.below, 50);
        assert_eq!(c.report_timeout, Duration::from_millis(2500));
        assert_eq!(c.session_ttl, chrono::Duration::minutes(30));
    }

    #[test]
    fn test_only_caution_threshold_overridden() {
        let c = config(&[("SAFETRAIL_TIER_CAUTION_ABOVE", "20")]);
        assert_eq!(c.tiers.safe_above, 70);
        assert_eq!(c.tiers.caution_above, 20);
        assert_eq!(c.tiers.classify(30), ScoreTier::Caution);
    }

    #[test]
    fn test_inverted_tier_thresholds_fall_back() {
        let c = config(&[("SAFETRAIL_TIER_SAFE_ABOVE", "30")]);

        assert!(c.tiers_rejected);
        assert_eq!(c.tiers, TierPolicy::default());
        let caution_reachable = (0..=100).any(|s| c.tiers.classify(s) == ScoreTier::Caution);
        assert!(caution_reachable);
    }

    #[test]
    fn test_zero_durations_fall_back() {
        let c = config(&[
            ("SAFETRAIL_REPORT_TIMEOUT_MS", "0"),
            ("SAFETRAIL_SESSION_TTL_MINUTES", "-5"),
        ]);
        assert_eq!(c.report_timeout, Duration::from_millis(DEFAULT_REPORT_TIMEOUT_MS));
        assert_eq!(c.session_ttl, chrono::Duration::hours(8));
    }

    #[test]
    fn test_bad_numbers_fall_back() {
        let c = config(&[("SAFETRAIL_PORT", "eighty"), ("SAFETRAIL_AT_RISK_BELOW", "300")]);
        assert_eq!(c.port, DEFAULT_PORT);
        assert_eq!(c.at_risk.below, 70);
    }

    #[test]
    fn test_partial_credentials_use_demo() {
        let c = config(&[("SAFETRAIL_AUTHORITY_USER", "only-user")]);
        assert_eq!(c.authority.user_id, "admin001");
        assert!(c.demo_credentials);
    }
}
