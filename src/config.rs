//! Service configuration read from the environment.
//!
//! | Variable | Default | Meaning |
//! | --- | --- | --- |
//! | `TIMELY_ADDR` | `0.0.0.0:7860` | HTTP bind address |
//! | `TIMELY_MAX_RUNS` | `4` | Runs solving at once; the rest stay queued |
//! | `TIMELY_INFEASIBLE_POLICY` | `warn` | `warn` completes with a warning, `fail` fails the run |
//! | `TIMELY_REPORT_TOP_N` | `5` | Soft contributors listed per report |

use std::net::SocketAddr;

use crate::error::ServiceConfigError;
use crate::explain::DEFAULT_TOP_N;
use crate::solver::InfeasiblePolicy;

const DEFAULT_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 7860);
const DEFAULT_MAX_RUNS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub max_concurrent_runs: usize,
    pub infeasible_policy: InfeasiblePolicy,
    pub report_top_n: usize,
    /// Print colored run banners to stdout.
    pub console_output: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(DEFAULT_ADDR),
            max_concurrent_runs: DEFAULT_MAX_RUNS,
            infeasible_policy: InfeasiblePolicy::default(),
            report_top_n: DEFAULT_TOP_N,
            console_output: false,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ServiceConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source.
    ///
    /// ```
    /// use timely_scheduler::config::ServiceConfig;
    /// use timely_scheduler::solver::InfeasiblePolicy;
    ///
    /// let config = ServiceConfig::from_lookup(|name| match name {
    ///     "TIMELY_MAX_RUNS" => Some("2".to_string()),
    ///     "TIMELY_INFEASIBLE_POLICY" => Some("fail".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.max_concurrent_runs, 2);
    /// assert_eq!(config.infeasible_policy, InfeasiblePolicy::Fail);
    /// ```
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ServiceConfigError> {
        let mut config = Self {
            console_output: true,
            ..Self::default()
        };

        if let Some(value) = lookup("TIMELY_ADDR") {
            config.bind_addr = parse("TIMELY_ADDR", &value)?;
        }
        if let Some(value) = lookup("TIMELY_MAX_RUNS") {
            let max: usize = parse("TIMELY_MAX_RUNS", &value)?;
            if max == 0 {
                return Err(invalid("TIMELY_MAX_RUNS", &value));
            }
            config.max_concurrent_runs = max;
        }
        if let Some(value) = lookup("TIMELY_INFEASIBLE_POLICY") {
            config.infeasible_policy = match value.to_lowercase().as_str() {
                "warn" => InfeasiblePolicy::CompleteWithWarning,
                "fail" => InfeasiblePolicy::Fail,
                _ => return Err(invalid("TIMELY_INFEASIBLE_POLICY", &value)),
            };
        }
        if let Some(value) = lookup("TIMELY_REPORT_TOP_N") {
            config.report_top_n = parse("TIMELY_REPORT_TOP_N", &value)?;
        }
        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ServiceConfigError> {
    value.trim().parse().map_err(|_| invalid(name, value))
}

fn invalid(name: &'static str, value: &str) -> ServiceConfigError {
    ServiceConfigError {
        name,
        value: value.to_string(),
    }
}
