//! Configuration: how writes are shipped, how aborts are retried, and
//! where the database lives.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// When the orchestrator may use buffered mutations instead of DML.
///
/// Mutations are cheaper but invisible to reads inside the same
/// transaction, so the safe default only uses them where no later read
/// can observe the gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationPolicy {
    /// Always batched DML.
    Never,
    /// Mutations when the save owns its transaction, DML inside an
    /// explicit transaction.
    #[default]
    ImplicitTransactionsOnly,
    /// Mutations everywhere they can work; saves that must read backend
    /// generated values mid-transaction still fall back to DML.
    Always,
}

impl FromStr for MutationPolicy {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "never" => Ok(MutationPolicy::Never),
            "implicit" => Ok(MutationPolicy::ImplicitTransactionsOnly),
            "always" => Ok(MutationPolicy::Always),
            _ => Err(OptionsError::InvalidValue {
                key: "mutation_policy".into(),
                value: s.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOptions {
    pub mutation_policy: MutationPolicy,
    /// Abort retries after the first attempt. 0 disables retrying.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            mutation_policy: MutationPolicy::default(),
            max_retries: 5,
            retry_base_delay: Duration::from_millis(20),
            retry_max_delay: Duration::from_secs(5),
        }
    }
}

impl SaveOptions {
    /// Exponential backoff for the given 1-based attempt number.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let delay = self.retry_base_delay.saturating_mul(1u32 << shift);
        delay.min(self.retry_max_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub project: String,
    pub instance: String,
    pub database: String,
    /// Override for the emulator or a regional endpoint.
    pub endpoint: Option<String>,
    pub save: SaveOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error(
        "invalid database path `{0}`, expected projects/<p>/instances/<i>/databases/<d>"
    )]
    InvalidPath(String),
    #[error("unknown connection option `{0}`")]
    UnknownOption(String),
    #[error("invalid value `{value}` for connection option `{key}`")]
    InvalidValue { key: String, value: String },
}

impl ConnectionOptions {
    /// Parse `projects/<p>/instances/<i>/databases/<d>[;key=value...]`.
    ///
    /// Recognized options: `endpoint`, `mutation_policy`
    /// (`never`/`implicit`/`always`), `max_retries`.
    pub fn parse(s: &str) -> Result<ConnectionOptions, OptionsError> {
        let mut parts = s.split(';');
        let path = parts.next().unwrap_or_default().trim();

        let segments: Vec<&str> = path.split('/').collect();
        let (project, instance, database) = match segments.as_slice() {
            ["projects", p, "instances", i, "databases", d]
                if !p.is_empty() && !i.is_empty() && !d.is_empty() =>
            {
                (p.to_string(), i.to_string(), d.to_string())
            }
            _ => return Err(OptionsError::InvalidPath(path.into())),
        };

        let mut options = ConnectionOptions {
            project,
            instance,
            database,
            endpoint: None,
            save: SaveOptions::default(),
        };

        for pair in parts {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let Some((key, value)) = pair.split_once('=') else {
                return Err(OptionsError::UnknownOption(pair.into()));
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "endpoint" => options.endpoint = Some(value.trim().to_string()),
                "mutation_policy" => {
                    options.save.mutation_policy = value.trim().parse()?;
                }
                "max_retries" => {
                    options.save.max_retries =
                        value.trim().parse().map_err(|_| OptionsError::InvalidValue {
                            key: key.into(),
                            value: value.into(),
                        })?;
                }
                other => return Err(OptionsError::UnknownOption(other.into())),
            }
        }
        Ok(options)
    }

    /// Fully qualified database path.
    pub fn database_path(&self) -> String {
        format!(
            "projects/{}/instances/{}/databases/{}",
            self.project, self.instance, self.database
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_bare_path() {
        let o = ConnectionOptions::parse("projects/p1/instances/i1/databases/d1").unwrap();
        assert_eq!(o.project, "p1");
        assert_eq!(o.instance, "i1");
        assert_eq!(o.database, "d1");
        assert_eq!(o.endpoint, None);
        assert_eq!(o.save, SaveOptions::default());
        assert_eq!(o.database_path(), "projects/p1/instances/i1/databases/d1");
    }

    #[test]
    fn parses_options() {
        let o = ConnectionOptions::parse(
            "projects/p/instances/i/databases/d;endpoint=localhost:9010;mutation_policy=never;max_retries=2",
        )
        .unwrap();
        assert_eq!(o.endpoint.as_deref(), Some("localhost:9010"));
        assert_eq!(o.save.mutation_policy, MutationPolicy::Never);
        assert_eq!(o.save.max_retries, 2);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            ConnectionOptions::parse("projects/p/databases/d"),
            Err(OptionsError::InvalidPath(_))
        ));
        assert!(matches!(
            ConnectionOptions::parse("projects/p/instances/i/databases/d;shiny=yes"),
            Err(OptionsError::UnknownOption(_))
        ));
        assert!(matches!(
            ConnectionOptions::parse("projects/p/instances/i/databases/d;max_retries=many"),
            Err(OptionsError::InvalidValue { .. })
        ));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let opts = SaveOptions::default();
        assert_eq!(opts.retry_delay(1), Duration::from_millis(20));
        assert_eq!(opts.retry_delay(2), Duration::from_millis(40));
        assert_eq!(opts.retry_delay(3), Duration::from_millis(80));
        assert_eq!(opts.retry_delay(30), opts.retry_max_delay);
    }
}
