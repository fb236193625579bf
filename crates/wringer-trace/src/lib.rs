//! Shared tracing configuration for the wringer workspace.
//!
//! Binaries and integration tests install their `tracing` subscriber
//! through this crate so the logging surface stays consistent: one
//! place decides filters, formats and environment overrides.

use std::env;

use tracing::Subscriber;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

/// Output format choices for the formatter layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceOutput {
    Compact,
    Pretty,
    Json,
}

impl TraceOutput {
    fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Configuration for the shared subscriber.
#[derive(Clone, Debug)]
pub struct TraceConfig {
    /// Tracing directives (e.g. `wringer_harness=debug,info`). When
    /// absent the crate falls back to `RUST_LOG` and finally to
    /// `default_directive`.
    pub directives: Option<String>,
    /// Directive used when neither `directives` nor `RUST_LOG`
    /// resolve to a valid filter.
    pub default_directive: String,
    /// Whether event targets (module paths) appear in output.
    pub include_targets: bool,
    /// ANSI formatting. Disable for CI logs that strip colour codes.
    pub ansi: bool,
    pub output: TraceOutput,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self::for_local()
    }
}

impl TraceConfig {
    /// Local development: compact, coloured output.
    pub fn for_local() -> Self {
        Self {
            directives: None,
            default_directive: "info".to_string(),
            include_targets: true,
            ansi: true,
            output: TraceOutput::Compact,
        }
    }

    /// CI / log collection: JSON, no ANSI.
    pub fn for_ci() -> Self {
        Self {
            directives: None,
            default_directive: "info".to_string(),
            include_targets: true,
            ansi: false,
            output: TraceOutput::Json,
        }
    }

    /// Build a configuration from environment hints.
    ///
    /// - `WRINGER_TRACE_PROFILE`: `local` (default) or `ci`
    /// - `WRINGER_TRACE_DIRECTIVES`: overrides tracing directives
    /// - `WRINGER_TRACE_FORMAT`: `compact`, `pretty`, or `json`
    pub fn from_env() -> Self {
        let profile = env::var("WRINGER_TRACE_PROFILE")
            .unwrap_or_else(|_| "local".to_string())
            .to_ascii_lowercase();

        let mut config = match profile.as_str() {
            "ci" => Self::for_ci(),
            _ => Self::for_local(),
        };

        if let Ok(directives) = env::var("WRINGER_TRACE_DIRECTIVES") {
            if !directives.trim().is_empty() {
                config.directives = Some(directives);
            }
        }

        if let Ok(format) = env::var("WRINGER_TRACE_FORMAT") {
            if let Some(parsed) = TraceOutput::from_env_value(&format) {
                config.output = parsed;
                if config.output == TraceOutput::Json {
                    config.ansi = false;
                }
            }
        }

        config
    }

    fn resolve_filter(&self) -> Result<EnvFilter, TraceSetupError> {
        if let Some(directives) = &self.directives {
            EnvFilter::try_new(directives).map_err(|err| TraceSetupError::InvalidFilter(err.to_string()))
        } else {
            match EnvFilter::try_from_default_env() {
                Ok(filter) => Ok(filter),
                Err(_) => Ok(EnvFilter::new(self.default_directive.clone())),
            }
        }
    }
}

/// Errors surfaced when configuring the subscriber fails.
#[derive(Debug, thiserror::Error)]
pub enum TraceSetupError {
    /// The provided directive string could not be parsed.
    #[error("invalid tracing directive: {0}")]
    InvalidFilter(String),

    /// Installing the global subscriber failed (usually because one
    /// is already set).
    #[error("failed to install global tracing subscriber: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
}

/// Build a subscriber from the configuration.
pub fn build_subscriber(config: &TraceConfig) -> Result<impl Subscriber + Send + Sync, TraceSetupError> {
    let filter = config.resolve_filter()?;

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.output {
        TraceOutput::Compact => Box::new(
            tracing_fmt::layer()
                .compact()
                .with_target(config.include_targets)
                .with_ansi(config.ansi),
        ),
        TraceOutput::Pretty => Box::new(
            tracing_fmt::layer()
                .pretty()
                .with_target(config.include_targets)
                .with_ansi(config.ansi),
        ),
        TraceOutput::Json => Box::new(
            tracing_fmt::layer()
                .json()
                .with_target(config.include_targets)
                .with_ansi(false),
        ),
    };

    Ok(Registry::default().with(layer).with(filter))
}

/// Install the configured subscriber as the process-wide default.
pub fn init_global_tracing(config: &TraceConfig) -> Result<(), TraceSetupError> {
    Ok(build_subscriber(config)?.try_init()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // serialize environment mutation across tests
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn reset_env() {
        for key in [
            "WRINGER_TRACE_PROFILE",
            "WRINGER_TRACE_DIRECTIVES",
            "WRINGER_TRACE_FORMAT",
            "RUST_LOG",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_rejects_invalid_directive() {
        let _guard = ENV_LOCK.lock().unwrap();
        reset_env();
        let config = TraceConfig {
            directives: Some("=::invalid".to_string()),
            ..TraceConfig::default()
        };
        assert!(matches!(
            build_subscriber(&config),
            Err(TraceSetupError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_builds_with_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        reset_env();
        assert!(build_subscriber(&TraceConfig::default()).is_ok());
    }

    #[test]
    fn test_from_env_respects_profile_and_format() {
        let _guard = ENV_LOCK.lock().unwrap();
        reset_env();

        env::set_var("WRINGER_TRACE_PROFILE", "ci");
        env::set_var("WRINGER_TRACE_FORMAT", "compact");
        env::set_var("WRINGER_TRACE_DIRECTIVES", "wringer_harness=debug");

        let config = TraceConfig::from_env();
        assert_eq!(config.directives.as_deref(), Some("wringer_harness=debug"));
        assert!(!config.ansi);
        assert_eq!(config.output, TraceOutput::Compact);

        reset_env();
    }
}
