//! Centralised tracing initialisation for branchflow binaries.
//!
//! Call [`init_tracing`] once at program start to configure the global
//! subscriber with an `EnvFilter` and one of the [`LogFormat`]s.
//!
//! Safe to call more than once; subsequent calls are silently ignored
//! (the global subscriber can only be set once per process).

use std::fmt;
use std::str::FromStr;

use branchflow_ci::OUTPUT_TARGET;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// CI runner workflow commands: `##[info]`, `##[error]`, ...
    #[default]
    Actions,
    /// Plain `tracing-subscriber` text.
    Text,
    /// Newline-delimited JSON.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "actions" => Ok(LogFormat::Actions),
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!(
                "unknown log format {other}, expected actions, text or json"
            )),
        }
    }
}

/// Prefixes every event with the workflow-command marker of its level.
///
/// Forwarded child-process output is printed verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionsFormat;

impl ActionsFormat {
    pub fn marker(level: &Level) -> &'static str {
        match *level {
            Level::ERROR => "##[error]",
            Level::WARN => "##[warning]",
            Level::INFO => "##[info]",
            _ => "##[debug]",
        }
    }
}

impl<S, N> FormatEvent<S, N> for ActionsFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        if meta.target() != OUTPUT_TARGET {
            write!(writer, "{}", Self::marker(meta.level()))?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Initialise the global tracing subscriber.
///
/// * `format`: line format, see [`LogFormat`].
/// * `level`: default verbosity when `RUST_LOG` is not set.
///
/// Respects the `RUST_LOG` environment variable for fine-grained filtering.
/// If `RUST_LOG` is not set, falls back to the supplied `level`.
pub fn init_tracing(format: LogFormat, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    match format {
        LogFormat::Actions => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stdout)
                    .event_format(ActionsFormat),
            )
            .try_init()
            .ok(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
            .ok(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false).json())
            .try_init()
            .ok(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let sink = captured.clone();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .with_writer(move || sink.clone())
                .event_format(ActionsFormat),
        );
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_actions_format_prefixes_levels() {
        let out = capture(|| {
            tracing::info!("Creating tag v1.2.0");
            tracing::error!("New push to env/prod without bumping version");
            tracing::warn!("careful");
        });
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "##[info]Creating tag v1.2.0",
                "##[error]New push to env/prod without bumping version",
                "##[warning]careful",
            ]
        );
    }

    #[test]
    fn test_actions_format_passes_command_output_through() {
        let out = capture(|| {
            tracing::info!(target: OUTPUT_TARGET, "npm test output");
        });
        assert_eq!(out, "npm test output\n");
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("actions".parse::<LogFormat>().unwrap(), LogFormat::Actions);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing(LogFormat::Text, Level::INFO);
        init_tracing(LogFormat::Json, Level::DEBUG);
    }
}
