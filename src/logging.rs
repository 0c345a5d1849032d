use anyhow::{Context, Result};
use clap::Args;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::fs::File;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging flags shared by every tool.
#[derive(Args, Debug)]
pub struct LogOptions {
    /// Also write logs to this file (plain text, with timestamps).
    #[arg(short, long, global = true)]
    pub log_file: Option<PathBuf>,
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

/// Keeps the file writer alive; logs still buffered are flushed on drop.
pub struct LogGuard(Option<WorkerGuard>);

impl LogOptions {
    /// Install the global subscriber. Console output goes to stderr so that
    /// stdout stays clean for data (`--json`).
    ///
    /// `-v` shows USB traffic (`debug`), `-vv` every poll (`trace`);
    /// `RUST_LOG` directives take precedence.
    pub fn init(&self) -> Result<LogGuard> {
        let filter = EnvFilter::builder()
            .with_default_directive(self.verbose.tracing_level_filter().into())
            .from_env_lossy();

        let console = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .boxed();

        let mut guard = None;
        let file = match &self.log_file {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create log file {}", path.display()))?;
                let (writer, file_guard) = tracing_appender::non_blocking(file);
                guard = Some(file_guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .boxed(),
                )
            }
            None => None,
        };

        tracing_subscriber::registry().with(filter).with(console).with(file).init();

        if let Some(path) = &self.log_file {
            info!(path = %path.display(), "Writing log file");
        }
        Ok(LogGuard(guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tracing::level_filters::LevelFilter;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        log: LogOptions,
    }

    #[test]
    fn test_log_flags() {
        let cli = Cli::parse_from(["tool"]);
        assert!(cli.log.log_file.is_none());
        assert_eq!(cli.log.verbose.tracing_level_filter(), LevelFilter::INFO);

        let cli = Cli::parse_from(["tool", "-vv", "--log-file", "run.log"]);
        assert_eq!(cli.log.log_file, Some(PathBuf::from("run.log")));
        assert_eq!(cli.log.verbose.tracing_level_filter(), LevelFilter::TRACE);
    }
}
