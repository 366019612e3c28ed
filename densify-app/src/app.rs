//! Application setup and command dispatch with builder pattern.

use crate::commands::{self, BenchParams};
use crate::config::{LoggingConfig, PipelineConfig};
use crate::errors::AppError;
use std::path::PathBuf;
use tracing::info;

/// A unit of work for the tool.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Inspect { file: PathBuf },
    Export { file: PathBuf, out: PathBuf },
    Mask {
        dataset: PathBuf,
        index: usize,
        out: Option<PathBuf>,
    },
    Bench(BenchParams),
}

/// Application builder for configuring and running a command.
pub struct App {
    config: PipelineConfig,
    init_logging: bool,
}

impl App {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            init_logging: true,
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.config.logging = config;
        self
    }

    /// Leave the global subscriber alone, for embedding and tests.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(self, command: Command) -> Result<(), AppError> {
        if self.init_logging {
            init_logging(&self.config.logging);
        }
        configure_threads(self.config.threads)?;

        match command {
            Command::Inspect { file } => {
                for line in commands::inspect(&file)? {
                    println!("{}", line);
                }
            }
            Command::Export { file, out } => {
                let count = commands::export(&file, &out)?;
                println!("Exported {} textures to {}", count, out.display());
            }
            Command::Mask {
                dataset,
                index,
                out,
            } => {
                let summary = commands::mask(&dataset, index, &self.config, out.as_deref())?;
                println!(
                    "Window {}: previous {:.4}, next {:.4}, combined {:.4} valid, {} non-finite",
                    index, summary.previous, summary.next, summary.combined, summary.non_finite
                );
            }
            Command::Bench(params) => {
                let average = commands::bench(&params)?;
                println!(
                    "{}x{}: {:.2} ms per pass over {} iterations",
                    params.width, params.height, average, params.iterations
                );
            }
        }
        Ok(())
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

pub fn init_logging(logging: &LoggingConfig) {
    #[cfg(feature = "tracy")]
    {
        if logging.enable_tracy {
            use tracing_subscriber::Layer;
            use tracing_subscriber::layer::SubscriberExt;
            use tracing_subscriber::util::SubscriberInitExt;

            tracing_subscriber::registry()
                .with(tracing_tracy::TracyLayer::default())
                .with(
                    tracing_subscriber::fmt::layer().with_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env()
                            .unwrap_or_else(|_| logging.level.clone().into()),
                    ),
                )
                .init();
            return;
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level)),
        )
        .with_target(false)
        .try_init();
}

/// Size the global rayon pool. 0 keeps rayon's default.
pub fn configure_threads(threads: usize) -> Result<(), AppError> {
    if threads == 0 {
        return Ok(());
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("densify-worker-{}", i))
        .build_global()?;
    info!("Using {} worker threads", threads);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let app = App::new().with_config(PipelineConfig {
            threads: 2,
            ..PipelineConfig::default()
        });
        assert_eq!(app.config().threads, 2);

        let app = app.with_logging(LoggingConfig {
            level: "trace".to_string(),
            enable_tracy: false,
        });
        assert_eq!(app.config().logging.level, "trace");
    }

    #[test]
    fn test_run_bench_without_logging() {
        let params = BenchParams {
            width: 9,
            height: 7,
            iterations: 1,
            ..BenchParams::default()
        };
        App::new()
            .without_logging()
            .run(Command::Bench(params))
            .unwrap();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = App::new().without_logging().run(Command::Inspect {
            file: dir.path().join("missing.textures"),
        });
        assert!(result.is_err());
    }
}
