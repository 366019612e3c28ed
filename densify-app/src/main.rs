//! Densify Command Line Tool
//!
//! Front end over the frame container, temporal masks and the Pull-Push
//! reconstruction core.
//!
//! Commands:
//! - `inspect`: list the textures of a container
//! - `export`: write every texture of a container as PNG
//! - `mask`: build the temporal validity mask of a dataset window
//! - `bench`: time the Pull-Push reconstruction on a synthetic frame

mod app;
mod commands;
mod config;
mod errors;

use app::{App, Command};
use clap::{Parser, Subcommand};
use commands::BenchParams;
use config::PipelineConfig;
use std::path::PathBuf;

/// Densify - dense frame reconstruction from sparse point renderings
#[derive(Parser, Debug)]
#[command(name = "densify")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pipeline configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, overrides the configuration
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Worker threads, overrides the configuration
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// List the textures of a frame container
    Inspect { file: PathBuf },

    /// Write every texture of a frame container as PNG
    Export {
        file: PathBuf,
        #[arg(short, long, default_value = "export")]
        out: PathBuf,
    },

    /// Build the temporal validity mask of one dataset window
    Mask {
        dataset: PathBuf,
        #[arg(short, long, default_value_t = 0)]
        index: usize,
        /// Write the combined mask as PNG
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[arg(long)]
        filter_size: Option<usize>,
        #[arg(long)]
        forward_flow: Option<String>,
        #[arg(long)]
        backward_flow: Option<String>,
    },

    /// Time the Pull-Push reconstruction on a synthetic frame
    Bench {
        #[arg(long, default_value_t = 1920)]
        width: usize,
        #[arg(long, default_value_t = 1080)]
        height: usize,
        #[arg(long, default_value_t = 8)]
        channels: usize,
        #[arg(long, default_value_t = 16)]
        inner: usize,
        #[arg(long, default_value_t = 7)]
        out_channels: usize,
        #[arg(long, default_value_t = 10)]
        iterations: usize,
    },
}

fn configure(args: &Args) -> Result<PipelineConfig, errors::AppError> {
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if let CliCommand::Mask {
        filter_size,
        forward_flow,
        backward_flow,
        ..
    } = &args.command
    {
        if let Some(size) = filter_size {
            config.mask.occlusion.artifact_filter_size = *size;
        }
        if let Some(name) = forward_flow {
            config.forward_flow = name.clone();
        }
        if let Some(name) = backward_flow {
            config.backward_flow = name.clone();
        }
    }
    Ok(config)
}

fn into_command(command: CliCommand) -> Command {
    match command {
        CliCommand::Inspect { file } => Command::Inspect { file },
        CliCommand::Export { file, out } => Command::Export { file, out },
        CliCommand::Mask {
            dataset,
            index,
            out,
            ..
        } => Command::Mask {
            dataset,
            index,
            out,
        },
        CliCommand::Bench {
            width,
            height,
            channels,
            inner,
            out_channels,
            iterations,
        } => Command::Bench(BenchParams {
            width,
            height,
            in_channels: channels,
            inner_channels: inner,
            out_channels,
            iterations,
        }),
    }
}

fn main() {
    let args = Args::parse();

    let result = configure(&args)
        .and_then(|config| App::new().with_config(config).run(into_command(args.command)));
    if let Err(e) = result {
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }
}
