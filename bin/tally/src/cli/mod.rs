use std::future::Future;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

mod bench;
mod config;
pub mod options;

#[derive(Debug, Parser)]
#[cfg_attr(test, derive(PartialEq))]
#[command(name = "tally", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.commands {
            Commands::Bench(args) => execute_async(args.execute())?,
            Commands::Config(args) => execute_async(args.execute())?,
        }
    }
}

#[derive(Debug, Subcommand)]
#[cfg_attr(test, derive(PartialEq))]
pub enum Commands {
    #[command(about = "Benchmark responders against each other")]
    Bench(Box<bench::BenchArgs>),

    #[command(about = "Print the effective benchmark configuration")]
    Config(config::ConfigArgs),
}

pub fn execute_async<F: Future>(future: F) -> Result<F::Output> {
    Ok(build_tokio_runtime().context("Failed to build tokio runtime")?.block_on(future))
}

fn build_tokio_runtime() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread().enable_all().build()
}
