//! Inferir CLI - inspect and drive `.titan` models
//!
//! `inferir info` prints the model summary; `inferir predict` runs one
//! inference on a comma-separated input; `inferir bench` drives concurrent
//! predictions through a thread pool and reports latency statistics.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use inferir::{
    engine::ThreadPool, error::Result, logger, InferirError, LogLevel, ModelHandle, Tensor,
};

/// Inferir - CPU inference engine for feed-forward models
#[derive(Parser)]
#[command(name = "inferir")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show model architecture and parameter counts
    Info {
        /// Path to the .titan model file
        model: String,
    },
    /// Run a single prediction
    Predict {
        /// Path to the .titan model file
        model: String,

        /// Comma-separated input values, e.g. "1,2,3,4"
        #[arg(short, long)]
        input: String,
    },
    /// Measure prediction latency under concurrent load
    Bench {
        /// Path to the .titan model file
        model: String,

        /// Total predictions to run
        #[arg(short, long, default_value = "100")]
        runs: usize,

        /// Worker threads (0 = hardware concurrency)
        #[arg(short, long, default_value = "0")]
        threads: usize,

        /// Emit statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct BenchReport {
    runs: usize,
    threads: usize,
    inference_count: u64,
    total_time_ms: f64,
    mean_latency_ms: f64,
    min_latency_ms: f64,
    max_latency_ms: f64,
}

fn main() {
    let cli = Cli::parse();

    logger::set_level(if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });

    if let Err(err) = run(cli.command) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Info { model } => {
            let handle = ModelHandle::builder().model_path(&model).build()?;
            println!("{}", handle.summary()?);
            println!("layers: {}", handle.layer_count());
            println!(
                "input shape: {:?}",
                handle.expected_input_shape()?
            );
            println!("cpu: {}", inferir::ops::cpu_features());
            Ok(())
        }
        Commands::Predict { model, input } => {
            let values = parse_input(&input)?;
            let handle = ModelHandle::builder().model_path(&model).build()?;

            let shape = handle.expected_input_shape()?;
            let expected: usize = shape.iter().product();
            if values.len() != expected {
                return Err(InferirError::invalid_argument(format!(
                    "expected {expected} input values for shape {shape:?}, got {}",
                    values.len()
                )));
            }

            let tensor = Tensor::from_vec(shape, values)?;
            let output = handle.predict(&tensor)?;
            println!("{:?}", output.data());
            Ok(())
        }
        Commands::Bench {
            model,
            runs,
            threads,
            json,
        } => {
            let handle = Arc::new(
                ModelHandle::builder()
                    .model_path(&model)
                    .profiling(true)
                    .warmup_runs(3)
                    .build()?,
            );
            let shape = handle.expected_input_shape()?;
            let input = Tensor::new(&shape)?;

            let pool = ThreadPool::new(threads);
            let handles: Vec<_> = (0..runs)
                .map(|_| {
                    let handle = Arc::clone(&handle);
                    let input = input.clone();
                    pool.submit(move || handle.predict(&input).map(|_| ()))
                })
                .collect::<Result<_>>()?;

            for task in handles {
                task.wait()??;
            }

            let stats = handle.stats();
            let report = BenchReport {
                runs,
                threads: pool.size(),
                inference_count: stats.inference_count,
                total_time_ms: stats.total_time_ms,
                mean_latency_ms: stats.mean_latency_ms,
                min_latency_ms: stats.min_latency_ms,
                max_latency_ms: stats.max_latency_ms,
            };

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).map_err(|e| {
                        InferirError::invalid_argument(format!("json encoding failed: {e}"))
                    })?
                );
            } else {
                println!("runs:         {}", report.runs);
                println!("threads:      {}", report.threads);
                println!("mean latency: {:.3} ms", report.mean_latency_ms);
                println!("min latency:  {:.3} ms", report.min_latency_ms);
                println!("max latency:  {:.3} ms", report.max_latency_ms);
                println!("total time:   {:.3} ms", report.total_time_ms);
            }
            Ok(())
        }
    }
}

fn parse_input(raw: &str) -> Result<Vec<f32>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f32>().map_err(|_| {
                InferirError::invalid_argument(format!("invalid input value '{s}'"))
            })
        })
        .collect()
}
