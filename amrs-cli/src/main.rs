//! AMRS CLI Tool
//!
//! Command line interface for validating AMRS configuration and
//! simulating routed traffic against fake model backends

use amrs_core::Config;
use amrs_router::{RequestContext, RouteOutcome, Router, StatsSnapshot};
use anyhow::Result;
use clap::{Parser, Subcommand};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "amrs-cli")]
#[command(about = "A CLI tool for AMRS model routing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    ValidateConfig {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Generate example configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config_example.toml")]
        output: String,
        /// Include advanced features
        #[arg(long)]
        advanced: bool,
    },
    /// Route synthetic requests against fake backends and show statistics
    Simulate {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
        /// Total number of requests to route
        #[arg(short, long, default_value_t = 1000)]
        requests: usize,
        /// Number of concurrent workers
        #[arg(long, default_value_t = 16)]
        concurrency: usize,
        /// RNG seed, overrides settings.seed
        #[arg(long)]
        seed: Option<u64>,
        /// Probability that a fake backend call fails
        #[arg(long, default_value_t = 0.05)]
        failure_rate: f64,
        /// Divide simulated latencies by this factor when sleeping
        #[arg(long, default_value_t = 100.0)]
        time_scale: f64,
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志 - 完全依赖RUST_LOG环境变量
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_file(true)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ValidateConfig { config } => {
            println!("Validating configuration file: {}", config);
            match amrs_core::config::load_config_from_path(&config) {
                Ok(cfg) => {
                    println!("✅ Configuration is valid");
                    println!("  - {} models configured", cfg.models.len());
                    println!("  - routing mode: {}", cfg.settings.routing_mode);
                    for backend in cfg.backends() {
                        println!("  - backend {} (weight {})", backend.id, backend.weight);
                    }
                }
                Err(e) => {
                    eprintln!("❌ Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::GenerateConfig { output, advanced } => {
            println!("Generating configuration file: {}", output);
            generate_config_file(&output, advanced)?;
            println!("✅ Configuration file generated successfully");
        }
        Commands::Simulate {
            config,
            requests,
            concurrency,
            seed,
            failure_rate,
            time_scale,
            json,
        } => {
            let mut cfg = amrs_core::config::load_config_from_path(&config)?;
            if seed.is_some() {
                cfg.settings.seed = seed;
            }
            let options = SimulationOptions {
                requests,
                concurrency,
                failure_rate,
                time_scale,
            };
            let snapshot = run_simulation(&cfg, options).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_stats(&snapshot);
            }
        }
    }

    Ok(())
}

/// 生成配置文件
fn generate_config_file(output_path: &str, advanced: bool) -> Result<()> {
    std::fs::write(output_path, config_template(advanced))?;
    Ok(())
}

fn config_template(advanced: bool) -> &'static str {
    if advanced {
        r#"# AMRS Advanced Configuration File
# Weighted round robin across providers with concurrency hints

[settings]
provider = "deepinfra"
temperature = 0.8
max_output_tokens = 1024
routing_mode = "weighted_round_robin"
seed = 42

[[models]]
id = "deepseek-ai/DeepSeek-V3.2"
weight = 3
max_concurrency = 32

[[models]]
id = "nvidia/Nemotron-3-Nano-30B-A3B"
weight = 1
max_concurrency = 16

[[models]]
id = "gpt-4o-mini"
provider = "openai"
temperature = 0.5
max_output_tokens = 2048
weight = 2

[[models]]
id = "mistral-large"
provider = "openrouter"
weight = 1
"#
    } else {
        r#"# AMRS Configuration File
# This is a basic configuration example

[settings]
provider = "openai"
routing_mode = "least_loaded"

[[models]]
id = "gpt-4o"

[[models]]
id = "gpt-4o-mini"
"#
    }
}

#[derive(Debug, Clone, Copy)]
struct SimulationOptions {
    requests: usize,
    concurrency: usize,
    failure_rate: f64,
    time_scale: f64,
}

/// 模拟后端：基础延迟随下标递增，带 ±20% 抖动和固定失败率
#[derive(Debug, Clone)]
struct FakeBackend {
    base_latency: Duration,
    failure_rate: f64,
}

impl FakeBackend {
    fn for_index(index: usize, failure_rate: f64) -> Self {
        Self {
            base_latency: Duration::from_millis(80 * (index as u64 + 1)),
            failure_rate,
        }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> (Duration, bool) {
        let jitter = rng.random_range(0.8..=1.2);
        let latency = self.base_latency.mul_f64(jitter);
        let failed = rng.random_bool(self.failure_rate);
        (latency, failed)
    }
}

async fn run_simulation(config: &Config, options: SimulationOptions) -> Result<StatsSnapshot> {
    if !(0.0..=1.0).contains(&options.failure_rate) {
        anyhow::bail!(
            "failure_rate must be between 0.0 and 1.0, got {}",
            options.failure_rate
        );
    }
    if options.time_scale <= 0.0 {
        anyhow::bail!("time_scale must be positive, got {}", options.time_scale);
    }
    if options.concurrency == 0 {
        anyhow::bail!("concurrency must be positive");
    }

    let router = Arc::new(Router::from_config(config)?);
    let fakes: Arc<Vec<FakeBackend>> = Arc::new(
        (0..router.backends().len())
            .map(|i| FakeBackend::for_index(i, options.failure_rate))
            .collect(),
    );
    let remaining = Arc::new(AtomicUsize::new(options.requests));

    info!(
        "Simulating {} requests with {} workers using {}",
        options.requests,
        options.concurrency,
        router.name()
    );
    let started = Instant::now();

    let handles: Vec<_> = (0..options.concurrency)
        .map(|worker| {
            let router = router.clone();
            let fakes = fakes.clone();
            let remaining = remaining.clone();
            let rng = match config.settings.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker as u64)),
                None => StdRng::from_rng(&mut rand::rng()),
            };
            tokio::spawn(simulate_worker(
                router,
                fakes,
                remaining,
                rng,
                options.time_scale,
            ))
        })
        .collect();

    for result in join_all(handles).await {
        result??;
    }

    info!("Simulation finished in {:?}", started.elapsed());
    Ok(router.stats())
}

async fn simulate_worker(
    router: Arc<Router>,
    fakes: Arc<Vec<FakeBackend>>,
    remaining: Arc<AtomicUsize>,
    mut rng: StdRng,
    time_scale: f64,
) -> Result<()> {
    while remaining
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
        .is_ok()
    {
        let context = RequestContext::new("simulated request");
        let dispatch = router.dispatch(&context)?;
        let index = router
            .backends()
            .iter()
            .position(|b| b.id == dispatch.id)
            .unwrap_or(0);
        let fake = fakes
            .get(index)
            .ok_or_else(|| anyhow::anyhow!("no fake backend for {}", dispatch.id))?;

        let (latency, failed) = fake.sample(&mut rng);
        tokio::time::sleep(latency.div_f64(time_scale)).await;

        // 上报模拟延迟而不是缩放后的实际耗时
        let outcome = if failed {
            RouteOutcome::failure(latency, "simulated backend failure")
        } else {
            RouteOutcome::success(latency)
        };
        dispatch.complete(outcome)?;
    }
    Ok(())
}

/// 显示后端统计
fn print_stats(snapshot: &StatsSnapshot) {
    println!("📊 Routing Statistics");
    println!("=====================");
    println!("Taken At: {}", snapshot.taken_at.to_rfc3339());
    println!("Total Requests: {}", snapshot.total_requests());
    println!("In Flight: {}", snapshot.total_in_flight());
    println!();

    for view in snapshot.iter() {
        println!("Backend: {}", view.backend_id);
        println!("  Requests: {}", view.total_requests);
        println!("  Failures: {}", view.failed_requests);
        if let Some(rate) = view.success_rate() {
            println!("  Success Rate: {:.2}%", rate * 100.0);
        }
        match view.average_latency() {
            Some(latency) => println!("  Avg Latency: {}ms", latency.as_millis()),
            None => println!("  Avg Latency: n/a"),
        }
        println!();
    }
}
