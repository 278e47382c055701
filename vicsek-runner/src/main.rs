use clap::Parser;
use hdrhistogram::Histogram;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use vicsek_config::load_config;
use vicsek_core::RandomEngine;
use vicsek_simulation::Scheduler;

mod error;
mod report;
mod setup;

use error::RunnerError;
use report::{OutputFormat, Reporter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the simulation configuration file (.json or .toml)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Random seed, overriding the configuration
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of measured iterations, overriding the configuration
    #[arg(short, long)]
    iterations: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        log::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), RunnerError> {
    let mut config = load_config(&args.config)?;
    log::info!("Using configuration from {}", args.config.display());
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(iterations) = args.iterations {
        config.schedule.iterations = iterations;
    }

    let seed = config.seed.unwrap_or_else(setup::clock_seed);
    let mut rng = RandomEngine::unseeded();
    rng.set_seed(seed)?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))?;

    let mut setup = setup::build(&config, &mut rng)?;
    let stdout = std::io::stdout();
    let mut reporter = Reporter::new(stdout.lock(), args.format);
    reporter.header(&config, seed, &setup)?;

    let schedule = &config.schedule;
    let mut scheduler = Scheduler::new(schedule.dt)?.with_noise(schedule.noisy);
    let mut timings = Histogram::<u64>::new(3)?;
    let hunting = setup.simulation.is_hunt();
    log::info!(
        "Running {} transient + {} measured iterations (seed {})",
        schedule.transient,
        schedule.iterations,
        seed
    );

    let mut avoidance_time = 0u64;
    'run: for (phase_measured, steps) in [(false, schedule.transient), (true, schedule.iterations)] {
        for iteration in 0..steps {
            if !running.load(Ordering::SeqCst) {
                log::warn!("Interrupted, stopping after {} steps", scheduler.step_count());
                break 'run;
            }

            let started = Instant::now();
            let report = setup
                .simulation
                .step(&mut scheduler, &mut rng, phase_measured && hunting)?;
            timings.saturating_record(started.elapsed().as_micros() as u64);

            if !phase_measured {
                continue;
            }
            if iteration % schedule.output_every == 0 {
                reporter.step(
                    iteration,
                    &report,
                    setup.simulation.flock(),
                    hunting,
                    config.diagnostics.correlation_bins,
                )?;
            }
            if hunting {
                if report.captures > 0 {
                    reporter.capture(iteration, avoidance_time)?;
                    avoidance_time = 0;
                } else {
                    avoidance_time += 1;
                }
                if report.live == 0 {
                    log::info!("Every prey was captured after {} measured iterations", iteration + 1);
                    break 'run;
                }
            }
        }
    }
    reporter.flush()?;

    if !timings.is_empty() {
        log::info!(
            "{} steps, step time p50 {}us, p99 {}us, max {}us",
            timings.len(),
            timings.value_at_quantile(0.5),
            timings.value_at_quantile(0.99),
            timings.max()
        );
    }
    Ok(())
}
