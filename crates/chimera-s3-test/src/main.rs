use anyhow::{Context, Result};
use chimera_harness::cli::commands::Cli;
use chimera_harness::scenario::{resolve_tests, run_scenarios, ScenarioError, ScenarioOptions};
use clap::Parser;
use env_logger::Env;
use log::{debug, error};
use std::process;

fn main() {
    let cli = Cli::parse();

    // Initialize logger with specified or default log level
    let env = match cli.log_level {
        Some(ref log_level) => Env::default().filter_or("RUST_LOG", log_level),
        None => Env::default().filter_or("RUST_LOG", "info"),
    };
    env_logger::init_from_env(env);

    let code = match run(cli) {
        Ok(()) => {
            println!("\n=== ALL TESTS PASSED ===");
            0
        }
        Err(e) => {
            error!("{:#}", e);
            let failure = e
                .chain()
                .find_map(|cause| cause.downcast_ref::<ScenarioError>())
                .map(ToString::to_string)
                .unwrap_or_else(|| e.to_string());
            eprintln!("\n=== TEST FAILED: {} ===", failure);
            1
        }
    };
    process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    let tests = resolve_tests(&cli.tests).context("Invalid test selection")?;
    debug!("Running {:?}", tests);

    let options = ScenarioOptions {
        tests,
        backend: cli.backend,
        signature: cli.sigver,
        binary: cli.chimera,
        debug: cli.debug,
    };

    run_scenarios(&options).context("S3 test run failed")
}
