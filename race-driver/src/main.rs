use std::process::ExitCode;

use clap::Parser;
use race_driver::{DriverError, Opt};
use tracing_subscriber::EnvFilter;

fn run(opts: &Opt) -> Result<(), DriverError> {
    let config = race_driver::load_config(opts)?;
    let contents =
        std::fs::read_to_string(&opts.filename).map_err(|source| DriverError::Read {
            path: opts.filename.clone(),
            source,
        })?;
    race_driver::process_source(&contents, &config, &mut std::io::stdout().lock(), opts)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let opts = Opt::parse();
    if let Err(error) = run(&opts) {
        eprintln!("error: {error}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}
