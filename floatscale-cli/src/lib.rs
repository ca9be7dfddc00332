//! Shared plumbing for the floatscale command line tools

use clap::Parser;
use floatscale_core::Error;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Install the log subscriber. `RUST_LOG` overrides the verbosity flags.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Process exit code for a failed run
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map_or(1, Error::exit_code)
}

/// Exit code for a rejected command line: help and version requests
/// succeed, malformed options are invalid configuration
pub fn usage_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        Error::InvalidConfiguration(String::new()).exit_code()
    } else {
        0
    }
}

/// Parse the command line, printing clap's message on failure
pub fn parse_args<A: Parser>() -> std::result::Result<A, ExitCode> {
    A::try_parse().map_err(|err| {
        let _ = err.print();
        ExitCode::from(usage_exit_code(&err) as u8)
    })
}

/// Log the error chain and return the matching exit code
pub fn report(err: anyhow::Error) -> i32 {
    error!("{:#}", err);
    exit_code(&err)
}
