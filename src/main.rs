#![cfg(feature = "cli")]
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use log::{debug, error, LevelFilter};

use hdcptest::runner::{Outcome, TestMode, TestRunner};
use hdcptest::sdk::{SdkDriver, DEFAULT_LIBRARY};
use hdcptest::status::HdcpStatus;

/// Exit code for command lines that cannot be parsed.
const USAGE_EXIT_CODE: u8 = 1;

#[derive(Parser, Debug)]
#[command(
    name = "hdcp_test_utility",
    version,
    about = "Turn HDCP on and off on every connected display and check the port status"
)]
struct Cli {
    /// hdcp: turn HDCP on with the port's maximum supported HDCP version.
    /// hdcptype1: turn on HDCP 2.2 and apply the stream type restriction.
    #[arg(long = "test", value_name = "hdcp|hdcptype1")]
    test: TestMode,

    /// HDCP SDK shared library to load [default: libhdcpsdk.so].
    #[arg(long = "library", env = "HDCP_SDK_LIBRARY")]
    library: Option<PathBuf>,

    #[arg(short = 'd', long = "debug", action = ArgAction::SetTrue)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(USAGE_EXIT_CODE),
            };
        }
    };

    init_logger(cli.debug);
    debug!(
        "hdcp_test_utility version {} ({:?})",
        env!("CARGO_PKG_VERSION"),
        cli
    );

    match run_test(&cli) {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(err) => {
            error!("{:#}", err);
            error!("HDCP {} test failed!", cli.test);
            ExitCode::from(HdcpStatus::ErrorInternal.exit_code())
        }
    }
}

fn init_logger(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .format_target(false)
        .target(env_logger::Target::Stdout)
        .init();
}

fn run_test(cli: &Cli) -> anyhow::Result<Outcome> {
    let driver = match &cli.library {
        Some(path) => SdkDriver::open(path)
            .with_context(|| format!("Failed to load HDCP SDK from {}", path.display()))?,
        None => SdkDriver::load()
            .with_context(|| format!("Failed to load HDCP SDK from {}", DEFAULT_LIBRARY))?,
    };
    let mut runner = TestRunner::new(driver);
    Ok(runner.run(cli.test))
}
