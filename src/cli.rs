use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};

use crate::bootstrap::{Bootstrap, DEFAULT_BOOTSTRAP_FILE};
use crate::context::Context;
use crate::log::{self, LogFormat, Severity};
use crate::manager::Manager;

/// Exit status for `--help`, matching a usage error.
const HELP_EXIT_CODE: u8 = 2;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about = "A lightweight process supervisor.",
    long_about = None,
    disable_help_flag = true
)]
struct Arguments {
    /// Bootstrap files declaring the services to run, merged in order.
    #[arg(short = 'f', long = "files", default_value = DEFAULT_BOOTSTRAP_FILE)]
    files: Vec<PathBuf>,
    /// Log output format; detected from stderr by default.
    #[arg(long = "log-format", value_enum)]
    log_format: Option<LogFormat>,
    /// Minimum severity to log.
    #[arg(long = "log-level", value_enum, default_value_t = Severity::Info)]
    log_level: Severity,
    /// Print help.
    #[arg(short = 'h', long = "help", action = clap::ArgAction::SetTrue)]
    help: bool,
}

pub fn main() -> ExitCode {
    let arguments = Arguments::parse();
    if arguments.help {
        eprintln!("{}", Arguments::command().render_help());
        return ExitCode::from(HELP_EXIT_CODE);
    }
    log::configure(arguments.log_format, arguments.log_level);

    let bootstrap = match Bootstrap::load(&arguments.files) {
        Ok(bootstrap) => bootstrap,
        Err(error) => {
            log::fatal!(event = "LOAD", files = arguments.files, error);
            return ExitCode::FAILURE;
        }
    };

    let manager = Manager::new();
    let services = bootstrap.apply(&manager);
    log::info!(event = "APPLY", services);

    match manager.run(&Context::new()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(errors) => {
            for error in &errors {
                log::error!(event = "SHUTDOWN", service = error.service(), error);
            }
            ExitCode::FAILURE
        }
    }
}
