//! plspec: run a stored-procedure test suite, optionally with line coverage
//!
//! ## Usage
//!
//! ```bash
//! plspec run -- rspec                              # just run the tests
//! plspec run --coverage -- rspec                   # reports in ./coverage
//! plspec run --coverage out --like 'HR.PAY%' -- make test
//! plspec objects --ignore-schemas SYS,SYSTEM       # what would be measured
//! plspec restore --coverage out                    # after a crash
//! ```

use clap::Parser;
use plspec_cli::{
    handlers, logging, Cli, CliConfig, CliResult, ColorChoice, Commands, ExitStatus, Verbosity,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = build_config(&cli);
    logging::init(config.verbosity, config.color.should_color());

    match run(&config, &cli.command) {
        Ok(status) => status.into(),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitStatus::Fatal.into()
        }
    }
}

fn run(config: &CliConfig, command: &Commands) -> CliResult<ExitStatus> {
    match command {
        Commands::Run(args) => handlers::execute_run(config, args),
        Commands::Objects(args) => handlers::execute_objects(config, args),
        Commands::Restore(args) => handlers::execute_restore(config, args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };

    let color: ColorChoice = cli.color.clone().into();

    CliConfig::new().with_verbosity(verbosity).with_color(color)
}
