use clap::Parser;
use flowtrader::cli::{Cli, init_tracing, run};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    run(cli)
}
