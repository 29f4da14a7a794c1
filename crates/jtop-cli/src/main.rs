//! jtop - terminal dashboard for Jetson board telemetry.

mod commands;
mod tui;

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser)]
#[command(name = "jtop")]
#[command(about = "jtop - system monitoring utility for Jetson boards that runs on the terminal")]
#[command(version = jtop_core::VERSION)]
struct Cli {
    /// Refresh interval in milliseconds
    #[arg(short = 'r', long = "refresh", default_value_t = 500, value_parser = clap::value_parser!(u64).range(1..))]
    refresh: u64,

    /// Stream JSON snapshots to stdout instead of opening the dashboard
    #[arg(long)]
    server: bool,

    /// Server port
    #[arg(short = 'p', long = "port", default_value_t = 5555)]
    port: u16,

    /// Write a debug log to jtop.log in the working directory
    #[arg(long)]
    debug: bool,

    /// Page to open first (0 = ALL, 1 = GPU, 2 = INFO)
    #[arg(long, default_value_t = 0)]
    page: usize,

    /// Telemetry producer executable
    #[arg(long, default_value = jtop_core::reader::DEFAULT_PROGRAM)]
    tegrastats: String,

    /// Shell file defining the board's JETSON_ variables
    #[arg(long, default_value = jtop_core::DEFAULT_VARIABLES_FILE)]
    variables: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let code = commands::run(commands::RunConfig {
        refresh: Duration::from_millis(cli.refresh),
        page: cli.page,
        server: cli.server,
        port: cli.port,
        tegrastats: &cli.tegrastats,
        variables: &cli.variables,
    });
    std::process::exit(code);
}

/// `--debug` logs everything to a fresh jtop.log; otherwise RUST_LOG decides,
/// defaulting to errors only so the dashboard is not disturbed.
fn init_logging(debug: bool) {
    if debug {
        match File::create("jtop.log") {
            Ok(file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .format(|buf, record| {
                        writeln!(buf, "{} - {} - {}", record.target(), record.level(), record.args())
                    })
                    .target(env_logger::Target::Pipe(Box::new(file)))
                    .init();
                return;
            }
            Err(e) => eprintln!("Warning: cannot create jtop.log: {e}"),
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error")).init();
}
