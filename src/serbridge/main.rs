use clap::Parser;
use run::{RunOptions, handle_run};
use serbridge::error::GatewayResult;

mod run;

#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
enum Cli {
    /// Expose a serial port over TCP
    #[command(name = "run", alias = "r")]
    Run(RunOptions),
}

fn main() -> GatewayResult<()> {
    let cli = Cli::parse();

    match cli {
        Cli::Run(opts) => {
            let level = if opts.verbose {
                tracing::Level::DEBUG
            } else {
                tracing::Level::INFO
            };
            tracing_subscriber::fmt().with_max_level(level).init();
            handle_run(opts)?
        }
    }

    Ok(())
}
