use std::process::ExitCode;

use clap::Parser;
use movbar::cli::CliArgs;
use movbar::{AppError, Configuration, CoordinatorBuilder};
use tracing::{error, warn, Level};

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: CliArgs) -> Result<(), AppError> {
    let configuration = Configuration::load(&args)?;
    let report = CoordinatorBuilder::new(configuration)
        .build()?
        .run()
        .await?;

    println!("{}", report.summary());
    if !report.dead_letters.is_empty() {
        warn!(
            "{} frame(s) could not be analyzed and are missing from the barcode",
            report.dead_letters.len()
        );
    }
    if report.rejected_duplicates > 0 {
        warn!(
            "{} duplicate frame number(s) were ignored",
            report.rejected_duplicates
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_logging(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
