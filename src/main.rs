use clap::Parser;
use flexi_logger::Logger;

use repo_assembler::cli::Args;
use repo_assembler::{run, run_freeze};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    Logger::try_with_env_or_str("info")
        .expect("invalid RUST_LOG value")
        .start()
        .expect("failed to start logger");

    let args = Args::parse();

    let result = match &args.freeze {
        Some(path) => run_freeze(&args, Some(path.as_path())).await,
        None => run(&args).await,
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:?}");
            std::process::ExitCode::FAILURE
        }
    }
}
