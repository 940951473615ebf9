use clap::Parser;
use hybrid_submit::core::error::SubmitError;
use std::process::ExitCode;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::HSubmit::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::from(args.verbose).into())
                .from_env_lossy(),
        )
        .init();

    match commands::handle_commands(args.settings.as_ref(), args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

fn report(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<SubmitError>() {
        Some(submit_err) if submit_err.is_operational() => {
            eprintln!("ERROR: {submit_err}");
            ExitCode::from(2)
        }
        _ => {
            eprintln!("UNEXPECTED ERROR: {err:#}");
            ExitCode::from(1)
        }
    }
}
