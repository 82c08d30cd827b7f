use crate::server;
use crate::submit::{print_forms, run_submit, SubmitArgs};
use clap::{Args, Parser, Subcommand};
use lead_intake::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Lead Intake",
    about = "Serve and exercise the brokerage lead capture forms",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print every configured form schema as JSON
    Forms,
    /// Run one submission against the configured relays
    Submit(SubmitArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Forms => print_forms(),
        Command::Submit(args) => run_submit(args).await,
    }
}
