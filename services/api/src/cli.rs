use crate::demo::{run_demo, run_withdrawal_quote, DemoArgs, QuoteArgs};
use crate::server;
use agricred::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "AgriCred",
    about = "Run and demonstrate the AgriCred financing workflow engine",
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
    /// Stock withdrawal helpers
    Withdrawal {
        #[command(subcommand)]
        command: WithdrawalCommand,
    },
    /// Walk invoice, warehouse receipt and withdrawal flows against mock collaborators
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum WithdrawalCommand {
    /// Price a withdrawal from the configured warehouse tariff
    Quote(QuoteArgs),
}

#[derive(Args, Debug)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Simulated latency of the mock collaborators, in milliseconds
    #[arg(long, default_value_t = 1500)]
    pub(crate) mock_latency_ms: u64,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            mock_latency_ms: 1500,
        }
    }
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Withdrawal {
            command: WithdrawalCommand::Quote(args),
        } => run_withdrawal_quote(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
