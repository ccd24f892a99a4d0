use clap::Parser;

use e2e_ai_tests::cli_args::{Cli, Commands};
use e2e_ai_tests::cli_dispatch::{handle_list_command, handle_run_command, init_tracing};
use e2e_ai_tests::report::RunExit;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let debug = matches!(&cli.command, Commands::Run(args) if args.debug);
    init_tracing(debug);

    let workdir = match cli.workdir.clone().map(Ok).unwrap_or_else(std::env::current_dir) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Error: cannot determine working directory: {e}");
            std::process::exit(RunExit::SetupError.code());
        }
    };

    let exit = match &cli.command {
        Commands::Run(args) => handle_run_command(args, &workdir).await,
        Commands::List(args) => handle_list_command(args, &workdir),
    };
    std::process::exit(exit.code());
}
