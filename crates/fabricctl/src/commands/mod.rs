//! Command dispatch: bridges CLI args -> core pipeline -> output formatting.

pub mod apply;
pub mod config_cmd;
pub mod policies;
pub mod rollback;
pub mod status;
pub mod switches;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a controller-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Apply(args) => apply::handle(args, global).await,
        Command::Rollback(args) => rollback::handle(args, global).await,
        Command::Switches(args) => switches::handle(args, global).await,
        Command::Policies(args) => policies::handle(args, global).await,
        Command::Status(args) => status::handle(args, global).await,
        Command::Config(args) => config_cmd::handle(args, global),
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = crate::cli::Cli::command();
            generate(args.shell, &mut cmd, "fabricctl", &mut std::io::stdout());
            Ok(())
        }
    }
}
