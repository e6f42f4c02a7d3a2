//! `fabricctl switches`: inventory view.

use std::collections::BTreeSet;

use fabricctl_api::Session;

use super::util;
use crate::cli::{GlobalOpts, SwitchesArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

pub async fn handle(args: SwitchesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve(global)?;
    let serials = util::optional_selection(&args.selection)?;
    let session = util::connect(&resolved).await?;
    util::with_logout(&session, list(&session, serials.as_ref(), &args, global)).await
}

async fn list(
    session: &Session,
    serials: Option<&BTreeSet<String>>,
    args: &SwitchesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut inventory = util::discover(session, serials).await?;
    if args.peers {
        inventory.resolve_peers(session).await?;
    }
    if args.details {
        inventory.fetch_details(session).await?;
    }

    let switches = inventory.switches();
    let out = output::render_list(&global.output, &switches, output::switch_row, |s| {
        s.serial_number.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
