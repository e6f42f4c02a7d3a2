//! `fabricctl status`: per-switch status, optionally waiting for a target.

use std::collections::BTreeSet;

use fabricctl_api::Session;
use fabricctl_core::status::UNKNOWN_STATUS;
use fabricctl_core::{HttpStatusSource, StatusPoller, StatusSource, WaitOutcome};

use super::util;
use crate::cli::{GlobalOpts, StatusArgs};
use crate::config;
use crate::error::CliError;
use crate::output::{self, SwitchStatus};
use crate::progress;

pub async fn handle(args: StatusArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve(global)?;
    let serials = util::optional_selection(&args.selection)?;
    let session = util::connect(&resolved).await?;
    util::with_logout(&session, show(&session, serials.as_ref(), &args, global)).await
}

async fn show(
    session: &Session,
    serials: Option<&BTreeSet<String>>,
    args: &StatusArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let inventory = util::discover(session, serials).await?;

    if let Some(desired) = &args.wait_for {
        let cancel = util::cancel_on_ctrl_c();
        let mut spinner = progress::sink(global.quiet);
        let mut poller = StatusPoller::new(HttpStatusSource::new(session), &inventory);
        let outcome = poller
            .wait_for_status(
                &inventory.serials(),
                desired,
                args.timeout,
                args.interval,
                &cancel,
                spinner.as_mut(),
            )
            .await?;
        spinner.finish();
        if let WaitOutcome::TimedOut(pending) = outcome {
            let rows: Vec<SwitchStatus> = pending
                .into_iter()
                .map(|(serial, status)| SwitchStatus {
                    fabric_name: inventory.fabric_of(&serial).unwrap_or_default(),
                    serial_number: serial,
                    status,
                })
                .collect();
            let out = output::render_list(&global.output, &rows, output::status_row, |s| {
                s.serial_number.clone()
            })?;
            output::print_output(&out, global.quiet);
            return Err(CliError::Timeout {
                pending: rows
                    .iter()
                    .map(|s| s.serial_number.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
    }

    let fabrics: BTreeSet<String> = inventory
        .switches()
        .into_iter()
        .map(|s| s.fabric_name)
        .collect();
    let mut source = HttpStatusSource::new(session);
    let statuses = source.fetch_status(&fabrics).await?;

    let rows: Vec<SwitchStatus> = inventory
        .switches()
        .into_iter()
        .map(|s| SwitchStatus {
            status: statuses
                .get(&s.serial_number)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_STATUS.to_owned()),
            serial_number: s.serial_number,
            fabric_name: s.fabric_name,
        })
        .collect();
    let out = output::render_list(&global.output, &rows, output::status_row, |s| {
        format!("{}\t{}", s.serial_number, s.status)
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
