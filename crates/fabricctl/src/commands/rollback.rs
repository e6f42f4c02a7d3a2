//! `fabricctl rollback`: replay a snapshot written by `apply`.

use tracing::warn;

use fabricctl_core::{ChangeSet, DeployMode, Orchestrator};

use super::util;
use crate::cli::{GlobalOpts, RollbackArgs};
use crate::config;
use crate::error::CliError;
use crate::files::SnapshotFile;
use crate::output;
use crate::progress;

pub async fn handle(args: RollbackArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let file = SnapshotFile::read(&args.snapshot)?;
    let snapshot = file.snapshot;
    if snapshot.is_empty() {
        if !global.quiet {
            eprintln!("Snapshot is empty; nothing to restore.");
        }
        return Ok(());
    }

    let dry_run = !args.deploy.deploy;
    let mut resolved = config::resolve(global)?;
    resolved.controller.dry_run = dry_run;
    if resolved.controller.url.as_str() != file.controller {
        warn!(
            snapshot = %file.controller,
            controller = %resolved.controller.url,
            "snapshot was taken against a different controller URL"
        );
    }
    let options = util::run_options(resolved.options.clone(), &args.deploy, dry_run);

    let session = util::connect(&resolved).await?;
    util::with_logout(&session, async {
        let serials = snapshot.serials();
        let mut inventory = util::discover(&session, Some(&serials)).await?;
        if options.deploy_mode == DeployMode::Switch {
            inventory.resolve_peers(&session).await?;
        }

        if !global.quiet {
            let changes = ChangeSet::from_snapshot(&snapshot);
            eprintln!(
                "Restoring {} interface(s) and {} policy record(s) on {} switch(es){}",
                changes.len(),
                snapshot.superseded_policies().len(),
                serials.len(),
                if dry_run { " (dry run)" } else { "" }
            );
        }

        let cancel = util::cancel_on_ctrl_c();
        let orchestrator = Orchestrator::new(&session, &inventory, options);
        let mut spinner = progress::sink(global.quiet);
        let report = orchestrator
            .rollback(&snapshot, &cancel, spinner.as_mut())
            .await?;

        let color = output::should_color(&global.color);
        let out = output::render_single(
            &global.output,
            &report,
            |r| output::report_detail(r, color),
            output::report_failures,
        )?;
        output::print_output(&out, global.quiet);
        if dry_run && !global.quiet {
            eprintln!("Dry run; pass --deploy to restore the snapshot.");
        }

        util::check_report(&report)
    })
    .await
}
