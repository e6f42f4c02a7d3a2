//! Shared helpers for command handlers.

use std::collections::BTreeSet;
use std::future::Future;

use fabricctl_api::Session;
use fabricctl_core::{DeployMode, Inventory, RunOptions, RunReport, WaitOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cli::{DeployOpts, OptionalSelection, SwitchSelection};
use crate::config::Resolved;
use crate::error::CliError;
use crate::files;
use crate::prompt::TerminalPrompt;

/// Serials named on the command line. `None` means every switch.
pub fn selection(sel: &SwitchSelection) -> Result<Option<BTreeSet<String>>, CliError> {
    if sel.all {
        return Ok(None);
    }
    serials(&sel.serials, sel.serials_file.as_deref()).map(Some)
}

/// Like [`selection`], but nothing given means every switch.
pub fn optional_selection(sel: &OptionalSelection) -> Result<Option<BTreeSet<String>>, CliError> {
    if sel.serials.is_empty() && sel.serials_file.is_none() {
        return Ok(None);
    }
    serials(&sel.serials, sel.serials_file.as_deref()).map(Some)
}

fn serials(
    listed: &[String],
    file: Option<&std::path::Path>,
) -> Result<BTreeSet<String>, CliError> {
    let mut out: BTreeSet<String> = listed
        .iter()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect();
    if let Some(path) = file {
        out.extend(files::read_serials(path)?);
    }
    if out.is_empty() {
        return Err(CliError::validation("serials", "no serial numbers given"));
    }
    Ok(out)
}

/// Log in with the resolved profile, re-prompting on the terminal.
pub async fn connect(resolved: &Resolved) -> Result<Session, CliError> {
    debug!(profile = %resolved.profile_name, url = %resolved.controller.url, "connecting");
    let prompt = TerminalPrompt::new(resolved.controller.username.clone());
    Ok(resolved.controller.connect(prompt).await?)
}

/// Discover the selected switches; an empty result is a usage error.
pub async fn discover(
    session: &Session,
    serials: Option<&BTreeSet<String>>,
) -> Result<Inventory, CliError> {
    let mut inventory = Inventory::new();
    inventory.discover(session, serials).await?;
    if inventory.is_empty() {
        return Err(CliError::validation(
            "serials",
            "the controller returned no switches for this selection",
        ));
    }
    Ok(inventory)
}

/// Await `body`, then log out whether it succeeded or not.
pub async fn with_logout<T>(
    session: &Session,
    body: impl Future<Output = Result<T, CliError>>,
) -> Result<T, CliError> {
    let result = body.await;
    if let Err(e) = session.logout().await {
        warn!(error = %e, "logout failed");
    }
    result
}

/// Token cancelled on the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            child.cancel();
        }
    });
    token
}

/// Apply deploy flags over the profile's options. Dry runs never wait or
/// verify, since nothing reached the switches.
pub fn run_options(mut options: RunOptions, opts: &DeployOpts, dry_run: bool) -> RunOptions {
    if opts.switch_deploy {
        options.deploy_mode = DeployMode::Switch;
    }
    if let Some(timeout) = opts.timeout {
        options.status_timeout = timeout;
    }
    if let Some(timeout) = opts.deploy_timeout {
        options.deploy_timeout = timeout;
    }
    if let Some(interval) = opts.interval {
        options.status_interval = interval;
    }
    if let Some(status) = &opts.desired_status {
        options.desired_status.clone_from(status);
    }
    options.wait = !opts.no_wait && !dry_run;
    options.verify = !opts.no_verify && !dry_run;
    options
}

/// Turn an unclean report into the matching exit error. An interrupted
/// run exits as interrupted even if nothing it sent failed.
pub fn check_report(report: &RunReport) -> Result<(), CliError> {
    if report.cancelled {
        return Err(CliError::Cancelled);
    }
    if report.is_clean() {
        return Ok(());
    }
    let timed_out_only = report.failed_units().is_empty()
        && report.failed_policies().is_empty()
        && report.deploy.outcome.is_clean();
    if let (true, Some(WaitOutcome::TimedOut(pending))) = (timed_out_only, &report.wait) {
        return Err(CliError::Timeout {
            pending: pending
                .iter()
                .map(|(serial, status)| format!("{serial} ({status})"))
                .collect::<Vec<_>>()
                .join(", "),
        });
    }
    Err(CliError::PartialFailure {
        summary: format!(
            "{} interface(s), {} switch(es) and {} policy record(s) failed",
            report.failed_units().len(),
            report.failed_serials().len(),
            report.failed_policies().len()
        ),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use fabricctl_core::{DeployReport, OutcomeSet, UnitKey};

    use super::*;

    fn deploy_opts() -> DeployOpts {
        DeployOpts {
            deploy: true,
            switch_deploy: true,
            timeout: Some(Duration::from_secs(30)),
            deploy_timeout: Some(Duration::from_secs(45)),
            interval: None,
            desired_status: None,
            no_wait: false,
            no_verify: false,
        }
    }

    fn report() -> RunReport {
        RunReport {
            started_at: chrono::Utc::now(),
            finished_at: chrono::Utc::now(),
            deleted_policies: OutcomeSet::new(),
            recreated_policies: OutcomeSet::new(),
            push: OutcomeSet::new(),
            deploy: DeployReport::default(),
            policy_deploy: None,
            wait: None,
            verify: None,
            cancelled: false,
        }
    }

    #[test]
    fn flags_override_profile_options() {
        let options = run_options(RunOptions::default(), &deploy_opts(), false);
        assert_eq!(options.deploy_mode, DeployMode::Switch);
        assert_eq!(options.status_timeout, Duration::from_secs(30));
        assert_eq!(options.deploy_timeout, Duration::from_secs(45));
        assert!(options.wait && options.verify);

        let dry = run_options(RunOptions::default(), &deploy_opts(), true);
        assert!(!dry.wait && !dry.verify);
    }

    #[test]
    fn selection_merges_flags_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("serials.txt");
        std::fs::write(&path, "SN2\nSN3\n").unwrap();
        let sel = SwitchSelection {
            serials: vec!["SN1".into()],
            serials_file: Some(path),
            all: false,
        };
        assert_eq!(selection(&sel).unwrap().unwrap().len(), 3);

        let all = SwitchSelection {
            serials: Vec::new(),
            serials_file: None,
            all: true,
        };
        assert!(selection(&all).unwrap().is_none());
    }

    #[test]
    fn timeout_alone_maps_to_timeout() {
        let mut r = report();
        r.wait = Some(WaitOutcome::TimedOut(BTreeMap::from([(
            "SN1".to_owned(),
            "Pending".to_owned(),
        )])));
        let err = check_report(&r).unwrap_err();
        assert!(matches!(err, CliError::Timeout { ref pending } if pending == "SN1 (Pending)"));
        assert_eq!(err.exit_code(), crate::error::exit_code::TIMEOUT);

        r.push.record_failure(UnitKey::new("Ethernet1/1", "SN1"));
        let err = check_report(&r).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::exit_code::PARTIAL);

        assert!(check_report(&report()).is_ok());
    }

    #[test]
    fn interrupted_run_exits_as_cancelled() {
        let mut r = report();
        r.push.record_success(UnitKey::new("Ethernet1/1", "SN1"));
        r.cancelled = true;
        let err = check_report(&r).unwrap_err();
        assert!(matches!(err, CliError::Cancelled));
        assert_eq!(err.exit_code(), crate::error::exit_code::INTERRUPTED);
    }
}
