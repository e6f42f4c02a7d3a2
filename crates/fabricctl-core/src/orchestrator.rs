// ── Orchestrator ──
//
// Drives one change set through delete-superseded → push → deploy →
// wait → verify, and replays a snapshot the same way for rollback.
// Stages run strictly in that order; later stages only see the units the
// earlier ones succeeded on. Cancellation stops the stage in flight and
// hands back what was done so far, flagged as cancelled.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fabricctl_api::Session;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::deployer::{DeployJob, DeployReport, DeployState, DeployTarget, Deployer};
use crate::error::CoreError;
use crate::inventory::Inventory;
use crate::model::{ChangeSet, OutcomeSet, PolicyRecord, Snapshot, UnitKey};
use crate::policy_store::PolicyStore;
use crate::progress::ProgressSink;
use crate::pusher::Pusher;
use crate::status::{HttpStatusSource, StatusPoller, WaitOutcome};
use crate::verify::{self, VerifyReport};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeployMode {
    /// One `globalInterface/deploy` for the pushed interfaces.
    #[default]
    Interface,
    /// One config-deploy per switch, VPC peers deduplicated.
    Switch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub deploy_mode: DeployMode,
    /// HTTP timeout for deploy requests.
    pub deploy_timeout: Duration,
    pub desired_status: String,
    pub status_timeout: Duration,
    pub status_interval: Duration,
    pub wait: bool,
    pub verify: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            deploy_mode: DeployMode::Interface,
            deploy_timeout: Duration::from_secs(300),
            desired_status: "In-Sync".into(),
            status_timeout: Duration::from_secs(300),
            status_interval: Duration::from_secs(10),
            wait: true,
            verify: true,
        }
    }
}

/// Everything one run did, stage by stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub deleted_policies: OutcomeSet<String>,
    pub recreated_policies: OutcomeSet<String>,
    pub push: OutcomeSet<UnitKey>,
    pub deploy: DeployReport,
    pub policy_deploy: Option<DeployJob>,
    pub wait: Option<WaitOutcome>,
    pub verify: Option<VerifyReport>,
    /// The run stopped early; stages after the interrupted one never ran.
    pub cancelled: bool,
}

impl RunReport {
    fn started() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
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

    /// Units that failed push or verification.
    pub fn failed_units(&self) -> BTreeSet<UnitKey> {
        let mut failed = self.push.failure().clone();
        if let Some(verify) = &self.verify {
            failed.extend(verify.outcome.failure().iter().cloned());
        }
        failed
    }

    /// Switches whose deploy was rejected or that never reached the
    /// desired status.
    pub fn failed_serials(&self) -> BTreeSet<String> {
        let mut failed = self.deploy.outcome.failure().clone();
        if let Some(WaitOutcome::TimedOut(pending)) = &self.wait {
            failed.extend(pending.keys().cloned());
        }
        failed
    }

    /// Policy ids whose delete, recreation or deploy failed.
    pub fn failed_policies(&self) -> BTreeSet<String> {
        let mut failed = self.deleted_policies.failure().clone();
        failed.extend(self.recreated_policies.failure().iter().cloned());
        if let Some(DeployJob {
            target: DeployTarget::Policies { policy_ids },
            state: DeployState::Rejected,
            ..
        }) = &self.policy_deploy
        {
            failed.extend(policy_ids.iter().cloned());
        }
        failed
    }

    pub fn is_clean(&self) -> bool {
        !self.cancelled
            && self.failed_units().is_empty()
            && self.failed_serials().is_empty()
            && self.failed_policies().is_empty()
    }
}

#[derive(Debug)]
pub struct Orchestrator<'a> {
    session: &'a Session,
    inventory: &'a Inventory,
    options: RunOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(session: &'a Session, inventory: &'a Inventory, options: RunOptions) -> Self {
        Self {
            session,
            inventory,
            options,
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Apply a change set.
    ///
    /// `superseded` policies are deleted before the push. If any of them
    /// were deleted and a unit on the same switch then failed to push, the
    /// run stops with [`CoreError::PolicyConsistency`] before deploying
    /// anything, cancelled or not.
    ///
    /// A cancelled run returns the partial report with `cancelled` set.
    pub async fn run(
        &self,
        changes: &ChangeSet,
        superseded: &[PolicyRecord],
        cancel: &CancellationToken,
        progress: &mut dyn ProgressSink,
    ) -> Result<RunReport, CoreError> {
        let mut report = RunReport::started();
        info!(units = changes.len(), superseded = superseded.len(), "starting run");
        let result = self
            .run_stages(changes, superseded, &mut report, cancel, progress)
            .await;
        settle(result, report, progress)
    }

    async fn run_stages(
        &self,
        changes: &ChangeSet,
        superseded: &[PolicyRecord],
        report: &mut RunReport,
        cancel: &CancellationToken,
        progress: &mut dyn ProgressSink,
    ) -> Result<(), CoreError> {
        if !superseded.is_empty() {
            check_cancel(cancel)?;
            progress.stage("deleting superseded policies");
            let ids: Vec<String> = superseded.iter().map(|p| p.policy_id.clone()).collect();
            report.deleted_policies =
                PolicyStore::delete_policies(self.session, &ids, cancel).await?;
        }

        check_cancel(cancel)?;
        progress.stage("pushing changes");
        report.push = Pusher::new(self.session).apply(changes, cancel).await?;

        check_consistency(superseded, &report.deleted_policies, changes, &report.push)?;
        check_cancel(cancel)?;

        self.deploy_wait_verify(changes, BTreeSet::new(), report, cancel, progress)
            .await
    }

    /// Replay a snapshot: recreate the policies the original run deleted,
    /// push the original payloads, and deploy both.
    pub async fn rollback(
        &self,
        snapshot: &Snapshot,
        cancel: &CancellationToken,
        progress: &mut dyn ProgressSink,
    ) -> Result<RunReport, CoreError> {
        let unknown: Vec<String> = snapshot
            .serials()
            .into_iter()
            .filter(|s| !self.inventory.contains(s))
            .collect();
        if !unknown.is_empty() {
            return Err(CoreError::Snapshot {
                message: format!("switch(es) not in inventory: {}", unknown.join(", ")),
            });
        }

        let mut report = RunReport::started();
        info!(
            units = snapshot.len(),
            policies = snapshot.superseded_policies().len(),
            "starting rollback"
        );
        let result = self
            .rollback_stages(snapshot, &mut report, cancel, progress)
            .await;
        settle(result, report, progress)
    }

    async fn rollback_stages(
        &self,
        snapshot: &Snapshot,
        report: &mut RunReport,
        cancel: &CancellationToken,
        progress: &mut dyn ProgressSink,
    ) -> Result<(), CoreError> {
        let changes = ChangeSet::from_snapshot(snapshot);
        let policies = snapshot.superseded_policies();

        if !policies.is_empty() {
            check_cancel(cancel)?;
            progress.stage("recreating policies");
            report.recreated_policies =
                PolicyStore::recreate_policies(self.session, policies, cancel).await?;
        }

        check_cancel(cancel)?;
        progress.stage("pushing original configuration");
        report.push = Pusher::new(self.session).apply(&changes, cancel).await?;
        check_cancel(cancel)?;

        let recreated: Vec<&PolicyRecord> = policies
            .iter()
            .filter(|p| report.recreated_policies.is_success(&p.policy_id))
            .collect();

        if self.options.deploy_mode == DeployMode::Interface && !recreated.is_empty() {
            progress.stage("deploying recreated policies");
            let ids: Vec<String> = recreated.iter().map(|p| p.policy_id.clone()).collect();
            let job = Deployer::new(self.session)
                .deploy_policies(&ids, self.options.deploy_timeout, cancel)
                .await?;
            report.policy_deploy = Some(job);
            check_cancel(cancel)?;
        }

        let extra_serials = recreated.iter().map(|p| p.serial_number.clone()).collect();
        self.deploy_wait_verify(&changes, extra_serials, report, cancel, progress)
            .await
    }

    /// `extra_serials` are switches to deploy in switch mode even without
    /// a pushed unit on them.
    async fn deploy_wait_verify(
        &self,
        changes: &ChangeSet,
        extra_serials: BTreeSet<String>,
        report: &mut RunReport,
        cancel: &CancellationToken,
        progress: &mut dyn ProgressSink,
    ) -> Result<(), CoreError> {
        let pushed: Vec<UnitKey> = report.push.success().iter().cloned().collect();
        let deployer = Deployer::new(self.session);

        progress.stage("deploying");
        report.deploy = match self.options.deploy_mode {
            DeployMode::Interface => {
                deployer
                    .deploy_interface_scoped(&pushed, self.options.deploy_timeout, cancel)
                    .await?
            }
            DeployMode::Switch => {
                let mut serials: BTreeSet<String> =
                    pushed.iter().map(|k| k.serial_number.clone()).collect();
                serials.extend(extra_serials);
                deployer
                    .deploy_switch_scoped(
                        &serials,
                        self.inventory,
                        self.options.deploy_timeout,
                        cancel,
                    )
                    .await?
            }
        };
        check_cancel(cancel)?;

        let acked = report.deploy.acked_serials();
        if self.options.wait && !acked.is_empty() {
            progress.stage("waiting for switch status");
            let source = HttpStatusSource::new(self.session);
            let mut poller = StatusPoller::new(source, self.inventory);
            let outcome = poller
                .wait_for_status(
                    &acked,
                    &self.options.desired_status,
                    self.options.status_timeout,
                    self.options.status_interval,
                    cancel,
                    progress,
                )
                .await?;
            report.wait = Some(outcome);
        }

        if self.options.verify && !changes.is_empty() {
            progress.stage("verifying");
            report.verify =
                Some(verify::verify(self.session, self.inventory, changes, cancel).await?);
        }
        Ok(())
    }
}

fn check_cancel(cancel: &CancellationToken) -> Result<(), CoreError> {
    if cancel.is_cancelled() {
        return Err(CoreError::Cancelled);
    }
    Ok(())
}

/// Close a run: a cancellation becomes a flagged report, any other error
/// is returned as is.
fn settle(
    result: Result<(), CoreError>,
    mut report: RunReport,
    progress: &mut dyn ProgressSink,
) -> Result<RunReport, CoreError> {
    match result {
        Ok(()) => {}
        Err(CoreError::Cancelled) => {
            warn!("run cancelled");
            report.cancelled = true;
        }
        Err(e) => {
            progress.finish();
            return Err(e);
        }
    }
    Ok(finish(report, progress))
}

/// A deleted policy is only safe if every unit on its switch was pushed.
/// Units a cancelled push never sent count as not pushed.
fn check_consistency(
    superseded: &[PolicyRecord],
    deleted: &OutcomeSet<String>,
    changes: &ChangeSet,
    push: &OutcomeSet<UnitKey>,
) -> Result<(), CoreError> {
    let unpushed: Vec<&UnitKey> = changes.keys().filter(|k| !push.is_success(k)).collect();
    let failed_serials: BTreeSet<&str> = unpushed
        .iter()
        .map(|k| k.serial_number.as_str())
        .collect();

    let deleted_policies: Vec<String> = superseded
        .iter()
        .filter(|p| deleted.is_success(&p.policy_id))
        .filter(|p| failed_serials.contains(p.serial_number.as_str()))
        .map(|p| p.policy_id.clone())
        .collect();
    if deleted_policies.is_empty() {
        return Ok(());
    }

    let affected: BTreeSet<&str> = superseded
        .iter()
        .filter(|p| deleted_policies.contains(&p.policy_id))
        .map(|p| p.serial_number.as_str())
        .collect();
    let failed_units: Vec<UnitKey> = unpushed
        .into_iter()
        .filter(|k| affected.contains(k.serial_number.as_str()))
        .cloned()
        .collect();

    error!(
        policies = %deleted_policies.join(", "),
        units = failed_units.len(),
        "superseded policies deleted but replacement push failed; manual reconciliation required"
    );
    Err(CoreError::PolicyConsistency {
        deleted_policies,
        failed_units,
    })
}

fn finish(mut report: RunReport, progress: &mut dyn ProgressSink) -> RunReport {
    report.finished_at = Utc::now();
    progress.finish();
    if report.is_clean() {
        info!("run completed cleanly");
    } else {
        warn!(
            units = report.failed_units().len(),
            switches = report.failed_serials().len(),
            policies = report.failed_policies().len(),
            "run completed with failures"
        );
    }
    report
}
