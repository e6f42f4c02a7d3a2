// ── Deployer ──
//
// Asks the controller to converge committed configuration onto the
// switches. Each request is tracked as a job moving
// Requested → Sent → Acked | Rejected. The timeout given here bounds the
// HTTP call only; convergence is observed by the status poller. Every
// call also races the run's cancellation token.

use std::collections::BTreeSet;
use std::time::Duration;

use fabricctl_api::{ApiRequest, Session};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cancel::or_cancelled;
use crate::error::CoreError;
use crate::inventory::Inventory;
use crate::model::{OutcomeSet, UnitKey, VpcPeer};

const SWITCH_DEPLOY_ERRORS: [(u16, &str); 2] = [
    (400, "Invalid value supplied"),
    (500, "Invalid payload or any other internal server error"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeployState {
    Requested,
    Sent,
    Acked,
    Rejected,
}

/// What one deploy request covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeployTarget {
    Interfaces { units: Vec<UnitKey> },
    Switch { serial_number: String, fabric: String },
    Policies { policy_ids: Vec<String> },
}

/// One deploy request and where it ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployJob {
    pub target: DeployTarget,
    pub state: DeployState,
    /// Switches this job is accountable for, VPC peers included.
    pub serials: BTreeSet<String>,
    pub error: Option<String>,
}

impl DeployJob {
    fn new(target: DeployTarget, serials: BTreeSet<String>) -> Self {
        Self {
            target,
            state: DeployState::Requested,
            serials,
            error: None,
        }
    }

    fn mark_sent(&mut self) {
        debug_assert_eq!(self.state, DeployState::Requested);
        self.state = DeployState::Sent;
    }

    fn finish(&mut self, result: Result<(), CoreError>) -> Result<(), CoreError> {
        debug_assert_eq!(self.state, DeployState::Sent);
        match result {
            Ok(()) => {
                self.state = DeployState::Acked;
                Ok(())
            }
            // Interrupted: what the controller did with it is unknown.
            Err(CoreError::Cancelled) => {
                warn!(target = ?self.target, "deploy interrupted");
                self.state = DeployState::Rejected;
                self.error = Some(CoreError::Cancelled.to_string());
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                self.state = DeployState::Rejected;
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, target = ?self.target, "deploy rejected");
                self.state = DeployState::Rejected;
                self.error = Some(e.to_string());
                Ok(())
            }
        }
    }

    pub fn is_acked(&self) -> bool {
        self.state == DeployState::Acked
    }
}

/// Jobs issued by one deploy call, with a per-switch outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    pub jobs: Vec<DeployJob>,
    pub outcome: OutcomeSet<String>,
}

impl DeployReport {
    fn push(&mut self, job: DeployJob) {
        for serial in &job.serials {
            if job.is_acked() {
                self.outcome.record_success(serial.clone());
            } else {
                self.outcome.record_failure(serial.clone());
            }
        }
        self.jobs.push(job);
    }

    pub fn acked_serials(&self) -> BTreeSet<String> {
        self.outcome.success().clone()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Deployer<'a> {
    session: &'a Session,
}

impl<'a> Deployer<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// One `POST /globalInterface/deploy` for every unit.
    pub async fn deploy_interface_scoped(
        &self,
        units: &[UnitKey],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<DeployReport, CoreError> {
        let mut report = DeployReport::default();
        if units.is_empty() || cancel.is_cancelled() {
            return Ok(report);
        }

        let serials = units.iter().map(|u| u.serial_number.clone()).collect();
        let body: Vec<_> = units
            .iter()
            .map(|u| json!({"serialNumber": u.serial_number, "ifName": u.unit_name}))
            .collect();
        let mut job = DeployJob::new(
            DeployTarget::Interfaces {
                units: units.to_vec(),
            },
            serials,
        );

        info!(units = units.len(), "deploying interfaces");
        let request = ApiRequest::post("/globalInterface/deploy")
            .json(json!(body))
            .timeout(timeout);
        job.mark_sent();
        let result = or_cancelled(cancel, self.session.request(request)).await.map(drop);
        job.finish(result)?;

        report.push(job);
        Ok(report)
    }

    /// One config-deploy per switch. When both members of a VPC pair are
    /// targeted, only the first is sent and the job covers both.
    pub async fn deploy_switch_scoped(
        &self,
        serials: &BTreeSet<String>,
        inventory: &Inventory,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<DeployReport, CoreError> {
        let mut report = DeployReport::default();
        let mut covered = BTreeSet::new();

        for serial in serials {
            if cancel.is_cancelled() {
                warn!(remaining = serials.len() - covered.len(), "switch deploy cancelled");
                break;
            }
            if covered.contains(serial) {
                debug!(%serial, "already deployed through its vpc peer");
                continue;
            }
            let record = inventory.switch(serial)?;
            let mut job_serials = BTreeSet::from([serial.clone()]);
            match &record.peer {
                VpcPeer::Paired(peer) if serials.contains(peer) => {
                    job_serials.insert(peer.clone());
                }
                VpcPeer::Unchecked if serials.len() > 1 => {
                    warn!(%serial, "vpc peer unknown; deploying switch on its own");
                }
                _ => {}
            }
            covered.extend(job_serials.iter().cloned());

            let mut job = DeployJob::new(
                DeployTarget::Switch {
                    serial_number: serial.clone(),
                    fabric: record.fabric_name.clone(),
                },
                job_serials,
            );
            info!(%serial, fabric = %record.fabric_name, "deploying switch config");
            let mut request = ApiRequest::post(format!(
                "/control/fabrics/{}/config-deploy/{serial}",
                record.fabric_name
            ))
            .timeout(timeout);
            for (status, message) in SWITCH_DEPLOY_ERRORS {
                request = request.expect_error(status, message);
            }
            job.mark_sent();
            let result = or_cancelled(cancel, self.session.request(request)).await.map(drop);
            job.finish(result)?;
            report.push(job);
        }
        Ok(report)
    }

    /// `POST /control/policies/deploy` with the given ids.
    pub async fn deploy_policies(
        &self,
        policy_ids: &[String],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<DeployJob, CoreError> {
        let mut job = DeployJob::new(
            DeployTarget::Policies {
                policy_ids: policy_ids.to_vec(),
            },
            BTreeSet::new(),
        );
        if policy_ids.is_empty() {
            job.mark_sent();
            job.finish(Ok(()))?;
            return Ok(job);
        }

        info!(count = policy_ids.len(), "deploying policies");
        let request = ApiRequest::post("/control/policies/deploy")
            .json(json!(policy_ids))
            .timeout(timeout);
        job.mark_sent();
        let result = or_cancelled(cancel, self.session.request(request)).await.map(drop);
        job.finish(result)?;
        Ok(job)
    }
}
