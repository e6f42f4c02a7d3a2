// ── Switch status polling ──
//
// Waits for deployed switches to report a desired status. Convergence
// delays are not errors: when the timeout passes, the caller gets the
// switches that are still off. Only a cycle in which no fabric returns
// any status at all raises.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;

use fabricctl_api::{ApiRequest, Session};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::inventory::Inventory;
use crate::progress::ProgressSink;

/// Reported for a target no status response mentions.
pub const UNKNOWN_STATUS: &str = "Unknown";

/// Where switch statuses come from.
pub trait StatusSource: Send {
    /// Current status per switch serial across `fabrics`.
    ///
    /// Must fail with [`CoreError::StatusUnavailable`] if none of the
    /// fabrics returned anything.
    fn fetch_status(
        &mut self,
        fabrics: &BTreeSet<String>,
    ) -> impl Future<Output = Result<BTreeMap<String, String>, CoreError>> + Send;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFabricAssociation {
    fabric_name: String,
    fabric_id: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSwitchStatus {
    entity_name: String,
    #[serde(default)]
    status: Option<String>,
}

/// Reads `/control/status` per fabric; fabric ids are fetched once.
#[derive(Debug)]
pub struct HttpStatusSource<'a> {
    session: &'a Session,
    fabric_ids: BTreeMap<String, String>,
    /// Fabrics the associations list did not name when last loaded.
    missing: BTreeSet<String>,
}

impl<'a> HttpStatusSource<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            fabric_ids: BTreeMap::new(),
            missing: BTreeSet::new(),
        }
    }

    async fn load_fabric_ids(&mut self) -> Result<(), CoreError> {
        debug!("fetching fabric associations");
        let wire: Vec<WireFabricAssociation> = self
            .session
            .request(ApiRequest::get("/control/fabrics/msd/fabric-associations"))
            .await?
            .data_or_default()?;
        self.fabric_ids = wire
            .into_iter()
            .map(|f| {
                let id = match f.fabric_id {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (f.fabric_name, id)
            })
            .collect();
        Ok(())
    }
}

impl StatusSource for HttpStatusSource<'_> {
    async fn fetch_status(
        &mut self,
        fabrics: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, String>, CoreError> {
        let unseen = |f: &String| !self.fabric_ids.contains_key(f) && !self.missing.contains(f);
        if fabrics.iter().any(unseen) {
            self.load_fabric_ids().await?;
            self.missing.extend(
                fabrics
                    .iter()
                    .filter(|f| !self.fabric_ids.contains_key(*f))
                    .cloned(),
            );
        }

        let mut statuses = BTreeMap::new();
        let mut answered = false;
        for fabric in fabrics {
            let Some(id) = self.fabric_ids.get(fabric) else {
                warn!(%fabric, "fabric has no id; skipping status");
                continue;
            };
            let request = ApiRequest::get("/control/status")
                .query("entityTypeFilter", "SWITCH")
                .query("fabricId", id.as_str());
            let wire: Vec<WireSwitchStatus> = match self.session.request(request).await {
                Ok(resp) => resp.data_or_default()?,
                Err(e) => {
                    let err = CoreError::from(e);
                    if err.is_fatal() {
                        return Err(err);
                    }
                    warn!(%fabric, error = %err, "status request failed");
                    continue;
                }
            };
            if wire.is_empty() {
                warn!(%fabric, "no statuses returned");
                continue;
            }
            answered = true;
            for entry in wire {
                statuses.insert(
                    entry.entity_name,
                    entry.status.unwrap_or_else(|| UNKNOWN_STATUS.to_owned()),
                );
            }
        }

        if !answered {
            return Err(CoreError::StatusUnavailable {
                fabrics: fabrics.iter().cloned().collect(),
            });
        }
        Ok(statuses)
    }
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "pending", rename_all = "snake_case")]
pub enum WaitOutcome {
    Reached,
    /// Targets still not at the desired status, with the last status seen.
    TimedOut(BTreeMap<String, String>),
}

impl WaitOutcome {
    pub fn is_reached(&self) -> bool {
        matches!(self, Self::Reached)
    }
}

#[derive(Debug)]
pub struct StatusPoller<S> {
    source: S,
    fabric_of: BTreeMap<String, String>,
}

impl<S: StatusSource> StatusPoller<S> {
    pub fn new(source: S, inventory: &Inventory) -> Self {
        Self {
            source,
            fabric_of: inventory
                .switches()
                .into_iter()
                .map(|s| (s.serial_number, s.fabric_name))
                .collect(),
        }
    }

    /// Poll until every target reports `desired`, `timeout` passes, or
    /// `cancel` fires.
    pub async fn wait_for_status(
        &mut self,
        targets: &BTreeSet<String>,
        desired: &str,
        timeout: Duration,
        interval: Duration,
        cancel: &CancellationToken,
        progress: &mut dyn ProgressSink,
    ) -> Result<WaitOutcome, CoreError> {
        if targets.is_empty() {
            return Ok(WaitOutcome::Reached);
        }
        let mut fabrics = BTreeSet::new();
        for serial in targets {
            let fabric = self.fabric_of.get(serial).ok_or_else(|| {
                CoreError::parameter(format!("unknown switch serial number '{serial}'"))
            })?;
            fabrics.insert(fabric.clone());
        }

        info!(targets = targets.len(), %desired, ?timeout, "waiting for switch status");
        let deadline = Instant::now() + timeout;

        loop {
            let observed = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CoreError::Cancelled),
                result = self.source.fetch_status(&fabrics) => result?,
            };

            let pending: BTreeMap<String, String> = targets
                .iter()
                .filter_map(|serial| {
                    let status = observed.get(serial).map_or(UNKNOWN_STATUS, String::as_str);
                    (status != desired).then(|| (serial.clone(), status.to_owned()))
                })
                .collect();

            if pending.is_empty() {
                info!("all switches reached {desired}");
                return Ok(WaitOutcome::Reached);
            }
            progress.tick(&format!(
                "{} of {} switch(es) at {desired}",
                targets.len() - pending.len(),
                targets.len()
            ));

            let now = Instant::now();
            if now >= deadline {
                warn!(pending = ?pending, "status wait timed out");
                return Ok(WaitOutcome::TimedOut(pending));
            }
            let nap = interval.min(deadline - now);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CoreError::Cancelled),
                () = tokio::time::sleep(nap) => {}
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{SwitchRecord, SwitchRole};

    /// S1 reaches In-Sync two seconds in; S2 never does.
    struct Scripted {
        start: Instant,
        calls: u32,
    }

    impl StatusSource for Scripted {
        async fn fetch_status(
            &mut self,
            _fabrics: &BTreeSet<String>,
        ) -> Result<BTreeMap<String, String>, CoreError> {
            self.calls += 1;
            let s1 = if self.start.elapsed() >= Duration::from_secs(2) {
                "In-Sync"
            } else {
                "Pending"
            };
            Ok(BTreeMap::from([
                ("S1".to_owned(), s1.to_owned()),
                ("S2".to_owned(), "Out-of-Sync".to_owned()),
            ]))
        }
    }

    struct Silent;

    impl StatusSource for Silent {
        async fn fetch_status(
            &mut self,
            fabrics: &BTreeSet<String>,
        ) -> Result<BTreeMap<String, String>, CoreError> {
            Err(CoreError::StatusUnavailable {
                fabrics: fabrics.iter().cloned().collect(),
            })
        }
    }

    fn inventory() -> Inventory {
        Inventory::from_records([
            SwitchRecord::new("S1", SwitchRole::Leaf, "site"),
            SwitchRecord::new("S2", SwitchRole::Leaf, "site"),
        ])
    }

    fn targets() -> BTreeSet<String> {
        BTreeSet::from(["S1".to_owned(), "S2".to_owned()])
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_with_lagging_switch() {
        let start = Instant::now();
        let source = Scripted { start, calls: 0 };
        let mut poller = StatusPoller::new(source, &inventory());

        let outcome = poller
            .wait_for_status(
                &targets(),
                "In-Sync",
                Duration::from_secs(5),
                Duration::from_secs(1),
                &CancellationToken::new(),
                &mut (),
            )
            .await
            .unwrap();

        let expected = BTreeMap::from([("S2".to_owned(), "Out-of-Sync".to_owned())]);
        assert_eq!(outcome, WaitOutcome::TimedOut(expected));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
        assert_eq!(poller.source.calls, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_as_soon_as_all_match() {
        let start = Instant::now();
        let mut poller = StatusPoller::new(Scripted { start, calls: 0 }, &inventory());
        let outcome = poller
            .wait_for_status(
                &BTreeSet::from(["S1".to_owned()]),
                "In-Sync",
                Duration::from_secs(30),
                Duration::from_secs(1),
                &CancellationToken::new(),
                &mut (),
            )
            .await
            .unwrap();
        assert!(outcome.is_reached());
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn no_data_at_all_raises() {
        let mut poller = StatusPoller::new(Silent, &inventory());
        let err = poller
            .wait_for_status(
                &targets(),
                "In-Sync",
                Duration::from_secs(5),
                Duration::from_secs(1),
                &CancellationToken::new(),
                &mut (),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::StatusUnavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_wait() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });
        let mut poller = StatusPoller::new(
            Scripted {
                start: Instant::now(),
                calls: 0,
            },
            &inventory(),
        );
        let err = poller
            .wait_for_status(
                &targets(),
                "In-Sync",
                Duration::from_secs(60),
                Duration::from_secs(1),
                &cancel,
                &mut (),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
    }

    #[tokio::test]
    async fn unknown_target_is_parameter_error() {
        let mut poller = StatusPoller::new(Silent, &inventory());
        let err = poller
            .wait_for_status(
                &BTreeSet::from(["S9".to_owned()]),
                "In-Sync",
                Duration::from_secs(1),
                Duration::from_secs(1),
                &CancellationToken::new(),
                &mut (),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Parameter { .. }));
    }
}
