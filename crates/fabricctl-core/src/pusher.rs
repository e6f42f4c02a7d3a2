// ── Pusher ──

use fabricctl_api::{ApiRequest, Session};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cancel::or_cancelled;
use crate::error::CoreError;
use crate::model::{ChangeSet, OutcomeSet, UnitKey};

/// Status the controller answers a committed interface update with.
const PUSH_OK: u16 = 200;
const PUSH_ERROR: &str = "Invalid payload or any other internal server error";

/// Writes change-set payloads to the controller, one `PUT /interface`
/// per unit.
#[derive(Debug, Clone, Copy)]
pub struct Pusher<'a> {
    session: &'a Session,
}

impl<'a> Pusher<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Push every unit and partition the keys by result.
    ///
    /// A failing unit is logged and recorded; the remaining units are
    /// still pushed. Only an authentication failure aborts the batch.
    ///
    /// Once `cancel` fires the push stops: the unit in flight is recorded
    /// as failed, since its state on the controller is unknown, and units
    /// not yet sent appear on neither side.
    pub async fn apply(
        &self,
        changes: &ChangeSet,
        cancel: &CancellationToken,
    ) -> Result<OutcomeSet<UnitKey>, CoreError> {
        info!(units = changes.len(), "pushing interface changes");
        let mut outcome = OutcomeSet::new();

        for (sent, (key, payload)) in changes.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(remaining = changes.len() - sent, "push cancelled");
                break;
            }
            let request = ApiRequest::put("/interface")
                .json(payload.clone())
                .expect_error(500, PUSH_ERROR);
            match or_cancelled(cancel, self.session.request(request)).await {
                Ok(resp) if resp.status == PUSH_OK => {
                    debug!(unit = %key, "pushed");
                    outcome.record_success(key.clone());
                }
                Ok(resp) => {
                    warn!(unit = %key, status = resp.status, "unexpected push status");
                    outcome.record_failure(key.clone());
                }
                Err(CoreError::Cancelled) => {
                    warn!(unit = %key, remaining = changes.len() - sent - 1, "push interrupted");
                    outcome.record_failure(key.clone());
                    break;
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(unit = %key, error = %err, "push failed");
                    outcome.record_failure(key.clone());
                }
            }
        }

        if outcome.is_clean() {
            info!(units = outcome.success().len(), "all changes pushed");
        } else {
            let failed: Vec<String> = outcome.failure().iter().map(ToString::to_string).collect();
            error!(failed = %failed.join(", "), "push incomplete");
        }
        Ok(outcome)
    }
}
