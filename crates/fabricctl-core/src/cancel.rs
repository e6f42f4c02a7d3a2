// ── Cancellation ──
//
// Controller calls race the run's token. A call that loses is dropped
// mid-flight and reported as `CoreError::Cancelled`.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::CoreError;

/// Await `call` unless `cancel` fires first. An already cancelled token
/// never starts the call.
pub(crate) async fn or_cancelled<T, E>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, E>>,
) -> Result<T, CoreError>
where
    CoreError: From<E>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(CoreError::Cancelled),
        result = call => result.map_err(CoreError::from),
    }
}
