use std::error::Error as StdError;
use std::sync::Arc;

use streamwork_common::{ComputationId, ExceptionReport, ExecutorError, KeyTokenInvalidError, WorkItem, WorkServiceError};

use crate::engine::Shared;

/// Exception classification and retry policy.
///
/// Runs on the pool thread that just failed the item, so the debounce sleep
/// in the retryable-accepted branch blocks that same thread until the retry
/// is resubmitted.
pub(crate) fn handle_failure(
    shared: &Arc<Shared>,
    computation_id: ComputationId,
    input_watermark_millis: i64,
    work_item: WorkItem,
    err: ExecutorError,
) {
    // "Unwrap one layer of user-code wrapper": ExecutorError::UserCode is
    // that wrapper, so classification starts at its source, not at the
    // ExecutorError itself.
    let cause = match &err {
        ExecutorError::UserCode(inner) => Some(inner.as_ref() as &(dyn StdError + 'static)),
        ExecutorError::ConstructionFailed(_) => None,
    };

    if cause.map(source_chain_has_key_token_invalid).unwrap_or(false) {
        tracing::debug!(
            computation_id = %computation_id,
            work_token = work_item.work_token,
            "work token no longer valid for this key; dropping without retry"
        );
        return;
    }

    tracing::error!(
        computation_id = %computation_id,
        work_token = work_item.work_token,
        error = %err,
        "work item execution failed"
    );
    shared.last_exception.set(format!("{err:#}"));

    let report = cause
        .map(ExceptionReport::from_error)
        .unwrap_or_else(|| ExceptionReport { frames: vec![err.to_string()], cause: None });

    let report_result =
        shared
            .service
            .report_stats(&computation_id, &work_item.key, work_item.work_token, vec![], Some(report));

    match report_result {
        Ok(response) if !response.failed => {
            std::thread::sleep(shared.cfg.retry_debounce);
            let retry_shared = shared.clone();
            shared.pool.force_execute(move || {
                crate::item::execute_work_item(&retry_shared, computation_id, input_watermark_millis, work_item);
            });
        }
        Ok(_) => {
            // Service says failed: abandon locally, it will be re-leased.
        }
        Err(WorkServiceError::KeyTokenInvalid) => {
            // Reporting itself found the lease gone; abandon without retry.
        }
        Err(report_err) => {
            // Reporting RPC failures are swallowed: treat as "service
            // rejected" and abandon locally.
            tracing::warn!(
                computation_id = %computation_id,
                work_token = work_item.work_token,
                error = %report_err,
                "report_stats call failed; abandoning item locally"
            );
        }
    }
}

fn source_chain_has_key_token_invalid(err: &(dyn StdError + 'static)) -> bool {
    let mut cur = Some(err);
    while let Some(e) = cur {
        if e.downcast_ref::<KeyTokenInvalidError>().is_some() {
            return true;
        }
        if matches!(e.downcast_ref::<WorkServiceError>(), Some(WorkServiceError::KeyTokenInvalid)) {
            return true;
        }
        cur = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_key_token_invalid_anywhere_in_chain() {
        #[derive(Debug, thiserror::Error)]
        #[error("wrapper")]
        struct Wrapper(#[source] KeyTokenInvalidError);

        let wrapper = Wrapper(KeyTokenInvalidError);
        assert!(source_chain_has_key_token_invalid(&wrapper));
    }

    #[test]
    fn ordinary_error_is_not_key_token_invalid() {
        #[derive(Debug, thiserror::Error)]
        #[error("boom")]
        struct Boom;
        assert!(!source_chain_has_key_token_invalid(&Boom));
    }
}
