use crate::model::{
    ClientId, CommitWorkRequest, ComputationDescriptor, ComputationId, ComputationWorkItems,
    ReportStatsResponse,
};

/// The four RPCs a worker makes against its coordination service.
///
/// Kept synchronous: the dispatch loop and commit aggregator are native
/// threads, not tokio tasks, so an async trait here would just force a
/// block-on at every call site. Wire transport itself is out of scope; this
/// trait only needs to express the method set a transport would implement.
pub trait WorkService: Send + Sync {
    /// Leases up to `max_items` work items per computation. The service
    /// alone decides which computations this client is assigned to lease
    /// for (including ones this client has never seen a descriptor for
    /// yet); the worker has no way to ask for a subset up front.
    fn get_work(
        &self,
        client_id: ClientId,
        max_items_per_computation: usize,
    ) -> Result<Vec<ComputationWorkItems>, WorkServiceError>;

    /// Fetches descriptors for computations not yet known locally.
    fn get_config(
        &self,
        computation_ids: &[ComputationId],
    ) -> Result<Vec<ComputationDescriptor>, WorkServiceError>;

    /// Commits a batch of completed work items, possibly spanning several
    /// computations.
    fn commit_work(&self, request: CommitWorkRequest) -> Result<(), WorkServiceError>;

    /// Reports counters and/or a failure for one work item.
    fn report_stats(
        &self,
        computation_id: &ComputationId,
        key: &[u8],
        work_token: crate::model::WorkToken,
        counters: Vec<crate::model::CounterUpdate>,
        exception: Option<crate::model::ExceptionReport>,
    ) -> Result<ReportStatsResponse, WorkServiceError>;
}

/// Failure modes a [`WorkService`] implementation can report back to the
/// caller. `KeyTokenInvalid` is distinguished from everything else because
/// the failure reporter treats it as non-retryable: the lease is gone,
/// retrying would just repeat the rejection.
#[derive(Debug, thiserror::Error)]
pub enum WorkServiceError {
    #[error("work token no longer valid for this key")]
    KeyTokenInvalid,
    #[error("work service unavailable: {0}")]
    Unavailable(String),
    #[error("work service rejected request: {0}")]
    Rejected(String),
}
