//! Data model, work-service contract, and execution-context contract shared
//! between the engine and the worker binary.

mod executor;
mod mock_service;
mod model;
mod state_fetcher;
mod work_service;

pub use executor::{
    CommitBuilder, Executor, ExecutorError, ExecutorFactory, KeyTokenInvalidError, RawCounter,
    RawCounterKind, RawCounterValue, StateFetchError, StateFetcher,
};
pub use mock_service::MockWorkService;
pub use model::{
    ClientId, ComputationDescriptor, ComputationId, ComputationWorkItems, CommitWorkRequest,
    CounterKind, CounterUpdate, CounterValue, ExceptionReport, OutputMessage, ReportStatsResponse,
    StateMutation, WorkItem, WorkItemCommitRequest, WorkToken,
};
pub use state_fetcher::MockStateFetcher;
pub use work_service::{WorkService, WorkServiceError};
