use std::sync::Arc;
use std::time::Duration;

use crate::model::{
    ComputationDescriptor, ComputationId, OutputMessage, StateMutation, WorkItem, WorkItemCommitRequest,
};

/// Pre-translation counter kind as user pipeline code would report it,
/// including a wire value the worker doesn't recognize (a computation built
/// against a newer descriptor schema than this binary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawCounterKind {
    Sum,
    Max,
    Min,
    Mean,
    Unknown,
}

/// Pre-translation counter value. `Int32` exists because user code commonly
/// reports native 32-bit counters that must be widened before they reach the
/// work service's 64-bit wire type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawCounterValue {
    Int32(i32),
    Int64(i64),
    Double(f64),
    Unknown,
}

/// One counter sample as produced by an [`Executor`], before translation
/// into a wire counter update is applied.
#[derive(Debug, Clone)]
pub struct RawCounter {
    pub name: String,
    pub kind: RawCounterKind,
    pub value: RawCounterValue,
    pub count: Option<i64>,
}

/// Accumulates the side effects of executing one work item. Handed to the
/// executor by reference during `execute`, then consumed into a
/// [`WorkItemCommitRequest`] once execution finishes.
pub struct CommitBuilder {
    key: Vec<u8>,
    work_token: crate::model::WorkToken,
    state_mutations: Vec<StateMutation>,
    output_messages: Vec<OutputMessage>,
}

impl CommitBuilder {
    pub fn new(key: Vec<u8>, work_token: crate::model::WorkToken) -> Self {
        CommitBuilder {
            key,
            work_token,
            state_mutations: Vec::new(),
            output_messages: Vec::new(),
        }
    }

    pub fn add_state_mutation(&mut self, mutation: StateMutation) {
        self.state_mutations.push(mutation);
    }

    pub fn add_output_message(&mut self, message: OutputMessage) {
        self.output_messages.push(message);
    }

    pub fn into_commit_request(
        self,
        counter_updates: Vec<crate::model::CounterUpdate>,
    ) -> WorkItemCommitRequest {
        WorkItemCommitRequest {
            key: self.key,
            work_token: self.work_token,
            state_mutations: self.state_mutations,
            output_messages: self.output_messages,
            counter_updates,
        }
    }
}

/// Reads persisted per-key state through the work service, the collaborator
/// spec.md §4.5 step 3 hands to every freshly constructed executor context
/// alongside its descriptor. Writes flow the other direction, as
/// [`StateMutation`]s attached to a work item's commit request; this
/// collaborator only covers reads. Created once against the service and
/// handed to each execution context as an injected capability, per §9 — not
/// hidden as global state.
pub trait StateFetcher: Send + Sync {
    /// Fetches the current persisted value for `key` under `computation_id`,
    /// or `None` if nothing has been committed for it yet.
    fn fetch_state(
        &self,
        computation_id: &ComputationId,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StateFetchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StateFetchError {
    #[error("state fetch unavailable: {0}")]
    Unavailable(String),
}

/// The user-pipeline collaborator a dispatched work item is bound to and run
/// against. Named interface only, per scope: this crate provides the shape,
/// not an implementation of user compute.
pub trait Executor: Send {
    /// Whether this executor can be reused across work items (an executor
    /// cache hit) or must be rebuilt from scratch after each one.
    fn supports_restart(&self) -> bool;

    /// Sets the cadence at which the executor reports intermediate progress.
    /// A freshly constructed executor always has this disabled (`Duration::ZERO`)
    /// until the per-item executor binds a real work item to it.
    fn set_progress_update_period(&mut self, period: Duration);

    /// Binds the executor to a work item, preparing it to run. `state_fetcher`
    /// is the same collaborator handed to the factory at construction time;
    /// it is passed again here so a rebind can read state for the newly
    /// bound key without the executor having to have squirreled away its own
    /// reference to the `Arc` it got at construction.
    fn bind(
        &mut self,
        work_item: &WorkItem,
        input_watermark_millis: i64,
        state_fetcher: &dyn StateFetcher,
    ) -> Result<(), ExecutorError>;

    /// Runs the bound work item to completion, recording state mutations and
    /// output messages into `commit` and returning the counters it observed.
    fn execute(&mut self, commit: &mut CommitBuilder) -> Result<Vec<RawCounter>, ExecutorError>;
}

/// Builds an [`Executor`] for a computation, given its descriptor and the
/// state-fetcher collaborator to bind into its execution context (spec.md
/// §4.5 step 3, §9). Looked up by computation id through the executor
/// cache; one factory instance typically backs one computation for the
/// worker's lifetime.
pub trait ExecutorFactory: Send + Sync {
    fn create(
        &self,
        descriptor: &ComputationDescriptor,
        state_fetcher: Arc<dyn StateFetcher>,
    ) -> Result<Box<dyn Executor>, ExecutorError>;
}

/// Marker error identifying a stale lease. Distinguished from
/// [`ExecutorError::UserCode`]'s other causes because the failure reporter
/// treats it as non-retryable: it may appear anywhere in the cause chain, not
/// just at the top.
#[derive(Debug, Clone, Copy, Default, thiserror::Error)]
#[error("work token no longer valid for this key")]
pub struct KeyTokenInvalidError;

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("user code failed: {0}")]
    UserCode(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("executor construction failed: {0}")]
    ConstructionFailed(String),
}

impl ExecutorError {
    /// Convenience constructor for executors reporting a stale lease as their
    /// failure cause.
    pub fn key_token_invalid() -> Self {
        ExecutorError::UserCode(Box::new(KeyTokenInvalidError))
    }
}
