use std::collections::BTreeMap;

use base64::Engine;
use serde::{Deserialize, Serialize};

/// Identifies a computation registered with the worker.
pub type ComputationId = String;

/// Sequence number stamped on a work item by the work service; used to detect
/// stale leases when committing.
pub type WorkToken = i64;

/// A computation's opaque, service-specific descriptor.
///
/// The worker never interprets `payload` itself; it is handed unmodified to
/// the [`crate::ExecutorFactory`] responsible for the computation's kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationDescriptor {
    pub computation_id: ComputationId,
    pub payload: Vec<u8>,
}

impl ComputationDescriptor {
    /// Parses a single `computation_id=base64(payload)` startup argument.
    ///
    /// Malformed descriptors are a fatal bootstrap error (not a recoverable
    /// one): the process should not start serving a computation it cannot
    /// describe.
    pub fn parse_startup_arg(arg: &str) -> anyhow::Result<Self> {
        let (id, encoded) = arg
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("malformed computation descriptor `{arg}`: expected id=payload"))?;
        if id.is_empty() {
            anyhow::bail!("malformed computation descriptor `{arg}`: empty computation id");
        }
        let payload = base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| anyhow::anyhow!("malformed computation descriptor `{arg}`: {e}"))?;
        Ok(ComputationDescriptor {
            computation_id: id.to_string(),
            payload,
        })
    }
}

/// A single unit of work leased from the work service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub key: Vec<u8>,
    pub work_token: WorkToken,
    pub input: Vec<u8>,
}

/// A batch of work items leased for one computation, plus the watermark that
/// applied when the lease was issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationWorkItems {
    pub computation_id: ComputationId,
    pub input_data_watermark_micros: i64,
    pub work_items: Vec<WorkItem>,
}

/// Aggregation semantics for a counter update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterKind {
    Sum,
    Max,
    Min,
    Mean,
}

/// A typed counter value after translation to the service-facing wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CounterValue {
    Int64(i64),
    Double(f64),
}

/// One counter delta destined for `report_stats` / `commit_work`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterUpdate {
    pub name: String,
    pub kind: CounterKind,
    pub value: CounterValue,
    /// Sample count backing a `Mean`; unused for other kinds.
    pub count: Option<i64>,
}

/// Opaque serialized state mutation produced by user pipeline code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMutation(pub Vec<u8>);

/// Opaque serialized output message produced by user pipeline code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputMessage(pub Vec<u8>);

/// Everything one work item's execution produced, ready to commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemCommitRequest {
    pub key: Vec<u8>,
    pub work_token: WorkToken,
    pub state_mutations: Vec<StateMutation>,
    pub output_messages: Vec<OutputMessage>,
    pub counter_updates: Vec<CounterUpdate>,
}

impl WorkItemCommitRequest {
    /// Approximate wire size in bytes, used by the commit aggregator to stay
    /// under its byte budget. Exact framing overhead doesn't matter; what
    /// matters is that it scales with payload size so a handful of huge
    /// commits can't hide behind a count-based budget.
    pub fn serialized_size(&self) -> usize {
        const PER_ITEM_OVERHEAD: usize = 32;
        let mutations: usize = self.state_mutations.iter().map(|m| m.0.len() + 8).sum();
        let outputs: usize = self.output_messages.iter().map(|m| m.0.len() + 8).sum();
        let counters: usize = self.counter_updates.len() * 48;
        PER_ITEM_OVERHEAD + self.key.len() + mutations + outputs + counters
    }
}

/// A batch of commits, grouped by computation, ready to send to the work
/// service in a single RPC.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitWorkRequest {
    pub per_computation: BTreeMap<ComputationId, Vec<WorkItemCommitRequest>>,
}

impl CommitWorkRequest {
    pub fn is_empty(&self) -> bool {
        self.per_computation.values().all(|items| items.is_empty())
    }

    pub fn serialized_size(&self) -> usize {
        self.per_computation
            .values()
            .flat_map(|items| items.iter())
            .map(WorkItemCommitRequest::serialized_size)
            .sum()
    }

    pub fn push(&mut self, computation_id: ComputationId, item: WorkItemCommitRequest) {
        self.per_computation.entry(computation_id).or_default().push(item);
    }

    pub fn item_count(&self) -> usize {
        self.per_computation.values().map(Vec::len).sum()
    }
}

/// A failure captured from user pipeline execution, in the shape
/// `report_stats` expects: an ordered stack of frames plus an optional cause
/// chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExceptionReport {
    pub frames: Vec<String>,
    pub cause: Option<Box<ExceptionReport>>,
}

impl ExceptionReport {
    /// Builds a report from a standard error chain, recursing through
    /// `source()` to capture nested causes.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        ExceptionReport {
            frames: vec![err.to_string()],
            cause: err.source().map(|cause| Box::new(ExceptionReport::from_error(cause))),
        }
    }
}

/// Outcome of a `report_stats` RPC: whether the service wants this worker to
/// treat the computation's key range as abandoned (e.g. token invalidated
/// mid-report).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReportStatsResponse {
    pub failed: bool,
}

/// A process-lifetime-stable identifier this worker presents to the work
/// service, generated once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientId(pub u64);

impl ClientId {
    pub fn random() -> Self {
        ClientId(rand::random())
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
