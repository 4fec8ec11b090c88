//! A minimal, restartable [`Executor`] used when running against the
//! `mock` service stub.
//!
//! The user-pipeline execution engine that runs inside a real executor is
//! explicitly out of scope: this is a stand-in that echoes its input back as
//! an output message and reports a couple of counters, just enough to
//! exercise the dispatch/commit path end to end in tests and local runs.

use std::sync::Arc;
use std::time::Duration;

use streamwork_common::{
    CommitBuilder, ComputationDescriptor, ComputationId, Executor, ExecutorError, ExecutorFactory,
    OutputMessage, RawCounter, RawCounterKind, RawCounterValue, StateFetcher, StateMutation, WorkItem,
};

pub struct DemoExecutorFactory;

impl ExecutorFactory for DemoExecutorFactory {
    fn create(
        &self,
        descriptor: &ComputationDescriptor,
        _state_fetcher: Arc<dyn StateFetcher>,
    ) -> Result<Box<dyn Executor>, ExecutorError> {
        Ok(Box::new(DemoExecutor { computation_id: descriptor.computation_id.clone(), bound: None }))
    }
}

struct BoundWork {
    input: Vec<u8>,
    watermark_millis: i64,
    prior_state: Option<Vec<u8>>,
}

struct DemoExecutor {
    computation_id: ComputationId,
    bound: Option<BoundWork>,
}

impl Executor for DemoExecutor {
    fn supports_restart(&self) -> bool {
        true
    }

    fn set_progress_update_period(&mut self, _period: Duration) {}

    fn bind(
        &mut self,
        work_item: &WorkItem,
        input_watermark_millis: i64,
        state_fetcher: &dyn StateFetcher,
    ) -> Result<(), ExecutorError> {
        let prior_state = state_fetcher
            .fetch_state(&self.computation_id, &work_item.key)
            .map_err(|err| ExecutorError::ConstructionFailed(err.to_string()))?;
        self.bound = Some(BoundWork {
            input: work_item.input.clone(),
            watermark_millis: input_watermark_millis,
            prior_state,
        });
        Ok(())
    }

    fn execute(&mut self, commit: &mut CommitBuilder) -> Result<Vec<RawCounter>, ExecutorError> {
        let bound = self.bound.take().ok_or_else(|| {
            ExecutorError::ConstructionFailed("execute called before bind".to_string())
        })?;

        let mut next_state = bound.prior_state.unwrap_or_default();
        next_state.extend_from_slice(&bound.watermark_millis.to_le_bytes());

        commit.add_output_message(OutputMessage(bound.input.clone()));
        commit.add_state_mutation(StateMutation(next_state));

        Ok(vec![RawCounter {
            name: "demo-items-processed".to_string(),
            kind: RawCounterKind::Sum,
            value: RawCounterValue::Int64(1),
            count: None,
        }])
    }
}
