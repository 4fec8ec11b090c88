use std::collections::VecDeque;
use std::sync::Mutex;

use crate::model::{
    ClientId, CommitWorkRequest, ComputationDescriptor, ComputationId, ComputationWorkItems,
    CounterUpdate, ExceptionReport, ReportStatsResponse, WorkToken,
};
use crate::work_service::{WorkService, WorkServiceError};

#[derive(Default)]
struct MockState {
    descriptors: Vec<ComputationDescriptor>,
    queued_work: VecDeque<ComputationWorkItems>,
    committed: Vec<CommitWorkRequest>,
    reports: Vec<ReportedStat>,
    invalid_tokens: Vec<(ComputationId, Vec<u8>, WorkToken)>,
    unavailable_until_calls: u32,
}

/// One `report_stats` call observed by the mock, kept for test assertions.
#[derive(Debug, Clone)]
pub struct ReportedStat {
    pub computation_id: ComputationId,
    pub key: Vec<u8>,
    pub work_token: WorkToken,
    pub counters: Vec<CounterUpdate>,
    pub exception: Option<ExceptionReport>,
}

/// An in-memory [`WorkService`] double.
///
/// Seeded with computation descriptors and work item batches up front, it
/// hands them out on `get_work`/`get_config` and records everything the
/// worker commits or reports back, so tests can assert on harness behavior
/// without a real coordination service.
pub struct MockWorkService {
    state: Mutex<MockState>,
}

impl MockWorkService {
    pub fn new() -> Self {
        MockWorkService { state: Mutex::new(MockState::default()) }
    }

    /// Registers a computation descriptor to be returned from `get_config`.
    pub fn seed_descriptor(&self, descriptor: ComputationDescriptor) {
        self.state.lock().unwrap().descriptors.push(descriptor);
    }

    /// Queues a batch of work items to be handed out by the next matching
    /// `get_work` call.
    pub fn seed_work(&self, batch: ComputationWorkItems) {
        self.state.lock().unwrap().queued_work.push_back(batch);
    }

    /// Marks `(computation_id, key, work_token)` so that any commit or report
    /// against it fails with [`WorkServiceError::KeyTokenInvalid`], modeling
    /// a lease that was reassigned out from under the worker.
    pub fn invalidate_token(&self, computation_id: ComputationId, key: Vec<u8>, work_token: WorkToken) {
        self.state.lock().unwrap().invalid_tokens.push((computation_id, key, work_token));
    }

    /// Makes the next `n` calls to any RPC fail with
    /// [`WorkServiceError::Unavailable`], modeling a transient outage.
    pub fn fail_next_calls(&self, n: u32) {
        self.state.lock().unwrap().unavailable_until_calls = n;
    }

    pub fn committed_batches(&self) -> Vec<CommitWorkRequest> {
        self.state.lock().unwrap().committed.clone()
    }

    pub fn reported_stats(&self) -> Vec<ReportedStat> {
        self.state.lock().unwrap().reports.clone()
    }

    fn take_outage_tick(state: &mut MockState) -> Result<(), WorkServiceError> {
        if state.unavailable_until_calls > 0 {
            state.unavailable_until_calls -= 1;
            return Err(WorkServiceError::Unavailable("mock outage".to_string()));
        }
        Ok(())
    }

    fn is_invalid(state: &MockState, computation_id: &str, key: &[u8], work_token: WorkToken) -> bool {
        state
            .invalid_tokens
            .iter()
            .any(|(c, k, t)| c == computation_id && k == key && *t == work_token)
    }
}

impl Default for MockWorkService {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkService for MockWorkService {
    fn get_work(
        &self,
        _client_id: ClientId,
        max_items_per_computation: usize,
    ) -> Result<Vec<ComputationWorkItems>, WorkServiceError> {
        let mut state = self.state.lock().unwrap();
        Self::take_outage_tick(&mut state)?;

        let mut out = Vec::new();
        let mut remaining = VecDeque::new();
        while let Some(mut batch) = state.queued_work.pop_front() {
            if batch.work_items.len() > max_items_per_computation {
                let rest = batch.work_items.split_off(max_items_per_computation);
                remaining.push_back(ComputationWorkItems {
                    computation_id: batch.computation_id.clone(),
                    input_data_watermark_micros: batch.input_data_watermark_micros,
                    work_items: rest,
                });
            }
            out.push(batch);
        }
        state.queued_work = remaining;
        Ok(out)
    }

    fn get_config(
        &self,
        computation_ids: &[ComputationId],
    ) -> Result<Vec<ComputationDescriptor>, WorkServiceError> {
        let mut state = self.state.lock().unwrap();
        Self::take_outage_tick(&mut state)?;
        Ok(state
            .descriptors
            .iter()
            .filter(|d| computation_ids.contains(&d.computation_id))
            .cloned()
            .collect())
    }

    fn commit_work(&self, request: CommitWorkRequest) -> Result<(), WorkServiceError> {
        let mut state = self.state.lock().unwrap();
        Self::take_outage_tick(&mut state)?;
        for (computation_id, items) in &request.per_computation {
            for item in items {
                if Self::is_invalid(&state, computation_id, &item.key, item.work_token) {
                    return Err(WorkServiceError::KeyTokenInvalid);
                }
            }
        }
        state.committed.push(request);
        Ok(())
    }

    fn report_stats(
        &self,
        computation_id: &ComputationId,
        key: &[u8],
        work_token: WorkToken,
        counters: Vec<CounterUpdate>,
        exception: Option<ExceptionReport>,
    ) -> Result<ReportStatsResponse, WorkServiceError> {
        let mut state = self.state.lock().unwrap();
        Self::take_outage_tick(&mut state)?;
        if Self::is_invalid(&state, computation_id, key, work_token) {
            return Err(WorkServiceError::KeyTokenInvalid);
        }
        state.reports.push(ReportedStat {
            computation_id: computation_id.clone(),
            key: key.to_vec(),
            work_token,
            counters,
            exception,
        });
        Ok(ReportStatsResponse { failed: false })
    }
}
