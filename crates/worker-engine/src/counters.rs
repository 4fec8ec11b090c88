use streamwork_common::{CounterUpdate, CounterValue, RawCounter, RawCounterKind, RawCounterValue};

/// Translates raw counters reported by an executor into the wire shape a
/// commit request carries.
///
/// - `Mean` counters with `count <= 0` are dropped entirely.
/// - Zero-valued aggregates are omitted for every kind.
/// - Unknown kinds or unknown aggregate types are skipped with a debug log,
///   never an error: a computation built against a newer descriptor schema
///   than this binary should degrade, not crash the work item.
pub fn translate_counters(raw: Vec<RawCounter>) -> Vec<CounterUpdate> {
    raw.into_iter().filter_map(translate_one).collect()
}

fn translate_one(counter: RawCounter) -> Option<CounterUpdate> {
    let kind = match counter.kind {
        RawCounterKind::Sum => streamwork_common::CounterKind::Sum,
        RawCounterKind::Max => streamwork_common::CounterKind::Max,
        RawCounterKind::Min => streamwork_common::CounterKind::Min,
        RawCounterKind::Mean => streamwork_common::CounterKind::Mean,
        RawCounterKind::Unknown => {
            tracing::debug!(counter = %counter.name, "skipping counter with unknown kind");
            return None;
        }
    };

    if kind == streamwork_common::CounterKind::Mean && counter.count.unwrap_or(0) <= 0 {
        return None;
    }

    let value = match counter.value {
        RawCounterValue::Int32(v) => CounterValue::Int64(v as i64),
        RawCounterValue::Int64(v) => CounterValue::Int64(v),
        RawCounterValue::Double(v) => CounterValue::Double(v),
        RawCounterValue::Unknown => {
            tracing::debug!(counter = %counter.name, "skipping counter with unknown aggregate type");
            return None;
        }
    };

    let is_zero = match value {
        CounterValue::Int64(v) => v == 0,
        CounterValue::Double(v) => v == 0.0,
    };
    if is_zero {
        return None;
    }

    Some(CounterUpdate { name: counter.name, kind, value, count: counter.count })
}
