use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use humansize::{format_size, BINARY};
use streamwork_engine::EngineHandle;

#[derive(Clone)]
pub struct StatusState {
    pub engine: EngineHandle,
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/threadz", get(threadz))
        .fallback(get(status_page))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Escapes the five HTML-significant characters. `computation_id` and
/// `last_exception` originate from the work service, not this binary, so
/// they're untrusted input to the status page and must not be interpolated
/// raw.
fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

async fn healthz() -> &'static str {
    "ok"
}

async fn threadz(State(state): State<StatusState>) -> impl IntoResponse {
    let snapshot = state.engine.status_snapshot();
    let mut out = String::new();
    out.push_str("dispatch: 1 thread (low priority)\n");
    out.push_str("commit: 1 thread (high priority)\n");
    out.push_str(&format!(
        "pool: {} threads ({} active, {} queued)\n",
        snapshot.pool.pool_size, snapshot.pool.active_count, snapshot.pool.queue_depth
    ));
    out.push_str("status: 1 thread\n\n");
    if snapshot.threads.is_empty() {
        out.push_str("(no pool thread is currently bound to a work item)\n");
    } else {
        for (thread_id, description) in &snapshot.threads {
            out.push_str(&format!("{thread_id}: {description}\n"));
        }
    }
    out
}

async fn status_page(State(state): State<StatusState>) -> impl IntoResponse {
    let snapshot = state.engine.status_snapshot();

    let mut body = String::new();
    body.push_str("<html><head><title>worker status</title></head><body>");
    body.push_str(&format!(
        "<h1>worker {} ({})</h1>",
        snapshot.client_id,
        if snapshot.running { "running" } else { "stopped" }
    ));

    body.push_str("<h2>pool</h2><ul>");
    body.push_str(&format!("<li>pool size: {}</li>", snapshot.pool.pool_size));
    body.push_str(&format!("<li>active: {}</li>", snapshot.pool.active_count));
    body.push_str(&format!("<li>queue depth: {}</li>", snapshot.pool.queue_depth));
    body.push_str("</ul>");

    body.push_str("<h2>computations</h2><table border=\"1\"><tr><th>id</th><th>output queue depth</th><th>idle executors</th></tr>");
    for computation in &snapshot.computations {
        body.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&computation.computation_id),
            computation.output_queue_depth,
            computation.idle_executors
        ));
    }
    body.push_str("</table>");

    body.push_str("<h2>resources</h2><ul>");
    body.push_str(&format!("<li>used: {}</li>", format_size(snapshot.memory.used_bytes, BINARY)));
    body.push_str(&format!("<li>max: {}</li>", format_size(snapshot.memory.max_bytes, BINARY)));
    body.push_str(&format!("<li>total: {}</li>", format_size(snapshot.memory.total_bytes, BINARY)));
    body.push_str("</ul>");

    body.push_str("<h2>last exception</h2><pre>");
    body.push_str(&escape_html(snapshot.last_exception.as_deref().unwrap_or("(none)")));
    body.push_str("</pre>");

    body.push_str("<h2>descriptors</h2><ul>");
    for descriptor in &snapshot.descriptors {
        body.push_str(&format!("<li>{}</li>", escape_html(&descriptor.computation_id)));
    }
    body.push_str("</ul>");

    body.push_str("</body></html>");
    Html(body)
}
