//! Explicit per-call context.
//!
//! Tracing identifiers and the outcome reporter travel with each call as a
//! [`CallContext`] value. The executors pass it to every member operation and
//! report through it; nothing is read from thread-locals or process globals.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use corelib::health::Recorded;
use corelib::{CallError, NodeId};
use tracing::debug;

/// Distributed-tracing identifiers propagated to member calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub sampled: bool,
}

impl TraceContext {
    pub fn new(trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            sampled: true,
        }
    }
}

/// Outcome of one member of one quorum call.
#[derive(Debug, Clone)]
pub struct MemberOutcome {
    pub node: NodeId,
    /// The member was a test request to an excluded node.
    pub test_request: bool,
    pub elapsed: Duration,
    pub error: Option<CallError>,
    /// How the outcome was accounted in the node's health.
    pub recorded: Recorded,
}

impl MemberOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Receives every member outcome of calls made with a context.
pub trait CallReporter: Send + Sync {
    fn report(&self, trace: Option<&TraceContext>, outcome: &MemberOutcome);
}

/// Reporter that emits a `debug!` event per outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl CallReporter for TracingReporter {
    fn report(&self, trace: Option<&TraceContext>, outcome: &MemberOutcome) {
        let trace_id = trace.map(|t| t.trace_id.as_str()).unwrap_or("-");
        match &outcome.error {
            None => debug!(
                node = %outcome.node,
                test_request = outcome.test_request,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                trace_id,
                "quorum member succeeded"
            ),
            Some(err) => debug!(
                node = %outcome.node,
                test_request = outcome.test_request,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                recorded = ?outcome.recorded,
                trace_id,
                error = %err,
                "quorum member failed"
            ),
        }
    }
}

#[derive(Clone)]
pub struct CallContext {
    trace: Option<TraceContext>,
    reporter: Arc<dyn CallReporter>,
}

impl CallContext {
    pub fn new(reporter: Arc<dyn CallReporter>) -> Self {
        Self {
            trace: None,
            reporter,
        }
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn trace(&self) -> Option<&TraceContext> {
        self.trace.as_ref()
    }

    pub fn reporter(&self) -> &Arc<dyn CallReporter> {
        &self.reporter
    }

    pub fn report(&self, outcome: &MemberOutcome) {
        self.reporter.report(self.trace.as_ref(), outcome);
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(Arc::new(TracingReporter))
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("trace", &self.trace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<(Option<String>, NodeId)>>);

    impl CallReporter for Collect {
        fn report(&self, trace: Option<&TraceContext>, outcome: &MemberOutcome) {
            self.0
                .lock()
                .unwrap()
                .push((trace.map(|t| t.trace_id.clone()), outcome.node.clone()));
        }
    }

    fn outcome(node: &str) -> MemberOutcome {
        MemberOutcome {
            node: NodeId::new(node),
            test_request: false,
            elapsed: Duration::from_millis(3),
            error: None,
            recorded: Recorded::Success,
        }
    }

    #[test]
    fn test_report_carries_trace() {
        let collect = Arc::new(Collect::default());
        let ctx = CallContext::new(collect.clone()).with_trace(TraceContext::new("t-1", "s-1"));
        ctx.report(&outcome("a"));
        ctx.clone().report(&outcome("b"));

        let seen = collect.0.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (Some("t-1".to_string()), NodeId::new("a")),
                (Some("t-1".to_string()), NodeId::new("b")),
            ]
        );
    }

    #[test]
    fn test_default_context_has_no_trace() {
        let ctx = CallContext::default();
        assert!(ctx.trace().is_none());
        ctx.report(&outcome("a"));
        assert!(outcome("a").is_success());
    }
}
