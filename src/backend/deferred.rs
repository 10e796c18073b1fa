//! Backends that hand control of the build back to the host.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{BuildCompletion, BuildTicket, CompileBackend};
use crate::unit::BuildUnit;

/// A build requested by the orchestrator and not yet completed.
#[derive(Debug)]
pub struct BuildRequest {
    pub unit: Arc<BuildUnit>,
    pub completion: BuildCompletion,
}

/// Records build requests so the host can run them however it likes.
///
/// Useful when compilation happens inside another process (an IDE, a
/// compile server) that reports back through its own channel. Requests
/// stay queued after a cancel; the host checks [`cancelled`](Self::cancelled).
#[derive(Debug, Default)]
pub struct DeferredBackend {
    requests: Mutex<Vec<BuildRequest>>,
    cancelled: Mutex<Vec<BuildTicket>>,
}

impl DeferredBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every outstanding request, in the order `build` was called.
    pub fn take_requests(&self) -> Vec<BuildRequest> {
        std::mem::take(&mut *self.requests.lock())
    }

    /// Take the request for a specific unit, if any.
    pub fn take_request(&self, unit: &str) -> Option<BuildRequest> {
        let mut requests = self.requests.lock();
        let index = requests.iter().position(|r| r.unit.name() == unit)?;
        Some(requests.remove(index))
    }

    /// Names of units with a pending request.
    pub fn requested_units(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|r| r.unit.name().to_string())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Tickets the orchestrator has given up on, oldest first.
    pub fn cancelled(&self) -> Vec<BuildTicket> {
        self.cancelled.lock().clone()
    }
}

impl CompileBackend for DeferredBackend {
    fn name(&self) -> &str {
        "deferred"
    }

    fn build(&self, unit: Arc<BuildUnit>, completion: BuildCompletion) {
        self.requests.lock().push(BuildRequest { unit, completion });
    }

    fn cancel(&self, ticket: BuildTicket) {
        self.cancelled.lock().push(ticket);
    }
}

/// Reports every build as successful without compiling anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunBackend;

impl CompileBackend for DryRunBackend {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn build(&self, unit: Arc<BuildUnit>, completion: BuildCompletion) {
        crate::log_event!(
            "dry-run",
            "would compile",
            "{} ({} sources) -> {}",
            unit.name(),
            unit.sources().len(),
            unit.output().display()
        );
        completion.complete(Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BuildReport, BuildTicket, ReportSink};

    fn sink() -> (ReportSink, Arc<Mutex<Vec<BuildReport>>>) {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&reports);
        (Arc::new(move |r| captured.lock().push(r)), reports)
    }

    fn unit(name: &str) -> Arc<BuildUnit> {
        Arc::new(
            BuildUnit::builder(name)
                .source(format!("/p/{name}.cs"))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_deferred_records_and_completes_out_of_order() {
        let backend = DeferredBackend::new();
        let (sink, reports) = sink();
        let ticket = BuildTicket { epoch: 0, cycle: 1 };

        for name in ["A", "B"] {
            let unit = unit(name);
            let completion = BuildCompletion::new(ticket, &unit, Arc::clone(&sink));
            backend.build(unit, completion);
        }
        assert_eq!(backend.requested_units(), vec!["A", "B"]);

        let b = backend.take_request("B").unwrap();
        b.completion.complete(Vec::new());
        assert_eq!(backend.pending_count(), 1);

        for request in backend.take_requests() {
            request.completion.fail("boom");
        }

        let reports = reports.lock();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].unit, "B");
        assert!(reports[0].succeeded());
        assert_eq!(reports[1].unit, "A");
        assert!(!reports[1].succeeded());
    }

    #[test]
    fn test_dry_run_completes_immediately() {
        let (sink, reports) = sink();
        let unit = unit("A");
        let completion = BuildCompletion::new(BuildTicket { epoch: 0, cycle: 1 }, &unit, sink);
        DryRunBackend.build(unit, completion);

        assert_eq!(reports.lock().len(), 1);
        assert!(reports.lock()[0].succeeded());
    }
}
