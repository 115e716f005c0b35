use crate::sink::{Sink, SinkError};
use crate::status_mapping::StatusMapping;
use testops_proto::TestResult;
use tracing::{debug, error, info, warn};

/// Entry point used by framework adapters.
///
/// Forwards every call to the primary sink. When the primary fails, its
/// buffered results move to the fallback sink, which is started and takes
/// over. If that also fails the reporter goes quiet for the rest of the
/// session; reporting problems never abort the test run.
pub struct Reporter {
    primary: Option<Box<dyn Sink>>,
    fallback: Option<Box<dyn Sink>>,
    status_mapping: StatusMapping,
    root_suite: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    StartRun,
    CompleteRun,
    AddResult,
    SendResults,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Operation::StartRun => "start run",
            Operation::CompleteRun => "complete run",
            Operation::AddResult => "add result",
            Operation::SendResults => "send results",
        }
    }
}

impl Reporter {
    pub fn new(primary: Option<Box<dyn Sink>>, fallback: Option<Box<dyn Sink>>) -> Self {
        Self {
            primary,
            fallback,
            status_mapping: StatusMapping::default(),
            root_suite: None,
        }
    }

    pub fn with_status_mapping(mut self, mapping: StatusMapping) -> Self {
        self.status_mapping = mapping;
        self
    }

    pub fn with_root_suite(mut self, root_suite: Option<String>) -> Self {
        self.root_suite = root_suite.filter(|s| !s.is_empty());
        self
    }

    /// Name of the sink currently receiving results.
    pub fn active_sink(&self) -> Option<&'static str> {
        self.primary.as_ref().map(|sink| sink.name())
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Results buffered in the active sink.
    pub fn pending_results(&self) -> &[TestResult] {
        match &self.primary {
            Some(sink) => sink.results(),
            None => &[],
        }
    }

    pub fn start_run(&mut self) {
        if self.primary.is_none() {
            return;
        }
        info!("Starting test run");
        self.dispatch(Operation::StartRun, |sink| sink.start_run());
    }

    pub fn complete_run(&mut self) {
        if self.primary.is_none() {
            return;
        }
        info!("Completing test run");
        self.dispatch(Operation::CompleteRun, |sink| sink.complete_run());
    }

    pub fn send_results(&mut self) {
        self.dispatch(Operation::SendResults, |sink| sink.send_results());
    }

    pub fn add_result(&mut self, mut result: TestResult) {
        if self.primary.is_none() {
            return;
        }
        debug!(id = %result.id, title = %result.title, "Adding result");

        self.apply_status_mapping(&mut result);
        if let Some(root) = &self.root_suite {
            result.relations.prepend_suite(root.clone());
        }

        let mut result = Some(result);
        self.dispatch(Operation::AddResult, move |sink| match result.take() {
            Some(result) => sink.add_result(result),
            None => Ok(()),
        });
    }

    /// Maps the result's status and the status of its direct steps.
    ///
    /// Nested steps keep their original status.
    fn apply_status_mapping(&self, result: &mut TestResult) {
        if self.status_mapping.is_empty() {
            return;
        }
        if let Some(status) = result.execution.status {
            result.execution.status = Some(self.status_mapping.map(status));
        }
        for step in &mut result.steps {
            step.execution.status = self.status_mapping.map(step.execution.status);
        }
    }

    fn dispatch<F>(&mut self, operation: Operation, mut f: F)
    where
        F: FnMut(&mut dyn Sink) -> Result<(), SinkError>,
    {
        let Some(primary) = self.primary.as_mut() else {
            return;
        };

        if let Err(e) = f(primary.as_mut()) {
            error!(
                sink = primary.name(),
                operation = operation.as_str(),
                "Failed to {}: {}",
                operation.as_str(),
                e
            );
            if !self.fail_over() {
                return;
            }

            // The promoted sink has only been started; finish the interrupted
            // flush or completion on it.
            if matches!(operation, Operation::CompleteRun | Operation::SendResults)
                && let Some(promoted) = self.primary.as_mut()
                && let Err(e) = f(promoted.as_mut())
            {
                error!(
                    sink = promoted.name(),
                    operation = operation.as_str(),
                    "Fallback failed to {}: {}",
                    operation.as_str(),
                    e
                );
            }
        }
    }

    /// Promotes the fallback sink. Returns whether a sink is still active and
    /// was replaced.
    fn fail_over(&mut self) -> bool {
        let Some(mut fallback) = self.fallback.take() else {
            warn!("No fallback sink configured");
            return false;
        };
        let Some(mut failed) = self.primary.take() else {
            return false;
        };

        info!(
            from = failed.name(),
            to = fallback.name(),
            "Switching to fallback sink"
        );

        if let Err(e) = failed.abandon() {
            error!(sink = failed.name(), "Failed to release run: {}", e);
        }

        let results = failed.take_results();
        match fallback.start_run() {
            Ok(()) => {
                debug!(count = results.len(), "Moved buffered results to fallback");
                fallback.set_results(results);
                self.primary = Some(fallback);
                true
            }
            Err(e) => {
                error!(
                    sink = fallback.name(),
                    "Failed to run fallback reporter: {}", e
                );
                false
            }
        }
    }
}
