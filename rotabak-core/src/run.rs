//! Sequential run over every configured entry, and the end-of-run summary.

use std::fmt;
use tracing::{error, info};
use uuid::Uuid;

use crate::capability::Notifier;
use crate::context::RunContext;
use crate::pipeline::{Entry, EntryPipeline, EntryReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Ignored,
    Success,
    Failure,
}

impl fmt::Display for EntryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntryOutcome::Ignored => "IGNORED",
            EntryOutcome::Success => "SUCCESS",
            EntryOutcome::Failure => "FAILURE",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Outcome per entry, in configuration order
    pub outcomes: Vec<(String, EntryOutcome)>,
    /// Details of every entry that was processed
    pub entries: Vec<EntryReport>,
    /// Set when the summary could not be delivered
    pub notification_error: Option<String>,
}

impl RunReport {
    /// Entries that were not ignored
    pub fn processed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome != EntryOutcome::Ignored)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == EntryOutcome::Failure)
            .count()
    }

    pub fn succeeded(&self) -> bool {
        self.failed() == 0
    }

    pub fn status(&self) -> EntryOutcome {
        if self.succeeded() {
            EntryOutcome::Success
        } else {
            EntryOutcome::Failure
        }
    }

    pub fn summary_message(&self) -> String {
        let mut message = format!(
            "In total {} backup entries have been processed with {} errors:\n",
            self.outcomes.len(),
            self.failed()
        );
        for (name, outcome) in &self.outcomes {
            message.push_str(&format!("- {} : {}\n", name, outcome));
        }
        message
    }

    pub fn subject(&self, ctx: &RunContext) -> String {
        format!("{}: rotabak results for {} [{}]", ctx.hostname, ctx.today, self.status())
    }
}

pub struct RunController<'a> {
    ctx: &'a RunContext,
    notifier: Option<&'a dyn Notifier>,
}

impl<'a> RunController<'a> {
    pub fn new(ctx: &'a RunContext, notifier: Option<&'a dyn Notifier>) -> Self {
        Self { ctx, notifier }
    }

    /// Process `entries` one after the other, then deliver the summary.
    pub async fn run(&self, entries: &[Entry]) -> RunReport {
        let mut report = RunReport {
            run_id: self.ctx.run_id,
            outcomes: Vec::with_capacity(entries.len()),
            entries: Vec::new(),
            notification_error: None,
        };

        info!(
            "Processing {} backup entries (run {}, today {})",
            entries.len(),
            self.ctx.run_id,
            self.ctx.today
        );

        for entry in entries {
            if !entry.enabled {
                info!("Ignoring entry '{}' as it is disabled", entry.name);
                report.outcomes.push((entry.name.clone(), EntryOutcome::Ignored));
                continue;
            }

            info!("Processing of entry '{}' starting", entry.name);
            let entry_report = EntryPipeline::new(entry, self.ctx).run().await;
            let outcome = if entry_report.succeeded() {
                EntryOutcome::Success
            } else {
                EntryOutcome::Failure
            };
            info!(
                "Processing of entry '{}' completed in {}s with {} error(s): {}",
                entry.name,
                entry_report.duration.as_secs(),
                entry_report.error_count(),
                outcome
            );
            report.outcomes.push((entry.name.clone(), outcome));
            report.entries.push(entry_report);

            if !self.ctx.sleep_between.is_zero() {
                tokio::time::sleep(self.ctx.sleep_between).await;
            }
        }

        let message = report.summary_message();
        info!("Results summary:\n{}", message);

        if let Some(notifier) = self.notifier {
            let subject = report.subject(self.ctx);
            if let Err(e) = notifier.send(&subject, &message).await {
                error!("Failed to send {} notification: {}", notifier.kind(), e);
                report.notification_error = Some(e.to_string());
            }
        }

        report
    }
}
