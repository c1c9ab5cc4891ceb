//! One pass of the recurring job: dispatch everything due, then complete
//! what has expired.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span};

use super::{DispatchError, Dispatcher};
use crate::db::{format_ts, mailing_repo};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Mailings due at the start of the pass.
    pub selected: usize,
    pub dispatched: usize,
    /// Selected but not sent: window closed before dispatch, or claimed
    /// elsewhere.
    pub skipped: usize,
    /// Running mailings moved to completed by the sweep.
    pub completed: u64,
    pub attempts: usize,
    pub failures: usize,
}

impl Dispatcher {
    /// Dispatches every mailing due at `now`, one after another, then
    /// completes every running mailing whose window closed by `now`.
    ///
    /// Each dispatch re-checks its window against the clock at the moment
    /// it starts. An error from one mailing ends the pass before the sweep.
    pub fn process_due(&self, now: DateTime<Utc>) -> Result<BatchReport, DispatchError> {
        let span = info_span!("process_due", now = %format_ts(&now));
        let _enter = span.enter();

        let due = mailing_repo::find_due(self.db(), now)?;
        let mut report = BatchReport {
            selected: due.len(),
            ..BatchReport::default()
        };
        info!(count = due.len(), "Selected due mailings");

        for mailing in &due {
            match self.send_mailing(mailing, self.now())? {
                Some(dispatch) => {
                    report.dispatched += 1;
                    report.attempts += dispatch.attempted;
                    report.failures += dispatch.failed;
                }
                None => report.skipped += 1,
            }
        }

        report.completed = mailing_repo::complete_expired(self.db(), now)?;
        info!(
            selected = report.selected,
            dispatched = report.dispatched,
            skipped = report.skipped,
            completed = report.completed,
            "Batch pass finished"
        );
        Ok(report)
    }
}
