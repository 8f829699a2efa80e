//! Run session and its state machine.
//!
//! A run moves through `Idle -> IdentifiersLoaded -> Confirmed ->
//! Executing -> Completed | PartiallyFailed`. Execution never starts
//! without an explicit confirmation step, and the confirmed work list is
//! frozen: any change of input or default status afterwards is an invalid
//! transition.

use std::fmt;

use tracing::warn;

use crate::error::AppError;
use crate::input::{find_duplicate_ids, ParsedInput, RecordRef, RejectedToken};
use crate::report::BatchReport;
use crate::zoho::PendingUpdate;

// ─────────────────────────────────────────────────────────────────────────────
// RunState
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of a single update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No identifiers loaded yet.
    Idle,
    /// A record list is loaded and reviewable.
    IdentifiersLoaded,
    /// The operator confirmed; the work list is frozen.
    Confirmed,
    /// Batches are being dispatched.
    Executing,
    /// Every record succeeded.
    Completed,
    /// At least one record failed or was skipped.
    PartiallyFailed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "Idle",
            RunState::IdentifiersLoaded => "IdentifiersLoaded",
            RunState::Confirmed => "Confirmed",
            RunState::Executing => "Executing",
            RunState::Completed => "Completed",
            RunState::PartiallyFailed => "PartiallyFailed",
        }
    }

    /// True once execution has started; the record list can no longer change.
    fn is_locked(&self) -> bool {
        matches!(
            self,
            RunState::Executing | RunState::Completed | RunState::PartiallyFailed
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the current record list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Paste,
    Tabular,
    CustomView,
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionContext
// ─────────────────────────────────────────────────────────────────────────────

/// Holds everything about one run: the default status, the resolved record
/// list with its rejects and duplicate warnings, the frozen work list once
/// confirmed, and the final report.
///
/// Exactly one input source at a time; loading a new source replaces the
/// previous list and drops a pending confirmation.
#[derive(Debug)]
pub struct SessionContext {
    state: RunState,
    default_status: String,
    source: Option<InputSource>,
    records: Vec<RecordRef>,
    rejects: Vec<RejectedToken>,
    duplicate_ids: Vec<String>,
    pending: Vec<PendingUpdate>,
    report: Option<BatchReport>,
}

impl SessionContext {
    pub fn new(default_status: impl Into<String>) -> Self {
        Self {
            state: RunState::Idle,
            default_status: default_status.into(),
            source: None,
            records: Vec::new(),
            rejects: Vec::new(),
            duplicate_ids: Vec::new(),
            pending: Vec::new(),
            report: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn source(&self) -> Option<InputSource> {
        self.source
    }

    pub fn default_status(&self) -> &str {
        &self.default_status
    }

    /// Accepted records of the current list, input order.
    pub fn records(&self) -> &[RecordRef] {
        &self.records
    }

    /// Tokens/rows rejected while resolving the current list.
    pub fn rejects(&self) -> &[RejectedToken] {
        &self.rejects
    }

    /// Ids that appear more than once in the current list.
    pub fn duplicate_ids(&self) -> &[String] {
        &self.duplicate_ids
    }

    /// The frozen work list. Empty before confirmation.
    pub fn pending(&self) -> &[PendingUpdate] {
        &self.pending
    }

    pub fn report(&self) -> Option<&BatchReport> {
        self.report.as_ref()
    }

    /// Changes the session default status. Allowed only before confirmation;
    /// a confirmed list already has its statuses materialized.
    pub fn set_default_status(&mut self, status: impl Into<String>) -> Result<(), AppError> {
        if !matches!(self.state, RunState::Idle | RunState::IdentifiersLoaded) {
            return Err(AppError::InvalidTransition {
                from: self.state.as_str(),
                to: "IdentifiersLoaded",
            });
        }
        self.default_status = status.into();
        Ok(())
    }

    /// Replaces the record list with the given parsed input.
    ///
    /// Allowed from any state before execution; switching sources drops a
    /// pending confirmation along with the previous list.
    pub fn load(&mut self, source: InputSource, parsed: ParsedInput) -> Result<(), AppError> {
        if self.state.is_locked() {
            return Err(AppError::InvalidTransition {
                from: self.state.as_str(),
                to: "IdentifiersLoaded",
            });
        }

        if !parsed.rejects.is_empty() {
            warn!(
                "{} input token(s) rejected while loading identifiers",
                parsed.rejects.len()
            );
        }

        self.duplicate_ids = find_duplicate_ids(&parsed.records);
        self.records = parsed.records;
        self.rejects = parsed.rejects;
        self.source = Some(source);
        self.pending.clear();
        self.report = None;
        self.state = if self.records.is_empty() {
            RunState::Idle
        } else {
            RunState::IdentifiersLoaded
        };

        Ok(())
    }

    /// Loads ids fetched from a custom view. Every record takes the session
    /// default status at confirmation time.
    pub fn load_view_ids(&mut self, ids: Vec<String>) -> Result<(), AppError> {
        let parsed = ParsedInput {
            records: ids.into_iter().map(RecordRef::new).collect(),
            rejects: Vec::new(),
        };
        self.load(InputSource::CustomView, parsed)
    }

    /// Freezes the work list: each record's status is materialized from its
    /// per-row value or the session default, captured now.
    pub fn confirm(&mut self) -> Result<(), AppError> {
        if self.state != RunState::IdentifiersLoaded {
            return Err(AppError::InvalidTransition {
                from: self.state.as_str(),
                to: "Confirmed",
            });
        }

        self.pending = self
            .records
            .iter()
            .map(|record| PendingUpdate {
                id: record.id.clone(),
                status: record
                    .target_status
                    .clone()
                    .unwrap_or_else(|| self.default_status.clone()),
            })
            .collect();
        self.state = RunState::Confirmed;

        Ok(())
    }

    /// Marks the run as executing and hands out the frozen work list.
    pub fn begin_execution(&mut self) -> Result<Vec<PendingUpdate>, AppError> {
        if self.state != RunState::Confirmed {
            return Err(AppError::InvalidTransition {
                from: self.state.as_str(),
                to: "Executing",
            });
        }
        self.state = RunState::Executing;
        Ok(self.pending.clone())
    }

    /// Records the final report and selects the terminal state.
    pub fn finish(&mut self, report: BatchReport) -> Result<(), AppError> {
        if self.state != RunState::Executing {
            return Err(AppError::InvalidTransition {
                from: self.state.as_str(),
                to: "Completed",
            });
        }

        self.state = if report.fully_successful() {
            RunState::Completed
        } else {
            RunState::PartiallyFailed
        };
        self.report = Some(report);

        Ok(())
    }

    /// Discards the loaded list and a pending confirmation. A run that has
    /// not started executing leaves no trace.
    pub fn abort(&mut self) -> Result<(), AppError> {
        if self.state.is_locked() {
            return Err(AppError::InvalidTransition {
                from: self.state.as_str(),
                to: "Idle",
            });
        }
        self.records.clear();
        self.rejects.clear();
        self.duplicate_ids.clear();
        self.pending.clear();
        self.source = None;
        self.report = None;
        self.state = RunState::Idle;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::parse_pasted;
    use crate::report::UpdateResult;

    fn loaded_session() -> SessionContext {
        let mut session = SessionContext::new("Junk Lead");
        session
            .load(InputSource::Paste, parse_pasted("1001\n1002"))
            .unwrap();
        session
    }

    #[test]
    fn fresh_session_is_idle() {
        let session = SessionContext::new("Junk Lead");

        assert_eq!(session.state(), RunState::Idle);
        assert!(session.records().is_empty());
        assert!(session.source().is_none());
    }

    #[test]
    fn loading_moves_to_identifiers_loaded() {
        let session = loaded_session();

        assert_eq!(session.state(), RunState::IdentifiersLoaded);
        assert_eq!(session.records().len(), 2);
        assert_eq!(session.source(), Some(InputSource::Paste));
    }

    #[test]
    fn loading_only_rejects_stays_idle() {
        let mut session = SessionContext::new("Junk Lead");
        session
            .load(InputSource::Paste, parse_pasted("abc\ndef"))
            .unwrap();

        assert_eq!(session.state(), RunState::Idle);
        assert_eq!(session.rejects().len(), 2);
    }

    #[test]
    fn confirm_materializes_default_status() {
        let mut session = loaded_session();
        session.confirm().unwrap();

        assert_eq!(session.state(), RunState::Confirmed);
        assert_eq!(session.pending().len(), 2);
        assert!(session.pending().iter().all(|p| p.status == "Junk Lead"));
    }

    #[test]
    fn confirm_honors_per_row_status_over_default() {
        let mut session = SessionContext::new("Junk Lead");
        let parsed = crate::input::parse_tabular(
            b"id,status\n1001,Closed Lost\n1002,\n",
        )
        .unwrap();
        session.load(InputSource::Tabular, parsed).unwrap();
        session.confirm().unwrap();

        assert_eq!(session.pending()[0].status, "Closed Lost");
        assert_eq!(session.pending()[1].status, "Junk Lead");
    }

    #[test]
    fn default_status_is_captured_at_confirmation_time() {
        let mut session = loaded_session();
        session.set_default_status("On Hold").unwrap();
        session.confirm().unwrap();

        assert!(session.pending().iter().all(|p| p.status == "On Hold"));
    }

    #[test]
    fn default_status_is_frozen_after_confirmation() {
        let mut session = loaded_session();
        session.confirm().unwrap();

        let result = session.set_default_status("On Hold");

        assert!(matches!(result, Err(AppError::InvalidTransition { .. })));
        assert!(session.pending().iter().all(|p| p.status == "Junk Lead"));
    }

    #[test]
    fn confirm_requires_loaded_identifiers() {
        let mut session = SessionContext::new("Junk Lead");

        let result = session.confirm();

        assert!(matches!(
            result,
            Err(AppError::InvalidTransition {
                from: "Idle",
                to: "Confirmed"
            })
        ));
    }

    #[test]
    fn execution_requires_confirmation() {
        let mut session = loaded_session();

        let result = session.begin_execution();

        assert!(matches!(
            result,
            Err(AppError::InvalidTransition {
                from: "IdentifiersLoaded",
                to: "Executing"
            })
        ));
    }

    #[test]
    fn reloading_drops_a_pending_confirmation() {
        let mut session = loaded_session();
        session.confirm().unwrap();

        session
            .load(InputSource::Paste, parse_pasted("2001"))
            .unwrap();

        assert_eq!(session.state(), RunState::IdentifiersLoaded);
        assert!(session.pending().is_empty());
        assert_eq!(session.records().len(), 1);
    }

    #[test]
    fn loading_is_rejected_once_executing() {
        let mut session = loaded_session();
        session.confirm().unwrap();
        session.begin_execution().unwrap();

        let result = session.load(InputSource::Paste, parse_pasted("2001"));

        assert!(matches!(result, Err(AppError::InvalidTransition { .. })));
    }

    #[test]
    fn finish_selects_terminal_state_from_report() {
        let mut session = loaded_session();
        session.confirm().unwrap();
        session.begin_execution().unwrap();
        session
            .finish(BatchReport::from_results(vec![
                UpdateResult::success("1001", "Junk Lead"),
                UpdateResult::success("1002", "Junk Lead"),
            ]))
            .unwrap();

        assert_eq!(session.state(), RunState::Completed);

        let mut session = loaded_session();
        session.confirm().unwrap();
        session.begin_execution().unwrap();
        session
            .finish(BatchReport::from_results(vec![
                UpdateResult::success("1001", "Junk Lead"),
                UpdateResult::failed("1002", "Junk Lead", "nope".into()),
            ]))
            .unwrap();

        assert_eq!(session.state(), RunState::PartiallyFailed);
    }

    #[test]
    fn duplicates_are_warned_and_kept() {
        let mut session = SessionContext::new("Junk Lead");
        session
            .load(InputSource::Paste, parse_pasted("1001\n1001"))
            .unwrap();

        assert_eq!(session.records().len(), 2);
        assert_eq!(session.duplicate_ids(), ["1001"]);
    }

    #[test]
    fn view_ids_load_with_default_status() {
        let mut session = SessionContext::new("On Hold");
        session
            .load_view_ids(vec!["1".into(), "2".into()])
            .unwrap();
        session.confirm().unwrap();

        assert_eq!(session.source(), Some(InputSource::CustomView));
        assert!(session.pending().iter().all(|p| p.status == "On Hold"));
    }

    #[test]
    fn abort_before_execution_clears_everything() {
        let mut session = loaded_session();
        session.confirm().unwrap();
        session.abort().unwrap();

        assert_eq!(session.state(), RunState::Idle);
        assert!(session.records().is_empty());
        assert!(session.pending().is_empty());
        assert!(session.source().is_none());
    }
}
