use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

use crate::application::analyzer::DependencyAnalyzer;
use crate::application::batch::{BatchMutator, BatchOutcome};
use crate::domain::analysis::{DeleteChoice, DeleteTargets, DeletionSummary};
use crate::domain::ports::DeletePrompt;
use crate::domain::schema::EntityKind;

/// States of one delete interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Idle,
    Analyzing,
    NoDependents,
    AwaitingUserChoice,
    Executing,
    Done,
    Failed,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStatus {
    Success,
    Cancelled,
    Error,
}

/// What `confirm_and_delete` reports back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub status: DeleteStatus,
    pub message: Option<String>,
    /// Kinds that had rows deleted; empty unless `status` is `Success`.
    pub affected: Vec<EntityKind>,
    pub rows_deleted: usize,
}

impl DeleteOutcome {
    fn cancelled(message: impl Into<String>) -> Self {
        Self {
            status: DeleteStatus::Cancelled,
            message: Some(message.into()),
            affected: Vec::new(),
            rows_deleted: 0,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: DeleteStatus::Error,
            message: Some(message.into()),
            affected: Vec::new(),
            rows_deleted: 0,
        }
    }
}

// ─── Deletion Flow ───

/// Drives analyze → ask → delete for one selection.
///
/// Cancelling returns to `Idle` before any write; once `Executing` is
/// entered the delete runs to completion or failure.
pub struct DeletionFlow<'a> {
    analyzer: &'a DependencyAnalyzer,
    mutator: &'a BatchMutator,
    prompt: &'a dyn DeletePrompt,
    state: FlowState,
    history: Vec<FlowState>,
}

impl<'a> DeletionFlow<'a> {
    pub fn new(
        analyzer: &'a DependencyAnalyzer,
        mutator: &'a BatchMutator,
        prompt: &'a dyn DeletePrompt,
    ) -> Self {
        Self {
            analyzer,
            mutator,
            prompt,
            state: FlowState::Idle,
            history: vec![FlowState::Idle],
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[FlowState] {
        &self.history
    }

    fn enter(&mut self, next: FlowState) {
        debug!(from = %self.state, to = %next, "delete flow transition");
        self.state = next;
        self.history.push(next);
    }

    pub async fn run(&mut self, kind: EntityKind, ids: &[String]) -> DeleteOutcome {
        if ids.iter().all(|id| id.trim().is_empty()) {
            return DeleteOutcome::error("nothing selected");
        }

        self.enter(FlowState::Analyzing);
        let analysis = match self.analyzer.analyze(kind, ids).await {
            Ok(a) => a,
            Err(e) => {
                self.enter(FlowState::Failed);
                return DeleteOutcome::error(e.to_string());
            }
        };
        if analysis.selected_count() == 0 {
            self.enter(FlowState::Failed);
            return DeleteOutcome::error(format!("none of the selected {} exist", kind));
        }

        let targets = if analysis.has_dependents() {
            self.enter(FlowState::AwaitingUserChoice);
            let summary = DeletionSummary::from_analysis(&analysis);
            match self.prompt.choose(&summary).await {
                DeleteChoice::Cancel => {
                    self.enter(FlowState::Idle);
                    return DeleteOutcome::cancelled("delete cancelled");
                }
                DeleteChoice::Safe if !summary.offers_safe() => {
                    self.enter(FlowState::Idle);
                    return DeleteOutcome::cancelled("nothing is safe to delete");
                }
                DeleteChoice::Safe => analysis.safe_targets(),
                DeleteChoice::Cascade => analysis.cascade_delete_list.clone(),
            }
        } else {
            self.enter(FlowState::NoDependents);
            if !self.prompt.confirm(kind, analysis.selected_count()).await {
                self.enter(FlowState::Idle);
                return DeleteOutcome::cancelled("delete cancelled");
            }
            analysis.selection_targets()
        };

        self.execute(&targets).await
    }

    async fn execute(&mut self, targets: &DeleteTargets) -> DeleteOutcome {
        self.enter(FlowState::Executing);
        match self.mutator.batch_delete(targets).await {
            BatchOutcome::Success {
                rows_deleted,
                mappings_deleted,
            } => {
                self.enter(FlowState::Done);
                info!(rows_deleted, mappings_deleted, "delete flow done");
                DeleteOutcome {
                    status: DeleteStatus::Success,
                    message: Some(format!("deleted {} record(s)", rows_deleted)),
                    affected: targets
                        .iter()
                        .filter(|(_, ids)| !ids.is_empty())
                        .map(|(kind, _)| kind)
                        .collect(),
                    rows_deleted,
                }
            }
            BatchOutcome::Error { message } => {
                self.enter(FlowState::Failed);
                DeleteOutcome::error(message)
            }
        }
    }
}
