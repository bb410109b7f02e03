//! Manual ON DELETE CASCADE across logical databases.
//!
//! Parent and child tables live on different servers, so no engine can
//! enforce the relationship. Deleting a parent issues one DELETE per child
//! table, most dependent first, then deletes the parent row. Steps are
//! independent statements: nothing is rolled back, and a failed step does
//! not stop the ones after it.

use crate::executor::log_failure;
use crate::replication::ReplicatedExecutor;
use crate::repository::{APPOINTMENTS_DB, BILLING_DB, MEDICAL_DB, PATIENTS_DB};
use crate::statement::{QueryOutcome, Statement};
use core_types::EntityKind;
use std::fmt;

/// One DELETE of the form `DELETE FROM {table} WHERE {key_column} = ?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeStep {
    pub database: &'static str,
    pub table: &'static str,
    pub key_column: &'static str,
}

impl CascadeStep {
    const fn new(database: &'static str, table: &'static str, key_column: &'static str) -> Self {
        Self {
            database,
            table,
            key_column,
        }
    }

    pub fn statement(&self, id: i64) -> Statement {
        Statement::delete(format!("DELETE FROM {} WHERE {} = ?", self.table, self.key_column)).bind(id)
    }
}

impl fmt::Display for CascadeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.database, self.table, self.key_column)
    }
}

const PATIENT_DEPENDENTS: [CascadeStep; 3] = [
    CascadeStep::new(BILLING_DB, "invoices", "patient_id"),
    CascadeStep::new(APPOINTMENTS_DB, "appointments", "patient_id"),
    CascadeStep::new(MEDICAL_DB, "medical_records", "patient_id"),
];
const PATIENT_ROOT: CascadeStep = CascadeStep::new(PATIENTS_DB, "patients", "patient_id");

const DOCTOR_DEPENDENTS: [CascadeStep; 2] = [
    CascadeStep::new(MEDICAL_DB, "medical_records", "doctor_id"),
    CascadeStep::new(APPOINTMENTS_DB, "appointments", "doctor_id"),
];
const DOCTOR_ROOT: CascadeStep = CascadeStep::new(APPOINTMENTS_DB, "doctors", "doctor_id");

const APPOINTMENT_DEPENDENTS: [CascadeStep; 2] = [
    CascadeStep::new(BILLING_DB, "invoices", "appointment_id"),
    CascadeStep::new(MEDICAL_DB, "medical_records", "appointment_id"),
];
const APPOINTMENT_ROOT: CascadeStep = CascadeStep::new(APPOINTMENTS_DB, "appointments", "appointment_id");

/// The fixed, ordered delete sequence for one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadePlan {
    pub kind: EntityKind,
    pub dependents: &'static [CascadeStep],
    pub root: CascadeStep,
}

impl CascadePlan {
    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Patient => Self {
                kind,
                dependents: &PATIENT_DEPENDENTS,
                root: PATIENT_ROOT,
            },
            EntityKind::Doctor => Self {
                kind,
                dependents: &DOCTOR_DEPENDENTS,
                root: DOCTOR_ROOT,
            },
            EntityKind::Appointment => Self {
                kind,
                dependents: &APPOINTMENT_DEPENDENTS,
                root: APPOINTMENT_ROOT,
            },
        }
    }

    /// Every plan, one per entity kind.
    pub fn all() -> impl Iterator<Item = CascadePlan> {
        EntityKind::ALL.into_iter().map(Self::for_kind)
    }

    /// Every logical database the plan writes to, in delete order.
    pub fn databases(&self) -> impl Iterator<Item = &'static str> {
        let root = self.root.database;
        self.dependents
            .iter()
            .map(|s| s.database)
            .chain(std::iter::once(root))
    }
}

/// Lifecycle of a single cascade invocation. There is no rollback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadePhase {
    Pending,
    DependentsInFlight,
    RootDeleteAttempted,
    Completed,
    RootDeleteFailed,
}

impl CascadePhase {
    pub fn can_advance_to(self, next: CascadePhase) -> bool {
        use CascadePhase::*;
        matches!(
            (self, next),
            (Pending, DependentsInFlight)
                | (DependentsInFlight, RootDeleteAttempted)
                | (RootDeleteAttempted, Completed)
                | (RootDeleteAttempted, RootDeleteFailed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CascadePhase::Completed | CascadePhase::RootDeleteFailed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Deleted { rows: u64 },
    Failed { error: String },
}

impl StepResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, StepResult::Deleted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step: CascadeStep,
    pub result: StepResult,
}

/// Everything one invocation did, in the order it did it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    pub kind: EntityKind,
    pub id: i64,
    pub dependents: Vec<StepReport>,
    pub root: Option<StepReport>,
    pub phase: CascadePhase,
    pub history: Vec<CascadePhase>,
}

impl CascadeReport {
    fn new(kind: EntityKind, id: i64) -> Self {
        Self {
            kind,
            id,
            dependents: Vec::new(),
            root: None,
            phase: CascadePhase::Pending,
            history: vec![CascadePhase::Pending],
        }
    }

    fn advance(&mut self, next: CascadePhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal cascade transition {:?} -> {:?}",
            self.phase,
            next
        );
        self.phase = next;
        self.history.push(next);
    }

    /// True when the root row's DELETE went through. Says nothing about dependents.
    pub fn succeeded(&self) -> bool {
        self.phase == CascadePhase::Completed
    }

    pub fn failed_dependents(&self) -> impl Iterator<Item = &StepReport> {
        self.dependents.iter().filter(|s| !s.result.is_ok())
    }
}

#[derive(Clone)]
pub struct CascadeCoordinator {
    executor: ReplicatedExecutor,
}

impl CascadeCoordinator {
    /// Deletes go through the replicating executor so backups see them too.
    pub fn new(executor: ReplicatedExecutor) -> Self {
        Self { executor }
    }

    /// Returns the root delete outcome only.
    pub async fn delete_with_dependents(&self, kind: EntityKind, id: i64) -> bool {
        self.run(kind, id).await.succeeded()
    }

    pub async fn run(&self, kind: EntityKind, id: i64) -> CascadeReport {
        let plan = CascadePlan::for_kind(kind);
        let mut report = CascadeReport::new(kind, id);
        tracing::info!(%kind, id, "Starting cascading delete");

        report.advance(CascadePhase::DependentsInFlight);
        for step in plan.dependents {
            let result = self.delete_step(step, id).await;
            if let StepResult::Failed { error } = &result {
                tracing::warn!(%kind, id, step = %step, error = %error, "Cascade step failed, continuing");
            }
            report.dependents.push(StepReport { step: *step, result });
        }

        report.advance(CascadePhase::RootDeleteAttempted);
        let result = self.delete_step(&plan.root, id).await;
        let next = if result.is_ok() {
            CascadePhase::Completed
        } else {
            CascadePhase::RootDeleteFailed
        };
        report.root = Some(StepReport {
            step: plan.root,
            result,
        });
        report.advance(next);
        debug_assert!(report.phase.is_terminal());

        match report.phase {
            CascadePhase::Completed => tracing::info!(
                %kind,
                id,
                failed_dependents = report.failed_dependents().count(),
                "Cascading delete finished"
            ),
            _ => tracing::error!(%kind, id, "Root delete failed"),
        }
        report
    }

    async fn delete_step(&self, step: &CascadeStep, id: i64) -> StepResult {
        let statement = step.statement(id);
        match self.executor.try_execute(step.database, &statement).await {
            Ok(QueryOutcome::Affected { rows }) => StepResult::Deleted { rows },
            Ok(other) => StepResult::Failed {
                error: format!("unexpected outcome {other:?}"),
            },
            Err(e) => {
                log_failure(step.database, &statement, &e);
                StepResult::Failed { error: e.to_string() }
            }
        }
    }
}
