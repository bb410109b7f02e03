//! # Hospital Database Crate
//!
//! The data-access layer for a hospital data set split across several
//! independent database servers. Each table lives in exactly one logical
//! database; the engine cannot enforce relationships between them, so this
//! crate does it in application code.
//!
//! ## Architectural Principles
//!
//! - **Routing by name:** callers address a logical database ("billing_db"),
//!   never a host. `ConnectionResolver` maps the name to a server from the
//!   configuration.
//! - **One connection per call:** every attempt opens a fresh session and
//!   closes it before returning. There is no pool.
//! - **Best-effort mirroring:** successful writes are repeated on the
//!   configured backup; a failed mirror is logged and never fails the caller.
//! - **Manual cascades:** deleting a patient, doctor or appointment deletes its
//!   dependents in other databases first, then the row itself.
//!
//! ## Public API
//!
//! - `connect`: wires resolver, sqlx driver and replicator from `Settings`.
//! - `QueryExecutor` / `ReplicatedExecutor`: run a tagged `Statement`.
//! - `CascadeCoordinator`: cross-database delete of an entity and its dependents.
//! - `HospitalRepository`: typed operations over the four hospital databases.
//! - `SchemaInitializer`: creates tables and inserts sample data.
//! - `DbError`: the failure kinds every operation can report.

pub mod cascade;
pub mod connection;
pub mod driver;
pub mod error;
pub mod executor;
pub mod replication;
pub mod repository;
pub mod schema;
pub mod statement;

pub use cascade::{CascadeCoordinator, CascadePhase, CascadePlan, CascadeReport, CascadeStep, StepResult};
pub use connection::{ConnectionResolver, ConnectionTarget, Connector, Session, WriteSummary, connect, connect_with};
pub use driver::SqlxConnector;
pub use error::DbError;
pub use executor::{QueryExecutor, RetryPolicy};
pub use replication::{ReplicatedExecutor, ReplicationStatus};
pub use repository::{APPOINTMENTS_DB, BILLING_DB, HospitalRepository, MEDICAL_DB, PATIENTS_DB};
pub use schema::{SchemaInitializer, SchemaReport, SeedReport};
pub use statement::{QueryOutcome, Statement, StatementKind};
