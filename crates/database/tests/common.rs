use chrono::{NaiveDate, NaiveTime};
use configuration::Settings;
use core_types::{AppointmentStatus, NewAppointment, NewDoctor, NewPatient, SqlValue};
use database::{HospitalRepository, QueryOutcome, ReplicatedExecutor, SchemaInitializer, Statement};
use std::sync::Arc;
use tempfile::TempDir;

/// Four primaries and four backups, each a SQLite file under a temp directory.
pub struct Hospital {
    pub _dir: TempDir,
    pub executor: ReplicatedExecutor,
    pub repo: HospitalRepository,
}

pub async fn hospital() -> Hospital {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::sqlite_layout(dir.path());
    settings.executor.retry_backoff_ms = 1;
    let executor = database::connect(Arc::new(settings));
    SchemaInitializer::new(executor.clone())
        .create_schema()
        .await
        .unwrap();
    let repo = HospitalRepository::new(executor.clone());
    Hospital {
        _dir: dir,
        executor,
        repo,
    }
}

/// Runs a statement on exactly one database, bypassing replication.
#[allow(dead_code)]
pub async fn raw(hospital: &Hospital, database: &str, statement: Statement) -> QueryOutcome {
    hospital
        .executor
        .executor()
        .try_execute(database, &statement)
        .await
        .unwrap()
}

#[allow(dead_code)]
pub async fn count(hospital: &Hospital, database: &str, table: &str, column: &str, id: i64) -> i64 {
    let rows = raw(
        hospital,
        database,
        Statement::select(format!("SELECT COUNT(*) FROM {table} WHERE {column} = ?")).bind(id),
    )
    .await
    .rows()
    .unwrap();
    rows[0][0].as_i64().unwrap()
}

#[allow(dead_code)]
pub fn patient(first: &str, last: &str) -> NewPatient {
    NewPatient {
        first_name: first.to_string(),
        last_name: last.to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1980, 5, 15).unwrap(),
        gender: Some("Female".to_string()),
        address: Some("123 Main St".to_string()),
        phone: Some("555-1234".to_string()),
        email: None,
    }
}

#[allow(dead_code)]
pub fn doctor(first: &str, last: &str) -> NewDoctor {
    NewDoctor {
        first_name: first.to_string(),
        last_name: last.to_string(),
        specialization: Some("Cardiology".to_string()),
        phone: None,
        email: None,
    }
}

#[allow(dead_code)]
pub fn appointment(patient_id: i64, doctor_id: i64, day: u32) -> NewAppointment {
    NewAppointment {
        patient_id,
        doctor_id,
        appointment_date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
        appointment_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        status: AppointmentStatus::Scheduled,
        notes: Some(format!("Appointment for patient {patient_id}")),
    }
}

#[allow(dead_code)]
pub fn text(value: &str) -> SqlValue {
    SqlValue::from(value)
}
