//! One-time setup: databases, tables, and a small randomized sample data set.

use crate::error::DbError;
use crate::replication::ReplicatedExecutor;
use crate::repository::{APPOINTMENTS_DB, BILLING_DB, HospitalRepository, MEDICAL_DB, PATIENTS_DB};
use crate::statement::Statement;
use chrono::{Duration, Local, NaiveDate, NaiveTime};
use configuration::Driver;
use core_types::{
    AppointmentStatus, NewAppointment, NewDoctor, NewInvoice, NewMedicalRecord, NewPatient, PaymentStatus,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

const PATIENTS_TABLE: &str = "CREATE TABLE IF NOT EXISTS patients (
    patient_id {pk},
    first_name VARCHAR(50) NOT NULL,
    last_name VARCHAR(50) NOT NULL,
    date_of_birth DATE NOT NULL,
    gender VARCHAR(10),
    address VARCHAR(255),
    phone VARCHAR(20),
    email VARCHAR(100),
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at {updated_at}
)";

const MEDICAL_RECORDS_TABLE: &str = "CREATE TABLE IF NOT EXISTS medical_records (
    record_id {pk},
    patient_id INT NOT NULL,
    doctor_id INT,
    appointment_id INT,
    diagnosis TEXT,
    treatment TEXT,
    notes TEXT,
    record_date DATE NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at {updated_at}
)";

const DOCTORS_TABLE: &str = "CREATE TABLE IF NOT EXISTS doctors (
    doctor_id {pk},
    first_name VARCHAR(50) NOT NULL,
    last_name VARCHAR(50) NOT NULL,
    specialization VARCHAR(100),
    phone VARCHAR(20),
    email VARCHAR(100),
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at {updated_at}
)";

const APPOINTMENTS_TABLE: &str = "CREATE TABLE IF NOT EXISTS appointments (
    appointment_id {pk},
    patient_id INT NOT NULL,
    doctor_id INT NOT NULL,
    appointment_date DATE NOT NULL,
    appointment_time TIME NOT NULL,
    status VARCHAR(20) DEFAULT 'Scheduled',
    notes TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at {updated_at}
)";

const INVOICES_TABLE: &str = "CREATE TABLE IF NOT EXISTS invoices (
    invoice_id {pk},
    patient_id INT NOT NULL,
    appointment_id INT,
    amount DECIMAL(10, 2) NOT NULL,
    payment_status VARCHAR(20) DEFAULT 'Pending',
    issue_date DATE NOT NULL,
    due_date DATE NOT NULL,
    payment_date DATE,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at {updated_at}
)";

/// Tables owned by a primary logical database. A backup gets its primary's set.
pub fn tables_for(primary: &str) -> &'static [&'static str] {
    match primary {
        PATIENTS_DB => &[PATIENTS_TABLE],
        MEDICAL_DB => &[MEDICAL_RECORDS_TABLE],
        APPOINTMENTS_DB => &[DOCTORS_TABLE, APPOINTMENTS_TABLE],
        BILLING_DB => &[INVOICES_TABLE],
        _ => &[],
    }
}

/// Fills the per-engine placeholders of a table template.
pub fn render_ddl(template: &str, driver: Driver) -> String {
    let (pk, updated_at) = match driver {
        Driver::Mysql => (
            "INT AUTO_INCREMENT PRIMARY KEY",
            "TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP",
        ),
        Driver::Sqlite => ("INTEGER PRIMARY KEY AUTOINCREMENT", "TIMESTAMP DEFAULT CURRENT_TIMESTAMP"),
    };
    template.replace("{pk}", pk).replace("{updated_at}", updated_at)
}

/// Which logical databases were prepared and how many tables each received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    pub prepared: Vec<(String, usize)>,
}

impl SchemaReport {
    pub fn table_count(&self) -> usize {
        self.prepared.iter().map(|(_, n)| n).sum()
    }
}

/// Row counts written by [`SchemaInitializer::seed_sample_data`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub patients: usize,
    pub doctors: usize,
    pub appointments: usize,
    pub invoices: usize,
    pub medical_records: usize,
}

pub struct SchemaInitializer {
    executor: ReplicatedExecutor,
    repository: HospitalRepository,
}

impl SchemaInitializer {
    pub fn new(executor: ReplicatedExecutor) -> Self {
        let repository = HospitalRepository::new(executor.clone());
        Self { executor, repository }
    }

    /// The primary whose tables `database` should carry, if any.
    fn primary_of<'a>(&'a self, database: &'a str) -> Option<&'a str> {
        if !tables_for(database).is_empty() {
            return Some(database);
        }
        self.executor
            .executor()
            .resolver()
            .settings()
            .backups
            .iter()
            .find(|(_, backup)| backup.as_str() == database)
            .map(|(primary, _)| primary.as_str())
    }

    /// Creates every routed database and its tables. Safe to run repeatedly.
    pub async fn create_schema(&self) -> Result<SchemaReport, DbError> {
        let inner = self.executor.executor();
        let mut report = SchemaReport::default();

        for database in inner.resolver().logical_databases() {
            let Some(primary) = self.primary_of(database) else {
                tracing::warn!(database, "No table set known for database, skipping");
                continue;
            };
            let target = inner.resolver().resolve(database)?;
            inner.connector().ensure_database(&target).await?;

            let tables = tables_for(primary);
            for template in tables {
                let ddl = Statement::ddl(render_ddl(template, target.driver));
                inner.try_execute(database, &ddl).await?;
            }
            tracing::info!(database, server = %target.server, tables = tables.len(), "Schema ready");
            report.prepared.push((database.to_string(), tables.len()));
        }
        Ok(report)
    }

    /// Inserts the sample rows with fresh randomness. `progress` is called
    /// with the table name before each table is filled.
    pub async fn seed_sample_data<F>(&self, progress: F) -> SeedReport
    where
        F: FnMut(&str) + Send,
    {
        let mut rng = StdRng::from_entropy();
        self.seed_with_rng(&mut rng, progress).await
    }

    /// Inserts the sample rows. A failed insert is logged and skipped; the
    /// report counts only rows that made it to the primary.
    pub async fn seed_with_rng<R, F>(&self, rng: &mut R, mut progress: F) -> SeedReport
    where
        R: Rng + Send,
        F: FnMut(&str) + Send,
    {
        let today = Local::now().date_naive();
        let mut report = SeedReport::default();

        progress("patients");
        let mut patient_ids = Vec::new();
        for patient in sample_patients() {
            match self.repository.add_patient(&patient).await {
                Ok(id) => {
                    tracing::debug!(id, name = %format!("{} {}", patient.first_name, patient.last_name), "Added patient");
                    patient_ids.push(id);
                }
                Err(e) => tracing::warn!(error = %e, "Skipping sample patient"),
            }
        }
        report.patients = patient_ids.len();

        progress("doctors");
        let mut doctor_ids = Vec::new();
        for doctor in sample_doctors() {
            match self.repository.add_doctor(&doctor).await {
                Ok(id) => doctor_ids.push(id),
                Err(e) => tracing::warn!(error = %e, "Skipping sample doctor"),
            }
        }
        report.doctors = doctor_ids.len();

        progress("appointments");
        let mut appointments: Vec<(i64, i64)> = Vec::new();
        let times = ["09:00", "10:00", "11:00", "13:00", "14:00", "15:00", "16:00"];
        let statuses = [
            AppointmentStatus::Scheduled,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ];
        for _ in 0..15 {
            let (Some(&patient_id), Some(&doctor_id)) = (patient_ids.choose(rng), doctor_ids.choose(rng)) else {
                break;
            };
            let appointment = NewAppointment {
                patient_id,
                doctor_id,
                appointment_date: today + Duration::days(rng.gen_range(1..=30)),
                appointment_time: times
                    .choose(rng)
                    .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M").ok())
                    .unwrap_or(NaiveTime::MIN),
                status: statuses.choose(rng).copied().unwrap_or_default(),
                notes: Some(format!("Appointment for patient {patient_id} with doctor {doctor_id}")),
            };
            match self.repository.add_appointment(&appointment).await {
                Ok(id) => appointments.push((id, patient_id)),
                Err(e) => tracing::warn!(error = %e, "Skipping sample appointment"),
            }
        }
        report.appointments = appointments.len();

        progress("invoices");
        let payment_statuses = [PaymentStatus::Pending, PaymentStatus::Paid, PaymentStatus::Cancelled];
        for _ in 0..10 {
            let Some(&patient_id) = patient_ids.choose(rng) else {
                break;
            };
            let issue_date = today - Duration::days(rng.gen_range(0..30));
            let payment_status = payment_statuses.choose(rng).copied().unwrap_or_default();
            let invoice = NewInvoice {
                patient_id,
                appointment_id: appointments.choose(rng).map(|(id, _)| *id),
                amount: Decimal::new(rng.gen_range(5_000..=50_000), 2),
                payment_status,
                issue_date,
                due_date: issue_date + Duration::days(30),
                payment_date: (payment_status == PaymentStatus::Paid)
                    .then(|| issue_date + Duration::days(rng.gen_range(1..=25))),
            };
            match self.repository.add_invoice(&invoice).await {
                Ok(_) => report.invoices += 1,
                Err(e) => tracing::warn!(error = %e, "Skipping sample invoice"),
            }
        }

        progress("medical records");
        for _ in 0..12 {
            let Some(&patient_id) = patient_ids.choose(rng) else {
                break;
            };
            let own: Vec<i64> = appointments
                .iter()
                .filter(|(_, p)| *p == patient_id)
                .map(|(id, _)| *id)
                .collect();
            let record = NewMedicalRecord {
                patient_id,
                doctor_id: doctor_ids.choose(rng).copied(),
                appointment_id: own.choose(rng).copied(),
                diagnosis: DIAGNOSES.choose(rng).map(|s| s.to_string()),
                treatment: TREATMENTS.choose(rng).map(|s| s.to_string()),
                notes: Some("Patient responded well to treatment.".to_string()),
                record_date: today - Duration::days(rng.gen_range(1..=60)),
            };
            match self.repository.add_medical_record(&record).await {
                Ok(_) => report.medical_records += 1,
                Err(e) => tracing::warn!(error = %e, "Skipping sample medical record"),
            }
        }

        tracing::info!(?report, "Sample data inserted");
        report
    }
}

const DIAGNOSES: [&str; 10] = [
    "Common Cold",
    "Influenza",
    "Hypertension",
    "Type 2 Diabetes",
    "Migraine",
    "Allergic Rhinitis",
    "Bronchitis",
    "Gastroenteritis",
    "Urinary Tract Infection",
    "Osteoarthritis",
];

const TREATMENTS: [&str; 10] = [
    "Rest and fluids",
    "Antibiotics prescribed",
    "Blood pressure medication",
    "Insulin therapy",
    "Pain management",
    "Antihistamines",
    "Bronchodilators",
    "Rehydration therapy",
    "Antibiotics and increased fluid intake",
    "Physical therapy and pain management",
];

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

fn sample_patients() -> Vec<NewPatient> {
    [
        ("John", "Doe", date(1980, 5, 15), "Male", "123 Main St", "555-1234", "john.doe@email.com"),
        ("Jane", "Smith", date(1975, 8, 22), "Female", "456 Oak Ave", "555-5678", "jane.smith@email.com"),
        ("Michael", "Johnson", date(1990, 3, 10), "Male", "789 Pine Rd", "555-9012", "michael.j@email.com"),
        ("Emily", "Williams", date(1985, 11, 30), "Female", "321 Cedar Ln", "555-3456", "emily.w@email.com"),
        ("David", "Brown", date(1972, 7, 18), "Male", "654 Birch Blvd", "555-7890", "david.b@email.com"),
    ]
    .into_iter()
    .map(|(first, last, dob, gender, address, phone, email)| NewPatient {
        first_name: first.to_string(),
        last_name: last.to_string(),
        date_of_birth: dob,
        gender: Some(gender.to_string()),
        address: Some(address.to_string()),
        phone: Some(phone.to_string()),
        email: Some(email.to_string()),
    })
    .collect()
}

fn sample_doctors() -> Vec<NewDoctor> {
    [
        ("Robert", "Miller", "Cardiology", "555-2468", "robert.m@hospital.com"),
        ("Sarah", "Taylor", "Neurology", "555-1357", "sarah.t@hospital.com"),
        ("James", "Anderson", "Orthopedics", "555-3690", "james.a@hospital.com"),
        ("Jennifer", "Thomas", "Pediatrics", "555-8024", "jennifer.t@hospital.com"),
        ("William", "Jackson", "Dermatology", "555-7913", "william.j@hospital.com"),
    ]
    .into_iter()
    .map(|(first, last, specialization, phone, email)| NewDoctor {
        first_name: first.to_string(),
        last_name: last.to_string(),
        specialization: Some(specialization.to_string()),
        phone: Some(phone.to_string()),
        email: Some(email.to_string()),
    })
    .collect()
}
