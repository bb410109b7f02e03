use crate::cascade::{CascadeCoordinator, CascadeReport};
use crate::error::DbError;
use crate::replication::ReplicatedExecutor;
use crate::statement::{QueryOutcome, Statement};
use core_types::{
    Appointment, AppointmentDetails, AppointmentStatus, Doctor, EntityKind, Invoice, InvoiceChanges,
    InvoiceDetails, MedicalRecord, NewAppointment, NewDoctor, NewInvoice, NewMedicalRecord, NewPatient, Patient,
    PaymentStatus, Row, RowSet, SqlValue,
};
use std::collections::HashMap;

pub const PATIENTS_DB: &str = "patients_db";
pub const APPOINTMENTS_DB: &str = "appointments_db";
pub const BILLING_DB: &str = "billing_db";
pub const MEDICAL_DB: &str = "medical_db";

/// The `HospitalRepository` provides a typed interface over the routed,
/// replicated executor. Each method talks to exactly the logical database
/// that owns the table; writes are mirrored to backups automatically.
#[derive(Clone)]
pub struct HospitalRepository {
    executor: ReplicatedExecutor,
    cascade: CascadeCoordinator,
}

impl HospitalRepository {
    pub fn new(executor: ReplicatedExecutor) -> Self {
        let cascade = CascadeCoordinator::new(executor.clone());
        Self { executor, cascade }
    }

    pub fn executor(&self) -> &ReplicatedExecutor {
        &self.executor
    }

    pub fn cascade(&self) -> &CascadeCoordinator {
        &self.cascade
    }

    async fn insert(&self, database: &str, statement: Statement) -> Result<i64, DbError> {
        match self.executor.try_execute(database, &statement).await? {
            QueryOutcome::Inserted { id } => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    async fn modify(&self, database: &str, statement: Statement) -> Result<u64, DbError> {
        match self.executor.try_execute(database, &statement).await? {
            QueryOutcome::Affected { rows } => Ok(rows),
            other => Err(unexpected(other)),
        }
    }

    async fn select(&self, database: &str, statement: Statement) -> Result<RowSet, DbError> {
        match self.executor.try_execute(database, &statement).await? {
            QueryOutcome::Rows(rows) => Ok(rows),
            other => Err(unexpected(other)),
        }
    }

    /// Fails with [`DbError::MissingReference`] unless `table` has a row keyed `id`.
    ///
    /// Parents and children live in different databases, so this lookup is
    /// the only referential check there is. It is not atomic with the write
    /// that follows it.
    async fn require(&self, database: &str, table: &'static str, key_column: &str, id: i64) -> Result<(), DbError> {
        let rows = self
            .select(
                database,
                Statement::select(format!("SELECT {key_column} FROM {table} WHERE {key_column} = ?")).bind(id),
            )
            .await?;
        if rows.is_empty() {
            tracing::warn!(database, table, id, "Referenced row does not exist");
            return Err(DbError::MissingReference { table, id });
        }
        Ok(())
    }

    async fn require_patient(&self, patient_id: i64) -> Result<(), DbError> {
        self.require(PATIENTS_DB, "patients", "patient_id", patient_id).await
    }

    async fn require_doctor(&self, doctor_id: i64) -> Result<(), DbError> {
        self.require(APPOINTMENTS_DB, "doctors", "doctor_id", doctor_id).await
    }

    async fn require_appointment(&self, appointment_id: i64) -> Result<(), DbError> {
        self.require(APPOINTMENTS_DB, "appointments", "appointment_id", appointment_id)
            .await
    }

    async fn patient_names(&self) -> Result<HashMap<i64, String>, DbError> {
        Ok(self
            .list_patients()
            .await?
            .into_iter()
            .map(|p| (p.patient_id, p.full_name()))
            .collect())
    }

    // --- Patients ---

    pub async fn add_patient(&self, patient: &NewPatient) -> Result<i64, DbError> {
        let stmt = Statement::insert(
            "INSERT INTO patients (first_name, last_name, date_of_birth, gender, address, phone, email) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(patient.first_name.as_str())
        .bind(patient.last_name.as_str())
        .bind(patient.date_of_birth)
        .bind(patient.gender.clone())
        .bind(patient.address.clone())
        .bind(patient.phone.clone())
        .bind(patient.email.clone());
        self.insert(PATIENTS_DB, stmt).await
    }

    pub async fn update_patient(&self, patient_id: i64, patient: &NewPatient) -> Result<u64, DbError> {
        let stmt = Statement::update(
            "UPDATE patients SET first_name = ?, last_name = ?, date_of_birth = ?, gender = ?, \
             address = ?, phone = ?, email = ? WHERE patient_id = ?",
        )
        .bind(patient.first_name.as_str())
        .bind(patient.last_name.as_str())
        .bind(patient.date_of_birth)
        .bind(patient.gender.clone())
        .bind(patient.address.clone())
        .bind(patient.phone.clone())
        .bind(patient.email.clone())
        .bind(patient_id);
        self.modify(PATIENTS_DB, stmt).await
    }

    pub async fn list_patients(&self) -> Result<Vec<Patient>, DbError> {
        let rows = self
            .select(
                PATIENTS_DB,
                Statement::select(
                    "SELECT patient_id, first_name, last_name, date_of_birth, gender, address, phone, email \
                     FROM patients ORDER BY patient_id",
                ),
            )
            .await?;
        rows.iter().map(patient_from_row).collect()
    }

    pub async fn get_patient(&self, patient_id: i64) -> Result<Option<Patient>, DbError> {
        let rows = self
            .select(
                PATIENTS_DB,
                Statement::select(
                    "SELECT patient_id, first_name, last_name, date_of_birth, gender, address, phone, email \
                     FROM patients WHERE patient_id = ?",
                )
                .bind(patient_id),
            )
            .await?;
        rows.first().map(patient_from_row).transpose()
    }

    /// Deletes the patient along with their invoices, appointments and medical records.
    pub async fn delete_patient(&self, patient_id: i64) -> CascadeReport {
        self.cascade.run(EntityKind::Patient, patient_id).await
    }

    // --- Doctors ---

    pub async fn add_doctor(&self, doctor: &NewDoctor) -> Result<i64, DbError> {
        let stmt = Statement::insert(
            "INSERT INTO doctors (first_name, last_name, specialization, phone, email) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(doctor.first_name.as_str())
        .bind(doctor.last_name.as_str())
        .bind(doctor.specialization.clone())
        .bind(doctor.phone.clone())
        .bind(doctor.email.clone());
        self.insert(APPOINTMENTS_DB, stmt).await
    }

    pub async fn update_doctor(&self, doctor_id: i64, doctor: &NewDoctor) -> Result<u64, DbError> {
        let stmt = Statement::update(
            "UPDATE doctors SET first_name = ?, last_name = ?, specialization = ?, phone = ?, email = ? \
             WHERE doctor_id = ?",
        )
        .bind(doctor.first_name.as_str())
        .bind(doctor.last_name.as_str())
        .bind(doctor.specialization.clone())
        .bind(doctor.phone.clone())
        .bind(doctor.email.clone())
        .bind(doctor_id);
        self.modify(APPOINTMENTS_DB, stmt).await
    }

    pub async fn list_doctors(&self) -> Result<Vec<Doctor>, DbError> {
        let rows = self
            .select(
                APPOINTMENTS_DB,
                Statement::select(
                    "SELECT doctor_id, first_name, last_name, specialization, phone, email \
                     FROM doctors ORDER BY doctor_id",
                ),
            )
            .await?;
        rows.iter().map(doctor_from_row).collect()
    }

    /// Deletes the doctor along with their medical records and appointments.
    pub async fn delete_doctor(&self, doctor_id: i64) -> CascadeReport {
        self.cascade.run(EntityKind::Doctor, doctor_id).await
    }

    // --- Appointments ---

    /// Rejects the appointment if its patient or doctor does not exist.
    pub async fn add_appointment(&self, appointment: &NewAppointment) -> Result<i64, DbError> {
        self.require_patient(appointment.patient_id).await?;
        self.require_doctor(appointment.doctor_id).await?;
        let stmt = Statement::insert(
            "INSERT INTO appointments (patient_id, doctor_id, appointment_date, appointment_time, status, notes) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(appointment.patient_id)
        .bind(appointment.doctor_id)
        .bind(appointment.appointment_date)
        .bind(appointment.appointment_time)
        .bind(appointment.status.as_str())
        .bind(appointment.notes.clone());
        self.insert(APPOINTMENTS_DB, stmt).await
    }

    pub async fn update_appointment(&self, appointment_id: i64, appointment: &NewAppointment) -> Result<u64, DbError> {
        self.require_patient(appointment.patient_id).await?;
        self.require_doctor(appointment.doctor_id).await?;
        let stmt = Statement::update(
            "UPDATE appointments SET patient_id = ?, doctor_id = ?, appointment_date = ?, appointment_time = ?, \
             status = ?, notes = ? WHERE appointment_id = ?",
        )
        .bind(appointment.patient_id)
        .bind(appointment.doctor_id)
        .bind(appointment.appointment_date)
        .bind(appointment.appointment_time)
        .bind(appointment.status.as_str())
        .bind(appointment.notes.clone())
        .bind(appointment_id);
        self.modify(APPOINTMENTS_DB, stmt).await
    }

    pub async fn list_appointments(&self) -> Result<Vec<Appointment>, DbError> {
        let rows = self
            .select(
                APPOINTMENTS_DB,
                Statement::select(
                    "SELECT appointment_id, patient_id, doctor_id, appointment_date, appointment_time, status, notes \
                     FROM appointments ORDER BY appointment_date, appointment_time",
                ),
            )
            .await?;
        rows.iter().map(appointment_from_row).collect()
    }

    /// Every appointment with its patient's and doctor's names attached.
    pub async fn list_appointment_details(&self) -> Result<Vec<AppointmentDetails>, DbError> {
        let appointments = self.list_appointments().await?;
        let patients = self.patient_names().await?;
        let doctors: HashMap<i64, String> = self
            .list_doctors()
            .await?
            .into_iter()
            .map(|d| (d.doctor_id, d.full_name()))
            .collect();
        Ok(appointments
            .into_iter()
            .map(|appointment| AppointmentDetails {
                patient_name: patients.get(&appointment.patient_id).cloned(),
                doctor_name: doctors.get(&appointment.doctor_id).cloned(),
                appointment,
            })
            .collect())
    }

    pub async fn appointments_for_patient(&self, patient_id: i64) -> Result<Vec<Appointment>, DbError> {
        let rows = self
            .select(
                APPOINTMENTS_DB,
                Statement::select(
                    "SELECT appointment_id, patient_id, doctor_id, appointment_date, appointment_time, status, notes \
                     FROM appointments WHERE patient_id = ? ORDER BY appointment_date, appointment_time",
                )
                .bind(patient_id),
            )
            .await?;
        rows.iter().map(appointment_from_row).collect()
    }

    /// Deletes the appointment along with the invoices and medical records that reference it.
    pub async fn delete_appointment(&self, appointment_id: i64) -> CascadeReport {
        self.cascade.run(EntityKind::Appointment, appointment_id).await
    }

    // --- Invoices ---

    async fn require_invoice_refs(&self, patient_id: i64, appointment_id: Option<i64>) -> Result<(), DbError> {
        self.require_patient(patient_id).await?;
        if let Some(appointment_id) = appointment_id {
            self.require_appointment(appointment_id).await?;
        }
        Ok(())
    }

    pub async fn add_invoice(&self, invoice: &NewInvoice) -> Result<i64, DbError> {
        self.require_invoice_refs(invoice.patient_id, invoice.appointment_id).await?;
        let stmt = Statement::insert(
            "INSERT INTO invoices (patient_id, appointment_id, amount, payment_status, issue_date, due_date, payment_date) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(invoice.patient_id)
        .bind(invoice.appointment_id)
        .bind(invoice.amount)
        .bind(invoice.payment_status.as_str())
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.payment_date);
        self.insert(BILLING_DB, stmt).await
    }

    /// Replaces everything but the issue and due dates.
    pub async fn update_invoice(&self, invoice_id: i64, changes: &InvoiceChanges) -> Result<u64, DbError> {
        self.require_invoice_refs(changes.patient_id, changes.appointment_id).await?;
        let stmt = Statement::update(
            "UPDATE invoices SET patient_id = ?, appointment_id = ?, amount = ?, payment_status = ?, \
             payment_date = ? WHERE invoice_id = ?",
        )
        .bind(changes.patient_id)
        .bind(changes.appointment_id)
        .bind(changes.amount)
        .bind(changes.payment_status.as_str())
        .bind(changes.payment_date)
        .bind(invoice_id);
        self.modify(BILLING_DB, stmt).await
    }

    pub async fn update_invoice_payment(
        &self,
        invoice_id: i64,
        status: PaymentStatus,
        payment_date: Option<chrono::NaiveDate>,
    ) -> Result<u64, DbError> {
        let stmt = Statement::update("UPDATE invoices SET payment_status = ?, payment_date = ? WHERE invoice_id = ?")
            .bind(status.as_str())
            .bind(payment_date)
            .bind(invoice_id);
        self.modify(BILLING_DB, stmt).await
    }

    pub async fn list_invoices(&self) -> Result<Vec<Invoice>, DbError> {
        let rows = self
            .select(
                BILLING_DB,
                Statement::select(
                    "SELECT invoice_id, patient_id, appointment_id, amount, payment_status, issue_date, due_date, payment_date \
                     FROM invoices ORDER BY issue_date DESC, invoice_id",
                ),
            )
            .await?;
        rows.iter().map(invoice_from_row).collect()
    }

    pub async fn list_invoice_details(&self) -> Result<Vec<InvoiceDetails>, DbError> {
        let invoices = self.list_invoices().await?;
        let patients = self.patient_names().await?;
        Ok(invoices
            .into_iter()
            .map(|invoice| InvoiceDetails {
                patient_name: patients.get(&invoice.patient_id).cloned(),
                invoice,
            })
            .collect())
    }

    /// Invoices have no dependents; this is a single delete.
    pub async fn delete_invoice(&self, invoice_id: i64) -> Result<u64, DbError> {
        self.modify(
            BILLING_DB,
            Statement::delete("DELETE FROM invoices WHERE invoice_id = ?").bind(invoice_id),
        )
        .await
    }

    // --- Medical records ---

    pub async fn add_medical_record(&self, record: &NewMedicalRecord) -> Result<i64, DbError> {
        self.require_patient(record.patient_id).await?;
        if let Some(doctor_id) = record.doctor_id {
            self.require_doctor(doctor_id).await?;
        }
        if let Some(appointment_id) = record.appointment_id {
            self.require_appointment(appointment_id).await?;
        }
        let stmt = Statement::insert(
            "INSERT INTO medical_records (patient_id, doctor_id, appointment_id, diagnosis, treatment, notes, record_date) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.patient_id)
        .bind(record.doctor_id)
        .bind(record.appointment_id)
        .bind(record.diagnosis.clone())
        .bind(record.treatment.clone())
        .bind(record.notes.clone())
        .bind(record.record_date);
        self.insert(MEDICAL_DB, stmt).await
    }

    pub async fn medical_records_for_patient(&self, patient_id: i64) -> Result<Vec<MedicalRecord>, DbError> {
        let rows = self
            .select(
                MEDICAL_DB,
                Statement::select(
                    "SELECT record_id, patient_id, doctor_id, appointment_id, diagnosis, treatment, notes, record_date \
                     FROM medical_records WHERE patient_id = ? ORDER BY record_date DESC",
                )
                .bind(patient_id),
            )
            .await?;
        rows.iter().map(medical_record_from_row).collect()
    }

    pub async fn list_medical_records(&self) -> Result<Vec<MedicalRecord>, DbError> {
        let rows = self
            .select(
                MEDICAL_DB,
                Statement::select(
                    "SELECT record_id, patient_id, doctor_id, appointment_id, diagnosis, treatment, notes, record_date \
                     FROM medical_records ORDER BY record_id",
                ),
            )
            .await?;
        rows.iter().map(medical_record_from_row).collect()
    }
}

fn unexpected(outcome: QueryOutcome) -> DbError {
    DbError::Decode(format!("statement produced an unexpected outcome: {outcome:?}"))
}

static NULL: SqlValue = SqlValue::Null;

/// Positional access into a row with column names in error messages.
struct Cells<'a> {
    row: &'a Row,
    table: &'static str,
}

impl<'a> Cells<'a> {
    fn new(row: &'a Row, table: &'static str) -> Self {
        Self { row, table }
    }

    fn cell(&self, index: usize) -> &SqlValue {
        self.row.get(index).unwrap_or(&NULL)
    }

    fn missing(&self, column: &str) -> DbError {
        DbError::Decode(format!("{}.{} is missing or has the wrong type", self.table, column))
    }

    fn id(&self, index: usize, column: &str) -> Result<i64, DbError> {
        self.cell(index).as_i64().ok_or_else(|| self.missing(column))
    }

    fn opt_id(&self, index: usize) -> Option<i64> {
        self.cell(index).as_i64()
    }

    fn text(&self, index: usize, column: &str) -> Result<String, DbError> {
        self.cell(index).to_text().ok_or_else(|| self.missing(column))
    }

    fn opt_text(&self, index: usize) -> Option<String> {
        self.cell(index).to_text()
    }

    fn date(&self, index: usize, column: &str) -> Result<chrono::NaiveDate, DbError> {
        self.cell(index).as_date().ok_or_else(|| self.missing(column))
    }
}

fn patient_from_row(row: &Row) -> Result<Patient, DbError> {
    let c = Cells::new(row, "patients");
    Ok(Patient {
        patient_id: c.id(0, "patient_id")?,
        first_name: c.text(1, "first_name")?,
        last_name: c.text(2, "last_name")?,
        date_of_birth: c.date(3, "date_of_birth")?,
        gender: c.opt_text(4),
        address: c.opt_text(5),
        phone: c.opt_text(6),
        email: c.opt_text(7),
    })
}

fn doctor_from_row(row: &Row) -> Result<Doctor, DbError> {
    let c = Cells::new(row, "doctors");
    Ok(Doctor {
        doctor_id: c.id(0, "doctor_id")?,
        first_name: c.text(1, "first_name")?,
        last_name: c.text(2, "last_name")?,
        specialization: c.opt_text(3),
        phone: c.opt_text(4),
        email: c.opt_text(5),
    })
}

fn appointment_from_row(row: &Row) -> Result<Appointment, DbError> {
    let c = Cells::new(row, "appointments");
    let status = match c.cell(5) {
        SqlValue::Null => AppointmentStatus::default(),
        value => value
            .to_text()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| c.missing("status"))?,
    };
    Ok(Appointment {
        appointment_id: c.id(0, "appointment_id")?,
        patient_id: c.id(1, "patient_id")?,
        doctor_id: c.id(2, "doctor_id")?,
        appointment_date: c.date(3, "appointment_date")?,
        appointment_time: c.cell(4).as_time().ok_or_else(|| c.missing("appointment_time"))?,
        status,
        notes: c.opt_text(6),
    })
}

fn invoice_from_row(row: &Row) -> Result<Invoice, DbError> {
    let c = Cells::new(row, "invoices");
    let payment_status = match c.cell(4) {
        SqlValue::Null => PaymentStatus::default(),
        value => value
            .to_text()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| c.missing("payment_status"))?,
    };
    Ok(Invoice {
        invoice_id: c.id(0, "invoice_id")?,
        patient_id: c.id(1, "patient_id")?,
        appointment_id: c.opt_id(2),
        amount: c.cell(3).as_decimal().ok_or_else(|| c.missing("amount"))?,
        payment_status,
        issue_date: c.date(5, "issue_date")?,
        due_date: c.date(6, "due_date")?,
        payment_date: c.cell(7).as_date(),
    })
}

fn medical_record_from_row(row: &Row) -> Result<MedicalRecord, DbError> {
    let c = Cells::new(row, "medical_records");
    Ok(MedicalRecord {
        record_id: c.id(0, "record_id")?,
        patient_id: c.id(1, "patient_id")?,
        doctor_id: c.opt_id(2),
        appointment_id: c.opt_id(3),
        diagnosis: c.opt_text(4),
        treatment: c.opt_text(5),
        notes: c.opt_text(6),
        record_date: c.date(7, "record_date")?,
    })
}
