mod common;

use chrono::NaiveDate;
use common::{appointment, count, doctor, hospital, patient, raw};
use core_types::{EntityKind, NewInvoice, NewMedicalRecord, PaymentStatus};
use database::{CascadeCoordinator, CascadePhase, Statement, StepResult};
use rust_decimal_macros::dec;

fn invoice(patient_id: i64, appointment_id: Option<i64>) -> NewInvoice {
    let issue = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
    NewInvoice {
        patient_id,
        appointment_id,
        amount: dec!(150.25),
        payment_status: PaymentStatus::Pending,
        issue_date: issue,
        due_date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
        payment_date: None,
    }
}

fn record(patient_id: i64, doctor_id: i64, appointment_id: Option<i64>) -> NewMedicalRecord {
    NewMedicalRecord {
        patient_id,
        doctor_id: Some(doctor_id),
        appointment_id,
        diagnosis: Some("Influenza".to_string()),
        treatment: Some("Rest and fluids".to_string()),
        notes: None,
        record_date: NaiveDate::from_ymd_opt(2025, 2, 2).unwrap(),
    }
}

#[tokio::test]
async fn deleting_a_patient_removes_rows_in_every_database() {
    let h = hospital().await;
    let p = h.repo.add_patient(&patient("John", "Doe")).await.unwrap();
    let other = h.repo.add_patient(&patient("Jane", "Smith")).await.unwrap();
    let d = h.repo.add_doctor(&doctor("Robert", "Miller")).await.unwrap();
    let a1 = h.repo.add_appointment(&appointment(p, d, 3)).await.unwrap();
    h.repo.add_appointment(&appointment(p, d, 4)).await.unwrap();
    h.repo.add_appointment(&appointment(other, d, 5)).await.unwrap();
    h.repo.add_invoice(&invoice(p, Some(a1))).await.unwrap();
    h.repo.add_medical_record(&record(p, d, None)).await.unwrap();

    let report = h.repo.delete_patient(p).await;

    assert!(report.succeeded());
    assert_eq!(report.failed_dependents().count(), 0);
    let deleted: Vec<u64> = report
        .dependents
        .iter()
        .map(|s| match s.result {
            StepResult::Deleted { rows } => rows,
            StepResult::Failed { .. } => panic!("step {} failed", s.step),
        })
        .collect();
    assert_eq!(deleted, vec![1, 2, 1]);

    assert_eq!(count(&h, "patients_db", "patients", "patient_id", p).await, 0);
    assert_eq!(count(&h, "appointments_db", "appointments", "patient_id", p).await, 0);
    assert_eq!(count(&h, "billing_db", "invoices", "patient_id", p).await, 0);
    assert_eq!(count(&h, "medical_db", "medical_records", "patient_id", p).await, 0);
    assert_eq!(count(&h, "appointments_db", "appointments", "patient_id", other).await, 1);

    // Deletes are mirrored like any other write.
    assert_eq!(count(&h, "patients_backup_db", "patients", "patient_id", p).await, 0);
    assert_eq!(count(&h, "appointments_backup_db", "appointments", "patient_id", p).await, 0);
}

#[tokio::test]
async fn deleting_a_doctor_removes_their_appointments_and_records() {
    let h = hospital().await;
    let p = h.repo.add_patient(&patient("Emily", "Williams")).await.unwrap();
    let d = h.repo.add_doctor(&doctor("Sarah", "Taylor")).await.unwrap();
    let keep = h.repo.add_doctor(&doctor("James", "Anderson")).await.unwrap();
    h.repo.add_appointment(&appointment(p, d, 6)).await.unwrap();
    h.repo.add_appointment(&appointment(p, keep, 7)).await.unwrap();
    h.repo.add_medical_record(&record(p, d, None)).await.unwrap();

    let coordinator = CascadeCoordinator::new(h.executor.clone());
    assert!(coordinator.delete_with_dependents(EntityKind::Doctor, d).await);

    assert_eq!(count(&h, "appointments_db", "doctors", "doctor_id", d).await, 0);
    assert_eq!(count(&h, "appointments_db", "appointments", "doctor_id", d).await, 0);
    assert_eq!(count(&h, "medical_db", "medical_records", "doctor_id", d).await, 0);
    assert_eq!(count(&h, "appointments_db", "appointments", "doctor_id", keep).await, 1);
    assert_eq!(count(&h, "patients_db", "patients", "patient_id", p).await, 1);
}

#[tokio::test]
async fn deleting_an_appointment_removes_linked_invoices_and_records() {
    let h = hospital().await;
    let p = h.repo.add_patient(&patient("David", "Brown")).await.unwrap();
    let d = h.repo.add_doctor(&doctor("William", "Jackson")).await.unwrap();
    let a = h.repo.add_appointment(&appointment(p, d, 8)).await.unwrap();
    h.repo.add_invoice(&invoice(p, Some(a))).await.unwrap();
    h.repo.add_invoice(&invoice(p, None)).await.unwrap();
    h.repo.add_medical_record(&record(p, d, Some(a))).await.unwrap();

    let report = h.repo.delete_appointment(a).await;

    assert!(report.succeeded());
    assert_eq!(count(&h, "appointments_db", "appointments", "appointment_id", a).await, 0);
    assert_eq!(count(&h, "billing_db", "invoices", "appointment_id", a).await, 0);
    assert_eq!(count(&h, "medical_db", "medical_records", "appointment_id", a).await, 0);
    assert_eq!(count(&h, "billing_db", "invoices", "patient_id", p).await, 1);
}

#[tokio::test]
async fn a_failed_step_does_not_stop_the_rest_of_the_cascade() {
    let h = hospital().await;
    let p = h.repo.add_patient(&patient("Michael", "Johnson")).await.unwrap();
    let d = h.repo.add_doctor(&doctor("Jennifer", "Thomas")).await.unwrap();
    h.repo.add_appointment(&appointment(p, d, 9)).await.unwrap();
    raw(&h, "billing_db", Statement::ddl("DROP TABLE invoices")).await;

    let report = h.repo.delete_patient(p).await;

    assert!(report.succeeded());
    let failed: Vec<_> = report.failed_dependents().map(|s| s.step.table).collect();
    assert_eq!(failed, ["invoices"]);
    let failure = report.failed_dependents().next().unwrap();
    assert_eq!(failure.step.statement(p).sql(), "DELETE FROM invoices WHERE patient_id = ?");
    assert!(matches!(&failure.result, StepResult::Failed { error } if error.contains("invoices")));
    assert_eq!(count(&h, "appointments_db", "appointments", "patient_id", p).await, 0);
    assert_eq!(count(&h, "patients_db", "patients", "patient_id", p).await, 0);
}

#[tokio::test]
async fn root_failure_is_reported_after_dependents_are_gone() {
    let h = hospital().await;
    let p = h.repo.add_patient(&patient("Grace", "Hopper")).await.unwrap();
    let d = h.repo.add_doctor(&doctor("Robert", "Miller")).await.unwrap();
    h.repo.add_appointment(&appointment(p, d, 10)).await.unwrap();
    raw(&h, "patients_db", Statement::ddl("DROP TABLE patients")).await;

    let report = h.repo.delete_patient(p).await;

    assert!(!report.succeeded());
    assert_eq!(report.phase, CascadePhase::RootDeleteFailed);
    assert_eq!(
        report.history,
        vec![
            CascadePhase::Pending,
            CascadePhase::DependentsInFlight,
            CascadePhase::RootDeleteAttempted,
            CascadePhase::RootDeleteFailed,
        ]
    );
    assert_eq!(count(&h, "appointments_db", "appointments", "patient_id", p).await, 0);
}

#[tokio::test]
async fn deleting_a_missing_entity_still_completes() {
    let h = hospital().await;

    let report = h.repo.delete_doctor(999).await;

    assert!(report.succeeded());
    assert!(report.dependents.iter().all(|s| s.result == StepResult::Deleted { rows: 0 }));
}
