mod common;

use chrono::NaiveDate;
use common::{hospital, patient, raw};
use core_types::PaymentStatus;
use database::{SchemaInitializer, Statement};
use rand::SeedableRng;
use rand::rngs::StdRng;

async fn user_tables(h: &common::Hospital, database: &str) -> i64 {
    let rows = raw(
        h,
        database,
        Statement::select("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite%'"),
    )
    .await
    .rows()
    .unwrap();
    rows[0][0].as_i64().unwrap()
}

#[tokio::test]
async fn create_schema_is_idempotent_and_covers_backups() {
    let h = hospital().await;
    let initializer = SchemaInitializer::new(h.executor.clone());

    let report = initializer.create_schema().await.unwrap();

    assert_eq!(report.prepared.len(), 8);
    assert_eq!(report.table_count(), 10);
    assert_eq!(user_tables(&h, "patients_db").await, 1);
    assert_eq!(user_tables(&h, "appointments_db").await, 2);
    assert_eq!(user_tables(&h, "appointments_backup_db").await, 2);
    assert_eq!(user_tables(&h, "billing_backup_db").await, 1);
}

#[tokio::test]
async fn seeding_inserts_the_sample_set_on_primaries_and_backups() {
    let h = hospital().await;
    let initializer = SchemaInitializer::new(h.executor.clone());
    let mut rng = StdRng::seed_from_u64(7);
    let mut stages = Vec::new();

    let report = initializer
        .seed_with_rng(&mut rng, |stage| stages.push(stage.to_string()))
        .await;

    assert_eq!(report.patients, 5);
    assert_eq!(report.doctors, 5);
    assert_eq!(report.appointments, 15);
    assert_eq!(report.invoices, 10);
    assert_eq!(report.medical_records, 12);
    assert_eq!(stages.len(), 5);

    assert_eq!(h.repo.list_patients().await.unwrap().len(), 5);
    assert_eq!(h.repo.list_appointments().await.unwrap().len(), 15);
    let invoices = h.repo.list_invoices().await.unwrap();
    assert_eq!(invoices.len(), 10);
    for invoice in &invoices {
        assert_eq!(invoice.payment_date.is_some(), invoice.payment_status == PaymentStatus::Paid);
        assert!(invoice.due_date > invoice.issue_date);
    }

    let backup = raw(&h, "medical_backup_db", Statement::select("SELECT record_id FROM medical_records"))
        .await
        .rows()
        .unwrap();
    assert_eq!(backup.len(), 12);
}

#[tokio::test]
async fn repository_round_trips_typed_rows() {
    let h = hospital().await;
    let id = h.repo.add_patient(&patient("John", "Doe")).await.unwrap();

    let mut changed = patient("John", "Doe");
    changed.email = Some("john.doe@email.com".to_string());
    assert_eq!(h.repo.update_patient(id, &changed).await.unwrap(), 1);

    let stored = h.repo.get_patient(id).await.unwrap().unwrap();
    assert_eq!(stored.full_name(), "John Doe");
    assert_eq!(stored.email.as_deref(), Some("john.doe@email.com"));
    assert_eq!(stored.date_of_birth, NaiveDate::from_ymd_opt(1980, 5, 15).unwrap());
    assert!(h.repo.get_patient(id + 100).await.unwrap().is_none());
}

#[tokio::test]
async fn invoice_payment_and_delete() {
    let h = hospital().await;
    let mut rng = StdRng::seed_from_u64(11);
    SchemaInitializer::new(h.executor.clone())
        .seed_with_rng(&mut rng, |_| {})
        .await;
    let invoice = h.repo.list_invoices().await.unwrap().remove(0);
    let paid_on = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();

    let updated = h
        .repo
        .update_invoice_payment(invoice.invoice_id, PaymentStatus::Paid, Some(paid_on))
        .await
        .unwrap();
    assert_eq!(updated, 1);
    let reread = h
        .repo
        .list_invoices()
        .await
        .unwrap()
        .into_iter()
        .find(|i| i.invoice_id == invoice.invoice_id)
        .unwrap();
    assert_eq!(reread.payment_status, PaymentStatus::Paid);
    assert_eq!(reread.payment_date, Some(paid_on));
    assert_eq!(reread.amount, invoice.amount);

    assert_eq!(h.repo.delete_invoice(invoice.invoice_id).await.unwrap(), 1);
    assert_eq!(h.repo.list_invoices().await.unwrap().len(), 9);
}
