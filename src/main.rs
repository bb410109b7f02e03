use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::Table;
use comfy_table::presets::UTF8_FULL;
use configuration::{Driver, Settings, init_tracing, load_config};
use core_types::EntityKind;
use database::{CascadePlan, HospitalRepository, SchemaInitializer};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;

/// The main entry point for the hospital records application.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A .env file is optional; it only feeds HOSPITAL__* overrides.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = Arc::new(build_settings(&cli)?);
    let _log_guard = init_tracing(&settings.logging, cli.debug)?;
    tracing::debug!(
        servers = settings.servers.len(),
        databases = settings.databases.len(),
        "Configuration loaded"
    );

    match cli.command {
        Commands::Setup(args) => handle_setup(args, settings).await,
        Commands::List { entity } => handle_list(entity, settings).await,
        Commands::Delete { entity, id } => handle_delete(entity, id, settings).await,
        Commands::Routes => handle_routes(&settings),
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Patient, appointment, billing and medical records spread across several database servers.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log every statement at debug level.
    #[arg(long, global = true)]
    debug: bool,

    /// Ignore the configuration file and use this engine for every server.
    #[arg(long, global = true, value_enum)]
    driver: Option<Driver>,

    /// Root directory for SQLite servers (used with `--driver sqlite`).
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Create databases and tables, then insert sample data.
    Setup(SetupArgs),
    /// Print every row of one table.
    List {
        #[arg(value_enum)]
        entity: ListEntity,
    },
    /// Delete a row and, for patients, doctors and appointments, its dependents.
    Delete {
        /// patient, doctor, appointment or invoice
        #[arg(value_parser = parse_delete_target)]
        entity: DeleteTarget,
        id: i64,
    },
    /// Show where each logical database lives and what each delete touches.
    Routes,
}

#[derive(Parser)]
struct SetupArgs {
    /// Skip table creation.
    #[arg(long)]
    no_tables: bool,

    /// Skip sample data insertion.
    #[arg(long)]
    no_sample_data: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ListEntity {
    Patients,
    Doctors,
    Appointments,
    Invoices,
    Records,
}

#[derive(Clone, Copy, Debug)]
enum DeleteTarget {
    /// Deleted together with its dependents in other databases.
    Cascading(EntityKind),
    Invoice,
}

fn parse_delete_target(value: &str) -> Result<DeleteTarget, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "invoice" | "invoices" => Ok(DeleteTarget::Invoice),
        other => other
            .parse::<EntityKind>()
            .map(DeleteTarget::Cascading)
            .map_err(|e| e.to_string()),
    }
}

fn build_settings(cli: &Cli) -> anyhow::Result<Settings> {
    match cli.driver {
        Some(Driver::Sqlite) => Ok(Settings::sqlite_layout(&cli.data_dir)),
        Some(Driver::Mysql) => Ok(Settings::default_layout()),
        None => load_config().context("failed to load configuration"),
    }
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn handle_setup(args: SetupArgs, settings: Arc<Settings>) -> anyhow::Result<()> {
    let initializer = SchemaInitializer::new(database::connect(settings));

    if !args.no_tables {
        let report = initializer.create_schema().await?;
        println!(
            "Schema ready: {} tables across {} databases",
            report.table_count(),
            report.prepared.len()
        );
    }

    if !args.no_sample_data {
        let progress_bar = ProgressBar::new(5);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        let report = initializer
            .seed_sample_data(|table| {
                progress_bar.set_message(format!("Inserting {table}..."));
                progress_bar.inc(1);
            })
            .await;
        progress_bar.finish_with_message("Sample data inserted!");
        println!(
            "{} patients, {} doctors, {} appointments, {} invoices, {} medical records",
            report.patients, report.doctors, report.appointments, report.invoices, report.medical_records
        );
    }

    Ok(())
}

async fn handle_list(entity: ListEntity, settings: Arc<Settings>) -> anyhow::Result<()> {
    let repo = HospitalRepository::new(database::connect(settings));
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);

    match entity {
        ListEntity::Patients => {
            table.set_header(vec!["ID", "Name", "Date of birth", "Gender", "Phone", "Email"]);
            for p in repo.list_patients().await? {
                table.add_row(vec![
                    p.patient_id.to_string(),
                    p.full_name(),
                    p.date_of_birth.to_string(),
                    cell(&p.gender),
                    cell(&p.phone),
                    cell(&p.email),
                ]);
            }
        }
        ListEntity::Doctors => {
            table.set_header(vec!["ID", "Name", "Specialization", "Phone", "Email"]);
            for d in repo.list_doctors().await? {
                table.add_row(vec![
                    d.doctor_id.to_string(),
                    d.full_name(),
                    cell(&d.specialization),
                    cell(&d.phone),
                    cell(&d.email),
                ]);
            }
        }
        ListEntity::Appointments => {
            table.set_header(vec!["ID", "Patient", "Doctor", "Date", "Time", "Status", "Notes"]);
            for details in repo.list_appointment_details().await? {
                let a = &details.appointment;
                table.add_row(vec![
                    a.appointment_id.to_string(),
                    named(a.patient_id, &details.patient_name),
                    named(a.doctor_id, &details.doctor_name),
                    a.appointment_date.to_string(),
                    a.appointment_time.format("%H:%M").to_string(),
                    a.status.to_string(),
                    cell(&a.notes),
                ]);
            }
        }
        ListEntity::Invoices => {
            table.set_header(vec!["ID", "Patient", "Appointment", "Amount", "Status", "Issued", "Due", "Paid"]);
            for details in repo.list_invoice_details().await? {
                let i = &details.invoice;
                table.add_row(vec![
                    i.invoice_id.to_string(),
                    named(i.patient_id, &details.patient_name),
                    cell(&i.appointment_id),
                    format!("${:.2}", i.amount),
                    i.payment_status.to_string(),
                    i.issue_date.to_string(),
                    i.due_date.to_string(),
                    cell(&i.payment_date),
                ]);
            }
        }
        ListEntity::Records => {
            table.set_header(vec!["ID", "Patient", "Doctor", "Date", "Diagnosis", "Treatment"]);
            for r in repo.list_medical_records().await? {
                table.add_row(vec![
                    r.record_id.to_string(),
                    r.patient_id.to_string(),
                    cell(&r.doctor_id),
                    r.record_date.to_string(),
                    cell(&r.diagnosis),
                    cell(&r.treatment),
                ]);
            }
        }
    }

    println!("{table}");
    Ok(())
}

async fn handle_delete(entity: DeleteTarget, id: i64, settings: Arc<Settings>) -> anyhow::Result<()> {
    let repo = HospitalRepository::new(database::connect(settings));

    let report = match entity {
        DeleteTarget::Invoice => {
            let rows = repo.delete_invoice(id).await?;
            println!("Deleted {rows} invoice(s)");
            return Ok(());
        }
        DeleteTarget::Cascading(kind) => repo.cascade().run(kind, id).await,
    };

    for step in report.failed_dependents() {
        eprintln!("Could not clean up {}: {:?}", step.step, step.result);
    }
    if !report.succeeded() {
        anyhow::bail!("failed to delete {} {}", report.kind, id);
    }
    println!("Deleted {} {} and its dependent records", report.kind, id);
    Ok(())
}

fn handle_routes(settings: &Settings) -> anyhow::Result<()> {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Logical database", "Server", "Driver", "Host", "Schema", "Backup"]);

    for (name, route) in &settings.databases {
        let (driver, host) = match settings.servers.get(&route.server) {
            Some(server) => (server.driver.to_string(), server.host.clone()),
            None => ("-".to_string(), "(not configured)".to_string()),
        };
        let backup = settings.backups.get(name).cloned().unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            name.clone(),
            route.server.clone(),
            driver,
            host,
            route.database.clone(),
            backup,
        ]);
    }

    println!("{table}");

    let mut plans = Table::new();
    plans.load_preset(UTF8_FULL);
    plans.set_header(vec!["Deleting", "Dependents (in order)", "Then"]);
    for plan in CascadePlan::all() {
        let dependents: Vec<String> = plan.dependents.iter().map(ToString::to_string).collect();
        plans.add_row(vec![
            plan.kind.to_string(),
            dependents.join("\n"),
            plan.root.to_string(),
        ]);
    }
    println!("{plans}");
    Ok(())
}

/// An id followed by the name it resolves to, or a marker when the row is gone.
fn named(id: i64, name: &Option<String>) -> String {
    match name {
        Some(name) => format!("{name} (#{id})"),
        None => format!("Unknown (#{id})"),
    }
}

fn cell<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}
