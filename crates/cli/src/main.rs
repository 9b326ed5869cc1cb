use anyhow::Context;
use api_shared::{Patient, PrescriptionInput};
use clap::{Parser, Subcommand};
use opd_client::{ApiClient, ClientConfig};
use opd_core::constants::MAX_PAGE_LIMIT;
use opd_core::{
    resolve_target_proforma, Aggregator, ChangeBus, ChecklistField, CoreConfig, FileStore,
    LocalSource, PageRequest, PatientRecordView, PatientRef, PrescriptionDrafts,
    PrescriptionSink, RecordSource, Services,
};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "opd")]
#[command(about = "OPD clinical records CLI")]
struct Cli {
    /// Talk to the REST API at OPD_API_BASE_URL instead of the local database
    #[arg(long, global = true)]
    remote: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or migrate the database schema
    InitDb,
    /// List active patients
    Patients {
        /// Match on name, CR number or PSY number
        #[arg(long)]
        search: Option<String>,
    },
    /// Show a patient's prescriptions grouped by visit date
    History {
        /// Patient id
        patient_id: i64,
        /// Treat the id as a clinical proforma id
        #[arg(long)]
        proforma: bool,
    },
    /// Manage the option vocabulary of a checklist field
    Options {
        #[command(subcommand)]
        action: OptionAction,
    },
    /// Submit prescription rows from a JSON file in one request
    Prescribe {
        /// Patient id
        patient_id: i64,
        /// JSON array of prescription rows
        rows: PathBuf,
        /// Attach to this proforma instead of today's or the latest one
        #[arg(long)]
        proforma: Option<i64>,
    },
}

#[derive(Subcommand)]
enum OptionAction {
    /// List the options of a field
    List { field: String },
    /// Add an option label
    Add { field: String, label: String },
    /// Remove an option label
    Delete { field: String, label: String },
}

fn env_value(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn open_services() -> anyhow::Result<(Services, CoreConfig)> {
    let cfg = CoreConfig::from_env_values(
        env_value("OPD_DATABASE_PATH"),
        env_value("OPD_PRESCRIPTION_CAP"),
    )?;
    let services = Services::open(&cfg)
        .with_context(|| format!("opening {}", cfg.database_path().display()))?;
    Ok((services, cfg))
}

fn client_config() -> anyhow::Result<ClientConfig> {
    Ok(ClientConfig::from_env_values(
        env_value("OPD_API_BASE_URL"),
        env_value("OPD_USER_ROLE"),
        env_value("OPD_USER_ID"),
        env_value("OPD_DRAFT_DIR"),
        env_value("OPD_PRESCRIPTION_CAP"),
        env_value("OPD_CACHE_STALE_SECS"),
    )?)
}

fn print_patients(patients: &[Patient]) {
    if patients.is_empty() {
        println!("No patients found.");
        return;
    }
    for p in patients {
        println!(
            "ID: {}, Name: {}, Sex: {}, CR: {}, ADL: {}",
            p.id,
            p.fields.name,
            p.fields.sex,
            p.fields.cr_no.as_deref().unwrap_or("-"),
            if p.has_adl_file { "yes" } else { "no" }
        );
    }
}

fn print_history(view: &PatientRecordView) {
    println!("{} (patient {})", view.patient.fields.name, view.patient.id);
    if view.history.is_empty() {
        println!("  No prescriptions recorded.");
    }
    for group in view.history.groups() {
        println!("  {}", group.key);
        for entry in &group.entries {
            let item = &entry.prescription.item;
            println!(
                "    {} {} {} {} (proforma {})",
                item.medicine, item.dosage, item.frequency, item.duration, entry.proforma_id
            );
        }
    }
    if !view.unqueried_proformas.is_empty() {
        println!(
            "  {} older visit(s) not loaded: {:?}",
            view.unqueried_proformas.len(),
            view.unqueried_proformas
        );
    }
    if !view.failed_proformas.is_empty() {
        println!("  Could not load visits: {:?}", view.failed_proformas);
    }
}

async fn history<S: RecordSource>(
    source: S,
    cap: Option<usize>,
    target: PatientRef,
    cfg: &ClientConfig,
) -> anyhow::Result<()> {
    let view = Aggregator::new(source)
        .with_cap(cap)
        .aggregate(target)
        .await?
        .redacted_for(cfg.identity().role);
    print_history(&view);
    Ok(())
}

async fn prescribe<S: RecordSource + PrescriptionSink>(
    source: &S,
    cfg: &ClientConfig,
    patient_id: i64,
    rows_path: &Path,
    explicit: Option<i64>,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(rows_path)
        .with_context(|| format!("reading {}", rows_path.display()))?;
    let rows: Vec<PrescriptionInput> =
        serde_json::from_str(&raw).context("prescription rows must be a JSON array")?;

    let proformas = source.proformas_for_patient(patient_id).await?;
    let today = chrono::Local::now().date_naive();
    let target = resolve_target_proforma(explicit, &proformas, today);

    let drafts = PrescriptionDrafts::new(FileStore::new(cfg.draft_dir())?);
    match drafts.submit(source, patient_id, target, &rows).await {
        Ok(res) => {
            println!(
                "Created {} prescription(s) on proforma {}",
                res.count,
                target.unwrap_or_default()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            eprintln!("Rows kept as a draft in {}", cfg.draft_dir().display());
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("opd_core=warn".parse()?))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let client_cfg = client_config()?;

    if cli.remote {
        let api = ApiClient::new(&client_cfg, ChangeBus::new())?;
        match cli.command {
            Commands::InitDb => anyhow::bail!("init-db works on the local database only"),
            Commands::Patients { search } => {
                let list = api.search_patients(search.as_deref()).await?;
                print_patients(&list.patients);
            }
            Commands::History {
                patient_id,
                proforma,
            } => {
                let target = patient_ref(patient_id, proforma);
                history(api, client_cfg.prescription_cap(), target, &client_cfg).await?;
            }
            Commands::Options { action } => match action {
                OptionAction::List { field } => {
                    let set = api.clinical_options(parse_field(&field)?).await?;
                    println!("{}", set.labels().join("\n"));
                }
                OptionAction::Add { field, label } => {
                    let set = api.add_clinical_option(parse_field(&field)?, &label).await?;
                    println!("{} option(s)", set.labels().len());
                }
                OptionAction::Delete { field, label } => {
                    let set = api.delete_clinical_option(parse_field(&field)?, &label).await?;
                    println!("{} option(s)", set.labels().len());
                }
            },
            Commands::Prescribe {
                patient_id,
                rows,
                proforma,
            } => prescribe(&api, &client_cfg, patient_id, &rows, proforma).await?,
        }
        return Ok(());
    }

    let (services, core_cfg) = open_services()?;
    match cli.command {
        Commands::InitDb => {
            println!("Database ready at {}", core_cfg.database_path().display());
        }
        Commands::Patients { search } => {
            let page = PageRequest::new(None, Some(MAX_PAGE_LIMIT))?;
            let listing = services.patients.list(&page, search.as_deref())?;
            print_patients(&listing.items);
        }
        Commands::History {
            patient_id,
            proforma,
        } => {
            let source = LocalSource::new(services, client_cfg.identity().user_id);
            let target = patient_ref(patient_id, proforma);
            history(source, core_cfg.prescription_cap(), target, &client_cfg).await?;
        }
        Commands::Options { action } => {
            let set = match action {
                OptionAction::List { field } => services.options.list(parse_field(&field)?)?,
                OptionAction::Add { field, label } => {
                    services.options.add(parse_field(&field)?, &label)?
                }
                OptionAction::Delete { field, label } => {
                    services.options.delete(parse_field(&field)?, &label)?
                }
            };
            println!("{}", set.labels().join("\n"));
        }
        Commands::Prescribe {
            patient_id,
            rows,
            proforma,
        } => {
            let source = LocalSource::new(services, client_cfg.identity().user_id);
            prescribe(&source, &client_cfg, patient_id, &rows, proforma).await?;
        }
    }
    Ok(())
}

fn patient_ref(id: i64, is_proforma: bool) -> PatientRef {
    if is_proforma {
        PatientRef::Proforma(id)
    } else {
        PatientRef::Patient(id)
    }
}

fn parse_field(raw: &str) -> anyhow::Result<ChecklistField> {
    Ok(raw.parse()?)
}
