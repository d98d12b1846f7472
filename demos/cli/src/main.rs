use std::path::{Path, PathBuf};

use anyhow::Context;
use chart_client::{ChartClient, HttpGateway, Widget};
use chart_core::{
    AllergyOverview, AllergyRecord, BiometricRow, ChartConfig, DimensionSeries,
    MalformedRecordError, PatientContext, Preview, Projection, WidgetState,
};
use chart_fhir::{parse_json_str, project_allergies, resolve_diagnoses, summarize_dimensions};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "chart-cli",
    about = "Project patient chart data from FHIR bundles or a live server."
)]
struct Args {
    /// JSON file with a `ChartConfig`; defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Allergy rows from an AllergyIntolerance bundle file.
    Allergies {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Biometrics table from an Observation bundle file.
    Biometrics {
        #[arg(short, long)]
        input: PathBuf,
        /// Show every row instead of the preview.
        #[arg(long)]
        all: bool,
    },
    /// Diagnosis candidates from a saved diagnosis search response.
    Diagnoses {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Fetch allergies and biometrics for one patient from a server.
    Fetch {
        /// Server root, e.g. http://localhost:8080/openmrs
        #[arg(long)]
        base_url: String,
        #[arg(long)]
        patient_uuid: String,
        /// Identifier used by the allergy search.
        #[arg(long)]
        identifier: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long, requires = "user")]
        password: Option<String>,
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter =
        tracing_subscriber::EnvFilter::from_default_env().add_directive("chart=info".parse()?);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Allergies { input } => {
            let bundle = parse_json_str(&read_input(&input)?)?;
            let projection = project_allergies(&bundle)?;
            print_allergies(&projection);
        }
        Command::Biometrics { input, all } => {
            let bundle = parse_json_str(&read_input(&input)?)?;
            let series = summarize_dimensions(&bundle, &config)?;
            print_biometrics(&series, &config, all);
        }
        Command::Diagnoses { input } => {
            let results = parse_json_str(&read_input(&input)?)?;
            let projection = resolve_diagnoses(&results)?;
            for candidate in &projection.records {
                println!(
                    "{} [{}] {}",
                    candidate.preferred_name,
                    candidate.concept_id,
                    candidate.reference_term_code.as_deref().unwrap_or("-")
                );
            }
            print_rejected(&projection.rejected);
        }
        Command::Fetch {
            base_url,
            patient_uuid,
            identifier,
            user,
            password,
            all,
        } => {
            let mut gateway = HttpGateway::new(base_url);
            if let Some(user) = user {
                gateway = gateway.with_basic_auth(user, password.unwrap_or_default());
            }
            let patient = PatientContext::new(patient_uuid, identifier);
            let client = ChartClient::new(gateway, config)?;
            fetch(client, &patient, all).await?;
        }
    }

    Ok(())
}

async fn fetch(
    client: ChartClient<HttpGateway>,
    patient: &PatientContext,
    all: bool,
) -> anyhow::Result<()> {
    let allergies: Widget<Projection<AllergyRecord>> = Widget::new("allergies");
    let biometrics: Widget<DimensionSeries> = Widget::new("biometrics");
    let client = &client;
    tracing::info!(patient = %patient.uuid, "fetching chart");

    tokio::join!(
        allergies.load(patient.uuid.clone(), |cancel| async move {
            client.allergies(patient, &cancel).await
        }),
        biometrics.load(patient.uuid.clone(), |cancel| async move {
            client.dimensions(patient, &cancel).await
        }),
    );

    match allergies.state() {
        WidgetState::Ready(projection) => print_allergies(&projection),
        WidgetState::Empty => print_allergies(&Projection::default()),
        WidgetState::Failed(message) => anyhow::bail!("allergies: {message}"),
        WidgetState::Loading => {}
    }
    println!();
    match biometrics.state() {
        WidgetState::Ready(series) => print_biometrics(&series, client.config(), all),
        WidgetState::Empty => println!("No biometrics recorded."),
        WidgetState::Failed(message) => anyhow::bail!("biometrics: {message}"),
        WidgetState::Loading => {}
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ChartConfig> {
    let Some(path) = path else {
        return Ok(ChartConfig::default());
    };
    let json = read_input(path)?;
    ChartConfig::from_json_str(&json).with_context(|| format!("invalid config in {path:?}"))
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("could not read {path:?}"))
}

fn print_allergies(projection: &Projection<AllergyRecord>) {
    match AllergyOverview::from_records(&projection.records) {
        AllergyOverview::Empty { message, action } => println!("{message}\n[{action}]"),
        AllergyOverview::Rows { rows } => {
            for (row, record) in rows.iter().zip(&projection.records) {
                let marker = if row.highlighted { "!" } else { " " };
                println!(
                    "{marker} {:<24} {:<10} {:<24} since {:<9} updated {}",
                    row.allergen,
                    row.criticality,
                    row.manifestations,
                    row.since,
                    row.updated
                );
                println!("  {}", record.summary_value());
                if let Some(note) = &row.note {
                    println!("  note: {note}");
                }
            }
        }
    }
    print_rejected(&projection.rejected);
}

fn print_biometrics(series: &DimensionSeries, config: &ChartConfig, all: bool) {
    let rows: Vec<BiometricRow> = series.records.iter().map(BiometricRow::from).collect();
    let preview = Preview::new(&rows, config.biometrics_preview, all);

    println!(
        "{:<18} {:>12} {:>12} {:>12}",
        "Date", "Weight (kg)", "Height (cm)", "BMI (kg/m²)"
    );
    for row in &preview.items {
        let [date, weight, height, bmi] = row.cells();
        println!("{date:<18} {weight:>12} {height:>12} {bmi:>12}");
    }
    if preview.see_all {
        println!("{} (pass --all to see all)", preview.label());
    }
    print_rejected(&series.rejected);
}

fn print_rejected(rejected: &[MalformedRecordError]) {
    for error in rejected {
        eprintln!("skipped: {error}");
    }
}
