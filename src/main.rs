//! Command-line entry point.
//!
//! Thin collaborator over the library: resolves credentials and input,
//! walks the session state machine, and hands the confirmed work list to
//! the engine. Exit codes: 0 full success, 1 partial failure, 2 fatal.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use zoho_bulk::zoho::VALID_STATUSES;
use zoho_bulk::{
    parse_pasted, parse_tabular, AppError, BulkUpdateEngine, CredentialOverrides, Credentials,
    FieldMetadataFetcher, InputSource, SessionContext, ViewFetchOutcome, ViewFetcher, ZohoClient,
};

const EXIT_SUCCESS: i32 = 0;
const EXIT_PARTIAL: i32 = 1;
const EXIT_FATAL: i32 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "zoho-bulk",
    version,
    about = "Bulk-update the Lead Status field in Zoho CRM"
)]
struct Cli {
    /// Record ids to update, as arguments (alternative to --file / --view).
    ids: Vec<String>,

    /// Status value to apply (default for rows without their own).
    #[arg(long, short)]
    status: Option<String>,

    /// Read ids from a file: .csv with an `id` header (optional `status`
    /// column), anything else as plain text tokens.
    #[arg(long, short, conflicts_with_all = ["ids", "view"])]
    file: Option<PathBuf>,

    /// Fetch ids from a Leads custom view by its numeric id.
    #[arg(long, short, conflicts_with = "ids")]
    view: Option<String>,

    /// Skip the confirmation prompt.
    #[arg(long, short)]
    yes: bool,

    /// Print the Leads field listing (api_name and label) and exit unless
    /// an input source is also given.
    #[arg(long)]
    fields: bool,

    /// Where to write the failure log CSV (default: timestamped name in
    /// the working directory).
    #[arg(long, short)]
    out: Option<PathBuf>,

    /// Override ZOHO_CLIENT_ID for this run.
    #[arg(long, value_name = "ID")]
    client_id: Option<String>,

    /// Override ZOHO_CLIENT_SECRET for this run.
    #[arg(long, value_name = "SECRET")]
    client_secret: Option<String>,

    /// Override ZOHO_REFRESH_TOKEN for this run.
    #[arg(long, value_name = "TOKEN")]
    refresh_token: Option<String>,

    /// Override ZOHO_API_DOMAIN for this run.
    #[arg(long, value_name = "URL")]
    api_domain: Option<String>,

    /// Override ZOHO_ACCOUNTS_URL for this run.
    #[arg(long, value_name = "URL")]
    accounts_url: Option<String>,
}

impl Cli {
    fn overrides(&self) -> CredentialOverrides {
        CredentialOverrides {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            refresh_token: self.refresh_token.clone(),
            api_domain: self.api_domain.clone(),
            accounts_url: self.accounts_url.clone(),
        }
    }

    fn has_input_source(&self) -> bool {
        !self.ids.is_empty() || self.file.is_some() || self.view.is_some()
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!("{}", err);
            std::process::exit(EXIT_FATAL);
        }
    }
}

async fn run(cli: Cli) -> Result<i32, AppError> {
    let creds = Credentials::resolve(&cli.overrides())?;
    let client = ZohoClient::new(creds)?;

    if cli.fields {
        print_field_listing(&client).await;
        if !cli.has_input_source() {
            return Ok(EXIT_SUCCESS);
        }
    }

    if !cli.has_input_source() {
        return Err(AppError::MalformedInput(
            "no records given: pass ids, --file or --view".to_string(),
        ));
    }

    let status = cli.status.clone().ok_or_else(|| {
        AppError::MalformedInput("--status is required for an update run".to_string())
    })?;

    if !VALID_STATUSES.contains(&status.as_str()) {
        warn!(
            "'{}' is not a known Lead Status value; submitting it anyway",
            status
        );
    }

    let mut session = SessionContext::new(status);
    load_input(&cli, &client, &mut session).await?;

    for reject in session.rejects() {
        warn!("skipped input '{}': {}", reject.token, reject.reason);
    }
    for id in session.duplicate_ids() {
        warn!("id {} appears more than once and will be submitted each time", id);
    }

    if session.records().is_empty() {
        println!("No valid record ids in the input; nothing to do.");
        return Ok(EXIT_SUCCESS);
    }

    println!(
        "About to set Lead Status = '{}' on {} record(s).",
        session.default_status(),
        session.records().len()
    );

    if !cli.yes && !confirm_on_stdin()? {
        println!("Aborted; no records were modified.");
        session.abort()?;
        return Ok(EXIT_SUCCESS);
    }

    session.confirm()?;
    let pending = session.begin_execution()?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing the in-flight batch, skipping the rest");
            ctrl_c_cancel.cancel();
        }
    });

    let engine = BulkUpdateEngine::new(client);
    let report = engine.execute(&pending, &cancel).await?;

    println!("{}", report.summary_line());

    let exit_code = if report.fully_successful() {
        EXIT_SUCCESS
    } else {
        write_failure_log(&report, session.default_status(), cli.out.as_deref())?;
        EXIT_PARTIAL
    };

    session.finish(report)?;
    Ok(exit_code)
}

/// Loads the record list from whichever source the CLI selected.
async fn load_input(
    cli: &Cli,
    client: &ZohoClient,
    session: &mut SessionContext,
) -> Result<(), AppError> {
    if let Some(view_id) = &cli.view {
        let fetcher = ViewFetcher::new(client.clone());
        let ViewFetchOutcome { ids, error, .. } = fetcher.fetch_ids(view_id).await?;
        if let Some(err) = error {
            warn!(
                "view fetch stopped early ({}); continuing with the {} id(s) fetched",
                err,
                ids.len()
            );
        }
        return session.load_view_ids(ids);
    }

    if let Some(path) = &cli.file {
        let (source, parsed) = if is_csv(path) {
            let bytes = std::fs::read(path).map_err(|e| {
                AppError::MalformedInput(format!("cannot read {}: {}", path.display(), e))
            })?;
            (InputSource::Tabular, parse_tabular(&bytes)?)
        } else {
            let text = std::fs::read_to_string(path).map_err(|e| {
                AppError::MalformedInput(format!("cannot read {}: {}", path.display(), e))
            })?;
            (InputSource::Paste, parse_pasted(&text))
        };
        return session.load(source, parsed);
    }

    session.load(InputSource::Paste, parse_pasted(&cli.ids.join(" ")))
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Prints the Leads field listing. Advisory only; failure is logged and
/// never blocks an update run.
async fn print_field_listing(client: &ZohoClient) {
    let fetcher = FieldMetadataFetcher::new(client.clone());
    match fetcher.list_fields().await {
        Ok(fields) => {
            println!("{:<40} {}", "API NAME", "LABEL");
            for field in fields {
                println!("{:<40} {}", field.api_name, field.display_label);
            }
        }
        Err(err) => warn!("could not fetch the field listing: {}", err),
    }
}

fn confirm_on_stdin() -> Result<bool, AppError> {
    print!("Proceed? [y/N] ");
    std::io::stdout()
        .flush()
        .map_err(|e| AppError::Internal(format!("stdout unavailable: {}", e)))?;

    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .map_err(|e| AppError::Internal(format!("stdin unavailable: {}", e)))?;

    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "YES"))
}

/// Writes the failure log CSV and tells the operator where it went.
fn write_failure_log(
    report: &zoho_bulk::BatchReport,
    status: &str,
    out: Option<&Path>,
) -> Result<(), AppError> {
    let path = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(zoho_bulk::BatchReport::failure_log_filename(status)));

    let csv = report.failure_csv()?;
    std::fs::write(&path, csv)
        .map_err(|e| AppError::Internal(format!("cannot write {}: {}", path.display(), e)))?;

    println!("Failure log written to {}", path.display());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
