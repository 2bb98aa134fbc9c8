//! Boxlift CLI - command line client for the upload pipeline.
//!
//! This tool drives the batch upload coordinator against the real provider:
//! browser-based login, sequential uploads with progress, folder listing,
//! and logout with best-effort revocation.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use boxlift_batch::{BatchUploader, FileSessionStore, SessionStore, StoredSession};
use boxlift_common::FileName;
use boxlift_provider::{
    AuthConfig, AuthService, BoxClient, BoxEndpoints, PendingFile, UploadOutcome,
};

#[derive(Parser)]
#[command(name = "boxlift")]
#[command(about = "Boxlift - push files into one Box folder")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// OAuth2 client id.
    #[arg(long, env = "BOXLIFT_CLIENT_ID")]
    client_id: String,

    /// OAuth2 client secret.
    #[arg(long, env = "BOXLIFT_CLIENT_SECRET")]
    client_secret: String,

    /// Redirect URI registered for the OAuth2 callback.
    #[arg(long, env = "BOXLIFT_REDIRECT_URI")]
    redirect_uri: String,

    /// Target folder id.
    #[arg(long, env = "BOXLIFT_FOLDER_ID")]
    folder_id: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in via the browser and store the session.
    Login,

    /// Upload files into the target folder.
    Upload {
        /// Files to upload, in submission order.
        paths: Vec<PathBuf>,
    },

    /// List the target folder, newest first.
    List,

    /// Show the logged-in identity.
    Whoami,

    /// Revoke the access token and clear the stored session.
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set up logging")?;

    let endpoints = BoxEndpoints::default();
    let auth = Arc::new(AuthService::new(
        AuthConfig {
            client_id: cli.client_id.clone(),
            client_secret: cli.client_secret.clone(),
            redirect_uri: cli.redirect_uri.clone(),
        },
        endpoints.clone(),
    )?);
    let client = Arc::new(BoxClient::new(endpoints));
    let store = Arc::new(FileSessionStore::default_location()?);

    match cli.command {
        Commands::Login => login(&auth, &store).await,
        Commands::Upload { paths } => upload(&client, &auth, &store, &cli.folder_id, paths).await,
        Commands::List => list(&client, &store, &cli.folder_id).await,
        Commands::Whoami => whoami(&client, &store).await,
        Commands::Logout => logout(&auth, &store).await,
    }
}

async fn login(auth: &Arc<AuthService>, store: &Arc<FileSessionStore>) -> Result<()> {
    let (url, state) = auth.authorization_url();

    println!("Opening the authorization page:");
    println!("  {}", url);
    println!("Check that the redirect carries state={}", state);
    if open::that(url.as_str()).is_err() {
        println!("Could not launch a browser; open the URL manually.");
    }

    print!("Paste the code parameter from the redirect URL: ");
    std::io::stdout().flush()?;
    let mut code = String::new();
    std::io::stdin().read_line(&mut code)?;
    let code = code.trim();
    if code.is_empty() {
        bail!("no authorization code provided");
    }

    let tokens = auth.exchange_code(code).await?;
    let identity = auth.fetch_identity(&tokens.access_token).await?;

    store.save(&StoredSession {
        tokens,
        identity: Some(identity.clone()),
    })?;

    println!("Logged in as {} ({})", identity.name, identity.login);
    println!("Session stored at {}", store.path().display());
    Ok(())
}

async fn upload(
    client: &Arc<BoxClient>,
    auth: &Arc<AuthService>,
    store: &Arc<FileSessionStore>,
    folder_id: &str,
    paths: Vec<PathBuf>,
) -> Result<()> {
    if paths.is_empty() {
        bail!("no files given");
    }

    let mut uploader = BatchUploader::new(client.clone(), auth.clone(), store.clone(), folder_id)
        .with_observer(|name, pct, aggregate| {
            print!("\r{:<40} {:>3}%   overall {:>3}%", name, pct, aggregate);
            let _ = std::io::stdout().flush();
        });

    for path in &paths {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("{} has no usable file name", path.display()))?;
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        uploader.enqueue(PendingFile::new(FileName::parse(name)?, mime_type, bytes))?;
    }

    let report = match uploader.run().await {
        Ok(report) => report,
        Err(err @ boxlift_common::Error::ReauthRequired(_)) => {
            println!();
            bail!("{}\nRun `boxlift login` and upload again.", err);
        }
        Err(err) => return Err(err.into()),
    };

    println!();
    println!("Uploaded {}/{} file(s)", report.succeeded, report.attempted);
    for outcome in &report.outcomes {
        match outcome {
            UploadOutcome::Created { file } => {
                println!("  {}  (id {})", file.name, file.id);
            }
            UploadOutcome::Versioned { file } => {
                println!("  {}  (new version v{})", file.name, file.version_number());
            }
            UploadOutcome::Renamed { file, renamed_to } => {
                println!("  {}  (stored as {})", file.name, renamed_to);
            }
        }
    }
    for failure in &report.failures {
        println!("  FAILED {}: {}", failure.name, failure.reason);
    }

    println!();
    list(client, store, folder_id).await
}

async fn list(
    client: &Arc<BoxClient>,
    store: &Arc<FileSessionStore>,
    folder_id: &str,
) -> Result<()> {
    let session = store
        .load()?
        .context("not logged in; run `boxlift login` first")?;

    let listing = client
        .list_folder(&session.tokens.access_token, folder_id)
        .await?;

    println!("{} file(s) in folder {}", listing.total, folder_id);
    for file in &listing.files {
        let modified = file
            .modified_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "  {:<40} v{:<3} {:>12} bytes  {}",
            file.name,
            file.version_number(),
            file.size,
            modified
        );
    }
    Ok(())
}

async fn whoami(client: &Arc<BoxClient>, store: &Arc<FileSessionStore>) -> Result<()> {
    let session = store
        .load()?
        .context("not logged in; run `boxlift login` first")?;

    let probe = client.probe_token(&session.tokens.access_token).await;
    if probe.valid {
        if let Some(identity) = probe.identity {
            println!("Token valid; logged in as {} ({})", identity.name, identity.login);
        } else {
            println!("Token valid");
        }
    } else {
        println!(
            "Token invalid: {}",
            probe.error.unwrap_or_else(|| "unknown error".to_string())
        );
        println!("Run `boxlift login` to re-authenticate.");
    }
    Ok(())
}

async fn logout(auth: &Arc<AuthService>, store: &Arc<FileSessionStore>) -> Result<()> {
    if let Some(session) = store.load()? {
        // best-effort; logout never blocks on the provider
        if let Err(err) = auth.revoke(&session.tokens.access_token).await {
            warn!(error = %err, "revocation failed, clearing local session anyway");
        }
    }
    store.clear()?;
    println!("Logged out.");
    Ok(())
}
