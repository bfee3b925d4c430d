use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use authstore::codec::Document;
use authstore::config::Config;
use authstore::db::{self, Stores};
use authstore::models::{GeneralDocument, LicenseDocument};
use authstore::store::DocumentStore;

#[derive(Parser, Debug)]
#[command(
    name = "authstore",
    version,
    about = "Inspect and repair the repository-backed auth documents"
)]
struct Cli {
    /// Run against an empty in-process store instead of the repository
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show document versions, record counts and cache state
    Status,
    /// Validate a license key with an application API key
    Validate {
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        key: String,
        #[arg(long)]
        hwid: Option<String>,
    },
    /// Copy application fields into their licenses. Without
    /// `--application`, every application is resynced in one write.
    Resync {
        #[arg(long)]
        application: Option<String>,
    },
    /// Create the admin user from BOOTSTRAP_ADMIN_EMAIL / BOOTSTRAP_ADMIN_PASSWORD
    Bootstrap,
    /// Remove ended and expired sessions of an application
    PruneSessions {
        #[arg(long)]
        application: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "authstore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let stores = if cli.memory {
        tracing::warn!("Using in-memory storage, nothing will be persisted");
        Stores::in_memory(config.cache_policy, config.conflict_retries)
    } else {
        config.validate()?;
        Stores::from_config(&config).context("Failed to set up repository storage")?
    };

    match cli.command {
        Command::Status => {
            print_status("general", &*stores.general, |doc: &GeneralDocument| {
                vec![
                    ("users", doc.users.len()),
                    ("applications", doc.applications.len()),
                    ("appUsers", doc.app_users.len()),
                    ("licenseKeys", doc.license_keys.len()),
                    ("subscriptions", doc.subscriptions.len()),
                    ("webhooks", doc.webhooks.len()),
                    ("blacklistEntries", doc.blacklist_entries.len()),
                    ("activityLogs", doc.activity_logs.len()),
                    ("activeSessions", doc.active_sessions.len()),
                ]
            })
            .await?;
            print_status("licenses", &*stores.licenses, |doc: &LicenseDocument| {
                let missing = doc
                    .licenses
                    .iter()
                    .filter(|l| l.application_data.is_none())
                    .count();
                vec![
                    ("licenses", doc.licenses.len()),
                    ("withoutApplicationData", missing),
                ]
            })
            .await?;
        }
        Command::Validate { api_key, key, hwid } => {
            let validation = db::licenses::validate_license_with_api_key(
                &stores.licenses,
                &api_key,
                &key,
                hwid.as_deref(),
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&validation)?);
            if let Some(message) = validation.message() {
                println!("{}", message);
            }
        }
        Command::Resync {
            application: Some(application),
        } => {
            let app = db::applications::get_application(&stores.general, &application)
                .await?
                .with_context(|| format!("Application {} not found", application))?;
            let updated =
                db::licenses::resync_application_snapshot(&stores.licenses, &app).await?;
            println!("Updated {} license(s) of {}", updated, app.name);
        }
        Command::Resync { application: None } => {
            let apps = db::applications::list_applications(&stores.general, None).await?;
            let updated = db::licenses::resync_all_snapshots(&stores.licenses, &apps).await?;
            println!("Updated {} license(s) across {} application(s)", updated, apps.len());
        }
        Command::Bootstrap => {
            match db::users::ensure_bootstrap_user(&stores.general, &config).await? {
                Some(user) => println!("Created admin user {}", user.email),
                None => println!("Nothing to do"),
            }
        }
        Command::PruneSessions { application } => {
            let removed = db::sessions::prune_sessions(&stores.general, &application).await?;
            println!("Removed {} session(s)", removed);
        }
    }

    Ok(())
}

async fn print_status<D: Document>(
    name: &str,
    store: &DocumentStore<D>,
    counts: impl Fn(&D) -> Vec<(&'static str, usize)>,
) -> anyhow::Result<()> {
    let snapshot = store.refresh().await?;
    println!("[{}] {}", name, store.remote().describe());
    println!("  sha: {}", snapshot.sha.as_deref().unwrap_or("(not created)"));
    if snapshot.degraded {
        println!("  degraded: some records could not be read, writes are blocked");
    }
    for (collection, count) in counts(snapshot.document.as_ref()) {
        println!("  {}: {}", collection, count);
    }
    let status = store.cache_status();
    println!("  cached: {} (stale: {})", status.cached, status.stale);
    Ok(())
}
