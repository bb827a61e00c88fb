//! userdesk
//!
//! User management with login, registration, password reset and a
//! role-aware dashboard over a profile document store.

mod config;
mod auth;
mod store;
mod dashboard;
mod notify;
mod app;
#[cfg(test)]
mod testing;

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use userdesk_common::crypto::random_token;
use userdesk_common::{Gender, ProfileChanges, RegistrationForm, USERS_COLLECTION};

use app::App;
use auth::{AccountManager, LocalIdentityProvider, LogMailer};
use config::AppConfig;
use dashboard::{render, DashboardError, RowOrder, ViewerStatus};
use notify::{Level, Notification, Notifier, Route};
use store::{RecordStore, SqliteRecordStore};

#[derive(Parser)]
#[command(name = "userdesk")]
#[command(about = "userdesk - user registration and role-aware dashboard")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
#[group(required = true, multiple = true)]
struct Credentials {
    /// Email of the signed-in viewer
    #[arg(long = "login", requires = "password", conflicts_with = "token")]
    login: Option<String>,

    #[arg(long, requires = "login")]
    password: Option<String>,

    /// Session token printed by `login`
    #[arg(long)]
    token: Option<String>,
}

#[derive(Args)]
struct ProfileArgs {
    #[arg(long)]
    username: String,

    #[arg(long)]
    email: String,

    #[arg(long)]
    password: String,

    #[arg(long)]
    confirm_password: Option<String>,

    #[arg(long)]
    mobile: String,

    #[arg(long)]
    gender: Gender,

    /// Date of birth, YYYY-MM-DD
    #[arg(long)]
    dob: NaiveDate,

    #[arg(long)]
    address: String,
}

impl ProfileArgs {
    fn into_form(self) -> RegistrationForm {
        RegistrationForm {
            confirm_password: self.confirm_password.unwrap_or_else(|| self.password.clone()),
            username: self.username,
            email: self.email,
            password: self.password,
            mobile: self.mobile,
            gender: Some(self.gender),
            dob: Some(self.dob),
            address: self.address,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new user account
    Register(ProfileArgs),

    /// Sign in and print a session token
    Login {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,
    },

    /// Revoke a session token
    Logout {
        #[arg(long)]
        token: String,
    },

    /// Show the dashboard as seen by the signed-in viewer
    Dashboard {
        #[command(flatten)]
        credentials: Credentials,

        #[arg(long, default_value = "1")]
        page: usize,

        /// Row order: roster, username or username:desc
        #[arg(long, default_value = "roster")]
        sort: RowOrder,
    },

    /// Edit a profile visible to the signed-in viewer
    Edit {
        #[command(flatten)]
        credentials: Credentials,

        /// Id of the profile to edit
        #[arg(long)]
        target: String,

        #[arg(long = "set-username")]
        username: Option<String>,

        #[arg(long = "set-email")]
        email: Option<String>,

        #[arg(long = "set-mobile")]
        mobile: Option<String>,

        #[arg(long = "set-gender")]
        gender: Option<Gender>,

        #[arg(long = "set-dob")]
        dob: Option<NaiveDate>,

        #[arg(long = "set-address")]
        address: Option<String>,
    },

    /// Delete a profile (administrators only)
    Delete {
        #[command(flatten)]
        credentials: Credentials,

        #[arg(long)]
        target: String,
    },

    /// Send a reset code, then prompt for it and the new password
    ResetPassword {
        #[arg(long)]
        email: String,

        #[arg(long)]
        new_password: Option<String>,
    },

    /// Create an administrator account
    AddAdmin(ProfileArgs),

    /// List every stored profile
    ListUsers,

    GenerateConfig {
        #[arg(short, long, default_value = "userdesk.toml")]
        output: PathBuf,
    },

    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);
    let config = if config_path.exists() {
        AppConfig::load(&config_path)?
    } else {
        info!("No config file found, using defaults");
        AppConfig::default()
    };

    match cli.command {
        Commands::GenerateConfig { output } => generate_config(&output),
        Commands::Info => show_info(&config),
        Commands::ListUsers => list_users(&config).await,
        command => run_flow(&config, command).await,
    }
}

struct Services {
    identity: Arc<LocalIdentityProvider>,
    store: Arc<SqliteRecordStore>,
}

fn open_services(config: &AppConfig) -> Result<Services> {
    let accounts = AccountManager::new(&config.storage.db_path)
        .with_context(|| format!("Failed to open accounts at {:?}", config.storage.db_path))?;
    let identity = LocalIdentityProvider::new(accounts, &config.auth, Arc::new(LogMailer))?;
    let store = SqliteRecordStore::open(&config.storage.db_path)
        .with_context(|| format!("Failed to open documents at {:?}", config.storage.db_path))?;

    Ok(Services {
        identity: Arc::new(identity),
        store: Arc::new(store),
    })
}

async fn run_flow(config: &AppConfig, command: Commands) -> Result<()> {
    let services = open_services(config)?;
    let (notifier, mut notes) = Notifier::channel();
    let app = App::new(
        services.identity.clone(),
        services.store.clone(),
        notifier,
        config.dashboard.clone(),
    );
    let today = Local::now().date_naive();

    let result = match command {
        Commands::Register(args) => {
            app.navigator().navigate(Route::Register);
            app.register(&args.into_form(), today)
                .await
                .map(|uid| println!("Registered {}", uid))
                .map_err(anyhow::Error::from)
        }
        Commands::AddAdmin(args) => app
            .seed_admin(&args.into_form(), today)
            .await
            .map(|uid| println!("Administrator id {}", uid))
            .map_err(anyhow::Error::from),
        Commands::Login { email, password } => app
            .login(&email, &password)
            .await
            .map(|session| {
                println!("Session valid until {}", session.expires_at.format("%Y-%m-%d %H:%M UTC"));
                println!("{}", session.token);
            })
            .map_err(anyhow::Error::from),
        Commands::Logout { token } => logout(&app, &token).await,
        Commands::Dashboard { credentials, page, sort } => {
            show_dashboard(&app, &credentials, sort, page, config.dashboard.page_size).await
        }
        Commands::Edit { credentials, target, username, email, mobile, gender, dob, address } => {
            let changes = ProfileChanges { username, email, mobile, gender, dob, address };
            edit_profile(&app, &credentials, &target, &changes).await
        }
        Commands::Delete { credentials, target } => delete_profile(&app, &credentials, &target).await,
        Commands::ResetPassword { email, new_password } => reset_password(&app, &email, new_password).await,
        Commands::GenerateConfig { .. } | Commands::Info | Commands::ListUsers => Ok(()),
    };

    print_notes(&mut notes);
    debug!("Flow finished at {}", app.navigator().current().path());
    result
}

/// Sign in and wait for the dashboard to resolve the viewer.
///
/// The listener is attached after sign-in so its first event is the live session.
async fn open_dashboard(app: &App, credentials: &Credentials) -> Result<dashboard::SessionListener> {
    match (&credentials.token, &credentials.login, &credentials.password) {
        (Some(token), _, _) => {
            app.resume(token).await?;
        }
        (None, Some(email), Some(password)) => {
            app.login(email, password).await?;
        }
        _ => bail!("Pass --token, or --login with --password"),
    }
    let listener = app.dashboard().attach();

    match app.dashboard().settled().await {
        ViewerStatus::Resolved => Ok(listener),
        ViewerStatus::Missing => bail!("No profile document exists for this account"),
        status => bail!("Dashboard did not resolve the viewer ({:?})", status),
    }
}

async fn show_dashboard(
    app: &App,
    credentials: &Credentials,
    order: RowOrder,
    page: usize,
    page_size: usize,
) -> Result<()> {
    let _listener = open_dashboard(app, credentials).await?;
    print!("{}", render(&app.dashboard().view(), order, page, page_size));
    Ok(())
}

async fn edit_profile(app: &App, credentials: &Credentials, target: &str, changes: &ProfileChanges) -> Result<()> {
    if changes.is_empty() {
        bail!("Nothing to change; pass at least one --set-* option");
    }

    let _listener = open_dashboard(app, credentials).await?;
    let dashboard = app.dashboard();

    let current = dashboard.begin_edit(target)?;
    info!("Editing {} ({})", current.username, current.id);
    if let Err(e) = dashboard.submit_edit(changes).await {
        dashboard.cancel_edit();
        return Err(e.into());
    }

    if let Some(row) = dashboard.view().rows.iter().find(|r| r.profile.id == target) {
        println!("{}", serde_json::to_string_pretty(&row.profile)?);
    }
    Ok(())
}

async fn delete_profile(app: &App, credentials: &Credentials, target: &str) -> Result<()> {
    let _listener = open_dashboard(app, credentials).await?;
    match app.dashboard().delete_profile(target).await {
        Err(DashboardError::Store(e)) if e.is_not_found() => bail!("No profile with id {}", target),
        other => Ok(other?),
    }
}

async fn logout(app: &App, token: &str) -> Result<()> {
    app.resume(token).await?;
    app.logout().await?;
    Ok(())
}

async fn reset_password(app: &App, email: &str, new_password: Option<String>) -> Result<()> {
    app.request_password_reset(email).await?;

    let code = prompt("Reset code: ")?;
    let new_password = match new_password {
        Some(password) => password,
        None => prompt("New password: ")?,
    };

    app.confirm_password_reset(&code, &new_password).await?;
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

fn print_notes(notes: &mut UnboundedReceiver<Notification>) {
    while let Ok(note) = notes.try_recv() {
        match note.level {
            Level::Success => println!("\x1b[32m✓ {}\x1b[0m", note.message),
            Level::Error => println!("\x1b[31m✗ {}\x1b[0m", note.message),
        }
    }
}

async fn list_users(config: &AppConfig) -> Result<()> {
    let services = open_services(config)?;
    let profiles = services.store.get_all(USERS_COLLECTION).await?;

    if profiles.is_empty() {
        println!("No users registered");
        return Ok(());
    }

    println!("{:<38} {:<20} {:<30} {:<6}", "ID", "Username", "Email", "Role");
    println!("{}", "-".repeat(96));
    for profile in profiles {
        println!(
            "{:<38} {:<20} {:<30} {:<6}",
            profile.id, profile.username, profile.email, profile.role
        );
    }

    Ok(())
}

fn show_info(config: &AppConfig) -> Result<()> {
    let services = open_services(config)?;

    println!("userdesk v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Database:          {:?}", config.storage.db_path);
    println!("Accounts:          {}", services.identity.accounts().account_count()?);
    println!("Profiles:          {}", services.store.count(USERS_COLLECTION)?);
    println!("Session lifetime:  {}h", config.auth.session_expiry_hours);
    println!("Reset code expiry: {}m", config.auth.reset_expiry_minutes);
    println!("Page size:         {}", config.dashboard.page_size);
    println!(
        "Affordance checks: {}",
        if config.dashboard.enforce_affordances { "enforced" } else { "presentation only" }
    );

    Ok(())
}

fn generate_config(output: &PathBuf) -> Result<()> {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = Some(random_token(32)?);
    config.save(output)?;
    println!("Configuration written to {:?}", output);
    Ok(())
}
