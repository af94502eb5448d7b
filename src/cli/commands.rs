//! Subcommand handlers.

use std::path::PathBuf;
use std::sync::Arc;

use super::args::{AvatarQuery, Command, ConfigAction, GenerateArgs};
use crate::catalog::{avatars_or_samples, find_voice, sample_voices, AvatarFilter};
use crate::config::{default_path as get_config_path, Config, DEFAULT_CONFIG_TOML};
use crate::ledger::{CreditLedger, JsonProfileStore, LedgerError, GENERATION_COST};
use crate::orchestrator::{JobFailure, JobOrchestrator, JobState, Notice, OrchestratorError};
use crate::provider::{ProviderClient, ProviderError, ProviderGateway, PROVIDER_API_KEY_ENV};
use crate::selection::{SelectionError, SelectionStore};
use crate::session::{
    has_brand_placeholder, render_script, sign_in, sign_out, sign_up, Session, SessionError,
    VoiceChoice,
};

/// File name of the selection store inside the data directory.
const SELECTION_FILE: &str = "selection.json";

/// File name of the profile records inside the data directory.
const PROFILES_FILE: &str = "profiles.json";

/// Everything a command needs, wired from configuration.
pub struct App {
    pub config: Config,
    pub config_path: PathBuf,
    pub store: SelectionStore,
    pub ledger: Arc<CreditLedger>,
    pub gateway: Arc<ProviderClient>,
}

impl App {
    pub fn open(config: Config, config_path: PathBuf) -> Result<Self, CliError> {
        let data_dir = config.storage.resolved_data_dir();
        log::debug!("Using data directory {}", data_dir.display());

        let store = SelectionStore::open(data_dir.join(SELECTION_FILE))?;
        let profiles = Arc::new(JsonProfileStore::new(data_dir.join(PROFILES_FILE)));
        let ledger = Arc::new(CreditLedger::new(profiles, config.credits.starting_grant));

        let gateway = Arc::new(ProviderClient::with_timeout(
            config.provider.base_url.clone(),
            std::time::Duration::from_secs(config.provider.request_timeout_secs),
        )?);
        if let Some(key) = store.api_key() {
            gateway.configure(key.to_string());
        } else if let Ok(key) = std::env::var(PROVIDER_API_KEY_ENV) {
            gateway.configure(key);
        }

        Ok(Self {
            config,
            config_path,
            store,
            ledger,
            gateway,
        })
    }
}

/// Dispatch a parsed command.
pub async fn run(app: &mut App, command: Command) -> Result<(), CliError> {
    match command {
        Command::Signup { email, name } => {
            let profile = sign_up(&app.ledger, &mut app.store, &email, &name).await?;
            println!("Account created successfully!");
            println!("Signed in as {} <{}>", profile.name, profile.email);
            println!("You have {} credits.", profile.credits);
        }
        Command::Signin { email } => {
            let profile = sign_in(&app.ledger, &mut app.store, &email).await?;
            println!("Successfully signed in as {} <{}>", profile.name, profile.email);
        }
        Command::Signout => {
            sign_out(&mut app.store)?;
            println!("You have been signed out.");
        }
        Command::Whoami => whoami(app).await?,
        Command::Avatars(query) => list_avatars(app, query).await,
        Command::SelectAvatar { id } => select_avatar(app, &id).await?,
        Command::Voices { category } => list_voices(category.as_deref()),
        Command::SetKey { key } => {
            if key.trim().is_empty() {
                return Err(CliError::EmptyApiKey);
            }
            app.store.set_api_key(&key)?;
            app.gateway.configure(key.trim().to_string());
            println!("API key saved to {}", app.store.path().display());
        }
        Command::ClearKey => {
            app.store.clear_api_key()?;
            println!("API key removed.");
        }
        Command::Generate(args) => generate(app, args).await?,
        Command::Config { action } => handle_config_action(app, action)?,
    }
    Ok(())
}

async fn whoami(app: &App) -> Result<(), CliError> {
    let session = Session::load(&app.store)?;
    match app.ledger.profile(&session.account_id).await? {
        Some(profile) => println!("{} <{}> ({})", profile.name, profile.email, profile.id),
        None => println!("{}", session.account_id),
    }

    let credits = app.ledger.balance(&session.account_id).await?;
    println!("Credits: {} (each video costs {})", credits, GENERATION_COST);

    match session.avatar {
        Some(avatar) => println!("Avatar: {} ({})", avatar.name, avatar.id),
        None => println!("Avatar: none selected"),
    }

    let key_status = match app.store.api_key() {
        Some(key) => format!("stored ({})", mask_key(key)),
        None if app.gateway.has_credential() => format!("from {}", PROVIDER_API_KEY_ENV),
        None => "not set".to_string(),
    };
    println!("API key: {}", key_status);
    Ok(())
}

async fn list_avatars(app: &App, query: AvatarQuery) {
    let avatars = avatars_or_samples(app.gateway.as_ref()).await;
    let filter = AvatarFilter {
        query: query.search,
        gender: query.gender,
        style: query.style,
        ethnicity: query.ethnicity,
        age_range: query.age_range,
    };
    let matches = filter.apply(&avatars);

    if matches.is_empty() {
        println!("No avatars found.");
        println!("Try adjusting your search or filters.");
        return;
    }

    let selected = app.store.avatar().map(|a| a.id);
    for avatar in matches {
        let marker = if selected.as_deref() == Some(avatar.id.as_str()) {
            "*"
        } else {
            " "
        };
        let labels: Vec<&str> = avatar.labels().collect();
        println!("{} {:<14} {:<20} {}", marker, avatar.id, avatar.name, labels.join(", "));
    }
    if filter.active_count() > 0 {
        println!();
        println!("{} filter(s) active.", filter.active_count());
    }
}

async fn select_avatar(app: &mut App, id: &str) -> Result<(), CliError> {
    let avatars = avatars_or_samples(app.gateway.as_ref()).await;
    let avatar = avatars
        .into_iter()
        .find(|a| a.id == id)
        .ok_or_else(|| CliError::UnknownAvatar(id.to_string()))?;
    app.store.set_avatar(&avatar)?;
    println!("Selected {} ({}).", avatar.name, avatar.id);
    Ok(())
}

fn list_voices(category: Option<&str>) {
    for voice in sample_voices()
        .iter()
        .filter(|v| category.map_or(true, |c| v.category.eq_ignore_ascii_case(c)))
    {
        println!("  {:<10} {:<10} {}", voice.id, voice.name, voice.category);
    }
}

async fn generate(app: &App, args: GenerateArgs) -> Result<(), CliError> {
    let raw_script = match (args.script, args.script_file) {
        (Some(script), _) => script,
        (None, Some(path)) => std::fs::read_to_string(&path).map_err(|e| CliError::ScriptFile {
            path: path.clone(),
            source: e,
        })?,
        (None, None) => String::new(),
    };
    if !raw_script.trim().is_empty() && !has_brand_placeholder(&raw_script) {
        println!("Tip: include [Brand] in your script where your brand name should appear.");
    }
    let script = render_script(&raw_script, args.brand.as_deref());

    if find_voice(&args.voice).is_none() {
        log::info!("Voice '{}' is not a built-in voice, passing it through", args.voice);
    }

    let mut session = Session::load(&app.store)?
        .with_voice(VoiceChoice::with_type(args.voice, args.voice_type))
        .with_script(script);
    session.video_name = args.name;

    let orchestrator = JobOrchestrator::new(
        app.gateway.clone(),
        app.ledger.clone(),
        app.config.generation.orchestrator_settings(),
    );

    let (cancel_tx, mut cancel_rx) = tokio::sync::mpsc::channel::<()>(1);
    ctrlc::set_handler(move || {
        let _ = cancel_tx.try_send(());
    })?;

    if let Err(e) = orchestrator.submit(&session).await {
        let notice = Notice::from(&e);
        eprintln!("{}", notice);
        return Err(e.into());
    }

    let mut updates = orchestrator.subscribe();
    let mut last_state = JobState::Idle;
    let finished = loop {
        let snapshot = updates.borrow_and_update().clone();
        if snapshot.state != last_state {
            if let (JobState::Polling, Some(job_id)) = (snapshot.state, &snapshot.job_id) {
                println!("Generating video (job {})... press Ctrl-C to cancel", job_id);
            }
            last_state = snapshot.state;
        }
        if !snapshot.state.is_active() {
            break snapshot;
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break orchestrator.snapshot();
                }
            }
            _ = cancel_rx.recv() => {
                println!("Cancelling...");
                break orchestrator.reset().await;
            }
        }
    };

    if let Some(notice) = Notice::for_snapshot(&finished) {
        println!("{}", notice);
    }

    match finished.state {
        JobState::Completed => {
            let url = finished.result_url.unwrap_or_default();
            println!("Video: {}", url);
            if let Some(balance) = finished.balance {
                println!("Credits remaining: {}", balance);
            }
            if let Some(dest) = args.download {
                if finished.fallback_reason.is_some() {
                    println!("Skipping download of placeholder video.");
                } else {
                    let path = app.gateway.download_video(&url, &dest).await?;
                    println!("Downloaded to {}", path.display());
                }
            }
            Ok(())
        }
        JobState::Failed => Err(CliError::JobFailed(
            finished.failure.unwrap_or(JobFailure::GenerationFailed {
                message: "unknown error".to_string(),
            }),
        )),
        _ => {
            println!("Generation cancelled. No credits were charged.");
            Ok(())
        }
    }
}

/// Handle config subcommand actions.
fn handle_config_action(app: &App, action: ConfigAction) -> Result<(), CliError> {
    match action {
        ConfigAction::Show => {
            let config = &app.config;
            println!("Current configuration:");
            println!("  Provider: {}", config.provider.base_url);
            println!("  Request timeout: {}s", config.provider.request_timeout_secs);
            println!("  Poll interval: {}ms", config.generation.poll_interval_ms);
            println!("  Max poll attempts: {}", config.generation.max_poll_attempts);
            println!(
                "  Max consecutive poll errors: {}",
                config.generation.max_consecutive_poll_errors
            );
            println!("  Job timeout: {}s", config.generation.timeout_secs);
            println!(
                "  Fallback: {}",
                if config.generation.fallback_enabled {
                    config.generation.fallback_video_url.as_str()
                } else {
                    "disabled"
                }
            );
            println!("  Starting credits: {}", config.credits.starting_grant);
            println!("  Data dir: {}", config.storage.resolved_data_dir().display());
            println!();

            if app.config_path.exists() {
                println!("Config file: {} (exists)", app.config_path.display());
            } else {
                println!("Config file: {} (not found)", app.config_path.display());
            }
        }
        ConfigAction::Init => {
            let config_path = &app.config_path;
            if config_path.exists() {
                return Err(CliError::ConfigExists(config_path.clone()));
            }

            let io = |source: std::io::Error| CliError::ConfigWrite {
                path: config_path.clone(),
                source,
            };
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent).map_err(io)?;
            }
            std::fs::write(config_path, DEFAULT_CONFIG_TOML).map_err(io)?;

            println!("Created config file: {}", config_path.display());
        }
    }
    Ok(())
}

/// Show only the first four characters of a key.
fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{}…", prefix)
}

/// Resolve the config path from the command line.
pub fn config_path(arg: Option<PathBuf>) -> PathBuf {
    arg.unwrap_or_else(get_config_path)
}

/// Errors surfaced by CLI commands.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Rejected(#[from] OrchestratorError),

    #[error("{0}")]
    JobFailed(JobFailure),

    #[error("Unknown avatar '{0}'. Run `ugc-studio avatars` to list them")]
    UnknownAvatar(String),

    #[error("API key must not be empty")]
    EmptyApiKey,

    #[error("Failed to read script file '{}': {source}", path.display())]
    ScriptFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config file already exists: {}", .0.display())]
    ConfigExists(PathBuf),

    #[error("Failed to write config file '{}': {source}", path.display())]
    ConfigWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_in(dir: &tempfile::TempDir) -> App {
        let mut config = Config::default();
        config.storage.data_dir = Some(dir.path().to_path_buf());
        config.provider.base_url = "http://127.0.0.1:9".to_string();
        App::open(config, dir.path().join("config.toml")).unwrap()
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-1234567"), "sk-1…");
        assert_eq!(mask_key("ab"), "ab…");
    }

    #[tokio::test]
    async fn test_signup_then_whoami() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_in(&dir);
        run(
            &mut app,
            Command::Signup {
                email: "me@example.com".to_string(),
                name: "Me".to_string(),
            },
        )
        .await
        .unwrap();
        run(&mut app, Command::Whoami).await.unwrap();
        assert!(dir.path().join(PROFILES_FILE).exists());
    }

    #[tokio::test]
    async fn test_set_key_configures_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_in(&dir);
        run(&mut app, Command::SetKey { key: "sk-test".to_string() }).await.unwrap();
        assert!(app.gateway.has_credential());
        assert_eq!(app.store.api_key(), Some("sk-test"));

        let empty = run(&mut app, Command::SetKey { key: " ".to_string() }).await;
        assert!(matches!(empty, Err(CliError::EmptyApiKey)));
    }

    #[tokio::test]
    async fn test_select_avatar_falls_back_to_samples() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_in(&dir);
        app.gateway.configure("sk-test".to_string());

        select_avatar(&mut app, "avatar-4").await.unwrap();
        assert_eq!(app.store.avatar().map(|a| a.id), Some("avatar-4".to_string()));

        let missing = select_avatar(&mut app, "avatar-404").await;
        assert!(matches!(missing, Err(CliError::UnknownAvatar(_))));
    }

    #[tokio::test]
    async fn test_config_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_in(&dir);
        run(&mut app, Command::Config { action: ConfigAction::Init }).await.unwrap();
        assert!(app.config_path.exists());

        let again = run(&mut app, Command::Config { action: ConfigAction::Init }).await;
        assert!(matches!(again, Err(CliError::ConfigExists(_))));
    }
}
