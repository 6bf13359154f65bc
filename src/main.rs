use std::path::{Path, PathBuf};
use clap::{Parser, Subcommand};
use anyhow::{Result, Context};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::artifact::{Artifact, HistoryStore, Role};
use crate::export::{export_artifact, ExportFormat};
use crate::ingest::{collect_inputs, PdfWorker, SourceFile};
use crate::llm::{build_provider, fetch_available_models, AnyProvider, ModelProvider, ModelTier, ProviderId, UserSettings};
use crate::session::Session;

mod artifact;
mod export;
mod ingest;
mod llm;
mod session;

const SETTINGS_FILE: &str = "settings.json";

/// Turns notes, screenshots and PDFs into knowledge base articles
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Directory holding settings.json and history.json
    #[arg(long, env = "KBFORGE_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,
}

/// Per-run overrides on top of the saved settings
#[derive(clap::Args, Debug, Default)]
struct ModelArgs {
    /// Provider to use (google, openai, anthropic)
    #[arg(long)]
    provider: Option<ProviderId>,

    /// Model tier (fast, reasoning)
    #[arg(long)]
    tier: Option<ModelTier>,

    /// Provider endpoint, e.g. http://localhost:1234/v1 for a local server
    #[arg(long)]
    llm_url: Option<String>,

    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    google_key: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_key: Option<String>,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_key: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new article from a request and input files
    Generate {
        /// What the article should cover
        #[arg(short, long)]
        prompt: Option<String>,

        /// Files, directories or glob patterns to attach
        inputs: Vec<String>,

        /// Write the HTML here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        model: ModelArgs,
    },
    /// Apply change instructions to a saved article
    Refine {
        /// Artifact id or unique prefix
        id: String,

        instructions: String,

        #[arg(short, long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        model: ModelArgs,
    },
    /// Export a saved article
    Export {
        id: String,

        #[arg(short, long, value_enum, default_value = "docx")]
        format: ExportFormat,

        /// Target directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// List saved articles, newest first
    List,
    /// Print a saved article's HTML
    Show {
        id: String,
    },
    /// Import artifact JSON files or URLs into the history
    Import {
        #[arg(required = true)]
        sources: Vec<String>,
    },
    /// Interactive session: generate, then refine with follow-up messages
    Chat {
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Show or change saved settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
    /// List the models each provider tier maps to, or those served at --llm-url
    Models {
        #[arg(long)]
        llm_url: Option<String>,

        #[arg(long)]
        llm_key: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        provider: Option<ProviderId>,

        #[arg(long)]
        tier: Option<ModelTier>,

        /// API key for the provider being set (or the active one)
        #[arg(long)]
        api_key: Option<String>,

        #[arg(long, conflicts_with = "clear_base_url")]
        base_url: Option<String>,

        #[arg(long)]
        clear_base_url: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level)?;

    let data_dir = resolve_data_dir(args.data_dir.clone())?;
    let settings_path = data_dir.join(SETTINGS_FILE);
    let store = HistoryStore::new(&data_dir);

    match args.command {
        Command::Generate { prompt, inputs, out, model } => {
            let settings = apply_overrides(UserSettings::load(&settings_path), &model);
            run_generate(&settings, &store, prompt.unwrap_or_default(), &inputs, out.as_deref()).await
        }
        Command::Refine { id, instructions, out, model } => {
            let settings = apply_overrides(UserSettings::load(&settings_path), &model);
            run_refine(&settings, &store, &id, &instructions, out.as_deref()).await
        }
        Command::Export { id, format, out } => {
            let artifact = store.find(&id)?;
            let path = export_artifact(&artifact, format, &out)?;
            println!("{}", path.display());
            Ok(())
        }
        Command::List => {
            list_artifacts(&store);
            Ok(())
        }
        Command::Show { id } => {
            println!("{}", store.find(&id)?.html);
            Ok(())
        }
        Command::Import { sources } => {
            let imported = artifact::import_artifacts(&sources).await;
            if imported.is_empty() {
                return Err(anyhow::anyhow!("Nothing was imported"));
            }
            store.upsert(&imported);
            println!("Imported {} artifact(s)", imported.len());
            Ok(())
        }
        Command::Chat { model } => {
            let settings = apply_overrides(UserSettings::load(&settings_path), &model);
            run_chat(&settings, &store).await
        }
        Command::Settings { action } => {
            run_settings(&settings_path, action.unwrap_or(SettingsAction::Show))
        }
        Command::Models { llm_url, llm_key } => {
            let settings = UserSettings::load(&settings_path);
            list_models(llm_url.or(settings.base_url), llm_key.as_deref()).await
        }
    }
}

fn setup_logging(log_level: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_names(false)
        .with_ansi(true)
        .with_timer(tracing_subscriber::fmt::time::LocalTime::rfc_3339())
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn resolve_data_dir(arg: Option<PathBuf>) -> Result<PathBuf> {
    let dir = match arg {
        Some(dir) => dir,
        None => dirs::data_dir()
            .context("Could not determine a data directory, pass --data-dir")?
            .join("kbforge"),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
    Ok(dir)
}

/// Flags and environment keys win over whatever settings.json holds.
fn apply_overrides(mut settings: UserSettings, model: &ModelArgs) -> UserSettings {
    if let Some(provider) = model.provider {
        settings.active_provider = provider;
    }
    if let Some(tier) = model.tier {
        settings.active_model_tier = tier;
    }
    if let Some(url) = &model.llm_url {
        settings.base_url = Some(url.clone());
    }
    let keys = [
        (ProviderId::Google, &model.google_key),
        (ProviderId::OpenAi, &model.openai_key),
        (ProviderId::Anthropic, &model.anthropic_key),
    ];
    for (provider, key) in keys {
        if let Some(key) = key.as_ref().filter(|k| !k.is_empty()) {
            settings.api_keys.set(provider, key.clone());
        }
    }
    settings
}

fn new_session(settings: &UserSettings) -> Result<Session<AnyProvider>> {
    let provider = build_provider(settings)?;
    let pdf = PdfWorker::spawn().context("Failed to start PDF worker")?;
    Ok(Session::new(provider, pdf))
}

async fn read_sources(inputs: &[String]) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();
    for path in collect_inputs(inputs)? {
        files.push(SourceFile::read(&path).await?);
    }
    info!("Loaded {} input file(s)", files.len());
    Ok(files)
}

fn emit_html(html: &str, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, html)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", html),
    }
    Ok(())
}

async fn run_generate(
    settings: &UserSettings,
    store: &HistoryStore,
    prompt: String,
    inputs: &[String],
    out: Option<&Path>,
) -> Result<()> {
    let files = if inputs.is_empty() { Vec::new() } else { read_sources(inputs).await? };
    if prompt.trim().is_empty() && files.is_empty() {
        return Err(anyhow::anyhow!("Provide a --prompt, input files, or both"));
    }

    let mut session = new_session(settings)?;
    let reply = session.send_message(&prompt, files).await;
    let artifact = finished_artifact(&session, reply.artifact_id.as_deref(), &reply.content)?;

    store.upsert(std::slice::from_ref(artifact));
    info!("Saved artifact {} ({})", artifact.name, artifact.id);
    emit_html(&artifact.html, out)
}

async fn run_refine(
    settings: &UserSettings,
    store: &HistoryStore,
    id: &str,
    instructions: &str,
    out: Option<&Path>,
) -> Result<()> {
    let saved = store.find(id)?;
    let id = saved.id.clone();

    let mut session = new_session(settings)?.with_artifacts([saved]);
    session.select(&id)?;
    let reply = session.send_message(instructions, Vec::new()).await;
    let artifact = finished_artifact(&session, reply.artifact_id.as_deref(), &reply.content)?;

    store.upsert(std::slice::from_ref(artifact));
    emit_html(&artifact.html, out)
}

/// A reply without an artifact id carries the error text.
fn finished_artifact<'a, P: ModelProvider>(
    session: &'a Session<P>,
    artifact_id: Option<&str>,
    content: &str,
) -> Result<&'a Artifact> {
    artifact_id
        .and_then(|id| session.artifact(id))
        .ok_or_else(|| anyhow::anyhow!("{}", content.strip_prefix("Error: ").unwrap_or(content)))
}

fn list_artifacts(store: &HistoryStore) {
    let mut history = store.load();
    if history.is_empty() {
        println!("No saved articles in {}", store.path().display());
        return;
    }
    history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    for artifact in history {
        println!(
            "\x1b[1;33m{}\x1b[0m  {}  \x1b[1;36m{}\x1b[0m",
            artifact.id,
            artifact.timestamp.format("%Y-%m-%d %H:%M"),
            artifact.name
        );
    }
}

async fn run_chat(settings: &UserSettings, store: &HistoryStore) -> Result<()> {
    let mut session = new_session(settings)?.with_artifacts(store.load());
    let mut pending: Vec<SourceFile> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Describe the article or /attach files. /new, /use <id>, /list, /history, /status, /export <json|docx|html> [dir], /quit");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
            let rest = rest.trim();
            match name {
                "quit" | "exit" => break,
                "new" => {
                    session.reset();
                    pending.clear();
                    println!("Started a new article.");
                }
                "list" => {
                    let mut artifacts: Vec<&Artifact> = session.artifacts().collect();
                    artifacts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                    let active = session.active_artifact().map(|a| a.id.as_str());
                    for artifact in artifacts {
                        let marker = if Some(artifact.id.as_str()) == active { "*" } else { " " };
                        println!("{} \x1b[1;33m{}\x1b[0m  {}", marker, artifact.id, artifact.name);
                    }
                }
                "status" => {
                    let state = if session.is_generating() { "generating" } else { "idle" };
                    match session.active_artifact() {
                        Some(artifact) => println!("{}, refining {} ({})", state, artifact.name, artifact.id),
                        None => println!("{}, next message starts a new article", state),
                    }
                    if !pending.is_empty() {
                        println!("{} attachment(s) waiting", pending.len());
                    }
                }
                "history" => {
                    for message in session.messages() {
                        let who = match message.role {
                            Role::User => "you",
                            Role::Assistant => "kbforge",
                        };
                        let attached = message.attachments.as_ref()
                            .map(|a| a.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(", "))
                            .filter(|names| !names.is_empty())
                            .map(|names| format!(" [{}]", names))
                            .unwrap_or_default();
                        println!("{} {}> {}{}", message.timestamp.format("%H:%M:%S"), who, message.content, attached);
                    }
                }
                "attach" => match read_sources(&[rest.to_string()]).await {
                    Ok(files) => {
                        for file in &files {
                            println!("Attached {} ({})", file.name, file.mime_type);
                        }
                        pending.extend(files);
                    }
                    Err(e) => println!("Error: {:#}", e),
                },
                "use" => match session.resolve(rest).map(|a| a.id.clone()) {
                    Ok(id) => {
                        let artifact = session.select(&id)?;
                        println!("Now refining {} ({})", artifact.name, artifact.id);
                    }
                    Err(e) => println!("Error: {:#}", e),
                },
                "export" => {
                    let (format, dir) = rest.split_once(' ').unwrap_or((rest, "."));
                    match (session.active_artifact(), parse_format(format)) {
                        (Some(artifact), Ok(format)) => match export_artifact(artifact, format, Path::new(dir.trim())) {
                            Ok(path) => println!("Exported to {}", path.display()),
                            Err(e) => println!("Error: {:#}", e),
                        },
                        (None, _) => println!("No active article to export."),
                        (_, Err(e)) => println!("Error: {}", e),
                    }
                }
                other => println!("Unknown command /{}", other),
            }
            continue;
        }

        let files = std::mem::take(&mut pending);
        let reply = session.send_message(line, files).await;
        println!("{}", reply.content);

        if let Some(artifact) = reply.artifact_id.as_deref().and_then(|id| session.artifact(id)) {
            store.upsert(std::slice::from_ref(artifact));
            println!("\x1b[1;33m{}\x1b[0m  {}", artifact.id, artifact.name);
        }
    }

    Ok(())
}

fn parse_format(value: &str) -> Result<ExportFormat> {
    use clap::ValueEnum;
    ExportFormat::from_str(value, true)
        .map_err(|_| anyhow::anyhow!("Unknown export format {}, expected json, docx or html", value))
}

fn run_settings(path: &Path, action: SettingsAction) -> Result<()> {
    let mut settings = UserSettings::load(path);

    if let SettingsAction::Set { provider, tier, api_key, base_url, clear_base_url } = action {
        if let Some(provider) = provider {
            settings.active_provider = provider;
        }
        if let Some(tier) = tier {
            settings.active_model_tier = tier;
        }
        if let Some(key) = api_key {
            settings.api_keys.set(settings.active_provider, key);
        }
        if clear_base_url {
            settings.base_url = None;
        } else if base_url.is_some() {
            settings.base_url = base_url;
        }
        settings.save(path)?;
    }

    println!("Settings file: {}", path.display());
    println!("Provider:      {}", settings.active_provider.profile().name);
    println!("Tier:          {}", settings.active_model_tier);
    println!("Model:         {}", settings.active_model());
    if let Some(url) = &settings.base_url {
        println!("Endpoint:      {}", url);
    }
    for provider in ProviderId::ALL {
        let state = if settings.api_keys.get(provider).is_empty() { "not set" } else { "set" };
        println!("{:<14} {}", format!("{} key:", provider), state);
    }
    Ok(())
}

async fn list_models(api_url: Option<String>, api_key: Option<&str>) -> Result<()> {
    let Some(api_url) = api_url else {
        for provider in ProviderId::ALL {
            let profile = provider.profile();
            println!("\x1b[1;36m{}\x1b[0m ({})", profile.name, provider);
            println!("  fast:      {}", profile.model(ModelTier::Fast));
            println!("  reasoning: {}", profile.model(ModelTier::Reasoning));
        }
        return Ok(());
    };

    info!("Fetching available models from {}", api_url);
    let models = fetch_available_models(&api_url, api_key).await?;
    if models.is_empty() {
        warn!("{} reported no models", api_url);
    }
    for (i, model) in models.iter().enumerate() {
        println!("{}. {}", i + 1, model);
    }
    Ok(())
}
