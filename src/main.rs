use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use roundup::api::{ApiClient, Backend};
use roundup::config::{AppSettings, BackendConfig, EnvironmentLoader};
use roundup::groups::filter_groups;
use roundup::recommend::DEFAULT_MAX_RECOMMENDATIONS;
use roundup::storage::{self, Cache};
use roundup::utils::RUNTIME;
use roundup::{AppState, RoundUp};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "roundup", about = "RoundUp client")]
struct Cli {
    /// Environment file with SUPABASE_URL and SUPABASE_ANON_KEY.
    #[arg(long, default_value = ".env")]
    env: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    SignUp { email: String, password: String },
    SignIn { email: String, password: String },
    SignOut,
    ResetPassword { email: String },
    Whoami,
    /// List groups, optionally filtered by name, description or interest.
    Groups {
        query: Option<String>,
        #[arg(long)]
        mine: bool,
        #[arg(long)]
        offline: bool,
    },
    CreateGroup {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long = "interest")]
        interests: Vec<String>,
    },
    Join { group_id: String },
    Messages { group_id: String },
    Send { group_id: String, content: String },
    /// Print messages as they arrive in a group.
    Watch { group_id: String },
    Recommend {
        #[arg(long)]
        groups: bool,
        #[arg(long, default_value_t = DEFAULT_MAX_RECOMMENDATIONS)]
        max: usize,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let env = EnvironmentLoader::load(&cli.env);
    let Some(config) = BackendConfig::from_env(&env) else {
        eprintln!("Backend is not configured; set SUPABASE_URL and SUPABASE_ANON_KEY in {}", cli.env.display());
        std::process::exit(2);
    };
    let settings = AppSettings::from_env(&env);

    if let Err(e) = RUNTIME.block_on(run(cli.command, config, settings)) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

async fn run(command: Command, config: BackendConfig, settings: AppSettings) -> roundup::Result<()> {
    let mut state = AppState::load();
    let api = Arc::new(ApiClient::new(&config)?);
    if state.base_url == config.url.as_str() {
        api.restore_tokens(state.tokens());
    }

    let mut app = RoundUp::new(api, settings.clone());
    if settings.cache_enabled {
        match storage::default_path().map(|p| Cache::open(&p)) {
            Some(Ok(cache)) => app = app.with_cache(cache),
            Some(Err(e)) => log::warn!("group cache unavailable: {e}"),
            None => log::warn!("no data directory, group cache disabled"),
        }
    }

    let needs_session = !matches!(command, Command::SignUp { .. } | Command::SignIn { .. } | Command::ResetPassword { .. });
    if needs_session && app.session().tokens().is_some() {
        if let Err(e) = app.session().check_session().await {
            log::info!("stored session is no longer valid: {e}");
        }
    }

    let result = dispatch(&app, command).await;

    state.base_url = config.url.to_string();
    state.set_tokens(app.session().tokens());
    if let Err(e) = state.save() {
        log::warn!("failed to save session: {e}");
    }
    result
}

async fn dispatch(app: &RoundUp<ApiClient>, command: Command) -> roundup::Result<()> {
    let session = app.session();
    match command {
        Command::SignUp { email, password } => {
            let user = session.sign_up(&email, &password).await?;
            println!("Signed up as {} ({})", user.email, user.id);
        }
        Command::SignIn { email, password } => {
            let user = session.sign_in(&email, &password).await?;
            println!("Signed in as {} ({})", user.email, user.id);
        }
        Command::SignOut => {
            session.sign_out().await?;
            println!("Signed out");
        }
        Command::ResetPassword { email } => {
            session.reset_password(&email).await?;
            println!("Password reset e-mail sent to {email}");
        }
        Command::Whoami => {
            let me = app.my_profile().await?;
            println!("{} [{}] {}", me.display_name(), me.initials(), me.id);
        }
        Command::Groups { query, mine, offline } => {
            let groups = if offline {
                match app.cache_synced_at()? {
                    Some(at) => println!("cached groups as of {}", at.format("%Y-%m-%d %H:%M UTC")),
                    None => println!("no cached groups yet"),
                }
                app.cached_groups()?
            } else if mine {
                app.my_groups().await?
            } else {
                app.discover_groups().await?
            };
            for g in filter_groups(&groups, query.as_deref().unwrap_or("")) {
                println!("{}  {}  ({} members)  {}", g.id, g.name, g.member_count(), g.interests.join(", "));
            }
        }
        Command::CreateGroup { name, description, interests } => {
            let group = app.create_group(&name, &description, interests).await?;
            println!("Created {} ({})", group.name, group.id);
        }
        Command::Join { group_id } => {
            let group = app.group(&group_id).await?;
            let group = app.join_group(&group).await?;
            println!("Joined {} ({} members)", group.name, group.member_count());
        }
        Command::Messages { group_id } => {
            for m in app.group_messages(&group_id).await? {
                println!("[{}] {}: {}", m.created_at.format("%H:%M"), m.sender_id, m.content);
            }
        }
        Command::Send { group_id, content } => {
            let m = app.send_message(&group_id, &content).await?;
            println!("Sent {}", m.id);
        }
        Command::Watch { group_id } => {
            let mut sub = app.watch_messages(&group_id).await?;
            log::info!("listening on {}", sub.topic());
            while let Some(m) = sub.next().await {
                println!("[{}] {}: {}", m.created_at.format("%H:%M"), m.sender_id, m.content);
            }
        }
        Command::Recommend { groups, max } => {
            if groups {
                for r in app.recommend_groups(max).await? {
                    println!("{:>5.1}  {}  ({} members)", r.score, r.group.name, r.member_count);
                }
            } else {
                for r in app.recommend_friends(max).await? {
                    let shared: Vec<String> = r.common_interests.values().flatten().cloned().collect();
                    println!("{:>5.1}  {}  {}", r.score, r.user.display_name(), shared.join(", "));
                }
            }
        }
    }
    Ok(())
}
