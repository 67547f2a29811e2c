//! CLI entry and dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use timegen_core::api::{AuthService, TimetableService};
use timegen_core::config::Config;
use timegen_core::gateway::AuthGateway;
use timegen_core::logging;
use timegen_core::session::{CookieJar, FileSessionStore, SessionHandle};

mod commands;

#[derive(Parser)]
#[command(name = "timegen")]
#[command(version)]
#[command(about = "Generate, view and export timetables from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API base URL (overrides TIMEGEN_API_BASE and config)
    #[arg(long, global = true, value_name = "URL")]
    api_base: Option<String>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TIMEGEN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Create an account and sign in
    Register {
        #[arg(long)]
        email: String,
        /// Display name
        #[arg(long)]
        name: String,
        #[arg(long, env = "TIMEGEN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign out and clear stored credentials
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Forgotten password flow
    Password {
        #[command(subcommand)]
        command: PasswordCommands,
    },

    /// Generate a timetable from a natural-language prompt
    Generate {
        /// Requirements: department, semester, subjects, faculty, constraints
        #[arg(short, long)]
        prompt: String,

        /// Also write the generated HTML to this file
        #[arg(long, value_name = "FILE")]
        html_out: Option<PathBuf>,
    },

    /// List generated timetables
    List,

    /// Show a generated timetable
    Show {
        #[arg(value_name = "TIMETABLE_ID")]
        id: String,
    },

    /// Export a timetable as printable HTML
    Export {
        #[arg(value_name = "TIMETABLE_ID")]
        id: String,

        /// Output file (`-` for stdout; default: timetable-<semester>.html)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum PasswordCommands {
    /// Request a password reset token
    Forgot {
        #[arg(long)]
        email: String,
    },
    /// Set a new password using a reset token
    Reset {
        #[arg(long)]
        token: String,
        #[arg(long, env = "TIMEGEN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

/// Services sharing one gateway and session.
pub struct Client {
    pub auth: AuthService,
    pub timetables: TimetableService,
}

impl Client {
    fn connect(config: &Config, api_base: Option<&str>) -> Result<Self> {
        let base = config.api_base(api_base)?;
        let session = SessionHandle::bootstrap(Arc::new(FileSessionStore::at_default_path()));
        let gateway = AuthGateway::with_cookie_jar(
            base,
            session,
            config.effective_user_agent(),
            CookieJar::at_default_path(),
        )?
        .with_policy(config.renewal);
        tracing::debug!(?gateway, "Client ready");

        let gateway = Arc::new(gateway);
        Ok(Self {
            auth: AuthService::new(Arc::clone(&gateway)),
            timetables: TimetableService::new(gateway),
        })
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose)?;

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let Cli {
        command,
        api_base,
        verbose: _,
    } = cli;

    let connect = || -> Result<Client> {
        let config = Config::load().context("load config")?;
        Client::connect(&config, api_base.as_deref())
    };

    match command {
        // no session or API needed
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },

        Commands::Login { email, password } => {
            commands::auth::login(&connect()?, &email, password.as_deref()).await
        }
        Commands::Register {
            email,
            name,
            password,
        } => commands::auth::register(&connect()?, &email, &name, password.as_deref()).await,
        Commands::Logout => commands::auth::logout(&connect()?).await,
        Commands::Whoami => {
            commands::auth::whoami(&connect()?);
            Ok(())
        }

        Commands::Password { command } => {
            let client = connect()?;
            match command {
                PasswordCommands::Forgot { email } => {
                    commands::password::forgot(&client, &email).await
                }
                PasswordCommands::Reset { token, password } => {
                    commands::password::reset(&client, &token, password.as_deref()).await
                }
            }
        }

        Commands::Generate { prompt, html_out } => {
            commands::timetables::generate(&connect()?, &prompt, html_out.as_deref()).await
        }
        Commands::List => commands::timetables::list(&connect()?).await,
        Commands::Show { id } => commands::timetables::show(&connect()?, &id).await,
        Commands::Export { id, out } => {
            commands::timetables::export(&connect()?, &id, out.as_deref()).await
        }
    }
}

/// Password from `--password` or `TIMEGEN_PASSWORD`.
fn require_password(password: Option<&str>) -> Result<&str> {
    password
        .filter(|p| !p.is_empty())
        .context("Password required: pass --password or set TIMEGEN_PASSWORD")
}
