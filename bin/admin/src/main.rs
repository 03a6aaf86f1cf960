use clap::{Args, Parser, Subcommand};
use obsidian_log_admin::{AdminConfig, App, CliError, ConfigChanges, print_json};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "obsidian-log-admin", version, about = "Administer an obsidian-log site")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the GitHub sign-in URL.
    Login {
        /// Where the provider redirects after sign-in.
        #[arg(long, env = "OBSIDIAN_LOG_REDIRECT_TO")]
        redirect_to: Option<String>,
    },
    /// Complete a sign-in from the URL the browser landed on.
    Callback { url: String },
    /// Print the resolved auth state.
    Status,
    /// Print auth state changes; read `visible`/`hidden` lines from stdin.
    Watch,
    /// Sign out and clear local state.
    SignOut,
    /// Update and publish the site configuration.
    PublishConfig(PublishArgs),
    /// Upload the author icon.
    UploadIcon { path: PathBuf },
}

#[derive(Debug, Args)]
struct PublishArgs {
    #[arg(long)]
    repo_url: Option<String>,
    #[arg(long)]
    zenn_username: Option<String>,
    /// Replaces the admin list; repeat for several.
    #[arg(long = "admin")]
    admins: Vec<String>,
    #[arg(long)]
    site_title: Option<String>,
    #[arg(long)]
    site_subtitle: Option<String>,
    #[arg(long)]
    author_icon: Option<String>,
}

impl From<PublishArgs> for ConfigChanges {
    fn from(args: PublishArgs) -> Self {
        Self {
            repo_url: args.repo_url,
            zenn_username: args.zenn_username,
            admins: args.admins,
            site_title: args.site_title,
            site_subtitle: args.site_subtitle,
            author_icon: args.author_icon,
        }
    }
}

async fn run(cli: Cli) -> obsidian_log_core::Result<(), CliError> {
    let config = AdminConfig::from_env().map_err(|e| CliError::Config {
        reason: e.to_string(),
    })?;
    tracing::debug!(mode = ?config.mode, state_dir = %config.state_dir.display(), "loaded configuration");
    let app = App::new(config)?;

    match cli.command {
        Command::Login { redirect_to } => {
            let url = app.login(redirect_to.as_deref()).await?;
            println!("{url}");
        }
        Command::Callback { url } => print_json(&app.callback(&url).await?)?,
        Command::Status => print_json(&app.status().await?)?,
        Command::Watch => app.watch().await?,
        Command::SignOut => {
            app.sign_out().await?;
            tracing::info!("signed out");
        }
        Command::PublishConfig(args) => {
            let published = app.publish_config(args.into()).await?;
            print_json(&published)?;
        }
        Command::UploadIcon { path } => {
            let url = app.upload_icon(&path).await?;
            println!("{url}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
