use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use courseware::app::{AppContext, Result};
use courseware::cli::{commands, describe_error, Cli, Commands, DownloadAction};
use courseware::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if cli.offline {
        config.offline = true;
    }

    let ctx = AppContext::new(config, None)?;

    if let Err(e) = run(&ctx, cli.command).await {
        eprintln!("{}", describe_error(&e));
        std::process::exit(1);
    }

    Ok(())
}

async fn run(ctx: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Login { username, password } => commands::login(ctx, &username, password).await,
        Commands::Logout => commands::logout(ctx).await,
        Commands::Whoami => commands::whoami(ctx),
        Commands::Courses => commands::list_courses(ctx).await,
        Commands::Structure { course, refresh } => {
            commands::show_structure(ctx, &course, refresh).await
        }
        Commands::Resume { course } => commands::resume(ctx, &course).await,
        Commands::Complete { course, blocks } => commands::complete(ctx, &course, &blocks).await,
        Commands::Download { action } => match action {
            DownloadAction::Add { course, blocks } => {
                commands::download_add(ctx, &course, &blocks).await
            }
            DownloadAction::List => commands::download_list(ctx),
            DownloadAction::Remove { id } => commands::download_remove(ctx, &id),
            DownloadAction::Run => commands::download_run(ctx).await,
        },
        Commands::Open { course, block } => commands::open_block(ctx, &course, &block).await,
    }
}
