mod app;
mod cli;
mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use historian_core::config::{load_dotenv, DatabaseConfig};
use historian_core::observability::{self, TracingMode};
use historian_data::historian::check_connection;
use historian_data::sql::validate_read_only;
use historian_data::HistorianRepository;

fn main() -> Result<()> {
    load_dotenv();
    let cli = Cli::parse();
    let mode = match cli.command {
        Commands::Chat { .. } | Commands::Ask { .. } => TracingMode::Chat,
        _ => TracingMode::Default,
    };
    observability::init_tracing(mode);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Chat {
            session,
            user,
            verbose,
        } => {
            let app = app::App::from_env().await?;
            let user = user.unwrap_or_else(|| app.server.default_user_id.clone());
            let session = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            check_ids(&app, &user, &session)?;
            historian_agent::chat::run_interactive_chat(&app.runner, &user, &session, &app.model, verbose)
                .await?;
        }
        Commands::Ask {
            question,
            session,
            user,
            verbose,
        } => {
            let app = app::App::from_env().await?;
            let user = user.unwrap_or_else(|| app.server.default_user_id.clone());
            let session = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            check_ids(&app, &user, &session)?;
            let answer = historian_agent::chat::ask(&app.runner, &user, &session, &question, verbose).await?;
            println!("{}", answer);
        }
        Commands::Serve { host, port } => {
            let app = app::App::from_env().await?;
            let host = host.unwrap_or_else(|| app.server.host.clone());
            let port = port.unwrap_or(app.server.port);
            let state = server::AppState {
                runner: Arc::clone(&app.runner),
                user_id: app.server.default_user_id.clone(),
            };
            server::serve(server::router(state, app.artifacts), &host, port).await?;
        }
        Commands::CheckDb => {
            let db = DatabaseConfig::from_env();
            let repo = app::historian(&db)?;
            check_connection(repo.as_ref())
                .await
                .with_context(|| format!("Cannot reach {}", db.redacted_url()))?;
            println!("✅ Connected to {}", db.redacted_url());
        }
        Commands::Sql { query, limit } => {
            let sql = validate_read_only(&query)?;
            let repo = app::historian(&DatabaseConfig::from_env())?;
            let result = repo.execute_query(&sql, &[]).await?;
            println!("{}", result.preview(limit));
            println!(
                "({} row(s), {:.1} ms)",
                result.row_count, result.execution_time_ms
            );
        }
    }
    Ok(())
}

/// Session and user ids double as artifact directory names.
fn check_ids(app: &app::App, user: &str, session: &str) -> Result<()> {
    app.runner
        .session_key(user, session)
        .scope()
        .validate()
        .context("Invalid --user or --session")
}

