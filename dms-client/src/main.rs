use clap::Parser;
use dms_client::cli::{AdminCommands, Cli, Commands};
use dms_client::config::get_configuration;
use dms_client::handlers::{admin, auth, documents};
use dms_client::observability::init_tracing;
use dms_client::startup::build_state;
use dotenvy::dotenv;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let cli = Cli::parse();

    let configuration = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing("dms-client", &configuration.telemetry);

    let state = build_state(&configuration)
        .map_err(|e| anyhow::anyhow!("Failed to build client: {}", e))?;
    state.restore().await;

    let result = match &cli.command {
        Commands::Login { email, password } => auth::login(&state, email, password).await,
        Commands::Signup {
            email,
            fullname,
            password,
        } => auth::signup(&state, email, fullname, password).await,
        Commands::Logout => auth::logout(&state).await,
        Commands::Whoami => auth::whoami(&state).await,
        Commands::Route { path } => auth::route(&state, path).await,
        Commands::Ls(args) => documents::list(&state, args).await,
        Commands::Upload {
            path,
            document_type,
        } => documents::upload(&state, path, document_type.clone()).await,
        Commands::Rm { id } => documents::remove(&state, *id).await,
        Commands::Get { target, out } => documents::download(&state, target, out).await,
        Commands::Preview { filename } => documents::preview(&state, filename).await,
        Commands::Stats => documents::stats(&state).await,
        Commands::Admin(AdminCommands::Search { query }) => admin::search(&state, query).await,
        Commands::Admin(AdminCommands::Recent { limit }) => admin::recent(&state, *limit).await,
        Commands::Admin(AdminCommands::ViewAs { email, all }) => {
            admin::view_as(&state, email, *all).await
        }
    };

    state.teardown();
    opentelemetry::global::shutdown_tracer_provider();
    result
}
