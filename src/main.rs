use std::sync::Arc;

use clap::Parser;
use sea_orm_migration::MigratorTrait;
use themebooth::config::setup_logging;
use themebooth::generation::{EchoClient, GeminiClient, GenerationClient};
use tracing::{error, info, warn};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = themebooth::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return;
    }

    let client: Arc<dyn GenerationClient> = if cli.offline {
        warn!("Offline mode, generated images echo the upload");
        Arc::new(EchoClient)
    } else {
        let Some(api_key) = cli.gemini_api_key.as_deref().filter(|key| !key.is_empty()) else {
            error!("GEMINI_API_KEY is not set, pass --offline to run without it");
            return;
        };
        match GeminiClient::new(
            &cli.gemini_api_base,
            &cli.gemini_model,
            api_key,
            cli.generation_timeout(),
        ) {
            Ok(client) => {
                info!("Generating with {}", client.endpoint());
                Arc::new(client)
            }
            Err(err) => {
                error!("Failed to set up the Gemini client: {}", err);
                return;
            }
        }
    };

    let catalog = match themebooth::catalog::init() {
        Ok(catalog) => catalog,
        Err(err) => {
            error!("Failed to load the theme catalog: {}", err);
            return;
        }
    };
    info!(
        "Loaded {} themes in {} categories",
        catalog.len(),
        catalog.categories().len()
    );

    let db = match themebooth::db::connect_db(&cli.database_path).await {
        Ok(db) => db,
        Err(err) => {
            error!("Database connection error: {}", err);
            return;
        }
    };

    if let Err(err) = themebooth::db::migrations::Migrator::up(&db, None).await {
        error!("Database migration error: {}", err);
        return;
    }

    if let Err(err) = themebooth::web::setup_server(
        &cli.listen_address,
        cli.port,
        db,
        catalog,
        client,
        cli.max_upload_bytes(),
    )
    .await
    {
        error!("Application error: {}", err);
    }
}
