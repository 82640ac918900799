use std::{process, sync::Arc};

use deckmill::{
    application::{
        deck::DeckService,
        error::AppError,
        render::{DeckRenderer, MarpRenderer},
    },
    artifacts::{ArtifactStore, Publisher},
    config,
    infra::{error::InfraError, telemetry},
    mcp::McpServer,
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let store = Arc::new(ArtifactStore::new().map_err(InfraError::Io)?);
    let publisher = Arc::new(Publisher::new(store.clone(), &settings));
    let renderer: Arc<dyn DeckRenderer> = Arc::new(MarpRenderer::new(settings.marp.cli_path));
    let service = Arc::new(DeckService::new(renderer, publisher.clone()));
    let server = McpServer::new(service);

    info!(
        target = "deckmill::serve",
        "tool server running on stdio - tool: generate_pptx"
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    server
        .run(stdin, stdout)
        .await
        .map_err(|err| AppError::from(InfraError::Io(err)))?;

    publisher.shutdown();
    Ok(())
}

async fn run_render(
    settings: config::Settings,
    args: config::RenderArgs,
) -> Result<(), AppError> {
    let renderer = MarpRenderer::new(settings.marp.cli_path);

    let markdown = tokio::fs::read_to_string(&args.input)
        .await
        .map_err(|err| AppError::unexpected(format!("failed to read {}: {err}", args.input.display())))?;

    let deck = renderer.render_pptx(&markdown).await.map_err(AppError::from)?;

    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension("pptx"));
    tokio::fs::copy(&deck.output, &output)
        .await
        .map_err(|err| AppError::unexpected(format!("failed to write {}: {err}", output.display())))?;

    info!(
        target = "deckmill::render",
        output = %output.display(),
        "deck written"
    );
    Ok(())
}
