//! Curator CLI: bulk child ingest and event dispatch against a Postgres
//! repository and a STOMP broker.
//!
//! Reads DATABASE_URL, BASE_URL and BROKER_* from the environment (or .env).

use anyhow::Context;
use clap::{Parser, Subcommand};
use curator_cli::{print_json, upload_descriptors, ConsoleMessenger};
use curator_core::models::{
    ActionConfig, ChildBatchParameters, EmitEventConfig, EntityId, EventKind, EventSubject,
    GenerateDerivativeConfig,
};
use curator_core::CuratorConfig;
use curator_db::{ContentLookup, PgRepository};
use curator_events::{
    builder_for, EmitEventAction, EntityContextHeaders, HeaderSubscriberRegistry,
    JwtAuthorizationHeader, QueueDispatcher, SystemClock, UrlGenerator,
};
use curator_infra::telemetry::{init_telemetry, shutdown_telemetry};
use curator_infra::StompConnector;
use curator_ingest::{check_add_children, AllowAll, BatchCoordinator, BatchItemProcessor};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "curator", about = "Repository ingest and derivative events")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Create one child node and media per uploaded file
    AddChildren {
        /// Parent node ID
        #[arg(long)]
        parent: EntityId,
        /// Node type of the children
        #[arg(long)]
        child_type: String,
        /// Media type wrapping each file
        #[arg(long)]
        media_type: String,
        /// Model term ID for the children
        #[arg(long)]
        model: Option<EntityId>,
        /// Media use term ID (repeatable)
        #[arg(long = "use")]
        media_use: Vec<EntityId>,
        /// Acting user ID
        #[arg(long)]
        user: EntityId,
        /// Uploaded file IDs, one child each
        #[arg(required = true)]
        files: Vec<EntityId>,
    },
    /// Publish an event about a node
    Emit {
        /// Node ID
        #[arg(long)]
        node: EntityId,
        /// Acting user ID
        #[arg(long)]
        user: EntityId,
        /// Destination queue
        #[arg(long)]
        queue: String,
        /// Create, Update, Delete or "Generate Derivative"
        #[arg(long, default_value = "Create")]
        event: EventKind,
    },
    /// Publish a derivative request for a node
    Derive {
        /// Node ID
        #[arg(long)]
        node: EntityId,
        /// Acting user ID
        #[arg(long)]
        user: EntityId,
        /// JSON file with the derivative action configuration; omitted keys
        /// take the derivative defaults
        #[arg(long)]
        config: PathBuf,
    },
    /// Split a derivative destination URL into its parts
    ParseDestination {
        uri: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = CuratorConfig::from_env().context("Failed to load configuration")?;
    config.validate()?;
    init_telemetry(config.log_format())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let outcome = run(cli.command, &config).await;
    shutdown_telemetry().await;
    outcome
}

async fn run(command: Commands, config: &CuratorConfig) -> anyhow::Result<()> {
    match command {
        Commands::Migrate => {
            let repository = PgRepository::connect(config).await?;
            repository.migrate().await?;
            println!("Migrations applied");
        }
        Commands::AddChildren {
            parent,
            child_type,
            media_type,
            model,
            media_use,
            user,
            files,
        } => {
            let repository = Arc::new(PgRepository::connect(config).await?);
            let acting_user = repository
                .load_user(user)
                .await?
                .with_context(|| format!("User {} does not exist", user))?;

            let parameters = ChildBatchParameters {
                parent_id: parent,
                child_type,
                model_tag: model,
                media_type,
                media_use_tags: media_use,
            };
            check_add_children(&AllowAll, &acting_user, &parameters)?;

            let uploads =
                upload_descriptors(repository.as_ref(), &parameters.media_type, &files).await?;
            let coordinator = BatchCoordinator::new(
                BatchItemProcessor::new(repository, acting_user.id),
                Arc::new(ConsoleMessenger),
                config.base_url(),
            );
            let report = coordinator.run(parameters, uploads).await;
            print_json(&report.into_result()?)?;
        }
        Commands::Emit {
            node,
            user,
            queue,
            event,
        } => {
            let action_config = ActionConfig::Emit(EmitEventConfig { queue, event });
            emit(config, action_config, node, user).await?;
        }
        Commands::Derive { node, user, config: path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let derivative =
                GenerateDerivativeConfig::from_json_with_defaults(&raw, config.default_file_scheme())
                    .with_context(|| {
                        format!("Invalid derivative configuration in {}", path.display())
                    })?;
            emit(config, ActionConfig::GenerateDerivative(derivative), node, user).await?;
        }
        Commands::ParseDestination { uri } => {
            let urls = UrlGenerator::new(config.base_url())?;
            let parts = urls.parse_destination_uri(&uri)?;
            print_json(&serde_json::json!({
                "node_id": parts.node_id,
                "media_type": parts.media_type,
                "term_id": parts.term_id,
            }))?;
        }
    }

    Ok(())
}

async fn emit(
    config: &CuratorConfig,
    action_config: ActionConfig,
    node_id: EntityId,
    user_id: EntityId,
) -> anyhow::Result<()> {
    let repository = Arc::new(PgRepository::connect(config).await?);
    let node = repository
        .load_node(node_id)
        .await?
        .with_context(|| format!("Node {} does not exist", node_id))?;
    let user = repository
        .load_user(user_id)
        .await?
        .with_context(|| format!("User {} does not exist", user_id))?;

    let clock = Arc::new(SystemClock);
    let headers = HeaderSubscriberRegistry::new();
    headers.register(Arc::new(EntityContextHeaders)).await;
    if let Some(secret) = config.jwt_secret() {
        headers
            .register(Arc::new(JwtAuthorizationHeader::new(
                secret,
                config.jwt_expiry_hours(),
                config.base_url(),
                clock.clone(),
            )))
            .await;
    }

    let builder = builder_for(
        &action_config,
        repository,
        UrlGenerator::new(config.base_url())?,
        clock,
    );
    let dispatcher = QueueDispatcher::new(Arc::new(StompConnector::new(config.broker().clone())));
    let action = EmitEventAction::new(action_config, builder, headers, dispatcher);

    let message = action
        .execute(&EventSubject::Node(node), &user, &ConsoleMessenger)
        .await?;
    print_json(&serde_json::json!({
        "queue": action.config().queue(),
        "headers": message.headers,
        "body": message.body_str(),
    }))?;
    Ok(())
}
