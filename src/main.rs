use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use uuid::Uuid;

use worldsync::cache::{CacheEvent, RemoteCache};
use worldsync::config::{ConfigError, SyncConfig};
use worldsync::draft::{DraftError, DraftKey, Drafts};
use worldsync::features::{Reactions, Stickers};
use worldsync::mutation::{Executor, MutationError, TracingNotifier};
use worldsync::net::{ApiError, HttpTransport, Transport};
use worldsync::poll::{CacheTarget, Refresh, spawn_poller, visibility};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error(transparent)]
    Draft(#[from] DraftError),
}

#[derive(Parser, Debug)]
#[command(name = "worldsync", about = "Watch and react to world posts")]
struct Cli {
    /// Friend id to act as; required with WORLDSYNC_FRIEND_TOKEN.
    #[arg(long, env = "WORLDSYNC_FRIEND_ID")]
    friend_id: Option<Uuid>,

    /// Signed-in user id to act as; required without a friend token.
    #[arg(long, env = "WORLDSYNC_USER_ID")]
    user_id: Option<Uuid>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll a post's reactions and stickers and log changes until ctrl-c.
    Watch { post_id: Uuid },
    /// Toggle a reaction on a post.
    React {
        post_id: Uuid,
        #[arg(long, default_value = "❤️")]
        emoji: String,
    },
    /// Show which post type has a saved draft for a world. Needs WORLDSYNC_DRAFT_PATH.
    Draft { world_id: Uuid },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env()?;
    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(&config.base_url, config.request_timeout, config.connect_timeout)?);
    let notifier = Arc::new(TracingNotifier);

    match cli.command {
        Command::Watch { post_id } => {
            let actor = config.actor(cli.friend_id, cli.user_id)?;
            let reactions = Reactions::new(Executor::new(RemoteCache::new(transport.clone()), notifier.clone()), actor.clone());
            let stickers = Stickers::new(Executor::new(RemoteCache::new(transport), notifier), actor);
            watch(&config, post_id, &reactions, &stickers).await;
        }
        Command::React { post_id, emoji } => {
            let actor = config.actor(cli.friend_id, cli.user_id)?;
            let reactions = Reactions::new(Executor::new(RemoteCache::new(transport), notifier), actor);
            reactions.load(post_id).await?;
            reactions.toggle(post_id, &emoji).run().await?;
            for tally in reactions.summary(post_id) {
                info!(emoji = %tally.emoji, count = tally.count, reacted = tally.reacted, "reaction");
            }
        }
        Command::Draft { world_id } => {
            let drafts = Drafts::new(Arc::new(config.draft_store()?));
            let post_type = drafts.saved_draft_type(DraftKey::WorldPost { world_id })?;
            info!(%world_id, ?post_type, throttle = ?config.draft_throttle, "saved draft");
        }
    }
    Ok(())
}

async fn watch(config: &SyncConfig, post_id: Uuid, reactions: &Reactions, stickers: &Stickers) {
    let reaction_key = reactions.key(post_id);
    let sticker_key = stickers.key(post_id);
    let mut reaction_events = reactions.executor().cache().subscribe();
    let mut sticker_events = stickers.executor().cache().subscribe();

    let targets: Vec<Arc<dyn Refresh>> = vec![
        CacheTarget::new(reactions.executor().cache().clone(), reaction_key) as Arc<dyn Refresh>,
        CacheTarget::new(stickers.executor().cache().clone(), sticker_key) as Arc<dyn Refresh>,
    ];
    let (visible_tx, visible_rx) = visibility();
    let poller = spawn_poller(targets, config.refresh_interval, visible_rx);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = reaction_events.recv() => match event {
                Ok(event) => log_reactions(&event, reactions, post_id),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "reaction events lagged"),
                Err(RecvError::Closed) => break,
            },
            event = sticker_events.recv() => match event {
                Ok(event) => log_stickers(&event, stickers, post_id),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "sticker events lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = &mut shutdown => break,
        }
    }

    drop(visible_tx);
    if let Err(e) = poller.await {
        warn!(error = %e, "poller task failed");
    }
}

fn log_reactions(event: &CacheEvent, reactions: &Reactions, post_id: Uuid) {
    let summary: Vec<String> = reactions
        .summary(post_id)
        .into_iter()
        .map(|t| format!("{} {}", t.emoji, t.count))
        .collect();
    info!(key = %event.key, cause = ?event.cause, reactions = %summary.join(" "), "reactions changed");
}

fn log_stickers(event: &CacheEvent, stickers: &Stickers, post_id: Uuid) {
    let (own, others) = stickers.partition(post_id);
    info!(key = %event.key, cause = ?event.cause, own = own.len(), others = others.len(), "stickers changed");
}
