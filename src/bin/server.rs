//! sinch-mcp server binary.
//!
//! Serves MCP over stdio and, when configured, runs the webhook subsystem
//! that records message delivery events.
//!
//! # Environment Variables
//!
//! - `CONVERSATION_PROJECT_ID`, `CONVERSATION_KEY_ID`, `CONVERSATION_KEY_SECRET` — Conversation API
//! - `CONVERSATION_APP_ID` — app the webhook is attached to
//! - `CONVERSATION_REGION` — `us` (default), `eu` or `br`
//! - `VERIFICATION_APPLICATION_KEY`, `VERIFICATION_APPLICATION_SECRET` — Verification API
//! - `VOICE_APPLICATION_KEY`, `VOICE_APPLICATION_SECRET` — Voice API
//! - `MAILGUN_API_KEY` — Email API
//! - `NGROK_AUTH_TOKEN`, `NGROK_PATH` — tunnel credential and agent binary
//! - `SINCH_MCP_STORAGE_DIR` — event store directory
//! - `RUST_LOG` — Tracing filter (default: "info,sinch_mcp=debug"), logs go to stderr
//!
//! # Usage
//!
//! ```bash
//! sinch-mcp --tags conversation,notification
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use sinch_mcp::capabilities::{CapabilityKey, CapabilityRegistry};
use sinch_mcp::config::{self, args::USAGE, CliCommand, ProcessEnvironment, WebhookSettings};
use sinch_mcp::lifecycle::{LifecycleCoordinator, StartupCancel};
use sinch_mcp::mcp::{McpServer, ToolDispatcher};
use sinch_mcp::storage::EventStore;
use sinch_mcp::subscription::ConversationWebhooks;
use sinch_mcp::tools::MessageEventsTool;
use sinch_mcp::tunnel::NgrokTunnel;
use sinch_mcp::utilities::paths::event_store_path;

#[tokio::main]
async fn main() {
    // Initialize tracing; stdout belongs to the protocol
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sinch_mcp=debug".into()),
        )
        .init();

    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("sinch-mcp failed: {:#}", e);
            1
        }
    };
    // The stdin reader thread would otherwise keep the runtime alive.
    std::process::exit(code);
}

async fn run() -> anyhow::Result<()> {
    let args = config::parse_args(std::env::args().skip(1));
    match args.command {
        CliCommand::Version => {
            println!("sinch-mcp {}", sinch_mcp::VERSION);
            return Ok(());
        }
        CliCommand::Help => {
            println!("{}", USAGE);
            return Ok(());
        }
        CliCommand::Serve => {}
    }

    let env = ProcessEnvironment;
    let store_path = event_store_path();
    // Without a store the webhook subsystem stays down; every other
    // capability is still served.
    let (store, events_tool) = match EventStore::open(&store_path) {
        Ok(store) => {
            let store = Arc::new(store);
            let tool = MessageEventsTool::new(Arc::clone(&store));
            (Some(store), tool)
        }
        Err(e) => {
            tracing::error!(
                "Failed to open event store at {}: {}; webhook subsystem disabled",
                store_path.display(),
                e
            );
            (None, MessageEventsTool::unavailable(&e))
        }
    };

    let mut registry = CapabilityRegistry::with_builtin();
    registry.bind_handler(CapabilityKey::GetMessageEvents, Arc::new(events_tool));
    let dispatcher = Arc::new(RwLock::new(ToolDispatcher::new()));
    {
        let mut dispatcher = dispatcher.write();
        let table = registry.register(&args.tags, &env, &mut dispatcher);
        tracing::info!("Enabled tools: {}", table.enabled_names().join(", "));
    }

    let webhooks = store.and_then(|store| start_webhooks(&env, store));

    let server = McpServer::new(dispatcher);
    tracing::info!("sinch-mcp {} serving MCP on stdio", sinch_mcp::VERSION);

    tokio::select! {
        result = server.serve_stdio() => {
            if let Err(e) = result {
                tracing::error!("MCP transport error: {:#}", e);
            }
        }
        signal = shutdown_signal() => {
            tracing::info!("Received {}", signal);
        }
    }

    if let Some(webhooks) = webhooks {
        webhooks.shutdown().await;
    }
    Ok(())
}

/// The webhook subsystem while it runs in the background.
struct Webhooks {
    coordinator: Arc<Mutex<LifecycleCoordinator>>,
    cancel: StartupCancel,
    startup: JoinHandle<()>,
}

fn start_webhooks(env: &ProcessEnvironment, store: Arc<EventStore>) -> Option<Webhooks> {
    let settings = WebhookSettings::from_env(env);
    let subscriptions = match ConversationWebhooks::from_settings(&settings) {
        Ok(subscriptions) => Arc::new(subscriptions),
        Err(e) => {
            tracing::error!("Webhook subsystem disabled, no Conversation API client: {}", e);
            if let Err(e) = store.close().and_then(|()| store.destroy()) {
                tracing::warn!("Failed to remove event store: {}", e);
            }
            return None;
        }
    };
    let tunnels = Arc::new(NgrokTunnel::from_settings(&settings));
    let coordinator = LifecycleCoordinator::new(settings, store, tunnels, subscriptions);
    let cancel = coordinator.cancel_handle();
    let coordinator = Arc::new(Mutex::new(coordinator));

    let startup = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            match coordinator.lock().await.start().await {
                Ok(state) => tracing::info!("Webhook subsystem {}", state),
                Err(e) => tracing::error!("Webhook subsystem failed to start: {}", e),
            }
        })
    };

    Some(Webhooks {
        coordinator,
        cancel,
        startup,
    })
}

impl Webhooks {
    async fn shutdown(self) {
        // The step in flight finishes within its timeout so anything it
        // acquired is recorded before teardown.
        self.cancel.cancel();
        if let Err(e) = self.startup.await {
            tracing::error!("Webhook startup task failed: {}", e);
        }

        let report = self.coordinator.lock().await.shutdown().await;
        if report.is_clean() {
            tracing::info!("Shutdown complete");
        } else {
            tracing::warn!("Shutdown complete with failed steps");
        }
    }
}

async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
