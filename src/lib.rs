pub mod app;
mod config;
pub mod dispatch;
pub mod error;
pub mod geometry;
pub mod host;
pub mod logging;
pub mod notification;
pub mod request;
pub mod settings;
pub mod state;
pub mod storage;
pub mod timer;
pub mod update;

use std::sync::Arc;

pub use app::{App, AppContext, Session, StartupReport};
pub use config::{load_app_config, AppConfig};
pub use error::{AppError, AppResult};

use host::stdio::StdioHost;
use host::EventBus;
use storage::{JsonFileStore, KeyValueStore, MemoryStore};

/// Serve one host over stdin/stdout until it closes the stream. User
/// actions arrive on the same stream and popup state is mirrored back.
pub async fn run() -> AppResult<()> {
    let config = load_app_config();
    let events = Arc::new(EventBus::new());
    let host = StdioHost::stdio(events.clone());

    let store: Arc<dyn KeyValueStore> = match config.state_path() {
        Some(path) => {
            tracing::debug!(path = %path.display(), "persisting client state");
            Arc::new(JsonFileStore::new(path))
        }
        None => {
            tracing::warn!("no config directory; client state lives in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let app = Arc::new(App::new(AppContext::new(host.clone(), events, store, config)));
    let session = app.start().await?;

    app::actions::serve(app.clone(), host.clone()).await;
    tracing::info!(
        cold_start = session.report().cold_start,
        "host closed the connection; shutting down"
    );
    drop(session);
    Ok(())
}
