//! Relay server command handler

use crate::config::Config;
use crate::error::Result;
use crate::relay::{ContextSource, FileContextSource, NoContext, OllamaGenerator, RelayState};

use std::sync::Arc;

/// Run the relay until interrupted
///
/// # Arguments
///
/// * `config` - Global configuration
/// * `bind` - Optional bind-address override from the CLI
pub async fn run_serve(config: Config, bind: Option<String>) -> Result<()> {
    let mut server = config.server.clone();
    if let Some(bind) = bind {
        server.bind_addr = bind;
    }

    let generator = Arc::new(OllamaGenerator::new(config.upstream.clone())?);
    let context: Arc<dyn ContextSource> = match &server.document_path {
        Some(path) => {
            tracing::info!("Serving with document context from {}", path);
            Arc::new(FileContextSource::new(path))
        }
        None => {
            tracing::info!("Serving without document context");
            Arc::new(NoContext)
        }
    };

    crate::relay::serve(RelayState {
        generator,
        context,
        server,
        upstream: config.upstream,
    })
    .await
}
