pub mod builder;
pub mod channel;
pub mod colour;
pub mod config;
pub mod console;
pub mod directory;
pub mod plugin_api;
pub mod transport;

use anyhow::Result;
use std::sync::Arc;
use parking_lot::RwLock;

pub use channel::{ChannelError, ChannelState, ProtocolChannel};
pub use config::Config;
pub use console::ConsoleLog;
pub use directory::HandshakeDirectory;
pub use transport::{RenderTarget, Transport};

/// Main application state
pub struct AppState {
    pub config: Arc<RwLock<Config>>,
    pub console: Arc<RwLock<ConsoleLog>>,
}

impl AppState {
    pub fn new() -> Result<Self> {
        Ok(Self::with_config(Config::load_or_default()?))
    }

    pub fn with_config(config: Config) -> Self {
        let mut console = ConsoleLog::with_capacity(config.ui.console_max_entries);
        console.set_enabled(config.ui.console_enabled);

        Self {
            config: Arc::new(RwLock::new(config)),
            console: Arc::new(RwLock::new(console)),
        }
    }

    /// Build a protocol channel bound to this state's config and console.
    pub fn channel<T: Transport, R: RenderTarget>(&self, transport: T, render: R) -> ProtocolChannel<T, R> {
        ProtocolChannel::new(&self.config.read(), transport, render, self.console.clone())
    }
}
