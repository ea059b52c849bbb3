use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::builder::{self, escape_html, FormError, FormOptions};
use crate::config::{ChannelConfig, Config, Correlation, RenderConfig};
use crate::console::ConsoleLog;
use crate::directory::{self, HandshakeDirectory};
use crate::plugin_api::{
    commands, decode_embedded, events, BuilderRequest, BuilderResponse, FormSchema,
    PluginDescriptor, PluginSelection, PluginTestResult,
};
use crate::transport::{Envelope, RenderTarget, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connected,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel is not connected")]
    NotConnected,
    #[error("malformed {event} payload: {reason}")]
    MalformedPayload { event: String, reason: String },
    #[error("unknown event {0:?}")]
    UnknownEvent(String),
    #[error(transparent)]
    Form(#[from] FormError),
    #[error("transport failed: {0:#}")]
    Transport(anyhow::Error),
    #[error("render failed: {0:#}")]
    Render(anyhow::Error),
}

impl ChannelError {
    fn malformed(event: &str, reason: impl ToString) -> Self {
        ChannelError::MalformedPayload {
            event: event.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// What happened to an inbound builder response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderOutcome {
    Rendered { instance: String },
    /// Superseded by a newer request; nothing was rendered
    Stale { request_id: u64 },
}

#[derive(Debug, Clone)]
struct PendingBuilder {
    request_id: u64,
    name: String,
    version: String,
}

/// Client side of the plugin protocol.
///
/// Owns the transport, the render target and the handshake directory, so
/// several channels (or test doubles) can live side by side. All handlers
/// run to completion on the caller's thread.
pub struct ProtocolChannel<T: Transport, R: RenderTarget> {
    state: ChannelState,
    transport: T,
    render: R,
    directory: HandshakeDirectory,
    console: Arc<RwLock<ConsoleLog>>,
    channel_config: ChannelConfig,
    render_config: RenderConfig,
    form_options: FormOptions,
    next_request_id: u64,
    pending_builder: Option<PendingBuilder>,
    outstanding_handshakes: usize,
    current_form: Option<String>,
}

impl<T: Transport, R: RenderTarget> ProtocolChannel<T, R> {
    pub fn new(config: &Config, transport: T, render: R, console: Arc<RwLock<ConsoleLog>>) -> Self {
        Self {
            state: ChannelState::Disconnected,
            transport,
            render,
            directory: HandshakeDirectory::new(&config.render.fallback_colour),
            console,
            channel_config: config.channel.clone(),
            render_config: config.render.clone(),
            form_options: config.forms.form_options(),
            next_request_id: 1,
            pending_builder: None,
            outstanding_handshakes: 0,
            current_form: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected
    }

    pub fn directory(&self) -> &HandshakeDirectory {
        &self.directory
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn render_target(&self) -> &R {
        &self.render
    }

    /// Plugin name of the form currently shown in the builder target
    pub fn current_form(&self) -> Option<&str> {
        self.current_form.as_deref()
    }

    pub fn outstanding_handshakes(&self) -> usize {
        self.outstanding_handshakes
    }

    /// `(name, version)` of the builder request waiting for a response
    pub fn pending_builder(&self) -> Option<(&str, &str)> {
        self.pending_builder
            .as_ref()
            .map(|p| (p.name.as_str(), p.version.as_str()))
    }

    pub fn on_connect(&mut self) -> Result<(), ChannelError> {
        self.state = ChannelState::Connected;
        self.console.write().log_info("Connected to plugin server");

        if self.channel_config.eager_handshake {
            self.request_handshakes()?;
        }
        Ok(())
    }

    /// Cached handshakes and the rendered form survive a disconnect.
    pub fn on_disconnect(&mut self) {
        self.state = ChannelState::Disconnected;
        self.console.write().log_warning("Disconnected from plugin server");
    }

    pub fn request_handshakes(&mut self) -> Result<(), ChannelError> {
        self.emit(events::GET_HANDSHAKES, None)?;
        self.outstanding_handshakes += 1;
        Ok(())
    }

    /// Ask the server for a plugin's settings schema. Returns the request id
    /// that was attached, if correlation by id is enabled.
    pub fn request_builder(&mut self, name: &str, version: &str) -> Result<Option<u64>, ChannelError> {
        let request_id = self.next_request_id;

        let request = BuilderRequest {
            name: name.to_string(),
            version: version.to_string(),
            request_id: match self.channel_config.correlation {
                Correlation::RequestId => Some(request_id),
                Correlation::LastWriteWins => None,
            },
        };
        // The server expects the payload itself as a JSON string
        let payload = serde_json::to_string(&request)
            .map_err(|e| ChannelError::malformed(events::PLUGINS_BUILDER, e))?;

        self.emit(events::PLUGINS_BUILDER, Some(Value::String(payload)))?;

        self.next_request_id += 1;
        self.pending_builder = Some(PendingBuilder {
            request_id,
            name: request.name,
            version: request.version,
        });
        Ok(request.request_id)
    }

    pub fn notify_applet_rename(&mut self, new_name: &str) -> Result<(), ChannelError> {
        self.emit(events::APPLET_UPDATE_NAME, Some(Value::String(new_name.to_string())))
    }

    fn emit(&mut self, event: &str, data: Option<Value>) -> Result<(), ChannelError> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }

        let shown = data.as_ref().map(Value::to_string).unwrap_or_default();
        self.transport
            .emit(event, data)
            .map_err(ChannelError::Transport)?;
        self.console.write().log_event_sent(event, &shown);
        Ok(())
    }

    /// Handle an inbound event or local command, reporting any failure to
    /// the console instead of the caller. Prior render state is left
    /// untouched on error.
    pub fn dispatch(&mut self, envelope: Envelope) {
        let Envelope { event, data } = envelope;
        let result = if commands::is_command(&event) {
            self.handle_command(&event, data)
        } else {
            self.handle_event(&event, data)
        };

        if let Err(e) = result {
            self.console
                .write()
                .log_error(&format!("Failed to handle {}: {}", event, e));
        }
    }

    /// Route a user-side command to the matching outbound request.
    pub fn handle_command(&mut self, command: &str, data: Option<Value>) -> Result<(), ChannelError> {
        match command {
            commands::SELECT_PLUGIN => {
                let data = data.ok_or_else(|| ChannelError::malformed(command, "missing payload"))?;
                let value = decode_embedded(data).map_err(|e| ChannelError::malformed(command, e))?;
                let selection: PluginSelection =
                    serde_json::from_value(value).map_err(|e| ChannelError::malformed(command, e))?;

                self.console.write().log_info(&format!(
                    "Selected plugin '{}' v{}",
                    selection.name, selection.version
                ));
                self.request_builder(&selection.name, &selection.version)
                    .map(|_| ())
            }
            commands::REFRESH_HANDSHAKES => self.request_handshakes(),
            commands::RENAME_APPLET => match data {
                Some(Value::String(name)) => self.notify_applet_rename(&name),
                _ => Err(ChannelError::malformed(command, "expected the new name as a string")),
            },
            other => Err(ChannelError::UnknownEvent(other.to_string())),
        }
    }

    pub fn handle_event(&mut self, event: &str, data: Option<Value>) -> Result<(), ChannelError> {
        let shown = data.as_ref().map(Value::to_string).unwrap_or_default();
        self.console.write().log_event_received(event, &shown);

        match event {
            events::CONNECT => self.on_connect(),
            events::DISCONNECT => {
                self.on_disconnect();
                Ok(())
            }
            events::GET_HANDSHAKES => self.on_handshakes(data),
            events::PLUGINS_BUILDER => self.on_builder(data).map(|_| ()),
            events::PLUGIN_TEST => self.on_plugin_test(data),
            other => Err(ChannelError::UnknownEvent(other.to_string())),
        }
    }

    pub fn on_handshakes(&mut self, data: Option<Value>) -> Result<(), ChannelError> {
        let event = events::GET_HANDSHAKES;
        let data = data.ok_or_else(|| ChannelError::malformed(event, "missing payload"))?;
        let value = decode_embedded(data).map_err(|e| ChannelError::malformed(event, e))?;
        let descriptors: Vec<PluginDescriptor> =
            serde_json::from_value(value).map_err(|e| ChannelError::malformed(event, e))?;

        // The snapshot is only kept once its tiles are on screen
        let mut next = self.directory.clone();
        next.replace(descriptors);
        let previous = std::mem::replace(&mut self.directory, next);
        if let Err(e) = self.render_tiles() {
            self.directory = previous;
            return Err(e);
        }

        self.outstanding_handshakes = self.outstanding_handshakes.saturating_sub(1);
        Ok(())
    }

    /// Re-render the tile grid from the current snapshot.
    pub fn render_tiles(&mut self) -> Result<(), ChannelError> {
        let (tiles, colour_errors) = self.directory.tiles();
        {
            let mut console = self.console.write();
            for e in &colour_errors {
                console.log_warning(&format!("Tile colour fell back to default: {}", e));
            }
        }

        self.render
            .replace(&self.render_config.tiles_target, &directory::render_tiles(&tiles))
            .map_err(ChannelError::Render)?;

        self.console
            .write()
            .log_info(&format!("Rendered {} plugin tile(s)", tiles.len()));
        Ok(())
    }

    pub fn on_builder(&mut self, data: Option<Value>) -> Result<BuilderOutcome, ChannelError> {
        let event = events::PLUGINS_BUILDER;
        let data = data.ok_or_else(|| ChannelError::malformed(event, "missing payload"))?;
        let value = decode_embedded(data).map_err(|e| ChannelError::malformed(event, e))?;
        let response: BuilderResponse =
            serde_json::from_value(value).map_err(|e| ChannelError::malformed(event, e))?;

        if self.channel_config.correlation == Correlation::RequestId {
            let latest = self.pending_builder.as_ref().map(|p| p.request_id);
            match (response.request_id, latest) {
                (Some(id), Some(latest)) if id != latest => {
                    self.console.write().log_warning(&format!(
                        "Dropping stale builder response #{} for '{}' (waiting for #{})",
                        id, response.name, latest
                    ));
                    return Ok(BuilderOutcome::Stale { request_id: id });
                }
                (Some(id), None) => {
                    self.console.write().log_warning(&format!(
                        "Dropping unsolicited builder response #{} for '{}'",
                        id, response.name
                    ));
                    return Ok(BuilderOutcome::Stale { request_id: id });
                }
                (None, _) => {
                    self.console.write().log_warning(&format!(
                        "Builder response for '{}' has no request id, rendering it anyway",
                        response.name
                    ));
                }
                _ => {}
            }
        }

        let settings =
            decode_embedded(response.settings_dict).map_err(|e| ChannelError::malformed(event, e))?;
        let schema = FormSchema::from_value(settings).map_err(|e| ChannelError::malformed(event, e))?;

        self.render_form(&response.name, &schema)?;
        self.pending_builder = None;
        Ok(BuilderOutcome::Rendered {
            instance: response.name,
        })
    }

    /// Compile a schema under `instance` and place it in the builder target.
    pub fn render_form(&mut self, instance: &str, schema: &FormSchema) -> Result<(), ChannelError> {
        let form = builder::compile_form(instance, schema, &self.form_options)?;

        {
            let mut console = self.console.write();
            for skipped in &form.skipped {
                console.log_warning(&format!("Skipped field in '{}': {}", instance, skipped));
            }
        }

        self.render
            .replace(&self.render_config.builder_target, &form.markup)
            .map_err(ChannelError::Render)?;
        self.current_form = Some(instance.to_string());

        self.console
            .write()
            .log_info(&format!("Rendered settings form for '{}'", instance));
        Ok(())
    }

    /// Render a plugin's handshake-declared persistent settings without a
    /// server round trip.
    pub fn render_persistent_settings(&mut self, name: &str, version: &str) -> Result<bool, ChannelError> {
        let schema = match self.directory.persistent_settings(name, version) {
            Some(schema) => schema.map_err(|e| ChannelError::malformed(events::GET_HANDSHAKES, e))?,
            None => return Ok(false),
        };
        self.render_form(name, &schema)?;
        Ok(true)
    }

    pub fn on_plugin_test(&mut self, data: Option<Value>) -> Result<(), ChannelError> {
        let event = events::PLUGIN_TEST;
        let data = data.ok_or_else(|| ChannelError::malformed(event, "missing payload"))?;
        let value = decode_embedded(data).map_err(|e| ChannelError::malformed(event, e))?;
        let result: PluginTestResult =
            serde_json::from_value(value).map_err(|e| ChannelError::malformed(event, e))?;

        let (class, heading) = if result.response {
            ("is-success", "Test passed")
        } else {
            ("is-danger", "Test failed")
        };
        let markup = format!(
            r#"<div class="notification {}"><p>{}</p><pre>{}</pre></div>"#,
            class,
            heading,
            escape_html(&result.logs)
        );

        self.render
            .replace(&self.render_config.test_target, &markup)
            .map_err(ChannelError::Render)
    }
}
