use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::client::MqttClient;
use super::client::MqttMessage;
use super::discovery::render_value;
use super::discovery::Topics;
use super::MqttConfig;
use crate::engine::Bus;
use crate::engine::CommandHandler;
use crate::engine::EntityInfo;
use crate::engine::EntityKind;
use crate::engine::SensorValue;

/// Command topic -> handler
type HandlersMap = Arc<Mutex<HashMap<String, Arc<dyn CommandHandler>>>>;

enum Outbound {
    Publish {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    Subscribe(String),
}

/// [`Bus`] backed by an MQTT broker, announcing entities via Home Assistant discovery
///
/// All client traffic goes through one task; publishes are queued so entities never
/// wait on the network. Inbound commands are handed to a second task that runs
/// handlers one at a time.
pub struct MqttBus {
    topics: Topics,
    kinds: Mutex<HashMap<String, EntityKind>>,
    handlers: HandlersMap,
    outbound: mpsc::UnboundedSender<Outbound>,
    client_task: JoinHandle<()>,
    dispatch_task: JoinHandle<()>,
}

impl MqttBus {
    /// Connect `client` and start serving the bus
    pub async fn start<C: MqttClient + 'static>(
        mut client: C,
        config: &MqttConfig,
    ) -> Result<Self, Box<dyn std::error::Error + Send>> {
        client.connect().await?;
        info!(
            "MQTT bus using broker {}:{} as {}",
            config.broker, config.port, config.client_id
        );

        let handlers: HandlersMap = Arc::default();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let client_task = tokio::spawn(Self::client_loop(
            client,
            outbound_rx,
            handlers.clone(),
            commands_tx,
        ));
        let dispatch_task = tokio::spawn(Self::dispatch_loop(commands_rx));

        Ok(Self {
            topics: Topics {
                discovery_prefix: config.discovery_prefix.clone(),
                state_prefix: config.state_prefix.clone(),
            },
            kinds: Mutex::default(),
            handlers,
            outbound,
            client_task,
            dispatch_task,
        })
    }

    async fn client_loop<C: MqttClient>(
        mut client: C,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
        handlers: HandlersMap,
        commands: mpsc::UnboundedSender<(Arc<dyn CommandHandler>, String)>,
    ) {
        let mut incoming_open = true;

        loop {
            tokio::select! {
                request = outbound.recv() => {
                    let Some(request) = request else { break };
                    let result = match &request {
                        Outbound::Publish { topic, payload, retain } => {
                            client.publish(topic, payload, *retain).await
                        }
                        Outbound::Subscribe(topic) => client.subscribe(topic).await,
                    };
                    if let Err(e) = result {
                        warn!("MQTT request failed: {}", e);
                    }
                }
                message = client.poll_message(), if incoming_open => {
                    match message {
                        Some(message) => Self::route(message, &handlers, &commands),
                        None => {
                            warn!("MQTT connection closed, no further commands will arrive");
                            incoming_open = false;
                        }
                    }
                }
            }
        }
        debug!("MQTT client task exiting");
    }

    fn route(
        message: MqttMessage,
        handlers: &HandlersMap,
        commands: &mpsc::UnboundedSender<(Arc<dyn CommandHandler>, String)>,
    ) {
        let handler = handlers
            .lock()
            .ok()
            .and_then(|h| h.get(&message.topic).cloned());

        let Some(handler) = handler else {
            debug!("Ignoring message on {}", message.topic);
            return;
        };

        let payload = String::from_utf8_lossy(&message.payload).into_owned();
        debug!("Command on {}: {}", message.topic, payload);
        if commands.send((handler, payload)).is_err() {
            error!("Command dispatcher is gone, dropping command");
        }
    }

    async fn dispatch_loop(mut commands: mpsc::UnboundedReceiver<(Arc<dyn CommandHandler>, String)>) {
        while let Some((handler, payload)) = commands.recv().await {
            handler.handle_command(&payload).await;
        }
    }

    fn kind_of(&self, entity_id: &str) -> Option<EntityKind> {
        self.kinds
            .lock()
            .ok()
            .and_then(|k| k.get(entity_id).copied())
    }

    fn send(&self, request: Outbound) {
        if self.outbound.send(request).is_err() {
            error!("MQTT client task is gone, dropping request");
        }
    }
}

impl Bus for MqttBus {
    fn announce(&self, kind: EntityKind, info: &EntityInfo) {
        if let Ok(mut kinds) = self.kinds.lock() {
            kinds.insert(info.id.clone(), kind);
        }

        let message = self.topics.discovery_message(kind, info);
        match serde_json::to_vec(&message) {
            Ok(payload) => {
                info!("Announcing {} {} ({})", kind, info.id, info.name);
                self.send(Outbound::Publish {
                    topic: self.topics.discovery(kind, &info.id),
                    payload,
                    retain: true,
                });
            }
            Err(e) => error!("[{}] Failed to encode discovery message: {}", info.id, e),
        }
    }

    fn publish(&self, entity_id: &str, value: SensorValue) {
        let Some(kind) = self.kind_of(entity_id) else {
            warn!("[{}] Published before being announced, dropping {}", entity_id, value);
            return;
        };

        let payload = render_value(kind, &value);
        debug!("[{}] -> {}", entity_id, payload);
        self.send(Outbound::Publish {
            topic: self.topics.state(kind, entity_id),
            payload: payload.into_bytes(),
            retain: false,
        });
    }

    fn on_command(&self, entity_id: &str, handler: Arc<dyn CommandHandler>) {
        let Some(kind) = self.kind_of(entity_id) else {
            warn!("[{}] Command handler for an unannounced entity", entity_id);
            return;
        };

        let topic = self.topics.command(kind, entity_id);
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.insert(topic.clone(), handler);
        }
        self.send(Outbound::Subscribe(topic));
    }
}

impl Drop for MqttBus {
    fn drop(&mut self) {
        self.client_task.abort();
        self.dispatch_task.abort();
    }
}
