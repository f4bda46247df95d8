// ── Gateway orchestrator ──
//
// Glue between the box session and the bus. Owns the `StateStore` and is
// its only writer: lifecycle notifications and decoded events from the
// connection, plus raw payloads from the bus, are applied here strictly
// in arrival order. Each box event is applied once: when the gateway's own
// mirror comes back on the event topic it is recognised and dropped.

use std::collections::VecDeque;
use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use xfinity_api::{Action, BoxConnection, Control, ControlCommand, DeviceEvent, LinkEvent, Vocabulary};

use crate::auth::{self, SessionToken};
use crate::bus::{self, BusMessage, OFFLINE, ONLINE};
use crate::config::GatewayConfig;
use crate::error::CoreError;
use crate::store::{DeviceState, StateStore};

// ── DeviceLink ───────────────────────────────────────────────────────

/// Where validated actions go. Implemented by [`BoxConnection`]; tests
/// substitute a recorder.
pub trait DeviceLink: Send + Sync {
    fn send(&self, action: &Action) -> impl Future<Output = Result<(), xfinity_api::Error>> + Send;
}

impl DeviceLink for BoxConnection {
    fn send(&self, action: &Action) -> impl Future<Output = Result<(), xfinity_api::Error>> + Send {
        BoxConnection::send(self, action)
    }
}

/// A message received from the bus, routed by topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
}

// ── Gateway ──────────────────────────────────────────────────────────

/// Mirrored frames remembered while their echo is in flight. Older ones
/// are forgotten first.
const MIRROR_BACKLOG: usize = 64;

pub struct Gateway<L> {
    config: GatewayConfig,
    token: SessionToken,
    store: StateStore,
    link: L,
    bus: mpsc::UnboundedSender<BusMessage>,
    /// Raw frames published to the event topic and not yet seen again.
    mirrored: VecDeque<String>,
    terminated: bool,
}

impl<L: DeviceLink> Gateway<L> {
    pub fn new(
        config: GatewayConfig,
        token: SessionToken,
        link: L,
        bus: mpsc::UnboundedSender<BusMessage>,
    ) -> Self {
        Self {
            config,
            token,
            store: StateStore::new(),
            link,
            bus,
            mirrored: VecDeque::with_capacity(MIRROR_BACKLOG),
            terminated: false,
        }
    }

    pub fn state(&self) -> &DeviceState {
        self.store.state()
    }

    /// Apply notifications and bus traffic until `cancel` fires, then mark
    /// the box unavailable.
    pub async fn run(
        mut self,
        mut link_rx: mpsc::UnboundedReceiver<LinkEvent>,
        mut bus_rx: mpsc::UnboundedReceiver<InboundMessage>,
        cancel: CancellationToken,
    ) {
        self.publish_unavailable();
        info!(unique_id = %self.config.unique_id, "gateway running");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = link_rx.recv() => match event {
                    Some(event) => self.on_link_event(event),
                    None => {
                        debug!("connection channel closed");
                        break;
                    }
                },
                message = bus_rx.recv() => match message {
                    Some(message) => self.on_bus_message(&message).await,
                    None => {
                        debug!("bus channel closed");
                        break;
                    }
                },
            }
        }

        self.shutdown();
    }

    // ── Connection side ──────────────────────────────────────────────

    pub fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected => self.on_connected(),
            LinkEvent::Disconnected => self.on_disconnected(),
            LinkEvent::Event { event, raw } => self.on_device_event(&event, &raw),
        }
    }

    /// Session is up: advertise the entity and the current state.
    pub fn on_connected(&mut self) {
        debug!("box connected");
        self.store.mark_connected();
        self.configure();
    }

    pub fn on_disconnected(&mut self) {
        if self.terminated {
            return;
        }
        debug!("box disconnected");
        self.publish_unavailable();
    }

    /// Mirror the frame verbatim to the event topic, then fold it into
    /// the store.
    pub fn on_device_event(&mut self, event: &DeviceEvent, raw: &str) {
        debug!(event_type = event.tag(), "box event");
        if self.mirrored.len() == MIRROR_BACKLOG {
            self.mirrored.pop_front();
        }
        self.mirrored.push_back(raw.to_owned());

        let topic = self.config.topics.event.clone();
        self.publish(BusMessage::new(topic, raw, false));

        if self.fold(event) {
            self.publish_state();
        }
    }

    // ── Bus side ─────────────────────────────────────────────────────

    pub async fn on_bus_message(&mut self, message: &InboundMessage) {
        let topics = &self.config.topics;
        if message.topic == topics.control {
            // Outcomes are logged where they happen.
            let _ = self.on_bus_control(&message.payload).await;
        } else if message.topic == topics.event {
            self.on_bus_event(&message.payload);
        } else {
            debug!(topic = %message.topic, "ignoring message on unrelated topic");
        }
    }

    /// Fold an event published on the bus into the store, unless it is
    /// the echo of a frame this gateway mirrored.
    pub fn on_bus_event(&mut self, payload: &str) {
        if payload.is_empty() {
            warn!(topic = %self.config.topics.event, "received empty event");
            return;
        }

        if let Some(at) = self.mirrored.iter().position(|raw| raw == payload) {
            self.mirrored.remove(at);
            debug!("own mirrored event came back, already applied");
            return;
        }

        let event = match DeviceEvent::from_json(payload) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "ignoring bus event");
                return;
            }
        };

        if self.fold(&event) {
            self.publish_state();
        }
    }

    /// Decode, authorize, validate, translate, and send one control.
    ///
    /// Returns the action sent, `Ok(None)` when there was nothing to send,
    /// or why the control was dropped. Every outcome is already logged.
    pub async fn on_bus_control(&mut self, payload: &str) -> Result<Option<Action>, CoreError> {
        if payload.is_empty() {
            warn!(topic = %self.config.topics.control, "received empty control");
            return Ok(None);
        }

        let control = match ControlCommand::from_json(payload) {
            Ok(control) => control,
            Err(e) => {
                debug!(error = %e, "ignoring bus control");
                return Err(e.into());
            }
        };
        let control_type = control.tag();

        if !auth::authorize(&control, &self.token, self.config.user_control_token()) {
            error!(control_type, "invalid session token for control");
            return Err(CoreError::Unauthorized);
        }

        if let Err(e) = auth::prepare(&control, &self.config) {
            error!(control_type, error = %e, "control failed validation");
            return Err(e.into());
        }

        let Some(action) = control.to_action() else {
            info!(control_type, "control has no action, nothing sent");
            return Ok(None);
        };

        match self.link.send(&action).await {
            Ok(()) => {
                debug!(control_type, action = action.name(), "control forwarded to box");
                Ok(Some(action))
            }
            Err(e) => {
                warn!(control_type, error = %e, "failed to forward control to box");
                Err(e.into())
            }
        }
    }

    // ── Shutdown ─────────────────────────────────────────────────────

    /// Mark the box unavailable and stop reacting to disconnects.
    pub fn shutdown(&mut self) {
        if self.terminated {
            return;
        }
        info!("gateway shutting down");
        self.publish_unavailable();
        self.terminated = true;
    }

    // ── Helpers ──────────────────────────────────────────────────────

    /// Apply `event` to the store. Returns whether the state changed.
    fn fold(&mut self, event: &DeviceEvent) -> bool {
        match event {
            DeviceEvent::DeviceInfo(info) => self.store.update_from_device_info(info),
            DeviceEvent::StatusChange(change) => match change.status.as_deref() {
                Some(status) => {
                    debug!(status, "status change");
                    self.store.update_status(status)
                }
                None => false,
            },
            DeviceEvent::ChannelChange(change) => {
                debug!(channel = ?change.channel, "channel change");
                self.store
                    .update_channel(change.channel.as_deref(), change.channel_name.as_deref())
            }
            DeviceEvent::Error(err) => {
                debug!(error_type = ?err.error_type, description = ?err.description, "box error");
                self.store
                    .update_error(err.error_type.as_deref(), err.description.as_deref())
            }
            DeviceEvent::Info(msg) => {
                info!(info_type = ?msg.info_type, message = ?msg.message, "box info");
                false
            }
        }
    }

    /// Entity metadata, availability, and full state.
    fn configure(&mut self) {
        let discovery = bus::discovery_payload(&self.config, self.store.state());
        let topics = &self.config.topics;
        let retain = self.config.retain;

        let messages = [
            BusMessage::new(topics.discovery.as_str(), discovery.to_string(), retain),
            BusMessage::new(topics.availability.as_str(), ONLINE, retain),
        ];
        for message in messages {
            self.publish(message);
        }
        self.publish_state();
    }

    fn publish_unavailable(&mut self) {
        self.store.set_unavailable();
        let topic = self.config.topics.availability.clone();
        self.publish(BusMessage::new(topic, OFFLINE, self.config.retain));
        self.publish_state();
    }

    fn publish_state(&self) {
        let payload = bus::state_payload(self.store.state(), &self.token);
        self.publish(BusMessage::new(
            self.config.topics.state.as_str(),
            payload.to_string(),
            self.config.retain,
        ));
    }

    fn publish(&self, message: BusMessage) {
        if self.bus.send(message).is_err() {
            debug!("bus sink closed, dropping message");
        }
    }
}
