// ── MQTT bridge ──
//
// Broker side of the gateway. `drive` polls the rumqttc event loop,
// (re)subscribes on every ConnAck, and hands inbound publishes to the
// gateway. `forward` publishes whatever the gateway emits.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use xfinity_config::MqttSettings;
use xfinity_core::bus::OFFLINE;
use xfinity_core::{BusMessage, InboundMessage};

/// Pause after a failed poll before rumqttc retries the broker.
const RETRY_PAUSE: Duration = Duration::from_secs(5);

/// Capacity of the rumqttc request queue.
const REQUEST_CAPACITY: usize = 64;

/// Broker options, with a retained `offline` last-will on `availability_topic`.
pub fn options(settings: &MqttSettings, availability_topic: &str) -> MqttOptions {
    let mut options = MqttOptions::new(settings.client_id.as_str(), settings.host.as_str(), settings.port);
    options.set_keep_alive(Duration::from_secs(settings.keep_alive.max(5)));

    if let Some(username) = &settings.username {
        let password = settings
            .password()
            .map(|p| p.expose_secret().to_owned())
            .unwrap_or_default();
        options.set_credentials(username.as_str(), password);
    }

    options.set_last_will(LastWill::new(
        availability_topic,
        OFFLINE,
        QoS::AtLeastOnce,
        settings.retain,
    ));
    options
}

pub fn connect(options: MqttOptions) -> (AsyncClient, EventLoop) {
    AsyncClient::new(options, REQUEST_CAPACITY)
}

/// Poll the broker connection until our own disconnect goes out.
pub async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    subscriptions: Vec<String>,
    inbound: mpsc::UnboundedSender<InboundMessage>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("connected to broker");
                for topic in &subscriptions {
                    // Must not block: this task is the one draining requests.
                    match client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                        Ok(()) => debug!(topic = %topic, "subscribed"),
                        Err(e) => warn!(topic = %topic, error = %e, "failed to subscribe"),
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    payload: String::from_utf8_lossy(&publish.payload).into_owned(),
                    topic: publish.topic,
                };
                if inbound.send(message).is_err() {
                    debug!("gateway stopped, dropping inbound message");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("disconnected from broker");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "broker connection failed");
                tokio::time::sleep(RETRY_PAUSE).await;
            }
        }
    }
}

/// Publish gateway output until the gateway drops its sender.
pub async fn forward(client: AsyncClient, mut outbound: mpsc::UnboundedReceiver<BusMessage>) {
    while let Some(BusMessage {
        topic,
        payload,
        retain,
    }) = outbound.recv().await
    {
        if let Err(e) = client
            .publish(topic.as_str(), QoS::AtLeastOnce, retain, payload.into_bytes())
            .await
        {
            warn!(topic = %topic, error = %e, "failed to publish");
        }
    }
    debug!("publish queue closed");
}
