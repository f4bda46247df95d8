// Integration tests for `Gateway` using a recording device link.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use xfinity_api::{Action, DeviceEvent, LinkEvent, Vocabulary};
use xfinity_core::{
    BusMessage, CoreError, DeviceLink, Gateway, GatewayConfig, InboundMessage, SessionToken,
};

// ── Helpers ─────────────────────────────────────────────────────────

const TOKEN: &str = "X";

#[derive(Clone, Default)]
struct Recorder {
    sent: Arc<Mutex<Vec<Action>>>,
    fail: bool,
}

impl Recorder {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn sent(&self) -> Vec<Action> {
        self.sent.lock().unwrap().clone()
    }
}

impl DeviceLink for Recorder {
    fn send(
        &self,
        action: &Action,
    ) -> impl Future<Output = Result<(), xfinity_api::Error>> + Send {
        let result = if self.fail {
            Err(xfinity_api::Error::WebSocketSend("connection reset".into()))
        } else {
            self.sent.lock().unwrap().push(action.clone());
            Ok(())
        };
        async move { result }
    }
}

fn setup(config: GatewayConfig) -> (Gateway<Recorder>, Recorder, mpsc::UnboundedReceiver<BusMessage>) {
    let recorder = Recorder::default();
    let (bus_tx, bus_rx) = mpsc::unbounded_channel();
    let gateway = Gateway::new(config, SessionToken::from(TOKEN), recorder.clone(), bus_tx);
    (gateway, recorder, bus_rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<BusMessage>) -> Vec<BusMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

fn topics(messages: &[BusMessage]) -> Vec<&str> {
    messages.iter().map(|m| m.topic.as_str()).collect()
}

fn last_state(messages: &[BusMessage]) -> Value {
    let message = messages
        .iter()
        .rev()
        .find(|m| m.topic == "xfinity/xfinity_box/state")
        .expect("no state published");
    serde_json::from_str(&message.payload).unwrap()
}

fn event(raw: &str) -> LinkEvent {
    LinkEvent::Event {
        event: DeviceEvent::from_json(raw).unwrap(),
        raw: raw.to_owned(),
    }
}

// ── Controls ────────────────────────────────────────────────────────

#[tokio::test]
async fn channel_control_with_session_token_sends_exactly_once() {
    let (mut gateway, recorder, _bus) = setup(GatewayConfig::default());

    let sent = gateway
        .on_bus_control(r#"{"control_type":"CHANNEL","session_token":"X","channel":"12"}"#)
        .await
        .unwrap();

    let expected = Action::SetChannel {
        channel: "12".into(),
    };
    assert_eq!(sent, Some(expected.clone()));
    assert_eq!(recorder.sent(), vec![expected]);
    assert_eq!(
        recorder.sent()[0].to_json().unwrap(),
        r#"{"action":"set_channel","channel":"12"}"#
    );
}

#[tokio::test]
async fn foreign_token_never_reaches_the_box() {
    let (mut gateway, recorder, _bus) = setup(GatewayConfig::default());

    let err = gateway
        .on_bus_control(r#"{"control_type":"POWER","session_token":"stolen","power_action":"off"}"#)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Unauthorized));
    assert!(recorder.sent().is_empty());
}

#[tokio::test]
async fn override_token_is_accepted_when_configured() {
    let mut config = GatewayConfig::default();
    config.user_control_token = Some(SecretString::from("automation"));
    let (mut gateway, recorder, _bus) = setup(config);

    gateway
        .on_bus_control(r#"{"control_type":"VOLUME","session_token":"automation","volume_action":"mute"}"#)
        .await
        .unwrap();

    assert_eq!(
        recorder.sent(),
        vec![Action::VolumeControl {
            volume_action: "mute".into()
        }]
    );
}

#[tokio::test]
async fn empty_required_field_sends_nothing() {
    let (mut gateway, recorder, _bus) = setup(GatewayConfig::default());

    let sent = gateway
        .on_bus_control(r#"{"control_type":"CHANNEL","session_token":"X","channel":""}"#)
        .await
        .unwrap();

    assert_eq!(sent, None);
    assert!(recorder.sent().is_empty());
}

#[tokio::test]
async fn parental_code_guards_channel_changes() {
    let mut config = GatewayConfig::default();
    config.parental_code = Some(SecretString::from("1234"));
    let (mut gateway, recorder, mut bus) = setup(config);

    let err = gateway
        .on_bus_control(r#"{"control_type":"CHANNEL","session_token":"X","channel":"12"}"#)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Rejected(xfinity_api::ValidationError::MissingUserCode)
    ));

    let err = gateway
        .on_bus_control(
            r#"{"control_type":"CHANNEL","session_token":"X","channel":"12","user_code":"9999"}"#,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Rejected(xfinity_api::ValidationError::InvalidUserCode)
    ));
    assert!(recorder.sent().is_empty());
    assert!(drain(&mut bus).is_empty());

    gateway
        .on_bus_control(
            r#"{"control_type":"CHANNEL","session_token":"X","channel":"12","user_code":"1234"}"#,
        )
        .await
        .unwrap();
    assert_eq!(recorder.sent().len(), 1);
}

#[tokio::test]
async fn undecodable_and_empty_controls_are_dropped() {
    let (mut gateway, recorder, _bus) = setup(GatewayConfig::default());

    assert!(matches!(
        gateway.on_bus_control("not json").await,
        Err(CoreError::Decode(_))
    ));
    assert!(matches!(
        gateway
            .on_bus_control(r#"{"control_type":"REWIND","session_token":"X"}"#)
            .await,
        Err(CoreError::Decode(_))
    ));
    assert_eq!(gateway.on_bus_control("").await.unwrap(), None);
    assert!(recorder.sent().is_empty());
}

#[tokio::test]
async fn send_failure_is_reported_as_transport_error() {
    let recorder = Recorder::failing();
    let (bus_tx, _bus_rx) = mpsc::unbounded_channel();
    let mut gateway = Gateway::new(
        GatewayConfig::default(),
        SessionToken::from(TOKEN),
        recorder,
        bus_tx,
    );

    let err = gateway
        .on_bus_control(r#"{"control_type":"POWER","session_token":"X","power_action":"on"}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::BoxDisconnected), "{err:?}");
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[test]
fn connected_publishes_discovery_availability_and_state() {
    let (mut gateway, _recorder, mut bus) = setup(GatewayConfig::default());

    gateway.on_link_event(LinkEvent::Connected);

    let messages = drain(&mut bus);
    assert_eq!(
        topics(&messages),
        vec![
            "homeassistant/media_player/xfinity_box/config",
            "xfinity/xfinity_box/availability",
            "xfinity/xfinity_box/state",
        ]
    );
    assert_eq!(messages[1].payload, "online");
    assert!(messages.iter().all(|m| m.retain));

    let discovery: Value = serde_json::from_str(&messages[0].payload).unwrap();
    assert_eq!(
        discovery["command_topic"],
        "homeassistant/media_player/xfinity_box/set"
    );
    assert_eq!(last_state(&messages)["session_token"], TOKEN);
}

#[test]
fn device_info_after_connect_sets_identity() {
    let (mut gateway, _recorder, _bus) = setup(GatewayConfig::default());

    gateway.on_link_event(LinkEvent::Connected);
    gateway.on_link_event(event(
        r#"{"event_type":"DEVICE_INFO","device_id":"XG1v4-0001","model":"XG1v4","firmware":"1.2.3","mac_address":"aa:bb:cc:dd:ee:ff"}"#,
    ));

    let state = gateway.state();
    assert_eq!(state.device_id.as_deref(), Some("XG1v4-0001"));
    assert_eq!(state.model.as_deref(), Some("XG1v4"));
    assert_eq!(state.firmware.as_deref(), Some("1.2.3"));
    assert_eq!(state.mac_address.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
}

#[test]
fn device_event_is_mirrored_verbatim_then_state_published() {
    let (mut gateway, _recorder, mut bus) = setup(GatewayConfig::default());
    gateway.on_link_event(LinkEvent::Connected);
    drain(&mut bus);

    let raw = r#"{"event_type": "CHANNEL_CHANGE", "channel": 702, "channel_name": "HBO"}"#;
    gateway.on_link_event(event(raw));

    let messages = drain(&mut bus);
    assert_eq!(
        topics(&messages),
        vec!["xfinity/xfinity_box/event", "xfinity/xfinity_box/state"]
    );
    assert_eq!(messages[0].payload, raw);
    assert!(!messages[0].retain);

    let state = last_state(&messages);
    assert_eq!(state["channel"], "702");
    assert_eq!(state["channel_name"], "HBO");
}

#[test]
fn disconnect_marks_unavailable() {
    let (mut gateway, _recorder, mut bus) = setup(GatewayConfig::default());
    gateway.on_link_event(LinkEvent::Connected);
    gateway.on_link_event(event(r#"{"event_type":"STATUS_CHANGE","status":"on"}"#));
    assert_eq!(gateway.state().status, "on");
    drain(&mut bus);

    gateway.on_link_event(LinkEvent::Disconnected);

    assert_eq!(gateway.state().status, "unavailable");
    let messages = drain(&mut bus);
    assert_eq!(messages[0].topic, "xfinity/xfinity_box/availability");
    assert_eq!(messages[0].payload, "offline");
    assert_eq!(last_state(&messages)["status"], "unavailable");
}

#[test]
fn events_while_disconnected_are_mirrored_but_not_applied() {
    let (mut gateway, _recorder, mut bus) = setup(GatewayConfig::default());

    gateway.on_link_event(event(r#"{"event_type":"STATUS_CHANGE","status":"on"}"#));

    assert_eq!(gateway.state().status, "unavailable");
    assert_eq!(topics(&drain(&mut bus)), vec!["xfinity/xfinity_box/event"]);
}

#[test]
fn bus_events_fold_into_state_once() {
    let (mut gateway, _recorder, mut bus) = setup(GatewayConfig::default());
    gateway.on_link_event(LinkEvent::Connected);
    drain(&mut bus);

    let raw = r#"{"event_type":"ERROR","error_type":"TUNER","description":"no signal"}"#;
    gateway.on_bus_event(raw);
    let messages = drain(&mut bus);
    assert_eq!(topics(&messages), vec!["xfinity/xfinity_box/state"]);
    assert_eq!(
        last_state(&messages)["last_error"],
        serde_json::json!({"type": "TUNER", "description": "no signal"})
    );

    // A repeat from another publisher changes nothing.
    gateway.on_bus_event(raw);
    gateway.on_bus_event("");
    gateway.on_bus_event(r#"{"event_type":"REBOOT"}"#);
    assert!(drain(&mut bus).is_empty());
}

#[test]
fn late_echo_of_own_mirror_does_not_roll_back_state() {
    let (mut gateway, _recorder, mut bus) = setup(GatewayConfig::default());
    gateway.on_link_event(LinkEvent::Connected);

    let first = r#"{"event_type":"CHANNEL_CHANGE","channel":"12"}"#;
    let second = r#"{"event_type":"CHANNEL_CHANGE","channel":"13"}"#;
    gateway.on_link_event(event(first));
    gateway.on_link_event(event(second));
    drain(&mut bus);

    // The broker hands back our mirror of the first frame after the second
    // was already applied.
    gateway.on_bus_event(first);

    assert_eq!(gateway.state().current_channel.as_deref(), Some("13"));
    assert!(drain(&mut bus).is_empty());

    // The echo is consumed once; the same text from another publisher
    // still applies.
    gateway.on_bus_event(first);
    assert_eq!(gateway.state().current_channel.as_deref(), Some("12"));
    assert_eq!(last_state(&drain(&mut bus))["channel"], "12");
}

#[test]
fn echo_from_before_a_reconnect_is_not_applied() {
    let (mut gateway, _recorder, mut bus) = setup(GatewayConfig::default());
    gateway.on_link_event(LinkEvent::Connected);

    let on = r#"{"event_type":"STATUS_CHANGE","status":"on"}"#;
    gateway.on_link_event(event(on));
    gateway.on_link_event(LinkEvent::Disconnected);
    gateway.on_link_event(LinkEvent::Connected);
    drain(&mut bus);

    gateway.on_bus_event(on);

    assert_eq!(gateway.state().status, "unavailable");
    assert!(drain(&mut bus).is_empty());
}

#[test]
fn disconnect_after_shutdown_is_ignored() {
    let (mut gateway, _recorder, mut bus) = setup(GatewayConfig::default());
    gateway.on_link_event(LinkEvent::Connected);
    drain(&mut bus);

    gateway.shutdown();
    let messages = drain(&mut bus);
    assert_eq!(messages[0].payload, "offline");

    gateway.on_link_event(LinkEvent::Disconnected);
    gateway.shutdown();
    assert!(drain(&mut bus).is_empty());
}

// ── Run loop ────────────────────────────────────────────────────────

#[tokio::test]
async fn run_routes_link_and_bus_traffic_until_cancelled() {
    let (gateway, recorder, mut bus) = setup(GatewayConfig::default());
    let (link_tx, link_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let task = tokio::spawn(gateway.run(link_rx, inbound_rx, cancel.clone()));

    link_tx.send(LinkEvent::Connected).unwrap();
    inbound_tx
        .send(InboundMessage {
            topic: "homeassistant/media_player/xfinity_box/set".into(),
            payload: r#"{"control_type":"POWER","session_token":"X","power_action":"toggle"}"#
                .into(),
        })
        .unwrap();

    // Wait for the control to land before shutting down.
    tokio::time::timeout(Duration::from_secs(5), async {
        while recorder.sent().is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    task.await.unwrap();

    assert_eq!(
        recorder.sent(),
        vec![Action::PowerControl {
            power_action: "toggle".into()
        }]
    );

    let messages = drain(&mut bus);
    // Starts offline, goes online on connect, ends offline on shutdown.
    let availability: Vec<&str> = messages
        .iter()
        .filter(|m| m.topic == "xfinity/xfinity_box/availability")
        .map(|m| m.payload.as_str())
        .collect();
    assert_eq!(availability, vec!["offline", "online", "offline"]);
}
