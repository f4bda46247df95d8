//! Long-lived WebSocket session to the box, with reconnect and keep-alive.
//!
//! [`BoxConnection`] owns the single transport session. Two background
//! loops drive it for the lifetime of the gateway:
//!
//! - [`receive_loop`](BoxConnection::receive_loop) connects while the
//!   session is down, decodes inbound frames as [`DeviceEvent`]s, and
//!   reconnects after a fixed pause when the box goes away;
//! - [`keep_alive`](BoxConnection::keep_alive) writes a keep-alive frame
//!   every four minutes while connected.
//!
//! Lifecycle changes and decoded events are reported as [`LinkEvent`]s on
//! the channel returned by [`BoxConnection::new`].
//!
//! # Example
//!
//! ```rust,ignore
//! use xfinity_api::websocket::{BoxConnection, LinkEvent};
//! use xfinity_api::{Action, ConnectionConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let (conn, mut link_rx) = BoxConnection::new(ConnectionConfig::new("192.168.1.20", token));
//! let cancel = CancellationToken::new();
//! tokio::spawn({ let conn = conn.clone(); let cancel = cancel.clone(); async move { conn.receive_loop(cancel).await } });
//!
//! conn.send(&Action::SetChannel { channel: "12".into() }).await?;
//! while let Some(event) = link_rx.recv().await {
//!     println!("{event:?}");
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::error::Error;
use crate::event::DeviceEvent;
use crate::registry::Vocabulary;
use crate::transport::ConnectionConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

// ── Timing ───────────────────────────────────────────────────────────

/// Pause between losing the session (or failing to open it) and the next
/// connect attempt.
pub const RECONNECT_PAUSE: Duration = Duration::from_secs(5);

/// Interval between keep-alive frames.
pub const KEEP_ALIVE_PERIOD: Duration = Duration::from_secs(240);

#[derive(Debug, Clone, Copy)]
struct Timings {
    reconnect_pause: Duration,
    keep_alive_period: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            reconnect_pause: RECONNECT_PAUSE,
            keep_alive_period: KEEP_ALIVE_PERIOD,
        }
    }
}

// ── Phase / LinkEvent ────────────────────────────────────────────────

/// Lifecycle stage of the box session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
pub enum Phase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Notification from the connection to whoever owns the gateway state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Session established.
    Connected,
    /// Session lost, closed, or a connect attempt failed.
    Disconnected,
    /// A frame from the box decoded into an event. `raw` is the frame text
    /// exactly as received.
    Event { event: DeviceEvent, raw: String },
}

/// Phase plus the generation of the session it refers to. The generation
/// is bumped on every successful connect so a reader can tell that the
/// session it is draining has been replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Link {
    phase: Phase,
    generation: u64,
}

struct Session {
    writer: WsWriter,
    generation: u64,
}

// ── BoxConnection ────────────────────────────────────────────────────

/// Handle to the box session.
///
/// Cheaply cloneable via `Arc<Inner>`. All writes and connect attempts go
/// through one async mutex, so frames from the receive loop, the
/// keep-alive loop, and bus-triggered sends never interleave.
#[derive(Clone)]
pub struct BoxConnection {
    inner: Arc<Inner>,
}

struct Inner {
    config: ConnectionConfig,
    link: watch::Sender<Link>,
    session: Mutex<Option<Session>>,
    /// Read half of the newest session, waiting to be picked up by the
    /// receive loop.
    fresh_reader: Mutex<Option<(u64, WsReader)>>,
    events: mpsc::UnboundedSender<LinkEvent>,
    timings: Timings,
}

impl BoxConnection {
    /// Create a disconnected handle. Nothing happens on the network until
    /// [`connect`](Self::connect), [`send`](Self::send), or
    /// [`receive_loop`](Self::receive_loop) is called.
    pub fn new(config: ConnectionConfig) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        Self::with_timings(config, Timings::default())
    }

    fn with_timings(
        config: ConnectionConfig,
        timings: Timings,
    ) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (link, _) = watch::channel(Link::default());

        let conn = Self {
            inner: Arc::new(Inner {
                config,
                link,
                session: Mutex::new(None),
                fresh_reader: Mutex::new(None),
                events,
                timings,
            }),
        };
        (conn, events_rx)
    }

    pub fn phase(&self) -> Phase {
        self.inner.link.borrow().phase
    }

    pub fn is_connected(&self) -> bool {
        self.phase() == Phase::Connected
    }

    // ── Connect ──────────────────────────────────────────────────────

    /// Open the session unless it is already up.
    ///
    /// On failure the phase returns to [`Phase::Disconnected`], a
    /// [`LinkEvent::Disconnected`] is emitted, and the error is handed
    /// back to this caller only.
    pub async fn connect(&self) -> Result<(), Error> {
        let mut session = self.inner.session.lock().await;
        if session.is_some() && self.is_connected() {
            return Ok(());
        }

        self.set_phase(Phase::Connecting);
        debug!(host = %self.inner.config.host, port = self.inner.config.port, "connecting to box");

        match self.open().await {
            Ok(stream) => {
                let (writer, reader) = stream.split();
                let generation = self.inner.link.borrow().generation + 1;

                *session = Some(Session { writer, generation });
                *self.inner.fresh_reader.lock().await = Some((generation, reader));
                self.inner.link.send_replace(Link {
                    phase: Phase::Connected,
                    generation,
                });

                info!(host = %self.inner.config.host, generation, "connected to box");
                self.notify(LinkEvent::Connected);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, host = %self.inner.config.host, "failed to connect to box");
                *session = None;
                self.set_phase(Phase::Disconnected);
                self.notify(LinkEvent::Disconnected);
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<WsStream, Error> {
        let config = &self.inner.config;
        let url = config.url()?;

        let uri: tungstenite::http::Uri = url.as_str().parse().map_err(
            |e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()),
        )?;
        let request = ClientRequestBuilder::new(uri).with_header(
            "Authorization",
            format!("Bearer {}", config.token.expose_secret()),
        );

        let attempt =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, config.connector()?);

        let (stream, _response) = tokio::time::timeout(config.connect_timeout, attempt)
            .await
            .map_err(|_| Error::Timeout {
                timeout_secs: config.connect_timeout.as_secs(),
            })?
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        Ok(stream)
    }

    // ── Send ─────────────────────────────────────────────────────────

    /// Write `action` to the box as one text frame, connecting first if
    /// needed. A failed write tears the session down and is reported to
    /// the caller; the receive loop takes care of reconnecting.
    pub async fn send(&self, action: &Action) -> Result<(), Error> {
        if !self.is_connected() {
            self.connect().await?;
        }

        let frame = action.to_json()?;

        let mut session = self.inner.session.lock().await;
        let Some(live) = session.as_mut() else {
            return Err(Error::NotConnected);
        };

        match live.writer.send(Message::text(frame)).await {
            Ok(()) => {
                debug!(action = action.name(), "sent to box");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, action = action.name(), "failed to send to box");
                *session = None;
                self.set_phase(Phase::Disconnected);
                self.notify(LinkEvent::Disconnected);
                Err(Error::WebSocketSend(e.to_string()))
            }
        }
    }

    /// Tear down session `generation` if it is still the live one.
    async fn drop_session(&self, generation: u64) {
        let mut session = self.inner.session.lock().await;
        if session.as_ref().is_none_or(|s| s.generation != generation) {
            return;
        }

        *session = None;
        self.set_phase(Phase::Disconnected);
        self.notify(LinkEvent::Disconnected);
    }

    // ── Background loops ─────────────────────────────────────────────

    /// Keep the session up and drain inbound frames until `cancel` fires.
    pub async fn receive_loop(&self, cancel: CancellationToken) {
        let mut link_rx = self.inner.link.subscribe();
        let mut reader: Option<(u64, WsReader)> = None;

        while !cancel.is_cancelled() {
            if !self.is_connected() {
                reader = None;
                if self.connect().await.is_err() {
                    self.pause(&cancel).await;
                }
                continue;
            }

            if let Some(fresh) = self.inner.fresh_reader.lock().await.take() {
                reader = Some(fresh);
            }

            let Some((generation, stream)) = reader.as_mut() else {
                let generation = self.inner.link.borrow().generation;
                warn!(generation, "connected session has no reader, dropping it");
                self.drop_session(generation).await;
                continue;
            };
            let generation = *generation;

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = async {
                    let _ = link_rx
                        .wait_for(|link| link.phase != Phase::Connected || link.generation != generation)
                        .await;
                } => {
                    debug!(generation, "session replaced, dropping stale reader");
                    reader = None;
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()),
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite answers pings itself
                        tracing::trace!("box ping");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        match frame {
                            Some(cf) => info!(code = %cf.code, reason = %cf.reason, "box closed the session"),
                            None => info!("box closed the session"),
                        }
                        reader = None;
                        self.drop_session(generation).await;
                        self.pause(&cancel).await;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "box session failed");
                        reader = None;
                        self.drop_session(generation).await;
                        self.pause(&cancel).await;
                    }
                    None => {
                        info!("box session ended");
                        reader = None;
                        self.drop_session(generation).await;
                        self.pause(&cancel).await;
                    }
                    Some(Ok(_)) => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }

        debug!("receive loop exiting");
    }

    /// Send a keep-alive frame every [`KEEP_ALIVE_PERIOD`] while
    /// connected. Failures are logged and never end the loop.
    pub async fn keep_alive(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.inner.timings.keep_alive_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if !self.is_connected() {
                        continue;
                    }
                    if let Err(e) = self.send(&Action::KeepAlive).await {
                        warn!(error = %e, "keep-alive failed");
                    }
                }
            }
        }

        debug!("keep-alive loop exiting");
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn dispatch(&self, raw: &str) {
        match DeviceEvent::from_json(raw) {
            Ok(event) => {
                debug!(event_type = event.tag(), "event from box");
                self.notify(LinkEvent::Event {
                    event,
                    raw: raw.to_owned(),
                });
            }
            Err(e) => debug!(error = %e, "dropping frame from box"),
        }
    }

    fn set_phase(&self, phase: Phase) {
        self.inner.link.send_modify(|link| link.phase = phase);
    }

    fn notify(&self, event: LinkEvent) {
        // Only fails once the gateway has dropped its receiver.
        let _ = self.inner.events.send(event);
    }

    async fn pause(&self, cancel: &CancellationToken) {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(self.inner.timings.reconnect_pause) => {}
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
