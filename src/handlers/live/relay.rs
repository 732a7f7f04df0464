//! Per-connection relay between the client socket and the upstream session.
//!
//! Two pumps run concurrently for every connection:
//!
//! - **outbound**: client frames are decoded, checked against the local
//!   intents and either answered locally or forwarded upstream
//! - **inbound**: upstream events are translated into client messages, tool
//!   responses and resumption updates
//!
//! Whichever pump ends first cancels the other. Once both have stopped the
//! upstream sender is dropped so the connection closes cleanly.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::messages::{LiveIncomingMessage, LiveMessageRoute, LiveOutgoingMessage};
use super::translate::{UpstreamAction, translate};
use crate::core::intent::classify;
use crate::core::realtime::gemini::ServerMessage;
use crate::core::realtime::{RealtimeError, SessionState, UpstreamSender, UpstreamSession};
use crate::core::tools::LocalToolExecutor;
use crate::store::{MemoryCommand, ResumptionStore};

/// How long the upstream connection gets to send its close frame.
const UPSTREAM_CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Why a pump stopped early.
#[derive(Debug, Error)]
enum PumpError {
    #[error("upstream: {0}")]
    Upstream(#[from] RealtimeError),

    #[error("client writer closed")]
    ClientGone,
}

/// Relay for one client connection.
pub struct LiveRelay {
    session_id: String,
    tools: Arc<LocalToolExecutor>,
    resumption: ResumptionStore,
    state: SessionState,
}

impl LiveRelay {
    pub fn new(
        session_id: impl Into<String>,
        tools: Arc<LocalToolExecutor>,
        resumption: ResumptionStore,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            tools,
            resumption,
            state: SessionState::Connecting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run both pumps until either side ends, then release the upstream session.
    ///
    /// `client_rx` yields frames read from the client socket; everything meant
    /// for the client is pushed to `client_tx`.
    pub async fn run<S>(
        &mut self,
        client_rx: S,
        client_tx: mpsc::Sender<LiveMessageRoute>,
        upstream: UpstreamSession,
    ) where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
    {
        let (sender, events, guard) = upstream.split();
        let cancel = CancellationToken::new();

        self.set_state(SessionState::Active);

        {
            let this = &*self;
            let outbound = async {
                if let Err(e) = this
                    .outbound(client_rx, sender.clone(), &client_tx, &cancel)
                    .await
                {
                    warn!(session_id = %this.session_id, "Outbound pump stopped: {}", e);
                }
                cancel.cancel();
            };
            let inbound = async {
                if let Err(e) = this.inbound(events, &sender, &client_tx, &cancel).await {
                    warn!(session_id = %this.session_id, "Inbound pump stopped: {}", e);
                }
                cancel.cancel();
            };
            tokio::join!(outbound, inbound);
        }

        self.set_state(SessionState::Closing);
        drop(sender);
        guard.shutdown(UPSTREAM_CLOSE_GRACE).await;
        self.set_state(SessionState::Closed);
    }

    fn set_state(&mut self, state: SessionState) {
        debug!(session_id = %self.session_id, from = %self.state, to = %state, "Session state");
        self.state = state;
    }

    // =========================================================================
    // Outbound: client -> local tools | upstream
    // =========================================================================

    async fn outbound<S>(
        &self,
        mut client_rx: S,
        upstream: UpstreamSender,
        client_tx: &mpsc::Sender<LiveMessageRoute>,
        cancel: &CancellationToken,
    ) -> Result<(), PumpError>
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
    {
        loop {
            let frame = select! {
                _ = cancel.cancelled() => return Ok(()),
                frame = client_rx.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => {
                    self.handle_client_payload(text.as_str(), &upstream, client_tx)
                        .await?;
                }
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => {
                        self.handle_client_payload(text, &upstream, client_tx)
                            .await?;
                    }
                    Err(e) => {
                        warn!(session_id = %self.session_id, "Dropping non UTF-8 binary frame: {}", e);
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!(session_id = %self.session_id, "Client closed the connection");
                    return Ok(());
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    warn!(session_id = %self.session_id, "Client WebSocket error: {}", e);
                    return Ok(());
                }
            }
        }
    }

    /// Decode one client payload and act on it. Malformed payloads are dropped.
    async fn handle_client_payload(
        &self,
        payload: &str,
        upstream: &UpstreamSender,
        client_tx: &mpsc::Sender<LiveMessageRoute>,
    ) -> Result<(), PumpError> {
        let message: LiveIncomingMessage = match serde_json::from_str(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(session_id = %self.session_id, "Dropping malformed client message: {}", e);
                return Ok(());
            }
        };

        match message {
            LiveIncomingMessage::RealtimeInput { realtime_input } => {
                for chunk in realtime_input.media_chunks {
                    if chunk.is_forwardable() {
                        upstream.send_media(chunk.into()).await?;
                    } else {
                        debug!(mime_type = %chunk.mime_type, "Dropping unsupported media chunk");
                    }
                }
            }
            LiveIncomingMessage::Text { text } => match classify(&text) {
                Some(intent) => {
                    let result = self.tools.run(&intent).await;
                    send_client(client_tx, result.into()).await?;
                }
                None => {
                    debug!(session_id = %self.session_id, "Forwarding text turn upstream");
                    upstream.send_text(&text).await?;
                }
            },
            LiveIncomingMessage::Memory { memory, key, value } => {
                let command = match memory.parse::<MemoryCommand>() {
                    Ok(command) => command,
                    Err(e) => {
                        warn!(session_id = %self.session_id, "{}", e);
                        return Ok(());
                    }
                };
                match self.tools.memory_command(command, key, value).await {
                    Ok(reply) => {
                        if let Some(msg) = LiveOutgoingMessage::from_memory_reply(reply) {
                            send_client(client_tx, msg).await?;
                        }
                    }
                    Err(e) => {
                        error!(session_id = %self.session_id, "Failed to persist memory: {}", e);
                    }
                }
            }
        }

        Ok(())
    }

    // =========================================================================
    // Inbound: upstream -> client
    // =========================================================================

    async fn inbound(
        &self,
        mut events: mpsc::Receiver<ServerMessage>,
        upstream: &UpstreamSender,
        client_tx: &mpsc::Sender<LiveMessageRoute>,
        cancel: &CancellationToken,
    ) -> Result<(), PumpError> {
        loop {
            let event = select! {
                _ = cancel.cancelled() => return Ok(()),
                event = events.recv() => event,
            };

            let Some(event) = event else {
                info!(session_id = %self.session_id, "Upstream session ended");
                return Ok(());
            };

            for action in translate(&event, &self.tools) {
                match action {
                    UpstreamAction::Client(msg) => send_client(client_tx, msg).await?,
                    UpstreamAction::ToolResponse(responses) => {
                        upstream.send_tool_response(responses).await?;
                    }
                    UpstreamAction::PersistHandle(handle) => {
                        debug!(session_id = %self.session_id, "Storing new resumption handle");
                        if let Err(e) = self.resumption.update_offloaded(handle).await {
                            error!("Failed to persist resumption handle: {}", e);
                        }
                    }
                }
            }
        }
    }
}

async fn send_client(
    client_tx: &mpsc::Sender<LiveMessageRoute>,
    msg: LiveOutgoingMessage,
) -> Result<(), PumpError> {
    client_tx
        .send(LiveMessageRoute::Outgoing(msg))
        .await
        .map_err(|_| PumpError::ClientGone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::gemini::ClientEvent;
    use crate::core::tools::{ChartKind, ChartRenderer, RenderResult, WeatherConfig};
    use crate::store::MemoryStore;
    use futures::channel::mpsc as client_mpsc;
    use serde_json::json;
    use std::time::Duration;

    type ClientFrame = Result<Message, axum::Error>;

    struct Harness {
        client_in: client_mpsc::UnboundedSender<ClientFrame>,
        client_out: mpsc::Receiver<LiveMessageRoute>,
        upstream_out: mpsc::Receiver<ClientEvent>,
        upstream_in: mpsc::Sender<ServerMessage>,
        resumption: ResumptionStore,
        relay: tokio::task::JoinHandle<SessionState>,
    }

    /// Renderer that takes its time, standing in for a large chart.
    struct SlowRenderer;

    impl ChartRenderer for SlowRenderer {
        fn render_chart(&self, _kind: ChartKind, _values: &[f64]) -> RenderResult<Vec<u8>> {
            std::thread::sleep(Duration::from_millis(1500));
            Ok(b"\x89PNG".to_vec())
        }

        fn render_word_cloud(&self, _text: &str) -> RenderResult<Vec<u8>> {
            std::thread::sleep(Duration::from_millis(1500));
            Ok(b"\x89PNG".to_vec())
        }
    }

    fn start() -> Harness {
        let tools = LocalToolExecutor::new(WeatherConfig::default(), MemoryStore::in_memory());
        start_with(tools, 64)
    }

    fn start_with(tools: LocalToolExecutor, upstream_capacity: usize) -> Harness {
        let (client_in, client_rx) = client_mpsc::unbounded::<ClientFrame>();
        let (client_tx, client_out) = mpsc::channel(64);
        let (up_tx, upstream_out) = mpsc::channel(upstream_capacity);
        let (upstream_in, events_rx) = mpsc::channel(64);
        let resumption = ResumptionStore::in_memory();
        let tools = Arc::new(tools);

        let session = UpstreamSession::new(up_tx, events_rx, None);
        let mut relay = LiveRelay::new("test", tools, resumption.clone());
        let relay = tokio::spawn(async move {
            relay.run(client_rx, client_tx, session).await;
            relay.state()
        });

        Harness {
            client_in,
            client_out,
            upstream_out,
            upstream_in,
            resumption,
            relay,
        }
    }

    fn text(value: serde_json::Value) -> ClientFrame {
        Ok(Message::Text(value.to_string().into()))
    }

    async fn next_client(h: &mut Harness) -> serde_json::Value {
        let route = tokio::time::timeout(Duration::from_secs(5), h.client_out.recv())
            .await
            .expect("timed out waiting for client message")
            .expect("client channel closed");
        match route {
            LiveMessageRoute::Outgoing(msg) => serde_json::to_value(msg).unwrap(),
            other => panic!("unexpected route: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_intercepted_text_not_forwarded() {
        let mut h = start();
        h.client_in
            .unbounded_send(text(json!({"text": "calculate 2+2"})))
            .unwrap();

        assert_eq!(next_client(&mut h).await, json!({"text": "Result: 4"}));
        assert!(h.upstream_out.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_plain_text_forwarded_as_turn() {
        let mut h = start();
        h.client_in
            .unbounded_send(text(json!({"text": "Tell me a story"})))
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), h.upstream_out.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            ClientEvent::ClientContent(content) => {
                assert_eq!(content.turns[0].parts[0].text.as_deref(), Some("Tell me a story"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_binary_frame_parsed_as_json() {
        let mut h = start();
        let payload = json!({"memory": "enable"}).to_string();
        h.client_in
            .unbounded_send(Ok(Message::Binary(payload.into_bytes().into())))
            .unwrap();

        assert_eq!(next_client(&mut h).await, json!({"memory_status": "enabled"}));
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_memory_dropped() {
        let mut h = start();
        h.client_in
            .unbounded_send(Ok(Message::Text("{not json".into())))
            .unwrap();
        h.client_in
            .unbounded_send(text(json!({"memory": "forget"})))
            .unwrap();
        h.client_in
            .unbounded_send(text(json!({"memory": "get_preference", "key": "nope"})))
            .unwrap();

        assert_eq!(next_client(&mut h).await, json!({"memory_value": null}));
    }

    #[tokio::test]
    async fn test_media_forwarded_and_filtered() {
        let mut h = start();
        h.client_in
            .unbounded_send(text(json!({"realtime_input": {"media_chunks": [
                {"mime_type": "video/mp4", "data": "AAAA"},
                {"mime_type": "audio/pcm", "data": "AQID"}
            ]}})))
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), h.upstream_out.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            ClientEvent::RealtimeInput(input) => {
                assert_eq!(input.media_chunks.len(), 1);
                assert_eq!(input.media_chunks[0].mime_type, "audio/pcm");
                assert_eq!(input.media_chunks[0].data, "AQID");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upstream_events_reach_client_and_store() {
        let mut h = start();
        let event: ServerMessage = serde_json::from_value(json!({
            "sessionResumptionUpdate": {"newHandle": "resume-me", "resumable": true},
            "serverContent": {"modelTurn": {"parts": [{"text": "hi"}]}}
        }))
        .unwrap();
        h.upstream_in.send(event).await.unwrap();

        assert_eq!(next_client(&mut h).await, json!({"text": "hi"}));
        assert_eq!(h.resumption.current().as_deref(), Some("resume-me"));
    }

    #[tokio::test]
    async fn test_tool_call_answered_upstream() {
        let mut h = start();
        let event: ServerMessage = serde_json::from_value(json!({
            "toolCall": {"functionCalls": [{"id": "c1", "name": "current_time"}]}
        }))
        .unwrap();
        h.upstream_in.send(event).await.unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(5), h.upstream_out.recv())
            .await
            .unwrap()
            .unwrap();
        match reply {
            ClientEvent::ToolResponse(response) => {
                assert_eq!(response.function_responses[0].id.as_deref(), Some("c1"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    fn model_text(text: &str) -> ServerMessage {
        serde_json::from_value(json!({
            "serverContent": {"modelTurn": {"parts": [{"text": text}]}}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_slow_local_tool_does_not_hold_back_upstream() {
        let tools = LocalToolExecutor::with_renderer(
            WeatherConfig::default(),
            MemoryStore::in_memory(),
            Arc::new(SlowRenderer),
        );
        let mut h = start_with(tools, 64);

        h.client_in
            .unbounded_send(text(json!({"text": "bar chart: 1, 2, 3"})))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.upstream_in.send(model_text("still here")).await.unwrap();

        assert_eq!(next_client(&mut h).await, json!({"text": "still here"}));
        let chart = next_client(&mut h).await;
        assert!(chart["barchart"].is_string(), "unexpected message: {chart}");
    }

    #[tokio::test]
    async fn test_full_upstream_does_not_hold_back_client() {
        let tools = LocalToolExecutor::new(WeatherConfig::default(), MemoryStore::in_memory());
        let mut h = start_with(tools, 1);

        // The second turn waits for room in the upstream channel
        for turn in ["first turn", "second turn"] {
            h.client_in
                .unbounded_send(text(json!({"text": turn})))
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.upstream_in.send(model_text("reply")).await.unwrap();

        assert_eq!(next_client(&mut h).await, json!({"text": "reply"}));

        for expected in ["first turn", "second turn"] {
            let event = tokio::time::timeout(Duration::from_secs(5), h.upstream_out.recv())
                .await
                .unwrap()
                .unwrap();
            match event {
                ClientEvent::ClientContent(content) => {
                    assert_eq!(content.turns[0].parts[0].text.as_deref(), Some(expected));
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_client_disconnect_stops_both_pumps() {
        let h = start();
        drop(h.client_in);

        let state = tokio::time::timeout(Duration::from_secs(5), h.relay)
            .await
            .expect("relay did not stop")
            .unwrap();
        assert_eq!(state, SessionState::Closed);
    }

    #[tokio::test]
    async fn test_upstream_end_stops_both_pumps() {
        let h = start();
        drop(h.upstream_in);

        let state = tokio::time::timeout(Duration::from_secs(5), h.relay)
            .await
            .expect("relay did not stop")
            .unwrap();
        assert_eq!(state, SessionState::Closed);
    }
}
