use std::time::Duration;

use anyhow::{bail, Context};
use colored::Colorize;
use eventsource_client as es;
use eventsource_client::Client;
use futures::StreamExt;

use agent_core::{Conversation, ConversationPage};
use chat_state::{ChatStatus, ClientMessage, ClientSession, ProtocolError, ServerMessage, StreamEvent};

use crate::render::Renderer;

const MAX_RECONNECTS: u32 = 5;

/// HTTP/SSE access to the server.
pub struct ChatClient {
    http: reqwest::Client,
    server_url: String,
    debug: bool,
}

impl ChatClient {
    pub fn new(server_url: impl Into<String>, debug: bool) -> Self {
        Self {
            http: reqwest::Client::new(),
            server_url: server_url.into().trim_end_matches('/').to_string(),
            debug,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.server_url, path)
    }

    fn trace(&self, message: impl AsRef<str>) {
        if self.debug {
            eprintln!("{}", format!("[DEBUG] {}", message.as_ref()).dimmed());
        }
    }

    /// Sends one client frame and parses the frame that comes back, whatever
    /// the HTTP status.
    pub async fn send(&self, message: &ClientMessage) -> anyhow::Result<ServerMessage> {
        let url = self.url("/messages");
        self.trace(format!("POST {} {}", url, serde_json::to_string(message)?));

        let response = self.http.post(&url).json(message).send().await?;
        let status = response.status();
        let body = response.text().await?;
        self.trace(format!("Response {}: {}", status, body));

        ServerMessage::from_json(&body)
            .with_context(|| format!("unexpected response ({}): {}", status, body))
    }

    /// Saved conversation, or `None` if the server does not know it.
    pub async fn conversation(&self, conversation_id: &str) -> anyhow::Result<Option<Conversation>> {
        let url = self.url(&format!("/conversations/{}", conversation_id));
        self.trace(format!("GET {}", url));

        let response = self.http.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            bail!("{}: {}", response.status(), response.text().await?);
        }
        Ok(Some(response.json().await?))
    }

    pub async fn list(&self, limit: usize, cursor: Option<&str>) -> anyhow::Result<ConversationPage> {
        let mut request = self
            .http
            .get(self.url("/conversations"))
            .query(&[("limit", limit.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            bail!("{}: {}", response.status(), response.text().await?);
        }
        Ok(response.json().await?)
    }

    pub async fn stop(&self, conversation_id: &str) -> anyhow::Result<ServerMessage> {
        let url = self.url(&format!("/stop/{}", conversation_id));
        self.trace(format!("POST {}", url));
        let body = self.http.post(&url).send().await?.text().await?;
        Ok(ServerMessage::from_json(&body)?)
    }

    /// Session for a conversation: the saved snapshot, when there is one,
    /// caught up with the event log it can trail.
    pub async fn open_session(
        &self,
        conversation_id: &str,
        on_event: &mut impl FnMut(&StreamEvent),
    ) -> anyhow::Result<ClientSession> {
        let mut session = match self.conversation(conversation_id).await? {
            Some(conversation) => {
                ClientSession::new(conversation.id, conversation.snapshot, conversation.last_event_id)
            }
            None => ClientSession::new(conversation_id, Default::default(), 0),
        };
        self.catch_up(&mut session, on_event).await?;
        Ok(session)
    }

    /// Applies every logged event past the session's cursor and adopts the
    /// server's status.
    pub async fn catch_up(
        &self,
        session: &mut ClientSession,
        on_event: &mut impl FnMut(&StreamEvent),
    ) -> anyhow::Result<()> {
        let reply = self.send(&session.sync()).await?;
        apply_frame(session, reply, on_event)?;
        Ok(())
    }

    /// Streams the conversation's events into `session` until its request
    /// settles.
    ///
    /// Reconnects with the session's cursor after transport errors and
    /// event gaps. Malformed frames are reported and skipped.
    pub async fn follow(
        &self,
        session: &mut ClientSession,
        renderer: &mut Renderer,
    ) -> anyhow::Result<ChatStatus> {
        let mut failures = 0u32;

        loop {
            let url = self.url(&format!(
                "/events/{}?lastEventId={}",
                session.conversation_id(),
                session.last_event_id()
            ));
            self.trace(format!("Connecting SSE: {}", url));

            let client = es::ClientBuilder::for_url(&url)?
                .reconnect(es::ReconnectOptions::reconnect(false).build())
                .build();
            let mut stream = client.stream();

            while let Some(item) = stream.next().await {
                match item {
                    Ok(es::SSE::Event(event)) => {
                        failures = 0;
                        self.trace(format!("Frame: {}", event.data));

                        let frame = match ServerMessage::from_json(&event.data) {
                            Ok(frame) => frame,
                            Err(error) => {
                                renderer.protocol_error(&error);
                                continue;
                            }
                        };

                        let applied = apply_frame(session, frame, &mut |event| renderer.event(event));
                        match applied {
                            Ok(()) => {}
                            Err(error @ ProtocolError::EventGap { .. }) => {
                                self.trace(format!("{}; resyncing", error));
                                break;
                            }
                            Err(error) => renderer.protocol_error(&error),
                        }

                        if !session.status().is_running() {
                            return Ok(session.status());
                        }
                    }
                    Ok(es::SSE::Comment(comment)) => {
                        self.trace(format!("SSE comment: {}", comment));
                    }
                    Err(error) => {
                        renderer.transport_error(&format!("{:?}", error));
                        break;
                    }
                }
            }

            failures += 1;
            if failures > MAX_RECONNECTS {
                bail!("lost the event stream after {} attempts", MAX_RECONNECTS);
            }
            tokio::time::sleep(Duration::from_millis(250 * u64::from(failures))).await;
        }
    }
}

/// Applies a server frame, reporting each newly applied event.
///
/// Replayed events are applied one at a time so the ones before a gap are
/// reported too.
pub fn apply_frame(
    session: &mut ClientSession,
    frame: ServerMessage,
    on_event: &mut impl FnMut(&StreamEvent),
) -> Result<(), ProtocolError> {
    match frame {
        ServerMessage::SyncResponse {
            status,
            request_id,
            events,
        } => {
            for envelope in events {
                apply_event(session, ServerMessage::ChatEvent(envelope), on_event)?;
            }
            session.handle(ServerMessage::SyncResponse {
                status,
                request_id,
                events: Vec::new(),
            })?;
        }
        frame @ ServerMessage::ChatEvent(_) => apply_event(session, frame, on_event)?,
        other => {
            session.handle(other)?;
        }
    }
    Ok(())
}

fn apply_event(
    session: &mut ClientSession,
    frame: ServerMessage,
    on_event: &mut impl FnMut(&StreamEvent),
) -> Result<(), ProtocolError> {
    let ServerMessage::ChatEvent(envelope) = &frame else {
        return Ok(());
    };
    let fresh = envelope.event_id > session.last_event_id();
    let event = envelope.event.clone();

    session.handle(frame)?;
    if fresh {
        on_event(&event);
    }
    Ok(())
}
