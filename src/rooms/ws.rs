use std::{sync::Arc, time::Duration};

use axum::{
    debug_handler,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    AppResult, Config, res,
    backend::{Auth, Backend, SqliteBackend},
    gate::{SessionGate, Transition},
    intents::{Attachment, Composer, Intents, SendOutcome},
    models::{MessageId, TypingIndicator, User},
    session::ACCESS_TOKEN,
    sync::{RoomState, RoomSync, TypingLease},
};

use super::msg;

#[derive(Debug, Deserialize)]
pub(crate) struct FilePayload {
    name: String,
    /// base64, no data-URL prefix
    data: String,
}

/// Browser to server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ClientIntent {
    Send {
        content: String,
        #[serde(default)]
        file: Option<FilePayload>,
    },
    Edit {
        id: MessageId,
        content: String,
    },
    Delete {
        id: MessageId,
    },
    Typing,
}

/// Server to browser.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ServerEvent {
    Messages { html: String },
    Typing { text: String },
    Sent,
    SendFailed,
    Navigate { to: String },
}

/// Where the chat view writes its events; the sending half of the socket.
trait EventSink: Sink<WsMessage, Error = axum::Error> + Unpin {}

impl<S: Sink<WsMessage, Error = axum::Error> + Unpin> EventSink for S {}

async fn emit(sender: &mut impl EventSink, event: &ServerEvent) -> anyhow::Result<()> {
    let json = serde_json::to_string(event)?;
    sender.send(WsMessage::Text(json.into())).await?;
    Ok(())
}

async fn emit_state(
    sender: &mut impl EventSink,
    state: &RoomState,
    me: Uuid,
) -> anyhow::Result<()> {
    emit(sender, &ServerEvent::Messages { html: msg::messages_html(state, me) }).await?;
    emit(sender, &ServerEvent::Typing { text: msg::typing_line(state, me) }).await
}

fn to_login() -> ServerEvent {
    ServerEvent::Navigate { to: "/login".to_owned() }
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room_ws(
    Path(room_id): Path<Uuid>,
    State(backend): State<Arc<SqliteBackend>>,
    State(config): State<Arc<Config>>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let Some(access_token) = session.get::<String>(ACCESS_TOKEN).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };
    if backend.select_room(room_id).await?.is_none() {
        return res::sorry("room");
    }

    Ok(ws.on_upgrade(async move |socket: WebSocket| {
        let (sender, receiver) = socket.split();
        let view = ChatView {
            data: backend.clone(),
            auth: backend,
            typing_lease: config.typing_lease,
            room_id,
            access_token,
        };
        if let Err(err) = view.run(sender, receiver).await {
            warn!(%room_id, "chat view closed with error: {err:#}");
        }
    }))
}

/// One mounted chat view: lives exactly as long as the socket.
struct ChatView {
    data: Arc<dyn Backend>,
    auth: Arc<dyn Auth>,
    typing_lease: Duration,
    room_id: Uuid,
    access_token: String,
}

impl ChatView {
    async fn run<R>(self, mut sender: impl EventSink, mut receiver: R) -> anyhow::Result<()>
    where
        R: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
    {
        let Self { data, auth, typing_lease, room_id, access_token } = self;

        let mut gate = SessionGate::mount(&*auth, &access_token).await?;
        let Transition::SignedIn(user) = gate.observe_current() else {
            return emit(&mut sender, &to_login()).await;
        };

        let mut sync = RoomSync::new(data.clone(), room_id);
        let mut state_rx = sync.watch();
        sync.subscribe();
        sync.initialize().await;

        let intents = Intents::new(data.clone(), auth, access_token);
        let typing = TypingLease::new(data, typing_lease);
        info!(%room_id, user_id = %user.id, "chat view mounted");

        let state = state_rx.borrow_and_update().clone();
        emit_state(&mut sender, &state, user.id).await?;

        let result = loop {
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                    let state = state_rx.borrow_and_update().clone();
                    if let Err(err) = emit_state(&mut sender, &state, user.id).await {
                        break Err(err);
                    }
                }
                transition = gate.changed() => match transition {
                    Some(Transition::SignedOut) | None => {
                        debug!(%room_id, "session ended, leaving room");
                        break emit(&mut sender, &to_login()).await;
                    }
                    Some(_) => {}
                },
                incoming = receiver.next() => match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        let Ok(intent) = serde_json::from_str::<ClientIntent>(text.as_str()) else {
                            warn!(%room_id, "ignoring malformed intent");
                            continue;
                        };
                        let handled = handle_intent(
                            intent, &mut sender, &intents, &typing, &user, room_id,
                        )
                        .await;
                        if let Err(err) = handled {
                            break Err(err);
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break Err(err.into()),
                },
            }
        };

        sync.teardown();
        gate.unmount();
        info!(%room_id, user_id = %user.id, "chat view unmounted");
        result
    }
}

async fn handle_intent(
    intent: ClientIntent,
    sender: &mut impl EventSink,
    intents: &Intents,
    typing: &TypingLease,
    user: &User,
    room_id: Uuid,
) -> anyhow::Result<()> {
    match intent {
        ClientIntent::Send { content, file } => {
            let attachment = match file {
                Some(FilePayload { name, data }) => match STANDARD.decode(data.as_bytes()) {
                    Ok(bytes) => Some(Attachment { file_name: name, bytes }),
                    Err(err) => {
                        warn!(%room_id, "undecodable attachment: {err}");
                        return emit(sender, &ServerEvent::SendFailed).await;
                    }
                },
                None => None,
            };

            let mut composer = Composer { draft: content, attachment };
            match intents.send(room_id, &mut composer).await {
                SendOutcome::Sent(_) => emit(sender, &ServerEvent::Sent).await?,
                SendOutcome::Failed => emit(sender, &ServerEvent::SendFailed).await?,
                SendOutcome::Skipped => {}
            }
        }
        ClientIntent::Edit { id, content } => {
            intents.edit(id, &content).await;
        }
        ClientIntent::Delete { id } => {
            intents.delete(id).await;
        }
        ClientIntent::Typing => {
            typing.set_typing(TypingIndicator { user_id: user.id, room_id }).await;
        }
    }
    Ok(())
}
