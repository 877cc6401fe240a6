//! Talking to Home Assistant: service calls and state fetches over the REST
//! API, and live state pushes over the WebSocket API.

use crate::actions::{ServiceCall, ServiceTransport};
use futures_util::{SinkExt, Stream, StreamExt};
use log::*;
use reqwest::{
    Client, ClientBuilder, Method, RequestBuilder, StatusCode,
    header::{AUTHORIZATION, HeaderValue},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use soundbeats_common::{
    snapshot::{EntityState, Snapshot},
    view_model::User,
};
use std::time::Duration;
use thiserror::Error;
use tokio::{
    sync::watch,
    task::{self, JoinHandle},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

const STATE_CHANGED: &str = "state_changed";
const GET_STATES_ID: u64 = 1;
const SUBSCRIBE_ID: u64 = 2;
const WHOAMI_ID: u64 = 3;
const USERS_ID: u64 = 4;

/// Accounts Home Assistant creates for itself, never offered as team owners
const SYSTEM_USER_PREFIXES: [&str; 2] = ["Home Assistant", "Supervisor"];

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Home Assistant answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Invalid Home Assistant URL {0:?}")]
    InvalidUrl(String),
    #[error("The connection was closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}

fn authenticated_request(
    client: &Client,
    method: Method,
    url: &str,
    access_token: &str,
) -> RequestBuilder {
    let request = client.request(method, url);
    match HeaderValue::from_str(&format!("Bearer {access_token}")) {
        Ok(value) => request.header(AUTHORIZATION, value),
        Err(e) => {
            warn!("Access token can't be used as a header: {e}");
            request
        }
    }
}

/// One entry of the `/api/states` list, also used inside WebSocket messages
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StateObject {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl StateObject {
    fn into_entry(self) -> (String, EntityState) {
        (
            self.entity_id,
            EntityState {
                state: self.state,
                attributes: self.attributes,
            },
        )
    }
}

/// Reads a snapshot from a saved `/api/states` response
pub fn snapshot_from_states_json(text: &str) -> Result<Snapshot, TransportError> {
    let states: Vec<StateObject> = serde_json::from_str(text)?;
    Ok(states.into_iter().map(StateObject::into_entry).collect())
}

/// Service calls and state fetches through the REST API
#[derive(Debug, Clone)]
pub struct RestTransport {
    base_url: String,
    access_token: String,
    client: Client,
}

impl RestTransport {
    pub fn new(
        base_url: &str,
        access_token: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = ClientBuilder::new().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn fetch_states(&self) -> Result<Snapshot, TransportError> {
        let url = format!("{}/api/states", self.base_url);
        let response = authenticated_request(&self.client, Method::GET, &url, &self.access_token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }
        let states: Vec<StateObject> = response.json().await?;
        info!("Fetched {} entity states", states.len());
        Ok(states.into_iter().map(StateObject::into_entry).collect())
    }
}

impl ServiceTransport for RestTransport {
    async fn call_service(&self, call: &ServiceCall) -> Result<(), TransportError> {
        let url = format!(
            "{}/api/services/{}/{}",
            self.base_url, call.domain, call.service
        );
        let response = authenticated_request(&self.client, Method::POST, &url, &self.access_token)
            .json(&call.data)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(TransportError::Status { status, body })
        }
    }
}

/// `http(s)://host` becomes `ws(s)://host/api/websocket`
pub fn websocket_url(base_url: &str) -> Result<String, TransportError> {
    let base = base_url.trim_end_matches('/');
    let rest = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(TransportError::InvalidUrl(base_url.to_string()));
    };
    Ok(format!("{rest}/api/websocket"))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutgoingMessage<'a> {
    Auth {
        access_token: &'a str,
    },
    GetStates {
        id: u64,
    },
    SubscribeEvents {
        id: u64,
        event_type: &'a str,
    },
    #[serde(rename = "auth/current_user")]
    CurrentUser {
        id: u64,
    },
    #[serde(rename = "config/auth/list")]
    ListUsers {
        id: u64,
    },
}

impl OutgoingMessage<'_> {
    fn id(&self) -> Option<u64> {
        match self {
            Self::Auth { .. } => None,
            Self::GetStates { id }
            | Self::SubscribeEvents { id, .. }
            | Self::CurrentUser { id }
            | Self::ListUsers { id } => Some(*id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorInfo {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StateChangedData {
    pub entity_id: String,
    pub new_state: Option<StateObject>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IncomingMessage {
    AuthRequired {
        ha_version: Option<String>,
    },
    AuthOk {
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default)]
        message: String,
    },
    Result {
        id: u64,
        success: bool,
        #[serde(default)]
        result: Value,
        error: Option<ErrorInfo>,
    },
    Event {
        id: u64,
        event: Event,
    },
    #[serde(other)]
    Other,
}

/// Applies one `state_changed` event. A missing `new_state` means the entity
/// was removed.
pub fn apply_state_changed(snapshot: &mut Snapshot, change: StateChangedData) {
    match change.new_state {
        Some(state) => {
            let (entity_id, state) = state.into_entry();
            snapshot.insert(entity_id, state);
        }
        None => {
            snapshot.remove(&change.entity_id);
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    name: Option<String>,
    is_active: Option<bool>,
}

/// The users worth offering in a team's user dropdown, from a
/// `config/auth/list` result. Inactive and system accounts are left out.
pub fn users_from_auth_list(result: Value) -> Result<Vec<User>, TransportError> {
    let users: Vec<AuthUser> = serde_json::from_value(result)?;
    Ok(users
        .into_iter()
        .filter(|user| user.is_active != Some(false))
        .map(|user| User {
            id: user.id,
            name: user
                .name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "Unknown User".to_string()),
        })
        .filter(|user| {
            !SYSTEM_USER_PREFIXES
                .iter()
                .any(|prefix| user.name.starts_with(prefix))
        })
        .collect())
}

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn send_message(
    socket: &mut Socket,
    message: &OutgoingMessage<'_>,
) -> Result<(), TransportError> {
    let text = serde_json::to_string(message)?;
    socket.send(Message::Text(text)).await?;
    Ok(())
}

async fn next_message<S>(stream: &mut S) -> Result<IncomingMessage, TransportError>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
            Some(Ok(Message::Close(frame))) => {
                debug!("Home Assistant closed the socket: {frame:?}");
                return Err(TransportError::Closed);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
            None => return Err(TransportError::Closed),
        }
    }
}

/// Sends a command and waits for its result, skipping anything else that
/// arrives first
async fn request(
    socket: &mut Socket,
    message: &OutgoingMessage<'_>,
) -> Result<Value, TransportError> {
    let Some(id) = message.id() else {
        return Err(TransportError::Protocol(format!(
            "{message:?} does not get a result"
        )));
    };
    send_message(socket, message).await?;
    loop {
        match next_message(socket).await? {
            IncomingMessage::Result {
                id: answered,
                success,
                result,
                error,
            } if answered == id => {
                if success {
                    return Ok(result);
                }
                let message = error.map(|e| e.message).unwrap_or_default();
                return Err(TransportError::Protocol(format!(
                    "Request {id} failed: {message}"
                )));
            }
            other => trace!("Ignoring {other:?} while waiting for result {id}"),
        }
    }
}

/// A live view of every entity's state. The task feeding it stops when the
/// subscription is dropped or [`unsubscribe`](Self::unsubscribe)d.
#[derive(Debug)]
pub struct SnapshotSubscription {
    rx: watch::Receiver<Snapshot>,
    join: Option<JoinHandle<()>>,
    current_user: Option<String>,
    users: Vec<User>,
}

impl SnapshotSubscription {
    /// Authenticates, fetches the initial states and the user list, then
    /// subscribes to changes
    pub async fn connect(base_url: &str, access_token: &str) -> Result<Self, TransportError> {
        let url = websocket_url(base_url)?;
        info!("Connecting to {url}");
        let (mut socket, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;

        match next_message(&mut socket).await? {
            IncomingMessage::AuthRequired { ha_version } => {
                debug!(
                    "Home Assistant {} wants authentication",
                    ha_version.unwrap_or_default()
                )
            }
            other => {
                return Err(TransportError::Protocol(format!(
                    "Expected auth_required, got {other:?}"
                )));
            }
        }
        send_message(&mut socket, &OutgoingMessage::Auth { access_token }).await?;
        match next_message(&mut socket).await? {
            IncomingMessage::AuthOk { .. } => info!("Authenticated with Home Assistant"),
            IncomingMessage::AuthInvalid { message } => {
                return Err(TransportError::AuthRejected(message));
            }
            other => {
                return Err(TransportError::Protocol(format!(
                    "Expected auth result, got {other:?}"
                )));
            }
        }

        let get_states = OutgoingMessage::GetStates { id: GET_STATES_ID };
        let states = request(&mut socket, &get_states).await?;
        let states: Vec<StateObject> = serde_json::from_value(states)?;
        let snapshot: Snapshot = states.into_iter().map(StateObject::into_entry).collect();
        info!("Received {} entity states", snapshot.len());

        let whoami = OutgoingMessage::CurrentUser { id: WHOAMI_ID };
        let current_user = request(&mut socket, &whoami)
            .await?
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string);
        debug!("Signed in as {current_user:?}");

        // Only administrators may list users
        let list_users = OutgoingMessage::ListUsers { id: USERS_ID };
        let users = match request(&mut socket, &list_users).await {
            Ok(result) => users_from_auth_list(result)?,
            Err(TransportError::Protocol(e)) => {
                warn!("Could not fetch Home Assistant users: {e}");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        send_message(
            &mut socket,
            &OutgoingMessage::SubscribeEvents {
                id: SUBSCRIBE_ID,
                event_type: STATE_CHANGED,
            },
        )
        .await?;

        let (tx, rx) = watch::channel(snapshot);
        let join = task::spawn(async move {
            match event_loop(socket, tx).await {
                Ok(()) => info!("Snapshot subscription ended"),
                Err(e) => error!("Snapshot subscription failed: {e}"),
            }
        });

        Ok(Self {
            rx,
            join: Some(join),
            current_user,
            users,
        })
    }

    pub fn current(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    /// The id of the user the access token belongs to
    pub fn current_user(&self) -> Option<&str> {
        self.current_user.as_deref()
    }

    /// Users a team can be assigned to. Empty unless the token belongs to an
    /// administrator.
    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Another handle on the pushed snapshots. It reports the channel closed
    /// once the subscription ends.
    pub fn receiver(&self) -> watch::Receiver<Snapshot> {
        self.rx.clone()
    }

    /// Waits for the next pushed snapshot
    pub async fn changed(&mut self) -> Result<Snapshot, TransportError> {
        self.rx.changed().await.map_err(|_| TransportError::Closed)?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Stops the feeding task and waits for it to finish, closing the socket
    pub async fn unsubscribe(mut self) {
        debug!("Unsubscribing from state changes");
        let Some(join) = self.join.take() else {
            return;
        };
        join.abort();
        match join.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => trace!("Snapshot task stopped"),
            Err(e) => error!("Snapshot task failed: {e}"),
        }
    }
}

impl Drop for SnapshotSubscription {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

async fn event_loop(socket: Socket, tx: watch::Sender<Snapshot>) -> Result<(), TransportError> {
    let (_write, mut read) = socket.split();
    loop {
        match next_message(&mut read).await? {
            IncomingMessage::Event {
                id: SUBSCRIBE_ID,
                event,
            } if event.event_type == STATE_CHANGED => {
                let change: StateChangedData = serde_json::from_value(event.data)?;
                trace!("State of {} changed", change.entity_id);
                tx.send_modify(|snapshot| apply_state_changed(snapshot, change));
                if tx.is_closed() {
                    return Ok(());
                }
            }
            IncomingMessage::Result {
                id: SUBSCRIBE_ID,
                success: false,
                error,
                ..
            } => {
                let message = error.map(|e| e.message).unwrap_or_default();
                return Err(TransportError::Protocol(format!(
                    "subscribe_events failed: {message}"
                )));
            }
            other => trace!("Ignoring {other:?}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use tokio::{net::TcpListener, sync::oneshot, time::timeout};

    type ServerSocket = WebSocketStream<tokio::net::TcpStream>;

    /// Sends unless the client has already hung up
    async fn send_json(socket: &mut ServerSocket, value: Value) {
        if let Err(e) = socket.send(Message::Text(value.to_string())).await {
            debug!("Client went away: {e}");
        }
    }

    async fn receive_json(socket: &mut ServerSocket) -> Value {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => {}
                other => panic!("Expected a message, got {other:?}"),
            }
        }
    }

    /// Plays the Home Assistant side of one connection, then reports when the
    /// client goes away
    async fn serve_once(listener: TcpListener, closed: oneshot::Sender<()>) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();

        send_json(
            &mut socket,
            json!({"type": "auth_required", "ha_version": "2024.6.0"}),
        )
        .await;
        let auth = receive_json(&mut socket).await;
        assert_eq!(auth, json!({"type": "auth", "access_token": "secret"}));
        send_json(
            &mut socket,
            json!({"type": "auth_ok", "ha_version": "2024.6.0"}),
        )
        .await;

        loop {
            let request = receive_json(&mut socket).await;
            let id = request["id"].clone();
            let result = match request["type"].as_str() {
                Some("get_states") => json!([
                    {"entity_id": "sensor.soundbeats_team_1", "state": "Team 1"}
                ]),
                Some("auth/current_user") => json!({"id": "user-a", "name": "Alice"}),
                Some("config/auth/list") => json!([
                    {"id": "user-a", "name": "Alice", "is_active": true},
                    {"id": "user-b", "name": "Bob", "is_active": false},
                    {"id": "user-c", "name": "Home Assistant Content", "is_active": true},
                    {"id": "user-d", "name": null}
                ]),
                Some("subscribe_events") => Value::Null,
                other => panic!("Unexpected request {other:?}"),
            };
            send_json(
                &mut socket,
                json!({"id": id, "type": "result", "success": true, "result": result}),
            )
            .await;
            if request["type"] == "subscribe_events" {
                break;
            }
        }

        send_json(
            &mut socket,
            json!({
                "id": SUBSCRIBE_ID,
                "type": "event",
                "event": {
                    "event_type": "state_changed",
                    "data": {
                        "entity_id": "sensor.soundbeats_team_1",
                        "new_state": {
                            "entity_id": "sensor.soundbeats_team_1",
                            "state": "Rockers"
                        }
                    }
                }
            }),
        )
        .await;

        loop {
            match socket.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
        closed.send(()).unwrap();
    }

    #[tokio::test]
    async fn test_subscription_until_unsubscribed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (closed_tx, closed_rx) = oneshot::channel();
        let server = tokio::spawn(serve_once(listener, closed_tx));

        let mut subscription = SnapshotSubscription::connect(&base_url, "secret")
            .await
            .unwrap();
        assert_eq!(subscription.current_user(), Some("user-a"));
        assert_eq!(
            subscription.users(),
            [
                User {
                    id: "user-a".to_string(),
                    name: "Alice".to_string()
                },
                User {
                    id: "user-d".to_string(),
                    name: "Unknown User".to_string()
                }
            ]
        );
        assert_eq!(
            subscription.current().get("sensor.soundbeats_team_1").unwrap().state,
            "Team 1"
        );

        let snapshot = timeout(Duration::from_secs(5), subscription.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            snapshot.get("sensor.soundbeats_team_1").unwrap().state,
            "Rockers"
        );

        let mut receiver = subscription.receiver();
        subscription.unsubscribe().await;
        assert!(receiver.changed().await.is_err());
        timeout(Duration::from_secs(5), closed_rx)
            .await
            .unwrap()
            .unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_subscription_closes_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (closed_tx, closed_rx) = oneshot::channel();
        let server = tokio::spawn(serve_once(listener, closed_tx));

        let subscription = SnapshotSubscription::connect(&base_url, "secret")
            .await
            .unwrap();
        let mut receiver = subscription.receiver();
        drop(subscription);

        timeout(Duration::from_secs(5), closed_rx)
            .await
            .unwrap()
            .unwrap();
        server.await.unwrap();
        while receiver.changed().await.is_ok() {}
    }

    #[test]
    fn test_users_from_auth_list() {
        let users = users_from_auth_list(json!([
            {"id": "1", "name": "Supervisor", "is_active": true},
            {"id": "2", "name": "Sam", "is_active": true},
            {"id": "3", "name": "", "is_active": null}
        ]))
        .unwrap();
        let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["Sam", "Unknown User"]);
        assert!(users_from_auth_list(json!({"id": "1"})).is_err());
    }

    #[test]
    fn test_websocket_url() {
        assert_eq!(
            websocket_url("http://homeassistant.local:8123/").unwrap(),
            "ws://homeassistant.local:8123/api/websocket"
        );
        assert_eq!(
            websocket_url("https://ha.example.com").unwrap(),
            "wss://ha.example.com/api/websocket"
        );
        assert!(matches!(
            websocket_url("homeassistant.local"),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_outgoing_messages() {
        let auth = serde_json::to_value(OutgoingMessage::Auth {
            access_token: "abc",
        })
        .unwrap();
        assert_eq!(auth, json!({"type": "auth", "access_token": "abc"}));

        let subscribe = serde_json::to_value(OutgoingMessage::SubscribeEvents {
            id: 2,
            event_type: STATE_CHANGED,
        })
        .unwrap();
        assert_eq!(
            subscribe,
            json!({"type": "subscribe_events", "id": 2, "event_type": "state_changed"})
        );
    }

    #[test]
    fn test_incoming_messages() {
        let message: IncomingMessage =
            serde_json::from_str(r#"{"type": "auth_required", "ha_version": "2024.6.0"}"#).unwrap();
        assert_eq!(
            message,
            IncomingMessage::AuthRequired {
                ha_version: Some("2024.6.0".to_string())
            }
        );

        let message: IncomingMessage =
            serde_json::from_str(r#"{"type": "auth_invalid", "message": "Invalid password"}"#)
                .unwrap();
        assert_eq!(
            message,
            IncomingMessage::AuthInvalid {
                message: "Invalid password".to_string()
            }
        );

        let message: IncomingMessage =
            serde_json::from_str(r#"{"type": "pong", "id": 9}"#).unwrap();
        assert_eq!(message, IncomingMessage::Other);
    }

    #[test]
    fn test_state_changed_events() {
        let mut snapshot = Snapshot::new().with_entity(
            "sensor.soundbeats_team_1",
            EntityState::new("Team 1").with_attribute("points", 0),
        );

        let message: IncomingMessage = serde_json::from_value(json!({
            "id": 2,
            "type": "event",
            "event": {
                "event_type": "state_changed",
                "data": {
                    "entity_id": "sensor.soundbeats_team_1",
                    "old_state": null,
                    "new_state": {
                        "entity_id": "sensor.soundbeats_team_1",
                        "state": "Rockers",
                        "attributes": {"points": 20},
                        "last_changed": "2024-06-01T12:00:00+00:00"
                    }
                }
            }
        }))
        .unwrap();
        let IncomingMessage::Event { event, .. } = message else {
            panic!("Expected an event, got {message:?}");
        };
        let change: StateChangedData = serde_json::from_value(event.data).unwrap();
        apply_state_changed(&mut snapshot, change);
        let team = snapshot.get("sensor.soundbeats_team_1").unwrap();
        assert_eq!(team.state, "Rockers");
        assert_eq!(team.attr_i64("points"), Some(20));

        apply_state_changed(
            &mut snapshot,
            StateChangedData {
                entity_id: "sensor.soundbeats_team_1".to_string(),
                new_state: None,
            },
        );
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_states_list_to_snapshot() {
        let text = json!([
            {
                "entity_id": "media_player.den",
                "state": "idle",
                "attributes": {"friendly_name": "Den"}
            },
            {"entity_id": "sensor.soundbeats_round_counter", "state": "3"}
        ])
        .to_string();
        let snapshot = snapshot_from_states_json(&text).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot.get("media_player.den").and_then(|e| e.attr_string("friendly_name")),
            Some("Den".to_string())
        );
    }

    #[test]
    fn test_rest_transport_trims_base_url() {
        let transport =
            RestTransport::new("http://homeassistant.local:8123/", "token", Duration::from_secs(5))
                .unwrap();
        assert_eq!(transport.base_url(), "http://homeassistant.local:8123");
    }
}
