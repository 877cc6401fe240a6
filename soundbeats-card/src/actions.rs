use crate::{home_assistant::TransportError, render::MIN_YEAR};
use log::*;
use serde::Serialize;
use serde_json::{Map, Value, json};
use soundbeats_common::snapshot::parse_i64;
use std::{
    fmt::{self, Display, Formatter},
    future::Future,
};
use thiserror::Error;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::{self, JoinHandle},
};

pub const SOUNDBEATS_DOMAIN: &str = "soundbeats";
pub const MEDIA_PLAYER_DOMAIN: &str = "media_player";

const DISPATCH_CHANNEL_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCommand {
    VolumeUp,
    VolumeDown,
    PlayPause,
}

impl MediaCommand {
    pub fn service(self) -> &'static str {
        match self {
            Self::VolumeUp => "volume_up",
            Self::VolumeDown => "volume_down",
            Self::PlayPause => "media_play_pause",
        }
    }
}

/// Something the user asked for. Each one becomes exactly one service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    StartGame,
    NextSong,
    UpdateTeamName { team_id: String, name: String },
    UpdateTeamPoints { team_id: String, points: i64 },
    UpdateTeamParticipating {
        team_id: String,
        participating: bool,
    },
    UpdateTeamYearGuess { team_id: String, year_guess: i64 },
    UpdateTeamBetting { team_id: String, betting: bool },
    /// `None` clears the assignment
    UpdateTeamUser {
        team_id: String,
        user_id: Option<String>,
    },
    UpdateTimerLength { timer_length: i64 },
    UpdateAudioPlayer { audio_player: String },
    UpdateTeamCount { team_count: i64 },
    Media {
        command: MediaCommand,
        entity_id: String,
    },
}

impl UserAction {
    /// `None` if the trimmed name is empty
    pub fn team_name(team_id: &str, raw: &str) -> Option<Self> {
        let name = raw.trim();
        if name.is_empty() {
            debug!("Ignoring empty name for {team_id}");
            return None;
        }
        Some(Self::UpdateTeamName {
            team_id: team_id.to_string(),
            name: name.to_string(),
        })
    }

    pub fn team_points(team_id: &str, raw: &str) -> Option<Self> {
        let points = parse_int(raw)?;
        Some(Self::UpdateTeamPoints {
            team_id: team_id.to_string(),
            points,
        })
    }

    /// A year typed into the guess field. Only complete four digit years within
    /// `MIN_YEAR..=max_year` are sent.
    pub fn typed_year_guess(team_id: &str, raw: &str, max_year: i64) -> Option<Self> {
        let raw = raw.trim();
        if raw.len() != 4 || !raw.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let year_guess = raw.parse().ok()?;
        (MIN_YEAR..=max_year)
            .contains(&year_guess)
            .then(|| Self::UpdateTeamYearGuess {
                team_id: team_id.to_string(),
                year_guess,
            })
    }

    /// The empty option of the user dropdown unassigns the team
    pub fn team_user(team_id: &str, raw: &str) -> Self {
        let user_id = raw.trim();
        Self::UpdateTeamUser {
            team_id: team_id.to_string(),
            user_id: (!user_id.is_empty()).then(|| user_id.to_string()),
        }
    }

    pub fn timer_length(raw: &str) -> Option<Self> {
        Some(Self::UpdateTimerLength {
            timer_length: parse_int(raw)?,
        })
    }

    pub fn team_count(raw: &str) -> Option<Self> {
        Some(Self::UpdateTeamCount {
            team_count: parse_int(raw)?,
        })
    }

    pub fn audio_player(raw: &str) -> Option<Self> {
        let audio_player = raw.trim();
        (!audio_player.is_empty()).then(|| Self::UpdateAudioPlayer {
            audio_player: audio_player.to_string(),
        })
    }

    /// Media commands need a player to target
    pub fn media(command: MediaCommand, selected_player: Option<&str>) -> Option<Self> {
        match selected_player {
            Some(entity_id) => Some(Self::Media {
                command,
                entity_id: entity_id.to_string(),
            }),
            None => {
                warn!("No audio player selected, ignoring {}", command.service());
                None
            }
        }
    }

    pub fn service_call(&self) -> ServiceCall {
        let (service, data) = match self {
            Self::StartGame => ("start_game", json!({})),
            Self::NextSong => ("next_song", json!({})),
            Self::UpdateTeamName { team_id, name } => (
                "update_team_name",
                json!({ "team_id": team_id, "name": name }),
            ),
            Self::UpdateTeamPoints { team_id, points } => (
                "update_team_points",
                json!({ "team_id": team_id, "points": points }),
            ),
            Self::UpdateTeamParticipating {
                team_id,
                participating,
            } => (
                "update_team_participating",
                json!({ "team_id": team_id, "participating": participating }),
            ),
            Self::UpdateTeamYearGuess {
                team_id,
                year_guess,
            } => (
                "update_team_year_guess",
                json!({ "team_id": team_id, "year_guess": year_guess }),
            ),
            Self::UpdateTeamBetting { team_id, betting } => (
                "update_team_betting",
                json!({ "team_id": team_id, "betting": betting }),
            ),
            Self::UpdateTeamUser { team_id, user_id } => (
                "update_team_user_id",
                json!({ "team_id": team_id, "user_id": user_id }),
            ),
            Self::UpdateTimerLength { timer_length } => (
                "update_countdown_timer_length",
                json!({ "timer_length": timer_length }),
            ),
            Self::UpdateAudioPlayer { audio_player } => (
                "update_audio_player",
                json!({ "audio_player": audio_player }),
            ),
            Self::UpdateTeamCount { team_count } => {
                ("update_team_count", json!({ "team_count": team_count }))
            }
            Self::Media { command, entity_id } => {
                return ServiceCall::new(
                    MEDIA_PLAYER_DOMAIN,
                    command.service(),
                    json!({ "entity_id": entity_id }),
                );
            }
        };
        ServiceCall::new(SOUNDBEATS_DOMAIN, service, data)
    }
}

fn parse_int(raw: &str) -> Option<i64> {
    let parsed = parse_i64(raw);
    if parsed.is_none() {
        debug!("Ignoring non-numeric input {raw:?}");
    }
    parsed
}

/// A call to a Home Assistant service with a flat payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub data: Map<String, Value>,
}

impl ServiceCall {
    pub fn new(domain: &str, service: &str, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            domain: domain.to_string(),
            service: service.to_string(),
            data,
        }
    }
}

impl Display for ServiceCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.service)
    }
}

/// Something that can deliver service calls to the host
pub trait ServiceTransport: Send + Sync + 'static {
    fn call_service(
        &self,
        call: &ServiceCall,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("The dispatch queue is full")]
    QueueFull,
    #[error("The dispatcher has stopped")]
    Stopped,
}

#[derive(Debug)]
enum DispatcherMessage {
    Call(ServiceCall),
    Stop,
}

/// Sends service calls in the background. Callers never wait on the result:
/// failures are logged and the next snapshot shows whatever actually happened.
#[derive(Debug)]
pub struct ActionDispatcher {
    tx: mpsc::Sender<DispatcherMessage>,
    worker_join: Option<JoinHandle<()>>,
}

impl ActionDispatcher {
    /// Must be called from within a tokio runtime
    pub fn new<T: ServiceTransport>(transport: T) -> Self {
        let (tx, rx) = mpsc::channel(DISPATCH_CHANNEL_LEN);
        let worker_join = task::spawn(run_loop(rx, transport));
        Self {
            tx,
            worker_join: Some(worker_join),
        }
    }

    pub fn dispatch(&self, action: &UserAction) -> Result<(), DispatchError> {
        let call = action.service_call();
        debug!("Dispatching {call}");
        self.tx
            .try_send(DispatcherMessage::Call(call))
            .map_err(|e| match e {
                TrySendError::Full(_) => DispatchError::QueueFull,
                TrySendError::Closed(_) => DispatchError::Stopped,
            })
    }

    /// Lets queued calls finish, then stops the worker
    pub async fn shutdown(mut self) {
        if self.tx.send(DispatcherMessage::Stop).await.is_err() {
            warn!("Dispatcher worker already stopped");
        }
        if let Some(join) = self.worker_join.take() {
            if let Err(e) = join.await {
                error!("Dispatcher worker failed: {e}");
            }
        }
    }
}

impl Drop for ActionDispatcher {
    fn drop(&mut self) {
        if let Some(join) = self.worker_join.take() {
            if self.tx.try_send(DispatcherMessage::Stop).is_err() {
                join.abort();
            }
        }
    }
}

async fn run_loop<T: ServiceTransport>(mut rx: mpsc::Receiver<DispatcherMessage>, transport: T) {
    while let Some(msg) = rx.recv().await {
        match msg {
            DispatcherMessage::Call(call) => match transport.call_service(&call).await {
                Ok(()) => trace!("Service call {call} sent"),
                Err(e) => error!("Service call {call} failed: {e}"),
            },
            DispatcherMessage::Stop => break,
        }
    }
    debug!("Dispatcher worker stopped");
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingTransport {
        calls: Arc<Mutex<Vec<ServiceCall>>>,
        fail: bool,
    }

    impl ServiceTransport for RecordingTransport {
        async fn call_service(&self, call: &ServiceCall) -> Result<(), TransportError> {
            self.calls.lock().unwrap().push(call.clone());
            if self.fail {
                Err(TransportError::Protocol("refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_service_payloads() {
        let call = UserAction::team_name("team_2", "  The Beats ")
            .unwrap()
            .service_call();
        assert_eq!(call.domain, "soundbeats");
        assert_eq!(call.service, "update_team_name");
        assert_eq!(
            Value::Object(call.data),
            json!({"team_id": "team_2", "name": "The Beats"})
        );

        let call = UserAction::team_points("team_1", "15").unwrap().service_call();
        assert_eq!(
            Value::Object(call.data),
            json!({"team_id": "team_1", "points": 15})
        );

        let call = UserAction::timer_length("45").unwrap().service_call();
        assert_eq!(call.service, "update_countdown_timer_length");
        assert_eq!(Value::Object(call.data), json!({"timer_length": 45}));

        let call = UserAction::StartGame.service_call();
        assert_eq!(call.to_string(), "soundbeats.start_game");
        assert!(call.data.is_empty());

        let call = UserAction::media(MediaCommand::PlayPause, Some("media_player.den"))
            .unwrap()
            .service_call();
        assert_eq!(call.to_string(), "media_player.media_play_pause");
        assert_eq!(
            Value::Object(call.data),
            json!({"entity_id": "media_player.den"})
        );
    }

    #[test]
    fn test_team_user_payloads() {
        let call = UserAction::team_user("team_3", "8f2c").service_call();
        assert_eq!(call.to_string(), "soundbeats.update_team_user_id");
        assert_eq!(
            Value::Object(call.data),
            json!({"team_id": "team_3", "user_id": "8f2c"})
        );

        let call = UserAction::team_user("team_3", "").service_call();
        assert_eq!(
            Value::Object(call.data),
            json!({"team_id": "team_3", "user_id": null})
        );
    }

    #[test]
    fn test_input_guards() {
        assert_eq!(UserAction::team_name("team_1", "   "), None);
        assert_eq!(UserAction::team_points("team_1", "ten"), None);
        assert_eq!(UserAction::team_count(""), None);
        assert_eq!(UserAction::audio_player(""), None);
        assert_eq!(UserAction::media(MediaCommand::VolumeUp, None), None);
        assert_eq!(
            UserAction::team_count("3"),
            Some(UserAction::UpdateTeamCount { team_count: 3 })
        );
    }

    #[test]
    fn test_typed_year_guess() {
        let typed = |raw| UserAction::typed_year_guess("team_1", raw, 2026);
        assert_eq!(
            typed("1984"),
            Some(UserAction::UpdateTeamYearGuess {
                team_id: "team_1".to_string(),
                year_guess: 1984
            })
        );
        assert_eq!(typed("198"), None);
        assert_eq!(typed("19845"), None);
        assert_eq!(typed("1949"), None);
        assert_eq!(typed("2027"), None);
        assert_eq!(typed("19a4"), None);
        assert!(typed(" 2026 ").is_some());
    }

    #[tokio::test]
    async fn test_dispatcher_sends_in_order() {
        let transport = RecordingTransport::default();
        let dispatcher = ActionDispatcher::new(transport.clone());

        dispatcher.dispatch(&UserAction::StartGame).unwrap();
        dispatcher
            .dispatch(&UserAction::UpdateTeamBetting {
                team_id: "team_3".to_string(),
                betting: true,
            })
            .unwrap();
        dispatcher.shutdown().await;

        let calls = transport.calls.lock().unwrap();
        let services: Vec<_> = calls.iter().map(|c| c.service.as_str()).collect();
        assert_eq!(services, vec!["start_game", "update_team_betting"]);
    }

    #[tokio::test]
    async fn test_failed_calls_are_dropped() {
        let transport = RecordingTransport {
            fail: true,
            ..Default::default()
        };
        let dispatcher = ActionDispatcher::new(transport.clone());

        dispatcher.dispatch(&UserAction::NextSong).unwrap();
        dispatcher.dispatch(&UserAction::NextSong).unwrap();
        dispatcher.shutdown().await;

        assert_eq!(transport.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_after_worker_stopped() {
        let dispatcher = ActionDispatcher::new(RecordingTransport::default());
        dispatcher.tx.send(DispatcherMessage::Stop).await.unwrap();
        while !dispatcher.tx.is_closed() {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            dispatcher.dispatch(&UserAction::StartGame),
            Err(DispatchError::Stopped)
        );
    }
}
