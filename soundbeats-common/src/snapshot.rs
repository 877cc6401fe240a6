use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const GAME_STATUS: &str = "sensor.soundbeats_game_status";
pub const GAME_MODE: &str = "sensor.soundbeats_game_mode";
pub const ROUND_COUNTER: &str = "sensor.soundbeats_round_counter";
pub const COUNTDOWN_TIMER: &str = "sensor.soundbeats_countdown_timer";
pub const COUNTDOWN_CURRENT: &str = "sensor.soundbeats_countdown_current";
pub const CURRENT_SONG: &str = "sensor.soundbeats_current_song";
/// Best average points per round across finished games
pub const HIGHSCORE: &str = "sensor.soundbeats_highscore";

pub const MEDIA_PLAYER_DOMAIN: &str = "media_player";

/// State string used by the song sensor when no audio player is selected
pub const NO_PLAYER_STATE: &str = "None";
pub const UNAVAILABLE_STATE: &str = "unavailable";

pub fn team_entity_id(number: usize) -> String {
    format!("sensor.soundbeats_team_{number}")
}

/// One entity as reported by the host: a state string plus free-form attributes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityState {
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl EntityState {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// `null` is treated the same as a missing attribute
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|v| !v.is_null())
    }

    pub fn attr_i64(&self, key: &str) -> Option<i64> {
        self.attr(key).and_then(value_to_i64)
    }

    pub fn attr_bool(&self, key: &str) -> Option<bool> {
        self.attr(key).and_then(value_to_bool)
    }

    /// Strings are returned as-is, numbers are formatted. Empty strings count as missing.
    pub fn attr_string(&self, key: &str) -> Option<String> {
        match self.attr(key)? {
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn state_i64(&self) -> Option<i64> {
        parse_i64(&self.state)
    }
}

/// Parses the leading integer of a value, the way the host's own frontend does.
/// Floats are truncated, anything else is `None`.
pub fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => parse_i64(s),
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

pub fn parse_i64(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Some(i);
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| f.trunc() as i64)
}

pub fn value_to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" => Some(true),
            "false" | "off" | "no" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// The full set of entities pushed by the host on every update. A new snapshot
/// always replaces the previous one entirely.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entities: BTreeMap<String, EntityState>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity_id: &str) -> Option<&EntityState> {
        self.entities.get(entity_id)
    }

    pub fn insert(&mut self, entity_id: impl Into<String>, state: EntityState) {
        self.entities.insert(entity_id.into(), state);
    }

    pub fn remove(&mut self, entity_id: &str) -> Option<EntityState> {
        self.entities.remove(entity_id)
    }

    pub fn with_entity(mut self, entity_id: impl Into<String>, state: EntityState) -> Self {
        self.insert(entity_id, state);
        self
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntityState)> {
        self.entities.iter().map(|(id, state)| (id.as_str(), state))
    }

    /// All entities of a domain (the part of the id before the `.`), in id order
    pub fn iter_domain<'a>(
        &'a self,
        domain: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a EntityState)> + 'a {
        self.iter().filter(move |(id, _)| {
            id.split_once('.')
                .is_some_and(|(entity_domain, _)| entity_domain == domain)
        })
    }
}

impl FromIterator<(String, EntityState)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, EntityState)>>(iter: I) -> Self {
        Self {
            entities: iter.into_iter().collect(),
        }
    }
}
