//! Normalised, render-ready projection of a [`Snapshot`].
//!
//! Reading is total: every missing entity or unparsable value resolves to a
//! documented default, so a view model can always be built.

use crate::{
    config::Surface,
    snapshot::{self, EntityState, Snapshot},
};
use log::trace;
use serde::Serialize;
use std::collections::BTreeMap;

pub const TEAM_SLOTS: usize = 5;
pub const DEFAULT_YEAR_GUESS: i64 = 1990;
pub const DEFAULT_TIMER_LENGTH: i64 = 30;
pub const DEFAULT_GAME_STATUS: &str = "ready";
pub const DEFAULT_GAME_MODE: &str = "Classic";
pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

pub const MIN_TIMER_LENGTH: i64 = 5;
pub const MAX_TIMER_LENGTH: i64 = 300;

pub const BET_WIN_POINTS: i64 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub points: i64,
    pub participating: bool,
    pub year_guess: i64,
    pub is_betting: bool,
    pub last_round_was_betting: bool,
    pub last_round_points: i64,
    pub user_id: Option<String>,
}

impl Team {
    /// The record used for a team slot whose entity has not been created yet
    pub fn default_for(number: usize) -> Self {
        Self {
            id: team_id(number),
            name: format!("Team {number}"),
            points: 0,
            participating: true,
            year_guess: DEFAULT_YEAR_GUESS,
            is_betting: false,
            last_round_was_betting: false,
            last_round_points: 0,
            user_id: None,
        }
    }

    fn read(number: usize, entity: Option<&EntityState>) -> Self {
        let default = Self::default_for(number);
        let Some(entity) = entity else {
            return default;
        };

        Self {
            name: if entity.state.trim().is_empty() {
                default.name
            } else {
                entity.state.clone()
            },
            points: entity.attr_i64("points").unwrap_or(default.points),
            participating: entity
                .attr_bool("participating")
                .unwrap_or(default.participating),
            year_guess: entity.attr_i64("year_guess").unwrap_or(default.year_guess),
            is_betting: entity.attr_bool("betting").unwrap_or(default.is_betting),
            last_round_was_betting: entity
                .attr_bool("last_round_betting")
                .unwrap_or(default.last_round_was_betting),
            last_round_points: entity
                .attr_i64("last_round_points")
                .unwrap_or(default.last_round_points),
            user_id: entity.attr_string("user_id"),
            id: default.id,
        }
    }
}

pub fn team_id(number: usize) -> String {
    format!("team_{number}")
}

/// Seconds left on the guessing timer, and the length it started at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Countdown {
    pub current: i64,
    pub total: i64,
}

impl Countdown {
    pub fn is_running(&self) -> bool {
        self.current > 0
    }

    /// Remaining time as a whole percentage of the total, 0 when the total is not positive
    pub fn progress_percent(&self) -> i64 {
        if self.total <= 0 {
            return 0;
        }
        (100.0 * self.current as f64 / self.total as f64).round() as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Song {
    pub title: String,
    pub artist: String,
    pub year: i64,
    pub image_url: String,
    pub source_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioPlayer {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub timer_length: i64,
    pub selected_audio_player: Option<String>,
    pub available_players: Vec<AudioPlayer>,
    /// `None` until a team count has been chosen
    pub team_count: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MissingSetting {
    TeamCount,
    AudioPlayer,
    TimerLength,
}

/// A Home Assistant user that a team can be assigned to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

/// Formats a points figure with at most one decimal, dropping it for whole numbers
pub fn format_points_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewModel {
    pub game_status: String,
    pub player_count: String,
    pub game_mode: String,
    pub round: i64,
    pub teams: Vec<Team>,
    pub countdown: Countdown,
    pub current_song: Option<Song>,
    pub settings: Settings,
    /// Global average points per round, `None` when the sensor is missing or
    /// not a number
    pub highscore: Option<f64>,
}

impl ViewModel {
    /// Builds the view model for `surface` from a snapshot. Never fails.
    pub fn read(snapshot: &Snapshot, surface: Surface) -> Self {
        let status_entity = snapshot.get(snapshot::GAME_STATUS);

        let team_count = status_entity
            .and_then(|e| e.attr_i64("team_count"))
            .filter(|count| (1..=TEAM_SLOTS as i64).contains(count));

        let slots = match surface {
            Surface::Card => TEAM_SLOTS,
            Surface::Panel => team_count.map_or(TEAM_SLOTS, |count| count as usize),
        };

        let teams: Vec<Team> = (1..=slots)
            .map(|number| Team::read(number, snapshot.get(&snapshot::team_entity_id(number))))
            .collect();

        let countdown = read_countdown(snapshot);

        let selected_audio_player = snapshot
            .get(snapshot::CURRENT_SONG)
            .map(|e| e.state.trim())
            .filter(|state| !state.is_empty() && *state != snapshot::NO_PLAYER_STATE)
            .map(str::to_string);

        let current_song = if countdown.is_running() {
            None
        } else {
            read_song(snapshot, selected_audio_player.as_deref())
        };

        let player_count = status_entity
            .and_then(|e| e.attr_string("player_count"))
            .unwrap_or_else(|| teams.iter().filter(|t| t.participating).count().to_string());

        let view = Self {
            game_status: status_entity
                .map(|e| e.state.trim())
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_GAME_STATUS)
                .to_string(),
            player_count,
            game_mode: snapshot
                .get(snapshot::GAME_MODE)
                .map(|e| e.state.trim())
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_GAME_MODE)
                .to_string(),
            round: snapshot
                .get(snapshot::ROUND_COUNTER)
                .and_then(EntityState::state_i64)
                .unwrap_or(0)
                .max(0),
            teams,
            countdown,
            current_song,
            settings: Settings {
                timer_length: countdown.total,
                selected_audio_player,
                available_players: read_players(snapshot),
                team_count,
            },
            highscore: snapshot
                .get(snapshot::HIGHSCORE)
                .and_then(|e| e.state.trim().parse::<f64>().ok())
                .filter(|score| score.is_finite()),
        };
        trace!("Read view model: {view:?}");
        view
    }

    pub fn team(&self, id: &str) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == id)
    }

    pub fn participating_teams(&self) -> impl Iterator<Item = &Team> {
        self.teams.iter().filter(|t| t.participating)
    }

    /// Medal ranks of the participating teams by points. Tied teams share a
    /// rank, and every rank past third is reported as 4.
    pub fn rankings(&self) -> BTreeMap<String, u8> {
        let mut ordered: Vec<&Team> = self.participating_teams().collect();
        ordered.sort_by(|a, b| b.points.cmp(&a.points));

        let mut rankings = BTreeMap::new();
        let mut rank = 1;
        let mut last_points = None;
        for (index, team) in ordered.into_iter().enumerate() {
            if last_points.is_some_and(|points| points != team.points) {
                rank = index + 1;
            }
            rankings.insert(team.id.clone(), rank.min(4) as u8);
            last_points = Some(team.points);
        }
        rankings
    }

    /// Average points per round of the participating teams assigned to
    /// `user_id`. Only known once more than one round has been played.
    pub fn user_average(&self, user_id: &str) -> Option<f64> {
        if self.round <= 1 {
            return None;
        }
        let mut teams = self
            .participating_teams()
            .filter(|t| t.user_id.as_deref() == Some(user_id))
            .peekable();
        teams.peek()?;
        let total: i64 = teams.map(|t| t.points).sum();
        Some(total as f64 / self.round as f64)
    }

    /// Game settings that must still be chosen before a round can be played
    pub fn missing_settings(&self) -> Vec<MissingSetting> {
        let mut missing = Vec::new();
        if self.settings.team_count.is_none() {
            missing.push(MissingSetting::TeamCount);
        }
        if self.settings.selected_audio_player.is_none() {
            missing.push(MissingSetting::AudioPlayer);
        }
        if !(MIN_TIMER_LENGTH..=MAX_TIMER_LENGTH).contains(&self.settings.timer_length) {
            missing.push(MissingSetting::TimerLength);
        }
        missing
    }
}

fn read_countdown(snapshot: &Snapshot) -> Countdown {
    let total = snapshot
        .get(snapshot::COUNTDOWN_TIMER)
        .and_then(EntityState::state_i64)
        .unwrap_or(DEFAULT_TIMER_LENGTH);
    let current = snapshot
        .get(snapshot::COUNTDOWN_CURRENT)
        .and_then(EntityState::state_i64)
        .unwrap_or(0)
        .clamp(0, total.max(0));
    Countdown { current, total }
}

fn read_song(snapshot: &Snapshot, selected_player: Option<&str>) -> Option<Song> {
    let sensor = snapshot.get(snapshot::CURRENT_SONG)?;
    let year = sensor.attr_i64("year")?;

    let player = selected_player.and_then(|id| snapshot.get(id));
    let player_attr = |key: &str| player.and_then(|p| p.attr_string(key));

    Some(Song {
        title: player_attr("media_title").unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        artist: player_attr("media_artist").unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
        year,
        image_url: player_attr("entity_picture")
            .or_else(|| sensor.attr_string("entity_picture"))
            .unwrap_or_default(),
        source_url: sensor.attr_string("url").unwrap_or_default(),
    })
}

fn read_players(snapshot: &Snapshot) -> Vec<AudioPlayer> {
    snapshot
        .iter_domain(snapshot::MEDIA_PLAYER_DOMAIN)
        .filter(|(_, entity)| entity.state != snapshot::UNAVAILABLE_STATE)
        .map(|(id, entity)| AudioPlayer {
            id: id.to_string(),
            name: entity.attr_string("friendly_name").unwrap_or_else(|| {
                id.split_once('.')
                    .map_or(id, |(_, object_id)| object_id)
                    .replace('_', " ")
            }),
        })
        .collect()
}

/// How a team did in the round that just ended. Computed for display only, the
/// backend keeps the authoritative score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    BetWon { guess: i64, year: i64 },
    BetLost { guess: i64, year: i64 },
    Scored { guess: i64, year: i64, points: i64 },
}

impl RoundOutcome {
    pub fn evaluate(team: &Team, song: &Song) -> Self {
        let guess = team.year_guess;
        let year = song.year;
        let difference = (year - guess).abs();

        if team.last_round_was_betting {
            if difference == 0 {
                Self::BetWon { guess, year }
            } else {
                Self::BetLost { guess, year }
            }
        } else {
            let points = match difference {
                0 => 20,
                1..=2 => 10,
                3..=5 => 5,
                _ => 0,
            };
            Self::Scored {
                guess,
                year,
                points,
            }
        }
    }

    pub fn points(&self) -> i64 {
        match self {
            Self::BetWon { .. } => BET_WIN_POINTS,
            Self::BetLost { .. } => 0,
            Self::Scored { points, .. } => *points,
        }
    }

    pub fn guess(&self) -> i64 {
        match self {
            Self::BetWon { guess, .. }
            | Self::BetLost { guess, .. }
            | Self::Scored { guess, .. } => *guess,
        }
    }

    pub fn year(&self) -> i64 {
        match self {
            Self::BetWon { year, .. } | Self::BetLost { year, .. } | Self::Scored { year, .. } => {
                *year
            }
        }
    }

    pub fn was_bet(&self) -> bool {
        matches!(self, Self::BetWon { .. } | Self::BetLost { .. })
    }

    /// Years between the guess and the song's release
    pub fn difference(&self) -> i64 {
        (self.year() - self.guess()).abs()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use more_asserts::*;
    use serde_json::json;

    fn team_entity(name: &str) -> EntityState {
        EntityState::new(name)
    }

    #[test]
    fn test_empty_snapshot_defaults() {
        let _ = env_logger::builder().is_test(true).try_init();
        let view = ViewModel::read(&Snapshot::new(), Surface::Card);

        assert_eq!(view.teams.len(), TEAM_SLOTS);
        for (index, team) in view.teams.iter().enumerate() {
            assert_eq!(team, &Team::default_for(index + 1));
            assert_eq!(team.name, format!("Team {}", index + 1));
            assert_eq!(team.points, 0);
            assert!(team.participating);
            assert_eq!(team.year_guess, 1990);
        }
        assert_eq!(view.countdown, Countdown { current: 0, total: 30 });
        assert_eq!(view.current_song, None);
        assert_eq!(view.game_status, "ready");
        assert_eq!(view.game_mode, "Classic");
        assert_eq!(view.round, 0);
        assert_eq!(view.player_count, "5");
        assert_eq!(view.settings.selected_audio_player, None);
        assert!(view.settings.available_players.is_empty());
    }

    #[test]
    fn test_missing_team_gets_default() {
        let snapshot = Snapshot::new()
            .with_entity(
                snapshot::team_entity_id(1),
                team_entity("Rockers")
                    .with_attribute("points", 35)
                    .with_attribute("participating", false)
                    .with_attribute("year_guess", 1984)
                    .with_attribute("betting", true)
                    .with_attribute("user_id", "abc"),
            )
            .with_entity(snapshot::team_entity_id(3), team_entity("Jazz Cats"));

        let view = ViewModel::read(&snapshot, Surface::Card);
        let first = view.team("team_1").unwrap();
        assert_eq!(first.name, "Rockers");
        assert_eq!(first.points, 35);
        assert!(!first.participating);
        assert_eq!(first.year_guess, 1984);
        assert!(first.is_betting);
        assert_eq!(first.user_id.as_deref(), Some("abc"));

        assert_eq!(view.team("team_2"), Some(&Team::default_for(2)));
        assert_eq!(view.team("team_3").unwrap().name, "Jazz Cats");
        assert_eq!(view.team("team_3").unwrap().year_guess, 1990);
        assert_eq!(view.team("team_5"), Some(&Team::default_for(5)));
    }

    #[test]
    fn test_malformed_numbers_fall_back() {
        let snapshot = Snapshot::new()
            .with_entity(
                snapshot::team_entity_id(2),
                team_entity("Two")
                    .with_attribute("points", "lots")
                    .with_attribute("year_guess", json!({"nested": 1})),
            )
            .with_entity(snapshot::COUNTDOWN_TIMER, EntityState::new("unknown"))
            .with_entity(snapshot::COUNTDOWN_CURRENT, EntityState::new("unavailable"))
            .with_entity(snapshot::ROUND_COUNTER, EntityState::new("-3"));

        let view = ViewModel::read(&snapshot, Surface::Card);
        let team = view.team("team_2").unwrap();
        assert_eq!(team.points, 0);
        assert_eq!(team.year_guess, DEFAULT_YEAR_GUESS);
        assert_eq!(view.countdown, Countdown { current: 0, total: 30 });
        assert_eq!(view.round, 0);
    }

    #[test]
    fn test_countdown_is_clamped() {
        let snapshot = Snapshot::new()
            .with_entity(snapshot::COUNTDOWN_TIMER, EntityState::new("20"))
            .with_entity(snapshot::COUNTDOWN_CURRENT, EntityState::new("45"));
        let view = ViewModel::read(&snapshot, Surface::Card);
        assert_eq!(view.countdown, Countdown { current: 20, total: 20 });

        let snapshot = snapshot.with_entity(snapshot::COUNTDOWN_CURRENT, EntityState::new("-5"));
        let view = ViewModel::read(&snapshot, Surface::Card);
        assert_eq!(view.countdown.current, 0);

        let snapshot = Snapshot::new()
            .with_entity(snapshot::COUNTDOWN_TIMER, EntityState::new("0"))
            .with_entity(snapshot::COUNTDOWN_CURRENT, EntityState::new("10"));
        let view = ViewModel::read(&snapshot, Surface::Card);
        assert_eq!(view.countdown, Countdown { current: 0, total: 0 });
    }

    #[test]
    fn test_progress_percent() {
        for total in 1..=120 {
            for current in 0..=total {
                let countdown = Countdown { current, total };
                let expected = (100.0 * current as f64 / total as f64).round() as i64;
                assert_eq!(countdown.progress_percent(), expected);
                assert_ge!(countdown.progress_percent(), 0);
                assert_le!(countdown.progress_percent(), 100);
            }
        }
        assert_eq!(Countdown { current: 1, total: 3 }.progress_percent(), 33);
        assert_eq!(Countdown { current: 2, total: 3 }.progress_percent(), 67);
        assert_eq!(Countdown { current: 5, total: 0 }.progress_percent(), 0);
        assert_eq!(Countdown { current: 5, total: -10 }.progress_percent(), 0);
    }

    fn song_snapshot(year: i64) -> Snapshot {
        Snapshot::new()
            .with_entity(
                snapshot::CURRENT_SONG,
                EntityState::new("media_player.living_room")
                    .with_attribute("year", year.to_string())
                    .with_attribute("url", "https://example.com/song")
                    .with_attribute("song_id", 7),
            )
            .with_entity(
                "media_player.living_room",
                EntityState::new("playing")
                    .with_attribute("friendly_name", "Living Room")
                    .with_attribute("media_title", "Enjoy the Silence")
                    .with_attribute("media_artist", "Depeche Mode")
                    .with_attribute("entity_picture", "/api/media_player_proxy/cover"),
            )
    }

    #[test]
    fn test_song_only_when_stopped() {
        let snapshot = song_snapshot(1990);
        let view = ViewModel::read(&snapshot, Surface::Card);
        assert_eq!(
            view.current_song,
            Some(Song {
                title: "Enjoy the Silence".to_string(),
                artist: "Depeche Mode".to_string(),
                year: 1990,
                image_url: "/api/media_player_proxy/cover".to_string(),
                source_url: "https://example.com/song".to_string(),
            })
        );
        assert_eq!(
            view.settings.selected_audio_player.as_deref(),
            Some("media_player.living_room")
        );

        let running = snapshot.with_entity(snapshot::COUNTDOWN_CURRENT, EntityState::new("10"));
        let view = ViewModel::read(&running, Surface::Card);
        assert!(view.countdown.is_running());
        assert_eq!(view.current_song, None);
    }

    #[test]
    fn test_song_without_player_metadata() {
        let snapshot = Snapshot::new().with_entity(
            snapshot::CURRENT_SONG,
            EntityState::new("None").with_attribute("year", 1977),
        );
        let view = ViewModel::read(&snapshot, Surface::Card);
        let song = view.current_song.unwrap();
        assert_eq!(song.title, UNKNOWN_TITLE);
        assert_eq!(song.artist, UNKNOWN_ARTIST);
        assert_eq!(song.year, 1977);
        assert_eq!(view.settings.selected_audio_player, None);

        let no_year = Snapshot::new().with_entity(snapshot::CURRENT_SONG, EntityState::new("None"));
        assert_eq!(ViewModel::read(&no_year, Surface::Card).current_song, None);
    }

    #[test]
    fn test_available_players() {
        let snapshot = song_snapshot(2001)
            .with_entity("media_player.kitchen_speaker", EntityState::new("idle"))
            .with_entity("media_player.broken", EntityState::new("unavailable"));
        let view = ViewModel::read(&snapshot, Surface::Card);
        assert_eq!(
            view.settings.available_players,
            vec![
                AudioPlayer {
                    id: "media_player.kitchen_speaker".to_string(),
                    name: "kitchen speaker".to_string(),
                },
                AudioPlayer {
                    id: "media_player.living_room".to_string(),
                    name: "Living Room".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_panel_team_count() {
        let snapshot = Snapshot::new().with_entity(
            snapshot::GAME_STATUS,
            EntityState::new("playing").with_attribute("team_count", "3"),
        );
        let panel = ViewModel::read(&snapshot, Surface::Panel);
        assert_eq!(panel.teams.len(), 3);
        assert_eq!(panel.settings.team_count, Some(3));
        assert_eq!(panel.game_status, "playing");

        let card = ViewModel::read(&snapshot, Surface::Card);
        assert_eq!(card.teams.len(), TEAM_SLOTS);

        let out_of_range = Snapshot::new().with_entity(
            snapshot::GAME_STATUS,
            EntityState::new("ready").with_attribute("team_count", 9),
        );
        let panel = ViewModel::read(&out_of_range, Surface::Panel);
        assert_eq!(panel.teams.len(), TEAM_SLOTS);
        assert_eq!(panel.settings.team_count, None);
    }

    #[test]
    fn test_rankings_share_ties() {
        let mut snapshot = Snapshot::new();
        for (number, points) in [(1, 30), (2, 50), (3, 30), (4, 10), (5, 5)] {
            snapshot.insert(
                snapshot::team_entity_id(number),
                team_entity(&format!("T{number}")).with_attribute("points", points),
            );
        }
        let view = ViewModel::read(&snapshot, Surface::Card);
        let rankings = view.rankings();
        assert_eq!(rankings["team_2"], 1);
        assert_eq!(rankings["team_1"], 2);
        assert_eq!(rankings["team_3"], 2);
        assert_eq!(rankings["team_4"], 4);
        assert_eq!(rankings["team_5"], 4);

        snapshot.insert(
            snapshot::team_entity_id(2),
            team_entity("T2")
                .with_attribute("points", 50)
                .with_attribute("participating", false),
        );
        let view = ViewModel::read(&snapshot, Surface::Card);
        let rankings = view.rankings();
        assert!(!rankings.contains_key("team_2"));
        assert_eq!(rankings["team_1"], 1);
        assert_eq!(rankings["team_4"], 3);
    }

    #[test]
    fn test_missing_settings() {
        let view = ViewModel::read(&Snapshot::new(), Surface::Card);
        assert_eq!(
            view.missing_settings(),
            vec![MissingSetting::TeamCount, MissingSetting::AudioPlayer]
        );

        let snapshot = song_snapshot(1990)
            .with_entity(
                snapshot::GAME_STATUS,
                EntityState::new("ready").with_attribute("team_count", 2),
            )
            .with_entity(snapshot::COUNTDOWN_TIMER, EntityState::new("400"));
        let view = ViewModel::read(&snapshot, Surface::Card);
        assert_eq!(view.missing_settings(), vec![MissingSetting::TimerLength]);
    }

    #[test]
    fn test_round_outcomes() {
        let song = Song {
            title: String::new(),
            artist: String::new(),
            year: 1990,
            image_url: String::new(),
            source_url: String::new(),
        };
        let mut team = Team::default_for(1);
        team.last_round_was_betting = true;

        let outcome = RoundOutcome::evaluate(&team, &song);
        assert_eq!(outcome, RoundOutcome::BetWon { guess: 1990, year: 1990 });
        assert_eq!(outcome.points(), 20);

        team.year_guess = 1991;
        let outcome = RoundOutcome::evaluate(&team, &song);
        assert_eq!(outcome, RoundOutcome::BetLost { guess: 1991, year: 1990 });
        assert_eq!(outcome.points(), 0);
        assert_eq!(outcome.difference(), 1);

        team.last_round_was_betting = false;
        let scored = |guess| {
            let team = Team {
                year_guess: guess,
                ..Team::default_for(1)
            };
            RoundOutcome::evaluate(&team, &song).points()
        };
        assert_eq!(scored(1990), 20);
        assert_eq!(scored(1992), 10);
        assert_eq!(scored(1988), 10);
        assert_eq!(scored(1995), 5);
        assert_eq!(scored(1984), 0);
    }

    #[test]
    fn test_highscore() {
        let view = ViewModel::read(&Snapshot::new(), Surface::Card);
        assert_eq!(view.highscore, None);

        let snapshot = Snapshot::new().with_entity(snapshot::HIGHSCORE, EntityState::new("12.5"));
        assert_eq!(ViewModel::read(&snapshot, Surface::Card).highscore, Some(12.5));

        let snapshot =
            Snapshot::new().with_entity(snapshot::HIGHSCORE, EntityState::new("unknown"));
        assert_eq!(ViewModel::read(&snapshot, Surface::Card).highscore, None);

        assert_eq!(format_points_value(15.0), "15");
        assert_eq!(format_points_value(12.34), "12.3");
        assert_eq!(format_points_value(7.5), "7.5");
    }

    #[test]
    fn test_user_average() {
        let mut snapshot =
            Snapshot::new().with_entity(snapshot::ROUND_COUNTER, EntityState::new("4"));
        for (number, points, user) in [(1, 30, "alice"), (2, 20, "bob"), (3, 10, "alice")] {
            snapshot.insert(
                snapshot::team_entity_id(number),
                team_entity(&format!("T{number}"))
                    .with_attribute("points", points)
                    .with_attribute("user_id", user),
            );
        }
        snapshot.insert(
            snapshot::team_entity_id(4),
            team_entity("Bench")
                .with_attribute("points", 100)
                .with_attribute("participating", false)
                .with_attribute("user_id", "alice"),
        );

        let view = ViewModel::read(&snapshot, Surface::Card);
        assert_eq!(view.user_average("alice"), Some(10.0));
        assert_eq!(view.user_average("bob"), Some(5.0));
        assert_eq!(view.user_average("carol"), None);

        let first_round = snapshot.with_entity(snapshot::ROUND_COUNTER, EntityState::new("1"));
        let view = ViewModel::read(&first_round, Surface::Card);
        assert_eq!(view.user_average("alice"), None);
    }
}
