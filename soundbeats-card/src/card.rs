//! The mounted card: owns the live tree, brings it up to date with each new
//! snapshot, and turns user gestures on it into actions.

use crate::{
    actions::{MediaCommand, UserAction},
    i18n::Language,
    live_tree::{LiveTree, NodePath},
    reconcile::{self, ApplyReport, FocusContext, Patch},
    render::{MIN_YEAR, Privilege, Renderer, timer_value_text},
};
use log::*;
use soundbeats_common::{
    config::{CardConfig, Surface},
    snapshot::{Snapshot, parse_i64},
    view_model::{DEFAULT_YEAR_GUESS, User, ViewModel},
};
use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};
use thiserror::Error;
use time::OffsetDateTime;

/// How long a changed control keeps the user's value when the snapshot
/// disagrees
pub const EDIT_HOLD: Duration = Duration::from_secs(5);
/// How long team management is left unrebuilt after the user touches it. Also
/// the hold for a team's user assignment.
pub const TEAM_MANAGEMENT_HOLD: Duration = Duration::from_secs(2);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CardError {
    #[error("Invalid configuration: a card configuration must be provided")]
    MissingConfig,
}

/// What `set_snapshot` did to the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// First snapshot, the whole tree was rendered
    Mounted,
    Patched {
        report: ApplyReport,
        /// Patches skipped because they would disturb the focused control
        held_back: usize,
    },
}

/// Something the user did to an element of the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gesture {
    Click(NodePath),
    /// A value committed to a text field, slider or dropdown
    Edit { path: NodePath, value: String },
    Toggle { path: NodePath, checked: bool },
}

/// The interactive elements, told apart by class
#[derive(Debug, Clone, PartialEq, Eq)]
enum Control {
    Action(String),
    YearAdjust(i64),
    BetButton,
    TeamName,
    TeamPoints,
    YearGuess,
    Participating,
    TimerSlider,
    TeamCount,
    AudioPlayer,
    TeamUser,
}

impl Control {
    fn at(tree: &LiveTree, path: &NodePath) -> Option<Self> {
        let element = tree.element(path)?;
        if let Some(action) = element.get_attr("data-action") {
            return Some(Self::Action(action.to_string()));
        }
        if element.has_class("year-adjust") {
            return element
                .get_attr("data-delta")
                .and_then(parse_i64)
                .map(Self::YearAdjust);
        }
        [
            ("bet-button", Self::BetButton),
            ("team-input", Self::TeamName),
            ("team-points-input", Self::TeamPoints),
            ("year-guess-input", Self::YearGuess),
            ("participating-checkbox", Self::Participating),
            ("timer-slider", Self::TimerSlider),
            ("team-count-select", Self::TeamCount),
            ("audio-player-select", Self::AudioPlayer),
            ("team-user-select", Self::TeamUser),
        ]
        .into_iter()
        .find(|(class, _)| element.has_class(class))
        .map(|(_, control)| control)
    }

    /// The control at `path`, or the nearest one containing it
    fn containing(tree: &LiveTree, path: &NodePath) -> Option<(NodePath, Self)> {
        let mut path = path.clone();
        loop {
            if let Some(control) = Self::at(tree, &path) {
                return Some((path, control));
            }
            path = path.parent()?;
        }
    }
}

fn current_year() -> i64 {
    let now = OffsetDateTime::now_local().unwrap_or_else(|e| {
        debug!("Local offset unavailable ({e}), using UTC");
        OffsetDateTime::now_utc()
    });
    i64::from(now.year())
}

/// Controls the user changed lately, each with the moment its hold runs out
#[derive(Debug, Clone, Default)]
struct RecentEdits {
    controls: BTreeMap<NodePath, Instant>,
    team_management_until: Option<Instant>,
}

impl RecentEdits {
    fn record(&mut self, tree: &LiveTree, path: &NodePath, hold: Duration, now: Instant) {
        trace!("Holding {path:?} for {hold:?}");
        self.controls.insert(path.clone(), now + hold);
        let in_team_management = tree
            .query(".team-management-container")
            .is_some_and(|container| path.starts_with(&container));
        if in_team_management {
            self.team_management_until = Some(now + TEAM_MANAGEMENT_HOLD);
        }
    }

    fn expire(&mut self, now: Instant) {
        self.controls.retain(|_, until| *until > now);
        self.team_management_until = self.team_management_until.filter(|until| *until > now);
    }

    /// Forgets edits that nothing had to be held back for, the snapshot
    /// already agrees with them
    fn release_settled(&mut self, held_back: &[Patch]) {
        self.controls
            .retain(|path, _| held_back.iter().any(|patch| patch.path == *path));
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn focus_context(&self, tree: &LiveTree) -> FocusContext {
        FocusContext::of(tree).with_recent_edits(
            self.controls.keys().cloned().collect(),
            self.team_management_until.is_some(),
        )
    }
}

#[derive(Debug)]
pub struct SoundbeatsCard {
    renderer: Renderer,
    tree: Option<LiveTree>,
    view: Option<ViewModel>,
    recent: RecentEdits,
}

impl SoundbeatsCard {
    pub fn new(config: Option<CardConfig>, surface: Surface) -> Result<Self, CardError> {
        Self::with_max_year(config, surface, current_year())
    }

    /// Like [`new`](Self::new), with the latest guessable year fixed
    pub fn with_max_year(
        config: Option<CardConfig>,
        surface: Surface,
        max_year: i64,
    ) -> Result<Self, CardError> {
        let config = config.ok_or(CardError::MissingConfig)?;
        let privilege = Privilege::from_config(&config);
        info!("Creating {surface} with {privilege:?} privileges");
        Ok(Self {
            renderer: Renderer::new(surface, privilege, max_year),
            tree: None,
            view: None,
            recent: RecentEdits::default(),
        })
    }

    /// Switches the display language, rendering the whole tree again
    pub fn set_language(&mut self, language: Language) {
        if language == self.renderer.language() {
            return;
        }
        info!("Switching to {language:?}");
        self.renderer.set_language(language);
        self.remount();
    }

    /// The users a team can be assigned to
    pub fn set_users(&mut self, users: Vec<User>) {
        self.renderer.set_users(users);
        self.refresh();
    }

    /// The user looking at the card
    pub fn set_current_user(&mut self, user_id: Option<String>) {
        self.renderer.set_current_user(user_id);
        self.refresh();
    }

    fn remount(&mut self) {
        if let (Some(tree), Some(view)) = (self.tree.as_mut(), self.view.as_ref()) {
            *tree = LiveTree::new(self.renderer.render(view));
            self.recent.clear();
        }
    }

    fn refresh(&mut self) {
        if self.tree.is_none() {
            return;
        }
        if let Some(view) = self.view.clone() {
            self.update(view, Instant::now());
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn tree(&self) -> Option<&LiveTree> {
        self.tree.as_ref()
    }

    pub fn tree_mut(&mut self) -> Option<&mut LiveTree> {
        self.tree.as_mut()
    }

    /// The view model the tree was last brought up to date with
    pub fn view(&self) -> Option<&ViewModel> {
        self.view.as_ref()
    }

    pub fn html(&self) -> Option<String> {
        self.tree.as_ref().map(LiveTree::html)
    }

    pub fn set_snapshot(&mut self, snapshot: &Snapshot) -> UpdateOutcome {
        self.set_snapshot_at(snapshot, Instant::now())
    }

    /// Like [`set_snapshot`](Self::set_snapshot), as seen at `now`
    pub fn set_snapshot_at(&mut self, snapshot: &Snapshot, now: Instant) -> UpdateOutcome {
        let next = ViewModel::read(snapshot, self.renderer.surface());
        self.update(next, now)
    }

    fn update(&mut self, next: ViewModel, now: Instant) -> UpdateOutcome {
        let Some(tree) = self.tree.as_mut() else {
            debug!("Mounting {}", self.renderer.surface());
            self.tree = Some(LiveTree::new(self.renderer.render(&next)));
            self.view = Some(next);
            return UpdateOutcome::Mounted;
        };

        self.recent.expire(now);
        let focus = self.recent.focus_context(tree);
        let previous = self.view.as_ref();
        let patch_set = reconcile::diff_with(previous, &next, tree, &self.renderer, &focus);
        self.recent.release_settled(&patch_set.held_back);
        let held_back = patch_set.held_back.len();
        let report = reconcile::apply(tree, patch_set);
        if report.mutations > 0 {
            trace!("Applied {report:?}, held back {held_back}");
        }
        self.view = Some(next);
        UpdateOutcome::Patched { report, held_back }
    }

    /// Runs work deferred by the last update, such as restoring focus after a
    /// rebuild. Call once control has returned to the scheduler.
    pub fn run_deferred(&mut self) -> usize {
        self.tree.as_mut().map_or(0, LiveTree::run_deferred)
    }

    /// Turns a gesture into the action it asks for, if any. Edits are applied to
    /// the tree the way a browser would before the action is worked out.
    pub fn handle(&mut self, gesture: Gesture) -> Option<UserAction> {
        self.handle_at(gesture, Instant::now())
    }

    /// Like [`handle`](Self::handle), as seen at `now`. Changed controls keep
    /// the user's value for [`EDIT_HOLD`] unless a snapshot agrees sooner.
    pub fn handle_at(&mut self, gesture: Gesture, now: Instant) -> Option<UserAction> {
        let max_year = self.renderer.max_year();
        let (tree, view) = match (self.tree.as_mut(), self.view.as_ref()) {
            (Some(tree), Some(view)) => (tree, view),
            _ => {
                warn!("Ignoring {gesture:?} before the first snapshot");
                return None;
            }
        };

        match gesture {
            Gesture::Click(path) => {
                let (path, control) = Control::containing(tree, &path)?;
                let team_id = tree.closest_attr(&path, "data-team");
                match control {
                    Control::Action(action) => match action.as_str() {
                        "toggle-language" => {
                            let language = self.renderer.language().toggled();
                            info!("Switching to {language:?}");
                            self.renderer.set_language(language);
                            *tree = LiveTree::new(self.renderer.render(view));
                            self.recent.clear();
                            None
                        }
                        "start-game" => Some(UserAction::StartGame),
                        "next-song" => Some(UserAction::NextSong),
                        "volume-up" | "volume-down" | "play-pause" => {
                            let command = match action.as_str() {
                                "volume-up" => MediaCommand::VolumeUp,
                                "volume-down" => MediaCommand::VolumeDown,
                                _ => MediaCommand::PlayPause,
                            };
                            UserAction::media(
                                command,
                                view.settings.selected_audio_player.as_deref(),
                            )
                        }
                        other => {
                            warn!("Unknown action {other:?}");
                            None
                        }
                    },
                    Control::YearAdjust(delta) => {
                        let team_id = team_id?;
                        let input = tree.query(&format!(
                            r#".team-item[data-team="{team_id}"] .year-guess-input"#
                        ));
                        let current = input
                            .as_ref()
                            .and_then(|input| tree.value(input))
                            .and_then(|value| parse_i64(&value))
                            .or_else(|| view.team(&team_id).map(|t| t.year_guess))
                            .unwrap_or(DEFAULT_YEAR_GUESS);
                        let year_guess = (current + delta).clamp(MIN_YEAR, max_year);
                        if let Some(input) = input {
                            tree.set_value(&input, &year_guess.to_string());
                            self.recent.record(tree, &input, EDIT_HOLD, now);
                        }
                        Some(UserAction::UpdateTeamYearGuess {
                            team_id,
                            year_guess,
                        })
                    }
                    Control::BetButton => {
                        let team_id = team_id?;
                        let betting = !view.team(&team_id).is_some_and(|t| t.is_betting);
                        Some(UserAction::UpdateTeamBetting { team_id, betting })
                    }
                    _ => None,
                }
            }
            Gesture::Edit { path, value } => {
                let control = Control::at(tree, &path)?;
                tree.set_value(&path, &value);
                let hold = match control {
                    Control::TeamUser => TEAM_MANAGEMENT_HOLD,
                    _ => EDIT_HOLD,
                };
                self.recent.record(tree, &path, hold, now);
                let team_id = tree.closest_attr(&path, "data-team");
                match control {
                    Control::TeamName => UserAction::team_name(&team_id?, &value),
                    Control::TeamPoints => UserAction::team_points(&team_id?, &value),
                    Control::YearGuess => UserAction::typed_year_guess(&team_id?, &value, max_year),
                    Control::TimerSlider => {
                        let action = UserAction::timer_length(&value)?;
                        if let (UserAction::UpdateTimerLength { timer_length }, Some(label)) =
                            (&action, tree.query(".timer-value"))
                        {
                            tree.set_text(&label, &timer_value_text(*timer_length));
                        }
                        Some(action)
                    }
                    Control::TeamCount => UserAction::team_count(&value),
                    Control::AudioPlayer => UserAction::audio_player(&value),
                    Control::TeamUser => Some(UserAction::team_user(&team_id?, &value)),
                    other => {
                        debug!("{other:?} can't be edited");
                        None
                    }
                }
            }
            Gesture::Toggle { path, checked } => match Control::at(tree, &path)? {
                Control::Participating => {
                    tree.set_checked(&path, checked);
                    self.recent.record(tree, &path, EDIT_HOLD, now);
                    Some(UserAction::UpdateTeamParticipating {
                        team_id: tree.closest_attr(&path, "data-team")?,
                        participating: checked,
                    })
                }
                other => {
                    debug!("{other:?} can't be toggled");
                    None
                }
            },
        }
    }
}
