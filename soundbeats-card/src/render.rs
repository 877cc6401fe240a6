use crate::{
    i18n::{Language, Translations, fl},
    markup::{Element, Node},
};
use soundbeats_common::{
    config::{CardConfig, Surface},
    view_model::{
        AudioPlayer, Countdown, MissingSetting, RoundOutcome, Settings, Song, TEAM_SLOTS, Team,
        User, ViewModel, format_points_value,
    },
};
use std::collections::BTreeMap;

pub const MIN_YEAR: i64 = 1950;
pub const YEAR_STEPS: [i64; 4] = [-10, -1, 1, 10];

pub const HIDDEN_CLASS: &str = "hidden";
pub const ADMIN_HIDDEN_STYLE: &str = "display: none";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Admin,
    Viewer,
}

impl Privilege {
    pub fn from_config(config: &CardConfig) -> Self {
        if config.admin {
            Self::Admin
        } else {
            Self::Viewer
        }
    }
}

/// Whether a round is being played right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase<'a> {
    Running(Countdown),
    Stopped { song: Option<&'a Song> },
}

impl<'a> Phase<'a> {
    pub fn of(view: &'a ViewModel) -> Self {
        if view.countdown.is_running() {
            Self::Running(view.countdown)
        } else {
            Self::Stopped {
                song: view.current_song.as_ref(),
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }

    pub fn song(&self) -> Option<&'a Song> {
        match self {
            Self::Running(_) => None,
            Self::Stopped { song } => *song,
        }
    }

    /// Value of the `data-phase` marker on the teams container
    pub fn name(&self) -> &'static str {
        match self {
            Self::Running(_) => "running",
            Self::Stopped { .. } => "stopped",
        }
    }
}

/// What the content area of one team card shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamPanel {
    Betting { year_guess: i64, is_betting: bool },
    Result(RoundOutcome),
    NoSong,
    Empty,
}

impl TeamPanel {
    pub fn of(team: &Team, view: &ViewModel) -> Self {
        match Phase::of(view) {
            Phase::Running(_) => Self::Betting {
                year_guess: team.year_guess,
                is_betting: team.is_betting,
            },
            Phase::Stopped { song: Some(song) } => Self::Result(RoundOutcome::evaluate(team, song)),
            Phase::Stopped { song: None } if view.round == 0 => Self::NoSong,
            Phase::Stopped { song: None } => Self::Empty,
        }
    }

    /// Value of the `data-panel` marker on a team item
    pub fn name(&self) -> &'static str {
        match self {
            Self::Betting { .. } => "betting",
            Self::Result(_) => "result",
            Self::NoSong => "no-song",
            Self::Empty => "empty",
        }
    }
}

/// Everything the renderer branches on, resolved once per render
#[derive(Debug, Clone, Copy)]
pub struct ViewState<'a> {
    pub view: &'a ViewModel,
    pub phase: Phase<'a>,
    pub privilege: Privilege,
}

pub fn countdown_text(countdown: &Countdown) -> String {
    format!("{}s", countdown.current)
}

pub fn progress_style(countdown: &Countdown) -> String {
    format!("width: {}%", countdown.progress_percent())
}

pub fn timer_value_text(timer_length: i64) -> String {
    format!("{timer_length}s")
}

pub fn team_number(team_id: &str) -> &str {
    team_id.rsplit('_').next().unwrap_or(team_id)
}

pub fn rank_class(view: &ViewModel, team: &Team, rankings: &BTreeMap<String, u8>) -> &'static str {
    if view.round == 0 || team.points == 0 {
        return "rank-other";
    }
    match rankings.get(&team.id) {
        Some(1) => "rank-1",
        Some(2) => "rank-2",
        Some(3) => "rank-3",
        _ => "rank-other",
    }
}

pub fn team_header_class(view: &ViewModel, team: &Team, rankings: &BTreeMap<String, u8>) -> String {
    format!("team-header {}", rank_class(view, team, rankings))
}

fn section(class: &str) -> Element {
    Element::new("div").class("section").class(class)
}

fn heading(text: impl Into<String>) -> Element {
    Element::new("h3").text(text)
}

fn action_button(class: &str, action: &str, label: impl Into<String>) -> Element {
    Element::new("button")
        .class(class)
        .attr("data-action", action)
        .text(label)
}

/// Builds the markup for a surface. The output depends only on the view model
/// and the renderer's own settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renderer {
    surface: Surface,
    privilege: Privilege,
    max_year: i64,
    translations: Translations,
    /// Choices offered when assigning a team to a user
    users: Vec<User>,
    /// The user looking at the card, for their own highscore average
    current_user: Option<String>,
}

impl Renderer {
    pub fn new(surface: Surface, privilege: Privilege, max_year: i64) -> Self {
        Self {
            surface,
            privilege,
            max_year: max_year.max(MIN_YEAR),
            translations: Translations::default(),
            users: Vec::new(),
            current_user: None,
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.set_language(language);
        self
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn privilege(&self) -> Privilege {
        self.privilege
    }

    pub fn max_year(&self) -> i64 {
        self.max_year
    }

    pub fn language(&self) -> Language {
        self.translations.language()
    }

    pub fn set_language(&mut self, language: Language) {
        if language != self.language() {
            self.translations = Translations::new(language);
        }
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn set_users(&mut self, users: Vec<User>) {
        self.users = users;
    }

    pub fn current_user(&self) -> Option<&str> {
        self.current_user.as_deref()
    }

    pub fn set_current_user(&mut self, user_id: Option<String>) {
        self.current_user = user_id;
    }

    pub fn view_state<'a>(&self, view: &'a ViewModel) -> ViewState<'a> {
        ViewState {
            view,
            phase: Phase::of(view),
            privilege: self.privilege,
        }
    }

    pub fn round_text(&self, round: i64) -> String {
        fl!(self.translations, "round", round = round)
    }

    pub fn points_text(&self, points: i64) -> String {
        fl!(self.translations, "points", points = points)
    }

    pub fn bet_button_text(&self, is_betting: bool) -> String {
        if is_betting {
            fl!(self.translations, "betting")
        } else {
            fl!(self.translations, "place-bet")
        }
    }

    pub fn render(&self, view: &ViewModel) -> Element {
        let state = self.view_state(view);
        let root_class = match self.surface {
            Surface::Card => "soundbeats-card",
            Surface::Panel => "soundbeats-panel",
        };

        Element::new("div")
            .class(root_class)
            .attr("data-surface", self.surface.to_string())
            .attr("lang", self.language().code())
            .child(self.title_section(&state))
            .child(self.countdown_section(&state))
            .child(self.song_section(&state))
            .child(
                section("teams-overview-section")
                    .child(heading(fl!(self.translations, "section-teams-overview")))
                    .child(
                        Element::new("div")
                            .class("teams-overview-container")
                            .children(self.overview_items(view)),
                    ),
            )
            .child(
                section("team-section")
                    .child(heading(fl!(self.translations, "section-team-status")))
                    .child(
                        Element::new("div")
                            .class("teams-container")
                            .attr("data-phase", state.phase.name())
                            .children(self.team_items(view)),
                    ),
            )
            .child(self.highscore_section(view))
            .child(self.admin_section(&state, self.game_settings(&state)))
            .child(self.admin_section(&state, self.team_management(view)))
    }

    fn title_section(&self, state: &ViewState<'_>) -> Element {
        let view = state.view;
        section("title-section")
            .child(Element::new("h2").class("card-title").text("Soundbeats"))
            .child(
                Element::new("div")
                    .class("game-info")
                    .child(Element::new("span").class("game-status").text(&view.game_status))
                    .child(Element::new("span").class("player-count").text(&view.player_count))
                    .child(Element::new("span").class("game-mode").text(&view.game_mode))
                    .child(
                        Element::new("span")
                            .class("round-counter")
                            .text(self.round_text(view.round)),
                    ),
            )
    }

    fn countdown_section(&self, state: &ViewState<'_>) -> Element {
        let countdown = state.view.countdown;
        section("countdown-section")
            .class_if(!state.phase.is_running(), HIDDEN_CLASS)
            .child(heading(fl!(self.translations, "section-countdown")))
            .child(
                Element::new("div")
                    .class("countdown-timer")
                    .text(countdown_text(&countdown)),
            )
            .child(
                Element::new("div").class("countdown-progress").child(
                    Element::new("div")
                        .class("countdown-progress-bar")
                        .attr("style", progress_style(&countdown)),
                ),
            )
    }

    fn song_section(&self, state: &ViewState<'_>) -> Element {
        let song = state.phase.song();
        let field = |f: fn(&Song) -> String| song.map(f).unwrap_or_default();
        let t = &self.translations;

        section("song-section")
            .class_if(song.is_none(), HIDDEN_CLASS)
            .child(heading(fl!(t, "section-current-song")))
            .child(
                Element::new("div")
                    .class("song-card")
                    .child(
                        Element::new("img")
                            .class("song-image")
                            .attr("alt", fl!(t, "song-cover"))
                            .attr("src", field(|s| s.image_url.clone())),
                    )
                    .child(
                        Element::new("div")
                            .class("song-name")
                            .text(field(|s| s.title.clone())),
                    )
                    .child(
                        Element::new("div")
                            .class("song-artist")
                            .text(field(|s| s.artist.clone())),
                    )
                    .child(
                        Element::new("div")
                            .class("song-year")
                            .text(field(|s| s.year.to_string())),
                    )
                    .child(
                        Element::new("a")
                            .class("song-link")
                            .attr("href", field(|s| s.source_url.clone()))
                            .text(fl!(t, "open-song")),
                    )
                    .child(
                        Element::new("div")
                            .class("song-controls-row")
                            .child(action_button(
                                "song-volume-button",
                                "volume-down",
                                fl!(t, "volume-down"),
                            ))
                            .child(action_button(
                                "song-volume-button",
                                "play-pause",
                                fl!(t, "play-pause"),
                            ))
                            .child(action_button(
                                "song-volume-button",
                                "volume-up",
                                fl!(t, "volume-up"),
                            ))
                            .child(action_button(
                                "song-next-button",
                                "next-song",
                                fl!(t, "next-song"),
                            )),
                    ),
            )
    }

    fn highscore_section(&self, view: &ViewModel) -> Element {
        section("highscore-section")
            .child(heading(self.highscore_title(view.round)).class("highscore-title"))
            .child(
                Element::new("div")
                    .class("highscore-container")
                    .children(self.highscore_items(view)),
            )
    }

    pub fn highscore_title(&self, round: i64) -> String {
        fl!(self.translations, "section-highscores", round = round)
    }

    /// The global average, plus the viewer's own average once it is known
    pub fn highscore_items(&self, view: &ViewModel) -> Vec<Node> {
        let t = &self.translations;
        let Some(highscore) = view.highscore else {
            return vec![
                Element::new("div")
                    .class("highscore-empty")
                    .text(fl!(t, "highscore-unavailable"))
                    .into(),
            ];
        };

        let entry = |class: &str, label: String, value: f64| {
            Element::new("div")
                .class(class)
                .child(Element::new("span").class("highscore-label").text(label))
                .child(
                    Element::new("div")
                        .class("highscore-value")
                        .text(fl!(t, "points", points = format_points_value(value))),
                )
        };
        let user_average = self
            .current_user
            .as_deref()
            .and_then(|user_id| view.user_average(user_id));

        let mut display = Element::new("div").class("highscore-display").child(entry(
            "global-highscore",
            fl!(t, "highscore-average-round"),
            highscore,
        ));
        if let Some(average) = user_average {
            display = display.child(entry("user-average", fl!(t, "your-average"), average));
        }
        vec![display.into()]
    }

    fn admin_section(&self, state: &ViewState<'_>, content: Vec<Node>) -> Element {
        let section = section("admin-section");
        let section = match state.privilege {
            Privilege::Admin => section,
            Privilege::Viewer => section.attr("style", ADMIN_HIDDEN_STYLE),
        };
        section.children(content)
    }

    fn game_settings(&self, state: &ViewState<'_>) -> Vec<Node> {
        let settings = &state.view.settings;
        let t = &self.translations;
        let label = |text: String| Element::new("label").class("setting-label").text(text);
        vec![
            heading(fl!(t, "section-game-settings")).into(),
            Element::new("div")
                .class("game-settings")
                .child(self.setup_notice(state.view))
                .child(Element::new("div").class("setting-item").child(action_button(
                    "admin-button",
                    "start-game",
                    fl!(t, "start-game"),
                )))
                .child(
                    Element::new("div")
                        .class("setting-item")
                        .child(label(fl!(t, "number-of-teams")))
                        .child(
                            Element::new("select")
                                .class("team-count-select")
                                .children(self.team_count_options(settings)),
                        ),
                )
                .child(
                    Element::new("div")
                        .class("setting-item")
                        .child(label(fl!(t, "timer-length")))
                        .child(
                            Element::new("input")
                                .class("timer-slider")
                                .attr("type", "range")
                                .attr("min", "5")
                                .attr("max", "300")
                                .attr("step", "5")
                                .attr("value", settings.timer_length.to_string()),
                        )
                        .child(
                            Element::new("span")
                                .class("timer-value")
                                .text(timer_value_text(settings.timer_length)),
                        ),
                )
                .child(
                    Element::new("div")
                        .class("setting-item")
                        .child(label(fl!(t, "audio-player")))
                        .child(
                            Element::new("select")
                                .class("audio-player-select")
                                .children(self.player_options(settings)),
                        ),
                )
                .child(
                    Element::new("div")
                        .class("setting-item")
                        .child(label(fl!(t, "language")))
                        .child(
                            action_button(
                                "language-toggle-btn",
                                "toggle-language",
                                fl!(t, "language-toggle"),
                            )
                            .attr("data-language", self.language().toggled().code()),
                        ),
                )
                .into(),
        ]
    }

    fn setup_notice(&self, view: &ViewModel) -> Element {
        let missing = view.missing_settings();
        Element::new("div")
            .class("setup-notice")
            .class_if(missing.is_empty(), HIDDEN_CLASS)
            .child(
                Element::new("ul")
                    .class("missing-settings")
                    .children(self.missing_setting_items(&missing)),
            )
    }

    pub fn missing_setting_items(&self, missing: &[MissingSetting]) -> Vec<Node> {
        missing
            .iter()
            .map(|m| {
                let text = match m {
                    MissingSetting::TeamCount => fl!(self.translations, "missing-team-count"),
                    MissingSetting::AudioPlayer => fl!(self.translations, "missing-audio-player"),
                    MissingSetting::TimerLength => fl!(self.translations, "missing-timer-length"),
                };
                Element::new("li").text(text).into()
            })
            .collect()
    }

    pub fn team_count_options(&self, settings: &Settings) -> Vec<Node> {
        let mut options = vec![
            Element::new("option")
                .attr("value", "")
                .flag("selected", settings.team_count.is_none())
                .text(fl!(self.translations, "select-team-count"))
                .into(),
        ];
        options.extend((1..=TEAM_SLOTS as i64).map(|count| {
            Element::new("option")
                .attr("value", count.to_string())
                .flag("selected", settings.team_count == Some(count))
                .text(fl!(self.translations, "team-count-option", count = count))
                .into()
        }));
        options
    }

    pub fn player_options(&self, settings: &Settings) -> Vec<Node> {
        self.player_options_selecting(
            &settings.available_players,
            settings.selected_audio_player.as_deref(),
        )
    }

    /// Audio player options with `selected` (if present among them) marked
    pub fn player_options_selecting(
        &self,
        players: &[AudioPlayer],
        selected: Option<&str>,
    ) -> Vec<Node> {
        let selected = selected.filter(|id| players.iter().any(|p| p.id == *id));
        let mut options = vec![
            Element::new("option")
                .attr("value", "")
                .flag("selected", selected.is_none())
                .text(fl!(self.translations, "select-audio-player"))
                .into(),
        ];
        options.extend(players.iter().map(|player| {
            Element::new("option")
                .attr("value", &player.id)
                .flag("selected", selected == Some(player.id.as_str()))
                .text(&player.name)
                .into()
        }));
        options
    }

    /// User options with `selected` (if it is one of the known users) marked
    pub fn user_options(&self, selected: Option<&str>) -> Vec<Node> {
        let selected = selected.filter(|id| self.users.iter().any(|u| u.id == *id));
        let mut options = vec![
            Element::new("option")
                .attr("value", "")
                .flag("selected", selected.is_none())
                .text(fl!(self.translations, "select-user"))
                .into(),
        ];
        options.extend(self.users.iter().map(|user| {
            Element::new("option")
                .attr("value", &user.id)
                .flag("selected", selected == Some(user.id.as_str()))
                .text(&user.name)
                .into()
        }));
        options
    }

    fn team_management(&self, view: &ViewModel) -> Vec<Node> {
        vec![
            heading(fl!(self.translations, "section-team-management")).into(),
            Element::new("div")
                .class("team-management-container")
                .children(self.team_management_items(view))
                .into(),
        ]
    }

    pub fn team_management_items(&self, view: &ViewModel) -> Vec<Node> {
        let t = &self.translations;
        view.teams
            .iter()
            .map(|team| {
                Element::new("div")
                    .class("team-management-item")
                    .attr("data-team", &team.id)
                    .child(
                        Element::new("span")
                            .class("team-management-label")
                            .text(fl!(t, "team-label", number = team_number(&team.id))),
                    )
                    .child(
                        Element::new("input")
                            .class("team-input")
                            .attr("type", "text")
                            .attr("placeholder", fl!(t, "team-name-placeholder"))
                            .attr("value", &team.name),
                    )
                    .child(
                        Element::new("input")
                            .class("team-points-input")
                            .attr("type", "number")
                            .attr("value", team.points.to_string()),
                    )
                    .child(
                        Element::new("select")
                            .class("team-user-select")
                            .children(self.user_options(team.user_id.as_deref())),
                    )
                    .child(
                        Element::new("label")
                            .class("participating-label")
                            .child(
                                Element::new("input")
                                    .class("participating-checkbox")
                                    .attr("type", "checkbox")
                                    .flag("checked", team.participating),
                            )
                            .text(fl!(t, "participating")),
                    )
                    .into()
            })
            .collect()
    }

    /// One overview entry per participating team, best first
    pub fn overview_items(&self, view: &ViewModel) -> Vec<Node> {
        let rankings = view.rankings();
        let mut teams: Vec<&Team> = view.participating_teams().collect();
        teams.sort_by(|a, b| b.points.cmp(&a.points));

        teams
            .into_iter()
            .map(|team| {
                let rank = rankings.get(&team.id).copied().unwrap_or(4);
                Element::new("div")
                    .class("overview-team-item")
                    .class(rank_class(view, team, &rankings))
                    .attr("data-team", &team.id)
                    .child(Element::new("span").class("overview-rank").text(format!("#{rank}")))
                    .child(Element::new("span").class("overview-team-name").text(&team.name))
                    .child(
                        Element::new("span")
                            .class("overview-team-points")
                            .text(self.points_text(team.points)),
                    )
                    .into()
            })
            .collect()
    }

    /// Team cards for the participating teams, in slot order
    pub fn team_items(&self, view: &ViewModel) -> Vec<Node> {
        let rankings = view.rankings();
        view.participating_teams()
            .map(|team| {
                let panel = TeamPanel::of(team, view);
                let rank = rankings.get(&team.id).copied().unwrap_or(4);
                Element::new("div")
                    .class("team-item")
                    .attr("data-team", &team.id)
                    .attr("data-panel", panel.name())
                    .child(
                        Element::new("div")
                            .attr("class", team_header_class(view, team, &rankings))
                            .child(Element::new("span").class("rank-badge").text(rank.to_string()))
                            .child(Element::new("span").class("team-name").text(&team.name))
                            .child(
                                Element::new("span")
                                    .class("team-points")
                                    .text(self.points_text(team.points)),
                            ),
                    )
                    .child(
                        Element::new("div")
                            .class("team-content")
                            .children(self.panel_content(&panel)),
                    )
                    .into()
            })
            .collect()
    }

    fn panel_content(&self, panel: &TeamPanel) -> Vec<Node> {
        match panel {
            TeamPanel::Betting {
                year_guess,
                is_betting,
            } => vec![
                self.year_guess_section(*year_guess).into(),
                Element::new("div")
                    .class("betting-section")
                    .child(
                        Element::new("button")
                            .class("bet-button")
                            .class_if(*is_betting, "betting-active")
                            .text(self.bet_button_text(*is_betting)),
                    )
                    .child(
                        Element::new("div")
                            .class("betting-info")
                            .class_if(!is_betting, HIDDEN_CLASS)
                            .text(fl!(self.translations, "betting-info")),
                    )
                    .into(),
            ],
            TeamPanel::Result(outcome) => vec![
                Element::new("div")
                    .class("bet-result-section")
                    .children(self.result_summary(outcome))
                    .into(),
            ],
            TeamPanel::NoSong => vec![
                Element::new("div")
                    .class("no-song-message")
                    .text(fl!(self.translations, "waiting-for-song"))
                    .into(),
            ],
            TeamPanel::Empty => Vec::new(),
        }
    }

    fn year_guess_section(&self, year_guess: i64) -> Element {
        let adjust = |delta: i64| {
            let label = if delta > 0 {
                format!("+{delta}")
            } else {
                delta.to_string()
            };
            Element::new("button")
                .class("year-adjust")
                .attr("data-delta", delta.to_string())
                .text(label)
        };
        let (down, up) = YEAR_STEPS.split_at(2);

        Element::new("div")
            .class("year-guess-section")
            .child(
                Element::new("label")
                    .class("year-guess-label")
                    .text(fl!(self.translations, "year-guess-label")),
            )
            .child(
                Element::new("div")
                    .class("year-guess-control")
                    .children(down.iter().copied().map(adjust))
                    .child(
                        Element::new("input")
                            .class("year-guess-input")
                            .attr("type", "number")
                            .attr("min", MIN_YEAR.to_string())
                            .attr("max", self.max_year.to_string())
                            .attr("value", year_guess.to_string()),
                    )
                    .children(up.iter().copied().map(adjust)),
            )
    }

    fn explanation(&self, outcome: &RoundOutcome) -> String {
        let t = &self.translations;
        let difference = outcome.difference();
        match outcome {
            RoundOutcome::BetWon { .. } => fl!(t, "explain-bet-won"),
            RoundOutcome::BetLost { .. } => fl!(t, "explain-bet-lost", difference = difference),
            RoundOutcome::Scored { .. } => match difference {
                0 => fl!(t, "explain-perfect"),
                1..=5 => fl!(t, "explain-close", difference = difference),
                _ => fl!(t, "explain-far", difference = difference),
            },
        }
    }

    /// Children of a team's `bet-result-section`
    pub fn result_summary(&self, outcome: &RoundOutcome) -> Vec<Node> {
        let t = &self.translations;
        let guess_line = fl!(
            t,
            "result-guess",
            guess = outcome.guess(),
            year = outcome.year()
        );
        let points_line = fl!(
            t,
            "result-points",
            points = outcome.points(),
            explanation = self.explanation(outcome)
        );

        let summary = match outcome {
            RoundOutcome::BetWon { .. } | RoundOutcome::BetLost { .. } => {
                let won = matches!(outcome, RoundOutcome::BetWon { .. });
                let title = if won {
                    fl!(t, "bet-won")
                } else {
                    fl!(t, "bet-lost")
                };
                Element::new("div")
                    .class("bet-result")
                    .class(if won { "bet-win" } else { "bet-loss" })
                    .child(Element::new("strong").class("result-title").text(title))
                    .child(Element::new("div").class("result-guess").text(guess_line))
                    .child(Element::new("div").class("result-points").text(points_line))
            }
            RoundOutcome::Scored { points, .. } => Element::new("div")
                .class("result-info")
                .class(if *points > 0 {
                    "result-info-positive"
                } else {
                    "result-info-neutral"
                })
                .child(Element::new("div").class("result-guess").text(guess_line))
                .child(Element::new("div").class("result-points").text(points_line)),
        };
        vec![summary.into()]
    }
}
