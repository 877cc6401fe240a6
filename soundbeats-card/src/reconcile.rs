//! Brings a mounted tree up to date with a new view model.
//!
//! [`diff`] is pure: it compares the tree against what the view model calls
//! for and produces a [`PatchSet`]. Patches that would overwrite a control the
//! user is working with, or changed a moment ago, are moved to
//! [`PatchSet::held_back`] by [`clobbers_focus`]. [`apply`] then performs the
//! remaining mutations.

use crate::{
    live_tree::{ControlKind, Deferred, LiveTree, NodePath},
    markup::Node,
    render::{self, HIDDEN_CLASS, Phase, Renderer, TeamPanel},
};
use log::{debug, trace};
use soundbeats_common::view_model::ViewModel;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Text(String),
    /// `None` removes the attribute
    Attribute {
        name: String,
        value: Option<String>,
    },
    Class {
        class: String,
        present: bool,
    },
    Value(String),
    Checked(bool),
    Selected(String),
    /// Replaces the content of a display-only element, or the options of a select
    Children(Vec<Node>),
    /// Replaces a whole region and sets marker attributes on its container.
    /// Focus inside the region is captured and restored afterwards.
    Rebuild {
        children: Vec<Node>,
        markers: BTreeMap<String, String>,
    },
}

impl Change {
    fn name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Attribute { .. } => "attribute",
            Self::Class { .. } => "class",
            Self::Value(_) => "value",
            Self::Checked(_) => "checked",
            Self::Selected(_) => "selected",
            Self::Children(_) => "children",
            Self::Rebuild { .. } => "rebuild",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub path: NodePath,
    pub change: Change,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatchSet {
    pub patches: Vec<Patch>,
    /// Patches withheld this tick to avoid disturbing the focused control
    pub held_back: Vec<Patch>,
}

impl PatchSet {
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn rebuilds(&self) -> impl Iterator<Item = &Patch> {
        self.patches
            .iter()
            .filter(|p| matches!(p.change, Change::Rebuild { .. }))
    }
}

/// The focus state that [`clobbers_focus`] decides against
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FocusContext {
    pub focused: Option<(NodePath, ControlKind)>,
    /// A text field, checkbox or select inside team management has focus
    pub editing_team_management: bool,
    /// Controls whose value the user changed recently. They keep that value
    /// even after losing focus.
    pub recent_edits: Vec<NodePath>,
    /// The user changed something inside team management recently
    pub recent_team_management: bool,
}

impl FocusContext {
    pub fn of(tree: &LiveTree) -> Self {
        let focused = tree
            .focus()
            .and_then(|f| Some((f.path.clone(), tree.control_kind(&f.path)?)));

        let editing_team_management = focused.as_ref().is_some_and(|(path, kind)| {
            matches!(
                kind,
                ControlKind::Text | ControlKind::Checkbox | ControlKind::Select
            ) && tree
                .query(".team-management-container")
                .is_some_and(|container| path.starts_with(&container))
        });

        Self {
            focused,
            editing_team_management,
            ..Default::default()
        }
    }

    pub fn with_recent_edits(
        mut self,
        recent_edits: Vec<NodePath>,
        recent_team_management: bool,
    ) -> Self {
        self.recent_edits = recent_edits;
        self.recent_team_management = recent_team_management;
        self
    }
}

/// True if applying `patch` now would discard what the user is doing
pub fn clobbers_focus(patch: &Patch, focus: &FocusContext) -> bool {
    let recently_edited = focus.recent_edits.contains(&patch.path);
    let focused = focus.focused.as_ref().map(|(path, _)| path);
    match &patch.change {
        Change::Value(_) | Change::Checked(_) | Change::Selected(_) => {
            recently_edited || focused == Some(&patch.path)
        }
        Change::Children(_) => {
            recently_edited || focused.is_some_and(|path| path.starts_with(&patch.path))
        }
        Change::Text(_) => focused.is_some_and(|path| path.starts_with(&patch.path)),
        Change::Rebuild { .. } => focus.editing_team_management || focus.recent_team_management,
        Change::Attribute { .. } | Change::Class { .. } => false,
    }
}

struct Differ<'a> {
    tree: &'a LiveTree,
    patches: Vec<Patch>,
}

impl Differ<'_> {
    fn find(&self, scope: Option<&NodePath>, selector: &str) -> Option<NodePath> {
        let found = match scope {
            Some(scope) => self.tree.query_within(scope, selector),
            None => self.tree.query(selector),
        };
        if found.is_none() {
            trace!("Nothing matches {selector:?}, skipping");
        }
        found
    }

    fn push(&mut self, path: NodePath, change: Change) {
        self.patches.push(Patch { path, change });
    }

    fn text(&mut self, scope: Option<&NodePath>, selector: &str, text: &str) {
        let Some(path) = self.find(scope, selector) else {
            return;
        };
        if self
            .tree
            .element(&path)
            .is_some_and(|e| e.text_content() != text)
        {
            self.push(path, Change::Text(text.to_string()));
        }
    }

    fn attr(&mut self, scope: Option<&NodePath>, selector: &str, name: &str, value: &str) {
        let Some(path) = self.find(scope, selector) else {
            return;
        };
        if self
            .tree
            .element(&path)
            .is_some_and(|e| e.get_attr(name) != Some(value))
        {
            self.push(
                path,
                Change::Attribute {
                    name: name.to_string(),
                    value: Some(value.to_string()),
                },
            );
        }
    }

    fn class(&mut self, scope: Option<&NodePath>, selector: &str, class: &str, present: bool) {
        let Some(path) = self.find(scope, selector) else {
            return;
        };
        if self
            .tree
            .element(&path)
            .is_some_and(|e| e.has_class(class) != present)
        {
            self.push(
                path,
                Change::Class {
                    class: class.to_string(),
                    present,
                },
            );
        }
    }

    fn value(&mut self, scope: Option<&NodePath>, selector: &str, value: &str) {
        let Some(path) = self.find(scope, selector) else {
            return;
        };
        if self.tree.value(&path).is_some_and(|current| current != value) {
            self.push(path, Change::Value(value.to_string()));
        }
    }

    fn checked(&mut self, scope: Option<&NodePath>, selector: &str, checked: bool) {
        let Some(path) = self.find(scope, selector) else {
            return;
        };
        if self
            .tree
            .checked(&path)
            .is_some_and(|current| current != checked)
        {
            self.push(path, Change::Checked(checked));
        }
    }

    fn selected(&mut self, scope: Option<&NodePath>, selector: &str, value: &str) {
        let Some(path) = self.find(scope, selector) else {
            return;
        };
        if self.tree.value(&path).is_some_and(|current| current != value) {
            self.push(path, Change::Selected(value.to_string()));
        }
    }

    fn children(&mut self, path: NodePath, children: Vec<Node>) {
        if self
            .tree
            .element(&path)
            .is_some_and(|e| e.children != children)
        {
            self.push(path, Change::Children(children));
        }
    }

    fn scalars(&mut self, next: &ViewModel, renderer: &Renderer) {
        let phase = Phase::of(next);

        self.text(None, ".game-status", &next.game_status);
        self.text(None, ".player-count", &next.player_count);
        self.text(None, ".game-mode", &next.game_mode);
        self.text(None, ".round-counter", &renderer.round_text(next.round));

        self.class(None, ".countdown-section", HIDDEN_CLASS, !phase.is_running());
        self.text(None, ".countdown-timer", &render::countdown_text(&next.countdown));
        self.attr(
            None,
            ".countdown-progress-bar",
            "style",
            &render::progress_style(&next.countdown),
        );

        let song = phase.song();
        self.class(None, ".song-section", HIDDEN_CLASS, song.is_none());
        self.text(None, ".song-name", song.map_or("", |s| s.title.as_str()));
        self.text(None, ".song-artist", song.map_or("", |s| s.artist.as_str()));
        self.text(
            None,
            ".song-year",
            &song.map(|s| s.year.to_string()).unwrap_or_default(),
        );
        self.attr(
            None,
            ".song-image",
            "src",
            song.map_or("", |s| s.image_url.as_str()),
        );
        self.attr(
            None,
            ".song-link",
            "href",
            song.map_or("", |s| s.source_url.as_str()),
        );
    }

    fn settings(&mut self, next: &ViewModel, renderer: &Renderer) {
        let settings = &next.settings;

        let missing = next.missing_settings();
        self.class(None, ".setup-notice", HIDDEN_CLASS, missing.is_empty());
        if let Some(list) = self.find(None, ".setup-notice .missing-settings") {
            self.children(list, renderer.missing_setting_items(&missing));
        }

        self.value(None, ".timer-slider", &settings.timer_length.to_string());
        self.text(
            None,
            ".timer-value",
            &render::timer_value_text(settings.timer_length),
        );
        self.selected(
            None,
            ".team-count-select",
            &settings
                .team_count
                .map(|count| count.to_string())
                .unwrap_or_default(),
        );

        if let Some(select) = self.find(None, ".audio-player-select") {
            let listed = |id: &str| settings.available_players.iter().any(|p| p.id == id);
            let current = self.tree.value(&select);
            let selected = settings
                .selected_audio_player
                .as_deref()
                .filter(|id| listed(*id))
                .or(current.as_deref().filter(|id| listed(*id)));
            let options = renderer.player_options_selecting(&settings.available_players, selected);
            self.children(select, options);
        }
    }

    fn highscores(&mut self, next: &ViewModel, renderer: &Renderer) {
        self.text(None, ".highscore-title", &renderer.highscore_title(next.round));
        if let Some(container) = self.find(None, ".highscore-container") {
            self.children(container, renderer.highscore_items(next));
        }
    }

    fn overview(&mut self, next: &ViewModel, renderer: &Renderer) {
        if let Some(container) = self.find(None, ".teams-overview-container") {
            self.children(container, renderer.overview_items(next));
        }
    }

    fn teams(&mut self, previous: Option<&ViewModel>, next: &ViewModel, renderer: &Renderer) {
        let Some(container) = self.find(None, ".teams-container") else {
            return;
        };
        let phase = Phase::of(next);

        let items = self.tree.query_all_within(&container, ".team-item");
        let rendered: Vec<(Option<String>, Option<String>)> = items
            .iter()
            .map(|path| {
                let element = self.tree.element(path);
                (
                    element.and_then(|e| e.get_attr("data-team")).map(str::to_string),
                    element.and_then(|e| e.get_attr("data-panel")).map(str::to_string),
                )
            })
            .collect();
        let wanted: Vec<(Option<String>, Option<String>)> = next
            .participating_teams()
            .map(|team| {
                (
                    Some(team.id.clone()),
                    Some(TeamPanel::of(team, next).name().to_string()),
                )
            })
            .collect();

        let transition = previous.is_some_and(|p| p.countdown.is_running() != phase.is_running());
        let rendered_phase = self
            .tree
            .element(&container)
            .and_then(|e| e.get_attr("data-phase"));
        let stale_phase = rendered_phase != Some(phase.name());

        if transition || stale_phase || rendered != wanted {
            debug!(
                "Rebuilding teams (transition: {transition}, stale phase: {stale_phase}, {} teams)",
                wanted.len()
            );
            let markers = BTreeMap::from([("data-phase".to_string(), phase.name().to_string())]);
            self.push(
                container,
                Change::Rebuild {
                    children: renderer.team_items(next),
                    markers,
                },
            );
            return;
        }

        let rankings = next.rankings();
        for (team, item) in next.participating_teams().zip(items.iter()) {
            let scope = Some(item);
            self.attr(
                scope,
                ".team-header",
                "class",
                &render::team_header_class(next, team, &rankings),
            );
            let rank = rankings.get(&team.id).copied().unwrap_or(4);
            self.text(scope, ".rank-badge", &rank.to_string());
            self.text(scope, ".team-name", &team.name);
            self.text(scope, ".team-points", &renderer.points_text(team.points));

            match TeamPanel::of(team, next) {
                TeamPanel::Betting {
                    year_guess,
                    is_betting,
                } => {
                    self.value(scope, ".year-guess-input", &year_guess.to_string());
                    self.class(scope, ".bet-button", "betting-active", is_betting);
                    self.text(scope, ".bet-button", &renderer.bet_button_text(is_betting));
                    self.class(scope, ".betting-info", HIDDEN_CLASS, !is_betting);
                }
                TeamPanel::Result(outcome) => {
                    if let Some(section) = self.find(scope, ".bet-result-section") {
                        self.children(section, renderer.result_summary(&outcome));
                    }
                }
                TeamPanel::NoSong | TeamPanel::Empty => {}
            }
        }
    }

    fn team_management(&mut self, next: &ViewModel, renderer: &Renderer) {
        let Some(container) = self.find(None, ".team-management-container") else {
            return;
        };

        let items = self
            .tree
            .query_all_within(&container, ".team-management-item");
        let rendered: Vec<Option<&str>> = items
            .iter()
            .map(|path| self.tree.element(path).and_then(|e| e.get_attr("data-team")))
            .collect();
        let wanted: Vec<Option<&str>> = next.teams.iter().map(|t| Some(t.id.as_str())).collect();

        if rendered != wanted {
            debug!("Rebuilding team management for {} teams", wanted.len());
            self.push(
                container,
                Change::Rebuild {
                    children: renderer.team_management_items(next),
                    markers: BTreeMap::new(),
                },
            );
            return;
        }

        for (team, item) in next.teams.iter().zip(items.iter()) {
            let scope = Some(item);
            self.value(scope, ".team-input", &team.name);
            self.value(scope, ".team-points-input", &team.points.to_string());
            self.checked(scope, ".participating-checkbox", team.participating);
            if let Some(select) = self.find(scope, ".team-user-select") {
                self.children(select, renderer.user_options(team.user_id.as_deref()));
            }
        }
    }
}

/// Works out the patches that take `tree` from its current state to the one
/// `next` calls for. `previous` is the view model the tree was last brought up
/// to date with, if any.
pub fn diff(
    previous: Option<&ViewModel>,
    next: &ViewModel,
    tree: &LiveTree,
    renderer: &Renderer,
) -> PatchSet {
    diff_with(previous, next, tree, renderer, &FocusContext::of(tree))
}

/// Like [`diff`], holding back patches against an explicit [`FocusContext`]
pub fn diff_with(
    previous: Option<&ViewModel>,
    next: &ViewModel,
    tree: &LiveTree,
    renderer: &Renderer,
    focus: &FocusContext,
) -> PatchSet {
    let mut differ = Differ {
        tree,
        patches: Vec::new(),
    };
    differ.scalars(next, renderer);
    differ.settings(next, renderer);
    differ.highscores(next, renderer);
    differ.overview(next, renderer);
    differ.teams(previous, next, renderer);
    differ.team_management(next, renderer);

    let (held_back, patches): (Vec<Patch>, Vec<Patch>) = differ
        .patches
        .into_iter()
        .partition(|patch| clobbers_focus(patch, focus));

    for patch in &held_back {
        debug!(
            "Holding back {} change at {:?} while the user is busy there",
            patch.change.name(),
            patch.path
        );
    }

    PatchSet { patches, held_back }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyReport {
    /// Patches that changed the tree
    pub mutations: usize,
    pub rebuilds: usize,
    /// Patches whose target no longer exists
    pub missing: usize,
}

pub fn apply(tree: &mut LiveTree, patch_set: PatchSet) -> ApplyReport {
    let mut report = ApplyReport::default();

    for Patch { path, change } in patch_set.patches {
        if tree.element(&path).is_none() {
            trace!("Patch target {path:?} is gone, skipping");
            report.missing += 1;
            continue;
        }

        let changed = match change {
            Change::Text(text) => tree.set_text(&path, &text),
            Change::Attribute { name, value } => tree.set_attribute(&path, &name, value.as_deref()),
            Change::Class { class, present } => tree.set_class(&path, &class, present),
            Change::Value(value) => tree.set_value(&path, &value),
            Change::Checked(checked) => tree.set_checked(&path, checked),
            Change::Selected(value) => tree.select_option(&path, &value),
            Change::Children(children) => tree.replace_children(&path, children),
            Change::Rebuild { children, markers } => {
                let capture = tree.capture_focus(&path);
                let mut changed = tree.replace_children(&path, children);
                for (name, value) in &markers {
                    changed |= tree.set_attribute(&path, name, Some(value.as_str()));
                }
                if changed {
                    report.rebuilds += 1;
                    if let Some(capture) = capture {
                        tree.defer(Deferred::RestoreFocus(capture));
                    }
                }
                changed
            }
        };

        if changed {
            report.mutations += 1;
        }
    }

    report
}
