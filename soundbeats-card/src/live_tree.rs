//! The mounted element tree, along with the state a browser keeps next to it:
//! which control has focus, its text selection, and tasks deferred to the next
//! scheduling turn.

use crate::markup::{Element, Node, Selector};
use log::{debug, trace, warn};
use std::collections::VecDeque;

/// Child indices from the root to an element
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// True when `self` is `ancestor` or lies somewhere below it
    pub fn starts_with(&self, ancestor: &NodePath) -> bool {
        self.0.starts_with(&ancestor.0)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }
}

/// The kinds of form controls whose live state matters to reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Text,
    Checkbox,
    Select,
    Slider,
}

impl ControlKind {
    pub fn of(element: &Element) -> Option<Self> {
        match element.tag.as_str() {
            "select" => Some(Self::Select),
            "textarea" => Some(Self::Text),
            "input" => match element.get_attr("type").unwrap_or("text") {
                "checkbox" => Some(Self::Checkbox),
                "range" => Some(Self::Slider),
                "text" | "number" | "search" => Some(Self::Text),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Focus {
    pub path: NodePath,
    pub selection: Option<Selection>,
}

/// What is needed to find the equivalent control again after its subtree has
/// been replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusCapture {
    pub container: NodePath,
    pub team_id: String,
    pub kind: ControlKind,
    pub control_class: Option<String>,
    pub selection: Option<Selection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferred {
    RestoreFocus(FocusCapture),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LiveTree {
    root: Element,
    focus: Option<Focus>,
    deferred: VecDeque<Deferred>,
}

impl LiveTree {
    pub fn new(root: Element) -> Self {
        Self {
            root,
            focus: None,
            deferred: VecDeque::new(),
        }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn html(&self) -> String {
        self.root.to_string()
    }

    pub fn element(&self, path: &NodePath) -> Option<&Element> {
        let mut element = &self.root;
        for &index in path.indices() {
            element = element.children.get(index)?.as_element()?;
        }
        Some(element)
    }

    fn element_mut(&mut self, path: &NodePath) -> Option<&mut Element> {
        let mut element = &mut self.root;
        for &index in path.indices() {
            element = element.children.get_mut(index)?.as_element_mut()?;
        }
        Some(element)
    }

    /// The element at `path` and all its ancestors, outermost first
    fn lineage(&self, path: &NodePath) -> Option<Vec<&Element>> {
        let mut lineage = vec![&self.root];
        let mut element = &self.root;
        for &index in path.indices() {
            element = element.children.get(index)?.as_element()?;
            lineage.push(element);
        }
        Some(lineage)
    }

    pub fn query_all(&self, selector: &str) -> Vec<NodePath> {
        let Some(selector) = parse_selector(selector) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        if selector.matches(&self.root, &[]) {
            found.push(NodePath::root());
        }
        let mut ancestors = Vec::new();
        let mut path = Vec::new();
        collect(&self.root, &mut path, &mut ancestors, &selector, &mut found);
        found
    }

    pub fn query(&self, selector: &str) -> Option<NodePath> {
        self.query_all(selector).into_iter().next()
    }

    /// Matches strictly below `scope`, with the full ancestor chain available
    /// to the selector
    pub fn query_all_within(&self, scope: &NodePath, selector: &str) -> Vec<NodePath> {
        let Some(selector) = parse_selector(selector) else {
            return Vec::new();
        };
        let Some(mut lineage) = self.lineage(scope) else {
            return Vec::new();
        };
        let Some(scope_element) = lineage.pop() else {
            return Vec::new();
        };
        let mut found = Vec::new();
        let mut path = scope.indices().to_vec();
        collect(scope_element, &mut path, &mut lineage, &selector, &mut found);
        found
    }

    pub fn query_within(&self, scope: &NodePath, selector: &str) -> Option<NodePath> {
        self.query_all_within(scope, selector).into_iter().next()
    }

    /// Every element strictly below `scope`, in document order
    pub fn descendants(&self, scope: &NodePath) -> Vec<NodePath> {
        fn walk(element: &Element, path: &NodePath, out: &mut Vec<NodePath>) {
            for (index, child) in element.children.iter().enumerate() {
                if let Node::Element(child) = child {
                    let child_path = path.child(index);
                    out.push(child_path.clone());
                    walk(child, &child_path, out);
                }
            }
        }
        let mut out = Vec::new();
        if let Some(element) = self.element(scope) {
            walk(element, scope, &mut out);
        }
        out
    }

    pub fn text(&self, selector: &str) -> Option<String> {
        self.query(selector)
            .and_then(|path| self.element(&path))
            .map(Element::text_content)
    }

    pub fn attr(&self, selector: &str, name: &str) -> Option<String> {
        self.query(selector)
            .and_then(|path| self.element(&path))
            .and_then(|e| e.get_attr(name))
            .map(str::to_string)
    }

    pub fn has_class(&self, selector: &str, class: &str) -> bool {
        self.query(selector)
            .and_then(|path| self.element(&path))
            .is_some_and(|e| e.has_class(class))
    }

    /// Nearest value of `name` on the element or one of its ancestors
    pub fn closest_attr(&self, path: &NodePath, name: &str) -> Option<String> {
        let lineage = self.lineage(path)?;
        lineage
            .iter()
            .rev()
            .find_map(|e| e.get_attr(name))
            .map(str::to_string)
    }

    pub fn control_kind(&self, path: &NodePath) -> Option<ControlKind> {
        self.element(path).and_then(ControlKind::of)
    }

    /// Current value of a control: the `value` of an input, or the value of
    /// the selected option of a select (the first option when none is marked)
    pub fn value(&self, path: &NodePath) -> Option<String> {
        let element = self.element(path)?;
        match ControlKind::of(element)? {
            ControlKind::Select => {
                let options: Vec<&Element> = element
                    .child_elements()
                    .filter(|e| e.tag == "option")
                    .collect();
                options
                    .iter()
                    .find(|o| o.has_attr("selected"))
                    .or(options.first())
                    .map(|o| o.get_attr("value").unwrap_or_default().to_string())
            }
            ControlKind::Checkbox => None,
            ControlKind::Text | ControlKind::Slider => {
                Some(element.get_attr("value").unwrap_or_default().to_string())
            }
        }
    }

    pub fn checked(&self, path: &NodePath) -> Option<bool> {
        let element = self.element(path)?;
        (ControlKind::of(element)? == ControlKind::Checkbox).then(|| element.has_attr("checked"))
    }

    pub fn focus(&self) -> Option<&Focus> {
        self.focus.as_ref()
    }

    /// Gives focus to a form control. Returns false if `path` is not one.
    pub fn set_focus(&mut self, path: &NodePath) -> bool {
        let Some(kind) = self.control_kind(path) else {
            return false;
        };
        let selection = match kind {
            ControlKind::Text => {
                let end = self.value(path).map_or(0, |v| v.chars().count());
                Some(Selection { start: end, end })
            }
            _ => None,
        };
        self.focus = Some(Focus {
            path: path.clone(),
            selection,
        });
        true
    }

    pub fn blur(&mut self) {
        self.focus = None;
    }

    /// Moves the caret of the focused text control, clamped to its value
    pub fn set_selection(&mut self, start: usize, end: usize) -> bool {
        let Some(focus) = &self.focus else {
            return false;
        };
        if self.control_kind(&focus.path) != Some(ControlKind::Text) {
            return false;
        }
        let len = self.value(&focus.path).map_or(0, |v| v.chars().count());
        let end = end.min(len);
        let start = start.min(end);
        if let Some(focus) = &mut self.focus {
            focus.selection = Some(Selection { start, end });
        }
        true
    }

    pub fn set_text(&mut self, path: &NodePath, text: &str) -> bool {
        let Some(element) = self.element_mut(path) else {
            return false;
        };
        if element.children.len() == 1 && element.children[0] == Node::Text(text.to_string()) {
            return false;
        }
        element.children = vec![Node::Text(text.to_string())];
        true
    }

    /// Sets (`Some`) or removes (`None`) an attribute
    pub fn set_attribute(&mut self, path: &NodePath, name: &str, value: Option<&str>) -> bool {
        let Some(element) = self.element_mut(path) else {
            return false;
        };
        match value {
            Some(value) if element.get_attr(name) == Some(value) => false,
            Some(value) => {
                element.attributes.insert(name.to_string(), value.to_string());
                true
            }
            None => element.attributes.remove(name).is_some(),
        }
    }

    pub fn set_class(&mut self, path: &NodePath, class: &str, present: bool) -> bool {
        let Some(element) = self.element_mut(path) else {
            return false;
        };
        if present {
            element.add_class(class)
        } else {
            element.remove_class(class)
        }
    }

    pub fn set_value(&mut self, path: &NodePath, value: &str) -> bool {
        if self.value(path).as_deref() == Some(value) {
            return false;
        }
        match self.control_kind(path) {
            Some(ControlKind::Select) => self.select_option(path, value),
            Some(ControlKind::Text | ControlKind::Slider) => {
                let changed = self.set_attribute(path, "value", Some(value));
                if let Some(focus) = self.focus.as_mut().filter(|f| f.path == *path) {
                    let len = value.chars().count();
                    focus.selection = Some(Selection { start: len, end: len });
                }
                changed
            }
            Some(ControlKind::Checkbox) | None => false,
        }
    }

    pub fn set_checked(&mut self, path: &NodePath, checked: bool) -> bool {
        if self.checked(path).is_none_or(|current| current == checked) {
            return false;
        }
        let value = if checked { Some("") } else { None };
        self.set_attribute(path, "checked", value)
    }

    /// Marks the option with `value` as selected. Returns false if no option has
    /// that value or it was already the selected one.
    pub fn select_option(&mut self, path: &NodePath, value: &str) -> bool {
        if self.control_kind(path) != Some(ControlKind::Select)
            || self.value(path).as_deref() == Some(value)
        {
            return false;
        }
        let Some(element) = self.element_mut(path) else {
            return false;
        };
        let has_option = element
            .child_elements()
            .any(|o| o.tag == "option" && o.get_attr("value").unwrap_or_default() == value);
        if !has_option {
            return false;
        }
        for option in element.children.iter_mut().filter_map(Node::as_element_mut) {
            if option.tag != "option" {
                continue;
            }
            if option.get_attr("value").unwrap_or_default() == value {
                option.attributes.insert("selected".to_string(), String::new());
            } else {
                option.attributes.remove("selected");
            }
        }
        true
    }

    /// Swaps out every child of the element at `path`. Focus inside the old
    /// children is lost, the same as when a browser detaches a focused node.
    pub fn replace_children(&mut self, path: &NodePath, children: Vec<Node>) -> bool {
        let Some(element) = self.element_mut(path) else {
            return false;
        };
        if element.children == children {
            return false;
        }
        element.children = children;
        if self
            .focus
            .as_ref()
            .is_some_and(|f| f.path != *path && f.path.starts_with(path))
        {
            debug!("Focused control was detached by a rebuild");
            self.focus = None;
        }
        true
    }

    /// Records what is needed to refocus the control under `container` that
    /// has focus right now, if there is one
    pub fn capture_focus(&self, container: &NodePath) -> Option<FocusCapture> {
        let focus = self.focus.as_ref()?;
        if focus.path == *container || !focus.path.starts_with(container) {
            return None;
        }
        let kind = self.control_kind(&focus.path)?;
        let team_id = self.closest_attr(&focus.path, "data-team")?;
        let control_class = self
            .element(&focus.path)
            .and_then(|e| e.classes().next())
            .map(str::to_string);
        Some(FocusCapture {
            container: container.clone(),
            team_id,
            kind,
            control_class,
            selection: focus.selection,
        })
    }

    pub fn defer(&mut self, task: Deferred) {
        self.deferred.push_back(task);
    }

    pub fn pending_deferred(&self) -> usize {
        self.deferred.len()
    }

    /// Runs the tasks queued so far. Returns how many ran.
    pub fn run_deferred(&mut self) -> usize {
        let tasks: Vec<Deferred> = self.deferred.drain(..).collect();
        let count = tasks.len();
        for task in tasks {
            match task {
                Deferred::RestoreFocus(capture) => {
                    if !self.restore_focus(&capture) {
                        debug!(
                            "Could not restore focus to {:?} control of {}",
                            capture.kind, capture.team_id
                        );
                    }
                }
            }
        }
        count
    }

    fn restore_focus(&mut self, capture: &FocusCapture) -> bool {
        let item_selector = format!(r#"[data-team="{}"]"#, capture.team_id);
        let Some(item) = self.query_within(&capture.container, &item_selector) else {
            return false;
        };
        let target = self.descendants(&item).into_iter().find(|path| {
            self.element(path).is_some_and(|e| {
                ControlKind::of(e) == Some(capture.kind)
                    && capture
                        .control_class
                        .as_ref()
                        .is_none_or(|class| e.has_class(class))
            })
        });
        let Some(target) = target else {
            return false;
        };

        trace!("Restoring focus to {target:?}");
        self.set_focus(&target);
        if let Some(selection) = capture.selection {
            self.set_selection(selection.start, selection.end);
        }
        true
    }
}

fn parse_selector(text: &str) -> Option<Selector> {
    match Selector::parse(text) {
        Ok(selector) => Some(selector),
        Err(e) => {
            warn!("Invalid selector {text:?}: {e}");
            None
        }
    }
}

fn collect<'a>(
    element: &'a Element,
    path: &mut Vec<usize>,
    ancestors: &mut Vec<&'a Element>,
    selector: &Selector,
    found: &mut Vec<NodePath>,
) {
    ancestors.push(element);
    for (index, child) in element.children.iter().enumerate() {
        let Node::Element(child) = child else {
            continue;
        };
        path.push(index);
        if selector.matches(child, ancestors) {
            found.push(NodePath(path.clone()));
        }
        collect(child, path, ancestors, selector, found);
        path.pop();
    }
    ancestors.pop();
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> LiveTree {
        LiveTree::new(
            Element::new("div").class("card").child(
                Element::new("div")
                    .class("team-management-container")
                    .child(
                        Element::new("div")
                            .class("team-management-item")
                            .attr("data-team", "team_1")
                            .child(
                                Element::new("input")
                                    .class("team-input")
                                    .attr("type", "text")
                                    .attr("value", "Rockers"),
                            )
                            .child(
                                Element::new("input")
                                    .class("participating-checkbox")
                                    .attr("type", "checkbox")
                                    .flag("checked", true),
                            ),
                    )
                    .child(
                        Element::new("select")
                            .class("audio-player-select")
                            .child(Element::new("option").attr("value", "").text("None"))
                            .child(
                                Element::new("option")
                                    .attr("value", "media_player.den")
                                    .text("Den"),
                            ),
                    ),
            ),
        )
    }

    #[test]
    fn test_query_and_paths() {
        let tree = sample();
        let input = tree.query(".team-input").unwrap();
        assert_eq!(input.indices(), &[0, 0, 0]);
        assert_eq!(tree.closest_attr(&input, "data-team").as_deref(), Some("team_1"));

        let container = tree.query(".team-management-container").unwrap();
        assert!(input.starts_with(&container));
        assert_eq!(tree.query_all_within(&container, "input").len(), 2);
        assert_eq!(
            tree.query_within(&container, ".card .team-input"),
            Some(input.clone())
        );
        assert_eq!(tree.descendants(&container).len(), 6);
        assert!(tree.query(".missing").is_none());
        assert!(tree.query("!!").is_none());
    }

    #[test]
    fn test_control_values() {
        let mut tree = sample();
        let select = tree.query(".audio-player-select").unwrap();
        assert_eq!(tree.value(&select).as_deref(), Some(""));
        assert!(tree.select_option(&select, "media_player.den"));
        assert_eq!(tree.value(&select).as_deref(), Some("media_player.den"));
        assert!(!tree.select_option(&select, "media_player.den"));
        assert!(!tree.select_option(&select, "media_player.gone"));

        let checkbox = tree.query(".participating-checkbox").unwrap();
        assert_eq!(tree.checked(&checkbox), Some(true));
        assert!(tree.set_checked(&checkbox, false));
        assert!(!tree.set_checked(&checkbox, false));
        assert_eq!(tree.checked(&checkbox), Some(false));

        let input = tree.query(".team-input").unwrap();
        assert!(!tree.set_value(&input, "Rockers"));
        assert!(tree.set_value(&input, "Rollers"));
        assert_eq!(tree.value(&input).as_deref(), Some("Rollers"));
    }

    #[test]
    fn test_focus_and_selection() {
        let mut tree = sample();
        let container = tree.query(".card").unwrap();
        assert!(!tree.set_focus(&container));

        let input = tree.query(".team-input").unwrap();
        assert!(tree.set_focus(&input));
        assert_eq!(
            tree.focus().unwrap().selection,
            Some(Selection { start: 7, end: 7 })
        );
        assert!(tree.set_selection(2, 40));
        assert_eq!(
            tree.focus().unwrap().selection,
            Some(Selection { start: 2, end: 7 })
        );
        tree.blur();
        assert_eq!(tree.focus(), None);
        assert!(!tree.set_selection(0, 1));
    }

    #[test]
    fn test_rebuild_detaches_focus_and_restore_finds_it_again() {
        let mut tree = sample();
        let container = tree.query(".team-management-container").unwrap();
        let input = tree.query(".team-input").unwrap();
        tree.set_focus(&input);
        tree.set_selection(1, 3);

        let capture = tree.capture_focus(&container).unwrap();
        assert_eq!(capture.team_id, "team_1");
        assert_eq!(capture.kind, ControlKind::Text);
        assert_eq!(capture.control_class.as_deref(), Some("team-input"));

        let rebuilt = tree.element(&container).unwrap().children.clone();
        let mut changed = rebuilt.clone();
        changed.reverse();
        assert!(tree.replace_children(&container, changed));
        assert_eq!(tree.focus(), None);

        tree.defer(Deferred::RestoreFocus(capture));
        assert_eq!(tree.pending_deferred(), 1);
        assert_eq!(tree.run_deferred(), 1);
        assert_eq!(tree.pending_deferred(), 0);

        let moved = tree.query(".team-input").unwrap();
        assert_ne!(moved, input);
        let focus = tree.focus().unwrap();
        assert_eq!(focus.path, moved);
        assert_eq!(focus.selection, Some(Selection { start: 1, end: 3 }));
    }

    #[test]
    fn test_html_output() {
        let tree = LiveTree::new(Element::new("p").text("a < b"));
        assert_eq!(tree.html(), "<p>a &lt; b</p>");
    }
}
