//! A small element tree that can be serialized as HTML and searched with a
//! subset of CSS selectors.

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter, Write},
    str::FromStr,
};
use thiserror::Error;

const VOID_ELEMENTS: [&str; 5] = ["br", "hr", "img", "input", "meta"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(e) => Some(e),
            Self::Text(_) => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Self::Element(e) => Some(e),
            Self::Text(_) => None,
        }
    }

    fn push_text(&self, out: &mut String) {
        match self {
            Self::Element(e) => {
                for child in &e.children {
                    child.push_text(out);
                }
            }
            Self::Text(t) => out.push_str(t),
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    /// Appends `class` to the class list
    pub fn class(mut self, class: &str) -> Self {
        self.add_class(class);
        self
    }

    pub fn class_if(self, condition: bool, class: &str) -> Self {
        if condition { self.class(class) } else { self }
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Sets a boolean attribute such as `checked` when `present` is true
    pub fn flag(self, name: &str, present: bool) -> Self {
        if present { self.attr(name, "") } else { self }
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I, N>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.get_attr("class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// Returns true if the class list changed
    pub fn add_class(&mut self, class: &str) -> bool {
        if self.has_class(class) {
            return false;
        }
        let list = self.attributes.entry("class".to_string()).or_default();
        if !list.is_empty() {
            list.push(' ');
        }
        list.push_str(class);
        true
    }

    /// Returns true if the class list changed
    pub fn remove_class(&mut self, class: &str) -> bool {
        if !self.has_class(class) {
            return false;
        }
        let remaining: Vec<&str> = self.classes().filter(|c| *c != class).collect();
        let remaining = remaining.join(" ");
        self.attributes.insert("class".to_string(), remaining);
        true
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.push_text(&mut out);
        }
        out
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }
}

fn escape_into(out: &mut Formatter<'_>, text: &str, in_attribute: bool) -> fmt::Result {
    for c in text.chars() {
        match c {
            '&' => out.write_str("&amp;")?,
            '<' => out.write_str("&lt;")?,
            '>' => out.write_str("&gt;")?,
            '"' if in_attribute => out.write_str("&quot;")?,
            c => out.write_char(c)?,
        }
    }
    Ok(())
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element(e) => e.fmt(f),
            Self::Text(t) => escape_into(f, t, false),
        }
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        for (name, value) in &self.attributes {
            write!(f, " {name}")?;
            if !value.is_empty() {
                f.write_str("=\"")?;
                escape_into(f, value, true)?;
                f.write_char('"')?;
            }
        }
        f.write_char('>')?;

        if VOID_ELEMENTS.contains(&self.tag.as_str()) {
            return Ok(());
        }

        for child in &self.children {
            child.fmt(f)?;
        }
        write!(f, "</{}>", self.tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("Empty selector")]
    Empty,
    #[error("Unexpected character {0:?} in selector")]
    UnexpectedChar(char),
    #[error("Unterminated attribute selector")]
    UnterminatedAttribute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttributeTest {
    Present(String),
    Equals(String, String),
}

/// One selector step: an optional tag followed by any number of id, class and
/// attribute tests, e.g. `input.team-input[type="text"]`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeTest>,
}

impl Compound {
    pub fn matches(&self, element: &Element) -> bool {
        if self.tag.as_ref().is_some_and(|tag| *tag != element.tag) {
            return false;
        }
        if self
            .id
            .as_ref()
            .is_some_and(|id| element.get_attr("id") != Some(id.as_str()))
        {
            return false;
        }
        if !self.classes.iter().all(|c| element.has_class(c)) {
            return false;
        }
        self.attributes.iter().all(|test| match test {
            AttributeTest::Present(name) => element.has_attr(name),
            AttributeTest::Equals(name, value) => element.get_attr(name) == Some(value.as_str()),
        })
    }
}

/// Compound steps joined by the descendant combinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    steps: Vec<Compound>,
}

impl Selector {
    pub fn parse(text: &str) -> Result<Self, SelectorError> {
        let steps = text
            .split_whitespace()
            .map(parse_compound)
            .collect::<Result<Vec<_>, _>>()?;
        if steps.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Self { steps })
    }

    /// Checks `element` against the last step and its `ancestors` (outermost
    /// first) against the earlier steps
    pub fn matches(&self, element: &Element, ancestors: &[&Element]) -> bool {
        let Some((last, rest)) = self.steps.split_last() else {
            return false;
        };
        if !last.matches(element) {
            return false;
        }

        let mut remaining = rest.iter().rev().peekable();
        for ancestor in ancestors.iter().rev() {
            match remaining.peek() {
                Some(step) if step.matches(ancestor) => {
                    remaining.next();
                }
                Some(_) => {}
                None => break,
            }
        }
        remaining.peek().is_none()
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&c) = chars.peek() {
        if !is_ident_char(c) {
            break;
        }
        ident.push(c);
        chars.next();
    }
    ident
}

fn parse_compound(text: &str) -> Result<Compound, SelectorError> {
    let mut compound = Compound::default();
    let mut chars = text.chars().peekable();

    let tag = take_ident(&mut chars);
    if !tag.is_empty() {
        compound.tag = Some(tag);
    }

    while let Some(c) = chars.next() {
        match c {
            '.' | '#' => {
                let ident = take_ident(&mut chars);
                if ident.is_empty() {
                    return Err(SelectorError::UnexpectedChar(c));
                }
                if c == '.' {
                    compound.classes.push(ident);
                } else {
                    compound.id = Some(ident);
                }
            }
            '[' => {
                let name = take_ident(&mut chars);
                if name.is_empty() {
                    return Err(SelectorError::UnexpectedChar('['));
                }
                match chars.next() {
                    Some(']') => compound.attributes.push(AttributeTest::Present(name)),
                    Some('=') => {
                        let quoted = chars.peek() == Some(&'"');
                        if quoted {
                            chars.next();
                        }
                        let mut value = String::new();
                        loop {
                            match chars.next() {
                                Some('"') if quoted => break,
                                Some(']') if !quoted => break,
                                Some(c) => value.push(c),
                                None => return Err(SelectorError::UnterminatedAttribute),
                            }
                        }
                        if quoted && chars.next() != Some(']') {
                            return Err(SelectorError::UnterminatedAttribute);
                        }
                        compound.attributes.push(AttributeTest::Equals(name, value));
                    }
                    Some(c) => return Err(SelectorError::UnexpectedChar(c)),
                    None => return Err(SelectorError::UnterminatedAttribute),
                }
            }
            c => return Err(SelectorError::UnexpectedChar(c)),
        }
    }

    Ok(compound)
}
