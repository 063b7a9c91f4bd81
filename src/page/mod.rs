pub mod chromium;
pub mod clock;
pub mod dom;
pub mod fixture;

pub use chromium::ChromiumPage;
pub use clock::{Clock, ManualClock, TokioClock};
pub use fixture::{FixtureEvent, FixtureSite};

use crate::error::Result;
use async_trait::async_trait;
use scraper::{ElementRef, Html};
use std::fmt;

/// The live page being automated.
///
/// Implementations hand out serialized DOM snapshots instead of live handles,
/// so callers parse what they need and never keep page objects across an
/// `.await`. Form state (`value`, `checked`, `selected`) and computed
/// visibility are expected to be reflected into attributes of the snapshot.
#[async_trait]
pub trait HostPage: Send {
    async fn snapshot(&mut self) -> Result<String>;

    async fn click(&mut self, target: &NodePath) -> Result<()>;

    async fn press_escape(&mut self) -> Result<()>;

    fn describe(&self) -> String;
}

/// Position of an element as 1-based element-child indices below `<html>`.
///
/// Paths order the same way their elements appear in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn of(element: ElementRef<'_>) -> Self {
        let mut indices = Vec::new();
        let mut current = element;

        while let Some(parent) = current.parent().and_then(ElementRef::wrap) {
            let position = parent
                .children()
                .filter_map(ElementRef::wrap)
                .position(|child| child.id() == current.id())
                .map(|index| index + 1)
                .unwrap_or(1);
            indices.push(position);
            current = parent;
        }

        indices.reverse();
        Self(indices)
    }

    pub fn resolve<'a>(&self, html: &'a Html) -> Option<ElementRef<'a>> {
        let mut current = html.root_element();
        for &index in &self.0 {
            current = current
                .children()
                .filter_map(ElementRef::wrap)
                .nth(index.checked_sub(1)?)?;
        }
        Some(current)
    }

    pub fn to_css(&self) -> String {
        let mut css = String::from("html");
        for index in &self.0 {
            css.push_str(&format!(" > :nth-child({})", index));
        }
        css
    }

    pub fn contains(&self, other: &NodePath) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_css())
    }
}
