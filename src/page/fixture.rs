use crate::error::{HarvestError, Result};
use crate::page::clock::Clock;
use crate::page::dom;
use crate::page::{HostPage, NodePath};
use async_trait::async_trait;
use scraper::{ElementRef, Html};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const GOTO_ATTR: &str = "data-goto";
const GOTO_DELAY_ATTR: &str = "data-goto-delay-ms";
const ESCAPE_ATTR: &str = "data-escape";
const FAIL_ATTR: &str = "data-fail";

/// Everything that happened to a fixture, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureEvent {
    Clicked { state: String, target: String },
    Escape { state: String },
    Transition { from: String, to: String },
}

#[derive(Debug, Clone)]
struct PendingTransition {
    target: String,
    due: Duration,
}

/// Scripted stand-in for the host application.
///
/// Each state is a complete HTML document. Clicking an element (or a
/// descendant of one) carrying `data-goto="state"` switches to that state,
/// optionally after `data-goto-delay-ms` on the shared clock. Escape follows
/// `data-escape` on the current `<html>` element, and a state whose `<html>`
/// carries `data-fail` makes every snapshot fail.
pub struct FixtureSite {
    states: HashMap<String, String>,
    current: String,
    pending: Option<PendingTransition>,
    clock: Arc<dyn Clock>,
    events: Vec<FixtureEvent>,
}

impl FixtureSite {
    pub fn new(start: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            states: HashMap::new(),
            current: start.to_string(),
            pending: None,
            clock,
            events: Vec::new(),
        }
    }

    pub fn with_state(mut self, name: &str, html: impl Into<String>) -> Self {
        self.states.insert(name.to_string(), html.into());
        self
    }

    /// Loads every `*.html` file in `dir` as a state named after its file stem.
    /// The run starts in `index`.
    pub fn from_dir<P: AsRef<Path>>(dir: P, clock: Arc<dyn Clock>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| HarvestError::Fixture {
            message: format!("Cannot read fixture directory {}: {}", dir.display(), e),
        })?;

        let mut site = Self::new("index", clock);
        for entry in entries {
            let path = entry?.path();
            let is_html = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("html"));
            if !is_html {
                continue;
            }
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            let content = std::fs::read_to_string(&path)?;
            site.states.insert(stem, content);
        }

        site.validate()?;
        Ok(site)
    }

    /// Checks that the start state exists and every `data-goto` target is known.
    pub fn validate(&self) -> Result<()> {
        if !self.states.contains_key(&self.current) {
            return Err(HarvestError::Fixture {
                message: format!("Start state '{}' is missing", self.current),
            });
        }

        for (name, content) in &self.states {
            for target in goto_targets(content) {
                if !self.states.contains_key(&target) {
                    return Err(HarvestError::Fixture {
                        message: format!("State '{}' links to unknown state '{}'", name, target),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn current_state(&self) -> &str {
        &self.current
    }

    pub fn events(&self) -> &[FixtureEvent] {
        &self.events
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    fn settle_pending(&mut self) {
        let due = matches!(&self.pending, Some(p) if self.clock.now() >= p.due);
        if due {
            if let Some(pending) = self.pending.take() {
                self.enter(pending.target);
            }
        }
    }

    fn enter(&mut self, target: String) {
        if target != self.current {
            self.events.push(FixtureEvent::Transition {
                from: self.current.clone(),
                to: target.clone(),
            });
        }
        self.current = target;
    }

    fn current_html(&self) -> Result<&str> {
        self.states
            .get(&self.current)
            .map(String::as_str)
            .ok_or_else(|| HarvestError::Fixture {
                message: format!("Unknown state '{}'", self.current),
            })
    }
}

fn goto_targets(content: &str) -> Vec<String> {
    let html = Html::parse_document(content);
    let mut targets: Vec<String> = html
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter_map(|el| el.value().attr(GOTO_ATTR).map(str::to_string))
        .collect();
    if let Some(escape) = html.root_element().value().attr(ESCAPE_ATTR) {
        targets.push(escape.to_string());
    }
    targets
}

/// Finds the `data-goto` that a click on `target` would trigger.
fn click_target(content: &str, target: &NodePath) -> Result<Option<(String, u64)>> {
    let html = Html::parse_document(content);
    let element = target.resolve(&html).ok_or_else(|| HarvestError::ElementNotFound {
        path: target.to_css(),
    })?;

    Ok(dom::closest(element, |el| el.value().attr(GOTO_ATTR).is_some()).and_then(|el| {
        let goto = el.value().attr(GOTO_ATTR)?.to_string();
        let delay = el
            .value()
            .attr(GOTO_DELAY_ATTR)
            .and_then(|d| d.trim().parse::<u64>().ok())
            .unwrap_or(0);
        Some((goto, delay))
    }))
}

fn root_attr(content: &str, name: &str) -> Option<String> {
    let html = Html::parse_document(content);
    let value = html.root_element().value().attr(name);
    value.map(str::to_string)
}

#[async_trait]
impl HostPage for FixtureSite {
    async fn snapshot(&mut self) -> Result<String> {
        self.settle_pending();
        let content = self.current_html()?;
        if root_attr(content, FAIL_ATTR).is_some() {
            return Err(HarvestError::Page {
                message: format!("Injected failure in state '{}'", self.current),
            });
        }
        Ok(content.to_string())
    }

    async fn click(&mut self, target: &NodePath) -> Result<()> {
        self.settle_pending();
        let outcome = click_target(self.current_html()?, target)?;
        self.events.push(FixtureEvent::Clicked {
            state: self.current.clone(),
            target: outcome
                .as_ref()
                .map(|(goto, _)| goto.clone())
                .unwrap_or_default(),
        });

        if let Some((goto, delay_ms)) = outcome {
            if !self.states.contains_key(&goto) {
                return Err(HarvestError::Fixture {
                    message: format!("Unknown state '{}'", goto),
                });
            }
            if delay_ms == 0 {
                self.pending = None;
                self.enter(goto);
            } else {
                self.pending = Some(PendingTransition {
                    target: goto,
                    due: self.clock.now() + Duration::from_millis(delay_ms),
                });
            }
        }
        Ok(())
    }

    async fn press_escape(&mut self) -> Result<()> {
        self.settle_pending();
        self.events.push(FixtureEvent::Escape {
            state: self.current.clone(),
        });
        if let Some(target) = root_attr(self.current_html()?, ESCAPE_ATTR) {
            if self.states.contains_key(&target) {
                self.pending = None;
                self.enter(target);
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("fixture ({} states, at '{}')", self.states.len(), self.current)
    }
}
