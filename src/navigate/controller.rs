use crate::config::Config;
use crate::detect::{Baseline, Container, ContainerKind, Detector, PageState};
use crate::error::Result;
use crate::navigate::wait::{Controls, Delays};
use crate::page::{dom, Clock, HostPage, NodePath};
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    List,
    TransitioningToDetail,
    Detail,
    TransitioningToList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened(Container),
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStep {
    Affordance,
    TextControl,
    Backdrop,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    AlreadyClosed,
    Closed(CloseStep),
    StillOpen,
}

const CLOSE_STEPS: [CloseStep; 4] = [
    CloseStep::Affordance,
    CloseStep::TextControl,
    CloseStep::Backdrop,
    CloseStep::Escape,
];

fn strip_symbols(text: &str) -> &str {
    text.trim_matches(|c: char| !c.is_alphanumeric())
}

/// Drives list/detail transitions on a host page, confirming each one with
/// the detector.
pub struct NavigationController<P: HostPage> {
    page: P,
    clock: Arc<dyn Clock>,
    detector: Detector,
    delays: Delays,
    baseline: Option<Baseline>,
    state: NavState,
    section_controls: Selector,
    close_selectors: Vec<Selector>,
    close_words: Vec<String>,
    text_controls: Selector,
    backdrop_selectors: Vec<Selector>,
    next_words: Vec<String>,
    next_selectors: Vec<Selector>,
    pager_controls: Selector,
}

impl<P: HostPage> NavigationController<P> {
    pub fn new(page: P, clock: Arc<dyn Clock>, config: &Config, delays: Delays) -> Result<Self> {
        let detection = &config.detection;
        let fold_all = |words: &[String]| words.iter().map(|w| dom::fold(w)).collect::<Vec<_>>();

        Ok(Self {
            page,
            clock,
            detector: Detector::new(detection, &config.list.view_selectors)?,
            delays,
            baseline: None,
            state: NavState::List,
            section_controls: dom::selector(&detection.section_controls)?,
            close_selectors: dom::selectors(&detection.close_selectors)?,
            close_words: fold_all(&detection.close_words),
            text_controls: dom::selector("a, button, [role=\"button\"], input[type=\"button\"]")?,
            backdrop_selectors: dom::selectors(&detection.backdrop_selectors)?,
            next_words: fold_all(&detection.next_words),
            next_selectors: dom::selectors(&detection.next_selectors)?,
            pager_controls: dom::selector("a, button, .paginate_button, li > span")?,
        })
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn delays(&self) -> &Delays {
        &self.delays
    }

    pub fn set_delays(&mut self, delays: Delays) {
        self.delays = delays;
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn into_page(self) -> P {
        self.page
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Runs `read` against the current page.
    pub async fn inspect<T>(&mut self, controls: &mut Controls, read: impl FnOnce(&Html, &Detector) -> T) -> Result<T> {
        controls.checkpoint()?;
        let content = self.page.snapshot().await?;
        Ok(self.parse_with(&content, |html, this| read(html, &this.detector)))
    }

    /// Runs `read` against the detail container, if one is visible.
    pub async fn with_detail<T>(
        &mut self,
        controls: &mut Controls,
        read: impl FnOnce(ElementRef<'_>) -> T,
    ) -> Result<Option<T>> {
        controls.checkpoint()?;
        let content = self.page.snapshot().await?;
        Ok(self.parse_with(&content, |html, this| {
            this.detector
                .find(html, ContainerKind::Detail, this.baseline.as_ref())
                .map(|(container, _)| read(container))
        }))
    }

    /// Runs `read` against the list table when the list is ready.
    pub async fn with_list<T>(
        &mut self,
        controls: &mut Controls,
        read: impl FnOnce(ElementRef<'_>, &Detector) -> T,
    ) -> Result<Option<T>> {
        controls.checkpoint()?;
        let content = self.page.snapshot().await?;
        Ok(self.parse_with(&content, |html, this| {
            if !this.list_ready(html) {
                return None;
            }
            this.detector
                .find(html, ContainerKind::List, None)
                .map(|(table, _)| read(table, &this.detector))
        }))
    }

    fn parse_with<T>(&self, content: &str, check: impl FnOnce(&Html, &Self) -> T) -> T {
        let html = Html::parse_document(content);
        check(&html, self)
    }

    fn list_ready(&self, html: &Html) -> bool {
        self.detector.page_state(html, self.baseline.as_ref()) == PageState::List
    }

    /// Sleeps for `duration` in poll-sized steps, honoring commands between steps.
    pub async fn settle(&mut self, controls: &mut Controls, duration: Duration) -> Result<()> {
        let start = self.clock.now();
        loop {
            controls.checkpoint()?;
            let elapsed = self.clock.now().saturating_sub(start);
            if elapsed >= duration {
                return Ok(());
            }
            self.clock.sleep(self.delays.poll.min(duration - elapsed)).await;
        }
    }

    /// Polls the page until `check` yields a value or `timeout` elapses.
    ///
    /// With `lenient`, snapshot failures count as "not yet" instead of failing the wait.
    async fn poll_until<T>(
        &mut self,
        controls: &mut Controls,
        timeout: Duration,
        lenient: bool,
        check: impl Fn(&Html, &Self) -> Option<T>,
    ) -> Result<Option<T>> {
        let start = self.clock.now();
        loop {
            controls.checkpoint()?;
            match self.page.snapshot().await {
                Ok(content) => {
                    if let Some(found) = self.parse_with(&content, &check) {
                        return Ok(Some(found));
                    }
                }
                Err(e) if !lenient || e.is_fatal() => return Err(e),
                Err(_) => {}
            }

            let elapsed = self.clock.now().saturating_sub(start);
            if elapsed >= timeout {
                return Ok(None);
            }
            self.clock.sleep(self.delays.poll.min(timeout - elapsed)).await;
        }
    }

    /// Waits for the list to be the active view, refreshing the baseline when it is.
    pub async fn wait_for_list(&mut self, controls: &mut Controls, timeout: Duration) -> Result<bool> {
        let baseline = self
            .poll_until(controls, timeout, true, |html, this| {
                this.list_ready(html).then(|| Baseline::capture(html))
            })
            .await?;

        match baseline {
            Some(baseline) => {
                self.baseline = Some(baseline);
                self.state = NavState::List;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Brings the page back to the list, closing a leftover overlay once if needed.
    pub async fn ensure_list(&mut self, controls: &mut Controls) -> Result<bool> {
        if self.wait_for_list(controls, Duration::ZERO).await? {
            return Ok(true);
        }

        let overlay_open = self
            .poll_until(controls, Duration::ZERO, true, |html, this| {
                Some(this.detector.find(html, ContainerKind::Detail, this.baseline.as_ref()).is_some())
            })
            .await?
            .unwrap_or(false);

        if overlay_open && self.close_detail(controls).await? != CloseOutcome::StillOpen {
            return Ok(true);
        }

        let timeout = self.delays.detail_timeout;
        self.wait_for_list(controls, timeout).await
    }

    pub async fn open_detail(&mut self, view: &NodePath, controls: &mut Controls) -> Result<OpenOutcome> {
        controls.checkpoint()?;
        self.state = NavState::TransitioningToDetail;
        self.page.click(view).await?;

        let settle = self.delays.open_settle;
        self.settle(controls, settle).await?;

        let timeout = self.delays.detail_timeout;
        let found = self
            .poll_until(controls, timeout, false, |html, this| {
                this.detector
                    .detect(html, ContainerKind::Detail, this.baseline.as_ref())
            })
            .await?;

        Ok(match found {
            Some(container) => {
                self.state = NavState::Detail;
                OpenOutcome::Opened(container)
            }
            None => OpenOutcome::TimedOut,
        })
    }

    /// Activates the section control named `name` inside the detail container.
    /// Returns `false` when no such control exists.
    pub async fn switch_section(&mut self, name: &str, controls: &mut Controls) -> Result<bool> {
        controls.checkpoint()?;
        let content = self.page.snapshot().await?;
        let target = self.parse_with(&content, |html, this| this.section_control(html, name));

        let Some(target) = target else {
            return Ok(false);
        };
        self.page.click(&target).await?;

        let settle = self.delays.section_settle;
        self.settle(controls, settle).await?;
        Ok(true)
    }

    fn section_control(&self, html: &Html, name: &str) -> Option<NodePath> {
        let (container, _) = self
            .detector
            .find(html, ContainerKind::Detail, self.baseline.as_ref())?;
        let wanted = dom::fold(name);

        let candidates: Vec<(ElementRef<'_>, String)> = container
            .select(&self.section_controls)
            .filter(|el| dom::is_visible(*el))
            .map(|el| (el, dom::fold(&dom::text_of(el))))
            .filter(|(_, text)| !text.is_empty())
            .collect();

        candidates
            .iter()
            .find(|(_, text)| *text == wanted)
            .or_else(|| candidates.iter().find(|(_, text)| text.contains(wanted.as_str())))
            .map(|(el, _)| NodePath::of(*el))
    }

    /// Tries each way of closing the overlay in turn, moving on only while the
    /// list has not come back.
    pub async fn close_detail(&mut self, controls: &mut Controls) -> Result<CloseOutcome> {
        self.state = NavState::TransitioningToList;
        if self.wait_for_list(controls, Duration::ZERO).await? {
            return Ok(CloseOutcome::AlreadyClosed);
        }

        for step in CLOSE_STEPS {
            controls.checkpoint()?;
            let acted = match step {
                CloseStep::Escape => self.page.press_escape().await.is_ok(),
                _ => match self.page.snapshot().await {
                    Ok(content) => {
                        let target = self.parse_with(&content, |html, this| this.close_target(html, step));
                        match target {
                            Some(target) => self.page.click(&target).await.is_ok(),
                            None => false,
                        }
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(_) => false,
                },
            };
            if !acted {
                continue;
            }

            let timeout = self.delays.close_step_timeout;
            if self.wait_for_list(controls, timeout).await? {
                let settle = self.delays.close_settle;
                self.settle(controls, settle).await?;
                return Ok(CloseOutcome::Closed(step));
            }
        }

        Ok(CloseOutcome::StillOpen)
    }

    fn close_target(&self, html: &Html, step: CloseStep) -> Option<NodePath> {
        let container = self
            .detector
            .find(html, ContainerKind::Detail, self.baseline.as_ref())
            .map(|(el, _)| el);
        let scope = container.unwrap_or_else(|| html.root_element());

        let found = match step {
            CloseStep::Affordance => self
                .close_selectors
                .iter()
                .flat_map(|selector| scope.select(selector))
                .find(|el| dom::is_visible(*el)),
            CloseStep::TextControl => scope
                .select(&self.text_controls)
                .filter(|el| dom::is_visible(*el))
                .find(|el| {
                    let label = dom::fold(&dom::text_of(*el));
                    let label = if label.is_empty() {
                        dom::fold(el.value().attr("value").unwrap_or(""))
                    } else {
                        label
                    };
                    let label = strip_symbols(&label);
                    self.close_words.iter().any(|word| word == label)
                }),
            CloseStep::Backdrop => self
                .backdrop_selectors
                .iter()
                .flat_map(|selector| html.select(selector))
                .find(|el| dom::is_visible(*el))
                .or_else(|| container.filter(|el| dom::has_class(*el, "modal"))),
            CloseStep::Escape => None,
        };

        found.map(NodePath::of)
    }

    /// Advances to the next list page. Returns `false` on the last page.
    pub async fn next_page(&mut self, controls: &mut Controls) -> Result<bool> {
        controls.checkpoint()?;
        let content = self.page.snapshot().await?;
        let Some(target) = self.parse_with(&content, |html, this| this.next_control(html)) else {
            return Ok(false);
        };

        self.page.click(&target).await?;
        let settle = self.delays.page_settle;
        self.settle(controls, settle).await?;

        let timeout = self.delays.detail_timeout;
        self.wait_for_list(controls, timeout).await?;
        Ok(true)
    }

    fn next_control(&self, html: &Html) -> Option<NodePath> {
        let candidates: Vec<(ElementRef<'_>, String)> = html
            .select(&self.pager_controls)
            .filter(|el| dom::is_visible(*el) && !dom::is_disabled(*el))
            .filter(|el| !dom::ancestors(*el).any(dom::looks_like_overlay))
            .map(|el| (el, dom::fold(&dom::text_of(el))))
            .filter(|(_, text)| !text.is_empty())
            .collect();

        let exact = candidates
            .iter()
            .find(|(_, text)| self.next_words.iter().any(|word| word == text));
        let near = || {
            candidates.iter().find(|(_, text)| {
                let stripped = strip_symbols(text);
                !stripped.is_empty() && self.next_words.iter().any(|word| word == stripped)
            })
        };

        let by_text = exact.or_else(near).map(|(el, _)| *el);
        let by_selector = || {
            self.next_selectors
                .iter()
                .flat_map(|selector| html.select(selector))
                .find(|el| dom::is_visible(*el) && !dom::is_disabled(*el))
        };

        by_text.or_else(by_selector).map(NodePath::of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{FixtureEvent, FixtureSite, ManualClock};

    const LIST: &str = r#"<html><body>
        <table class="dataTable"><tbody>
            <tr><td>1</td><td>ANA</td><td><a id="view" data-goto="detail"><i class="fa fa-search"></i></a></td></tr>
        </tbody></table>
        <ul class="pagination">
            <li class="disabled"><a>Anterior</a></li>
            <li><a id="next" data-goto="page2">Seguinte</a></li>
        </ul>
    </body></html>"#;

    const PAGE2: &str = r#"<html><body>
        <table class="dataTable"><tbody><tr><td>1</td><td>BIA</td></tr></tbody></table>
        <ul class="pagination"><li class="disabled"><a>Seguinte</a></li></ul>
    </body></html>"#;

    const DETAIL: &str = r#"<html><body>
        <table class="dataTable"><tbody><tr><td>1</td><td>ANA</td></tr></tbody></table>
        <div class="modal in" id="m">
            <ul class="nav nav-tabs"><li><a data-goto="docs">Documentos</a></li></ul>
            <button class="close" data-goto="index">×</button>
        </div>
    </body></html>"#;

    const DOCS: &str = r#"<html><body>
        <table class="dataTable"><tbody><tr><td>1</td><td>ANA</td></tr></tbody></table>
        <div class="modal in" id="m"><label>CPF</label><input value="123"></div>
    </body></html>"#;

    const STUCK: &str = r#"<html data-escape="index"><body>
        <table class="dataTable"><tbody><tr><td>1</td><td>ANA</td></tr></tbody></table>
        <div class="modal in" id="m"><p>Sem botões</p></div>
    </body></html>"#;

    const TEXT_CLOSE: &str = r#"<html><body>
        <table class="dataTable"><tbody><tr><td>1</td><td>ANA</td></tr></tbody></table>
        <div class="modal in" id="m">
            <p>Ficha do aluno</p>
            <button data-goto="index">Fechar</button>
        </div>
    </body></html>"#;

    const BACKDROP: &str = r#"<html><body>
        <table class="dataTable"><tbody><tr><td>1</td><td>ANA</td></tr></tbody></table>
        <div class="modal in" id="m"><p>Ficha do aluno</p></div>
        <div class="modal-backdrop in" data-goto="index"></div>
    </body></html>"#;

    fn controller(start: &str, clock: Arc<ManualClock>) -> NavigationController<FixtureSite> {
        let site = FixtureSite::new(start, clock.clone())
            .with_state("index", LIST)
            .with_state("page2", PAGE2)
            .with_state("detail", DETAIL)
            .with_state("docs", DOCS)
            .with_state("stuck", STUCK)
            .with_state("text-close", TEXT_CLOSE)
            .with_state("backdrop", BACKDROP);
        let delays = Delays::from_inter_item(1000, 300);
        NavigationController::new(site, clock, &Config::default(), delays).unwrap()
    }

    fn view_path() -> NodePath {
        let html = Html::parse_document(LIST);
        NodePath::of(html.select(&Selector::parse("#view").unwrap()).next().unwrap())
    }

    #[tokio::test]
    async fn test_open_switch_and_close() {
        let clock = Arc::new(ManualClock::new());
        let mut nav = controller("index", clock.clone());
        let (_handle, mut controls) = Controls::channel();

        assert!(nav.ensure_list(&mut controls).await.unwrap());
        let opened = nav.open_detail(&view_path(), &mut controls).await.unwrap();
        assert!(matches!(opened, OpenOutcome::Opened(_)));
        assert_eq!(nav.state(), NavState::Detail);

        assert!(nav.switch_section("Documentos", &mut controls).await.unwrap());
        assert!(!nav.switch_section("Telefones", &mut controls).await.unwrap());
        let cpf = nav
            .with_detail(&mut controls, |c| crate::extract::read_field(c, "CPF"))
            .await
            .unwrap();
        assert_eq!(cpf.as_deref(), Some("123"));

        // The docs state has no close control; Escape is not wired either.
        assert_eq!(nav.close_detail(&mut controls).await.unwrap(), CloseOutcome::StillOpen);
    }

    #[tokio::test]
    async fn test_close_uses_first_working_step() {
        let clock = Arc::new(ManualClock::new());
        let mut nav = controller("detail", clock.clone());
        let (_handle, mut controls) = Controls::channel();

        let outcome = nav.close_detail(&mut controls).await.unwrap();
        assert_eq!(outcome, CloseOutcome::Closed(CloseStep::Affordance));
        assert_eq!(nav.state(), NavState::List);
        assert_eq!(nav.close_detail(&mut controls).await.unwrap(), CloseOutcome::AlreadyClosed);
    }

    #[tokio::test]
    async fn test_close_by_labelled_button() {
        let clock = Arc::new(ManualClock::new());
        let mut nav = controller("text-close", clock.clone());
        let (_handle, mut controls) = Controls::channel();

        let outcome = nav.close_detail(&mut controls).await.unwrap();
        assert_eq!(outcome, CloseOutcome::Closed(CloseStep::TextControl));
        assert_eq!(nav.page().current_state(), "index");
        assert_eq!(nav.state(), NavState::List);
    }

    #[tokio::test]
    async fn test_close_by_backdrop() {
        let clock = Arc::new(ManualClock::new());
        let mut nav = controller("backdrop", clock.clone());
        let (_handle, mut controls) = Controls::channel();

        let outcome = nav.close_detail(&mut controls).await.unwrap();
        assert_eq!(outcome, CloseOutcome::Closed(CloseStep::Backdrop));
        assert_eq!(nav.page().current_state(), "index");
        assert!(!nav
            .page()
            .events()
            .iter()
            .any(|e| matches!(e, FixtureEvent::Escape { .. })));
    }

    #[tokio::test]
    async fn test_close_falls_back_to_escape() {
        let clock = Arc::new(ManualClock::new());
        let mut nav = controller("stuck", clock.clone());
        let (_handle, mut controls) = Controls::channel();

        let outcome = nav.close_detail(&mut controls).await.unwrap();
        assert_eq!(outcome, CloseOutcome::Closed(CloseStep::Escape));
        assert!(nav
            .page()
            .events()
            .iter()
            .any(|e| matches!(e, FixtureEvent::Escape { state } if state == "stuck")));
    }

    #[tokio::test]
    async fn test_open_times_out_after_bound() {
        let clock = Arc::new(ManualClock::new());
        let mut nav = controller("page2", clock.clone());
        let (_handle, mut controls) = Controls::channel();

        let html = Html::parse_document(PAGE2);
        let cell = NodePath::of(html.select(&Selector::parse("td").unwrap()).next().unwrap());
        let before = clock.now();
        let outcome = nav.open_detail(&cell, &mut controls).await.unwrap();

        assert_eq!(outcome, OpenOutcome::TimedOut);
        let waited = clock.now() - before;
        assert!(waited >= Duration::from_millis(5000));
        assert!(waited < Duration::from_millis(5400));
    }

    #[tokio::test]
    async fn test_next_page_skips_disabled_and_stops_at_end() {
        let clock = Arc::new(ManualClock::new());
        let mut nav = controller("index", clock.clone());
        let (_handle, mut controls) = Controls::channel();

        assert!(nav.next_page(&mut controls).await.unwrap());
        assert_eq!(nav.page().current_state(), "page2");
        assert!(!nav.next_page(&mut controls).await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_interrupts_wait() {
        let clock = Arc::new(ManualClock::new());
        let mut nav = controller("page2", clock.clone());
        let (handle, mut controls) = Controls::channel();
        handle.stop();

        let result = nav.settle(&mut controls, Duration::from_secs(10)).await;
        assert!(matches!(result, Err(crate::error::HarvestError::Cancelled)));
        assert_eq!(clock.now(), Duration::ZERO);
    }
}
