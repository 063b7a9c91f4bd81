use crate::config::DetectionConfig;
use crate::error::{HarvestError, Result};
use crate::page::dom;
use crate::page::NodePath;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    List,
    Detail,
}

/// Which layer of the fallback chain produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Structural,
    TextMarker,
    NewContainer,
    LargestTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub kind: ContainerKind,
    pub path: NodePath,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    List,
    Detail,
    Unknown,
}

/// Signatures of the body-level containers present while the list was visible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baseline {
    signatures: HashSet<String>,
}

impl Baseline {
    pub fn capture(html: &Html) -> Self {
        let signatures = body(html)
            .map(|body| dom::child_elements(body).map(signature).collect())
            .unwrap_or_default();
        Self { signatures }
    }

    pub fn contains(&self, element: ElementRef<'_>) -> bool {
        self.signatures.contains(&signature(element))
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

fn signature(element: ElementRef<'_>) -> String {
    let value = element.value();
    let mut classes: Vec<&str> = value.classes().collect();
    classes.sort_unstable();

    let mut signature = value.name().to_string();
    if let Some(id) = value.id() {
        signature.push('#');
        signature.push_str(id);
    }
    for class in classes {
        signature.push('.');
        signature.push_str(class);
    }
    signature
}

fn body(html: &Html) -> Option<ElementRef<'_>> {
    dom::child_elements(html.root_element()).find(|el| dom::is_tag(*el, &["body"]))
}

fn outside_overlays(element: ElementRef<'_>) -> bool {
    !dom::ancestors(element).any(dom::looks_like_overlay)
}

fn has_form_content(element: ElementRef<'_>) -> bool {
    element
        .descendants()
        .filter_map(ElementRef::wrap)
        .any(|el| dom::is_tag(el, &["input", "select", "textarea", "label"]))
}

/// Answers "is the list visible?" and "is the detail overlay visible?" from a
/// parsed snapshot. Every lookup is a pure read; absence is reported as `None`.
pub struct Detector {
    detail_selectors: Vec<Selector>,
    detail_markers: Vec<String>,
    list_selectors: Vec<Selector>,
    list_markers: Vec<String>,
    view_selectors: Vec<Selector>,
    min_overlay_area: i64,
    table: Selector,
    row: Selector,
    header_cell: Selector,
    info: Selector,
    total_pattern: Regex,
}

impl Detector {
    pub fn new(config: &DetectionConfig, view_selectors: &[String]) -> Result<Self> {
        let fold_all = |list: &[String]| -> Vec<String> { list.iter().map(|m| dom::fold(m)).collect() };
        let total_pattern = Regex::new(r"(?i)\b(?:de|of)\s+(\d+)\b|\b(\d+)\s+(?:registros|entries)")
            .map_err(|e| HarvestError::Config {
                message: format!("Invalid total pattern: {}", e),
            })?;

        Ok(Self {
            detail_selectors: dom::selectors(&config.detail_selectors)?,
            detail_markers: fold_all(&config.detail_markers),
            list_selectors: dom::selectors(&config.list_selectors)?,
            list_markers: fold_all(&config.list_markers),
            view_selectors: dom::selectors(view_selectors)?,
            min_overlay_area: config.min_overlay_area,
            table: dom::selector("table")?,
            row: dom::selector("tbody tr")?,
            header_cell: dom::selector("th, thead td")?,
            info: dom::selector(".dataTables_info")?,
            total_pattern,
        })
    }

    pub fn detect(
        &self,
        html: &Html,
        kind: ContainerKind,
        baseline: Option<&Baseline>,
    ) -> Option<Container> {
        self.find(html, kind, baseline).map(|(element, strategy)| Container {
            kind,
            path: NodePath::of(element),
            strategy,
        })
    }

    /// Like [`Detector::detect`], but hands back the matched element itself.
    pub fn find<'a>(
        &self,
        html: &'a Html,
        kind: ContainerKind,
        baseline: Option<&Baseline>,
    ) -> Option<(ElementRef<'a>, Strategy)> {
        match kind {
            ContainerKind::Detail => self.find_detail(html, baseline),
            ContainerKind::List => self.find_list(html),
        }
    }

    /// The detail overlay takes precedence: a list behind an open overlay is not ready.
    pub fn page_state(&self, html: &Html, baseline: Option<&Baseline>) -> PageState {
        if self.find_detail(html, baseline).is_some() {
            PageState::Detail
        } else if self.find_list(html).is_some() {
            PageState::List
        } else {
            PageState::Unknown
        }
    }

    /// Total record count announced by the list footer, if any.
    pub fn total_hint(&self, html: &Html) -> Option<usize> {
        let text = html
            .select(&self.info)
            .next()
            .map(dom::text_of)
            .or_else(|| body(html).map(dom::text_of))?;

        self.total_pattern.captures(&text).and_then(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .and_then(|m| m.as_str().parse().ok())
        })
    }

    fn find_detail<'a>(
        &self,
        html: &'a Html,
        baseline: Option<&Baseline>,
    ) -> Option<(ElementRef<'a>, Strategy)> {
        let structural = self
            .detail_selectors
            .iter()
            .flat_map(|selector| html.select(selector))
            .filter(|el| dom::is_visible(*el))
            .max_by_key(|el| (dom::z_index(*el), NodePath::of(*el)));
        if let Some(element) = structural {
            return Some((element, Strategy::Structural));
        }

        if let Some(element) = self.find_by_marker(html) {
            return Some((element, Strategy::TextMarker));
        }

        let baseline = baseline?;
        body(html)
            .into_iter()
            .flat_map(dom::child_elements)
            .filter(|el| !baseline.contains(*el))
            .filter(|el| !dom::is_tag(*el, &["script", "style", "link", "noscript"]))
            .filter(|el| dom::is_visible(*el))
            .filter(|el| match dom::dimensions(*el) {
                Some((w, h)) => w * h >= self.min_overlay_area,
                None => has_form_content(*el),
            })
            .max_by_key(|el| (dom::z_index(*el), NodePath::of(*el)))
            .map(|el| (el, Strategy::NewContainer))
    }

    fn find_by_marker<'a>(&self, html: &'a Html) -> Option<ElementRef<'a>> {
        if self.detail_markers.is_empty() {
            return None;
        }
        let body = body(html)?;

        body.descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| {
                let own = dom::fold(&dom::own_text(*el));
                !own.is_empty() && self.detail_markers.iter().any(|m| own.contains(m.as_str()))
            })
            .filter(|el| dom::is_visible(*el))
            .find_map(|el| dom::closest(el, dom::looks_like_overlay))
    }

    fn find_list<'a>(&self, html: &'a Html) -> Option<(ElementRef<'a>, Strategy)> {
        let candidate = |el: &ElementRef<'_>| dom::is_visible(*el) && outside_overlays(*el);

        let structural = self
            .list_selectors
            .iter()
            .flat_map(|selector| html.select(selector))
            .filter_map(|el| {
                if dom::is_tag(el, &["table"]) {
                    Some(el)
                } else {
                    el.select(&self.table).next()
                }
            })
            .find(|el| candidate(el));
        if let Some(table) = structural {
            return Some((table, Strategy::Structural));
        }

        let with_affordance = html
            .select(&self.table)
            .filter(|el| candidate(el))
            .find(|table| {
                table
                    .select(&self.row)
                    .any(|row| self.view_selectors.iter().any(|s| row.select(s).next().is_some()))
            });
        if let Some(table) = with_affordance {
            return Some((table, Strategy::Structural));
        }

        if !self.list_markers.is_empty() {
            let marked = html
                .select(&self.header_cell)
                .filter(|cell| {
                    let text = dom::fold(&dom::text_of(*cell));
                    self.list_markers.iter().any(|m| text.contains(m.as_str()))
                })
                .filter_map(|cell| dom::closest(cell, |el| dom::is_tag(el, &["table"])))
                .find(|el| candidate(el));
            if let Some(table) = marked {
                return Some((table, Strategy::TextMarker));
            }
        }

        let mut best: Option<(ElementRef<'a>, usize)> = None;
        for table in html.select(&self.table).filter(|el| candidate(el)) {
            let rows = table.select(&self.row).count();
            if rows > 0 && best.map_or(true, |(_, most)| rows > most) {
                best = Some((table, rows));
            }
        }
        best.map(|(table, _)| (table, Strategy::LargestTable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn detector() -> Detector {
        let config = Config::default();
        Detector::new(&config.detection, &config.list.view_selectors).unwrap()
    }

    const LIST: &str = r#"<html><body>
        <div class="dataTables_wrapper">
            <table class="dataTable"><thead><tr><th>Nome do Aluno</th></tr></thead>
            <tbody><tr><td>1</td><td>ANA</td><td><a><i class="fa fa-search"></i></a></td></tr></tbody></table>
            <div class="dataTables_info">Mostrando 1 a 10 de 42 registros</div>
        </div>
        <div id="modalAluno" class="modal fade" style="display: none"></div>
    </body></html>"#;

    const DETAIL: &str = r#"<html><body>
        <div class="dataTables_wrapper">
            <table class="dataTable"><tbody><tr><td>1</td><td>ANA</td></tr></tbody></table>
        </div>
        <div id="modalAluno" class="modal fade in" style="display: block">
            <h4 class="modal-title">Dados do Aluno: ANA</h4>
            <table><thead><tr><th>Tipo Telefone</th></tr></thead><tbody><tr><td>Celular</td></tr></tbody></table>
        </div>
        <div class="modal-backdrop fade in"></div>
    </body></html>"#;

    #[test]
    fn test_list_detected_and_overlay_absent() {
        let html = Html::parse_document(LIST);
        let detector = detector();

        let list = detector.detect(&html, ContainerKind::List, None).unwrap();
        assert_eq!(list.strategy, Strategy::Structural);
        assert!(detector.detect(&html, ContainerKind::Detail, None).is_none());
        assert_eq!(detector.page_state(&html, None), PageState::List);
        assert_eq!(detector.total_hint(&html), Some(42));
    }

    #[test]
    fn test_open_overlay_takes_precedence() {
        let html = Html::parse_document(DETAIL);
        let detector = detector();

        let detail = detector.detect(&html, ContainerKind::Detail, None).unwrap();
        assert_eq!(detail.strategy, Strategy::Structural);
        let element = detail.path.resolve(&html).unwrap();
        assert_eq!(element.value().id(), Some("modalAluno"));
        assert_eq!(detector.page_state(&html, None), PageState::Detail);

        // The phone table inside the overlay never counts as the list.
        let list = detector.find(&html, ContainerKind::List, None).unwrap().0;
        assert!(dom::has_class(list, "dataTable"));
    }

    #[test]
    fn test_text_marker_walks_up_to_overlay() {
        let html = Html::parse_document(
            r#"<html><body>
                <div id="panel" role="dialog"><div><h3>Ficha do Aluno</h3></div></div>
            </body></html>"#,
        );
        let detail = detector().detect(&html, ContainerKind::Detail, None).unwrap();
        assert_eq!(detail.strategy, Strategy::TextMarker);
        assert_eq!(detail.path.resolve(&html).unwrap().value().id(), Some("panel"));
    }

    #[test]
    fn test_marker_without_overlay_is_ignored() {
        let html = Html::parse_document(
            r#"<html><body><h1>Dados do Aluno</h1><table><tbody><tr><td>x</td></tr></tbody></table></body></html>"#,
        );
        let detector = detector();
        assert!(detector.detect(&html, ContainerKind::Detail, None).is_none());
        let list = detector.detect(&html, ContainerKind::List, None).unwrap();
        assert_eq!(list.strategy, Strategy::LargestTable);
    }

    #[test]
    fn test_new_container_against_baseline() {
        let before = Html::parse_document(
            r#"<html><body><div id="app"><table><tbody><tr><td>x</td></tr></tbody></table></div></body></html>"#,
        );
        let after = Html::parse_document(
            r#"<html><body><div id="app"><table><tbody><tr><td>x</td></tr></tbody></table></div>
               <div id="tiny" data-harvest-w="20" data-harvest-h="20"></div>
               <section id="panel" data-harvest-w="600" data-harvest-h="400"><input value="1"></section>
            </body></html>"#,
        );
        let detector = detector();
        let baseline = Baseline::capture(&before);
        assert_eq!(baseline.len(), 1);

        assert!(detector.detect(&after, ContainerKind::Detail, None).is_none());
        let detail = detector
            .detect(&after, ContainerKind::Detail, Some(&baseline))
            .unwrap();
        assert_eq!(detail.strategy, Strategy::NewContainer);
        assert_eq!(detail.path.resolve(&after).unwrap().value().id(), Some("panel"));
    }

    #[test]
    fn test_highest_stacked_overlay_wins() {
        let html = Html::parse_document(
            r#"<html><body>
                <div id="low" class="modal in" data-harvest-z="1040"></div>
                <div id="high" class="modal in" data-harvest-z="1060"></div>
                <div id="hidden" class="modal in" data-harvest-hidden="1" data-harvest-z="2000"></div>
            </body></html>"#,
        );
        let detail = detector().detect(&html, ContainerKind::Detail, None).unwrap();
        assert_eq!(detail.path.resolve(&html).unwrap().value().id(), Some("high"));
    }

    #[test]
    fn test_nothing_matches_on_blank_page() {
        let html = Html::parse_document("<html><body><p>Carregando...</p></body></html>");
        let detector = detector();
        assert_eq!(detector.page_state(&html, None), PageState::Unknown);
        assert_eq!(detector.total_hint(&html), None);
    }
}
