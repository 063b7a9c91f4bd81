//! Read-only helpers over parsed snapshots shared by detection, extraction and
//! navigation.

use crate::error::{HarvestError, Result};
use scraper::{ElementRef, Selector};

pub const HIDDEN_STAMP: &str = "data-harvest-hidden";
pub const WIDTH_STAMP: &str = "data-harvest-w";
pub const HEIGHT_STAMP: &str = "data-harvest-h";
pub const Z_STAMP: &str = "data-harvest-z";
pub const POSITION_STAMP: &str = "data-harvest-pos";

pub fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| HarvestError::Config {
        message: format!("Invalid CSS selector '{}': {}", css, e),
    })
}

pub fn selectors(list: &[String]) -> Result<Vec<Selector>> {
    list.iter().map(|css| selector(css)).collect()
}

/// Collapses runs of whitespace and trims.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn text_of(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Text of the element's own text nodes, ignoring descendants.
pub fn own_text(element: ElementRef<'_>) -> String {
    let raw: String = element
        .children()
        .filter_map(|child| child.value().as_text().map(|t| String::from(&**t)))
        .collect();
    collapse_whitespace(&raw)
}

/// Lowercases and strips Portuguese diacritics so "Próximo" and "proximo" compare equal.
pub fn fold(text: &str) -> String {
    collapse_whitespace(text)
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// Normalized form used for label comparison: folded, trailing ':' and '?' removed.
pub fn fold_label(text: &str) -> String {
    fold(text)
        .trim_end_matches(|c: char| c == ':' || c == '?' || c.is_whitespace())
        .trim()
        .to_string()
}

pub fn ancestors<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.ancestors().filter_map(ElementRef::wrap)
}

pub fn closest<'a, F>(element: ElementRef<'a>, predicate: F) -> Option<ElementRef<'a>>
where
    F: Fn(ElementRef<'a>) -> bool,
{
    std::iter::once(element)
        .chain(ancestors(element))
        .find(|candidate| predicate(*candidate))
}

pub fn is_within(element: ElementRef<'_>, container: ElementRef<'_>) -> bool {
    element.id() == container.id() || ancestors(element).any(|a| a.id() == container.id())
}

pub fn next_element_siblings<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.next_siblings().filter_map(ElementRef::wrap)
}

pub fn child_elements<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.children().filter_map(ElementRef::wrap)
}

pub fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c.eq_ignore_ascii_case(class))
}

pub fn is_tag(element: ElementRef<'_>, names: &[&str]) -> bool {
    names.iter().any(|name| element.value().name().eq_ignore_ascii_case(name))
}

fn inline_style(element: ElementRef<'_>) -> String {
    element
        .value()
        .attr("style")
        .map(|s| s.to_ascii_lowercase().replace(char::is_whitespace, ""))
        .unwrap_or_default()
}

fn stamp_number(element: ElementRef<'_>, name: &str) -> Option<i64> {
    element.value().attr(name)?.trim().parse::<f64>().ok().map(|v| v as i64)
}

pub fn dimensions(element: ElementRef<'_>) -> Option<(i64, i64)> {
    Some((
        stamp_number(element, WIDTH_STAMP)?,
        stamp_number(element, HEIGHT_STAMP)?,
    ))
}

fn hides_itself(element: ElementRef<'_>) -> bool {
    let value = element.value();
    if value.attr("hidden").is_some() || value.attr(HIDDEN_STAMP).is_some() {
        return true;
    }
    if is_tag(element, &["head", "script", "style", "template", "noscript"]) {
        return true;
    }
    if value.name() == "input" && value.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("hidden")) {
        return true;
    }

    let style = inline_style(element);
    if style.contains("display:none") || style.contains("visibility:hidden") {
        return true;
    }
    if value.attr("aria-hidden").is_some_and(|v| v == "true") && looks_like_overlay(element) {
        return true;
    }

    matches!(dimensions(element), Some((w, h)) if w <= 0 || h <= 0)
}

/// An element is visible when neither it nor any ancestor is hidden.
pub fn is_visible(element: ElementRef<'_>) -> bool {
    !hides_itself(element) && ancestors(element).all(|a| !hides_itself(a))
}

pub fn z_index(element: ElementRef<'_>) -> i64 {
    if let Some(z) = stamp_number(element, Z_STAMP) {
        return z;
    }
    let style = inline_style(element);
    style
        .split(';')
        .find_map(|decl| decl.strip_prefix("z-index:"))
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0)
}

/// Elevated stacking, fixed/absolute positioning or an explicit dialog role.
pub fn looks_like_overlay(element: ElementRef<'_>) -> bool {
    if is_tag(element, &["html", "body"]) {
        return false;
    }
    let value = element.value();
    if is_tag(element, &["dialog"]) {
        return true;
    }
    if value
        .attr("role")
        .is_some_and(|r| r.eq_ignore_ascii_case("dialog") || r.eq_ignore_ascii_case("alertdialog"))
        || value.attr("aria-modal").is_some_and(|m| m == "true")
    {
        return true;
    }
    if value.classes().any(|c| {
        let c = c.to_ascii_lowercase();
        c == "modal" || c.contains("dialog") || c.contains("overlay") || c.contains("popup")
    }) {
        return true;
    }
    if value
        .attr(POSITION_STAMP)
        .is_some_and(|p| p == "fixed" || p == "absolute")
    {
        return true;
    }
    let style = inline_style(element);
    style.contains("position:fixed") || style.contains("position:absolute") || z_index(element) > 0
}

/// Disabled either on the control itself or on its wrapping list item.
pub fn is_disabled(element: ElementRef<'_>) -> bool {
    let disabled_here = |el: ElementRef<'_>| {
        has_class(el, "disabled")
            || el.value().attr("disabled").is_some()
            || el.value().attr("aria-disabled").is_some_and(|v| v == "true")
    };
    if disabled_here(element) {
        return true;
    }
    element
        .parent()
        .and_then(ElementRef::wrap)
        .is_some_and(disabled_here)
}
