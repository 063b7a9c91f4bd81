//! Label-proximity field reading.
//!
//! Every strategy is a pure `(container, label) -> Option<_>` function over a
//! parsed snapshot. Readers try each label element that matches the query
//! (exact matches first, then containment) against each strategy in order,
//! and the first non-empty answer wins.

use crate::page::dom;
use regex::Regex;
use scraper::{ElementRef, Selector};

pub type TextStrategy = for<'a> fn(ElementRef<'a>, ElementRef<'a>) -> Option<String>;
pub type ToggleStrategy = for<'a> fn(ElementRef<'a>, ElementRef<'a>) -> Option<bool>;

pub const TEXT_STRATEGIES: &[TextStrategy] = &[sibling_control, group_control, sibling_text, group_text];

pub const TOGGLE_STRATEGIES: &[ToggleStrategy] = &[group_checkbox, sibling_checkbox, affirmative_radio];

pub const CHOICE_STRATEGIES: &[TextStrategy] = &[selected_option, checked_radio_text, checked_checkbox_text];

const LABELS: &str = "label, strong, th, dt, b, .control-label";
const CONTROLS: &str = "input, select, textarea";
const GROUP_CLASSES: &[&str] = &["form-group", "control-group", "checkbox"];
const AFFIRMATIVE: &[&str] = &["sim", "yes", "true"];
const NEGATIVE: &[&str] = &["nao", "no", "false"];

fn select_all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => scope.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// Label elements whose text matches `query`, exact matches before containment.
pub fn matching_labels<'a>(container: ElementRef<'a>, query: &str) -> Vec<ElementRef<'a>> {
    let query = dom::fold_label(query);
    if query.is_empty() {
        return Vec::new();
    }

    let candidates: Vec<(ElementRef<'a>, String)> = select_all(container, LABELS)
        .into_iter()
        .map(|el| (el, dom::fold_label(&dom::text_of(el))))
        .filter(|(_, text)| !text.is_empty())
        .collect();

    let exact = candidates.iter().filter(|(_, text)| *text == query);
    let partial = candidates
        .iter()
        .filter(|(_, text)| *text != query && text.contains(query.as_str()));

    exact.chain(partial).map(|(el, _)| *el).collect()
}

pub fn read_field(container: ElementRef<'_>, label: &str) -> String {
    first_text(container, label, TEXT_STRATEGIES).unwrap_or_default()
}

pub fn read_toggle(container: ElementRef<'_>, label: &str) -> bool {
    matching_labels(container, label)
        .into_iter()
        .find_map(|lbl| TOGGLE_STRATEGIES.iter().find_map(|strategy| strategy(container, lbl)))
        .unwrap_or(false)
}

pub fn read_choice(container: ElementRef<'_>, label: &str) -> String {
    first_text(container, label, CHOICE_STRATEGIES).unwrap_or_default()
}

fn first_text(container: ElementRef<'_>, label: &str, strategies: &[TextStrategy]) -> Option<String> {
    matching_labels(container, label).into_iter().find_map(|lbl| {
        strategies
            .iter()
            .find_map(|strategy| strategy(container, lbl))
            .filter(|value| !value.is_empty())
    })
}

/// First capture group of `pattern` over the container's text.
pub fn read_pattern(container: ElementRef<'_>, pattern: &Regex) -> Option<String> {
    let text = dom::text_of(container);
    pattern
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// RA number, check digit and state from the overlay header
/// (`... RA:000122759213-9/SP ...`).
pub fn read_header_ra(container: ElementRef<'_>) -> Option<(String, String, String)> {
    let pattern = Regex::new(r"(?i)RA[:\s]*(\d{10,15})-(\d)/(\w{2})").ok()?;
    select_all(container, ".modal-header, .modal-title, [class*=\"header\"]")
        .into_iter()
        .find_map(|header| {
            let text = dom::text_of(header);
            let caps = pattern.captures(&text)?;
            Some((
                caps.get(1)?.as_str().to_string(),
                caps.get(2)?.as_str().to_string(),
                caps.get(3)?.as_str().to_string(),
            ))
        })
}

/// An uppercase two-letter input next to a label (the state beside a city).
pub fn read_two_letter(container: ElementRef<'_>, label: &str) -> Option<String> {
    let mut found = None;
    for lbl in matching_labels(container, label) {
        let scope = group_of(container, lbl).or_else(|| lbl.parent().and_then(ElementRef::wrap));
        let Some(scope) = scope else { continue };
        for input in select_all(scope, "input") {
            let value = control_value(input);
            if value.len() == 2 && value.chars().all(|c| c.is_ascii_uppercase()) {
                found = Some(value);
            }
        }
    }
    found
}

/// Phone numbers from the phone table and the "Outros Contatos" table, joined with ` | `.
pub fn read_phones(container: ElementRef<'_>) -> String {
    let mut phones = Vec::new();
    let mut seen_tables = Vec::new();

    for table in select_all(container, "table") {
        let headers: Vec<String> = select_all(table, "th")
            .into_iter()
            .map(|th| dom::fold(&dom::text_of(th)))
            .collect();
        let is_phone_table = headers
            .iter()
            .any(|h| h.contains("tipo telefone") || h.contains("ddd") || h.contains("numero"));
        if !is_phone_table {
            continue;
        }
        seen_tables.push(table.id());

        for cells in body_rows(table) {
            if cells.len() < 3 {
                continue;
            }
            let kind = if cells[0].is_empty() { "Celular" } else { cells[0].as_str() };
            let (ddd, number) = (&cells[1], &cells[2]);
            if !number.chars().any(|c| c.is_ascii_digit()) {
                continue;
            }
            if ddd.is_empty() {
                phones.push(format!("{}: {}", kind, number));
            } else {
                phones.push(format!("{}: ({}) {}", kind, ddd, number));
            }
        }
    }

    for heading in select_all(container, "h1, h2, h3, h4, h5, strong, b") {
        if !dom::fold(&dom::text_of(heading)).contains("outros contatos") {
            continue;
        }
        let Some(table) = contacts_table(container, heading) else {
            continue;
        };
        if seen_tables.contains(&table.id()) {
            continue;
        }
        seen_tables.push(table.id());

        for cells in body_rows(table) {
            if cells.len() < 3 {
                continue;
            }
            let (bond, name, phone) = (&cells[0], &cells[1], &cells[2]);
            let kind = cells.get(3).filter(|k| !k.is_empty()).map_or("Contato", |k| k.as_str());
            if phone.chars().any(|c| c.is_ascii_digit()) {
                let entry = format!("{}: {} - {} {}", kind, phone, bond, name);
                phones.push(entry.trim().to_string());
            }
        }
    }

    phones.join(" | ")
}

fn contacts_table<'a>(container: ElementRef<'a>, heading: ElementRef<'a>) -> Option<ElementRef<'a>> {
    if let Some(table) = dom::next_element_siblings(heading).find(|el| dom::is_tag(*el, &["table"])) {
        return Some(table);
    }
    // The table may sit further down, after the heading's wrapper.
    dom::ancestors(heading)
        .take_while(|el| dom::is_within(*el, container))
        .find_map(|el| select_all(el, "table").into_iter().last())
}

fn body_rows(table: ElementRef<'_>) -> Vec<Vec<String>> {
    select_all(table, "tbody tr")
        .into_iter()
        .map(|row| select_all(row, "td").into_iter().map(dom::text_of).collect())
        .collect()
}

fn is_control(element: ElementRef<'_>) -> bool {
    dom::is_tag(element, &["input", "select", "textarea"])
}

fn input_type(element: ElementRef<'_>) -> String {
    element
        .value()
        .attr("type")
        .unwrap_or("text")
        .to_ascii_lowercase()
}

fn is_value_control(element: ElementRef<'_>) -> bool {
    is_control(element)
        && !(dom::is_tag(element, &["input"])
            && matches!(input_type(element).as_str(), "checkbox" | "radio" | "hidden"))
}

fn is_checked(element: ElementRef<'_>) -> bool {
    element.value().attr("checked").is_some()
}

fn selected_option_text(select: ElementRef<'_>) -> Option<String> {
    let options = select_all(select, "option");
    options
        .iter()
        .find(|opt| opt.value().attr("selected").is_some())
        .or_else(|| options.first())
        .map(|opt| dom::text_of(*opt))
}

fn control_value(element: ElementRef<'_>) -> String {
    match element.value().name() {
        "select" => selected_option_text(element).unwrap_or_default(),
        "textarea" => element.text().collect::<String>().trim().to_string(),
        _ => element.value().attr("value").unwrap_or("").trim().to_string(),
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn is_label_like(element: ElementRef<'_>) -> bool {
    dom::is_tag(element, &["label", "strong", "th", "dt", "b"]) || dom::has_class(element, "control-label")
}

/// The nearest logical group around a label, never the container itself.
pub fn group_of<'a>(container: ElementRef<'a>, label: ElementRef<'a>) -> Option<ElementRef<'a>> {
    dom::ancestors(label)
        .take_while(|el| el.id() != container.id())
        .find(|el| {
            dom::is_tag(*el, &["div", "tr", "dd"]) || GROUP_CLASSES.iter().any(|c| dom::has_class(*el, c))
        })
}

fn unrelated(element: ElementRef<'_>, label: ElementRef<'_>) -> bool {
    !dom::is_within(element, label) && !dom::is_within(label, element)
}

pub fn sibling_control<'a>(_container: ElementRef<'a>, label: ElementRef<'a>) -> Option<String> {
    let next = dom::next_element_siblings(label).next()?;
    let control = if is_value_control(next) {
        next
    } else {
        next.descendants()
            .filter_map(ElementRef::wrap)
            .find(|el| is_value_control(*el))?
    };
    non_empty(control_value(control))
}

pub fn group_control<'a>(container: ElementRef<'a>, label: ElementRef<'a>) -> Option<String> {
    let group = group_of(container, label)?;
    select_all(group, CONTROLS)
        .into_iter()
        .filter(|el| is_value_control(*el) && unrelated(*el, label))
        .find_map(|el| non_empty(control_value(el)))
}

pub fn sibling_text<'a>(_container: ElementRef<'a>, label: ElementRef<'a>) -> Option<String> {
    let next = dom::next_element_siblings(label).next()?;
    if is_label_like(next) || !select_all(next, CONTROLS).is_empty() || is_control(next) {
        return None;
    }
    let text = dom::text_of(next);
    if text == dom::text_of(label) {
        return None;
    }
    non_empty(text)
}

pub fn group_text<'a>(container: ElementRef<'a>, label: ElementRef<'a>) -> Option<String> {
    let group = group_of(container, label)?;
    let label_text = dom::text_of(label);
    select_all(group, "span, p, .form-control-static, td, dd")
        .into_iter()
        .filter(|el| unrelated(*el, label) && !is_label_like(*el))
        .map(dom::text_of)
        .find(|text| !text.is_empty() && *text != label_text)
}

fn checkbox_in(scope: ElementRef<'_>) -> Option<ElementRef<'_>> {
    select_all(scope, "input")
        .into_iter()
        .find(|el| input_type(*el) == "checkbox")
}

pub fn group_checkbox<'a>(container: ElementRef<'a>, label: ElementRef<'a>) -> Option<bool> {
    let group = group_of(container, label).or_else(|| {
        label
            .parent()
            .and_then(ElementRef::wrap)
            .filter(|parent| parent.id() != container.id())
    })?;
    checkbox_in(group).map(is_checked)
}

pub fn sibling_checkbox<'a>(_container: ElementRef<'a>, label: ElementRef<'a>) -> Option<bool> {
    dom::next_element_siblings(label).find_map(|sibling| {
        if dom::is_tag(sibling, &["input"]) && input_type(sibling) == "checkbox" {
            Some(is_checked(sibling))
        } else {
            checkbox_in(sibling).map(is_checked)
        }
    })
}

fn checked_radios<'a>(group: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    select_all(group, "input")
        .into_iter()
        .filter(|el| input_type(*el) == "radio" && is_checked(*el))
}

fn radio_text<'a>(group: ElementRef<'a>, radio: ElementRef<'a>) -> String {
    if let Some(id) = radio.value().id() {
        let by_for = select_all(group, "label")
            .into_iter()
            .find(|lbl| lbl.value().attr("for") == Some(id));
        if let Some(lbl) = by_for {
            return dom::text_of(lbl);
        }
    }
    radio
        .parent()
        .and_then(ElementRef::wrap)
        .map(dom::text_of)
        .unwrap_or_default()
}

pub fn affirmative_radio<'a>(container: ElementRef<'a>, label: ElementRef<'a>) -> Option<bool> {
    let group = group_of(container, label)?;
    checked_radios(group).find_map(|radio| {
        let text = dom::fold(&radio_text(group, radio));
        if AFFIRMATIVE.contains(&text.as_str()) {
            Some(true)
        } else if NEGATIVE.contains(&text.as_str()) {
            Some(false)
        } else {
            None
        }
    })
}

pub fn selected_option<'a>(container: ElementRef<'a>, label: ElementRef<'a>) -> Option<String> {
    let group = group_of(container, label)?;
    select_all(group, "select")
        .into_iter()
        .filter(|el| unrelated(*el, label))
        .find_map(|select| {
            select_all(select, "option")
                .into_iter()
                .find(|opt| opt.value().attr("selected").is_some())
                .map(dom::text_of)
        })
        .and_then(non_empty)
}

pub fn checked_radio_text<'a>(container: ElementRef<'a>, label: ElementRef<'a>) -> Option<String> {
    let group = group_of(container, label)?;
    let radio = checked_radios(group).next()?;
    let text = radio_text(group, radio);
    Some(if text.is_empty() { "Sim".to_string() } else { text })
}

pub fn checked_checkbox_text<'a>(container: ElementRef<'a>, label: ElementRef<'a>) -> Option<String> {
    let group = group_of(container, label)?;
    checkbox_in(group)
        .filter(|cb| is_checked(*cb))
        .map(|_| "Sim".to_string())
}
