use crate::extract::list::ListItem;
use crate::extract::sections::OUTPUT_COLUMNS;
use chrono::{Datelike, NaiveDate};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const PERIOD_COLUMN: &str = "série/ano";
pub const ORDINAL_COLUMN: &str = "numero_linha";

/// Detail columns backed by a list column when the detail value is empty.
const LIST_FALLBACKS: &[(&str, &str)] = &[
    ("Nome", "nome"),
    ("Data de Nascimento", "data_nasc_lista"),
    ("RA", "ra_lista"),
    ("nrDigRa", "serie"),
    ("sgUfRa", "uf_lista"),
    ("Filiação 1", "responsavel_lista"),
];

const DEFAULT_RA_STATE: &str = "SP";

/// Columns older importers still expect with fixed values.
const CONSTANT_COLUMNS: &[(&str, &str)] = &[("Mostrar102550100registros", "10"), ("DigRgAluno", "")];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
    Empty,
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            FieldValue::Empty
        } else {
            FieldValue::Text(value)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Empty)
    }

    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::Flag(true) => "Sim".to_string(),
            FieldValue::Flag(false) => "Não".to_string(),
            FieldValue::Empty => String::new(),
        }
    }
}

/// Values read from one detail section, in catalog order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: Vec<(String, FieldValue)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: &str, value: FieldValue) {
        match self.entries.iter_mut().find(|(name, _)| name == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column.to_string(), value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One output row: column name to value, in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    columns: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Empty string for absent columns.
    pub fn value(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| name == column) {
            Some(entry) => entry.1 = value,
            None => self.columns.push((column.to_string(), value)),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn ordinal(&self) -> Option<usize> {
        self.get(ORDINAL_COLUMN).and_then(|n| n.parse().ok())
    }

    /// Known columns first in header order, anything else after in first-seen order.
    fn sort_by_header(&mut self) {
        let rank = |name: &str| {
            OUTPUT_COLUMNS
                .iter()
                .position(|column| *column == name)
                .unwrap_or(OUTPUT_COLUMNS.len())
        };
        self.columns.sort_by_key(|(name, _)| rank(name));
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = Record;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of column names to string values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Record, A::Error> {
        let mut record = Record::new();
        while let Some((name, value)) = access.next_entry::<String, String>()? {
            record.set(&name, value);
        }
        Ok(record)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RecordVisitor)
    }
}

/// Whole years between a `dd/mm/yyyy` birth date and `today`.
pub fn age_in_years(birth: &str, today: NaiveDate) -> Option<i32> {
    let birth = NaiveDate::parse_from_str(birth.trim(), "%d/%m/%Y").ok()?;
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    (years >= 0).then_some(years)
}

/// Assembles one Record from a list row and the sections read from its overlay.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: Record,
    detail_read: bool,
}

impl RecordBuilder {
    pub fn seed(period_label: &str, ordinal: usize, item: &ListItem) -> Self {
        let mut record = Record::new();
        record.set(PERIOD_COLUMN, period_label);
        record.set(ORDINAL_COLUMN, ordinal.to_string());
        for (column, value) in &item.fields {
            record.set(column, value.clone());
        }

        Self {
            record,
            detail_read: false,
        }
    }

    /// Merges a section. Non-empty values win; empty values never blank a column.
    pub fn overlay(&mut self, fields: &FieldMap) {
        self.detail_read = true;
        for (column, value) in fields.iter() {
            if !value.is_empty() {
                self.record.set(column, value.render());
            } else if self.record.get(column).is_none() {
                self.record.set(column, "");
            }
        }
    }

    pub fn detail_read(&self) -> bool {
        self.detail_read
    }

    /// A Record carrying list-derived columns only.
    pub fn degraded(self) -> Record {
        let mut record = self.record;
        record.sort_by_header();
        record
    }

    pub fn finish(self, today: NaiveDate) -> Record {
        if !self.detail_read {
            return self.degraded();
        }

        let mut record = self.record;
        for (detail, list) in LIST_FALLBACKS {
            if record.value(detail).is_empty() {
                let fallback = record.value(list).to_string();
                record.set(detail, fallback);
            }
        }
        if record.value("sgUfRa").is_empty() {
            record.set("sgUfRa", DEFAULT_RA_STATE);
        }

        let name = record.value("Nome").to_string();
        let birth = record.value("Data de Nascimento").to_string();
        let ra = format!(
            "{}-{}/{}",
            record.value("RA"),
            record.value("nrDigRa"),
            record.value("sgUfRa")
        );

        record.set(
            "cabecalho",
            format!("×Dados do Aluno: {} - RA:{} - Data Nascimento: {}", name, ra, birth),
        );
        record.set("ra_cabecalho", ra);
        record.set("data_nascimento_cabecalho", birth.clone());
        record.set(
            "Idade",
            age_in_years(&birth, today)
                .map(|years| format!("{} anos", years))
                .unwrap_or_default(),
        );
        for (column, value) in CONSTANT_COLUMNS {
            record.set(column, *value);
        }
        for column in OUTPUT_COLUMNS {
            if record.get(column).is_none() {
                record.set(column, "");
            }
        }

        record.sort_by_header();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ListItem {
        ListItem {
            position: 1,
            name: "ANA SOUZA".to_string(),
            fields: vec![
                ("nome".to_string(), "ANA SOUZA".to_string()),
                ("ra_lista".to_string(), "000122759213".to_string()),
                ("serie".to_string(), "9".to_string()),
                ("uf_lista".to_string(), "".to_string()),
                ("data_nasc_lista".to_string(), "15/06/2012".to_string()),
                ("responsavel_lista".to_string(), "MARIA SOUZA".to_string()),
            ],
            view: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
    }

    #[test]
    fn test_degraded_record_has_list_columns_only() {
        let record = RecordBuilder::seed("7A", 3, &item()).finish(today());
        let names: Vec<&str> = record.column_names().collect();
        assert_eq!(
            names,
            vec![
                "série/ano",
                "numero_linha",
                "nome",
                "ra_lista",
                "serie",
                "uf_lista",
                "data_nasc_lista",
                "responsavel_lista"
            ]
        );
        assert_eq!(record.ordinal(), Some(3));
        assert_eq!(record.value("Sexo"), "");
    }

    #[test]
    fn test_detail_wins_and_list_fills_gaps() {
        let mut builder = RecordBuilder::seed("7A", 1, &item());
        let mut personal = FieldMap::new();
        personal.insert("Nome", FieldValue::text("ANA DE SOUZA"));
        personal.insert("Data de Nascimento", FieldValue::Empty);
        personal.insert("Sigilo", FieldValue::Flag(false));
        builder.overlay(&personal);

        let record = builder.finish(today());
        assert_eq!(record.value("Nome"), "ANA DE SOUZA");
        assert_eq!(record.value("nome"), "ANA SOUZA");
        assert_eq!(record.value("Data de Nascimento"), "15/06/2012");
        assert_eq!(record.value("Filiação 1"), "MARIA SOUZA");
        assert_eq!(record.value("sgUfRa"), "SP");
        assert_eq!(record.value("Sigilo"), "Não");
        assert_eq!(record.value("Idade"), "11 anos");
        assert_eq!(record.value("Mostrar102550100registros"), "10");
        assert_eq!(
            record.value("cabecalho"),
            "×Dados do Aluno: ANA DE SOUZA - RA:000122759213-9/SP - Data Nascimento: 15/06/2012"
        );
        assert_eq!(record.len(), OUTPUT_COLUMNS.len());
        assert_eq!(record.column_names().next(), Some("série/ano"));
    }

    #[test]
    fn test_later_section_never_blanks_earlier_value() {
        let mut builder = RecordBuilder::seed("7A", 1, &item());
        let mut first = FieldMap::new();
        first.insert("CPF", FieldValue::text("123"));
        let mut second = FieldMap::new();
        second.insert("CPF", FieldValue::Empty);
        second.insert("Observação", FieldValue::text("extra"));
        builder.overlay(&first);
        builder.overlay(&second);

        let record = builder.finish(today());
        assert_eq!(record.value("CPF"), "123");
        assert_eq!(record.column_names().last(), Some("Observação"));
    }

    #[test]
    fn test_age_in_years() {
        assert_eq!(age_in_years("14/06/2012", today()), Some(12));
        assert_eq!(age_in_years("15/06/2012", today()), Some(11));
        assert_eq!(age_in_years("2012-06-15", today()), None);
        assert_eq!(age_in_years("01/01/2030", today()), None);
    }

    #[test]
    fn test_record_json_keeps_column_order() {
        let mut record = Record::new();
        record.set("zeta", "1");
        record.set("alpha", "2");

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"zeta":"1","alpha":"2"}"#);

        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
