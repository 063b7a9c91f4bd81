use crate::config::{ListColumn, ListConfig};
use crate::error::Result;
use crate::page::dom;
use crate::page::NodePath;
use scraper::{ElementRef, Selector};

/// One row of the student list as it looks right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    /// 1-based position among the readable rows of the current page.
    pub position: usize,
    pub name: String,
    pub fields: Vec<(String, String)>,
    pub view: Option<NodePath>,
}

impl ListItem {
    pub fn has_view(&self) -> bool {
        self.view.is_some()
    }
}

pub struct ListReader {
    row: Selector,
    view_selectors: Vec<Selector>,
    min_cells: usize,
    name_column: usize,
    view_column: Option<usize>,
    columns: Vec<ListColumn>,
}

impl ListReader {
    pub fn new(config: &ListConfig) -> Result<Self> {
        Ok(Self {
            row: dom::selector("tbody tr")?,
            view_selectors: dom::selectors(&config.view_selectors)?,
            min_cells: config.min_cells,
            name_column: config.name_column,
            view_column: config.view_column,
            columns: config.columns.clone(),
        })
    }

    /// Reads the rows of `table` that carry at least the minimum number of
    /// cells and a non-empty name.
    pub fn read(&self, table: ElementRef<'_>) -> Vec<ListItem> {
        let mut items = Vec::new();

        for row in table.select(&self.row) {
            let cells: Vec<ElementRef<'_>> = dom::child_elements(row)
                .filter(|cell| dom::is_tag(*cell, &["td"]))
                .collect();
            if cells.len() < self.min_cells {
                continue;
            }

            let name = cells
                .get(self.name_column)
                .map(|cell| dom::text_of(*cell))
                .unwrap_or_default();
            if name.is_empty() {
                continue;
            }

            let fields = self
                .columns
                .iter()
                .map(|column| {
                    let value = cells
                        .get(column.index)
                        .map(|cell| dom::text_of(*cell))
                        .unwrap_or_default();
                    (column.column.clone(), value)
                })
                .collect();

            items.push(ListItem {
                position: items.len() + 1,
                name,
                fields,
                view: self.view_affordance(row, &cells),
            });
        }

        items
    }

    fn view_affordance(&self, row: ElementRef<'_>, cells: &[ElementRef<'_>]) -> Option<NodePath> {
        let clickable = |el: ElementRef<'_>| dom::is_tag(el, &["a", "button"]);

        let by_icon = self
            .view_selectors
            .iter()
            .flat_map(|selector| row.select(selector))
            .find(|el| dom::is_visible(*el))
            .map(|el| dom::closest(el, clickable).unwrap_or(el));
        if let Some(element) = by_icon {
            return Some(NodePath::of(element));
        }

        let cell = cells.get(self.view_column?)?;
        cell.descendants()
            .filter_map(ElementRef::wrap)
            .find(|el| clickable(*el) && dom::is_visible(*el))
            .map(NodePath::of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    const TABLE: &str = r##"<html><body><table id="t">
        <thead><tr><th>Nº</th><th>Nome do Aluno</th></tr></thead>
        <tbody>
            <tr><td>1</td><td>ANA SOUZA</td><td>000122759213</td><td>9</td><td>SP</td><td>15/06/2012</td><td>MARIA</td>
                <td><a href="#" id="v1"><i class="fa fa-search"></i></a></td><td><a><i class="fa fa-pencil"></i></a></td></tr>
            <tr><td>2</td><td>BRUNO LIMA</td><td>000122759214</td><td>1</td><td>SP</td><td>01/01/2012</td><td>JOSE</td>
                <td></td><td></td></tr>
            <tr><td colspan="9">Nenhum registro</td></tr>
            <tr><td>3</td><td> </td><td></td><td></td><td></td><td></td><td></td><td></td></tr>
            <tr><td>4</td><td>CARLA DIAS</td><td>000122759215</td><td>2</td><td>SP</td><td>02/02/2012</td><td>ROSA</td>
                <td><button id="v4">Visualizar</button></td></tr>
        </tbody></table></body></html>"##;

    fn read() -> (Html, Vec<ListItem>) {
        let html = Html::parse_document(TABLE);
        let reader = ListReader::new(&ListConfig::default()).unwrap();
        let table = html.select(&Selector::parse("#t").unwrap()).next().unwrap();
        let items = reader.read(table);
        (html, items)
    }

    #[test]
    fn test_rows_need_cells_and_name() {
        let (_, items) = read();
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["ANA SOUZA", "BRUNO LIMA", "CARLA DIAS"]);
        assert_eq!(items.iter().map(|i| i.position).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_list_columns() {
        let (_, items) = read();
        let fields = &items[0].fields;
        assert_eq!(fields[0], ("nome".to_string(), "ANA SOUZA".to_string()));
        assert_eq!(fields[1], ("ra_lista".to_string(), "000122759213".to_string()));
        assert_eq!(fields[2], ("serie".to_string(), "9".to_string()));
        assert_eq!(fields[5], ("responsavel_lista".to_string(), "MARIA".to_string()));
    }

    #[test]
    fn test_view_affordance_resolution() {
        let (html, items) = read();
        let first = items[0].view.as_ref().unwrap().resolve(&html).unwrap();
        assert_eq!(first.value().id(), Some("v1"));

        assert!(!items[1].has_view());

        let third = items[2].view.as_ref().unwrap().resolve(&html).unwrap();
        assert_eq!(third.value().id(), Some("v4"));
    }
}
