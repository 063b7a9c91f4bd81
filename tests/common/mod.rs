#![allow(dead_code)]

use sed_harvest::navigate::{Command, ControlHandle};
use sed_harvest::orchestrator::{EventSink, LogLevel, RecordingSink, RunEvent};
use sed_harvest::Config;
use std::fmt::Write;
use std::path::Path;

/// How a list row opens its detail window.
#[derive(Debug, Clone, Copy)]
pub enum View<'a> {
    /// The eye icon leads to this fixture state.
    To(&'a str),
    /// The icon is there but clicking it does nothing.
    Dead,
    /// The row has no icon at all.
    Missing,
}

pub struct Student<'a> {
    pub name: &'a str,
    pub ra: &'a str,
    pub view: View<'a>,
}

pub fn student<'a>(name: &'a str, ra: &'a str, view: View<'a>) -> Student<'a> {
    Student { name, ra, view }
}

/// A list page with the DataTables footer and a pager whose "Seguinte" leads to `next`.
pub fn list_page(students: &[Student<'_>], next: Option<&str>, total: usize) -> String {
    let mut rows = String::new();
    for (i, s) in students.iter().enumerate() {
        let view = match s.view {
            View::To(state) => format!(r#"<a data-goto="{}"><i class="fa fa-search"></i></a>"#, state),
            View::Dead => r#"<a><i class="fa fa-search"></i></a>"#.to_string(),
            View::Missing => String::new(),
        };
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>1</td><td>SP</td><td>15/06/2012</td><td>MARIA</td><td>{}</td></tr>",
            i + 1,
            s.name,
            s.ra,
            view
        );
    }
    if students.is_empty() {
        rows.push_str(r#"<tr><td colspan="8">Nenhum registro encontrado</td></tr>"#);
    }

    let pager = match next {
        Some(target) => format!(
            r#"<ul class="pagination"><li class="disabled"><a>Anterior</a></li><li><a data-goto="{}">Seguinte</a></li></ul>"#,
            target
        ),
        None => r#"<ul class="pagination"><li class="disabled"><a>Seguinte</a></li></ul>"#.to_string(),
    };

    format!(
        r#"<html><body>
        <div class="dataTables_info">Mostrando 1 a {shown} de {total} registros</div>
        <table class="dataTable"><thead><tr><th>Nº</th><th>Nome do Aluno</th></tr></thead><tbody>{rows}</tbody></table>
        {pager}
    </body></html>"#,
        shown = students.len(),
        total = total,
        rows = rows,
        pager = pager
    )
}

/// The two tabs of a student's detail window, as states `id` and `id-docs`.
///
/// Closing (button or Escape) returns to `back`.
pub fn detail_states(id: &str, name: &str, cpf: &str, back: &str) -> [(String, String); 2] {
    let tabs = format!(
        r#"<ul class="nav nav-tabs"><li><a data-goto="{id}">Dados Pessoais</a></li><li><a data-goto="{id}-docs">Documentos</a></li></ul>"#,
        id = id
    );
    let frame = |body: &str| {
        format!(
            r#"<html data-escape="{back}"><body>
        <table class="dataTable"><tbody><tr><td>1</td><td>{name}</td><td></td><td></td><td></td><td></td><td></td></tr></tbody></table>
        <div class="modal in" role="dialog">
            <h4>Dados do Aluno: {name} - RA:000111222333-1/SP</h4>
            <button class="close" data-goto="{back}">×</button>
            {tabs}
            {body}
        </div>
    </body></html>"#,
            back = back,
            name = name,
            tabs = tabs,
            body = body
        )
    };

    let personal = frame(&format!(
        r#"<div class="form-group"><label>Nome:</label><input value="{} DA SILVA"></div>
            <div class="form-group"><label>Data de Nascimento:</label><input value="15/06/2012"></div>"#,
        name
    ));
    let documents = frame(&format!(
        r#"<div class="form-group"><label>CPF:</label><input value="{}"></div>"#,
        cpf
    ));

    [(id.to_string(), personal), (format!("{}-docs", id), documents)]
}

/// A detail state whose every snapshot fails; Escape returns to `back`.
pub fn broken_state(back: &str) -> String {
    format!(
        r#"<html data-fail="1" data-escape="{}"><body><div class="modal in">...</div></body></html>"#,
        back
    )
}

pub fn write_fixture_dir(dir: &Path, states: &[(String, String)]) {
    for (name, html) in states {
        std::fs::write(dir.join(format!("{}.html", name)), html).unwrap();
    }
}

/// Personal data and documents only, the two tabs the fixtures render.
pub fn config() -> Config {
    let mut config = Config::default();
    config.extraction.sections = vec!["Dados Pessoais".to_string(), "Documentos".to_string()];
    config
}

/// Records events and sends a command when a given item starts or a given
/// message is logged.
pub struct ReactingSink {
    pub recording: RecordingSink,
    handle: ControlHandle,
    on_item: Option<(usize, Command)>,
    on_message: Option<(String, Command)>,
}

impl ReactingSink {
    pub fn new(handle: ControlHandle) -> Self {
        Self {
            recording: RecordingSink::new(),
            handle,
            on_item: None,
            on_message: None,
        }
    }

    pub fn on_item(mut self, index: usize, command: Command) -> Self {
        self.on_item = Some((index, command));
        self
    }

    pub fn on_message(mut self, message: &str, command: Command) -> Self {
        self.on_message = Some((message.to_string(), command));
        self
    }

    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.recording.messages(level)
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.recording.events()
    }
}

impl EventSink for ReactingSink {
    fn emit(&self, event: RunEvent) {
        match &event {
            RunEvent::Item { index, .. } => {
                if let Some((at, command)) = self.on_item {
                    if *index == at {
                        self.handle.send(command);
                    }
                }
            }
            RunEvent::Log { message, .. } => {
                if let Some((wanted, command)) = &self.on_message {
                    if message == wanted {
                        self.handle.send(*command);
                    }
                }
            }
            _ => {}
        }
        self.recording.emit(event);
    }
}
