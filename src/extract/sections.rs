//! The detail sections of the student record and the fields read from each.

use crate::extract::fields;
use crate::extract::record::{FieldMap, FieldValue};
use regex::Regex;
use scraper::ElementRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Toggle,
    /// Checked box reads "Sim"; otherwise the labelled text.
    ToggleOrText,
    Choice,
    /// A checked radio's text, else a checkbox state.
    ChoiceOrToggle,
    Pattern(&'static str),
    /// RA number, digit and state from the overlay header.
    HeaderRa,
    TwoLetter,
    Phones,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub column: &'static str,
    pub labels: &'static [&'static str],
    pub kind: FieldKind,
    pub default: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct SectionSpec {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

const fn text(column: &'static str, labels: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        column,
        labels,
        kind: FieldKind::Text,
        default: "",
    }
}

const fn text_or(column: &'static str, labels: &'static [&'static str], default: &'static str) -> FieldSpec {
    FieldSpec {
        column,
        labels,
        kind: FieldKind::Text,
        default,
    }
}

const fn toggle(column: &'static str, labels: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        column,
        labels,
        kind: FieldKind::Toggle,
        default: "Não",
    }
}

const fn special(column: &'static str, labels: &'static [&'static str], kind: FieldKind, default: &'static str) -> FieldSpec {
    FieldSpec {
        column,
        labels,
        kind,
        default,
    }
}

pub const PERSONAL: SectionSpec = SectionSpec {
    name: "Dados Pessoais",
    fields: &[
        text("Data de Alteração", &["Data de Alteração"]),
        text("Nome", &["Nome"]),
        toggle("Informar Nome Social?", &["Nome Social"]),
        toggle("Informar Nome Afetivo?", &["Nome Afetivo"]),
        text("Sexo", &["Sexo"]),
        text("Raça/Cor", &["Raça/Cor", "Raca/Cor"]),
        toggle(
            "Aluno com transtorno(s) que impacta(m) o desenvolvimento da aprendizagem",
            &["transtorno"],
        ),
        text("Tipo Sanguíneo", &["Tipo Sangu"]),
        toggle("Idade Mínima Especial", &["Idade Mínima"]),
        text("Data de Nascimento", &["Data de Nascimento"]),
        toggle("Falecimento", &["Falecimento"]),
        toggle("Refugiado", &["Refugiado"]),
        toggle("Emancipado", &["Emancipado"]),
        special("Irmão(s)", &[], FieldKind::Pattern(r"(?i)Irmão\(s\)\s*(\d+)"), "0"),
        text("E-Mail", &["E-Mail:"]),
        text("E-Mail Google", &["E-Mail Google"]),
        text("E-Mail Microsoft", &["E-Mail Microsoft"]),
        text("Filiação 1", &["Filiação 1"]),
        text("Filiação 2", &["Filiação 2"]),
        toggle("Participa do Programa Bolsa Família", &["Bolsa Família"]),
        special("RA", &["RA"], FieldKind::HeaderRa, ""),
        text(
            "Identificação Única - Educacenso",
            &["Educacenso", "Identificação Única"],
        ),
        text_or("Nacionalidade", &["Nacionalidade"], "Brasileira"),
        text("Município de Nascimento", &["Município de Nascimento"]),
        special("UFNascimento", &["Município de Nascimento"], FieldKind::TwoLetter, ""),
        toggle("Sigilo", &["Sigilo"]),
        toggle("Quilombola", &["Quilombola"]),
        toggle("Membro de Comunidade Circense e/ou Cigana", &["Circense"]),
        special(
            "Possui internet em casa",
            &["internet em casa", "internet"],
            FieldKind::ChoiceOrToggle,
            "Não",
        ),
        special(
            "Possui smartphone, tablet ou notebook pessoal",
            &["smartphone"],
            FieldKind::ChoiceOrToggle,
            "Não",
        ),
    ],
};

pub const DOCUMENTS: SectionSpec = SectionSpec {
    name: "Documentos",
    fields: &[
        special("Carteira de Identidade Nacional (CIN)", &["CIN"], FieldKind::ToggleOrText, "Não"),
        text("Data Emissão do CIN", &["Emissão do CIN", "Emissão CIN"]),
        text("CPF", &["CPF"]),
        text("Documento Civil RG", &["RG", "Documento Civil"]),
        text("Data Emissão RG/RNM", &["Emissão RG", "Data Emissão"]),
        text("Data de emissão", &["Data de emissão"]),
        text("Cert. Matr.", &["Cert", "Certidão"]),
        text("NIS", &["NIS"]),
        text("Cartão Nacional de Saúde - SUS", &["SUS", "Saúde"]),
    ],
};

pub const DISABILITY: SectionSpec = SectionSpec {
    name: "Deficiência",
    fields: &[
        toggle("Investigação de deficiência", &["Investigação"]),
        toggle("Estudante com Deficiência", &["Deficiência"]),
        toggle("Altas Habilidades/Superdotação", &["Altas Habilidades"]),
        toggle("Laudo Médico", &["Laudo"]),
        text_or("Nível de Apoio", &["Nível de Apoio"], "1"),
        toggle("Necessita de Profissional de apoio Escolar?", &["Profissional de apoio"]),
        toggle("Mobilidade Reduzida", &["Mobilidade"]),
        text(
            "Recursos Necessários para a Participação do Aluno em Avaliações",
            &["Recursos"],
        ),
    ],
};

pub const ADDRESS: SectionSpec = SectionSpec {
    name: "Endereço Residencial",
    fields: &[
        text("CEP", &["CEP"]),
        text_or("Localização/Zona de Residência", &["Localização", "Zona"], "Urbana"),
        text_or(
            "Localização Diferenciada",
            &["Diferenciada"],
            "Não está em área de localização diferenciada",
        ),
        text("Endereço - Nº", &["Endereço", "Logradouro"]),
        text("EnderecoNR", &["Número", "Nº"]),
        text("Complemento", &["Complemento"]),
        text("Bairro", &["Bairro"]),
        text("Cidade - UF", &["Cidade", "Município"]),
        text("Latitude/Longitude", &["Latitude"]),
        text("Longitude", &["Longitude"]),
    ],
};

pub const PHONES: SectionSpec = SectionSpec {
    name: "Telefones",
    fields: &[special("telefones_formatados", &[], FieldKind::Phones, "")],
};

pub const CATALOG: &[SectionSpec] = &[PERSONAL, DOCUMENTS, DISABILITY, ADDRESS, PHONES];

pub const SECTION_NAMES: &[&str] = &[
    "Dados Pessoais",
    "Documentos",
    "Deficiência",
    "Endereço Residencial",
    "Telefones",
];

/// Export header, in the order downstream spreadsheets expect.
pub const OUTPUT_COLUMNS: &[&str] = &[
    "série/ano",
    "numero_linha",
    "nome",
    "ra_lista",
    "serie",
    "uf_lista",
    "data_nasc_lista",
    "responsavel_lista",
    "cabecalho",
    "ra_cabecalho",
    "data_nascimento_cabecalho",
    "Data de Alteração",
    "Nome",
    "Informar Nome Social?",
    "Informar Nome Afetivo?",
    "Sexo",
    "Raça/Cor",
    "Aluno com transtorno(s) que impacta(m) o desenvolvimento da aprendizagem",
    "Idade Mínima Especial",
    "Data de Nascimento",
    "Falecimento",
    "Refugiado",
    "Emancipado",
    "Irmão(s)",
    "E-Mail Google",
    "E-Mail Microsoft",
    "Filiação 1",
    "Filiação 2",
    "Participa do Programa Bolsa Família",
    "RA",
    "Identificação Única - Educacenso",
    "Nacionalidade",
    "Município de Nascimento",
    "Sigilo",
    "Quilombola",
    "Membro de Comunidade Circense e/ou Cigana",
    "Possui internet em casa",
    "Possui smartphone, tablet ou notebook pessoal",
    "Carteira de Identidade Nacional (CIN)",
    "CPF",
    "Documento Civil RG",
    "Data Emissão RG/RNM",
    "Data de emissão",
    "Cert. Matr.",
    "Investigação de deficiência",
    "Estudante com Deficiência",
    "Altas Habilidades/Superdotação",
    "Laudo Médico",
    "Nível de Apoio",
    "Necessita de Profissional de apoio Escolar?",
    "Mobilidade Reduzida",
    "CEP",
    "Localização/Zona de Residência",
    "Localização Diferenciada",
    "Endereço - Nº",
    "Complemento",
    "Bairro",
    "Cidade - UF",
    "Latitude/Longitude",
    "Mostrar102550100registros",
    "Idade",
    "nrDigRa",
    "sgUfRa",
    "DigRgAluno",
    "EnderecoNR",
    "Longitude",
    "telefones_formatados",
    "Recursos Necessários para a Participação do Aluno em Avaliações",
    "NIS",
    "Cartão Nacional de Saúde - SUS",
    "Tipo Sanguíneo",
    "UFNascimento",
    "Data Emissão do CIN",
    "E-Mail",
];

pub fn section(name: &str) -> Option<&'static SectionSpec> {
    CATALOG.iter().find(|spec| spec.name == name)
}

fn first_field(container: ElementRef<'_>, labels: &[&str]) -> String {
    labels
        .iter()
        .map(|label| fields::read_field(container, label))
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

fn any_toggle(container: ElementRef<'_>, labels: &[&str]) -> bool {
    labels.iter().any(|label| fields::read_toggle(container, label))
}

fn with_default(value: String, default: &str) -> FieldValue {
    if value.is_empty() {
        FieldValue::text(default)
    } else {
        FieldValue::Text(value)
    }
}

/// Reads every field of `spec` from the detail container.
pub fn read_section(container: ElementRef<'_>, spec: &SectionSpec) -> FieldMap {
    let mut map = FieldMap::new();

    for field in spec.fields {
        match field.kind {
            FieldKind::Text => {
                let value = first_field(container, field.labels);
                map.insert(field.column, with_default(value, field.default));
            }
            FieldKind::Toggle => {
                map.insert(field.column, FieldValue::Flag(any_toggle(container, field.labels)));
            }
            FieldKind::ToggleOrText => {
                let value = if any_toggle(container, field.labels) {
                    FieldValue::Flag(true)
                } else {
                    with_default(first_field(container, field.labels), field.default)
                };
                map.insert(field.column, value);
            }
            FieldKind::Choice => {
                let value = field
                    .labels
                    .iter()
                    .map(|label| fields::read_choice(container, label))
                    .find(|value| !value.is_empty())
                    .unwrap_or_default();
                map.insert(field.column, with_default(value, field.default));
            }
            FieldKind::ChoiceOrToggle => {
                let choice = field
                    .labels
                    .iter()
                    .map(|label| fields::read_choice(container, label))
                    .find(|value| !value.is_empty());
                let value = match choice {
                    Some(choice) => FieldValue::Text(choice),
                    None => FieldValue::Flag(any_toggle(container, field.labels)),
                };
                map.insert(field.column, value);
            }
            FieldKind::Pattern(pattern) => {
                let value = Regex::new(pattern)
                    .ok()
                    .and_then(|re| fields::read_pattern(container, &re))
                    .unwrap_or_default();
                map.insert(field.column, with_default(value, field.default));
            }
            FieldKind::HeaderRa => match fields::read_header_ra(container) {
                Some((number, digit, state)) => {
                    map.insert(field.column, FieldValue::Text(number));
                    map.insert("nrDigRa", FieldValue::Text(digit));
                    map.insert("sgUfRa", FieldValue::Text(state));
                }
                None => {
                    map.insert(field.column, FieldValue::text(first_field(container, field.labels)));
                    map.insert("nrDigRa", FieldValue::Empty);
                    map.insert("sgUfRa", FieldValue::Empty);
                }
            },
            FieldKind::TwoLetter => {
                let value = field
                    .labels
                    .iter()
                    .find_map(|label| fields::read_two_letter(container, label))
                    .unwrap_or_default();
                map.insert(field.column, with_default(value, field.default));
            }
            FieldKind::Phones => {
                map.insert(field.column, FieldValue::text(fields::read_phones(container)));
            }
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};
    use std::collections::HashSet;

    fn container(html: &Html) -> ElementRef<'_> {
        html.select(&Selector::parse("#c").unwrap()).next().unwrap()
    }

    #[test]
    fn test_catalog_columns_are_known() {
        let header: HashSet<&str> = OUTPUT_COLUMNS.iter().copied().collect();
        assert_eq!(header.len(), OUTPUT_COLUMNS.len());
        assert_eq!(OUTPUT_COLUMNS.len(), 74);

        for spec in CATALOG {
            for field in spec.fields {
                assert!(header.contains(field.column), "{} missing from header", field.column);
            }
        }
        let names: Vec<&str> = CATALOG.iter().map(|s| s.name).collect();
        assert_eq!(names, SECTION_NAMES);
    }

    #[test]
    fn test_personal_section() {
        let html = Html::parse_document(
            r#"<div id="c">
                <div class="modal-header"><h4 class="modal-title">Dados do Aluno: ANA - RA:000122759213-9/SP - Data Nascimento: 15/06/2012</h4></div>
                <div class="form-group"><label>Nome:</label><input value="ANA SOUZA"></div>
                <div class="form-group"><label>Raça/Cor:</label><select><option>Branca</option><option selected>Parda</option></select></div>
                <div class="form-group"><label>Sigilo</label><input type="checkbox" checked></div>
                <div class="form-group"><label>Município de Nascimento:</label><input value="CAMPINAS"><input value="SP"></div>
                <button>Irmão(s) 1</button>
            </div>"#,
        );
        let map = read_section(container(&html), &PERSONAL);

        assert_eq!(map.get("Nome"), Some(&FieldValue::text("ANA SOUZA")));
        assert_eq!(map.get("Raça/Cor"), Some(&FieldValue::text("Parda")));
        assert_eq!(map.get("Sigilo"), Some(&FieldValue::Flag(true)));
        assert_eq!(map.get("Refugiado"), Some(&FieldValue::Flag(false)));
        assert_eq!(map.get("Nacionalidade"), Some(&FieldValue::text("Brasileira")));
        assert_eq!(map.get("Irmão(s)"), Some(&FieldValue::text("1")));
        assert_eq!(map.get("RA"), Some(&FieldValue::text("000122759213")));
        assert_eq!(map.get("nrDigRa"), Some(&FieldValue::text("9")));
        assert_eq!(map.get("UFNascimento"), Some(&FieldValue::text("SP")));
        assert_eq!(map.get("Possui internet em casa"), Some(&FieldValue::Flag(false)));
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let html = Html::parse_document(r#"<div id="c"><p>vazio</p></div>"#);
        let disability = read_section(container(&html), &DISABILITY);
        assert_eq!(disability.get("Nível de Apoio"), Some(&FieldValue::text("1")));
        assert_eq!(disability.get("Laudo Médico"), Some(&FieldValue::Flag(false)));

        let documents = read_section(container(&html), &DOCUMENTS);
        assert_eq!(
            documents.get("Carteira de Identidade Nacional (CIN)"),
            Some(&FieldValue::text("Não"))
        );
        assert_eq!(documents.get("CPF"), Some(&FieldValue::Empty));
    }

    #[test]
    fn test_section_lookup() {
        assert_eq!(section("Telefones").map(|s| s.fields.len()), Some(1));
        assert!(section("Histórico").is_none());
    }
}
