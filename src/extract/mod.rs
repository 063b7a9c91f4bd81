pub mod fields;
pub mod list;
pub mod record;
pub mod sections;

pub use fields::{read_choice, read_field, read_toggle};
pub use list::{ListItem, ListReader};
pub use record::{FieldMap, FieldValue, Record, RecordBuilder};
pub use sections::{read_section, section, FieldKind, FieldSpec, SectionSpec, CATALOG, OUTPUT_COLUMNS};
