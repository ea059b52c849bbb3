use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::plugin_api::{FieldEntry, FieldSchema, FormSchema};

lazy_static! {
    static ref LINE_BREAK: Regex = Regex::new(r"\r\n|\n|\r").unwrap();
    static ref TAG_GAP: Regex = Regex::new(r">\s+<").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("field name {0:?} appears more than once in the schema")]
    DuplicateFieldName(String),
    #[error("unrecognized field type {type_tag:?} (field {name:?})")]
    UnrecognizedFieldType { type_tag: String, name: Option<String> },
}

/// Options that shape a compiled form
#[derive(Debug, Clone)]
pub struct FormOptions {
    pub form_id: String,
    pub submit_label: String,
    pub enforce_unique_names: bool,
    pub strict_field_types: bool,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            form_id: "form_plugins_builder".to_string(),
            submit_label: "Submit".to_string(),
            enforce_unique_names: true,
            strict_field_types: false,
        }
    }
}

/// Markup for a single field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledField(pub String);

/// A minified, submittable form plus the entries that were dropped from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledForm {
    pub markup: String,
    pub skipped: Vec<FormError>,
}

/// Escape text for use in element content or a quoted attribute.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn namespaced(instance: &str, key: &str) -> String {
    escape_html(&format!("{}_{}", instance, key))
}

/// Compile one schema entry into markup namespaced under `instance`.
pub fn compile_field(instance: &str, field: &FieldSchema) -> CompiledField {
    let label = escape_html(field.label());
    let name = namespaced(instance, field.name());

    let markup = match field {
        // The schema value is a hint only, so resubmitting never echoes a stale value
        FieldSchema::Text { value, .. } => format!(
            r#"
            <div class="field">
                <label class="label">{label}</label>
                <div class="control">
                    <input class="input" type="text" name="{name}" placeholder="{placeholder}">
                </div>
            </div>
            "#,
            placeholder = escape_html(value),
        ),
        FieldSchema::Radio { options, .. } => {
            let choices: String = options
                .iter()
                .map(|option| {
                    let id = namespaced(instance, option);
                    format!(
                        r#"
                    <input class="is-checkradio" type="radio" name="{name}" id="{id}" value="{value}">
                    <label for="{id}">{text}</label>
                    "#,
                        value = escape_html(option),
                        text = escape_html(option),
                    )
                })
                .collect();

            format!(
                r#"
            <div class="field">
                <label class="label">{label}</label>
                <div class="control">{choices}
                </div>
            </div>
            "#
            )
        }
        FieldSchema::Select { options, .. } => {
            let entries: String = options
                .iter()
                .map(|option| format!("<option>{}</option>", escape_html(option)))
                .collect();

            format!(
                r#"
            <div class="field">
                <label class="label">{label}</label>
                <div class="control">
                    <div class="select">
                        <select name="{name}">{entries}</select>
                    </div>
                </div>
            </div>
            "#
            )
        }
        FieldSchema::Checkbox { id, value, .. } => format!(
            r#"
            <div class="field">
                <input class="is-checkradio" type="checkbox" name="{name}" id="{id}" value="{value}">
                <label for="{id}" class="checkbox">{label}</label>
            </div>
            "#,
            id = namespaced(instance, id),
            value = escape_html(value),
        ),
    };

    CompiledField(markup)
}

/// Compile a full schema into one minified form.
///
/// Fields are compiled independently and joined in schema order. Entries
/// with an unknown type tag are left out and listed in `skipped`, unless
/// `strict_field_types` is set, in which case the first one is an error.
pub fn compile_form(
    instance: &str,
    schema: &FormSchema,
    options: &FormOptions,
) -> Result<CompiledForm, FormError> {
    if options.enforce_unique_names {
        check_unique_names(schema)?;
    }

    let mut skipped = Vec::new();
    let mut fields = Vec::with_capacity(schema.entries.len());

    for entry in &schema.entries {
        match entry {
            FieldEntry::Field(field) => fields.push(compile_field(instance, field)),
            FieldEntry::Unrecognized { type_tag, name } => {
                let error = FormError::UnrecognizedFieldType {
                    type_tag: type_tag.clone(),
                    name: name.clone(),
                };
                if options.strict_field_types {
                    return Err(error);
                }
                skipped.push(error);
            }
        }
    }

    let body: String = fields.iter().map(|field| field.0.as_str()).collect();
    let markup = format!(
        r#"<form id="{form_id}">{body}
    <div class="control">
        <button type="submit" class="button is-primary">{submit}</button>
    </div>
    </form>"#,
        form_id = escape_html(&options.form_id),
        submit = escape_html(&options.submit_label),
    );

    Ok(CompiledForm {
        markup: minify(&markup),
        skipped,
    })
}

fn check_unique_names(schema: &FormSchema) -> Result<(), FormError> {
    let mut seen = HashSet::new();
    for entry in &schema.entries {
        if let FieldEntry::Field(field) = entry {
            if !seen.insert(field.name()) {
                return Err(FormError::DuplicateFieldName(field.name().to_string()));
            }
        }
    }
    Ok(())
}

/// Strip layout whitespace from markup.
///
/// Every line is trimmed and the line breaks dropped, then any whitespace
/// left between a `>` and the next `<` is removed. Whitespace inside text or
/// attribute values that touches neither a line edge nor a tag gap is kept.
pub fn minify(markup: &str) -> String {
    let joined: String = LINE_BREAK.split(markup).map(str::trim).collect();
    TAG_GAP.replace_all(&joined, "><").into_owned()
}
