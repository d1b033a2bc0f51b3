// Record forms for the terminal client
//
// A form edits one owner, pet or visit as plain text fields and turns them
// into the parameters of a create_* or edit_* action. Validation stays on the
// endpoint; its error list comes back and is shown next to the form.

use crate::entities::{Domain, Owner, Pet, Record, Visit};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: &'static str,
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordForm {
    pub domain: Domain,
    pub mode: FormMode,
    pub fields: Vec<FormField>,
    pub focus: usize,
    pub error: Option<String>,
    pub submitting: bool,
}

fn field_specs(domain: Domain) -> &'static [(&'static str, &'static str)] {
    match domain {
        Domain::Owners => &[
            ("first_name", "First name"),
            ("last_name", "Last name"),
            ("age", "Age"),
            ("phone", "Phone"),
            ("pet_ids", "Pet ids"),
        ],
        Domain::Pets => &[
            ("name", "Name"),
            ("age", "Age"),
            ("species", "Species"),
            ("birth_date", "Born (YYYY-MM-DD)"),
            ("condition", "Condition"),
            ("owner_ids", "Owner ids"),
        ],
        Domain::Visits => &[
            ("pet_id", "Pet id"),
            ("date", "Date (YYYY-MM-DD)"),
            ("diagnosis", "Diagnosis"),
            ("treatment", "Treatment"),
        ],
    }
}

/// A record whose current values can prefill an edit form.
pub trait FormRecord: Record {
    /// One value per form field, in field order.
    fn form_values(&self) -> Vec<String>;
}

fn ids_text(ids: &[i64]) -> String {
    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")
}

impl FormRecord for Owner {
    fn form_values(&self) -> Vec<String> {
        vec![
            self.first_name.clone(),
            self.last_name.clone(),
            self.age.to_string(),
            self.phone.clone().unwrap_or_default(),
            ids_text(&self.pet_ids),
        ]
    }
}

impl FormRecord for Pet {
    fn form_values(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.age.to_string(),
            self.species.clone(),
            self.birth_date.format("%Y-%m-%d").to_string(),
            self.condition.clone(),
            ids_text(&self.owner_ids),
        ]
    }
}

impl FormRecord for Visit {
    fn form_values(&self) -> Vec<String> {
        vec![
            self.pet_id.to_string(),
            self.date.format("%Y-%m-%d").to_string(),
            self.diagnosis.clone(),
            self.treatment.clone(),
        ]
    }
}

impl RecordForm {
    /// Empty form for a new record.
    pub fn create(domain: Domain) -> Self {
        let fields = field_specs(domain)
            .iter()
            .map(|&(name, label)| FormField {
                name,
                label,
                value: String::new(),
            })
            .collect();

        RecordForm {
            domain,
            mode: FormMode::Create,
            fields,
            focus: 0,
            error: None,
            submitting: false,
        }
    }

    /// Form prefilled with `row`'s current values.
    pub fn edit<R: FormRecord>(row: &R) -> Self {
        let mut form = RecordForm::create(R::DOMAIN);
        for (field, value) in form.fields.iter_mut().zip(row.form_values()) {
            field.value = value;
        }
        form.mode = FormMode::Edit(row.key());
        form
    }

    pub fn title(&self) -> String {
        let entity = entity_name(self.domain);
        match self.mode {
            FormMode::Create => format!("New {}", entity),
            FormMode::Edit(id) => format!("Edit {} #{}", entity, id),
        }
    }

    pub fn action(&self) -> &'static str {
        match (self.mode, self.domain) {
            (FormMode::Create, Domain::Owners) => "create_owner",
            (FormMode::Create, Domain::Pets) => "create_pet",
            (FormMode::Create, Domain::Visits) => "create_visit",
            (FormMode::Edit(_), Domain::Owners) => "edit_owner",
            (FormMode::Edit(_), Domain::Pets) => "edit_pet",
            (FormMode::Edit(_), Domain::Visits) => "edit_visit",
        }
    }

    /// Action parameters.
    ///
    /// A new record leaves blank fields out so optional ones take their
    /// defaults. An edit sends every field; a blank id list clears the
    /// relationships.
    pub fn params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        if let FormMode::Edit(id) = self.mode {
            params.insert("id".to_string(), Value::from(id));
        }

        for field in &self.fields {
            let value = field.value.trim();
            if self.mode == FormMode::Create && value.is_empty() {
                continue;
            }
            params.insert(field.name.to_string(), Value::from(value));
        }

        params
    }

    pub fn focused(&self) -> Option<&FormField> {
        self.fields.get(self.focus)
    }

    pub fn focus_next(&mut self) {
        if !self.fields.is_empty() {
            self.focus = (self.focus + 1) % self.fields.len();
        }
    }

    pub fn focus_previous(&mut self) {
        if !self.fields.is_empty() {
            self.focus = (self.focus + self.fields.len() - 1) % self.fields.len();
        }
    }

    pub fn push_char(&mut self, c: char) {
        if let Some(field) = self.fields.get_mut(self.focus) {
            field.value.push(c);
        }
    }

    pub fn pop_char(&mut self) {
        if let Some(field) = self.fields.get_mut(self.focus) {
            field.value.pop();
        }
    }
}

pub fn delete_action(domain: Domain) -> &'static str {
    match domain {
        Domain::Owners => "delete_owner",
        Domain::Pets => "delete_pet",
        Domain::Visits => "delete_visit",
    }
}

pub fn entity_name(domain: Domain) -> &'static str {
    match domain {
        Domain::Owners => "owner",
        Domain::Pets => "pet",
        Domain::Visits => "visit",
    }
}
