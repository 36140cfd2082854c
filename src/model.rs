use crate::paths::CollectionRoot;
use crate::store::{Document, FieldValue, Fields};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner_id: String,
    pub start_date: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn from_document(doc: &Document) -> Self {
        Project {
            id: doc.id.clone(),
            name: doc.text("name").unwrap_or_default().to_string(),
            description: doc.text("description").unwrap_or_default().to_string(),
            owner_id: doc.text("ownerId").unwrap_or_default().to_string(),
            start_date: doc.timestamp("startDate"),
            created_at: doc.timestamp("createdAt"),
        }
    }
}

/// A project listed on the dashboard together with its computed total.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProjectWithTotal {
    pub project: Project,
    pub root: CollectionRoot,
    pub total_amount: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dashboard {
    pub my_projects: Vec<ProjectWithTotal>,
    pub my_expenses: Vec<ProjectWithTotal>,
}

/// Fields submitted by the "new project" form.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start_date: Option<NaiveDate>,
}

impl NewProject {
    pub(crate) fn to_fields(&self, owner_id: &str) -> Fields {
        let start_date = self
            .start_date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| FieldValue::Timestamp(dt.and_utc()))
            .unwrap_or(FieldValue::Null);

        Fields::from([
            ("name".to_string(), FieldValue::Text(self.name.clone())),
            (
                "description".to_string(),
                FieldValue::Text(self.description.clone()),
            ),
            ("startDate".to_string(), start_date),
            ("createdAt".to_string(), FieldValue::ServerTimestamp),
            ("ownerId".to_string(), FieldValue::Text(owner_id.to_string())),
        ])
    }
}

/// Editable project metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl ProjectMeta {
    pub fn from_document(doc: &Document) -> Self {
        ProjectMeta {
            name: doc.text("name").unwrap_or_default().to_string(),
            description: doc.text("description").unwrap_or_default().to_string(),
        }
    }
}

/// Everything the project detail view needs.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectDetail {
    pub id: String,
    /// `None` when neither tree holds a document for the identifier
    pub meta: Option<ProjectMeta>,
    pub root: CollectionRoot,
    pub sections: Vec<SectionData>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Section {
    pub id: String,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl Section {
    pub fn from_document(doc: &Document) -> Self {
        Section {
            id: doc.id.clone(),
            name: doc
                .text("name")
                .filter(|n| !n.is_empty())
                .unwrap_or("Unnamed Section")
                .to_string(),
            created_at: doc.timestamp("createdAt"),
        }
    }
}

/// A section with its items, as shown on the project detail view.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SectionData {
    pub id: String,
    pub name: String,
    pub items: Vec<Item>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub amount: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn from_document(doc: &Document) -> Self {
        Item {
            id: doc.id.clone(),
            name: doc.text("name").unwrap_or_default().to_string(),
            amount: doc.number("amount"),
            created_at: doc.timestamp("createdAt"),
            updated_at: doc.timestamp("updatedAt"),
        }
    }

    /// What this item adds to a total; absent or NaN amounts add nothing.
    pub fn contribution(&self) -> f64 {
        amount_contribution(self.amount)
    }
}

pub fn amount_contribution(amount: Option<f64>) -> f64 {
    match amount {
        Some(a) if a.is_finite() => a,
        _ => 0.0,
    }
}

/// Raw values of the shared item form.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ItemInput {
    pub name: String,
    pub amount: Option<f64>,
}

/// An item input that passed the required-field guard.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidItem {
    pub name: String,
    pub amount: f64,
}

impl ItemInput {
    pub fn new(name: impl Into<String>, amount: f64) -> Self {
        ItemInput {
            name: name.into(),
            amount: Some(amount),
        }
    }

    /// Build from form text; an unparsable amount counts as missing.
    pub fn from_form(name: &str, amount: &str) -> Self {
        ItemInput {
            name: name.to_string(),
            amount: amount.trim().parse::<f64>().ok(),
        }
    }

    pub fn from_item(item: &Item) -> Self {
        ItemInput {
            name: item.name.clone(),
            amount: item.amount,
        }
    }

    /// Apply the required-field guard. Zero counts as a missing amount.
    pub fn validate(&self) -> Option<ValidItem> {
        if self.name.trim().is_empty() {
            return None;
        }
        match self.amount {
            Some(amount) if amount.is_finite() && amount != 0.0 => Some(ValidItem {
                name: self.name.clone(),
                amount,
            }),
            _ => None,
        }
    }
}

/// Access level of a collaborator. Declared for the data model, never enforced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Role {
    Owner = 0,
    Viewer = 1,
    Editor = 2,
}

impl Role {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Role::Owner),
            1 => Some(Role::Viewer),
            2 => Some(Role::Editor),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}
