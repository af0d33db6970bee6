use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Hand-off steps a lender works through before an accepted order can be marked ready.
pub const CHECKLIST_STEPS: [(&str, &str); 4] = [
    ("clean_items", "Clean all items"),
    ("pack_items", "Pack items securely"),
    ("confirm_location", "Confirm delivery location"),
    ("contact_borrower", "Contact borrower"),
];

pub fn step_label(step_key: &str) -> Option<&'static str> {
    CHECKLIST_STEPS
        .iter()
        .find(|(key, _)| *key == step_key)
        .map(|(_, label)| *label)
}

#[derive(Debug, Clone, Serialize)]
pub struct ChecklistStep {
    pub id: Uuid,
    pub order_id: Uuid,
    pub step_key: String,
    pub label: Option<&'static str>,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}
