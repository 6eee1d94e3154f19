use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Estado no enviado de un formulario lógico (un borrador por `form_id`)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub form_id: String,
    pub data: serde_json::Value,
    pub saved_at: DateTime<Utc>,
}

/// Cambios observables del store de borradores
#[derive(Clone, Debug, PartialEq)]
pub enum DraftEvent {
    Saved { form_id: String, saved_at: DateTime<Utc> },
    Cleared { form_id: String },
}

impl DraftEvent {
    pub fn form_id(&self) -> &str {
        match self {
            DraftEvent::Saved { form_id, .. } | DraftEvent::Cleared { form_id } => form_id,
        }
    }
}
