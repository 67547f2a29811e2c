//! Generated timetable documents as returned by the timetable endpoints.
//!
//! The server owns the shape; every field it may leave out deserializes to an
//! empty default so a partially populated document still renders.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LunchSlot {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub code: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Faculty {
    pub abbreviation: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinator {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub abbreviation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// One scheduled class on one day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Slot {
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    pub subject_code: String,
    pub subject_name: String,
    /// Faculty abbreviations; resolved against the timetable's faculty list.
    pub faculty: Vec<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// `createdBy` is either a bare user id or a populated user reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreatedBy {
    Id(String),
    User(UserRef),
}

impl CreatedBy {
    pub fn label(&self) -> &str {
        match self {
            CreatedBy::Id(id) => id,
            CreatedBy::User(user) => user
                .name
                .as_deref()
                .or(user.email.as_deref())
                .or(user.id.as_deref())
                .unwrap_or("unknown"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratedTimetable {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub mongo_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub prompt: String,
    pub department: String,
    pub semester: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub room: String,
    pub effective_date: String,
    pub time_table_month: String,
    pub days: Vec<String>,
    pub time_slots: Vec<TimeSlot>,
    pub lunch_slot: LunchSlot,
    pub subjects: Vec<Subject>,
    pub faculty_list: Vec<Faculty>,
    pub class_coordinator: Coordinator,
    pub class_co_coordinator: Coordinator,
    pub slots: Vec<Slot>,
    pub html_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<CreatedBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl GeneratedTimetable {
    /// Server identifier: `_id` when present, else `id`.
    pub fn identifier(&self) -> Option<&str> {
        self.mongo_id
            .as_deref()
            .or(self.id.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// Slots scheduled on `day`, in server order.
    pub fn slots_for<'a>(&'a self, day: &'a str) -> impl Iterator<Item = &'a Slot> + 'a {
        self.slots.iter().filter(move |s| s.day == day)
    }

    /// Full name for a faculty abbreviation, falling back to the abbreviation.
    pub fn faculty_name<'a>(&'a self, abbreviation: &'a str) -> &'a str {
        self.faculty_list
            .iter()
            .find(|f| f.abbreviation == abbreviation)
            .map_or(abbreviation, |f| f.full_name.as_str())
    }
}

/// `{ "data": ... }` wrapper used by the list and fetch endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// Body of the AI generation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResult {
    /// Kept opaque; the server has changed this shape before.
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl GenerateResult {
    /// Reads `data` as a timetable document, if it is one.
    pub fn timetable(&self) -> Option<GeneratedTimetable> {
        if !self.data.is_object() {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }
}
