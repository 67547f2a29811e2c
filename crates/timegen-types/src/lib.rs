//! Wire types shared by the TimeGen client crates.

pub mod auth;
pub mod timetable;

pub use auth::{AuthTokens, UserIdentity};
pub use timetable::{
    Coordinator, CreatedBy, DataEnvelope, Faculty, GenerateResult, GeneratedTimetable, LunchSlot,
    Slot, Subject, TimeSlot, UserRef,
};
