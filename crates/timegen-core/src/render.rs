//! Terminal rendering of generated timetables.

use std::fmt::Write as _;

use chrono::{DateTime, Local};
use comfy_table::{ContentArrangement, Table, presets};
use timegen_types::{Coordinator, CreatedBy, GeneratedTimetable, Slot};

const NO_CLASSES: &str = "No classes scheduled";
const NO_TIMETABLES: &str = "No timetables generated yet.";

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header.iter().copied());
    table
}

/// Full printable view: header, per-day schedule, subjects and faculty.
pub fn render_timetable(tt: &GeneratedTimetable) -> String {
    let mut out = render_header(tt);
    out.push('\n');
    out.push_str(&render_schedule(tt));
    if !tt.subjects.is_empty() {
        out.push_str("\nSubjects\n");
        out.push_str(&render_subjects(tt));
        out.push('\n');
    }
    if !tt.faculty_list.is_empty() {
        out.push_str("\nFaculty\n");
        out.push_str(&render_faculty(tt));
        out.push('\n');
    }
    out
}

pub fn render_header(tt: &GeneratedTimetable) -> String {
    let mut out = String::new();
    let title = match tt.section.as_deref().filter(|s| !s.is_empty()) {
        Some(section) => format!("{} - Semester {} ({section})", tt.department, tt.semester),
        None => format!("{} - Semester {}", tt.department, tt.semester),
    };
    let _ = writeln!(out, "{title}");

    for (label, value) in [
        ("Room", tt.room.as_str()),
        ("Effective", tt.effective_date.as_str()),
        ("Month", tt.time_table_month.as_str()),
    ] {
        if !value.is_empty() {
            let _ = writeln!(out, "{label}: {value}");
        }
    }
    if let Some(c) = coordinator_line(&tt.class_coordinator) {
        let _ = writeln!(out, "Class coordinator: {c}");
    }
    if let Some(c) = coordinator_line(&tt.class_co_coordinator) {
        let _ = writeln!(out, "Co-coordinator: {c}");
    }
    out
}

fn coordinator_line(c: &Coordinator) -> Option<String> {
    if c.name.is_empty() {
        return None;
    }
    let mut line = c.name.clone();
    if !c.abbreviation.is_empty() {
        let _ = write!(line, " ({})", c.abbreviation);
    }
    if let Some(phone) = c.phone.as_deref().filter(|p| !p.is_empty()) {
        let _ = write!(line, ", {phone}");
    }
    Some(line)
}

/// One section per day in `days` order, slots sorted by start time, lunch last.
pub fn render_schedule(tt: &GeneratedTimetable) -> String {
    let mut out = String::new();
    for day in &tt.days {
        let _ = writeln!(out, "{day}");
        let slots = day_slots(tt, day);
        if slots.is_empty() {
            let _ = writeln!(out, "  {NO_CLASSES}");
            out.push('\n');
            continue;
        }

        let mut table = new_table(&["Time", "Subject", "Faculty", "Type"]);
        for slot in slots {
            let faculty: Vec<&str> = slot.faculty.iter().map(|f| tt.faculty_name(f)).collect();
            table.add_row(vec![
                format!("{} - {}", slot.start_time, slot.end_time),
                subject_label(slot),
                faculty.join(", "),
                slot.kind.clone(),
            ]);
        }
        if !tt.lunch_slot.start.is_empty() {
            table.add_row(vec![
                format!("{} - {}", tt.lunch_slot.start, tt.lunch_slot.end),
                "LUNCH BREAK".to_string(),
                String::new(),
                String::new(),
            ]);
        }
        let _ = writeln!(out, "{table}");
        out.push('\n');
    }
    out
}

fn subject_label(slot: &Slot) -> String {
    match (slot.subject_code.is_empty(), slot.subject_name.is_empty()) {
        (false, false) => format!("{} {}", slot.subject_code, slot.subject_name),
        (false, true) => slot.subject_code.clone(),
        _ => slot.subject_name.clone(),
    }
}

/// Slots of `day` ordered by start time; unparsable times sort first.
pub fn day_slots<'a>(tt: &'a GeneratedTimetable, day: &'a str) -> Vec<&'a Slot> {
    let mut slots: Vec<&Slot> = tt.slots_for(day).collect();
    slots.sort_by_key(|s| time_to_minutes(&s.start_time));
    slots
}

/// `"HH:MM"` to minutes past midnight.
pub fn time_to_minutes(time: &str) -> Option<u32> {
    let (h, m) = time.trim().split_once(':')?;
    let h: u32 = h.trim().parse().ok()?;
    let m: u32 = m.trim().parse().ok()?;
    (h < 24 && m < 60).then_some(h * 60 + m)
}

pub fn render_subjects(tt: &GeneratedTimetable) -> String {
    let mut table = new_table(&["Code", "Name", "Type"]);
    for s in &tt.subjects {
        table.add_row(vec![s.code.as_str(), s.name.as_str(), s.kind.as_str()]);
    }
    table.to_string()
}

pub fn render_faculty(tt: &GeneratedTimetable) -> String {
    let mut table = new_table(&["Abbreviation", "Name"]);
    for f in &tt.faculty_list {
        table.add_row(vec![f.abbreviation.as_str(), f.full_name.as_str()]);
    }
    table.to_string()
}

pub fn render_timetable_list(list: &[GeneratedTimetable]) -> String {
    if list.is_empty() {
        return NO_TIMETABLES.to_string();
    }

    let mut table = new_table(&[
        "ID",
        "Department",
        "Semester",
        "Section",
        "Month",
        "Created by",
        "Created",
    ]);
    for tt in list {
        table.add_row(vec![
            tt.identifier().unwrap_or("-").to_string(),
            tt.department.clone(),
            tt.semester.clone(),
            tt.section.clone().unwrap_or_default(),
            tt.time_table_month.clone(),
            tt.created_by.as_ref().map_or("-", CreatedBy::label).to_string(),
            tt.created_at.as_deref().map(format_created).unwrap_or_default(),
        ]);
    }
    table.to_string()
}

/// RFC 3339 timestamps in local time; anything else verbatim.
pub fn format_created(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw).map_or_else(
        |_| raw.to_string(),
        |dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
    )
}

/// Default export filename: `timetable-{semester or id}.html`.
pub fn export_filename(tt: &GeneratedTimetable) -> String {
    let key = Some(tt.semester.trim())
        .filter(|s| !s.is_empty())
        .or_else(|| tt.identifier())
        .unwrap_or("export");
    let safe: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("timetable-{safe}.html")
}
