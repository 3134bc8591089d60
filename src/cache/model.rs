use serde::{Deserialize, Serialize};
use std::fmt;

/// Teaching day of the week. The grid has no Sunday column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Day {
    #[serde(rename = "Mon", alias = "Monday")]
    Monday,
    #[serde(rename = "Tue", alias = "Tuesday")]
    Tuesday,
    #[serde(rename = "Wed", alias = "Wednesday")]
    Wednesday,
    #[serde(rename = "Thu", alias = "Thursday")]
    Thursday,
    #[serde(rename = "Fri", alias = "Friday")]
    Friday,
    #[serde(rename = "Sat", alias = "Saturday")]
    Saturday,
}

impl Day {
    pub const ALL: [Day; 6] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
    ];

    /// Three-letter code used on the wire and in the store.
    pub fn code(self) -> &'static str {
        match self {
            Day::Monday => "Mon",
            Day::Tuesday => "Tue",
            Day::Wednesday => "Wed",
            Day::Thursday => "Thu",
            Day::Friday => "Fri",
            Day::Saturday => "Sat",
        }
    }

    /// Accepts the three-letter code or the full English name, any case.
    pub fn parse(raw: &str) -> Option<Day> {
        let lower = raw.trim().to_ascii_lowercase();
        Day::ALL.into_iter().find(|d| {
            let code = d.code().to_ascii_lowercase();
            let full = format!("{d:?}").to_ascii_lowercase();
            lower == code || lower == full
        })
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One cell of the timetable grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub group_id: i64,
    pub day: Day,
    pub module_index: u32,
}

impl CacheKey {
    pub fn new(group_id: i64, day: Day, module_index: u32) -> Self {
        Self {
            group_id,
            day,
            module_index,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.group_id, self.day, self.module_index)
    }
}

/// Canonical assignment row as served by the store, already joined with its subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRecord {
    pub id: i64,
    pub group_id: i64,
    pub day: Day,
    pub module_index: u32,
    pub subject_id: i64,
    pub teacher_id: i64,
    pub subject_shorten: String,
    pub subject_color: String,
}

impl AssignmentRecord {
    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.group_id, self.day, self.module_index)
    }
}

/// What the grid needs to paint one cell without a second lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub id: i64,
    pub subject_shorten: String,
    pub subject_color: String,
    pub teacher_id: i64,
    pub subject_id: i64,
}

impl From<&AssignmentRecord> for CacheEntry {
    fn from(rec: &AssignmentRecord) -> Self {
        Self {
            id: rec.id,
            subject_shorten: rec.subject_shorten.clone(),
            subject_color: rec.subject_color.clone(),
            teacher_id: rec.teacher_id,
            subject_id: rec.subject_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_parse_accepts_codes_and_full_names() {
        assert_eq!(Day::parse("Mon"), Some(Day::Monday));
        assert_eq!(Day::parse("wednesday"), Some(Day::Wednesday));
        assert_eq!(Day::parse(" SAT "), Some(Day::Saturday));
        assert_eq!(Day::parse("Sun"), None);
        assert_eq!(Day::parse(""), None);
    }

    #[test]
    fn record_deserializes_from_store_json() {
        let raw = serde_json::json!({
            "id": 1,
            "groupId": 2,
            "day": "Mon",
            "moduleIndex": 0,
            "subjectId": 9,
            "teacherId": 4,
            "subjectShorten": "MAT",
            "subjectColor": "#fff"
        });
        let rec: AssignmentRecord = serde_json::from_value(raw).expect("decode record");
        assert_eq!(rec.key(), CacheKey::new(2, Day::Monday, 0));

        let entry = CacheEntry::from(&rec);
        assert_eq!(entry.id, 1);
        assert_eq!(entry.subject_shorten, "MAT");
        assert_eq!(entry.subject_color, "#fff");
        assert_eq!(entry.teacher_id, 4);
        assert_eq!(entry.subject_id, 9);
    }

    #[test]
    fn day_serializes_as_short_code() {
        assert_eq!(
            serde_json::to_value(Day::Thursday).expect("encode"),
            serde_json::json!("Thu")
        );
        let full: Day = serde_json::from_value(serde_json::json!("Friday")).expect("decode");
        assert_eq!(full, Day::Friday);
    }
}
