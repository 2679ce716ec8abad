//! Entity records
//!
//! Records are what the storage layer returns; `*Fields` structs are what
//! callers submit on create/update. Field names match the persisted JSON
//! document layout.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result};

/// Bell slots per touch
pub const MAX_BELLS: usize = 12;

/// Highest touch number accepted within a practice
pub const MAX_TOUCH_NUMBER: u32 = 12;

/// Touches a single practice may hold
pub const MAX_TOUCHES_PER_PRACTICE: usize = 8;

/// Persisted and displayed date format (DD-MM-YYYY)
pub const DATE_FORMAT: &str = "%d-%m-%Y";

/// Parse a `DD-MM-YYYY` date
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| {
        Error::Validation(format!(
            "invalid date '{}': expected DD-MM-YYYY (e.g. 29-12-2025)",
            s.trim()
        ))
    })
}

/// Render a date as `DD-MM-YYYY`
pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

mod dmy_date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_date(date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_date(&s).map_err(de::Error::custom)
    }
}

/// Where an employee is based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resident {
    Local,
    Regional,
    National,
    International,
}

impl Resident {
    pub const ALL: [Resident; 4] = [
        Resident::Local,
        Resident::Regional,
        Resident::National,
        Resident::International,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resident::Local => "Local",
            Resident::Regional => "Regional",
            Resident::National => "National",
            Resident::International => "International",
        }
    }
}

impl fmt::Display for Resident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resident {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Resident::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Validation(format!("unknown resident category '{}'", s)))
    }
}

/// Fixed set of practice locations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    #[serde(rename = "Office A")]
    OfficeA,
    #[serde(rename = "Office B")]
    OfficeB,
    #[serde(rename = "Office C")]
    OfficeC,
    Remote,
}

impl Location {
    pub const ALL: [Location; 4] = [
        Location::OfficeA,
        Location::OfficeB,
        Location::OfficeC,
        Location::Remote,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Location::OfficeA => "Office A",
            Location::OfficeB => "Office B",
            Location::OfficeC => "Office C",
            Location::Remote => "Remote",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Location::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Validation(format!("unknown location '{}'", s)))
    }
}

// ============================================================================
// Employee
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub member: bool,
    pub resident: Resident,
}

impl Employee {
    pub fn from_fields(id: Uuid, fields: EmployeeFields) -> Self {
        Self {
            id,
            first_name: fields.first_name,
            last_name: fields.last_name,
            member: fields.member,
            resident: fields.resident,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeFields {
    pub first_name: String,
    pub last_name: String,
    pub member: bool,
    pub resident: Resident,
}

// ============================================================================
// Practice
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Practice {
    pub id: Uuid,
    #[serde(with = "dmy_date")]
    pub date: NaiveDate,
    pub location: Location,
}

impl Practice {
    pub fn from_fields(id: Uuid, fields: PracticeFields) -> Self {
        Self {
            id,
            date: fields.date,
            location: fields.location,
        }
    }

    /// "DD-MM-YYYY - Location", as shown in selectors
    pub fn label(&self) -> String {
        format!("{} - {}", format_date(&self.date), self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeFields {
    pub date: NaiveDate,
    pub location: Location,
}

// ============================================================================
// Method
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub id: Uuid,
    pub name: String,
    /// Optional short code, e.g. "PB" for Plain Bob
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Method {
    pub fn from_fields(id: Uuid, fields: MethodFields) -> Self {
        Self {
            id,
            name: fields.name,
            code: fields.code,
        }
    }

    pub fn label(&self) -> String {
        match &self.code {
            Some(code) => format!("{} ({})", self.name, code),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodFields {
    pub name: String,
    pub code: Option<String>,
}

// ============================================================================
// Touch
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Touch {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub method_id: Uuid,
    pub touch_number: u32,
    #[serde(default)]
    pub conductor_id: Option<Uuid>,
    /// Slot order is significant; `None` is an empty slot
    #[serde(default)]
    pub bells: Vec<Option<Uuid>>,
}

impl Touch {
    pub fn from_fields(id: Uuid, fields: TouchFields) -> Self {
        Self {
            id,
            practice_id: fields.practice_id,
            method_id: fields.method_id,
            touch_number: fields.touch_number,
            conductor_id: fields.conductor_id,
            bells: fields.bells,
        }
    }

    pub fn filled_bells(&self) -> usize {
        self.bells.iter().filter(|b| b.is_some()).count()
    }

    /// True if the employee is the conductor or rings any bell
    pub fn involves(&self, employee_id: Uuid) -> bool {
        self.conductor_id == Some(employee_id) || self.bells.contains(&Some(employee_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchFields {
    pub practice_id: Uuid,
    pub method_id: Uuid,
    pub touch_number: u32,
    pub conductor_id: Option<Uuid>,
    pub bells: Vec<Option<Uuid>>,
}

/// Dashboard counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub employees: usize,
    pub members: usize,
    pub practices: usize,
    pub methods: usize,
    pub touches: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_accepts_dmy() {
        let date = parse_date("01-06-2024").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(format_date(&date), "01-06-2024");
    }

    #[test]
    fn test_parse_date_rejects_iso() {
        assert!(matches!(parse_date("2024-06-01"), Err(Error::Validation(_))));
        assert!(matches!(parse_date("31-02-2024"), Err(Error::Validation(_))));
    }

    #[test]
    fn test_location_serializes_with_display_name() {
        let practice = Practice {
            id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            location: Location::OfficeA,
        };
        let json = serde_json::to_value(&practice).unwrap();
        assert_eq!(json["location"], "Office A");
        assert_eq!(json["date"], "01-06-2024");
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn test_enum_parsing_is_case_insensitive() {
        assert_eq!("office b".parse::<Location>().unwrap(), Location::OfficeB);
        assert_eq!("national".parse::<Resident>().unwrap(), Resident::National);
        assert!("Mars".parse::<Location>().is_err());
    }

    #[test]
    fn test_touch_involves_conductor_and_bells() {
        let conductor = Uuid::new_v4();
        let ringer = Uuid::new_v4();
        let touch = Touch {
            id: Uuid::new_v4(),
            practice_id: Uuid::new_v4(),
            method_id: Uuid::new_v4(),
            touch_number: 1,
            conductor_id: Some(conductor),
            bells: vec![None, Some(ringer)],
        };
        assert!(touch.involves(conductor));
        assert!(touch.involves(ringer));
        assert!(!touch.involves(Uuid::new_v4()));
        assert_eq!(touch.filled_bells(), 1);
    }

    #[test]
    fn test_method_without_code_omits_field() {
        let method = Method {
            id: Uuid::nil(),
            name: "Plain Bob".to_string(),
            code: None,
        };
        let json = serde_json::to_value(&method).unwrap();
        assert!(json.get("code").is_none());
        assert_eq!(method.label(), "Plain Bob");
    }
}
