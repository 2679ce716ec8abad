//! Field validation shared by both storage backends
//!
//! These checks need no stored state. Reference and uniqueness checks live in
//! each backend, but report through the same helpers so messages match.

use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{
    EmployeeFields, MethodFields, TouchFields, MAX_BELLS, MAX_TOUCHES_PER_PRACTICE,
    MAX_TOUCH_NUMBER,
};
use crate::{Error, Result};

fn required(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Trim names; both are required
pub fn employee(fields: EmployeeFields) -> Result<EmployeeFields> {
    Ok(EmployeeFields {
        first_name: required(&fields.first_name, "first name")?,
        last_name: required(&fields.last_name, "last name")?,
        ..fields
    })
}

/// Trim name (required) and code (blank becomes absent)
pub fn method(fields: MethodFields) -> Result<MethodFields> {
    let code = fields
        .code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    Ok(MethodFields {
        name: required(&fields.name, "method name")?,
        code,
    })
}

/// Touch number range, slot count, and one slot per employee
pub fn touch_shape(fields: &TouchFields) -> Result<()> {
    if !(1..=MAX_TOUCH_NUMBER).contains(&fields.touch_number) {
        return Err(Error::Validation(format!(
            "touch number {} is outside 1..={}",
            fields.touch_number, MAX_TOUCH_NUMBER
        )));
    }

    if fields.bells.len() > MAX_BELLS {
        return Err(Error::Validation(format!(
            "a touch has at most {} bells, got {}",
            MAX_BELLS,
            fields.bells.len()
        )));
    }

    let mut seen = HashSet::new();
    for (slot, employee_id) in fields.bells.iter().enumerate() {
        if let Some(id) = employee_id {
            if !seen.insert(*id) {
                return Err(Error::Validation(format!(
                    "employee {} is assigned to more than one bell (again at bell {})",
                    id,
                    slot + 1
                )));
            }
        }
    }

    Ok(())
}

/// Every distinct employee id a touch refers to, conductor first
pub fn touch_employee_refs(fields: &TouchFields) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    fields
        .conductor_id
        .iter()
        .chain(fields.bells.iter().flatten())
        .copied()
        .filter(|id| seen.insert(*id))
        .collect()
}

/// `other_touches` counts touches already in the target practice, excluding the one being written
pub fn touch_capacity(other_touches: usize) -> Result<()> {
    if other_touches >= MAX_TOUCHES_PER_PRACTICE {
        return Err(Error::Validation(format!(
            "a practice holds at most {} touches",
            MAX_TOUCHES_PER_PRACTICE
        )));
    }
    Ok(())
}

/// Smallest unused number in `1..=MAX_TOUCHES_PER_PRACTICE`, or one past the cap when full
pub fn next_free_touch_number(used: impl IntoIterator<Item = u32>) -> u32 {
    let used: HashSet<u32> = used.into_iter().collect();
    let cap = MAX_TOUCHES_PER_PRACTICE as u32;
    (1..=cap).find(|n| !used.contains(n)).unwrap_or(cap + 1)
}

pub fn missing_practice(id: Uuid) -> Error {
    Error::ReferentialIntegrity(format!("practice {} does not exist", id))
}

pub fn missing_method(id: Uuid) -> Error {
    Error::ReferentialIntegrity(format!("method {} does not exist", id))
}

pub fn missing_employee(id: Uuid) -> Error {
    Error::ReferentialIntegrity(format!("employee {} does not exist", id))
}

pub fn duplicate_touch_number(number: u32) -> Error {
    Error::Conflict(format!(
        "touch number {} is already used in this practice",
        number
    ))
}

pub fn employee_in_use(id: Uuid, touches: usize) -> Error {
    Error::ReferentialIntegrity(format!(
        "employee {} is assigned in {} touch(es); remove them from those touches first",
        id, touches
    ))
}

pub fn method_in_use(id: Uuid, touches: usize) -> Error {
    Error::ReferentialIntegrity(format!(
        "method {} is used by {} touch(es); delete or change those touches first",
        id, touches
    ))
}

pub fn not_found(entity: &str, id: Uuid) -> Error {
    Error::NotFound(format!("{} {}", entity, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resident;

    fn touch_fields(number: u32, bells: Vec<Option<Uuid>>) -> TouchFields {
        TouchFields {
            practice_id: Uuid::new_v4(),
            method_id: Uuid::new_v4(),
            touch_number: number,
            conductor_id: None,
            bells,
        }
    }

    #[test]
    fn test_employee_names_are_trimmed_and_required() {
        let fields = employee(EmployeeFields {
            first_name: "  Ada ".into(),
            last_name: "Lovelace".into(),
            member: true,
            resident: Resident::Local,
        })
        .unwrap();
        assert_eq!(fields.first_name, "Ada");

        let blank = employee(EmployeeFields {
            first_name: "   ".into(),
            last_name: "Lovelace".into(),
            member: false,
            resident: Resident::Local,
        });
        assert!(matches!(blank, Err(Error::Validation(_))));
    }

    #[test]
    fn test_method_blank_code_is_dropped() {
        let fields = method(MethodFields {
            name: "Grandsire".into(),
            code: Some("  ".into()),
        })
        .unwrap();
        assert_eq!(fields.code, None);
    }

    #[test]
    fn test_touch_number_bounds() {
        assert!(touch_shape(&touch_fields(1, vec![])).is_ok());
        assert!(touch_shape(&touch_fields(12, vec![])).is_ok());
        assert!(matches!(touch_shape(&touch_fields(0, vec![])), Err(Error::Validation(_))));
        assert!(matches!(touch_shape(&touch_fields(13, vec![])), Err(Error::Validation(_))));
    }

    #[test]
    fn test_thirteen_slots_rejected() {
        let fields = touch_fields(1, vec![None; MAX_BELLS + 1]);
        assert!(matches!(touch_shape(&fields), Err(Error::Validation(_))));
    }

    #[test]
    fn test_employee_in_two_slots_rejected() {
        let ringer = Some(Uuid::new_v4());
        let fields = touch_fields(1, vec![ringer, None, ringer]);
        assert!(matches!(touch_shape(&fields), Err(Error::Validation(_))));
    }

    #[test]
    fn test_conductor_may_also_ring() {
        let ringer = Uuid::new_v4();
        let mut fields = touch_fields(1, vec![Some(ringer)]);
        fields.conductor_id = Some(ringer);
        assert!(touch_shape(&fields).is_ok());
        assert_eq!(touch_employee_refs(&fields), vec![ringer]);
    }

    #[test]
    fn test_next_free_touch_number() {
        assert_eq!(next_free_touch_number(Vec::<u32>::new()), 1);
        assert_eq!(next_free_touch_number([1, 2, 4]), 3);
        assert_eq!(next_free_touch_number(1..=8), 9);
        // Numbers above the cap do not occupy a low slot
        assert_eq!(next_free_touch_number([10, 11]), 1);
    }

    #[test]
    fn test_capacity() {
        assert!(touch_capacity(7).is_ok());
        assert!(matches!(touch_capacity(8), Err(Error::Validation(_))));
    }
}
