//! Employee pages

use axum::{
    extract::{Path, State},
    response::{Html, Redirect},
    routing::{get, post},
    Form, Router,
};
use peal_common::models::{Employee, EmployeeFields, Resident};
use peal_common::validation;
use serde::Deserialize;
use uuid::Uuid;

use super::error::UiResult;
use crate::html::{self, escape};
use crate::AppState;

pub fn employee_routes() -> Router<AppState> {
    Router::new()
        .route("/employees", get(list_employees).post(create_employee))
        .route("/employees/new", get(new_employee))
        .route("/employees/:id", post(update_employee))
        .route("/employees/:id/edit", get(edit_employee))
        .route("/employees/:id/delete", post(delete_employee))
}

#[derive(Debug, Deserialize)]
pub struct EmployeeForm {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    /// Checkbox: present when ticked
    #[serde(default)]
    member: Option<String>,
    #[serde(default)]
    resident: String,
}

impl EmployeeForm {
    fn into_fields(self) -> peal_common::Result<EmployeeFields> {
        Ok(EmployeeFields {
            first_name: self.first_name,
            last_name: self.last_name,
            member: self.member.is_some(),
            resident: self.resident.parse()?,
        })
    }
}

fn employee_form(action: &str, employee: Option<&Employee>) -> String {
    let resident = employee.map(|e| e.resident.as_str());
    let residents = html::options(
        Resident::ALL
            .iter()
            .map(|r| (r.as_str().to_string(), r.as_str().to_string())),
        resident,
    );
    format!(
        r#"<form method="post" action="{action}">
    <label for="first_name">First name</label>
    <input id="first_name" name="first_name" value="{first}" required>
    <label for="last_name">Last name</label>
    <input id="last_name" name="last_name" value="{last}" required>
    <label><input type="checkbox" name="member" value="on"{checked}> Member</label>
    <label for="resident">Resident</label>
    <select id="resident" name="resident">{residents}</select>
    <p><button type="submit">Save</button> <a href="/employees">Cancel</a></p>
</form>"#,
        action = escape(action),
        first = escape(employee.map_or("", |e| e.first_name.as_str())),
        last = escape(employee.map_or("", |e| e.last_name.as_str())),
        checked = if employee.map_or(false, |e| e.member) { " checked" } else { "" },
        residents = residents,
    )
}

/// GET /employees
pub async fn list_employees(State(state): State<AppState>) -> UiResult<Html<String>> {
    let employees = state.storage.list_employees().await?;

    let mut body = String::from(r#"<p><a href="/employees/new">Add employee</a></p>"#);
    if employees.is_empty() {
        body.push_str(r#"<p class="muted">No employees yet.</p>"#);
    } else {
        body.push_str("<table><tr><th>Name</th><th>Member</th><th>Resident</th><th></th></tr>");
        for e in &employees {
            body.push_str(&format!(
                concat!(
                    r#"<tr><td>{}</td><td>{}</td><td>{}</td>"#,
                    r#"<td><a href="/employees/{id}/edit">Edit</a> {}</td></tr>"#,
                ),
                escape(&e.full_name()),
                if e.member { "Yes" } else { "No" },
                e.resident,
                html::delete_button(&format!("/employees/{}/delete", e.id), &e.full_name()),
                id = e.id,
            ));
        }
        body.push_str("</table>");
    }

    Ok(html::page("Employees", &body))
}

/// GET /employees/new
pub async fn new_employee() -> Html<String> {
    html::page("New employee", &employee_form("/employees", None))
}

/// POST /employees
pub async fn create_employee(
    State(state): State<AppState>,
    Form(form): Form<EmployeeForm>,
) -> UiResult<Redirect> {
    state.storage.create_employee(form.into_fields()?).await?;
    Ok(Redirect::to("/employees"))
}

/// GET /employees/:id/edit
pub async fn edit_employee(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> UiResult<Html<String>> {
    let employee = state
        .storage
        .get_employee(id)
        .await?
        .ok_or_else(|| validation::not_found("employee", id))?;
    Ok(html::page(
        "Edit employee",
        &employee_form(&format!("/employees/{}", id), Some(&employee)),
    ))
}

/// POST /employees/:id
pub async fn update_employee(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(form): Form<EmployeeForm>,
) -> UiResult<Redirect> {
    state.storage.update_employee(id, form.into_fields()?).await?;
    Ok(Redirect::to("/employees"))
}

/// POST /employees/:id/delete
pub async fn delete_employee(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> UiResult<Redirect> {
    state.storage.delete_employee(id).await?;
    Ok(Redirect::to("/employees"))
}
