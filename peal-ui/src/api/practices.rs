//! Practice pages

use axum::{
    extract::{Path, State},
    response::{Html, Redirect},
    routing::{get, post},
    Form, Router,
};
use chrono::Local;
use peal_common::models::{Location, Practice, PracticeFields};
use peal_common::validation;
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use super::error::UiResult;
use crate::html::{self, escape};
use crate::AppState;

pub fn practice_routes() -> Router<AppState> {
    Router::new()
        .route("/practices", get(list_practices).post(create_practice))
        .route("/practices/new", get(new_practice))
        .route("/practices/:id", post(update_practice))
        .route("/practices/:id/edit", get(edit_practice))
        .route("/practices/:id/delete", post(delete_practice))
}

#[derive(Debug, Deserialize)]
pub struct PracticeForm {
    #[serde(default)]
    date: String,
    #[serde(default)]
    location: String,
}

impl PracticeForm {
    fn into_fields(self) -> peal_common::Result<PracticeFields> {
        Ok(PracticeFields {
            date: html::parse_form_date(&self.date)?,
            location: self.location.parse()?,
        })
    }
}

fn practice_form(action: &str, practice: Option<&Practice>) -> String {
    let date = practice
        .map(|p| p.date)
        .unwrap_or_else(|| Local::now().date_naive());
    let locations = html::options(
        Location::ALL
            .iter()
            .map(|l| (l.as_str().to_string(), l.as_str().to_string())),
        practice.map(|p| p.location.as_str()),
    );
    format!(
        r#"<form method="post" action="{}">
    <label for="date">Date</label>
    <input type="date" id="date" name="date" value="{}" required>
    <label for="location">Location</label>
    <select id="location" name="location">{}</select>
    <p><button type="submit">Save</button> <a href="/practices">Cancel</a></p>
</form>"#,
        escape(action),
        html::date_input_value(&date),
        locations,
    )
}

/// GET /practices
///
/// Newest first, with the number of touches recorded for each.
pub async fn list_practices(State(state): State<AppState>) -> UiResult<Html<String>> {
    let mut practices = state.storage.list_practices().await?;
    let touches = state.storage.list_touches().await?;

    let mut counts: HashMap<Uuid, usize> = HashMap::new();
    for touch in &touches {
        *counts.entry(touch.practice_id).or_default() += 1;
    }
    practices.reverse();
    practices.sort_by(|a, b| b.date.cmp(&a.date));

    let mut body = String::from(r#"<p><a href="/practices/new">Add practice</a></p>"#);
    if practices.is_empty() {
        body.push_str(r#"<p class="muted">No practices yet.</p>"#);
    } else {
        body.push_str("<table><tr><th>Date</th><th>Location</th><th>Touches</th><th></th></tr>");
        for p in &practices {
            body.push_str(&format!(
                concat!(
                    r#"<tr><td><a href="/touches?date={date}">{date}</a></td>"#,
                    r#"<td>{}</td><td>{}</td>"#,
                    r#"<td><a href="/touches/new?practice_id={id}">Add touch</a> "#,
                    r#"<a href="/practices/{id}/edit">Edit</a> {}</td></tr>"#,
                ),
                escape(p.location.as_str()),
                counts.get(&p.id).copied().unwrap_or(0),
                html::delete_button(
                    &format!("/practices/{}/delete", p.id),
                    &format!("practice {} and its touches", p.label()),
                ),
                date = html::display_date(&p.date),
                id = p.id,
            ));
        }
        body.push_str("</table>");
    }

    Ok(html::page("Practices", &body))
}

/// GET /practices/new
pub async fn new_practice() -> Html<String> {
    html::page("New practice", &practice_form("/practices", None))
}

/// POST /practices
pub async fn create_practice(
    State(state): State<AppState>,
    Form(form): Form<PracticeForm>,
) -> UiResult<Redirect> {
    state.storage.create_practice(form.into_fields()?).await?;
    Ok(Redirect::to("/practices"))
}

/// GET /practices/:id/edit
pub async fn edit_practice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> UiResult<Html<String>> {
    let practice = state
        .storage
        .get_practice(id)
        .await?
        .ok_or_else(|| validation::not_found("practice", id))?;
    Ok(html::page(
        "Edit practice",
        &practice_form(&format!("/practices/{}", id), Some(&practice)),
    ))
}

/// POST /practices/:id
pub async fn update_practice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(form): Form<PracticeForm>,
) -> UiResult<Redirect> {
    state.storage.update_practice(id, form.into_fields()?).await?;
    Ok(Redirect::to("/practices"))
}

/// POST /practices/:id/delete
///
/// Also removes the practice's touches.
pub async fn delete_practice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> UiResult<Redirect> {
    state.storage.delete_practice(id).await?;
    Ok(Redirect::to("/practices"))
}
