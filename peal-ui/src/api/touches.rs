//! Touch pages
//!
//! The touch form posts `practice_id`, `method_id`, `touch_number`,
//! `conductor` and one `bell_N` field per slot (1-based); empty selects mean
//! an unassigned slot or no conductor.

use axum::{
    extract::{Path, Query, State},
    response::{Html, Redirect},
    routing::{get, post},
    Form, Router,
};
use peal_common::models::{Employee, Method, Practice, Touch, TouchFields, MAX_BELLS};
use peal_common::{validation, Error};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use super::error::UiResult;
use crate::html::{self, escape};
use crate::AppState;

pub fn touch_routes() -> Router<AppState> {
    Router::new()
        .route("/touches", get(list_touches).post(create_touch))
        .route("/touches/new", get(new_touch))
        .route("/touches/:id", post(update_touch))
        .route("/touches/:id/edit", get(edit_touch))
        .route("/touches/:id/delete", post(delete_touch))
}

/// Build touch fields from the submitted form
pub fn parse_touch_form(form: &HashMap<String, String>) -> peal_common::Result<TouchFields> {
    let practice_id = html::parse_form_id(form.get("practice_id"), "practice")?
        .ok_or_else(|| Error::Validation("practice is required".to_string()))?;
    let method_id = html::parse_form_id(form.get("method_id"), "method")?
        .ok_or_else(|| Error::Validation("method is required".to_string()))?;
    let touch_number = form
        .get("touch_number")
        .map(|n| n.trim())
        .unwrap_or("")
        .parse::<u32>()
        .map_err(|_| Error::Validation("touch number must be a whole number".to_string()))?;
    let conductor_id = html::parse_form_id(form.get("conductor"), "conductor")?;

    let mut bells = (1..=MAX_BELLS)
        .map(|slot| html::parse_form_id(form.get(&format!("bell_{}", slot)), "bell"))
        .collect::<peal_common::Result<Vec<_>>>()?;
    while bells.last() == Some(&None) {
        bells.pop();
    }

    Ok(TouchFields {
        practice_id,
        method_id,
        touch_number,
        conductor_id,
        bells,
    })
}

/// Lookup tables for rendering touches
struct Names {
    employees: HashMap<Uuid, Employee>,
    methods: HashMap<Uuid, Method>,
}

impl Names {
    async fn load(state: &AppState) -> peal_common::Result<Self> {
        Ok(Self {
            employees: state
                .storage
                .list_employees()
                .await?
                .into_iter()
                .map(|e| (e.id, e))
                .collect(),
            methods: state
                .storage
                .list_methods()
                .await?
                .into_iter()
                .map(|m| (m.id, m))
                .collect(),
        })
    }

    fn employee(&self, id: Uuid) -> String {
        self.employees
            .get(&id)
            .map(|e| e.full_name())
            .unwrap_or_else(|| "(unknown)".to_string())
    }

    fn method(&self, id: Uuid) -> String {
        self.methods
            .get(&id)
            .map(|m| m.label())
            .unwrap_or_else(|| "(unknown)".to_string())
    }
}

fn touch_row(touch: &Touch, names: &Names) -> String {
    let bells: Vec<String> = touch
        .bells
        .iter()
        .enumerate()
        .filter_map(|(slot, id)| {
            id.map(|id| format!("{}: {}", slot + 1, escape(&names.employee(id))))
        })
        .collect();
    format!(
        concat!(
            r#"<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td>"#,
            r#"<td><a href="/touches/{id}/edit">Edit</a> {}</td></tr>"#,
        ),
        touch.touch_number,
        escape(&names.method(touch.method_id)),
        touch
            .conductor_id
            .map(|id| escape(&names.employee(id)))
            .unwrap_or_else(|| "-".to_string()),
        if bells.is_empty() {
            r#"<span class="muted">none</span>"#.to_string()
        } else {
            bells.join(", ")
        },
        html::delete_button(
            &format!("/touches/{}/delete", touch.id),
            &format!("touch {}", touch.touch_number),
        ),
        id = touch.id,
    )
}

#[derive(Debug, Deserialize)]
pub struct TouchFilter {
    date: Option<String>,
}

/// GET /touches
///
/// Grouped by practice, newest practice first. `?date=` narrows the list to
/// practices held on that day.
pub async fn list_touches(
    State(state): State<AppState>,
    Query(filter): Query<TouchFilter>,
) -> UiResult<Html<String>> {
    let date = match filter.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) => Some(html::parse_form_date(d)?),
        None => None,
    };
    let touches = match date {
        Some(date) => state.storage.list_touches_on_date(date).await?,
        None => state.storage.list_touches().await?,
    };
    let practices = state.storage.list_practices().await?;
    let names = Names::load(&state).await?;

    let mut by_practice: HashMap<Uuid, Vec<&Touch>> = HashMap::new();
    for touch in &touches {
        by_practice.entry(touch.practice_id).or_default().push(touch);
    }
    let mut groups: Vec<(&Practice, Vec<&Touch>)> = practices
        .iter()
        .rev()
        .filter_map(|p| by_practice.remove(&p.id).map(|ts| (p, ts)))
        .collect();
    groups.sort_by(|(a, _), (b, _)| b.date.cmp(&a.date));

    let mut body = format!(
        r#"<form method="get" action="/touches">
    <label for="date">Practice date</label>
    <input type="date" id="date" name="date" value="{}">
    <button type="submit">Filter</button> <a href="/touches">Show all</a>
</form>
<p><a href="/touches/new">Add touch</a></p>"#,
        date.as_ref().map(html::date_input_value).unwrap_or_default()
    );

    if groups.is_empty() {
        body.push_str(r#"<p class="muted">No touches found.</p>"#);
    }
    for (practice, mut touches) in groups {
        touches.sort_by_key(|t| t.touch_number);
        body.push_str(&format!(
            r#"<h3>{} <a class="muted" href="/touches/new?practice_id={}">add</a></h3>"#,
            escape(&practice.label()),
            practice.id
        ));
        body.push_str(
            "<table><tr><th>#</th><th>Method</th><th>Conductor</th><th>Bells</th><th></th></tr>",
        );
        for touch in touches {
            body.push_str(&touch_row(touch, &names));
        }
        body.push_str("</table>");
    }

    Ok(html::page("Touches", &body))
}

/// Options for the touch form, loaded once per render
struct FormChoices {
    practices: Vec<Practice>,
    methods: Vec<Method>,
    employees: Vec<Employee>,
}

impl FormChoices {
    async fn load(state: &AppState) -> peal_common::Result<Self> {
        let mut practices = state.storage.list_practices().await?;
        practices.reverse();
        practices.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(Self {
            practices,
            methods: state.storage.list_methods().await?,
            employees: state.storage.list_employees().await?,
        })
    }

    fn employee_options(&self, selected: Option<Uuid>) -> String {
        let selected = selected.map(|id| id.to_string());
        let mut out = String::from(r#"<option value="">(none)</option>"#);
        out.push_str(&html::options(
            self.employees
                .iter()
                .map(|e| (e.id.to_string(), e.full_name())),
            selected.as_deref(),
        ));
        out
    }
}

fn touch_form(action: &str, choices: &FormChoices, touch: &TouchFields) -> String {
    let practice_id = touch.practice_id.to_string();
    let method_id = touch.method_id.to_string();
    let practices = html::options(
        choices
            .practices
            .iter()
            .map(|p| (p.id.to_string(), p.label())),
        Some(practice_id.as_str()),
    );
    let methods = html::options(
        choices
            .methods
            .iter()
            .map(|m| (m.id.to_string(), m.label())),
        Some(method_id.as_str()),
    );

    let bells: String = (0..MAX_BELLS)
        .map(|slot| {
            let current = touch.bells.get(slot).copied().flatten();
            format!(
                concat!(
                    r#"<div><label for="bell_{n}">Bell {n}</label>"#,
                    r#"<select id="bell_{n}" name="bell_{n}">{}</select></div>"#,
                ),
                choices.employee_options(current),
                n = slot + 1,
            )
        })
        .collect();

    format!(
        r#"<form method="post" action="{}">
    <label for="practice_id">Practice</label>
    <select id="practice_id" name="practice_id">{}</select>
    <label for="method_id">Method</label>
    <select id="method_id" name="method_id">{}</select>
    <label for="touch_number">Touch number</label>
    <input type="number" id="touch_number" name="touch_number" min="1" max="12" value="{}" required>
    <label for="conductor">Conductor</label>
    <select id="conductor" name="conductor">{}</select>
    <h3>Bells</h3>
    <div class="bells">{}</div>
    <p><button type="submit">Save</button> <a href="/touches">Cancel</a></p>
</form>"#,
        escape(action),
        practices,
        methods,
        touch.touch_number,
        choices.employee_options(touch.conductor_id),
        bells,
    )
}

#[derive(Debug, Deserialize)]
pub struct NewTouchQuery {
    practice_id: Option<String>,
}

/// GET /touches/new
///
/// `?practice_id=` preselects the practice and suggests its next free number.
pub async fn new_touch(
    State(state): State<AppState>,
    Query(query): Query<NewTouchQuery>,
) -> UiResult<Html<String>> {
    let choices = FormChoices::load(&state).await?;
    if choices.practices.is_empty() || choices.methods.is_empty() {
        return Ok(html::page(
            "New touch",
            concat!(
                r#"<p class="muted">Add at least one <a href="/practices/new">practice</a> "#,
                r#"and one <a href="/methods/new">method</a> first.</p>"#,
            ),
        ));
    }

    let requested = html::parse_form_id(query.practice_id.as_ref(), "practice")?;
    let practice_id = requested
        .filter(|id| choices.practices.iter().any(|p| p.id == *id))
        .unwrap_or(choices.practices[0].id);
    let touch_number = state.storage.next_touch_number(practice_id).await?;

    let draft = TouchFields {
        practice_id,
        method_id: choices.methods[0].id,
        touch_number,
        conductor_id: None,
        bells: Vec::new(),
    };
    Ok(html::page("New touch", &touch_form("/touches", &choices, &draft)))
}

/// POST /touches
pub async fn create_touch(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> UiResult<Redirect> {
    let touch = state.storage.create_touch(parse_touch_form(&form)?).await?;
    Ok(redirect_to_practice(&state, touch.practice_id).await)
}

/// GET /touches/:id/edit
pub async fn edit_touch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> UiResult<Html<String>> {
    let touch = state
        .storage
        .get_touch(id)
        .await?
        .ok_or_else(|| validation::not_found("touch", id))?;
    let choices = FormChoices::load(&state).await?;

    let fields = TouchFields {
        practice_id: touch.practice_id,
        method_id: touch.method_id,
        touch_number: touch.touch_number,
        conductor_id: touch.conductor_id,
        bells: touch.bells,
    };
    Ok(html::page(
        "Edit touch",
        &touch_form(&format!("/touches/{}", id), &choices, &fields),
    ))
}

/// POST /touches/:id
pub async fn update_touch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(form): Form<HashMap<String, String>>,
) -> UiResult<Redirect> {
    let touch = state.storage.update_touch(id, parse_touch_form(&form)?).await?;
    Ok(redirect_to_practice(&state, touch.practice_id).await)
}

/// POST /touches/:id/delete
pub async fn delete_touch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> UiResult<Redirect> {
    state.storage.delete_touch(id).await?;
    Ok(Redirect::to("/touches"))
}

/// Back to the touch list filtered to the practice's day
async fn redirect_to_practice(state: &AppState, practice_id: Uuid) -> Redirect {
    match state.storage.get_practice(practice_id).await {
        Ok(Some(practice)) => Redirect::to(&format!(
            "/touches?date={}",
            html::display_date(&practice.date)
        )),
        _ => Redirect::to("/touches"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, String)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_parse_touch_form() {
        let practice = Uuid::new_v4();
        let method = Uuid::new_v4();
        let ringer = Uuid::new_v4();
        let fields = parse_touch_form(&form(&[
            ("practice_id", practice.to_string()),
            ("method_id", method.to_string()),
            ("touch_number", " 3 ".to_string()),
            ("conductor", String::new()),
            ("bell_1", String::new()),
            ("bell_2", ringer.to_string()),
            ("bell_3", String::new()),
        ]))
        .unwrap();

        assert_eq!(fields.practice_id, practice);
        assert_eq!(fields.touch_number, 3);
        assert_eq!(fields.conductor_id, None);
        assert_eq!(fields.bells, vec![None, Some(ringer)]);
    }

    #[test]
    fn test_parse_touch_form_rejects_bad_number() {
        let result = parse_touch_form(&form(&[
            ("practice_id", Uuid::new_v4().to_string()),
            ("method_id", Uuid::new_v4().to_string()),
            ("touch_number", "three".to_string()),
        ]));
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_parse_touch_form_requires_practice() {
        let result = parse_touch_form(&form(&[
            ("method_id", Uuid::new_v4().to_string()),
            ("touch_number", "1".to_string()),
        ]));
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
