//! Method pages

use axum::{
    extract::{Path, State},
    response::{Html, Redirect},
    routing::{get, post},
    Form, Router,
};
use peal_common::models::{Method, MethodFields};
use peal_common::validation;
use serde::Deserialize;
use uuid::Uuid;

use super::error::UiResult;
use crate::html::{self, escape};
use crate::AppState;

pub fn method_routes() -> Router<AppState> {
    Router::new()
        .route("/methods", get(list_methods).post(create_method))
        .route("/methods/new", get(new_method))
        .route("/methods/:id", post(update_method))
        .route("/methods/:id/edit", get(edit_method))
        .route("/methods/:id/delete", post(delete_method))
}

#[derive(Debug, Deserialize)]
pub struct MethodForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    code: String,
}

impl From<MethodForm> for MethodFields {
    fn from(form: MethodForm) -> Self {
        MethodFields {
            name: form.name,
            code: Some(form.code),
        }
    }
}

fn method_form(action: &str, method: Option<&Method>) -> String {
    format!(
        r#"<form method="post" action="{}">
    <label for="name">Name</label>
    <input id="name" name="name" value="{}" required>
    <label for="code">Code <span class="muted">(optional)</span></label>
    <input id="code" name="code" value="{}" size="6">
    <p><button type="submit">Save</button> <a href="/methods">Cancel</a></p>
</form>"#,
        escape(action),
        escape(method.map_or("", |m| m.name.as_str())),
        escape(method.and_then(|m| m.code.as_deref()).unwrap_or("")),
    )
}

/// GET /methods
pub async fn list_methods(State(state): State<AppState>) -> UiResult<Html<String>> {
    let methods = state.storage.list_methods().await?;

    let mut body = String::from(r#"<p><a href="/methods/new">Add method</a></p>"#);
    if methods.is_empty() {
        body.push_str(r#"<p class="muted">No methods yet.</p>"#);
    } else {
        body.push_str("<table><tr><th>Name</th><th>Code</th><th></th></tr>");
        for m in &methods {
            body.push_str(&format!(
                r#"<tr><td>{}</td><td>{}</td><td><a href="/methods/{}/edit">Edit</a> {}</td></tr>"#,
                escape(&m.name),
                escape(m.code.as_deref().unwrap_or("")),
                m.id,
                html::delete_button(&format!("/methods/{}/delete", m.id), &m.name),
            ));
        }
        body.push_str("</table>");
    }

    Ok(html::page("Methods", &body))
}

/// GET /methods/new
pub async fn new_method() -> Html<String> {
    html::page("New method", &method_form("/methods", None))
}

/// POST /methods
pub async fn create_method(
    State(state): State<AppState>,
    Form(form): Form<MethodForm>,
) -> UiResult<Redirect> {
    state.storage.create_method(form.into()).await?;
    Ok(Redirect::to("/methods"))
}

/// GET /methods/:id/edit
pub async fn edit_method(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> UiResult<Html<String>> {
    let method = state
        .storage
        .get_method(id)
        .await?
        .ok_or_else(|| validation::not_found("method", id))?;
    Ok(html::page(
        "Edit method",
        &method_form(&format!("/methods/{}", id), Some(&method)),
    ))
}

/// POST /methods/:id
pub async fn update_method(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(form): Form<MethodForm>,
) -> UiResult<Redirect> {
    state.storage.update_method(id, form.into()).await?;
    Ok(Redirect::to("/methods"))
}

/// POST /methods/:id/delete
pub async fn delete_method(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> UiResult<Redirect> {
    state.storage.delete_method(id).await?;
    Ok(Redirect::to("/methods"))
}
