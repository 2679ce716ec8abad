//! Dashboard

use axum::extract::State;
use axum::response::Html;
use std::collections::HashMap;
use uuid::Uuid;

use super::error::UiResult;
use crate::html::{self, escape};
use crate::AppState;

const LATEST_PRACTICES: usize = 3;
const TOP_METHODS: usize = 5;

fn stat(value: usize, label: &str) -> String {
    format!(
        r#"<div class="stat"><div class="value">{}</div><div class="label">{}</div></div>"#,
        value,
        escape(label)
    )
}

/// GET /
pub async fn dashboard(State(state): State<AppState>) -> UiResult<Html<String>> {
    let storage = &state.storage;
    let summary = storage.summary().await?;
    let mut practices = storage.list_practices().await?;
    let methods = storage.list_methods().await?;
    let touches = storage.list_touches().await?;

    let mut per_practice: HashMap<Uuid, usize> = HashMap::new();
    let mut per_method: HashMap<Uuid, usize> = HashMap::new();
    for touch in &touches {
        *per_practice.entry(touch.practice_id).or_default() += 1;
        *per_method.entry(touch.method_id).or_default() += 1;
    }

    let mut body = String::from(r#"<div class="stats">"#);
    body.push_str(&stat(summary.employees, "Employees"));
    body.push_str(&stat(summary.members, "Members"));
    body.push_str(&stat(summary.employees - summary.members, "Non-members"));
    body.push_str(&stat(summary.practices, "Practices"));
    body.push_str(&stat(summary.methods, "Methods"));
    body.push_str(&stat(summary.touches, "Touches"));
    body.push_str("</div>");

    // Newest first; list order breaks ties between same-day practices
    practices.reverse();
    practices.sort_by(|a, b| b.date.cmp(&a.date));

    body.push_str("<h3>Recent practices</h3>");
    if practices.is_empty() {
        body.push_str(
            r#"<p class="muted">No practices yet. <a href="/practices/new">Add one</a>.</p>"#,
        );
    } else {
        body.push_str("<table><tr><th>Date</th><th>Location</th><th>Touches</th></tr>");
        for practice in practices.iter().take(LATEST_PRACTICES) {
            body.push_str(&format!(
                concat!(
                    r#"<tr><td><a href="/touches?date={date}">{date}</a></td>"#,
                    r#"<td>{}</td><td>{}</td></tr>"#,
                ),
                escape(practice.location.as_str()),
                per_practice.get(&practice.id).copied().unwrap_or(0),
                date = html::display_date(&practice.date),
            ));
        }
        body.push_str("</table>");
    }

    let mut ranked: Vec<_> = methods
        .iter()
        .filter_map(|m| per_method.get(&m.id).map(|count| (m, *count)))
        .collect();
    ranked.sort_by(|(a, ca), (b, cb)| cb.cmp(ca).then_with(|| a.name.cmp(&b.name)));

    body.push_str("<h3>Most rung methods</h3>");
    if ranked.is_empty() {
        body.push_str(r#"<p class="muted">No touches recorded.</p>"#);
    } else {
        body.push_str("<table><tr><th>Method</th><th>Touches</th></tr>");
        for (method, count) in ranked.into_iter().take(TOP_METHODS) {
            body.push_str(&format!(
                "<tr><td>{}</td><td>{}</td></tr>",
                escape(&method.label()),
                count
            ));
        }
        body.push_str("</table>");
    }

    Ok(html::page("Dashboard", &body))
}
