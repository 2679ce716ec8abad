//! HTML page scaffolding
//!
//! Pages are plain server-rendered HTML. All user-provided text goes through
//! [`escape`] before it is interpolated.

use axum::response::Html;
use chrono::NaiveDate;
use peal_common::models::{format_date, parse_date};
use peal_common::{Error, Result};
use uuid::Uuid;

/// Escape text for element content and quoted attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = r#"
        * { box-sizing: border-box; }
        body {
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            background-color: #1a1a1a;
            color: #e0e0e0;
            line-height: 1.6;
            margin: 0;
        }
        header {
            background-color: #2a2a2a;
            border-bottom: 1px solid #3a3a3a;
            padding: 12px 20px;
            display: flex;
            align-items: center;
            gap: 20px;
        }
        header h1 { font-size: 22px; margin: 0; color: #4a9eff; }
        nav a { color: #e0e0e0; margin-right: 14px; text-decoration: none; }
        nav a:hover { color: #4a9eff; }
        .container { padding: 20px; max-width: 1100px; }
        table { border-collapse: collapse; width: 100%; margin-bottom: 20px; }
        th, td { border-bottom: 1px solid #3a3a3a; padding: 6px 10px; text-align: left; }
        th { color: #888; font-weight: 600; }
        a { color: #4a9eff; }
        .stats { display: flex; gap: 16px; flex-wrap: wrap; margin-bottom: 20px; }
        .stat {
            background: #2a2a2a;
            border-radius: 6px;
            padding: 12px 18px;
            min-width: 140px;
        }
        .stat .value { font-size: 26px; color: #4a9eff; }
        .stat .label { color: #888; font-size: 13px; }
        form.inline { display: inline; }
        label { display: block; margin-top: 10px; color: #aaa; }
        input, select {
            background: #2a2a2a;
            color: #e0e0e0;
            border: 1px solid #3a3a3a;
            padding: 5px;
        }
        button {
            background: #4a9eff;
            color: #fff;
            border: none;
            padding: 6px 14px;
            border-radius: 4px;
            cursor: pointer;
        }
        button.danger { background: #c0392b; }
        .error {
            background: #3a1f1f;
            border: 1px solid #c0392b;
            padding: 10px 14px;
            border-radius: 4px;
        }
        .bells { display: grid; grid-template-columns: repeat(4, 1fr); gap: 6px 16px; }
        .muted { color: #888; }
"#;

/// Wrap `body` in the shared layout with navigation
pub fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - Peal</title>
    <style>{style}</style>
</head>
<body>
    <header>
        <h1>Peal</h1>
        <nav>
            <a href="/">Dashboard</a>
            <a href="/employees">Employees</a>
            <a href="/practices">Practices</a>
            <a href="/methods">Methods</a>
            <a href="/touches">Touches</a>
        </nav>
        <form class="inline" method="post" action="/logout">
            <button type="submit">Log out</button>
        </form>
    </header>
    <div class="container">
        <h2>{title}</h2>
        {body}
    </div>
</body>
</html>"#,
        title = escape(title),
        style = STYLE,
        body = body,
    ))
}

/// Layout without navigation, for the login form
pub fn bare_page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title} - Peal</title>
    <style>{style}</style>
</head>
<body>
    <div class="container">
        <h2>{title}</h2>
        {body}
    </div>
</body>
</html>"#,
        title = escape(title),
        style = STYLE,
        body = body,
    ))
}

pub fn error_box(message: &str) -> String {
    format!(r#"<p class="error">{}</p>"#, escape(message))
}

/// `<option>` list; `selected` marks the current value
pub fn options<'a>(
    items: impl IntoIterator<Item = (String, String)>,
    selected: Option<&'a str>,
) -> String {
    items
        .into_iter()
        .map(|(value, label)| {
            let mark = if Some(value.as_str()) == selected {
                " selected"
            } else {
                ""
            };
            format!(
                r#"<option value="{}"{}>{}</option>"#,
                escape(&value),
                mark,
                escape(&label)
            )
        })
        .collect()
}

/// POST button that deletes `action` after a browser confirm
///
/// `what` only appears in the button's `title`; the confirm handler text is
/// fixed so record names never reach script context.
pub fn delete_button(action: &str, what: &str) -> String {
    format!(
        concat!(
            r#"<form class="inline" method="post" action="{}" "#,
            r#"onsubmit="return confirm('Delete this record?');">"#,
            r#"<button class="danger" type="submit" title="Delete {}">Delete</button></form>"#,
        ),
        escape(action),
        escape(what)
    )
}

/// Accepts `DD-MM-YYYY` and the `YYYY-MM-DD` that date inputs submit
pub fn parse_form_date(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d").or_else(|_| parse_date(value))
}

/// Value for an `<input type="date">`
pub fn date_input_value(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn display_date(date: &NaiveDate) -> String {
    format_date(date)
}

/// Parse an optional id from a form field; empty means none
pub fn parse_form_id(value: Option<&String>, field: &str) -> Result<Option<Uuid>> {
    match value.map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => Uuid::parse_str(v)
            .map(Some)
            .map_err(|_| Error::Validation(format!("{} is not a valid selection", field))),
    }
}
