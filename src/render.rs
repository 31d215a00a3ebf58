use crate::record::LogEvent;
use std::collections::BTreeMap;

/// Formatting rule turning a [`LogEvent`] into the message string stored
/// alongside the document.
///
/// Any `Fn(&LogEvent) -> String` closure can be used as a formatter.
pub trait MessageFormatter: Send + Sync {
    fn render(&self, event: &LogEvent) -> String;
}

impl<F> MessageFormatter for F
where
    F: Fn(&LogEvent) -> String + Send + Sync,
{
    fn render(&self, event: &LogEvent) -> String {
        self(event)
    }
}

/// Default formatter: fills `{name}` placeholders in the message template
/// from the event properties.
///
/// String values are inserted without quotes, other values as JSON text.
/// Placeholders without a matching property are left untouched. `{{` and
/// `}}` produce literal braces. A leading `@` or `$` and any `:format` or
/// `,alignment` suffix inside a placeholder are ignored for lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateFormatter;

impl MessageFormatter for TemplateFormatter {
    fn render(&self, event: &LogEvent) -> String {
        render_template(&event.message_template, &event.properties)
    }
}

pub fn render_template(template: &str, properties: &BTreeMap<String, serde_json::Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('{') {
            if let Some(end) = tail.find('}') {
                let token = &tail[1..end];
                match properties.get(property_name(token)) {
                    Some(value) => push_value(&mut out, value),
                    None => out.push_str(&tail[..=end]),
                }
                rest = &tail[end + 1..];
                continue;
            }
        }

        // unmatched brace
        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}

fn property_name(token: &str) -> &str {
    let token = token.trim_start_matches(|c: char| c == '@' || c == '$');
    token
        .split(|c: char| c == ':' || c == ',')
        .next()
        .unwrap_or(token)
        .trim()
}

fn push_value(out: &mut String, value: &serde_json::Value) {
    match value {
        serde_json::Value::String(s) => out.push_str(s),
        other => out.push_str(&other.to_string()),
    }
}
