use crate::matcher::fuzzy_contains;
use crate::models::EntityAttributes;
use std::collections::BTreeMap;

const PLACEHOLDERS: [&str; 4] = ["installed", "latest", "version", "name"];

/// Find the release notes url for `name` in `templates`.
///
/// An exact key (lowercased name first, then the name as is) wins. Otherwise the longest key
/// fuzzily matching the name is used.
pub fn resolve(
    name: &str,
    attributes: &EntityAttributes,
    templates: &BTreeMap<String, String>,
) -> Option<String> {
    let template = templates
        .get(&name.to_lowercase())
        .or_else(|| templates.get(name))
        .or_else(|| {
            templates
                .iter()
                .filter(|(key, _)| fuzzy_contains(key, name))
                // max_by_key returns the last maximum, keep the first one instead
                .fold(None, |best: Option<(&String, &String)>, candidate| match best {
                    Some(best) if best.0.len() >= candidate.0.len() => Some(best),
                    _ => Some(candidate),
                })
                .map(|(_, template)| template)
        })?;
    Some(format_url(template, attributes, name))
}

/// Substitute `{installed}`, `{latest}`, `{version}` and `{name}` (in any letter case) with
/// percent-encoded values. `{version}` is the latest version, falling back to the installed one.
pub fn format_url(template: &str, attributes: &EntityAttributes, name: &str) -> String {
    let installed = attributes.installed_version.as_deref().unwrap_or_default();
    let latest = attributes.latest_version.as_deref().unwrap_or_default();
    let version = if latest.is_empty() { installed } else { latest };
    let value_of = |placeholder: &str| match placeholder {
        "installed" => installed,
        "latest" => latest,
        "version" => version,
        _ => name,
    };

    let mut url = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        url.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let placeholder = after
            .find('}')
            .map(|close| (close, after[..close].to_lowercase()))
            .filter(|(_, key)| PLACEHOLDERS.contains(&key.as_str()));
        match placeholder {
            Some((close, key)) => {
                url.push_str(&urlencoding::encode(value_of(&key)));
                rest = &after[close + 1..];
            }
            None => {
                url.push('{');
                rest = after;
            }
        }
    }
    url.push_str(rest);
    url
}
