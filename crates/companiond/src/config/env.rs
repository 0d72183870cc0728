use std::path::Path;
use std::sync::LazyLock;

use regex::Captures;
use regex::Regex;

static VAR_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}^{]+)\}").expect("variable pattern is valid"));

/// Replace every `${NAME}` / `${NAME:default}` in `text` using `lookup`.
///
/// Unset variables without a default become the empty string. Only the part of the
/// default up to a further `:` is used.
pub fn interpolate(text: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    VAR_REFERENCE
        .replace_all(text, |caps: &Captures| {
            let reference = &caps[1];
            let (name, default) = match reference.split_once(':') {
                Some((name, rest)) => (name, rest.split(':').next().unwrap_or_default()),
                None => (reference, ""),
            };
            lookup(name).unwrap_or_else(|| default.to_string())
        })
        .into_owned()
}

/// Interpolate every string in a parsed document, at any depth. Keys are left alone.
pub fn interpolate_strings(value: &mut toml::Value, lookup: &impl Fn(&str) -> Option<String>) {
    match value {
        toml::Value::String(text) => *text = interpolate(text, lookup),
        toml::Value::Array(items) => {
            for item in items {
                interpolate_strings(item, lookup);
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                interpolate_strings(item, lookup);
            }
        }
        _ => {}
    }
}

/// Load `KEY=value` lines from a `.env` file into the process environment.
///
/// Variables that are already set win. Returns whether the file existed.
pub fn load_dotenv(path: &Path) -> Result<bool, dotenvy::Error> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(e),
    }
}
