//! Internationalization.
//!
//! Translations are embedded JSON trees addressed by dotted keys such as
//! `"errors.quota"`. Russian is the default and the fallback language.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::error;

pub const DEFAULT_LANG: &str = "ru";
pub const SUPPORTED: [&str; 2] = ["ru", "en"];

/// LangCode -> translation tree.
static TRANSLATIONS: Lazy<HashMap<&'static str, Value>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (lang, raw) in [("ru", include_str!("ru.json")), ("en", include_str!("en.json"))] {
        match serde_json::from_str(raw) {
            Ok(tree) => {
                map.insert(lang, tree);
            }
            Err(e) => error!("Failed to load {} translations: {}", lang, e),
        }
    }
    map
});

/// Text for `key` in `lang`, falling back to Russian, then to the key itself.
pub fn get_text(lang: &str, key: &str) -> String {
    [lang, DEFAULT_LANG]
        .into_iter()
        .find_map(|l| TRANSLATIONS.get(l).and_then(|tree| resolve_key(tree, key)))
        .unwrap_or_else(|| key.to_string())
}

/// [`get_text`] with `{name}` placeholders substituted.
pub fn t(lang: &str, key: &str, args: &[(&str, &str)]) -> String {
    let mut text = get_text(lang, key);
    for (name, value) in args {
        text = text.replace(&format!("{{{name}}}"), value);
    }
    text
}

fn resolve_key(val: &Value, key: &str) -> Option<String> {
    let mut current = val;
    for part in key.split('.') {
        current = current.get(part)?;
    }
    current.as_str().map(|s| s.to_string())
}

/// Pick the language for a user.
///
/// Priority: stored preference, then Telegram's `language_code`, then Russian.
pub fn resolve_locale(user_lang: Option<&str>, telegram_lang: Option<&str>) -> &'static str {
    [user_lang, telegram_lang]
        .into_iter()
        .flatten()
        .find_map(normalize)
        .unwrap_or(DEFAULT_LANG)
}

/// Map `en-US`, `EN` and similar onto a supported code.
pub fn normalize(lang: &str) -> Option<&'static str> {
    let base = lang.split(['-', '_']).next()?.to_lowercase();
    SUPPORTED.into_iter().find(|supported| *supported == base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_english_key_exists_in_russian() {
        fn keys(prefix: &str, value: &Value, out: &mut Vec<String>) {
            if let Value::Object(map) = value {
                for (k, v) in map {
                    let path = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
                    keys(&path, v, out);
                }
            } else {
                out.push(prefix.to_string());
            }
        }

        let mut en = Vec::new();
        keys("", &TRANSLATIONS["en"], &mut en);
        assert!(!en.is_empty());
        for key in en {
            assert!(resolve_key(&TRANSLATIONS["ru"], &key).is_some(), "missing ru key {key}");
        }
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(get_text("de", "errors.generic"), get_text("ru", "errors.generic"));
        assert_eq!(get_text("en", "no.such.key"), "no.such.key");
    }

    #[test]
    fn test_placeholders() {
        let text = t("en", "reset.done", &[("count", "3")]);
        assert_eq!(text, "🧹 Dialog history cleared (3 messages).");
    }

    #[test]
    fn test_resolve_locale() {
        assert_eq!(resolve_locale(Some("en"), Some("ru")), "en");
        assert_eq!(resolve_locale(None, Some("en-US")), "en");
        assert_eq!(resolve_locale(None, Some("id")), "ru");
        assert_eq!(resolve_locale(Some("xx"), None), "ru");
    }
}
