use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};
use unic_langid::LanguageIdentifier;

/// Internationalization service using Fluent (thread-safe)
pub struct I18n {
    bundles: RwLock<HashMap<String, FluentBundle<FluentResource>>>,
    default_locale: String,
}

impl I18n {
    /// Create a new i18n service with embedded English translations
    pub fn new() -> Self {
        let i18n = Self {
            bundles: RwLock::new(HashMap::new()),
            default_locale: "en".to_string(),
        };

        i18n.load_embedded_en();

        i18n
    }

    /// Add a locale with translations
    pub fn add_locale(&self, locale: &str, content: &str) -> Result<(), String> {
        let lang_id: LanguageIdentifier = locale
            .parse()
            .map_err(|e| format!("Invalid locale '{}': {}", locale, e))?;

        let resource = FluentResource::try_new(content.to_string())
            .map_err(|(_, errors)| format!("Failed to parse Fluent resource: {:?}", errors))?;

        let mut bundle = FluentBundle::new_concurrent(vec![lang_id]);
        // Notifications are plain text toasts; no bidi isolation marks around arguments.
        bundle.set_use_isolating(false);
        bundle
            .add_resource(resource)
            .map_err(|errors| format!("Failed to add resource to bundle: {:?}", errors))?;

        let mut bundles = self
            .bundles
            .write()
            .map_err(|_| "Translation bundles lock poisoned".to_string())?;
        bundles.insert(locale.to_string(), bundle);

        debug!(locale = %locale, "Loaded translations");

        Ok(())
    }

    /// Get a translated message
    pub fn get(&self, locale: &str, key: &str, args: Option<&FluentArgs>) -> String {
        // Try requested locale, fall back to default, fall back to key
        self.try_get(locale, key, args)
            .or_else(|| self.try_get(&self.default_locale, key, args))
            .unwrap_or_else(|| key.to_string())
    }

    fn try_get(&self, locale: &str, key: &str, args: Option<&FluentArgs>) -> Option<String> {
        let bundles = self.bundles.read().ok()?;
        let bundle = bundles.get(locale)?;
        let message = bundle.get_message(key)?;
        let pattern = message.value()?;

        let mut errors = vec![];
        let result = bundle.format_pattern(pattern, args, &mut errors);

        if !errors.is_empty() {
            warn!(key = %key, errors = ?errors, "Fluent formatting errors");
        }

        Some(result.to_string())
    }

    /// Get a translated message with string arguments
    pub fn format(&self, locale: &str, key: &str, args: &[(&str, &str)]) -> String {
        let mut fluent_args = FluentArgs::new();
        for (k, v) in args {
            fluent_args.set(*k, *v);
        }
        self.get(locale, key, Some(&fluent_args))
    }

    /// Get a translated message with numeric arguments (plural selection works on these)
    pub fn format_counts(&self, locale: &str, key: &str, args: &[(&str, usize)]) -> String {
        let mut fluent_args = FluentArgs::new();
        for (k, v) in args {
            fluent_args.set(*k, *v);
        }
        self.get(locale, key, Some(&fluent_args))
    }

    fn load_embedded_en(&self) {
        let en_translations = r#"
# Invoice upload service - English Translations

# Batch outcome
upload-batch-success = { $count ->
    [one] Uploaded 1 document
   *[other] Uploaded { $count } documents
}
upload-batch-partial = { $succeeded } uploaded, { $failed } failed

# Retry outcome
upload-retry-success = Retry successful
upload-retry-failed = Retry failed: { $error }

# Item errors
upload-document-creation-failed = Document creation failed: { $error }

# Health
health-status-healthy = Service is healthy
"#;

        if let Err(e) = self.add_locale("en", en_translations) {
            warn!(error = %e, "Failed to load embedded English translations");
        }
    }
}

impl Default for I18n {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural_batch_success() {
        let i18n = I18n::new();

        assert_eq!(
            i18n.format_counts("en", "upload-batch-success", &[("count", 1)]),
            "Uploaded 1 document"
        );
        assert_eq!(
            i18n.format_counts("en", "upload-batch-success", &[("count", 5)]),
            "Uploaded 5 documents"
        );
    }

    #[test]
    fn test_partial_summary() {
        let i18n = I18n::new();

        let msg = i18n.format_counts(
            "en",
            "upload-batch-partial",
            &[("succeeded", 2), ("failed", 2)],
        );
        assert_eq!(msg, "2 uploaded, 2 failed");
    }

    #[test]
    fn test_document_creation_prefix() {
        let i18n = I18n::new();

        let msg = i18n.format(
            "en",
            "upload-document-creation-failed",
            &[("error", "Collection is archived")],
        );
        assert_eq!(msg, "Document creation failed: Collection is archived");
    }

    #[test]
    fn test_fallback_to_key() {
        let i18n = I18n::new();

        let msg = i18n.get("en", "nonexistent-key", None);
        assert_eq!(msg, "nonexistent-key");
    }

    #[test]
    fn test_fallback_to_default_locale() {
        let i18n = I18n::new();

        let msg = i18n.get("fr", "upload-retry-success", None);
        assert_eq!(msg, "Retry successful");
    }
}
