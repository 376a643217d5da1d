//! Manifest header localization.
//!
//! Header values of the form `%key` are placeholders for translations stored in
//! `.properties` files inside the bundle. The base path of those files comes from the
//! `Bundle-Localization` header (default `OSGI-INF/l10n/bundle`); the file for locale
//! `de_CH` is `<base>_de_CH.properties`, falling back through `<base>_de.properties` to
//! `<base>.properties`. Translations for the configured root locale live in the base file.
//!
//! Both the resolved resource bundles and the translated header sets are cached until
//! [`ManifestLocalization::clear_cache`] is called.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use dashmap::DashMap;

use super::{Headers, BUNDLE_LOCALIZATION};
use crate::file::BundleFile;

/// Translation base path used when a bundle declares no `Bundle-Localization` header.
pub const DEFAULT_LOCALIZATION_BASENAME: &str = "OSGI-INF/l10n/bundle";

const PROPERTIES_EXTENSION: &str = ".properties";

/// Translations for one locale, falling back to a parent locale.
#[derive(Debug, Default)]
pub struct ResourceBundle {
    locale: String,
    entries: HashMap<String, String>,
    parent: Option<Arc<ResourceBundle>>,
}

impl ResourceBundle {
    /// Create a bundle for `locale` from parsed entries.
    pub fn new(
        locale: impl Into<String>,
        entries: HashMap<String, String>,
        parent: Option<Arc<ResourceBundle>>,
    ) -> Self {
        ResourceBundle {
            locale: locale.into(),
            entries,
            parent,
        }
    }

    /// The locale this bundle was loaded for; empty for the base bundle.
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Look up `key` here, then in the parent chain.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(value) => Some(value.as_str()),
            None => self.parent.as_deref().and_then(|parent| parent.get(key)),
        }
    }

    /// The next bundle in the fallback chain.
    pub fn parent(&self) -> Option<&Arc<ResourceBundle>> {
        self.parent.as_ref()
    }

    /// Returns `true` if neither this bundle nor any parent has a translation.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.parent.as_deref().map_or(true, ResourceBundle::is_empty)
    }
}

/// Localized views over the raw headers of one generation.
pub struct ManifestLocalization {
    bundle_file: Arc<dyn BundleFile>,
    raw_headers: Arc<Headers>,
    root_locale: String,
    default_locale: String,
    localized: DashMap<String, Arc<Headers>>,
    bundles: Mutex<HashMap<String, Arc<ResourceBundle>>>,
}

impl ManifestLocalization {
    /// Create a localization over `raw_headers`, reading translations from `bundle_file`.
    ///
    /// # Arguments
    /// * `bundle_file` - Accessor of the generation the headers belong to
    /// * `raw_headers` - The parsed, untranslated manifest headers
    /// * `root_locale` - Locale whose translations are in the base properties file
    /// * `default_locale` - Locale used when callers pass `None`
    pub fn new(
        bundle_file: Arc<dyn BundleFile>,
        raw_headers: Arc<Headers>,
        root_locale: impl Into<String>,
        default_locale: impl Into<String>,
    ) -> Self {
        ManifestLocalization {
            bundle_file,
            raw_headers,
            root_locale: root_locale.into(),
            default_locale: default_locale.into(),
            localized: DashMap::new(),
            bundles: Mutex::new(HashMap::new()),
        }
    }

    /// The locale used when callers do not ask for one.
    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    /// Headers with `%key` placeholders translated for `locale`.
    ///
    /// `None` means the default locale; an empty locale returns the raw headers. A
    /// placeholder without a translation is replaced by its key.
    pub fn headers(&self, locale: Option<&str>) -> Arc<Headers> {
        let locale = locale.unwrap_or(&self.default_locale);
        if locale.is_empty() {
            return Arc::clone(&self.raw_headers);
        }

        if let Some(cached) = self.localized.get(locale) {
            return Arc::clone(cached.value());
        }

        let mut bundle = self.resource_bundle(Some(locale));
        if bundle.is_none() && locale != self.default_locale {
            bundle = self.resource_bundle(None);
        }

        let mut translated = Headers::new();
        for (key, value) in self.raw_headers.iter() {
            let value = match value.strip_prefix('%').filter(|key| !key.is_empty()) {
                Some(placeholder) => bundle
                    .as_deref()
                    .and_then(|bundle| bundle.get(placeholder))
                    .unwrap_or(placeholder),
                None => value,
            };
            translated.set(key, value);
        }

        let translated = Arc::new(translated);
        self.localized
            .entry(locale.to_string())
            .or_insert_with(|| Arc::clone(&translated))
            .value()
            .clone()
    }

    /// The resource bundle for `locale` (`None` means the default locale).
    ///
    /// Returns `None` if the bundle has no translation for the locale or any fallback.
    pub fn resource_bundle(&self, locale: Option<&str>) -> Option<Arc<ResourceBundle>> {
        let locale = locale.unwrap_or(&self.default_locale);
        let locale = if locale == self.root_locale { "" } else { locale };
        let base = self
            .raw_headers
            .get(BUNDLE_LOCALIZATION)
            .unwrap_or(DEFAULT_LOCALIZATION_BASENAME)
            .to_string();

        let mut bundles = lock!(self.bundles);
        if let Some(cached) = bundles.get(locale) {
            return (!cached.is_empty()).then(|| Arc::clone(cached));
        }

        let mut parent: Option<Arc<ResourceBundle>> = None;
        for variant in nl_variants(locale).iter().rev() {
            let bundle = match bundles.get(variant.as_str()) {
                Some(cached) => Arc::clone(cached),
                None => {
                    let entries = self.load_properties(&base, variant).unwrap_or_default();
                    let bundle = Arc::new(ResourceBundle::new(
                        variant.as_str(),
                        entries,
                        parent.take(),
                    ));
                    bundles.insert(variant.clone(), Arc::clone(&bundle));
                    bundle
                }
            };
            parent = Some(bundle);
        }

        parent.filter(|bundle| !bundle.is_empty())
    }

    /// Drop every cached translation. The raw headers are kept.
    pub fn clear_cache(&self) {
        self.localized.clear();
        lock!(self.bundles).clear();
    }

    fn load_properties(&self, base: &str, variant: &str) -> Option<HashMap<String, String>> {
        let path = if variant.is_empty() {
            format!("{base}{PROPERTIES_EXTENSION}")
        } else {
            format!("{base}_{variant}{PROPERTIES_EXTENSION}")
        };

        let entry = self.bundle_file.entry(&path)?;
        match entry.bytes() {
            Ok(data) => Some(parse_properties(&String::from_utf8_lossy(&data))),
            Err(error) => {
                log::warn!(
                    "Unable to read translations {} from {}: {}",
                    path,
                    self.bundle_file,
                    error
                );
                None
            }
        }
    }
}

/// Locale fallback list, most specific first: `de_CH_x` -> `de_CH_x`, `de_CH`, `de`, ``.
pub fn nl_variants(locale: &str) -> Vec<String> {
    let mut variants = Vec::new();
    let mut current = locale;
    while !current.is_empty() {
        variants.push(current.to_string());
        current = match current.rfind('_') {
            Some(index) => &current[..index],
            None => "",
        };
    }
    variants.push(String::new());
    variants
}

/// Parse the `key=value` / `key: value` lines of a properties file.
///
/// Supports `#`/`!` comments, backslash line continuation and the common escapes
/// (`\t`, `\n`, `\r`, `\uXXXX`, escaped separators).
pub fn parse_properties(text: &str) -> HashMap<String, String> {
    let mut entries = HashMap::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let mut logical = line.trim_start().to_string();
        if logical.is_empty() || logical.starts_with('#') || logical.starts_with('!') {
            continue;
        }

        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some(next) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let (key, value) = split_property(&logical);
        entries.insert(unescape(key), unescape(value));
    }
    entries
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_property(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (index, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                return (line[..index].trim_end(), line[index + 1..].trim_start());
            }
            c if c.is_whitespace() => {
                let rest = line[index..].trim_start();
                let rest = rest
                    .strip_prefix('=')
                    .or_else(|| rest.strip_prefix(':'))
                    .unwrap_or(rest);
                return (&line[..index], rest.trim_start());
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => result.push('\t'),
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('f') => result.push('\u{000C}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => result.push(decoded),
                    None => {
                        result.push_str("\\u");
                        result.push_str(&hex);
                    }
                }
            }
            Some(other) => result.push(other),
            None => {}
        }
    }
    result
}
