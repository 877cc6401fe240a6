//! Display languages and the Fluent bundles behind every user-facing string.

use derivative::Derivative;
use i18n_embed::fluent::{FluentLanguageLoader, fluent_language_loader};
use log::*;
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
};
use unic_langid::LanguageIdentifier;

#[derive(RustEmbed)]
#[folder = "i18n/"]
struct Localizations;

/// Looks up a message in a [`Translations`], with optional Fluent arguments
macro_rules! fl {
    ($translations:expr, $message_id:literal) => {{
        i18n_embed_fl::fl!($translations.loader(), $message_id)
    }};
    ($translations:expr, $message_id:literal, $($args:expr),*) => {{
        i18n_embed_fl::fl!($translations.loader(), $message_id, $($args), *)
    }};
}
pub(crate) use fl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Derivative, Serialize, Deserialize)]
#[derivative(Default)]
pub enum Language {
    #[derivative(Default)]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "de")]
    German,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::German => "de",
        }
    }

    pub fn as_lang_id(&self) -> LanguageIdentifier {
        LanguageIdentifier::from_bytes(self.code().as_bytes()).unwrap_or_default()
    }

    pub fn from_lang_id(lang_id: &LanguageIdentifier) -> Self {
        let matches = |code: &str| {
            code.parse::<LanguageIdentifier>()
                .is_ok_and(|other| lang_id.matches(&other, false, true))
        };
        if matches("en") {
            Self::English
        } else if matches("de") {
            Self::German
        } else {
            error!("Unsupported language: {lang_id}");
            Self::English
        }
    }

    /// The language the toggle button switches to
    pub fn toggled(&self) -> Self {
        match self {
            Self::English => Self::German,
            Self::German => Self::English,
        }
    }
}

/// The loaded messages for one language, falling back to English for any
/// message the language lacks
#[derive(Clone)]
pub struct Translations {
    language: Language,
    loader: Arc<FluentLanguageLoader>,
}

impl Translations {
    pub fn new(language: Language) -> Self {
        let loader: FluentLanguageLoader = fluent_language_loader!();
        match i18n_embed::select(&loader, &Localizations, &[language.as_lang_id()]) {
            Ok(loaded) => debug!("Loaded translations for {loaded:?}"),
            Err(e) => error!("Failed to load {} translations: {e}", language.code()),
        }
        // Arguments are inserted without bidi isolation marks
        loader.set_use_isolating(false);
        Self {
            language,
            loader: Arc::new(loader),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn loader(&self) -> &FluentLanguageLoader {
        &self.loader
    }
}

impl Default for Translations {
    fn default() -> Self {
        Self::new(Language::default())
    }
}

impl Debug for Translations {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Translations")
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Translations {
    fn eq(&self, other: &Self) -> bool {
        self.language == other.language
    }
}

impl Eq for Translations {}
