//! Text front end: turns a chunk into what the model's symbol table expects.
//!
//! kitten and kokoro are trained on eSpeak IPA.  With the `espeak` feature
//! plain text is phonemised here.  Without it the caller has to pass IPA, and
//! a chunk of plain English is rejected instead of being spelled out through
//! the ASCII letters of the symbol table.  vits and matcha take characters
//! as they are.

use std::borrow::Cow;

use anyhow::Result;

use super::{symbols, ModelType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFrontend {
    Characters,
    Ipa,
}

impl TextFrontend {
    pub fn for_model(model_type: ModelType) -> Self {
        if model_type.uses_voice_bank() {
            Self::Ipa
        } else {
            Self::Characters
        }
    }

    pub fn prepare(self, text: &str) -> Result<Cow<'_, str>> {
        match self {
            Self::Characters => Ok(Cow::Borrowed(text)),
            Self::Ipa if has_ipa_symbol(text) => Ok(Cow::Borrowed(text)),
            Self::Ipa => to_ipa(text),
        }
    }
}

/// Any character only the IPA part of the symbol table has.
pub fn has_ipa_symbol(text: &str) -> bool {
    text.chars().any(symbols::is_ipa_symbol)
}

#[cfg(feature = "espeak")]
fn to_ipa(text: &str) -> Result<Cow<'_, str>> {
    use anyhow::Context;

    let ipa = super::phonemize::phonemize(text)
        .with_context(|| format!("Phonemisation failed for {text:?}"))?;
    Ok(Cow::Owned(ipa))
}

#[cfg(not(feature = "espeak"))]
fn to_ipa(text: &str) -> Result<Cow<'_, str>> {
    anyhow::ensure!(
        !text.chars().any(|c| c.is_ascii_alphabetic()),
        "expected IPA phonemes, got plain text {text:?}; pass IPA or build with the `espeak` feature"
    );
    Ok(Cow::Borrowed(text))
}
