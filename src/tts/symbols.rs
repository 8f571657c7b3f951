//! Character-level symbol table for TTS input.
//!
//! Each character of the (already phonemised, or character-based) input maps
//! to an integer id; the sequence is wrapped with the pad id `0` on both ends.
//! Unknown characters are skipped.
//!
//! A model directory may ship a `tokens.txt` (one `<symbol> <id>` pair per
//! line, the symbol may itself be a space).  Without one, the built-in
//! IPA vocabulary the kitten models were trained on is used:
//!   `[pad] + punctuation + ASCII letters + IPA letters`

use std::{collections::HashMap, path::Path};

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Pad id placed at both ends of every sequence.
pub const PAD_ID: i64 = 0;

const PAD: char = '$';

/// `; : , . ! ? ¡ ¿ — … “ « » ” "` and a trailing space.
const PUNCTUATION: &str = ";:,.!?¡¿—…\u{201C}«»\u{201D}\" ";

const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Combining U+0329 and the curly quotes are entries of their own.
const IPA_LETTERS: &str =
    "ɑɐɒæɓʙβɔɕçɗɖðʤəɘɚɛɜɝɞɟʄɡɠɢʛɦɧħɥʜɨɪʝɭɬɫɮʟɱɯɰŋɳɲɴøɵɸθœɶʘɹɺɾɻʀʁɽʂʃʈʧʉʊʋⱱʌɣɤʍχʎʏʑʐʒʔʡʕʢǀǁǂǃˈˌːˑʼʴʰʱʲʷˠˤ˞↓↑→↗↘\u{2019}\u{0329}\u{2018}ᵻ";

static BUILTIN: Lazy<SymbolTable> = Lazy::new(|| {
    let ids = std::iter::once(PAD)
        .chain(PUNCTUATION.chars())
        .chain(LETTERS.chars())
        .chain(IPA_LETTERS.chars())
        .enumerate()
        .map(|(i, c)| (c, i as i64))
        .collect();
    SymbolTable { ids }
});

/// Characters of the built-in IPA set that are not ASCII letters or punctuation.
pub fn is_ipa_symbol(c: char) -> bool {
    IPA_LETTERS.contains(c)
}

/// Words and single punctuation marks.
static RE_WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+|[^\w\s]").expect("static regex"));

/// Re-join words and punctuation with single spaces (`"a,b"` → `"a , b"`).
pub fn space_punctuation(text: &str) -> String {
    RE_WORDS.find_iter(text).map(|m| m.as_str()).collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone)]
pub struct SymbolTable {
    ids: HashMap<char, i64>,
}

impl SymbolTable {
    /// The built-in IPA vocabulary.
    pub fn builtin() -> &'static SymbolTable {
        &BUILTIN
    }

    /// Parse a `tokens.txt` symbol table.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut ids = HashMap::new();
        let mut multi_char = 0usize;
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (symbol, id) = line
                .rsplit_once(' ')
                .with_context(|| format!("tokens line {}: expected '<symbol> <id>'", lineno + 1))?;
            let id: i64 = id
                .trim()
                .parse()
                .with_context(|| format!("tokens line {}: bad id {:?}", lineno + 1, id))?;
            let mut chars = if symbol.is_empty() { " ".chars() } else { symbol.chars() };
            match (chars.next(), chars.next()) {
                (Some(c), None) => {
                    ids.insert(c, id);
                }
                _ => multi_char += 1,
            }
        }
        if ids.is_empty() {
            bail!("symbol table has no single-character entries");
        }
        if multi_char > 0 {
            debug!(multi_char, "skipped multi-character symbols");
        }
        Ok(Self { ids })
    }

    /// `<dir>/tokens.txt` if present, otherwise the built-in vocabulary.
    pub fn for_model_dir(dir: &Path) -> Result<Self> {
        let path = dir.join("tokens.txt");
        if !path.exists() {
            return Ok(Self::builtin().clone());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id(&self, c: char) -> Option<i64> {
        self.ids.get(&c).copied()
    }

    /// Text → `[PAD_ID, ids…, PAD_ID]`, unknown characters dropped.
    pub fn encode(&self, text: &str) -> Vec<i64> {
        let spaced = space_punctuation(text);
        let mut ids = Vec::with_capacity(spaced.len() + 2);
        ids.push(PAD_ID);
        ids.extend(spaced.chars().filter_map(|c| self.id(c)));
        ids.push(PAD_ID);
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_pad_is_zero() {
        assert_eq!(SymbolTable::builtin().id('$'), Some(PAD_ID));
    }

    #[test]
    fn test_builtin_known_and_unknown() {
        let t = SymbolTable::builtin();
        for c in ";:,.!? abcXYZəʃˈ".chars() {
            assert!(t.id(c).is_some(), "char {c:?} not in vocab");
        }
        assert_eq!(t.id('中'), None);
        assert_eq!(t.id('\u{0000}'), None);
    }

    #[test]
    fn test_builtin_ids_are_unique() {
        let t = SymbolTable::builtin();
        let mut seen = std::collections::HashSet::new();
        for &id in t.ids.values() {
            assert!(seen.insert(id), "duplicate id {id}");
        }
    }

    #[test]
    fn test_encode_wraps_with_pads() {
        let ids = SymbolTable::builtin().encode("hɛloʊ");
        assert_eq!(ids.first(), Some(&PAD_ID));
        assert_eq!(ids.last(), Some(&PAD_ID));
        assert_eq!(ids.len(), 2 + 5);
    }

    #[test]
    fn test_encode_drops_unknown() {
        let ids = SymbolTable::builtin().encode("a中b");
        // "a中b" is one \w+ word; 中 is dropped.
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_ipa_symbols() {
        assert!("həlˈoʊ".chars().any(is_ipa_symbol));
        assert!(!"Hello, world!".chars().any(is_ipa_symbol));
    }

    #[test]
    fn test_space_punctuation() {
        assert_eq!(space_punctuation("hɛloʊ wɜːld!"), "hɛloʊ wɜːld !");
        assert_eq!(space_punctuation("a,b"), "a , b");
    }

    #[test]
    fn test_parse_tokens_file() {
        let t = SymbolTable::parse("_ 0\n  1\na 2\nb 3\nab 4\n\n").unwrap();
        assert_eq!(t.id('_'), Some(0));
        assert_eq!(t.id(' '), Some(1));
        assert_eq!(t.id('a'), Some(2));
        assert_eq!(t.len(), 4);
        assert_eq!(t.encode("ab ba"), vec![0, 2, 3, 1, 3, 2, 0]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SymbolTable::parse("a x\n").is_err());
        assert!(SymbolTable::parse("novalue\n").is_err());
        assert!(SymbolTable::parse("").is_err());
    }

    #[test]
    fn test_missing_tokens_file_uses_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let t = SymbolTable::for_model_dir(dir.path()).unwrap();
        assert_eq!(t.len(), SymbolTable::builtin().len());
    }
}
