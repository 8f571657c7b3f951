//! Sentence chunker for long synthesis input.
//!
//! Text is split after `.`, `!` and `?`.  A sentence longer than the bound is
//! packed word by word, and a single word longer than the bound is cut at
//! character boundaries.  Every chunk ends in punctuation (a `,` is appended
//! when missing, which models trained on punctuated text need for prosody);
//! the bound counts characters and excludes that appended mark.

const SENTENCE_END: [char; 3] = ['.', '!', '?'];
const CLAUSE_END: &str = ".!?,;:";

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn ensure_punctuation(text: &str) -> String {
    let text = text.trim();
    match text.chars().last() {
        None => String::new(),
        Some(c) if CLAUSE_END.contains(c) => text.to_string(),
        Some(_) => format!("{text},"),
    }
}

/// Cut `word` into pieces of at most `max_chars` characters.
fn split_word(word: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (i, _) in word.char_indices() {
        if count == max_chars {
            pieces.push(&word[start..i]);
            start = i;
            count = 0;
        }
        count += 1;
    }
    if start < word.len() {
        pieces.push(&word[start..]);
    }
    pieces
}

/// Split `text` into chunks of at most `max_chars` characters.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();

    for sentence in text.split_inclusive(SENTENCE_END) {
        let sentence = sentence.trim();
        if sentence.chars().all(|c| SENTENCE_END.contains(&c)) {
            // Empty, or stray terminators such as the tail of "...".
            continue;
        }
        if char_len(sentence) <= max_chars {
            chunks.push(ensure_punctuation(sentence));
            continue;
        }

        let mut current = String::new();
        let mut current_len = 0;
        for piece in sentence.split_whitespace().flat_map(|w| split_word(w, max_chars)) {
            let len = char_len(piece);
            if current_len > 0 && current_len + 1 + len > max_chars {
                chunks.push(ensure_punctuation(&current));
                current.clear();
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(piece);
            current_len += len;
        }
        if current_len > 0 {
            chunks.push(ensure_punctuation(&current));
        }
    }
    chunks
}
