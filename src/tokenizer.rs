//! Tokenizers used to measure and slice text for chunking.
//!
//! Two implementations sit behind the [`Tokenizer`] trait:
//! - **[`BpeTokenizer`]**: `cl100k_base` byte-pair encoding via `tiktoken-rs`,
//!   the default for real documents.
//! - **[`WhitespaceTokenizer`]**: one token per whitespace-separated word.
//!   Cheap and exact, useful for tests and for backends without a BPE
//!   vocabulary.
//!
//! Both are deterministic: the same text always produces the same tokens.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{bail, Result};

/// Maps text to a token sequence and back.
pub trait Tokenizer: Send + Sync {
    /// Configuration name (`"cl100k"`, `"whitespace"`).
    fn name(&self) -> &str;

    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decode a contiguous token slice. The result may differ from the
    /// original substring in whitespace at the slice boundaries.
    fn decode(&self, tokens: &[u32]) -> String;

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// BPE tokenizer backed by `tiktoken-rs`.
pub struct BpeTokenizer {
    bpe: tiktoken_rs::CoreBPE,
}

impl BpeTokenizer {
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for BpeTokenizer {
    fn name(&self) -> &str {
        "cl100k"
    }

    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    fn decode(&self, tokens: &[u32]) -> String {
        if let Ok(text) = self.bpe.decode(tokens.to_vec()) {
            return text;
        }
        // A slice boundary split a multi-byte character. Interior bytes are
        // intact, so only the partial characters at either end are dropped.
        let bytes: Vec<u8> = self
            .bpe
            ._decode_native_and_split(tokens.to_vec())
            .flatten()
            .collect();
        String::from_utf8_lossy(trim_partial_chars(&bytes)).into_owned()
    }
}

fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

/// Expected length of the UTF-8 sequence starting with `lead`.
fn sequence_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}

/// Strip a leading run of continuation bytes and a trailing incomplete
/// sequence.
fn trim_partial_chars(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .take(3)
        .take_while(|b| is_continuation(**b))
        .count();
    let bytes = &bytes[start..];

    let tail = bytes.len().saturating_sub(4);
    let end = match bytes[tail..].iter().rposition(|b| !is_continuation(*b)) {
        Some(offset) => {
            let lead = tail + offset;
            if lead + sequence_len(bytes[lead]) > bytes.len() {
                lead
            } else {
                bytes.len()
            }
        }
        None => bytes.len(),
    };
    &bytes[..end]
}

/// Word-level tokenizer. Token ids are assigned on first sight, so they are
/// stable for the lifetime of one instance.
#[derive(Default)]
pub struct WhitespaceTokenizer {
    vocab: RwLock<Vocab>,
}

#[derive(Default)]
struct Vocab {
    ids: HashMap<String, u32>,
    words: Vec<String>,
}

impl WhitespaceTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&self, word: &str) -> u32 {
        if let Ok(vocab) = self.vocab.read() {
            if let Some(&id) = vocab.ids.get(word) {
                return id;
            }
        }
        let mut vocab = match self.vocab.write() {
            Ok(v) => v,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(&id) = vocab.ids.get(word) {
            return id;
        }
        let id = vocab.words.len() as u32;
        vocab.words.push(word.to_string());
        vocab.ids.insert(word.to_string(), id);
        id
    }
}

impl Tokenizer for WhitespaceTokenizer {
    fn name(&self) -> &str {
        "whitespace"
    }

    fn encode(&self, text: &str) -> Vec<u32> {
        text.split_whitespace().map(|w| self.intern(w)).collect()
    }

    fn decode(&self, tokens: &[u32]) -> String {
        let vocab = match self.vocab.read() {
            Ok(v) => v,
            Err(poisoned) => poisoned.into_inner(),
        };
        tokens
            .iter()
            .filter_map(|&t| vocab.words.get(t as usize).map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Build the tokenizer named in `[chunking].tokenizer`.
pub fn create_tokenizer(name: &str) -> Result<Arc<dyn Tokenizer>> {
    match name {
        "cl100k" => Ok(Arc::new(BpeTokenizer::cl100k()?)),
        "whitespace" => Ok(Arc::new(WhitespaceTokenizer::new())),
        other => bail!(
            "Unknown tokenizer: '{}'. Must be cl100k or whitespace.",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_round_trip() {
        let tok = WhitespaceTokenizer::new();
        let ids = tok.encode("the  quick\nbrown the");
        assert_eq!(ids.len(), 4);
        assert_eq!(ids[0], ids[3]);
        assert_eq!(tok.decode(&ids), "the quick brown the");
        assert_eq!(tok.decode(&ids[1..3]), "quick brown");
    }

    #[test]
    fn whitespace_count_matches_encode() {
        let tok = WhitespaceTokenizer::new();
        let text = "one two three four five";
        assert_eq!(tok.count(text), tok.encode(text).len());
        assert_eq!(tok.count("   "), 0);
    }

    #[test]
    fn bpe_is_deterministic() {
        let tok = BpeTokenizer::cl100k().unwrap();
        let text = "Vacation policy: employees receive 15 days per year.";
        let a = tok.encode(text);
        let b = tok.encode(text);
        assert_eq!(a, b);
        assert!(!a.is_empty());
        assert_eq!(tok.decode(&a), text);
    }

    #[test]
    fn partial_characters_are_trimmed_at_both_ends() {
        let text = "带薪🎉";
        let bytes = text.as_bytes();
        // Cut one byte into the first character and one byte short of the end.
        assert_eq!(trim_partial_chars(&bytes[1..bytes.len() - 1]), "薪".as_bytes());
        assert_eq!(trim_partial_chars(bytes), bytes);
        assert_eq!(trim_partial_chars(&bytes[..2]), b"");
        assert_eq!(trim_partial_chars(b"plain"), b"plain");
        assert_eq!(trim_partial_chars(b""), b"");
    }

    #[test]
    fn bpe_slices_keep_interior_multibyte_text() {
        let tok = BpeTokenizer::cl100k().unwrap();
        let text = "员工每年享有十五天带薪休假。薪酬福利政策适用于所有正式员工。🎉🎉 休假需提前申请。";
        let ids = tok.encode(text);
        let total_chars = text.chars().count();

        for size in [5, 13] {
            let pieces: Vec<String> = ids.chunks(size).map(|s| tok.decode(s)).collect();
            for piece in &pieces {
                assert!(!piece.contains('\u{FFFD}'), "{:?}", piece);
                assert!(text.contains(piece.as_str()), "{:?} is not a slice of the input", piece);
            }
            // Each cut can cost at most the one character it splits.
            let kept: usize = pieces.iter().map(|p| p.chars().count()).sum();
            assert!(
                total_chars - kept <= pieces.len() - 1,
                "size {}: kept {} of {} chars in {} pieces",
                size,
                kept,
                total_chars,
                pieces.len()
            );
        }
    }

    #[test]
    fn unknown_tokenizer_rejected() {
        assert!(create_tokenizer("sentencepiece").is_err());
        assert_eq!(create_tokenizer("whitespace").unwrap().name(), "whitespace");
    }
}
