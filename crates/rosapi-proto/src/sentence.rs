use std::collections::HashMap;
use std::fmt;

/// A single `key=value` attribute in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pair {
    pub key: String,
    pub value: String,
}

impl Pair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One protocol message: a first word plus attribute words, terminated on
/// the wire by an empty word (not retained here).
///
/// `list` preserves wire order including duplicate keys; [`Sentence::get`]
/// is the last-value-wins view over the same parse. The two never diverge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sentence {
    /// First word: a reply marker (`!re`, `!done`, ...) on inbound
    /// sentences, the command path on outbound ones.
    pub word: String,
    /// Routing tag from a `.tag=` control word; empty when absent.
    pub tag: String,
    /// Attribute pairs in wire order, duplicates preserved.
    pub list: Vec<Pair>,
    map: HashMap<String, String>,
}

impl Sentence {
    /// Feed the word at `index` into the sentence being parsed.
    ///
    /// The first word is kept verbatim. Later words are classified:
    /// `.tag=` control words set the tag, `=`-prefixed words become
    /// attribute pairs (the value may be empty or contain further `=`).
    /// Anything else carries no reply data and is dropped here; judging
    /// the first word is the reply layer's job, this layer never rejects.
    pub(crate) fn push_word(&mut self, index: usize, word: &str) {
        if index == 0 {
            self.word = word.to_string();
        } else if let Some(tag) = word.strip_prefix(".tag=") {
            self.tag = tag.to_string();
        } else if let Some(attr) = word.strip_prefix('=') {
            let (key, value) = match attr.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (attr.to_string(), String::new()),
            };
            self.map.insert(key.clone(), value.clone());
            self.list.push(Pair { key, value });
        }
    }

    /// Last-value-wins lookup over the attribute pairs.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }
}

impl fmt::Display for Sentence {
    /// Stable rendering for logs and tests, order-preserving over `list`:
    /// `WORD [{`k1` `v1`} {`k2` `v2`}]`, with ` @tag` after the word when
    /// the sentence carries a tag.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.word)?;
        if !self.tag.is_empty() {
            write!(f, " @{}", self.tag)?;
        }
        write!(f, " [")?;
        for (i, pair) in self.list.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{{`{}` `{}`}}", pair.key, pair.value)?;
        }
        write!(f, "]")
    }
}
