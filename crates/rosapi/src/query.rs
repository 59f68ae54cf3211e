//! Convenience builders that format attribute and query words.
//!
//! Pure word formatting on top of [`Client::run`]; the engine never
//! interprets these.

use rosapi_proto::Pair;

use crate::client::Client;
use crate::error::Result;
use crate::reply::Reply;

/// A print-command query: property list, predicate words and an optional
/// combinator.
#[derive(Debug, Clone, Default)]
pub struct Query {
    proplist: Vec<String>,
    predicates: Vec<String>,
    combinator: Option<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the returned properties (`=.proplist=a,b,c`).
    pub fn proplist<I, S>(mut self, props: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.proplist = props
            .into_iter()
            .map(|prop| prop.as_ref().to_string())
            .collect();
        self
    }

    /// Add a predicate word `?<op><key>=<value>`. Valid operators are
    /// `-`, `=`, `<` and `>`; pass `""` for a plain presence test.
    pub fn filter(mut self, op: &str, key: &str, value: &str) -> Self {
        self.predicates.push(format!("?{op}{key}={value}"));
        self
    }

    /// Apply a combinator word `?#<op>` (for example `|` to OR the
    /// predicates) after them.
    pub fn combinator(mut self, op: &str) -> Self {
        self.combinator = Some(op.to_string());
        self
    }

    /// Format the full outbound sentence for `command`.
    pub fn into_words(self, command: &str) -> Vec<String> {
        let mut words = vec![command.to_string()];
        if !self.proplist.is_empty() {
            words.push(format!("=.proplist={}", self.proplist.join(",")));
        }
        if !self.predicates.is_empty() {
            words.extend(self.predicates);
            if let Some(op) = self.combinator {
                words.push(format!("?#{op}"));
            }
        }
        words
    }
}

impl Client {
    /// Run `command` with query words appended.
    pub fn query(&self, command: &str, query: Query) -> Result<Reply> {
        self.run(query.into_words(command))
    }

    /// Run `command` with attribute words (`=key=value`) appended.
    pub fn call(&self, command: &str, params: &[Pair]) -> Result<Reply> {
        let mut words = vec![command.to_string()];
        for pair in params {
            words.push(format!("={}={}", pair.key, pair.value));
        }
        self.run(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_query_is_just_the_command() {
        assert_eq!(
            Query::new().into_words("/interface/print"),
            vec!["/interface/print"]
        );
    }

    #[test]
    fn proplist_and_predicates_in_order() {
        let words = Query::new()
            .proplist(["name", "rx-byte"])
            .filter("", "disabled", "false")
            .filter("=", "running", "true")
            .into_words("/interface/print");
        assert_eq!(
            words,
            vec![
                "/interface/print",
                "=.proplist=name,rx-byte",
                "?disabled=false",
                "?=running=true",
            ]
        );
    }

    #[test]
    fn combinator_follows_predicates() {
        let words = Query::new()
            .filter(">", "rx-byte", "1000000")
            .filter("<", "tx-byte", "1000")
            .combinator("|")
            .into_words("/interface/print");
        assert_eq!(
            words,
            vec![
                "/interface/print",
                "?>rx-byte=1000000",
                "?<tx-byte=1000",
                "?#|",
            ]
        );
    }

    #[test]
    fn combinator_without_predicates_is_dropped() {
        let words = Query::new().combinator("|").into_words("/ip/address/print");
        assert_eq!(words, vec!["/ip/address/print"]);
    }
}
