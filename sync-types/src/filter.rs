//! Subscription filters (NIP-01).

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// A request-scoped subscription filter.
///
/// All fields are optional; absent fields are omitted from the JSON sent to
/// the relay. Once a filter has been sent it is never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// Event ids to match.
    pub ids: Option<Vec<String>>,
    /// Author pubkeys (hex) to match.
    pub authors: Option<Vec<String>>,
    /// Event kinds to match.
    pub kinds: Option<Vec<u32>>,
    /// Single-letter tag filters, serialized as `"#<letter>": [values]`.
    pub tags: BTreeMap<char, Vec<String>>,
    /// Only events created at or after this unix time.
    pub since: Option<i64>,
    /// Only events created at or before this unix time.
    pub until: Option<i64>,
    /// Maximum number of stored events the relay should return.
    pub limit: Option<u64>,
}

impl Filter {
    /// An empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match these event ids.
    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Match these authors.
    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = Some(authors.into_iter().map(Into::into).collect());
        self
    }

    /// Match these kinds.
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u32>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Match events carrying a `letter` tag with any of `values`.
    pub fn tag<I, S>(mut self, letter: char, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags
            .insert(letter, values.into_iter().map(Into::into).collect());
        self
    }

    /// Lower time bound.
    pub fn since(mut self, since: i64) -> Self {
        self.since = Some(since);
        self
    }

    /// Upper time bound.
    pub fn until(mut self, until: i64) -> Self {
        self.until = Some(until);
        self
    }

    /// Result limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(ids) = &self.ids {
            map.serialize_entry("ids", ids)?;
        }
        if let Some(authors) = &self.authors {
            map.serialize_entry("authors", authors)?;
        }
        if let Some(kinds) = &self.kinds {
            map.serialize_entry("kinds", kinds)?;
        }
        for (letter, values) in &self.tags {
            map.serialize_entry(&format!("#{letter}"), values)?;
        }
        if let Some(since) = self.since {
            map.serialize_entry("since", &since)?;
        }
        if let Some(until) = self.until {
            map.serialize_entry("until", &until)?;
        }
        if let Some(limit) = self.limit {
            map.serialize_entry("limit", &limit)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_filter_is_empty_object() {
        assert_eq!(serde_json::to_string(&Filter::new()).unwrap(), "{}");
    }

    #[test]
    fn all_fields_serialize() {
        let filter = Filter::new()
            .ids(["aa"])
            .authors(["p1", "p2"])
            .kinds([0, 1])
            .tag('t', ["news"])
            .since(10)
            .until(20)
            .limit(5);

        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({
                "ids": ["aa"],
                "authors": ["p1", "p2"],
                "kinds": [0, 1],
                "#t": ["news"],
                "since": 10,
                "until": 20,
                "limit": 5
            })
        );
    }

    #[test]
    fn kinds_serialize_as_numbers() {
        let value = serde_json::to_value(Filter::new().kinds([30023])).unwrap();
        assert!(value["kinds"][0].is_number());
    }
}
