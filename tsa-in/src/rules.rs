//! Keyword filter rules for the post stream
//!
//! A rule pairs a keyword with the stream operators `lang:en -is:retweet`
//! and a tag identifying it. Rules are matched locally against each
//! incoming post, so the stream source only has to deliver candidates.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{IngestError, Result};
use tsa_common::models::RawPost;

/// Operators appended to every rule keyword
pub const RULE_OPERATORS: &str = "lang:en -is:retweet";

const RETWEET_PREFIX: &str = "RT @";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRule {
    pub keyword: String,
    /// Full rule expression, `"{keyword} lang:en -is:retweet"`
    pub value: String,
    /// Rule identifier; defaults to the keyword
    pub tag: String,
}

impl StreamRule {
    pub fn new(keyword: &str, tag: Option<&str>) -> Result<Self> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(IngestError::InvalidRule("keyword must not be empty".to_string()));
        }
        Ok(Self {
            keyword: keyword.to_string(),
            value: format!("{} {}", keyword, RULE_OPERATORS),
            tag: tag.unwrap_or(keyword).to_string(),
        })
    }

    /// Case-insensitive keyword match on an English, non-retweet post
    pub fn matches(&self, post: &RawPost) -> bool {
        is_candidate(post) && contains_keyword(&post.text, &self.keyword)
    }
}

/// Posts without a language tag are accepted
fn is_candidate(post: &RawPost) -> bool {
    let english = post
        .lang
        .as_deref()
        .map_or(true, |lang| lang.eq_ignore_ascii_case("en"));
    english && !post.text.trim_start().starts_with(RETWEET_PREFIX)
}

fn contains_keyword(text: &str, keyword: &str) -> bool {
    text.to_lowercase().contains(&keyword.to_lowercase())
}

/// Active rule set
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<StreamRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one rule per keyword, all sharing `tag` when given
    ///
    /// All keywords are validated before any rule is added. Rules already in
    /// the set are not duplicated. Returns the number of rules added.
    pub fn add_rules<S: AsRef<str>>(&mut self, keywords: &[S], tag: Option<&str>) -> Result<usize> {
        let new_rules = keywords
            .iter()
            .map(|k| StreamRule::new(k.as_ref(), tag))
            .collect::<Result<Vec<_>>>()?;

        let mut added = 0;
        for rule in new_rules {
            if !self.rules.contains(&rule) {
                self.rules.push(rule);
                added += 1;
            }
        }
        info!(added, total = self.rules.len(), "Added stream rules");
        Ok(added)
    }

    /// Remove every rule; returns how many were removed
    pub fn clear(&mut self) -> usize {
        let removed = self.rules.len();
        self.rules.clear();
        if removed > 0 {
            info!(removed, "Cleared stream rules");
        }
        removed
    }

    pub fn rules(&self) -> &[StreamRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Tags of all rules matching `post`
    pub fn matching_tags(&self, post: &RawPost) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(post))
            .map(|rule| rule.tag.as_str())
            .collect()
    }

    /// An empty rule set matches nothing
    pub fn matches(&self, post: &RawPost) -> bool {
        self.rules.iter().any(|rule| rule.matches(post))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post(text: &str, lang: Option<&str>) -> RawPost {
        RawPost {
            post_id: "1".to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
            author_id: None,
            lang: lang.map(str::to_string),
        }
    }

    #[test]
    fn rule_value_and_default_tag() {
        let rule = StreamRule::new("rust", None).unwrap();
        assert_eq!(rule.value, "rust lang:en -is:retweet");
        assert_eq!(rule.tag, "rust");

        let tagged = StreamRule::new("tokio", Some("async")).unwrap();
        assert_eq!(tagged.tag, "async");
    }

    #[test]
    fn empty_keyword_is_rejected() {
        assert!(matches!(StreamRule::new("  ", None), Err(IngestError::InvalidRule(_))));
    }

    #[test]
    fn add_rules_is_all_or_nothing() {
        let mut rules = RuleSet::new();
        let result = rules.add_rules(&["good", ""], None);
        assert!(result.is_err());
        assert!(rules.is_empty());
    }

    #[test]
    fn add_rules_skips_duplicates() {
        let mut rules = RuleSet::new();
        assert_eq!(rules.add_rules(&["apple", "banana"], None).unwrap(), 2);
        assert_eq!(rules.add_rules(&["apple", "cherry"], None).unwrap(), 1);
        assert_eq!(rules.len(), 3);
        assert_eq!(rules.clear(), 3);
        assert!(rules.is_empty());
    }

    #[test]
    fn matching_is_case_insensitive() {
        let mut rules = RuleSet::new();
        rules.add_rules(&["Rust"], Some("lang")).unwrap();
        let p = post("loving rust today", Some("en"));
        assert!(rules.matches(&p));
        assert_eq!(rules.matching_tags(&p), vec!["lang"]);
        assert!(!rules.matches(&post("loving go today", Some("en"))));
    }

    #[test]
    fn retweets_and_other_languages_are_filtered() {
        let mut rules = RuleSet::new();
        rules.add_rules(&["rust"], None).unwrap();
        assert!(!rules.matches(&post("RT @someone: rust is great", Some("en"))));
        assert!(!rules.matches(&post("rust est super", Some("fr"))));
        assert!(rules.matches(&post("rust without lang", None)));
    }

    #[test]
    fn empty_rule_set_matches_nothing() {
        assert!(!RuleSet::new().matches(&post("anything", Some("en"))));
    }
}
