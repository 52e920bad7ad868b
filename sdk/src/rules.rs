use {
    regex::Regex,
    serde::{Deserialize, Serialize},
};

/// A single exclude rule, matched against file and directory names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    NameEquals(String),
    NameMatches(#[serde(with = "serde_regex")] Regex),
}

/// Exclude rules applied while scanning a directory for encryption.
///
/// A name matched by any rule is skipped, including whole directories.
/// Restore passes never consult rules: everything the manifest maps is
/// brought back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rules(pub Vec<Rule>);

impl Rules {
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self(rules)
    }

    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.0.iter().any(|rule| match rule {
            Rule::NameEquals(needle) => name == needle,
            Rule::NameMatches(regex) => regex.is_match(name),
        })
    }
}
