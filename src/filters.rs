//! Filter inputs and rule compilation.
//!
//! Three flat input files narrow the stream: keywords, user IDs, and GeoJSON
//! bounding boxes. Each category compiles into OR-joined filtered-stream
//! rules tagged with the category name.

use std::path::Path;

use crate::error::{StreamFilterError, StreamResult};
use crate::geo::BoundingBox;
use crate::types::StreamRule;

/// The platform caps a single rule value at 512 characters.
const MAX_RULE_LEN: usize = 512;

/// Read a newline-separated file, dropping blank lines and surrounding
/// whitespace.
pub fn read_lines(path: &Path) -> StreamResult<Vec<String>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

/// Read a file of numeric user IDs, one per line.
pub fn read_user_ids(path: &Path) -> StreamResult<Vec<u64>> {
    read_lines(path)?
        .iter()
        .enumerate()
        .map(|(i, line)| {
            line.parse().map_err(|_| {
                StreamFilterError::Filter(format!(
                    "user ID on line {} is not numeric: {line:?}",
                    i + 1
                ))
            })
        })
        .collect()
}

/// The full set of filter criteria supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    pub keywords: Vec<String>,
    pub user_ids: Vec<u64>,
    pub bounding_boxes: Vec<BoundingBox>,
}

impl FilterSet {
    /// True when no filter criteria were supplied at all, in which case the
    /// sampled stream is used instead of the filtered one.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.user_ids.is_empty() && self.bounding_boxes.is_empty()
    }

    /// Compile the criteria into server-side rules, one tagged rule per
    /// category. All clauses within a category are OR-joined; rules that
    /// would exceed the platform's length cap are split. A single clause
    /// that cannot fit under the cap on its own is an error.
    pub fn compile(&self) -> StreamResult<Vec<StreamRule>> {
        let mut rules = Vec::new();
        rules.extend(or_rules(
            self.keywords.iter().map(|k| quote_keyword(k)),
            "keywords",
        )?);
        rules.extend(or_rules(
            self.user_ids.iter().map(|id| format!("from:{id}")),
            "users",
        )?);
        rules.extend(or_rules(
            self.bounding_boxes.iter().map(BoundingBox::rule_clause),
            "bounds",
        )?);
        Ok(rules)
    }
}

/// Quote a keyword for the rule grammar when it contains whitespace, so a
/// multi-word keyword matches as a phrase.
fn quote_keyword(keyword: &str) -> String {
    if keyword.chars().any(char::is_whitespace) {
        format!("\"{keyword}\"")
    } else {
        keyword.to_owned()
    }
}

/// OR-join clauses into rules of at most `MAX_RULE_LEN` characters. The cap
/// is counted in characters, not bytes.
fn or_rules(clauses: impl Iterator<Item = String>, tag: &str) -> StreamResult<Vec<StreamRule>> {
    let mut rules = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for clause in clauses {
        let clause_chars = clause.chars().count();
        if clause_chars > MAX_RULE_LEN {
            return Err(StreamFilterError::Filter(format!(
                "{tag} clause is {clause_chars} characters, over the {MAX_RULE_LEN}-character rule cap"
            )));
        }

        // " OR " separator is 4 characters
        if current_chars != 0 && current_chars + 4 + clause_chars > MAX_RULE_LEN {
            rules.push(StreamRule::new(std::mem::take(&mut current), tag));
            current_chars = 0;
        }
        if current_chars != 0 {
            current.push_str(" OR ");
            current_chars += 4;
        }
        current.push_str(&clause);
        current_chars += clause_chars;
    }

    if !current.is_empty() {
        rules.push(StreamRule::new(current, tag));
    }
    Ok(rules)
}
