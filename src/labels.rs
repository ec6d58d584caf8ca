use std::{collections::BTreeMap, fs, path::Path};

use crate::errors::{DashboardError, Result};

/// Class index to human-readable label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    names: BTreeMap<usize, String>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class_id: usize, label: impl Into<String>) {
        self.names.insert(class_id, label.into());
    }

    /// Label for `class_id`, or `class_{id}` when the model did not name it.
    pub fn label(&self, class_id: usize) -> String {
        self.names
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Reads a label file with one class name per line; blank lines are skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| DashboardError::FileSystem {
            path: path.to_path_buf(),
            operation: "read label file".to_string(),
            source: e,
        })?;
        Ok(Self::from_lines(&text))
    }

    pub fn from_lines(text: &str) -> Self {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .enumerate()
            .collect()
    }

    /// Parses the `names` entry Ultralytics writes into exported model
    /// metadata, e.g. `{0: 'egg', 1: "larva"}`.
    pub fn from_metadata(text: &str) -> Result<Self> {
        let invalid = |reason: &str| DashboardError::Validation {
            field: "names metadata".to_string(),
            reason: reason.to_string(),
        };

        let body = text
            .trim()
            .strip_prefix('{')
            .and_then(|t| t.strip_suffix('}'))
            .ok_or_else(|| invalid("is not a {id: name} dictionary"))?;

        let mut labels = Self::new();
        let mut chars = body.chars().peekable();
        loop {
            while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
                chars.next();
            }
            if chars.peek().is_none() {
                break;
            }

            let mut key = String::new();
            while let Some(c) = chars.next_if(|c| *c != ':') {
                key.push(c);
            }
            if chars.next() != Some(':') {
                return Err(invalid("entry is missing ':'"));
            }
            let class_id: usize = key
                .trim()
                .parse()
                .map_err(|_| invalid("class id is not an integer"))?;

            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            let quote = match chars.next() {
                Some(q @ ('\'' | '"')) => q,
                _ => return Err(invalid("label is not quoted")),
            };
            let mut label = String::new();
            loop {
                match chars.next() {
                    Some('\\') => {
                        if let Some(escaped) = chars.next() {
                            label.push(escaped);
                        }
                    }
                    Some(c) if c == quote => break,
                    Some(c) => label.push(c),
                    None => return Err(invalid("label quote is not closed")),
                }
            }
            labels.insert(class_id, label);
        }

        Ok(labels)
    }
}

impl FromIterator<(usize, String)> for LabelMap {
    fn from_iter<I: IntoIterator<Item = (usize, String)>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<(usize, &'a str)> for LabelMap {
    fn from_iter<I: IntoIterator<Item = (usize, &'a str)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(id, name)| (id, name.to_string()))
            .collect()
    }
}
