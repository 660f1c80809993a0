//! Condition symptom whitelists.
//!
//! Each medical condition maps to an ordered list of symptom phrases that a
//! persona with that condition may mention. The list for the active persona
//! is placed verbatim in every generation prompt, and replies that mention a
//! phrase belonging only to another condition are rejected by the generator.
//!
//! Tables are loaded once from a `condition,symptom` CSV. When the file is
//! missing or unreadable the built-in table is used instead.

use std::collections::HashMap;
use std::path::Path;

use crate::error::SymptomSourceError;

// ---------------------------------------------------------------------------
// Built-in table
// ---------------------------------------------------------------------------

const BUILTIN: &[(&str, &[&str])] = &[
    (
        "mild_dementia",
        &[
            "memory loss affecting daily activities",
            "difficulty with familiar tasks",
            "confusion with time or place",
            "trouble understanding visual images",
            "problems with words in speaking or writing",
        ],
    ),
    (
        "type_2_diabetes",
        &[
            "increased thirst and urination",
            "extreme fatigue",
            "blurred vision",
            "slow-healing sores",
            "frequent infections",
        ],
    ),
    (
        "mobility_issues",
        &[
            "difficulty walking or maintaining balance",
            "muscle weakness",
            "joint pain or stiffness",
            "fear of falling",
            "reduced range of motion",
        ],
    ),
];

/// Normalize a display condition name to a table key.
///
/// `"Mild Dementia"` becomes `"mild_dementia"`.
pub fn condition_key(condition: &str) -> String {
    condition
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

// ---------------------------------------------------------------------------
// SymptomAnchor
// ---------------------------------------------------------------------------

/// Immutable condition → symptom whitelist table.
#[derive(Debug, Clone)]
pub struct SymptomAnchor {
    table: HashMap<String, Vec<String>>,
    source: String,
}

impl SymptomAnchor {
    /// The built-in three-condition table.
    pub fn builtin() -> Self {
        let table = BUILTIN
            .iter()
            .map(|(condition, symptoms)| {
                (
                    condition.to_string(),
                    symptoms.iter().map(|s| s.to_string()).collect(),
                )
            })
            .collect();
        Self {
            table,
            source: "builtin".to_string(),
        }
    }

    /// Load from a CSV file, falling back to [`SymptomAnchor::builtin`].
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            log::info!("No symptom source configured, using built-in table");
            return Self::builtin();
        };

        match Self::from_csv_file(path) {
            Ok(anchor) => {
                log::info!(
                    "Loaded {} conditions from {}",
                    anchor.table.len(),
                    path.display()
                );
                anchor
            }
            Err(e) => {
                log::warn!(
                    "Failed to load symptom table from {}: {}. Using built-in table",
                    path.display(),
                    e
                );
                Self::builtin()
            }
        }
    }

    /// Read and parse a CSV file.
    pub fn from_csv_file(path: &Path) -> Result<Self, SymptomSourceError> {
        let content = std::fs::read_to_string(path)?;
        let mut anchor = Self::from_csv_str(&content)?;
        anchor.source = path.display().to_string();
        Ok(anchor)
    }

    /// Parse CSV text with a header containing `condition` and `symptom`.
    ///
    /// Extra columns are ignored. Duplicate symptoms for one condition are
    /// kept once, in first-seen order.
    pub fn from_csv_str(content: &str) -> Result<Self, SymptomSourceError> {
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        let header = lines.next().ok_or(SymptomSourceError::Empty)?;
        let columns: Vec<String> = parse_csv_line(header)
            .into_iter()
            .map(|c| c.trim().to_lowercase())
            .collect();

        let condition_col = columns
            .iter()
            .position(|c| c == "condition")
            .ok_or(SymptomSourceError::MissingColumn("condition"))?;
        let symptom_col = columns
            .iter()
            .position(|c| c == "symptom")
            .ok_or(SymptomSourceError::MissingColumn("symptom"))?;

        let mut table: HashMap<String, Vec<String>> = HashMap::new();
        for line in lines {
            let fields = parse_csv_line(line);
            let (Some(condition), Some(symptom)) =
                (fields.get(condition_col), fields.get(symptom_col))
            else {
                log::debug!("Skipping short symptom row: {}", line);
                continue;
            };
            let symptom = symptom.trim();
            if condition.trim().is_empty() || symptom.is_empty() {
                continue;
            }
            let entry = table.entry(condition_key(condition)).or_default();
            if !entry.iter().any(|s| s == symptom) {
                entry.push(symptom.to_string());
            }
        }

        if table.is_empty() {
            return Err(SymptomSourceError::Empty);
        }

        Ok(Self {
            table,
            source: "csv".to_string(),
        })
    }

    /// Whitelisted symptoms for a condition.
    ///
    /// Accepts either the display name or the normalized key. Unknown
    /// conditions get an empty list.
    pub fn symptoms_for(&self, condition: &str) -> &[String] {
        self.table
            .get(&condition_key(condition))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Normalized condition keys, sorted.
    pub fn conditions(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.table.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Where the table came from: `"builtin"` or a file path.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Symptom phrases of other conditions that are not also whitelisted
    /// for `condition`.
    pub fn foreign_symptoms(&self, condition: &str) -> Vec<&str> {
        let key = condition_key(condition);
        let own = self.symptoms_for(&key);
        let mut foreign: Vec<&str> = self
            .table
            .iter()
            .filter(|(k, _)| **k != key)
            .flat_map(|(_, symptoms)| symptoms.iter())
            .filter(|s| !own.iter().any(|o| o.eq_ignore_ascii_case(s)))
            .map(String::as_str)
            .collect();
        foreign.sort_unstable();
        foreign.dedup();
        foreign
    }

    /// First foreign symptom phrase mentioned in `text`, if any.
    pub fn find_foreign_claim(&self, text: &str, condition: &str) -> Option<String> {
        let lowered = text.to_lowercase();
        self.foreign_symptoms(condition)
            .into_iter()
            .find(|s| lowered.contains(&s.to_lowercase()))
            .map(str::to_string)
    }
}

impl Default for SymptomAnchor {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Split one CSV line, honoring double-quoted fields and `""` escapes.
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
