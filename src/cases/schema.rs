use serde::{Deserialize, Serialize};

/// On-disk shape of a test file (JSON or YAML). Keys outside this set
/// (`$schema`, `tags`, ...) are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaseFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub expected_results: Vec<String>,
    #[serde(default)]
    pub preconditions: Option<Vec<String>>,
    #[serde(default)]
    pub cleanup: Option<CleanupOptions>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CleanupOptions {
    #[serde(default)]
    pub cookies: bool,
    #[serde(default)]
    pub local_storage: bool,
    #[serde(default)]
    pub session_storage: bool,
}

impl CleanupOptions {
    pub fn is_empty(&self) -> bool {
        !(self.cookies || self.local_storage || self.session_storage)
    }
}

/// A validated test case. Constructed only by the loader, so `steps` and
/// `expected_results` are never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub steps: Vec<String>,
    pub expected_results: Vec<String>,
    pub preconditions: Vec<String>,
    pub cleanup: Option<CleanupOptions>,
    pub path: String,
    pub file_hash_hex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaseValidationError {
    #[error("test file must have a non-empty \"{0}\" field")]
    MissingField(&'static str),
    #[error("\"{field}\" entry {index} must not be empty")]
    EmptyEntry { field: &'static str, index: usize },
}

pub fn validate_case_file(f: &CaseFile) -> Result<(), CaseValidationError> {
    if f.name.trim().is_empty() {
        return Err(CaseValidationError::MissingField("name"));
    }
    if f.url.trim().is_empty() {
        return Err(CaseValidationError::MissingField("url"));
    }
    if f.steps.is_empty() {
        return Err(CaseValidationError::MissingField("steps"));
    }
    if f.expected_results.is_empty() {
        return Err(CaseValidationError::MissingField("expectedResults"));
    }
    let lists = [
        ("steps", f.steps.as_slice()),
        ("expectedResults", f.expected_results.as_slice()),
        ("preconditions", f.preconditions.as_deref().unwrap_or_default()),
    ];
    for (field, entries) in lists {
        if let Some(index) = entries.iter().position(|s| s.trim().is_empty()) {
            return Err(CaseValidationError::EmptyEntry {
                field,
                index: index + 1,
            });
        }
    }
    Ok(())
}

impl TestCase {
    /// First 12 hex digits of the file hash, enough to tell edits apart.
    pub fn short_hash(&self) -> &str {
        self.file_hash_hex
            .get(..12)
            .unwrap_or(self.file_hash_hex.as_str())
    }

    pub fn from_file(f: CaseFile, path: String, file_hash_hex: String) -> Self {
        Self {
            name: f.name.trim().to_string(),
            description: f.description.filter(|d| !d.trim().is_empty()),
            url: f.url.trim().to_string(),
            steps: f.steps,
            expected_results: f.expected_results,
            preconditions: f.preconditions.unwrap_or_default(),
            cleanup: f.cleanup.filter(|c| !c.is_empty()),
            path,
            file_hash_hex,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_case_file, CaseFile, CaseValidationError, CleanupOptions, TestCase};

    fn valid() -> CaseFile {
        CaseFile {
            name: "Login".to_string(),
            url: "https://x".to_string(),
            steps: vec!["click login".to_string()],
            expected_results: vec!["dashboard visible".to_string()],
            ..CaseFile::default()
        }
    }

    #[test]
    fn missing_fields_are_named() {
        let mut f = valid();
        f.expected_results.clear();
        assert_eq!(
            validate_case_file(&f),
            Err(CaseValidationError::MissingField("expectedResults"))
        );
        let mut f = valid();
        f.url = "  ".to_string();
        assert_eq!(
            validate_case_file(&f),
            Err(CaseValidationError::MissingField("url"))
        );
    }

    #[test]
    fn blank_step_is_reported_with_position() {
        let mut f = valid();
        f.steps.push(" ".to_string());
        assert_eq!(
            validate_case_file(&f),
            Err(CaseValidationError::EmptyEntry {
                field: "steps",
                index: 2
            })
        );
    }

    #[test]
    fn all_false_cleanup_is_dropped() {
        let mut f = valid();
        f.cleanup = Some(CleanupOptions::default());
        let case = TestCase::from_file(f, "t.json".to_string(), String::new());
        assert!(case.cleanup.is_none());
    }

    #[test]
    fn extra_keys_are_ignored() {
        let f: CaseFile = serde_json::from_str(
            r#"{"$schema":"./schema.json","id":"T-1","name":"n","url":"u","steps":["s"],"expectedResults":["e"],"tags":["smoke"],"cleanup":{"cookies":true,"indexedDb":true}}"#,
        )
        .expect("parse");
        assert_eq!(validate_case_file(&f), Ok(()));
        assert!(f.cleanup.is_some_and(|c| c.cookies));
    }

    #[test]
    fn short_hash_truncates_digest() {
        let case = TestCase::from_file(valid(), "t.json".to_string(), "ab".repeat(32));
        assert_eq!(case.short_hash(), "abababababab");
        let case = TestCase::from_file(valid(), "t.json".to_string(), "abc".to_string());
        assert_eq!(case.short_hash(), "abc");
    }

    #[test]
    fn camel_case_fields_deserialize() {
        let f: CaseFile = serde_json::from_str(
            r#"{"name":"n","url":"u","steps":["s"],"expectedResults":["e"],"cleanup":{"localStorage":true}}"#,
        )
        .expect("parse");
        assert_eq!(f.expected_results, vec!["e".to_string()]);
        assert_eq!(
            f.cleanup,
            Some(CleanupOptions {
                cookies: false,
                local_storage: true,
                session_storage: false
            })
        );
    }
}
