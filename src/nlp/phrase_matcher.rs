use regex::RegexSet;
use tracing::warn;

/// Case-insensitive whole-phrase matcher over a fixed phrase list.
///
/// Each phrase is compiled as `\b<phrase>\b`, so a phrase never matches
/// inside a longer word ("bye" does not match "goodbye").
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    phrases: Vec<String>,
    set: RegexSet,
}

impl PhraseMatcher {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for p in phrases {
            let p: String = p.into();
            let p = p.trim().to_string();
            if p.is_empty() || unique.iter().any(|u| u.eq_ignore_ascii_case(&p)) {
                continue;
            }
            unique.push(p);
        }

        let patterns: Vec<String> = unique
            .iter()
            .map(|p| format!(r"(?i)\b{}\b", regex::escape(p)))
            .collect();

        // Escaped literals always compile; an empty set only happens if the
        // size limit is blown, in which case nothing matches.
        let set = RegexSet::new(&patterns).unwrap_or_else(|e| {
            warn!("phrase_matcher: failed to compile {} phrases: {}", patterns.len(), e);
            RegexSet::empty()
        });

        Self {
            phrases: unique,
            set,
        }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Phrases found in `text`, in phrase-list order.
    pub fn matches(&self, text: &str) -> Vec<String> {
        self.set
            .matches(text)
            .iter()
            .map(|i| self.phrases[i].clone())
            .collect()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.set.is_match(text)
    }
}
