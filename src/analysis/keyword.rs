use crate::models::Verdict;

/// Case-insensitive substring filter. Relevant when any included term
/// matches and no excluded term does. Never fails, never comments.
#[derive(Debug, Clone, Default)]
pub struct KeywordAnalyzer {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl KeywordAnalyzer {
    pub fn new<I, S>(include: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let include = normalize_terms(include);
        if include.is_empty() {
            tracing::warn!("Keyword analyzer has no terms configured, nothing will be relevant");
        }
        Self {
            include,
            exclude: Vec::new(),
        }
    }

    pub fn with_exclusions<I, S>(mut self, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exclude = normalize_terms(exclude);
        self
    }

    pub fn evaluate(&self, text: &str) -> Verdict {
        let haystack = text.to_lowercase();

        if let Some(term) = self.exclude.iter().find(|t| haystack.contains(t.as_str())) {
            tracing::debug!(term = %term, "Excluded by keyword");
            return Verdict::irrelevant(None);
        }

        match self.include.iter().find(|t| haystack.contains(t.as_str())) {
            Some(term) => {
                tracing::debug!(term = %term, "Matched keyword");
                Verdict::relevant(None)
            }
            None => Verdict::irrelevant(None),
        }
    }
}

fn normalize_terms<I, S>(terms: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    terms
        .into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_any_term_case_insensitively() {
        let analyzer = KeywordAnalyzer::new(["election"]);
        let hit = analyzer.evaluate("New election results announced");
        assert!(hit.is_relevant);
        assert_eq!(hit.comment, None);
        assert!(!analyzer.evaluate("Weather today is sunny").is_relevant);
        assert!(analyzer.evaluate("ELECTIONS are coming").is_relevant);
    }

    #[test]
    fn exclusions_win_over_inclusions() {
        let analyzer = KeywordAnalyzer::new(["rust", "release"]).with_exclusions(["giveaway"]);
        assert!(analyzer.evaluate("Rust 1.90 release notes").is_relevant);
        assert!(!analyzer.evaluate("Rust release GIVEAWAY, retweet to win").is_relevant);
    }

    #[test]
    fn no_terms_means_nothing_is_relevant() {
        let analyzer = KeywordAnalyzer::new(Vec::<String>::new());
        assert!(!analyzer.evaluate("anything at all").is_relevant);
    }
}
