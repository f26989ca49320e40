/// Outcome of a relevance check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub is_relevant: bool,
    pub comment: Option<String>,
}

impl Verdict {
    pub fn relevant(comment: Option<String>) -> Self {
        Self {
            is_relevant: true,
            comment,
        }
    }

    pub fn irrelevant(comment: Option<String>) -> Self {
        Self {
            is_relevant: false,
            comment,
        }
    }
}

impl Verdict {
    /// Text persisted as `analysis_result`. Verdicts without a comment store a
    /// marker so older readers can still tell irrelevant posts apart.
    pub fn stored_text(&self) -> String {
        match (&self.comment, self.is_relevant) {
            (Some(comment), _) => comment.clone(),
            (None, true) => "RELEVANT".to_string(),
            (None, false) => "NOT_RELEVANT".to_string(),
        }
    }
}
