use serde::{Deserialize, Serialize};
use validator::Validate;

/// A support issue as recorded in the issue export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Issue {
    /// Short summary
    pub title: String,

    /// Free-form description
    pub description: String,

    /// Workflow status at export time
    pub status: String,

    /// Person who resolved the issue
    pub fixer_name: String,

    /// Contact address of the fixer
    pub fixer_email: String,
}

/// Row the fixer classifier is trained on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingInput {
    pub title: String,
    pub description: String,
    pub fixer: String,
}

impl From<&Issue> for TrainingInput {
    fn from(issue: &Issue) -> Self {
        Self {
            title: issue.title.clone(),
            description: issue.description.clone(),
            fixer: issue.fixer_name.clone(),
        }
    }
}

impl From<Issue> for TrainingInput {
    fn from(issue: Issue) -> Self {
        Self {
            title: issue.title,
            description: issue.description,
            fixer: issue.fixer_name,
        }
    }
}

/// A new issue to route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct IssueQuery {
    /// Human-readable title
    #[validate(length(min = 1))]
    pub title: String,

    /// Detailed description, may be empty
    pub description: String,
}

impl IssueQuery {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

/// One ranked candidate fixer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// Classifier output for a single query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuePrediction {
    /// Label chosen by the classifier
    pub predicted_label: String,

    /// Every class, most confident first
    pub scores: Vec<LabelScore>,
}

impl IssuePrediction {
    /// Pair scores with their labels and rank them.
    ///
    /// Ties keep a stable order by label text so that identical models always
    /// render identical rankings.
    pub fn ranked(predicted_label: String, labels: &[String], scores: &[f32]) -> Self {
        let mut ranked: Vec<LabelScore> = labels
            .iter()
            .zip(scores.iter())
            .map(|(label, &score)| LabelScore {
                label: label.clone(),
                score,
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.label.cmp(&b.label))
        });

        Self {
            predicted_label,
            scores: ranked,
        }
    }

    /// The `k` most confident candidates
    pub fn top(&self, k: usize) -> &[LabelScore] {
        &self.scores[..k.min(self.scores.len())]
    }
}
