//! Challenge policies.
//!
//! A subplebbit decides per publication which prompts to send and how
//! to grade the answers. Policy is pluggable; the node only relies on
//! the [`ChallengePolicy`] trait.

use plebwire_protocol::message::ChallengePrompt;
use plebwire_protocol::publication::Publication;
use plebwire_protocol::record::ChallengeInfo;

/// Content type of plain-text prompts.
pub const TEXT_PLAIN: &str = "text/plain";

/// Grading of a set of answers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeResult {
    pub success: bool,
    /// One slot per prompt, `Some(reason)` where the answer was wrong.
    pub errors: Vec<Option<String>>,
}

impl ChallengeResult {
    pub fn passed(count: usize) -> Self {
        Self {
            success: true,
            errors: vec![None; count],
        }
    }
}

/// Decides which challenges a publication must pass.
pub trait ChallengePolicy: Send + Sync {
    /// Prompts for `publication`. Empty means accept without a challenge.
    fn challenges(&self, publication: &Publication) -> Vec<ChallengePrompt>;

    /// Grades `answers` against the prompts issued for `publication`.
    fn verify(&self, publication: &Publication, answers: &[String]) -> ChallengeResult;

    /// Public description advertised in the index record.
    fn describe(&self) -> Vec<ChallengeInfo>;
}

// ---------------------------------------------------------------------------
// TextMathChallenge
// ---------------------------------------------------------------------------

/// A single fixed question with an exact expected answer.
pub struct TextMathChallenge {
    question: String,
    answer: String,
}

impl TextMathChallenge {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

impl Default for TextMathChallenge {
    fn default() -> Self {
        Self::new("1+1=?", "2")
    }
}

impl ChallengePolicy for TextMathChallenge {
    fn challenges(&self, _publication: &Publication) -> Vec<ChallengePrompt> {
        vec![ChallengePrompt {
            challenge: self.question.clone(),
            kind: TEXT_PLAIN.into(),
        }]
    }

    fn verify(&self, _publication: &Publication, answers: &[String]) -> ChallengeResult {
        let correct = answers.len() == 1 && answers[0].trim() == self.answer;
        if correct {
            ChallengeResult::passed(1)
        } else {
            ChallengeResult {
                success: false,
                errors: vec![Some("wrong answer".into())],
            }
        }
    }

    fn describe(&self) -> Vec<ChallengeInfo> {
        vec![ChallengeInfo {
            kind: TEXT_PLAIN.into(),
            description: Some(format!("answer the question {}", self.question)),
        }]
    }
}

// ---------------------------------------------------------------------------
// NoChallenge
// ---------------------------------------------------------------------------

/// Accepts every valid publication immediately.
pub struct NoChallenge;

impl ChallengePolicy for NoChallenge {
    fn challenges(&self, _publication: &Publication) -> Vec<ChallengePrompt> {
        Vec::new()
    }

    fn verify(&self, _publication: &Publication, _answers: &[String]) -> ChallengeResult {
        ChallengeResult::passed(0)
    }

    fn describe(&self) -> Vec<ChallengeInfo> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plebwire_protocol::publication::{Author, Vote};
    use plebwire_types::{Address, ContentId, Timestamp};

    fn publication() -> Publication {
        Publication::Vote(Vote::new(
            Address::new([1; 32]),
            Author::new(Address::new([2; 32])),
            Timestamp::from_secs(1),
            "1.0.0",
            ContentId::from_bytes([3; 32]),
            1,
        ))
    }

    #[test]
    fn math_challenge_grades_answers() {
        let policy = TextMathChallenge::default();
        let p = publication();
        let prompts = policy.challenges(&p);
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].challenge, "1+1=?");
        assert_eq!(prompts[0].kind, TEXT_PLAIN);

        assert!(policy.verify(&p, &["2".into()]).success);
        assert!(policy.verify(&p, &[" 2 ".into()]).success);
        let wrong = policy.verify(&p, &["3".into()]);
        assert!(!wrong.success);
        assert_eq!(wrong.errors, vec![Some("wrong answer".to_string())]);
        assert!(!policy.verify(&p, &[]).success);
    }

    #[test]
    fn no_challenge_accepts() {
        let p = publication();
        assert!(NoChallenge.challenges(&p).is_empty());
        assert!(NoChallenge.verify(&p, &[]).success);
    }
}
