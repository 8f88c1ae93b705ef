use crate::dao::models::QuestionEntity;

/// Source of round questions.
pub trait QuestionSource: Send + Sync {
    /// Pick a question whose index is not in `used`, restricted to `categories` when the
    /// filter matches anything. Once all are used, continues after the last drawn one so
    /// callers can start a new cycle.
    fn get_question(&self, used: &[usize], categories: &[String]) -> Option<(usize, QuestionEntity)>;
}

/// Fixed, ordered catalogue. Draws are deterministic so every authority picks the same
/// question for the same record.
#[derive(Debug, Clone)]
pub struct Catalogue {
    questions: Vec<QuestionEntity>,
}

impl Catalogue {
    /// Catalogue drawing from `questions` in order.
    pub fn new(questions: Vec<QuestionEntity>) -> Self {
        Self { questions }
    }
}

impl QuestionSource for Catalogue {
    fn get_question(&self, used: &[usize], categories: &[String]) -> Option<(usize, QuestionEntity)> {
        let filtered: Vec<usize> = self
            .questions
            .iter()
            .enumerate()
            .filter(|(_, question)| categories.contains(&question.category))
            .map(|(index, _)| index)
            .collect();
        let candidates = if filtered.is_empty() {
            (0..self.questions.len()).collect()
        } else {
            filtered
        };
        if candidates.is_empty() {
            return None;
        }

        let index = match candidates.iter().copied().find(|index| !used.contains(index)) {
            Some(index) => index,
            None => {
                let after_last = used
                    .last()
                    .and_then(|last| candidates.iter().position(|index| index == last))
                    .map_or(0, |position| position + 1);
                candidates[after_last % candidates.len()]
            }
        };
        Some((index, self.questions[index].clone()))
    }
}
