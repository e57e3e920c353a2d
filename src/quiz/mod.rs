pub mod loader;
pub mod view;

use loader::LoadError;

/// Marks the blank in both the sentence and its translation.
pub const PLACEHOLDER: &str = "___";

/// One fill-in-the-blank question, as parsed from a question bank block.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub sentence: String,
    pub translation: String,
    pub missing_word: String,
    pub missing_word_translation: String,
    pub options: Vec<String>,
}

impl Question {
    pub fn new(
        sentence: String,
        translation: String,
        missing_word: String,
        missing_word_translation: String,
        options: Vec<String>,
    ) -> Self {
        Self {
            sentence,
            translation,
            missing_word,
            missing_word_translation,
            options,
        }
    }

    pub fn is_answer(&self, option: &str) -> bool {
        option == self.missing_word
    }

    /// The translation with the blank filled by the translated missing word.
    pub fn filled_translation(&self) -> String {
        self.translation
            .replacen(PLACEHOLDER, &self.missing_word_translation, 1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Phase {
    #[default]
    Loading,
    Failed {
        reason: String,
    },
    Ready,
}

/// How an option button is shown for the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionMark {
    Correct,
    Incorrect,
    Neutral,
}

/// The quiz state of a single chat.
///
/// Fields only change through the transitions below. Every transition
/// returns `true` when it changed something, so callers know whether the
/// view has to be redrawn.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Quiz {
    phase: Phase,
    questions: Vec<Question>,
    current_question: usize,
    selected_option: Option<String>,
    is_correct: Option<bool>,
    score: u32,
    show_translation: bool,
    laps: u32,
    reset_on_wrap: bool,
}

impl Quiz {
    pub fn new(reset_on_wrap: bool) -> Self {
        Self {
            reset_on_wrap,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }

    pub fn current_index(&self) -> usize {
        self.current_question
    }

    pub fn current_question(&self) -> Option<&Question> {
        if !self.is_ready() {
            return None;
        }
        self.questions.get(self.current_question)
    }

    pub fn selected_option(&self) -> Option<&str> {
        self.selected_option.as_deref()
    }

    pub fn is_correct(&self) -> Option<bool> {
        self.is_correct
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn show_translation(&self) -> bool {
        self.show_translation
    }

    /// Completed traversals of the deck.
    pub fn laps(&self) -> u32 {
        self.laps
    }

    /// Options stop reacting once the current question has been answered.
    pub fn is_locked(&self) -> bool {
        self.selected_option.is_some()
    }

    /// Hands the result of a load to the quiz. Only meaningful while loading.
    pub fn deliver(&mut self, result: Result<Vec<Question>, LoadError>) -> bool {
        if self.phase != Phase::Loading {
            return false;
        }
        self.phase = match result {
            Ok(questions) if questions.is_empty() => Phase::Failed {
                reason: LoadError::Empty.to_string(),
            },
            Ok(questions) => {
                log::debug!("Quiz ready with {} questions", questions.len());
                self.questions = questions;
                self.current_question = 0;
                self.selected_option = None;
                self.is_correct = None;
                self.show_translation = false;
                Phase::Ready
            }
            Err(err) => Phase::Failed {
                reason: err.to_string(),
            },
        };
        true
    }

    /// Gives up on the current deck, e.g. when its question cannot be shown.
    /// Retrying afterwards loads the deck again.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if matches!(self.phase, Phase::Failed { .. }) {
            return false;
        }
        self.phase = Phase::Failed {
            reason: reason.into(),
        };
        self.questions.clear();
        self.current_question = 0;
        self.selected_option = None;
        self.is_correct = None;
        self.show_translation = false;
        true
    }

    /// Puts a failed quiz back into loading so the caller can fetch again.
    pub fn retry(&mut self) -> bool {
        if !matches!(self.phase, Phase::Failed { .. }) {
            return false;
        }
        self.phase = Phase::Loading;
        true
    }

    pub fn select_option(&mut self, option: &str) -> bool {
        if self.is_locked() {
            return false;
        }
        let Some(question) = self.current_question() else {
            return false;
        };
        if !question.options.iter().any(|o| o == option) {
            return false;
        }

        let correct = question.is_answer(option);
        self.selected_option = Some(option.to_string());
        self.is_correct = Some(correct);
        if correct {
            self.score += 1;
        }
        log::debug!(
            "Answered question {} with {:?} (correct: {})",
            self.current_question,
            option,
            correct
        );
        true
    }

    /// Selects the option at `index` of the current question.
    pub fn select_option_at(&mut self, index: usize) -> bool {
        let option = match self
            .current_question()
            .and_then(|question| question.options.get(index))
        {
            Some(option) => option.clone(),
            None => return false,
        };
        self.select_option(&option)
    }

    pub fn advance(&mut self) -> bool {
        if !self.is_ready() {
            return false;
        }
        self.selected_option = None;
        self.is_correct = None;
        self.show_translation = false;
        self.current_question = (self.current_question + 1) % self.questions.len();

        if self.current_question == 0 {
            self.laps += 1;
            if self.reset_on_wrap {
                self.score = 0;
            }
        }
        true
    }

    pub fn reveal_translation(&mut self) -> bool {
        if !self.is_ready() || self.show_translation {
            return false;
        }
        self.show_translation = true;
        true
    }

    /// The translation line. The answer is filled in only after an attempt,
    /// whether or not it was right.
    pub fn displayed_translation(&self) -> Option<String> {
        let question = self.current_question()?;
        if self.selected_option.is_some() {
            Some(question.filled_translation())
        } else {
            Some(question.translation.clone())
        }
    }

    pub fn option_mark(&self, option: &str) -> OptionMark {
        let (Some(selected), Some(question)) = (self.selected_option(), self.current_question())
        else {
            return OptionMark::Neutral;
        };
        if question.is_answer(option) {
            OptionMark::Correct
        } else if option == selected {
            OptionMark::Incorrect
        } else {
            OptionMark::Neutral
        }
    }

    /// `score/total`, as shown above the question.
    pub fn score_line(&self) -> String {
        format!("{}/{}", self.score, self.total())
    }
}
