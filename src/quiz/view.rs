use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use teloxide::utils::html;

use crate::quiz::{OptionMark, Phase, Quiz};

pub const TITLE: &str = "Fill in the Blank Vocabulary Quiz";
pub const NEXT_BUTTON: &str = "Next Question";
pub const TRANSLATE_BUTTON: &str = "Show Translation";
pub const RETRY_BUTTON: &str = "Retry";

/// What a button press asks the quiz to do. Encoded into the callback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Select(usize),
    Next,
    Translate,
    Retry,
}

impl Action {
    pub fn encode(&self) -> String {
        match self {
            Action::Select(index) => format!("opt:{}", index),
            Action::Next => "next".to_string(),
            Action::Translate => "translate".to_string(),
            Action::Retry => "retry".to_string(),
        }
    }

    pub fn decode(data: &str) -> Option<Self> {
        match data {
            "next" => Some(Action::Next),
            "translate" => Some(Action::Translate),
            "retry" => Some(Action::Retry),
            _ => data
                .strip_prefix("opt:")
                .and_then(|index| index.parse().ok())
                .map(Action::Select),
        }
    }

    fn button(self, text: impl Into<String>) -> InlineKeyboardButton {
        InlineKeyboardButton::callback(text, self.encode())
    }
}

/// A rendered quiz message: HTML text plus its inline keyboard.
#[derive(Debug, Clone)]
pub struct View {
    pub text: String,
    pub keyboard: InlineKeyboardMarkup,
}

pub fn render(quiz: &Quiz) -> View {
    match quiz.phase() {
        Phase::Loading => View {
            text: "Loading...".to_string(),
            keyboard: InlineKeyboardMarkup::default(),
        },
        Phase::Failed { reason } => View {
            text: format!(
                "Could not load the questions.\n<i>{}</i>",
                html::escape(reason)
            ),
            keyboard: InlineKeyboardMarkup::new(vec![vec![Action::Retry.button(RETRY_BUTTON)]]),
        },
        Phase::Ready => render_question(quiz),
    }
}

fn render_question(quiz: &Quiz) -> View {
    let Some(question) = quiz.current_question() else {
        return View {
            text: "Loading...".to_string(),
            keyboard: InlineKeyboardMarkup::default(),
        };
    };

    let mut text = format!("<b>{}</b>\n<b>Score:</b> {}", TITLE, quiz.score_line());
    if quiz.laps() > 0 {
        text.push_str(&format!(" (lap {})", quiz.laps() + 1));
    }
    text.push_str(&format!("\n\n<b>{}</b>", html::escape(&question.sentence)));

    match quiz.is_correct() {
        Some(true) => text.push_str("\n\nCorrect!"),
        Some(false) => text.push_str("\n\nWrong!"),
        None => {}
    }
    if quiz.show_translation() {
        if let Some(translation) = quiz.displayed_translation() {
            text.push_str(&format!("\n\n<i>{}</i>", html::escape(&translation)));
        }
    }

    let mut rows: Vec<Vec<InlineKeyboardButton>> = question
        .options
        .iter()
        .enumerate()
        .map(|(index, option)| vec![Action::Select(index).button(option_label(quiz, option))])
        .collect();
    if quiz.is_locked() {
        rows.push(vec![Action::Next.button(NEXT_BUTTON)]);
    }
    rows.push(vec![Action::Translate.button(TRANSLATE_BUTTON)]);

    View {
        text,
        keyboard: InlineKeyboardMarkup::new(rows),
    }
}

fn option_label(quiz: &Quiz, option: &str) -> String {
    match quiz.option_mark(option) {
        OptionMark::Correct => format!("✅ {}", option),
        OptionMark::Incorrect => format!("❌ {}", option),
        OptionMark::Neutral => option.to_string(),
    }
}
