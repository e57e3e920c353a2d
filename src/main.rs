mod config;
mod quiz;

use std::sync::Arc;

use config::Config;
use dotenv::dotenv;
use log::{debug, error, info, warn};
use quiz::{
    loader,
    view::{self, Action},
    Quiz,
};
use teloxide::{
    dispatching::dialogue::InMemStorage,
    prelude::*,
    types::{ChatId, MessageId, ParseMode},
    utils::command::BotCommands,
};

type QuizDialogue = Dialogue<State, InMemStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    Quiz {
        quiz: Quiz,
        /// The message the quiz is drawn in. Buttons on older messages are stale.
        message_id: MessageId,
    },
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
enum Command {
    #[command(description = "start a new quiz")]
    Start,
    #[command(description = "show this text")]
    Help,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    pretty_env_logger::init();
    info!("Starting vocabulary quiz bot...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("Invalid configuration: {}", err);
            std::process::exit(1);
        }
    };
    info!(
        "Questions come from {} (timeout {:?}, reset on wrap: {}, malformed blocks: {:?})",
        config.questions, config.load_timeout, config.reset_on_wrap, config.block_policy
    );

    let bot = Bot::from_env();

    let message_handler = Update::filter_message()
        .enter_dialogue::<Message, InMemStorage<State>, State>()
        .branch(dptree::entry().filter_command::<Command>().endpoint(command))
        .branch(dptree::endpoint(text));

    let callback_handler = Update::filter_callback_query()
        .enter_dialogue::<CallbackQuery, InMemStorage<State>, State>()
        .endpoint(button);

    Dispatcher::builder(
        bot,
        dptree::entry()
            .branch(message_handler)
            .branch(callback_handler),
    )
    .dependencies(dptree::deps![InMemStorage::<State>::new(), Arc::new(config)])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;
}

const GREETING_TEXT: &str = "Hi! I quiz you on vocabulary: pick the word that fills the blank. Send /start to begin.";
const USE_BUTTONS_TEXT: &str = "Please answer with the buttons under the question, or send /start to begin again.";
const NO_QUIZ_TEXT: &str = "No quiz is running here. Send /start to begin.";
const STALE_QUIZ_TEXT: &str = "This quiz has ended, use the latest one.";

async fn command(
    bot: Bot,
    dialogue: QuizDialogue,
    config: Arc<Config>,
    msg: Message,
    cmd: Command,
) -> HandlerResult {
    match cmd {
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
        }
        Command::Start => start_quiz(bot, dialogue, config, msg.chat.id).await?,
    }
    Ok(())
}

async fn text(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    let reply = match dialogue.get().await? {
        Some(State::Quiz { .. }) => USE_BUTTONS_TEXT,
        _ => GREETING_TEXT,
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn start_quiz(
    bot: Bot,
    dialogue: QuizDialogue,
    config: Arc<Config>,
    chat_id: ChatId,
) -> HandlerResult {
    let mut quiz = Quiz::new(config.reset_on_wrap);
    let message = bot
        .send_message(chat_id, view::render(&quiz).text)
        .parse_mode(ParseMode::Html)
        .await?;

    load_questions(&mut quiz, &config).await;
    present(&bot, &dialogue, chat_id, message.id, quiz).await
}

async fn load_questions(quiz: &mut Quiz, config: &Config) {
    let result = loader::load(&config.questions, config.block_policy, config.load_timeout).await;
    if let Err(err) = &result {
        warn!("Failed to load questions from {}: {}", config.questions, err);
    }
    quiz.deliver(result);
}

async fn show(bot: &Bot, chat_id: ChatId, message_id: MessageId, quiz: &Quiz) -> HandlerResult {
    let view = view::render(quiz);
    bot.edit_message_text(chat_id, message_id, view.text)
        .parse_mode(ParseMode::Html)
        .reply_markup(view.keyboard)
        .await?;
    Ok(())
}

/// Saves `quiz` and draws it. A question Telegram refuses to display fails
/// the quiz, so the chat ends up with a Retry button instead of a stuck view.
async fn present(
    bot: &Bot,
    dialogue: &QuizDialogue,
    chat_id: ChatId,
    message_id: MessageId,
    mut quiz: Quiz,
) -> HandlerResult {
    dialogue
        .update(State::Quiz {
            quiz: quiz.clone(),
            message_id,
        })
        .await?;

    if let Err(err) = show(bot, chat_id, message_id, &quiz).await {
        warn!("Chat {}: could not show the quiz: {}", chat_id.0, err);
        if !quiz.fail(format!("the question could not be displayed: {}", err)) {
            return Err(err);
        }
        dialogue
            .update(State::Quiz {
                quiz: quiz.clone(),
                message_id,
            })
            .await?;
        show(bot, chat_id, message_id, &quiz).await?;
    }
    Ok(())
}

/// Where a button press lands, given the chat's state and the message it came from.
#[derive(Debug)]
enum ButtonTarget {
    Current { quiz: Quiz, message_id: MessageId },
    /// The press came from an older quiz message.
    Stale,
    NoQuiz,
}

fn button_target(state: Option<State>, pressed: MessageId) -> ButtonTarget {
    match state {
        Some(State::Quiz { quiz, message_id }) if message_id == pressed => {
            ButtonTarget::Current { quiz, message_id }
        }
        Some(State::Quiz { .. }) => ButtonTarget::Stale,
        _ => ButtonTarget::NoQuiz,
    }
}

async fn button(
    bot: Bot,
    dialogue: QuizDialogue,
    config: Arc<Config>,
    q: CallbackQuery,
) -> HandlerResult {
    let (Some(action), Some(message)) = (q.data.as_deref().and_then(Action::decode), q.message)
    else {
        bot.answer_callback_query(q.id).await?;
        return Ok(());
    };
    let chat_id = message.chat.id;

    let (mut quiz, message_id) = match button_target(dialogue.get().await?, message.id) {
        ButtonTarget::Current { quiz, message_id } => (quiz, message_id),
        ButtonTarget::Stale => {
            bot.answer_callback_query(q.id).text(STALE_QUIZ_TEXT).await?;
            return Ok(());
        }
        ButtonTarget::NoQuiz => {
            bot.answer_callback_query(q.id).await?;
            bot.send_message(chat_id, NO_QUIZ_TEXT).await?;
            return Ok(());
        }
    };
    bot.answer_callback_query(q.id).await?;

    let changed = match action {
        Action::Select(index) => quiz.select_option_at(index),
        Action::Next => quiz.advance(),
        Action::Translate => quiz.reveal_translation(),
        Action::Retry => {
            if quiz.retry() {
                show(&bot, chat_id, message_id, &quiz).await?;
                load_questions(&mut quiz, &config).await;
                true
            } else {
                false
            }
        }
    };
    debug!(
        "Chat {}: {:?} on question {} changed the quiz: {}",
        chat_id.0,
        action,
        quiz.current_index(),
        changed
    );

    if changed {
        present(&bot, &dialogue, chat_id, message_id, quiz).await?;
    }
    Ok(())
}
