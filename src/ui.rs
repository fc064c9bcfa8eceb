// UI layer: confirmation prompts and progress spinners.
//
// The cursor never reads the terminal itself. It asks a `Prompter`, so the
// CLI can plug in an interactive prompt (or an automatic answer with
// `--yes`) and tests can script the answer.

use std::io;
use std::time::Duration;

use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};

pub trait Prompter {
    /// Show `question` and return the raw answer.
    fn ask(&self, question: &str) -> io::Result<String>;
}

/// Prints the question and reads a line from the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn ask(&self, question: &str) -> io::Result<String> {
        println!("{}", question);
        Input::<String>::new()
            .with_prompt("Proceed? (y/n)")
            .allow_empty(true)
            .interact_text()
    }
}

/// Answers every question the same way, for non-interactive runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedAnswer(pub String);

impl FixedAnswer {
    pub fn yes() -> Self {
        FixedAnswer("y".into())
    }

    pub fn no() -> Self {
        FixedAnswer("n".into())
    }
}

impl Prompter for FixedAnswer {
    fn ask(&self, _question: &str) -> io::Result<String> {
        Ok(self.0.clone())
    }
}

/// Only `y` and `yes` (any case, surrounding whitespace ignored) proceed.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Run `work` while a spinner with `message` ticks on stderr.
pub fn with_spinner<T>(message: &str, work: impl FnOnce() -> T) -> T {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    let result = work();
    spinner.finish_and_clear();
    result
}

/// Scripted prompters for exercising confirmation flows.
#[doc(hidden)]
pub mod testing {
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    use super::Prompter;

    /// Replays a fixed answer and remembers every question. Clones share
    /// the question log, so a clone can be handed to a cursor.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingPrompter {
        answer: String,
        questions: Rc<RefCell<Vec<String>>>,
    }

    impl RecordingPrompter {
        pub fn new(answer: impl Into<String>) -> Self {
            RecordingPrompter {
                answer: answer.into(),
                questions: Rc::default(),
            }
        }

        pub fn questions(&self) -> Vec<String> {
            self.questions.borrow().clone()
        }
    }

    impl Prompter for RecordingPrompter {
        fn ask(&self, question: &str) -> io::Result<String> {
            self.questions.borrow_mut().push(question.to_string());
            Ok(self.answer.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_yes_answers_proceed() {
        for answer in ["y", "Y", "yes", "YES", " Yes \n"] {
            assert!(is_affirmative(answer), "{answer:?} should proceed");
        }
        for answer in ["n", "no", "", "yep", "ye", "y e s", "1"] {
            assert!(!is_affirmative(answer), "{answer:?} should not proceed");
        }
    }

    #[test]
    fn recording_prompter_keeps_questions() {
        let prompter = testing::RecordingPrompter::new("n");
        let handed_out = prompter.clone();
        assert_eq!(handed_out.ask("first?").unwrap(), "n");
        assert_eq!(prompter.ask("second?").unwrap(), "n");
        assert_eq!(prompter.questions(), vec!["first?", "second?"]);
    }

    #[test]
    fn spinner_returns_the_work_result() {
        assert_eq!(with_spinner("working", || 42), 42);
    }
}
