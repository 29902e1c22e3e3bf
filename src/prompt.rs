//! Interactive prompts.
//!
//! Handlers only talk to the [`Prompter`] trait; the terminal implementation
//! is backed by `dialoguer` and tests drive the same flows with a scripted one.

use crate::errors::AppResult;
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};

pub trait Prompter: Send + Sync {
    /// Pick one of `items`. `None` means the user backed out (Esc / q).
    fn select(&self, prompt: &str, items: &[String]) -> AppResult<Option<usize>>;

    /// Free-text answer, trimmed. An empty answer returns `default` when given.
    fn input(&self, prompt: &str, default: Option<&str>) -> AppResult<String>;

    /// Yes/no question that defaults to "no".
    fn confirm(&self, prompt: &str) -> AppResult<bool>;
}

pub struct TerminalPrompter {
    theme: ColorfulTheme,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Prompter for TerminalPrompter {
    fn select(&self, prompt: &str, items: &[String]) -> AppResult<Option<usize>> {
        if items.is_empty() {
            return Ok(None);
        }
        Ok(Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(items)
            .default(0)
            .interact_opt()?)
    }

    fn input(&self, prompt: &str, default: Option<&str>) -> AppResult<String> {
        let mut input = Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty(true);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        Ok(input.interact_text()?.trim().to_string())
    }

    fn confirm(&self, prompt: &str) -> AppResult<bool> {
        Ok(Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(false)
            .interact()?)
    }
}

/// Ask for a value until it is non-empty; `None` when the user types `q`.
pub fn required_input(prompter: &dyn Prompter, prompt: &str) -> AppResult<Option<String>> {
    loop {
        let value = prompter.input(&format!("{prompt} (q to cancel)"), None)?;
        if value.eq_ignore_ascii_case("q") {
            return Ok(None);
        }
        if !value.is_empty() {
            return Ok(Some(value));
        }
        println!("A value is required.");
    }
}
