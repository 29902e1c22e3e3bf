//! Command handlers.
//!
//! Each handler takes the flag values clap parsed, prompts for whatever is
//! missing and calls the matching service. A user cancelling a prompt is not
//! an error: the handler prints a note and returns `Ok(())`.

pub mod doctor_handlers;
pub mod ec2_handlers;
pub mod menu;
pub mod route53_handlers;
pub mod s3_handlers;
pub mod tables;

use crate::{
    errors::AppResult,
    prompt::{Prompter, required_input},
};

/// Use the flag value when present, otherwise ask for it.
/// `None` means the user cancelled.
pub(crate) fn flag_or_prompt(
    prompter: &dyn Prompter,
    flag: Option<String>,
    prompt: &str,
) -> AppResult<Option<String>> {
    match flag.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(value) => Ok(Some(value)),
        None => required_input(prompter, prompt),
    }
}

/// Let the user pick one of `items`; `None` when the list is empty or the user backs out.
pub(crate) fn pick<'a, T>(
    prompter: &dyn Prompter,
    prompt: &str,
    items: &'a [T],
    label: impl Fn(&T) -> String,
) -> AppResult<Option<&'a T>> {
    if items.is_empty() {
        return Ok(None);
    }
    let labels: Vec<String> = items.iter().map(label).collect();
    Ok(prompter.select(prompt, &labels)?.and_then(|i| items.get(i)))
}

pub(crate) fn cancelled(what: &str) {
    println!("{what} cancelled.");
}
