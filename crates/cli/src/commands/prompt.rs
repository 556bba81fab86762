//! Conflict prompt for the terminal
//!
//! The engine asks through a [`ChannelPrompt`]; a dedicated thread drains
//! the questions and reads the answers from the terminal, so the async
//! runtime never blocks on stdin.

use std::io::IsTerminal;

use clap::ValueEnum;
use console::{Term, style};
use relo_core::config::Defaults;
use relo_core::{
    ChannelPrompt, ConflictAction, ConflictDecision, ConflictPrompt, ConflictQuery, FixedPolicy,
    Result,
};
use tokio::sync::mpsc;

use crate::output::Formatter;

/// Value of `--on-conflict`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnConflict {
    /// Ask for every collision
    Ask,
    Overwrite,
    Skip,
    Rename,
}

impl OnConflict {
    fn action(self) -> Option<ConflictAction> {
        match self {
            Self::Ask => None,
            Self::Overwrite => Some(ConflictAction::Overwrite),
            Self::Skip => Some(ConflictAction::Skip),
            Self::Rename => Some(ConflictAction::Rename),
        }
    }
}

/// Pick how collisions get settled for this invocation
///
/// An explicit `--on-conflict` wins, then a fixed `conflict` default from
/// the config. Otherwise the user is asked when stdin is a terminal, and
/// every collision is skipped when it is not.
pub fn conflict_prompt(
    explicit: Option<OnConflict>,
    defaults: &Defaults,
    formatter: &Formatter,
) -> Result<Box<dyn ConflictPrompt>> {
    let fixed = match explicit {
        Some(choice) => choice.action(),
        None => defaults.conflict_policy()?,
    };
    if let Some(action) = fixed {
        return Ok(Box::new(FixedPolicy(action)));
    }
    if std::io::stdin().is_terminal() {
        return Ok(Box::new(terminal_prompt()));
    }
    formatter.warning("not a terminal, name collisions will be skipped (see --on-conflict)");
    Ok(Box::new(FixedPolicy(ConflictAction::Skip)))
}

fn terminal_prompt() -> ChannelPrompt {
    let (prompt, queries) = ChannelPrompt::new(1);
    std::thread::spawn(move || answer_queries(queries, &Term::stderr()));
    prompt
}

fn answer_queries(mut queries: mpsc::Receiver<ConflictQuery>, term: &Term) {
    while let Some(query) = queries.blocking_recv() {
        let decision = ask(term, &query.name, query.is_batch);
        if query.reply.send(decision).is_err() {
            tracing::debug!(name = %query.name, "conflict answer arrived after the engine gave up");
        }
    }
}

fn ask(term: &Term, name: &str, is_batch: bool) -> ConflictDecision {
    loop {
        let question = format!(
            "{} '{name}' already exists. [o]verwrite, [S]kip or [r]ename? ",
            style("?").yellow()
        );
        let Some(answer) = read_answer(term, &question) else {
            return ConflictDecision::once(ConflictAction::Skip);
        };
        let action = match parse_action(&answer) {
            Some(action) => action,
            None => continue,
        };
        if !is_batch {
            return ConflictDecision::once(action);
        }
        let all = read_answer(term, "  Apply to every remaining collision? [y/N] ")
            .is_some_and(|a| a.eq_ignore_ascii_case("y") || a.eq_ignore_ascii_case("yes"));
        return if all {
            ConflictDecision::for_all(action)
        } else {
            ConflictDecision::once(action)
        };
    }
}

/// Empty input takes the default (skip); unknown input asks again
fn parse_action(answer: &str) -> Option<ConflictAction> {
    if answer.is_empty() {
        return Some(ConflictAction::Skip);
    }
    answer.parse().ok()
}

fn read_answer(term: &Term, question: &str) -> Option<String> {
    term.write_str(question).ok()?;
    term.read_line().ok().map(|line| line.trim().to_string())
}
