//! Lightweight REPL for the auditor CLI.
//!
//! Runs when no prompt is provided via `-e`. Commands:
//! - `/quit`, `/exit`, `/q` - Exit the REPL
//!
//! Any other input is submitted to the agent as a user message. History is
//! carried across submissions, so follow-up questions see earlier answers.

use std::io::{self, BufRead, Write};

use anyhow::Result;

use auditor_agent::Session;

/// REPL command variants.
#[derive(Debug, Clone, PartialEq)]
enum ReplCommand {
    Quit,
    Prompt(String),
    Empty,
}

impl ReplCommand {
    fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return ReplCommand::Empty;
        }
        if let Some(command) = trimmed.strip_prefix('/') {
            let lower = command.to_lowercase();
            if lower == "quit" || lower == "exit" || lower == "q" {
                return ReplCommand::Quit;
            }
        }
        ReplCommand::Prompt(trimmed.to_string())
    }
}

/// Submit one prompt and print the final answer.
pub async fn execute_once(session: &mut Session, prompt: &str) -> Result<()> {
    let answer = session.submit(prompt).await?;
    println!("{answer}");
    Ok(())
}

/// Interactive loop over stdin lines until EOF or `/quit`.
pub async fn run_repl(session: &mut Session) -> Result<()> {
    println!("Local security auditor. Ask about your system; /quit to exit.");

    let stdin = io::stdin();
    loop {
        print!("auditor> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }

        match ReplCommand::parse(&line) {
            ReplCommand::Empty => continue,
            ReplCommand::Quit => break,
            ReplCommand::Prompt(prompt) => match session.submit(&prompt).await {
                Ok(answer) => println!("{answer}\n"),
                // A failed turn does not end the REPL.
                Err(e) => eprintln!("turn failed: {e}"),
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quit_variants() {
        assert_eq!(ReplCommand::parse("/quit"), ReplCommand::Quit);
        assert_eq!(ReplCommand::parse("/EXIT"), ReplCommand::Quit);
        assert_eq!(ReplCommand::parse(" /q "), ReplCommand::Quit);
    }

    #[test]
    fn test_parse_prompt_and_empty() {
        assert_eq!(
            ReplCommand::parse("check open ports\n"),
            ReplCommand::Prompt("check open ports".into())
        );
        assert_eq!(ReplCommand::parse("   \n"), ReplCommand::Empty);
    }
}
