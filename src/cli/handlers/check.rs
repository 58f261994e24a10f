// src/cli/handlers/check.rs

//! `check`: judge every simple command against the policy without running it.

use crate::cli::args::CheckArgs;
use crate::cli::dispatcher::AppContext;
use crate::cli::handlers::commons::CliExit;
use crate::core::policy::BlockPolicy;
use crate::core::syntax;
use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

/// The outcome of checking one simple command without running it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Verdict {
    Allowed,
    Blocked,
    /// The name only exists after expansion; the policy sees it at run time.
    AtRunTime,
}

fn is_assignment(word: &str) -> bool {
    word.split_once('=').is_some_and(|(name, _)| {
        !name.is_empty()
            && !name.starts_with(|c: char| c.is_ascii_digit())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

fn judge(policy: &BlockPolicy, text: &str) -> Verdict {
    let words = shlex::split(text)
        .unwrap_or_else(|| text.split_whitespace().map(str::to_string).collect());
    let argv: Vec<String> = words.into_iter().skip_while(|w| is_assignment(w)).collect();
    let dynamic = argv.first().is_some_and(|name| name.contains(['$', '`']));
    if dynamic {
        Verdict::AtRunTime
    } else if policy.is_blocked(&argv) {
        Verdict::Blocked
    } else {
        Verdict::Allowed
    }
}

/// Main entry point for the 'check' action.
/// Prints the verdict of the configured block policy for every simple command
/// in the script, judged on its literal words. Nothing is executed.
pub fn handle(args: Vec<String>, app: &AppContext) -> Result<()> {
    let check_args = CheckArgs::try_parse_from(&args)?;
    let script = check_args.command.join(" ");
    let policy = app.config.block_policy();
    let program =
        syntax::parse(&script).with_context(|| format!("Could not parse '{}'", script))?;
    let commands = syntax::simple_commands(&program);

    println!(
        "Policy from '{}': {} predicate(s)",
        app.config_path.display().to_string().cyan(),
        policy.len()
    );

    let mut blocked = 0usize;
    for command in &commands {
        match judge(&policy, command) {
            Verdict::Allowed => println!("  {} {}", "allowed".green(), command),
            Verdict::Blocked => {
                blocked += 1;
                println!("  {} {}", "blocked".red().bold(), command);
            }
            Verdict::AtRunTime => println!("  {} {}", "at run time".yellow(), command),
        }
    }

    if blocked > 0 {
        println!(
            "\n{} of {} command(s) would be refused.",
            blocked,
            commands.len()
        );
        return Err(CliExit::Status(1).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::command_blocker;

    #[test]
    fn test_judge_uses_literal_words() {
        let policy = BlockPolicy::new(vec![command_blocker(["curl"])]);
        assert_eq!(judge(&policy, "curl -s http://x"), Verdict::Blocked);
        assert_eq!(judge(&policy, "echo curl"), Verdict::Allowed);
        assert_eq!(judge(&policy, "PROXY=1 curl x"), Verdict::Blocked);
        assert_eq!(judge(&policy, "$c http://x"), Verdict::AtRunTime);
        assert_eq!(judge(&policy, "\"$@\""), Verdict::AtRunTime);
    }
}
