// src/core/syntax.rs

//! Parsing of POSIX shell source into the `brush_parser` syntax tree the
//! interpreter walks.

use brush_parser::ast;
use brush_parser::{Parser, ParserOptions, SourceInfo};
use std::io::Cursor;
use thiserror::Error;

/// A script that could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SyntaxError {
    /// The parser's description of the problem.
    pub message: String,
}

/// Parses `script` into a program of complete commands.
///
/// Nothing is expanded or executed here; words keep their raw source text,
/// quotes included.
pub fn parse(script: &str) -> Result<ast::Program, SyntaxError> {
    // The grammar wants every command terminated.
    let source = format!("{}\n", script);
    let mut parser = Parser::new(
        Cursor::new(source),
        &ParserOptions::default(),
        &SourceInfo::default(),
    );
    parser.parse_program().map_err(|e| SyntaxError {
        message: format!("{:?}", e),
    })
}

/// Parses the body of an arithmetic expansion or `(( ))` command.
pub fn parse_arithmetic(expr: &str) -> Result<ast::ArithmeticExpr, SyntaxError> {
    brush_parser::arithmetic::parse(expr.trim()).map_err(|e| SyntaxError {
        message: format!("arithmetic: {:?}", e),
    })
}

/// The source text of every simple command in `program`, in order. Commands
/// inside compound commands and function bodies are included.
pub fn simple_commands(program: &ast::Program) -> Vec<String> {
    let mut found = Vec::new();
    for list in &program.complete_commands {
        collect_list(list, &mut found);
    }
    found
}

fn collect_list(list: &ast::CompoundList, found: &mut Vec<String>) {
    for ast::CompoundListItem(and_or, _) in &list.0 {
        let rest = and_or.additional.iter().map(|next| match next {
            ast::AndOr::And(pipeline) | ast::AndOr::Or(pipeline) => pipeline,
        });
        for pipeline in std::iter::once(&and_or.first).chain(rest) {
            for command in &pipeline.seq {
                collect_command(command, found);
            }
        }
    }
}

fn collect_command(command: &ast::Command, found: &mut Vec<String>) {
    match command {
        ast::Command::Simple(simple) => found.push(simple.to_string()),
        ast::Command::Compound(compound, _) => collect_compound(compound, found),
        ast::Command::Function(definition) => collect_compound(&definition.body.0, found),
        ast::Command::ExtendedTest(_) => {}
    }
}

fn collect_compound(compound: &ast::CompoundCommand, found: &mut Vec<String>) {
    match compound {
        ast::CompoundCommand::BraceGroup(group) => collect_list(&group.list, found),
        ast::CompoundCommand::Subshell(subshell) => collect_list(&subshell.list, found),
        ast::CompoundCommand::ForClause(clause) => collect_list(&clause.body.list, found),
        ast::CompoundCommand::ArithmeticForClause(clause) => {
            collect_list(&clause.body.list, found);
        }
        ast::CompoundCommand::WhileClause(clause) | ast::CompoundCommand::UntilClause(clause) => {
            collect_list(&clause.0, found);
            collect_list(&clause.1.list, found);
        }
        ast::CompoundCommand::IfClause(clause) => {
            collect_list(&clause.condition, found);
            collect_list(&clause.then, found);
            for branch in clause.elses.iter().flatten() {
                if let Some(condition) = &branch.condition {
                    collect_list(condition, found);
                }
                collect_list(&branch.body, found);
            }
        }
        ast::CompoundCommand::CaseClause(clause) => {
            for case in &clause.cases {
                if let Some(list) = &case.cmd {
                    collect_list(list, found);
                }
            }
        }
        ast::CompoundCommand::Arithmetic(_) => {}
    }
}
