#![allow(clippy::module_name_repetitions)]

//! Lexer and parser for the RPM console.
//!
//! The lexer uses `regal` to produce a bounded token stream, while the parser
//! composes `winnow` combinators over those tokens and walks the static
//! [`catalog`](super::catalog) to build structured command values.

use super::catalog::{self, ArgumentSpec, CommandTag, HelpTopics, Node, SubcommandBranch, SubcommandTag};
use core::fmt;
use core::ops::Range;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
#[allow(deprecated)]
use winnow::error::ErrorKind;
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::stream::Stream;

use crate::state::InstanceId;

/// Maximum number of tokens produced per console line.
pub const MAX_TOKENS: usize = 16;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;

/// Lexical token kinds recognized by the console grammar.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// Signed decimal literal, optionally with a fractional part.
    #[regex(r"-?[0-9]+(?:\.[0-9]+)?")]
    Number,
    /// Command keyword or parameter name (case-insensitive match performed later).
    #[regex(r"[A-Za-z][A-Za-z0-9_]*")]
    Ident,
    /// Equals sign for `NAME=VALUE` assignments.
    #[token("=")]
    Equals,
    /// Spaces and tabs between tokens.
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    /// Line terminator; any of CR, LF or CRLF.
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Catch-all for bytes the console does not understand.
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Lexed token with its byte range in the console line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

/// Fixed-capacity token storage for one console line.
pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

/// Lexer errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// Line holds more than [`MAX_TOKENS`] tokens.
    TooManyTokens { processed: usize },
    /// `regal` failed to rebuild the token cache.
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "too many tokens ({processed} > {MAX_TOKENS})")
            }
            LexError::Engine => f.write_str("lexer failure"),
        }
    }
}

/// Reasons a token stream does not form a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarErrorKind<'a> {
    UnexpectedToken {
        expected: &'static str,
        found: Option<TokenKind>,
        span: Range<usize>,
    },
    UnexpectedEnd {
        expected: &'static str,
    },
    InstanceOutOfRange {
        span: Range<usize>,
        lexeme: &'a str,
    },
    InvalidToken {
        span: Range<usize>,
        lexeme: &'a str,
    },
}

impl fmt::Display for GrammarErrorKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarErrorKind::UnexpectedToken {
                expected,
                found,
                span,
            } => write!(f, "expected {expected}, found {found:?} at {span:?}"),
            GrammarErrorKind::UnexpectedEnd { expected } => {
                write!(f, "unexpected end of input, expected {expected}")
            }
            GrammarErrorKind::InstanceOutOfRange { span, lexeme } => {
                write!(f, "instance `{lexeme}` out of range 1-4 at {span:?}")
            }
            GrammarErrorKind::InvalidToken { span, lexeme } => {
                write!(f, "unsupported token `{lexeme}` at {span:?}")
            }
        }
    }
}

/// Parser error carried through `winnow`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrammarError<'a> {
    pub kind: GrammarErrorKind<'a>,
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl<'a> GrammarError<'a> {
    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        GrammarError {
            kind: match token {
                Some(tok) => GrammarErrorKind::UnexpectedToken {
                    expected,
                    found: Some(tok.kind),
                    span: tok.span.clone(),
                },
                None => GrammarErrorKind::UnexpectedEnd { expected },
            },
        }
    }

    fn instance_out_of_range(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InstanceOutOfRange {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }

    fn invalid_token(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidToken {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }
}

type Input<'src, 'slice> = &'slice [Token<'src>];

#[allow(deprecated)]
impl<'src, 'slice> ParserError<Input<'src, 'slice>> for GrammarError<'src>
where
    'src: 'slice,
{
    fn from_error_kind(input: &Input<'src, 'slice>, _kind: ErrorKind) -> Self {
        GrammarError::unexpected("token", input.first())
    }

    fn append(
        self,
        _input: &Input<'src, 'slice>,
        _token_start: &<Input<'src, 'slice> as Stream>::Checkpoint,
        _kind: ErrorKind,
    ) -> Self {
        self
    }

    fn or(self, other: Self) -> Self {
        other
    }
}

/// Failure to turn a console line into a [`Command`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

/// Console commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Rpm(RpmCommand),
    Param(ParamCommand<'a>),
    Detect,
    Status,
    Help(HelpCommand<'a>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpmCommand {
    /// `None` lists every slot.
    pub instance: Option<InstanceId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamCommand<'a> {
    Show { name: Option<&'a str> },
    Set { name: &'a str, value: &'a str },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

fn parse_tokens_partial<'src, 'slice>(
    tokens: &'slice [Token<'src>],
) -> Result<(Command<'src>, &'slice [Token<'src>]), GrammarError<'src>>
where
    'src: 'slice,
{
    let mut input = tokens;
    match command().parse_next(&mut input) {
        Ok(cmd) => Ok((cmd, input)),
        Err(ErrMode::Backtrack(err) | ErrMode::Cut(err)) => Err(err),
        Err(ErrMode::Incomplete(_)) => Err(GrammarError::unexpected("token", input.first())),
    }
}

/// Splits a console line into tokens, dropping whitespace.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = TokenBuffer::new();

    for record in cache.tokens() {
        if record.skipped {
            continue;
        }

        let span = record.start..record.end;
        let lexeme = &line[span.clone()];
        push_token(&mut buffer, record.token, lexeme, span)?;
    }

    if let Some(partial) = partial.filter(|partial| !partial.fragment.is_empty()) {
        let start = partial.start;
        let span = start..start + partial.fragment.len();
        push_token(&mut buffer, TokenKind::Error, partial.fragment, span)?;
    }

    Ok(buffer)
}

fn push_token<'a>(
    buffer: &mut TokenBuffer<'a>,
    kind: TokenKind,
    lexeme: &'a str,
    span: Range<usize>,
) -> Result<(), LexError> {
    buffer
        .push(Token { kind, lexeme, span })
        .map_err(|_| LexError::TooManyTokens {
            processed: buffer.len() + 1,
        })
}

fn map_incremental_error(error: IncrementalError) -> LexError {
    match error {
        IncrementalError::TokenOverflow => LexError::TooManyTokens {
            processed: MAX_TOKENS,
        },
        _ => LexError::Engine,
    }
}

/// Parse a console command from the provided line.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    if let Some(token) = tokens.iter().find(|token| token.kind == TokenKind::Error) {
        return Err(ParseError::Grammar(GrammarError::invalid_token(token)));
    }

    let (command, mut rest) =
        parse_tokens_partial(tokens.as_slice()).map_err(ParseError::Grammar)?;

    while let Some((token, remaining)) = rest.split_first() {
        if token.kind == TokenKind::Eol {
            rest = remaining;
        } else {
            return Err(ParseError::Grammar(GrammarError::unexpected(
                "end of command",
                Some(token),
            )));
        }
    }

    Ok(command)
}

fn command<'src, 'slice>() -> impl Parser<Input<'src, 'slice>, Command<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let snapshot = *input;
        let command_token = expect_kind(TokenKind::Ident, "command keyword").parse_next(input)?;

        if let Some(spec) = catalog::find(command_token.lexeme) {
            let mut state = CommandState::new(spec.tag);
            parse_node(spec.grammar, input, &mut state)?;
            state.finish()
        } else {
            *input = snapshot;
            Err(ErrMode::Backtrack(GrammarError::unexpected(
                "command keyword",
                Some(&command_token),
            )))
        }
    }
}

fn parse_node<'src, 'slice>(
    node: &'static Node,
    input: &mut Input<'src, 'slice>,
    state: &mut CommandState<'src>,
) -> Result<(), ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    match node {
        Node::End => Ok(()),
        Node::Argument {
            spec,
            optional,
            next,
        } => {
            if *optional && at_end(input) {
                return Ok(());
            }
            parse_argument(*spec, input, state)?;
            parse_node(next, input, state)
        }
        Node::Subcommands(branches) => parse_subcommands(input, branches, state),
        Node::Topic { topics, next } => {
            parse_topic(*topics, input, state)?;
            parse_node(next, input, state)
        }
    }
}

fn at_end(input: &Input<'_, '_>) -> bool {
    input
        .first()
        .is_none_or(|token| token.kind == TokenKind::Eol)
}

fn parse_argument<'src, 'slice>(
    spec: ArgumentSpec,
    input: &mut Input<'src, 'slice>,
    state: &mut CommandState<'src>,
) -> Result<(), ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    match spec {
        ArgumentSpec::Instance => {
            let token = expect_kind(TokenKind::Number, "instance number").parse_next(input)?;
            let instance = parse_instance(&token).map_err(ErrMode::Cut)?;
            state.set_instance(instance);
            Ok(())
        }
        ArgumentSpec::ParamName => {
            let token = expect_kind(TokenKind::Ident, "parameter name").parse_next(input)?;
            state.set_param_name(token.lexeme);
            Ok(())
        }
        ArgumentSpec::Assignment => {
            let name = expect_kind(TokenKind::Ident, "parameter name").parse_next(input)?;
            let _ = expect_kind(TokenKind::Equals, "=").parse_next(input)?;
            let value = expect_kind(TokenKind::Number, "number").parse_next(input)?;
            state.set_assignment(name.lexeme, value.lexeme);
            Ok(())
        }
    }
}

fn parse_subcommands<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
    branches: &'static [SubcommandBranch],
    state: &mut CommandState<'src>,
) -> Result<(), ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    let expected = branches.first().map_or("subcommand", |branch| branch.name);

    match input.split_first() {
        Some((token, rest)) if token.kind == TokenKind::Ident => {
            if let Some(branch) = branches
                .iter()
                .find(|candidate| candidate.name.eq_ignore_ascii_case(token.lexeme))
            {
                *input = rest;
                state.set_subcommand(branch.tag);
                parse_node(branch.grammar, input, state)
            } else {
                Err(ErrMode::Backtrack(GrammarError::unexpected(
                    expected,
                    Some(token),
                )))
            }
        }
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            expected,
            Some(token),
        ))),
        None => Err(ErrMode::Backtrack(GrammarError::unexpected(expected, None))),
    }
}

fn parse_topic<'src, 'slice>(
    _topics: HelpTopics,
    input: &mut Input<'src, 'slice>,
    state: &mut CommandState<'src>,
) -> Result<(), ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    state.set_topic(None);

    match input.split_first() {
        Some((token, rest)) if token.kind == TokenKind::Ident => {
            state.set_topic(Some(token.lexeme));
            *input = rest;
            Ok(())
        }
        Some((token, _)) if token.kind == TokenKind::Eol => Ok(()),
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            "identifier",
            Some(token),
        ))),
        None => Ok(()),
    }
}

enum CommandState<'a> {
    Rpm {
        instance: Option<InstanceId>,
    },
    Param {
        subcommand: Option<SubcommandTag>,
        name: Option<&'a str>,
        value: Option<&'a str>,
    },
    Detect,
    Status,
    Help {
        topic: Option<&'a str>,
    },
}

impl<'a> CommandState<'a> {
    fn new(tag: CommandTag) -> Self {
        match tag {
            CommandTag::Rpm => CommandState::Rpm { instance: None },
            CommandTag::Param => CommandState::Param {
                subcommand: None,
                name: None,
                value: None,
            },
            CommandTag::Detect => CommandState::Detect,
            CommandTag::Status => CommandState::Status,
            CommandTag::Help => CommandState::Help { topic: None },
        }
    }

    fn set_instance(&mut self, id: InstanceId) {
        if let CommandState::Rpm { instance } = self {
            *instance = Some(id);
        }
    }

    fn set_subcommand(&mut self, tag: SubcommandTag) {
        if let CommandState::Param { subcommand, .. } = self {
            *subcommand = Some(tag);
        }
    }

    fn set_param_name(&mut self, lexeme: &'a str) {
        if let CommandState::Param { name, .. } = self {
            *name = Some(lexeme);
        }
    }

    fn set_assignment(&mut self, lexeme: &'a str, literal: &'a str) {
        if let CommandState::Param { name, value, .. } = self {
            *name = Some(lexeme);
            *value = Some(literal);
        }
    }

    fn set_topic(&mut self, topic: Option<&'a str>) {
        if let CommandState::Help { topic: slot } = self {
            *slot = topic;
        }
    }

    fn finish(self) -> Result<Command<'a>, ErrMode<GrammarError<'a>>> {
        match self {
            CommandState::Rpm { instance } => Ok(Command::Rpm(RpmCommand { instance })),
            CommandState::Param {
                subcommand: Some(SubcommandTag::ParamShow),
                name,
                ..
            } => Ok(Command::Param(ParamCommand::Show { name })),
            CommandState::Param {
                subcommand: Some(SubcommandTag::ParamSet),
                name: Some(name),
                value: Some(value),
            } => Ok(Command::Param(ParamCommand::Set { name, value })),
            CommandState::Param {
                subcommand: Some(SubcommandTag::ParamSet),
                ..
            } => Err(ErrMode::Backtrack(GrammarError::unexpected(
                "NAME=VALUE",
                None,
            ))),
            CommandState::Param {
                subcommand: None, ..
            } => Err(ErrMode::Backtrack(GrammarError::unexpected(
                "param subcommand",
                None,
            ))),
            CommandState::Detect => Ok(Command::Detect),
            CommandState::Status => Ok(Command::Status),
            CommandState::Help { topic } => Ok(Command::Help(HelpCommand { topic })),
        }
    }
}

fn expect_kind<'src, 'slice>(
    kind: TokenKind,
    label: &'static str,
) -> impl Parser<Input<'src, 'slice>, Token<'src>, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) if token.kind == kind => {
            *input = rest;
            Ok(token.clone())
        }
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            label,
            Some(token),
        ))),
        None => Err(ErrMode::Backtrack(GrammarError::unexpected(label, None))),
    }
}

/// Converts a one-based console instance number into a slot identifier.
fn parse_instance<'a>(token: &Token<'a>) -> Result<InstanceId, GrammarError<'a>> {
    token
        .lexeme
        .parse::<u8>()
        .ok()
        .and_then(|ordinal| ordinal.checked_sub(1))
        .and_then(InstanceId::new)
        .ok_or_else(|| GrammarError::instance_out_of_range(token))
}
