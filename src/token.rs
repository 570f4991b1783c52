use lsp_types::Range;
use strum::AsRefStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum TokenKind {
  // catch-all for text that could not be classified
  Unknown,
  Eof,
  // user-defined symbols
  Identifier,
  Operator,
  // literals
  IntegerLit,
  FloatLit,
  StringLit,
  RawStringLit,
  // doc-comments participate in the token stream; plain comments do not
  DocString,
  Newline,
  // punctuation
  ParenLeft,
  ParenRight,
  BracketLeft,
  BracketRight,
  BraceLeft,
  BraceRight,
  GenericLeft,
  GenericRight,
  At,
  Comma,
  Period,
  Colon,
  Dollar,
  Backtick,
  // valid but as-of-yet unused symbols
  Reserved,
  // keywords
  Namespace,
  Pub,
  Unsafe,
  Const,
  Val,
  Var,
  Mut,
  Ref,
  Fn,
  Struct,
  Enum,
  Union,
  Trait,
  Is,
  If,
  Else,
  Loop,
  While,
  Until,
  For,
  In,
  Break,
  Continue,
  Return,
  As,
  Alias,
  Type,
}

/// A lexed token. `text` is a non-owning view into the source buffer;
/// `offset` is the byte position of that view, so later stages can splice
/// adjacent token texts back into one slice.
#[derive(Debug, Clone, Copy)]
pub struct Token<'src> {
  pub kind: TokenKind,
  pub range: Range,
  pub offset: usize,
  pub text: &'src [u8],
}

impl<'src> Token<'src> {
  pub fn end_offset(&self) -> usize {
    self.offset + self.text.len()
  }
}
