use super::codereader::{CodeReader, Codepoint};
use super::dlogger::DiagnosticLogger;
use super::token::{Token, TokenKind};
use lsp_types::Range;
use peekmore::{PeekMore, PeekMoreIterator};

pub struct Tokenizer<'src> {
  // we need to peek deep into the codereader in order to figure out
  // what we're looking at
  source: PeekMoreIterator<CodeReader<'src>>,
  src: &'src [u8],
  dlogger: DiagnosticLogger,
  // one frame per open bracket; true means the frame was opened as a
  // generic argument list, so the next `>` closes it
  generic_stack: Vec<bool>,
  emitted_eof: bool,
}

pub fn tokenize<'src>(source: &'src [u8], dlogger: DiagnosticLogger) -> Tokenizer<'src> {
  Tokenizer {
    source: CodeReader::new(source).peekmore(),
    src: source,
    dlogger,
    generic_stack: vec![],
    emitted_eof: false,
  }
}

// lexes the whole buffer into a token vector ending with the eof sentinel
pub fn lex<'src>(source: &'src [u8], dlogger: DiagnosticLogger) -> Vec<Token<'src>> {
  tokenize(source, dlogger).collect()
}

fn is_ws_char(c: char) -> bool {
  matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_op_char(c: char) -> bool {
  matches!(
    c,
    '=' | '+' | '-' | '*' | '/' | '%' | '!' | '^' | '&' | '|' | '<' | '>' | '?' | '~'
  )
}

fn is_reserved_char(c: char) -> bool {
  matches!(
    c,
    '(' | ')' | '[' | ']' | '{' | '}' | '@' | ',' | '.' | ':' | '$' | '`' | '"' | '\'' | '\\'
      | ';' | '#'
  )
}

fn is_digit_char(c: char) -> bool {
  c.is_ascii_digit()
}

// anything that is not whitespace, reserved, or an operator character
fn is_ident_char(c: char) -> bool {
  !is_ws_char(c) && !is_op_char(c) && !is_reserved_char(c)
}

fn keyword_kind(word: &[u8]) -> Option<TokenKind> {
  match word {
    b"namespace" => Some(TokenKind::Namespace),
    b"pub" => Some(TokenKind::Pub),
    b"unsafe" => Some(TokenKind::Unsafe),
    b"const" => Some(TokenKind::Const),
    b"val" => Some(TokenKind::Val),
    b"var" => Some(TokenKind::Var),
    b"mut" => Some(TokenKind::Mut),
    b"ref" => Some(TokenKind::Ref),
    b"fn" => Some(TokenKind::Fn),
    b"struct" => Some(TokenKind::Struct),
    b"enum" => Some(TokenKind::Enum),
    b"union" => Some(TokenKind::Union),
    b"trait" => Some(TokenKind::Trait),
    b"is" => Some(TokenKind::Is),
    b"if" => Some(TokenKind::If),
    b"else" => Some(TokenKind::Else),
    b"loop" => Some(TokenKind::Loop),
    b"while" => Some(TokenKind::While),
    b"until" => Some(TokenKind::Until),
    b"for" => Some(TokenKind::For),
    b"in" => Some(TokenKind::In),
    b"break" => Some(TokenKind::Break),
    b"continue" => Some(TokenKind::Continue),
    b"return" => Some(TokenKind::Return),
    b"as" => Some(TokenKind::As),
    b"alias" => Some(TokenKind::Alias),
    b"type" => Some(TokenKind::Type),
    _ => None,
  }
}

impl<'src> Tokenizer<'src> {
  fn peek(&mut self) -> Codepoint {
    *self.source.peek_nth(0).unwrap()
  }

  fn peek_nth(&mut self, n: usize) -> Codepoint {
    *self.source.peek_nth(n).unwrap()
  }

  fn bump(&mut self) -> Codepoint {
    self.source.next().unwrap()
  }

  fn token_from(&mut self, kind: TokenKind, start: Codepoint) -> Token<'src> {
    let end = self.peek();
    Token {
      kind,
      range: Range {
        start: start.position,
        end: end.position,
      },
      offset: start.offset,
      text: &self.src[start.offset..end.offset],
    }
  }

  fn lex_single(&mut self, kind: TokenKind, start: Codepoint) -> Token<'src> {
    self.bump();
    self.token_from(kind, start)
  }

  // a matching close bracket pops only a non-generic frame
  fn pop_non_generic(&mut self) {
    if self.generic_stack.last() == Some(&false) {
      self.generic_stack.pop();
    }
  }

  // a run of carriage returns, newlines, and whitespace coalesces
  fn consume_newline_run(&mut self) {
    while let Some(' ' | '\t' | '\r' | '\n') = self.peek().ch {
      self.bump();
    }
  }

  fn lex_newline(&mut self) -> Token<'src> {
    let start = self.peek();
    self.consume_newline_run();
    self.token_from(TokenKind::Newline, start)
  }

  fn skip_line_comment(&mut self) {
    while let Some(c) = self.peek().ch {
      if c == '\n' {
        return;
      }
      self.bump();
    }
  }

  fn lex_doc_string(&mut self) -> Token<'src> {
    let start = self.peek();
    // drop `#:`
    self.bump();
    self.bump();
    while let Some(c) = self.peek().ch {
      if c == '\n' {
        break;
      }
      self.bump();
    }
    self.token_from(TokenKind::DocString, start)
  }

  fn lex_identifier_or_keyword(&mut self) -> Token<'src> {
    let start = self.peek();
    while let Some(c) = self.peek().ch {
      if !is_ident_char(c) {
        break;
      }
      self.bump();
    }
    let mut token = self.token_from(TokenKind::Identifier, start);
    if let Some(kind) = keyword_kind(token.text) {
      token.kind = kind;
    }
    token
  }

  fn lex_operator(&mut self) -> Token<'src> {
    let start = self.peek();
    while let Some(c) = self.peek().ch {
      if !is_op_char(c) {
        break;
      }
      self.bump();
    }
    self.token_from(TokenKind::Operator, start)
  }

  // one or more digits with an optional single `.`; two or more dots leave
  // the whole run unclassifiable
  fn lex_number(&mut self) -> Token<'src> {
    let start = self.peek();
    let mut dots = 0;
    while let Some(c) = self.peek().ch {
      if is_digit_char(c) {
        self.bump();
      } else if c == '.' {
        dots += 1;
        self.bump();
      } else {
        break;
      }
    }
    let kind = match dots {
      0 => TokenKind::IntegerLit,
      1 => TokenKind::FloatLit,
      _ => TokenKind::Unknown,
    };
    self.token_from(kind, start)
  }

  fn lex_string(&mut self) -> Token<'src> {
    let start = self.peek();
    // drop the open quote
    self.bump();
    loop {
      match self.peek().ch {
        None => {
          let token = self.token_from(TokenKind::Unknown, start);
          self.dlogger.log_unexpected_eof_in_string(token.range);
          return token;
        }
        Some('"') => {
          self.bump();
          return self.token_from(TokenKind::StringLit, start);
        }
        Some('\\') => {
          // escapes are validated by value extraction later; the token
          // keeps the raw text, so the escaped character is just consumed
          self.bump();
          if self.peek().ch.is_some() {
            self.bump();
          }
        }
        Some(_) => {
          self.bump();
        }
      }
    }
  }

  // n leading apostrophes then `"` opens; the matching close is `"`
  // followed by exactly n apostrophes
  fn lex_raw_string(&mut self) -> Token<'src> {
    let start = self.peek();
    let mut n = 0usize;
    while let Some('\'') = self.peek().ch {
      self.bump();
      n += 1;
    }
    if self.peek().ch != Some('"') {
      let token = self.token_from(TokenKind::Unknown, start);
      self.dlogger.log_unmatched_raw_string_opener(token.range);
      return token;
    }
    self.bump();
    loop {
      match self.peek().ch {
        None => {
          let token = self.token_from(TokenKind::Unknown, start);
          self.dlogger.log_unexpected_eof_in_string(token.range);
          return token;
        }
        Some('"') => {
          // count the apostrophes that follow, capped one past n so a
          // longer run does not close the literal
          let mut k = 0usize;
          while k <= n && self.peek_nth(1 + k).ch == Some('\'') {
            k += 1;
          }
          if k == n {
            for _ in 0..1 + n {
              self.bump();
            }
            return self.token_from(TokenKind::RawStringLit, start);
          }
          self.bump();
        }
        Some(_) => {
          self.bump();
        }
      }
    }
  }
}

impl<'src> Iterator for Tokenizer<'src> {
  type Item = Token<'src>;

  fn next(&mut self) -> Option<Token<'src>> {
    if self.emitted_eof {
      return None;
    }
    loop {
      let start = self.peek();
      match start.ch {
        None => {
          if start.offset < self.src.len() {
            // a malformed sequence reads as end of input
            let range = Range {
              start: start.position,
              end: start.position,
            };
            self.dlogger.log_malformed_codepoint(range);
          }
          self.emitted_eof = true;
          return Some(Token {
            kind: TokenKind::Eof,
            range: Range {
              start: start.position,
              end: start.position,
            },
            offset: start.offset,
            text: &self.src[start.offset..start.offset],
          });
        }
        Some(' ' | '\t') => {
          self.bump();
        }
        Some('\r' | '\n') => return Some(self.lex_newline()),
        Some('\\') => match self.peek_nth(1).ch {
          // a trailing backslash escapes the newline
          Some('\r' | '\n') => {
            self.bump();
            self.consume_newline_run();
          }
          _ => return Some(self.lex_single(TokenKind::Reserved, start)),
        },
        Some('#') => {
          if self.peek_nth(1).ch == Some(':') {
            return Some(self.lex_doc_string());
          }
          self.skip_line_comment();
        }
        Some('"') => return Some(self.lex_string()),
        Some('\'') => return Some(self.lex_raw_string()),
        Some('`') => {
          if self.peek_nth(1).ch == Some('<') {
            self.bump();
            self.bump();
            self.generic_stack.push(true);
            return Some(self.token_from(TokenKind::GenericLeft, start));
          }
          return Some(self.lex_single(TokenKind::Backtick, start));
        }
        Some('>') if self.generic_stack.last() == Some(&true) => {
          self.bump();
          self.generic_stack.pop();
          return Some(self.token_from(TokenKind::GenericRight, start));
        }
        Some('(') => {
          self.generic_stack.push(false);
          return Some(self.lex_single(TokenKind::ParenLeft, start));
        }
        Some(')') => {
          self.pop_non_generic();
          return Some(self.lex_single(TokenKind::ParenRight, start));
        }
        Some('[') => {
          self.generic_stack.push(false);
          return Some(self.lex_single(TokenKind::BracketLeft, start));
        }
        Some(']') => {
          self.pop_non_generic();
          return Some(self.lex_single(TokenKind::BracketRight, start));
        }
        Some('{') => {
          self.generic_stack.push(false);
          return Some(self.lex_single(TokenKind::BraceLeft, start));
        }
        Some('}') => {
          self.pop_non_generic();
          return Some(self.lex_single(TokenKind::BraceRight, start));
        }
        Some('@') => return Some(self.lex_single(TokenKind::At, start)),
        Some(',') => return Some(self.lex_single(TokenKind::Comma, start)),
        Some('.') => return Some(self.lex_single(TokenKind::Period, start)),
        Some(':') => return Some(self.lex_single(TokenKind::Colon, start)),
        Some('$') => return Some(self.lex_single(TokenKind::Dollar, start)),
        Some(';') => return Some(self.lex_single(TokenKind::Reserved, start)),
        Some(c) if is_digit_char(c) => return Some(self.lex_number()),
        Some(c) if is_op_char(c) => return Some(self.lex_operator()),
        Some(c) if is_ident_char(c) => return Some(self.lex_identifier_or_keyword()),
        Some(c) => {
          let token = self.lex_single(TokenKind::Unknown, start);
          self.dlogger.log_unrecognized_character(token.range, c);
          return Some(token);
        }
      }
    }
  }
}
