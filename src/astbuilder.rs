use super::ast::{
  Ast, CodeSlice, DeclKind, DeclNode, Expr, ExprKind, ExprSlot, FuncLiteralNode, NamespaceNode,
  StmtNode,
};
use super::builtins::install_builtins;
use super::codereader::union_of;
use super::scope_stack::ScopeStack;
use super::token::{Token, TokenKind};
use super::types::{atom_from_name, Type};
use bumpalo::Bump;
use lsp_types::Position;
use std::borrow::Cow;
use std::cell::Cell;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone)]
pub struct ParseError {
  pub file: String,
  pub position: Position,
  pub message: String,
}

impl fmt::Display for ParseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Parse error: {}:{}:{}: {}",
      self.file,
      self.position.line + 1,
      self.position.character,
      self.message
    )
  }
}

impl Error for ParseError {}

type PResult<T> = Result<T, ParseError>;

fn lossy(bytes: &[u8]) -> Cow<'_, str> {
  String::from_utf8_lossy(bytes)
}

pub struct Parser<'a, 'p, 'src> {
  file_path: &'p str,
  source: &'src [u8],
  tokens: &'p [Token<'src>],
  pos: usize,
  arena: &'a Bump,
  scope_stack: ScopeStack<'src, &'a DeclNode<'a, 'src>>,
}

/// Parses a lexed token stream into one root namespace spanning the whole
/// input. The token stream must end with the EOF sentinel.
pub fn construct_ast<'a, 'src: 'a>(
  file_path: &str,
  source: &'src [u8],
  tokens: &[Token<'src>],
  arena: &'a Bump,
) -> Result<Ast<'a, 'src>, ParseError> {
  let mut parser = Parser {
    file_path,
    source,
    tokens,
    pos: 0,
    arena,
    scope_stack: ScopeStack::new(),
  };
  install_builtins(arena, &mut parser.scope_stack);
  parser.parse()
}

////////////////////////////////////////////////
// All the parsing methods below adhere to the following conventions:
//
// - When they are called, they assume the cursor is on the first token for
//   them to consume.
//
// - When they return, they leave the cursor on the first token that they
//   don't consume (as opposed to the last token they do). In particular
//   they don't consume trailing newlines unless those are actually
//   syntactically meaningful to them.
////////////////////////////////////////////////
impl<'a, 'p, 'src: 'a> Parser<'a, 'p, 'src> {
  fn cur(&self) -> &'p Token<'src> {
    &self.tokens[self.pos]
  }

  fn peek_next(&self) -> &'p Token<'src> {
    &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
  }

  fn prev(&self) -> &'p Token<'src> {
    &self.tokens[self.pos.saturating_sub(1)]
  }

  // the cursor never steps past the eof sentinel
  fn advance(&mut self) {
    if self.cur().kind != TokenKind::Eof {
      self.pos += 1;
    }
  }

  fn skip_newlines(&mut self) {
    while self.cur().kind == TokenKind::Newline {
      self.advance();
    }
  }

  #[allow(dead_code)]
  fn skip_docstrings(&mut self) {
    while self.cur().kind == TokenKind::DocString {
      self.advance();
    }
  }

  fn skip_docstrings_and_newlines(&mut self) {
    while matches!(self.cur().kind, TokenKind::Newline | TokenKind::DocString) {
      self.advance();
    }
  }

  fn parsing_error<T>(&self, token: &Token<'src>, message: String) -> PResult<T> {
    Err(ParseError {
      file: self.file_path.to_owned(),
      position: token.range.start,
      message,
    })
  }

  // a token that ends an expression
  fn token_is_terminator(token: &Token<'src>) -> bool {
    matches!(
      token.kind,
      TokenKind::Newline
        | TokenKind::Comma
        | TokenKind::ParenRight
        | TokenKind::BracketRight
        | TokenKind::BraceRight
        | TokenKind::Eof
    )
  }

  // whether the token names something callable: any operator, or an
  // identifier bound to a const with a function type (builtins included)
  fn token_is_const_function(&self, token: &Token<'src>) -> bool {
    match token.kind {
      TokenKind::Operator => true,
      TokenKind::Identifier => self
        .scope_stack
        .lookup(token.text)
        .map_or(false, |decl| decl.is_const_function()),
      _ => false,
    }
  }

  fn get_op_prec(op: &[u8]) -> i32 {
    match op {
      b"*" | b"/" | b"//" => 100,
      b"+" | b"-" => 90,
      b"<<" | b">>" => 80,
      b"<" | b">" | b"<=" | b">=" => 70,
      b"==" | b"!=" => 60,
      b"&" => 50,
      b"^" => 40,
      b"|" => 30,
      b"and" => 20,
      b"or" => 10,
      b"=" => -10,
      _ => 0,
    }
  }

  // smallest code slice covering both inputs
  fn join_code(&self, a: CodeSlice<'src>, b: CodeSlice<'src>) -> CodeSlice<'src> {
    let offset = a.offset.min(b.offset);
    let end = a.end_offset().max(b.end_offset());
    CodeSlice {
      range: union_of(a.range, b.range),
      offset,
      text: &self.source[offset..end],
    }
  }

  fn empty_code_at(&self, token: &Token<'src>) -> CodeSlice<'src> {
    CodeSlice {
      range: lsp_types::Range {
        start: token.range.start,
        end: token.range.start,
      },
      offset: token.offset,
      text: &self.source[token.offset..token.offset],
    }
  }

  fn alloc_expr(&self, code: CodeSlice<'src>, kind: ExprKind<'a, 'src>) -> &'a Expr<'a, 'src> {
    self.arena.alloc(Expr::new(code, kind))
  }

  // the function type a literal's parameters and return type spell out
  fn function_type_of(&self, literal: &FuncLiteralNode<'a, 'src>) -> &'a Type<'a, 'src> {
    let mut parameter_types: Vec<&'a Type<'a, 'src>> = vec![];
    for param in literal.parameters {
      parameter_types.push(param.ty.get());
    }
    let parameter_types = &*self.arena.alloc_slice_copy(&parameter_types);
    self.arena.alloc(Type::Function {
      parameter_types,
      return_type: literal.return_type.get(),
    })
  }

  ////////////////////
  // Root and namespaces
  ////////////////////

  fn parse(&mut self) -> PResult<Ast<'a, 'src>> {
    let first = *self.cur();
    let (namespaces, declarations) = self.parse_namespace_items()?;
    if self.cur().kind == TokenKind::BraceRight {
      let t = *self.cur();
      return self.parsing_error(&t, "Unmatched '}' at namespace scope.".to_owned());
    }

    // the root spans the whole input, first token to last
    let code = if self.tokens.len() > 1 {
      self.join_code(
        CodeSlice::from_token(&first),
        CodeSlice::from_token(&self.tokens[self.tokens.len() - 2]),
      )
    } else {
      CodeSlice::from_token(&first)
    };

    let root = &*self.arena.alloc(NamespaceNode {
      code,
      name: b"",
      namespaces: self.arena.alloc_slice_copy(&namespaces),
      declarations: self.arena.alloc_slice_copy(&declarations),
    });
    Ok(Ast {
      file_path: self.file_path.to_owned(),
      root,
    })
  }

  // only declarations and nested namespaces are permitted here
  #[allow(clippy::type_complexity)]
  fn parse_namespace_items(
    &mut self,
  ) -> PResult<(
    Vec<&'a NamespaceNode<'a, 'src>>,
    Vec<&'a DeclNode<'a, 'src>>,
  )> {
    let mut namespaces = vec![];
    let mut declarations = vec![];
    loop {
      self.skip_docstrings_and_newlines();
      match self.cur().kind {
        TokenKind::Eof | TokenKind::BraceRight => break,
        TokenKind::Namespace => namespaces.push(self.parse_namespace_decl()?),
        TokenKind::Const
        | TokenKind::Val
        | TokenKind::Var
        | TokenKind::Fn
        | TokenKind::Struct
        | TokenKind::Type => declarations.push(self.parse_declaration()?),
        _ => {
          let t = *self.cur();
          return self.parsing_error(
            &t,
            format!("Unknown namespace item '{}'.", lossy(t.text)),
          );
        }
      }
    }
    Ok((namespaces, declarations))
  }

  fn parse_namespace_decl(&mut self) -> PResult<&'a NamespaceNode<'a, 'src>> {
    let kw = *self.cur();
    self.advance();
    self.skip_newlines();

    let name_tok = *self.cur();
    if name_tok.kind != TokenKind::Identifier {
      return self.parsing_error(
        &name_tok,
        format!("Invalid namespace name: '{}'.", lossy(name_tok.text)),
      );
    }
    self.advance();
    self.skip_newlines();

    let open = *self.cur();
    if open.kind != TokenKind::BraceLeft {
      return self.parsing_error(
        &open,
        format!("Namespace '{}' has no body.", lossy(name_tok.text)),
      );
    }
    self.advance();

    self.scope_stack.push_scope();
    let (namespaces, declarations) = self.parse_namespace_items()?;
    self.scope_stack.pop_scope();

    let close = *self.cur();
    if close.kind != TokenKind::BraceRight {
      return self.parsing_error(
        &close,
        format!("Expected '}}' to close namespace '{}'.", lossy(name_tok.text)),
      );
    }
    self.advance();

    Ok(&*self.arena.alloc(NamespaceNode {
      code: self.join_code(CodeSlice::from_token(&kw), CodeSlice::from_token(&close)),
      name: name_tok.text,
      namespaces: self.arena.alloc_slice_copy(&namespaces),
      declarations: self.arena.alloc_slice_copy(&declarations),
    }))
  }

  ////////////////////
  // Statements
  ////////////////////

  // a single full statement: a declaration, a return, or an expression
  fn parse_statement(&mut self) -> PResult<StmtNode<'a, 'src>> {
    match self.cur().kind {
      TokenKind::Return => Ok(StmtNode::Expr(Cell::new(self.parse_return()?))),

      TokenKind::Const
      | TokenKind::Val
      | TokenKind::Var
      | TokenKind::Fn
      | TokenKind::Struct
      | TokenKind::Type => Ok(StmtNode::Decl(self.parse_declaration()?)),

      TokenKind::IntegerLit
      | TokenKind::FloatLit
      | TokenKind::StringLit
      | TokenKind::RawStringLit
      | TokenKind::ParenLeft
      | TokenKind::Identifier
      | TokenKind::Operator
      | TokenKind::At
      | TokenKind::Dollar => Ok(StmtNode::Expr(Cell::new(self.parse_expression()?))),

      _ => {
        let t = *self.cur();
        self.parsing_error(&t, format!("Unknown statement '{}'.", lossy(t.text)))
      }
    }
  }

  fn parse_return(&mut self) -> PResult<&'a Expr<'a, 'src>> {
    let kw = *self.cur();
    self.advance();
    let value = self.parse_expression()?;
    Ok(self.alloc_expr(
      self.join_code(CodeSlice::from_token(&kw), value.code),
      ExprKind::Return(Cell::new(value)),
    ))
  }

  ////////////////////
  // Scopes
  ////////////////////

  fn parse_scope(&mut self) -> PResult<&'a Expr<'a, 'src>> {
    let open = *self.cur();
    if open.kind != TokenKind::ParenLeft {
      return self.parsing_error(
        &open,
        format!("Opening scope with wrong character: '{}'.", lossy(open.text)),
      );
    }
    self.advance();

    self.scope_stack.push_scope();
    let mut statements = vec![];
    let close;
    loop {
      self.skip_docstrings_and_newlines();
      match self.cur().kind {
        TokenKind::ParenRight => {
          close = *self.cur();
          self.advance();
          break;
        }
        TokenKind::Eof => {
          let t = *self.cur();
          return self.parsing_error(&t, "Expected ')' to close scope.".to_owned());
        }
        _ => statements.push(self.parse_statement()?),
      }
    }
    self.scope_stack.pop_scope();

    let statements = &*self.arena.alloc_slice_fill_iter(statements.into_iter());
    Ok(self.alloc_expr(
      self.join_code(CodeSlice::from_token(&open), CodeSlice::from_token(&close)),
      ExprKind::Scope { statements },
    ))
  }

  ////////////////////
  // Declarations
  ////////////////////

  fn parse_declaration(&mut self) -> PResult<&'a DeclNode<'a, 'src>> {
    match self.cur().kind {
      TokenKind::Const => self.parse_constant_decl(),
      TokenKind::Val | TokenKind::Var => self.parse_variable_decl(),
      TokenKind::Fn => self.parse_func_definition(),
      TokenKind::Type => self.parse_nominal_type_decl(),
      _ => {
        let t = *self.cur();
        self.parsing_error(
          &t,
          format!(
            "Declarations starting with '{}' are not implemented yet.",
            lossy(t.text)
          ),
        )
      }
    }
  }

  fn parse_constant_decl(&mut self) -> PResult<&'a DeclNode<'a, 'src>> {
    let kw = *self.cur();
    self.advance();
    self.skip_newlines();

    let name_tok = *self.cur();
    if name_tok.kind != TokenKind::Identifier {
      return self.parsing_error(
        &name_tok,
        format!("Invalid constant name: '{}'.", lossy(name_tok.text)),
      );
    }
    self.advance();

    // optional ":" with a type expression
    let mut declared: Option<&'a Type<'a, 'src>> = None;
    if self.cur().kind == TokenKind::Colon {
      self.advance();
      self.skip_newlines();
      declared = Some(self.parse_type()?);
    }

    // initializer is required for constants
    let eq = *self.cur();
    if !(eq.kind == TokenKind::Operator && eq.text == b"=") {
      return self.parsing_error(
        &eq,
        format!("Constant '{}' has no initializer.", lossy(name_tok.text)),
      );
    }
    self.advance();
    self.skip_newlines();

    // reserve the name before the initializer so recursive definitions
    // bind; a function initializer gets a callable placeholder type
    let next_is_fn = self.cur().kind == TokenKind::Fn;
    let placeholder: &'a Type<'a, 'src> = if next_is_fn {
      self.arena.alloc(Type::Function {
        parameter_types: &[],
        return_type: self.arena.alloc(Type::Void),
      })
    } else {
      match declared {
        Some(ty) => ty,
        None => self.arena.alloc(Type::Infer),
      }
    };

    let decl: &'a DeclNode<'a, 'src> = self.arena.alloc(DeclNode {
      code: Cell::new(CodeSlice::from_token(&kw)),
      name: name_tok.text,
      kind: DeclKind::Constant,
      ty: Cell::new(placeholder),
      initializer: Cell::new(None),
    });

    if !self.scope_stack.push_symbol(decl.name, decl) {
      let what = if next_is_fn {
        "const function"
      } else {
        "const variable"
      };
      return self.parsing_error(
        &name_tok,
        format!(
          "Attempted to declare {} '{}', but something with the same name is already in scope.",
          what,
          lossy(decl.name)
        ),
      );
    }

    let init = self.parse_expression()?;
    decl.initializer.set(Some(init));

    // a function literal fixes the constant's type at parse time
    if let ExprKind::FuncLiteral(literal) = &init.kind {
      decl.ty.set(self.function_type_of(literal));
    }

    let t = *self.cur();
    if !Self::token_is_terminator(&t) {
      return self.parsing_error(
        &t,
        format!("Invalid continuation of initializer. ('{}')", lossy(t.text)),
      );
    }

    decl
      .code
      .set(self.join_code(CodeSlice::from_token(&kw), init.code));
    Ok(decl)
  }

  fn parse_variable_decl(&mut self) -> PResult<&'a DeclNode<'a, 'src>> {
    let kw = *self.cur();
    let mutable = kw.kind == TokenKind::Var;
    self.advance();
    self.skip_newlines();

    let name_tok = *self.cur();
    if name_tok.kind != TokenKind::Identifier {
      return self.parsing_error(
        &name_tok,
        format!("Invalid variable name: '{}'.", lossy(name_tok.text)),
      );
    }

    let decl: &'a DeclNode<'a, 'src> = self.arena.alloc(DeclNode {
      code: Cell::new(CodeSlice::from_token(&kw)),
      name: name_tok.text,
      kind: DeclKind::Variable { mutable },
      ty: Cell::new(self.arena.alloc(Type::Infer)),
      initializer: Cell::new(None),
    });

    if !self.scope_stack.push_symbol(decl.name, decl) {
      return self.parsing_error(
        &name_tok,
        format!(
          "Attempted to declare variable '{}', but something with the same name is already in scope.",
          lossy(decl.name)
        ),
      );
    }
    self.advance();

    // optional ":" with a type expression
    if self.cur().kind == TokenKind::Colon {
      self.advance();
      self.skip_newlines();
      decl.ty.set(self.parse_type()?);
    }

    // optional "=" with an initializer
    if self.cur().kind == TokenKind::Operator && self.cur().text == b"=" {
      self.advance();
      decl.initializer.set(Some(self.parse_expression()?));
    } else {
      let here = *self.cur();
      decl
        .initializer
        .set(Some(self.alloc_expr(self.empty_code_at(&here), ExprKind::Empty)));
    }

    let t = *self.cur();
    if !Self::token_is_terminator(&t) {
      return self.parsing_error(
        &t,
        format!("Invalid continuation of expression: '{}'.", lossy(t.text)),
      );
    }

    decl
      .code
      .set(self.join_code(CodeSlice::from_token(&kw), CodeSlice::from_token(self.prev())));
    Ok(decl)
  }

  // a function definition is really just a constant with a function
  // literal assigned to it
  fn parse_func_definition(&mut self) -> PResult<&'a DeclNode<'a, 'src>> {
    let kw = *self.cur();
    self.advance();
    self.skip_newlines();

    let name_tok = *self.cur();
    if !matches!(name_tok.kind, TokenKind::Identifier | TokenKind::Operator) {
      return self.parsing_error(
        &name_tok,
        format!("Invalid function name: '{}'.", lossy(name_tok.text)),
      );
    }

    // a callable placeholder type until the literal is parsed
    let placeholder: &'a Type<'a, 'src> = self.arena.alloc(Type::Function {
      parameter_types: &[],
      return_type: self.arena.alloc(Type::Void),
    });
    let decl: &'a DeclNode<'a, 'src> = self.arena.alloc(DeclNode {
      code: Cell::new(CodeSlice::from_token(&kw)),
      name: name_tok.text,
      kind: DeclKind::Constant,
      ty: Cell::new(placeholder),
      initializer: Cell::new(None),
    });

    if !self.scope_stack.push_symbol(decl.name, decl) {
      return self.parsing_error(
        &name_tok,
        format!(
          "Attempted to declare function '{}', but something with the same name is already in scope.",
          lossy(decl.name)
        ),
      );
    }

    self.advance();
    self.skip_newlines();
    let literal = self.parse_function_literal(false)?;
    decl.initializer.set(Some(literal));
    if let ExprKind::FuncLiteral(fl) = &literal.kind {
      decl.ty.set(self.function_type_of(fl));
    }

    decl
      .code
      .set(self.join_code(CodeSlice::from_token(&kw), literal.code));
    Ok(decl)
  }

  // type name : type-expr
  fn parse_nominal_type_decl(&mut self) -> PResult<&'a DeclNode<'a, 'src>> {
    let kw = *self.cur();
    self.advance();
    self.skip_newlines();

    let name_tok = *self.cur();
    if name_tok.kind != TokenKind::Identifier {
      return self.parsing_error(
        &name_tok,
        format!("Invalid type name: '{}'.", lossy(name_tok.text)),
      );
    }
    self.advance();
    self.skip_newlines();

    if self.cur().kind != TokenKind::Colon {
      let t = *self.cur();
      return self.parsing_error(
        &t,
        format!("Nominal type '{}' has no definition.", lossy(name_tok.text)),
      );
    }
    self.advance();
    self.skip_newlines();

    let ty = self.parse_type()?;

    let decl: &'a DeclNode<'a, 'src> = self.arena.alloc(DeclNode {
      code: Cell::new(
        self.join_code(CodeSlice::from_token(&kw), CodeSlice::from_token(self.prev())),
      ),
      name: name_tok.text,
      kind: DeclKind::NominalType,
      ty: Cell::new(ty),
      initializer: Cell::new(None),
    });

    if !self.scope_stack.push_symbol(decl.name, decl) {
      return self.parsing_error(
        &name_tok,
        format!(
          "Attempted to declare type '{}', but something with the same name is already in scope.",
          lossy(decl.name)
        ),
      );
    }

    let t = *self.cur();
    if !Self::token_is_terminator(&t) {
      return self.parsing_error(
        &t,
        format!(
          "Invalid continuation of type declaration. ('{}')",
          lossy(t.text)
        ),
      );
    }
    Ok(decl)
  }

  ////////////////////
  // Expressions
  ////////////////////

  // parses the largest number of tokens that result in a single valid
  // expression
  fn parse_expression(&mut self) -> PResult<&'a Expr<'a, 'src>> {
    let lhs = self.parse_primary_expression()?;

    let t = *self.cur();
    if Self::token_is_terminator(&t) {
      return Ok(lhs);
    }
    if self.token_is_const_function(&t) {
      return self.parse_binary_func_call(lhs, -1_000_000);
    }
    self.parsing_error(
      &t,
      format!(
        "Expected a binary operator, but instead found '{}'.",
        lossy(t.text)
      ),
    )
  }

  // parses the fewest number of tokens that result in a single valid
  // expression, while keeping the surrounding code valid
  fn parse_primary_expression(&mut self) -> PResult<&'a Expr<'a, 'src>> {
    let t = *self.cur();
    match t.kind {
      TokenKind::ParenLeft => self.parse_scope(),

      // dereference
      TokenKind::Dollar => {
        self.advance();
        let inner = self.parse_expression()?;
        Ok(self.alloc_expr(
          self.join_code(CodeSlice::from_token(&t), inner.code),
          ExprKind::Deref(Cell::new(inner)),
        ))
      }

      // address-of
      TokenKind::At => {
        self.advance();
        let inner = self.parse_expression()?;
        Ok(self.alloc_expr(
          self.join_code(CodeSlice::from_token(&t), inner.code),
          ExprKind::AddressOf(Cell::new(inner)),
        ))
      }

      TokenKind::Fn
      | TokenKind::IntegerLit
      | TokenKind::FloatLit
      | TokenKind::StringLit
      | TokenKind::RawStringLit => self.parse_literal(),

      TokenKind::Operator | TokenKind::Identifier => {
        if self.peek_next().kind == TokenKind::BracketLeft {
          self.parse_standard_func_call()
        } else if self.token_is_const_function(&t) {
          if !Self::token_is_terminator(self.peek_next()) {
            self.parse_unary_func_call()
          } else {
            self.parsing_error(
              &t,
              format!(
                "Can't parse const function '{}' as a value yet.",
                lossy(t.text)
              ),
            )
          }
        } else {
          // some other identifier; classified during reference linking
          self.advance();
          Ok(self.alloc_expr(CodeSlice::from_token(&t), ExprKind::UnknownIdentifier))
        }
      }

      _ => self.parsing_error(
        &t,
        format!("Expected an expression, but found '{}'.", lossy(t.text)),
      ),
    }
  }

  ////////////////////
  // Literals
  ////////////////////

  fn parse_literal(&mut self) -> PResult<&'a Expr<'a, 'src>> {
    let t = *self.cur();
    match t.kind {
      TokenKind::IntegerLit => {
        self.advance();
        Ok(self.alloc_expr(CodeSlice::from_token(&t), ExprKind::IntegerLiteral))
      }
      TokenKind::FloatLit => {
        self.advance();
        Ok(self.alloc_expr(CodeSlice::from_token(&t), ExprKind::FloatLiteral))
      }
      TokenKind::StringLit | TokenKind::RawStringLit => self.parsing_error(
        &t,
        format!(
          "String literals are not supported in expressions yet. ('{}')",
          lossy(t.text)
        ),
      ),
      TokenKind::Fn => self.parse_function_literal(true),
      _ => self.parsing_error(
        &t,
        format!("Expected a literal, but found '{}'.", lossy(t.text)),
      ),
    }
  }

  // fn [p1: T1, ...] -> R ( body ); the parameter scope lasts through the
  // body
  fn parse_function_literal(&mut self, has_fn: bool) -> PResult<&'a Expr<'a, 'src>> {
    let start = *self.cur();
    if has_fn {
      if start.kind != TokenKind::Fn {
        return self.parsing_error(&start, "Function literal must start with 'fn'.".to_owned());
      }
      self.advance();
      self.skip_newlines();
    }

    let open = *self.cur();
    if open.kind != TokenKind::BracketLeft {
      return self.parsing_error(
        &open,
        "Attempted to define a function without a parameter list.".to_owned(),
      );
    }
    self.advance();

    self.scope_stack.push_scope();
    let mut parameters: Vec<&'a DeclNode<'a, 'src>> = vec![];
    loop {
      self.skip_newlines();
      if self.cur().kind == TokenKind::BracketRight {
        break;
      }

      let name_tok = *self.cur();
      if name_tok.kind != TokenKind::Identifier {
        return self.parsing_error(
          &name_tok,
          "Something fishy with the end of this function definition's parameter list.".to_owned(),
        );
      }
      self.advance();
      self.skip_newlines();

      if self.cur().kind != TokenKind::Colon {
        let t = *self.cur();
        return self.parsing_error(&t, "Function parameter lacks a type.".to_owned());
      }
      self.advance();
      self.skip_newlines();

      let ty = self.parse_type()?;
      let param: &'a DeclNode<'a, 'src> = self.arena.alloc(DeclNode {
        code: Cell::new(
          self.join_code(CodeSlice::from_token(&name_tok), CodeSlice::from_token(self.prev())),
        ),
        name: name_tok.text,
        kind: DeclKind::Variable { mutable: false },
        ty: Cell::new(ty),
        initializer: Cell::new(None),
      });
      if !self.scope_stack.push_symbol(param.name, param) {
        return self.parsing_error(
          &name_tok,
          format!(
            "Function definition has a parameter name '{}', but something with that name is already in scope.",
            lossy(param.name)
          ),
        );
      }
      parameters.push(param);

      self.skip_newlines();
      match self.cur().kind {
        TokenKind::Comma => self.advance(),
        TokenKind::BracketRight => break,
        _ => {
          let t = *self.cur();
          return self.parsing_error(
            &t,
            "Something fishy with the end of this function declaration's parameter list."
              .to_owned(),
          );
        }
      }
    }
    self.advance();
    self.skip_newlines();

    // optional "->" with the return type; absent means void
    let return_type: &'a Type<'a, 'src> =
      if self.cur().kind == TokenKind::Operator && self.cur().text == b"->" {
        self.advance();
        self.skip_newlines();
        self.parse_type()?
      } else {
        self.arena.alloc(Type::Void)
      };
    self.skip_newlines();

    if self.cur().kind != TokenKind::ParenLeft {
      let t = *self.cur();
      return self.parsing_error(&t, "Function definition has no body.".to_owned());
    }
    let body = self.parse_scope()?;
    self.scope_stack.pop_scope();

    let literal = &*self.arena.alloc(FuncLiteralNode {
      parameters: self.arena.alloc_slice_copy(&parameters),
      return_type: Cell::new(return_type),
      body: Cell::new(body),
    });
    Ok(self.alloc_expr(
      self.join_code(CodeSlice::from_token(&start), body.code),
      ExprKind::FuncLiteral(literal),
    ))
  }

  ////////////////////
  // Calls
  ////////////////////

  // name[arg, arg, ...]
  fn parse_standard_func_call(&mut self) -> PResult<&'a Expr<'a, 'src>> {
    let name_tok = *self.cur();
    if !matches!(name_tok.kind, TokenKind::Identifier | TokenKind::Operator) {
      return self.parsing_error(
        &name_tok,
        format!(
          "Invalid name for standard function call: '{}'.",
          lossy(name_tok.text)
        ),
      );
    }
    self.advance();

    if self.cur().kind != TokenKind::BracketLeft {
      let t = *self.cur();
      return self.parsing_error(&t, "Function call without '[]'.".to_owned());
    }
    self.advance();
    self.skip_newlines();

    let mut parameters: Vec<ExprSlot<'a, 'src>> = vec![];
    let close;
    if self.cur().kind == TokenKind::BracketRight {
      close = *self.cur();
      self.advance();
    } else {
      loop {
        self.skip_newlines();
        parameters.push(Cell::new(self.parse_expression()?));
        self.skip_newlines();
        match self.cur().kind {
          TokenKind::Comma => self.advance(),
          TokenKind::BracketRight => {
            close = *self.cur();
            self.advance();
            break;
          }
          _ => {
            let t = *self.cur();
            return self.parsing_error(
              &t,
              format!(
                "Invalid token in function call parameter list. ('{}')",
                lossy(t.text)
              ),
            );
          }
        }
      }
    }

    let parameters = &*self.arena.alloc_slice_fill_iter(parameters.into_iter());
    Ok(self.alloc_expr(
      self.join_code(CodeSlice::from_token(&name_tok), CodeSlice::from_token(&close)),
      ExprKind::FuncCall {
        name: name_tok.text,
        parameters,
      },
    ))
  }

  // op primary
  fn parse_unary_func_call(&mut self) -> PResult<&'a Expr<'a, 'src>> {
    let name_tok = *self.cur();
    if !matches!(name_tok.kind, TokenKind::Identifier | TokenKind::Operator) {
      return self.parsing_error(
        &name_tok,
        format!(
          "Invalid name for unary function call: '{}'.",
          lossy(name_tok.text)
        ),
      );
    }
    self.advance();

    let argument = self.parse_primary_expression()?;
    let parameters = &*self
      .arena
      .alloc_slice_fill_iter(std::iter::once(Cell::new(argument)));
    Ok(self.alloc_expr(
      self.join_code(CodeSlice::from_token(&name_tok), argument.code),
      ExprKind::FuncCall {
        name: name_tok.text,
        parameters,
      },
    ))
  }

  // the precedence-threshold fold over (operator, primary) pairs; returns
  // without consuming the operator when the caller binds at least as
  // tightly, so the caller's fold resumes there
  fn parse_binary_func_call(
    &mut self,
    lhs: &'a Expr<'a, 'src>,
    lhs_prec: i32,
  ) -> PResult<&'a Expr<'a, 'src>> {
    let op_tok = *self.cur();
    let my_prec = Self::get_op_prec(op_tok.text);
    if lhs_prec >= my_prec {
      return Ok(lhs);
    }
    self.advance();

    let mut rhs = self.parse_primary_expression()?;

    let parse_more;
    loop {
      let t = *self.cur();
      if Self::token_is_terminator(&t) {
        parse_more = false;
        break;
      }
      let next_prec = Self::get_op_prec(t.text);
      if next_prec > my_prec {
        rhs = self.parse_binary_func_call(rhs, my_prec)?;
      } else if next_prec == my_prec && t.text == b"=" {
        // assignment chains to the right
        rhs = self.parse_binary_func_call(rhs, my_prec - 1)?;
      } else {
        parse_more = true;
        break;
      }
    }

    let node = if op_tok.text == b"=" {
      self.alloc_expr(
        self.join_code(lhs.code, rhs.code),
        ExprKind::Assignment {
          lhs: Cell::new(lhs),
          rhs: Cell::new(rhs),
        },
      )
    } else if self.token_is_const_function(&op_tok) {
      let parameters = &*self
        .arena
        .alloc_slice_fill_iter([Cell::new(lhs), Cell::new(rhs)].into_iter());
      self.alloc_expr(
        self.join_code(lhs.code, rhs.code),
        ExprKind::FuncCall {
          name: op_tok.text,
          parameters,
        },
      )
    } else {
      return self.parsing_error(
        &op_tok,
        format!(
          "Invalid name for binary function call or operator: '{}'.",
          lossy(op_tok.text)
        ),
      );
    };

    if parse_more {
      self.parse_binary_func_call(node, lhs_prec)
    } else {
      Ok(node)
    }
  }

  ////////////////////
  // Type expressions
  ////////////////////

  fn parse_type(&mut self) -> PResult<&'a Type<'a, 'src>> {
    let t = *self.cur();
    match t.kind {
      // pointer to the type that follows
      TokenKind::At => {
        self.advance();
        self.skip_newlines();
        let pointee = self.parse_type()?;
        Ok(&*self.arena.alloc(Type::Pointer(pointee)))
      }

      TokenKind::Struct => self.parse_struct(),

      TokenKind::Identifier => {
        self.advance();
        if let Some(atom) = atom_from_name(t.text) {
          return Ok(&*self.arena.alloc(atom));
        }
        if let Some(decl) = self.scope_stack.lookup(t.text) {
          if decl.kind == DeclKind::NominalType {
            return Ok(decl.ty.get());
          }
        }
        // a forward reference to a nominal type, resolved by the linker
        Ok(&*self.arena.alloc(Type::Unknown { name: t.text }))
      }

      _ => self.parsing_error(&t, format!("Invalid type name: '{}'.", lossy(t.text))),
    }
  }

  // struct { f1: T1, f2: T2, ... }
  fn parse_struct(&mut self) -> PResult<&'a Type<'a, 'src>> {
    self.advance();
    self.skip_newlines();

    if self.cur().kind != TokenKind::BraceLeft {
      let t = *self.cur();
      return self.parsing_error(&t, "Anonymous struct type without '{ }'.".to_owned());
    }
    self.advance();

    let mut field_names: Vec<&'src [u8]> = vec![];
    let mut field_types: Vec<&'a Type<'a, 'src>> = vec![];
    loop {
      self.skip_docstrings_and_newlines();
      if self.cur().kind == TokenKind::BraceRight {
        break;
      }

      let name_tok = *self.cur();
      if name_tok.kind != TokenKind::Identifier {
        return self.parsing_error(
          &name_tok,
          format!("Invalid struct field name: '{}'.", lossy(name_tok.text)),
        );
      }
      if field_names.iter().any(|n| *n == name_tok.text) {
        return self.parsing_error(
          &name_tok,
          format!("Duplicate field '{}' in struct type.", lossy(name_tok.text)),
        );
      }
      self.advance();
      self.skip_newlines();

      if self.cur().kind != TokenKind::Colon {
        let t = *self.cur();
        return self.parsing_error(
          &t,
          format!("Struct field '{}' lacks a type.", lossy(name_tok.text)),
        );
      }
      self.advance();
      self.skip_newlines();

      field_names.push(name_tok.text);
      field_types.push(self.parse_type()?);

      self.skip_newlines();
      match self.cur().kind {
        TokenKind::Comma => self.advance(),
        TokenKind::BraceRight => break,
        _ => {
          let t = *self.cur();
          return self.parsing_error(
            &t,
            "Something fishy with the end of this struct type.".to_owned(),
          );
        }
      }
    }
    self.advance();

    Ok(&*self.arena.alloc(Type::Struct {
      name: b"",
      field_names: self.arena.alloc_slice_copy(&field_names),
      field_types: self.arena.alloc_slice_copy(&field_types),
    }))
  }
}
