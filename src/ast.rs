use super::token::Token;
use super::types::Type;
use lsp_types::Range;
use std::cell::Cell;
use strum::AsRefStr;

/// The span of source text a node covers.
#[derive(Debug, Clone, Copy)]
pub struct CodeSlice<'src> {
  pub range: Range,
  pub offset: usize,
  pub text: &'src [u8],
}

impl<'src> CodeSlice<'src> {
  pub fn from_token(token: &Token<'src>) -> Self {
    CodeSlice {
      range: token.range,
      offset: token.offset,
      text: token.text,
    }
  }

  pub fn line(&self) -> u32 {
    self.range.start.line
  }

  pub fn column(&self) -> u32 {
    self.range.start.character
  }

  pub fn end_offset(&self) -> usize {
    self.offset + self.text.len()
  }
}

/// A mutable child link. The reference linker rewrites these in place, so
/// replacing a placeholder is a single store rather than a subtree rebuild.
pub type ExprSlot<'a, 'src> = Cell<&'a Expr<'a, 'src>>;

#[derive(Debug)]
pub struct NamespaceNode<'a, 'src> {
  pub code: CodeSlice<'src>,
  pub name: &'src [u8],
  pub namespaces: &'a [&'a NamespaceNode<'a, 'src>],
  pub declarations: &'a [&'a DeclNode<'a, 'src>],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
  Constant,
  Variable { mutable: bool },
  // introduces a type name; carries no initializer
  NominalType,
}

#[derive(Debug)]
pub struct DeclNode<'a, 'src> {
  pub code: Cell<CodeSlice<'src>>,
  pub name: &'src [u8],
  pub kind: DeclKind,
  pub ty: Cell<&'a Type<'a, 'src>>,
  pub initializer: Cell<Option<&'a Expr<'a, 'src>>>,
}

impl<'a, 'src> DeclNode<'a, 'src> {
  // a const binding with a function type is callable by name
  pub fn is_const_function(&self) -> bool {
    self.kind == DeclKind::Constant && matches!(self.ty.get(), Type::Function { .. })
  }

  pub fn is_variable(&self) -> bool {
    matches!(self.kind, DeclKind::Variable { .. })
  }

  pub fn is_constant(&self) -> bool {
    self.kind == DeclKind::Constant
  }
}

#[derive(Debug)]
pub struct FuncLiteralNode<'a, 'src> {
  pub parameters: &'a [&'a DeclNode<'a, 'src>],
  pub return_type: Cell<&'a Type<'a, 'src>>,
  // always a Scope expression
  pub body: ExprSlot<'a, 'src>,
}

#[derive(Debug, Clone)]
pub enum StmtNode<'a, 'src> {
  Decl(&'a DeclNode<'a, 'src>),
  Expr(ExprSlot<'a, 'src>),
}

#[derive(Debug)]
pub struct Expr<'a, 'src> {
  pub code: CodeSlice<'src>,
  pub kind: ExprKind<'a, 'src>,
  // set by the type checker; stays empty until then
  pub eval_type: Cell<Option<&'a Type<'a, 'src>>>,
}

impl<'a, 'src> Expr<'a, 'src> {
  pub fn new(code: CodeSlice<'src>, kind: ExprKind<'a, 'src>) -> Self {
    Expr {
      code,
      kind,
      eval_type: Cell::new(None),
    }
  }
}

#[derive(Debug, AsRefStr)]
pub enum ExprKind<'a, 'src> {
  Empty,
  Scope {
    statements: &'a [StmtNode<'a, 'src>],
  },
  // literal values keep their text; `code.text` is the literal
  IntegerLiteral,
  FloatLiteral,
  FuncLiteral(&'a FuncLiteralNode<'a, 'src>),
  AddressOf(ExprSlot<'a, 'src>),
  Deref(ExprSlot<'a, 'src>),
  // a name the parser could not classify; eliminated by the linker
  UnknownIdentifier,
  Variable(&'a DeclNode<'a, 'src>),
  Constant(&'a DeclNode<'a, 'src>),
  FuncCall {
    name: &'src [u8],
    parameters: &'a [ExprSlot<'a, 'src>],
  },
  Assignment {
    lhs: ExprSlot<'a, 'src>,
    rhs: ExprSlot<'a, 'src>,
  },
  Return(ExprSlot<'a, 'src>),
}

/// A parsed compilation unit. The nodes live in the arena the parser was
/// handed; the AST itself only holds the root reference.
#[derive(Debug)]
pub struct Ast<'a, 'src> {
  pub file_path: String,
  pub root: &'a NamespaceNode<'a, 'src>,
}
