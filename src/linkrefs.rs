use super::ast::{
  Ast, CodeSlice, DeclKind, DeclNode, Expr, ExprKind, ExprSlot, NamespaceNode, StmtNode,
};
use super::builtins::install_builtins;
use super::scope_stack::ScopeStack;
use super::types::Type;
use bumpalo::Bump;
use lsp_types::Position;
use std::borrow::Cow;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone)]
pub struct LinkError {
  pub file: String,
  pub position: Position,
  pub message: String,
}

impl fmt::Display for LinkError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Resolution error: {}:{}:{}: {}",
      self.file,
      self.position.line + 1,
      self.position.character,
      self.message
    )
  }
}

impl Error for LinkError {}

type LResult<T> = Result<T, LinkError>;

fn lossy(bytes: &[u8]) -> Cow<'_, str> {
  String::from_utf8_lossy(bytes)
}

struct Linker<'a, 'src> {
  file_path: String,
  arena: &'a Bump,
  scopes: ScopeStack<'src, &'a DeclNode<'a, 'src>>,
}

/// Second walk over the AST with a fresh scope stack. Replaces every
/// unknown-identifier placeholder with a variable or constant reference and
/// resolves nominal type references. Afterwards no `UnknownIdentifier` node
/// is reachable from the root and no `Type::Unknown` remains in a
/// declaration.
pub fn link_references<'a, 'src: 'a>(ast: &Ast<'a, 'src>, arena: &'a Bump) -> Result<(), LinkError> {
  let mut linker = Linker {
    file_path: ast.file_path.clone(),
    arena,
    scopes: ScopeStack::new(),
  };
  install_builtins(arena, &mut linker.scopes);
  linker.link_namespace(ast.root)
}

impl<'a, 'src: 'a> Linker<'a, 'src> {
  fn error<T>(&self, code: CodeSlice<'src>, message: String) -> LResult<T> {
    Err(LinkError {
      file: self.file_path.clone(),
      position: code.range.start,
      message,
    })
  }

  fn link_namespace(&mut self, ns: &'a NamespaceNode<'a, 'src>) -> LResult<()> {
    self.scopes.push_scope();

    // nominal types register up front so forward references resolve
    for &decl in ns.declarations {
      if decl.kind == DeclKind::NominalType {
        if !self.scopes.push_symbol(decl.name, decl) {
          return self.error(
            decl.code.get(),
            format!(
              "Attempted to declare type '{}', but something with the same name is already in scope.",
              lossy(decl.name)
            ),
          );
        }
      }
    }

    for &decl in ns.declarations {
      self.link_decl(decl)?;
    }
    // nested namespaces see every declaration of the enclosing one
    for &sub in ns.namespaces {
      self.link_namespace(sub)?;
    }

    self.scopes.pop_scope();
    Ok(())
  }

  fn link_decl(&mut self, decl: &'a DeclNode<'a, 'src>) -> LResult<()> {
    // initializer first; the declaration only becomes visible afterwards
    if let Some(init) = decl.initializer.get() {
      let linked = self.link_expr(init)?;
      decl.initializer.set(Some(linked));
    }

    let code = decl.code.get();
    let resolved = self.resolve_type(decl.ty.get(), code, &mut vec![])?;
    decl.ty.set(resolved);

    if decl.kind != DeclKind::NominalType {
      if !self.scopes.push_symbol(decl.name, decl) {
        return self.error(
          code,
          format!(
            "Attempted to declare '{}', but something with the same name is already in scope.",
            lossy(decl.name)
          ),
        );
      }
    }
    Ok(())
  }

  // returns the expression that should stand in the slot the caller took
  // this one from; placeholders come back as fresh reference nodes
  fn link_expr(&mut self, expr: &'a Expr<'a, 'src>) -> LResult<&'a Expr<'a, 'src>> {
    match &expr.kind {
      ExprKind::UnknownIdentifier => {
        let name = expr.code.text;
        match self.scopes.lookup(name) {
          Some(decl) if decl.is_variable() => Ok(&*self.arena.alloc(Expr::new(
            expr.code,
            ExprKind::Variable(decl),
          ))),
          Some(decl) if decl.is_constant() => Ok(&*self.arena.alloc(Expr::new(
            expr.code,
            ExprKind::Constant(decl),
          ))),
          Some(_) => self.error(
            expr.code,
            format!("Symbol '{}' names a type and cannot be used as a value.", lossy(name)),
          ),
          None => self.error(
            expr.code,
            format!("No symbol in scope named '{}'.", lossy(name)),
          ),
        }
      }

      ExprKind::Scope { statements } => {
        self.scopes.push_scope();
        for stmt in *statements {
          match stmt {
            StmtNode::Decl(decl) => self.link_decl(decl)?,
            StmtNode::Expr(slot) => self.link_slot(slot)?,
          }
        }
        self.scopes.pop_scope();
        Ok(expr)
      }

      ExprKind::FuncLiteral(literal) => {
        self.scopes.push_scope();
        for &param in literal.parameters {
          self.link_decl(param)?;
        }
        let ret = self.resolve_type(literal.return_type.get(), expr.code, &mut vec![])?;
        literal.return_type.set(ret);
        self.link_slot(&literal.body)?;
        self.scopes.pop_scope();
        Ok(expr)
      }

      ExprKind::AddressOf(slot) | ExprKind::Deref(slot) | ExprKind::Return(slot) => {
        self.link_slot(slot)?;
        Ok(expr)
      }

      ExprKind::FuncCall { parameters, .. } => {
        for slot in *parameters {
          self.link_slot(slot)?;
        }
        Ok(expr)
      }

      ExprKind::Assignment { lhs, rhs } => {
        self.link_slot(lhs)?;
        self.link_slot(rhs)?;
        Ok(expr)
      }

      // literals, empty expressions, and already-linked references
      _ => Ok(expr),
    }
  }

  fn link_slot(&mut self, slot: &ExprSlot<'a, 'src>) -> LResult<()> {
    let linked = self.link_expr(slot.get())?;
    slot.set(linked);
    Ok(())
  }

  // rebuilds a type with every Unknown replaced by its nominal referent;
  // the original is returned untouched when nothing changes
  fn resolve_type(
    &mut self,
    ty: &'a Type<'a, 'src>,
    code: CodeSlice<'src>,
    visiting: &mut Vec<&'src [u8]>,
  ) -> LResult<&'a Type<'a, 'src>> {
    match *ty {
      Type::Unknown { name } => {
        if visiting.iter().any(|n| *n == name) {
          return self.error(
            code,
            format!("Cyclic nominal type definition '{}'.", lossy(name)),
          );
        }
        match self.scopes.lookup(name) {
          Some(decl) if decl.kind == DeclKind::NominalType => {
            visiting.push(name);
            let resolved = self.resolve_type(decl.ty.get(), code, visiting)?;
            visiting.pop();
            decl.ty.set(resolved);
            Ok(resolved)
          }
          Some(_) => self.error(
            code,
            format!("Symbol '{}' does not name a type.", lossy(name)),
          ),
          None => self.error(code, format!("No type in scope named '{}'.", lossy(name))),
        }
      }

      Type::Pointer(inner) => {
        let resolved = self.resolve_type(inner, code, visiting)?;
        if std::ptr::eq(resolved, inner) {
          Ok(ty)
        } else {
          Ok(&*self.arena.alloc(Type::Pointer(resolved)))
        }
      }

      Type::Slice(inner) => {
        let resolved = self.resolve_type(inner, code, visiting)?;
        if std::ptr::eq(resolved, inner) {
          Ok(ty)
        } else {
          Ok(&*self.arena.alloc(Type::Slice(resolved)))
        }
      }

      Type::Array { element, len } => {
        let resolved = self.resolve_type(element, code, visiting)?;
        if std::ptr::eq(resolved, element) {
          Ok(ty)
        } else {
          Ok(&*self.arena.alloc(Type::Array {
            element: resolved,
            len,
          }))
        }
      }

      Type::Tuple(elements) => {
        let (changed, elements) = self.resolve_type_slice(elements, code, visiting)?;
        if changed {
          Ok(&*self.arena.alloc(Type::Tuple(elements)))
        } else {
          Ok(ty)
        }
      }

      Type::Struct {
        name,
        field_names,
        field_types,
      } => {
        let (changed, field_types) = self.resolve_type_slice(field_types, code, visiting)?;
        if changed {
          Ok(&*self.arena.alloc(Type::Struct {
            name,
            field_names,
            field_types,
          }))
        } else {
          Ok(ty)
        }
      }

      Type::Function {
        parameter_types,
        return_type,
      } => {
        let (params_changed, parameter_types) =
          self.resolve_type_slice(parameter_types, code, visiting)?;
        let resolved_return = self.resolve_type(return_type, code, visiting)?;
        if params_changed || !std::ptr::eq(resolved_return, return_type) {
          Ok(&*self.arena.alloc(Type::Function {
            parameter_types,
            return_type: resolved_return,
          }))
        } else {
          Ok(ty)
        }
      }

      _ => Ok(ty),
    }
  }

  #[allow(clippy::type_complexity)]
  fn resolve_type_slice(
    &mut self,
    types: &'a [&'a Type<'a, 'src>],
    code: CodeSlice<'src>,
    visiting: &mut Vec<&'src [u8]>,
  ) -> LResult<(bool, &'a [&'a Type<'a, 'src>])> {
    let mut out: Vec<&'a Type<'a, 'src>> = Vec::with_capacity(types.len());
    let mut changed = false;
    for &ty in types {
      let resolved = self.resolve_type(ty, code, visiting)?;
      changed |= !std::ptr::eq(resolved, ty);
      out.push(resolved);
    }
    if changed {
      Ok((true, &*self.arena.alloc_slice_copy(&out)))
    } else {
      Ok((false, types))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::astbuilder::construct_ast;
  use crate::dlogger::DiagnosticLog;
  use crate::tokenize::lex;
  use pretty_assertions::assert_eq;

  fn parse_and_link<'a>(arena: &'a Bump, source: &'a [u8]) -> Result<Ast<'a, 'a>, String> {
    let mut log = DiagnosticLog::new();
    let tokens = lex(source, log.get_logger(Some(String::from("test-lex"))));
    let ast = construct_ast("test.aln", source, &tokens, arena).map_err(|e| e.to_string())?;
    link_references(&ast, arena).map_err(|e| e.to_string())?;
    Ok(ast)
  }

  // walks every reachable expression, asserting the placeholder is gone
  fn assert_no_unknown_identifiers(expr: &Expr) {
    match &expr.kind {
      ExprKind::UnknownIdentifier => panic!("unknown identifier survived linking"),
      ExprKind::Scope { statements } => {
        for stmt in *statements {
          match stmt {
            StmtNode::Decl(decl) => {
              if let Some(init) = decl.initializer.get() {
                assert_no_unknown_identifiers(init);
              }
            }
            StmtNode::Expr(slot) => assert_no_unknown_identifiers(slot.get()),
          }
        }
      }
      ExprKind::FuncLiteral(literal) => assert_no_unknown_identifiers(literal.body.get()),
      ExprKind::AddressOf(slot) | ExprKind::Deref(slot) | ExprKind::Return(slot) => {
        assert_no_unknown_identifiers(slot.get())
      }
      ExprKind::FuncCall { parameters, .. } => {
        for slot in *parameters {
          assert_no_unknown_identifiers(slot.get());
        }
      }
      ExprKind::Assignment { lhs, rhs } => {
        assert_no_unknown_identifiers(lhs.get());
        assert_no_unknown_identifiers(rhs.get());
      }
      _ => {}
    }
  }

  fn body_statements<'a>(decl: &DeclNode<'a, 'a>) -> &'a [StmtNode<'a, 'a>] {
    let literal = match &decl.initializer.get().unwrap().kind {
      ExprKind::FuncLiteral(literal) => *literal,
      _ => panic!("expected a function literal"),
    };
    match &literal.body.get().kind {
      ExprKind::Scope { statements } => statements,
      _ => panic!("expected a scope"),
    }
  }

  #[test]
  fn variable_uses_link_to_their_declaration() {
    let arena = Bump::new();
    let source = b"var x: i32 = 0\nfn get [] -> i32 (return x)";
    let ast = parse_and_link(&arena, source).unwrap();

    let x_decl = ast.root.declarations[0];
    let get = ast.root.declarations[1];
    let ret = match &body_statements(get)[0] {
      StmtNode::Expr(slot) => slot.get(),
      _ => panic!("expected a statement expression"),
    };
    let value = match &ret.kind {
      ExprKind::Return(slot) => slot.get(),
      _ => panic!("expected a return"),
    };
    match &value.kind {
      ExprKind::Variable(decl) => assert!(std::ptr::eq(*decl, x_decl)),
      other => panic!("expected a variable reference, got {}", other.as_ref()),
    }
  }

  #[test]
  fn constant_uses_become_constant_nodes() {
    let arena = Bump::new();
    let source = b"const k = 5\nfn get [] -> i32 (return k)";
    let ast = parse_and_link(&arena, source).unwrap();
    let get = ast.root.declarations[1];
    let ret = match &body_statements(get)[0] {
      StmtNode::Expr(slot) => slot.get(),
      _ => panic!("expected a statement expression"),
    };
    let value = match &ret.kind {
      ExprKind::Return(slot) => slot.get(),
      _ => panic!("expected a return"),
    };
    // the replacement is the expression node, not the declaration node
    match &value.kind {
      ExprKind::Constant(decl) => assert_eq!(decl.name, b"k"),
      other => panic!("expected a constant reference, got {}", other.as_ref()),
    }
  }

  #[test]
  fn parameters_are_visible_in_the_body() {
    let arena = Bump::new();
    let source = b"fn inc [x: i32] -> i32 (return x + 1)";
    let ast = parse_and_link(&arena, source).unwrap();
    let inc = ast.root.declarations[0];
    let literal = match &inc.initializer.get().unwrap().kind {
      ExprKind::FuncLiteral(literal) => *literal,
      _ => panic!("expected a function literal"),
    };
    let ret = match &body_statements(inc)[0] {
      StmtNode::Expr(slot) => slot.get(),
      _ => panic!("expected a statement expression"),
    };
    let value = match &ret.kind {
      ExprKind::Return(slot) => slot.get(),
      _ => panic!("expected a return"),
    };
    let args = match &value.kind {
      ExprKind::FuncCall { parameters, .. } => parameters,
      _ => panic!("expected a call"),
    };
    match &args[0].get().kind {
      ExprKind::Variable(decl) => assert!(std::ptr::eq(*decl, literal.parameters[0])),
      other => panic!("expected a variable reference, got {}", other.as_ref()),
    }
  }

  #[test]
  fn no_unknown_identifier_survives_linking() {
    let arena = Bump::new();
    let source = b"var x: i32 = 0\nconst k = 2\nfn f [y: i32] -> i32 (\n  x = y\n  return x + k\n)";
    let ast = parse_and_link(&arena, source).unwrap();
    for &decl in ast.root.declarations {
      if let Some(init) = decl.initializer.get() {
        assert_no_unknown_identifiers(init);
      }
    }
  }

  #[test]
  fn unresolved_names_fail() {
    let arena = Bump::new();
    let err = parse_and_link(&arena, b"fn f [] (return y)").unwrap_err();
    assert!(err.contains("No symbol in scope named 'y'."));
    assert!(err.starts_with("Resolution error: test.aln:"));
  }

  #[test]
  fn declarations_bind_in_order_within_a_scope() {
    let arena = Bump::new();
    // the use site precedes the declaration inside the same scope
    let err = parse_and_link(&arena, b"fn f [] (\n  val a: i32 = b\n  val b: i32 = 0\n)")
      .unwrap_err();
    assert!(err.contains("No symbol in scope named 'b'."));
  }

  #[test]
  fn forward_nominal_type_references_resolve() {
    let arena = Bump::new();
    let source = b"val x: money = 0\ntype money : i32";
    let ast = parse_and_link(&arena, source).unwrap();
    assert_eq!(*ast.root.declarations[0].ty.get(), Type::I32);
  }

  #[test]
  fn nominal_chains_resolve_transitively() {
    let arena = Bump::new();
    let source = b"val x: a = 0\ntype a : b\ntype b : i64";
    let ast = parse_and_link(&arena, source).unwrap();
    assert_eq!(*ast.root.declarations[0].ty.get(), Type::I64);
    // the intermediate declaration is rewritten too
    assert_eq!(*ast.root.declarations[1].ty.get(), Type::I64);
  }

  #[test]
  fn nominal_types_resolve_inside_compound_types() {
    let arena = Bump::new();
    let source = b"val p: @money = 0\ntype money : i32";
    let ast = parse_and_link(&arena, source).unwrap();
    assert_eq!(
      *ast.root.declarations[0].ty.get(),
      Type::Pointer(&Type::I32)
    );
  }

  #[test]
  fn undeclared_nominal_type_fails() {
    let arena = Bump::new();
    let err = parse_and_link(&arena, b"val x: money = 0").unwrap_err();
    assert!(err.contains("No type in scope named 'money'."));
  }

  #[test]
  fn cyclic_nominal_types_fail() {
    let arena = Bump::new();
    let err = parse_and_link(&arena, b"type a : b\ntype b : a").unwrap_err();
    assert!(err.contains("Cyclic nominal type definition"));
  }

  #[test]
  fn type_names_are_not_values() {
    let arena = Bump::new();
    let err = parse_and_link(&arena, b"type t : i32\nfn f [] (return t)").unwrap_err();
    assert!(err.contains("names a type and cannot be used as a value"));
  }

  #[test]
  fn function_return_types_resolve() {
    let arena = Bump::new();
    let source = b"fn get [] -> money (return 0)\ntype money : i32";
    let ast = parse_and_link(&arena, source).unwrap();
    let get = ast.root.declarations[0];
    assert_eq!(
      *get.ty.get(),
      Type::Function {
        parameter_types: &[],
        return_type: &Type::I32,
      }
    );
  }

  #[test]
  fn builtins_are_linkable() {
    let arena = Bump::new();
    let source = b"fn alloc_one [] -> @u8 (return cmalloc[8])";
    // cmalloc is a call target here, not a value, so linking just passes
    assert!(parse_and_link(&arena, source).is_ok());
  }

  #[test]
  fn namespace_declarations_are_visible_to_nested_namespaces() {
    let arena = Bump::new();
    let source = b"const k = 1\nnamespace inner {\n  fn get [] -> i32 (return k)\n}";
    assert!(parse_and_link(&arena, source).is_ok());
  }
}
