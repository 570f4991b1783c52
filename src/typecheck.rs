use super::ast::{Ast, DeclNode, Expr, ExprKind, NamespaceNode, StmtNode};
use super::dlogger::DiagnosticLogger;
use super::types::Type;
use bumpalo::Bump;

/// One walk over the linked AST, propagating types up expressions and
/// checking declaration and assignment compatibility. Reports the first
/// mismatch through the logger and returns false; true means every check
/// passed.
pub fn check_types<'a, 'src: 'a>(
  ast: &Ast<'a, 'src>,
  arena: &'a Bump,
  dlogger: &mut DiagnosticLogger,
) -> bool {
  check_namespace(arena, dlogger, ast.root)
}

fn check_namespace<'a, 'src: 'a>(
  arena: &'a Bump,
  dlogger: &mut DiagnosticLogger,
  ns: &NamespaceNode<'a, 'src>,
) -> bool {
  for &decl in ns.declarations {
    if !check_decl(arena, dlogger, decl) {
      return false;
    }
  }
  for &sub in ns.namespaces {
    if !check_namespace(arena, dlogger, sub) {
      return false;
    }
  }
  true
}

fn check_decl<'a, 'src: 'a>(
  arena: &'a Bump,
  dlogger: &mut DiagnosticLogger,
  decl: &DeclNode<'a, 'src>,
) -> bool {
  let init = match decl.initializer.get() {
    Some(init) => init,
    None => return true,
  };
  if !check_expr(arena, dlogger, init) {
    return false;
  }

  // until full propagation, some initializers carry no type; they pass
  let init_ty = match init.eval_type.get() {
    Some(ty) => ty,
    None => return true,
  };

  match decl.ty.get() {
    // an omitted declaration type is filled from the initializer
    Type::Infer => {
      decl.ty.set(init_ty);
      true
    }
    declared => {
      if declared != init_ty {
        let code = decl.code.get();
        dlogger.log_type_mismatch(code.range, code.text, init.code.text);
        false
      } else {
        true
      }
    }
  }
}

fn check_expr<'a, 'src: 'a>(
  arena: &'a Bump,
  dlogger: &mut DiagnosticLogger,
  expr: &Expr<'a, 'src>,
) -> bool {
  match &expr.kind {
    ExprKind::Scope { statements } => {
      for stmt in *statements {
        let ok = match stmt {
          StmtNode::Decl(decl) => check_decl(arena, dlogger, decl),
          StmtNode::Expr(slot) => check_expr(arena, dlogger, slot.get()),
        };
        if !ok {
          return false;
        }
      }
      true
    }

    // references take the type of the declaration they resolved to
    ExprKind::Variable(decl) | ExprKind::Constant(decl) => {
      match decl.ty.get() {
        Type::Infer => {}
        ty => expr.eval_type.set(Some(ty)),
      }
      true
    }

    ExprKind::FuncLiteral(literal) => {
      if !check_expr(arena, dlogger, literal.body.get()) {
        return false;
      }
      let mut parameter_types: Vec<&'a Type<'a, 'src>> = vec![];
      for &param in literal.parameters {
        parameter_types.push(param.ty.get());
      }
      let parameter_types = &*arena.alloc_slice_copy(&parameter_types);
      let ty: &'a Type<'a, 'src> = arena.alloc(Type::Function {
        parameter_types,
        return_type: literal.return_type.get(),
      });
      expr.eval_type.set(Some(ty));
      true
    }

    ExprKind::Assignment { lhs, rhs } => {
      if !check_expr(arena, dlogger, lhs.get()) {
        return false;
      }
      if !check_expr(arena, dlogger, rhs.get()) {
        return false;
      }
      if let (Some(lhs_ty), Some(rhs_ty)) = (lhs.get().eval_type.get(), rhs.get().eval_type.get())
      {
        if lhs_ty != rhs_ty {
          dlogger.log_type_mismatch(expr.code.range, lhs.get().code.text, rhs.get().code.text);
          return false;
        }
      }
      true
    }

    ExprKind::FuncCall { parameters, .. } => {
      for slot in *parameters {
        if !check_expr(arena, dlogger, slot.get()) {
          return false;
        }
      }
      true
    }

    ExprKind::Return(slot) | ExprKind::AddressOf(slot) | ExprKind::Deref(slot) => {
      check_expr(arena, dlogger, slot.get())
    }

    // literals and empty expressions carry no type yet
    _ => true,
  }
}
