use super::ast::{Ast, DeclKind, DeclNode, Expr, ExprKind, StmtNode};
use super::types::Type;
use std::io::{self, Write};

/// Lowers a checked AST to C. Only the constructs the front-end produces
/// today are emitted: constant function definitions, variable and constant
/// declarations, returns, assignments, calls, and integer/float literals.
pub fn gen_c_code(ast: &Ast, out: &mut dyn Write) -> io::Result<()> {
  writeln!(out, "#include <stdint.h>")?;
  writeln!(out)?;

  for &decl in ast.root.declarations {
    gen_c_decl(decl, out)?;
    writeln!(out, ";")?;
  }
  Ok(())
}

fn gen_c_type(ty: &Type, out: &mut dyn Write) -> io::Result<()> {
  match ty {
    Type::Void => write!(out, "void"),
    Type::Byte | Type::U8 => write!(out, "uint8_t"),
    Type::I8 => write!(out, "int8_t"),
    Type::I16 => write!(out, "int16_t"),
    Type::I32 => write!(out, "int32_t"),
    Type::I64 => write!(out, "int64_t"),
    Type::U16 => write!(out, "uint16_t"),
    Type::U32 => write!(out, "uint32_t"),
    Type::U64 => write!(out, "uint64_t"),
    // no f16 type in C; the bit pattern travels in a u16
    Type::F16 => write!(out, "uint16_t"),
    Type::F32 => write!(out, "float"),
    Type::F64 => write!(out, "double"),
    Type::CodePoint => write!(out, "uint32_t"),
    Type::Pointer(pointee) => {
      gen_c_type(pointee, out)?;
      write!(out, "*")
    }
    // aggregate emission is the code generator's next milestone
    _ => Ok(()),
  }
}

// the operators that exist verbatim in C
fn is_c_infix(name: &[u8]) -> bool {
  matches!(
    name,
    b"+" | b"-" | b"*" | b"/" | b"==" | b"!=" | b"<" | b">" | b"<=" | b">="
  )
}

fn gen_c_expression(expr: &Expr, out: &mut dyn Write) -> io::Result<()> {
  match &expr.kind {
    ExprKind::IntegerLiteral | ExprKind::FloatLiteral => out.write_all(expr.code.text),
    ExprKind::Variable(decl) | ExprKind::Constant(decl) => out.write_all(decl.name),
    ExprKind::AddressOf(slot) => {
      write!(out, "&")?;
      gen_c_expression(slot.get(), out)
    }
    ExprKind::Deref(slot) => {
      write!(out, "*")?;
      gen_c_expression(slot.get(), out)
    }
    ExprKind::Assignment { lhs, rhs } => {
      gen_c_expression(lhs.get(), out)?;
      write!(out, " = ")?;
      gen_c_expression(rhs.get(), out)
    }
    ExprKind::Return(slot) => {
      write!(out, "return ")?;
      gen_c_expression(slot.get(), out)
    }
    ExprKind::FuncCall { name, parameters } => {
      if is_c_infix(name) && parameters.len() == 2 {
        write!(out, "(")?;
        gen_c_expression(parameters[0].get(), out)?;
        write!(out, " ")?;
        out.write_all(name)?;
        write!(out, " ")?;
        gen_c_expression(parameters[1].get(), out)?;
        write!(out, ")")
      } else {
        out.write_all(name)?;
        write!(out, "(")?;
        for (i, slot) in parameters.iter().enumerate() {
          if i > 0 {
            write!(out, ", ")?;
          }
          gen_c_expression(slot.get(), out)?;
        }
        write!(out, ")")
      }
    }
    _ => Ok(()),
  }
}

fn gen_c_statement(stmt: &StmtNode, out: &mut dyn Write) -> io::Result<()> {
  match stmt {
    StmtNode::Decl(decl) => gen_c_decl(decl, out)?,
    StmtNode::Expr(slot) => gen_c_expression(slot.get(), out)?,
  }
  writeln!(out, ";")
}

fn gen_c_decl(decl: &DeclNode, out: &mut dyn Write) -> io::Result<()> {
  if let Some(init) = decl.initializer.get() {
    if let ExprKind::FuncLiteral(literal) = &init.kind {
      if decl.kind == DeclKind::Constant {
        gen_c_type(literal.return_type.get(), out)?;
        write!(out, " ")?;
        out.write_all(decl.name)?;
        write!(out, " (")?;
        for (i, &param) in literal.parameters.iter().enumerate() {
          if i > 0 {
            write!(out, ", ")?;
          }
          gen_c_type(param.ty.get(), out)?;
          write!(out, " ")?;
          out.write_all(param.name)?;
        }
        writeln!(out, ") {{")?;
        if let ExprKind::Scope { statements } = &literal.body.get().kind {
          for stmt in *statements {
            gen_c_statement(stmt, out)?;
          }
        }
        write!(out, "}}")?;
      }
      return Ok(());
    }
  }

  match decl.kind {
    DeclKind::Variable { .. } => {
      gen_c_type(decl.ty.get(), out)?;
      write!(out, " ")?;
      out.write_all(decl.name)?;
      if let Some(init) = decl.initializer.get() {
        if !matches!(init.kind, ExprKind::Empty) {
          write!(out, " = ")?;
          gen_c_expression(init, out)?;
        }
      }
      Ok(())
    }
    DeclKind::Constant => {
      write!(out, "const ")?;
      gen_c_type(decl.ty.get(), out)?;
      write!(out, " ")?;
      out.write_all(decl.name)?;
      if let Some(init) = decl.initializer.get() {
        write!(out, " = ")?;
        gen_c_expression(init, out)?;
      }
      Ok(())
    }
    // type aliases vanish at this level
    DeclKind::NominalType => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::astbuilder::construct_ast;
  use crate::dlogger::DiagnosticLog;
  use crate::linkrefs::link_references;
  use crate::tokenize::lex;
  use bumpalo::Bump;

  fn generate<'a>(arena: &'a Bump, source: &'a [u8]) -> String {
    let mut log = DiagnosticLog::new();
    let tokens = lex(source, log.get_logger(Some(String::from("test-lex"))));
    let ast = construct_ast("test.aln", source, &tokens, arena).expect("parse failed");
    link_references(&ast, arena).expect("linking failed");
    let mut out: Vec<u8> = vec![];
    gen_c_code(&ast, &mut out).unwrap();
    String::from_utf8(out).unwrap()
  }

  #[test]
  fn emits_the_stdint_header() {
    let arena = Bump::new();
    let c = generate(&arena, b"");
    assert!(c.starts_with("#include <stdint.h>\n"));
  }

  #[test]
  fn emits_function_definitions() {
    let arena = Bump::new();
    let c = generate(&arena, b"fn inc [x: i32] -> i32 (return x + 1)");
    assert!(c.contains("int32_t inc (int32_t x) {"), "{}", c);
    assert!(c.contains("return (x + 1);"), "{}", c);
  }

  #[test]
  fn emits_variable_declarations() {
    let arena = Bump::new();
    let c = generate(&arena, b"var x: i32 = 0");
    assert!(c.contains("int32_t x = 0;"), "{}", c);
  }

  #[test]
  fn emits_constant_declarations() {
    let arena = Bump::new();
    let c = generate(&arena, b"const k: i64 = 5");
    assert!(c.contains("const int64_t k = 5;"), "{}", c);
  }

  #[test]
  fn uninitialized_variables_have_no_initializer() {
    let arena = Bump::new();
    let c = generate(&arena, b"var x: u8");
    assert!(c.contains("uint8_t x;"), "{}", c);
  }

  #[test]
  fn pointer_types_and_builtin_calls() {
    let arena = Bump::new();
    let c = generate(&arena, b"fn alloc_one [] -> @u8 (return cmalloc[8])");
    assert!(c.contains("uint8_t* alloc_one () {"), "{}", c);
    assert!(c.contains("return cmalloc(8);"), "{}", c);
  }

  #[test]
  fn assignments_and_derefs() {
    let arena = Bump::new();
    let c = generate(
      &arena,
      b"var x: i32 = 0\nfn set [p: @i32] ($p = x)",
    );
    assert!(c.contains("*p = x;"), "{}", c);
  }
}
