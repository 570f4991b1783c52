//! End-to-end runs of the whole front-end: lex, parse, link, check, and
//! where it helps, C emission.

use alnair::ast::{Ast, DeclKind, ExprKind, StmtNode};
use alnair::astbuilder::construct_ast;
use alnair::cgen::gen_c_code;
use alnair::dlogger::DiagnosticLog;
use alnair::linkrefs::link_references;
use alnair::token::TokenKind;
use alnair::tokenize::lex;
use alnair::typecheck::check_types;
use alnair::types::Type;
use bumpalo::Bump;
use indoc::indoc;
use pretty_assertions::assert_eq;

#[derive(Debug)]
struct Compiled<'a> {
  ast: Ast<'a, 'a>,
  type_check_passed: bool,
  diagnostics: usize,
}

fn compile<'a>(arena: &'a Bump, source: &'a str) -> Result<Compiled<'a>, String> {
  let mut log = DiagnosticLog::new();
  let tokens = lex(
    source.as_bytes(),
    log.get_logger(Some(String::from("alnc-lex"))),
  );
  assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));

  let ast =
    construct_ast("input.aln", source.as_bytes(), &tokens, arena).map_err(|e| e.to_string())?;
  link_references(&ast, arena).map_err(|e| e.to_string())?;
  let type_check_passed =
    check_types(&ast, arena, &mut log.get_logger(Some(String::from("alnc-type"))));
  Ok(Compiled {
    ast,
    type_check_passed,
    diagnostics: log.take().len(),
  })
}

#[test]
fn empty_and_comment_only_sources_are_equivalent() {
  let arena = Bump::new();
  let empty = compile(&arena, "").unwrap();
  assert!(empty.ast.root.declarations.is_empty());
  assert!(empty.ast.root.namespaces.is_empty());
  assert!(empty.type_check_passed);

  let comments = compile(&arena, "# nothing here\n\n#: not even this\n").unwrap();
  assert!(comments.ast.root.declarations.is_empty());
  assert!(comments.ast.root.namespaces.is_empty());
  assert!(comments.type_check_passed);
}

#[test]
fn constant_declaration_round_trips_its_literal() {
  let arena = Bump::new();
  let compiled = compile(&arena, "const answer: i32 = 42").unwrap();
  let decl = compiled.ast.root.declarations[0];
  assert_eq!(decl.name, b"answer");
  assert_eq!(*decl.ty.get(), Type::I32);
  let init = decl.initializer.get().unwrap();
  assert!(matches!(init.kind, ExprKind::IntegerLiteral));
  assert_eq!(init.code.text, b"42");
  assert!(compiled.type_check_passed);
}

#[test]
fn function_pipeline_end_to_end() {
  let arena = Bump::new();
  let source = indoc! {"
    fn inc [x: i32] -> i32 (
      return x + 1
    )
  "};
  let compiled = compile(&arena, source).unwrap();
  assert!(compiled.type_check_passed);
  assert_eq!(compiled.diagnostics, 0);

  let inc = compiled.ast.root.declarations[0];
  assert_eq!(inc.kind, DeclKind::Constant);
  assert_eq!(
    *inc.ty.get(),
    Type::Function {
      parameter_types: &[&Type::I32],
      return_type: &Type::I32,
    }
  );

  // the use of x now points at the parameter declaration
  let literal = match &inc.initializer.get().unwrap().kind {
    ExprKind::FuncLiteral(literal) => *literal,
    _ => panic!("expected a function literal"),
  };
  let statements = match &literal.body.get().kind {
    ExprKind::Scope { statements } => *statements,
    _ => panic!("expected a scope"),
  };
  let ret = match &statements[0] {
    StmtNode::Expr(slot) => slot.get(),
    _ => panic!("expected an expression statement"),
  };
  let value = match &ret.kind {
    ExprKind::Return(slot) => slot.get(),
    _ => panic!("expected a return"),
  };
  let args = match &value.kind {
    ExprKind::FuncCall { name, parameters } => {
      assert_eq!(*name, b"+");
      parameters
    }
    _ => panic!("expected a call"),
  };
  match &args[0].get().kind {
    ExprKind::Variable(decl) => assert!(std::ptr::eq(*decl, literal.parameters[0])),
    _ => panic!("expected a linked variable"),
  }

  let mut out: Vec<u8> = vec![];
  gen_c_code(&compiled.ast, &mut out).unwrap();
  let c = String::from_utf8(out).unwrap();
  assert!(c.contains("int32_t inc (int32_t x) {"), "{}", c);
  assert!(c.contains("return (x + 1);"), "{}", c);
}

#[test]
fn precedence_shapes_the_tree() {
  let arena = Bump::new();
  let compiled = compile(&arena, "const r = 1 + 2 * 3 == 7").unwrap();
  let init = compiled.ast.root.declarations[0].initializer.get().unwrap();
  let (name, args) = match &init.kind {
    ExprKind::FuncCall { name, parameters } => (*name, parameters),
    _ => panic!("expected a call"),
  };
  assert_eq!(name, b"==");
  let (plus, plus_args) = match &args[0].get().kind {
    ExprKind::FuncCall { name, parameters } => (*name, parameters),
    _ => panic!("expected a call"),
  };
  assert_eq!(plus, b"+");
  let (mul, _) = match &plus_args[1].get().kind {
    ExprKind::FuncCall { name, parameters } => (*name, parameters),
    _ => panic!("expected a call"),
  };
  assert_eq!(mul, b"*");
  assert_eq!(args[1].get().code.text, b"7");
}

#[test]
fn pointer_program_with_builtins_compiles() {
  let arena = Bump::new();
  let source = indoc! {"
    var x: i32 = 0
    val p: @i32 = @x

    fn alloc_one [] -> @u8 (
      return cmalloc[8]
    )
  "};
  let compiled = compile(&arena, source).unwrap();
  assert!(compiled.type_check_passed);
  let p = compiled.ast.root.declarations[1];
  assert_eq!(*p.ty.get(), Type::Pointer(&Type::I32));
  let init = p.initializer.get().unwrap();
  match &init.kind {
    ExprKind::AddressOf(slot) => {
      assert!(matches!(slot.get().kind, ExprKind::Variable(_)));
    }
    _ => panic!("expected an address-of initializer"),
  }
}

#[test]
fn namespaces_group_declarations() {
  let arena = Bump::new();
  let source = indoc! {"
    namespace math {
      const two = 2

      fn double [x: i32] -> i32 (
        return x * two
      )
    }
  "};
  let compiled = compile(&arena, source).unwrap();
  assert!(compiled.type_check_passed);
  assert_eq!(compiled.ast.root.namespaces.len(), 1);
  let math = compiled.ast.root.namespaces[0];
  assert_eq!(math.name, b"math");
  assert_eq!(math.declarations.len(), 2);
}

#[test]
fn nominal_types_resolve_across_the_file() {
  let arena = Bump::new();
  let source = indoc! {"
    val balance: money = 0
    type money : i64
    var amount: i64 = 1

    fn deposit [m: money] (
      amount = m
    )
  "};
  let compiled = compile(&arena, source).unwrap();
  assert!(compiled.type_check_passed, "nominal types are structural");
  assert_eq!(*compiled.ast.root.declarations[0].ty.get(), Type::I64);
}

#[test]
fn missing_initializer_is_a_parse_error_with_location() {
  let arena = Bump::new();
  let err = compile(&arena, "const x").unwrap_err();
  assert_eq!(
    err,
    "Parse error: input.aln:1:7: Constant 'x' has no initializer."
  );
}

#[test]
fn redeclaration_is_a_parse_error() {
  let arena = Bump::new();
  let err = compile(&arena, "const x = 1\nconst x = 2").unwrap_err();
  assert!(err.starts_with("Parse error: input.aln:2:"));
  assert!(err.contains("but something with the same name is already in scope"));
}

#[test]
fn unresolved_identifier_is_a_resolution_error() {
  let arena = Bump::new();
  let err = compile(&arena, "fn f [] (return ghost)").unwrap_err();
  assert!(err.starts_with("Resolution error: input.aln:1:"));
  assert!(err.contains("No symbol in scope named 'ghost'."));
}

#[test]
fn type_mismatch_fails_the_check() {
  let arena = Bump::new();
  let source = indoc! {"
    var narrow: i32 = 0
    var wide: i64 = 1

    fn blend [] (
      narrow = wide
    )
  "};
  let compiled = compile(&arena, source).unwrap();
  assert!(!compiled.type_check_passed);
  assert_eq!(compiled.diagnostics, 1);
}

#[test]
fn deep_scope_nesting_parses() {
  let arena = Bump::new();
  let mut source = String::from("const deep = ");
  for _ in 0..64 {
    source.push('(');
  }
  source.push('1');
  for _ in 0..64 {
    source.push(')');
  }
  let compiled = compile(&arena, &source).unwrap();
  assert!(compiled.type_check_passed);
}

#[test]
fn generic_brackets_lex_against_comparisons() {
  // lexing only; the parser does not consume generic argument lists yet
  let mut log = DiagnosticLog::new();
  let tokens = lex(b"box`<i32>", log.get_logger(Some(String::from("alnc-lex"))));
  let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
  assert_eq!(
    kinds,
    vec![
      TokenKind::Identifier,
      TokenKind::GenericLeft,
      TokenKind::Identifier,
      TokenKind::GenericRight,
      TokenKind::Eof,
    ]
  );
  assert!(log.take().is_empty());
}

#[test]
fn root_namespace_spans_first_to_last_token() {
  let arena = Bump::new();
  let source = "var a: i32 = 1\nvar b: i32 = 2";
  let compiled = compile(&arena, source).unwrap();
  assert_eq!(compiled.ast.root.code.text, source.as_bytes());
}
