use alnair::astbuilder::construct_ast;
use alnair::cgen::gen_c_code;
use alnair::dlogger::DiagnosticLog;
use alnair::linkrefs::link_references;
use alnair::tokenize::lex;
use alnair::typecheck::check_types;
use bumpalo::Bump;
use lsp_types::Diagnostic;
use std::fs::File;
use std::process::exit;

fn report(diagnostics: &[Diagnostic]) {
  for d in diagnostics {
    let source = d.source.as_deref().unwrap_or("alnc");
    eprintln!(
      "{}: error: {} ({}:{})",
      source,
      d.message,
      d.range.start.line + 1,
      d.range.start.character
    );
  }
}

fn main() {
  println!("alnair v{}", env!("CARGO_PKG_VERSION"));

  let args: Vec<String> = std::env::args().collect();
  if args.len() < 2 {
    println!("You must specify a file to compile.");
    return;
  }

  let source = match std::fs::read(&args[1]) {
    Ok(bytes) => bytes,
    Err(e) => {
      eprintln!("Could not read '{}': {}", args[1], e);
      exit(1);
    }
  };

  let mut log = DiagnosticLog::new();
  let tokens = lex(&source, log.get_logger(Some(String::from("alnc-lex"))));
  let lex_diagnostics = log.take();
  if !lex_diagnostics.is_empty() {
    report(&lex_diagnostics);
    exit(1);
  }

  let arena = Bump::new();
  let ast = match construct_ast(&args[1], &source, &tokens, &arena) {
    Ok(ast) => ast,
    Err(e) => {
      eprintln!("{}", e);
      exit(1);
    }
  };

  if let Err(e) = link_references(&ast, &arena) {
    eprintln!("{}", e);
    exit(1);
  }

  if !check_types(&ast, &arena, &mut log.get_logger(Some(String::from("alnc-type")))) {
    report(&log.take());
    exit(1);
  }

  if args.len() > 2 {
    let mut out = match File::create(&args[2]) {
      Ok(file) => file,
      Err(e) => {
        eprintln!("Could not create '{}': {}", args[2], e);
        exit(1);
      }
    };
    if let Err(e) = gen_c_code(&ast, &mut out) {
      eprintln!("Could not write C output: {}", e);
      exit(1);
    }
  }
}
