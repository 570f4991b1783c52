use super::ast::{CodeSlice, DeclKind, DeclNode};
use super::scope_stack::ScopeStack;
use super::types::Type;
use bumpalo::Bump;
use lsp_types::{Position, Range};
use std::cell::Cell;

fn empty_code<'src>() -> CodeSlice<'src> {
  CodeSlice {
    range: Range {
      start: Position {
        line: 0,
        character: 0,
      },
      end: Position {
        line: 0,
        character: 0,
      },
    },
    offset: 0,
    text: b"",
  }
}

fn builtin_decl<'a, 'src>(
  arena: &'a Bump,
  name: &'src [u8],
  ty: &'a Type<'a, 'src>,
) -> &'a DeclNode<'a, 'src> {
  arena.alloc(DeclNode {
    code: Cell::new(empty_code()),
    name,
    kind: DeclKind::Constant,
    ty: Cell::new(ty),
    initializer: Cell::new(None),
  })
}

/// Registers the C interop builtins in the base scope frame, so they are
/// callable by name and collide with user declarations like any symbol.
pub fn install_builtins<'a, 'src>(
  arena: &'a Bump,
  scopes: &mut ScopeStack<'src, &'a DeclNode<'a, 'src>>,
) {
  let byte: &'a Type = arena.alloc(Type::Byte);
  let u64_t: &'a Type = arena.alloc(Type::U64);
  let void: &'a Type = arena.alloc(Type::Void);
  let byte_ptr: &'a Type = arena.alloc(Type::Pointer(byte));

  // cmalloc: fn [u64] -> @byte
  let cmalloc_params: &'a [&'a Type] = arena.alloc_slice_copy(&[u64_t]);
  let cmalloc_ty: &'a Type = arena.alloc(Type::Function {
    parameter_types: cmalloc_params,
    return_type: byte_ptr,
  });
  scopes.push_symbol(b"cmalloc", builtin_decl(arena, b"cmalloc", cmalloc_ty));

  // cfree: fn [@byte]
  let cfree_params: &'a [&'a Type] = arena.alloc_slice_copy(&[byte_ptr]);
  let cfree_ty: &'a Type = arena.alloc(Type::Function {
    parameter_types: cfree_params,
    return_type: void,
  });
  scopes.push_symbol(b"cfree", builtin_decl(arena, b"cfree", cfree_ty));
}
