//! Static semantics over statement lists.
//!
//! These are the "bound names" facts the binder records in the scope tree
//! and the declaration instantiation generators replay: which names a body
//! declares with `var`, which it declares lexically, and which function
//! declarations it hoists.

use crate::ast::*;

/// A lexically scoped declaration found directly in a statement list.
#[derive(Debug, Clone, Copy)]
pub struct LexicalDeclaration<'a> {
    /// The bound name
    pub name: &'a str,
    /// `let`, `const`, or a block-level function declaration
    pub kind: LexicalKind,
    /// The function node for block-level function declarations
    pub function: Option<&'a Function>,
}

/// Kind of a lexical declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexicalKind {
    /// let
    Let,
    /// const
    Const,
    /// function declaration in block position
    Function,
}

/// VarDeclaredNames of a function or script body, excluding function
/// declarations. Nested blocks and loop heads are searched; nested functions
/// are not. Duplicates are removed, first occurrence wins.
pub fn var_declared_names(body: &[Statement]) -> Vec<&str> {
    let mut names = Vec::new();
    for stmt in body {
        collect_var_names(stmt, &mut names);
    }
    names
}

fn push_unique<'a>(names: &mut Vec<&'a str>, name: &'a str) {
    if !names.contains(&name) {
        names.push(name);
    }
}

fn collect_var_declaration<'a>(decl: &'a VariableDeclaration, names: &mut Vec<&'a str>) {
    if decl.kind == VariableKind::Var {
        for d in &decl.declarations {
            push_unique(names, &d.id.name);
        }
    }
}

fn collect_var_names<'a>(stmt: &'a Statement, names: &mut Vec<&'a str>) {
    match stmt {
        Statement::VariableDeclaration(decl) => collect_var_declaration(decl, names),
        Statement::Block(block) => {
            for s in &block.body {
                collect_var_names(s, names);
            }
        }
        Statement::If(s) => {
            collect_var_names(&s.consequent, names);
            if let Some(alt) = &s.alternate {
                collect_var_names(alt, names);
            }
        }
        Statement::Switch(s) => {
            for inner in s.statements() {
                collect_var_names(inner, names);
            }
        }
        Statement::While(s) => collect_var_names(&s.body, names),
        Statement::DoWhile(s) => collect_var_names(&s.body, names),
        Statement::For(s) => {
            if let Some(ForInit::Declaration(decl)) = &s.init {
                collect_var_declaration(decl, names);
            }
            collect_var_names(&s.body, names);
        }
        Statement::ForIn(ForInStatement { left, body, .. })
        | Statement::ForOf(ForOfStatement { left, body, .. }) => {
            if let ForHead::Declaration(decl) = left {
                collect_var_declaration(decl, names);
            }
            collect_var_names(body, names);
        }
        Statement::Try(s) => {
            for inner in &s.block.body {
                collect_var_names(inner, names);
            }
            if let Some(handler) = &s.handler {
                for inner in &handler.body.body {
                    collect_var_names(inner, names);
                }
            }
            if let Some(finalizer) = &s.finalizer {
                for inner in &finalizer.body {
                    collect_var_names(inner, names);
                }
            }
        }
        Statement::With(s) => collect_var_names(&s.body, names),
        Statement::Labeled(s) => collect_var_names(&s.body, names),
        Statement::FunctionDeclaration(_)
        | Statement::Expression(_)
        | Statement::Return(_)
        | Statement::Break(_)
        | Statement::Continue(_)
        | Statement::Throw(_)
        | Statement::Debugger
        | Statement::Empty => {}
    }
}

/// Function declarations hoisted to the top of a function or script body,
/// in source order. Labelled function declarations count as top-level.
pub fn var_scoped_functions(body: &[Statement]) -> Vec<&Function> {
    body.iter().filter_map(function_declaration).collect()
}

fn function_declaration(stmt: &Statement) -> Option<&Function> {
    match stmt {
        Statement::FunctionDeclaration(f) => Some(f),
        Statement::Labeled(s) => function_declaration(&s.body),
        _ => None,
    }
}

/// `let`/`const` declarations directly in a function or script body.
pub fn top_level_lexical_declarations(body: &[Statement]) -> Vec<LexicalDeclaration<'_>> {
    let mut out = Vec::new();
    for stmt in body {
        collect_let_const(stmt, &mut out);
    }
    out
}

/// Lexical declarations directly in a block or case block: `let`, `const`
/// and function declarations.
pub fn block_lexical_declarations<'a, I>(body: I) -> Vec<LexicalDeclaration<'a>>
where
    I: IntoIterator<Item = &'a Statement>,
{
    let mut out = Vec::new();
    for stmt in body {
        collect_let_const(stmt, &mut out);
        if let Some(f) = function_declaration(stmt) {
            if let Some(name) = f.name() {
                out.push(LexicalDeclaration {
                    name,
                    kind: LexicalKind::Function,
                    function: Some(f),
                });
            }
        }
    }
    out
}

fn collect_let_const<'a>(stmt: &'a Statement, out: &mut Vec<LexicalDeclaration<'a>>) {
    if let Statement::VariableDeclaration(decl) = stmt {
        let kind = match decl.kind {
            VariableKind::Var => return,
            VariableKind::Let => LexicalKind::Let,
            VariableKind::Const => LexicalKind::Const,
        };
        for d in &decl.declarations {
            out.push(LexicalDeclaration {
                name: &d.id.name,
                kind,
                function: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;

    #[test]
    fn test_var_names_search_nested_statements() {
        let body = vec![
            var("a", None),
            block(vec![var("b", None), let_("c", None)]),
            for_(Some(init_var("i", num(0.0))), None, None, block(vec![var("a", None)])),
            function_decl("f", &[], vec![var("hidden", None)]),
            try_catch(vec![var("d", None)], "e", vec![var("e2", None)]),
        ];
        assert_eq!(var_declared_names(&body), vec!["a", "b", "i", "d", "e2"]);
    }

    #[test]
    fn test_block_lexical_includes_functions() {
        let body = vec![
            let_("x", None),
            const_("y", num(1.0)),
            function_decl("f", &[], vec![]),
            var("v", None),
        ];
        let names: Vec<_> = block_lexical_declarations(&body)
            .iter()
            .map(|d| (d.name, d.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("x", LexicalKind::Let),
                ("y", LexicalKind::Const),
                ("f", LexicalKind::Function)
            ]
        );
        assert_eq!(top_level_lexical_declarations(&body).len(), 2);
    }

    #[test]
    fn test_labelled_function_is_hoisted() {
        let body = vec![labeled("L", function_decl("f", &[], vec![]))];
        assert_eq!(var_scoped_functions(&body).len(), 1);
    }
}
