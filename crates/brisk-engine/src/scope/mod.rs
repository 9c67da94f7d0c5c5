//! Static scope model and name resolution.
//!
//! The binder turns a [`Program`](crate::ast::Program) into a [`ScopeTree`]:
//! one [`Scope`] per script, module, function, block, catch clause, `with`
//! statement and lexical loop head, each annotated with the names it declares.
//! The tree is built once before code generation and is read-only afterwards,
//! so it can be shared by concurrent compilations.
//!
//! Scopes live in an arena and refer to their parent by index; nothing
//! points downwards.

mod binder;
pub mod declarations;

use rustc_hash::FxHashMap;

use crate::ast::{
    BlockStatement, CatchClause, ForInStatement, ForOfStatement, ForStatement, Function, Program,
    SwitchStatement, WithStatement,
};

pub use binder::analyze;

/// Index of a scope in its [`ScopeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    /// Returns the arena index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The kind of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Top level of a classic script; backed by the global environment
    Script,
    /// Top level of a module
    Module,
    /// Function body, including its parameters
    Function,
    /// Block, case block or lexical loop head
    Block,
    /// `with` statement body
    With,
    /// Catch clause parameter
    Catch,
}

/// The kind of a declared name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// var declaration
    Var,
    /// let declaration
    Let,
    /// const declaration
    Const,
    /// function declaration
    Function,
    /// formal parameter or catch parameter
    Parameter,
    /// the implicit `arguments` object
    Arguments,
    /// the name of a named function expression, bound inside itself
    Callee,
    /// module import, pre-resolved by the host
    Import,
}

impl BindingKind {
    /// Returns true for bindings in the temporal dead zone until initialized.
    pub fn has_tdz(self) -> bool {
        matches!(self, BindingKind::Let | BindingKind::Const)
    }

    /// Returns true for bindings created with `CreateImmutableBinding`.
    pub fn is_immutable(self) -> bool {
        matches!(
            self,
            BindingKind::Const | BindingKind::Callee | BindingKind::Import
        )
    }

    /// Returns true for let/const.
    pub fn is_lexical(self) -> bool {
        matches!(self, BindingKind::Let | BindingKind::Const)
    }
}

/// A declared name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// The bound identifier
    pub name: String,
    /// How it was declared
    pub kind: BindingKind,
}

/// Identity of an AST node that owns a scope.
///
/// Keys are taken from node addresses, which are stable while the program is
/// borrowed for compilation. The node kind is part of the key because a node
/// and its first field can share an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey {
    addr: usize,
    kind: NodeKind,
}

/// Kinds of scope-owning nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Program
    Program,
    /// Function
    Function,
    /// BlockStatement
    Block,
    /// SwitchStatement
    Switch,
    /// CatchClause
    Catch,
    /// WithStatement
    With,
    /// ForStatement
    For,
    /// ForInStatement
    ForIn,
    /// ForOfStatement
    ForOf,
}

/// AST nodes that may own a scope.
pub trait ScopedNode: Sized {
    /// The node kind used in [`NodeKey`]
    const KIND: NodeKind;

    /// Returns the key identifying this node.
    fn node_key(&self) -> NodeKey {
        NodeKey {
            addr: self as *const Self as usize,
            kind: Self::KIND,
        }
    }
}

macro_rules! scoped_node {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(impl ScopedNode for $ty {
            const KIND: NodeKind = NodeKind::$kind;
        })*
    };
}

scoped_node! {
    Program => Program,
    Function => Function,
    BlockStatement => Block,
    SwitchStatement => Switch,
    CatchClause => Catch,
    WithStatement => With,
    ForStatement => For,
    ForInStatement => ForIn,
    ForOfStatement => ForOf,
}

/// A node in the static scope tree.
#[derive(Debug, Clone)]
pub struct Scope {
    kind: ScopeKind,
    parent: Option<ScopeId>,
    node: NodeKey,
    bindings: Vec<Binding>,
    index: FxHashMap<String, u32>,
    dynamic: bool,
    strict: bool,
    arrow: bool,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>, node: NodeKey, strict: bool) -> Self {
        Self {
            kind,
            parent,
            node,
            bindings: Vec::new(),
            index: FxHashMap::default(),
            dynamic: kind == ScopeKind::With,
            strict,
            arrow: false,
        }
    }

    /// The scope kind.
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// The enclosing scope.
    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    /// The owning AST node.
    pub fn node(&self) -> NodeKey {
        self.node
    }

    /// Declared names in slot order.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Returns the binding at `slot`.
    pub fn binding(&self, slot: u32) -> Option<&Binding> {
        self.bindings.get(slot as usize)
    }

    /// Returns the slot of a declared name.
    pub fn slot_of(&self, name: &str) -> Option<u32> {
        self.index.get(name).copied()
    }

    /// Returns the kind of a declared name.
    pub fn kind_of(&self, name: &str) -> Option<BindingKind> {
        self.slot_of(name)
            .and_then(|slot| self.binding(slot))
            .map(|b| b.kind)
    }

    /// Returns true when resolution through this scope needs a runtime probe.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Returns true for strict mode code.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Returns true for arrow function scopes.
    pub fn is_arrow(&self) -> bool {
        self.arrow
    }

    /// Returns true when entering this scope creates an environment record.
    pub fn materializes(&self) -> bool {
        match self.kind {
            ScopeKind::Script => false,
            ScopeKind::Module | ScopeKind::Function | ScopeKind::With => true,
            ScopeKind::Block | ScopeKind::Catch => !self.bindings.is_empty(),
        }
    }

    /// Returns true for scopes that own `var` declarations.
    pub fn is_var_scope(&self) -> bool {
        matches!(
            self.kind,
            ScopeKind::Script | ScopeKind::Module | ScopeKind::Function
        )
    }
}

/// How an identifier reference is accessed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Declared in a declarative record `hops` records up, at `slot`
    Static {
        /// The declaring scope
        scope: ScopeId,
        /// Environment records to skip
        hops: u32,
        /// Slot in the declaring record
        slot: u32,
    },
    /// A `with` or eval-bearing scope lies on the path: probe the chain by name
    Dynamic,
    /// Declared at script level or not declared at all: look up the global
    /// environment by name
    Global,
    /// Not declared in the requested scope (only with `current_scope_only`)
    Unresolved,
}

/// A resolved identifier reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    /// The identifier text
    pub identifier: String,
    /// Access path
    pub resolution: Resolution,
    /// Declaration kind when the declaring scope is known statically
    pub kind: Option<BindingKind>,
}

impl Name {
    /// Returns true when reads must check for an uninitialized binding.
    pub fn needs_tdz_check(&self) -> bool {
        self.kind.is_some_and(BindingKind::has_tdz)
    }

    /// Returns true when the binding is a `const` or otherwise immutable.
    pub fn is_immutable(&self) -> bool {
        self.kind.is_some_and(BindingKind::is_immutable)
    }
}

/// The static scope tree of one program.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    by_node: FxHashMap<NodeKey, ScopeId>,
}

impl ScopeTree {
    fn new() -> Self {
        Self {
            scopes: Vec::new(),
            by_node: FxHashMap::default(),
        }
    }

    fn push(&mut self, scope: Scope) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.by_node.insert(scope.node, id);
        self.scopes.push(scope);
        id
    }

    fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    /// The program scope.
    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Number of scopes.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Returns true for an empty tree.
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Returns the scope with the given id.
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    /// Returns the scope owned by `node`, if it owns one.
    pub fn scope_of<T: ScopedNode>(&self, node: &T) -> Option<ScopeId> {
        self.by_node.get(&node.node_key()).copied()
    }

    /// Returns the nearest enclosing scope that owns `var` declarations.
    pub fn var_scope(&self, mut id: ScopeId) -> ScopeId {
        loop {
            let scope = self.scope(id);
            match scope.parent {
                Some(parent) if !scope.is_var_scope() => id = parent,
                _ => return id,
            }
        }
    }

    /// Resolves `identifier` as seen from `from`.
    ///
    /// Walks outward until a declaring scope is found. Passing through a
    /// dynamic scope without finding the name makes the result
    /// [`Resolution::Dynamic`], even if a declaring scope is found further
    /// out. Names declared at script level, or not at all, resolve to
    /// [`Resolution::Global`]. With `current_scope_only`, only `from` itself
    /// is searched and a miss yields [`Resolution::Unresolved`].
    pub fn resolve_name(&self, from: ScopeId, identifier: &str, current_scope_only: bool) -> Name {
        let mut id = from;
        let mut hops = 0;
        let mut dynamic = false;

        loop {
            let scope = self.scope(id);
            let declared = scope.slot_of(identifier);

            if scope.kind == ScopeKind::Script {
                return Name {
                    identifier: identifier.to_string(),
                    resolution: match (dynamic, current_scope_only && declared.is_none()) {
                        (_, true) => Resolution::Unresolved,
                        (true, false) => Resolution::Dynamic,
                        (false, false) => Resolution::Global,
                    },
                    kind: scope.kind_of(identifier),
                };
            }

            if let Some(slot) = declared {
                let kind = scope.binding(slot).map(|b| b.kind);
                let resolution = if dynamic {
                    Resolution::Dynamic
                } else {
                    Resolution::Static {
                        scope: id,
                        hops,
                        slot,
                    }
                };
                return Name {
                    identifier: identifier.to_string(),
                    resolution,
                    kind,
                };
            }

            if current_scope_only {
                return Name {
                    identifier: identifier.to_string(),
                    resolution: Resolution::Unresolved,
                    kind: None,
                };
            }

            dynamic |= scope.dynamic;
            if scope.materializes() {
                hops += 1;
            }

            match scope.parent {
                Some(parent) => id = parent,
                None => {
                    // Module scopes have no parent; their unresolved names
                    // are still global.
                    return Name {
                        identifier: identifier.to_string(),
                        resolution: if dynamic {
                            Resolution::Dynamic
                        } else {
                            Resolution::Global
                        },
                        kind: None,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;
    use crate::ast::{FunctionBody, Statement};

    fn function_of(stmt: &Statement) -> &Function {
        match stmt {
            Statement::FunctionDeclaration(f) => f,
            other => panic!("not a function declaration: {other:?}"),
        }
    }

    fn body_block(f: &Function) -> &BlockStatement {
        match &f.body {
            FunctionBody::Block(b) => b,
            FunctionBody::Expression(_) => panic!("concise body"),
        }
    }

    #[test]
    fn test_function_scope_table_order() {
        let program = script(vec![function_decl(
            "f",
            &["a", "b"],
            vec![
                var("v", None),
                let_("l", None),
                function_decl("g", &[], vec![]),
                expr_stmt(ident("arguments")),
            ],
        )]);
        let tree = analyze(&program).unwrap();
        let f = function_of(&program.body[0]);
        let scope = tree.scope(tree.scope_of(f).unwrap());

        let names: Vec<_> = scope
            .bindings()
            .iter()
            .map(|b| (b.name.as_str(), b.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a", BindingKind::Parameter),
                ("b", BindingKind::Parameter),
                ("v", BindingKind::Var),
                ("g", BindingKind::Function),
                ("l", BindingKind::Let),
                ("arguments", BindingKind::Arguments),
            ]
        );
    }

    #[test]
    fn test_arguments_shadowed_by_parameter() {
        let program = script(vec![function_decl(
            "f",
            &["arguments"],
            vec![expr_stmt(ident("arguments"))],
        )]);
        let tree = analyze(&program).unwrap();
        let scope = tree.scope(tree.scope_of(function_of(&program.body[0])).unwrap());
        assert_eq!(scope.kind_of("arguments"), Some(BindingKind::Parameter));
        assert_eq!(scope.bindings().len(), 1);
    }

    #[test]
    fn test_static_resolution_counts_materialized_scopes() {
        let program = script(vec![function_decl(
            "f",
            &["x"],
            vec![block(vec![
                expr_stmt(ident("x")),
                block(vec![let_("y", None), expr_stmt(ident("x"))]),
            ])],
        )]);
        let tree = analyze(&program).unwrap();
        let f = function_of(&program.body[0]);
        let fn_scope = tree.scope_of(f).unwrap();

        let outer_block = match &body_block(f).body[0] {
            Statement::Block(b) => b,
            _ => unreachable!(),
        };
        let inner_block = match &outer_block.body[1] {
            Statement::Block(b) => b,
            _ => unreachable!(),
        };

        // The outer block declares nothing, so it adds no hop.
        let outer = tree.scope_of(outer_block).unwrap();
        assert!(!tree.scope(outer).materializes());
        let name = tree.resolve_name(outer, "x", false);
        assert_eq!(
            name.resolution,
            Resolution::Static {
                scope: fn_scope,
                hops: 0,
                slot: 0
            }
        );

        let inner = tree.scope_of(inner_block).unwrap();
        let name = tree.resolve_name(inner, "x", false);
        assert_eq!(
            name.resolution,
            Resolution::Static {
                scope: fn_scope,
                hops: 1,
                slot: 0
            }
        );

        let name = tree.resolve_name(inner, "y", true);
        assert!(name.needs_tdz_check());
        assert!(matches!(name.resolution, Resolution::Static { hops: 0, .. }));
    }

    #[test]
    fn test_with_forces_dynamic_resolution() {
        let program = script(vec![function_decl(
            "f",
            &["x"],
            vec![with(ident("o"), block(vec![expr_stmt(ident("x"))]))],
        )]);
        let tree = analyze(&program).unwrap();
        let f = function_of(&program.body[0]);
        let with_stmt = match &body_block(f).body[0] {
            Statement::With(w) => w,
            _ => unreachable!(),
        };
        let with_scope = tree.scope_of(with_stmt).unwrap();
        assert!(tree.scope(with_scope).is_dynamic());

        let name = tree.resolve_name(with_scope, "x", false);
        assert_eq!(name.resolution, Resolution::Dynamic);
        // The declaration kind is still known, which keeps TDZ checks on.
        assert_eq!(name.kind, Some(BindingKind::Parameter));
    }

    #[test]
    fn test_direct_eval_marks_function_dynamic() {
        let program = script(vec![
            var("outer", None),
            function_decl(
                "f",
                &[],
                vec![
                    expr_stmt(call(ident("eval"), vec![str_lit("var outer = 1")])),
                    function_decl("g", &[], vec![expr_stmt(ident("outer"))]),
                ],
            ),
        ]);
        let tree = analyze(&program).unwrap();
        let f = function_of(&program.body[1]);
        let f_scope = tree.scope_of(f).unwrap();
        assert!(tree.scope(f_scope).is_dynamic());

        let g = function_of(&body_block(f).body[1]);
        let g_scope = tree.scope_of(g).unwrap();
        assert_eq!(
            tree.resolve_name(g_scope, "outer", false).resolution,
            Resolution::Dynamic
        );
        // eval may read `arguments`, so the object is materialized.
        assert_eq!(tree.scope(f_scope).kind_of("arguments"), Some(BindingKind::Arguments));
    }

    #[test]
    fn test_script_names_are_global() {
        let program = script(vec![let_("x", None), expr_stmt(ident("x"))]);
        let tree = analyze(&program).unwrap();
        let name = tree.resolve_name(tree.root(), "x", false);
        assert_eq!(name.resolution, Resolution::Global);
        assert_eq!(name.kind, Some(BindingKind::Let));

        let missing = tree.resolve_name(tree.root(), "nope", true);
        assert_eq!(missing.resolution, Resolution::Unresolved);
    }

    #[test]
    fn test_named_function_expression_binds_itself() {
        let program = script(vec![expr_stmt(function_expr(
            Some("fact"),
            &["n"],
            vec![ret(Some(ident("fact")))],
        ))]);
        let tree = analyze(&program).unwrap();
        let f = match &program.body[0] {
            Statement::Expression(e) => match &e.expression {
                crate::ast::Expression::Function(f) => f,
                _ => unreachable!(),
            },
            _ => unreachable!(),
        };
        let scope = tree.scope_of(f).unwrap();
        assert_eq!(tree.scope(scope).kind_of("fact"), Some(BindingKind::Callee));
    }

    #[test]
    fn test_duplicate_lexical_declaration_is_rejected() {
        let program = script(vec![block(vec![let_("a", None), let_("a", None)])]);
        assert!(matches!(analyze(&program), Err(crate::Error::Syntax(_))));

        let program = script(vec![function_decl(
            "f",
            &[],
            vec![var("a", None), let_("a", None)],
        )]);
        assert!(matches!(analyze(&program), Err(crate::Error::Syntax(_))));
    }
}
