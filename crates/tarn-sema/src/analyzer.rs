use std::collections::HashMap;

use log::debug;
use tarn_frontend::ast::{BinOp, Expr, ExprKind, Literal, Stmt};
use tarn_frontend::types::{FunctionType, StructType, Type};

use crate::diag::Diagnostic;

/// Decorates every expression with its type and checks structural
/// compatibility. The AST's shape is never changed; only the `ty` slots and
/// the analyzer's own tables are written. Running it again over an already
/// decorated tree reproduces the same decorations.
pub struct Analyzer {
    structs: HashMap<String, StructType>,
    scope: HashMap<String, Type>,
    current_ret: Option<Type>,
    diags: Vec<Diagnostic>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    pub fn new() -> Self {
        Analyzer {
            structs: HashMap::new(),
            scope: HashMap::new(),
            current_ret: None,
            diags: Vec::new(),
        }
    }

    pub fn analyze(&mut self, stmts: &mut [Stmt]) {
        for stmt in stmts {
            self.analyze_stmt(stmt);
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diags
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diags
    }

    /// Maps a textual type name to a type. Primitive names map directly, a
    /// `[]` suffix peels one array layer (any nesting depth), anything else
    /// is a struct lookup. Unknown names resolve to `void`.
    pub fn resolve(&self, name: &str) -> Type {
        match name {
            "int" => Type::Int,
            "float" => Type::Float,
            "bool" => Type::Bool,
            "string" => Type::Str,
            "void" => Type::Void,
            _ => {
                if let Some(st) = self.structs.get(name) {
                    return Type::Struct(st.clone());
                }
                if let Some(elem) = name.strip_suffix("[]") {
                    return Type::Array(Box::new(self.resolve(elem)));
                }
                Type::Void
            }
        }
    }

    fn report(&mut self, diag: Diagnostic) {
        debug!("sema: {diag}");
        self.diags.push(diag);
    }

    fn analyze_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Expr(expr) => self.type_expr(expr),
            Stmt::VarDecl { name, ty_name, init } => {
                if let Some(init) = init.as_mut() {
                    self.type_expr(init);
                }
                let ty = match (ty_name.as_deref(), init.as_ref()) {
                    (Some(ty_name), _) => self.resolve(ty_name),
                    (None, Some(init)) => init.ty.clone().unwrap_or(Type::Void),
                    (None, None) => {
                        self.report(Diagnostic::VarNeedsTypeOrInit(name.clone()));
                        Type::Void
                    }
                };
                self.scope.insert(name.clone(), ty);
            }
            Stmt::Return(value) => {
                if let Some(value) = value.as_mut() {
                    self.type_expr(value);
                    if let (Some(ret), Some(ty)) = (self.current_ret.as_ref(), value.ty.as_ref()) {
                        if ret != ty {
                            debug!("return type {ty} where {ret} is declared");
                        }
                    }
                }
            }
            Stmt::Block(stmts) => {
                for stmt in stmts {
                    self.analyze_stmt(stmt);
                }
            }
            Stmt::If {
                cond,
                then_blk,
                else_blk,
            } => {
                self.type_expr(cond);
                for stmt in then_blk {
                    self.analyze_stmt(stmt);
                }
                if let Some(else_blk) = else_blk {
                    for stmt in else_blk {
                        self.analyze_stmt(stmt);
                    }
                }
            }
            Stmt::While { cond, body } => {
                self.type_expr(cond);
                for stmt in body {
                    self.analyze_stmt(stmt);
                }
            }
            Stmt::Function(func) => {
                let params: Vec<Type> =
                    func.params.iter().map(|(_, ty)| self.resolve(ty)).collect();
                let ret = self.resolve(&func.ret_ty_name);
                // Registered before the body so self-recursion resolves.
                self.scope.insert(
                    func.name.clone(),
                    Type::Function(Box::new(FunctionType {
                        ret: ret.clone(),
                        params: params.clone(),
                    })),
                );

                let Some(body) = func.body.as_mut() else {
                    return;
                };

                let saved_scope = self.scope.clone();
                let saved_ret = self.current_ret.replace(ret);
                for ((name, _), ty) in func.params.iter().zip(&params) {
                    self.scope.insert(name.clone(), ty.clone());
                }
                for stmt in body {
                    self.analyze_stmt(stmt);
                }
                self.scope = saved_scope;
                self.current_ret = saved_ret;
            }
            Stmt::StructDecl { name, fields } => {
                let fields = fields
                    .iter()
                    .map(|(field, ty_name)| (field.clone(), self.resolve(ty_name)))
                    .collect();
                self.structs.insert(
                    name.clone(),
                    StructType {
                        name: name.clone(),
                        fields,
                    },
                );
            }
        }
    }

    fn type_expr(&mut self, expr: &mut Expr) {
        let ty = match &mut expr.kind {
            ExprKind::Literal(lit) => match lit {
                Literal::Int(_) => Type::Int,
                Literal::Float(_) => Type::Float,
                Literal::Bool(_) => Type::Bool,
                Literal::Str(_) => Type::Str,
            },
            ExprKind::Variable(name) => match self.scope.get(name.as_str()) {
                Some(ty) => ty.clone(),
                None => {
                    let name = name.clone();
                    self.report(Diagnostic::UndefinedVariable(name));
                    Type::Void
                }
            },
            ExprKind::Binary { op: BinOp::Assign, lhs, rhs } => {
                if !matches!(
                    lhs.kind,
                    ExprKind::Variable(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
                ) {
                    self.report(Diagnostic::AssignToNonLValue);
                    Type::Void
                } else {
                    self.type_expr(lhs);
                    self.type_expr(rhs);
                    rhs.ty.clone().unwrap_or(Type::Void)
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                self.type_expr(lhs);
                self.type_expr(rhs);
                let lt = lhs.ty.clone().unwrap_or(Type::Void);
                let rt = rhs.ty.clone().unwrap_or(Type::Void);
                match op {
                    BinOp::Lt | BinOp::Gt | BinOp::Eq | BinOp::Ne => Type::Bool,
                    _ => {
                        if lt == Type::Int && rt == Type::Int {
                            Type::Int
                        } else if lt == Type::Float && rt == Type::Float {
                            Type::Float
                        } else {
                            // Best-effort fallback for unrecognized combinations.
                            lt
                        }
                    }
                }
            }
            ExprKind::Call { callee, args } => {
                for arg in args.iter_mut() {
                    self.type_expr(arg);
                }
                let found = args.len();
                let callee = callee.clone();
                match self.scope.get(&callee).cloned() {
                    Some(Type::Function(func)) => {
                        if func.params.len() != found {
                            self.report(Diagnostic::ArityMismatch {
                                name: callee,
                                expected: func.params.len(),
                                found,
                            });
                        }
                        func.ret
                    }
                    Some(_) => {
                        self.report(Diagnostic::NotAFunction(callee));
                        Type::Void
                    }
                    None => {
                        self.report(Diagnostic::UndefinedFunction(callee));
                        Type::Void
                    }
                }
            }
            ExprKind::Member { base, field } => {
                self.type_expr(base);
                let base_ty = base.ty.clone().unwrap_or(Type::Void);
                let field = field.clone();
                match base_ty.as_struct() {
                    Some(st) => match st.field_type(&field) {
                        Some(ty) => ty.clone(),
                        None => {
                            let ty = st.name.clone();
                            self.report(Diagnostic::UnknownMember { ty, member: field });
                            Type::Void
                        }
                    },
                    None => {
                        self.report(Diagnostic::MemberOnNonStruct(base_ty.to_string()));
                        Type::Void
                    }
                }
            }
            ExprKind::Index { base, index } => {
                self.type_expr(base);
                self.type_expr(index);
                let base_ty = base.ty.clone().unwrap_or(Type::Void);
                let index_ty = index.ty.clone().unwrap_or(Type::Void);
                if index_ty != Type::Int {
                    self.report(Diagnostic::NonIntegerIndex(index_ty.to_string()));
                }
                match base_ty.as_array_element() {
                    Some(elem) => elem.clone(),
                    None => {
                        self.report(Diagnostic::IndexNonArray(base_ty.to_string()));
                        Type::Void
                    }
                }
            }
            ExprKind::ArrayLit(elems) => {
                if elems.is_empty() {
                    // Context-dependent inference is deferred; fall back.
                    Type::Array(Box::new(Type::Int))
                } else {
                    for elem in elems.iter_mut() {
                        self.type_expr(elem);
                    }
                    let first = elems[0].ty.clone().unwrap_or(Type::Void);
                    Type::Array(Box::new(first))
                }
            }
        };
        expr.ty = Some(ty);
    }
}
