//! Lowers the type-decorated AST to an IR module.
//!
//! Top-level statements are emitted into a synthesized entry function:
//! `main` normally, `__init` when the program defines its own `main`.
//! Every local lives in an entry-block stack slot and all reads and writes
//! go through loads and stores against it.

use std::collections::HashMap;

use log::error;
use tarn_frontend::ast::{BinOp, Expr, ExprKind, FunctionDecl, Literal, Stmt};
use tarn_frontend::types::Type;
use tarn_ir::{
    Cmp, FunctionBuilder, Inst, IrType, Module, Signature, StructLayout, Terminator, ValueId,
};

/// Lowers a whole translation unit. The caller receives the finished module
/// by value; the emitter keeps nothing.
pub fn lower(stmts: &[Stmt]) -> Module {
    Emitter::new().run(stmts)
}

struct Emitter {
    module: Module,
    /// Signatures of every function declared so far, externs included.
    /// Calls resolve against this, so callees must precede their callers
    /// textually.
    declared: HashMap<String, Signature>,
}

impl Emitter {
    fn new() -> Self {
        Emitter {
            module: Module::new(),
            declared: HashMap::new(),
        }
    }

    fn run(mut self, stmts: &[Stmt]) -> Module {
        let has_main = stmts
            .iter()
            .any(|stmt| matches!(stmt, Stmt::Function(f) if f.name == "main"));
        let entry_name = if has_main { "__init" } else { "main" };

        let mut b = FunctionBuilder::new(
            entry_name,
            Signature {
                params: Vec::new(),
                ret: IrType::I64,
            },
        );
        for stmt in stmts {
            self.emit_stmt(&mut b, stmt);
        }
        if b.is_open() {
            let zero = b.new_value(IrType::I64);
            b.push(Inst::ConstInt { dst: zero, value: 0 });
            b.terminate(Terminator::Ret { value: Some(zero) });
        }
        self.module.funcs.insert(0, b.finish());
        self.module
    }

    fn emit_stmt(&mut self, b: &mut FunctionBuilder, stmt: &Stmt) {
        // Declarations take effect regardless of the current block's state.
        match stmt {
            Stmt::Function(func) => {
                self.emit_function(func);
                return;
            }
            Stmt::StructDecl { name, fields } => {
                self.emit_struct(name, fields);
                return;
            }
            _ => {}
        }
        // Anything after a terminator is unreachable; it is visited but not
        // emitted.
        if !b.is_open() {
            return;
        }
        match stmt {
            Stmt::Expr(expr) => {
                self.emit_expr(b, expr);
            }
            Stmt::VarDecl { name, ty_name, init } => {
                let init_val = init.as_ref().map(|e| self.emit_value(b, e));
                let ty = if let Some(ty_name) = ty_name {
                    self.ir_type_from_name(ty_name)
                } else if let Some(value) = init_val {
                    b.func.value_type(value).clone()
                } else {
                    error!("variable '{name}' has neither type nor initializer");
                    return;
                };
                let slot = b.alloca_in_entry(ty.clone(), name);
                match init_val {
                    Some(value) => b.push(Inst::Store { value, addr: slot }),
                    None => {
                        let zero = b.new_value(ty.clone());
                        b.push(Inst::ConstZero { dst: zero, ty });
                        b.push(Inst::Store { value: zero, addr: slot });
                    }
                }
            }
            Stmt::Return(value) => {
                let value = value.as_ref().map(|e| self.emit_value(b, e));
                b.terminate(Terminator::Ret { value });
            }
            Stmt::Block(stmts) => {
                for stmt in stmts {
                    self.emit_stmt(b, stmt);
                }
            }
            Stmt::If {
                cond,
                then_blk,
                else_blk,
            } => {
                let cond = self.emit_value(b, cond);
                let cond = self.normalize_cond(b, cond);
                let then_bb = b.new_block("then");
                let else_bb = b.new_block("else");
                let merge_bb = b.new_block("merge");
                let else_tgt = if else_blk.is_some() { else_bb } else { merge_bb };
                b.terminate(Terminator::CondBr {
                    cond,
                    then_tgt: then_bb,
                    else_tgt,
                });

                b.set_block(then_bb);
                for stmt in then_blk {
                    self.emit_stmt(b, stmt);
                }
                if b.is_open() {
                    b.terminate(Terminator::Br { target: merge_bb });
                }

                b.set_block(else_bb);
                if let Some(else_blk) = else_blk {
                    for stmt in else_blk {
                        self.emit_stmt(b, stmt);
                    }
                }
                if b.is_open() {
                    b.terminate(Terminator::Br { target: merge_bb });
                }

                b.set_block(merge_bb);
            }
            Stmt::While { cond, body } => {
                let cond_bb = b.new_block("cond");
                let body_bb = b.new_block("body");
                let after_bb = b.new_block("after");
                b.terminate(Terminator::Br { target: cond_bb });

                b.set_block(cond_bb);
                let cond = self.emit_value(b, cond);
                let cond = self.normalize_cond(b, cond);
                b.terminate(Terminator::CondBr {
                    cond,
                    then_tgt: body_bb,
                    else_tgt: after_bb,
                });

                b.set_block(body_bb);
                for stmt in body {
                    self.emit_stmt(b, stmt);
                }
                if b.is_open() {
                    b.terminate(Terminator::Br { target: cond_bb });
                }

                b.set_block(after_bb);
            }
            Stmt::Function(_) | Stmt::StructDecl { .. } => {}
        }
    }

    fn emit_struct(&mut self, name: &str, fields: &[(String, String)]) {
        if self.module.structs.contains_key(name) {
            return;
        }
        let fields = fields
            .iter()
            .map(|(field, ty_name)| (field.clone(), self.ir_type_from_name(ty_name)))
            .collect();
        self.module.add_struct(StructLayout::new(name, fields));
    }

    fn emit_function(&mut self, func: &FunctionDecl) {
        let sig = Signature {
            params: func
                .params
                .iter()
                .map(|(_, ty_name)| self.ir_type_from_name(ty_name))
                .collect(),
            ret: self.ir_type_from_name(&func.ret_ty_name),
        };
        self.declared.insert(func.name.clone(), sig.clone());

        let Some(body) = &func.body else {
            self.module.declare_extern(&func.name, sig);
            return;
        };

        let mut b = FunctionBuilder::new(&func.name, sig);
        for (i, (name, _)) in func.params.iter().enumerate() {
            let ty = b.func.sig.params[i].clone();
            let arg = b.func.param_value(i);
            let slot = b.alloca_in_entry(ty, name);
            b.push(Inst::Store {
                value: arg,
                addr: slot,
            });
        }
        for stmt in body {
            self.emit_stmt(&mut b, stmt);
        }
        if b.is_open() {
            // Fall-through gets a synthesized return of the right shape.
            match b.func.sig.ret.clone() {
                IrType::Void => b.terminate(Terminator::Ret { value: None }),
                ty @ (IrType::I1 | IrType::I8 | IrType::I64) => {
                    let zero = b.new_value(ty);
                    b.push(Inst::ConstInt { dst: zero, value: 0 });
                    b.terminate(Terminator::Ret { value: Some(zero) });
                }
                ty => {
                    let undef = b.new_value(ty.clone());
                    b.push(Inst::Undef { dst: undef, ty });
                    b.terminate(Terminator::Ret { value: Some(undef) });
                }
            }
        }
        self.module.funcs.push(b.finish());
    }

    fn normalize_cond(&mut self, b: &mut FunctionBuilder, cond: ValueId) -> ValueId {
        if *b.func.value_type(cond) != IrType::I64 {
            return cond;
        }
        let zero = b.new_value(IrType::I64);
        b.push(Inst::ConstInt { dst: zero, value: 0 });
        let dst = b.new_value(IrType::I1);
        b.push(Inst::Icmp {
            dst,
            cmp: Cmp::Ne,
            lhs: cond,
            rhs: zero,
        });
        dst
    }

    /// Like `emit_expr` but always yields a value; void expressions recover
    /// with an integer zero.
    fn emit_value(&mut self, b: &mut FunctionBuilder, expr: &Expr) -> ValueId {
        match self.emit_expr(b, expr) {
            Some(value) => value,
            None => {
                error!("value of void expression used");
                self.const_zero(b)
            }
        }
    }

    fn const_zero(&mut self, b: &mut FunctionBuilder) -> ValueId {
        let dst = b.new_value(IrType::I64);
        b.push(Inst::ConstInt { dst, value: 0 });
        dst
    }

    /// Emits an expression for its value. `None` means the expression was a
    /// call to a void function.
    fn emit_expr(&mut self, b: &mut FunctionBuilder, expr: &Expr) -> Option<ValueId> {
        match &expr.kind {
            ExprKind::Literal(lit) => Some(self.emit_literal(b, lit)),
            ExprKind::Variable(name) => {
                let Some(slot) = b.slot(name) else {
                    error!("unknown variable '{name}'");
                    return Some(self.const_zero(b));
                };
                let ty = match b.func.value_type(slot) {
                    IrType::Ptr(inner) => (**inner).clone(),
                    _ => IrType::I64,
                };
                let dst = b.new_value(ty.clone());
                b.push(Inst::Load { dst, ty, addr: slot });
                Some(dst)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                if *op == BinOp::Assign {
                    let Some(addr) = self.lvalue_addr(b, lhs) else {
                        error!("invalid l-value in assignment");
                        return Some(self.const_zero(b));
                    };
                    let value = self.emit_value(b, rhs);
                    b.push(Inst::Store { value, addr });
                    // The assignment's result is the stored value.
                    return Some(value);
                }

                let l = self.emit_value(b, lhs);
                let r = self.emit_value(b, rhs);
                let is_float = *b.func.value_type(l) == IrType::F64;
                match op {
                    BinOp::Lt | BinOp::Gt | BinOp::Eq | BinOp::Ne => {
                        let cmp = match op {
                            BinOp::Lt => Cmp::Lt,
                            BinOp::Gt => Cmp::Gt,
                            BinOp::Eq => Cmp::Eq,
                            _ => Cmp::Ne,
                        };
                        let dst = b.new_value(IrType::I1);
                        if is_float {
                            b.push(Inst::Fcmp {
                                dst,
                                cmp,
                                lhs: l,
                                rhs: r,
                            });
                        } else {
                            b.push(Inst::Icmp {
                                dst,
                                cmp,
                                lhs: l,
                                rhs: r,
                            });
                        }
                        Some(dst)
                    }
                    op => {
                        let ty = b.func.value_type(l).clone();
                        let dst = b.new_value(ty);
                        let inst = if is_float {
                            match op {
                                BinOp::Add => Inst::FAdd { dst, lhs: l, rhs: r },
                                BinOp::Sub => Inst::FSub { dst, lhs: l, rhs: r },
                                BinOp::Mul => Inst::FMul { dst, lhs: l, rhs: r },
                                _ => Inst::FDiv { dst, lhs: l, rhs: r },
                            }
                        } else {
                            match op {
                                BinOp::Add => Inst::Add { dst, lhs: l, rhs: r },
                                BinOp::Sub => Inst::Sub { dst, lhs: l, rhs: r },
                                BinOp::Mul => Inst::Mul { dst, lhs: l, rhs: r },
                                _ => Inst::Div { dst, lhs: l, rhs: r },
                            }
                        };
                        b.push(inst);
                        Some(dst)
                    }
                }
            }
            ExprKind::Call { callee, args } => {
                let Some(sig) = self.declared.get(callee.as_str()).cloned() else {
                    error!("unknown function '{callee}'");
                    return Some(self.const_zero(b));
                };
                if sig.params.len() != args.len() {
                    error!(
                        "call to '{callee}' with {} arguments, expected {}",
                        args.len(),
                        sig.params.len()
                    );
                    return Some(self.const_zero(b));
                }
                let args: Vec<ValueId> = args.iter().map(|arg| self.emit_value(b, arg)).collect();
                if sig.ret == IrType::Void {
                    b.push(Inst::Call {
                        dst: None,
                        callee: callee.clone(),
                        args,
                    });
                    None
                } else {
                    let dst = b.new_value(sig.ret.clone());
                    b.push(Inst::Call {
                        dst: Some(dst),
                        callee: callee.clone(),
                        args,
                    });
                    Some(dst)
                }
            }
            ExprKind::Member { .. } | ExprKind::Index { .. } => {
                let Some(addr) = self.lvalue_addr(b, expr) else {
                    return Some(self.const_zero(b));
                };
                let ty = match expr.ty.as_ref() {
                    Some(ty) => self.ir_type(ty),
                    None => {
                        error!("missing type decoration on load");
                        IrType::I64
                    }
                };
                let dst = b.new_value(ty.clone());
                b.push(Inst::Load { dst, ty, addr });
                Some(dst)
            }
            ExprKind::ArrayLit(elems) => Some(self.emit_array_literal(b, expr, elems)),
        }
    }

    fn emit_literal(&mut self, b: &mut FunctionBuilder, lit: &Literal) -> ValueId {
        match lit {
            Literal::Int(text) => {
                let value = text.parse::<i64>().unwrap_or_else(|_| {
                    error!("integer literal '{text}' out of range");
                    0
                });
                let dst = b.new_value(IrType::I64);
                b.push(Inst::ConstInt { dst, value });
                dst
            }
            Literal::Float(text) => {
                let value = text.parse::<f64>().unwrap_or_else(|_| {
                    error!("float literal '{text}' out of range");
                    0.0
                });
                let dst = b.new_value(IrType::F64);
                b.push(Inst::ConstFloat { dst, value });
                dst
            }
            Literal::Bool(value) => {
                let dst = b.new_value(IrType::I1);
                b.push(Inst::ConstBool { dst, value: *value });
                dst
            }
            Literal::Str(text) => {
                let dst = b.new_value(IrType::Ptr(Box::new(IrType::I8)));
                b.push(Inst::ConstStr {
                    dst,
                    value: text.clone(),
                });
                dst
            }
        }
    }

    fn emit_array_literal(
        &mut self,
        b: &mut FunctionBuilder,
        expr: &Expr,
        elems: &[Expr],
    ) -> ValueId {
        let elem_ty = match expr.ty.as_ref() {
            Some(Type::Array(elem)) => self.ir_type(elem),
            _ => {
                error!("array literal without array decoration");
                IrType::I64
            }
        };

        if !self.declared.contains_key("malloc") {
            let sig = Signature {
                params: vec![IrType::I64],
                ret: IrType::Ptr(Box::new(IrType::I8)),
            };
            self.declared.insert("malloc".to_string(), sig.clone());
            self.module.declare_extern("malloc", sig);
        }

        let total = self.module.size_of(&elem_ty) * elems.len() as u64;
        let size = b.new_value(IrType::I64);
        b.push(Inst::ConstInt {
            dst: size,
            value: total as i64,
        });
        let ptr = b.new_value(IrType::Ptr(Box::new(IrType::I8)));
        b.push(Inst::Call {
            dst: Some(ptr),
            callee: "malloc".to_string(),
            args: vec![size],
        });

        for (i, elem) in elems.iter().enumerate() {
            let value = self.emit_value(b, elem);
            let index = b.new_value(IrType::I64);
            b.push(Inst::ConstInt {
                dst: index,
                value: i as i64,
            });
            let slot = b.new_value(IrType::Ptr(Box::new(elem_ty.clone())));
            b.push(Inst::ElemAddr {
                dst: slot,
                elem_ty: elem_ty.clone(),
                base: ptr,
                index,
            });
            b.push(Inst::Store { value, addr: slot });
        }
        ptr
    }

    /// Address of an assignable location. Member bases are themselves
    /// l-values (structs live in stack slots); index bases are r-values
    /// (arrays are raw pointers).
    fn lvalue_addr(&mut self, b: &mut FunctionBuilder, expr: &Expr) -> Option<ValueId> {
        match &expr.kind {
            ExprKind::Variable(name) => {
                let slot = b.slot(name);
                if slot.is_none() {
                    error!("unknown variable '{name}'");
                }
                slot
            }
            ExprKind::Member { base, field } => {
                let base_addr = self.lvalue_addr(b, base)?;
                let struct_name = match base.ty.as_ref() {
                    Some(Type::Struct(st)) => st.name.clone(),
                    _ => {
                        error!("member access on non-struct value");
                        return None;
                    }
                };
                let Some(layout) = self.module.struct_layout(&struct_name) else {
                    error!("unknown struct '{struct_name}' at emission");
                    return None;
                };
                let Some(index) = layout.field_index(field) else {
                    error!("struct '{struct_name}' has no field '{field}'");
                    return None;
                };
                let field_ty = layout.fields[index].clone();
                let dst = b.new_value(IrType::Ptr(Box::new(field_ty)));
                b.push(Inst::FieldAddr {
                    dst,
                    struct_name,
                    base: base_addr,
                    index,
                });
                Some(dst)
            }
            ExprKind::Index { base, index } => {
                let base_ptr = self.emit_value(b, base);
                let index = self.emit_value(b, index);
                let elem_ty = match base.ty.as_ref() {
                    Some(Type::Array(elem)) => self.ir_type(elem),
                    _ => {
                        error!("indexing a value without array decoration");
                        IrType::I64
                    }
                };
                let dst = b.new_value(IrType::Ptr(Box::new(elem_ty.clone())));
                b.push(Inst::ElemAddr {
                    dst,
                    elem_ty,
                    base: base_ptr,
                    index,
                });
                Some(dst)
            }
            _ => None,
        }
    }

    fn ir_type(&self, ty: &Type) -> IrType {
        match ty {
            Type::Void => IrType::Void,
            Type::Int => IrType::I64,
            Type::Float => IrType::F64,
            Type::Bool => IrType::I1,
            Type::Str => IrType::Ptr(Box::new(IrType::I8)),
            Type::Struct(st) => IrType::Struct(st.name.clone()),
            Type::Array(elem) => IrType::Ptr(Box::new(self.ir_type(elem))),
            Type::Function(_) => {
                error!("function type has no value representation");
                IrType::I64
            }
        }
    }

    fn ir_type_from_name(&self, name: &str) -> IrType {
        match name {
            "int" => IrType::I64,
            "float" => IrType::F64,
            "bool" => IrType::I1,
            "string" => IrType::Ptr(Box::new(IrType::I8)),
            "void" => IrType::Void,
            _ => {
                if let Some(elem) = name.strip_suffix("[]") {
                    return IrType::Ptr(Box::new(self.ir_type_from_name(elem)));
                }
                if self.module.structs.contains_key(name) {
                    return IrType::Struct(name.to_string());
                }
                IrType::I64
            }
        }
    }
}
