//! The SSA-style intermediate representation handed to the code generator.
//!
//! A module owns functions, extern declarations, and struct layouts. A
//! function owns basic blocks; block 0 is the entry block and holds every
//! stack slot. A block ends with exactly one terminator, and instructions
//! reference values by handle.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use log::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

#[derive(Clone, Debug, PartialEq)]
pub enum IrType {
    Void,
    I1,
    I8,
    I64,
    F64,
    Ptr(Box<IrType>),
    Struct(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Ne,
    Lt,
    Gt,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    pub params: Vec<IrType>,
    pub ret: IrType,
}

#[derive(Clone, Debug)]
pub enum Inst {
    ConstInt { dst: ValueId, value: i64 },
    ConstFloat { dst: ValueId, value: f64 },
    ConstBool { dst: ValueId, value: bool },
    ConstStr { dst: ValueId, value: String },
    ConstZero { dst: ValueId, ty: IrType },
    Undef { dst: ValueId, ty: IrType },
    Alloca { dst: ValueId, ty: IrType, name: String },
    Load { dst: ValueId, ty: IrType, addr: ValueId },
    Store { value: ValueId, addr: ValueId },
    Add { dst: ValueId, lhs: ValueId, rhs: ValueId },
    Sub { dst: ValueId, lhs: ValueId, rhs: ValueId },
    Mul { dst: ValueId, lhs: ValueId, rhs: ValueId },
    Div { dst: ValueId, lhs: ValueId, rhs: ValueId },
    FAdd { dst: ValueId, lhs: ValueId, rhs: ValueId },
    FSub { dst: ValueId, lhs: ValueId, rhs: ValueId },
    FMul { dst: ValueId, lhs: ValueId, rhs: ValueId },
    FDiv { dst: ValueId, lhs: ValueId, rhs: ValueId },
    Icmp { dst: ValueId, cmp: Cmp, lhs: ValueId, rhs: ValueId },
    Fcmp { dst: ValueId, cmp: Cmp, lhs: ValueId, rhs: ValueId },
    /// Address of field `index` of the struct pointed to by `base`; the
    /// two-index derivation `base[0][index]`.
    FieldAddr { dst: ValueId, struct_name: String, base: ValueId, index: usize },
    /// `base + index * sizeof(elem_ty)` over a raw element pointer.
    ElemAddr { dst: ValueId, elem_ty: IrType, base: ValueId, index: ValueId },
    Call { dst: Option<ValueId>, callee: String, args: Vec<ValueId> },
}

impl Inst {
    /// The value this instruction defines, if any.
    pub fn dst(&self) -> Option<ValueId> {
        match self {
            Inst::ConstInt { dst, .. }
            | Inst::ConstFloat { dst, .. }
            | Inst::ConstBool { dst, .. }
            | Inst::ConstStr { dst, .. }
            | Inst::ConstZero { dst, .. }
            | Inst::Undef { dst, .. }
            | Inst::Alloca { dst, .. }
            | Inst::Load { dst, .. }
            | Inst::Add { dst, .. }
            | Inst::Sub { dst, .. }
            | Inst::Mul { dst, .. }
            | Inst::Div { dst, .. }
            | Inst::FAdd { dst, .. }
            | Inst::FSub { dst, .. }
            | Inst::FMul { dst, .. }
            | Inst::FDiv { dst, .. }
            | Inst::Icmp { dst, .. }
            | Inst::Fcmp { dst, .. }
            | Inst::FieldAddr { dst, .. }
            | Inst::ElemAddr { dst, .. } => Some(*dst),
            Inst::Call { dst, .. } => *dst,
            Inst::Store { .. } => None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Terminator {
    Br { target: BlockId },
    CondBr { cond: ValueId, then_tgt: BlockId, else_tgt: BlockId },
    Ret { value: Option<ValueId> },
}

#[derive(Clone, Debug)]
pub struct Block {
    pub label: String,
    pub insts: Vec<Inst>,
    pub term: Option<Terminator>,
}

impl Block {
    pub fn is_terminated(&self) -> bool {
        self.term.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub sig: Signature,
    pub blocks: Vec<Block>,
    /// Type of every value, indexed by `ValueId`. The first `sig.params.len()`
    /// entries are the incoming arguments.
    pub value_types: Vec<IrType>,
    /// Local name to entry-block stack slot.
    pub slots: HashMap<String, ValueId>,
}

impl Function {
    pub fn entry(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn param_value(&self, index: usize) -> ValueId {
        ValueId(index as u32)
    }

    pub fn value_type(&self, value: ValueId) -> &IrType {
        &self.value_types[value.0 as usize]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }
}

#[derive(Clone, Debug)]
pub struct StructLayout {
    pub name: String,
    pub fields: Vec<IrType>,
    index_of: HashMap<String, usize>,
}

impl StructLayout {
    pub fn new(name: &str, fields: Vec<(String, IrType)>) -> Self {
        let index_of = fields
            .iter()
            .enumerate()
            .map(|(i, (f, _))| (f.clone(), i))
            .collect();
        StructLayout {
            name: name.to_string(),
            fields: fields.into_iter().map(|(_, ty)| ty).collect(),
            index_of,
        }
    }

    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.index_of.get(field).copied()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Module {
    pub funcs: Vec<Function>,
    pub externs: BTreeMap<String, Signature>,
    pub structs: BTreeMap<String, StructLayout>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_extern(&mut self, name: &str, sig: Signature) {
        self.externs.entry(name.to_string()).or_insert(sig);
    }

    pub fn add_struct(&mut self, layout: StructLayout) {
        self.structs.insert(layout.name.clone(), layout);
    }

    pub fn struct_layout(&self, name: &str) -> Option<&StructLayout> {
        self.structs.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.funcs.iter().find(|f| f.name == name)
    }

    /// Looks up a callable's signature among defined functions and externs.
    pub fn signature_of(&self, name: &str) -> Option<&Signature> {
        self.funcs
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.sig)
            .or_else(|| self.externs.get(name))
    }

    /// Allocation size in bytes under the target data layout.
    pub fn size_of(&self, ty: &IrType) -> u64 {
        match ty {
            IrType::Void => 0,
            IrType::I1 | IrType::I8 => 1,
            IrType::I64 | IrType::F64 | IrType::Ptr(_) => 8,
            IrType::Struct(name) => match self.structs.get(name) {
                Some(layout) => {
                    let mut size = 0u64;
                    for field in &layout.fields {
                        let align = self.align_of(field);
                        size = size.div_ceil(align) * align + self.size_of(field);
                    }
                    let align = self.align_of(ty);
                    size.div_ceil(align) * align
                }
                None => {
                    warn!("size of unknown struct '{name}'");
                    8
                }
            },
        }
    }

    pub fn align_of(&self, ty: &IrType) -> u64 {
        match ty {
            IrType::Void => 1,
            IrType::I1 | IrType::I8 => 1,
            IrType::I64 | IrType::F64 | IrType::Ptr(_) => 8,
            IrType::Struct(name) => match self.structs.get(name) {
                Some(layout) => layout
                    .fields
                    .iter()
                    .map(|f| self.align_of(f))
                    .max()
                    .unwrap_or(1),
                None => 8,
            },
        }
    }
}

/// Builds one function, tracking the current insertion point. Instructions
/// pushed into a terminated block are dropped with a warning; the first
/// terminator of a block wins.
pub struct FunctionBuilder {
    pub func: Function,
    cur: BlockId,
}

impl FunctionBuilder {
    pub fn new(name: &str, sig: Signature) -> Self {
        let value_types = sig.params.clone();
        FunctionBuilder {
            func: Function {
                name: name.to_string(),
                sig,
                blocks: vec![Block {
                    label: "entry".to_string(),
                    insts: Vec::new(),
                    term: None,
                }],
                value_types,
                slots: HashMap::new(),
            },
            cur: BlockId(0),
        }
    }

    pub fn new_block(&mut self, label: &str) -> BlockId {
        let id = BlockId(self.func.blocks.len() as u32);
        self.func.blocks.push(Block {
            label: format!("{label}{}", id.0),
            insts: Vec::new(),
            term: None,
        });
        id
    }

    pub fn set_block(&mut self, block: BlockId) {
        self.cur = block;
    }

    pub fn cur_block(&self) -> BlockId {
        self.cur
    }

    pub fn is_open(&self) -> bool {
        !self.func.blocks[self.cur.0 as usize].is_terminated()
    }

    pub fn new_value(&mut self, ty: IrType) -> ValueId {
        let id = ValueId(self.func.value_types.len() as u32);
        self.func.value_types.push(ty);
        id
    }

    pub fn push(&mut self, inst: Inst) {
        let block = &mut self.func.blocks[self.cur.0 as usize];
        if block.is_terminated() {
            warn!("dropping instruction after terminator in '{}'", block.label);
            return;
        }
        block.insts.push(inst);
    }

    pub fn terminate(&mut self, term: Terminator) {
        let block = &mut self.func.blocks[self.cur.0 as usize];
        if block.is_terminated() {
            warn!("block '{}' already terminated", block.label);
            return;
        }
        block.term = Some(term);
    }

    /// Allocates a stack slot in the entry block, wherever the insertion
    /// point currently is, and binds `name` to it.
    pub fn alloca_in_entry(&mut self, ty: IrType, name: &str) -> ValueId {
        let dst = self.new_value(IrType::Ptr(Box::new(ty.clone())));
        self.func.blocks[0].insts.push(Inst::Alloca {
            dst,
            ty,
            name: name.to_string(),
        });
        self.func.slots.insert(name.to_string(), dst);
        dst
    }

    pub fn slot(&self, name: &str) -> Option<ValueId> {
        self.func.slots.get(name).copied()
    }

    pub fn finish(self) -> Function {
        self.func
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for Cmp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cmp::Eq => "eq",
            Cmp::Ne => "ne",
            Cmp::Lt => "lt",
            Cmp::Gt => "gt",
        };
        f.write_str(s)
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => f.write_str("void"),
            IrType::I1 => f.write_str("i1"),
            IrType::I8 => f.write_str("i8"),
            IrType::I64 => f.write_str("i64"),
            IrType::F64 => f.write_str("f64"),
            IrType::Ptr(inner) => write!(f, "{inner}*"),
            IrType::Struct(name) => write!(f, "%{name}"),
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for layout in self.structs.values() {
            write!(f, "struct %{} {{ ", layout.name)?;
            for (i, field) in layout.fields.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{field}")?;
            }
            writeln!(f, " }}")?;
        }
        for (name, sig) in &self.externs {
            write!(f, "extern {name}(")?;
            for (i, param) in sig.params.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{param}")?;
            }
            writeln!(f, ") -> {}", sig.ret)?;
        }
        for func in &self.funcs {
            writeln!(f)?;
            write!(f, "{func}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, param) in self.sig.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {param}", ValueId(i as u32))?;
        }
        writeln!(f, ") -> {} {{", self.sig.ret)?;
        for block in &self.blocks {
            writeln!(f, "{}:", block.label)?;
            for inst in &block.insts {
                f.write_str("  ")?;
                self.fmt_inst(f, inst)?;
                writeln!(f)?;
            }
            match &block.term {
                Some(Terminator::Br { target }) => {
                    writeln!(f, "  br {}", self.block(*target).label)?;
                }
                Some(Terminator::CondBr {
                    cond,
                    then_tgt,
                    else_tgt,
                }) => {
                    writeln!(
                        f,
                        "  condbr {cond}, {}, {}",
                        self.block(*then_tgt).label,
                        self.block(*else_tgt).label
                    )?;
                }
                Some(Terminator::Ret { value: Some(value) }) => {
                    writeln!(f, "  ret {value}")?;
                }
                Some(Terminator::Ret { value: None }) => {
                    writeln!(f, "  ret void")?;
                }
                None => {
                    writeln!(f, "  <unterminated>")?;
                }
            }
        }
        writeln!(f, "}}")
    }
}

impl Function {
    fn fmt_inst(&self, f: &mut fmt::Formatter<'_>, inst: &Inst) -> fmt::Result {
        match inst {
            Inst::ConstInt { dst, value } => write!(f, "{dst} = const i64 {value}"),
            Inst::ConstFloat { dst, value } => write!(f, "{dst} = const f64 {value:?}"),
            Inst::ConstBool { dst, value } => write!(f, "{dst} = const i1 {value}"),
            Inst::ConstStr { dst, value } => write!(f, "{dst} = const str {value:?}"),
            Inst::ConstZero { dst, ty } => write!(f, "{dst} = zero {ty}"),
            Inst::Undef { dst, ty } => write!(f, "{dst} = undef {ty}"),
            Inst::Alloca { dst, ty, name } => write!(f, "{dst} = alloca {ty} ; {name}"),
            Inst::Load { dst, ty, addr } => write!(f, "{dst} = load {ty}, {addr}"),
            Inst::Store { value, addr } => write!(f, "store {value}, {addr}"),
            Inst::Add { dst, lhs, rhs } => write!(f, "{dst} = add {lhs}, {rhs}"),
            Inst::Sub { dst, lhs, rhs } => write!(f, "{dst} = sub {lhs}, {rhs}"),
            Inst::Mul { dst, lhs, rhs } => write!(f, "{dst} = mul {lhs}, {rhs}"),
            Inst::Div { dst, lhs, rhs } => write!(f, "{dst} = div {lhs}, {rhs}"),
            Inst::FAdd { dst, lhs, rhs } => write!(f, "{dst} = fadd {lhs}, {rhs}"),
            Inst::FSub { dst, lhs, rhs } => write!(f, "{dst} = fsub {lhs}, {rhs}"),
            Inst::FMul { dst, lhs, rhs } => write!(f, "{dst} = fmul {lhs}, {rhs}"),
            Inst::FDiv { dst, lhs, rhs } => write!(f, "{dst} = fdiv {lhs}, {rhs}"),
            Inst::Icmp { dst, cmp, lhs, rhs } => {
                write!(f, "{dst} = icmp {cmp} {lhs}, {rhs}")
            }
            Inst::Fcmp { dst, cmp, lhs, rhs } => {
                write!(f, "{dst} = fcmp {cmp} {lhs}, {rhs}")
            }
            Inst::FieldAddr {
                dst,
                struct_name,
                base,
                index,
            } => write!(f, "{dst} = fieldaddr %{struct_name}, {base}, {index}"),
            Inst::ElemAddr {
                dst,
                elem_ty,
                base,
                index,
            } => write!(f, "{dst} = elemaddr {elem_ty}, {base}, {index}"),
            Inst::Call { dst, callee, args } => {
                if let Some(dst) = dst {
                    write!(f, "{dst} = ")?;
                }
                write!(f, "call {callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
