/// Semantic diagnostics. Each one is reported where it arises and analysis
/// continues with `void` as the recovery type, so a single run can surface
/// several errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Diagnostic {
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("undefined function '{0}'")]
    UndefinedFunction(String),
    #[error("'{0}' is not a function")]
    NotAFunction(String),
    #[error("call to '{name}' expects {expected} arguments, found {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("member access on non-struct type '{0}'")]
    MemberOnNonStruct(String),
    #[error("struct '{ty}' has no member '{member}'")]
    UnknownMember { ty: String, member: String },
    #[error("indexing non-array type '{0}'")]
    IndexNonArray(String),
    #[error("array index must be an integer, found '{0}'")]
    NonIntegerIndex(String),
    #[error("assignment to non-lvalue")]
    AssignToNonLValue,
    #[error("variable '{0}' needs a type annotation or an initializer")]
    VarNeedsTypeOrInit(String),
}
