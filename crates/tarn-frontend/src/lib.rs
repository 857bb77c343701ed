pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod types;

use anyhow::Result;

/// Parses a whole translation unit into its top-level statement list.
pub fn parse_source(src: &str) -> Result<Vec<ast::Stmt>> {
    parser::Parser::new(src).parse_module()
}
