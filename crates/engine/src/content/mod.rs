mod compiler;
mod database;

pub use compiler::{compile_def_database, ContentCompileError, ContentErrorCode, SourceLocation};
pub use database::{ArchetypeDef, ArchetypeId, ArchetypeRole, DefDatabase};
