//! Command Template Resolver
//!
//! Maps logical action names (start, stop, reload, promote, rewind, init, ...)
//! to concrete OS command lines for one instance.
//!
//! Resolution runs in two passes:
//! 1. Macro pass: `{name}` naming another template is replaced by that
//!    template's raw text. Exactly one level.
//! 2. Context pass: instance values such as `{instance}`, `{pgdata}`,
//!    `{version[0]}` or `{major}` are substituted.

mod context;
mod resolver;

pub use context::TemplateContext;
pub use resolver::CommandTemplates;
