mod args;
mod compiler;
mod config;
mod engine;
mod error;
mod interface;
mod macros;
mod node;
mod parser;
pub mod runtime;
pub mod script;
mod writer;

// Public exports.
pub use args::{expand_dotted_var, parse_macro_args};
pub use compiler::{CompiledTemplate, Compiler};
pub use config::{ContentType, EngineConfig};
pub use engine::{Engine, Loader};
pub use error::{
    CompileError, CompileErrorKind, CompileResult, RenderError, RenderResult, RenderWarning,
    SmarteeError, SmarteeResult,
};
pub use interface::{Params, SmarteeInterface};
pub use macros::{BlockSource, CompileState, Finalized, Handler, Macro, MacroContext};
pub use node::{NodeId, Pending, TagNode};
pub use runtime::{
    CollectingReporter, EmbedBridge, OutputFilter, ParentFinder, Providers, RenderContext,
    Reporter, RequestSnapshot, Template, TracingReporter,
};
pub use script::{Key, Value};
