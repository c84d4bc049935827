//! Executes compiled templates: scopes, output buffers, blocks and the
//! functions compiled code calls into.

mod blocks;
mod context;
mod filters;
mod functions;
mod template;

pub use blocks::{BlockBody, BlockQueue, CompiledBlock};
pub use context::{
    CollectingReporter, EmbedBridge, EmbedDriver, OutputFilter, ParentFinder, Providers,
    RenderContext, Reporter, RequestSnapshot, TracingReporter,
};
pub use filters::{
    Filter, Filters, convertor, escape_for, escape_html, escape_js, spaceless_html,
    spaceless_text, strip_tags,
};
pub(crate) use filters::suggest;
pub use functions::Function;
pub use template::{Phase, Referrer, Relation, RenderMode, Template};
