use std::{any::Any, cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;

use super::{
    filters::{spaceless_html, spaceless_text},
    template::Template,
};
use crate::{
    error::{RenderError, RenderResult, RenderWarning},
    script::{Key, Value},
};

/// Receives warnings and `{dump}` output produced while rendering.
pub trait Reporter {
    fn warning(&self, warning: &RenderWarning);

    fn dump(&self, label: &str, value: &Value);
}

/// Default reporter, forwarding everything to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn warning(&self, warning: &RenderWarning) {
        tracing::warn!("{warning}");
    }

    fn dump(&self, label: &str, value: &Value) {
        tracing::debug!(label, "{value:?}");
    }
}

/// Keeps every warning and dump in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct CollectingReporter {
    warnings: Rc<RefCell<Vec<RenderWarning>>>,
    dumps: Rc<RefCell<Vec<(String, Value)>>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<RenderWarning> {
        self.warnings.borrow().clone()
    }

    pub fn dumps(&self) -> Vec<(String, Value)> {
        self.dumps.borrow().clone()
    }
}

impl Reporter for CollectingReporter {
    fn warning(&self, warning: &RenderWarning) {
        self.warnings.borrow_mut().push(warning.clone());
    }

    fn dump(&self, label: &str, value: &Value) {
        self.dumps.borrow_mut().push((label.to_string(), value.clone()));
    }
}

/// Request data exposed to templates as `$smarty.get`, `$smarty.post` and so on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestSnapshot {
    pub get: Value,
    pub post: Value,
    pub cookies: Value,
    pub server: Value,
    pub env: Value,
    pub session: Value,
    pub request: Value,
}

impl RequestSnapshot {
    /// Builds the `smarty` variable with empty `capture` and `foreach` containers.
    pub(crate) fn smarty_variable(&self) -> Value {
        let or_empty = |value: &Value| match value {
            Value::Null => Value::Array(IndexMap::new()),
            _ => value.clone(),
        };
        let entries = [
            ("get", or_empty(&self.get)),
            ("post", or_empty(&self.post)),
            ("cookies", or_empty(&self.cookies)),
            ("server", or_empty(&self.server)),
            ("env", or_empty(&self.env)),
            ("session", or_empty(&self.session)),
            ("request", or_empty(&self.request)),
            ("capture", Value::Array(IndexMap::new())),
            ("foreach", Value::Array(IndexMap::new())),
        ];
        Value::Array(
            entries
                .into_iter()
                .map(|(name, value)| (Key::from(name), value))
                .collect(),
        )
    }
}

/// Decides the parent of a template that did not declare one.
pub type ParentFinder = Rc<dyn Fn(&Template<'_>) -> Option<String>>;

/// Hook for partial re-rendering of named regions of a page.
pub trait EmbedBridge {
    fn is_active(&self) -> bool;
}

/// Per-render state created from the [`EmbedBridge`].
#[derive(Clone)]
pub struct EmbedDriver {
    bridge: Rc<dyn EmbedBridge>,
}

impl EmbedDriver {
    pub fn new(bridge: Rc<dyn EmbedBridge>) -> Self {
        Self { bridge }
    }

    pub fn is_active(&self) -> bool {
        self.bridge.is_active()
    }
}

impl fmt::Debug for EmbedDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbedDriver")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Optional collaborators handed to every template of a render.
#[derive(Clone, Default)]
pub struct Providers {
    pub parent_finder: Option<ParentFinder>,
    pub embed_bridge: Option<Rc<dyn EmbedBridge>>,
    services: IndexMap<String, Rc<dyn Any>>,
}

impl fmt::Debug for Providers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Providers")
            .field("parent_finder", &self.parent_finder.is_some())
            .field("embed_bridge", &self.embed_bridge.is_some())
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Providers {
    pub fn insert_service<T: Any>(&mut self, name: impl Into<String>, service: T) -> &mut Self {
        self.services.insert(name.into(), Rc::new(service));
        self
    }

    pub fn service<T: Any>(&self, name: &str) -> Option<&T> {
        self.services.get(name)?.downcast_ref()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OutputFilter {
    SpacelessHtml,
    SpacelessText,
    /// Swallows everything written to the buffer.
    Discard,
}

impl OutputFilter {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "spaceless_html" => Some(Self::SpacelessHtml),
            "spaceless_text" => Some(Self::SpacelessText),
            "discard" => Some(Self::Discard),
            _ => None,
        }
    }

    fn apply(self, text: &str) -> String {
        match self {
            Self::SpacelessHtml => spaceless_html(text),
            Self::SpacelessText => spaceless_text(text),
            Self::Discard => String::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct OutputBuffer {
    text: String,
    filter: Option<OutputFilter>,
}

/// State shared by every template rendered from one top-level call.
pub struct RenderContext {
    buffers: Vec<OutputBuffer>,
    captured: bool,
    pub request: RequestSnapshot,
    pub providers: Providers,
    reporter: Box<dyn Reporter>,
    /// `(block name, definition index)` of the blocks currently running.
    block_frames: Vec<(String, usize)>,
    embed_driver: Option<EmbedDriver>,
    depth: usize,
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("buffers", &self.buffers)
            .field("captured", &self.captured)
            .field("request", &self.request)
            .field("providers", &self.providers)
            .field("block_frames", &self.block_frames)
            .field("embed_driver", &self.embed_driver)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderContext {
    pub fn new() -> Self {
        Self {
            buffers: vec![OutputBuffer::default()],
            captured: false,
            request: RequestSnapshot::default(),
            providers: Providers::default(),
            reporter: Box::new(TracingReporter),
            block_frames: Vec::new(),
            embed_driver: None,
            depth: 0,
        }
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    #[must_use]
    pub fn with_request(mut self, request: RequestSnapshot) -> Self {
        self.request = request;
        self
    }

    #[must_use]
    pub fn with_providers(mut self, providers: Providers) -> Self {
        self.providers = providers;
        self
    }

    pub fn report(&self, warning: &RenderWarning) {
        self.reporter.warning(warning);
    }

    pub fn dump(&self, label: &str, value: &Value) {
        self.reporter.dump(label, value);
    }

    /// Whether output is currently being captured into a string.
    pub const fn is_captured(&self) -> bool {
        self.captured
    }

    /// Sets the capture flag and returns the previous value.
    pub(crate) const fn set_captured(&mut self, captured: bool) -> bool {
        let previous = self.captured;
        self.captured = captured;
        previous
    }

    pub const fn embed_driver(&self) -> Option<&EmbedDriver> {
        self.embed_driver.as_ref()
    }

    pub(crate) fn ensure_embed_driver(&mut self) {
        if self.embed_driver.is_some() {
            return;
        }
        if let Some(bridge) = &self.providers.embed_bridge {
            self.embed_driver = Some(EmbedDriver::new(Rc::clone(bridge)));
        }
    }

    // --- Output ---

    pub fn write(&mut self, text: &str) {
        if let Some(buffer) = self.buffers.last_mut() {
            if buffer.filter != Some(OutputFilter::Discard) {
                buffer.text.push_str(text);
            }
        }
    }

    pub(crate) fn push_buffer(&mut self, filter: Option<OutputFilter>) {
        self.buffers.push(OutputBuffer {
            text: String::new(),
            filter,
        });
    }

    pub(crate) fn buffer_depth(&self) -> usize {
        self.buffers.len()
    }

    /// Pops the innermost buffer and returns its raw text. The base buffer
    /// is never popped.
    pub(crate) fn take_buffer(&mut self) -> Option<String> {
        if self.buffers.len() <= 1 {
            return None;
        }
        self.buffers.pop().map(|buffer| buffer.text)
    }

    /// Pops the innermost buffer and writes its filtered text to the next one.
    pub(crate) fn flush_buffer(&mut self) -> bool {
        if self.buffers.len() <= 1 {
            return false;
        }
        let Some(buffer) = self.buffers.pop() else {
            return false;
        };
        let text = match buffer.filter {
            Some(filter) => filter.apply(&buffer.text),
            None => buffer.text,
        };
        self.write(&text);
        true
    }

    /// Drops every buffer above `depth`, then pops and returns the one at
    /// `depth`.
    pub(crate) fn unwind_to(&mut self, depth: usize) -> String {
        self.buffers.truncate(depth.saturating_add(1).max(2));
        self.take_buffer().unwrap_or_default()
    }

    /// Drops every buffer above `depth` without returning anything.
    pub(crate) fn discard_above(&mut self, depth: usize) {
        self.buffers.truncate(depth.max(1));
    }

    /// Takes everything written to the base buffer so far.
    pub fn take_output(&mut self) -> String {
        self.buffers
            .first_mut()
            .map(|buffer| std::mem::take(&mut buffer.text))
            .unwrap_or_default()
    }

    // --- Blocks ---

    /// Definition index of the innermost running frame of block `name`.
    pub(crate) fn block_index(&self, name: &str) -> usize {
        self.block_frames
            .iter()
            .rev()
            .find(|(frame, _)| frame == name)
            .map_or(0, |(_, index)| *index)
    }

    pub(crate) fn push_block_frame(&mut self, name: &str, index: usize) {
        self.block_frames.push((name.to_string(), index));
    }

    pub(crate) fn pop_block_frame(&mut self) {
        self.block_frames.pop();
    }

    // --- Nesting ---

    /// Enters a nested template render.
    ///
    /// # Errors
    /// - If the nesting would exceed `max_depth`.
    pub(crate) fn enter(&mut self, template_name: &str, max_depth: usize) -> RenderResult<()> {
        if self.depth >= max_depth {
            return Err(RenderError::RecursionLimit {
                template_name: template_name.to_string(),
                max_depth,
            });
        }
        self.depth = self.depth.saturating_add(1);
        Ok(())
    }

    pub(crate) const fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}
