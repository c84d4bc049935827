use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use super::{
    blocks::{BlockBody, BlockQueue},
    context::{OutputFilter, RenderContext},
    filters::{convertor, escape_for, suggest},
    functions::{BUILTIN_NAMES, call_builtin},
};
use crate::{
    compiler::CompiledTemplate,
    config::ContentType,
    engine::Engine,
    error::{RenderError, RenderResult, RenderWarning},
    script::{Host, Interpreter, LoopTracker, Program, Scope, Value},
};

/// How a template was reached from the one that created it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Relation {
    Include,
    Import,
    Extends,
}

impl Relation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Import => "import",
            Self::Extends => "extends",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Referrer {
    pub name: String,
    pub relation: Relation,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// Only blocks were collected.
    Import,
    /// The body ran silently and the parent did the output.
    Extends,
    Direct,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Phase {
    Created,
    Prepared,
    Rendered(RenderMode),
}

/// A compiled template bound to its parameters, ready to render.
pub struct Template<'e> {
    engine: &'e Engine,
    name: String,
    compiled: Rc<CompiledTemplate>,
    params: Scope,
    parent_name: RefCell<Option<String>>,
    referrer: Option<Referrer>,
    blocks: Rc<RefCell<BlockQueue>>,
    phase: Cell<Phase>,
}

impl std::fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("content_type", &self.content_type())
            .field("parent_name", &self.parent_name)
            .field("referrer", &self.referrer)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl<'e> Template<'e> {
    pub(crate) fn new(
        engine: &'e Engine,
        name: impl Into<String>,
        compiled: Rc<CompiledTemplate>,
        params: Scope,
    ) -> Self {
        Self {
            engine,
            name: name.into(),
            compiled,
            params,
            parent_name: RefCell::new(None),
            referrer: None,
            blocks: Rc::new(RefCell::new(BlockQueue::default())),
            phase: Cell::new(Phase::Created),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> ContentType {
        self.compiled.content_type
    }

    pub const fn params(&self) -> &Scope {
        &self.params
    }

    pub fn parent_name(&self) -> Option<String> {
        self.parent_name.borrow().clone()
    }

    pub const fn referrer(&self) -> Option<&Referrer> {
        self.referrer.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    pub fn compiled(&self) -> &CompiledTemplate {
        &self.compiled
    }

    pub fn block_names(&self) -> Vec<String> {
        self.blocks.borrow().names().map(str::to_string).collect()
    }

    fn relation(&self) -> Option<Relation> {
        self.referrer.as_ref().map(|r| r.relation)
    }

    /// Renders into the innermost output buffer of `ctx`.
    ///
    /// # Errors
    /// Returns the first error raised by this template or any template it
    /// pulls in.
    pub fn render(&self, ctx: &mut RenderContext) -> RenderResult<()> {
        ctx.enter(&self.name, self.engine.config().max_depth)?;
        tracing::debug!(template = %self.name, relation = ?self.relation(), "rendering template");
        let result = self.render_phases(ctx);
        ctx.leave();
        result
    }

    /// Renders and returns the output instead of writing it.
    ///
    /// # Errors
    /// See [`Template::render`].
    pub fn render_to_string(&self, ctx: &mut RenderContext) -> RenderResult<String> {
        self.capture(ctx, |ctx| self.render(ctx))
    }

    /// Runs the prepare section once and registers this template's blocks.
    ///
    /// # Errors
    /// Returns errors raised by the prepare section.
    pub fn prepare(&self, ctx: &mut RenderContext) -> RenderResult<()> {
        if self.phase.get() != Phase::Created {
            return Ok(());
        }
        let mut scope = self.params.clone();
        self.run(&self.compiled.prepare, &mut scope, ctx)?;

        for body in &self.compiled.blocks {
            let warning = self.blocks.borrow_mut().add(Rc::clone(body));
            if let Some(warning) = warning {
                ctx.report(&warning);
            }
        }
        self.phase.set(Phase::Prepared);
        Ok(())
    }

    fn render_phases(&self, ctx: &mut RenderContext) -> RenderResult<()> {
        self.prepare(ctx)?;

        if self.parent_name.borrow().is_none() {
            if let Some(finder) = ctx.providers.parent_finder.clone() {
                let parent = finder(self);
                *self.parent_name.borrow_mut() = parent;
            }
        }
        ctx.ensure_embed_driver();

        let parent = self.parent_name();
        if self.relation() == Some(Relation::Import) {
            if let Some(parent) = parent {
                self.create_template(&parent, Scope::new(), Relation::Import)?
                    .render(ctx)?;
            }
            self.phase.set(Phase::Rendered(RenderMode::Import));
            return Ok(());
        }

        if let Some(parent) = parent {
            let depth = ctx.buffer_depth();
            ctx.push_buffer(Some(OutputFilter::Discard));
            let mut scope = self.params.clone();
            let result = self.run(&self.compiled.main, &mut scope, ctx);
            ctx.discard_above(depth);
            result?;

            self.create_template(&parent, scope, Relation::Extends)?
                .render(ctx)?;
            self.phase.set(Phase::Rendered(RenderMode::Extends));
            return Ok(());
        }

        let mut scope = self.params.clone();
        scope.insert("smarty".to_string(), ctx.request.smarty_variable());
        self.run(&self.compiled.main, &mut scope, ctx)?;
        self.phase.set(Phase::Rendered(RenderMode::Direct));
        Ok(())
    }

    fn run(&self, program: &Program, scope: &mut Scope, ctx: &mut RenderContext) -> RenderResult<()> {
        let mut frame = Frame { template: self, ctx };
        Interpreter::new(&mut frame).run(program, scope)
    }

    /// Creates the template `name` refers to from this one. `extends` and
    /// `import` share this template's block queue.
    ///
    /// # Errors
    /// - If the template cannot be found or fails to compile.
    pub fn create_template(
        &self,
        name: &str,
        params: Scope,
        relation: Relation,
    ) -> RenderResult<Self> {
        let resolved = self.engine.referred_name(name, &self.name);
        let compiled = self.engine.compiled(&resolved)?;
        let mut child = Self::new(self.engine, resolved, compiled, params);
        child.referrer = Some(Referrer {
            name: self.name.clone(),
            relation,
        });
        if matches!(relation, Relation::Extends | Relation::Import) {
            child.blocks = Rc::clone(&self.blocks);
        }
        Ok(child)
    }

    /// Renders the most derived definition of block `name`.
    ///
    /// # Errors
    /// - If no block of that name exists.
    /// - If the block body fails.
    pub fn render_block(
        &self,
        name: &str,
        params: Scope,
        requested: Option<ContentType>,
        ctx: &mut RenderContext,
    ) -> RenderResult<()> {
        let found = {
            let queue = self.blocks.borrow();
            queue
                .get(name)
                .and_then(|chain| Some((chain.content_type, Rc::clone(chain.get(0)?))))
                .ok_or_else(|| RenderError::UndefinedBlock {
                    name: name.to_string(),
                    suggestion: queue.suggestion(name),
                })
        };
        let (block_type, body) = found?;

        if let Some(requested) = requested.filter(|r| *r != block_type) {
            if let Some(convert) = convertor(block_type, requested) {
                let text = self.capture(ctx, |ctx| self.run_block(&body, 0, params, ctx))?;
                ctx.write(&convert(&text));
                return Ok(());
            }
            ctx.report(&RenderWarning::BlockContentType {
                name: name.to_string(),
                block_type,
                requested,
            });
        }
        self.run_block(&body, 0, params, ctx)
    }

    /// Renders the definition of block `name` that the running one overrides.
    ///
    /// # Errors
    /// - If there is no older definition.
    /// - If the block body fails.
    pub fn render_block_parent(
        &self,
        name: &str,
        params: Scope,
        ctx: &mut RenderContext,
    ) -> RenderResult<()> {
        let index = ctx.block_index(name).saturating_add(1);
        let body = self
            .blocks
            .borrow()
            .get(name)
            .and_then(|chain| chain.get(index).cloned())
            .ok_or_else(|| RenderError::UndefinedParentBlock {
                name: name.to_string(),
            })?;
        self.run_block(&body, index, params, ctx)
    }

    fn run_block(
        &self,
        body: &BlockBody,
        index: usize,
        mut params: Scope,
        ctx: &mut RenderContext,
    ) -> RenderResult<()> {
        ctx.push_block_frame(&body.name, index);
        let result = self.run(&body.program, &mut params, ctx);
        ctx.pop_block_frame();
        result
    }

    /// Runs `f` with its output collected into a string. Buffers opened by
    /// `f` are discarded and the capture flag restored even when it fails.
    ///
    /// # Errors
    /// Returns whatever `f` returns, unchanged.
    pub fn capture<F>(&self, ctx: &mut RenderContext, f: F) -> RenderResult<String>
    where
        F: FnOnce(&mut RenderContext) -> RenderResult<()>,
    {
        let depth = ctx.buffer_depth();
        ctx.push_buffer(None);
        let previous = ctx.set_captured(true);
        let result = f(ctx);
        ctx.set_captured(previous);
        let text = ctx.unwind_to(depth);
        if let Err(error) = &result {
            tracing::debug!(template = %self.name, %error, "capture aborted");
        }
        result.map(|()| text)
    }

    // --- Functions callable from compiled code ---

    fn call_function(
        &self,
        name: &str,
        args: Vec<Value>,
        scope: &mut Scope,
        ctx: &mut RenderContext,
    ) -> RenderResult<Value> {
        let mut args = args.into_iter();
        let mut next = || args.next().unwrap_or_default();

        match name {
            "ob_start" => {
                let filter = next();
                ctx.push_buffer(filter.as_str().and_then(OutputFilter::from_name));
            }
            "ob_get_clean" => {
                return Ok(ctx.take_buffer().map_or(Value::Bool(false), Value::from));
            }
            "ob_end_flush" => return Ok(Value::Bool(ctx.flush_buffer())),
            "extends" => {
                let parent = next();
                *self.parent_name.borrow_mut() = parent.is_truthy().then(|| parent.to_string());
            }
            "include_template" | "fetch_template" => {
                let file = next().to_string();
                let params = self.merged_params(next());
                let child = self.create_template(&file, params, Relation::Include)?;
                if name == "include_template" {
                    child.render(ctx)?;
                } else {
                    let text = child.render_to_string(ctx)?;
                    return Ok(if self.content_type().is_html() {
                        Value::html(text)
                    } else {
                        Value::from(text)
                    });
                }
            }
            "import_template" => {
                let file = next().to_string();
                self.create_template(&file, Scope::new(), Relation::Import)?
                    .render(ctx)?;
            }
            "render_block" => {
                // An extending template prints its blocks through the parent.
                if self.parent_name.borrow().is_some() {
                    return Ok(Value::Null);
                }
                let block = next().to_string();
                let params = scope_from(next());
                let requested = next().as_str().and_then(ContentType::from_name);
                self.render_block(&block, params, requested, ctx)?;
            }
            "render_block_parent" => {
                let block = next().to_string();
                let params = scope_from(next());
                self.render_block_parent(&block, params, ctx)?;
            }
            "has_param" => return Ok(Value::Bool(self.params.contains_key(&next().to_string()))),
            "overwritten" => {
                let (name, lines) = (next().to_string(), next().to_string());
                ctx.report(&RenderWarning::OverwrittenVariable { name, lines });
            }
            "defaults" => {
                if let Value::Array(values) = next() {
                    for (key, value) in values {
                        scope.entry(key.to_string()).or_insert(value);
                    }
                }
            }
            "dump" => {
                let (value, label) = (next(), next());
                ctx.dump(&label.to_string(), &value);
            }
            "iterator" => {
                return Ok(match next() {
                    Value::Array(items) => Value::Loop(LoopTracker::new(items.into_iter().collect())),
                    Value::Loop(tracker) => Value::Loop(tracker),
                    Value::Null => Value::Loop(LoopTracker::default()),
                    _ => {
                        ctx.report(&RenderWarning::InvalidForeach);
                        Value::Loop(LoopTracker::default())
                    }
                });
            }
            "html" => {
                // Empty text stays a plain string.
                return Ok(match next() {
                    html @ Value::Html(_) => html,
                    other if other.to_string().is_empty() => Value::from(""),
                    other => Value::html(other.to_string()),
                });
            }
            "escape" => return Ok(escape_for(self.content_type(), &next())),
            "filter" => {
                let filter = next().to_string();
                let value = next();
                let rest: Vec<Value> = args.collect();
                return self.engine.filters().apply(&filter, value, &rest);
            }
            _ => return self.call_external(name, &args.collect::<Vec<_>>()),
        }
        Ok(Value::Null)
    }

    fn call_external(&self, name: &str, args: &[Value]) -> RenderResult<Value> {
        if let Some(function) = self.engine.function(name) {
            return function(args);
        }
        if let Some(value) = call_builtin(name, args) {
            return Ok(value);
        }
        let known = self
            .engine
            .function_names()
            .chain(BUILTIN_NAMES.iter().copied());
        Err(RenderError::UnknownFunction {
            name: name.to_string(),
            suggestion: suggest(name, known),
            line: None,
        })
    }

    /// Forwarded include parameters laid over this template's own.
    fn merged_params(&self, forwarded: Value) -> Scope {
        let mut params = scope_from(forwarded);
        for (key, value) in &self.params {
            params.entry(key.clone()).or_insert_with(|| value.clone());
        }
        params
    }
}

fn scope_from(value: Value) -> Scope {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
        _ => Scope::new(),
    }
}

/// Connects a running program to its template and the render context.
struct Frame<'a, 'e> {
    template: &'a Template<'e>,
    ctx: &'a mut RenderContext,
}

impl Host for Frame<'_, '_> {
    fn echo(&mut self, text: &str) {
        self.ctx.write(text);
    }

    fn call(&mut self, name: &str, args: Vec<Value>, scope: &mut Scope) -> RenderResult<Value> {
        self.template.call_function(name, args, scope, self.ctx)
    }

    fn report(&mut self, warning: RenderWarning) {
        self.ctx.report(&warning);
    }

    fn notice_undefined(&self) -> bool {
        self.template.engine.config().notice_undefined
    }
}
