use std::{
    cell::RefCell,
    collections::HashMap,
    rc::Rc,
};

use indexmap::IndexMap;

use crate::{
    compiler::{CompiledTemplate, Compiler},
    config::EngineConfig,
    error::{CompileResult, RenderError, RenderResult, SmarteeError},
    interface::{Params, SmarteeInterface},
    runtime::{Filters, Function, RenderContext, Template},
    script::Value,
    SmarteeResult,
};

/// Supplies template sources the engine was not given up front.
pub trait Loader {
    /// Source of the template called `name`, if there is one.
    fn load(&self, name: &str) -> Option<String>;

    /// Resolves a name used inside `referring`, e.g. a relative path.
    fn referred_name(&self, name: &str, _referring: &str) -> String {
        name.to_string()
    }
}

/// `Engine` is the implementation of [`SmarteeInterface`]. It owns the
/// registered templates, the filters and functions templates may call and a
/// cache of compiled templates.
///
/// # Examples
///
/// ```
/// use smartee::{Engine, Params, SmarteeInterface};
///
/// let mut engine = Engine::new();
/// engine.add_template("greeting", "Hello, {$name}!").unwrap();
///
/// let mut params = Params::new();
/// params.insert("name", "World");
///
/// let output = engine.render("greeting", Some(&params)).unwrap();
/// assert_eq!(output, "Hello, World!");
/// ```
pub struct Engine {
    config: EngineConfig,
    sources: HashMap<String, String>,
    loader: Option<Box<dyn Loader>>,
    filters: Filters,
    functions: IndexMap<String, Function>,
    cache: RefCell<HashMap<String, Rc<CompiledTemplate>>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("templates", &self.sources.keys().collect::<Vec<_>>())
            .field("filters", &self.filters)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine with the default configuration and the builtin
    /// filters.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            sources: HashMap::new(),
            loader: None,
            filters: Filters::with_builtins(),
            functions: IndexMap::new(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compiles `source` without registering it.
    ///
    /// # Errors
    /// - If the source does not compile.
    pub fn compile(&self, name: &str, source: &str) -> CompileResult<CompiledTemplate> {
        Compiler::new(self.config.content_type)
            .with_functions(self.function_names())
            .compile(name, source)
    }

    /// The compiled form of template `name`, compiling it on first use.
    ///
    /// # Errors
    /// - If no source is registered or loadable under `name`.
    /// - If the source does not compile.
    pub fn compiled(&self, name: &str) -> RenderResult<Rc<CompiledTemplate>> {
        if let Some(compiled) = self.cache.borrow().get(name) {
            return Ok(Rc::clone(compiled));
        }

        let source = match self.sources.get(name) {
            Some(source) => source.clone(),
            None => self
                .loader
                .as_ref()
                .and_then(|loader| loader.load(name))
                .ok_or_else(|| RenderError::MissingTemplate {
                    template_name: name.to_string(),
                })?,
        };
        let compiled = Rc::new(self.compile(name, &source).map_err(|source| {
            RenderError::Compile {
                template_name: name.to_string(),
                source,
            }
        })?);
        self.cache
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&compiled));
        Ok(compiled)
    }

    /// A renderable instance of template `name`.
    ///
    /// # Errors
    /// See [`Engine::compiled`].
    pub fn create_template(&self, name: &str, params: Option<&Params>) -> RenderResult<Template<'_>> {
        let compiled = self.compiled(name)?;
        let scope = params.map(Params::to_scope).unwrap_or_default();
        Ok(Template::new(self, name, compiled, scope))
    }

    /// Renders with a caller-supplied context, e.g. one carrying a reporter,
    /// request data or providers. The context can be reused afterwards.
    ///
    /// # Errors
    /// - If the template cannot be created.
    /// - If rendering fails.
    pub fn render_with_context<N: AsRef<str>>(
        &self,
        template_name: N,
        params: Option<&Params>,
        ctx: &mut RenderContext,
    ) -> SmarteeResult<String> {
        let template = self.create_template(template_name.as_ref(), params)?;
        let depth = ctx.buffer_depth();
        let result = template.render(ctx);
        ctx.discard_above(depth);
        let output = ctx.take_output();
        result?;
        Ok(output)
    }

    /// Registers a filter usable as a `|name` modifier.
    pub fn add_filter<N, F>(&mut self, name: N, filter: F) -> &mut Self
    where
        N: AsRef<str>,
        F: Fn(Value, &[Value]) -> RenderResult<Value> + 'static,
    {
        self.filters.insert(name.as_ref().to_ascii_lowercase(), filter);
        self
    }

    /// Registers a function callable from template expressions. Compiled
    /// templates are dropped since `{debugbreak}` depends on what exists.
    pub fn add_function<N, F>(&mut self, name: N, function: F) -> &mut Self
    where
        N: AsRef<str>,
        F: Fn(&[Value]) -> RenderResult<Value> + 'static,
    {
        self.functions
            .insert(name.as_ref().to_ascii_lowercase(), Rc::new(function));
        self.cache.borrow_mut().clear();
        self
    }

    pub fn set_loader<L: Loader + 'static>(&mut self, loader: L) -> &mut Self {
        self.loader = Some(Box::new(loader));
        self
    }

    /// Resolves `name` as written in template `referring`.
    pub fn referred_name(&self, name: &str, referring: &str) -> String {
        self.loader
            .as_ref()
            .map_or_else(|| name.to_string(), |loader| loader.referred_name(name, referring))
    }

    pub const fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl SmarteeInterface for Engine {
    /// Compiles `content` and registers it under `name`.
    ///
    /// # Examples
    ///
    /// ```
    /// use smartee::{Engine, SmarteeInterface};
    ///
    /// let mut engine = Engine::new();
    /// engine.add_template("list", "{foreach from=$items item=i}{$i}{/foreach}").unwrap();
    /// assert!(engine.add_template("list", "again").is_err());
    /// assert!(engine.add_template("broken", "{if $x}").is_err());
    /// ```
    fn add_template<N: AsRef<str>, C: Into<String>>(
        &mut self,
        name: N,
        content: C,
    ) -> SmarteeResult<()> {
        let name = name.as_ref();
        if self.sources.contains_key(name) {
            return Err(SmarteeError::TemplateExists {
                template_name: name.to_string(),
            });
        }

        let content = content.into();
        let compiled = self.compile(name, &content)?;
        tracing::debug!(template = name, "added template");
        self.cache
            .borrow_mut()
            .insert(name.to_string(), Rc::new(compiled));
        self.sources.insert(name.to_string(), content);
        Ok(())
    }

    /// Renders template `template_name` into a string.
    ///
    /// # Examples
    ///
    /// ```
    /// use smartee::{Engine, Params, SmarteeInterface};
    ///
    /// let mut engine = Engine::new();
    /// engine
    ///     .add_template("list", "{foreach from=$items item=i}[{$i}]{foreachelse}empty{/foreach}")
    ///     .unwrap();
    ///
    /// let mut params = Params::new();
    /// params.insert("items", vec![1, 2]);
    /// assert_eq!(engine.render("list", Some(&params)).unwrap(), "[1][2]");
    /// assert_eq!(engine.render("list", None).unwrap(), "empty");
    /// ```
    fn render<N: AsRef<str>>(
        &self,
        template_name: N,
        params: Option<&Params>,
    ) -> SmarteeResult<String> {
        self.render_with_context(template_name, params, &mut RenderContext::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::CollectingReporter;

    struct MapLoader(HashMap<String, String>);

    impl Loader for MapLoader {
        fn load(&self, name: &str) -> Option<String> {
            self.0.get(name).cloned()
        }

        fn referred_name(&self, name: &str, referring: &str) -> String {
            match referring.rsplit_once('/') {
                Some((dir, _)) if !name.contains('/') => format!("{dir}/{name}"),
                _ => name.to_string(),
            }
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_duplicate_template() {
        let mut engine = Engine::new();
        engine.add_template("a", "x").unwrap();
        let error = engine.add_template("a", "y").unwrap_err();
        assert_eq!(error.to_string(), "Template already exists: a");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_missing_template() {
        let engine = Engine::new();
        let error = engine.render("nope", None).unwrap_err();
        assert_eq!(error.to_string(), "Template not found: nope");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_loader_resolves_relative_names() {
        let mut engine = Engine::new();
        engine.set_loader(MapLoader(HashMap::from([
            ("pages/home".to_string(), "[{include file=row}]".to_string()),
            ("pages/row".to_string(), "row".to_string()),
        ])));
        assert_eq!(engine.render("pages/home", None).unwrap(), "[row]");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_functions_and_filters() {
        let mut engine = Engine::new();
        engine
            .add_function("double", |args| Ok(Value::Int(args[0].to_int() * 2)))
            .add_filter("shout", |value, _| Ok(Value::from(format!("{value}!"))));
        engine.add_template("t", "{double(21)|shout}").unwrap();
        assert_eq!(engine.render("t", None).unwrap(), "42!");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_render_with_context_reports_warnings() {
        let mut engine = Engine::new();
        engine.add_template("t", "[{$missing}]").unwrap();
        let reporter = CollectingReporter::new();
        let mut ctx = RenderContext::new().with_reporter(reporter.clone());
        assert_eq!(engine.render_with_context("t", None, &mut ctx).unwrap(), "[]");
        assert_eq!(reporter.warnings().len(), 1);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_failed_render_leaves_context_clean() {
        let mut engine = Engine::new();
        engine
            .add_template("t", "{capture}partial{undefined_fn()}{/capture}")
            .unwrap();
        let mut ctx = RenderContext::new();
        assert!(engine.render_with_context("t", None, &mut ctx).is_err());
        assert_eq!(ctx.buffer_depth(), 1);
    }
}
