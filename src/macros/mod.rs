//! Tag handlers. Each tag maps to an opening handler and, for paired tags, a
//! closing handler; both return the target code for their position.

mod control;
mod inclusion;
mod loops;
mod output;
mod vars;

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::{
    config::ContentType,
    error::{CompileError, CompileErrorKind, CompileResult},
    node::{Pending, TagNode},
    writer::export_string,
};

pub type Handler = fn(&mut TagNode, &mut MacroContext<'_>) -> CompileResult<String>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Macro {
    If,
    ElseIf,
    Else,
    Switch,
    Case,
    Foreach,
    ForeachElse,
    For,
    While,
    Var,
    Default,
    Dump,
    Debugbreak,
    Ldelim,
    Rdelim,
    Literal,
    Expr,
    Php,
    Capture,
    Spaceless,
    Include,
    Extends,
    Import,
    Block,
}

impl Macro {
    pub const ALL: [Self; 24] = [
        Self::If,
        Self::ElseIf,
        Self::Else,
        Self::Switch,
        Self::Case,
        Self::Foreach,
        Self::ForeachElse,
        Self::For,
        Self::While,
        Self::Var,
        Self::Default,
        Self::Dump,
        Self::Debugbreak,
        Self::Ldelim,
        Self::Rdelim,
        Self::Literal,
        Self::Expr,
        Self::Php,
        Self::Capture,
        Self::Spaceless,
        Self::Include,
        Self::Extends,
        Self::Import,
        Self::Block,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::If => "if",
            Self::ElseIf => "elseif",
            Self::Else => "else",
            Self::Switch => "switch",
            Self::Case => "case",
            Self::Foreach => "foreach",
            Self::ForeachElse => "foreachelse",
            Self::For => "for",
            Self::While => "while",
            Self::Var => "var",
            Self::Default => "default",
            Self::Dump => "dump",
            Self::Debugbreak => "debugbreak",
            Self::Ldelim => "ldelim",
            Self::Rdelim => "rdelim",
            Self::Literal => "literal",
            Self::Expr => "=",
            Self::Php => "php",
            Self::Capture => "capture",
            Self::Spaceless => "spaceless",
            Self::Include => "include",
            Self::Extends => "extends",
            Self::Import => "import",
            Self::Block => "block",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    /// The opening handler and, for paired tags, the closing one.
    pub fn handlers(self) -> (Handler, Option<Handler>) {
        match self {
            Self::If => (control::open_if, Some(control::close_if)),
            Self::ElseIf => (control::elseif, None),
            Self::Else => (control::else_branch, None),
            Self::Switch => (control::open_switch, Some(control::close_switch)),
            Self::Case => (control::case, None),
            Self::Foreach => (loops::open_foreach, Some(loops::close_foreach)),
            Self::ForeachElse => (loops::foreachelse, None),
            Self::For => (loops::open_for, Some(loops::close_for)),
            Self::While => (loops::open_while, Some(loops::close_while)),
            Self::Var | Self::Default => (vars::assign, None),
            Self::Dump => (vars::dump, None),
            Self::Debugbreak => (vars::debugbreak, None),
            Self::Ldelim => (output::ldelim, None),
            Self::Rdelim => (output::rdelim, None),
            Self::Literal => (output::literal, Some(output::literal)),
            Self::Expr => (output::expr, None),
            Self::Php => (output::php, None),
            Self::Capture => (output::open_capture, Some(output::close_capture)),
            Self::Spaceless => (output::open_spaceless, Some(output::close_spaceless)),
            Self::Include => (inclusion::include, None),
            Self::Extends => (inclusion::extends, None),
            Self::Import => (inclusion::import, None),
            Self::Block => (inclusion::open_block, Some(inclusion::close_block)),
        }
    }

    pub fn is_paired(self) -> bool {
        self.handlers().1.is_some()
    }
}

/// Source of one `{block}` body, compiled by the host afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockSource {
    pub name: String,
    pub content_type: ContentType,
    pub code: String,
    pub line: usize,
}

/// What [`CompileState::finalize`] hands back to the host compiler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Finalized {
    /// Code run before the main section.
    pub prolog: String,
    pub prepare: String,
    pub blocks: Vec<BlockSource>,
}

/// Per-template state shared by all handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileState {
    pub content_type: ContentType,
    /// Loop variables and the lines of the loops that set them.
    overwritten_vars: IndexMap<String, Vec<usize>>,
    prepare: String,
    blocks: Vec<BlockSource>,
    block_names: BTreeSet<String>,
    known_functions: BTreeSet<String>,
    counter: usize,
}

impl CompileState {
    pub fn new(content_type: ContentType, known_functions: impl IntoIterator<Item = String>) -> Self {
        Self {
            content_type,
            known_functions: known_functions.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn mark_overwritten(&mut self, name: &str, line: usize) {
        self.overwritten_vars
            .entry(name.to_string())
            .or_default()
            .push(line);
    }

    pub fn add_prepare(&mut self, code: &str) {
        self.prepare.push_str(code);
    }

    /// Reserves a block name; `false` when it is already taken.
    pub fn reserve_block(&mut self, name: &str) -> bool {
        self.block_names.insert(name.to_string())
    }

    pub fn add_block(&mut self, block: BlockSource) {
        self.blocks.push(block);
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.known_functions.contains(name)
    }

    /// A fresh variable for compiler temporaries, e.g. `$_switch0`.
    pub fn unique_var(&mut self, prefix: &str) -> String {
        let var = format!("$_{prefix}{}", self.counter);
        self.counter += 1;
        var
    }

    /// Emits one check per loop variable that warns when the caller passed a
    /// parameter of the same name.
    pub fn finalize(self) -> Finalized {
        let mut prolog = String::new();
        for (name, lines) in &self.overwritten_vars {
            let lines = lines
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            let name = export_string(name);
            prolog.push_str(&format!(
                "if (has_param({name})) overwritten({name}, {});\n",
                export_string(&lines)
            ));
        }
        Finalized {
            prolog,
            prepare: self.prepare,
            blocks: self.blocks,
        }
    }
}

/// What a handler can see besides its own node.
pub struct MacroContext<'c> {
    /// Paired tags open around the current one, outermost first.
    pub open: &'c mut [TagNode],
    pub state: &'c mut CompileState,
}

impl MacroContext<'_> {
    pub fn parent(&self) -> Option<&TagNode> {
        self.open.last()
    }

    pub fn parent_mut(&mut self) -> Option<&mut TagNode> {
        self.open.last_mut()
    }

    pub fn parent_is(&self, name: &str) -> bool {
        self.parent().is_some_and(|p| p.name == name)
    }

    /// Name of the innermost open `{block}`.
    pub fn enclosing_block(&self) -> Option<&str> {
        self.open.iter().rev().find_map(|node| match &node.pending {
            Some(Pending::Block { name }) => Some(name.as_str()),
            _ => None,
        })
    }
}

pub(crate) fn error(node: &TagNode, kind: CompileErrorKind) -> CompileError {
    CompileError::new(node.line, Some(node.notation()), kind)
}

pub(crate) fn forbid_modifiers(node: &TagNode) -> CompileResult<()> {
    if node.has_modifiers() {
        return Err(error(
            node,
            CompileErrorKind::ModifiersNotAllowed {
                notation: node.notation(),
            },
        ));
    }
    Ok(())
}

pub(crate) fn forbid_args(node: &TagNode, hint: &str) -> CompileResult<()> {
    if node.has_args() {
        return Err(error(
            node,
            CompileErrorKind::ArgumentsNotAllowed {
                notation: node.notation(),
                hint: hint.to_string(),
            },
        ));
    }
    Ok(())
}

pub(crate) fn unexpected(node: &TagNode) -> CompileError {
    error(
        node,
        CompileErrorKind::UnexpectedTag {
            notation: node.notation(),
        },
    )
}

pub(crate) fn missing(node: &TagNode, attributes: &str) -> CompileError {
    error(
        node,
        CompileErrorKind::MissingAttribute {
            notation: node.notation(),
            attributes: attributes.to_string(),
        },
    )
}
