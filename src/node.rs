use crate::config::ContentType;

pub type NodeId = usize;

/// State an opening handler leaves for the closing handler and for tags
/// nested inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pending {
    If {
        has_else: bool,
    },
    Foreach {
        /// Source expression after dotted-path expansion.
        from: String,
        has_else: bool,
    },
    While {
        do_while: bool,
    },
    Capture {
        name: String,
        assign: Option<String>,
    },
    Switch {
        /// Variable holding the evaluated subject.
        subject: String,
    },
    Block {
        name: String,
    },
}

/// A tag as seen by the macro handlers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagNode {
    pub id: NodeId,
    pub name: String,
    /// Raw argument text. Replaced by the closing tag's arguments before the
    /// close handler runs.
    pub args: String,
    pub modifiers: Vec<String>,
    pub line: usize,
    /// Line of the closing tag, once seen.
    pub end_line: Option<usize>,
    /// Enclosing paired tag.
    pub parent: Option<NodeId>,
    pub closing: bool,
    pub content_type: ContentType,
    /// Compiled code between the opening and closing tag.
    pub content: String,
    pub pending: Option<Pending>,
}

impl TagNode {
    pub(crate) fn new(
        id: NodeId,
        name: impl Into<String>,
        args: impl Into<String>,
        modifiers: Vec<String>,
        line: usize,
        content_type: ContentType,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            args: args.into(),
            modifiers,
            line,
            end_line: None,
            parent: None,
            closing: false,
            content_type,
            content: String::new(),
            pending: None,
        }
    }

    /// `{name}` or `{/name}`, as used in error messages.
    pub fn notation(&self) -> String {
        if self.closing {
            format!("{{/{}}}", self.name)
        } else {
            format!("{{{}}}", self.name)
        }
    }

    pub fn has_modifiers(&self) -> bool {
        !self.modifiers.is_empty()
    }

    pub fn has_args(&self) -> bool {
        !self.args.trim().is_empty()
    }
}
