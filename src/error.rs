use thiserror::Error;

use crate::config::ContentType;

pub type CompileResult<T> = std::result::Result<T, CompileError>;
pub type RenderResult<T> = std::result::Result<T, RenderError>;
pub type SmarteeResult<T> = std::result::Result<T, SmarteeError>;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum CompileErrorKind {
    #[error("Modifiers are not allowed in {notation}")]
    ModifiersNotAllowed { notation: String },
    #[error("Arguments are not allowed in {notation}{hint}")]
    ArgumentsNotAllowed { notation: String, hint: String },
    #[error("Modifiers and arguments are not allowed in {notation}")]
    ModifiersAndArgumentsNotAllowed { notation: String },
    #[error("{notation} attribute {attributes} required")]
    MissingAttribute {
        notation: String,
        attributes: String,
    },
    #[error("Missing condition in {{while}} macro.")]
    MissingCondition,
    #[error("Macro {{{parent}}} supports only one {{{tag}}}.")]
    DuplicateBranch { parent: String, tag: String },
    #[error("Unexpected '{token}' in {tag_text}")]
    UnexpectedToken { token: String, tag_text: String },
    #[error("Unknown macro {notation}{hint}")]
    UnknownMacro { notation: String, hint: String },
    #[error("Tag {notation} is unexpected here")]
    UnexpectedTag { notation: String },
    #[error("Unexpected {found}, expecting {expected}")]
    UnexpectedClose { found: String, expected: String },
    #[error("Missing {expected}")]
    Unclosed { expected: String },
    #[error("Malformed tag: {message}")]
    MalformedTag { message: String },
    #[error("Cannot redeclare block '{name}'")]
    DuplicateBlock { name: String },
    #[error("Invalid compiled code: {message}")]
    InvalidCode { message: String },
}

/// An error raised while compiling a template, always tied to a source line.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[error("{kind} (line {line})")]
pub struct CompileError {
    pub line: usize,
    /// Textual notation of the offending tag, e.g. `{foreach}`.
    pub notation: Option<String>,
    #[source]
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub(crate) const fn new(line: usize, notation: Option<String>, kind: CompileErrorKind) -> Self {
        Self {
            line,
            notation,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("Cannot include undefined block '{name}'{}", suggestion_hint(.suggestion))]
    UndefinedBlock {
        name: String,
        suggestion: Option<String>,
    },
    #[error("Cannot include undefined parent block '{name}'.")]
    UndefinedParentBlock { name: String },
    #[error("Template not found: {template_name}")]
    MissingTemplate { template_name: String },
    #[error("Call to undefined function {name}(){}{}", line_hint(.line), suggestion_hint(.suggestion))]
    UnknownFunction {
        name: String,
        suggestion: Option<String>,
        line: Option<usize>,
    },
    #[error("Filter '{name}' is not defined{}{}", line_hint(.line), suggestion_hint(.suggestion))]
    UnknownFilter {
        name: String,
        suggestion: Option<String>,
        line: Option<usize>,
    },
    #[error("{message}{}", line_hint(.line))]
    Script {
        message: String,
        line: Option<usize>,
    },
    #[error("Maximum template nesting depth of {max_depth} exceeded in '{template_name}'")]
    RecursionLimit {
        template_name: String,
        max_depth: usize,
    },
    #[error("Failed to compile template '{template_name}': {source}")]
    Compile {
        template_name: String,
        #[source]
        source: CompileError,
    },
}

impl RenderError {
    /// Fills in the template line of errors raised without one.
    pub(crate) fn with_line(self, at: Option<usize>) -> Self {
        match self {
            Self::Script { message, line: None } => Self::Script { message, line: at },
            Self::UnknownFunction {
                name,
                suggestion,
                line: None,
            } => Self::UnknownFunction {
                name,
                suggestion,
                line: at,
            },
            Self::UnknownFilter {
                name,
                suggestion,
                line: None,
            } => Self::UnknownFilter {
                name,
                suggestion,
                line: at,
            },
            tagged @ (Self::UndefinedBlock { .. }
            | Self::UndefinedParentBlock { .. }
            | Self::MissingTemplate { .. }
            | Self::RecursionLimit { .. }
            | Self::Compile { .. }
            | Self::Script { line: Some(_), .. }
            | Self::UnknownFunction { line: Some(_), .. }
            | Self::UnknownFilter { line: Some(_), .. }) => tagged,
        }
    }
}

fn line_hint(line: &Option<usize>) -> String {
    line.map(|line| format!(" on line {line}")).unwrap_or_default()
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map_or_else(|| ".".to_string(), |s| format!(", did you mean '{s}'?"))
}

/// Non-fatal problems noticed while rendering. They are handed to the
/// configured [`crate::Reporter`] and never change the output.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderWarning {
    #[error(
        "Including block {name} with content type {} into incompatible type {}.",
        .block_type.label(),
        .requested.label()
    )]
    BlockContentType {
        name: String,
        block_type: ContentType,
        requested: ContentType,
    },
    #[error(
        "Overridden block {name} with content type {} by incompatible type {}.",
        .current.label(),
        .expected.label()
    )]
    BlockOverride {
        name: String,
        current: ContentType,
        expected: ContentType,
    },
    #[error("Variable ${name} overwritten in foreach on line {lines}")]
    OverwrittenVariable { name: String, lines: String },
    #[error("Undefined variable: ${name}")]
    UndefinedVariable { name: String },
    #[error("Invalid argument supplied for foreach()")]
    InvalidForeach,
    #[error("{0}")]
    Notice(String),
}

#[derive(Debug, Error)]
pub enum SmarteeError {
    #[error("Template already exists: {template_name}")]
    TemplateExists { template_name: String },
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Render(#[from] RenderError),
}
