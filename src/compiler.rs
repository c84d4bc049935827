use std::{collections::BTreeSet, rc::Rc};

use crate::{
    config::ContentType,
    error::{CompileError, CompileErrorKind, CompileResult},
    macros::{CompileState, Finalized, Macro, MacroContext},
    node::{NodeId, TagNode},
    parser::{Segment, Tag, tokenize},
    runtime::{BlockBody, suggest},
    script::{self, Program},
    writer::export_string,
};

/// A template translated into target code, with each section parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    pub name: String,
    pub content_type: ContentType,
    pub prepare_code: String,
    pub main_code: String,
    pub prepare: Program,
    pub main: Program,
    pub blocks: Vec<Rc<BlockBody>>,
}

/// Turns template source into a [`CompiledTemplate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compiler {
    content_type: ContentType,
    /// Functions the engine provides, consulted by `{debugbreak}`.
    functions: BTreeSet<String>,
}

impl Compiler {
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            functions: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.functions.extend(names.into_iter().map(Into::into));
        self
    }

    /// # Errors
    /// - If the source has a malformed, unknown or misplaced tag.
    /// - If a tag is left open or closed twice.
    /// - If a handler rejects its arguments.
    /// - If the produced code does not parse.
    pub fn compile(&self, name: &str, source: &str) -> CompileResult<CompiledTemplate> {
        let segments = tokenize(source)?;
        let mut walk = Walk {
            state: CompileState::new(self.content_type, self.functions.iter().cloned()),
            content_type: self.content_type,
            open: Vec::new(),
            openings: Vec::new(),
            root: String::new(),
            next_id: 0,
        };

        for segment in segments {
            match segment {
                Segment::Text { text, .. } => {
                    let code = format!("echo {};\n", export_string(text));
                    walk.output().push_str(&code);
                }
                Segment::Tag(tag) if tag.closing => walk.close(tag)?,
                Segment::Tag(tag) => walk.open(tag)?,
            }
        }
        if let Some(node) = walk.open.last() {
            return Err(CompileError::new(
                node.line,
                Some(node.notation()),
                CompileErrorKind::Unclosed {
                    expected: format!("{{/{}}}", node.name),
                },
            ));
        }

        let Finalized {
            prolog,
            prepare,
            blocks,
        } = walk.state.finalize();
        let main_code = format!("{prolog}{}", walk.root);
        tracing::trace!(template = name, code = %main_code, "emitted code");

        let blocks = blocks
            .into_iter()
            .map(|block| {
                Ok(Rc::new(BlockBody {
                    program: parse_code(&block.code, block.line)?,
                    name: block.name,
                    content_type: block.content_type,
                    code: block.code,
                }))
            })
            .collect::<CompileResult<Vec<_>>>()?;

        let compiled = CompiledTemplate {
            name: name.to_string(),
            content_type: self.content_type,
            prepare: parse_code(&prepare, 1)?,
            main: parse_code(&main_code, 1)?,
            prepare_code: prepare,
            main_code,
            blocks,
        };
        tracing::debug!(
            template = name,
            blocks = compiled.blocks.len(),
            "compiled template"
        );
        Ok(compiled)
    }
}

/// Parses emitted code. Errors point at the closest line marker, or at
/// `fallback_line` before the first one.
fn parse_code(code: &str, fallback_line: usize) -> CompileResult<Program> {
    script::parse(code).map_err(|error| {
        CompileError::new(
            error.line.unwrap_or(fallback_line),
            None,
            CompileErrorKind::InvalidCode {
                message: error.message,
            },
        )
    })
}

/// Code for one tag, tagged with its source line.
fn fragment(line: usize, code: &str) -> String {
    if code.is_empty() {
        String::new()
    } else {
        format!("/* line {line} */ {code}\n")
    }
}

/// Depth-first walk over the segments. Paired tags stay on `open` until
/// closed, collecting the code between their tags in `content`.
struct Walk {
    state: CompileState,
    content_type: ContentType,
    open: Vec<TagNode>,
    /// Opening code of each node in `open`.
    openings: Vec<String>,
    root: String,
    next_id: NodeId,
}

impl Walk {
    fn output(&mut self) -> &mut String {
        match self.open.last_mut() {
            Some(node) => &mut node.content,
            None => &mut self.root,
        }
    }

    fn open(&mut self, tag: Tag) -> CompileResult<()> {
        let Some(found) = Macro::from_name(&tag.name) else {
            let notation = format!("{{{}}}", tag.name);
            let hint = suggest(&tag.name, Macro::ALL.iter().map(|m| m.name()))
                .map(|s| format!(", did you mean {{{s}}}?"))
                .unwrap_or_default();
            return Err(CompileError::new(
                tag.line,
                Some(notation.clone()),
                CompileErrorKind::UnknownMacro { notation, hint },
            ));
        };

        let mut node = TagNode::new(
            self.next_id,
            tag.name,
            tag.args,
            tag.modifiers,
            tag.line,
            self.content_type,
        );
        self.next_id += 1;
        node.parent = self.open.last().map(|parent| parent.id);

        let (open, close) = found.handlers();
        let code = open(
            &mut node,
            &mut MacroContext {
                open: &mut self.open,
                state: &mut self.state,
            },
        )?;
        let code = fragment(node.line, &code);

        if close.is_some() {
            self.open.push(node);
            self.openings.push(code);
        } else {
            self.output().push_str(&code);
        }
        Ok(())
    }

    fn close(&mut self, tag: Tag) -> CompileResult<()> {
        let found = format!("{{/{}}}", tag.name);
        let Some(mut node) = self.open.pop() else {
            return Err(CompileError::new(
                tag.line,
                Some(found.clone()),
                CompileErrorKind::UnexpectedTag { notation: found },
            ));
        };
        let opening = self.openings.pop().unwrap_or_default();
        if !tag.name.is_empty() && tag.name != node.name {
            return Err(CompileError::new(
                tag.line,
                Some(found.clone()),
                CompileErrorKind::UnexpectedClose {
                    found,
                    expected: format!("{{/{}}}", node.name),
                },
            ));
        }

        node.closing = true;
        node.args = tag.args;
        node.modifiers.extend(tag.modifiers);
        node.end_line = Some(tag.line);

        let Some(close) = Macro::from_name(&node.name).and_then(|m| m.handlers().1) else {
            return Err(CompileError::new(
                tag.line,
                Some(node.notation()),
                CompileErrorKind::UnexpectedTag {
                    notation: node.notation(),
                },
            ));
        };
        let code = close(
            &mut node,
            &mut MacroContext {
                open: &mut self.open,
                state: &mut self.state,
            },
        )
        .map_err(|error| CompileError {
            line: tag.line,
            ..error
        })?;

        let mut emitted = opening;
        emitted.push_str(&node.content);
        emitted.push_str(&fragment(tag.line, &code));
        self.output().push_str(&emitted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> CompileResult<CompiledTemplate> {
        Compiler::new(ContentType::Html).compile("test", source)
    }

    fn main_code(source: &str) -> String {
        compile(source).unwrap().main_code
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_text_and_echo() {
        assert_eq!(
            main_code("Hi {$name}!"),
            "echo 'Hi ';\n/* line 1 */ echo escape($name);\necho '!';\n"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_paired_tags_wrap_their_content() {
        assert_eq!(
            main_code("{if $a}\nx{/if}"),
            "/* line 1 */ if ($a) {\necho '\nx';\n/* line 2 */ }\n"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_foreach_prolog() {
        let code = main_code("{foreach from=$items item=i}{$i}{/foreach}");
        assert!(code.starts_with("if (has_param('i')) overwritten('i', '1');\n"));
        assert!(code.contains("foreach ($items as $i) {"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unknown_macro_suggests() {
        let error = compile("{foreahc from=$a item=b}").unwrap_err();
        assert_eq!(
            error.kind.to_string(),
            "Unknown macro {foreahc}, did you mean {foreach}?"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_mismatched_and_unclosed() {
        let error = compile("{if $a}{foreach from=$a item=b}{/if}").unwrap_err();
        assert_eq!(error.kind.to_string(), "Unexpected {/if}, expecting {/foreach}");

        let error = compile("{if $a}\n\n").unwrap_err();
        assert_eq!(error.to_string(), "Missing {/if} (line 1)");

        let error = compile("{/if}").unwrap_err();
        assert_eq!(error.kind.to_string(), "Tag {/if} is unexpected here");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_close_errors_carry_the_closing_line() {
        let error = compile("{while}\n\n{/while}").unwrap_err();
        assert_eq!(error.line, 3);
        assert_eq!(error.kind, CompileErrorKind::MissingCondition);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_invalid_expression_is_reported_with_its_line() {
        let error = compile("ok\n{if $a ==}{/if}").unwrap_err();
        assert_eq!(error.line, 2);
        assert!(matches!(error.kind, CompileErrorKind::InvalidCode { .. }));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_blocks_and_prepare_sections() {
        let compiled = compile("{extends 'layout'}{block title}Hello{/block}").unwrap();
        assert_eq!(compiled.prepare_code, "extends('layout');\n");
        assert_eq!(compiled.blocks.len(), 1);
        assert_eq!(compiled.blocks[0].name, "title");
        assert_eq!(compiled.blocks[0].code, "echo 'Hello';\n");
        assert!(compiled.main_code.contains("render_block('title', get_defined_vars(), 'html');"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_literal_body_is_text() {
        assert_eq!(main_code("{literal}{$x}{/literal}"), "echo '{$x}';\n");
    }
}
