//! Tags that pull in other templates or define overridable parts:
//! `{include}`, `{extends}`, `{import}` and `{block}`.

use super::{BlockSource, MacroContext, error, forbid_modifiers, missing, unexpected};
use crate::{
    args::{expand_dotted_var, parse_macro_args, strip_quotes},
    error::{CompileErrorKind, CompileResult},
    node::{Pending, TagNode},
    writer::export_string,
};

/// A `$`-value is an expression, anything else a string literal.
fn value_code(value: &str) -> String {
    if value.starts_with('$') {
        expand_dotted_var(value)
    } else {
        export_string(value)
    }
}

/// `{include file=name [assign=var] [key=value ...]}`
pub(super) fn include(node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_modifiers(node)?;
    let mut params = parse_macro_args(&node.args, None);
    let Some(file) = params.shift_remove("file") else {
        return Err(missing(node, "file"));
    };
    let assign = params.shift_remove("assign");

    let forwarded = params
        .iter()
        .map(|(key, value)| format!("{} => {}", export_string(key), value_code(value)))
        .collect::<Vec<_>>()
        .join(", ");
    let file = value_code(&file);

    Ok(match assign {
        Some(assign) => format!(
            "${} = fetch_template({file}, [{forwarded}]);",
            assign.trim_start_matches('$')
        ),
        None => format!("include_template({file}, [{forwarded}]);"),
    })
}

/// Name given as `file=...` or as the first bare argument.
fn template_name(node: &TagNode) -> Option<String> {
    let params = parse_macro_args(&node.args, Some(&["file"]));
    let name = match params.get("file") {
        Some(file) => file.clone(),
        None => {
            let first = node.args.split_whitespace().next()?;
            if first.starts_with('$') {
                first.to_string()
            } else {
                strip_quotes(first).to_string()
            }
        }
    };
    (!name.is_empty()).then_some(name)
}

/// Records the parent in the prepare section. Only valid outside other tags.
pub(super) fn extends(node: &mut TagNode, ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_modifiers(node)?;
    if !ctx.open.is_empty() {
        return Err(unexpected(node));
    }
    let Some(name) = template_name(node) else {
        return Err(missing(node, "file"));
    };
    ctx.state.add_prepare(&format!("extends({});\n", value_code(&name)));
    Ok(String::new())
}

/// Renders the named template for its blocks only.
pub(super) fn import(node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_modifiers(node)?;
    let Some(name) = template_name(node) else {
        return Err(missing(node, "file"));
    };
    Ok(format!("import_template({});", value_code(&name)))
}

/// `{block name}` or `{block name=name}`
pub(super) fn open_block(node: &mut TagNode, ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_modifiers(node)?;
    let params = parse_macro_args(&node.args, Some(&["name"]));
    let name = match params.get("name") {
        Some(name) => name.clone(),
        None => node
            .args
            .split_whitespace()
            .next()
            .map(|first| strip_quotes(first).to_string())
            .unwrap_or_default(),
    };
    if name.is_empty() {
        return Err(missing(node, "name"));
    }
    if !ctx.state.reserve_block(&name) {
        return Err(error(node, CompileErrorKind::DuplicateBlock { name }));
    }
    node.pending = Some(Pending::Block { name });
    Ok(String::new())
}

/// Moves the body into its own section and renders it in place.
pub(super) fn close_block(node: &mut TagNode, ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    let Some(Pending::Block { name }) = &node.pending else {
        return Err(unexpected(node));
    };
    let code = format!(
        "render_block({}, get_defined_vars(), {});",
        export_string(name),
        export_string(node.content_type.as_str())
    );
    ctx.state.add_block(BlockSource {
        name: name.clone(),
        content_type: node.content_type,
        code: std::mem::take(&mut node.content),
        line: node.line,
    });
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::super::{
        CompileState,
        test_utils::{opened, run, run_pair},
    };
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_include_forwards_params() {
        let mut state = CompileState::default();
        assert_eq!(
            run("include", r#"file="row.tpl" title=$page.title mode=short"#, &[], &mut [], &mut state)
                .unwrap(),
            "include_template('row.tpl', ['title' => $page['title'], 'mode' => 'short']);"
        );
        assert_eq!(
            run("include", "file=$tpl assign=out", &[], &mut [], &mut state).unwrap(),
            "$out = fetch_template($tpl, []);"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_include_requires_file() {
        let mut state = CompileState::default();
        let error = run("include", "title=x", &[], &mut [], &mut state).unwrap_err();
        assert_eq!(error.kind.to_string(), "{include} attribute file required");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_extends_goes_to_prepare() {
        let mut state = CompileState::default();
        assert_eq!(run("extends", "'layout'", &[], &mut [], &mut state).unwrap(), "");
        assert_eq!(state.finalize().prepare, "extends('layout');\n");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_extends_only_at_top_level() {
        let mut state = CompileState::default();
        let mut parents = [opened("if", "$x", &mut state)];
        assert!(run("extends", "file=layout", &[], &mut parents, &mut state).is_err());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_import() {
        let mut state = CompileState::default();
        assert_eq!(
            run("import", "\"blocks\"", &[], &mut [], &mut state).unwrap(),
            "import_template('blocks');"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_block_moves_its_body() {
        let mut state = CompileState::default();
        let (open, close, node) = run_pair("block", "title", "echo 'x';", "", &mut state).unwrap();
        assert_eq!(open, "");
        assert_eq!(close, "render_block('title', get_defined_vars(), 'html');");
        assert!(node.content.is_empty());

        let error = run("block", "title", &[], &mut [], &mut state).unwrap_err();
        assert_eq!(error.kind.to_string(), "Cannot redeclare block 'title'");

        let blocks = state.finalize().blocks;
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].code, "echo 'x';");
    }
}
