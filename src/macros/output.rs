//! Tags that print: `{=}`, `{php}`, delimiters, `{literal}`, `{capture}` and
//! `{spaceless}`.

use super::{MacroContext, error, unexpected};
use crate::{
    args::parse_macro_args,
    error::{CompileErrorKind, CompileResult},
    node::{Pending, TagNode},
    writer::{apply_modifiers, expand_paths, export_string, modify},
};

const BLOCK_PARENT: &str = "$smarty.block.parent";

/// `{$expr|modifiers}`, printed escaped unless `noescape` is given.
pub(super) fn expr(node: &mut TagNode, ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    if node.args.trim() == BLOCK_PARENT {
        let Some(block) = ctx.enclosing_block() else {
            return Err(error(
                node,
                CompileErrorKind::UnexpectedTag {
                    notation: format!("{{{BLOCK_PARENT}}}"),
                },
            ));
        };
        return Ok(format!(
            "render_block_parent({}, get_defined_vars());",
            export_string(block)
        ));
    }
    let expanded = expand_paths(&node.args);
    Ok(format!("echo {};", modify(&expanded, &node.modifiers)))
}

/// `{php expr}` evaluates for side effects only.
pub(super) fn php(node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    Ok(format!("{};", apply_modifiers(&node.args, &node.modifiers)))
}

pub(super) fn ldelim(_node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    Ok("echo '{';".to_string())
}

pub(super) fn rdelim(_node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    Ok("echo '}';".to_string())
}

/// The body of `{literal}` reaches the compiler as plain text.
pub(super) fn literal(_node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    Ok(String::new())
}

/// `{capture [name=n] [assign=var]}`
pub(super) fn open_capture(node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    let params = parse_macro_args(&node.args, Some(&["name", "assign"]));
    node.pending = Some(Pending::Capture {
        name: params
            .get("name")
            .cloned()
            .unwrap_or_else(|| "default".to_string()),
        assign: params
            .get("assign")
            .map(|a| a.trim_start_matches('$').to_string()),
    });
    Ok("ob_start();".to_string())
}

/// Stores the captured text as markup in HTML templates, as plain text
/// elsewhere.
pub(super) fn close_capture(node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    let Some(Pending::Capture { name, assign }) = &node.pending else {
        return Err(unexpected(node));
    };
    let body = if node.content_type.is_html() {
        "html(ob_get_clean())"
    } else {
        "ob_get_clean()"
    };
    let slot = format!("$smarty['capture'][{}]", export_string(name));
    let mut code = format!("{slot} = {};", apply_modifiers(body, &node.modifiers));
    if let Some(assign) = assign {
        code.push_str(&format!(" ${assign} = {slot};"));
    }
    Ok(code)
}

pub(super) fn open_spaceless(node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_args_and_modifiers(node)?;
    let filter = if node.content_type.is_html() {
        "spaceless_html"
    } else {
        "spaceless_text"
    };
    Ok(format!("ob_start('{filter}');"))
}

pub(super) fn close_spaceless(node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_args_and_modifiers(node)?;
    Ok("ob_end_flush();".to_string())
}

fn forbid_args_and_modifiers(node: &TagNode) -> CompileResult<()> {
    if node.has_args() || node.has_modifiers() {
        return Err(error(
            node,
            CompileErrorKind::ModifiersAndArgumentsNotAllowed {
                notation: node.notation(),
            },
        ));
    }
    Ok(())
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
    fn test_echo_expands_paths_and_escapes() {
        let mut state = CompileState::default();
        assert_eq!(
            run("=", "$user.name", &["upper"], &mut [], &mut state).unwrap(),
            "echo escape(filter('upper', $user['name']));"
        );
        assert_eq!(
            run("=", "$html", &["noescape"], &mut [], &mut state).unwrap(),
            "echo $html;"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_block_parent() {
        let mut state = CompileState::default();
        let mut parents = [opened("block", "title", &mut state)];
        assert_eq!(
            run("=", "$smarty.block.parent", &[], &mut parents, &mut state).unwrap(),
            "render_block_parent('title', get_defined_vars());"
        );
        assert!(run("=", "$smarty.block.parent", &[], &mut [], &mut state).is_err());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_php_and_delimiters() {
        let mut state = CompileState::default();
        assert_eq!(run("php", "$i++", &[], &mut [], &mut state).unwrap(), "$i++;");
        assert_eq!(run("ldelim", "", &[], &mut [], &mut state).unwrap(), "echo '{';");
        assert_eq!(run("rdelim", "", &[], &mut [], &mut state).unwrap(), "echo '}';");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_capture() {
        let mut state = CompileState::default();
        let (open, close, _) = run_pair("capture", "name=foo assign=bar", "", "", &mut state).unwrap();
        assert_eq!(open, "ob_start();");
        assert_eq!(
            close,
            "$smarty['capture']['foo'] = html(ob_get_clean()); $bar = $smarty['capture']['foo'];"
        );

        let (_, close, _) = run_pair("capture", "", "", "", &mut state).unwrap();
        assert_eq!(close, "$smarty['capture']['default'] = html(ob_get_clean());");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_spaceless() {
        let mut state = CompileState::default();
        let (open, close, _) = run_pair("spaceless", "", "", "", &mut state).unwrap();
        assert_eq!(open, "ob_start('spaceless_html');");
        assert_eq!(close, "ob_end_flush();");

        let error = run("spaceless", "x", &[], &mut [], &mut state).unwrap_err();
        assert_eq!(
            error.kind.to_string(),
            "Modifiers and arguments are not allowed in {spaceless}"
        );
    }
}
