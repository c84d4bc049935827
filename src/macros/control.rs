//! `{if}`, `{elseif}`, `{else}`, `{switch}` and `{case}`.

use super::{MacroContext, error, forbid_args, forbid_modifiers, missing, unexpected};
use crate::{
    error::{CompileErrorKind, CompileResult},
    node::{Pending, TagNode},
    writer::{quoting_pass, replace_if_keywords},
};

pub(super) fn open_if(node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_modifiers(node)?;
    node.pending = Some(Pending::If { has_else: false });
    Ok(format!("if ({}) {{", replace_if_keywords(&node.args)))
}

pub(super) fn elseif(node: &mut TagNode, ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_modifiers(node)?;
    match ctx.parent().and_then(|p| p.pending.as_ref()) {
        Some(Pending::If { has_else: false }) => {}
        _ => return Err(unexpected(node)),
    }
    Ok(format!("}} elseif ({}) {{", replace_if_keywords(&node.args)))
}

pub(super) fn else_branch(node: &mut TagNode, ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_modifiers(node)?;
    let hint = if node.args.trim_start().starts_with("if") {
        ", did you mean {elseif}?"
    } else {
        ""
    };
    forbid_args(node, hint)?;

    let Some(Pending::If { has_else }) = ctx.parent_mut().and_then(|p| p.pending.as_mut()) else {
        return Err(unexpected(node));
    };
    if *has_else {
        return Err(error(
            node,
            CompileErrorKind::DuplicateBranch {
                parent: "if".to_string(),
                tag: "else".to_string(),
            },
        ));
    }
    *has_else = true;
    Ok("} else {".to_string())
}

pub(super) fn close_if(_node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    Ok("}".to_string())
}

/// The subject is evaluated once into a temporary; the branches hang off an
/// `if (false)` so every `{case}` can open with `} elseif`.
pub(super) fn open_switch(node: &mut TagNode, ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_modifiers(node)?;
    if !node.has_args() {
        return Err(missing(node, "expression"));
    }
    let subject = ctx.state.unique_var("switch");
    let code = format!("{subject} = ({}); if (false) {{", quoting_pass(&node.args));
    node.pending = Some(Pending::Switch { subject });
    Ok(code)
}

pub(super) fn case(node: &mut TagNode, ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_modifiers(node)?;
    let Some(Pending::Switch { subject }) = ctx.parent().and_then(|p| p.pending.as_ref()) else {
        return Err(unexpected(node));
    };
    if !node.has_args() {
        return Err(missing(node, "value"));
    }
    Ok(format!(
        "}} elseif (in_array({subject}, [{}])) {{",
        quoting_pass(&node.args)
    ))
}

pub(super) fn close_switch(_node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    Ok("}".to_string())
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
    fn test_if_keywords() {
        let mut state = CompileState::default();
        let (open, close, _) = run_pair("if", "$a eq $b", "", "", &mut state).unwrap();
        assert_eq!(open, "if ($a == $b) {");
        assert_eq!(close, "}");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_if_rejects_modifiers() {
        let mut state = CompileState::default();
        let error = run("if", "$a", &["upper"], &mut [], &mut state).unwrap_err();
        assert_eq!(
            error.kind,
            CompileErrorKind::ModifiersNotAllowed {
                notation: "{if}".to_string()
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_else_branches() {
        let mut state = CompileState::default();
        let mut parents = [opened("if", "$a", &mut state)];
        assert_eq!(
            run("elseif", "$b gt 1", &[], &mut parents, &mut state).unwrap(),
            "} elseif ($b > 1) {"
        );
        assert_eq!(run("else", "", &[], &mut parents, &mut state).unwrap(), "} else {");

        let error = run("else", "", &[], &mut parents, &mut state).unwrap_err();
        assert_eq!(error.kind.to_string(), "Macro {if} supports only one {else}.");
        let error = run("elseif", "$c", &[], &mut parents, &mut state).unwrap_err();
        assert_eq!(error.kind.to_string(), "Tag {elseif} is unexpected here");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_else_if_hint() {
        let mut state = CompileState::default();
        let mut parents = [opened("if", "$a", &mut state)];
        let error = run("else", "if $b", &[], &mut parents, &mut state).unwrap_err();
        assert_eq!(
            error.kind.to_string(),
            "Arguments are not allowed in {else}, did you mean {elseif}?"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_else_outside_if() {
        let mut state = CompileState::default();
        assert!(run("else", "", &[], &mut [], &mut state).is_err());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_switch_and_case() {
        let mut state = CompileState::default();
        let mut parents = [opened("switch", "$kind", &mut state)];
        assert_eq!(
            run("case", "'a', b", &[], &mut parents, &mut state).unwrap(),
            "} elseif (in_array($_switch0, ['a', 'b'])) {"
        );
        assert_eq!(run("default", "", &[], &mut parents, &mut state).unwrap(), "} else {");
        assert!(run("case", "1", &[], &mut [], &mut state).is_err());
    }
}
