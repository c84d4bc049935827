//! `{foreach}`, `{foreachelse}`, `{for}` and `{while}`.

use super::{MacroContext, error, forbid_args, forbid_modifiers, missing, unexpected};
use crate::{
    args::{expand_dotted_var, parse_macro_args},
    error::{CompileErrorKind, CompileResult},
    node::{Pending, TagNode},
    writer::{export_string, quoting_pass},
};

const FOREACH_ARGS: [&str; 4] = ["from", "item", "key", "name"];

/// `{foreach from=$list item=row [key=k] [name=n]}`
pub(super) fn open_foreach(node: &mut TagNode, ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_modifiers(node)?;
    let params = parse_macro_args(&node.args, Some(&FOREACH_ARGS));
    let (Some(from), Some(item)) = (params.get("from"), params.get("item")) else {
        return Err(missing(node, "from and item"));
    };

    let item = item.trim_start_matches('$');
    let key = params.get("key").map(|k| k.trim_start_matches('$'));
    ctx.state.mark_overwritten(item, node.line);
    if let Some(key) = key {
        ctx.state.mark_overwritten(key, node.line);
    }

    let from = expand_dotted_var(from);
    let target = match key {
        Some(key) => format!("${key} => ${item}"),
        None => format!("${item}"),
    };
    let code = match params.get("name") {
        Some(name) => {
            let tracker = format!("$smarty['foreach'][{}]", export_string(name));
            format!("{tracker} = iterator({from}); foreach ({tracker} as {target}) {{")
        }
        None => format!("foreach ({from} as {target}) {{"),
    };
    node.pending = Some(Pending::Foreach {
        from,
        has_else: false,
    });
    Ok(code)
}

/// Runs when the loop did nothing; the source is counted again after the loop.
pub(super) fn foreachelse(node: &mut TagNode, ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_modifiers(node)?;
    forbid_args(node, "")?;
    let Some(Pending::Foreach { from, has_else }) = ctx.parent_mut().and_then(|p| p.pending.as_mut())
    else {
        return Err(unexpected(node));
    };
    if *has_else {
        return Err(error(
            node,
            CompileErrorKind::DuplicateBranch {
                parent: "foreach".to_string(),
                tag: "foreachelse".to_string(),
            },
        ));
    }
    *has_else = true;
    Ok(format!("}} if (!count({from})) {{"))
}

pub(super) fn close_foreach(_node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    Ok("}".to_string())
}

pub(super) fn open_for(node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_modifiers(node)?;
    Ok(format!("for ({}) {{", quoting_pass(&node.args)))
}

pub(super) fn close_for(_node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    Ok("}".to_string())
}

/// Without a condition the loop is a `do`/`while` and the closing tag must
/// carry it.
pub(super) fn open_while(node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_modifiers(node)?;
    let do_while = !node.has_args();
    node.pending = Some(Pending::While { do_while });
    if do_while {
        Ok("do {".to_string())
    } else {
        Ok(format!("while ({}) {{", quoting_pass(&node.args)))
    }
}

pub(super) fn close_while(node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    if node.pending != Some(Pending::While { do_while: true }) {
        return Ok("}".to_string());
    }
    if !node.has_args() {
        return Err(error(node, CompileErrorKind::MissingCondition));
    }
    Ok(format!("}} while ({});", quoting_pass(&node.args)))
}

#[cfg(test)]
mod tests {
    use super::super::{
        CompileState, Macro, MacroContext,
        test_utils::{node, opened, run, run_pair},
    };
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_foreach_with_key() {
        let mut state = CompileState::default();
        let (open, close, node) =
            run_pair("foreach", "from=$items key=k item=row", "", "", &mut state).unwrap();
        assert_eq!(open, "foreach ($items as $k => $row) {");
        assert_eq!(close, "}");
        assert_eq!(
            node.pending,
            Some(Pending::Foreach {
                from: "$items".to_string(),
                has_else: false
            })
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_foreach_named_uses_tracker() {
        let mut state = CompileState::default();
        let code = run("foreach", "from=$a.list item=x name=rows", &[], &mut [], &mut state).unwrap();
        assert_eq!(
            code,
            "$smarty['foreach']['rows'] = iterator($a['list']); foreach ($smarty['foreach']['rows'] as $x) {"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_foreach_requires_from_and_item() {
        let mut state = CompileState::default();
        let error = run("foreach", "from=$items", &[], &mut [], &mut state).unwrap_err();
        assert_eq!(error.kind.to_string(), "{foreach} attribute from and item required");
        assert_eq!(error.notation.as_deref(), Some("{foreach}"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_foreach_records_loop_variables() {
        let mut state = CompileState::default();
        run("foreach", "from=$a item=row key=k", &[], &mut [], &mut state).unwrap();
        let prolog = state.finalize().prolog;
        assert!(prolog.contains("if (has_param('row')) overwritten('row', '1');"));
        assert!(prolog.contains("if (has_param('k')) overwritten('k', '1');"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_foreachelse_once() {
        let mut state = CompileState::default();
        let mut parents = [opened("foreach", "from=$items item=i", &mut state)];
        assert_eq!(
            run("foreachelse", "", &[], &mut parents, &mut state).unwrap(),
            "} if (!count($items)) {"
        );
        let error = run("foreachelse", "", &[], &mut parents, &mut state).unwrap_err();
        assert_eq!(
            error.kind.to_string(),
            "Macro {foreach} supports only one {foreachelse}."
        );
        assert!(run("foreachelse", "x", &[], &mut parents, &mut state).is_err());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_while_and_do_while() {
        let mut state = CompileState::default();
        let (open, close, _) = run_pair("while", "$i < 3", "", "", &mut state).unwrap();
        assert_eq!((open.as_str(), close.as_str()), ("while ($i < 3) {", "}"));

        let (open, close, _) = run_pair("while", "", "", "$i < 3", &mut state).unwrap();
        assert_eq!((open.as_str(), close.as_str()), ("do {", "} while ($i < 3);"));

        let error = run_pair("while", "", "", "", &mut state).unwrap_err();
        assert_eq!(error.kind.to_string(), "Missing condition in {while} macro.");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_for() {
        let mut state = CompileState::default();
        let mut node = node("for", "$i = 0; $i < 3; $i++");
        let (open, _) = Macro::For.handlers();
        let code = open(&mut node, &mut MacroContext { open: &mut [], state: &mut state }).unwrap();
        assert_eq!(code, "for ($i = 0; $i < 3; $i++) {");
    }
}
