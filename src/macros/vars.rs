//! `{var}`, `{default}`, `{dump}` and `{debugbreak}`.

use super::{MacroContext, error, forbid_modifiers};
use crate::{
    error::{CompileErrorKind, CompileResult},
    node::TagNode,
    script::{TokenKind, tokenize},
    writer::{export_string, quoting_pass},
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Expect {
    Name,
    /// A name was written; `=` or `,` may follow.
    AfterName,
    Value,
}

/// `{var $a = 1, b => 2}` assigns, `{default a = 1}` only fills in names the
/// caller did not pass. Inside `{switch}` an empty `{default}` is the
/// fallback branch.
pub(super) fn assign(node: &mut TagNode, ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_modifiers(node)?;
    if !node.has_args() && ctx.parent_is("switch") {
        return Ok("} else {".to_string());
    }

    let is_default = node.name == "default";
    let tokens = tokenize(&node.args).map_err(|e| {
        error(
            node,
            CompileErrorKind::InvalidCode {
                message: e.message,
            },
        )
    })?;
    let null_value = if is_default { "=>null" } else { "=null" };

    let mut out = String::new();
    let mut expect = Expect::Name;
    let mut depth = 0_usize;
    for token in &tokens {
        let top_level = depth == 0;
        match token.text.as_str() {
            "(" | "[" | "{" if token.kind == TokenKind::Char => depth += 1,
            ")" | "]" | "}" if token.kind == TokenKind::Char => depth = depth.saturating_sub(1),
            _ => {}
        }

        if expect == Expect::Name && matches!(token.kind, TokenKind::Symbol | TokenKind::Variable) {
            let name = token.text.trim_start_matches('$');
            if is_default {
                out.push_str(&export_string(name));
            } else {
                out.push('$');
                out.push_str(name);
            }
            expect = Expect::AfterName;
        } else if top_level && (token.is_char("=") || token.is_char("=>")) {
            out.push_str(if is_default { "=>" } else { "=" });
            expect = Expect::Value;
        } else if top_level && token.is_char(",") {
            if expect == Expect::AfterName {
                out.push_str(null_value);
            }
            out.push_str(if is_default { "," } else { ";" });
            expect = Expect::Name;
        } else if expect == Expect::AfterName && is_default && token.kind != TokenKind::Whitespace {
            return Err(error(
                node,
                CompileErrorKind::UnexpectedToken {
                    token: token.text.clone(),
                    tag_text: format!("{{default {}}}", node.args),
                },
            ));
        } else {
            out.push_str(&token.text);
        }
    }
    if expect == Expect::AfterName {
        out.push_str(null_value);
    }

    let out = quoting_pass(&out);
    if is_default {
        Ok(format!("defaults([{out}]);"))
    } else {
        Ok(format!("{out};"))
    }
}

pub(super) fn dump(node: &mut TagNode, _ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_modifiers(node)?;
    let args = node.args.trim();
    if args.is_empty() {
        return Ok("dump(get_defined_vars(), 'variables');".to_string());
    }
    Ok(format!(
        "dump(({}), {});",
        quoting_pass(args),
        export_string(args)
    ))
}

/// Calls the first debugger hook the engine knows, if any.
pub(super) fn debugbreak(node: &mut TagNode, ctx: &mut MacroContext<'_>) -> CompileResult<String> {
    forbid_modifiers(node)?;
    let Some(function) = ["debugbreak", "xdebug_break"]
        .into_iter()
        .find(|f| ctx.state.has_function(f))
    else {
        return Ok(String::new());
    };
    if node.has_args() {
        Ok(format!("if ({}) {function}();", quoting_pass(&node.args)))
    } else {
        Ok(format!("{function}();"))
    }
}
