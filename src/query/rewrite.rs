//! Rewriting of fact-set member variables into positional accessors.

use logos::Logos;

use crate::{
    ast::{Expr, SlotValue, Sym},
    textual::Token,
    universe::SymbolStore,
};

/// Replace every reference to one of `members` in `expr` by an accessor addressing the member by
/// `(depth, position)`.
///
/// `depth` is the number of query calls between `expr` and the query declaring `members`; it grows
/// by one when descending into the test or action of a nested query. With `slot_refs`, variables
/// of the form `?member:slot` become slot accessors. On an invalid slot reference, the offending
/// variable name is returned.
pub(crate) fn rewrite(
    members: &[Sym],
    expr: &mut Expr,
    slot_refs: bool,
    depth: usize,
    symbols: &mut SymbolStore,
) -> Result<(), String> {
    match expr {
        Expr::Var(name) => {
            let name = *name;
            if let Some(position) = members.iter().position(|m| *m == name) {
                *expr = Expr::QueryFact { depth, position };
            } else if slot_refs {
                if let Some(accessor) = slot_reference(members, name, depth, symbols)? {
                    *expr = accessor;
                }
            }
        }
        Expr::Call(call) => {
            for arg in &mut call.args {
                rewrite(members, arg, slot_refs, depth, symbols)?;
            }
        }
        Expr::Query(query) => {
            let body = query.args.len() - query.restrictions().len();
            let (body, restrictions) = query.args.split_at_mut(body);
            for arg in body {
                rewrite(members, arg, slot_refs, depth + 1, symbols)?;
            }
            // restrictions are evaluated before the nested query pushes its core
            for arg in restrictions {
                rewrite(members, arg, slot_refs, depth, symbols)?;
            }
        }
        Expr::Assert(patterns) => {
            for pattern in patterns {
                for slot in &mut pattern.slots {
                    match slot {
                        SlotValue::Single(expr) => {
                            rewrite(members, expr, slot_refs, depth, symbols)?
                        }
                        SlotValue::Multi(exprs) => {
                            for expr in exprs {
                                rewrite(members, expr, slot_refs, depth, symbols)?;
                            }
                        }
                    }
                }
            }
        }
        Expr::Const(_)
        | Expr::Global(_)
        | Expr::Template(_)
        | Expr::QueryFact { .. }
        | Expr::QueryFactSlot { .. }
        | Expr::Delimiter => {}
    }
    Ok(())
}

/// Split `member:slot` at the rightmost colon whose prefix names a member.
fn slot_reference(
    members: &[Sym],
    name: Sym,
    depth: usize,
    symbols: &mut SymbolStore,
) -> Result<Option<Expr>, String> {
    let text = symbols.name(name);
    if text.len() < 3 {
        return Ok(None);
    }
    let found = (1..text.len() - 1).rev().find_map(|i| {
        if text.as_bytes()[i] != b':' {
            return None;
        }
        let prefix = &text[..i];
        members
            .iter()
            .position(|m| symbols.name(*m) == prefix)
            .map(|position| (position, i))
    });
    let Some((position, colon)) = found else {
        return Ok(None);
    };

    let slot_text = text[colon + 1..].to_owned();
    let mut lexer = Token::lexer(&slot_text).spanned();
    match (lexer.next(), lexer.next()) {
        (Some((Ok(Token::Symbol), span)), None) if span == (0..slot_text.len()) => {}
        _ => return Err(text.to_owned()),
    }
    let slot = symbols.get_or_insert_named(&slot_text);
    Ok(Some(Expr::QueryFactSlot {
        depth,
        position,
        slot,
    }))
}
