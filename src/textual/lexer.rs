use logos::{Lexer, Logos};

#[derive(Logos, Debug, PartialEq, Clone)]
pub enum Token {
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    /// `?name`. The name may contain `:`, so `?a:slot` is a single token.
    #[regex(r#"\?[^\s()";?&|~*][^\s()";&|~]*"#)]
    Variable,

    /// `?*name*`
    #[regex(r#"\?\*[^\s()";&|~*]+\*"#)]
    GlobalVariable,

    #[regex(r"[+-]?[0-9]+", |lex| lex.slice().parse().ok(), priority = 3)]
    Integer(i64),

    #[regex(
        r"[+-]?([0-9]+\.[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?|[+-]?[0-9]+[eE][+-]?[0-9]+",
        |lex| lex.slice().parse().ok(),
        priority = 3
    )]
    Float(f64),

    #[regex(r#""([^"\\]|\\.)*""#, unescape)]
    String(String),

    /// Everything else that is not a delimiter, e.g. `foo`, `>=`, `MAIN::point`.
    #[regex(r#"[^\s()";?&|~][^\s()";&|~]*"#)]
    Symbol,

    #[regex(r";[^\n]*", logos::skip)]
    Comment,

    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Whitespace,
}

fn unescape(lex: &mut Lexer<Token>) -> String {
    let raw = lex.slice();
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw[1..raw.len() - 1].chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    fn lex(source: &str) -> Vec<(Result<Token, ()>, &str)> {
        let mut lexer = Token::lexer(source);
        let mut out = vec![];
        while let Some(tok) = lexer.next() {
            out.push((tok, lexer.slice()));
        }
        out
    }

    #[test]
    fn variables() {
        assert_eq!(
            lex("?a ?a:slot ?*g*"),
            vec![
                (Ok(Token::Variable), "?a"),
                (Ok(Token::Variable), "?a:slot"),
                (Ok(Token::GlobalVariable), "?*g*"),
            ]
        );
    }

    #[test]
    fn numbers_and_symbols() {
        assert_eq!(
            lex("1 -2 3.5 1e3 - >= 1abc MAIN::point"),
            vec![
                (Ok(Token::Integer(1)), "1"),
                (Ok(Token::Integer(-2)), "-2"),
                (Ok(Token::Float(3.5)), "3.5"),
                (Ok(Token::Float(1000.0)), "1e3"),
                (Ok(Token::Symbol), "-"),
                (Ok(Token::Symbol), ">="),
                (Ok(Token::Symbol), "1abc"),
                (Ok(Token::Symbol), "MAIN::point"),
            ]
        );
    }

    #[test]
    fn strings_and_comments() {
        assert_eq!(
            lex(r#"(printout t "say \"hi\"") ; trailing"#),
            vec![
                (Ok(Token::LParen), "("),
                (Ok(Token::Symbol), "printout"),
                (Ok(Token::Symbol), "t"),
                (Ok(Token::String(r#"say "hi""#.into())), r#""say \"hi\"""#),
                (Ok(Token::RParen), ")"),
            ]
        );
    }
}
