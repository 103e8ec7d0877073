//! The embedded arithmetic-expression interpreter.
//!
//! Expressions are compiled once into an immutable [`Ast`] and evaluated
//! every frame against a string→f64 variable table. Compilation is
//! shunting-yard over a dual stack (operand ASTs, operators/functions)
//! plus a per-open-function argument-count stack.
//!
//! A word is a function iff it appears in the built-in table, otherwise
//! it is a variable reference. Unknown functions, wrong arity, and
//! structurally unbalanced input are compile errors; an unresolved
//! variable is an evaluation error, never a silent default.

use std::collections::{BTreeSet, HashMap};

use crate::error::ExprError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Space,
    Name,
    Literal,
    Operator,
    Separator,
    BeginParen,
    EndParen,
}

/// One lexical token. `text` carries the lexeme, `num` the parsed value
/// for literals.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub num: f64,
}

fn is_word_char(c: u8) -> bool {
    c == b'_' || c.is_ascii_alphanumeric()
}

fn is_word_start(c: u8) -> bool {
    is_word_char(c) && !c.is_ascii_digit()
}

fn is_space(c: u8) -> bool {
    c == b' ' || c == b'\t' || c == b'\r' || c == b'\n'
}

/// Length of the prefix of `text` whose bytes satisfy `pred`, starting
/// the scan at offset `s`.
fn scan(text: &str, pred: impl Fn(u8) -> bool, s: usize) -> usize {
    text.as_bytes()[s..]
        .iter()
        .position(|&c| !pred(c))
        .map(|p| s + p)
        .unwrap_or(text.len())
}

/// Pop exactly one token from the front of `text`, advancing it.
pub fn pop_token(text: &mut &str) -> Result<Token, ExprError> {
    let s = *text;
    let Some(&a) = s.as_bytes().first() else {
        return Err(ExprError::UnexpectedEnd);
    };
    let token = |kind, lexeme: &str| Token {
        kind,
        text: lexeme.to_string(),
        num: 0.0,
    };
    if is_space(a) {
        let pos = scan(s, is_space, 1);
        *text = &s[pos..];
        Ok(token(TokenKind::Space, &s[..pos]))
    } else if is_word_start(a) {
        let pos = scan(s, is_word_char, 1);
        *text = &s[pos..];
        Ok(token(TokenKind::Name, &s[..pos]))
    } else if a.is_ascii_digit() || a == b'.' {
        let pos = scan(s, |c| c.is_ascii_digit() || c == b'.', 1);
        *text = &s[pos..];
        match s[..pos].parse::<f64>() {
            Ok(num) => Ok(Token {
                kind: TokenKind::Literal,
                text: String::new(),
                num,
            }),
            Err(_) => Err(ExprError::BadNumber(s[..pos].to_string())),
        }
    } else if matches!(a, b',' | b'(' | b')') {
        *text = &s[1..];
        let kind = match a {
            b',' => TokenKind::Separator,
            b'(' => TokenKind::BeginParen,
            _ => TokenKind::EndParen,
        };
        Ok(token(kind, &s[..1]))
    } else if matches!(a, b'+' | b'-' | b'*' | b'/' | b'%') {
        *text = &s[1..];
        Ok(token(TokenKind::Operator, &s[..1]))
    } else {
        Err(ExprError::BadChar(s.chars().take(5).collect()))
    }
}

fn precedence(op: u8) -> i32 {
    match op {
        b'+' | b'-' => 1,
        b'*' | b'/' | b'%' => 2,
        _ => -1,
    }
}

/// A built-in function, keyed by arity.
#[derive(Debug, Clone, Copy)]
pub enum Builtin {
    Unary(fn(f64) -> f64),
    Binary(fn(f64, f64) -> f64),
    Ternary(fn(f64, f64, f64) -> f64),
}

impl Builtin {
    fn arity(&self) -> usize {
        match self {
            Builtin::Unary(_) => 1,
            Builtin::Binary(_) => 2,
            Builtin::Ternary(_) => 3,
        }
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn builtin(name: &str) -> Option<Builtin> {
    use Builtin::*;
    Some(match name {
        "sin" => Unary(f64::sin),
        "cos" => Unary(f64::cos),
        "tan" => Unary(f64::tan),
        "sqrt" => Unary(f64::sqrt),
        "exp" => Unary(f64::exp),
        "floor" => Unary(f64::floor),
        "ceil" => Unary(f64::ceil),
        "abs" => Unary(f64::abs),
        "sign" => Unary(sign),
        "fract" | "frac" => Unary(|x| x - x.floor()),
        "min" => Binary(f64::min),
        "max" => Binary(f64::max),
        "pow" => Binary(f64::powf),
        "clamp" => Ternary(|x, lo, hi| x.max(lo).min(hi)),
        "lerp" | "mix" => Ternary(|a, b, t| a * (1.0 - t) + b * t),
        _ => return None,
    })
}

/// Compiled expression tree. Carries no state; safe to re-evaluate every
/// frame.
#[derive(Debug, Clone)]
pub enum Ast {
    Literal(f64),
    Variable(String),
    Binary {
        op: u8,
        lhs: Box<Ast>,
        rhs: Box<Ast>,
    },
    Apply {
        name: String,
        func: Builtin,
        args: Vec<Ast>,
    },
}

impl Ast {
    /// Evaluate against a variable table. Pure and side-effect-free.
    pub fn eval(&self, vars: &HashMap<String, f64>) -> Result<f64, ExprError> {
        match self {
            Ast::Literal(num) => Ok(*num),
            Ast::Variable(name) => vars
                .get(name)
                .copied()
                .ok_or_else(|| ExprError::UnknownVariable(name.clone())),
            Ast::Binary { op, lhs, rhs } => {
                let l = lhs.eval(vars)?;
                let r = rhs.eval(vars)?;
                Ok(match op {
                    b'+' => l + r,
                    b'-' => l - r,
                    b'*' => l * r,
                    b'/' => l / r,
                    _ => l % r,
                })
            }
            Ast::Apply { func, args, .. } => match func {
                Builtin::Unary(f) => Ok(f(args[0].eval(vars)?)),
                Builtin::Binary(f) => Ok(f(args[0].eval(vars)?, args[1].eval(vars)?)),
                Builtin::Ternary(f) => Ok(f(
                    args[0].eval(vars)?,
                    args[1].eval(vars)?,
                    args[2].eval(vars)?,
                )),
            },
        }
    }

    /// Collect every variable name referenced by this tree.
    pub fn variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Ast::Literal(_) => {}
            Ast::Variable(name) => {
                out.insert(name.clone());
            }
            Ast::Binary { lhs, rhs, .. } => {
                lhs.variables(out);
                rhs.variables(out);
            }
            Ast::Apply { args, .. } => {
                for arg in args {
                    arg.variables(out);
                }
            }
        }
    }
}

enum OpEntry {
    Op(u8),
    Paren,
    Func(String),
}

fn reduce_binary(out: &mut Vec<Ast>, op: u8) -> Result<(), ExprError> {
    let rhs = out.pop().ok_or(ExprError::Malformed)?;
    let lhs = out.pop().ok_or(ExprError::Malformed)?;
    out.push(Ast::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    });
    Ok(())
}

/// Compile one textual expression into an [`Ast`].
pub fn compile(text: &str) -> Result<Ast, ExprError> {
    let mut out: Vec<Ast> = Vec::new();
    let mut ops: Vec<OpEntry> = Vec::new();
    let mut arg_counts: Vec<usize> = Vec::new();

    let mut rest = text;
    while !rest.is_empty() {
        let t = pop_token(&mut rest)?;
        match t.kind {
            TokenKind::Space => {}
            TokenKind::Name => {
                if builtin(&t.text).is_some() {
                    arg_counts.push(1);
                    ops.push(OpEntry::Func(t.text));
                } else {
                    out.push(Ast::Variable(t.text));
                }
            }
            TokenKind::Literal => out.push(Ast::Literal(t.num)),
            TokenKind::Separator => {
                let count = arg_counts.last_mut().ok_or(ExprError::Malformed)?;
                *count += 1;
                while let Some(OpEntry::Op(op)) = ops.last() {
                    let op = *op;
                    ops.pop();
                    reduce_binary(&mut out, op)?;
                }
            }
            TokenKind::Operator => {
                let incoming = t.text.as_bytes()[0];
                while let Some(OpEntry::Op(top)) = ops.last() {
                    if precedence(*top) >= precedence(incoming) {
                        let op = *top;
                        ops.pop();
                        reduce_binary(&mut out, op)?;
                    } else {
                        break;
                    }
                }
                ops.push(OpEntry::Op(incoming));
            }
            TokenKind::BeginParen => ops.push(OpEntry::Paren),
            TokenKind::EndParen => {
                while let Some(OpEntry::Op(op)) = ops.last() {
                    let op = *op;
                    ops.pop();
                    reduce_binary(&mut out, op)?;
                }
                match ops.pop() {
                    Some(OpEntry::Paren) => {}
                    _ => return Err(ExprError::Unbalanced),
                }
                if matches!(ops.last(), Some(OpEntry::Func(_))) {
                    let Some(OpEntry::Func(name)) = ops.pop() else {
                        return Err(ExprError::Malformed);
                    };
                    let count = arg_counts.pop().ok_or(ExprError::Malformed)?;
                    let func =
                        builtin(&name).ok_or_else(|| ExprError::UnknownFunction(name.clone()))?;
                    if func.arity() != count {
                        return Err(ExprError::BadArity(name, count));
                    }
                    let mut args = Vec::with_capacity(count);
                    for _ in 0..count {
                        args.push(out.pop().ok_or(ExprError::Malformed)?);
                    }
                    args.reverse();
                    out.push(Ast::Apply { name, func, args });
                }
            }
        }
    }

    // Drain remaining operators. Anything else left on the stack (an open
    // paren or a function marker that never saw its parameter list) means
    // the input was structurally unbalanced.
    while let Some(entry) = ops.pop() {
        match entry {
            OpEntry::Op(op) => reduce_binary(&mut out, op)?,
            OpEntry::Paren => return Err(ExprError::Unbalanced),
            OpEntry::Func(_) => return Err(ExprError::Malformed),
        }
    }

    let root = out.pop().ok_or(ExprError::Malformed)?;
    if !out.is_empty() {
        return Err(ExprError::Malformed);
    }
    Ok(root)
}

/// Split `text` on commas at parenthesis depth zero, validating balance.
pub fn split_top_level(text: &str) -> Result<Vec<&str>, ExprError> {
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(ExprError::Unbalanced);
                }
            }
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ExprError::Unbalanced);
    }
    parts.push(&text[start..]);
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str) -> f64 {
        compile(text).unwrap().eval(&HashMap::new()).unwrap()
    }

    #[test]
    fn test_literal_addition() {
        assert_eq!(eval("456+789"), 1245.0);
    }

    #[test]
    fn test_precedence_and_parens() {
        assert_eq!(eval("2+3*4"), 14.0);
        assert_eq!(eval("(2+3)*4"), 20.0);
        assert_eq!(eval("10-4"), 6.0);
        assert_eq!(eval("1-2-3"), -4.0);
        assert_eq!(eval("7%4"), 3.0);
    }

    #[test]
    fn test_builtins() {
        assert_eq!(eval("sin(0)"), 0.0);
        assert_eq!(eval("clamp(5, 0, 3)"), 3.0);
        assert_eq!(eval("mix(0, 10, 0.5)"), 5.0);
        assert_eq!(eval("lerp(2, 4, 0.25)"), 2.5);
        assert_eq!(eval("min(3, max(1, 2))"), 2.0);
        assert_eq!(eval("fract(1.75)"), 0.75);
        assert_eq!(eval("sign(0)"), 0.0);
        assert_eq!(eval("pow(2, 10)"), 1024.0);
    }

    #[test]
    fn test_variables() {
        let ast = compile("a*b + 1").unwrap();
        let mut vars = HashMap::new();
        vars.insert("a".to_string(), 3.0);
        vars.insert("b".to_string(), 4.0);
        assert_eq!(ast.eval(&vars).unwrap(), 13.0);

        let mut names = std::collections::BTreeSet::new();
        ast.variables(&mut names);
        assert_eq!(names.into_iter().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn test_unknown_variable_is_an_error() {
        let ast = compile("missing + 1").unwrap();
        assert_eq!(
            ast.eval(&HashMap::new()),
            Err(ExprError::UnknownVariable("missing".to_string()))
        );
    }

    #[test]
    fn test_unknown_word_without_call_is_a_variable() {
        // "sinus" is not in the builtin table, so it parses as a variable.
        let ast = compile("sinus").unwrap();
        assert!(matches!(ast, Ast::Variable(_)));
    }

    #[test]
    fn test_bad_arity() {
        assert_eq!(
            compile("clamp(1, 2)").unwrap_err(),
            ExprError::BadArity("clamp".to_string(), 2)
        );
        assert_eq!(
            compile("sin(1, 2)").unwrap_err(),
            ExprError::BadArity("sin".to_string(), 2)
        );
    }

    #[test]
    fn test_malformed_input() {
        assert_eq!(compile("1++2").unwrap_err(), ExprError::Malformed);
        assert_eq!(compile("(1+2").unwrap_err(), ExprError::Unbalanced);
        assert_eq!(compile("1+2)").unwrap_err(), ExprError::Unbalanced);
        assert_eq!(compile("").unwrap_err(), ExprError::Malformed);
        assert!(matches!(
            compile("1.2.3"),
            Err(ExprError::BadNumber(_))
        ));
        assert!(matches!(compile("1 & 2"), Err(ExprError::BadChar(_))));
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(split_top_level("a+b, a-b").unwrap(), ["a+b", " a-b"]);
        assert_eq!(
            split_top_level("clamp(a, 0, 1), b").unwrap(),
            ["clamp(a, 0, 1)", " b"]
        );
        assert_eq!(split_top_level("x").unwrap(), ["x"]);
        assert_eq!(split_top_level("f(a,(b,c)), d").unwrap().len(), 2);
        assert_eq!(split_top_level("(a, b").unwrap_err(), ExprError::Unbalanced);
        assert_eq!(split_top_level("a), b").unwrap_err(), ExprError::Unbalanced);
    }
}
