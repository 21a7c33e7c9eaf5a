//! Type-expression language.
//!
//! Field types are written the way typing annotations read:
//! `list[int]`, `dict[str, Optional[Node]]`, `tuple[int, ...]`,
//! `Literal['a', 1]`, `Click | Scroll | None`. Bare identifiers that are not
//! primitives come out as [`Shape::Named`] and are resolved by a schema.

use crate::shape::{Primitive, Shape, TypeDescriptor};
use serde_json::{Number, Value};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid type expression at offset {position}: {message}")]
pub struct TypeExprError {
    pub position: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(Number),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Pipe,
    Ellipsis,
}

/* Generic argument before interpretation by its head */
enum Arg {
    Type(TypeDescriptor, usize),
    Literal(Value, usize),
    Ellipsis(usize),
    EmptyTuple(usize),
}

impl TypeDescriptor {
    /// Parse a type expression.
    pub fn parse(src: &str) -> Result<Self, TypeExprError> {
        let tokens = tokenize(src)?;
        let mut parser = ExprParser {
            tokens,
            pos: 0,
            end: src.len(),
        };
        let ty = parser.parse_union()?;
        if let Some((_, offset)) = parser.peek() {
            return Err(err(*offset, "unexpected trailing input"));
        }
        Ok(ty)
    }
}

impl FromStr for TypeDescriptor {
    type Err = TypeExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TypeDescriptor::parse(s)
    }
}

fn err(position: usize, message: impl Into<String>) -> TypeExprError {
    TypeExprError {
        position,
        message: message.into(),
    }
}

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, TypeExprError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '[' => {
                tokens.push((Token::LBracket, i));
                i += 1;
            }
            ']' => {
                tokens.push((Token::RBracket, i));
                i += 1;
            }
            '(' => {
                tokens.push((Token::LParen, i));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, i));
                i += 1;
            }
            ',' => {
                tokens.push((Token::Comma, i));
                i += 1;
            }
            '|' => {
                tokens.push((Token::Pipe, i));
                i += 1;
            }
            '.' if src[i..].starts_with("...") => {
                tokens.push((Token::Ellipsis, i));
                i += 3;
            }
            '\'' | '"' => {
                let start = i;
                let quote = c;
                let mut text = String::new();
                i += 1;
                let mut closed = false;
                while let Some(ch) = src[i..].chars().next() {
                    i += ch.len_utf8();
                    if ch == '\\' {
                        match src[i..].chars().next() {
                            Some(escaped) => {
                                text.push(escaped);
                                i += escaped.len_utf8();
                            }
                            None => break,
                        }
                    } else if ch == quote {
                        closed = true;
                        break;
                    } else {
                        text.push(ch);
                    }
                }
                if !closed {
                    return Err(err(start, "unterminated string literal"));
                }
                tokens.push((Token::Str(text), start));
            }
            '-' | '0'..='9' => {
                let start = i;
                i += 1;
                while i < bytes.len()
                    && matches!(bytes[i] as char, '0'..='9' | '.' | 'e' | 'E' | '+' | '-' | '_')
                {
                    i += 1;
                }
                let text = src[start..i].replace('_', "");
                let number = if let Ok(int) = text.parse::<i64>() {
                    Number::from(int)
                } else {
                    text.parse::<f64>()
                        .ok()
                        .and_then(Number::from_f64)
                        .ok_or_else(|| err(start, format!("invalid number `{text}`")))?
                };
                tokens.push((Token::Num(number), start));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while let Some(ch) = src[i..].chars().next() {
                    if ch.is_alphanumeric() || ch == '_' || ch == '.' && !src[i..].starts_with("...") {
                        i += ch.len_utf8();
                    } else {
                        break;
                    }
                }
                tokens.push((Token::Ident(src[start..i].to_string()), start));
            }
            other => return Err(err(i, format!("unexpected character `{other}`"))),
        }
    }
    Ok(tokens)
}

struct ExprParser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&(Token, usize)> {
        self.tokens.get(self.pos)
    }

    fn offset(&self) -> usize {
        self.peek().map(|(_, o)| *o).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        match self.peek() {
            Some((tok, _)) if tok == expected => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn parse_union(&mut self) -> Result<TypeDescriptor, TypeExprError> {
        let mut arms = vec![self.parse_term()?];
        while self.eat(&Token::Pipe) {
            arms.push(self.parse_term()?);
        }
        if arms.len() == 1 {
            Ok(arms.remove(0))
        } else {
            Ok(union_of(arms))
        }
    }

    fn parse_term(&mut self) -> Result<TypeDescriptor, TypeExprError> {
        let (tok, offset) = self
            .next()
            .ok_or_else(|| err(self.end, "expected a type"))?;
        let head = match tok {
            Token::Ident(name) => name,
            other => return Err(err(offset, format!("expected a type name, found {other:?}"))),
        };
        let args = if self.eat(&Token::LBracket) {
            let args = self.parse_args(head == "Literal")?;
            if !self.eat(&Token::RBracket) {
                return Err(err(self.offset(), "expected `]`"));
            }
            Some(args)
        } else {
            None
        };
        build(&head, offset, args)
    }

    fn parse_args(&mut self, literal_context: bool) -> Result<Vec<Arg>, TypeExprError> {
        let mut args = Vec::new();
        loop {
            if matches!(self.peek(), Some((Token::RBracket, _))) {
                break;
            }
            args.push(self.parse_arg(literal_context)?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn parse_arg(&mut self, literal_context: bool) -> Result<Arg, TypeExprError> {
        let offset = self.offset();
        match self.peek().map(|(t, _)| t.clone()) {
            Some(Token::Ellipsis) => {
                self.pos += 1;
                Ok(Arg::Ellipsis(offset))
            }
            Some(Token::Str(s)) => {
                self.pos += 1;
                Ok(Arg::Literal(Value::String(s), offset))
            }
            Some(Token::Num(n)) => {
                self.pos += 1;
                Ok(Arg::Literal(Value::Number(n), offset))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                if !self.eat(&Token::RParen) {
                    return Err(err(self.offset(), "expected `)`"));
                }
                Ok(Arg::EmptyTuple(offset))
            }
            Some(Token::Ident(name)) if literal_context => {
                let value = match name.as_str() {
                    "True" | "true" => Value::Bool(true),
                    "False" | "false" => Value::Bool(false),
                    "None" | "null" => Value::Null,
                    _ => return Ok(Arg::Type(self.parse_union()?, offset)),
                };
                self.pos += 1;
                Ok(Arg::Literal(value, offset))
            }
            Some(_) => Ok(Arg::Type(self.parse_union()?, offset)),
            None => Err(err(offset, "expected a type argument")),
        }
    }
}

fn types_only(head: &str, args: Vec<Arg>) -> Result<Vec<TypeDescriptor>, TypeExprError> {
    args.into_iter()
        .map(|arg| match arg {
            Arg::Type(ty, _) => Ok(ty),
            Arg::Literal(_, offset) => Err(err(offset, format!("`{head}` does not take literal values"))),
            Arg::Ellipsis(offset) => Err(err(offset, format!("`...` is not allowed in `{head}`"))),
            Arg::EmptyTuple(offset) => Err(err(offset, format!("`()` is not allowed in `{head}`"))),
        })
        .collect()
}

fn arity(head: &str, offset: usize, args: &[TypeDescriptor], expected: usize) -> Result<(), TypeExprError> {
    if args.len() != expected {
        return Err(err(
            offset,
            format!("`{head}` takes {expected} type argument(s), got {}", args.len()),
        ));
    }
    Ok(())
}

fn build(head: &str, offset: usize, args: Option<Vec<Arg>>) -> Result<TypeDescriptor, TypeExprError> {
    match head {
        "Optional" => {
            let args = types_only(head, args.unwrap_or_default())?;
            arity(head, offset, &args, 1)?;
            Ok(union_of(vec![
                args.into_iter().next().unwrap_or_else(TypeDescriptor::any),
                TypeDescriptor::primitive(Primitive::Null),
            ]))
        }
        "Union" => {
            let args = types_only(head, args.unwrap_or_default())?;
            if args.is_empty() {
                return Err(err(offset, "`Union` needs at least one member"));
            }
            Ok(union_of(args))
        }
        "list" | "List" | "Sequence" | "MutableSequence" | "Iterable" | "Collection" | "deque" => {
            single_item(head, offset, args, Shape::Sequence)
        }
        "set" | "Set" | "frozenset" | "FrozenSet" | "AbstractSet" | "MutableSet" => {
            single_item(head, offset, args, Shape::Set)
        }
        "dict" | "Dict" | "Mapping" | "MutableMapping" | "OrderedDict" => {
            key_value(head, offset, args, Shape::Mapping)
        }
        "defaultdict" | "DefaultDict" => key_value(head, offset, args, Shape::DefaultMapping),
        "tuple" | "Tuple" => build_tuple(head, offset, args),
        "Literal" => {
            let args = args.unwrap_or_default();
            if args.is_empty() {
                return Err(err(offset, "`Literal` needs at least one value"));
            }
            let mut values = Vec::new();
            for arg in args {
                match arg {
                    Arg::Literal(value, _) => values.push(value),
                    Arg::Type(_, at) | Arg::Ellipsis(at) | Arg::EmptyTuple(at) => {
                        return Err(err(at, "`Literal` only accepts str, int, float, bool or None values"))
                    }
                }
            }
            Ok(TypeDescriptor::literal(values))
        }
        name => {
            if args.is_some() {
                return Err(err(offset, format!("`{name}` does not take type arguments")));
            }
            match Primitive::from_name(name) {
                Some(prim) => Ok(TypeDescriptor::primitive(prim)),
                None => Ok(TypeDescriptor::named(name)),
            }
        }
    }
}

fn single_item(
    head: &str,
    offset: usize,
    args: Option<Vec<Arg>>,
    shape: Shape,
) -> Result<TypeDescriptor, TypeExprError> {
    let args = match args {
        Some(args) => types_only(head, args)?,
        None => vec![TypeDescriptor::any()],
    };
    arity(head, offset, &args, 1)?;
    Ok(TypeDescriptor::new(shape, args))
}

fn key_value(
    head: &str,
    offset: usize,
    args: Option<Vec<Arg>>,
    shape: Shape,
) -> Result<TypeDescriptor, TypeExprError> {
    let args = match args {
        Some(args) => types_only(head, args)?,
        None => vec![TypeDescriptor::primitive(Primitive::Str), TypeDescriptor::any()],
    };
    arity(head, offset, &args, 2)?;
    Ok(TypeDescriptor::new(shape, args))
}

fn build_tuple(head: &str, offset: usize, args: Option<Vec<Arg>>) -> Result<TypeDescriptor, TypeExprError> {
    let Some(args) = args else {
        return Ok(TypeDescriptor::variadic(TypeDescriptor::any()));
    };
    if let [Arg::EmptyTuple(_)] = args.as_slice() {
        return Ok(TypeDescriptor::tuple(Vec::new()));
    }
    if let [Arg::Type(item, _), Arg::Ellipsis(_)] = args.as_slice() {
        return Ok(TypeDescriptor::variadic(item.clone()));
    }
    let items = types_only(head, args)?;
    if items.is_empty() {
        return Err(err(offset, "`tuple[]` is empty; write `tuple[()]`"));
    }
    Ok(TypeDescriptor::tuple(items))
}

/// Normalizes a list of union members: nested unions are flattened,
/// duplicates dropped, and a `None` member turns the result into an
/// `Optional`.
pub fn union_of(members: Vec<TypeDescriptor>) -> TypeDescriptor {
    let mut flat: Vec<TypeDescriptor> = Vec::new();
    let mut nullable = false;
    let push = |ty: TypeDescriptor, flat: &mut Vec<TypeDescriptor>, nullable: &mut bool| {
        if ty.is_null() {
            *nullable = true;
        } else if !flat.contains(&ty) {
            flat.push(ty);
        }
    };
    for member in members {
        match member.shape {
            Shape::Union => {
                for arm in member.args {
                    push(arm, &mut flat, &mut nullable);
                }
            }
            Shape::Optional => {
                nullable = true;
                for arm in member.args {
                    push(arm, &mut flat, &mut nullable);
                }
            }
            _ => push(member, &mut flat, &mut nullable),
        }
    }
    let inner = match flat.len() {
        0 => return TypeDescriptor::primitive(Primitive::Null),
        1 => flat.remove(0),
        _ => TypeDescriptor::union(flat),
    };
    if nullable {
        TypeDescriptor::optional(inner)
    } else {
        inner
    }
}
