use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::cpu::spec::Opcode;
use crate::error::AsmErrorKind;

lazy_static! {
    static ref LABEL_RE: Regex = Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*):").unwrap();
    static ref IDENT_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*").unwrap();
    static ref ASSIGN_RE: Regex = Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+)$").unwrap();
    static ref DEFINE_RE: Regex =
        Regex::new(r"(?i)^\.?define\s+([A-Za-z_][A-Za-z0-9_]*)\s+(.+)$").unwrap();
    static ref DIRECTIVE_RE: Regex = Regex::new(r"^\.([A-Za-z]+)(?:\s+(.*))?$").unwrap();
    static ref INSTRUCTION_RE: Regex = Regex::new(r"^([A-Za-z]+)(?:\s+(.*))?$").unwrap();
    static ref STRING_RE: Regex = Regex::new(r#"^"((?:[^"\\]|\\.)*)"$"#).unwrap();
    static ref INDIRECT_X_RE: Regex = Regex::new(r"(?i)^\((.+),\s*x\s*\)$").unwrap();
    static ref INDIRECT_Y_RE: Regex = Regex::new(r"(?i)^\((.+)\)\s*,\s*y$").unwrap();
    static ref INDIRECT_RE: Regex = Regex::new(r"^\((.+)\)$").unwrap();
    static ref INDEXED_RE: Regex = Regex::new(r"(?i)^(.+?)\s*,\s*([xy])$").unwrap();
    static ref TERM_RE: Regex = Regex::new(
        r"^(?:\$([0-9A-Fa-f]+)|0[xX]([0-9A-Fa-f]+)|%([01]+)|([0-9]+)|'(\\.|[^'\\])'|(\*)|([A-Za-z_][A-Za-z0-9_]*))"
    )
    .unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteSelect {
    Whole,
    // <expr
    Low,
    // >expr
    High,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Number(i32),
    Symbol(String),
    // `*`, the address of the current statement
    Here,
}

/// A `+`/`-` chain of terms, optionally narrowed to its low or high byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub select: ByteSelect,
    pub terms: Vec<(i32, Term)>,
}

impl Expr {
    pub fn number(n: i32) -> Expr {
        Expr {
            select: ByteSelect::Whole,
            terms: vec![(1, Term::Number(n))],
        }
    }

    pub fn symbol(name: &str) -> Expr {
        Expr {
            select: ByteSelect::Whole,
            terms: vec![(1, Term::Symbol(name.to_string()))],
        }
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().filter_map(|(_, term)| match term {
            Term::Symbol(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn uses_here(&self) -> bool {
        self.terms.iter().any(|(_, term)| *term == Term::Here)
    }

    pub fn eval<F>(&self, here: u16, lookup: F) -> Result<i32, AsmErrorKind>
    where
        F: Fn(&str) -> Option<i32>,
    {
        let mut value = 0i32;
        for (sign, term) in &self.terms {
            let v = match term {
                Term::Number(n) => *n,
                Term::Here => here as i32,
                Term::Symbol(name) => {
                    lookup(name).ok_or_else(|| AsmErrorKind::UnknownLabel(name.clone()))?
                }
            };
            value = value.wrapping_add(sign.wrapping_mul(v));
        }
        Ok(match self.select {
            ByteSelect::Whole => value,
            ByteSelect::Low => value & 0xFF,
            ByteSelect::High => (value >> 8) & 0xFF,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    X,
    Y,
}

/// Operand syntax as written. The addressing mode is only chosen later, once
/// the assembler knows which symbols are already defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    Accumulator,
    Immediate(Expr),
    Direct(Expr, Option<Index>),
    Indirect(Expr),
    IndirectX(Expr),
    IndirectY(Expr),
}

impl Operand {
    pub fn expr(&self) -> Option<&Expr> {
        match self {
            Operand::None | Operand::Accumulator => None,
            Operand::Immediate(e)
            | Operand::Direct(e, _)
            | Operand::Indirect(e)
            | Operand::IndirectX(e)
            | Operand::IndirectY(e) => Some(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Instruction { opcode: Opcode, operand: Operand },
    Org(Expr),
    Byte(Vec<Expr>),
    Word(Vec<Expr>),
    Res(Expr),
    Data(Vec<u8>),
    Define { name: String, expr: Expr },
    ZeroPage(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Line {
    pub label: Option<String>,
    pub statement: Option<Statement>,
}

pub fn parse_line(raw: &str) -> Result<Line, AsmErrorKind> {
    let code = strip_comment(raw).trim_end();
    if code.trim().is_empty() {
        return Ok(Line::default());
    }

    if let Some(cap) = ASSIGN_RE.captures(code.trim()) {
        return Ok(Line {
            label: None,
            statement: Some(Statement::Define {
                name: cap[1].to_string(),
                expr: parse_expr(&cap[2])?,
            }),
        });
    }

    let (label, rest) = split_label(code);
    Ok(Line {
        label,
        statement: parse_statement(rest.trim())?,
    })
}

/// Drops a `;` comment, leaving semicolons inside quotes alone.
pub fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == ';' => return &line[..i],
            None => {}
        }
    }
    line
}

// `name:` anywhere at the start of the line, or a bare name in column 0
fn split_label(code: &str) -> (Option<String>, &str) {
    let trimmed = code.trim_start();
    if let Some(cap) = LABEL_RE.captures(trimmed) {
        return (Some(cap[1].to_string()), &trimmed[cap[0].len()..]);
    }

    if !code.starts_with(char::is_whitespace) {
        if let Some(m) = IDENT_RE.find(code) {
            let word = m.as_str();
            let rest = &code[m.end()..];
            let is_keyword =
                Opcode::from_mnemonic(word).is_some() || word.eq_ignore_ascii_case("define");
            if !is_keyword && (rest.is_empty() || rest.starts_with(char::is_whitespace)) {
                return (Some(word.to_string()), rest);
            }
        }
    }
    (None, code)
}

fn parse_statement(s: &str) -> Result<Option<Statement>, AsmErrorKind> {
    if s.is_empty() {
        return Ok(None);
    }

    let statement = if let Some(cap) = DEFINE_RE.captures(s) {
        Statement::Define {
            name: cap[1].to_string(),
            expr: parse_expr(&cap[2])?,
        }
    } else if let Some(cap) = DIRECTIVE_RE.captures(s) {
        parse_directive(&cap[1], arg(&cap, 2))?
    } else if let Some(cap) = INSTRUCTION_RE.captures(s) {
        let opcode = Opcode::from_mnemonic(&cap[1])
            .ok_or_else(|| AsmErrorKind::UnknownMnemonic(cap[1].to_string()))?;
        Statement::Instruction {
            opcode,
            operand: parse_operand(arg(&cap, 2))?,
        }
    } else {
        return Err(AsmErrorKind::UnknownMnemonic(s.to_string()));
    };
    Ok(Some(statement))
}

fn arg<'t>(cap: &Captures<'t>, i: usize) -> &'t str {
    cap.get(i).map_or("", |m| m.as_str().trim())
}

fn parse_directive(name: &str, args: &str) -> Result<Statement, AsmErrorKind> {
    let invalid = || AsmErrorKind::InvalidDirective(format!(".{} {}", name, args).trim().to_string());

    let statement = match name.to_lowercase().as_str() {
        "org" => Statement::Org(parse_expr(args)?),
        "res" => Statement::Res(parse_expr(args)?),
        "byte" | "word" => {
            if args.is_empty() {
                return Err(invalid());
            }
            let items = split_args(args)
                .into_iter()
                .map(parse_expr)
                .collect::<Result<Vec<Expr>, AsmErrorKind>>()?;
            if name.eq_ignore_ascii_case("byte") {
                Statement::Byte(items)
            } else {
                Statement::Word(items)
            }
        }
        "string" | "stringz" => {
            let cap = STRING_RE.captures(args).ok_or_else(invalid)?;
            let mut bytes = unescape(&cap[1]).ok_or_else(invalid)?;
            if name.eq_ignore_ascii_case("stringz") {
                bytes.push(0);
            }
            Statement::Data(bytes)
        }
        "zp" => {
            let names: Vec<String> = split_args(args)
                .into_iter()
                .map(|n| n.to_string())
                .collect();
            if names.is_empty() || names.iter().any(|n| !is_ident(n)) {
                return Err(invalid());
            }
            Statement::ZeroPage(names)
        }
        _ => return Err(invalid()),
    };
    Ok(statement)
}

fn is_ident(s: &str) -> bool {
    IDENT_RE.find(s).map_or(false, |m| m.end() == s.len())
}

// comma split that leaves quoted commas alone
fn split_args(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in args.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == ',' => {
                parts.push(args[start..i].trim());
                start = i + 1;
            }
            None => {}
        }
    }
    let last = args[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

fn unescape(s: &str) -> Option<Vec<u8>> {
    let mut bytes = Vec::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        let b = if c == '\\' {
            match chars.next()? {
                'n' => b'\n',
                'r' => b'\r',
                't' => b'\t',
                '0' => 0,
                '\\' => b'\\',
                '"' => b'"',
                '\'' => b'\'',
                _ => return None,
            }
        } else if c.is_ascii() {
            c as u8
        } else {
            return None;
        };
        bytes.push(b);
    }
    Some(bytes)
}

pub fn parse_operand(s: &str) -> Result<Operand, AsmErrorKind> {
    let s = s.trim();
    let operand = if s.is_empty() {
        Operand::None
    } else if s.eq_ignore_ascii_case("a") {
        Operand::Accumulator
    } else if let Some(value) = s.strip_prefix('#') {
        Operand::Immediate(parse_expr(value)?)
    } else if let Some(cap) = INDIRECT_X_RE.captures(s) {
        Operand::IndirectX(parse_expr(&cap[1])?)
    } else if let Some(cap) = INDIRECT_Y_RE.captures(s) {
        Operand::IndirectY(parse_expr(&cap[1])?)
    } else if let Some(cap) = INDIRECT_RE.captures(s) {
        Operand::Indirect(parse_expr(&cap[1])?)
    } else if let Some(cap) = INDEXED_RE.captures(s) {
        let index = if cap[2].eq_ignore_ascii_case("x") {
            Index::X
        } else {
            Index::Y
        };
        Operand::Direct(parse_expr(&cap[1])?, Some(index))
    } else {
        Operand::Direct(parse_expr(s)?, None)
    };
    Ok(operand)
}

pub fn parse_expr(s: &str) -> Result<Expr, AsmErrorKind> {
    let text = s.trim();
    let invalid = || AsmErrorKind::InvalidOperandSyntax(text.to_string());

    let (select, mut rest) = if let Some(r) = text.strip_prefix('<') {
        (ByteSelect::Low, r)
    } else if let Some(r) = text.strip_prefix('>') {
        (ByteSelect::High, r)
    } else {
        (ByteSelect::Whole, text)
    };

    rest = rest.trim_start();
    let mut sign = 1;
    if let Some(r) = rest.strip_prefix('-') {
        sign = -1;
        rest = r.trim_start();
    }

    let mut terms = Vec::new();
    loop {
        let cap = TERM_RE.captures(rest).ok_or_else(invalid)?;
        terms.push((sign, parse_term(&cap).ok_or_else(invalid)?));
        rest = rest[cap[0].len()..].trim_start();

        let mut chars = rest.chars();
        sign = match chars.next() {
            None => break,
            Some('+') => 1,
            Some('-') => -1,
            Some(_) => return Err(invalid()),
        };
        rest = chars.as_str().trim_start();
    }
    Ok(Expr { select, terms })
}

fn parse_term(cap: &Captures) -> Option<Term> {
    let number = |i: usize, radix: u32| {
        cap.get(i)
            .map(|m| i32::from_str_radix(m.as_str(), radix).ok().map(Term::Number))
    };
    if let Some(term) = number(1, 16) {
        term
    } else if let Some(term) = number(2, 16) {
        term
    } else if let Some(term) = number(3, 2) {
        term
    } else if let Some(term) = number(4, 10) {
        term
    } else if let Some(m) = cap.get(5) {
        match unescape(m.as_str())?.as_slice() {
            [b] => Some(Term::Number(*b as i32)),
            _ => None,
        }
    } else if cap.get(6).is_some() {
        Some(Term::Here)
    } else {
        cap.get(7).map(|m| Term::Symbol(m.as_str().to_string()))
    }
}
