//! Filter expressions over file entries.
//!
//! A filter argument is `[/]column op value`, or one of the combinator
//! markers `and` / `or`. A list of arguments is compiled into a single tree:
//! markers take the two items that follow them (forward Polish notation) and
//! whatever is left at the top level is ANDed together. The leading `/` marks
//! a leaf as a prune filter, which the directory walker checks before it
//! descends into a directory.

use std::fmt;

use regex::Regex;

use crate::column::Column;
use crate::entry::{parse_grouped_int, FileEntry};
use crate::error::{Result, SiftError};

/// Filter operators, longest spelling first so prefixes don't shadow
const OPERATORS: [&str; 12] = [
    "!~=", "~=", "!*=", "*=", ">=", "<=", ">", "<", "!=", "=", "!.isnull", ".isnull",
];

/// What a leaf checks
#[derive(Debug, Clone)]
pub enum Test {
    /// literal == value
    Eq,
    /// value <= literal
    LessEq,
    /// value < literal
    Less,
    /// Regular expression or translated glob, always anchored
    Pattern(Regex),
    /// The column has no value
    IsNull,
}

/// The literal a leaf compares against. Numeric columns get an integer
/// literal for the ordering operators; everything else keeps the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Int(i64),
    Text(String),
}

/// A single comparison against one column
#[derive(Debug, Clone)]
pub struct Predicate {
    pub column: Column,
    pub test: Test,
    pub literal: Literal,
    /// Invert the result (not the null taint)
    pub not: bool,
    /// Evaluated by the walker before descending into a directory
    pub prune: bool,
    /// Operator as written, for display
    op: &'static str,
}

/// One parsed filter argument, before compilation
#[derive(Debug, Clone)]
pub enum FilterArg {
    And,
    Or,
    Leaf(Predicate),
}

/// A compiled filter tree
#[derive(Debug, Clone)]
pub enum Filter {
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Leaf(Predicate),
}

impl FilterArg {
    /// Parse a single filter argument
    pub fn parse(arg: &str) -> Result<Self> {
        match arg {
            "and" => return Ok(Self::And),
            "or" => return Ok(Self::Or),
            _ => {}
        }
        let bad = || SiftError::FilterSyntax(arg.to_string());

        let rest = arg.trim_start();
        let (prune, rest) = match rest.strip_prefix('/') {
            Some(r) => (true, r.trim_start()),
            None => (false, rest),
        };
        let name_len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if name_len == 0 {
            return Err(bad());
        }
        let (name, rest) = rest.split_at(name_len);
        let rest = rest.trim_start();
        let op = OPERATORS
            .iter()
            .copied()
            .find(|op| rest.starts_with(op))
            .ok_or_else(bad)?;
        let data = &rest[op.len()..];

        let column = Column::lookup(name).ok_or_else(|| SiftError::FilterColumn(name.to_string()))?;
        let not = op.starts_with('!') || op.starts_with('>');
        let test = match op {
            "~=" | "!~=" => Test::Pattern(
                Regex::new(&format!("^(?:{})$", data)).map_err(|e| SiftError::pattern_error(data, e))?,
            ),
            "*=" | "!*=" => Test::Pattern(glob_to_regex(data)?),
            "=" | "!=" => Test::Eq,
            "<" | ">=" => Test::Less,
            "<=" | ">" => Test::LessEq,
            _ => Test::IsNull,
        };

        let literal = match test {
            Test::Eq | Test::Less | Test::LessEq if column.is_numeric() => {
                Literal::Int(parse_grouped_int(data).map_err(|source| SiftError::FilterNumber {
                    value: data.to_string(),
                    source,
                })?)
            }
            _ => Literal::Text(data.to_string()),
        };

        Ok(Self::Leaf(Predicate {
            column,
            test,
            literal,
            not,
            prune,
            op,
        }))
    }
}

/// Compile a list of parsed arguments into one filter tree.
///
/// Returns `None` for an empty list.
pub fn compile_many(args: Vec<FilterArg>) -> Result<Option<Filter>> {
    let mut stack: Vec<Filter> = Vec::new();
    for arg in args.into_iter().rev() {
        match arg {
            FilterArg::Leaf(p) => stack.push(Filter::Leaf(p)),
            marker => {
                let (left, right) = match (stack.pop(), stack.pop()) {
                    (Some(l), Some(r)) => (Box::new(l), Box::new(r)),
                    _ => return Err(SiftError::FilterArity),
                };
                stack.push(match marker {
                    FilterArg::And => Filter::And(left, right),
                    _ => Filter::Or(left, right),
                });
            }
        }
    }

    // the stack holds the top-level items last-first
    let mut items = stack.into_iter().rev();
    Ok(items
        .next()
        .map(|first| items.fold(first, |acc, f| Filter::And(Box::new(acc), Box::new(f)))))
}

/// Parse and compile a list of filter argument strings
pub fn compile_args<S: AsRef<str>>(args: &[S]) -> Result<Option<Filter>> {
    let parsed = args
        .iter()
        .map(|a| FilterArg::parse(a.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    compile_many(parsed)
}

/// Evaluate an optional filter; no filter passes everything
pub fn evaluate(filter: Option<&Filter>, entry: &FileEntry) -> (bool, bool) {
    filter.map_or((true, true), |f| f.evaluate(entry))
}

impl Filter {
    pub fn and(left: Filter, right: Filter) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Filter, right: Filter) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    /// Returns `(passed, not_null)`. When `not_null` is false a missing
    /// value decided the result and `passed` is false.
    pub fn evaluate(&self, entry: &FileEntry) -> (bool, bool) {
        self.eval(entry, false)
    }

    /// Evaluate only the prune leaves; other leaves pass
    pub fn evaluate_prune(&self, entry: &FileEntry) -> (bool, bool) {
        self.eval(entry, true)
    }

    /// True if any leaf carries the prune marker
    pub fn has_prune(&self) -> bool {
        match self {
            Self::And(l, r) | Self::Or(l, r) => l.has_prune() || r.has_prune(),
            Self::Leaf(p) => p.prune,
        }
    }

    /// Add every column this filter reads to `out`
    pub fn collect_columns(&self, out: &mut Vec<Column>) {
        match self {
            Self::And(l, r) | Self::Or(l, r) => {
                l.collect_columns(out);
                r.collect_columns(out);
            }
            Self::Leaf(p) => {
                if !out.contains(&p.column) {
                    out.push(p.column);
                }
            }
        }
    }

    fn eval(&self, entry: &FileEntry, prune_check: bool) -> (bool, bool) {
        match self {
            Self::And(left, right) => {
                let (passed, ok) = left.eval(entry, prune_check);
                if !passed || !ok {
                    return (passed && ok, ok);
                }
                right.eval(entry, prune_check)
            }
            Self::Or(left, right) => {
                let (passed, ok) = left.eval(entry, prune_check);
                if passed || !ok {
                    return (passed && ok, ok);
                }
                right.eval(entry, prune_check)
            }
            Self::Leaf(p) if prune_check && !p.prune => (true, true),
            Self::Leaf(p) => p.evaluate(entry),
        }
    }
}

impl Predicate {
    pub fn evaluate(&self, entry: &FileEntry) -> (bool, bool) {
        let text;
        let value: &str;
        let mut diff = std::cmp::Ordering::Equal;

        if self.column.is_numeric() {
            let present = entry.get_numeric(self.column);
            if let Test::IsNull = self.test {
                return (self.not == present.is_some(), true);
            }
            let Some(n) = present else {
                return (false, false);
            };
            match &self.literal {
                Literal::Int(lit) => {
                    diff = lit.cmp(&n);
                    value = "";
                }
                Literal::Text(_) => {
                    text = n.to_string();
                    value = &text;
                }
            }
        } else {
            let present = entry.get_string(self.column);
            if let Test::IsNull = self.test {
                return (self.not == present.is_some(), true);
            }
            let Some(s) = present else {
                return (false, false);
            };
            text = s.into_owned();
            value = &text;
            if let Literal::Text(lit) = &self.literal {
                diff = lit.as_str().cmp(value);
            }
        }

        let passed = match &self.test {
            Test::Eq => diff.is_eq(),
            Test::LessEq => diff.is_ge(),
            Test::Less => diff.is_gt(),
            Test::Pattern(re) => re.is_match(value),
            Test::IsNull => false,
        };
        (passed != self.not, true)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prune {
            write!(f, "/")?;
        }
        write!(f, "{}{}", self.column, self.op)?;
        match &self.literal {
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Text(s) => write!(f, "{}", s),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(l, r) => write!(f, "({} AND {})", l, r),
            Self::Or(l, r) => write!(f, "({} OR {})", l, r),
            Self::Leaf(p) => write!(f, "{}", p),
        }
    }
}

/// Translate a file glob into an anchored regular expression.
///
/// `**` matches across `/`, `*` and `?` don't. Bracketed classes (`[...]`,
/// `[^...]`, with a leading `]` taken literally) are copied verbatim, as are
/// the escapes `\*`, `\?` and `\[`. Everything else matches literally.
pub fn glob_to_regex(glob: &str) -> Result<Regex> {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::from("^");
    let mut literal = String::new();

    let flush = |out: &mut String, literal: &mut String| {
        out.push_str(&regex::escape(literal));
        literal.clear();
    };

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' if matches!(chars.get(i + 1), Some('*' | '?' | '[')) => {
                flush(&mut out, &mut literal);
                out.push('\\');
                out.push(chars[i + 1]);
                i += 2;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                flush(&mut out, &mut literal);
                out.push_str(".*");
                i += 2;
            }
            '*' => {
                flush(&mut out, &mut literal);
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                flush(&mut out, &mut literal);
                out.push_str("[^/]");
                i += 1;
            }
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    flush(&mut out, &mut literal);
                    out.extend(&chars[i..=end]);
                    i = end + 1;
                }
                None => {
                    literal.push(c);
                    i += 1;
                }
            },
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }
    flush(&mut out, &mut literal);
    out.push('$');

    Regex::new(&out).map_err(|e| SiftError::pattern_error(glob, e))
}

/// Index of the `]` closing a class opened at `start`, if the class is
/// well formed
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if chars.get(j) == Some(&'^') {
        j += 1;
    }
    let leading_bracket = chars.get(j) == Some(&']');
    if leading_bracket {
        j += 1;
    }
    let end = j + chars.get(j..)?.iter().position(|&c| c == ']')?;
    if end == j && !leading_bracket {
        return None;
    }
    Some(end)
}
