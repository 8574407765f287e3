//! Named-placeholder rewriting.
//!
//! PostgreSQL only understands positional placeholders (`$1`, `$2`, ...).
//! [`rewrite`] turns `:name` / `@name` placeholders into those, leaving text
//! inside single-quoted literals alone.
//!
//! Parameters are applied one at a time, in the order given, each over the
//! whole command as rewritten so far. When two parameters share a name the
//! first one claims every occurrence.

use crate::parameter::{Parameter, SIGILS};

/// Rewrite `command` so that every placeholder of `params[k]` becomes `$k+1`
/// (plus `::type` when the parameter has a custom type).
///
/// A placeholder only matches as a whole word: `:id` is left alone inside
/// `:identifier`, and a sigil that is itself preceded by a sigil (the `::`
/// cast operator) never starts a placeholder. An unterminated quote does not
/// protect the rest of the command.
///
/// ```
/// use zero_pgstmt::{rewrite, Parameter};
///
/// let params = [Parameter::new(":id", 1), Parameter::with_type(":name", "text", "x")];
/// let sql = rewrite("select * from t where id = :id and name <> ':id' or alias = @name", &params);
/// assert_eq!(sql, "select * from t where id = $1 and name <> ':id' or alias = $2::text");
/// ```
pub fn rewrite(command: &str, params: &[Parameter]) -> String {
    let mut text = command.to_owned();
    for (idx, param) in params.iter().enumerate() {
        let name = param.bare_name();
        if name.is_empty() {
            continue;
        }
        text = replace_placeholder(&text, name, &param.positional_token(idx + 1));
    }
    text
}

/// Replace every unquoted, word-bounded `:name` / `@name` in `text` by `token`.
pub fn replace_placeholder(text: &str, name: &str, token: &str) -> String {
    let mut out = String::with_capacity(text.len() + token.len());
    for segment in Segments::new(text) {
        match segment {
            Segment::Quoted(literal) => out.push_str(literal),
            Segment::Unquoted(part) => replace_in_unquoted(part, name, token, &mut out),
        }
    }
    out
}

fn replace_in_unquoted(part: &str, name: &str, token: &str, out: &mut String) {
    let bytes = part.as_bytes();
    let mut copied = 0;
    let mut search = 0;

    while let Some(offset) = memchr::memchr2(b':', b'@', &bytes[search..]) {
        let sigil = search + offset;
        let start = sigil + 1;
        let end = start + name.len();
        search = start;

        if !part[start..].starts_with(name)
            || !starts_word(&part[..sigil])
            || !ends_word(&part[end..])
        {
            continue;
        }

        out.push_str(&part[copied..sigil]);
        out.push_str(token);
        copied = end;
        search = end;
    }

    out.push_str(&part[copied..]);
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// The character before a sigil must not glue it to a word or another sigil.
fn starts_word(before: &str) -> bool {
    match before.chars().next_back() {
        None => true,
        Some(c) => !is_identifier_char(c) && !SIGILS.contains(&c),
    }
}

fn ends_word(after: &str) -> bool {
    after.chars().next().is_none_or(|c| !is_identifier_char(c))
}

/// A piece of command text, split on single-quoted literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    /// Text scanned for placeholders.
    Unquoted(&'a str),
    /// A `'...'` literal including both quotes, copied verbatim.
    Quoted(&'a str),
}

struct Segments<'a> {
    rest: &'a str,
}

impl<'a> Segments<'a> {
    fn new(text: &'a str) -> Self {
        Self { rest: text }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let bytes = self.rest.as_bytes();

        let split = if bytes[0] == b'\'' {
            match memchr::memchr(b'\'', &bytes[1..]) {
                Some(close) => {
                    let (literal, rest) = self.rest.split_at(close + 2);
                    self.rest = rest;
                    return Some(Segment::Quoted(literal));
                }
                // Unterminated: the remainder is scanned like ordinary text.
                None => self.rest.len(),
            }
        } else {
            memchr::memchr(b'\'', bytes).unwrap_or(self.rest.len())
        };

        let (part, rest) = self.rest.split_at(split);
        self.rest = rest;
        Some(Segment::Unquoted(part))
    }
}
