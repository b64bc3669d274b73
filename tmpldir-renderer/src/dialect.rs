//! The template language of bodies and file names.
//!
//! Templates use Go `text/template` actions. `{{ ... }}` is the only
//! delimiter: everything outside an action, `{%` and `{#` included, is
//! literal text. [`translate`] compiles a template into equivalent Tera
//! source, which the engine parses and renders.
//!
//! | Action | Meaning |
//! |---|---|
//! | `{{.Name}}`, `{{.User.login}}`, `{{.}}` | field of the current value, or the value itself |
//! | `{{$x := .A}}`, `{{$x = .B}}`, `{{$x}}`, `{{$.A}}` | variables; `$` is the root context |
//! | `{{if P}}` `{{else if P}}` `{{else}}` `{{end}}` | conditionals |
//! | `{{range P}}`, `{{range $i, $e := P}}`, `{{break}}`, `{{continue}}` | iterate a list; `.` is the element |
//! | `{{with P}}`, `{{else with P}}` | set `.` to `P` when it is non-empty |
//! | `{{/* ... */}}` | comment |
//! | `{{- ` / ` -}}` | trim whitespace before / after the action |
//!
//! Functions: `eq`, `ne`, `lt`, `le`, `gt`, `ge`, `and`, `or`, `not`, `len`,
//! `index`, `printf` (verbs `%s`, `%v`, `%d`), `html` and `urlquery`. In a
//! pipeline `P | f a` the value of `P` becomes the last argument of `f`.
//!
//! `range` iterates lists only. Constructs without a Tera equivalent are
//! rejected with the line they start on.

use std::borrow::Cow;

/// Tera's name for the whole render context.
const ROOT: &str = "__tera_context";

/// Compile `source` to Tera source.
pub fn translate(source: &str) -> Result<Cow<'_, str>, tera::Error> {
    if !source.contains('{') {
        return Ok(Cow::Borrowed(source));
    }

    let mut pieces = split(source)?;
    apply_trim_markers(&mut pieces);

    let mut translator = Translator::default();
    for piece in &pieces {
        match piece {
            Piece::Text(text) => translator.text(text),
            Piece::Action(action) => translator
                .action(action.body, action.line)
                .map_err(|message| syntax_error(action.line, message))?,
        }
    }
    translator.finish().map(Cow::Owned)
}

fn syntax_error(line: usize, message: impl std::fmt::Display) -> tera::Error {
    tera::Error::msg(format!("line {line}: {message}"))
}

// ---------------------------------------------------------------------------
// Text and actions
// ---------------------------------------------------------------------------

enum Piece<'a> {
    Text(&'a str),
    Action(Action<'a>),
}

struct Action<'a> {
    body: &'a str,
    line: usize,
    trim_before: bool,
    trim_after: bool,
}

fn split(source: &str) -> Result<Vec<Piece<'_>>, tera::Error> {
    let mut pieces = Vec::new();
    let mut pos = 0;

    while let Some(found) = source[pos..].find("{{") {
        let open = pos + found;
        if open > pos {
            pieces.push(Piece::Text(&source[pos..open]));
        }
        let line = line_of(source, open);

        let mut start = open + 2;
        let trim_before = is_trim_marker(&source[start..]);
        if trim_before {
            start += 1;
        }
        let len = action_len(&source[start..]).ok_or_else(|| syntax_error(line, "unclosed action"))?;

        let mut body = &source[start..start + len];
        let trim_after = body
            .strip_suffix('-')
            .is_some_and(|rest| rest.ends_with(is_space));
        if trim_after {
            body = &body[..body.len() - 1];
        }
        pieces.push(Piece::Action(Action {
            body: body.trim(),
            line,
            trim_before,
            trim_after,
        }));
        pos = start + len + 2;
    }

    if pos < source.len() {
        pieces.push(Piece::Text(&source[pos..]));
    }
    Ok(pieces)
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// `-` followed by a space, right after `{{`.
fn is_trim_marker(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next() == Some('-') && chars.next().is_some_and(is_space)
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}

/// Length of an action body up to its closing `}}`, skipping over quoted
/// text and comments.
fn action_len(s: &str) -> Option<usize> {
    let trimmed = s.trim_start();
    if trimmed.starts_with("/*") {
        let skipped = s.len() - trimmed.len();
        let end = skipped + trimmed.find("*/")? + 2;
        return s[end..].find("}}").map(|i| end + i);
    }

    let bytes = s.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(b'`') if b == b'`' => quote = None,
            Some(q) if q != b'`' && b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if matches!(b, b'"' | b'\'' | b'`') => quote = Some(b),
            None if bytes[i..].starts_with(b"}}") => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

fn apply_trim_markers(pieces: &mut [Piece<'_>]) {
    for i in 0..pieces.len() {
        let (before, after) = match &pieces[i] {
            Piece::Action(action) => (action.trim_before, action.trim_after),
            Piece::Text(_) => continue,
        };
        if before && i > 0 {
            if let Piece::Text(text) = &mut pieces[i - 1] {
                let t = *text;
                *text = t.trim_end_matches(is_space);
            }
        }
        if after {
            if let Some(Piece::Text(text)) = pieces.get_mut(i + 1) {
                let t = *text;
                *text = t.trim_start_matches(is_space);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Translator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    If,
    Range,
    With,
}

impl Block {
    fn keyword(self) -> &'static str {
        match self {
            Block::If => "if",
            Block::Range => "range",
            Block::With => "with",
        }
    }

    fn end_tag(self) -> &'static str {
        match self {
            Block::If | Block::With => "{% endif %}",
            Block::Range => "{% endfor %}",
        }
    }
}

struct Frame {
    block: Block,
    /// Tera name bound to `.` inside this block.
    dot: Option<String>,
    in_else: bool,
    vars: Vec<String>,
    line: usize,
}

#[derive(Default)]
struct Translator {
    out: String,
    frames: Vec<Frame>,
    root_vars: Vec<String>,
    bindings: usize,
}

/// `$x :=`, `$x =` or `$i, $e :=` at the head of a pipeline.
struct Decl {
    names: Vec<String>,
    assign: bool,
}

fn split_decl(tokens: &[Token]) -> (Option<Decl>, &[Token]) {
    let decl = |names: Vec<&String>, assign| Decl {
        names: names.into_iter().cloned().collect(),
        assign,
    };
    match tokens {
        [Token::Var(a, fa), Token::Declare, rest @ ..] if fa.is_empty() && !a.is_empty() => {
            (Some(decl(vec![a], false)), rest)
        }
        [Token::Var(a, fa), Token::Assign, rest @ ..] if fa.is_empty() && !a.is_empty() => {
            (Some(decl(vec![a], true)), rest)
        }
        [Token::Var(a, fa), Token::Comma, Token::Var(b, fb), Token::Declare, rest @ ..]
            if fa.is_empty() && fb.is_empty() && !a.is_empty() && !b.is_empty() =>
        {
            (Some(decl(vec![a, b], false)), rest)
        }
        _ => (None, tokens),
    }
}

fn var_name(name: &str) -> String {
    format!("__v_{name}")
}

fn join(base: Option<&str>, fields: &[String]) -> String {
    match (base, fields.is_empty()) {
        (None, true) => ROOT.to_string(),
        (None, false) => fields.join("."),
        (Some(base), true) => base.to_string(),
        (Some(base), false) => format!("{base}.{}", fields.join(".")),
    }
}

impl Translator {
    /// Literal text. A `{` that would start a Tera tag is emitted as an
    /// expression instead.
    fn text(&mut self, text: &str) {
        for (i, c) in text.char_indices() {
            let tag_start = c == '{' && matches!(text[i + 1..].chars().next(), None | Some('{' | '%' | '#'));
            if tag_start {
                self.out.push_str(r#"{{ "{" }}"#);
            } else {
                self.out.push(c);
            }
        }
    }

    fn action(&mut self, body: &str, line: usize) -> Result<(), String> {
        if body.starts_with("/*") {
            return if body.ends_with("*/") {
                Ok(())
            } else {
                Err("comment ends before the closing delimiter".into())
            };
        }

        let tokens = lex(body)?;
        let (keyword, rest) = match tokens.split_first() {
            Some((Token::Ident(word), rest)) => (word.as_str(), rest),
            Some(_) => return self.output(&tokens),
            None => return Err("missing value for command".into()),
        };
        match keyword {
            "if" => self.open(Block::If, rest, line),
            "range" => self.open(Block::Range, rest, line),
            "with" => self.open(Block::With, rest, line),
            "else" => self.branch(rest),
            "end" => self.end(rest),
            "break" | "continue" => self.loop_control(keyword, rest),
            "define" | "template" | "block" => Err(format!("{{{{{keyword}}}}} is not supported")),
            _ => self.output(&tokens),
        }
    }

    fn finish(self) -> Result<String, tera::Error> {
        match self.frames.last() {
            Some(frame) => Err(syntax_error(
                frame.line,
                format!("{{{{{}}}}} is never closed by {{{{end}}}}", frame.block.keyword()),
            )),
            None => Ok(self.out),
        }
    }

    fn output(&mut self, tokens: &[Token]) -> Result<(), String> {
        let (decl, rest) = split_decl(tokens);
        let expr = self.pipeline(rest)?;
        let Some(decl) = decl else {
            self.out.push_str(&format!("{{{{ {} }}}}", expr.render()));
            return Ok(());
        };

        let [name] = decl.names.as_slice() else {
            return Err("too many declarations in command".into());
        };
        let tag = if decl.assign {
            if self.assigns_root(name)? {
                "set_global"
            } else {
                "set"
            }
        } else {
            self.declare(name);
            "set"
        };
        self.out
            .push_str(&format!("{{% {tag} {} = {} %}}", var_name(name), expr.render()));
        Ok(())
    }

    fn open(&mut self, block: Block, tokens: &[Token], line: usize) -> Result<(), String> {
        let keyword = block.keyword();
        let (decl, rest) = split_decl(tokens);
        let names = match decl {
            Some(Decl { assign: true, .. }) => {
                return Err(format!("cannot assign a variable in {{{{{keyword}}}}}"))
            }
            Some(decl) => decl.names,
            None => Vec::new(),
        };
        let expr = self.pipeline(rest)?;

        let mut frame = Frame {
            block,
            dot: None,
            in_else: false,
            vars: Vec::new(),
            line,
        };

        if block == Block::Range {
            let container = match &expr {
                Expr::Path(_) | Expr::Filtered(_) => expr.render(),
                other => return Err(format!("range can't iterate over {}", other.render())),
            };
            let dot = self.fresh_binding();
            self.out.push_str(&format!("{{% for {dot} in {container} %}}"));
            match names.as_slice() {
                [] => {}
                [elem] => self.set(&var_name(elem), &dot),
                [index, elem] => {
                    self.set(&var_name(index), "loop.index0");
                    self.set(&var_name(elem), &dot);
                }
                _ => return Err("too many declarations in {{range}}".into()),
            }
            frame.vars = names;
            frame.dot = Some(dot);
        } else {
            let condition = match names.as_slice() {
                [] => expr.render(),
                [name] => {
                    let var = var_name(name);
                    self.set(&var, &expr.render());
                    frame.vars.push(name.clone());
                    var
                }
                _ => return Err(format!("too many declarations in {{{{{keyword}}}}}")),
            };
            self.out.push_str(&format!("{{% if {condition} %}}"));
            if block == Block::With {
                let dot = self.fresh_binding();
                self.set(&dot, &condition);
                frame.dot = Some(dot);
            }
        }

        self.frames.push(frame);
        Ok(())
    }

    fn branch(&mut self, tokens: &[Token]) -> Result<(), String> {
        let Some(frame) = self.frames.last_mut() else {
            return Err("unexpected {{else}}".into());
        };
        if frame.in_else {
            return Err(format!(
                "{{{{else}}}} after {{{{else}}}} in {{{{{}}}}}",
                frame.block.keyword()
            ));
        }
        // The branch condition sees the enclosing `.`.
        frame.in_else = true;
        let block = frame.block;

        match tokens.split_first() {
            None => {
                self.out.push_str("{% else %}");
                Ok(())
            }
            Some((Token::Ident(word), rest))
                if (word == "if" && block == Block::If) || (word == "with" && block == Block::With) =>
            {
                let condition = self.pipeline(rest)?.render();
                self.out.push_str(&format!("{{% elif {condition} %}}"));
                let dot = if block == Block::With {
                    let dot = self.fresh_binding();
                    self.set(&dot, &condition);
                    Some(dot)
                } else {
                    None
                };
                if let Some(frame) = self.frames.last_mut() {
                    frame.in_else = false;
                    frame.dot = dot;
                }
                Ok(())
            }
            Some(_) => Err(format!("unexpected tokens after {{{{else}}}} in {{{{{}}}}}", block.keyword())),
        }
    }

    fn end(&mut self, tokens: &[Token]) -> Result<(), String> {
        if !tokens.is_empty() {
            return Err("unexpected tokens after {{end}}".into());
        }
        let frame = self.frames.pop().ok_or("unexpected {{end}}")?;
        self.out.push_str(frame.block.end_tag());
        Ok(())
    }

    fn loop_control(&mut self, keyword: &str, tokens: &[Token]) -> Result<(), String> {
        if !tokens.is_empty() {
            return Err(format!("unexpected tokens after {{{{{keyword}}}}}"));
        }
        let in_range = self
            .frames
            .iter()
            .any(|f| f.block == Block::Range && !f.in_else);
        if !in_range {
            return Err(format!("{{{{{keyword}}}}} outside {{{{range}}}}"));
        }
        self.out.push_str(&format!("{{% {keyword} %}}"));
        Ok(())
    }

    fn set(&mut self, name: &str, value: &str) {
        self.out.push_str(&format!("{{% set {name} = {value} %}}"));
    }

    fn fresh_binding(&mut self) -> String {
        self.bindings += 1;
        format!("__dot{}", self.bindings)
    }

    fn declare(&mut self, name: &str) {
        match self.frames.last_mut() {
            Some(frame) => frame.vars.push(name.to_string()),
            None => self.root_vars.push(name.to_string()),
        }
    }

    fn is_declared(&self, name: &str) -> bool {
        self.frames.iter().any(|f| f.vars.iter().any(|v| v == name))
            || self.root_vars.iter().any(|v| v == name)
    }

    /// Whether assigning `name` has to reach the root scope from inside a loop.
    fn assigns_root(&self, name: &str) -> Result<bool, String> {
        if self.frames.iter().any(|f| f.vars.iter().any(|v| v == name)) {
            return Ok(false);
        }
        if self.root_vars.iter().any(|v| v == name) {
            return Ok(self.frames.iter().any(|f| f.block == Block::Range));
        }
        Err(format!("undefined variable \"${name}\""))
    }

    /// Tera name currently bound to `.`; `None` at the root.
    fn dot(&self) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .filter(|f| !f.in_else)
            .find_map(|f| f.dot.as_deref())
    }

    // -- pipelines ----------------------------------------------------------

    fn pipeline(&self, tokens: &[Token]) -> Result<Expr, String> {
        let mut cursor = Cursor { tokens, pos: 0 };
        let expr = self.parse_pipeline(&mut cursor)?;
        match cursor.peek() {
            None => Ok(expr),
            Some(token) => Err(format!("unexpected {} in command", describe(token))),
        }
    }

    fn parse_pipeline(&self, cursor: &mut Cursor<'_>) -> Result<Expr, String> {
        let mut value = self.parse_command(cursor, None)?;
        while cursor.peek() == Some(&Token::Pipe) {
            cursor.bump();
            value = self.parse_command(cursor, Some(value))?;
        }
        Ok(value)
    }

    fn parse_command(&self, cursor: &mut Cursor<'_>, piped: Option<Expr>) -> Result<Expr, String> {
        match cursor.peek() {
            Some(Token::Ident(name)) => {
                cursor.bump();
                let mut args = Vec::new();
                while !matches!(cursor.peek(), None | Some(Token::Pipe | Token::RParen)) {
                    args.push(self.parse_operand(cursor)?);
                }
                args.extend(piped);
                call(name, args)
            }
            Some(_) => {
                let value = self.parse_operand(cursor)?;
                if piped.is_some() {
                    return Err(format!("cannot pipe into {}: not a function", value.render()));
                }
                match cursor.peek() {
                    None | Some(Token::Pipe | Token::RParen) => Ok(value),
                    Some(token) => Err(format!(
                        "unexpected {} after {}: only functions take arguments",
                        describe(token),
                        value.render()
                    )),
                }
            }
            None => Err("missing value for command".into()),
        }
    }

    fn parse_operand(&self, cursor: &mut Cursor<'_>) -> Result<Expr, String> {
        match cursor.bump() {
            Some(Token::Field(fields)) => Ok(Expr::Path(join(self.dot(), fields))),
            Some(Token::Var(name, fields)) if name.is_empty() => Ok(Expr::Path(join(None, fields))),
            Some(Token::Var(name, fields)) => {
                if !self.is_declared(name) {
                    return Err(format!("undefined variable \"${name}\""));
                }
                Ok(Expr::Path(join(Some(var_name(name).as_str()), fields)))
            }
            Some(Token::Str(s)) => Ok(Expr::Str(s.clone())),
            Some(Token::Const(c)) => Ok(Expr::Const(c.clone())),
            Some(Token::Ident(name)) => call(name, Vec::new()),
            Some(Token::LParen) => {
                let inner = self.parse_pipeline(cursor)?;
                match cursor.bump() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("unclosed left paren".into()),
                }
            }
            Some(token) => Err(format!("unexpected {} in operand", describe(token))),
            None => Err("missing operand".into()),
        }
    }
}

struct Cursor<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Cursor<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// A translated operand, classified by where Tera's grammar accepts it.
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    /// Context lookup: `User.login`, `Items[0]`, `__dot1`.
    Path(String),
    /// String literal, unquoted.
    Str(String),
    /// Number or boolean literal.
    Const(String),
    /// Value with filters applied: `Items | length`.
    Filtered(String),
    /// `"v" ~ Version`.
    Concat(String),
    /// `Count > 10`.
    Compare(String),
    Not(Box<Expr>),
    /// `and` / `or` chain.
    Logic(String),
}

impl Expr {
    fn render(&self) -> String {
        match self {
            Expr::Path(s)
            | Expr::Const(s)
            | Expr::Filtered(s)
            | Expr::Concat(s)
            | Expr::Compare(s)
            | Expr::Logic(s) => s.clone(),
            Expr::Str(s) => quote(s),
            Expr::Not(inner) => format!("not {}", inner.render()),
        }
    }

    /// Operand of a comparison or a filter.
    fn value(&self, func: &str) -> Result<String, String> {
        match self {
            Expr::Compare(_) | Expr::Not(_) | Expr::Logic(_) => Err(format!(
                "{func}: {} cannot be used as an operand",
                self.render()
            )),
            _ => Ok(self.render()),
        }
    }

    /// Operand of `and` / `or`.
    fn condition(&self) -> String {
        match self {
            Expr::Logic(s) => format!("({s})"),
            _ => self.render(),
        }
    }
}

/// Quote with the first delimiter Tera accepts that `s` does not contain.
fn quote(s: &str) -> String {
    let delim = ['"', '\'', '`']
        .into_iter()
        .find(|d| !s.contains(*d))
        .unwrap_or('"');
    format!("{delim}{s}{delim}")
}

fn wrong_args(name: &str, got: usize) -> String {
    format!("wrong number of args for {name}: got {got}")
}

fn call(name: &str, mut args: Vec<Expr>) -> Result<Expr, String> {
    match name {
        "eq" => {
            if args.len() < 2 {
                return Err(wrong_args(name, args.len()));
            }
            let lhs = args[0].value(name)?;
            let mut parts = args[1..]
                .iter()
                .map(|rhs| Ok(format!("{lhs} == {}", rhs.value(name)?)))
                .collect::<Result<Vec<_>, String>>()?;
            Ok(if parts.len() == 1 {
                Expr::Compare(parts.remove(0))
            } else {
                Expr::Logic(parts.join(" or "))
            })
        }
        "ne" | "lt" | "le" | "gt" | "ge" => {
            let [lhs, rhs] = args.as_slice() else {
                return Err(wrong_args(name, args.len()));
            };
            let op = match name {
                "ne" => "!=",
                "lt" => "<",
                "le" => "<=",
                "gt" => ">",
                _ => ">=",
            };
            Ok(Expr::Compare(format!("{} {op} {}", lhs.value(name)?, rhs.value(name)?)))
        }
        "not" => {
            if args.len() != 1 {
                return Err(wrong_args(name, args.len()));
            }
            match args.remove(0) {
                Expr::Not(inner) => Ok(*inner),
                Expr::Logic(s) => Err(format!("not: cannot negate the and/or expression {s}")),
                other => Ok(Expr::Not(Box::new(other))),
            }
        }
        "and" | "or" => match args.len() {
            0 => Err(wrong_args(name, 0)),
            1 => Ok(args.remove(0)),
            _ => Ok(Expr::Logic(
                args.iter()
                    .map(Expr::condition)
                    .collect::<Vec<_>>()
                    .join(if name == "and" { " and " } else { " or " }),
            )),
        },
        "len" | "html" | "urlquery" => {
            let [arg] = args.as_slice() else {
                return Err(wrong_args(name, args.len()));
            };
            let filter = match name {
                "len" => "length",
                "html" => "escape",
                _ => "urlencode_strict",
            };
            Ok(Expr::Filtered(format!("{} | {filter}", arg.value(name)?)))
        }
        "index" => {
            let mut args = args.into_iter();
            let mut path = match args.next() {
                Some(Expr::Path(path)) => path,
                Some(other) => return Err(format!("index: cannot index {}", other.render())),
                None => return Err(wrong_args(name, 0)),
            };
            for key in args {
                match key {
                    Expr::Path(key) => path.push_str(&format!("[{key}]")),
                    Expr::Str(key) => path.push_str(&format!("[{}]", quote(&key))),
                    Expr::Const(key) if key.parse::<i64>().is_ok() => path.push_str(&format!("[{key}]")),
                    other => return Err(format!("index: unsupported key {}", other.render())),
                }
            }
            Ok(Expr::Path(path))
        }
        "printf" => printf(args),
        other => Err(format!("function \"{other}\" not defined")),
    }
}

fn printf(args: Vec<Expr>) -> Result<Expr, String> {
    let mut args = args.into_iter();
    let Some(Expr::Str(format)) = args.next() else {
        return Err("printf: the format must be a string literal".into());
    };

    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => literal.push('%'),
            Some('s' | 'v' | 'd') => {
                if !literal.is_empty() {
                    parts.push(Expr::Str(std::mem::take(&mut literal)));
                }
                match args.next() {
                    Some(arg @ (Expr::Path(_) | Expr::Str(_) | Expr::Const(_))) => parts.push(arg),
                    Some(other) => return Err(format!("printf: unsupported argument {}", other.render())),
                    None => return Err("printf: missing argument for verb".into()),
                }
            }
            Some(verb) => return Err(format!("printf: unsupported verb %{verb}")),
            None => return Err("printf: format ends with %".into()),
        }
    }
    if !literal.is_empty() {
        parts.push(Expr::Str(literal));
    }
    if args.next().is_some() {
        return Err("printf: too many arguments".into());
    }

    Ok(match parts.len() {
        0 => Expr::Str(String::new()),
        1 => parts.remove(0),
        _ => Expr::Concat(parts.iter().map(Expr::render).collect::<Vec<_>>().join(" ~ ")),
    })
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// `.A.B`; empty for a lone `.`.
    Field(Vec<String>),
    /// `$name.A.B`; empty name for `$`.
    Var(String, Vec<String>),
    Ident(String),
    /// Decoded string literal.
    Str(String),
    /// Number or boolean, already in Tera syntax.
    Const(String),
    Pipe,
    LParen,
    RParen,
    Comma,
    Declare,
    Assign,
}

fn describe(token: &Token) -> String {
    match token {
        Token::Field(fields) => format!(".{}", fields.join(".")),
        Token::Var(name, fields) if fields.is_empty() => format!("${name}"),
        Token::Var(name, fields) => format!("${name}.{}", fields.join(".")),
        Token::Ident(s) | Token::Const(s) => s.clone(),
        Token::Str(s) => quote(s),
        Token::Pipe => "|".into(),
        Token::LParen => "(".into(),
        Token::RParen => ")".into(),
        Token::Comma => ",".into(),
        Token::Declare => ":=".into(),
        Token::Assign => "=".into(),
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn lex(body: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = body.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '|' | '(' | ')' | ',' | '=' => {
                tokens.push(match c {
                    '|' => Token::Pipe,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    _ => Token::Assign,
                });
                i += 1;
            }
            ':' if next == Some('=') => {
                tokens.push(Token::Declare);
                i += 2;
            }
            '.' if next.is_some_and(|n| n.is_ascii_digit()) => tokens.push(Token::Const(number(&chars, &mut i)?)),
            '.' => {
                let fields = fields(&chars, &mut i);
                if fields.is_empty() {
                    i += 1;
                }
                tokens.push(Token::Field(fields));
            }
            '$' => {
                i += 1;
                let name = ident(&chars, &mut i);
                tokens.push(Token::Var(name, fields(&chars, &mut i)));
            }
            '"' => {
                i += 1;
                tokens.push(Token::Str(quotable(interpreted(&chars, &mut i)?)?));
            }
            '`' => {
                let start = i + 1;
                let len = chars[start..]
                    .iter()
                    .position(|&c| c == '`')
                    .ok_or("unterminated raw quoted string")?;
                let raw: String = chars[start..start + len].iter().collect();
                tokens.push(Token::Str(quotable(raw)?));
                i = start + len + 1;
            }
            '\'' => {
                i += 1;
                let value = match chars.get(i) {
                    Some('\\') => {
                        i += 1;
                        escape(&chars, &mut i, '\'')?
                    }
                    Some('\'') | None => return Err("empty character constant".into()),
                    Some(&c) => {
                        i += 1;
                        c
                    }
                };
                if chars.get(i) != Some(&'\'') {
                    return Err("unterminated character constant".into());
                }
                i += 1;
                tokens.push(Token::Const(u32::from(value).to_string()));
            }
            c if c.is_ascii_digit()
                || (matches!(c, '+' | '-') && next.is_some_and(|n| n.is_ascii_digit() || n == '.')) =>
            {
                tokens.push(Token::Const(number(&chars, &mut i)?));
            }
            c if is_ident_start(c) => {
                let word = ident(&chars, &mut i);
                tokens.push(match word.as_str() {
                    "true" | "false" => Token::Const(word),
                    "nil" => return Err("nil is not a command".into()),
                    _ => Token::Ident(word),
                });
            }
            other => return Err(format!("unexpected {other:?} in action")),
        }
    }
    Ok(tokens)
}

fn ident(chars: &[char], i: &mut usize) -> String {
    let start = *i;
    while chars.get(*i).is_some_and(|c| c.is_alphanumeric() || *c == '_') {
        *i += 1;
    }
    chars[start..*i].iter().collect()
}

fn fields(chars: &[char], i: &mut usize) -> Vec<String> {
    let mut out = Vec::new();
    while chars.get(*i) == Some(&'.') && chars.get(*i + 1).is_some_and(|c| is_ident_start(*c)) {
        *i += 1;
        out.push(ident(chars, i));
    }
    out
}

fn quotable(s: String) -> Result<String, String> {
    if s.contains('"') && s.contains('\'') && s.contains('`') {
        return Err("string literal contains all three quote characters".into());
    }
    Ok(s)
}

/// Body of a `"..."` literal; `i` is just past the opening quote.
fn interpreted(chars: &[char], i: &mut usize) -> Result<String, String> {
    let mut out = String::new();
    loop {
        let c = *chars.get(*i).ok_or("unterminated quoted string")?;
        *i += 1;
        match c {
            '"' => return Ok(out),
            '\\' => out.push(escape(chars, i, '"')?),
            '\n' => return Err("unterminated quoted string".into()),
            c => out.push(c),
        }
    }
}

/// Escape sequence after a backslash.
fn escape(chars: &[char], i: &mut usize, quote: char) -> Result<char, String> {
    let c = *chars.get(*i).ok_or("unterminated escape sequence")?;
    *i += 1;
    let code = |len: usize, radix: u32, i: &mut usize, lead: Option<char>| -> Result<char, String> {
        let digits: String = lead
            .into_iter()
            .chain(chars.get(*i..*i + len).ok_or("short escape sequence")?.iter().copied())
            .collect();
        *i += len;
        u32::from_str_radix(&digits, radix)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| format!("invalid escape sequence {digits:?}"))
    };
    match c {
        'a' => Ok('\x07'),
        'b' => Ok('\x08'),
        'f' => Ok('\x0c'),
        'n' => Ok('\n'),
        'r' => Ok('\r'),
        't' => Ok('\t'),
        'v' => Ok('\x0b'),
        '\\' => Ok('\\'),
        c if c == quote => Ok(c),
        'x' => code(2, 16, i, None),
        'u' => code(4, 16, i, None),
        'U' => code(8, 16, i, None),
        '0'..='7' => code(2, 8, i, Some(c)),
        other => Err(format!("unknown escape sequence \\{other}")),
    }
}

fn number(chars: &[char], i: &mut usize) -> Result<String, String> {
    let start = *i;
    if matches!(chars[*i], '+' | '-') {
        *i += 1;
    }
    while let Some(&c) = chars.get(*i) {
        let exponent_sign = matches!(c, '+' | '-') && matches!(chars[*i - 1], 'e' | 'E');
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' || exponent_sign {
            *i += 1;
        } else {
            break;
        }
    }
    let text: String = chars[start..*i].iter().collect();
    parse_number(&text).ok_or_else(|| format!("bad number syntax: {text:?}"))
}

/// Go number literal to Tera syntax: integers in decimal, floats with a dot.
fn parse_number(text: &str) -> Option<String> {
    let clean: String = text.chars().filter(|c| *c != '_').collect();
    let (negative, digits) = match clean.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, clean.strip_prefix('+').unwrap_or(&clean)),
    };

    let radix = |prefixes: [&str; 2]| prefixes.into_iter().find_map(|p| digits.strip_prefix(p));
    let int = if let Some(hex) = radix(["0x", "0X"]) {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = radix(["0o", "0O"]) {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = radix(["0b", "0B"]) {
        i64::from_str_radix(bin, 2).ok()
    } else if digits.len() > 1 && digits.starts_with('0') && digits.bytes().all(|b| b.is_ascii_digit()) {
        i64::from_str_radix(&digits[1..], 8).ok()
    } else {
        digits.parse::<i64>().ok()
    };
    if let Some(n) = int {
        return Some(if negative { -n } else { n }.to_string());
    }

    let f: f64 = digits.parse().ok()?;
    if !f.is_finite() {
        return None;
    }
    let mut s = if negative { -f } else { f }.to_string();
    if !s.contains('.') {
        s.push_str(".0");
    }
    Some(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tr(source: &str) -> String {
        translate(source).expect("translate").into_owned()
    }

    fn err(source: &str) -> String {
        translate(source).expect_err("should not translate").to_string()
    }

    #[rstest]
    #[case("you pass {{.Count}}.", "you pass {{ Count }}.")]
    #[case("{{ .User.login }}", "{{ User.login }}")]
    #[case("{{.}}", "{{ __tera_context }}")]
    #[case("{{$.Name}}", "{{ Name }}")]
    #[case("{{if .Ok}}y{{else}}n{{end}}", "{% if Ok %}y{% else %}n{% endif %}")]
    #[case(
        r#"{{if eq .A "x"}}1{{else if gt .N 2}}2{{end}}"#,
        r#"{% if A == "x" %}1{% elif N > 2 %}2{% endif %}"#
    )]
    #[case(
        "{{range .Items}}{{.}},{{end}}",
        "{% for __dot1 in Items %}{{ __dot1 }},{% endfor %}"
    )]
    #[case(
        "{{with .Repo}}{{.name}}{{else}}{{.Author}}{{end}}",
        "{% if Repo %}{% set __dot1 = Repo %}{{ __dot1.name }}{% else %}{{ Author }}{% endif %}"
    )]
    #[case("{{len .Items}}", "{{ Items | length }}")]
    #[case("{{.Items | len}}", "{{ Items | length }}")]
    #[case(r#"{{index .M "k" 0}}"#, r#"{{ M["k"][0] }}"#)]
    #[case(r#"{{printf "%s-%d" .A .N}}"#, r#"{{ A ~ "-" ~ N }}"#)]
    #[case("{{and .A (not .B)}}", "{{ A and not B }}")]
    #[case("{{or (eq .A 1) .B}}", "{{ A == 1 or B }}")]
    #[case("{{and .A (or .B .C)}}", "{{ A and (B or C) }}")]
    #[case("{{ 0x10 }} {{ 1.5 }} {{ 'a' }} {{ -2 }}", "{{ 16 }} {{ 1.5 }} {{ 97 }} {{ -2 }}")]
    fn translates_actions(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(tr(input), expected);
    }

    #[rstest]
    #[case("n=${#ARGS[@]}", r#"n=${{ "{" }}#ARGS[@]}"#)]
    #[case("100{% done", r#"100{{ "{" }}% done"#)]
    #[case("a {# b #}", r#"a {{ "{" }}# b #}"#)]
    #[case("a {b} {", r#"a {b} {{ "{" }}"#)]
    #[case("{ {{.A}}", r#"{ {{ A }}"#)]
    fn literal_tera_delimiters_are_escaped(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(tr(input), expected);
    }

    #[test]
    fn string_literals_pick_a_free_quote() {
        assert_eq!(tr(r#"{{"{{"}}"#), r#"{{ "{{" }}"#);
        assert_eq!(tr(r#"{{ "a\"b" }}"#), r#"{{ 'a"b' }}"#);
        assert_eq!(tr(r#"{{ "tab\there" }}"#), "{{ \"tab\there\" }}");
        assert_eq!(tr("{{ `raw \\n` }}"), r#"{{ "raw \n" }}"#);
    }

    #[test]
    fn range_declarations_bind_index_and_element() {
        assert_eq!(
            tr("{{range $i, $e := .Items}}{{$i}}={{$e.name}}{{end}}"),
            "{% for __dot1 in Items %}{% set __v_i = loop.index0 %}{% set __v_e = __dot1 %}\
             {{ __v_i }}={{ __v_e.name }}{% endfor %}"
        );
    }

    #[test]
    fn variables_and_assignment() {
        assert_eq!(
            tr("{{$n := .Count}}{{range .Items}}{{$n = .}}{{end}}{{$n}}"),
            "{% set __v_n = Count %}{% for __dot1 in Items %}{% set_global __v_n = __dot1 %}{% endfor %}{{ __v_n }}"
        );
    }

    #[test]
    fn root_variable_reaches_past_range_dot() {
        assert_eq!(
            tr("{{range .Items}}{{$.Author}}/{{.}}{{end}}"),
            "{% for __dot1 in Items %}{{ Author }}/{{ __dot1 }}{% endfor %}"
        );
    }

    #[test]
    fn else_branch_restores_enclosing_dot() {
        assert_eq!(
            tr("{{range .Items}}{{.}}{{else}}{{.Empty}}{{end}}"),
            "{% for __dot1 in Items %}{{ __dot1 }}{% else %}{{ Empty }}{% endfor %}"
        );
    }

    #[test]
    fn trim_markers_and_comments() {
        assert_eq!(tr("a \n{{- /* note */ -}}\n b"), "ab");
        assert_eq!(tr("x  {{- .A }}  y"), "x{{ A }}  y");
        assert_eq!(tr("{{.A -}}\n\ny"), "{{ A }}y");
        assert_eq!(tr("{{-3}}"), "{{ -3 }}");
    }

    #[test]
    fn break_and_continue_inside_range() {
        assert_eq!(
            tr("{{range .I}}{{if .}}{{break}}{{end}}{{continue}}{{end}}"),
            "{% for __dot1 in I %}{% if __dot1 %}{% break %}{% endif %}{% continue %}{% endfor %}"
        );
    }

    #[rstest]
    #[case("{{ .Count", "line 1: unclosed action")]
    #[case("ok\n{{if .A}}x", "line 2: {{if}} is never closed by {{end}}")]
    #[case("{{end}}", "unexpected {{end}}")]
    #[case("{{ Count }}", r#"function "Count" not defined"#)]
    #[case("{{$x}}", r#"undefined variable "$x""#)]
    #[case(r#"{{define "x"}}{{end}}"#, "{{define}} is not supported")]
    #[case("{{break}}", "{{break}} outside {{range}}")]
    #[case("a\n\n{{ .A .B }}", "line 3: unexpected .B after A")]
    #[case("{{not (and .A .B)}}", "cannot negate")]
    #[case("{{range 3}}{{end}}", "range can't iterate over 3")]
    #[case("{{if .A}}{{else}}{{else}}{{end}}", "{{else}} after {{else}}")]
    #[case("{{/* open }}", "unclosed action")]
    fn rejects_untranslatable_templates(#[case] input: &str, #[case] message: &str) {
        let got = err(input);
        assert!(got.contains(message), "got: {got}");
    }

    #[test]
    fn plain_text_is_borrowed() {
        assert!(matches!(translate("no tags here").unwrap(), Cow::Borrowed(_)));
    }
}
