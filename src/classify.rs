use regex::Regex;
use sqlparser::ast::{
    ObjectName, ObjectNamePart, ShowCreateObject, ShowStatementFilter,
    ShowStatementFilterPosition, ShowStatementOptions, Statement,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Show,
    Set,
    Use,
    Ddl,
    Dml,
    Explain,
    Begin,
    Commit,
    Rollback,
    /// Replication control statements; always rejected.
    Replication,
    /// Parsed, but none of the above.
    Other,
    /// The MySQL parser rejected the text.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShowKind {
    Tables,
    Columns,
    Databases,
    Variables,
    Status,
    Indexes,
    CreateTable,
    CreateView,
    CreateDatabase,
    Engines,
    Collation,
    CharacterSet,
    Warnings,
    TableStatus,
    Other,
}

/// Normalized form of every `SHOW` variant, whichever recognizer produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowStatement {
    pub kind: ShowKind,
    pub full: bool,
    pub like: Option<String>,
    /// Raw `WHERE` expression text.
    pub filter: Option<String>,
    pub db: Option<String>,
    pub table: Option<String>,
}

impl ShowStatement {
    pub fn new(kind: ShowKind) -> Self {
        Self {
            kind,
            full: false,
            like: None,
            filter: None,
            db: None,
            table: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Statement(Box<Statement>),
    Show(ShowStatement),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub kind: StatementKind,
    pub ast: Option<Ast>,
}

impl Classified {
    fn bare(kind: StatementKind) -> Self {
        Self { kind, ast: None }
    }

    fn show(show: ShowStatement) -> Self {
        Self {
            kind: StatementKind::Show,
            ast: Some(Ast::Show(show)),
        }
    }

    pub fn statement(&self) -> Option<&Statement> {
        match &self.ast {
            Some(Ast::Statement(stmt)) => Some(stmt),
            _ => None,
        }
    }

    pub fn show_statement(&self) -> Option<&ShowStatement> {
        match &self.ast {
            Some(Ast::Show(show)) => Some(show),
            _ => None,
        }
    }
}

/// Classifies one statement. Never fails: text the MySQL parser cannot read
/// comes back as `Unknown` without an AST.
pub fn classify(text: &str) -> Classified {
    let q = strip_trailing_semicolon(strip_leading_comments(text));
    if q.is_empty() {
        return Classified::bare(StatementKind::Unknown);
    }
    if is_replication_statement(q) {
        return Classified::bare(StatementKind::Replication);
    }
    if let Some(show) = try_recognize_show(q) {
        return Classified::show(show);
    }

    let dialect = MySqlDialect {};
    let mut statements = match Parser::parse_sql(&dialect, q) {
        Ok(statements) if statements.len() == 1 => statements,
        _ => return unparsed(q),
    };
    let stmt = statements.remove(0);

    let kind = match &stmt {
        Statement::Query(_) => StatementKind::Select,
        Statement::Insert(_) | Statement::Update(_) | Statement::Delete(_) => StatementKind::Dml,
        Statement::CreateTable(_)
        | Statement::AlterTable(_)
        | Statement::CreateIndex(_)
        | Statement::Drop { .. }
        | Statement::CreateDatabase { .. } => StatementKind::Ddl,
        Statement::Set(_) => StatementKind::Set,
        Statement::Use(_) => StatementKind::Use,
        Statement::StartTransaction { .. } => StatementKind::Begin,
        Statement::Commit { .. } => StatementKind::Commit,
        Statement::Rollback { .. } => StatementKind::Rollback,
        Statement::ExplainTable { .. } | Statement::Explain { .. } => StatementKind::Explain,
        Statement::ShowTables {
            full, show_options, ..
        } => {
            let mut show = show_from_options(ShowKind::Tables, show_options);
            show.full = *full;
            show.db = show.table.take();
            return Classified::show(show);
        }
        Statement::ShowColumns {
            full, show_options, ..
        } => {
            let mut show = show_from_options(ShowKind::Columns, show_options);
            show.full = *full;
            return Classified::show(show);
        }
        Statement::ShowDatabases { show_options, .. } => {
            let mut show = show_from_options(ShowKind::Databases, show_options);
            show.table = None;
            return Classified::show(show);
        }
        Statement::ShowVariables { filter, .. } => {
            let mut show = ShowStatement::new(ShowKind::Variables);
            apply_filter(&mut show, filter.as_ref());
            return Classified::show(show);
        }
        Statement::ShowCreate { obj_type, obj_name } => {
            let kind = match obj_type {
                ShowCreateObject::Table => ShowKind::CreateTable,
                ShowCreateObject::View => ShowKind::CreateView,
                _ => ShowKind::Other,
            };
            let mut show = ShowStatement::new(kind);
            let (db, table) = object_name_parts(obj_name);
            show.db = db;
            show.table = Some(table);
            return Classified::show(show);
        }
        _ => match leading_keyword(q).as_str() {
            "show" => return Classified::show(ShowStatement::new(ShowKind::Other)),
            "create" | "alter" | "drop" | "truncate" | "rename" => StatementKind::Ddl,
            _ => StatementKind::Other,
        },
    };

    Classified {
        kind,
        ast: Some(Ast::Statement(Box::new(stmt))),
    }
}

fn unparsed(q: &str) -> Classified {
    if leading_keyword(q) == "show" {
        // Introspection we cannot read still answers, with an empty result.
        return Classified::show(ShowStatement::new(ShowKind::Other));
    }
    Classified::bare(StatementKind::Unknown)
}

fn is_replication_statement(q: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"(?is)^(?:(?:start|stop|reset)\s+(?:slave|replica)\b|change\s+(?:master|replication\s+source)\b)",
        )
        .expect("valid replication regex")
    });
    re.is_match(q)
}

const IDENT: &str = r#"(?:`(?:[^`]|``)+`|"(?:[^"]|"")+"|[^\s`"';.]+)"#;
const QUALIFIED: &str = r#"(?:(?:`(?:[^`]|``)+`|[^\s`"';.]+)\.)?(?:`(?:[^`]|``)+`|"(?:[^"]|"")+"|[^\s`"';.]+)"#;
const LITERAL: &str = r#"(?:'(?:[^']|'')*'|"(?:[^"]|"")*")"#;
const LIKE_WHERE: &str = r"(?:\s+like\s+(?P<like>LITERAL))?(?:\s+where\s+(?P<filter>.+))?";

/// Regex recognizers for the `SHOW` forms the SQL parser does not model.
/// They run before the parser.
fn show_recognizers() -> &'static [(ShowKind, Regex)] {
    static RECOGNIZERS: OnceLock<Vec<(ShowKind, Regex)>> = OnceLock::new();
    RECOGNIZERS.get_or_init(|| {
        let patterns = [
            (ShowKind::Databases, r"^show\s+schemas LIKE_WHERE$"),
            (
                ShowKind::Status,
                r"^show\s+(?:(?:global|session|local)\s+)?status LIKE_WHERE$",
            ),
            (ShowKind::Collation, r"^show\s+collation LIKE_WHERE$"),
            (
                ShowKind::CharacterSet,
                r"^show\s+(?:character\s+set|charset) LIKE_WHERE$",
            ),
            (ShowKind::Engines, r"^show\s+(?:storage\s+)?engines$"),
            (
                ShowKind::Warnings,
                r"^show\s+(?:warnings|errors)(?:\s+limit\s+.+)?$",
            ),
            (
                ShowKind::TableStatus,
                r"^show\s+table\s+status(?:\s+(?:from|in)\s+(?P<db>IDENT))? LIKE_WHERE$",
            ),
            (
                ShowKind::Indexes,
                r"^show\s+(?:extended\s+)?(?:index|indexes|keys)\s+(?:from|in)\s+(?P<table>QUALIFIED)(?:\s+(?:from|in)\s+(?P<db>IDENT))?(?:\s+where\s+(?P<filter>.+))?$",
            ),
            (
                ShowKind::CreateDatabase,
                r"^show\s+create\s+(?:database|schema)\s+(?:if\s+not\s+exists\s+)?(?P<db>IDENT)$",
            ),
        ];
        patterns
            .into_iter()
            .map(|(kind, pattern)| {
                let pattern = pattern
                    .replace(" LIKE_WHERE", LIKE_WHERE)
                    .replace("LITERAL", LITERAL)
                    .replace("QUALIFIED", QUALIFIED)
                    .replace("IDENT", IDENT);
                let re = Regex::new(&format!("(?is){pattern}")).expect("valid SHOW regex");
                (kind, re)
            })
            .collect()
    })
}

fn try_recognize_show(q: &str) -> Option<ShowStatement> {
    if leading_keyword(q) != "show" {
        return None;
    }
    show_recognizers().iter().find_map(|(kind, re)| {
        let caps = re.captures(q)?;
        let mut show = ShowStatement::new(*kind);
        show.like = caps
            .name("like")
            .map(|m| unquote_string_literal(m.as_str()));
        show.filter = caps.name("filter").map(|m| m.as_str().trim().to_string());
        show.db = caps.name("db").map(|m| unquote_identifier(m.as_str()));
        if let Some(m) = caps.name("table") {
            let (db, table) = split_qualified(m.as_str());
            show.db = show.db.take().or(db);
            show.table = Some(table);
        }
        Some(show)
    })
}

/// Reads the `FROM`/`IN` target and `LIKE`/`WHERE` filter of a parsed SHOW.
/// The target lands in `table`; callers move it where it belongs.
fn show_from_options(kind: ShowKind, options: &ShowStatementOptions) -> ShowStatement {
    let mut show = ShowStatement::new(kind);
    if let Some(name) = options
        .show_in
        .as_ref()
        .and_then(|show_in| show_in.parent_name.as_ref())
    {
        let (db, table) = object_name_parts(name);
        show.db = db;
        show.table = Some(table);
    }
    let filter = options.filter_position.as_ref().map(|pos| match pos {
        ShowStatementFilterPosition::Infix(f) | ShowStatementFilterPosition::Suffix(f) => f,
    });
    apply_filter(&mut show, filter);
    show
}

fn apply_filter(show: &mut ShowStatement, filter: Option<&ShowStatementFilter>) {
    match filter {
        Some(ShowStatementFilter::Like(p))
        | Some(ShowStatementFilter::ILike(p))
        | Some(ShowStatementFilter::NoKeyword(p)) => show.like = Some(p.clone()),
        Some(ShowStatementFilter::Where(expr)) => show.filter = Some(expr.to_string()),
        None => {}
    }
}

fn object_name_parts(name: &ObjectName) -> (Option<String>, String) {
    let parts: Vec<String> = name
        .0
        .iter()
        .map(|part| match part {
            ObjectNamePart::Identifier(ident) => ident.value.clone(),
            _ => String::new(),
        })
        .collect();
    match parts.as_slice() {
        [.., db, table] => (Some(db.clone()), table.clone()),
        [table] => (None, table.clone()),
        [] => (None, String::new()),
    }
}

/// First word of the statement, lowercased.
pub fn leading_keyword(q: &str) -> String {
    q.trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic() || *c == '_')
        .collect::<String>()
        .to_ascii_lowercase()
}

pub fn strip_trailing_semicolon(s: &str) -> &str {
    let mut s = s.trim();
    while let Some(stripped) = s.strip_suffix(';') {
        s = stripped.trim_end();
    }
    s
}

pub fn strip_leading_comments(mut s: &str) -> &str {
    loop {
        let t = s.trim_start();
        if let Some(rest) = t.strip_prefix("/*") {
            if let Some(end) = rest.find("*/") {
                s = &rest[end + 2..];
                continue;
            }
        }
        if let Some(rest) = t.strip_prefix("--").or_else(|| t.strip_prefix('#')) {
            match rest.find('\n') {
                Some(end) => {
                    s = &rest[end + 1..];
                    continue;
                }
                None => return "",
            }
        }
        return t;
    }
}

/// Splits a statement at its `?` placeholders, skipping quoted text.
pub fn split_placeholders(query: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut last = 0;
    let mut in_sq = false;
    let mut in_dq = false;
    let mut in_bq = false;
    let mut chars = query.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        match ch {
            '\'' if !in_bq && !in_dq => {
                if in_sq {
                    if let Some((_, '\'')) = chars.peek() {
                        chars.next();
                    } else {
                        in_sq = false;
                    }
                } else {
                    in_sq = true;
                }
            }
            '"' if !in_sq && !in_bq => {
                in_dq = !in_dq;
            }
            '`' if !in_sq && !in_dq => {
                in_bq = !in_bq;
            }
            '?' if !in_sq && !in_dq && !in_bq => {
                out.push(&query[last..i]);
                last = i + ch.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&query[last..]);
    out
}

fn unquote_identifier(token: &str) -> String {
    let t = token.trim();
    if let Some(stripped) = t.strip_prefix('`').and_then(|s| s.strip_suffix('`')) {
        stripped.replace("``", "`")
    } else if let Some(stripped) = t.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        stripped.replace("\"\"", "\"")
    } else {
        t.to_string()
    }
}

fn unquote_string_literal(token: &str) -> String {
    let t = token.trim();
    if let Some(stripped) = t.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        stripped.replace("''", "'")
    } else if let Some(stripped) = t.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        stripped.replace("\"\"", "\"")
    } else {
        t.to_string()
    }
}

fn split_qualified(token: &str) -> (Option<String>, String) {
    match token.split_once("`.`").map(|(db, t)| (format!("{db}`"), format!("`{t}"))) {
        Some((db, table)) => (Some(unquote_identifier(&db)), unquote_identifier(&table)),
        None => match token.split_once('.') {
            Some((db, table)) => (Some(unquote_identifier(db)), unquote_identifier(table)),
            None => (None, unquote_identifier(token)),
        },
    }
}
