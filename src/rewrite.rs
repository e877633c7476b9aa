use crate::classify::{
    leading_keyword, split_placeholders, Ast, Classified, ShowKind, ShowStatement, StatementKind,
};
use crate::error::{MysqliteError, Result};
use crate::model::Cell;
use crate::show;
use crate::tables::{self, Literal};
use sqlparser::ast::{
    Expr, Function, FunctionArguments, Ident, ObjectName, ObjectNamePart, Query, SelectItem,
    SetExpr, Statement, Value, VisitMut, VisitorMut,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use std::ops::ControlFlow;

/// How the engine runs a rewritten statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Rows come back.
    Query,
    /// Only rows-affected comes back.
    Exec,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rewrite {
    /// Answer with an empty OK; nothing reaches the engine.
    Noop,
    Run {
        sql: String,
        args: Vec<Cell>,
        mode: Mode,
    },
}

impl Rewrite {
    fn run(sql: impl Into<String>, args: Vec<Cell>, mode: Mode) -> Self {
        Rewrite::Run {
            sql: sql.into(),
            args,
            mode,
        }
    }

    fn show(show: &ShowStatement) -> Self {
        let (sql, args) = show::template(show);
        Rewrite::run(sql, args, Mode::Query)
    }
}

/// Statement prefixes SQLite runs for their side effects.
const EXEC_PREFIXES: &[&str] = &[
    "insert", "update", "delete", "replace", "create", "drop", "alter", "attach", "detach",
    "vacuum", "reindex", "analyze", "begin", "commit", "end", "rollback", "savepoint",
    "release",
];

/// Decides query vs exec for text the rewriter passes through.
pub fn mode_for(kind: StatementKind, text: &str) -> Mode {
    match kind {
        StatementKind::Select | StatementKind::Show | StatementKind::Explain => Mode::Query,
        StatementKind::Ddl
        | StatementKind::Dml
        | StatementKind::Begin
        | StatementKind::Commit
        | StatementKind::Rollback
        | StatementKind::Set
        | StatementKind::Use
        | StatementKind::Replication => Mode::Exec,
        StatementKind::Other | StatementKind::Unknown => {
            let keyword = leading_keyword(crate::classify::strip_leading_comments(text));
            let pragma_assignment = keyword == "pragma" && text.contains('=');
            if pragma_assignment || EXEC_PREFIXES.contains(&keyword.as_str()) {
                Mode::Exec
            } else {
                Mode::Query
            }
        }
    }
}

/// Turns a classified MySQL statement into something SQLite can run.
pub fn rewrite(classified: Classified, text: &str, args: Vec<Cell>) -> Result<Rewrite> {
    let Classified { kind, ast } = classified;
    match kind {
        StatementKind::Replication => Err(MysqliteError::ReplicationNotSupported),
        StatementKind::Set | StatementKind::Use => Ok(Rewrite::Noop),
        StatementKind::Show => {
            let show = match ast {
                Some(Ast::Show(show)) => show,
                _ => ShowStatement::new(ShowKind::Other),
            };
            Ok(Rewrite::show(&show))
        }
        StatementKind::Explain => {
            let table = match &ast {
                Some(Ast::Statement(stmt)) => explained_table(stmt),
                _ => None,
            };
            let show = match table {
                Some(table) => {
                    let mut show = ShowStatement::new(ShowKind::Columns);
                    show.table = Some(table);
                    show
                }
                None => ShowStatement::new(ShowKind::Other),
            };
            Ok(Rewrite::show(&show))
        }
        StatementKind::Select => match ast {
            Some(Ast::Statement(stmt)) => {
                // Numbered placeholders keep their bind slot when the rewrite
                // reorders or drops arguments.
                let mut stmt = if args.is_empty() {
                    *stmt
                } else {
                    numbered_statement(text).unwrap_or(*stmt)
                };
                rewrite_select_statement(&mut stmt);
                let sql = stmt.to_string();
                let args = bound_args(&sql, args);
                Ok(Rewrite::run(sql, args, Mode::Query))
            }
            _ => Ok(Rewrite::run(text, args, Mode::Query)),
        },
        StatementKind::Begin => Ok(Rewrite::run("BEGIN", args, Mode::Exec)),
        StatementKind::Unknown if text.trim().is_empty() => Ok(Rewrite::Noop),
        StatementKind::Commit
        | StatementKind::Rollback
        | StatementKind::Ddl
        | StatementKind::Dml
        | StatementKind::Other
        | StatementKind::Unknown => Ok(Rewrite::run(text, args, mode_for(kind, text))),
    }
}

/// Replaces each `?` outside quotes with `?1`, `?2`, ... in text order.
fn number_placeholders(text: &str) -> String {
    let parts = split_placeholders(text);
    let mut out = String::with_capacity(text.len() + 2 * parts.len());
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push('?');
            out.push_str(&i.to_string());
        }
        out.push_str(part);
    }
    out
}

fn numbered_statement(text: &str) -> Option<Statement> {
    let dialect = MySqlDialect {};
    let mut statements = Parser::parse_sql(&dialect, &number_placeholders(text)).ok()?;
    (statements.len() == 1).then(|| statements.remove(0))
}

/// Keeps the arguments the rewritten statement still refers to. A numbered
/// placeholder binds its own slot; bare ones bind in order.
fn bound_args(sql: &str, mut args: Vec<Cell>) -> Vec<Cell> {
    let mut bare = 0;
    let mut highest = 0;
    for part in split_placeholders(sql).iter().skip(1) {
        let digits = part.len() - part.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        match part[..digits].parse::<usize>() {
            Ok(n) => highest = highest.max(n),
            Err(_) => bare += 1,
        }
    }
    args.truncate(highest.max(bare));
    args
}

fn explained_table(stmt: &Statement) -> Option<String> {
    match stmt {
        Statement::ExplainTable { table_name, .. } => {
            table_name.0.last().and_then(|part| match part {
                ObjectNamePart::Identifier(ident) => Some(ident.value.clone()),
                _ => None,
            })
        }
        _ => None,
    }
}

/// Rewrites MySQL-only expressions of a `SELECT` in place. Statements without
/// variables, foreign collations or mapped functions come out unchanged.
pub fn rewrite_select_statement(stmt: &mut Statement) {
    let _ = stmt.visit(&mut SelectRewriter);
}

struct SelectRewriter;

impl VisitorMut for SelectRewriter {
    type Break = ();

    fn pre_visit_query(&mut self, query: &mut Query) -> ControlFlow<Self::Break> {
        // `SELECT @@version` keeps `@@version` as its column name.
        if let SetExpr::Select(select) = query.body.as_mut() {
            for item in select.projection.iter_mut() {
                let aliased = match item {
                    SelectItem::UnnamedExpr(expr) if system_variable_name(expr).is_some() => {
                        Some(SelectItem::ExprWithAlias {
                            alias: Ident::with_quote('`', expr.to_string()),
                            expr: expr.clone(),
                        })
                    }
                    _ => None,
                };
                if let Some(aliased) = aliased {
                    *item = aliased;
                }
            }
        }
        ControlFlow::Continue(())
    }

    // Post-order: children are rewritten before their parent, and a
    // replacement node is never visited again.
    fn post_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<Self::Break> {
        if let Some(replacement) = rewrite_expr(expr) {
            *expr = replacement;
        }
        ControlFlow::Continue(())
    }
}

const SQLITE_COLLATIONS: &[&str] = &["BINARY", "NOCASE", "RTRIM"];

fn rewrite_expr(expr: &Expr) -> Option<Expr> {
    match expr {
        Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
            let name = system_variable_name(expr)?;
            let value = tables::variable(&name).unwrap_or(Literal::Text(""));
            Some(literal_expr(value))
        }
        Expr::Collate { expr: inner, collation } => {
            let supported = collation.0.last().is_some_and(|part| match part {
                ObjectNamePart::Identifier(ident) => SQLITE_COLLATIONS
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(&ident.value)),
                _ => false,
            });
            if supported {
                return None;
            }
            Some(Expr::Collate {
                expr: inner.clone(),
                collation: ObjectName(vec![ObjectNamePart::Identifier(Ident::new("BINARY"))]),
            })
        }
        Expr::Convert {
            expr: inner,
            data_type: Some(data_type),
            ..
        } => parse_expr(&format!("CAST({inner} AS {data_type})")),
        // CONVERT(x USING charset)
        Expr::Convert {
            expr: inner,
            data_type: None,
            ..
        } => Some(inner.as_ref().clone()),
        Expr::Position {
            expr: needle,
            r#in: haystack,
        } => call("instr", &[haystack.to_string(), needle.to_string()]),
        Expr::Substring {
            expr: inner,
            substring_from,
            substring_for,
            ..
        } => {
            let from = substring_from.as_ref()?;
            let mut args = vec![inner.to_string(), from.to_string()];
            if let Some(len) = substring_for {
                args.push(len.to_string());
            }
            call("substr", &args)
        }
        Expr::Function(func) => rewrite_function(func),
        _ => None,
    }
}

fn rewrite_function(func: &Function) -> Option<Expr> {
    let name = match func.name.0.as_slice() {
        [ObjectNamePart::Identifier(ident)] => ident.value.to_ascii_lowercase(),
        _ => return None,
    };

    if tables::is_deleted_function(&name) {
        return Some(Expr::value(Value::Null));
    }
    if name == "locate" {
        return rewrite_locate(func);
    }
    if let Some(renamed) = tables::renamed_function(&name) {
        // A bare keyword such as CURRENT_USER has no argument list to keep.
        if matches!(func.args, FunctionArguments::None) {
            return None;
        }
        let mut func = func.clone();
        func.name = ObjectName(vec![ObjectNamePart::Identifier(Ident::new(renamed))]);
        return Some(Expr::Function(func));
    }
    tables::literal_function(&name).map(literal_expr)
}

/// `LOCATE(needle, haystack)` is `instr(haystack, needle)`.
fn rewrite_locate(func: &Function) -> Option<Expr> {
    let FunctionArguments::List(list) = &func.args else {
        return None;
    };
    match list.args.as_slice() {
        [needle, haystack] => call("instr", &[haystack.to_string(), needle.to_string()]),
        _ => None,
    }
}

/// `@@name`, `@@session.name` and `@@global.name` references, without the `@@`.
fn system_variable_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) if ident.quote_style.is_none() => {
            ident.value.strip_prefix("@@").map(str::to_string)
        }
        Expr::CompoundIdentifier(parts) => {
            let (first, rest) = parts.split_first()?;
            if first.quote_style.is_some() {
                return None;
            }
            let scope = first.value.strip_prefix("@@")?;
            let mut name = scope.to_string();
            for part in rest {
                name.push('.');
                name.push_str(&part.value);
            }
            Some(name)
        }
        _ => None,
    }
}

fn literal_expr(literal: Literal) -> Expr {
    match literal {
        Literal::Text(s) => Expr::value(Value::SingleQuotedString(s.to_string())),
        Literal::Int(i) => Expr::value(Value::Number(i.to_string(), false)),
    }
}

/// A plain call `name(args...)`. SUBSTR and friends would otherwise come
/// back as their dedicated AST nodes and print in upper case.
fn call(name: &str, args: &[String]) -> Option<Expr> {
    let mut expr = parse_expr(&format!("f({})", args.join(", ")))?;
    match &mut expr {
        Expr::Function(func) => {
            func.name = ObjectName(vec![ObjectNamePart::Identifier(Ident::new(name))]);
            Some(expr)
        }
        _ => None,
    }
}

fn parse_expr(sql: &str) -> Option<Expr> {
    let dialect = MySqlDialect {};
    Parser::new(&dialect)
        .try_with_sql(sql)
        .and_then(|mut parser| parser.parse_expr())
        .ok()
}
