//! Predicate expression translator: turns a small boolean
//! expression tree into a parameterized `WHERE`-clause fragment over the
//! closed set of node kinds a predicate expression can produce.
//!
//! Every [`Expr::Constant`] becomes a bound parameter rather than an inlined
//! SQL literal — nothing from a host value ever reaches the SQL text
//! itself.

use compact_str::CompactString;

use crate::config::ConnectionOptions;
use crate::error::{Result, StoreError};
use crate::ident::escape_identifier;
use crate::table::Affinity;
use crate::value::{BoundValue, SqlValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    ExclusiveOr,
}

/// A predicate expression tree. Built by a caller translating a
/// host-language boolean expression; this crate only ever consumes it.
#[derive(Debug, Clone)]
pub enum Expr {
    Constant(SqlValue),
    /// A column reference, by its sanitized (unescaped) name.
    Field(CompactString),
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Convert(Box<Expr>, Affinity),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    /// `lhs ?? rhs` (null-coalesce).
    Coalesce(Box<Expr>, Box<Expr>),
    Call(MethodCall),
    /// `test ? if_true : if_false`, translated to `CASE WHEN ... END`.
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum MethodCall {
    StartsWith(Box<Expr>, Box<Expr>),
    EndsWith(Box<Expr>, Box<Expr>),
    ContainsString(Box<Expr>, Box<Expr>),
    /// `sequence.Contains(field)`, translated to `field IN (...)`.
    ContainsSequence(Box<Expr>, Vec<Expr>),
    Equals(Box<Expr>, Box<Expr>),
    ToLower(Box<Expr>),
    ToUpper(Box<Expr>),
    Trim(Box<Expr>),
    Length(Box<Expr>),
    Substring(Box<Expr>, Box<Expr>, Option<Box<Expr>>),
}

/// Translates `expr` into a SQL fragment plus the parameters it references,
/// in bind order. The fragment uses anonymous `?` placeholders,
/// so `params[i]` must be bound at position `i + 1`.
pub fn translate(expr: &Expr, options: &ConnectionOptions) -> Result<(String, Vec<BoundValue>)> {
    match expr {
        Expr::Constant(value) => Ok(("?".to_string(), vec![bind_constant(value)])),
        Expr::Field(name) => Ok((escape_identifier(name), Vec::new())),

        Expr::Not(inner) => {
            let (sql, params) = translate(inner, options)?;
            Ok((format!("(NOT {sql})"), params))
        }
        Expr::Negate(inner) => {
            let (sql, params) = translate(inner, options)?;
            Ok((format!("(-{sql})"), params))
        }
        Expr::Convert(inner, affinity) => {
            let (sql, params) = translate(inner, options)?;
            Ok((format!("CAST({sql} AS {})", affinity.as_sql()), params))
        }

        Expr::Binary(op, lhs, rhs) => translate_binary(*op, lhs, rhs, options),
        Expr::Logical(op, lhs, rhs) => translate_logical(*op, lhs, rhs, options),

        Expr::Coalesce(lhs, rhs) => {
            let (l_sql, mut params) = translate(lhs, options)?;
            let (r_sql, r_params) = translate(rhs, options)?;
            params.extend(r_params);
            Ok((format!("COALESCE({l_sql}, {r_sql})"), params))
        }

        Expr::Call(call) => translate_call(call, options),

        Expr::Conditional(test, if_true, if_false) => {
            let (t_sql, mut params) = translate(test, options)?;
            let (true_sql, true_params) = translate(if_true, options)?;
            params.extend(true_params);
            let (false_sql, false_params) = translate(if_false, options)?;
            params.extend(false_params);
            Ok((format!("(CASE WHEN {t_sql} THEN {true_sql} ELSE {false_sql} END)"), params))
        }
    }
}

fn bind_constant(value: &SqlValue) -> BoundValue {
    match value {
        SqlValue::Null => BoundValue::Null,
        SqlValue::Integer(i) => BoundValue::Int64(*i),
        SqlValue::Real(r) => BoundValue::Double(*r),
        SqlValue::Text(s) => BoundValue::Text(s.clone()),
        SqlValue::Blob(b) => BoundValue::Blob(b.clone()),
    }
}

fn collate_suffix(options: &ConnectionOptions) -> &'static str {
    if options.case_insensitive_text {
        " COLLATE NOCASE"
    } else {
        ""
    }
}

fn is_null_constant(expr: &Expr) -> bool {
    matches!(expr, Expr::Constant(SqlValue::Null))
}

fn translate_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, options: &ConnectionOptions) -> Result<(String, Vec<BoundValue>)> {
    // A comparison against a literal NULL can never be decided with `= `/`<>`
    // under SQL's three-valued logic, so it is rewritten to `IS [NOT] NULL`
    //.
    if matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) {
        if is_null_constant(rhs) {
            let (l_sql, params) = translate(lhs, options)?;
            let verb = if op == BinaryOp::Equal { "IS NULL" } else { "IS NOT NULL" };
            return Ok((format!("({l_sql} {verb})"), params));
        }
        if is_null_constant(lhs) {
            let (r_sql, params) = translate(rhs, options)?;
            let verb = if op == BinaryOp::Equal { "IS NULL" } else { "IS NOT NULL" };
            return Ok((format!("({r_sql} {verb})"), params));
        }
    }

    let (l_sql, mut params) = translate(lhs, options)?;
    let (r_sql, r_params) = translate(rhs, options)?;
    params.extend(r_params);

    let operator = match op {
        BinaryOp::Add => "+",
        BinaryOp::Subtract => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
        BinaryOp::Modulo => "%",
        BinaryOp::Equal => "=",
        BinaryOp::NotEqual => "<>",
        BinaryOp::LessThan => "<",
        BinaryOp::LessThanOrEqual => "<=",
        BinaryOp::GreaterThan => ">",
        BinaryOp::GreaterThanOrEqual => ">=",
    };

    let collate = if matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) {
        collate_suffix(options)
    } else {
        ""
    };

    Ok((format!("({l_sql} {operator} {r_sql}{collate})"), params))
}

fn translate_logical(op: LogicalOp, lhs: &Expr, rhs: &Expr, options: &ConnectionOptions) -> Result<(String, Vec<BoundValue>)> {
    let (l_sql, mut params) = translate(lhs, options)?;
    let (r_sql, r_params) = translate(rhs, options)?;
    params.extend(r_params);

    let sql = match op {
        LogicalOp::And => format!("({l_sql} AND {r_sql})"),
        LogicalOp::Or => format!("({l_sql} OR {r_sql})"),
        // SQLite has no native XOR operator; built from two NOT-equal
        // boolean comparisons instead.
        LogicalOp::ExclusiveOr => format!("(({l_sql}) IS NOT ({r_sql}))"),
    };
    Ok((sql, params))
}

enum LikeKind {
    Prefix,
    Suffix,
    Contains,
}

fn escape_like_pattern(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn translate_like(lhs: &Expr, rhs: &Expr, kind: LikeKind, options: &ConnectionOptions) -> Result<(String, Vec<BoundValue>)> {
    let (l_sql, mut params) = translate(lhs, options)?;

    let (pattern_sql, escape_clause) = if let Expr::Constant(SqlValue::Text(text)) = rhs {
        let escaped = escape_like_pattern(text);
        let literal = match kind {
            LikeKind::Prefix => format!("{escaped}%"),
            LikeKind::Suffix => format!("%{escaped}"),
            LikeKind::Contains => format!("%{escaped}%"),
        };
        params.push(BoundValue::Text(literal));
        ("?".to_string(), " ESCAPE '\\'")
    } else {
        let (r_sql, r_params) = translate(rhs, options)?;
        params.extend(r_params);
        let wrapped = match kind {
            LikeKind::Prefix => format!("{r_sql} || '%'"),
            LikeKind::Suffix => format!("'%' || {r_sql}"),
            LikeKind::Contains => format!("'%' || {r_sql} || '%'"),
        };
        (wrapped, "")
    };

    let collate = collate_suffix(options);
    Ok((format!("({l_sql} LIKE {pattern_sql}{escape_clause}{collate})"), params))
}

fn translate_call(call: &MethodCall, options: &ConnectionOptions) -> Result<(String, Vec<BoundValue>)> {
    match call {
        MethodCall::StartsWith(lhs, rhs) => translate_like(lhs, rhs, LikeKind::Prefix, options),
        MethodCall::EndsWith(lhs, rhs) => translate_like(lhs, rhs, LikeKind::Suffix, options),
        MethodCall::ContainsString(lhs, rhs) => translate_like(lhs, rhs, LikeKind::Contains, options),

        MethodCall::ContainsSequence(field, values) => {
            let (f_sql, mut params) = translate(field, options)?;
            let mut items = Vec::with_capacity(values.len());
            for value in values {
                let (v_sql, v_params) = translate(value, options)?;
                items.push(v_sql);
                params.extend(v_params);
            }
            Ok((format!("({f_sql} IN ({}))", items.join(", ")), params))
        }

        MethodCall::Equals(lhs, rhs) => translate_binary(BinaryOp::Equal, lhs, rhs, options),

        MethodCall::ToLower(inner) => {
            let (sql, params) = translate(inner, options)?;
            Ok((format!("LOWER({sql})"), params))
        }
        MethodCall::ToUpper(inner) => {
            let (sql, params) = translate(inner, options)?;
            Ok((format!("UPPER({sql})"), params))
        }
        MethodCall::Trim(inner) => {
            let (sql, params) = translate(inner, options)?;
            Ok((format!("TRIM({sql})"), params))
        }
        MethodCall::Length(inner) => {
            let (sql, params) = translate(inner, options)?;
            Ok((format!("LENGTH({sql})"), params))
        }
        MethodCall::Substring(base, start, len) => {
            let (base_sql, mut params) = translate(base, options)?;
            let (start_sql, start_params) = translate(start, options)?;
            params.extend(start_params);
            // SQL `SUBSTR` is 1-based; the predicate source is 0-based.
            let sql = match len {
                Some(len_expr) => {
                    let (len_sql, len_params) = translate(len_expr, options)?;
                    params.extend(len_params);
                    format!("SUBSTR({base_sql}, ({start_sql}) + 1, {len_sql})")
                }
                None => format!("SUBSTR({base_sql}, ({start_sql}) + 1)"),
            };
            Ok((sql, params))
        }
    }
}

/// Returns [`StoreError::UntranslatableExpression`] for a node kind this
/// translator does not (yet) support. `Expr`/`MethodCall` are closed enums
/// covering every node this crate currently constructs, so nothing reaches
/// this today; it exists for a future variant to fall back on instead of a
/// panic.
#[allow(dead_code)]
fn untranslatable(description: &str) -> StoreError {
    StoreError::UntranslatableExpression(description.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> Expr {
        Expr::Field(name.into())
    }

    fn text(s: &str) -> Expr {
        Expr::Constant(SqlValue::Text(s.to_string()))
    }

    fn int(i: i64) -> Expr {
        Expr::Constant(SqlValue::Integer(i))
    }

    #[test]
    fn translates_age_gt_and_name_like_prefix() {
        let expr = Expr::Logical(
            LogicalOp::And,
            Box::new(Expr::Binary(BinaryOp::GreaterThan, Box::new(field("Age")), Box::new(int(21)))),
            Box::new(Expr::Call(MethodCall::StartsWith(Box::new(field("Name")), Box::new(text("A"))))),
        );
        let (sql, params) = translate(&expr, &ConnectionOptions::default()).unwrap();
        assert_eq!(sql, "((\"Age\" > ?) AND (\"Name\" LIKE ? ESCAPE '\\'))");
        assert_eq!(params, vec![BoundValue::Int64(21), BoundValue::Text("A%".to_string())]);
    }

    #[test]
    fn equality_against_null_becomes_is_null() {
        let expr = Expr::Binary(BinaryOp::Equal, Box::new(field("DeletedAt")), Box::new(Expr::Constant(SqlValue::Null)));
        let (sql, params) = translate(&expr, &ConnectionOptions::default()).unwrap();
        assert_eq!(sql, "(\"DeletedAt\" IS NULL)");
        assert!(params.is_empty());
    }

    #[test]
    fn case_insensitive_text_adds_collate_nocase() {
        let expr = Expr::Binary(BinaryOp::Equal, Box::new(field("Name")), Box::new(text("ada")));
        let options = ConnectionOptions::builder().case_insensitive_text(true).build();
        let (sql, _) = translate(&expr, &options).unwrap();
        assert!(sql.ends_with("COLLATE NOCASE)"));
    }

    #[test]
    fn contains_sequence_translates_to_in_clause() {
        let expr = Expr::Call(MethodCall::ContainsSequence(Box::new(field("Id")), vec![int(1), int(2), int(3)]));
        let (sql, params) = translate(&expr, &ConnectionOptions::default()).unwrap();
        assert_eq!(sql, "(\"Id\" IN (?, ?, ?))");
        assert_eq!(params.len(), 3);
    }
}
