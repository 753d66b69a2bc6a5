//! Answers for statements that have no scripted reply.
//!
//! Understands just enough T-SQL for tests: `select <expr> as <name>, ...`
//! with literal or `@param` expressions, and `throw <code>, '<message>', <state>`.
//! Anything else completes without a result set.

use std::sync::LazyLock;

use regex::Regex;

use super::mock::MockReply;
use crate::query::Request;
use crate::types::RowValues;

static THROW: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*throw\s+(\d+)\s*,\s*'((?:[^']|'')*)'\s*,\s*\d+\s*;?\s*$").ok()
});

static SELECT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*select\s+(.+?)\s*;?\s*$").ok());

static ALIASED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*(.+?)\s+as\s+\[?(\w+)\]?\s*$").ok());

pub(crate) fn default_reply(request: &Request) -> MockReply {
    if let Some(caps) = THROW.as_ref().and_then(|re| re.captures(&request.sql)) {
        let code = caps[1].parse().unwrap_or(50000);
        return MockReply::server_error(code, &caps[2].replace("''", "'"));
    }

    let Some(caps) = SELECT.as_ref().and_then(|re| re.captures(&request.sql)) else {
        return MockReply::Empty;
    };

    let mut columns = Vec::new();
    let mut row = Vec::new();
    for item in caps[1].split(',') {
        let (expr, name) = match ALIASED.as_ref().and_then(|re| re.captures(item)) {
            Some(alias) => (alias[1].trim().to_string(), alias[2].to_string()),
            None => (item.trim().to_string(), String::new()),
        };
        match evaluate(&expr, request) {
            Ok(value) => {
                columns.push(name);
                row.push(value);
            }
            Err(reply) => return reply,
        }
    }
    MockReply::Rows {
        columns,
        rows: vec![row],
    }
}

fn evaluate(expr: &str, request: &Request) -> Result<RowValues, MockReply> {
    if let Some(name) = expr.strip_prefix('@') {
        return request
            .params
            .iter()
            .find(|param| param.name.eq_ignore_ascii_case(name))
            .map(|param| param.value.clone())
            .ok_or_else(|| {
                MockReply::server_error(137, &format!("Must declare the scalar variable \"@{name}\"."))
            });
    }
    if expr.eq_ignore_ascii_case("null") {
        return Ok(RowValues::Null);
    }
    if let Some(text) = expr
        .strip_prefix("N'")
        .or_else(|| expr.strip_prefix('\''))
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return Ok(RowValues::Text(text.replace("''", "'")));
    }
    if let Ok(i) = expr.parse::<i64>() {
        return Ok(RowValues::Int(i));
    }
    if let Ok(f) = expr.parse::<f64>() {
        return Ok(RowValues::Float(f));
    }
    Err(MockReply::server_error(
        207,
        &format!("Invalid column name '{expr}'."),
    ))
}
