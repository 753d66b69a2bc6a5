use tiberius::Query;

use crate::query::Request;
use crate::types::RowValues;

/// Build the tiberius query for a request.
///
/// Named parameters go through `sp_executesql`: the statement text and the
/// declaration list are the first two positional arguments, each named
/// parameter follows as `@name = @Pn` with its declared wire type.
pub(crate) fn bind_request(request: Request) -> Query<'static> {
    if request.params.is_empty() {
        return Query::new(request.sql);
    }

    let (text, declarations) = rpc_text(&request);
    let mut query = Query::new(text);
    query.bind(request.sql);
    query.bind(declarations);
    for param in request.params {
        bind_value(&mut query, param.value);
    }
    query
}

/// The `sp_executesql` call and its parameter declaration list.
fn rpc_text(request: &Request) -> (String, String) {
    let mut text = String::from("EXEC sp_executesql @P1, @P2");
    let mut declarations = Vec::with_capacity(request.params.len());
    for (idx, param) in request.params.iter().enumerate() {
        // @P1 and @P2 carry the statement and declarations
        text.push_str(&format!(", @{} = @P{}", param.name, idx + 3));
        declarations.push(format!("@{} {}", param.name, param.wire_type.declaration()));
    }
    (text, declarations.join(", "))
}

fn bind_value(query: &mut Query<'static>, value: RowValues) {
    match value {
        RowValues::Int(i) => query.bind(i),
        RowValues::Float(f) => query.bind(f),
        RowValues::Text(s) => query.bind(s),
        RowValues::Bool(b) => query.bind(b),
        RowValues::Timestamp(dt) => query.bind(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        RowValues::Null => query.bind(Option::<String>::None),
        RowValues::JSON(jsval) => query.bind(jsval.to_string()),
        RowValues::Blob(bytes) => query.bind(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Query as MiddlewareQuery;

    #[test]
    fn named_parameters_follow_statement_and_declarations() {
        let request = Request::from_query(
            &MiddlewareQuery::new("select @id as id, @name as name")
                .bind("id", 7)
                .bind("@name", "x".repeat(1001)),
        )
        .unwrap();

        let (text, declarations) = rpc_text(&request);
        assert_eq!(
            text,
            "EXEC sp_executesql @P1, @P2, @id = @P3, @name = @P4"
        );
        assert_eq!(declarations, "@id bigint, @name nvarchar(max)");
    }

    #[test]
    fn declarations_use_coerced_types() {
        let request = Request::from_query(
            &MiddlewareQuery::new("")
                .bind("a", 2.0)
                .bind("b", 2.5)
                .bind("c", false)
                .bind("d", RowValues::Null)
                .bind("e", vec![1u8, 2]),
        )
        .unwrap();

        let (_, declarations) = rpc_text(&request);
        assert_eq!(
            declarations,
            "@a bigint, @b float, @c bit, @d nvarchar(4000), @e varbinary(max)"
        );
    }
}
