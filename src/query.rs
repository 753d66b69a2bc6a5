use crate::error::ExecError;
use crate::types::{RowValues, WireType, coerce};

/// SQL text plus named parameters, in binding order.
///
/// ```rust
/// use mssql_middleware::Query;
///
/// let query = Query::new("select @p as x").bind("p", 42);
/// assert_eq!(query.params().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    sql: String,
    params: Vec<(String, RowValues)>,
}

impl Query {
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Create a query from any ordered collection of name/value pairs.
    pub fn with_params<I, K, V>(sql: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        Self {
            sql: sql.into(),
            params: params
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }

    /// Append a named parameter. A leading `@` is optional.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn params(&self) -> &[(String, RowValues)] {
        &self.params
    }
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Query::new(sql)
    }
}

impl From<String> for Query {
    fn from(sql: String) -> Self {
        Query::new(sql)
    }
}

/// A parameter after name normalization and wire-type inference.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Name without the leading `@`.
    pub name: String,
    pub wire_type: WireType,
    pub value: RowValues,
}

/// What a session receives for one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub sql: String,
    pub params: Vec<Parameter>,
}

impl Request {
    /// Build the wire request for `query`, typing every parameter.
    ///
    /// # Errors
    /// Returns `ExecError::InvalidParameter` for a name that is not a plain
    /// identifier or that appears twice.
    pub fn from_query(query: &Query) -> Result<Self, ExecError> {
        let mut params: Vec<Parameter> = Vec::with_capacity(query.params.len());
        for (raw_name, value) in &query.params {
            let name = normalize_name(raw_name)?;
            if params.iter().any(|p| p.name.eq_ignore_ascii_case(name)) {
                return Err(ExecError::InvalidParameter(format!(
                    "parameter @{name} is bound more than once"
                )));
            }
            let (wire_type, value) = coerce(value);
            params.push(Parameter {
                name: name.to_owned(),
                wire_type,
                value,
            });
        }

        Ok(Self {
            sql: query.sql.clone(),
            params,
        })
    }
}

fn normalize_name(raw: &str) -> Result<&str, ExecError> {
    let name = raw.strip_prefix('@').unwrap_or(raw);
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(ExecError::InvalidParameter(format!(
            "`{raw}` is not a valid parameter name"
        )))
    }
}
