use serde::de::DeserializeOwned;
use serde_json::Value;

use super::BackendError;

/// Row filter, rendered as `column=op.value`
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { column: String, value: String },
    In { column: String, values: Vec<String> },
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq { column, .. } | Filter::In { column, .. } => column,
        }
    }

    fn to_param(&self) -> (String, String) {
        match self {
            Filter::Eq { column, value } => (column.clone(), format!("eq.{}", value)),
            Filter::In { column, values } => {
                let list = values.iter().map(|v| quote_list_value(v)).collect::<Vec<_>>().join(",");
                (column.clone(), format!("in.({})", list))
            }
        }
    }
}

/// Values that contain reserved characters must be double-quoted inside `in.(...)`
fn quote_list_value(value: &str) -> String {
    if value.contains([',', '(', ')', '"', ' ']) {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// Table query in the platform's REST dialect
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Option<(String, bool)>,
    /// Inclusive row range
    pub range: Option<(u64, u64)>,
    /// Request an exact row count alongside the data
    pub count: bool,
    /// Count only, no rows returned
    pub head: bool,
}

impl Query {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            range: None,
            count: false,
            head: false,
        }
    }

    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.filters.push(Filter::Eq {
            column: column.into(),
            value: value.to_string(),
        });
        self
    }

    pub fn in_list<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.filters.push(Filter::In {
            column: column.into(),
            values: values.into_iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some((column.into(), ascending));
        self
    }

    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.range = Some((from, to.max(from)));
        self
    }

    pub fn limit(self, count: u64) -> Self {
        self.range(0, count.saturating_sub(1))
    }

    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }

    /// Exact count of matching rows without fetching them
    pub fn count_only(mut self) -> Self {
        self.count = true;
        self.head = true;
        self
    }

    /// Query-string parameters for `GET|HEAD /rest/v1/{table}`
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.columns.clone())];
        params.extend(self.filters.iter().map(Filter::to_param));

        if let Some((column, ascending)) = &self.order {
            let direction = if *ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", column, direction)));
        }

        if let Some((from, to)) = self.range {
            params.push(("offset".to_string(), from.to_string()));
            params.push(("limit".to_string(), (to - from + 1).to_string()));
        }

        params
    }
}

/// Rows plus the exact count when one was requested
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Value>,
    pub count: Option<u64>,
}

impl QueryResult {
    pub fn new(rows: Vec<Value>) -> Self {
        Self { rows, count: None }
    }

    pub fn decode<T: DeserializeOwned>(self) -> Result<Vec<T>, BackendError> {
        self.rows
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(BackendError::from))
            .collect()
    }

    pub fn first<T: DeserializeOwned>(self) -> Result<Option<T>, BackendError> {
        match self.rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }
}

/// Parse the total out of a `Content-Range` header (`0-9/42`, `*/42`)
pub fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/').and_then(|(_, total)| total.trim().parse().ok())
}
