use std::fmt::Display;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};

/// Characters with meaning inside a PostgREST filter value.
const RESERVED: [char; 7] = [',', '(', ')', '*', '%', '"', '\\'];

/// RFC 3339 in UTC with a `Z` suffix, so values survive a query string.
pub fn db_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `[from 00:00, (to + 1) 00:00)` in UTC. `None` when `to` is the last
/// representable date.
pub fn day_bounds(from: NaiveDate, to: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let after = to.succ_opt()?;
    Some((
        Utc.from_utc_datetime(&from.and_time(NaiveTime::MIN)),
        Utc.from_utc_datetime(&after.and_time(NaiveTime::MIN)),
    ))
}

/// User text for an `ilike` pattern, with filter syntax removed.
fn search_term(needle: &str) -> String {
    needle
        .chars()
        .filter(|c| !RESERVED.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// PostgREST path builder: `/rest/v1/<table>?col=op.value&...`.
#[derive(Debug, Clone)]
pub struct Query {
    table: String,
    params: Vec<(String, String)>,
}

impl Query {
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            params: Vec::new(),
        }
    }

    fn filter(mut self, column: &str, op: &str, value: impl Display) -> Self {
        self.params.push((column.to_string(), format!("{}.{}", op, value)));
        self
    }

    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "eq", value)
    }

    pub fn neq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "neq", value)
    }

    pub fn lt(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "lt", value)
    }

    pub fn lte(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "lte", value)
    }

    pub fn gt(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "gt", value)
    }

    pub fn gte(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "gte", value)
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(column, "is", "null")
    }

    /// Case-insensitive substring match.
    pub fn ilike(self, column: &str, needle: &str) -> Self {
        self.filter(column, "ilike", format!("*{}*", search_term(needle)))
    }

    pub fn in_list<T: Display>(self, column: &str, values: &[T]) -> Self {
        let list = values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.filter(column, "in", format!("({})", list))
    }

    pub fn contains(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "cs", format!("{{{}}}", value))
    }

    /// `or=(a.ilike.*x*,b.ilike.*x*)` across several columns.
    pub fn any_ilike(mut self, columns: &[&str], needle: &str) -> Self {
        let needle = search_term(needle);
        let clauses = columns
            .iter()
            .map(|c| format!("{}.ilike.*{}*", c, needle))
            .collect::<Vec<_>>()
            .join(",");
        self.params.push(("or".to_string(), format!("({})", clauses)));
        self
    }

    pub fn order(mut self, spec: &str) -> Self {
        self.params.push(("order".to_string(), spec.to_string()));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.params.push(("limit".to_string(), limit.to_string()));
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.params.push(("offset".to_string(), offset.to_string()));
        self
    }

    pub fn build(&self) -> String {
        if self.params.is_empty() {
            return format!("/rest/v1/{}", self.table);
        }

        let query = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("/rest/v1/{}?{}", self.table, query)
    }
}
