use crate::config::RequestTemplate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type PageNumber = u32;

pub const PAGE_FIELD: &str = "page";
const WRAPPED_VALUE_FIELD: &str = "value";

/// One item as returned by the remote source. Only `page` carries meaning here; every other
/// field is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Tags a raw array element with the page it was retrieved on. Non-object elements are
    /// wrapped so they can still carry the tag.
    pub fn stamped(page: PageNumber, raw: Value) -> Record {
        let mut fields = match raw {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert(WRAPPED_VALUE_FIELD.to_string(), other);
                map
            }
        };
        fields.insert(PAGE_FIELD.to_string(), Value::from(page));
        Record(fields)
    }

    pub fn page(&self) -> Option<PageNumber> {
        self.0
            .get(PAGE_FIELD)
            .and_then(Value::as_u64)
            .and_then(|p| PageNumber::try_from(p).ok())
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Fetched,
    /// Every attempt failed; the page carries no records.
    Failed,
}

#[derive(Debug, Clone)]
pub struct PageResult {
    pub page: PageNumber,
    pub records: Vec<Record>,
    pub outcome: PageOutcome,
}

impl PageResult {
    pub fn fetched(page: PageNumber, raw: Vec<Value>) -> Self {
        PageResult {
            page,
            records: raw.into_iter().map(|v| Record::stamped(page, v)).collect(),
            outcome: PageOutcome::Fetched,
        }
    }

    pub fn failed(page: PageNumber) -> Self {
        PageResult {
            page,
            records: Vec::new(),
            outcome: PageOutcome::Failed,
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SearchPayload<'a> {
    pub page: PageNumber,
    pub page_size: u32,
    pub filters: &'a Value,
    pub sort: &'a Value,
    pub search_type: &'a str,
}

impl<'a> SearchPayload<'a> {
    pub fn new(template: &'a RequestTemplate, page: PageNumber, search_token: &'a str) -> Self {
        SearchPayload {
            page,
            page_size: template.page_size,
            filters: &template.filters,
            sort: &template.sort,
            search_type: search_token,
        }
    }
}

/// Pulls the record array out of a decoded envelope. A missing or non-array path is an empty
/// page, not an error.
pub fn extract_records(body: Value, pointer: &str) -> Vec<Value> {
    let mut body = body;
    match body.pointer_mut(pointer).map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stamping_overwrites_page_and_keeps_fields() {
        let rec = Record::stamped(7, json!({ "id": "abc", "page": 99, "nested": { "x": 1 } }));
        assert_eq!(rec.page(), Some(7));
        assert_eq!(rec.fields()["id"], json!("abc"));
        assert_eq!(rec.fields()["nested"], json!({ "x": 1 }));
    }

    #[test]
    fn scalar_elements_are_wrapped() {
        let rec = Record::stamped(2, json!("plain"));
        assert_eq!(rec.page(), Some(2));
        assert_eq!(rec.fields()["value"], json!("plain"));
    }

    #[test]
    fn extracts_nested_array() {
        let body = json!({ "data": { "list": [{ "a": 1 }, { "a": 2 }], "total": 2 } });
        assert_eq!(extract_records(body, "/data/list").len(), 2);
    }

    #[test]
    fn missing_or_wrong_shape_path_is_empty() {
        assert!(extract_records(json!({ "data": {} }), "/data/list").is_empty());
        assert!(extract_records(json!({ "data": { "list": "nope" } }), "/data/list").is_empty());
        assert!(extract_records(json!([1, 2]), "/data/list").is_empty());
    }

    #[test]
    fn payload_serializes_camel_case() {
        let mut template = RequestTemplate::default();
        template.page_size = 25;
        template.filters = json!([{ "field": "status", "value": "open" }]);
        let payload = SearchPayload::new(&template, 4, "token-1");
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["page"], json!(4));
        assert_eq!(v["pageSize"], json!(25));
        assert_eq!(v["searchType"], json!("token-1"));
        assert_eq!(v["filters"][0]["field"], json!("status"));
    }

    #[test]
    fn record_without_page_reports_none() {
        let rec: Record = serde_json::from_value(json!({ "id": 1 })).unwrap();
        assert_eq!(rec.page(), None);
    }
}
