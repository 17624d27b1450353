//! Indexer query parameters

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// Filters understood by the indexer routes. Which ones apply depends on the
/// output kind; the node ignores the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryParameter {
    /// Bech32 address owning the outputs.
    Address(String),
    HasExpiration(bool),
    HasTimelock(bool),
    HasStorageDepositReturn(bool),
    Tag(String),
    Sender(String),
    Issuer(String),
    /// Alias outputs only.
    StateController(String),
    /// Alias outputs only.
    Governor(String),
    /// Unix seconds.
    CreatedBefore(u32),
    CreatedAfter(u32),
    Cursor(String),
    PageSize(usize),
}

impl QueryParameter {
    fn key_value(&self) -> (&'static str, String) {
        match self {
            QueryParameter::Address(v) => ("address", v.clone()),
            QueryParameter::HasExpiration(v) => ("hasExpiration", v.to_string()),
            QueryParameter::HasTimelock(v) => ("hasTimelock", v.to_string()),
            QueryParameter::HasStorageDepositReturn(v) => ("hasStorageDepositReturn", v.to_string()),
            QueryParameter::Tag(v) => ("tag", v.clone()),
            QueryParameter::Sender(v) => ("sender", v.clone()),
            QueryParameter::Issuer(v) => ("issuer", v.clone()),
            QueryParameter::StateController(v) => ("stateController", v.clone()),
            QueryParameter::Governor(v) => ("governor", v.clone()),
            QueryParameter::CreatedBefore(v) => ("createdBefore", v.to_string()),
            QueryParameter::CreatedAfter(v) => ("createdAfter", v.to_string()),
            QueryParameter::Cursor(v) => ("cursor", v.clone()),
            QueryParameter::PageSize(v) => ("pageSize", v.to_string()),
        }
    }
}

/// Renders parameters as a form-encoded query string, sorted by key so
/// identical filters produce identical requests.
pub fn to_query_string(params: &[QueryParameter]) -> Option<String> {
    if params.is_empty() {
        return None;
    }
    let mut pairs: Vec<_> = params.iter().map(QueryParameter::key_value).collect();
    pairs.sort();
    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in &pairs {
        query.append_pair(key, value);
    }
    Some(query.finish())
}

/// Filters selecting outputs spendable by a plain signature.
pub fn spendable_basic_outputs(bech32_address: &str) -> Vec<QueryParameter> {
    vec![
        QueryParameter::Address(bech32_address.to_string()),
        QueryParameter::HasExpiration(false),
        QueryParameter::HasTimelock(false),
        QueryParameter::HasStorageDepositReturn(false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string_is_sorted() {
        let query = to_query_string(&spendable_basic_outputs("tri1abc")).unwrap();
        assert_eq!(
            query,
            "address=tri1abc&hasExpiration=false&hasStorageDepositReturn=false&hasTimelock=false"
        );
        assert!(to_query_string(&[]).is_none());
    }

    #[test]
    fn test_values_are_escaped() {
        let query = to_query_string(&[
            QueryParameter::Tag("0x01&pageSize=1".into()),
            QueryParameter::Cursor("a=b c".into()),
        ])
        .unwrap();
        assert_eq!(query, "cursor=a%3Db+c&tag=0x01%26pageSize%3D1");
        assert_eq!(
            to_query_string(&[QueryParameter::StateController("tri1q".into())]).unwrap(),
            "stateController=tri1q"
        );
    }

    #[test]
    fn test_json_form() {
        let params: Vec<QueryParameter> =
            serde_json::from_str(r#"[{"address": "tri1abc"}, {"hasTimelock": false}]"#).unwrap();
        assert_eq!(params[1], QueryParameter::HasTimelock(false));
    }
}
