//! Result signatures.
//!
//! A signature identifies "the same test" across runs so the server can
//! correlate results. Format: `ids::suites::params`, where empty parts are
//! left out entirely.

use std::collections::BTreeMap;

/// Builds the signature string for a result.
///
/// * ids are joined with `-`
/// * suite titles are trimmed, lower-cased, have spaces replaced by `_`,
///   and are joined with `::`
/// * params are rendered as `{"name":"value"}` in key order, joined with `::`
pub fn generate_signature<S: AsRef<str>>(
    ids: Option<&[i64]>,
    suites: &[S],
    params: &BTreeMap<String, String>,
) -> String {
    let mut parts = Vec::new();

    if let Some(ids) = ids.filter(|ids| !ids.is_empty()) {
        let joined: Vec<String> = ids.iter().map(ToString::to_string).collect();
        parts.push(joined.join("-"));
    }

    if !suites.is_empty() {
        let normalized: Vec<String> = suites
            .iter()
            .map(|suite| suite.as_ref().trim().to_lowercase().replace(' ', "_"))
            .collect();
        parts.push(normalized.join("::"));
    }

    if !params.is_empty() {
        let pairs: Vec<String> = params
            .iter()
            .map(|(key, value)| format!("{{\"{}\":\"{}\"}}", key, value))
            .collect();
        parts.push(pairs.join("::"));
    }

    parts.join("::")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    const NO_SUITES: [&str; 0] = [];

    #[test]
    fn test_empty_signature() {
        assert_eq!(generate_signature(None, &NO_SUITES, &BTreeMap::new()), "");
        assert_eq!(generate_signature(Some(&[][..]), &NO_SUITES, &BTreeMap::new()), "");
    }

    #[test]
    fn test_only_ids() {
        assert_eq!(
            generate_signature(Some(&[1, 2, 3][..]), &NO_SUITES, &BTreeMap::new()),
            "1-2-3"
        );
    }

    #[test]
    fn test_only_suites() {
        assert_eq!(
            generate_signature(None, &["My Suite", "Another Suite"], &BTreeMap::new()),
            "my_suite::another_suite"
        );
    }

    #[test]
    fn test_only_params() {
        let p = params(&[("param1", "value1"), ("param2", "value2")]);
        assert_eq!(
            generate_signature(None, &NO_SUITES, &p),
            r#"{"param1":"value1"}::{"param2":"value2"}"#
        );
    }

    #[test]
    fn test_all_parts() {
        let p = params(&[("param1", "value1")]);
        assert_eq!(
            generate_signature(Some(&[1, 2][..]), &[" My Suite "], &p),
            r#"1-2::my_suite::{"param1":"value1"}"#
        );
    }
}
