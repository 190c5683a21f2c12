//! Candidate URL enumeration.
//!
//! Order is part of the contract: parameter (first-seen) → value → payload
//! (list order) → encoding depth ascending. Probing, progress and numbering
//! all follow it.

use crate::target::{Parameter, ParameterMap, SkipReason, INJECTION_MARKER};
use crate::transform::{encoding_chain, percent_encode};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub parameter: String,
    pub value_index: usize,
    /// 1-based position in the payload list.
    pub payload_index: usize,
    pub payload: String,
    pub encoded_payload: String,
    pub depth: u8,
    /// Value placed in the targeted parameter before query re-encoding.
    pub injected_value: String,
}

/// Marked parameters when any exist, otherwise all of them unless a marker
/// is required.
pub fn select_parameters(
    params: &ParameterMap,
    require_marker: bool,
) -> Result<Vec<&Parameter>, SkipReason> {
    if params.is_empty() {
        return Err(SkipReason::NoQueryParameters);
    }
    let marked = params.marked();
    if !marked.is_empty() {
        return Ok(marked);
    }
    if require_marker {
        return Err(SkipReason::NoInjectionMarker);
    }
    Ok(params.iter().collect())
}

pub fn expand<'a>(
    base: &'a str,
    params: &'a ParameterMap,
    payloads: &'a [String],
    max_depth: u8,
    require_marker: bool,
) -> Result<impl Iterator<Item = Candidate> + 'a, SkipReason> {
    let selected = select_parameters(params, require_marker)?;

    let candidates = selected.into_iter().flat_map(move |param| {
        param
            .values
            .iter()
            .enumerate()
            .flat_map(move |(value_index, value)| {
                payloads
                    .iter()
                    .enumerate()
                    .flat_map(move |(index, payload)| {
                        encoding_chain(payload, max_depth)
                            .into_iter()
                            .zip(0u8..)
                            .map(move |(encoded_payload, depth)| {
                                let injected_value = inject(value, &encoded_payload);
                                Candidate {
                                    url: build_url(base, params, &param.name, &injected_value),
                                    parameter: param.name.clone(),
                                    value_index,
                                    payload_index: index + 1,
                                    payload: payload.clone(),
                                    encoded_payload,
                                    depth,
                                    injected_value,
                                }
                            })
                    })
            })
    });

    Ok(candidates)
}

/// Number of candidates `expand` would yield, zero for skipped targets.
pub fn count(
    params: &ParameterMap,
    payload_count: usize,
    max_depth: u8,
    require_marker: bool,
) -> usize {
    let Ok(selected) = select_parameters(params, require_marker) else {
        return 0;
    };
    let values: usize = selected.iter().map(|p| p.values.len()).sum();
    values * payload_count * (usize::from(max_depth) + 1)
}

fn inject(value: &str, encoded_payload: &str) -> String {
    if value.contains(INJECTION_MARKER) {
        value.replace(INJECTION_MARKER, encoded_payload)
    } else {
        encoded_payload.to_string()
    }
}

fn build_url(base: &str, params: &ParameterMap, target: &str, injected_value: &str) -> String {
    let mut pairs: Vec<String> = Vec::new();
    for param in params {
        let key = percent_encode(&param.name);
        if param.name == target {
            pairs.push(format!("{key}={}", percent_encode(injected_value)));
            continue;
        }
        for value in param.values.iter() {
            pairs.push(format!("{key}={}", percent_encode(value)));
        }
    }
    format!("{base}?{}", pairs.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::decompose;

    fn payloads(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn marked_parameter_is_the_only_one_scanned() {
        let (base, params) = decompose("http://x.test/a?id=*&b=2");
        let list = payloads(&["<img src=x>"]);
        let out: Vec<Candidate> = expand(&base, &params, &list, 1, false).unwrap().collect();

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|c| c.parameter == "id"));
        assert_eq!(out[0].depth, 0);
        assert_eq!(out[0].injected_value, "<img src=x>");
        assert_eq!(out[0].url, "http://x.test/a?id=%3Cimg%20src%3Dx%3E&b=2");
        assert_eq!(out[1].depth, 1);
        assert_eq!(out[1].encoded_payload, "%3Cimg%20src%3Dx%3E");
        assert_eq!(out[1].url, "http://x.test/a?id=%253Cimg%2520src%253Dx%253E&b=2");
    }

    #[test]
    fn unmarked_url_replaces_every_parameter_in_turn() {
        let (base, params) = decompose("http://x.test/a?id=1&b=2");
        let list = payloads(&["P"]);
        let urls: Vec<String> = expand(&base, &params, &list, 0, false)
            .unwrap()
            .map(|c| c.url)
            .collect();
        assert_eq!(
            urls,
            vec![
                "http://x.test/a?id=P&b=2".to_string(),
                "http://x.test/a?id=1&b=P".to_string(),
            ]
        );
    }

    #[test]
    fn require_marker_skips_unmarked_urls() {
        let (base, params) = decompose("http://x.test/a?id=1&b=2");
        let list = payloads(&["P"]);
        let err = expand(&base, &params, &list, 3, true).err();
        assert_eq!(err, Some(SkipReason::NoInjectionMarker));
        assert_eq!(count(&params, list.len(), 3, true), 0);
    }

    #[test]
    fn no_query_yields_nothing() {
        let (base, params) = decompose("http://x.test/a");
        let list = payloads(&["P"]);
        assert_eq!(
            expand(&base, &params, &list, 0, false).err(),
            Some(SkipReason::NoQueryParameters)
        );
    }

    #[test]
    fn order_is_parameter_value_payload_depth() {
        let (base, params) = decompose("http://x.test/?a=*&b=1&a=x*&c=*");
        let list = payloads(&["p1", "p2"]);
        let keys: Vec<(String, usize, usize, u8)> = expand(&base, &params, &list, 1, false)
            .unwrap()
            .map(|c| (c.parameter, c.value_index, c.payload_index, c.depth))
            .collect();
        let mut expected = Vec::new();
        for (name, values) in [("a", 2usize), ("c", 1)] {
            for value_index in 0..values {
                for payload_index in 1..=2 {
                    for depth in 0..=1u8 {
                        expected.push((name.to_string(), value_index, payload_index, depth));
                    }
                }
            }
        }
        assert_eq!(keys, expected);
        assert_eq!(count(&params, list.len(), 1, false), expected.len());
    }

    #[test]
    fn marker_inside_value_keeps_surrounding_text() {
        let (base, params) = decompose("http://x.test/?q=pre*post&z=9");
        let list = payloads(&["<x>"]);
        let first = expand(&base, &params, &list, 0, false)
            .unwrap()
            .next()
            .unwrap();
        assert_eq!(first.injected_value, "pre<x>post");
        assert_eq!(first.url, "http://x.test/?q=pre%3Cx%3Epost&z=9");
    }

    #[test]
    fn every_marker_in_a_value_gets_the_payload() {
        let (base, params) = decompose("http://x.test/?q=*-*");
        let list = payloads(&["P"]);
        let first = expand(&base, &params, &list, 0, false)
            .unwrap()
            .next()
            .unwrap();
        assert_eq!(first.injected_value, "P-P");
        assert_eq!(first.url, "http://x.test/?q=P-P");
    }

    #[test]
    fn repeated_marked_values_are_exercised_one_at_a_time() {
        let (base, params) = decompose("http://x.test/?a=*1&a=2*&k=v");
        let list = payloads(&["P"]);
        let out: Vec<Candidate> = expand(&base, &params, &list, 0, false).unwrap().collect();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].url, "http://x.test/?a=P1&k=v");
        assert_eq!(out[1].url, "http://x.test/?a=2P&k=v");
    }

    #[test]
    fn other_repeated_parameters_keep_all_values() {
        let (base, params) = decompose("http://x.test/?t=1&t=2&id=*");
        let list = payloads(&["P"]);
        let out: Vec<Candidate> = expand(&base, &params, &list, 0, false).unwrap().collect();
        assert_eq!(out[0].url, "http://x.test/?t=1&t=2&id=P");
    }
}
