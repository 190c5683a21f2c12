use std::fmt;
use std::sync::OnceLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use thiserror::Error;

/// Literal placeholder marking where a payload is substituted.
pub const INJECTION_MARKER: &str = "*";

const URL_REGEX: &str = r"^https?://[A-Za-z0-9.-]+\.[A-Za-z]{2,}(?::[0-9]{1,5})?(?:[/?#].*)?$";

static URL_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn url_pattern() -> Option<&'static Regex> {
    URL_PATTERN
        .get_or_init(|| Regex::new(URL_REGEX).ok())
        .as_ref()
}

/// Why a target was excluded from scanning. Never fatal to the run.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SkipReason {
    #[error("Invalid URL skipped")]
    InvalidUrl,

    #[error("URL skipped: No query parameters found")]
    NoQueryParameters,

    #[error("URL skipped: No * found in query parameters")]
    NoInjectionMarker,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub values: Vec<String>,
}

impl Parameter {
    pub fn is_marked(&self) -> bool {
        self.values.iter().any(|v| v.contains(INJECTION_MARKER))
    }
}

/// Query parameters in first-seen order. A repeated key keeps all of its
/// values, in order, under a single entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParameterMap {
    params: Vec<Parameter>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, value: String) {
        match self.params.iter_mut().find(|p| p.name == name) {
            Some(param) => param.values.push(value),
            None => self.params.push(Parameter {
                name: name.to_string(),
                values: vec![value],
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn get(&self, name: &str) -> Option<&[String]> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.values.as_slice())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.params.iter()
    }

    pub fn marked(&self) -> Vec<&Parameter> {
        self.params.iter().filter(|p| p.is_marked()).collect()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Renders as `{name: ["v1", "v2"], ...}`.
impl fmt::Display for ParameterMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {:?}", param.name, param.values)?;
        }
        f.write_str("}")
    }
}

impl<'a> IntoIterator for &'a ParameterMap {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A validated target split into the part before `?` and its parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetUrl {
    pub original: String,
    pub base: String,
    pub params: ParameterMap,
}

impl TargetUrl {
    pub fn parse(raw: &str) -> Result<Self, SkipReason> {
        let original = raw.trim();
        if !is_valid_url(original) {
            return Err(SkipReason::InvalidUrl);
        }
        let (base, params) = decompose(original);
        if params.is_empty() {
            return Err(SkipReason::NoQueryParameters);
        }
        Ok(Self {
            original: original.to_string(),
            base,
            params,
        })
    }
}

/// Simplified absolute-URL check: http(s) scheme, a host whose last label
/// is at least two letters, optional port, then anything starting with
/// `/`, `?` or `#`.
pub fn is_valid_url(s: &str) -> bool {
    url_pattern().is_some_and(|re| re.is_match(s))
}

pub fn decompose(url: &str) -> (String, ParameterMap) {
    let mut params = ParameterMap::new();
    let Some((base, rest)) = url.split_once('?') else {
        return (url.to_string(), params);
    };
    let query = rest.split_once('#').map(|(q, _)| q).unwrap_or(rest);

    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = form_decode(raw_key);
        if key.is_empty() {
            continue;
        }
        params.push(&key, form_decode(raw_value));
    }

    (base.to_string(), params)
}

fn form_decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}
