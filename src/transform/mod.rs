use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Highest number of successive percent-encoding passes applied to a payload.
pub const MAX_ENCODE_DEPTH: u8 = 3;

// Everything except ASCII alphanumerics and `-._~/` is escaped, hex in
// upper case.
const QUOTE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

pub fn percent_encode(input: &str) -> String {
    utf8_percent_encode(input, QUOTE_SET).to_string()
}

/// Applies `percent_encode` `depth` times, each pass over the previous output.
pub fn encode_times(input: &str, depth: u8) -> String {
    (0..depth).fold(input.to_string(), |acc, _| percent_encode(&acc))
}

/// Every encoding of `input` from depth 0 to `max_depth` inclusive.
pub fn encoding_chain(input: &str, max_depth: u8) -> Vec<String> {
    let mut out = Vec::with_capacity(usize::from(max_depth) + 1);
    let mut current = input.to_string();
    for _ in 0..max_depth {
        let next = percent_encode(&current);
        out.push(std::mem::replace(&mut current, next));
    }
    out.push(current);
    out
}
