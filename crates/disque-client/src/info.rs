use std::collections::HashMap;

/// Parses the text returned by `INFO` into a field map.
///
/// The reply is a series of `field:value` lines grouped under `# Section`
/// headers. Headers, blank lines and lines without a `:` are skipped. Values
/// keep any further `:` characters, e.g. `tcp_port:7711` and
/// `executable:/usr/bin/disque-server` both parse.
///
/// # Example
///
/// ```rust
/// use disque_client::parse_info;
///
/// let info = parse_info("# Server\r\nloading:0\r\nregistered_jobs:3\r\n");
/// assert_eq!(info["loading"], "0");
/// assert_eq!(info["registered_jobs"], "3");
/// ```
pub fn parse_info(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .filter(|(field, _)| !field.is_empty())
        .map(|(field, value)| (field.to_string(), value.to_string()))
        .collect()
}
