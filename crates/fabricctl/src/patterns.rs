//! Regex-backed matchers and extractors handed to the core filters.

use std::sync::Arc;

use regex::Regex;

use fabricctl_core::{Extractor, Matcher, SharedMatcher};

use crate::error::CliError;

/// `interface <name>` followed by an indented `description <text>` line.
pub const FREEFORM_DESCRIPTION: &str = r"(?m)^interface\s+(\S+)\s*\n\s+description\s+(.+?)\s*$";

/// Template name of switch-level freeform policies.
pub const FREEFORM_TEMPLATE: &str = "switch_freeform";

#[derive(Debug, Clone)]
struct RegexMatcher(Regex);

impl Matcher for RegexMatcher {
    fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

/// Compile `pattern` for the filter field `field`.
pub fn matcher(pattern: &str, field: &str) -> Result<SharedMatcher, CliError> {
    let regex = Regex::new(pattern)
        .map_err(|e| CliError::validation(field, format!("bad pattern '{pattern}': {e}")))?;
    Ok(Arc::new(RegexMatcher(regex)))
}

/// Compile every pattern given for one field.
pub fn matchers(patterns: &[String], field: &str) -> Result<Vec<SharedMatcher>, CliError> {
    patterns.iter().map(|p| matcher(p, field)).collect()
}

/// Exact template name.
pub fn template_is(name: &'static str) -> impl Matcher + 'static {
    move |text: &str| text == name
}

/// Two-group regex: group 1 names the unit, group 2 is the value.
#[derive(Debug, Clone)]
pub struct RegexExtractor {
    regex: Regex,
}

impl RegexExtractor {
    pub fn new(pattern: &str) -> Result<Self, CliError> {
        let regex = Regex::new(pattern).map_err(|e| {
            CliError::validation("freeform-pattern", format!("bad pattern '{pattern}': {e}"))
        })?;
        if regex.captures_len() < 3 {
            return Err(CliError::validation(
                "freeform-pattern",
                "needs two capture groups: interface name, then description",
            ));
        }
        Ok(Self { regex })
    }
}

impl Extractor for RegexExtractor {
    fn extract(&self, text: &str) -> Vec<(String, String)> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| {
                let unit = caps.get(1)?.as_str().trim();
                let value = caps.get(2)?.as_str().trim();
                (!unit.is_empty()).then(|| (unit.to_owned(), value.to_owned()))
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const FREEFORM: &str = "\
interface Ethernet1/1
  description uplink-a
  no shutdown
interface Ethernet1/2
  mtu 9216
interface Ethernet1/3
  description  server 3 \n";

    #[test]
    fn default_pattern_pairs_interfaces_with_descriptions() {
        let extractor = RegexExtractor::new(FREEFORM_DESCRIPTION).unwrap();
        let pairs = extractor.extract(FREEFORM);
        assert_eq!(
            pairs,
            vec![
                ("Ethernet1/1".to_owned(), "uplink-a".to_owned()),
                ("Ethernet1/3".to_owned(), "server 3".to_owned()),
            ]
        );
    }

    #[test]
    fn extractor_needs_two_groups() {
        let err = RegexExtractor::new(r"interface (\S+)").unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
        assert!(RegexExtractor::new("(").is_err());
    }

    #[test]
    fn matcher_compiles_and_matches() {
        let m = matcher("^int_.*host$", "template").unwrap();
        assert!(m.is_match("int_trunk_host"));
        assert!(!m.is_match("switch_freeform"));
        assert!(matcher("[", "template").is_err());
        assert!(template_is(FREEFORM_TEMPLATE).is_match("switch_freeform"));
    }
}
