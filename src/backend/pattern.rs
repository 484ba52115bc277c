//! Regex backend — whole-match extraction plus capture rows for `$N`
//! backreferences in later rules.

use regex::Regex;

/// Runs `re` over `text` and returns every whole match, along with the
/// capture row of the first match (group 0 first, unmatched groups as
/// empty strings). The caller stashes the row in the execution context so
/// a later rule can splice `$1`, `$2`, ... into its body.
pub fn evaluate(re: &Regex, text: &str) -> (Vec<String>, Option<Vec<String>>) {
    let matches: Vec<String> = re.find_iter(text).map(|m| m.as_str().to_string()).collect();
    let captures = re.captures(text).map(|caps| {
        (0..caps.len())
            .map(|i| caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect()
    });
    (matches, captures)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_matches_returned() {
        let re = Regex::new(r"\d+").unwrap();
        let (matches, _) = evaluate(&re, "a1 b22 c333");
        assert_eq!(matches, vec!["1", "22", "333"]);
    }

    #[test]
    fn test_capture_row_from_first_match() {
        let re = Regex::new(r"(\w+)=(\d+)").unwrap();
        let (matches, caps) = evaluate(&re, "x=1 y=2");
        assert_eq!(matches, vec!["x=1", "y=2"]);
        assert_eq!(caps.unwrap(), vec!["x=1", "x", "1"]);
    }

    #[test]
    fn test_unmatched_group_is_empty() {
        let re = Regex::new(r"(a)(b)?").unwrap();
        let (_, caps) = evaluate(&re, "ac");
        assert_eq!(caps.unwrap(), vec!["a", "a", ""]);
    }

    #[test]
    fn test_no_match() {
        let re = Regex::new(r"\d").unwrap();
        let (matches, caps) = evaluate(&re, "none");
        assert!(matches.is_empty());
        assert!(caps.is_none());
    }
}
