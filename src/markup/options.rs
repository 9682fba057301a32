//! Command and environment option parsing.
//!
//! Options appear in square brackets as `key=value` items separated by
//! commas: `\cmd[draft,width=10]{...}`. A key with no value maps to itself.
//! Doubling a separator escapes it: `a==b=c` is the key `a=b` with value
//! `c`, and `x,,y` is the literal text `x,y`.

use std::collections::BTreeMap;

/// Parsed options of a command or environment header.
pub type OptionsMap = BTreeMap<String, String>;

/// Parses an option string with the default `=` / `,` separators.
pub fn parse_options(input: &str) -> OptionsMap {
    parse_options_with(input, '=', ',')
}

/// Parses an option string with explicit key and item separators.
pub fn parse_options_with(input: &str, keysep: char, itemsep: char) -> OptionsMap {
    let chars: Vec<char> = input.chars().collect();
    let mut opts = OptionsMap::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_key = true;

    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();
        if ch == keysep && in_key {
            if next == Some(keysep) {
                key.push(keysep);
                i += 2;
                continue;
            }
            in_key = false;
            i += 1;
            continue;
        }
        if ch == itemsep {
            if next == Some(itemsep) {
                if in_key {
                    key.push(itemsep);
                } else {
                    value.push(itemsep);
                }
                i += 2;
                continue;
            }
            finish_entry(&mut opts, &mut key, &mut value, &mut in_key);
            i += 1;
            continue;
        }
        if in_key {
            key.push(ch);
        } else {
            value.push(ch);
        }
        i += 1;
    }
    finish_entry(&mut opts, &mut key, &mut value, &mut in_key);
    opts
}

fn finish_entry(opts: &mut OptionsMap, key: &mut String, value: &mut String, in_key: &mut bool) {
    if *in_key {
        // Key-only entry: the key maps to itself.
        if !key.is_empty() {
            opts.insert(key.clone(), key.clone());
        }
    } else {
        opts.insert(std::mem::take(key), std::mem::take(value));
    }
    key.clear();
    value.clear();
    *in_key = true;
}

/// Writes an options map back to its bracket-string form, re-escaping
/// separators by doubling. Key-only entries print as the bare key.
pub fn write_options(opts: &OptionsMap) -> String {
    let escape = |s: &str| s.replace('=', "==").replace(',', ",,");
    opts.iter()
        .map(|(k, v)| {
            if k == v {
                escape(k)
            } else {
                format!("{}={}", escape(k), escape(v))
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_pairs() {
        let opts = parse_options("key1=value1,key2=value2");
        assert_eq!(opts.get("key1").map(String::as_str), Some("value1"));
        assert_eq!(opts.get("key2").map(String::as_str), Some("value2"));
        assert_eq!(opts.len(), 2);
    }

    #[test]
    fn key_only_entry_maps_to_itself() {
        let opts = parse_options("draft,width=10");
        assert_eq!(opts.get("draft").map(String::as_str), Some("draft"));
        assert_eq!(opts.get("width").map(String::as_str), Some("10"));
    }

    #[test]
    fn doubled_separators_are_escapes() {
        let opts = parse_options("a==b=c");
        assert_eq!(opts.get("a=b").map(String::as_str), Some("c"));
        let opts = parse_options("x,,y=1");
        assert_eq!(opts.get("x,y").map(String::as_str), Some("1"));
        let opts = parse_options("k=1,,2");
        assert_eq!(opts.get("k").map(String::as_str), Some("1,2"));
    }

    #[test]
    fn empty_input_yields_no_options() {
        assert!(parse_options("").is_empty());
    }

    #[test]
    fn options_round_trip_through_writer() {
        let source = "a==b=c,draft,width=10";
        let opts = parse_options(source);
        let written = write_options(&opts);
        assert_eq!(parse_options(&written), opts);
    }
}
