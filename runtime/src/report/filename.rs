//! Deterministic artifact names derived from target URLs.

/// Snake-case a target identifier into a file stem.
///
/// Words break on any non-alphanumeric character, between letters and
/// digits, and at lower-to-upper case changes (`XMLHttp` -> `xml_http`).
pub fn snake_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            flush(&mut current, &mut words);
            continue;
        }

        if !current.is_empty() {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            let digit_edge = prev.is_numeric() != c.is_numeric();
            let camel_edge = prev.is_lowercase() && c.is_uppercase();
            let acronym_edge = prev.is_uppercase()
                && c.is_uppercase()
                && next.is_some_and(|n| n.is_lowercase());
            if digit_edge || camel_edge || acronym_edge {
                flush(&mut current, &mut words);
            }
        }
        current.push(c);
    }
    flush(&mut current, &mut words);

    words.join("_")
}

fn flush(current: &mut String, words: &mut Vec<String>) {
    if !current.is_empty() {
        words.push(current.to_lowercase());
        current.clear();
    }
}
