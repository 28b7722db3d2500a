//! Low-level helpers for directive lines: comment prefix detection, quoted
//! descriptions, and bracketed number groups.

/// A bare number or a bracketed group of items.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Item {
    Number(f64),
    Group(Vec<Item>),
}

impl Item {
    /// Numbers of a group without nested groups.
    pub(crate) fn flat_numbers(items: &[Item]) -> Option<Vec<f64>> {
        items
            .iter()
            .map(|item| match item {
                Item::Number(value) => Some(*value),
                Item::Group(_) => None,
            })
            .collect()
    }
}

/// Returns the text after `// <keyword>` when `line` is such a directive.
pub(crate) fn directive_body<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.trim_start().strip_prefix("//")?.trim_start();
    let rest = rest.strip_prefix(keyword)?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

/// Splits the first quoted string out of `body`.
///
/// An unterminated quote runs to the end of the line.
pub(crate) fn split_description(body: &str) -> (String, Option<String>) {
    let Some(start) = body.find('"') else {
        return (body.to_string(), None);
    };
    let after = &body[start + 1..];
    match after.find('"') {
        Some(end) => {
            let mut remaining = String::with_capacity(body.len());
            remaining.push_str(&body[..start]);
            remaining.push(' ');
            remaining.push_str(&after[end + 1..]);
            (remaining, Some(after[..end].to_string()))
        }
        None => (body[..start].to_string(), Some(after.to_string())),
    }
}

/// Splits off the first whitespace-delimited word.
pub(crate) fn next_word(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }
    let end = text.find(char::is_whitespace).unwrap_or(text.len());
    Some((&text[..end], &text[end..]))
}

/// Parses a number field; anything malformed reads as 0.
pub(crate) fn parse_number(raw: &str) -> f64 {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix(['f', 'F']).unwrap_or(trimmed);
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

/// Tokenizes numbers and bracket groups. Returns `None` on unbalanced brackets.
pub(crate) fn tokenize(text: &str) -> Option<Vec<Item>> {
    let mut chars = text.chars().peekable();
    parse_items(&mut chars, false)
}

fn parse_items(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    nested: bool,
) -> Option<Vec<Item>> {
    let mut items = Vec::new();
    loop {
        match chars.peek().copied() {
            None => return if nested { None } else { Some(items) },
            Some(ch) if ch.is_whitespace() || ch == ',' => {
                chars.next();
            }
            Some('[') => {
                chars.next();
                items.push(Item::Group(parse_items(chars, true)?));
            }
            Some(']') => {
                chars.next();
                return if nested { Some(items) } else { None };
            }
            Some(_) => {
                let mut token = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || matches!(ch, ',' | '[' | ']') {
                        break;
                    }
                    token.push(ch);
                    chars.next();
                }
                items.push(Item::Number(parse_number(&token)));
            }
        }
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_body_requires_keyword_boundary() {
        assert_eq!(directive_body("  // @param a float", "@param"), Some("a float"));
        assert_eq!(directive_body("//@param a float", "@param"), Some("a float"));
        assert_eq!(directive_body("// @params a float", "@param"), None);
        assert_eq!(directive_body("float x; // @param a", "@param"), None);
    }

    #[test]
    fn description_is_removed_from_body() {
        let (rest, description) = split_description(r#"speed float 1.0 "Speed" [0, 2]"#);
        assert_eq!(description.as_deref(), Some("Speed"));
        assert!(!rest.contains('"'));
        assert!(rest.contains("[0, 2]"));
    }

    #[test]
    fn tokenize_handles_nested_groups() {
        let items = tokenize("[[1, 2], [3, 4]] 5").unwrap();
        assert_eq!(
            items,
            vec![
                Item::Group(vec![
                    Item::Group(vec![Item::Number(1.0), Item::Number(2.0)]),
                    Item::Group(vec![Item::Number(3.0), Item::Number(4.0)]),
                ]),
                Item::Number(5.0),
            ]
        );
        assert!(tokenize("[1, 2").is_none());
        assert!(tokenize("1, 2]").is_none());
    }

    #[test]
    fn malformed_numbers_read_as_zero() {
        assert_eq!(parse_number("abc"), 0.0);
        assert_eq!(parse_number("1.5f"), 1.5);
        assert_eq!(parse_number("inf"), 0.0);
    }
}
