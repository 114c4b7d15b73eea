//! Best-effort parsing of truncated JSON fragments.
//!
//! Tool-call arguments arrive as an accumulating JSON string that is a
//! prefix of eventual valid JSON. [`parse_partial`] reconstructs the value
//! parsed so far: exact parse first, then a minimal completion that closes
//! an unterminated value string and any open structures. Trailing tokens
//! that cannot be completed without guessing (partial keys, bare numeric or
//! literal tokens) are dropped back to the last committed element.
//!
//! Pure and synchronous; called on every input delta. Never panics; any
//! unrecoverable fragment yields `None`.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Key,
    Colon,
    Value,
    CommaOrEnd,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    container: Container,
    expect: Expect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StringRole {
    Key,
    Value,
}

/// Parses a possibly-truncated JSON fragment into the best-effort value.
///
/// A syntactically complete fragment parses identically to `serde_json`.
/// Otherwise the fragment is completed by closing the current value string
/// (if any) and then every open container in reverse order of opening. A
/// trailing partial key, a dangling `"key":` with no value, or a partial
/// numeric/literal token causes truncation to the last committed element
/// rather than a guessed value. Returns `None` for empty input, a dangling
/// escape, or anything else unrecoverable.
pub fn parse_partial(fragment: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(fragment) {
        return Some(value);
    }

    let scan = scan(fragment)?;

    // Unterminated value string: force-close it and everything above it.
    if scan.in_string == Some(StringRole::Value) {
        let mut candidate = String::with_capacity(fragment.len() + scan.open_closers.len() + 1);
        candidate.push_str(fragment);
        candidate.push('"');
        candidate.push_str(&scan.open_closers);
        return serde_json::from_str(&candidate).ok();
    }

    // Fragment ends cleanly after a committed element: close open containers.
    if scan.in_string.is_none() && !scan.in_primitive && scan.expect_comma_or_end {
        let mut candidate = String::with_capacity(fragment.len() + scan.open_closers.len());
        candidate.push_str(fragment);
        candidate.push_str(&scan.open_closers);
        return serde_json::from_str(&candidate).ok();
    }

    // Partial key, dangling colon, or partial primitive: drop back to the
    // last committed element and close from there.
    let (cut, closers) = scan.last_safe?;
    let mut candidate = String::with_capacity(cut + closers.len());
    candidate.push_str(&fragment[..cut]);
    candidate.push_str(&closers);
    serde_json::from_str(&candidate).ok()
}

/// Typed convenience over [`parse_partial`].
pub fn parse_partial_as<T: serde::de::DeserializeOwned>(fragment: &str) -> Option<T> {
    parse_partial(fragment).and_then(|value| serde_json::from_value(value).ok())
}

struct Scan {
    /// Unterminated string at end of fragment, and its role.
    in_string: Option<StringRole>,
    /// Fragment ends inside a numeric/literal token.
    in_primitive: bool,
    /// Innermost open container is positioned after a complete element.
    expect_comma_or_end: bool,
    /// Closers for the containers open at end of fragment, innermost first.
    open_closers: String,
    /// Byte offset just past the last committed element (or container
    /// opening) and the closers valid at that point.
    last_safe: Option<(usize, String)>,
}

#[allow(clippy::too_many_lines)]
fn scan(fragment: &str) -> Option<Scan> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut in_string: Option<StringRole> = None;
    let mut in_primitive = false;
    // 0 = no escape pending; 1 = after backslash; 2..=5 = inside \uXXXX.
    let mut escape_pending = 0u8;
    let mut last_safe: Option<(usize, String)> = None;

    let closers = |stack: &[Frame]| -> String {
        stack
            .iter()
            .rev()
            .map(|frame| match frame.container {
                Container::Object => '}',
                Container::Array => ']',
            })
            .collect()
    };

    let mut chars = fragment.char_indices().peekable();
    while let Some((i, ch)) = chars.next() {
        if let Some(role) = in_string {
            match escape_pending {
                1 => {
                    escape_pending = if ch == 'u' { 2 } else { 0 };
                }
                2..=5 => escape_pending += 1,
                _ => match ch {
                    '\\' => escape_pending = 1,
                    '"' => {
                        in_string = None;
                        match role {
                            StringRole::Key => {
                                if let Some(frame) = stack.last_mut() {
                                    frame.expect = Expect::Colon;
                                }
                            }
                            StringRole::Value => {
                                if let Some(frame) = stack.last_mut() {
                                    frame.expect = Expect::CommaOrEnd;
                                }
                                last_safe = Some((i + ch.len_utf8(), closers(&stack)));
                            }
                        }
                    }
                    _ => {}
                },
            }
            if escape_pending == 6 {
                escape_pending = 0;
            }
            continue;
        }

        if in_primitive {
            if matches!(ch, ',' | '}' | ']') || ch.is_ascii_whitespace() {
                in_primitive = false;
                if let Some(frame) = stack.last_mut() {
                    frame.expect = Expect::CommaOrEnd;
                }
                last_safe = Some((i, closers(&stack)));
                // Fall through: the terminator is structural.
            } else {
                continue;
            }
        }

        match ch {
            c if c.is_ascii_whitespace() => {}
            '{' => {
                stack.push(Frame {
                    container: Container::Object,
                    expect: Expect::Key,
                });
                last_safe = Some((i + 1, closers(&stack)));
            }
            '[' => {
                stack.push(Frame {
                    container: Container::Array,
                    expect: Expect::Value,
                });
                last_safe = Some((i + 1, closers(&stack)));
            }
            '}' | ']' => {
                stack.pop()?;
                if let Some(frame) = stack.last_mut() {
                    frame.expect = Expect::CommaOrEnd;
                }
                last_safe = Some((i + 1, closers(&stack)));
            }
            '"' => {
                let role = match stack.last() {
                    Some(Frame {
                        expect: Expect::Key,
                        ..
                    }) => StringRole::Key,
                    _ => StringRole::Value,
                };
                in_string = Some(role);
            }
            ':' => {
                if let Some(frame) = stack.last_mut() {
                    frame.expect = Expect::Value;
                }
            }
            ',' => {
                if let Some(frame) = stack.last_mut() {
                    frame.expect = match frame.container {
                        Container::Object => Expect::Key,
                        Container::Array => Expect::Value,
                    };
                }
            }
            _ => in_primitive = true,
        }
    }

    // A dangling escape (including a partial \uXXXX) is unrecoverable.
    if escape_pending != 0 {
        return None;
    }

    let expect_comma_or_end = stack
        .last()
        .is_some_and(|frame| frame.expect == Expect::CommaOrEnd);

    Some(Scan {
        in_string,
        in_primitive,
        expect_comma_or_end,
        open_closers: closers(&stack),
        last_safe,
    })
}
