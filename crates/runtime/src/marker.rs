//! Tool marker codec.
//!
//! Tool results and errors travel inside the plain-text output of a turn as
//! delimited blocks. Version 1 of the format is:
//!
//! ```text
//! \n\n[MCP Tool: <name>]\n<body>\n[/MCP Tool]\n
//! \n\n[MCP Tool Error: <name>]\n<message>\n
//! ```
//!
//! Error messages are folded onto one line so the trailing newline ends the
//! block. A result body line that would read as a marker line (it starts
//! with `[MCP Tool` or `[/MCP Tool]` after any backslashes) gets one extra
//! leading `\`, which [`decode`] removes again. [`decode`] also reads
//! version 0 result blocks, which had no `[/MCP Tool]` line and ran to the
//! next marker or to the end of input; their bodies are taken verbatim.

use std::borrow::Cow;

const RESULT_OPEN: &str = "\n\n[MCP Tool: ";
const ERROR_OPEN: &str = "\n\n[MCP Tool Error: ";
const RESULT_CLOSE: &str = "\n[/MCP Tool]\n";
const HEADER_END: &str = "]\n";
const RESERVED_LINES: [&str; 2] = ["[MCP Tool", "[/MCP Tool]"];

/// A decoded piece of turn output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    ToolResult { name: String, body: String },
    ToolError { name: String, message: String },
}

/// Render a result block.
pub fn result_marker(name: &str, body: &str) -> String {
    format!(
        "{RESULT_OPEN}{}{HEADER_END}{}{RESULT_CLOSE}",
        header_name(name),
        escape_body(body)
    )
}

/// Render an error block.
pub fn error_marker(name: &str, message: &str) -> String {
    format!(
        "{ERROR_OPEN}{}{HEADER_END}{}\n",
        header_name(name),
        fold_lines(message)
    )
}

/// Render segments to the wire text.
pub fn encode(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::ToolResult { name, body } => out.push_str(&result_marker(name, body)),
            Segment::ToolError { name, message } => out.push_str(&error_marker(name, message)),
        }
    }
    out
}

/// Split turn output back into narrative text and tool blocks.
///
/// Adjacent text is coalesced and empty text is dropped, so
/// `decode(&encode(s))` equals `s` up to that normalisation.
pub fn decode(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = input;

    while let Some(found) = next_marker(rest) {
        push_text(&mut segments, &rest[..found.start]);
        let body_start = &rest[found.body_start..];
        rest = match found.kind {
            MarkerKind::Result => {
                let next = next_marker(body_start).map(|m| m.start);
                match body_start.find(RESULT_CLOSE) {
                    Some(end) if next.is_none_or(|n| end <= n) => {
                        segments.push(Segment::ToolResult {
                            name: found.name,
                            body: unescape_body(&body_start[..end]),
                        });
                        &body_start[end + RESULT_CLOSE.len()..]
                    }
                    _ => {
                        let end = next.unwrap_or(body_start.len());
                        segments.push(Segment::ToolResult {
                            name: found.name,
                            body: body_start[..end].to_string(),
                        });
                        &body_start[end..]
                    }
                }
            }
            MarkerKind::Error => {
                let (message, remaining) = match body_start.find('\n') {
                    Some(end) => (&body_start[..end], &body_start[end + 1..]),
                    None => (body_start, ""),
                };
                segments.push(Segment::ToolError {
                    name: found.name,
                    message: message.to_string(),
                });
                remaining
            }
        };
    }

    push_text(&mut segments, rest);
    segments
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Result,
    Error,
}

#[derive(Debug)]
struct Found {
    kind: MarkerKind,
    name: String,
    start: usize,
    body_start: usize,
}

/// Locate the earliest well-formed marker header in `s`.
fn next_marker(s: &str) -> Option<Found> {
    let mut from = 0;
    loop {
        let result = s[from..].find(RESULT_OPEN).map(|i| (i + from, MarkerKind::Result));
        let error = s[from..].find(ERROR_OPEN).map(|i| (i + from, MarkerKind::Error));
        let (start, kind) = match (result, error) {
            (Some(r), Some(e)) => {
                if r.0 <= e.0 {
                    r
                } else {
                    e
                }
            }
            (Some(r), None) => r,
            (None, Some(e)) => e,
            (None, None) => return None,
        };

        let open_len = match kind {
            MarkerKind::Result => RESULT_OPEN.len(),
            MarkerKind::Error => ERROR_OPEN.len(),
        };
        let name_start = start + open_len;
        if let Some(len) = header_len(&s[name_start..]) {
            return Some(Found {
                kind,
                name: s[name_start..name_start + len].to_string(),
                start,
                body_start: name_start + len + HEADER_END.len(),
            });
        }
        // Not a real header; keep looking past the opening.
        from = start + 2;
    }
}

/// Length of a tool name terminated by `]\n` on the same line.
fn header_len(s: &str) -> Option<usize> {
    let end = s.find(HEADER_END)?;
    let name = &s[..end];
    (!name.is_empty() && !name.contains('\n')).then_some(end)
}

fn header_name(name: &str) -> String {
    name.replace(['\n', '\r', ']'], " ")
}

fn is_reserved(line: &str) -> bool {
    let bare = line.trim_start_matches('\\');
    RESERVED_LINES.iter().any(|prefix| bare.starts_with(prefix))
}

fn escape_body(body: &str) -> Cow<'_, str> {
    if !body.split('\n').any(is_reserved) {
        return Cow::Borrowed(body);
    }
    let lines: Vec<String> = body
        .split('\n')
        .map(|line| {
            if is_reserved(line) {
                format!("\\{line}")
            } else {
                line.to_string()
            }
        })
        .collect();
    Cow::Owned(lines.join("\n"))
}

fn unescape_body(body: &str) -> String {
    body.split('\n')
        .map(|line| match line.strip_prefix('\\') {
            Some(stripped) if is_reserved(line) => stripped,
            _ => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn fold_lines(message: &str) -> String {
    message
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Segment::Text(prev)) = segments.last_mut() {
        prev.push_str(text);
    } else {
        segments.push(Segment::Text(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Segment {
        Segment::Text(s.to_string())
    }

    fn result(name: &str, body: &str) -> Segment {
        Segment::ToolResult {
            name: name.to_string(),
            body: body.to_string(),
        }
    }

    fn error(name: &str, message: &str) -> Segment {
        Segment::ToolError {
            name: name.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn literal_format() {
        assert_eq!(
            result_marker("weather", "22C"),
            "\n\n[MCP Tool: weather]\n22C\n[/MCP Tool]\n"
        );
        assert_eq!(
            error_marker("weather", "server not connected: s1"),
            "\n\n[MCP Tool Error: weather]\nserver not connected: s1\n"
        );
    }

    #[test]
    fn error_message_is_folded() {
        assert_eq!(
            error_marker("t", "line one\r\nline two\n"),
            "\n\n[MCP Tool Error: t]\nline one line two\n"
        );
    }

    #[test]
    fn round_trip() {
        let segments = vec![
            text("Hello "),
            result("weather", "22C\nsunny"),
            text("It is warm."),
            error("search", "tool not found: search"),
            text(" world"),
            result("empty", ""),
        ];
        assert_eq!(decode(&encode(&segments)), segments);
    }

    #[test]
    fn marker_lines_in_results_survive() {
        let body = "see below\n[/MCP Tool]\n\n[MCP Tool Error: x]\nboom\n\\[MCP Tool: y]";
        assert_eq!(
            result_marker("fetch", body),
            "\n\n[MCP Tool: fetch]\nsee below\n\\[/MCP Tool]\n\n\\[MCP Tool Error: x]\nboom\n\\\\[MCP Tool: y]\n[/MCP Tool]\n"
        );

        let segments = vec![text("a"), result("fetch", body), text("b")];
        assert_eq!(decode(&encode(&segments)), segments);
    }

    #[test]
    fn adjacent_text_coalesces() {
        let segments = vec![text("a"), text("b"), result("t", "x"), text(""), text("c")];
        assert_eq!(
            decode(&encode(&segments)),
            vec![text("ab"), result("t", "x"), text("c")]
        );
    }

    #[test]
    fn decodes_unterminated_result_blocks() {
        let input = "Hi\n\n[MCP Tool: a]\nfirst\n\n[MCP Tool: b]\nsecond and the rest";
        assert_eq!(
            decode(input),
            vec![
                text("Hi"),
                result("a", "first"),
                result("b", "second and the rest"),
            ]
        );
    }

    #[test]
    fn unterminated_result_stops_at_error_marker() {
        let input = "\n\n[MCP Tool: a]\n22C\n\n[MCP Tool Error: b]\nboom\ntail";
        assert_eq!(
            decode(input),
            vec![result("a", "22C"), error("b", "boom"), text("tail")]
        );
    }

    #[test]
    fn malformed_header_stays_text() {
        let input = "see \n\n[MCP Tool: oops no close\nstill text";
        assert_eq!(decode(input), vec![text(input)]);
    }

    #[test]
    fn plain_text_only() {
        assert_eq!(decode("just words"), vec![text("just words")]);
        assert!(decode("").is_empty());
    }
}
