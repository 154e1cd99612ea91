//! Utility functions.

pub mod calc;
pub mod reminder_parser;

/// Telegram rejects messages longer than 4096 characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// One unit of Telegram HTML: a tag, or a visible character or entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece<'a> {
    Open { name: &'a str, raw: &'a str },
    Close { name: &'a str, raw: &'a str },
    Text(&'a str),
}

impl Piece<'_> {
    fn is_break(&self) -> bool {
        matches!(self, Piece::Text("\n" | " "))
    }
}

fn tag_name(raw: &str) -> &str {
    raw.trim_start_matches(['<', '/'])
        .split(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .next()
        .unwrap_or("")
}

fn pieces(text: &str) -> Vec<Piece<'_>> {
    let mut out = Vec::new();
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];
        let markup = if rest.starts_with('<') {
            rest.find('>').map(|end| end + 1)
        } else if rest.starts_with('&') {
            rest.find(';')
                .filter(|&end| (2..=10).contains(&end))
                .filter(|&end| rest[1..end].chars().all(|c| c.is_ascii_alphanumeric() || c == '#'))
                .map(|end| end + 1)
        } else {
            None
        };
        let len = markup.unwrap_or_else(|| rest.chars().next().map_or(1, char::len_utf8));
        let raw = &rest[..len];

        out.push(if len > 1 && raw.starts_with("</") {
            Piece::Close {
                name: tag_name(raw),
                raw,
            }
        } else if len > 1 && raw.starts_with('<') {
            Piece::Open {
                name: tag_name(raw),
                raw,
            }
        } else {
            Piece::Text(raw)
        });
        i += len;
    }
    out
}

/// Where a chunk may be cut: chunk length, tags open there, piece to resume at.
struct Cut<'a> {
    len: usize,
    open: Vec<(&'a str, &'a str)>,
    resume: usize,
}

/// Split Telegram HTML into chunks of at most `max_chars` visible characters.
///
/// Tags and entities are never cut. Tags still open at a cut are closed at
/// the end of the chunk and reopened at the start of the next one. Prefers to
/// break at the last newline or space inside each chunk.
pub fn split_html(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let pieces = pieces(text);

    let mut chunks = Vec::new();
    let mut chunk = String::new();
    let mut open: Vec<(&str, &str)> = Vec::new();
    let mut visible = 0;
    let mut last_break: Option<Cut> = None;
    let mut trim = false;
    let mut i = 0;

    while i < pieces.len() {
        let piece = pieces[i];
        match piece {
            Piece::Open { name, raw } => {
                chunk.push_str(raw);
                open.push((name, raw));
            }
            Piece::Close { name, raw } => {
                chunk.push_str(raw);
                if let Some(pos) = open.iter().rposition(|(n, _)| *n == name) {
                    open.truncate(pos);
                }
            }
            Piece::Text(_) if trim && piece.is_break() => {}
            Piece::Text(_) if visible == max_chars => {
                let cut = match last_break.take() {
                    Some(cut) if !piece.is_break() => cut,
                    _ => Cut {
                        len: chunk.len(),
                        open: open.clone(),
                        resume: if piece.is_break() { i + 1 } else { i },
                    },
                };

                chunk.truncate(cut.len);
                for (name, _) in cut.open.iter().rev() {
                    chunk.push_str(&format!("</{name}>"));
                }
                chunks.push(std::mem::take(&mut chunk));

                for (_, raw) in &cut.open {
                    chunk.push_str(raw);
                }
                open = cut.open;
                visible = 0;
                trim = true;
                i = cut.resume;
                continue;
            }
            Piece::Text(raw) => {
                if piece.is_break() && visible > 0 {
                    last_break = Some(Cut {
                        len: chunk.len(),
                        open: open.clone(),
                        resume: i + 1,
                    });
                }
                chunk.push_str(raw);
                visible += 1;
                trim = false;
            }
        }
        i += 1;
    }

    if visible > 0 || chunks.is_empty() {
        chunks.push(chunk);
    }
    chunks
}

/// Cut `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}
