//! Lightweight markdown renderer for terminal output.
//!
//! Handles the subset of markdown that chat models actually produce:
//! - `# Heading` through `#### Heading`
//! - `**bold**` (markers dropped)
//! - `- bullet` and `* bullet` list items
//! - `[text](url)` links
//! - `` `inline code` ``
//! - Paragraphs separated by blank lines

/// Render markdown into plain terminal text, one output line per input line.
pub fn render_markdown(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            out.push(String::new());
            continue;
        }

        // Top two heading levels get an underline
        if let Some(rest) = trimmed.strip_prefix("# ") {
            let heading = render_inline(rest);
            let width = heading.chars().count();
            out.push(heading);
            out.push("═".repeat(width));
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("## ") {
            let heading = render_inline(rest);
            let width = heading.chars().count();
            out.push(heading);
            out.push("─".repeat(width));
            continue;
        }
        if let Some(rest) = trimmed
            .strip_prefix("#### ")
            .or_else(|| trimmed.strip_prefix("### "))
        {
            out.push(render_inline(rest));
            continue;
        }

        let bullet = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "));
        if let Some(rest) = bullet {
            out.push(format!("  • {}", render_inline(rest)));
            continue;
        }

        out.push(render_inline(trimmed));
    }

    out.join("\n")
}

/// Render a single line with inline formatting: **bold**, `code`, [links](url).
fn render_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut remaining = text;

    while !remaining.is_empty() {
        match find_next_marker(remaining) {
            None => {
                out.push_str(remaining);
                break;
            }
            Some((pos, MarkerKind::Bold)) => {
                out.push_str(&remaining[..pos]);
                remaining = &remaining[pos + 2..]; // skip **
                if let Some(end) = remaining.find("**") {
                    out.push_str(&remaining[..end]);
                    remaining = &remaining[end + 2..];
                } else {
                    // No closing **, emit as-is
                    out.push_str("**");
                    out.push_str(remaining);
                    break;
                }
            }
            Some((pos, MarkerKind::Code)) => {
                out.push_str(&remaining[..pos]);
                remaining = &remaining[pos + 1..]; // skip `
                if let Some(end) = remaining.find('`') {
                    out.push('\'');
                    out.push_str(&remaining[..end]);
                    out.push('\'');
                    remaining = &remaining[end + 1..];
                } else {
                    out.push('`');
                    out.push_str(remaining);
                    break;
                }
            }
            Some((pos, MarkerKind::Link)) => {
                out.push_str(&remaining[..pos]);
                remaining = &remaining[pos + 1..]; // skip [
                let Some(close_bracket) = remaining.find("](") else {
                    out.push('[');
                    out.push_str(remaining);
                    break;
                };
                let link_text = &remaining[..close_bracket];
                let after = &remaining[close_bracket + 2..]; // skip ](
                if let Some(close_paren) = after.find(')') {
                    let url = &after[..close_paren];
                    if link_text == url || link_text.is_empty() {
                        out.push_str(url);
                    } else {
                        out.push_str(&format!("{} <{}>", link_text, url));
                    }
                    remaining = &after[close_paren + 1..];
                } else {
                    // Malformed, emit as-is
                    out.push('[');
                    out.push_str(remaining);
                    break;
                }
            }
        }
    }

    out
}

#[derive(Debug)]
enum MarkerKind {
    Bold, // **
    Code, // `
    Link, // [
}

/// Find the next inline marker in the text.
fn find_next_marker(text: &str) -> Option<(usize, MarkerKind)> {
    let mut best: Option<(usize, MarkerKind)> = None;

    let mut consider = |pos: usize, kind: MarkerKind| {
        if best.as_ref().map_or(true, |(b, _)| pos < *b) {
            best = Some((pos, kind));
        }
    };

    if let Some(pos) = text.find("**") {
        consider(pos, MarkerKind::Bold);
    }
    if let Some(pos) = text.find('`') {
        consider(pos, MarkerKind::Code);
    }
    if let Some(pos) = text.find('[') {
        // Only a link if followed by ]( somewhere
        if text[pos..].contains("](") {
            consider(pos, MarkerKind::Link);
        }
    }

    best
}
