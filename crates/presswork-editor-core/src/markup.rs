//! HTML-like markup serialization.
//!
//! The writer emits a compact, canonical form: no whitespace between blocks,
//! marks nested in [`Mark`] order, alignment as an inline `text-align` style,
//! and images as `<img src width height alt />`. The reader accepts that form
//! plus the looser markup of older articles (unclosed list items, `<b>`/`<i>`
//! synonyms, stray top-level text, images inside paragraphs) and normalizes it,
//! so writing what was read is stable.

use core::fmt;

use pulldown_cmark_escape::{FmtWriter, escape_html, escape_html_body_text};

use crate::node::{AssetRef, Block, ImageNode, Inline, Mark, TextAlign, TextRun};

/// Displays blocks as markup.
pub struct Markup<'a>(pub &'a [Block]);

impl fmt::Display for Markup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|block| write_block(f, block))
    }
}

pub fn to_markup(blocks: &[Block]) -> String {
    Markup(blocks).to_string()
}

fn write_block(f: &mut fmt::Formatter<'_>, block: &Block) -> fmt::Result {
    match block {
        Block::Paragraph { align, content } => {
            f.write_str("<p")?;
            write_align(f, *align)?;
            f.write_str(">")?;
            write_inlines(f, content)?;
            f.write_str("</p>")
        }
        Block::Heading {
            level,
            align,
            content,
        } => {
            let level = (*level).clamp(1, 6);
            write!(f, "<h{level}")?;
            write_align(f, *align)?;
            f.write_str(">")?;
            write_inlines(f, content)?;
            write!(f, "</h{level}>")
        }
        Block::List { ordered, items } => {
            let tag = if *ordered { "ol" } else { "ul" };
            write!(f, "<{tag}>")?;
            items.iter().try_for_each(|item| write_item(f, item))?;
            write!(f, "</{tag}>")
        }
        // An item outside a list gets a list of its own.
        Block::ListItem { .. } => {
            f.write_str("<ul>")?;
            write_item(f, block)?;
            f.write_str("</ul>")
        }
        Block::Image(image) => write_image(f, image),
    }
}

/// One `<li>`. Bare blocks inside a list are written as items of their own.
fn write_item(f: &mut fmt::Formatter<'_>, item: &Block) -> fmt::Result {
    f.write_str("<li>")?;
    match item {
        Block::ListItem { content } => {
            content.iter().try_for_each(|block| write_block(f, block))?
        }
        other => write_block(f, other)?,
    }
    f.write_str("</li>")
}

fn write_align(f: &mut fmt::Formatter<'_>, align: TextAlign) -> fmt::Result {
    match align {
        TextAlign::Left => Ok(()),
        align => write!(f, " style=\"text-align: {}\"", align.as_str()),
    }
}

fn write_image(f: &mut fmt::Formatter<'_>, image: &ImageNode) -> fmt::Result {
    f.write_str("<img src=\"")?;
    escape_html(FmtWriter(&mut *f), &image.src.to_src())?;
    f.write_str("\"")?;
    if let Some(width) = image.width {
        write!(f, " width=\"{width}\"")?;
    }
    if let Some(height) = image.height {
        write!(f, " height=\"{height}\"")?;
    }
    f.write_str(" alt=\"")?;
    escape_html(FmtWriter(&mut *f), &image.alt)?;
    f.write_str("\" />")
}

/// Writes inline content, keeping marks shared by consecutive runs open.
fn write_inlines(f: &mut fmt::Formatter<'_>, content: &[Inline]) -> fmt::Result {
    let mut open: Vec<Mark> = Vec::new();
    for inline in content {
        match inline {
            Inline::HardBreak => f.write_str("<br>")?,
            Inline::Text(run) if run.text.is_empty() => {}
            Inline::Text(run) => {
                let mut marks = run.marks.clone();
                marks.sort();
                marks.dedup();
                let shared = open
                    .iter()
                    .zip(&marks)
                    .take_while(|(a, b)| a == b)
                    .count();
                while open.len() > shared {
                    if let Some(mark) = open.pop() {
                        write!(f, "</{}>", mark.tag())?;
                    }
                }
                for mark in &marks[shared..] {
                    write!(f, "<{}>", mark.tag())?;
                    open.push(*mark);
                }
                escape_html_body_text(FmtWriter(&mut *f), &run.text)?;
            }
        }
    }
    while let Some(mark) = open.pop() {
        write!(f, "</{}>", mark.tag())?;
    }
    Ok(())
}

/// Parse markup into blocks. Never fails: unknown tags are dropped and their
/// content kept.
pub fn from_markup(input: &str) -> Vec<Block> {
    let mut parser = Parser {
        tokens: tokenize(input),
        pos: 0,
        open: Vec::new(),
    };
    parser.parse_blocks(None)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Text(String),
}

impl Token {
    fn attr(&self, key: &str) -> Option<&str> {
        match self {
            Token::Start { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

fn is_block_tag(name: &str) -> bool {
    matches!(
        name,
        "p" | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "ul"
            | "ol"
            | "li"
            | "div"
            | "section"
            | "article"
            | "blockquote"
            | "header"
            | "footer"
    )
}

fn heading_level(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn parse_align(token: &Token) -> TextAlign {
    token
        .attr("style")
        .and_then(|style| {
            style.split(';').find_map(|decl| {
                let (key, value) = decl.split_once(':')?;
                (key.trim() == "text-align")
                    .then(|| TextAlign::parse(value))
                    .flatten()
            })
        })
        .unwrap_or_default()
}

/// Leading digits of a dimension attribute (`"500"`, `"500px"`).
fn parse_dimension(value: Option<&str>) -> Option<u32> {
    let value = value?.trim();
    let digits = value
        .find(|c: char| !c.is_ascii_digit())
        .map_or(value, |end| &value[..end]);
    digits.parse().ok()
}

fn parse_image(token: &Token) -> Option<ImageNode> {
    let src = token.attr("src")?;
    Some(ImageNode {
        src: AssetRef::from_src(src),
        width: parse_dimension(token.attr("width")),
        height: parse_dimension(token.attr("height")),
        alt: token.attr("alt").unwrap_or_default().to_string(),
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open container elements, innermost last.
    open: Vec<String>,
}

enum InlineContainer {
    Paragraph(TextAlign),
    Heading(u8, TextAlign),
}

impl InlineContainer {
    fn block(&self, content: Vec<Inline>) -> Block {
        match *self {
            InlineContainer::Paragraph(align) => Block::Paragraph { align, content },
            InlineContainer::Heading(level, align) => Block::Heading {
                level,
                align,
                content,
            },
        }
    }
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// An end tag closes an enclosing element other than the innermost.
    fn closes_ancestor(&self, name: &str) -> bool {
        self.open.iter().rev().skip(1).any(|open| open == name)
    }

    fn parse_blocks(&mut self, end: Option<&str>) -> Vec<Block> {
        let mut blocks = Vec::new();
        while let Some(token) = self.peek() {
            match token {
                Token::End { name } if Some(name.as_str()) == end => {
                    self.pos += 1;
                    break;
                }
                Token::End { name } if end.is_some() && self.closes_ancestor(name) => break,
                // A new item implicitly closes an unterminated one.
                Token::Start { name, .. } if end == Some("li") && name == "li" => break,
                Token::End { .. } => self.pos += 1,
                Token::Text(text) if text.trim().is_empty() => self.pos += 1,
                Token::Text(_) => {
                    blocks.extend(self.parse_inlines(None, InlineContainer::Paragraph(TextAlign::Left)))
                }
                Token::Start { name, .. } => {
                    let name = name.clone();
                    blocks.extend(self.parse_start(&name));
                }
            }
        }
        blocks
    }

    fn parse_start(&mut self, name: &str) -> Vec<Block> {
        match name {
            "p" => {
                let token = self.next();
                let align = token.as_ref().map(parse_align).unwrap_or_default();
                self.enclosed("p", |p| {
                    p.parse_inlines(Some("p"), InlineContainer::Paragraph(align))
                })
            }
            h if heading_level(h).is_some() => {
                let level = heading_level(h).unwrap_or(1);
                let token = self.next();
                let align = token.as_ref().map(parse_align).unwrap_or_default();
                let tag = h.to_string();
                self.enclosed(h, |p| {
                    p.parse_inlines(Some(&tag), InlineContainer::Heading(level, align))
                })
            }
            "ul" | "ol" => {
                self.pos += 1;
                let ordered = name == "ol";
                let items = self.enclosed(name, |p| p.parse_list_items(name));
                vec![Block::List { ordered, items }]
            }
            "li" => {
                // Item outside any list.
                self.pos += 1;
                let content = self.enclosed("li", |p| p.parse_blocks(Some("li")));
                vec![Block::List {
                    ordered: false,
                    items: vec![Block::ListItem { content }],
                }]
            }
            "img" => {
                let token = self.next();
                token
                    .as_ref()
                    .and_then(parse_image)
                    .map(Block::Image)
                    .into_iter()
                    .collect()
            }
            other if is_block_tag(other) => {
                self.pos += 1;
                let tag = other.to_string();
                self.enclosed(other, |p| p.parse_blocks(Some(&tag)))
            }
            _ => self.parse_inlines(None, InlineContainer::Paragraph(TextAlign::Left)),
        }
    }

    fn enclosed<T>(&mut self, name: &str, f: impl FnOnce(&mut Self) -> T) -> T {
        self.open.push(name.to_string());
        let out = f(self);
        self.open.pop();
        out
    }

    fn parse_list_items(&mut self, list_tag: &str) -> Vec<Block> {
        let mut items = Vec::new();
        while let Some(token) = self.peek() {
            match token {
                Token::End { name } if name == list_tag => {
                    self.pos += 1;
                    break;
                }
                Token::End { name } if self.closes_ancestor(name) => break,
                Token::End { .. } => self.pos += 1,
                Token::Text(text) if text.trim().is_empty() => self.pos += 1,
                Token::Start { name, .. } if name == "li" => {
                    self.pos += 1;
                    let content = self.enclosed("li", |p| p.parse_blocks(Some("li")));
                    items.push(Block::ListItem { content });
                }
                Token::Text(_) => {
                    let content =
                        self.parse_inlines(None, InlineContainer::Paragraph(TextAlign::Left));
                    items.push(Block::ListItem { content });
                }
                Token::Start { name, .. } => {
                    let name = name.clone();
                    let content = self.parse_start(&name);
                    if !content.is_empty() {
                        items.push(Block::ListItem { content });
                    }
                }
            }
        }
        items
    }

    /// Parse inline content into one block, or several if images split it.
    ///
    /// With `end == None` the run is implicit and stops at the first block
    /// element.
    fn parse_inlines(&mut self, end: Option<&str>, container: InlineContainer) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut content: Vec<Inline> = Vec::new();
        let mut marks: Vec<Mark> = Vec::new();
        let mut split = false;

        while let Some(token) = self.peek() {
            match token {
                Token::End { name } if Some(name.as_str()) == end => {
                    self.pos += 1;
                    break;
                }
                Token::End { name } if is_block_tag(name) => break,
                Token::Start { name, .. } if is_block_tag(name) => break,
                Token::End { name } => {
                    if let Some(mark) = Mark::from_tag(name) {
                        if let Some(i) = marks.iter().rposition(|m| *m == mark) {
                            marks.remove(i);
                        }
                    }
                    self.pos += 1;
                }
                Token::Text(text) => {
                    let mut active = marks.clone();
                    active.sort();
                    active.dedup();
                    push_text(&mut content, text, active);
                    self.pos += 1;
                }
                Token::Start { name, .. } => {
                    if let Some(mark) = Mark::from_tag(name) {
                        marks.push(mark);
                        self.pos += 1;
                    } else if name == "br" {
                        content.push(Inline::HardBreak);
                        self.pos += 1;
                    } else if name == "img" {
                        let token = self.next();
                        if let Some(image) = token.as_ref().and_then(parse_image) {
                            if !content.is_empty() {
                                blocks.push(container.block(std::mem::take(&mut content)));
                            }
                            blocks.push(Block::Image(image));
                            split = true;
                        }
                    } else {
                        self.pos += 1;
                    }
                }
            }
        }

        if !content.is_empty() || (!split && end.is_some()) {
            blocks.push(container.block(content));
        }
        blocks
    }
}

fn push_text(content: &mut Vec<Inline>, text: &str, marks: Vec<Mark>) {
    if text.is_empty() {
        return;
    }
    if let Some(Inline::Text(last)) = content.last_mut() {
        if last.marks == marks {
            last.text.push_str(text);
            return;
        }
    }
    content.push(Inline::Text(TextRun {
        text: text.to_string(),
        marks,
    }));
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut rest = input;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("<!--") {
            rest = after.find("-->").map_or("", |end| &after[end + 3..]);
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            rest = rest.find('>').map_or("", |end| &rest[end + 1..]);
        } else if let Some(after) = rest.strip_prefix("</") {
            match after.find('>') {
                Some(end) => {
                    let name = after[..end].trim().to_ascii_lowercase();
                    tokens.push(Token::End { name });
                    rest = &after[end + 1..];
                }
                None => rest = "",
            }
        } else if rest.starts_with('<')
            && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
        {
            let (token, after) = read_start_tag(&rest[1..]);
            rest = after;
            if let Token::Start { name, .. } = &token {
                if name == "script" || name == "style" {
                    let close = format!("</{name}");
                    rest = find_ascii_ci(rest, &close)
                        .map_or("", |at| &rest[at..]);
                    continue;
                }
            }
            tokens.push(token);
        } else {
            // Text up to the next tag; a lone '<' is literal.
            let first = rest.chars().next().map_or(1, char::len_utf8);
            let next = rest[first..].find('<').map_or(rest.len(), |i| i + first);
            let text = decode_entities(&rest[..next]);
            match tokens.last_mut() {
                Some(Token::Text(prev)) => prev.push_str(&text),
                _ => tokens.push(Token::Text(text)),
            }
            rest = &rest[next..];
        }
    }
    tokens
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

/// Reads a start tag after its `<`. Returns the token and the input after `>`.
fn read_start_tag(input: &str) -> (Token, &str) {
    let name_end = input
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(input.len());
    let name = input[..name_end].to_ascii_lowercase();
    let mut rest = &input[name_end..];
    let mut attrs = Vec::new();

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if let Some(after) = rest.strip_prefix("/>") {
            rest = after;
            break;
        }
        if let Some(after) = rest.strip_prefix('>') {
            rest = after;
            break;
        }
        if let Some(after) = rest.strip_prefix(['/', '=']) {
            rest = after;
            continue;
        }

        let key_end = rest
            .find(|c: char| c.is_whitespace() || c == '=' || c == '>' || c == '/')
            .unwrap_or(rest.len());
        let key = rest[..key_end].to_ascii_lowercase();
        rest = rest[key_end..].trim_start();

        let value = if let Some(after) = rest.strip_prefix('=') {
            let after = after.trim_start();
            match after.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after[1..];
                    let end = body.find(quote).unwrap_or(body.len());
                    rest = body.get(end + 1..).unwrap_or("");
                    decode_entities(&body[..end])
                }
                _ => {
                    let end = after
                        .find(|c: char| c.is_whitespace() || c == '>')
                        .unwrap_or(after.len());
                    rest = &after[end..];
                    decode_entities(&after[..end])
                }
            }
        } else {
            String::new()
        };
        attrs.push((key, value));
    }

    (Token::Start { name, attrs }, rest)
}

fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest[1..].find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &rest[1..end + 1];
            decode_entity(entity).map(|c| (c, end + 2))
        });
        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = entity.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
