//! Document node types.
//!
//! A document is a flat list of top-level [`Block`]s. Lists nest items, and
//! list items nest blocks; text lives in [`Inline`] runs inside paragraphs and
//! headings. Images are blocks of their own.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use presswork_media::{Dimensions, Locator, probe_dimensions};
use smol_str::SmolStr;

/// Inline formatting. Variant order is the canonical nesting order used when
/// serializing, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mark {
    Bold,
    Italic,
    Underline,
    Strike,
    Code,
    Highlight,
}

impl Mark {
    pub fn tag(self) -> &'static str {
        match self {
            Mark::Bold => "strong",
            Mark::Italic => "em",
            Mark::Underline => "u",
            Mark::Strike => "s",
            Mark::Code => "code",
            Mark::Highlight => "mark",
        }
    }

    /// Accepts the canonical tag plus common synonyms.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "strong" | "b" => Some(Mark::Bold),
            "em" | "i" => Some(Mark::Italic),
            "u" => Some(Mark::Underline),
            "s" | "strike" | "del" => Some(Mark::Strike),
            "code" => Some(Mark::Code),
            "mark" => Some(Mark::Highlight),
            _ => None,
        }
    }
}

/// Block text alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl TextAlign {
    pub fn as_str(self) -> &'static str {
        match self {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
            TextAlign::Justify => "justify",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "left" => Some(TextAlign::Left),
            "center" => Some(TextAlign::Center),
            "right" => Some(TextAlign::Right),
            "justify" => Some(TextAlign::Justify),
            _ => None,
        }
    }
}

/// A run of text sharing one set of marks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub text: String,
    /// Sorted, without duplicates.
    pub marks: Vec<Mark>,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Vec::new(),
        }
    }

    pub fn marked(text: impl Into<String>, marks: impl IntoIterator<Item = Mark>) -> Self {
        let mut marks: Vec<Mark> = marks.into_iter().collect();
        marks.sort();
        marks.dedup();
        Self {
            text: text.into(),
            marks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(TextRun),
    HardBreak,
}

impl Inline {
    pub fn text(text: impl Into<String>) -> Self {
        Inline::Text(TextRun::plain(text))
    }
}

/// Where an image's bytes live.
///
/// `src` strings are classified once, when markup is parsed; nothing else
/// inspects string prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRef {
    /// Bytes carried inside the document as a base64 data URL.
    Embedded { mime: SmolStr, bytes: Bytes },
    /// An uploaded asset.
    Stored(Locator),
}

impl AssetRef {
    pub fn embedded(mime: impl Into<SmolStr>, bytes: impl Into<Bytes>) -> Self {
        AssetRef::Embedded {
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    /// Classify a markup `src` value. Anything that is not a well-formed
    /// base64 data URL is treated as a stored locator.
    pub fn from_src(src: &str) -> Self {
        parse_data_url(src).unwrap_or_else(|| AssetRef::Stored(Locator::new(src)))
    }

    pub fn to_src(&self) -> String {
        match self {
            AssetRef::Embedded { mime, bytes } => {
                format!("data:{mime};base64,{}", STANDARD.encode(bytes))
            }
            AssetRef::Stored(locator) => locator.to_string(),
        }
    }

    pub fn locator(&self) -> Option<&Locator> {
        match self {
            AssetRef::Stored(locator) => Some(locator),
            AssetRef::Embedded { .. } => None,
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self, AssetRef::Embedded { .. })
    }
}

fn parse_data_url(src: &str) -> Option<AssetRef> {
    let rest = src.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    // The MIME type is kept verbatim, even when empty, and the payload must
    // be canonical base64, so writing the asset back gives the same `src`.
    let mime = header.strip_suffix(";base64")?;
    let bytes = STANDARD.decode(payload).ok()?;
    Some(AssetRef::Embedded {
        mime: SmolStr::new(mime),
        bytes: Bytes::from(bytes),
    })
}

/// An image block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageNode {
    pub src: AssetRef,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub alt: String,
}

impl ImageNode {
    pub fn new(src: AssetRef) -> Self {
        Self {
            src,
            width: None,
            height: None,
            alt: String::new(),
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_alt(mut self, alt: impl Into<String>) -> Self {
        self.alt = alt.into();
        self
    }

    /// Stored display size, if both dimensions are set.
    pub fn size(&self) -> Option<Dimensions> {
        Some(Dimensions::new(self.width?, self.height?))
    }

    /// Pixel size of embedded bytes, read from the image header.
    pub fn embedded_size(&self) -> Option<Dimensions> {
        match &self.src {
            AssetRef::Embedded { bytes, .. } => probe_dimensions(bytes),
            AssetRef::Stored(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Paragraph,
    Heading,
    List,
    ListItem,
    Image,
}

/// A block-level node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph {
        align: TextAlign,
        content: Vec<Inline>,
    },
    Heading {
        /// 1..=6
        level: u8,
        align: TextAlign,
        content: Vec<Inline>,
    },
    List {
        ordered: bool,
        /// Always [`Block::ListItem`]s.
        items: Vec<Block>,
    },
    ListItem {
        content: Vec<Block>,
    },
    Image(ImageNode),
}

impl Block {
    pub fn paragraph(text: impl Into<String>) -> Self {
        let text = text.into();
        let content = if text.is_empty() {
            Vec::new()
        } else {
            vec![Inline::text(text)]
        };
        Block::Paragraph {
            align: TextAlign::Left,
            content,
        }
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Block::Heading {
            level: level.clamp(1, 6),
            align: TextAlign::Left,
            content: vec![Inline::text(text)],
        }
    }

    pub fn image(node: ImageNode) -> Self {
        Block::Image(node)
    }

    /// A list whose items each hold one paragraph.
    pub fn list(ordered: bool, items: impl IntoIterator<Item = Block>) -> Self {
        Block::List {
            ordered,
            items: items
                .into_iter()
                .map(|block| Block::ListItem {
                    content: vec![block],
                })
                .collect(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Block::Paragraph { .. } => NodeKind::Paragraph,
            Block::Heading { .. } => NodeKind::Heading,
            Block::List { .. } => NodeKind::List,
            Block::ListItem { .. } => NodeKind::ListItem,
            Block::Image(_) => NodeKind::Image,
        }
    }

    pub fn as_image(&self) -> Option<&ImageNode> {
        match self {
            Block::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn as_image_mut(&mut self) -> Option<&mut ImageNode> {
        match self {
            Block::Image(image) => Some(image),
            _ => None,
        }
    }

    /// Nested blocks, for containers.
    pub fn children(&self) -> &[Block] {
        match self {
            Block::List { items, .. } => items,
            Block::ListItem { content } => content,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Block>> {
        match self {
            Block::List { items, .. } => Some(items),
            Block::ListItem { content } => Some(content),
            _ => None,
        }
    }

    /// Concatenated text of this block and its descendants.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(block: &Block, out: &mut String) {
    match block {
        Block::Paragraph { content, .. } | Block::Heading { content, .. } => {
            for inline in content {
                match inline {
                    Inline::Text(run) => out.push_str(&run.text),
                    Inline::HardBreak => out.push('\n'),
                }
            }
        }
        Block::List { items, .. } => items.iter().for_each(|b| collect_text(b, out)),
        Block::ListItem { content } => content.iter().for_each(|b| collect_text(b, out)),
        Block::Image(image) => out.push_str(&image.alt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url_classified_once() {
        let src = AssetRef::embedded("image/png", Bytes::from_static(b"\x89PNG")).to_src();
        assert_eq!(src, "data:image/png;base64,iVBORw==");
        assert_eq!(
            AssetRef::from_src(&src),
            AssetRef::embedded("image/png", Bytes::from_static(b"\x89PNG"))
        );
    }

    #[test]
    fn test_non_data_src_is_stored() {
        let asset = AssetRef::from_src("https://cdn.example.com/a.jpg");
        assert_eq!(
            asset.locator().map(Locator::as_str),
            Some("https://cdn.example.com/a.jpg")
        );
    }

    #[test]
    fn test_malformed_data_url_is_kept_verbatim() {
        let src = "data:image/png;base64,@@not-base64@@";
        let asset = AssetRef::from_src(src);
        assert!(!asset.is_embedded());
        assert_eq!(asset.to_src(), src);
    }

    #[test]
    fn test_empty_mime_survives_reparse() {
        let asset = AssetRef::embedded("", Bytes::from_static(b"ab"));
        let src = asset.to_src();
        assert_eq!(src, "data:;base64,YWI=");
        assert_eq!(AssetRef::from_src(&src), asset);
    }

    #[test]
    fn test_padded_payload_is_not_reencoded() {
        let src = "data:image/png;base64, YWI=";
        assert_eq!(AssetRef::from_src(src).to_src(), src);
    }

    #[test]
    fn test_marks_are_canonical() {
        let run = TextRun::marked("x", [Mark::Highlight, Mark::Bold, Mark::Bold]);
        assert_eq!(run.marks, vec![Mark::Bold, Mark::Highlight]);
    }

    #[test]
    fn test_plain_text_walks_lists() {
        let list = Block::list(false, [Block::paragraph("one"), Block::paragraph("two")]);
        assert_eq!(list.plain_text(), "onetwo");
    }
}
