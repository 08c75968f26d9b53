//! Lesson body renderer.
//!
//! Lesson text is stored as a constrained line-based markup: `## ` and `### `
//! headings, `- ` bullets, `1. ` numbered items, blank lines as separators and
//! `**bold**` / `*italic*` emphasis. [`render`] turns it into display blocks
//! without a full markdown parser.
//!
//! Emphasis is substituted straight into markup and the source is not escaped.
//! Lesson text is authored by the association's staff in the backend, never by
//! members, so the rendered markup is trusted.

use once_cell::sync::Lazy;
use regex::Regex;

static ORDERED_PREFIX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^\d+\.\s").ok());
static BOLD: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").ok());
static ITALIC: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\*(.*?)\*").ok());

/// Text carrying inline emphasis markers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inline(String);

impl Inline {
    #[must_use]
    pub fn source(&self) -> &str {
        &self.0
    }

    /// Markup with `**…**` replaced by `<strong>` and `*…*` by `<em>`.
    #[must_use]
    pub fn to_html(&self) -> String {
        let bold = match BOLD.as_ref() {
            Some(re) => re.replace_all(&self.0, "<strong>${1}</strong>").into_owned(),
            None => self.0.clone(),
        };
        match ITALIC.as_ref() {
            Some(re) => re.replace_all(&bold, "<em>${1}</em>").into_owned(),
            None => bold,
        }
    }
}

impl From<&str> for Inline {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One display block of a rendered lesson.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
    Heading2(Inline),
    Heading3(Inline),
    UnorderedList(Vec<Inline>),
    OrderedList(Vec<Inline>),
    Paragraph(Inline),
}

/// The list currently being accumulated.
enum ListRun {
    Unordered(Vec<Inline>),
    Ordered(Vec<Inline>),
}

impl ListRun {
    fn into_block(self) -> Option<Block> {
        match self {
            Self::Unordered(items) if !items.is_empty() => Some(Block::UnorderedList(items)),
            Self::Ordered(items) if !items.is_empty() => Some(Block::OrderedList(items)),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Renderer {
    blocks: Vec<Block>,
    run: Option<ListRun>,
}

impl Renderer {
    fn flush(&mut self) {
        if let Some(block) = self.run.take().and_then(ListRun::into_block) {
            self.blocks.push(block);
        }
    }

    fn emit(&mut self, block: Block) {
        self.flush();
        self.blocks.push(block);
    }

    /// Add a bullet. An open numbered run is re-tagged and keeps its items.
    fn push_unordered(&mut self, item: Inline) {
        let mut items = match self.run.take() {
            Some(ListRun::Unordered(items) | ListRun::Ordered(items)) => items,
            None => Vec::new(),
        };
        items.push(item);
        self.run = Some(ListRun::Unordered(items));
    }

    /// Add a numbered item. An open bullet run is re-tagged and keeps its items.
    fn push_ordered(&mut self, item: Inline) {
        let mut items = match self.run.take() {
            Some(ListRun::Unordered(items) | ListRun::Ordered(items)) => items,
            None => Vec::new(),
        };
        items.push(item);
        self.run = Some(ListRun::Ordered(items));
    }

    fn line(&mut self, raw: &str) {
        let line = raw.trim();

        if let Some(rest) = line.strip_prefix("## ") {
            self.emit(Block::Heading2(rest.into()));
        } else if let Some(rest) = line.strip_prefix("### ") {
            self.emit(Block::Heading3(rest.into()));
        } else if let Some(rest) = line.strip_prefix("- ") {
            self.push_unordered(rest.into());
        } else if let Some(rest) = ordered_item(line) {
            self.push_ordered(rest.into());
        } else if line.is_empty() {
            self.flush();
        } else {
            self.emit(Block::Paragraph(line.into()));
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush();
        self.blocks
    }
}

fn ordered_item(line: &str) -> Option<&str> {
    let prefix = ORDERED_PREFIX.as_ref()?.find(line)?;
    Some(&line[prefix.end()..])
}

/// Render lesson text into display blocks. Empty input yields no blocks.
#[must_use]
pub fn render(text: &str) -> Vec<Block> {
    let mut renderer = Renderer::default();
    for line in text.lines() {
        renderer.line(line);
    }
    renderer.finish()
}
