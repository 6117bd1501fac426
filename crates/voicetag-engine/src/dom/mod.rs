//! Minimal live text tree.
//!
//! A [`Page`] is the host document plus its embedded frames. Every edit made
//! through [`Page::edit`] (and every write the scanner makes) is appended to
//! a mutation journal, which is what the change watcher consumes.

mod html;

use std::collections::BTreeMap;
use std::fmt;

pub use html::escape_text;

/// A node in a document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Element(Element),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub const fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(e) => Some(e),
            Self::Text(_) => None,
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

/// An element with ordered attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercase tag name.
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_class(self, class: &str) -> Self {
        self.with_attr("class", class)
    }

    #[must_use]
    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Set an attribute. Returns `true` when the stored value changed.
    pub fn set_attr(&mut self, name: &str, value: &str) -> bool {
        if self.attr(name) == Some(value) {
            return false;
        }
        self.attrs.insert(name.to_string(), value.to_string());
        true
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }

    /// Concatenated descendant text.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }

    /// Pre-order visit of this element and its element descendants.
    pub fn walk(&self, f: &mut dyn FnMut(&Self)) {
        f(self);
        for child in &self.children {
            if let Node::Element(e) = child {
                e.walk(f);
            }
        }
    }

    /// Pre-order mutable visit of element descendants (not `self`).
    pub fn walk_descendants_mut(&mut self, f: &mut dyn FnMut(&mut Self)) {
        for child in &mut self.children {
            if let Node::Element(e) = child {
                f(e);
                e.walk_descendants_mut(f);
            }
        }
    }

    /// First descendant element with the given `id`.
    pub fn find_by_id(&self, id: &str) -> Option<&Self> {
        self.children.iter().find_map(|child| match child {
            Node::Element(e) if e.attr("id") == Some(id) => Some(e),
            Node::Element(e) => e.find_by_id(id),
            Node::Text(_) => None,
        })
    }

    /// Serialize to HTML.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        html::write_element(self, &mut out);
        out
    }
}

/// One document: a head for stylesheets and a body for content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub head: Element,
    pub body: Element,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            head: Element::new("head"),
            body: Element::new("body"),
        }
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Document whose body holds `children`.
    pub fn with_body<I>(children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Node>,
    {
        let mut doc = Self::new();
        doc.body.children = children.into_iter().map(Into::into).collect();
        doc
    }

    pub fn to_html(&self) -> String {
        format!("{}{}", self.head.to_html(), self.body.to_html())
    }
}

/// Identifies an embedded frame within a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// A point in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A frame's bounding rectangle in main-document viewport space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// An embedded sub-document.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub id: FrameId,
    pub rect: Rect,
    /// `None` while the frame is cross-origin or not yet loaded.
    pub document: Option<Document>,
}

/// Which document an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentTarget {
    Main,
    Frame(FrameId),
}

impl fmt::Display for DocumentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Frame(id) => id.fmt(f),
        }
    }
}

/// Kind of tree mutation, mirroring DOM mutation records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    CharacterData,
    Attributes,
}

/// A journaled mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutation {
    pub target: DocumentTarget,
    pub kind: MutationKind,
}

/// The host page: main document plus embedded frames.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    pub main: Document,
    frames: Vec<Frame>,
    journal: Vec<Mutation>,
}

impl Page {
    pub fn new(main: Document) -> Self {
        Self {
            main,
            frames: Vec::new(),
            journal: Vec::new(),
        }
    }

    /// Embed a frame. `document` is `None` for an unreachable frame.
    pub fn add_frame(&mut self, rect: Rect, document: Option<Document>) -> FrameId {
        let id = FrameId(self.frames.last().map_or(0, |f| f.id.0 + 1));
        self.frames.push(Frame { id, rect, document });
        self.journal.push(Mutation {
            target: DocumentTarget::Main,
            kind: MutationKind::ChildList,
        });
        id
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.iter().find(|f| f.id == id)
    }

    pub fn frame_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.iter_mut().find(|f| f.id == id)
    }

    /// Main target followed by every frame, in document order.
    pub fn targets(&self) -> Vec<DocumentTarget> {
        std::iter::once(DocumentTarget::Main)
            .chain(self.frames.iter().map(|f| DocumentTarget::Frame(f.id)))
            .collect()
    }

    pub fn document(&self, target: DocumentTarget) -> Option<&Document> {
        match target {
            DocumentTarget::Main => Some(&self.main),
            DocumentTarget::Frame(id) => self.frame(id)?.document.as_ref(),
        }
    }

    pub fn document_mut(&mut self, target: DocumentTarget) -> Option<&mut Document> {
        match target {
            DocumentTarget::Main => Some(&mut self.main),
            DocumentTarget::Frame(id) => self.frame_mut(id)?.document.as_mut(),
        }
    }

    /// Apply `f` to a document and journal it as one mutation of `kind`.
    ///
    /// Returns `None` (and journals nothing) when the document is unavailable.
    pub fn edit<R>(
        &mut self,
        target: DocumentTarget,
        kind: MutationKind,
        f: impl FnOnce(&mut Document) -> R,
    ) -> Option<R> {
        let doc = self.document_mut(target)?;
        let result = f(doc);
        self.record(target, kind);
        Some(result)
    }

    /// Journal a mutation made through [`Page::document_mut`].
    pub fn record(&mut self, target: DocumentTarget, kind: MutationKind) {
        self.journal.push(Mutation { target, kind });
    }

    /// Drain the mutation journal.
    pub fn take_mutations(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.journal)
    }

    pub fn pending_mutations(&self) -> usize {
        self.journal.len()
    }
}
