use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Node, Selector};

lazy_static! {
    static ref BODY: Selector = Selector::parse("body").unwrap();
}

pub const PLACEHOLDER_CLASS: &str = "screenshot-placeholder";

#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
}

/// Flat, export-ready view of the article body.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph { runs: Vec<Run> },
    Bullet { runs: Vec<Run> },
    Placeholder { text: String },
}

/// Walks the top-level elements of `<body>` and maps the ones the article
/// template uses. Unknown elements are dropped.
pub fn html_to_blocks(html: &str) -> Vec<Block> {
    let document = Html::parse_document(html);
    let Some(body) = document.select(&BODY).next() else {
        return Vec::new();
    };

    let mut blocks = Vec::new();
    for el in body.children().filter_map(ElementRef::wrap) {
        match el.value().name() {
            "h1" => blocks.push(heading(1, &el)),
            "h2" => blocks.push(heading(2, &el)),
            "h3" => blocks.push(heading(3, &el)),
            "p" => blocks.push(Block::Paragraph { runs: text_runs(&el, false, false) }),
            // Ordered lists are flattened to bullets.
            "ul" | "ol" => {
                for item in el.children().filter_map(ElementRef::wrap) {
                    blocks.push(Block::Bullet { runs: text_runs(&item, false, false) });
                }
            }
            "div" if is_placeholder(&el) => {
                let text = el.text().collect::<String>();
                let text = if text.is_empty() { "FIGURE".to_string() } else { text };
                blocks.push(Block::Placeholder { text: format!("[{}]", text) });
            }
            "div" => blocks.push(Block::Paragraph { runs: text_runs(&el, false, false) }),
            _ => {}
        }
    }
    blocks
}

fn heading(level: u8, el: &ElementRef) -> Block {
    Block::Heading {
        level,
        text: el.text().collect::<String>(),
    }
}

fn is_placeholder(el: &ElementRef) -> bool {
    el.value().attr("class").is_some_and(|c| c.contains(PLACEHOLDER_CLASS))
}

/// Collects the non-blank text nodes under `el`, tracking bold and italic
/// through `b`/`strong` and `i`/`em` ancestors.
fn text_runs(el: &ElementRef, bold: bool, italic: bool) -> Vec<Run> {
    let mut runs = Vec::new();
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                if !text.trim().is_empty() {
                    runs.push(Run {
                        text: (**text).to_string(),
                        bold,
                        italic,
                    });
                }
            }
            Node::Element(_) => {
                let Some(child_el) = ElementRef::wrap(child) else { continue };
                let (b, i) = match child_el.value().name() {
                    "b" | "strong" => (true, italic),
                    "i" | "em" => (bold, true),
                    _ => (bold, italic),
                };
                runs.extend(text_runs(&child_el, b, i));
            }
            _ => {}
        }
    }
    runs
}
