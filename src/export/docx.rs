use std::io::{Cursor, Write};
use xml::writer::{EmitterConfig, EventWriter, XmlEvent};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};
use tracing::debug;

use super::error::ExportError;
use super::html::{html_to_blocks, Block, Run};
use crate::ingest::text::sanitize;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const BODY_FONT: &str = "Arial";
const BODY_SIZE: &str = "22"; // 11pt, in half-points
const PLACEHOLDER_FONT: &str = "Courier New";
const PLACEHOLDER_SIZE: &str = "20";
const PLACEHOLDER_COLOR: &str = "FF0000";
const BORDER_COLOR: &str = "CCCCCC";
const BULLET_NUM_ID: &str = "1";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
<Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>
<Override PartName="/word/numbering.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml"/>
</Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering" Target="numbering.xml"/>
</Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/><w:rPr><w:rFonts w:ascii="Arial" w:hAnsi="Arial" w:cs="Arial"/><w:sz w:val="22"/></w:rPr></w:style>
<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="Heading 1"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:after="240"/><w:outlineLvl w:val="0"/></w:pPr><w:rPr><w:rFonts w:ascii="Arial" w:hAnsi="Arial" w:cs="Arial"/><w:b/><w:color w:val="000000"/><w:sz w:val="48"/></w:rPr></w:style>
<w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="Heading 2"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:spacing w:before="240" w:after="120"/><w:outlineLvl w:val="1"/></w:pPr><w:rPr><w:rFonts w:ascii="Arial" w:hAnsi="Arial" w:cs="Arial"/><w:b/><w:color w:val="000000"/><w:sz w:val="32"/></w:rPr></w:style>
<w:style w:type="paragraph" w:styleId="Heading3"><w:name w:val="Heading 3"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:keepNext/><w:outlineLvl w:val="2"/></w:pPr><w:rPr><w:rFonts w:ascii="Arial" w:hAnsi="Arial" w:cs="Arial"/><w:b/><w:color w:val="000000"/><w:sz w:val="28"/></w:rPr></w:style>
</w:styles>"#;

const NUMBERING: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:numbering xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:abstractNum w:abstractNumId="0"><w:lvl w:ilvl="0"><w:start w:val="1"/><w:numFmt w:val="bullet"/><w:lvlText w:val="&#8226;"/><w:lvlJc w:val="left"/><w:pPr><w:ind w:left="720" w:hanging="360"/></w:pPr></w:lvl></w:abstractNum>
<w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num>
</w:numbering>"#;

/// Paragraph-level formatting, emitted in schema order.
#[derive(Default)]
struct ParagraphProps<'a> {
    style: Option<&'a str>,
    bullet: bool,
    border: bool,
    before: Option<&'a str>,
    after: Option<&'a str>,
    centered: bool,
}

struct RunProps<'a> {
    font: &'a str,
    size: &'a str,
    color: Option<&'a str>,
    bold: bool,
    italic: bool,
}

impl<'a> RunProps<'a> {
    fn body(run: &Run) -> Self {
        Self { font: BODY_FONT, size: BODY_SIZE, color: None, bold: run.bold, italic: run.italic }
    }
}

struct DocumentWriter<W: Write> {
    w: EventWriter<W>,
}

impl<W: Write> DocumentWriter<W> {
    fn new(out: W) -> Self {
        Self {
            w: EmitterConfig::new().perform_indent(false).create_writer(out),
        }
    }

    fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), ExportError> {
        let mut start = XmlEvent::start_element(name);
        for (key, value) in attrs {
            start = start.attr(*key, *value);
        }
        self.w.write(start)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ExportError> {
        self.w.write(XmlEvent::end_element())?;
        Ok(())
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), ExportError> {
        self.open(name, attrs)?;
        self.close()
    }

    fn write_document(&mut self, blocks: &[Block]) -> Result<(), ExportError> {
        self.w.write(XmlEvent::start_element("w:document").ns("w", W_NS))?;
        self.open("w:body", &[])?;

        for block in blocks {
            match block {
                Block::Heading { level, text } => {
                    let style = format!("Heading{}", level);
                    let (before, after) = match level {
                        1 => ("200", "200"),
                        2 => ("300", "150"),
                        _ => ("200", "120"),
                    };
                    self.paragraph(
                        &ParagraphProps { style: Some(style.as_str()), before: Some(before), after: Some(after), ..Default::default() },
                        |d| d.plain_run(text),
                    )?;
                }
                Block::Paragraph { runs } => {
                    self.paragraph(
                        &ParagraphProps { after: Some("120"), ..Default::default() },
                        |d| d.runs(runs),
                    )?;
                }
                Block::Bullet { runs } => {
                    self.paragraph(
                        &ParagraphProps { bullet: true, after: Some("50"), ..Default::default() },
                        |d| d.runs(runs),
                    )?;
                }
                Block::Placeholder { text } => {
                    let props = ParagraphProps {
                        border: true,
                        before: Some("120"),
                        after: Some("120"),
                        centered: true,
                        ..Default::default()
                    };
                    self.paragraph(&props, |d| {
                        d.run(text, &RunProps {
                            font: PLACEHOLDER_FONT,
                            size: PLACEHOLDER_SIZE,
                            color: Some(PLACEHOLDER_COLOR),
                            bold: false,
                            italic: false,
                        })
                    })?;
                }
            }
        }

        self.open("w:sectPr", &[])?;
        self.empty("w:pgSz", &[("w:w", "11906"), ("w:h", "16838")])?;
        self.empty("w:pgMar", &[("w:top", "1440"), ("w:right", "1440"), ("w:bottom", "1440"), ("w:left", "1440")])?;
        self.close()?;

        self.close()?; // w:body
        self.close() // w:document
    }

    fn paragraph<F>(&mut self, props: &ParagraphProps, content: F) -> Result<(), ExportError>
    where
        F: FnOnce(&mut Self) -> Result<(), ExportError>,
    {
        self.open("w:p", &[])?;
        self.open("w:pPr", &[])?;
        if let Some(style) = props.style {
            self.empty("w:pStyle", &[("w:val", style)])?;
        }
        if props.bullet {
            self.open("w:numPr", &[])?;
            self.empty("w:ilvl", &[("w:val", "0")])?;
            self.empty("w:numId", &[("w:val", BULLET_NUM_ID)])?;
            self.close()?;
        }
        if props.border {
            self.open("w:pBdr", &[])?;
            for side in ["w:top", "w:left", "w:bottom", "w:right"] {
                self.empty(side, &[("w:val", "single"), ("w:sz", "4"), ("w:space", "5"), ("w:color", BORDER_COLOR)])?;
            }
            self.close()?;
        }
        let mut spacing = Vec::new();
        if let Some(before) = props.before {
            spacing.push(("w:before", before));
        }
        if let Some(after) = props.after {
            spacing.push(("w:after", after));
        }
        if !spacing.is_empty() {
            self.empty("w:spacing", &spacing)?;
        }
        if props.centered {
            self.empty("w:jc", &[("w:val", "center")])?;
        }
        self.close()?; // w:pPr

        content(self)?;
        self.close()
    }

    fn runs(&mut self, runs: &[Run]) -> Result<(), ExportError> {
        for run in runs {
            self.run(&run.text, &RunProps::body(run))?;
        }
        Ok(())
    }

    /// A run that inherits everything from the paragraph style.
    fn plain_run(&mut self, text: &str) -> Result<(), ExportError> {
        self.open("w:r", &[])?;
        self.text(text)?;
        self.close()
    }

    fn run(&mut self, text: &str, props: &RunProps) -> Result<(), ExportError> {
        self.open("w:r", &[])?;
        self.open("w:rPr", &[])?;
        self.empty("w:rFonts", &[("w:ascii", props.font), ("w:hAnsi", props.font), ("w:cs", props.font)])?;
        if props.bold {
            self.empty("w:b", &[])?;
        }
        if props.italic {
            self.empty("w:i", &[])?;
        }
        if let Some(color) = props.color {
            self.empty("w:color", &[("w:val", color)])?;
        }
        self.empty("w:sz", &[("w:val", props.size)])?;
        self.close()?; // w:rPr
        self.text(text)?;
        self.close()
    }

    /// Control characters other than tab and newlines are not valid XML 1.0.
    fn text(&mut self, text: &str) -> Result<(), ExportError> {
        self.open("w:t", &[("xml:space", "preserve")])?;
        let text = sanitize(text);
        if !text.is_empty() {
            self.w.write(XmlEvent::characters(&text))?;
        }
        self.close()
    }
}

/// Renders the `word/document.xml` part for the given blocks.
pub fn document_xml(blocks: &[Block]) -> Result<Vec<u8>, ExportError> {
    let mut out = Vec::new();
    DocumentWriter::new(&mut out).write_document(blocks)?;
    Ok(out)
}

/// Converts article HTML into a `.docx` package. Best effort: elements the
/// article template does not use are dropped and nothing is round-tripped.
pub fn generate(html: &str) -> Result<Vec<u8>, ExportError> {
    let blocks = html_to_blocks(html);
    debug!("Converting {} blocks to docx", blocks.len());
    let document = document_xml(&blocks)?;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts: [(&str, &[u8]); 6] = [
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("_rels/.rels", PACKAGE_RELS.as_bytes()),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS.as_bytes()),
        ("word/styles.xml", STYLES.as_bytes()),
        ("word/numbering.xml", NUMBERING.as_bytes()),
        ("word/document.xml", &document),
    ];
    for (name, bytes) in parts {
        zip.start_file(name, options)?;
        zip.write_all(bytes)?;
    }

    Ok(zip.finish()?.into_inner())
}
