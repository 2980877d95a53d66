// XML to structured data conversion.
//
// Documents are turned into nested JSON values following the xml2js layout:
// the root is an object keyed by the root element name, child elements are
// grouped into arrays under their tag name, attributes live under "$" and
// mixed text under "_". Leaf elements collapse to their text.
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

const ATTRIBUTES_KEY: &str = "$";
const TEXT_KEY: &str = "_";

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to parse XML: {0}")]
    Malformed(String),

    #[error("Missing expected path: {0}")]
    MissingPath(String),

    #[error("Invalid value for {field}: {value:?}")]
    InvalidValue { field: String, value: String },

    #[error("Conversion error: {0}")]
    Conversion(String),
}

// Element under construction while the reader walks the document
struct OpenElement {
    name: String,
    attributes: Map<String, Value>,
    children: Map<String, Value>,
    text: String,
}

impl OpenElement {
    fn new(name: String, attributes: Map<String, Value>) -> Self {
        Self {
            name,
            attributes,
            children: Map::new(),
            text: String::new(),
        }
    }

    fn push_child(&mut self, name: String, value: Value) {
        let slot = self
            .children
            .entry(name)
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = slot {
            items.push(value);
        }
    }

    fn into_value(self) -> Value {
        let text = self.text.trim();
        if self.attributes.is_empty() && self.children.is_empty() {
            return Value::String(text.to_string());
        }

        let mut object = Map::new();
        if !self.attributes.is_empty() {
            object.insert(ATTRIBUTES_KEY.to_string(), Value::Object(self.attributes));
        }
        if !text.is_empty() {
            object.insert(TEXT_KEY.to_string(), Value::String(text.to_string()));
        }
        object.extend(self.children);
        Value::Object(object)
    }
}

#[derive(Debug, Default, Clone)]
pub struct XmlParser {}

impl XmlParser {
    pub fn new() -> Self {
        Self {}
    }

    // Parse a whole document into its nested mapping
    pub fn parse(&self, xml: &str) -> Result<Value, ParseError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<OpenElement> = Vec::new();
        let mut root: Option<(String, Value)> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                ParseError::Malformed(format!(
                    "error at position {}: {}",
                    reader.error_position(),
                    e
                ))
            })?;

            match event {
                Event::Start(start) => {
                    ensure_single_root(&root, &stack)?;
                    stack.push(open_element(&start)?);
                }
                Event::Empty(start) => {
                    ensure_single_root(&root, &stack)?;
                    let element = open_element(&start)?;
                    close_element(element, &mut stack, &mut root);
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| {
                        ParseError::Malformed("closing tag without an open element".to_string())
                    })?;
                    close_element(element, &mut stack, &mut root);
                }
                Event::Text(text) => {
                    let content = utf8(&text)?;
                    append_text(&mut stack, content)?;
                }
                Event::CData(data) => {
                    let content = utf8(&data)?;
                    append_text(&mut stack, content)?;
                }
                Event::GeneralRef(reference) => {
                    let resolved = match reference
                        .resolve_char_ref()
                        .map_err(|e| ParseError::Malformed(e.to_string()))?
                    {
                        Some(ch) => ch.to_string(),
                        None => {
                            let name = utf8(&reference)?;
                            quick_xml::escape::resolve_predefined_entity(name)
                                .ok_or_else(|| {
                                    ParseError::Malformed(format!("unknown entity &{};", name))
                                })?
                                .to_string()
                        }
                    };
                    append_text(&mut stack, &resolved)?;
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions and doctypes carry no data
                _ => (),
            }
        }

        if let Some(open) = stack.last() {
            return Err(ParseError::Malformed(format!(
                "unexpected end of document inside <{}>",
                open.name
            )));
        }

        let (name, value) =
            root.ok_or_else(|| ParseError::Malformed("document has no root element".to_string()))?;
        let mut document = Map::new();
        document.insert(name, value);
        Ok(Value::Object(document))
    }

    // Generic helper: the first entry of Response.Results
    pub fn parse_results(&self, xml: &str) -> Result<Value, ParseError> {
        let document = self.parse(xml)?;
        results_node(&document)
            .cloned()
            .ok_or_else(|| ParseError::MissingPath("Response.Results[0]".to_string()))
    }

    // Direct lookup of a record sequence by key. Top-level keys win, otherwise
    // the key is looked up inside Response.Results[0].
    pub fn records<'a>(document: &'a Value, key: &str) -> &'a [Value] {
        if let Some(value) = document.get(key) {
            return as_slice(value);
        }
        results_node(document)
            .and_then(|results| results.get(key))
            .map(as_slice)
            .unwrap_or(&[])
    }

    // Typed view over `records`
    pub fn decode_records<T: DeserializeOwned>(
        document: &Value,
        key: &str,
    ) -> Result<Vec<T>, ParseError> {
        Self::records(document, key)
            .iter()
            .map(|record| {
                serde_json::from_value(record.clone())
                    .map_err(|e| ParseError::Conversion(format!("{}: {}", key, e)))
            })
            .collect()
    }
}

fn results_node(document: &Value) -> Option<&Value> {
    document.get("Response")?.get("Results")?.get(0)
}

fn as_slice(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items.as_slice(),
        other => std::slice::from_ref(other),
    }
}

fn utf8(bytes: &[u8]) -> Result<&str, ParseError> {
    std::str::from_utf8(bytes).map_err(|e| ParseError::Malformed(e.to_string()))
}

fn ensure_single_root(
    root: &Option<(String, Value)>,
    stack: &[OpenElement],
) -> Result<(), ParseError> {
    if root.is_some() && stack.is_empty() {
        return Err(ParseError::Malformed(
            "document has more than one root element".to_string(),
        ));
    }
    Ok(())
}

fn open_element(start: &BytesStart) -> Result<OpenElement, ParseError> {
    let name = utf8(start.name().as_ref())?.to_string();
    let mut attributes = Map::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| ParseError::Malformed(e.to_string()))?;
        let key = utf8(attribute.key.as_ref())?.to_string();
        let value = attribute
            .unescape_value()
            .map_err(|e| ParseError::Malformed(e.to_string()))?;
        attributes.insert(key, Value::String(value.into_owned()));
    }
    Ok(OpenElement::new(name, attributes))
}

fn close_element(
    element: OpenElement,
    stack: &mut [OpenElement],
    root: &mut Option<(String, Value)>,
) {
    let name = element.name.clone();
    let value = element.into_value();
    match stack.last_mut() {
        Some(parent) => parent.push_child(name, value),
        None => *root = Some((name, value)),
    }
}

fn append_text(stack: &mut [OpenElement], content: &str) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(open) => {
            open.text.push_str(content);
            Ok(())
        }
        None if content.trim().is_empty() => Ok(()),
        None => Err(ParseError::Malformed(
            "text outside of the root element".to_string(),
        )),
    }
}
