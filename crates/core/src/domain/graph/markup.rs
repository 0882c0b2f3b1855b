// Graph markup: render to and parse from the XML graph document consumed by the processing tool
//
// <graph id="Graph">
//   <version>1.0</version>
//   <node id="Resample">
//     <operator>Resample</operator>
//     <sources><sourceProduct refid="Read"/></sources>
//     <parameters class="com.bc.ceres.binding.dom.XppDomElement">
//       <targetResolution>60</targetResolution>
//       <variables><variable><name>ndvi</name><expression>B8</expression></variable></variables>
//     </parameters>
//   </node>
// </graph>

use std::collections::HashMap;
use std::fmt::Display;
use std::io::Write;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::argument::{ArgValue, Record, StructuredList};
use super::step::ProcessingStep;
use super::ProcessingGraph;
use crate::domain::error::{DomainError, Result};

pub const GRAPH_ID: &str = "Graph";
pub const GRAPH_VERSION: &str = "1.0";
pub const PARAMETERS_CLASS: &str = "com.bc.ceres.binding.dom.XppDomElement";

const INDENT: usize = 2;

/// Marks an empty list parameter and names its repeated element: `<conditions element="condition"/>`
const LIST_ELEMENT_ATTR: &str = "element";
/// Marks a list item without fields: `<variable empty="true"/>`
const EMPTY_RECORD_ATTR: &str = "empty";

fn markup_err(e: impl Display) -> DomainError {
    DomainError::Markup(e.to_string())
}

impl ProcessingGraph {
    /// Render the whole graph document
    pub fn render(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', INDENT);

        let graph = BytesStart::new("graph").with_attributes([("id", GRAPH_ID)]);
        writer.write_event(Event::Start(graph)).map_err(markup_err)?;
        write_leaf(&mut writer, "version", GRAPH_VERSION)?;

        for step in &self.steps {
            let node = BytesStart::new("node").with_attributes([("id", step.id.as_str())]);
            writer.write_event(Event::Start(node)).map_err(markup_err)?;
            write_leaf(&mut writer, "operator", &step.operator)?;

            match step.predecessor.and_then(|p| self.steps.get(p)) {
                Some(source) => {
                    writer
                        .write_event(Event::Start(BytesStart::new("sources")))
                        .map_err(markup_err)?;
                    let reference = BytesStart::new("sourceProduct")
                        .with_attributes([("refid", source.id.as_str())]);
                    writer.write_event(Event::Empty(reference)).map_err(markup_err)?;
                    writer
                        .write_event(Event::End(BytesEnd::new("sources")))
                        .map_err(markup_err)?;
                }
                None => {
                    writer
                        .write_event(Event::Empty(BytesStart::new("sources")))
                        .map_err(markup_err)?;
                }
            }

            write_parameters(&mut writer, step)?;
            writer
                .write_event(Event::End(BytesEnd::new("node")))
                .map_err(markup_err)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("graph")))
            .map_err(markup_err)?;
        into_string(writer)
    }

    /// Parse a graph document.
    ///
    /// Source references may point forward; they are resolved once every node is known.
    pub fn parse(markup: &str) -> Result<Self> {
        let root = read_tree(markup)?;
        if root.name != "graph" {
            return Err(DomainError::Markup(format!(
                "expected <graph> root, found <{}>",
                root.name
            )));
        }

        let mut graph = ProcessingGraph::new();
        let mut references: Vec<Reference> = Vec::new();

        for node in root.children.iter().filter(|c| c.name == "node") {
            let operator = node
                .child("operator")
                .map(|o| o.text.trim().to_string())
                .filter(|o| !o.is_empty())
                .ok_or_else(|| DomainError::Markup("node without <operator>".to_string()))?;
            let id = match node.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
                Some(id) => id.to_string(),
                None => graph.unique_id(&operator),
            };

            let mut step = ProcessingStep::new(id, operator);
            if let Some(parameters) = node.child("parameters") {
                for parameter in &parameters.children {
                    let value = parameter_value(parameter);
                    step.set_argument(&parameter.name, value);
                }
            }
            references.push(match node.child("sources") {
                Some(sources) => Reference::Declared(source_reference(sources)),
                None => Reference::Implicit,
            });
            graph.steps.push(step);
        }

        let index: HashMap<String, usize> = graph
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        for (i, reference) in references.into_iter().enumerate() {
            graph.steps[i].predecessor = match reference {
                Reference::Declared(Some(refid)) => Some(
                    *index
                        .get(&refid)
                        .ok_or(DomainError::UnknownReference(refid))?,
                ),
                Reference::Declared(None) => None,
                Reference::Implicit => i.checked_sub(1),
            };
        }
        Ok(graph)
    }
}

impl ProcessingStep {
    /// Render only this step's `<parameters>` block
    pub fn parameters_markup(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', INDENT);
        write_parameters(&mut writer, self)?;
        into_string(writer)
    }
}

fn into_string(writer: Writer<Vec<u8>>) -> Result<String> {
    String::from_utf8(writer.into_inner()).map_err(markup_err)
}

fn write_leaf<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    if text.is_empty() {
        writer
            .write_event(Event::Empty(BytesStart::new(name)))
            .map_err(markup_err)?;
        return Ok(());
    }
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(markup_err)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(markup_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(markup_err)?;
    Ok(())
}

fn write_parameters<W: Write>(writer: &mut Writer<W>, step: &ProcessingStep) -> Result<()> {
    let parameters = BytesStart::new("parameters").with_attributes([("class", PARAMETERS_CLASS)]);
    if step.arguments.is_empty() {
        writer.write_event(Event::Empty(parameters)).map_err(markup_err)?;
        return Ok(());
    }
    writer.write_event(Event::Start(parameters)).map_err(markup_err)?;

    for (key, value) in &step.arguments {
        match value {
            ArgValue::Scalar(text) => write_leaf(writer, key, text)?,
            ArgValue::List(list) if list.is_empty() => {
                let empty = BytesStart::new(key.as_str())
                    .with_attributes([(LIST_ELEMENT_ATTR, list.element.as_str())]);
                writer.write_event(Event::Empty(empty)).map_err(markup_err)?;
            }
            ArgValue::List(list) => {
                writer
                    .write_event(Event::Start(BytesStart::new(key.as_str())))
                    .map_err(markup_err)?;
                for record in &list.records {
                    write_record(writer, &list.element, record)?;
                }
                writer
                    .write_event(Event::End(BytesEnd::new(key.as_str())))
                    .map_err(markup_err)?;
            }
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new("parameters")))
        .map_err(markup_err)?;
    Ok(())
}

fn write_record<W: Write>(writer: &mut Writer<W>, element: &str, record: &Record) -> Result<()> {
    if record.is_empty() {
        let empty = BytesStart::new(element).with_attributes([(EMPTY_RECORD_ATTR, "true")]);
        writer.write_event(Event::Empty(empty)).map_err(markup_err)?;
        return Ok(());
    }
    // A single field named after the element is a plain repeated leaf (<band>B4</band>)
    if let [(field, text)] = record.as_slice() {
        if field == element {
            return write_leaf(writer, element, text);
        }
    }
    writer
        .write_event(Event::Start(BytesStart::new(element)))
        .map_err(markup_err)?;
    for (field, text) in record {
        write_leaf(writer, field, text)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element)))
        .map_err(markup_err)?;
    Ok(())
}

/// Source declared by a node. Nodes without a `<sources>` block follow the previous node.
enum Reference {
    Declared(Option<String>),
    Implicit,
}

/// Minimal element tree collected while streaming the document
#[derive(Debug, Default)]
struct Element {
    name: String,
    id: Option<String>,
    refid: Option<String>,
    list_element: Option<String>,
    empty_record: bool,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn open(start: &BytesStart) -> Result<Self> {
        Ok(Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            id: attribute(start, "id")?,
            refid: attribute(start, "refid")?,
            list_element: attribute(start, LIST_ELEMENT_ATTR)?,
            empty_record: attribute(start, EMPTY_RECORD_ATTR)?.as_deref() == Some("true"),
            ..Self::default()
        })
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }
}

fn attribute(start: &BytesStart, key: &str) -> Result<Option<String>> {
    match start.try_get_attribute(key).map_err(markup_err)? {
        Some(attr) => Ok(Some(attr.unescape_value().map_err(markup_err)?.into_owned())),
        None => Ok(None),
    }
}

fn read_tree(markup: &str) -> Result<Element> {
    let mut reader = Reader::from_str(markup);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    // Attach a finished element to its parent, or keep it as the document root
    fn close(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None if root.is_none() => *root = Some(element),
            None => return Err(DomainError::Markup("multiple root elements".to_string())),
        }
        Ok(())
    }

    loop {
        match reader.read_event().map_err(markup_err)? {
            Event::Start(e) => stack.push(Element::open(&e)?),
            Event::Empty(e) => {
                let element = Element::open(&e)?;
                close(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| DomainError::Markup("unbalanced closing tag".to_string()))?;
                close(&mut stack, &mut root, element)?;
            }
            Event::Text(t) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&t.unescape().map_err(markup_err)?);
                }
            }
            Event::CData(c) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(DomainError::Markup("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| DomainError::Markup("empty document".to_string()))
}

/// First source declared by `refid` attribute or by text content (`<sourceProduct>Read</sourceProduct>`)
fn source_reference(sources: &Element) -> Option<String> {
    sources.children.iter().find_map(|source| {
        source
            .refid
            .clone()
            .or_else(|| Some(source.text.trim().to_string()))
            .filter(|r| !r.is_empty() && !r.starts_with("${"))
    })
}

fn parameter_value(parameter: &Element) -> ArgValue {
    if parameter.children.is_empty() {
        return match &parameter.list_element {
            Some(element) => ArgValue::List(StructuredList::new(element.clone())),
            None => ArgValue::Scalar(parameter.text.trim().to_string()),
        };
    }

    let mut list = StructuredList::new(parameter.children[0].name.clone());
    for item in &parameter.children {
        let record: Record = if item.empty_record {
            Record::new()
        } else if item.children.is_empty() {
            vec![(item.name.clone(), item.text.trim().to_string())]
        } else {
            item.children
                .iter()
                .map(|field| (field.name.clone(), field.text.trim().to_string()))
                .collect()
        };
        list.records.push(record);
    }
    ArgValue::List(list)
}
