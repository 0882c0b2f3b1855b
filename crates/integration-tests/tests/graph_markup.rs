//! Graph documents as written by desktop graph builders

use fanout_core::domain::{ArgValue, ProcessingGraph};

const BUILDER_GRAPH: &str = r#"<graph id="Graph">
  <version>1.0</version>
  <node id="Write">
    <operator>Write</operator>
    <sources>
      <sourceProduct refid="BandMaths"/>
    </sources>
    <parameters class="com.bc.ceres.binding.dom.XppDomElement">
      <file>/data/out/ndvi.tif</file>
      <formatName>GeoTIFF</formatName>
    </parameters>
  </node>
  <node id="Read">
    <operator>Read</operator>
    <sources/>
    <parameters class="com.bc.ceres.binding.dom.XppDomElement">
      <file>/data/in/S2A.SAFE/MTD_MSIL1C.xml</file>
    </parameters>
  </node>
  <node id="BandMaths">
    <operator>BandMaths</operator>
    <sources>
      <sourceProduct refid="Read"/>
    </sources>
    <parameters class="com.bc.ceres.binding.dom.XppDomElement">
      <targetBands>
        <targetBand>
          <name>ndvi</name>
          <type>float32</type>
          <expression>(B8 - B4) / (B8 + B4)</expression>
        </targetBand>
      </targetBands>
      <variables/>
    </parameters>
  </node>
  <applicationData id="Presentation">
    <Description/>
  </applicationData>
</graph>"#;

#[test]
fn test_builder_document_with_forward_references() {
    let graph = ProcessingGraph::parse(BUILDER_GRAPH).unwrap();

    assert_eq!(graph.len(), 3);
    assert_eq!(graph.leading_operator(), Some("Write"));
    // Write reads from BandMaths (index 2), BandMaths from Read (index 1)
    assert_eq!(graph.step(0).unwrap().predecessor(), Some(2));
    assert_eq!(graph.step(1).unwrap().predecessor(), None);
    assert_eq!(graph.step(2).unwrap().predecessor(), Some(1));

    let bands = graph.find("BandMaths").unwrap();
    let list = bands.argument("targetBands").and_then(ArgValue::as_list).unwrap();
    assert_eq!(list.element, "targetBand");
    assert_eq!(list.records.len(), 1);
    assert!(list.records[0]
        .iter()
        .any(|(k, v)| k == "expression" && v == "(B8 - B4) / (B8 + B4)"));
    assert_eq!(bands.scalar("variables"), Some(""));
}

#[test]
fn test_rendered_document_reads_back_equal() {
    let graph = ProcessingGraph::parse(BUILDER_GRAPH).unwrap();
    let rendered = graph.render().unwrap();

    assert!(rendered.contains("<sourceProduct refid=\"BandMaths\"/>"));
    assert_eq!(ProcessingGraph::parse(&rendered).unwrap(), graph);
    assert_eq!(ProcessingGraph::parse(&rendered).unwrap().render().unwrap(), rendered);
}

#[test]
fn test_chain_renders_as_linear_document() {
    let graph = ProcessingGraph::from_chain(
        "Read|BandMaths{\"-PtargetBands=[targetBand[name=ndvi,expression=B8];targetBand[name=b4,expression=B4]]\"}|Write",
    )
    .unwrap();
    let parsed = ProcessingGraph::parse(&graph.render().unwrap()).unwrap();

    assert_eq!(parsed, graph);
    assert_eq!(parsed.step(2).unwrap().predecessor(), Some(1));
    let list = parsed
        .find("BandMaths")
        .unwrap()
        .argument("targetBands")
        .and_then(ArgValue::as_list)
        .unwrap();
    assert_eq!(list.records.len(), 2);
}
