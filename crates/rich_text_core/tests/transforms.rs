use anyhow::Result;
use manos_rich_text_core::{
    Document, ElementKind, ElementNode, MarkFormat, Marks, Node, NodeProps, Point, Selection,
    TransformError, delete_range, insert_text, normalize_selection, set_node_properties,
    split_block, text_between,
};

fn sel(anchor: (Vec<usize>, usize), focus: (Vec<usize>, usize)) -> Selection {
    Selection::new(Point::new(anchor.0, anchor.1), Point::new(focus.0, focus.1))
}

fn list(items: &[&str]) -> Result<Node> {
    Ok(Node::element(
        ElementKind::BulletedList,
        items
            .iter()
            .map(|text| Node::text_block(ElementKind::ListItem, *text))
            .collect(),
    )?)
}

#[test]
fn insert_text_moves_the_caret_past_the_insertion() -> Result<()> {
    let doc = Document::new(vec![Node::paragraph("held")]);
    let (next, caret) = insert_text(&doc, &Point::new(vec![0, 0], 2), "llo wor")?;
    assert_eq!(next.children, vec![Node::paragraph("hello world")]);
    assert_eq!(caret, Point::new(vec![0, 0], 9));

    let err = insert_text(&doc, &Point::new(vec![0, 0], 9), "x").unwrap_err();
    assert_eq!(err, TransformError::OutOfRange { path: vec![0, 0], offset: 9 });
    Ok(())
}

#[test]
fn returned_points_address_text_in_the_new_document() -> Result<()> {
    let (next, caret) = insert_text(&Document::seed(), &Point::new(vec![0, 0], 0), "XYZ")?;
    assert_eq!(caret, Point::new(vec![0, 0], 3));
    let typed = Selection::new(Point::new(vec![0, 0], 0), caret);
    assert_eq!(text_between(&next, &typed)?, "XYZ");

    let doc = Document::new(vec![Node::paragraph("ab")]);
    let (next, caret) = split_block(&doc, &Point::new(vec![0, 0], 1))?;
    assert_eq!(caret, Point::new(vec![1, 0], 0));
    assert_eq!(next.text_at(&caret.path)?.text, "b");
    Ok(())
}

#[test]
fn delete_within_a_block() -> Result<()> {
    let doc = Document::new(vec![Node::paragraph("abcdef")]);
    let (next, caret) = delete_range(&doc, &sel((vec![0, 0], 4), (vec![0, 0], 1)))?;
    assert_eq!(next.children, vec![Node::paragraph("aef")]);
    assert_eq!(caret, Point::new(vec![0, 0], 1));
    Ok(())
}

#[test]
fn delete_across_blocks_merges_into_the_start_block() -> Result<()> {
    let doc = Document::new(vec![
        Node::text_block(ElementKind::HeadingOne, "abc"),
        Node::paragraph("middle"),
        Node::paragraph("def"),
    ]);
    let (next, caret) = delete_range(&doc, &sel((vec![0, 0], 1), (vec![2, 0], 2)))?;
    assert_eq!(
        next.children,
        vec![Node::text_block(ElementKind::HeadingOne, "af")]
    );
    assert_eq!(caret, Point::new(vec![0, 0], 1));
    Ok(())
}

#[test]
fn delete_through_a_list_drops_the_emptied_container() -> Result<()> {
    let doc = Document::new(vec![
        Node::paragraph("ab"),
        list(&["cd", "ef"])?,
        Node::paragraph("gh"),
    ]);
    let (next, caret) = delete_range(&doc, &sel((vec![0, 0], 1), (vec![2, 0], 1)))?;
    assert_eq!(next.children, vec![Node::paragraph("ah")]);
    assert_eq!(caret, Point::new(vec![0, 0], 1));
    Ok(())
}

#[test]
fn delete_keeps_marks_of_surviving_runs() -> Result<()> {
    let bold = Marks::default().with(MarkFormat::Bold, true);
    let doc = Document::new(vec![
        Node::element(
            ElementKind::Paragraph,
            vec![Node::marked("ab", bold), Node::text("cd")],
        )?,
        Node::paragraph("ef"),
    ]);
    let (next, _) = delete_range(&doc, &sel((vec![0, 0], 1), (vec![1, 0], 1)))?;
    assert_eq!(
        next.children,
        vec![Node::element(
            ElementKind::Paragraph,
            vec![Node::marked("a", bold), Node::text("f")],
        )?]
    );
    Ok(())
}

#[test]
fn collapsed_delete_is_a_no_op() -> Result<()> {
    let doc = Document::new(vec![Node::paragraph("abc")]);
    let caret = Point::new(vec![0, 0], 1);
    let (next, at) = delete_range(&doc, &Selection::collapsed(caret.clone()))?;
    assert_eq!(next, doc);
    assert_eq!(at, caret);
    Ok(())
}

#[test]
fn split_block_keeps_kind_and_attributes() -> Result<()> {
    let mut quote = ElementNode::text_block(ElementKind::BlockQuote, "to be");
    quote.attrs.insert("cite".to_string(), serde_json::json!("hamlet"));
    let doc = Document::new(vec![Node::Element(quote.clone())]);

    let (next, caret) = split_block(&doc, &Point::new(vec![0, 0], 2))?;
    let mut left = quote.clone();
    left.children = vec![Node::text("to")];
    let mut right = quote;
    right.children = vec![Node::text(" be")];
    assert_eq!(next.children, vec![Node::Element(left), Node::Element(right)]);
    assert_eq!(caret, Point::new(vec![1, 0], 0));
    Ok(())
}

#[test]
fn split_at_block_end_creates_an_empty_block() -> Result<()> {
    let doc = Document::new(vec![Node::paragraph("abc")]);
    let (next, caret) = split_block(&doc, &Point::new(vec![0, 0], 3))?;
    assert_eq!(next.children, vec![Node::paragraph("abc"), Node::paragraph("")]);
    assert_eq!(caret, Point::new(vec![1, 0], 0));
    Ok(())
}

#[test]
fn text_between_spans_blocks_in_document_order() -> Result<()> {
    let doc = Document::new(vec![
        Node::paragraph("abc"),
        Node::element(
            ElementKind::Paragraph,
            vec![Node::text("d"), Node::link("https://example.com", "ef"), Node::text("g")],
        )?,
    ]);
    let forward = sel((vec![0, 0], 1), (vec![1, 1, 0], 1));
    assert_eq!(text_between(&doc, &forward)?, "bcde");

    let backward = sel((vec![1, 1, 0], 1), (vec![0, 0], 1));
    assert_eq!(text_between(&doc, &backward)?, "bcde");

    let collapsed = Selection::collapsed(Point::new(vec![0, 0], 2));
    assert_eq!(text_between(&doc, &collapsed)?, "");

    let missing = sel((vec![0, 0], 0), (vec![5, 0], 0));
    assert!(matches!(
        text_between(&doc, &missing),
        Err(TransformError::OutOfRange { .. })
    ));
    Ok(())
}

#[test]
fn set_node_properties_updates_matching_blocks_in_range() -> Result<()> {
    let doc = Document::new(vec![
        Node::paragraph("a"),
        Node::text_block(ElementKind::HeadingOne, "b"),
        Node::paragraph("c"),
    ]);
    let range = sel((vec![0, 0], 0), (vec![1, 0], 1));
    let props = NodeProps::kind(ElementKind::BlockQuote).set_attr("align", serde_json::json!("right"));

    let next = set_node_properties(
        &doc,
        &range,
        |el| el.kind == ElementKind::Paragraph,
        &props,
    )?;

    let Node::Element(first) = &next.children[0] else {
        panic!("expected element");
    };
    assert_eq!(first.kind, ElementKind::BlockQuote);
    assert_eq!(first.attrs.get("align"), Some(&serde_json::json!("right")));
    assert_eq!(next.children[1], Node::text_block(ElementKind::HeadingOne, "b"));
    assert_eq!(next.children[2], Node::paragraph("c"));
    Ok(())
}

#[test]
fn set_node_properties_skips_incompatible_kind_changes() -> Result<()> {
    let doc = Document::new(vec![Node::paragraph("a")]);
    let range = Selection::collapsed(Point::new(vec![0, 0], 0));
    let next = set_node_properties(&doc, &range, |_| true, &NodeProps::kind(ElementKind::BulletedList))?;
    assert_eq!(next, doc);
    Ok(())
}

#[test]
fn list_items_are_regrouped_after_kind_changes() -> Result<()> {
    let doc = Document::new(vec![Node::paragraph("a"), Node::paragraph("b")]);
    let range = sel((vec![0, 0], 0), (vec![1, 0], 0));
    let next = set_node_properties(&doc, &range, |_| true, &NodeProps::kind(ElementKind::ListItem))?;
    assert_eq!(next.children, vec![list(&["a", "b"])?]);
    Ok(())
}

#[test]
fn dangling_selection_snaps_to_the_nearest_text() {
    let doc = Document::new(vec![Node::paragraph("abc"), Node::paragraph("de")]);
    let dangling = Selection::collapsed(Point::new(vec![7, 3], 9));
    assert_eq!(
        normalize_selection(&doc, &dangling),
        Selection::collapsed(Point::new(vec![1, 0], 2))
    );

    let past_offset = Selection::collapsed(Point::new(vec![0, 0], 99));
    assert_eq!(
        normalize_selection(&doc, &past_offset),
        Selection::collapsed(Point::new(vec![0, 0], 3))
    );
}

#[test]
fn document_navigation() -> Result<()> {
    let doc = Document::new(vec![Node::paragraph("x"), list(&["y", "z"])?]);

    assert!(doc.parent(&[0]).is_err());
    let (parent, parent_path) = doc.parent(&[1, 1])?;
    assert_eq!(parent.kind, ElementKind::BulletedList);
    assert_eq!(parent_path, vec![1]);

    assert_eq!(doc.text_block_of(&[1, 0, 0]), Some(vec![1, 0]));
    assert_eq!(doc.start_point(), Some(Point::new(vec![0, 0], 0)));
    assert_eq!(doc.end_point(), Some(Point::new(vec![1, 1, 0], 1)));
    assert_eq!(doc.plain_text(), "x\nyz");
    assert_eq!(
        doc.text_blocks().iter().map(|(path, _)| path.clone()).collect::<Vec<_>>(),
        vec![vec![0], vec![1, 0], vec![1, 1]]
    );
    assert!(matches!(
        doc.node_at(&[0, 3]),
        Err(TransformError::InvalidPath { .. })
    ));
    Ok(())
}
