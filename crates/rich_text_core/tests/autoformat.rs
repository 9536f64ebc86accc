use manos_rich_text_core::{
    Document, Editor, ElementKind, KeyEvent, Node, PluginRegistry, Point, Selection,
};

fn empty_editor() -> Editor {
    editor_at(vec![Node::paragraph("")], vec![0, 0], 0)
}

fn editor_at(blocks: Vec<Node>, path: Vec<usize>, offset: usize) -> Editor {
    Editor::new(
        Document::new(blocks),
        Selection::collapsed(Point::new(path, offset)),
        PluginRegistry::richtext(),
    )
}

fn type_text(editor: &mut Editor, text: &str) {
    for ch in text.chars() {
        editor.handle_key(&KeyEvent::new(ch.to_string()));
    }
}

fn backspace(editor: &mut Editor) {
    editor.handle_key(&KeyEvent::new("Backspace"));
}

fn list(items: &[&str]) -> Node {
    Node::element(
        ElementKind::BulletedList,
        items
            .iter()
            .map(|text| Node::text_block(ElementKind::ListItem, *text))
            .collect(),
    )
    .unwrap()
}

#[test]
fn hash_space_becomes_heading_one() {
    let mut editor = empty_editor();
    type_text(&mut editor, "# ");

    assert_eq!(
        editor.doc().children,
        vec![Node::text_block(ElementKind::HeadingOne, "")]
    );
    assert_eq!(editor.selection(), &Selection::collapsed(Point::new(vec![0, 0], 0)));

    type_text(&mut editor, "Title");
    assert_eq!(
        editor.doc().children,
        vec![Node::text_block(ElementKind::HeadingOne, "Title")]
    );
}

#[test]
fn heading_levels_follow_hash_count() {
    for (level, trigger) in ["## ", "### ", "#### ", "##### ", "###### "].iter().enumerate() {
        let mut editor = empty_editor();
        type_text(&mut editor, trigger);
        let expected = ElementKind::heading(level + 2).unwrap();
        assert_eq!(editor.doc().children, vec![Node::text_block(expected, "")]);
    }

    let mut editor = empty_editor();
    type_text(&mut editor, "####### ");
    assert_eq!(editor.doc().children, vec![Node::paragraph("####### ")]);
}

#[test]
fn quote_and_code_triggers() {
    let mut editor = empty_editor();
    type_text(&mut editor, "> ");
    assert_eq!(
        editor.doc().children,
        vec![Node::text_block(ElementKind::BlockQuote, "")]
    );

    let mut editor = empty_editor();
    type_text(&mut editor, "``` ");
    assert_eq!(editor.doc().children, vec![Node::text_block(ElementKind::Code, "")]);
}

#[test]
fn star_and_dash_start_a_bulleted_list() {
    for trigger in ["* ", "- "] {
        let mut editor = empty_editor();
        type_text(&mut editor, trigger);
        assert_eq!(editor.doc().children, vec![list(&[""])]);
        assert_eq!(
            editor.selection(),
            &Selection::collapsed(Point::new(vec![0, 0, 0], 0))
        );

        type_text(&mut editor, "item");
        assert_eq!(editor.doc().children, vec![list(&["item"])]);
    }
}

#[test]
fn trigger_must_start_the_block() {
    let mut editor = empty_editor();
    type_text(&mut editor, "x# ");
    assert_eq!(editor.doc().children, vec![Node::paragraph("x# ")]);

    let mut editor = editor_at(vec![Node::paragraph("abc")], vec![0, 0], 3);
    type_text(&mut editor, "# ");
    assert_eq!(editor.doc().children, vec![Node::paragraph("abc# ")]);
}

#[test]
fn trigger_only_looks_at_text_before_the_caret() {
    let mut editor = editor_at(vec![Node::paragraph("#rest")], vec![0, 0], 1);
    type_text(&mut editor, " ");

    assert_eq!(
        editor.doc().children,
        vec![Node::text_block(ElementKind::HeadingOne, "rest")]
    );
    assert_eq!(editor.selection(), &Selection::collapsed(Point::new(vec![0, 0], 0)));
}

#[test]
fn list_shortcut_before_existing_text_puts_caret_at_item_start() {
    let mut editor = editor_at(vec![Node::paragraph("-item")], vec![0, 0], 1);
    type_text(&mut editor, " ");

    assert_eq!(editor.doc().children, vec![list(&["item"])]);
    assert_eq!(
        editor.selection(),
        &Selection::collapsed(Point::new(vec![0, 0, 0], 0))
    );

    type_text(&mut editor, "x");
    assert_eq!(editor.doc().children, vec![list(&["xitem"])]);
}

#[test]
fn no_shortcuts_inside_code_blocks() {
    let mut editor = editor_at(
        vec![Node::text_block(ElementKind::Code, "")],
        vec![0, 0],
        0,
    );
    type_text(&mut editor, "# ");
    assert_eq!(
        editor.doc().children,
        vec![Node::text_block(ElementKind::Code, "# ")]
    );
}

#[test]
fn shortcut_is_one_undo_step() {
    let mut editor = empty_editor();
    type_text(&mut editor, "# ");

    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("#")]);
    assert_eq!(editor.selection(), &Selection::collapsed(Point::new(vec![0, 0], 1)));

    assert!(editor.redo());
    assert_eq!(
        editor.doc().children,
        vec![Node::text_block(ElementKind::HeadingOne, "")]
    );
}

#[test]
fn backspace_at_heading_start_resets_to_paragraph() {
    let mut editor = editor_at(
        vec![
            Node::paragraph("intro"),
            Node::text_block(ElementKind::HeadingTwo, "Title"),
        ],
        vec![1, 0],
        0,
    );
    backspace(&mut editor);

    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph("intro"), Node::paragraph("Title")]
    );
    assert_eq!(editor.selection(), &Selection::collapsed(Point::new(vec![1, 0], 0)));

    // A second backspace merges as usual.
    backspace(&mut editor);
    assert_eq!(editor.doc().children, vec![Node::paragraph("introTitle")]);
    assert_eq!(editor.selection(), &Selection::collapsed(Point::new(vec![0, 0], 5)));
}

#[test]
fn backspace_at_start_of_first_block_resets_it() {
    let mut editor = editor_at(
        vec![Node::text_block(ElementKind::BlockQuote, "quoted")],
        vec![0, 0],
        0,
    );
    backspace(&mut editor);
    assert_eq!(editor.doc().children, vec![Node::paragraph("quoted")]);
}

#[test]
fn backspace_at_list_item_start_lifts_it_out() {
    let mut editor = empty_editor();
    type_text(&mut editor, "- ");
    backspace(&mut editor);

    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
    assert_eq!(editor.selection(), &Selection::collapsed(Point::new(vec![0, 0], 0)));
}

#[test]
fn backspace_inside_text_deletes_one_character() {
    let mut editor = editor_at(
        vec![Node::text_block(ElementKind::HeadingOne, "héllo")],
        vec![0, 0],
        3,
    );
    backspace(&mut editor);
    assert_eq!(
        editor.doc().children,
        vec![Node::text_block(ElementKind::HeadingOne, "hllo")]
    );
    assert_eq!(editor.selection(), &Selection::collapsed(Point::new(vec![0, 0], 1)));
}
