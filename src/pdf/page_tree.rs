use lopdf::{Dictionary, Document, Object, ObjectId};

/// Page attributes that a page may inherit from its ancestors in the page tree
pub const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

// Guards against malformed trees with cyclic /Parent links
const MAX_TREE_DEPTH: usize = 64;

/// US Letter, used when a page carries no usable MediaBox
pub const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Look up `key` on the page, walking up /Parent links if the page lacks it
pub fn inherited_attribute<'a>(
    doc: &'a Document,
    page: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    let mut node = page;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent_id = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent_id).ok()?;
    }
    None
}

/// Resolve a direct object, following a single indirect reference if present
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

pub fn media_box(doc: &Document, page: &Dictionary) -> [f32; 4] {
    inherited_attribute(doc, page, b"MediaBox")
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_array().ok())
        .and_then(|arr| {
            let nums: Vec<f32> = arr
                .iter()
                .filter_map(|o| resolve(doc, o).and_then(|o| o.as_float().ok()))
                .collect();
            match nums.as_slice() {
                [x0, y0, x1, y1] => Some([*x0, *y0, *x1, *y1]),
                _ => None,
            }
        })
        .unwrap_or(DEFAULT_MEDIA_BOX)
}

/// Page rotation normalised to 0, 90, 180 or 270
pub fn rotation(doc: &Document, page: &Dictionary) -> i64 {
    inherited_attribute(doc, page, b"Rotate")
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_i64().ok())
        .map(|r| r.rem_euclid(360) / 90 * 90)
        .unwrap_or(0)
}

/// True for page tree nodes (/Type /Page or /Type /Pages)
pub fn is_page_tree_node(doc: &Document, id: ObjectId) -> bool {
    doc.get_dictionary(id)
        .ok()
        .and_then(|dict| dict.get(b"Type").ok())
        .and_then(|ty| ty.as_name().ok())
        .is_some_and(|name| name == b"Page" || name == b"Pages")
}

/// Object id of the root /Pages node
pub fn pages_root(doc: &Document) -> Option<ObjectId> {
    doc.catalog()
        .ok()?
        .get(b"Pages")
        .ok()?
        .as_reference()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn tree_with_inherited_box() -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 300.into(), 400.into()],
                "Rotate" => -90,
            }),
        );
        (doc, page_id)
    }

    #[test]
    fn test_media_box_inherited_from_parent() {
        let (doc, page_id) = tree_with_inherited_box();
        let page = doc.get_dictionary(page_id).unwrap();
        assert_eq!(media_box(&doc, page), [0.0, 0.0, 300.0, 400.0]);
    }

    #[test]
    fn test_rotation_normalised() {
        let (doc, page_id) = tree_with_inherited_box();
        let page = doc.get_dictionary(page_id).unwrap();
        assert_eq!(rotation(&doc, page), 270);
    }

    #[test]
    fn test_missing_media_box_defaults_to_letter() {
        let doc = Document::with_version("1.5");
        let page = dictionary! { "Type" => "Page" };
        assert_eq!(media_box(&doc, &page), DEFAULT_MEDIA_BOX);
    }

    #[test]
    fn test_page_tree_node_detection() {
        let (doc, page_id) = tree_with_inherited_box();
        assert!(is_page_tree_node(&doc, page_id));
        assert!(!is_page_tree_node(&doc, (999, 0)));
    }
}
