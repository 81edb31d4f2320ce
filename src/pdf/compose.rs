//! Building new documents out of pages copied from a source document

use crate::backend::{ComposeDoc, Composer};
use crate::pdf::page_tree::{self, INHERITABLE_KEYS};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfComposer;

#[async_trait]
impl Composer for LopdfComposer {
    type Doc = ComposeDocument;

    async fn parse(&self, bytes: Arc<[u8]>) -> Result<ComposeDocument> {
        let doc = tokio::task::spawn_blocking(move || Document::load_mem(&bytes))
            .await
            .context("PDF parser task failed")?
            .context("Failed to parse PDF")?;
        ComposeDocument::from_document(doc)
    }

    fn new_document(&self) -> ComposeDocument {
        ComposeDocument::empty()
    }
}

pub struct ComposeDocument {
    doc: Document,
    pages_id: ObjectId,
}

impl ComposeDocument {
    pub fn empty() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(vec![])),
            ("Count", Object::Integer(0)),
        ]));
        let catalog_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));
        Self { doc, pages_id }
    }

    pub fn from_document(doc: Document) -> Result<Self> {
        let pages_id =
            page_tree::pages_root(&doc).ok_or_else(|| anyhow!("PDF has no page tree"))?;
        Ok(Self { doc, pages_id })
    }

    /// Page object ids in document order
    fn page_ids(&self) -> Vec<ObjectId> {
        self.doc.get_pages().into_values().collect()
    }
}

#[async_trait]
impl ComposeDoc for ComposeDocument {
    type PageRef = ObjectId;

    fn page_count(&self) -> u32 {
        self.doc.get_pages().len() as u32
    }

    async fn copy_pages_from(
        &mut self,
        source: &ComposeDocument,
        positions: &[u32],
    ) -> Result<Vec<ObjectId>> {
        let source_pages = source.page_ids();
        let mut copier = ObjectCopier::new(&source.doc, &mut self.doc);

        positions
            .iter()
            .map(|&position| {
                let page_id = *source_pages.get(position as usize).ok_or_else(|| {
                    anyhow!(
                        "Page position {} is out of range (document has {} pages)",
                        position,
                        source_pages.len()
                    )
                })?;
                copier.copy_page(page_id)
            })
            .collect()
    }

    fn append(&mut self, page: ObjectId) -> Result<()> {
        let pages_id = self.pages_id;
        self.doc
            .get_dictionary_mut(page)
            .context("Appended page is not a dictionary")?
            .set("Parent", Object::Reference(pages_id));

        let pages = self
            .doc
            .get_dictionary_mut(pages_id)
            .context("Invalid pages dictionary")?;
        let mut kids = match pages.get(b"Kids") {
            Ok(Object::Array(kids)) => kids.clone(),
            _ => Vec::new(),
        };
        kids.push(Object::Reference(page));
        let count = match pages.get(b"Count") {
            Ok(Object::Integer(count)) => *count,
            _ => 0,
        };
        pages.set("Kids", Object::Array(kids));
        pages.set("Count", Object::Integer(count + 1));
        Ok(())
    }

    async fn serialize(&mut self) -> Result<Vec<u8>> {
        self.doc.compress();
        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .context("Failed to serialize PDF")?;
        Ok(buffer)
    }
}

/// Deep-copies objects from one document into another, remapping ids.
/// Objects reachable from several copied pages are copied once.
struct ObjectCopier<'a> {
    source: &'a Document,
    target: &'a mut Document,
    remapped: HashMap<ObjectId, ObjectId>,
}

impl<'a> ObjectCopier<'a> {
    fn new(source: &'a Document, target: &'a mut Document) -> Self {
        Self {
            source,
            target,
            remapped: HashMap::new(),
        }
    }

    fn copy_page(&mut self, page_id: ObjectId) -> Result<ObjectId> {
        let source = self.source;
        let page = source
            .get_dictionary(page_id)
            .with_context(|| format!("Page object {:?} is not a dictionary", page_id))?;

        let mut flattened = page.clone();
        for key in INHERITABLE_KEYS {
            if !flattened.has(key) {
                if let Some(value) = page_tree::inherited_attribute(source, page, key) {
                    flattened.set(key.to_vec(), value.clone());
                }
            }
        }
        flattened.remove(b"Parent");

        let new_id = self.target.new_object_id();
        let copied = self.copy_dictionary(&flattened)?;
        self.target
            .objects
            .insert(new_id, Object::Dictionary(copied));
        Ok(new_id)
    }

    fn copy_reference(&mut self, id: ObjectId) -> Result<Object> {
        if let Some(&new_id) = self.remapped.get(&id) {
            return Ok(Object::Reference(new_id));
        }
        // Links back into the page tree (annotation /P, /Dest arrays, ...) would
        // drag every other page along
        let source = self.source;
        if page_tree::is_page_tree_node(source, id) {
            return Ok(Object::Null);
        }
        let Ok(object) = source.get_object(id) else {
            return Ok(Object::Null);
        };

        let new_id = self.target.new_object_id();
        self.remapped.insert(id, new_id);
        let copied = self.copy_object(object.clone())?;
        self.target.objects.insert(new_id, copied);
        Ok(Object::Reference(new_id))
    }

    fn copy_object(&mut self, object: Object) -> Result<Object> {
        Ok(match object {
            Object::Reference(id) => self.copy_reference(id)?,
            Object::Array(items) => Object::Array(
                items
                    .into_iter()
                    .map(|item| self.copy_object(item))
                    .collect::<Result<_>>()?,
            ),
            Object::Dictionary(dict) => Object::Dictionary(self.copy_dictionary(&dict)?),
            Object::Stream(mut stream) => {
                stream.dict = self.copy_dictionary(&stream.dict)?;
                Object::Stream(stream)
            }
            other => other,
        })
    }

    fn copy_dictionary(&mut self, dict: &Dictionary) -> Result<Dictionary> {
        let mut copied = Dictionary::new();
        for (key, value) in dict.iter() {
            copied.set(key.clone(), self.copy_object(value.clone())?);
        }
        Ok(copied)
    }
}

/// Build a new document from `positions` of `source` and serialize it
pub async fn assemble<C: Composer>(
    composer: &C,
    source: &C::Doc,
    positions: &[u32],
) -> Result<Vec<u8>> {
    if positions.is_empty() {
        bail!("No pages specified");
    }
    let mut new_doc = composer.new_document();
    let copied = new_doc.copy_pages_from(source, positions).await?;
    for page in copied {
        new_doc.append(page)?;
    }
    new_doc.serialize().await
}
