use std::cell::RefCell;
use std::rc::Rc;

use super::StoreData;
use crate::broker::DocumentBuilder;
use crate::error::{Error, ErrorCode, Result};
use crate::model::{DocId, NodeHandle, NodeKind, QName};

/// Writes constructed nodes into a fragment document of the shared store.
pub struct MemoryDocumentBuilder {
    data: Rc<RefCell<StoreData>>,
    doc: DocId,
    open: Vec<usize>,
    /// Text node that the next `characters` call extends, inside an element.
    pending_text: Option<usize>,
}

impl MemoryDocumentBuilder {
    pub(crate) fn new(data: Rc<RefCell<StoreData>>) -> Self {
        let doc = data.borrow_mut().new_fragment();
        Self { data, doc, open: vec![0], pending_text: None }
    }

    fn top(&self) -> usize {
        self.open.last().copied().unwrap_or(0)
    }

    fn append(&mut self, kind: NodeKind, name: Option<QName>, value: String) -> Result<(usize, NodeHandle)> {
        let parent = self.top();
        let mut data = self.data.borrow_mut();
        let doc = data.doc_mut(self.doc)?;
        let idx = doc.append(parent, kind, name, value);
        Ok((idx, doc.handle(idx)))
    }
}

impl DocumentBuilder for MemoryDocumentBuilder {
    fn start_element(&mut self, name: &QName) -> Result<NodeHandle> {
        self.pending_text = None;
        let (idx, h) = self.append(NodeKind::Element, Some(name.clone()), String::new())?;
        self.open.push(idx);
        Ok(h)
    }

    fn end_element(&mut self) -> Result<()> {
        self.pending_text = None;
        if self.open.len() <= 1 {
            return Err(Error::storage("end_element without matching start_element"));
        }
        self.open.pop();
        Ok(())
    }

    fn attribute(&mut self, name: &QName, value: &str) -> Result<NodeHandle> {
        let parent = self.top();
        {
            let data = self.data.borrow();
            let doc = data.doc(self.doc)?;
            let owner = &doc.nodes[parent];
            if owner.kind == NodeKind::Element {
                if !owner.children.is_empty() {
                    return Err(Error::type_error(format!("attribute {name} added after element content")));
                }
                if owner.attrs.iter().any(|&a| doc.nodes[a].name.as_ref() == Some(name)) {
                    return Err(Error::from_code(ErrorCode::XQDY0025, format!("duplicate attribute {name}")));
                }
            }
        }
        self.pending_text = None;
        Ok(self.append(NodeKind::Attribute, Some(name.clone()), value.to_string())?.1)
    }

    fn characters(&mut self, text: &str) -> Result<NodeHandle> {
        let parent = self.top();
        let mut data = self.data.borrow_mut();
        let doc = data.doc_mut(self.doc)?;
        if self.open.len() > 1
            && let Some(idx) = self.pending_text
        {
            doc.nodes[idx].value.push_str(text);
            return Ok(doc.handle(idx));
        }
        let idx = doc.append(parent, NodeKind::Text, None, text.to_string());
        self.pending_text = Some(idx);
        Ok(doc.handle(idx))
    }

    fn comment(&mut self, text: &str) -> Result<NodeHandle> {
        self.pending_text = None;
        Ok(self.append(NodeKind::Comment, None, text.to_string())?.1)
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<NodeHandle> {
        self.pending_text = None;
        Ok(self.append(NodeKind::ProcessingInstruction, Some(QName::local(target)), data.to_string())?.1)
    }
}
