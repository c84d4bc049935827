use std::rc::Rc;

use indexmap::IndexMap;

use super::filters::suggest;
use crate::{config::ContentType, error::RenderWarning, script::Program};

/// One `{block}` body as declared by a single template.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockBody {
    pub name: String,
    pub content_type: ContentType,
    /// Compiled target code, kept for debugging.
    pub code: String,
    pub program: Program,
}

/// All definitions of one named block, most derived first. Entry `n + 1`
/// is what `{$smarty.block.parent}` renders from entry `n`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledBlock {
    /// Type of the first definition; later ones are checked against it.
    pub content_type: ContentType,
    pub bodies: Vec<Rc<BlockBody>>,
}

impl CompiledBlock {
    pub fn get(&self, index: usize) -> Option<&Rc<BlockBody>> {
        self.bodies.get(index)
    }
}

/// Named block chains shared along an `{extends}`/`{import}` chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockQueue {
    chains: IndexMap<String, CompiledBlock>,
}

impl BlockQueue {
    /// Appends a definition behind the ones already known. A content type
    /// that differs from the first definition yields a warning.
    pub fn add(&mut self, body: Rc<BlockBody>) -> Option<RenderWarning> {
        if let Some(chain) = self.chains.get_mut(&body.name) {
            let warning = (chain.content_type != body.content_type).then(|| {
                RenderWarning::BlockOverride {
                    name: body.name.clone(),
                    current: body.content_type,
                    expected: chain.content_type,
                }
            });
            chain.bodies.push(body);
            return warning;
        }

        self.chains.insert(
            body.name.clone(),
            CompiledBlock {
                content_type: body.content_type,
                bodies: vec![body],
            },
        );
        None
    }

    pub fn get(&self, name: &str) -> Option<&CompiledBlock> {
        self.chains.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }

    pub fn suggestion(&self, name: &str) -> Option<String> {
        suggest(name, self.names())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(name: &str, content_type: ContentType, code: &str) -> Rc<BlockBody> {
        Rc::new(BlockBody {
            name: name.to_string(),
            content_type,
            code: code.to_string(),
            program: Program::default(),
        })
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_definitions_chain_in_insertion_order() {
        let mut queue = BlockQueue::default();
        assert!(queue.add(body("title", ContentType::Html, "child")).is_none());
        assert!(queue.add(body("title", ContentType::Html, "parent")).is_none());
        let chain = queue.get("title").unwrap();
        assert_eq!(chain.get(0).unwrap().code, "child");
        assert_eq!(chain.get(1).unwrap().code, "parent");
        assert!(chain.get(2).is_none());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_mismatched_override_warns() {
        let mut queue = BlockQueue::default();
        queue.add(body("title", ContentType::Html, ""));
        let warning = queue.add(body("title", ContentType::Text, ""));
        assert_eq!(
            warning,
            Some(RenderWarning::BlockOverride {
                name: "title".to_string(),
                current: ContentType::Text,
                expected: ContentType::Html,
            })
        );
        assert_eq!(
            warning.unwrap().to_string(),
            "Overridden block title with content type TEXT by incompatible type HTML."
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_suggestion() {
        let mut queue = BlockQueue::default();
        queue.add(body("content", ContentType::Html, ""));
        assert_eq!(queue.suggestion("contnet"), Some("content".to_string()));
        assert_eq!(queue.suggestion("zzz"), None);
    }
}
